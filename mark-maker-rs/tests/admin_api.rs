mod mocks;

use alloy_primitives::{Address, B256, U256};
use mark_maker_rs::admin::AdminHandle;
use mark_rs::{
    admin::{Client, ClientError, EarmarkListQuery, OperationListQuery, Server},
    cache::{MemoryPauses, PauseFlag},
    store::{
        EarmarkStore, MemoryStore, NewEarmark, NewRebalanceOperation, RebalanceOperationStore,
        Store,
    },
    types::{
        BridgeTag, EarmarkStatus, RebalanceStatus, TransactionEntry, TransactionReceipt,
    },
};
use mocks::{setup_logging, TICKER};
use std::{collections::HashMap, net::Ipv4Addr, sync::Arc};
use uuid::Uuid;

const PORT: u16 = 28480;
const TOKEN: &str = "secret";

async fn seed(store: &dyn Store) -> (Uuid, Uuid) {
    let earmark = store
        .create_earmark(NewEarmark {
            invoice_id: "A".to_string(),
            designated_purchase_chain: 8453,
            ticker_hash: TICKER,
            min_amount: U256::from(1000),
            status: EarmarkStatus::Pending,
        })
        .await
        .unwrap();
    let entry = TransactionEntry {
        hash: B256::repeat_byte(9),
        receipt: Some(TransactionReceipt {
            transaction_hash: B256::repeat_byte(9),
            block_number: 1,
            success: true,
        }),
        metadata: None,
    };
    let operation = store
        .create_rebalance_operation(NewRebalanceOperation {
            earmark_id: Some(earmark.id),
            origin_chain_id: 1,
            destination_chain_id: 8453,
            ticker_hash: TICKER,
            amount_native: U256::from(500),
            slippage_dbps: 100,
            bridge: BridgeTag::Across,
            recipient: Address::repeat_byte(2),
            is_orphaned: false,
            transactions: HashMap::from([(1, entry)]),
        })
        .await
        .unwrap();
    (earmark.id, operation.id)
}

fn api_status(err: ClientError) -> u16 {
    match err {
        ClientError::Api { status, .. } => status,
        err => panic!("expected API error, got {err}"),
    }
}

#[tokio::test]
async fn admin_surface_end_to_end() {
    setup_logging();

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let (earmark_id, operation_id) = seed(store.as_ref()).await;

    let pauses = Arc::new(MemoryPauses::new());
    let admin = AdminHandle::new(store.clone(), pauses);
    let server = Server::new(Ipv4Addr::LOCALHOST, PORT, admin, TOKEN);
    std::mem::drop(server.spawn());

    let endpoint = format!("http://127.0.0.1:{PORT}");
    let client = Client::new(&endpoint, TOKEN);

    // pause flips once, then the conflict surfaces as a 500
    client.set_pause(PauseFlag::Purchase, true).await.unwrap();
    let err = client.set_pause(PauseFlag::Purchase, true).await.unwrap_err();
    assert_eq!(api_status(err), 500);
    client.set_pause(PauseFlag::Purchase, false).await.unwrap();
    let err = client.set_pause(PauseFlag::Purchase, false).await.unwrap_err();
    assert_eq!(api_status(err), 500);

    // listings join operations into their earmarks
    let earmarks = client.list_earmarks(&EarmarkListQuery::default()).await.unwrap();
    assert_eq!(earmarks.len(), 1);
    assert_eq!(earmarks[0].earmark.id, earmark_id);
    assert_eq!(earmarks[0].operations.len(), 1);

    let operations = client
        .list_operations(&OperationListQuery {
            status: Some(RebalanceStatus::Pending),
            chain_id: Some(8453),
            invoice_id: Some("A".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0].id, operation_id);

    let fetched = client.get_operation(operation_id).await.unwrap();
    assert_eq!(fetched.id, operation_id);
    let err = client.get_operation(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(api_status(err), 404);

    // cancelling an operation bound to an earmark orphans it
    let cancelled = client.cancel_operation(operation_id).await.unwrap();
    assert_eq!(cancelled.status, RebalanceStatus::Cancelled);
    assert!(cancelled.is_orphaned);
    // a second cancel is an invalid transition
    let err = client.cancel_operation(operation_id).await.unwrap_err();
    assert_eq!(api_status(err), 400);

    let cancelled = client.cancel_earmark(earmark_id).await.unwrap();
    assert_eq!(cancelled.status, EarmarkStatus::Cancelled);
    let err = client.cancel_earmark(earmark_id).await.unwrap_err();
    assert_eq!(api_status(err), 400);
    let err = client.cancel_earmark(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(api_status(err), 404);

    // wrong shared secret is rejected before anything else
    let intruder = Client::new(&endpoint, "wrong");
    let err = intruder.list_earmarks(&EarmarkListQuery::default()).await.unwrap_err();
    assert_eq!(api_status(err), 403);

    // unknown paths answer 404 with a JSON message
    let raw = reqwest::Client::new();
    let response = raw
        .get(format!("{endpoint}/admin/unknown"))
        .header("x-admin-token", TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body.get("message").is_some());

    // unauthenticated unknown path is a 403
    let response = raw.get(format!("{endpoint}/admin/unknown")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 403);
}
