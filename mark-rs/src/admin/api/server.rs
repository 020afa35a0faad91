use crate::{
    admin::{
        AdminApi, AdminError, CancelEarmarkRequest, CancelOperationRequest, EarmarkListQuery,
        EarmarkWithOperations, OperationListQuery,
    },
    cache::PauseFlag,
    types::RebalanceOperation,
};
use axum::{
    extract::{Json, Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post, IntoMakeService},
    Router,
};
use hyper::server::conn::AddrIncoming;
use serde_json::json;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Header carrying the shared admin secret.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Type alias for the configured axum server
pub type AdminServer = axum::Server<AddrIncoming, IntoMakeService<Router>>;

#[derive(Clone)]
pub(crate) struct ApiState<A: Clone> {
    api: A,
    token: String,
}

impl<A: Clone> ApiState<A> {
    fn authorize(&self, headers: &HeaderMap) -> Result<(), AdminError> {
        let presented =
            headers.get(ADMIN_TOKEN_HEADER).and_then(|value| value.to_str().ok()).unwrap_or("");
        if presented != self.token {
            return Err(AdminError::Unauthorized);
        }
        Ok(())
    }
}

async fn handle_pause<A: AdminApi + Clone>(
    State(state): State<ApiState<A>>,
    Path(flag): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AdminError> {
    state.authorize(&headers)?;
    let flag: PauseFlag = flag.parse().map_err(|_| AdminError::UnknownPath)?;
    state.api.set_pause(flag, true).await?;
    tracing::info!(request_id = %Uuid::new_v4(), %flag, "paused");
    Ok(Json(json!({ "paused": flag })))
}

async fn handle_unpause<A: AdminApi + Clone>(
    State(state): State<ApiState<A>>,
    Path(flag): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AdminError> {
    state.authorize(&headers)?;
    let flag: PauseFlag = flag.parse().map_err(|_| AdminError::UnknownPath)?;
    state.api.set_pause(flag, false).await?;
    tracing::info!(request_id = %Uuid::new_v4(), %flag, "unpaused");
    Ok(Json(json!({ "unpaused": flag })))
}

async fn handle_cancel_earmark<A: AdminApi + Clone>(
    State(state): State<ApiState<A>>,
    headers: HeaderMap,
    Json(request): Json<CancelEarmarkRequest>,
) -> Result<impl IntoResponse, AdminError> {
    state.authorize(&headers)?;
    let earmark = state.api.cancel_earmark(request.earmark_id).await?;
    tracing::info!(
        request_id = %Uuid::new_v4(),
        earmark_id = %earmark.id,
        invoice_id = %earmark.invoice_id,
        "earmark cancelled"
    );
    Ok(Json(earmark))
}

async fn handle_cancel_operation<A: AdminApi + Clone>(
    State(state): State<ApiState<A>>,
    headers: HeaderMap,
    Json(request): Json<CancelOperationRequest>,
) -> Result<impl IntoResponse, AdminError> {
    state.authorize(&headers)?;
    let operation = state.api.cancel_operation(request.operation_id).await?;
    tracing::info!(request_id = %Uuid::new_v4(), operation_id = %operation.id, "operation cancelled");
    Ok(Json(operation))
}

async fn handle_list_operations<A: AdminApi + Clone>(
    State(state): State<ApiState<A>>,
    Query(query): Query<OperationListQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<RebalanceOperation>>, AdminError> {
    state.authorize(&headers)?;
    let operations = state.api.list_operations(query).await?;
    Ok(Json(operations))
}

async fn handle_get_operation<A: AdminApi + Clone>(
    State(state): State<ApiState<A>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<RebalanceOperation>, AdminError> {
    state.authorize(&headers)?;
    let operation = state.api.get_operation(id).await?;
    Ok(Json(operation))
}

async fn handle_list_earmarks<A: AdminApi + Clone>(
    State(state): State<ApiState<A>>,
    Query(query): Query<EarmarkListQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<EarmarkWithOperations>>, AdminError> {
    state.authorize(&headers)?;
    let earmarks = state.api.list_earmarks(query).await?;
    Ok(Json(earmarks))
}

async fn handle_unknown<A: AdminApi + Clone>(
    State(state): State<ApiState<A>>,
    headers: HeaderMap,
) -> AdminError {
    if let Err(err) = state.authorize(&headers) {
        return err;
    }
    AdminError::UnknownPath
}

pub struct Server<A: AdminApi + Clone> {
    host: Ipv4Addr,
    port: u16,
    api: A,
    token: String,
}

impl<A: AdminApi + Clone + Send + Sync + 'static> Server<A> {
    pub fn new(host: Ipv4Addr, port: u16, api: A, token: &str) -> Self {
        Self { host, port, api, token: token.to_string() }
    }

    /// Build the router and bind the listener without driving it.
    pub fn serve(&self) -> AdminServer {
        let state = ApiState { api: self.api.clone(), token: self.token.clone() };
        let router = Router::new()
            .route("/admin/pause/:flag", post(handle_pause::<A>))
            .route("/admin/unpause/:flag", post(handle_unpause::<A>))
            .route("/admin/rebalance/cancel", post(handle_cancel_earmark::<A>))
            .route("/admin/rebalance/operation/cancel", post(handle_cancel_operation::<A>))
            .route("/admin/rebalance/operations", get(handle_list_operations::<A>))
            .route("/admin/rebalance/operation/:id", get(handle_get_operation::<A>))
            .route("/admin/rebalance/earmarks", get(handle_list_earmarks::<A>))
            .fallback(handle_unknown::<A>)
            .with_state(state);
        let addr = SocketAddr::from((self.host, self.port));
        axum::Server::bind(&addr).serve(router.into_make_service())
    }

    /// Drive the bound server on its own task; the handle resolves when it
    /// stops listening.
    pub fn spawn(&self) -> JoinHandle<Result<(), hyper::Error>> {
        let server = self.serve();
        let address = server.local_addr();
        tokio::spawn(async move {
            tracing::info!("admin API listening at {address}...");
            let result = server.await;
            if let Err(ref err) = result {
                tracing::error!(%err, "error while listening for incoming")
            }
            result
        })
    }
}
