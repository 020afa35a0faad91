use crate::{
    admin::{
        CancelEarmarkRequest, CancelOperationRequest, EarmarkListQuery, EarmarkWithOperations,
        ErrorMessage, OperationListQuery,
    },
    cache::PauseFlag,
    types::{Earmark, RebalanceOperation},
};
use super::server::ADMIN_TOKEN_HEADER;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("admin API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Client for the admin API, used by operator tooling and tests.
#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl Client {
    pub fn new(endpoint: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    async fn check<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorMessage>()
                .await
                .map(|body| body.message)
                .unwrap_or_default();
            return Err(ClientError::Api { status: status.as_u16(), message });
        }
        response.json().await.map_err(From::from)
    }

    pub async fn set_pause(&self, flag: PauseFlag, paused: bool) -> Result<(), ClientError> {
        let endpoint = &self.endpoint;
        let action = if paused { "pause" } else { "unpause" };
        let response = self
            .client
            .post(format!("{endpoint}/admin/{action}/{flag}"))
            .header(ADMIN_TOKEN_HEADER, &self.token)
            .send()
            .await?;
        self.check::<serde_json::Value>(response).await?;
        Ok(())
    }

    pub async fn cancel_earmark(&self, earmark_id: Uuid) -> Result<Earmark, ClientError> {
        let endpoint = &self.endpoint;
        let response = self
            .client
            .post(format!("{endpoint}/admin/rebalance/cancel"))
            .header(ADMIN_TOKEN_HEADER, &self.token)
            .json(&CancelEarmarkRequest { earmark_id })
            .send()
            .await?;
        self.check(response).await
    }

    pub async fn cancel_operation(
        &self,
        operation_id: Uuid,
    ) -> Result<RebalanceOperation, ClientError> {
        let endpoint = &self.endpoint;
        let response = self
            .client
            .post(format!("{endpoint}/admin/rebalance/operation/cancel"))
            .header(ADMIN_TOKEN_HEADER, &self.token)
            .json(&CancelOperationRequest { operation_id })
            .send()
            .await?;
        self.check(response).await
    }

    pub async fn list_operations(
        &self,
        query: &OperationListQuery,
    ) -> Result<Vec<RebalanceOperation>, ClientError> {
        let endpoint = &self.endpoint;
        let response = self
            .client
            .get(format!("{endpoint}/admin/rebalance/operations"))
            .header(ADMIN_TOKEN_HEADER, &self.token)
            .query(query)
            .send()
            .await?;
        self.check(response).await
    }

    pub async fn get_operation(&self, id: Uuid) -> Result<RebalanceOperation, ClientError> {
        let endpoint = &self.endpoint;
        let response = self
            .client
            .get(format!("{endpoint}/admin/rebalance/operation/{id}"))
            .header(ADMIN_TOKEN_HEADER, &self.token)
            .send()
            .await?;
        self.check(response).await
    }

    pub async fn list_earmarks(
        &self,
        query: &EarmarkListQuery,
    ) -> Result<Vec<EarmarkWithOperations>, ClientError> {
        let endpoint = &self.endpoint;
        let response = self
            .client
            .get(format!("{endpoint}/admin/rebalance/earmarks"))
            .header(ADMIN_TOKEN_HEADER, &self.token)
            .query(query)
            .send()
            .await?;
        self.check(response).await
    }
}
