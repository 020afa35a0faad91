//! Authenticated admin surface: pause switches, cancellations, and read
//! access to earmarks and rebalance operations.
//!
//! The HTTP server here is generic over [`AdminApi`]; the engine crate
//! provides the implementation backed by the stores and the pause gate.

mod api;

pub use api::{
    client::{Client, ClientError},
    server::Server,
};

use crate::{
    cache::PauseFlag,
    types::{Earmark, EarmarkStatus, RebalanceOperation, RebalanceStatus},
};
use async_trait::async_trait;
use axum::{
    extract::Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(Uuid),
    #[error("unknown path")]
    UnknownPath,
    /// Policy-level rejections (e.g. pausing an already-paused flag); the
    /// surface reports these as 500 by contract.
    #[error("{0}")]
    Policy(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let code = match &self {
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::BadRequest(..) => StatusCode::BAD_REQUEST,
            Self::NotFound(..) => StatusCode::NOT_FOUND,
            Self::UnknownPath => StatusCode::NOT_FOUND,
            Self::Policy(..) | Self::Internal(..) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = self.to_string();
        (code, Json(ErrorMessage { message })).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationListQuery {
    pub status: Option<RebalanceStatus>,
    pub chain_id: Option<u64>,
    pub invoice_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EarmarkListQuery {
    pub status: Option<EarmarkStatus>,
    pub chain_id: Option<u64>,
    pub invoice_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// An earmark with its operations fetch-joined for the admin listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarmarkWithOperations {
    #[serde(flatten)]
    pub earmark: Earmark,
    pub operations: Vec<RebalanceOperation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelEarmarkRequest {
    pub earmark_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOperationRequest {
    pub operation_id: Uuid,
}

#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn set_pause(&self, flag: PauseFlag, paused: bool) -> Result<(), AdminError>;

    /// Cancel an earmark and orphan its still-in-flight operations.
    async fn cancel_earmark(&self, earmark_id: Uuid) -> Result<Earmark, AdminError>;

    /// Cancel one in-flight operation. Earmark-bound operations become
    /// orphaned; standalone operations stay non-orphaned.
    async fn cancel_operation(&self, operation_id: Uuid)
        -> Result<RebalanceOperation, AdminError>;

    async fn list_operations(
        &self,
        query: OperationListQuery,
    ) -> Result<Vec<RebalanceOperation>, AdminError>;

    async fn get_operation(&self, id: Uuid) -> Result<RebalanceOperation, AdminError>;

    async fn list_earmarks(
        &self,
        query: EarmarkListQuery,
    ) -> Result<Vec<EarmarkWithOperations>, AdminError>;
}
