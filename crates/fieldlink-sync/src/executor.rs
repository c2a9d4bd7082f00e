//! # Action Executor
//!
//! Replays a queued [`OfflineAction`] against the backend.
//!
//! ## Routes
//! ```text
//! ┌──────────────────────────┬────────┬──────────────────────────────┐
//! │ kind                     │ method │ path                         │
//! ├──────────────────────────┼────────┼──────────────────────────────┤
//! │ update_status            │ PATCH  │ /agents/me/status            │
//! │ accept_order             │ POST   │ /orders/{order_id}/accept    │
//! │ reject_order             │ POST   │ /orders/{order_id}/reject    │
//! │ update_order_status      │ PATCH  │ /orders/{order_id}/status    │
//! │ update_location          │ POST   │ /agents/me/location          │
//! │ submit_proof_of_delivery │ POST   │ /orders/{order_id}/proof     │
//! └──────────────────────────┴────────┴──────────────────────────────┘
//! ```
//!
//! The body is the action payload minus `order_id` (already in the path).
//! Replays go through the [`TokenRefresher`], so an access token that
//! expired while the device was offline is refreshed transparently.
//!
//! Replays are not deduplicated server-side: an executor must be safe to
//! call again for an action the backend may already have applied.

use async_trait::async_trait;
use fieldlink_core::{OfflineAction, OfflineActionKind};
use serde_json::Value;
use tracing::debug;

use crate::auth::TokenRefresher;
use crate::error::ClientResult;
use crate::http::{ApiRequest, Method};

/// Performs one queued action.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &OfflineAction) -> ClientResult<()>;
}

/// Executes actions as HTTP calls through the refresh coordinator.
#[derive(Debug, Clone)]
pub struct HttpActionExecutor {
    refresher: TokenRefresher,
}

impl HttpActionExecutor {
    pub fn new(refresher: TokenRefresher) -> Self {
        Self { refresher }
    }
}

#[async_trait]
impl ActionExecutor for HttpActionExecutor {
    async fn execute(&self, action: &OfflineAction) -> ClientResult<()> {
        let request = request_for(&action.kind)?;
        debug!(
            id = %action.id,
            method = %request.method,
            path = %request.path,
            "Replaying offline action"
        );
        self.refresher.request(&request).await.map(|_| ())
    }
}

/// Builds the backend call for an action kind.
pub fn request_for(kind: &OfflineActionKind) -> ClientResult<ApiRequest> {
    let (method, path) = match kind {
        OfflineActionKind::UpdateStatus { .. } => (Method::PATCH, "/agents/me/status".to_string()),
        OfflineActionKind::AcceptOrder { order_id } => {
            (Method::POST, format!("/orders/{order_id}/accept"))
        }
        OfflineActionKind::RejectOrder { order_id, .. } => {
            (Method::POST, format!("/orders/{order_id}/reject"))
        }
        OfflineActionKind::UpdateOrderStatus { order_id, .. } => {
            (Method::PATCH, format!("/orders/{order_id}/status"))
        }
        OfflineActionKind::UpdateLocation { .. } => {
            (Method::POST, "/agents/me/location".to_string())
        }
        OfflineActionKind::SubmitProofOfDelivery { order_id, .. } => {
            (Method::POST, format!("/orders/{order_id}/proof"))
        }
    };

    Ok(ApiRequest::new(method, path).with_body(body_for(kind)?))
}

fn body_for(kind: &OfflineActionKind) -> ClientResult<Value> {
    let mut tagged = serde_json::to_value(kind)?;
    let mut payload = tagged
        .get_mut("payload")
        .map(Value::take)
        .unwrap_or_else(|| Value::Object(Default::default()));

    if let Value::Object(fields) = &mut payload {
        fields.remove("order_id");
    }
    Ok(payload)
}
