//! Admin endpoint handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use crate::bouncer::BouncerError;
use crate::core::CoreError;
use crate::relay_task::RelayTask;
use crate::services::relayer::MAX_RETRIES;

use super::ApiState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayTaskRequest {
    pub confirmation_id: String,
    pub transfer_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Bouncer(#[from] BouncerError),
    #[error("transfer not found")]
    NotFound,
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Bouncer(BouncerError::Forbidden) => StatusCode::FORBIDDEN,
            ApiError::Bouncer(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// `POST /relayer/v1/relay_tasks`: resolves one transfer of a
/// confirmation and schedules it for relay.
pub async fn post_relay_task(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(request): Json<RelayTaskRequest>,
) -> Result<StatusCode, ApiError> {
    state.bouncer.check(bearer_token(&headers))?;
    schedule_relay_task(&state, &request).await
}

pub(super) async fn schedule_relay_task(
    state: &ApiState,
    request: &RelayTaskRequest,
) -> Result<StatusCode, ApiError> {
    let transfer = state
        .core
        .get_transfer(&request.confirmation_id, &request.transfer_id)
        .await
        .map_err(|err| match err {
            CoreError::TransferNotFound { .. } => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        })?;

    let task = RelayTask::new(&transfer, MAX_RETRIES);
    state
        .queue
        .publish(task.marshal())
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    tracing::info!(
        merkle_root = request.confirmation_id,
        op_id = request.transfer_id,
        "scheduled a relay task"
    );
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bouncer::Bouncer;
    use crate::config::BouncerConfig;
    use crate::core::Core;
    use crate::core::testing::{CONFIRMATION_ROOT, populated_chain};
    use crate::queue::mock::MockTaskQueue;

    fn state() -> (Arc<ApiState>, Arc<MockTaskQueue>) {
        let queue = Arc::new(MockTaskQueue::default());
        let state = Arc::new(ApiState {
            core: Core::new(Arc::new(populated_chain("Ethereum", &["i1"]))),
            queue: queue.clone(),
            bouncer: Bouncer::new(&BouncerConfig::default()),
        });
        (state, queue)
    }

    #[tokio::test]
    async fn schedules_a_single_task() {
        let (state, queue) = state();
        let transfer = state
            .core
            .get_transfers(CONFIRMATION_ROOT)
            .await
            .expect("transfers")
            .remove(0);

        let status = schedule_relay_task(
            &state,
            &RelayTaskRequest {
                confirmation_id: CONFIRMATION_ROOT.to_owned(),
                transfer_id: transfer.origin.clone(),
            },
        )
        .await
        .expect("scheduled");
        assert_eq!(status, StatusCode::NO_CONTENT);

        let published = queue.published.lock().expect("lock");
        assert_eq!(published.len(), 1);
        let task = RelayTask::unmarshal(&published[0]).expect("task");
        assert_eq!(task.origin, transfer.origin);
        assert_eq!(task.retries_left, MAX_RETRIES);
    }

    #[tokio::test]
    async fn unknown_transfer_is_not_found() {
        let (state, _) = state();
        let result = schedule_relay_task(
            &state,
            &RelayTaskRequest {
                confirmation_id: CONFIRMATION_ROOT.to_owned(),
                transfer_id: "0xmissing".to_owned(),
            },
        )
        .await;
        assert!(matches!(result, Err(ApiError::NotFound)));
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
        headers.insert(header::AUTHORIZATION, "Basic creds".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn error_statuses() {
        let unauthorized = ApiError::Bouncer(BouncerError::Unauthorized("bad".to_owned()));
        assert_eq!(
            unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        let forbidden = ApiError::Bouncer(BouncerError::Forbidden);
        assert_eq!(forbidden.into_response().status(), StatusCode::FORBIDDEN);
        let internal = ApiError::Internal("boom".to_owned());
        assert_eq!(
            internal.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
