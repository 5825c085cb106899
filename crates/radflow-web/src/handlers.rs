//! HTTP处理器

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use radflow_core::{Action, ApiResponse};
use radflow_store::Dispatcher;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::metrics::ExecMetrics;

/// 处理器共享状态
#[derive(Clone)]
pub struct WebState {
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Arc<ExecMetrics>,
}

/// `/exec` 查询参数
#[derive(Debug, Deserialize)]
pub struct ExecParams {
    pub action: Option<String>,
}

/// 请求体为空时视为 `null`，否则必须是合法JSON
fn parse_body(body: &[u8]) -> Result<Value, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| format!("Invalid JSON body: {}", e))
}

/// 动作分发端点（GET/POST）
///
/// 无论成功与否都返回200和统一响应包，错误放在 `message` 中。
pub async fn exec(
    State(state): State<WebState>,
    Query(params): Query<ExecParams>,
    body: Bytes,
) -> Json<ApiResponse> {
    let started = Instant::now();

    let Some(action) = params.action.filter(|a| !a.is_empty()) else {
        warn!("Request without action parameter");
        return Json(ApiResponse::error("Missing action parameter"));
    };

    // 指标标签只使用已知动作名
    let label = action
        .parse::<Action>()
        .map(|a| a.as_str())
        .unwrap_or("unknown");

    let response = match parse_body(&body) {
        Ok(payload) => {
            debug!("Executing {} ({} bytes)", action, body.len());
            state.dispatcher.dispatch(&action, payload).await
        }
        Err(message) => {
            warn!("Rejected {} request: {}", action, message);
            ApiResponse::error(message)
        }
    };

    state
        .metrics
        .record(label, response.is_success(), started.elapsed());
    Json(response)
}

/// 健康检查处理器
pub async fn health(State(state): State<WebState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "lock_timeouts": state.dispatcher.lock().timeout_count(),
    }))
}

/// Prometheus指标处理器
pub async fn metrics(State(state): State<WebState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b"").unwrap(), Value::Null);
        assert_eq!(parse_body(b"  \n").unwrap(), Value::Null);
        assert_eq!(parse_body(br#"{"id":"ST-1"}"#).unwrap(), json!({"id": "ST-1"}));
        assert!(parse_body(b"{not json").unwrap_err().starts_with("Invalid JSON body"));
    }
}
