//! Web服务器

use axum::{
    routing::get,
    Router,
};
use radflow_core::Result;
use std::future::Future;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::handlers::{exec, health, metrics, WebState};

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: WebState) -> Self {
        Self {
            addr,
            app: Self::create_app(state),
        }
    }

    /// 构建路由（测试中直接使用）
    pub fn create_app(state: WebState) -> Router {
        Router::new()
            // 动作分发，GET与POST等价
            .route("/exec", get(exec).post(exec))

            // 健康检查
            .route("/health", get(health))

            // 监控指标
            .route("/metrics", get(metrics))
            .with_state(state)

            // 全局中间件
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(
                        CorsLayer::new()
                            .allow_origin(Any)
                            .allow_methods(Any)
                            .allow_headers(Any),
                    ),
            )
    }

    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Web server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ExecMetrics;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use radflow_core::ApiResponse;
    use radflow_store::{AdminSeed, AdvisoryLock, Dispatcher, ObjectStoreBackend, RowStore};
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> (Router, WebState) {
        let backend = Arc::new(ObjectStoreBackend::in_memory());
        let (store, _) = RowStore::open(backend, &AdminSeed::default()).await.unwrap();
        let state = WebState {
            dispatcher: Arc::new(Dispatcher::new(Arc::new(store), AdvisoryLock::default())),
            metrics: Arc::new(ExecMetrics::new().unwrap()),
        };
        (WebServer::create_app(state.clone()), state)
    }

    async fn send(app: Router, request: Request<Body>) -> ApiResponse {
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(action: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/exec?action={}", action))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_all_data_via_get() {
        let (app, _) = app().await;
        let request = Request::builder()
            .uri("/exec?action=getAllData")
            .body(Body::empty())
            .unwrap();
        let response = send(app, request).await;
        assert!(response.is_success());
        let data = response.data.unwrap();
        assert_eq!(data["users"].as_array().unwrap().len(), 1);
        assert!(data["patients"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_patient_via_post() {
        let (app, state) = app().await;
        let response = send(
            app,
            post("createPatient", &json!({"full_name": "Ahmed Khaled"}).to_string()),
        )
        .await;
        assert!(response.is_success());
        assert!(response.data.unwrap()["id"].as_str().unwrap().starts_with("PT-"));
        assert_eq!(state.metrics.request_count("createPatient", true), 1);
    }

    #[tokio::test]
    async fn test_errors_use_envelope() {
        let (app, state) = app().await;

        let unknown = send(app.clone(), post("dropTables", "{}")).await;
        assert_eq!(unknown.message.as_deref(), Some("Unknown action: dropTables"));

        let bad_json = send(app.clone(), post("createPatient", "{oops")).await;
        assert!(bad_json.message.unwrap().starts_with("Invalid JSON body"));

        let missing = Request::builder().uri("/exec").body(Body::empty()).unwrap();
        let missing = send(app, missing).await;
        assert_eq!(missing.message.as_deref(), Some("Missing action parameter"));

        assert_eq!(state.metrics.request_count("unknown", false), 1);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let (app, _) = app().await;
        let health = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let metrics = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(metrics.status(), StatusCode::OK);
    }
}
