//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the banner, health and embedder routes
//! - Wire up the request pipeline (correlation, normalizer, performance)
//! - Apply timeout, body-limit and panic layers
//! - Bind to the listener and serve until shutdown
//!
//! # Layer order (outermost first)
//! ```text
//! correlation_middleware        id, start/completion logs
//!  └─ PropagateRequestIdLayer   echo id header on the response
//!      ├─ health routes         (TimeoutLayer only, no envelope)
//!      └─ normalize_middleware  envelope + single failure log
//!          └─ TimeoutLayer → RequestBodyLimitLayer → CatchPanicLayer
//!              └─ routes ── performance_middleware (route_layer) ── handler
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderName, Method, StatusCode, Uri};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::PropagateRequestIdLayer;
use tower_http::timeout::TimeoutLayer;

use crate::config::ServiceConfig;
use crate::error::ErrorReport;
use crate::health::{self, HealthAggregator, ProbeRegistry};
use crate::http::performance::performance_middleware;
use crate::http::request::{correlation_middleware, X_REQUEST_ID};
use crate::http::response::{normalize_middleware, panic_response};
use crate::observability::Logger;

/// Settings the pipeline middlewares read on every request.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub correlation_header: HeaderName,
    pub slow_threshold: Duration,
    pub production: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            correlation_header: HeaderName::from_bytes(
                config.request.correlation_header.as_bytes(),
            )
            .unwrap_or_else(|_| HeaderName::from_static(X_REQUEST_ID)),
            slow_threshold: Duration::from_millis(config.request.slow_threshold_ms),
            production: config.environment.production,
        }
    }
}

/// State injected into the pipeline middlewares and the banner.
#[derive(Clone)]
pub struct AppState {
    pub logger: Logger,
    pub settings: Arc<PipelineSettings>,
}

/// HTTP server for the service.
pub struct HttpServer {
    router: Router,
    config: Arc<ServiceConfig>,
    logger: Logger,
}

pub struct HttpServerBuilder {
    config: ServiceConfig,
    logger: Option<Logger>,
    routes: Option<Router>,
    probes: Option<ProbeRegistry>,
}

impl HttpServerBuilder {
    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Business routes, mounted under the global prefix inside the envelope.
    pub fn routes(mut self, routes: Router) -> Self {
        self.routes = Some(match self.routes.take() {
            Some(existing) => existing.merge(routes),
            None => routes,
        });
        self
    }

    /// Replace the stock probes.
    pub fn probes(mut self, registry: ProbeRegistry) -> Self {
        self.probes = Some(registry);
        self
    }

    pub fn build(self) -> HttpServer {
        let logger = self.logger.unwrap_or_else(Logger::disabled);
        let registry = self
            .probes
            .unwrap_or_else(|| ProbeRegistry::from_config(&self.config.health));
        let aggregator = Arc::new(HealthAggregator::new(
            registry,
            Duration::from_millis(self.config.health.probe_timeout_ms),
            logger.clone(),
        ));

        let state = AppState {
            logger: logger.clone(),
            settings: Arc::new(PipelineSettings::from_config(&self.config)),
        };

        let router = build_router(&self.config, state, aggregator, self.routes);
        HttpServer {
            router,
            config: Arc::new(self.config),
            logger,
        }
    }
}

impl HttpServer {
    pub fn builder(config: ServiceConfig) -> HttpServerBuilder {
        HttpServerBuilder {
            config,
            logger: None,
            routes: None,
            probes: None,
        }
    }

    /// Server with the stock probes and no business routes.
    pub fn new(config: ServiceConfig, logger: Logger) -> Self {
        Self::builder(config).logger(logger).build()
    }

    /// The fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires, then drain and flush logs.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            prefix = %self.config.request.global_prefix,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        self.logger.flush();
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
fn build_router(
    config: &ServiceConfig,
    state: AppState,
    aggregator: Arc<HealthAggregator>,
    routes: Option<Router>,
) -> Router {
    let prefix = config.request.global_prefix.trim_end_matches('/').to_string();
    let timeout = Duration::from_secs(config.request.timeout_secs);

    let root = if prefix.is_empty() { "/" } else { prefix.as_str() };
    let mut api = Router::new().route(root, get(banner));
    if !prefix.is_empty() {
        api = api.route(&format!("{prefix}/"), get(banner));
    }
    let mut api = api.with_state(state.clone());

    if let Some(routes) = routes {
        api = if prefix.is_empty() {
            api.merge(routes)
        } else {
            api.nest(&prefix, routes)
        };
    }

    let api = api
        .fallback(not_found)
        .route_layer(from_fn_with_state(state.clone(), performance_middleware))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(RequestBodyLimitLayer::new(config.request.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
        .layer(from_fn_with_state(state.clone(), normalize_middleware));

    let health = health::handlers::router(aggregator, &prefix)
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout));

    Router::new()
        .merge(health)
        .merge(api)
        .layer(PropagateRequestIdLayer::new(state.settings.correlation_header.clone()))
        .layer(from_fn_with_state(state, correlation_middleware))
}

async fn banner(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "message": format!("{} is running", env!("CARGO_PKG_NAME")),
        "data": {
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "environment": if state.settings.production { "production" } else { "development" },
        },
    }))
}

async fn not_found(method: Method, uri: Uri) -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    response.extensions_mut().insert(ErrorReport::http(
        StatusCode::NOT_FOUND,
        format!("Cannot {} {}", method, uri.path()),
    ));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, BusinessError, ErrorCode};
    use crate::health::{Probe, ProbeResult};
    use crate::http::request::CorrelationId;
    use crate::http::response::{ResponseEnvelope, GENERIC_ERROR_MESSAGE};
    use crate::observability::{CaptureSink, LevelFilter, LogLevel};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use axum::routing::post;
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct Up(&'static str);

    #[async_trait]
    impl Probe for Up {
        fn name(&self) -> &str {
            self.0
        }

        async fn check(&self) -> ProbeResult {
            ProbeResult::up(self.0)
        }
    }

    fn routes() -> Router {
        Router::new()
            .route(
                "/users/{id}",
                get(|| async { Err::<(), _>(BusinessError::user_not_found(None)) }),
            )
            .route(
                "/orders",
                post(|| async { Err::<(), AppError>(AppError::msg("orders table is locked")) }),
            )
            .route(
                "/balance",
                get(|| async {
                    Err::<(), _>(
                        BusinessError::new(ErrorCode::InsufficientBalance)
                            .with_status(StatusCode::OK),
                    )
                }),
            )
            .route("/whoami", get(|CorrelationId(id): CorrelationId| async move { id }))
            .route(
                "/wrapped",
                get(|| async {
                    Json(json!({"success": true, "code": 1000, "message": "custom", "data": 1}))
                }),
            )
            .route(
                "/refused",
                get(|| async { Json(json!({"success": false, "code": 4002, "data": {"x": 1}})) }),
            )
            .route("/panic", get(|| async { if true { panic!("kaboom") } }))
            .route("/empty", get(|| async { StatusCode::NO_CONTENT }))
    }

    fn server(production: bool) -> (Router, CaptureSink) {
        let sink = CaptureSink::new("capture", LevelFilter::at_least(LogLevel::Trace));
        let mut config = ServiceConfig::default();
        config.environment.production = production;
        let mut registry = ProbeRegistry::new();
        registry
            .register(Arc::new(Up("database")))
            .register(Arc::new(Up("cache")));

        let server = HttpServer::builder(config)
            .logger(Logger::from_sinks(vec![Box::new(sink.clone())]))
            .routes(routes())
            .probes(registry)
            .build();
        (server.router(), sink)
    }

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_banner_is_enveloped_with_generated_id() {
        let (app, sink) = server(false);
        let (status, headers, body) = call(app, get_req("/api")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["code"], 200);
        assert_eq!(body["data"]["service"], env!("CARGO_PKG_NAME"));

        let id = body["correlationId"].as_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(headers.get(X_REQUEST_ID).unwrap(), id);

        let logged: Vec<_> = sink
            .records()
            .iter()
            .filter_map(|r| r.context().and_then(|c| c.get("correlationId")).cloned())
            .collect();
        assert!(logged.len() >= 2);
        assert!(logged.iter().all(|v| v == id));
    }

    #[tokio::test]
    async fn test_inbound_id_is_kept_and_extractable() {
        let (app, _) = server(false);
        let req = Request::builder()
            .uri("/api/whoami")
            .header(X_REQUEST_ID, "trace-42")
            .body(Body::empty())
            .unwrap();
        let (_, headers, body) = call(app, req).await;
        assert_eq!(body["data"], "trace-42");
        assert_eq!(body["correlationId"], "trace-42");
        assert_eq!(headers.get(X_REQUEST_ID).unwrap(), "trace-42");
    }

    #[tokio::test]
    async fn test_business_error_envelope() {
        let (app, sink) = server(false);
        let (status, _, body) = call(app, get_req("/api/users/7")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], 2001);
        assert_eq!(body["message"], "user does not exist");
        assert!(body["data"].is_null());
        assert_eq!(body["path"], "/api/users/7");

        let errors: Vec<_> = sink
            .records()
            .into_iter()
            .filter(|r| r.level() == LogLevel::Error)
            .collect();
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn test_business_error_with_success_status_is_still_a_failure() {
        let (app, sink) = server(false);
        let (status, _, body) = call(app, get_req("/api/balance")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], 4002);
        assert_eq!(body["message"], "insufficient balance");
        assert!(body["data"].is_null());
        assert_eq!(body["path"], "/api/balance");
        assert!(body["timestamp"].as_i64().unwrap() > 0);

        let errors: Vec<_> = sink
            .records()
            .into_iter()
            .filter(|r| r.level() == LogLevel::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message().contains("insufficient balance"));
    }

    #[tokio::test]
    async fn test_handler_failure_envelope_drops_data() {
        let (app, _) = server(false);
        let (status, _, body) = call(app, get_req("/api/refused")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], 4002);
        assert!(body["data"].is_null());
        assert!(body["correlationId"].is_string());
    }

    #[tokio::test]
    async fn test_unexpected_error_redacted_in_production() {
        let (app, sink) = server(true);
        let req = Request::builder()
            .method("POST")
            .uri("/api/orders")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = call(app, req).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], 500);
        assert_eq!(body["message"], GENERIC_ERROR_MESSAGE);
        assert!(body.get("stack").is_none());

        let error = sink
            .records()
            .into_iter()
            .find(|r| r.level() == LogLevel::Error)
            .unwrap();
        assert!(error.message().contains("orders table is locked"));
        assert!(error.context().unwrap()["stack"].is_string());
    }

    #[tokio::test]
    async fn test_unexpected_error_message_visible_outside_production() {
        let (app, _) = server(false);
        let req = Request::builder()
            .method("POST")
            .uri("/api/orders")
            .body(Body::empty())
            .unwrap();
        let (_, _, body) = call(app, req).await;
        assert_eq!(body["message"], "orders table is locked");
    }

    #[tokio::test]
    async fn test_panic_becomes_500_envelope() {
        let (app, _) = server(false);
        let (status, _, body) = call(app, get_req("/api/panic")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("kaboom"));
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        let (app, _) = server(false);
        let (status, _, body) = call(app.clone(), get_req("/api/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 404);
        assert_eq!(body["message"], "Cannot GET /api/nope");

        let (status, _, body) = call(app, get_req("/api/orders")).await;
        assert!(status.is_client_error());
        assert_eq!(body["code"], status.as_u16());
        assert_eq!(body["success"], false);
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_existing_envelope_passes_through() {
        let (app, _) = server(false);
        let req = Request::builder()
            .uri("/api/wrapped")
            .header(X_REQUEST_ID, "abc")
            .body(Body::empty())
            .unwrap();
        let (_, _, body) = call(app, req).await;
        assert_eq!(body["code"], 1000);
        assert_eq!(body["message"], "custom");
        assert_eq!(body["correlationId"], "abc");
    }

    #[tokio::test]
    async fn test_no_content_passes_through() {
        let (app, _) = server(false);
        let response = app.oneshot(get_req("/api/empty")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_health_is_not_enveloped() {
        let (app, _) = server(false);
        let (status, headers, body) = call(app, get_req("/api/health/liveness")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body.get("success").is_none());
        assert!(headers.contains_key(X_REQUEST_ID));
    }

    #[tokio::test]
    async fn test_envelope_deserializes() {
        let (app, _) = server(false);
        let (_, _, body) = call(app, get_req("/api/")).await;
        let envelope: ResponseEnvelope = serde_json::from_value(body).unwrap();
        assert!(envelope.success);
        assert!(envelope.timestamp > 0);
    }
}
