//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build shared application state from configuration
//! - Create the Axum router with all handlers
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Run the session sweeper alongside the server
//! - Stop gracefully on the shutdown broadcast

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::routing::{any, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::error::ProxyResult;
use crate::http::handlers::{self, RENDER_PREFIX};
use crate::http::request::{request_id, MakeRequestUuid};
use crate::render::{HttpRenderer, Renderer};
use crate::rewrite::ContentRewriter;
use crate::session::{SessionStore, SessionSweeper};
use crate::target::{PathCodec, RouteKind};
use crate::upstream::Forwarder;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub sessions: Arc<SessionStore>,
    pub codec: Arc<PathCodec>,
    pub forwarder: Forwarder,
    pub rewriter: ContentRewriter,
    pub renderer: Option<Arc<dyn Renderer>>,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> ProxyResult<Self> {
        let sessions = Arc::new(SessionStore::new(&config.sessions));
        let codec = Arc::new(PathCodec::new(&config.codec));
        let forwarder = Forwarder::new(&config.upstream, &config.timeouts)?;
        let rewriter = ContentRewriter::new(codec.clone(), config.rewrite.clone());
        let renderer: Option<Arc<dyn Renderer>> = if config.render.enabled {
            Some(Arc::new(HttpRenderer::new(&config.render)?))
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            sessions,
            codec,
            forwarder,
            rewriter,
            renderer,
        })
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.config.render.timeout_secs)
    }
}

/// HTTP server for the rewriting proxy.
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> ProxyResult<Self> {
        Ok(Self {
            state: AppState::new(config)?,
        })
    }

    /// Replace the render collaborator (enables the render endpoints).
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.state.renderer = Some(renderer);
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.state.config
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        let config = &self.state.config;
        let navigation = format!("{}{{*rest}}", self.state.codec.prefix(RouteKind::Navigation));
        let asset = format!("{}{{*rest}}", self.state.codec.prefix(RouteKind::Asset));
        let render = format!("{RENDER_PREFIX}{{*rest}}");

        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id(request.headers()),
                )
            }))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        Router::new()
            .route(&navigation, any(handlers::proxy_handler))
            .route(&asset, any(handlers::proxy_handler))
            .route("/api/create-session", post(handlers::create_session))
            .route("/browse", get(handlers::browse))
            .route(&render, get(handlers::render_page))
            .route("/api/render", post(handlers::render_api))
            .fallback(handlers::fallback)
            .with_state(self.state.clone())
            .layer(middleware)
    }

    /// Run the server until the shutdown broadcast fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            strategy = ?self.state.codec.strategy(),
            render_enabled = self.state.renderer.is_some(),
            "HTTP server starting"
        );

        let sweeper = SessionSweeper::new(
            self.state.sessions.clone(),
            Duration::from_secs(self.state.config.sessions.sweep_interval_secs),
        );
        let sweeper_shutdown = shutdown.resubscribe();
        let sweeper_task = tokio::spawn(sweeper.run(sweeper_shutdown));

        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        let _ = sweeper_task.await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
