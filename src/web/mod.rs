pub mod errors;
mod forms;
mod routes;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use log::{info, warn};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::{AllowedOrigins, ConfigError, Settings};
use crate::mailer::EmailSender;
use crate::relay::Envelope;
use crate::web::errors::json_error;

// ── Shared State ──

/// Built once at startup and only read afterwards.
pub struct Delivery {
    pub sender: Arc<dyn EmailSender>,
    pub envelope: Envelope,
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// `Err` when the process was allowed to start without a usable
    /// delivery configuration; every submission then fails with 500.
    pub delivery: Arc<Result<Delivery, ConfigError>>,
}

impl AppState {
    pub fn new(settings: Settings, delivery: Result<Delivery, ConfigError>) -> Self {
        AppState {
            settings: Arc::new(settings),
            delivery: Arc::new(delivery),
        }
    }
}

// ── Server ──

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.settings.body_limit();
    let cors = cors_layer(&state.settings.allowed_origins);

    Router::new()
        .merge(routes::report_routes())
        .fallback(handle_not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    match origins {
        AllowedOrigins::Any => layer.allow_origin(Any),
        AllowedOrigins::List(list) => {
            let values: Vec<HeaderValue> = list
                .iter()
                .filter_map(|o| match o.parse::<HeaderValue>() {
                    Ok(v) => Some(v),
                    Err(_) => {
                        warn!("[web] ignoring invalid CORS origin {:?}", o);
                        None
                    }
                })
                .collect();
            layer.allow_origin(AllowOrigin::list(values))
        }
    }
}

pub async fn start_server(state: AppState) -> std::io::Result<()> {
    let port = state.settings.listen_port;

    info!("[web] initializing report relay on port {}", port);
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("[web] listening on {}", addr);
    axum::serve(listener, app).await
}

async fn handle_not_found(uri: Uri) -> Response {
    let message = format!("No route exists at {}", uri.path());
    json_error(StatusCode::NOT_FOUND, &message)
}
