use axum::Json;
use log::debug;
use serde::Serialize;

#[derive(Serialize)]
pub struct StatusResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

pub async fn status() -> Json<StatusResponse> {
    debug!("[web] GET health check");
    Json(StatusResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}
