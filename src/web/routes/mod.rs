pub mod health;
pub mod report;

use super::AppState;
use axum::{routing::get, Router};

pub const REPORT_PATH: &str = "/send-report";

pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health::status))
        .route(
            REPORT_PATH,
            get(health::status)
                .post(report::submit)
                .fallback(report::method_not_allowed),
        )
}
