//! `POST /send-report`: intake, validation, relay, response.

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use log::info;
use uuid::Uuid;

use crate::relay::{self, ComposeOptions};
use crate::report::{self, ValidationPolicy};
use crate::web::errors::{ApiResponse, ReportError};
use crate::web::forms::collect_multipart;
use crate::web::AppState;

pub async fn submit(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ApiResponse>, ReportError> {
    let report_id = Uuid::new_v4();
    info!("[web] POST /send-report report={}", report_id);

    // Checked first so that an unconfigured relay answers 500 to everything.
    let delivery = match &*state.delivery {
        Ok(delivery) => delivery,
        Err(e) => return Err(ReportError::Configuration(e.clone())),
    };

    let multipart = multipart.map_err(|e| ReportError::MalformedBody(e.body_text()))?;
    let raw = collect_multipart(multipart).await?;

    let settings = &state.settings;
    let parsed = report::intake(raw, &settings.field_keys)?;
    let policy = ValidationPolicy {
        attachment_required: settings.attachment_required,
        mime_prefixes: settings.attachment_mime_prefixes.clone(),
    };
    let request = report::validate(parsed, &policy)?;

    info!(
        "[report] report={} accepted: name={}B location={}B description={}B attachment={}",
        report_id,
        request.reporter_name().len(),
        request.location().len(),
        request.description().len(),
        request
            .attachment()
            .map(|a| format!("{} ({} bytes)", a.filename, a.bytes.len()))
            .unwrap_or_else(|| "none".to_string())
    );

    let email = relay::compose(
        &request,
        &delivery.envelope,
        &ComposeOptions {
            subject_prefix: &settings.subject_prefix,
            report_id,
            received_at: Utc::now(),
        },
    )?;
    relay::deliver(
        delivery.sender.as_ref(),
        email,
        settings.send_timeout,
        report_id,
    )
    .await?;

    Ok(ApiResponse::ok("Report sent successfully!"))
}

pub async fn method_not_allowed(method: Method) -> Response {
    ReportError::MethodNotAllowed(method.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::{AllowedOrigins, ConfigError, Settings};
    use crate::mailer::testing::RecordingSender;
    use crate::mailer::EmailSender;
    use crate::relay::Envelope;
    use crate::web::errors::ApiResponse;
    use crate::web::{build_router, AppState, Delivery};

    const BOUNDARY: &str = "report-relay-test-boundary";
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    struct FilePart<'a> {
        field: &'a str,
        filename: &'a str,
        mime: &'a str,
        bytes: &'a [u8],
    }

    fn photo() -> FilePart<'static> {
        FilePart {
            field: "foto",
            filename: "foto.jpg",
            mime: "image/jpeg",
            bytes: JPEG,
        }
    }

    fn complete_fields() -> Vec<(&'static str, &'static str)> {
        vec![
            ("Nome do Relator", "Ana"),
            ("Endereço do Problema", "Rua X, 123"),
            ("Descrição do Problema", "Buraco na via"),
        ]
    }

    fn multipart_body(fields: &[(&str, &str)], files: &[FilePart<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        for file in files {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    BOUNDARY, file.field, file.filename, file.mime
                )
                .as_bytes(),
            );
            body.extend_from_slice(file.bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn post(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/send-report")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn app_with(settings: Settings, sender: &Arc<RecordingSender>) -> Router {
        let delivery = Delivery {
            sender: sender.clone() as Arc<dyn EmailSender>,
            envelope: Envelope {
                from: "Problem Reports <relay@example.com>".to_string(),
                to: "ops@example.com".to_string(),
            },
        };
        build_router(AppState::new(settings, Ok(delivery)))
    }

    fn app(sender: &Arc<RecordingSender>) -> Router {
        app_with(Settings::default(), sender)
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn envelope_of(value: Value) -> ApiResponse {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn complete_report_is_relayed_once() {
        let sender = Arc::new(RecordingSender::default());
        let (status, body) = call(
            app(&sender),
            post(multipart_body(&complete_fields(), &[photo()])),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body = envelope_of(body);
        assert!(body.success);
        assert!(!body.message.is_empty());

        let calls = sender.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].subject.contains("Rua X, 123"));
        assert_eq!(calls[0].to, "ops@example.com");
        assert_eq!(calls[0].attachments.len(), 1);
        assert_eq!(calls[0].attachments[0].filename, "foto.jpg");
        assert_eq!(calls[0].attachments[0].mime_type, "image/jpeg");
        assert_eq!(calls[0].attachments[0].bytes, JPEG);
    }

    #[tokio::test]
    async fn empty_description_is_rejected_without_sending() {
        let sender = Arc::new(RecordingSender::default());
        let fields = vec![
            ("Nome do Relator", "Ana"),
            ("Endereço do Problema", "Rua X, 123"),
            ("Descrição do Problema", ""),
        ];
        let (status, body) = call(app(&sender), post(multipart_body(&fields, &[photo()]))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!envelope_of(body).success);
        assert!(sender.calls().is_empty());
    }

    #[tokio::test]
    async fn each_missing_field_is_rejected_without_sending() {
        for skip in 0..3 {
            let sender = Arc::new(RecordingSender::default());
            let fields: Vec<_> = complete_fields()
                .into_iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, f)| f)
                .collect();
            let (status, body) =
                call(app(&sender), post(multipart_body(&fields, &[photo()]))).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "missing field #{}", skip);
            assert!(!envelope_of(body).success);
            assert!(sender.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn missing_photo_is_rejected_without_sending() {
        let sender = Arc::new(RecordingSender::default());
        let (status, body) =
            call(app(&sender), post(multipart_body(&complete_fields(), &[]))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!envelope_of(body).success);
        assert!(sender.calls().is_empty());
    }

    #[tokio::test]
    async fn untouched_file_input_counts_as_missing_photo() {
        let sender = Arc::new(RecordingSender::default());
        let empty = FilePart {
            field: "foto",
            filename: "",
            mime: "application/octet-stream",
            bytes: b"",
        };
        let (status, _) =
            call(app(&sender), post(multipart_body(&complete_fields(), &[empty]))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(sender.calls().is_empty());
    }

    #[tokio::test]
    async fn optional_photo_policy_relays_without_attachment() {
        let sender = Arc::new(RecordingSender::default());
        let settings = Settings {
            attachment_required: false,
            ..Settings::default()
        };
        let (status, _) = call(
            app_with(settings, &sender),
            post(multipart_body(&complete_fields(), &[])),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let calls = sender.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].attachments.is_empty());
        assert!(calls[0].html.contains("No photo was sent"));
    }

    #[tokio::test]
    async fn provider_failure_is_a_generic_500() {
        let sender = Arc::new(RecordingSender::failing(
            "535-5.7.8 Username and Password not accepted",
        ));
        let (status, body) = call(
            app(&sender),
            post(multipart_body(&complete_fields(), &[photo()])),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let raw = body.to_string();
        let body = envelope_of(body);
        assert!(!body.success);
        assert!(!raw.contains("535"));
        assert!(!raw.contains("Password"));
        assert_eq!(sender.calls().len(), 1);
    }

    #[tokio::test]
    async fn missing_delivery_config_answers_500_without_sending() {
        let state = AppState::new(
            Settings::default(),
            Err(ConfigError::Missing(vec!["EMAIL_USER".to_string()])),
        );
        for body in [
            multipart_body(&complete_fields(), &[photo()]),
            multipart_body(&[], &[]),
        ] {
            let (status, body) = call(build_router(state.clone()), post(body)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert!(!envelope_of(body).success);
        }
    }

    #[tokio::test]
    async fn identical_submissions_are_sent_twice() {
        let sender = Arc::new(RecordingSender::default());
        let router = app(&sender);
        for _ in 0..2 {
            let (status, _) = call(
                router.clone(),
                post(multipart_body(&complete_fields(), &[photo()])),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(sender.calls().len(), 2);
    }

    #[tokio::test]
    async fn health_check_has_no_side_effects() {
        let sender = Arc::new(RecordingSender::default());
        for uri in ["/", "/send-report"] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let (status, body) = call(app(&sender), request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "ok");
        }
        assert!(sender.calls().is_empty());
    }

    #[tokio::test]
    async fn other_methods_get_405_envelope() {
        let sender = Arc::new(RecordingSender::default());
        let request = Request::builder()
            .method("PUT")
            .uri("/send-report")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(app(&sender), request).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(!envelope_of(body).success);
    }

    #[tokio::test]
    async fn non_multipart_body_is_400() {
        let sender = Arc::new(RecordingSender::default());
        let request = Request::builder()
            .method("POST")
            .uri("/send-report")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"nome":"Ana"}"#))
            .unwrap();
        let (status, body) = call(app(&sender), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!envelope_of(body).success);
        assert!(sender.calls().is_empty());
    }

    #[tokio::test]
    async fn second_file_part_is_rejected() {
        let sender = Arc::new(RecordingSender::default());
        let (status, _) = call(
            app(&sender),
            post(multipart_body(&complete_fields(), &[photo(), photo()])),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(sender.calls().is_empty());
    }

    #[tokio::test]
    async fn non_image_attachment_is_rejected() {
        let sender = Arc::new(RecordingSender::default());
        let pdf = FilePart {
            field: "foto",
            filename: "report.pdf",
            mime: "application/pdf",
            bytes: b"%PDF-1.4",
        };
        let (status, _) =
            call(app(&sender), post(multipart_body(&complete_fields(), &[pdf]))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(sender.calls().is_empty());
    }

    #[tokio::test]
    async fn oversized_upload_is_413() {
        let sender = Arc::new(RecordingSender::default());
        let settings = Settings {
            max_upload_bytes: 1024,
            ..Settings::default()
        };
        let big = vec![0u8; 200 * 1024];
        let file = FilePart {
            bytes: &big,
            ..photo()
        };
        let (status, body) = call(
            app_with(settings, &sender),
            post(multipart_body(&complete_fields(), &[file])),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!envelope_of(body).success);
        assert!(sender.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_path_is_404_json() {
        let sender = Arc::new(RecordingSender::default());
        let request = Request::builder()
            .uri("/api/send-email")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(app(&sender), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn cors_allows_listed_origin() {
        let sender = Arc::new(RecordingSender::default());
        let settings = Settings {
            allowed_origins: AllowedOrigins::List(vec!["https://reports.example".to_string()]),
            ..Settings::default()
        };
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/send-report")
            .header(header::ORIGIN, "https://reports.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app_with(settings, &sender).oneshot(request).await.unwrap();

        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("https://reports.example")
        );
    }
}
