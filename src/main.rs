mod config;
mod mailer;
mod relay;
mod report;
mod web;

use log::{error, info, warn};
use std::env;
use std::process::ExitCode;

use crate::config::{ConfigError, DeliveryConfig, Settings};
use crate::relay::Envelope;
use crate::web::Delivery;

fn load_delivery() -> Result<(Delivery, &'static str), ConfigError> {
    let config = DeliveryConfig::from_env()?;
    let envelope = Envelope::from_config(&config)?;
    let sender =
        mailer::build_sender(&config).map_err(|e| ConfigError::Provider(e.to_string()))?;
    let name = sender.name();
    Ok((Delivery { sender, envelope }, name))
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    info!("[main] report-relay starting, command={}", command);

    match command {
        "serve" => {
            let settings = match Settings::from_env() {
                Ok(s) => s,
                Err(e) => {
                    error!("[main] invalid settings: {}", e);
                    return ExitCode::FAILURE;
                }
            };

            let delivery = match load_delivery() {
                Ok((delivery, provider)) => {
                    info!(
                        "[main] delivering via {} from {} to {}",
                        provider, delivery.envelope.from, delivery.envelope.to
                    );
                    Ok(delivery)
                }
                Err(e) if settings.strict_startup => {
                    error!("[main] delivery configuration unusable: {}", e);
                    return ExitCode::FAILURE;
                }
                Err(e) => {
                    warn!(
                        "[main] delivery configuration unusable ({}); starting anyway, every report will fail with 500",
                        e
                    );
                    Err(e)
                }
            };

            let state = web::AppState::new(settings, delivery);
            if let Err(e) = web::start_server(state).await {
                error!("[main] server error: {}", e);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        "check-config" => {
            let settings = Settings::from_env();
            let delivery = load_delivery();
            match (&settings, &delivery) {
                (Ok(s), Ok((d, provider))) => {
                    println!(
                        "Settings OK: port={}, attachment_required={}",
                        s.listen_port, s.attachment_required
                    );
                    println!(
                        "Delivery OK: provider={}, from={}, to={}",
                        provider, d.envelope.from, d.envelope.to
                    );
                    ExitCode::SUCCESS
                }
                _ => {
                    if let Err(e) = &settings {
                        println!("Settings error: {}", e);
                    }
                    if let Err(e) = &delivery {
                        println!("Delivery error: {}", e);
                    }
                    ExitCode::FAILURE
                }
            }
        }
        other => {
            if other != "help" {
                error!("[main] unknown command: {}", other);
            }
            println!("report-relay - forwards problem reports with a photo by email");
            println!();
            println!("Usage:");
            println!("  report-relay serve         Start the HTTP relay");
            println!("  report-relay check-config  Validate configuration and exit");
            println!();
            println!("Environment variables:");
            println!("  LISTEN_PORT              HTTP port (default: 3000)");
            println!("  ALLOWED_ORIGINS          '*' or comma-separated CORS origins (default: *)");
            println!("  MAX_UPLOAD_MB            Photo size limit (default: 10)");
            println!("  SEND_TIMEOUT_SECS        Provider call timeout (default: 30)");
            println!("  ATTACHMENT_REQUIRED      Reject reports without a photo (default: true)");
            println!("  ATTACHMENT_MIME_PREFIXES Accepted photo types (default: image/)");
            println!("  SUBJECT_PREFIX           Subject before the location (default: 'New problem report: ')");
            println!("  STRICT_STARTUP           Refuse to start without delivery config (default: true)");
            println!("  FIELD_REPORTER_NAME, FIELD_LOCATION, FIELD_DESCRIPTION, FIELD_PHOTO");
            println!("                           Multipart field names of the report form");
            println!("  MAIL_PROVIDER            smtp or resend (default: smtp)");
            println!("  EMAIL_USER, EMAIL_PASS   SMTP login");
            println!("  SMTP_HOST, SMTP_PORT     SMTP server (default: smtp.gmail.com:465)");
            println!("  RESEND_API_KEY           Resend API key");
            println!("  EMAIL_FROM               Sender address (default: EMAIL_USER)");
            println!("  SENDER_NAME              Sender display name (default: Problem Reports)");
            println!("  EMAIL_RECEIVER           Recipient of every report");
            if other == "help" {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
