use std::fmt::Debug;
use std::fmt::Display;

use anyhow::Context;
use subscribe_api::configuration::get_configuration;
use subscribe_api::startup::Application;
use subscribe_api::telemetry::get_subscriber;
use subscribe_api::telemetry::init_subscriber;
use tokio::task::JoinError;

fn report_exit(
    name: &str,
    outcome: Result<Result<(), impl Debug + Display>, JoinError>,
) {
    match outcome {
        Ok(Ok(())) => {
            tracing::info!("{name} exited gracefully")
        }

        Ok(Err(e)) => {
            tracing::error!(
                error.cause_chain=?e,
                error.message=%e,
                "{name} failed (inner)"
            )
        }

        Err(e) => {
            tracing::error!(
                error.cause_chain=?e,
                error.message=%e,
                "{name} failed (outer)"
            )
        }
    }
}

/// Load config, initialise telemetry, and start the server
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cfg = get_configuration().context("Failed to read configuration")?;

    let subscriber = get_subscriber("subscribe-api", &cfg.application.log_level, std::io::stdout);
    init_subscriber(subscriber)?;

    if cfg.mailing_list.credentials().require().is_none() {
        tracing::warn!("mailing-list credentials missing; /api/subscribe will answer 500");
    }

    let app = Application::build(cfg)?;
    tracing::info!(port = app.port(), "listening");

    let server_thread = tokio::spawn(app.run_until_stopped());
    report_exit("API", server_thread.await);

    Ok(())
}
