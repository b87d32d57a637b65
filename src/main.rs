use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use washbay::config::AppConfig;
use washbay::db;
use washbay::services::messaging::twilio::TwilioSmsNotifier;
use washbay::services::messaging::{LogNotifier, Notifier};
use washbay::services::sweeper;
use washbay::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let notifier: Arc<dyn Notifier> = if config.twilio_enabled() {
        tracing::info!("using Twilio SMS notifier (from: {})", config.twilio_phone_number);
        Arc::new(TwilioSmsNotifier::new(
            config.twilio_account_sid.clone(),
            config.twilio_auth_token.clone(),
            config.twilio_phone_number.clone(),
        ))
    } else {
        tracing::info!("Twilio not configured, notifications are logged only");
        Arc::new(LogNotifier)
    };

    let state = Arc::new(AppState::new(conn, config.clone(), notifier));

    let mut events = Box::pin(state.events.stream());
    let event_logger = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            tracing::info!(
                event = event.name(),
                booking_id = %event.booking().id,
                status = event.booking().status.as_str(),
                "lifecycle event"
            );
        }
    });

    let sweep_period = Duration::from_secs(config.sweep_interval_secs.max(1));
    tracing::info!(
        database = %config.database_url,
        sweep_secs = sweep_period.as_secs(),
        "washbay scheduler started"
    );
    let sweeper = tokio::spawn(sweeper::run_sweeper(state.clone(), sweep_period));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    sweeper.abort();
    event_logger.abort();

    Ok(())
}
