//! Voice relay entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use voice_relay_config::Settings;
use voice_relay_core::SystemClock;
use voice_relay_governor::RateGovernor;
use voice_relay_server::null::{AlwaysPermitted, NullEventSource, NullTransport};
use voice_relay_server::{create_router, Orchestrator};
use voice_relay_speaker::JsonPreferenceStore;
use voice_relay_tts::TtsClient;

#[derive(Parser)]
#[command(name = "voice-relay", version, about = "Voice-channel TTS relay bot")]
struct Cli {
    /// Environment name layered on top of config/default.yaml (e.g. "production").
    #[arg(long, env = "VOICE_RELAY_ENV")]
    env: Option<String>,

    /// Port the status HTTP surface listens on.
    #[arg(long, default_value = "8080", env = "STATUS_PORT")]
    status_port: u16,

    /// Path to the durable speaker-preferences JSON file. Defaults to the
    /// platform config directory.
    #[arg(long)]
    preferences_path: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Settings::load(cli.env.as_deref())?;
    init_tracing(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting voice relay");

    let clock = Arc::new(SystemClock::new());
    let governor = Arc::new(RateGovernor::new(
        clock.clone(),
        config.rate_limit.governor_rate_per_second,
        config.rate_limit.breaker_failure_threshold,
        config.rate_limit.breaker_recovery_s,
    ));
    let tts = Arc::new(TtsClient::new(governor, config.engine.sample_rate_hz));
    let preferences = Arc::new(JsonPreferenceStore::new(cli.preferences_path)?);

    // No live chat-platform gateway is wired in: the orchestrator is
    // generic over `EventSource`/`Transport`, and a real adapter would be
    // substituted here without touching the orchestrator itself.
    let event_source = Arc::new(NullEventSource);
    let transport = Arc::new(NullTransport);
    let permission_checker = Arc::new(AlwaysPermitted);

    let orchestrator = Arc::new(Orchestrator::new(
        config,
        clock,
        event_source,
        transport,
        tts,
        preferences,
        permission_checker,
    ));

    let app = create_router(orchestrator.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.status_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "status surface listening");

    let http_server = tokio::spawn(async move {
        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await
    });

    orchestrator.run().await?;
    http_server.abort();

    tracing::info!("voice relay shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("voice_relay={},tower_http=info", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
