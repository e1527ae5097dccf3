use anyhow::Context as _;
use referral_extract::Extractor;
use referral_intake_service::{AppState, ServiceConfig, build_router};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// JSON logs by default, human-readable with `LOG_FORMAT=pretty`
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "referral_intake_service=debug,referral_extract=debug,tower_http=debug".into()
    });

    match log_format.as_str() {
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let model = match config.extraction.build_model() {
        Ok(model) => model,
        Err(e) => {
            error!(error = %e, "Could not create the model client");
            std::process::exit(1);
        }
    };

    let extractor = Extractor::new(model);
    info!(model = %extractor.model_name(), "Model client ready");

    let app_state = AppState::new(extractor).context("Failed to compile page templates")?;
    let app = build_router(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    let addr = listener.local_addr()?;

    info!("Referral intake service listening on http://{}", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("JSON endpoints: POST http://{}/api/extract/text, /api/extract/image", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
