use std::sync::Arc;

use futures::StreamExt;

use crosspost::config::Config;
use crosspost::dialog::Navigator;
use crosspost::media::MediaStaging;
use crosspost::networks::default_dispatcher;
use crosspost::transport::{TelegramTransport, Transport};
use secrecy::ExposeSecret;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config_path =
        std::env::var("CROSSPOST_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Arc::new(Config::load(&config_path).await.unwrap_or_else(|e| {
        eprintln!("Error: failed to load {config_path}: {e}");
        std::process::exit(1);
    }));

    eprintln!("📣 crosspost v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Config: {config_path}");
    eprintln!("   Profiles: {}", config.profile_names().join(", "));
    eprintln!(
        "   Admins: {}",
        if config.admins.iter().any(|a| a == "*") {
            "everyone".to_string()
        } else if config.admins.is_empty() {
            "none (deny all)".to_string()
        } else {
            config.admins.join(", ")
        }
    );
    eprintln!("   Media dir: {}\n", config.media_dir.display());

    // Staged media does not survive restarts; start from a clean root.
    let staging = Arc::new(MediaStaging::new(config.media_dir.clone()));
    staging.sweep().await?;

    let dispatcher = default_dispatcher(config.bot_token.expose_secret().to_string());
    let transport = Arc::new(TelegramTransport::new(&config.bot_token));

    let navigator = Arc::new(Navigator::new(
        Arc::clone(&config),
        staging,
        dispatcher,
        Arc::clone(&transport) as Arc<dyn Transport>,
    ));

    let mut events = transport.start().await?;
    while let Some(event) = events.next().await {
        navigator.handle_event(event).await;
    }

    Ok(())
}
