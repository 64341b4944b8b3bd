pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod entities;
pub mod services;
pub mod state;

pub use config::Config;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    config.validate()?;

    init_logging(&config);

    let cli = cli::Cli::parse();

    match cli.command.unwrap_or(cli::Commands::Serve) {
        cli::Commands::Serve => serve(config).await,

        cli::Commands::CreateUser {
            username,
            password,
            admin,
        } => cmd_create_user(config, &username, &password, admin).await,

        cli::Commands::Init => {
            Config::create_default_if_missing()?;
            println!("Config file ready. Edit config.toml and run again.");
            Ok(())
        }
    }
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(
        "Spellcheckd v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let port = config.server.port;

    let state = api::create_app_state_from_config(config).await?;
    let app = api::router(state).await;

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => tracing::error!("Error listening for shutdown: {}", e),
    }
}

async fn cmd_create_user(
    config: Config,
    username: &str,
    password: &str,
    admin: bool,
) -> anyhow::Result<()> {
    api::validation::validate_username(username).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    api::validation::validate_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let store = db::Store::new(&config.general.database_path).await?;

    match store
        .create_user(username, password, admin, &config.security)
        .await?
    {
        Some(user) => {
            println!(
                "Created user '{}'{}",
                user.username,
                if user.is_admin { " (admin)" } else { "" }
            );
            Ok(())
        }
        None => anyhow::bail!("Username '{}' is already taken", username),
    }
}
