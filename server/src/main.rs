use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use clap::Parser;
use presence_server::config::{generate_config_template, Cli, Config};
use presence_server::store::SqliteStore;
use presence_server::{db, routes, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Handle --generate-config: print template and exit
    if cli.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    let config = Config::load(&cli)?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("presence_server=info,tower_http=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(env_filter).init();
    }

    tracing::info!("Presence server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = db::init_db(&config.data_dir)?;
    let store = Arc::new(SqliteStore::new(db));

    tracing::info!(
        announce_offline = config.realtime.announce_offline,
        reject_empty_messages = config.realtime.reject_empty_messages,
        "Realtime layer configured"
    );

    let app_state = state::AppState::new(config.realtime.clone(), store.clone(), store);
    let app = routes::build_router(app_state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
