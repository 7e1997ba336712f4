use std::net::SocketAddr;

use tokio::net::TcpListener;

use chatd::config::{generate_config_template, Config};
use chatd::state::AppState;
use chatd::store::Store;
use chatd::ws::ConnectionRegistry;
use chatd::{auth, routes, users};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "chatd=info".parse().expect("valid default filter")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "chatd=info".parse().expect("valid default filter")),
            )
            .init();
    }

    tracing::info!("chatd v{} starting", env!("CARGO_PKG_VERSION"));

    // Load the snapshot (or start empty) and the JWT signing key
    let store = Store::open(&config.data_dir)?;
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    let state = AppState {
        store: store.clone(),
        registry: ConnectionRegistry::new(),
        jwt_secret,
    };

    // Background duplicate-user sweep, serialized with mutations by the
    // store lock.
    tokio::spawn(users::sweep::run(store, config.dedup_interval_secs));

    let app = routes::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
