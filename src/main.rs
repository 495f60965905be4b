use anyhow::Context;
use p2p_escrow::{api, config::Config, db::init_db, FsProofStore, Repository, SqliteDirectory};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("Configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("Failed to initialize database at {}", config.database_path))?;

    let repo = Arc::new(Repository::new(pool));
    let directory = Arc::new(SqliteDirectory::new(repo.clone()));
    let proofs = Arc::new(FsProofStore::new(
        config.upload_path.clone(),
        config.max_proof_bytes,
    ));

    tracing::info!(
        escrow_mode = %config.escrow_mode,
        swap_rate = %config.swap_btc_usdt_rate,
        demo_balance = config.allow_demo_balance,
        "Ledger configured"
    );

    let state = api::AppState::new(repo, config, directory, proofs)?;
    let app = api::create_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
