use sheet_core::config::Config;
use sheet_core::coordinator::Coordinator;
use sheet_core::events::ChangeNotifier;
use sheet_core::http::{self, AppState};
use sheet_core::store::CellStore;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    info!(bind_addr = %config.bind_addr, "starting sheet-server");

    let store = Arc::new(CellStore::new());
    let notifier = ChangeNotifier::default();
    let coordinator = Arc::new(Coordinator::new(store.clone(), notifier.clone()));

    tokio::spawn(sheet_core::autosave::run(
        notifier.clone(),
        config.autosave.clone(),
    ));

    let app = http::router(AppState { store, coordinator });
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
