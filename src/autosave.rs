//! Autosave batcher: the one downstream consumer of the Change Notifier
//! (C7) this crate ships. A thin collaborator (§1): it performs no
//! evaluation and holds no core state beyond the change log it drains.

use crate::config::AutosaveConfig;
use crate::events::{CellChanged, ChangeNotifier};
use tracing::{debug, info};

/// Runs until the notifier is dropped. Accumulates events until either
/// `batch_size` is reached or `interval_ms` elapses, whichever comes
/// first, then flushes the batch.
pub async fn run(notifier: ChangeNotifier, config: AutosaveConfig) {
    if !config.enabled {
        debug!("autosave disabled, batcher not started");
        return;
    }

    let mut rx = notifier.subscribe();
    let mut batch: Vec<CellChanged> = Vec::with_capacity(config.batch_size);
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(config.interval_ms));
    // The first tick fires immediately; skip it so the interval behaves
    // like a proper deadline rather than flushing an empty batch at t=0.
    ticker.tick().await;

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        batch.push(event);
                        if batch.len() >= config.batch_size {
                            flush(&mut batch);
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "autosave batcher lagged behind change notifier");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = ticker.tick() => {
                flush(&mut batch);
            }
        }
    }
}

fn flush(batch: &mut Vec<CellChanged>) {
    if batch.is_empty() {
        return;
    }
    info!(count = batch.len(), "autosave flush");
    batch.clear();
}
