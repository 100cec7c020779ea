//! Change Notifier (C7): emits `CellChanged` events to downstream
//! observers (e.g. the autosave batcher). Delivery is fire-and-forget —
//! the coordinator never waits on an acknowledgement.

use crate::model::CellKind;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct CellChanged {
    pub sheet_id: Uuid,
    pub addr: String,
    pub version: u64,
    pub kind: CellKind,
    pub computed: String,
}

/// Thin wrapper around a `tokio::sync::broadcast` channel. A missing or
/// lagged receiver is not a coordinator-level error: `send` returning
/// `Err` (zero receivers) is intentionally ignored.
#[derive(Clone)]
pub struct ChangeNotifier {
    sender: tokio::sync::broadcast::Sender<CellChanged>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        ChangeNotifier { sender }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<CellChanged> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: CellChanged) {
        let _ = self.sender.send(event);
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        ChangeNotifier::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_receivers_does_not_panic() {
        let notifier = ChangeNotifier::new(16);
        notifier.publish(CellChanged {
            sheet_id: Uuid::new_v4(),
            addr: "A1".to_string(),
            version: 1,
            kind: CellKind::Number,
            computed: "10".to_string(),
        });
    }

    #[tokio::test]
    async fn subscriber_receives_event() {
        let notifier = ChangeNotifier::new(16);
        let mut rx = notifier.subscribe();
        notifier.publish(CellChanged {
            sheet_id: Uuid::new_v4(),
            addr: "A1".to_string(),
            version: 1,
            kind: CellKind::Number,
            computed: "10".to_string(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.addr, "A1");
    }
}
