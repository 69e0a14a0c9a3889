use std::sync::Arc;

use tokio::sync::watch;

/// Revision counter published on every state transition. Subscribers wait
/// on `changed()` and then read whatever state they render.
#[derive(Clone, Debug)]
pub struct ChangeNotifier {
    sender: Arc<watch::Sender<u64>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (sender, _rx) = watch::channel(0);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn bump(&self) {
        self.sender.send_modify(|rev| *rev += 1);
    }

    pub fn revision(&self) -> u64 {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.sender.subscribe()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
