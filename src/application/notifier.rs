use tokio::sync::watch;

/// Revision counter bumped after every committed mutation.
#[derive(Debug)]
pub struct RefreshNotifier {
    sender: watch::Sender<u64>,
}

impl Default for RefreshNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshNotifier {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(0);
        Self { sender }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.sender.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.sender.borrow()
    }

    /// Publishes the next revision, with or without live subscribers.
    pub fn bump(&self) -> u64 {
        let mut published = 0;
        self.sender.send_modify(|revision| {
            *revision = revision.wrapping_add(1);
            published = *revision;
        });
        published
    }
}
