//! Per-chat mutual exclusion.

use std::sync::Arc;

use {
    dashmap::DashMap,
    tokio::sync::{Mutex, OwnedMutexGuard},
};

use codeglass_transcripts::ChatKey;

/// Async lock map serializing the load-mutate-save cycle per chat.
///
/// Entries are created on first use and kept for the process lifetime; the
/// set of chats a bot talks to is small enough that eviction is not worth
/// the bookkeeping.
#[derive(Default)]
pub struct ChatLocks {
    inner: DashMap<ChatKey, Arc<Mutex<()>>>,
}

impl ChatLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exchange lock for `key`, waiting behind any exchange
    /// already in flight for the same chat.
    pub async fn acquire(&self, key: &ChatKey) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(
            self.inner
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::time::Duration, tokio::time::timeout};

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = ChatLocks::new();
        let key = ChatKey::from(42);

        let guard = locks.acquire(&key).await;
        let second = timeout(Duration::from_millis(50), locks.acquire(&key)).await;
        assert!(second.is_err(), "second acquire must wait for the first");

        drop(guard);
        let third = timeout(Duration::from_millis(50), locks.acquire(&key)).await;
        assert!(third.is_ok(), "lock must be free after the guard drops");
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let locks = ChatLocks::new();

        let _a = locks.acquire(&ChatKey::from(1)).await;
        let b = timeout(Duration::from_millis(50), locks.acquire(&ChatKey::from(2))).await;
        assert!(b.is_ok());
    }
}
