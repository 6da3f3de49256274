use std::sync::OnceLock;

use tokio::sync::watch;

/// A write-once value that any number of tasks can await.
///
/// Each resolution step of an entity publishes its outcome through one of
/// these. Once fulfilled, reads go straight to the stored value without
/// locking. Waiting never fails: a promise that is never fulfilled blocks its
/// waiters forever.
#[derive(Debug)]
pub struct Promise<T> {
    value: OnceLock<T>,
    ready: watch::Sender<bool>,
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            value: OnceLock::new(),
            ready,
        }
    }

    /// Publishes the value and wakes every waiter. Returns `false` (and keeps
    /// the first value) if the promise was already fulfilled.
    pub fn fulfill(&self, value: T) -> bool {
        if self.value.set(value).is_err() {
            return false;
        }
        self.ready.send_replace(true);
        true
    }

    pub fn get(&self) -> Option<&T> {
        self.value.get()
    }

    pub fn is_fulfilled(&self) -> bool {
        self.value.get().is_some()
    }

    pub async fn wait(&self) -> &T {
        if let Some(value) = self.value.get() {
            return value;
        }
        let mut rx = self.ready.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
        match self.value.get() {
            Some(value) => value,
            None => std::future::pending().await,
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_waiters_observe_first_value() {
        let promise = Arc::new(Promise::<u32>::new());
        let waiter = {
            let promise = Arc::clone(&promise);
            tokio::spawn(async move { *promise.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(promise.fulfill(7));
        assert!(!promise.fulfill(8));

        assert_eq!(waiter.await.unwrap(), 7);
        assert_eq!(promise.get(), Some(&7));
    }

    #[test]
    fn test_wait_after_fulfill_is_immediate() {
        let promise = Promise::new();
        promise.fulfill("ready".to_string());
        assert_eq!(tokio_test::block_on(promise.wait()), "ready");
    }

    #[tokio::test]
    async fn test_unfulfilled_promise_blocks() {
        let promise = Promise::<()>::new();
        let waited = tokio::time::timeout(Duration::from_millis(20), promise.wait()).await;
        assert!(waited.is_err());
        assert!(!promise.is_fulfilled());
    }
}
