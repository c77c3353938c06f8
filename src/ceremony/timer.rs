use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// One cancellable deadline task.
///
/// Arming replaces (and aborts) any previous task, so at most one expiry
/// callback per timer is ever pending.
#[derive(Debug, Default)]
pub struct DeadlineTimer {
    handle: Option<JoinHandle<()>>,
}

impl DeadlineTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_expiry` after `after`, cancelling whatever was armed before.
    pub fn arm<F>(&mut self, after: Duration, on_expiry: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            on_expiry.await;
        }));
    }

    /// Abort the pending task, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Forget the pending task without aborting it.
    ///
    /// Used from inside the expiry callback itself, which must not abort
    /// its own task.
    pub fn disarm(&mut self) {
        self.handle.take();
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_deadline() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = DeadlineTimer::new();
        let counter = fired.clone();
        timer.arm(Duration::from_secs(600), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.is_armed());

        tokio::time::sleep(Duration::from_secs(599)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_cancels_previous() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = DeadlineTimer::new();
        for _ in 0..3 {
            let counter = fired.clone();
            timer.arm(Duration::from_secs(10), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_expiry() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = DeadlineTimer::new();
        let counter = fired.clone();
        timer.arm(Duration::from_secs(10), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        timer.cancel();
        assert!(!timer.is_armed());
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
