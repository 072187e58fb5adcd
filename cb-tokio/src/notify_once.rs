use std::sync::Arc;

use tokio::sync::Semaphore;

/// The engine's shutdown signal: a notification delivered to every
/// consumer exactly once.
///
/// - Clone freely; every handle can both send and receive.
/// - A handle observes the signal at most once, but clones made *after*
///   the signal was sent still observe it (unlike
///   [`tokio::sync::broadcast`], late subscribers don't miss it).
/// - Sending more than once is harmless.
///
/// Internally this rides on a zero-permit [`Semaphore`]: [`acquire`] on
/// such a semaphore only returns once it has been closed, so closing it is
/// the send and the resulting [`AcquireError`] is the receive.
///
/// [`acquire`]: Semaphore::acquire
/// [`AcquireError`]: tokio::sync::AcquireError
#[derive(Debug)]
pub struct NotifyOnce {
    inner: Arc<Semaphore>,
    have_recved: bool,
}

impl NotifyOnce {
    /// Construct a new [`NotifyOnce`].
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let inner = Arc::new(Semaphore::new(0));
        Self {
            inner,
            have_recved: false,
        }
    }

    /// Send the signal, completing every outstanding and future call to
    /// [`recv`](NotifyOnce::recv).
    pub fn send(&self) {
        self.inner.close();
    }

    /// Wait for the signal.
    ///
    /// NOTE: If this handle has already observed the signal, _this future
    /// will never return!_ Background loops rely on this: their `select!`
    /// stops taking the shutdown branch after the first observation.
    pub async fn recv(&mut self) {
        if self.have_recved {
            // THIS FUTURE WILL NEVER RESOLVE
            std::future::pending().await
        } else {
            // wait for a signal
            self.inner
                .acquire()
                .await
                .map_err(|_| ())
                .expect_err("Shouldn't've been able to acquire a permit");
            // we've seen the signal; later calls on this handle won't
            // yield it again.
            self.have_recved = true;
        }
    }
}

impl Clone for NotifyOnce {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            // Every clone gets a chance to see the signal, even if the
            // original has already seen it.
            have_recved: false,
        }
    }
}
