use super::CancellationToken;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// The owning half of a one-shot, broadcast cancellation signal.
///
/// Each call owns exactly one source; it is never reused.
#[derive(Clone, Debug)]
pub struct CancellationSource {
    token: CancellationToken,
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationSource {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Creates a source that cancels itself once `deadline` elapses, unless
    /// it was cancelled earlier.
    ///
    /// Must be called from within a Tokio runtime. The timer does not keep
    /// the source alive.
    pub fn with_deadline(deadline: Duration) -> Self {
        let source = Self::new();
        let weak = Arc::downgrade(&source.token.inner);
        let mut signal = source.token.inner.signal.subscribe();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(deadline) => {
                    if let Some(inner) = weak.upgrade() {
                        tracing::debug!("Deadline of {:?} exceeded, cancelling", deadline);
                        let source = CancellationSource {
                            token: CancellationToken { inner },
                        };
                        source.cancel().await;
                    }
                }
                _ = async {
                    let _ = signal.wait_for(|cancelled| *cancelled).await;
                } => {}
            }
        });

        source
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.token.is_cancellation_requested()
    }

    /// Requests cancellation.
    ///
    /// The first call sets the flag and awaits every registered callback in
    /// registration order, so their side effects are complete when it
    /// returns. Later calls return immediately.
    pub async fn cancel(&self) {
        let callbacks = {
            let mut state = self.token.inner.state.lock();
            if state.fired {
                return;
            }
            state.fired = true;
            self.token.inner.requested.store(true, Ordering::Release);
            std::mem::take(&mut state.callbacks)
        };

        self.token.inner.signal.send_replace(true);

        for callback in callbacks {
            callback.run().await;
        }
    }
}
