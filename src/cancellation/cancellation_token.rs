use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

pub(crate) enum CancelCallback {
    Sync(Box<dyn FnOnce() + Send>),
    Async(Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>),
}

impl CancelCallback {
    pub(crate) async fn run(self) {
        match self {
            CancelCallback::Sync(callback) => callback(),
            CancelCallback::Async(callback) => callback().await,
        }
    }
}

pub(crate) struct CancellationState {
    pub(crate) fired: bool,
    pub(crate) callbacks: Vec<CancelCallback>,
}

pub(crate) struct CancellationInner {
    pub(crate) requested: AtomicBool,
    pub(crate) state: Mutex<CancellationState>,
    pub(crate) signal: watch::Sender<bool>,
}

/// The read-only half of a cancellation signal, handed to handlers.
///
/// Cancellation is a signal, not an interruption: a handler stops only when it
/// observes [`is_cancellation_requested`](Self::is_cancellation_requested),
/// awaits [`cancelled`](Self::cancelled), or when a registered callback
/// performs some compensating action.
#[derive(Clone)]
pub struct CancellationToken {
    pub(crate) inner: Arc<CancellationInner>,
}

impl CancellationToken {
    pub(crate) fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            inner: Arc::new(CancellationInner {
                requested: AtomicBool::new(false),
                state: Mutex::new(CancellationState {
                    fired: false,
                    callbacks: Vec::new(),
                }),
                signal,
            }),
        }
    }

    /// Monotone: once `true`, stays `true`.
    pub fn is_cancellation_requested(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    /// Registers a callback to run once, in registration order, when
    /// cancellation fires.
    ///
    /// If cancellation already fired the callback runs immediately on the
    /// calling thread.
    pub fn register<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.fired {
            drop(state);
            callback();
            return;
        }
        state.callbacks.push(CancelCallback::Sync(Box::new(callback)));
    }

    /// Registers an asynchronous callback. The canceller awaits it before
    /// running the next callback.
    ///
    /// If cancellation already fired the callback is spawned onto the current
    /// Tokio runtime.
    pub fn register_async<F, Fut>(&self, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.fired {
            drop(state);
            tokio::spawn(callback());
            return;
        }
        state
            .callbacks
            .push(CancelCallback::Async(Box::new(move || -> BoxFuture<'static, ()> {
                Box::pin(callback())
            })));
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut signal = self.inner.signal.subscribe();
        let _ = signal.wait_for(|cancelled| *cancelled).await;
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("is_cancellation_requested", &self.is_cancellation_requested())
            .finish()
    }
}
