use super::CallContext;
use crate::error::MethodError;
use crate::wire::{FrameKind, Payload, Response, StatusCode};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Default)]
struct StreamQueue {
    items: VecDeque<Payload>,
    finished: bool,
}

enum Next {
    Item(Payload),
    Finished,
    Empty,
}

/// Buffer between the dispatcher, which pushes client stream items as
/// frames arrive, and the reader a handler pulls from.
#[derive(Default)]
pub(crate) struct ClientStreamState {
    queue: Mutex<StreamQueue>,
    notify: Notify,
}

impl ClientStreamState {
    pub(crate) fn receive(&self, item: Payload) {
        {
            let mut queue = self.queue.lock();
            if queue.finished {
                tracing::trace!("Dropping client stream item received after the end");
                return;
            }
            queue.items.push_back(item);
        }
        self.notify.notify_one();
    }

    /// Ends the stream. Items already buffered are still delivered.
    pub(crate) fn finish(&self) {
        self.queue.lock().finished = true;
        self.notify.notify_one();
    }

    /// Ends the stream and discards anything not yet read.
    pub(crate) fn abort(&self) {
        {
            let mut queue = self.queue.lock();
            queue.finished = true;
            queue.items.clear();
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Next {
        let mut queue = self.queue.lock();
        match queue.items.pop_front() {
            Some(item) => Next::Item(item),
            None if queue.finished => Next::Finished,
            None => Next::Empty,
        }
    }
}

/// Pull-based view of the messages a client streams into a call.
///
/// Every time the reader runs dry it grants the client one credit
/// (a `STREAM_CLIENT` frame without payload) and waits for the next item or
/// the end of the stream. `move_next` takes `&mut self`, so a reader has at
/// most one pending read.
pub struct ClientStreamReader<T = Payload> {
    context: CallContext,
    state: Arc<ClientStreamState>,
    current: Option<T>,
}

impl ClientStreamReader<Payload> {
    pub(crate) fn new(context: CallContext, state: Arc<ClientStreamState>) -> Self {
        Self {
            context,
            state,
            current: None,
        }
    }
}

impl<T> ClientStreamReader<T>
where
    T: DeserializeOwned,
{
    /// Advances to the next message.
    ///
    /// Resolves `Ok(true)` with the message available through
    /// [`current`](Self::current), or `Ok(false)` once the client ended the
    /// stream or the call was cancelled. A message that does not decode as
    /// `T` fails with `INVALID_ARGUMENT`.
    pub async fn move_next(&mut self) -> Result<bool, MethodError> {
        let mut credited = false;
        loop {
            match self.state.pop() {
                Next::Item(item) => {
                    let message = rmpv::ext::from_value::<T>(item).map_err(|err| {
                        MethodError::new(
                            StatusCode::InvalidArgument,
                            format!("Invalid stream message: {err}"),
                        )
                    })?;
                    self.current = Some(message);
                    return Ok(true);
                }
                Next::Finished => {
                    self.current = None;
                    return Ok(false);
                }
                Next::Empty => {}
            }

            if !credited {
                credited = true;
                self.request_next().await?;
            }

            self.state.notify.notified().await;
        }
    }

    /// Convenience over [`move_next`](Self::move_next) that hands out the
    /// message by value.
    pub async fn next_message(&mut self) -> Result<Option<T>, MethodError> {
        if self.move_next().await? {
            Ok(self.current.take())
        } else {
            Ok(None)
        }
    }

    async fn request_next(&self) -> Result<(), MethodError> {
        let credit = Response::new(
            self.context.id(),
            self.context.method(),
            FrameKind::StreamClient,
        );
        self.context
            .send(credit)
            .await
            .map_err(|err| MethodError::new(StatusCode::Unavailable, err.to_string()))
    }
}

impl<T> ClientStreamReader<T> {
    /// The message produced by the last successful `move_next`.
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn take_current(&mut self) -> Option<T> {
        self.current.take()
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// Reinterprets the remaining messages as `U`.
    pub fn cast<U>(self) -> ClientStreamReader<U> {
        ClientStreamReader {
            context: self.context,
            state: self.state,
            current: None,
        }
    }
}

impl<T> fmt::Debug for ClientStreamReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientStreamReader")
            .field("id", &self.context.id())
            .field("method", &self.context.method())
            .finish()
    }
}
