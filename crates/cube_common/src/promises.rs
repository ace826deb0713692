//! Simple promise types for interacting with an operation completed on the reactor thread.

use crate::prelude::*;

/// Operations of [`AsyncResult`] that do not depend on the held result type.
#[allow(clippy::wrong_self_convention)]
pub trait GenericAsyncResult {
    /// Checks if the result is ready.
    #[must_use]
    fn is_ready(&mut self) -> bool;

    /// Waits for the result by blocking the current thread, wraps the error in a generic anyhow type.
    fn blocking_generic_wait(self: Box<Self>) -> Result<(), anyhow::Error>;
}

/// A result holder that can be awaited from another thread or time, used to bridge calls from
/// the render loop into the reactor thread and back.
#[derive(Debug)]
#[must_use]
pub enum AsyncResult<OkT: Send + 'static> {
    /// Not yet queried, or queried and not completed yet.
    Unresolved(AsyncOneshotReceiver<Result<OkT>>),
    /// Queried and completed.
    Resolved(Result<OkT>),
    /// Queried and the other end was dropped before sending.
    Aborted(anyhow::Error),
}

impl<OkT: Send + 'static> AsyncResult<OkT> {
    /// Constructs a new unresolved variant along with the channel used to resolve it.
    pub fn new_pair() -> (Self, AsyncOneshotSender<Result<OkT>>) {
        let (tx, rx) = async_oneshot_channel();
        (Self::Unresolved(rx), tx)
    }

    /// Constructs a pre-resolved successful variant.
    pub fn new_ok(val: OkT) -> Self {
        Self::Resolved(Ok(val))
    }

    /// Constructs a pre-resolved failed variant.
    pub fn new_err(err: anyhow::Error) -> Self {
        Self::Resolved(Err(err))
    }

    /// Checks if the result is available right now, returns a reference if it is.
    pub fn poll(&mut self) -> Option<Result<&OkT, &anyhow::Error>> {
        match self {
            Self::Unresolved(recv) => match recv.try_recv() {
                Ok(v) => {
                    *self = Self::Resolved(v);
                    let Self::Resolved(v) = self else { unreachable!() };
                    Some(v.as_ref())
                }
                Err(tokio::sync::oneshot::error::TryRecvError::Empty) => None,
                Err(e @ tokio::sync::oneshot::error::TryRecvError::Closed) => {
                    *self = Self::Aborted(anyhow::Error::from(e));
                    None
                }
            },
            Self::Resolved(val) => Some(val.as_ref()),
            Self::Aborted(err) => Some(Err(err)),
        }
    }

    /// Waits for the result by blocking the current thread. Do not use in async contexts.
    pub fn blocking_wait(self) -> Result<OkT> {
        match self {
            Self::Unresolved(chan) => match chan.blocking_recv() {
                Ok(v) => v,
                Err(e) => Err(anyhow::Error::from(e)),
            },
            Self::Resolved(val) => val,
            Self::Aborted(err) => Err(err),
        }
    }

    /// Waits for the result by awaiting the inner future, with a bound on how long to wait.
    pub async fn async_wait_timeout(self, timeout: std::time::Duration) -> Result<OkT> {
        match self {
            Self::Unresolved(chan) => match tokio::time::timeout(timeout, chan).await {
                Ok(Ok(v)) => v,
                Ok(Err(e)) => Err(anyhow::Error::from(e)),
                Err(_) => Err(anyhow!("timed out waiting for reactor response")),
            },
            Self::Resolved(val) => val,
            Self::Aborted(err) => Err(err),
        }
    }
}

impl<OkT: Send + 'static> GenericAsyncResult for AsyncResult<OkT> {
    fn is_ready(&mut self) -> bool {
        self.poll().is_some()
    }

    fn blocking_generic_wait(self: Box<Self>) -> Result<()> {
        self.blocking_wait().map(|_| ()).map_err(anyhow::Error::from)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolves_after_send() {
        let (mut r, tx) = AsyncResult::new_pair();
        assert!(!r.is_ready());
        tx.send(Ok(1i32)).unwrap();
        assert!(r.is_ready());
    }

    #[test]
    fn blocking_wait_returns_sent_value() {
        let (r, tx) = AsyncResult::new_pair();
        tx.send(Ok(42i32)).unwrap();
        assert_eq!(r.blocking_wait().unwrap(), 42);
    }

    #[tokio::test]
    async fn async_wait_timeout_fires_on_slow_response() {
        let (r, _tx) = AsyncResult::<i32>::new_pair();
        let result = r.async_wait_timeout(std::time::Duration::from_millis(10)).await;
        assert!(result.is_err());
    }
}
