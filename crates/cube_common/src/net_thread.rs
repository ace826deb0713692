//! The reactor thread: a dedicated OS thread running a single-threaded tokio
//! runtime plus a `LocalSet`, hosting every controller session and the
//! monitor HTTP task. The render loop never touches tokio directly -- it
//! only schedules futures here and, where it must wait, does so with a
//! bounded timeout.

use std::future::Future;
use std::pin::Pin;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::task::LocalSet;

use crate::prelude::*;

/// A boxed future queued onto the reactor's `LocalSet`.
pub type ReactorFuture<'state, Output = ()> = Pin<Box<dyn Future<Output = Output> + 'state>>;
/// A future factory function used to submit reactor tasks.
pub type ReactorFunction<State> =
    dyn for<'state> FnOnce(&'state Rc<RefCell<State>>) -> ReactorFuture<'state> + Send + 'static;

enum ReactorCommand<State> {
    Shutdown(AsyncOneshotSender<()>),
    RunInLocalSet(Box<ReactorFunction<State>>),
}

/// Trait implemented by the state object the reactor thread owns, e.g. the
/// controller registry.
pub trait ReactorState: 'static {
    /// Performs a clean shutdown of every resource owned by this state.
    fn shutdown(this: Rc<RefCell<Self>>) -> impl Future<Output = ()>;
}

/// Wraps a dedicated-thread tokio runtime, allowing the render loop to
/// schedule work onto it without becoming async itself.
pub struct NetThread<State> {
    name: String,
    thread: JoinHandle<()>,
    channel: AsyncUnboundedSender<ReactorCommand<State>>,
}

impl<State: ReactorState> NetThread<State> {
    /// Spawns the reactor thread and its tokio runtime, constructing `State` on the new thread.
    pub fn new(name: impl Into<String>, state: impl (FnOnce() -> State) + Send + 'static) -> Self {
        let name = name.into();
        let (tx, rx) = async_unbounded_channel();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .thread_name(name.clone())
            .build()
            .expect("could not initialize the reactor's tokio runtime");
        let thread_name = name.clone();
        let thread = std::thread::Builder::new()
            .name(thread_name)
            .stack_size(4 * 1024 * 1024)
            .spawn(move || Self::thread_main(runtime, rx, state))
            .expect("could not spawn the reactor thread");

        Self { name, thread, channel: tx }
    }

    /// The name given to this reactor thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the reactor thread is still alive and accepting commands.
    pub fn is_alive(&self) -> bool {
        !self.thread.is_finished() && !self.channel.is_closed()
    }

    /// Requests a clean shutdown and blocks until it completes, or `timeout` elapses.
    pub fn sync_shutdown(&self, timeout: Duration) {
        let (tx, rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = async_oneshot_channel();
        if self.channel.send(ReactorCommand::Shutdown(done_tx)).is_err() {
            return;
        }
        let _ = std::thread::Builder::new().name("reactor-shutdown-wait".into()).spawn(move || {
            let _ = done_rx.blocking_recv();
            let _ = tx.send(());
        });
        let _ = rx.recv_timeout(timeout);
    }

    /// Schedules a future on the reactor and returns a handle to its eventual result.
    pub fn schedule<
        F: (for<'state> FnOnce(&'state Rc<RefCell<State>>) -> ReactorFuture<'state, Result<Output>>) + Send + 'static,
        Output: Send + 'static,
    >(
        &self,
        function: F,
    ) -> AsyncResult<Output> {
        let (result, tx) = AsyncResult::new_pair();
        let queued = self.schedule_boxed(Box::new(move |state| {
            Box::pin(async move {
                let out = function(state).await;
                let _ = tx.send(out);
            })
        }));
        if let Err(e) = queued {
            return AsyncResult::new_err(anyhow!(e));
        }
        result
    }

    /// Non-generic form of [`Self::schedule`].
    pub fn schedule_boxed(&self, function: Box<ReactorFunction<State>>) -> Result<(), ReactorClosedError> {
        self.channel
            .send(ReactorCommand::RunInLocalSet(function))
            .map_err(|_| ReactorClosedError(self.name.clone()))
    }

    fn thread_main(
        runtime: tokio::runtime::Runtime,
        ctrl_rx: AsyncUnboundedReceiver<ReactorCommand<State>>,
        state: impl FnOnce() -> State,
    ) {
        let _span = tracing::info_span!("reactor").entered();
        runtime.block_on(async move {
            let local_set = LocalSet::new();
            local_set.run_until(Self::localset_main(ctrl_rx, state)).await;
        });
    }

    async fn localset_main(
        mut ctrl_rx: AsyncUnboundedReceiver<ReactorCommand<State>>,
        state: impl FnOnce() -> State,
    ) {
        let state = Rc::new(RefCell::new(state()));
        while let Some(cmd) = ctrl_rx.recv().await {
            match cmd {
                ReactorCommand::Shutdown(done) => {
                    ctrl_rx.close();
                    State::shutdown(state).await;
                    let _ = done.send(());
                    return;
                }
                ReactorCommand::RunInLocalSet(function) => {
                    function(&state).await;
                }
            }
        }
    }
}

/// Error returned when scheduling onto a reactor that has already shut down.
#[derive(Clone, Eq, PartialEq, Debug, thiserror::Error)]
#[error("reactor thread {0:?} has already terminated")]
pub struct ReactorClosedError(pub String);

#[cfg(test)]
mod test {
    use super::*;

    struct TestState(u32);

    impl ReactorState for TestState {
        async fn shutdown(_this: Rc<RefCell<Self>>) {}
    }

    #[test]
    fn schedule_runs_on_reactor_and_returns_value() {
        let net = NetThread::new("test-reactor", || TestState(7));
        let result = net.schedule(|state| {
            let value = state.borrow().0;
            Box::pin(async move { Ok(value * 2) })
        });
        assert_eq!(result.blocking_wait().unwrap(), 14);
        net.sync_shutdown(Duration::from_secs(1));
    }

    #[test]
    fn is_alive_false_after_shutdown() {
        let net = NetThread::new("test-reactor-2", || TestState(0));
        assert!(net.is_alive());
        net.sync_shutdown(Duration::from_secs(1));
        assert!(!net.is_alive());
    }
}
