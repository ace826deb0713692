//! Owns every controller session, performs the startup `enum` handshake, and
//! exposes DIP-addressed lookups plus the SELECT-hold "restart" predicate.

use std::time::Duration;

use tokio::task::JoinHandle;

use super::session::{ButtonEdge, ControllerSession};
use crate::net_thread::{NetThread, ReactorState};
use crate::prelude::*;

/// How long SELECT must be held continuously to trigger a restart signal.
pub const SELECT_HOLD_TO_RESTART: Duration = Duration::from_secs(5);

/// One controller address entry from the configuration document.
#[derive(Clone, Debug)]
pub struct ControllerAddress {
    /// Hardware DIP id this entry describes.
    pub dip: u16,
    /// IP address of the controller's TCP server.
    pub ip: String,
    /// TCP port of the controller's TCP server.
    pub port: u16,
}

/// Reactor-side state: every live session plus its read/connect task handle.
pub struct RegistryReactorState {
    sessions: HashMap<u16, Rc<RefCell<ControllerSession>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ReactorState for RegistryReactorState {
    async fn shutdown(this: Rc<RefCell<Self>>) {
        let tasks = std::mem::take(&mut this.borrow_mut().tasks);
        for task in tasks {
            task.abort();
        }
    }
}

/// Render-thread-facing handle to the controller fleet.
pub struct Registry {
    net: NetThread<RegistryReactorState>,
    dips: Vec<u16>,
    player_dips: HashMap<String, u16>,
    button_rx: AsyncBoundedReceiver<ButtonEdge>,
}

impl Registry {
    /// Opens sessions for every configured address, dispatches the `enum`
    /// handshake to confirm each reports its expected DIP, and starts the
    /// reconnect loop for every address whether or not enumeration succeeded
    /// (a controller that is off at startup should still be retried).
    pub fn new(
        addresses: Vec<ControllerAddress>,
        controller_mapping: HashMap<u16, String>,
        connect_timeout: Duration,
        enum_timeout: Duration,
    ) -> Self {
        let (button_tx, button_rx) = async_bounded_channel(256);
        let dips: Vec<u16> = addresses.iter().map(|a| a.dip).collect();
        let player_dips: HashMap<String, u16> =
            controller_mapping.iter().map(|(dip, player_id)| (player_id.clone(), *dip)).collect();

        let net = NetThread::new("cube-controller-reactor", move || RegistryReactorState {
            sessions: HashMap::new(),
            tasks: Vec::new(),
        });

        for addr in addresses {
            let mapping = controller_mapping.clone();
            let button_tx = button_tx.clone();
            net.schedule_boxed(Box::new(move |state: &Rc<RefCell<RegistryReactorState>>| {
                let state = Rc::clone(state);
                Box::pin(async move {
                    let Some(player_id) = mapping.get(&addr.dip).cloned() else {
                        tracing::warn!(dip = addr.dip, "no player mapped to this controller DIP, skipping");
                        return;
                    };
                    let session = ControllerSession::new(addr.dip, addr.ip.clone(), addr.port, player_id, button_tx);
                    let run_handle = {
                        let session = Rc::clone(&session);
                        tokio::task::spawn_local(async move {
                            ControllerSession::run(session, connect_timeout).await;
                        })
                    };

                    {
                        let mut s = state.borrow_mut();
                        s.sessions.insert(addr.dip, Rc::clone(&session));
                        s.tasks.push(run_handle);
                    }

                    if let Some(reported) = ControllerSession::enumerate(&session, enum_timeout).await {
                        if reported != addr.dip {
                            tracing::warn!(
                                expected = addr.dip,
                                reported,
                                "controller reported a DIP different from its configured address, dropping"
                            );
                            state.borrow_mut().sessions.remove(&addr.dip);
                        }
                    }
                })
            }))
            .ok();
        }

        Self { net, dips, player_dips, button_rx }
    }

    /// Every configured DIP, in declaration order.
    pub fn dips(&self) -> &[u16] {
        &self.dips
    }

    /// The DIP mapped to a player role (e.g. `"P1"`), if that role is configured.
    pub fn dip_for_player(&self, player_id: &str) -> Option<u16> {
        self.player_dips.get(player_id).copied()
    }

    /// Drains every button edge that has arrived since the last call.
    /// Intended to be called once at the top of each render tick.
    pub fn poll_button_edges(&mut self) -> Vec<ButtonEdge> {
        let mut edges = Vec::new();
        while let Ok(edge) = self.button_rx.try_recv() {
            edges.push(edge);
        }
        edges
    }

    /// Whether `dip`'s SELECT button has been held continuously for at least
    /// [`SELECT_HOLD_TO_RESTART`] -- the "hold SELECT to exit" signal.
    pub fn restart_signal(&self, dip: u16) -> AsyncResult<bool> {
        self.net.schedule(move |state| {
            let state = Rc::clone(state);
            Box::pin(async move {
                let held = state
                    .borrow()
                    .sessions
                    .get(&dip)
                    .and_then(|s| s.borrow().select_held_for())
                    .map(|d| d >= SELECT_HOLD_TO_RESTART)
                    .unwrap_or(false);
                Ok(held)
            })
        })
    }

    /// Clears `dip`'s SELECT hold timer (e.g. after consuming a restart signal).
    pub fn clear_select_hold(&self, dip: u16) {
        let _ = self.net.schedule(move |state| {
            let state = Rc::clone(state);
            Box::pin(async move {
                if let Some(session) = state.borrow().sessions.get(&dip) {
                    session.borrow_mut().clear_select_hold();
                }
                Ok(())
            })
        });
    }

    /// Writes `text` at `(x,y)` into `dip`'s LCD back buffer and commits the diff.
    /// A no-op if the session is not currently connected -- never blocks the render tick.
    pub fn update_lcd(&self, dip: u16, writes: Vec<(usize, usize, String)>) -> AsyncResult<()> {
        self.net.schedule(move |state| {
            let state = Rc::clone(state);
            Box::pin(async move {
                let Some(session) = state.borrow().sessions.get(&dip).cloned() else {
                    return Ok(());
                };
                for (x, y, text) in &writes {
                    session.borrow_mut().write_lcd(*x, *y, text);
                }
                ControllerSession::commit(&session).await;
                Ok(())
            })
        })
    }

    /// Requests a clean shutdown of the reactor thread and every session's connection.
    pub fn shutdown(&self, timeout: Duration) {
        self.net.sync_shutdown(timeout);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn poll_button_edges_returns_empty_when_nothing_arrived() {
        let registry = Registry::new(Vec::new(), HashMap::new(), Duration::from_millis(50), Duration::from_millis(50));
        let mut registry = registry;
        assert!(registry.poll_button_edges().is_empty());
        registry.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn restart_signal_false_for_unknown_dip() {
        let registry = Registry::new(Vec::new(), HashMap::new(), Duration::from_millis(50), Duration::from_millis(50));
        assert!(!registry.restart_signal(99).blocking_wait().unwrap());
        registry.shutdown(Duration::from_secs(1));
    }
}
