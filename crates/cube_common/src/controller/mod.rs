//! The controller fleet: per-device TCP sessions and the registry that owns them.

pub mod registry;
pub mod session;

pub use registry::{ControllerAddress, Registry, SELECT_HOLD_TO_RESTART};
pub use session::{Button, ButtonEdge, ConnectionState, ControllerSession, Edge};
