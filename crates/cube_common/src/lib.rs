//! Shared rendering, fan-out and controller logic for the cube display: the
//! pieces that sit between the wire-level protocol definitions in
//! `cube_proto` and the CLI binary that wires them together.

pub mod controller;
pub mod fanout;
pub mod game_scene;
pub mod monitor_http;
pub mod net_thread;
pub mod prelude;
pub mod promises;
pub mod renderer;
pub mod scene;
pub mod sender_monitor;

pub use fanout::{CubeDims, FanOut};
pub use game_scene::{GameEntry, GameScene};
pub use renderer::{Renderer, RendererConfig};
pub use scene::{LcdWrites, Scene};
pub use sender_monitor::SenderMonitor;
