//! The interface every game (and the game-selection meta-scene) implements.
//! Games are external collaborators: the renderer only knows this contract.

use cube_proto::raster::Raster;

/// Per-player LCD writes a scene wants committed this tick, keyed by DIP.
pub type LcdWrites = crate::prelude::HashMap<u16, Vec<(usize, usize, String)>>;

/// A renderable, controller-driven piece of display logic.
///
/// Implementations are expected to be cheap to poll every tick; anything
/// latency-sensitive (network calls, disk I/O) must be delegated to the
/// reactor via the registry and polled asynchronously.
pub trait Scene {
    /// Mutates `raster` for the current frame at time `t_seconds` (elapsed since scene start).
    fn render(&mut self, raster: &mut Raster, t_seconds: f64);

    /// Returns the LCD writes this scene wants committed this tick, if any.
    /// Called at the LCD refresh cadence, not every render tick.
    fn lcd_writes(&mut self) -> LcdWrites {
        Default::default()
    }

    /// Forwards one button edge from a player to the scene.
    fn on_button(&mut self, player_id: &str, button: crate::controller::Button, edge: crate::controller::Edge);

    /// Releases any resources held by this scene. Called exactly once, when the scene is
    /// replaced or the process shuts down.
    fn cleanup(&mut self) {}
}
