//! The render tick: owns the world raster and the active scene, drives the
//! fan-out every frame, and pushes LCD refreshes to the controller registry
//! at a slower, independent cadence.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cube_proto::raster::Raster;

use crate::controller::registry::Registry;
use crate::fanout::FanOut;
use crate::scene::Scene;
use crate::sender_monitor::SenderMonitor;

/// Tuning knobs the renderer needs that do not belong to any one component.
pub struct RendererConfig {
    /// Target ticks per second.
    pub frame_rate: u32,
    /// Minimum gap between LCD refresh passes.
    pub lcd_interval: Duration,
    /// How long to wait for the reactor thread to join on shutdown.
    pub reactor_join_timeout: Duration,
}

/// Owns the world raster, the fan-out, the sender monitor, the controller
/// registry and the active scene, and drives them all at a fixed cadence.
pub struct Renderer {
    raster: Raster,
    fanout: FanOut,
    monitor: Arc<SenderMonitor>,
    registry: Rc<RefCell<Registry>>,
    scene: Box<dyn Scene>,
    config: RendererConfig,
    ready: Arc<AtomicBool>,
    last_lcd_update: Instant,
    start: Instant,
}

impl Renderer {
    /// Wires together an already-constructed raster, fan-out, monitor, registry and scene.
    ///
    /// `registry` is shared with whatever constructed `scene` (e.g. the game-selection
    /// meta-scene needs it to poll the "hold SELECT to exit" signal), hence the `Rc<RefCell<_>>`.
    /// `monitor` is shared with the monitor HTTP surface the same way, hence the `Arc`.
    pub fn new(
        raster: Raster,
        fanout: FanOut,
        monitor: Arc<SenderMonitor>,
        registry: Rc<RefCell<Registry>>,
        scene: Box<dyn Scene>,
        config: RendererConfig,
    ) -> Self {
        fanout.register_endpoints(&monitor);
        let now = Instant::now();
        Self {
            raster,
            fanout,
            monitor,
            registry,
            scene,
            config,
            ready: Arc::new(AtomicBool::new(false)),
            last_lcd_update: now,
            start: now,
        }
    }

    /// A flag that flips to `true` once the first tick has completed, shared with the
    /// monitor HTTP surface's `/healthz` handler.
    pub fn readiness_flag(&self) -> Arc<AtomicBool> {
        self.ready.clone()
    }

    /// Runs the tick loop until `should_stop` reports true, checked once per tick boundary.
    ///
    /// On exit, calls the scene's `cleanup()` and joins the reactor thread with the
    /// configured bounded timeout.
    pub fn run(mut self, mut should_stop: impl FnMut() -> bool) {
        let period = Duration::from_secs_f64(1.0 / self.config.frame_rate.max(1) as f64);
        let _span = tracing::info_span!("render loop", frame_rate = self.config.frame_rate).entered();

        while !should_stop() {
            let tick_start = Instant::now();
            self.tick(tick_start);
            self.ready.store(true, Ordering::Relaxed);

            let elapsed = tick_start.elapsed();
            if elapsed < period {
                std::thread::sleep(period - elapsed);
            } else if elapsed > period {
                self.monitor.report_frame_miss();
                tracing::debug!(?elapsed, ?period, "render tick missed its deadline");
            }
        }

        self.scene.cleanup();
        self.registry.borrow().shutdown(self.config.reactor_join_timeout);
    }

    fn tick(&mut self, now: Instant) {
        for edge in self.registry.borrow_mut().poll_button_edges() {
            self.scene.on_button(&edge.player_id, edge.button, edge.edge);
        }

        let t_seconds = now.duration_since(self.start).as_secs_f64();
        self.scene.render(&mut self.raster, t_seconds);

        self.fanout.emit(&self.raster, &self.monitor);
        self.monitor.report_frame();

        if now.duration_since(self.last_lcd_update) >= self.config.lcd_interval {
            self.last_lcd_update = now;
            for (dip, writes) in self.scene.lcd_writes() {
                // Fire-and-forget: the registry schedules this on the reactor thread and
                // we never block the render tick waiting on it.
                let _ = self.registry.borrow().update_lcd(dip, writes);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use cube_proto::layout::CubeLayout;
    use cube_proto::raster::Orientation;

    use super::*;
    use crate::controller::{Button, Edge};
    use crate::fanout::CubeDims;
    use crate::scene::LcdWrites;

    struct CountingScene {
        renders: Arc<AtomicUsize>,
    }

    impl Scene for CountingScene {
        fn render(&mut self, _raster: &mut Raster, _t_seconds: f64) {
            self.renders.fetch_add(1, Ordering::SeqCst);
        }

        fn lcd_writes(&mut self) -> LcdWrites {
            Default::default()
        }

        fn on_button(&mut self, _player_id: &str, _button: Button, _edge: Edge) {}
    }

    #[test]
    fn run_stops_after_requested_tick_count_and_renders_that_many_times() {
        let raster = Raster::new(2, 2, 2, Orientation::default());
        let cube = CubeLayout { grid_position: (0, 0, 0), routes: vec![] };
        let fanout = FanOut::new(vec![cube], CubeDims { width: 2, height: 2, length: 2 }).unwrap();
        let monitor = Arc::new(SenderMonitor::new(Duration::from_secs(30), 60));
        let registry = Rc::new(RefCell::new(Registry::new(
            Vec::new(),
            Default::default(),
            Duration::from_millis(50),
            Duration::from_millis(50),
        )));
        let renders = Arc::new(AtomicUsize::new(0));
        let scene = Box::new(CountingScene { renders: renders.clone() });
        let config = RendererConfig {
            frame_rate: 200,
            lcd_interval: Duration::from_millis(100),
            reactor_join_timeout: Duration::from_secs(1),
        };
        let renderer = Renderer::new(raster, fanout, monitor, registry, scene, config);

        let mut remaining = 5;
        renderer.run(move || {
            if remaining == 0 {
                true
            } else {
                remaining -= 1;
                false
            }
        });

        assert_eq!(renders.load(Ordering::SeqCst), 5);
    }
}
