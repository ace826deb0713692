//! CLI entry point: loads the configuration, wires the raster, fan-out,
//! sender monitor, controller registry and game-selection scene together,
//! and runs the renderer to completion or clean shutdown.

use std::cell::RefCell;
use std::net::IpAddr;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cube_common::controller::registry::{ControllerAddress, Registry};
use cube_common::game_scene::GameScene;
use cube_common::{FanOut, RendererConfig, Scene, SenderMonitor};
use cube_proto::raster::Raster;
use cube_proto::{Config, SceneError};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cube_render", about = "Volumetric LED cube display renderer")]
struct CliOptions {
    /// Path to the TOML configuration document.
    #[arg(long, default_value = "cube.toml")]
    config: PathBuf,
    /// Which `scene.<name>` section selects the controller-DIP -> player mapping.
    #[arg(long, default_value = "default")]
    scene: String,
    /// Overrides the configured raster brightness, in `[0,1]`.
    #[arg(long)]
    brightness: Option<f32>,
    /// Overrides the configured `tracing` filter level.
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = CliOptions::parse();

    let config = Config::load(&cli.config).with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    init_logging(cli.log_level.as_deref().unwrap_or(&config.log.level), config.log.ansi);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building the monitor HTTP surface's tokio runtime")?;

    let mut raster = Raster::new(config.world.width, config.world.height, config.world.length, config.orientation);
    raster.brightness = cli.brightness.unwrap_or(config.brightness);

    let fanout = FanOut::new(
        config.cubes.clone(),
        cube_common::CubeDims { width: config.cube_dims.width, height: config.cube_dims.height, length: config.cube_dims.length },
    )
    .context("binding the ArtNet fan-out socket")?;

    let monitor = Arc::new(SenderMonitor::new(Duration::from_secs(config.cooldown_seconds), config.frame_rate));

    let addresses: Vec<ControllerAddress> = config
        .controller_addresses
        .iter()
        .map(|(&dip, (ip, port))| ControllerAddress { dip, ip: ip.clone(), port: *port })
        .collect();

    let controller_mapping = config
        .scene_controller_mappings
        .get(&cli.scene)
        .cloned()
        .ok_or_else(|| SceneError::UnknownSceneId(cli.scene.clone()))?
        .into_iter()
        .map(|(player_id, dip)| (dip, player_id))
        .collect();

    let registry = Rc::new(RefCell::new(Registry::new(
        addresses,
        controller_mapping,
        Duration::from_millis(config.connect_timeout_ms),
        Duration::from_millis(config.enum_timeout_ms),
    )));

    let scene: Box<dyn Scene> = Box::new(GameScene::new(
        vec![cube_common::game_scene::GameEntry {
            id: "idle".to_string(),
            label: "Idle".to_string(),
            factory: Rc::new(|| Box::new(IdleScene::default()) as Box<dyn Scene>),
        }],
        registry.clone(),
    ));

    let renderer_config = RendererConfig {
        frame_rate: config.frame_rate,
        lcd_interval: Duration::from_millis(config.lcd_interval_ms),
        reactor_join_timeout: Duration::from_secs(3),
    };
    let renderer = cube_common::Renderer::new(raster, fanout, monitor.clone(), registry, scene, renderer_config);
    let ready = renderer.readiness_flag();

    if let Some(monitor_config) = &config.monitor {
        let bind: IpAddr = monitor_config
            .bind_address
            .parse()
            .with_context(|| format!("parsing monitor bind address {}", monitor_config.bind_address))?;
        let port = monitor_config.port;
        let monitor = monitor.clone();
        runtime.spawn(async move {
            if let Err(e) = cube_common::monitor_http::serve(bind, port, monitor, ready).await {
                tracing::error!("monitor HTTP surface exited: {e}");
            }
        });
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received shutdown signal");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    renderer.run(move || shutdown.load(Ordering::Relaxed));

    Ok(())
}

fn init_logging(level: &str, ansi: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_ansi(ansi).init();
}

/// A minimal built-in placeholder scene: a slow hue sweep across the whole
/// raster. Stands in for the out-of-scope per-game rule sets so the lobby
/// always has at least one entry to select.
#[derive(Default)]
struct IdleScene {
    hue: u8,
}

impl Scene for IdleScene {
    fn render(&mut self, raster: &mut cube_proto::raster::Raster, _t_seconds: f64) {
        use cube_proto::color::{Hsv, Rgb};
        self.hue = self.hue.wrapping_add(1);
        let color: Rgb = Hsv { h: self.hue, s: 255, v: 180 }.into();
        for z in 0..raster.length() {
            for y in 0..raster.height() {
                for x in 0..raster.width() {
                    let _ = raster.set_pix(x, y, z, color);
                }
            }
        }
    }

    fn on_button(
        &mut self,
        _player_id: &str,
        _button: cube_common::controller::Button,
        _edge: cube_common::controller::Edge,
    ) {
    }
}
