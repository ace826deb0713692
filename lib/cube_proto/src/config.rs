//! The on-disk configuration document: world geometry, cube placement and
//! routing, controller addresses, and the ambient operational knobs (frame
//! rate, timeouts, logging, the optional monitor HTTP surface).

use std::collections::HashMap;

use serde::Deserialize;

use crate::artnet::MAX_DMX_PAYLOAD_PIXELS;
use crate::error::ConfigError;
use crate::layout::{default_route, universes_per_layer, CubeLayout, Route};
use crate::raster::{Axis, Orientation};

fn default_frame_rate() -> u32 {
    30
}
fn default_lcd_interval_ms() -> u64 {
    100
}
fn default_cooldown_seconds() -> u64 {
    30
}
fn default_enum_timeout_ms() -> u64 {
    5000
}
fn default_connect_timeout_ms() -> u64 {
    2000
}
fn default_controller_port() -> u16 {
    51333
}
fn default_brightness() -> f32 {
    1.0
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Raw, not-yet-validated shape of the TOML document. Kept separate from the
/// validated [`Config`] so that all cross-field validation (geometry
/// parsing, route bounds checking) happens in one place with typed errors.
#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    geometry: String,
    cube_geometry: String,
    #[serde(default)]
    orientation: Option<[String; 3]>,
    #[serde(default)]
    defaults: Option<RawEndpoint>,
    cubes: Vec<RawCube>,
    #[serde(default)]
    controller_addresses: HashMap<String, RawEndpoint>,
    #[serde(default)]
    scene: HashMap<String, RawSceneConfig>,
    #[serde(default = "default_frame_rate")]
    frame_rate: u32,
    #[serde(default = "default_lcd_interval_ms")]
    lcd_interval_ms: u64,
    #[serde(default = "default_cooldown_seconds")]
    cooldown_seconds: u64,
    #[serde(default = "default_enum_timeout_ms")]
    enum_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    connect_timeout_ms: u64,
    #[serde(default = "default_brightness")]
    brightness: f32,
    #[serde(default)]
    monitor: Option<RawMonitorConfig>,
    #[serde(default)]
    log: RawLogConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEndpoint {
    ip: String,
    #[serde(default = "default_controller_port")]
    port: u16,
}

#[derive(Debug, Clone, Deserialize)]
struct RawRoute {
    ip: Option<String>,
    port: Option<u16>,
    base_universe: u16,
    universes_per_layer: u16,
    z_indices: Vec<u16>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCube {
    position: [u16; 3],
    #[serde(default)]
    z_mapping: Option<Vec<RawRoute>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawSceneConfig {
    #[serde(default)]
    controller_mapping: HashMap<String, u16>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawMonitorConfig {
    #[serde(default = "default_monitor_bind")]
    bind_address: String,
    port: u16,
}

fn default_monitor_bind() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct RawLogConfig {
    #[serde(default = "default_log_level")]
    level: String,
    #[serde(default)]
    ansi: bool,
}

impl Default for RawLogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: false,
        }
    }
}

/// World dimensions, in voxels.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Dimensions {
    /// Width, in voxels.
    pub width: u16,
    /// Height, in voxels.
    pub height: u16,
    /// Length (depth), in voxels.
    pub length: u16,
}

/// The read-only HTTP monitor surface's bind configuration.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct MonitorConfig {
    /// Address to bind the HTTP listener on.
    pub bind_address: String,
    /// Port to bind the HTTP listener on.
    pub port: u16,
}

/// Logging configuration forwarded to the `tracing-subscriber` initialization.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct LogConfig {
    /// Default `tracing` filter level (overridable by `RUST_LOG`).
    pub level: String,
    /// Whether to emit ANSI color codes in log output.
    pub ansi: bool,
}

/// The fully validated configuration document.
#[derive(Clone, Debug)]
pub struct Config {
    /// World dimensions.
    pub world: Dimensions,
    /// Per-cube dimensions (every cube shares these dimensions).
    pub cube_dims: Dimensions,
    /// Storage orientation.
    pub orientation: Orientation,
    /// Physical cube placements and their routes, in declaration order.
    pub cubes: Vec<CubeLayout>,
    /// DIP -> (ip,port) for every configured controller.
    pub controller_addresses: HashMap<u16, (String, u16)>,
    /// scene name -> (player role -> DIP).
    pub scene_controller_mappings: HashMap<String, HashMap<String, u16>>,
    /// Target renderer frame rate, in Hz.
    pub frame_rate: u32,
    /// Minimum interval between LCD refreshes for a given session.
    pub lcd_interval_ms: u64,
    /// `SenderMonitor` cooldown duration after a reported failure.
    pub cooldown_seconds: u64,
    /// Registry enumeration timeout budget.
    pub enum_timeout_ms: u64,
    /// Per-controller TCP connect timeout.
    pub connect_timeout_ms: u64,
    /// Global raster brightness multiplier, `[0,1]`.
    pub brightness: f32,
    /// Optional HTTP monitor surface bind configuration.
    pub monitor: Option<MonitorConfig>,
    /// Logging configuration.
    pub log: LogConfig,
}

/// Parses a `"WxHxL"` geometry string into its three `u16` components.
fn parse_geometry(value: &str) -> Result<Dimensions, ConfigError> {
    let parts: Vec<&str> = value.split('x').collect();
    if parts.len() != 3 {
        return Err(ConfigError::InvalidGeometry { value: value.to_string() });
    }
    let mut dims = [0u16; 3];
    for (i, part) in parts.iter().enumerate() {
        dims[i] = part
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidGeometry { value: value.to_string() })?;
    }
    Ok(Dimensions {
        width: dims[0],
        height: dims[1],
        length: dims[2],
    })
}

fn parse_orientation(tokens: &[String; 3]) -> Result<Orientation, ConfigError> {
    let mut axes = [Axis::X, Axis::Y, Axis::Z];
    for (i, token) in tokens.iter().enumerate() {
        axes[i] = Axis::parse(token).ok_or_else(|| ConfigError::InvalidAxis { value: token.clone() })?;
    }
    Ok(Orientation(axes))
}

impl Config {
    /// Loads and validates a configuration document from a TOML file on disk.
    pub fn load(path: &std::path::Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parses and validates a configuration document already read into memory.
    pub fn parse(text: &str, path_for_errors: &str) -> Result<Config, ConfigError> {
        let raw: RawConfig = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path_for_errors.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Config, ConfigError> {
        let world = parse_geometry(&raw.geometry)?;
        let cube_dims = parse_geometry(&raw.cube_geometry)?;
        let orientation = match &raw.orientation {
            Some(tokens) => parse_orientation(tokens)?,
            None => Orientation::default(),
        };

        if !(0.0..=1.0).contains(&raw.brightness) {
            return Err(ConfigError::InvalidBrightness { value: raw.brightness });
        }

        let default_endpoint = raw.defaults.clone().unwrap_or(RawEndpoint {
            ip: "127.0.0.1".to_string(),
            port: crate::layout::default_artnet_port(),
        });

        let mut cubes = Vec::with_capacity(raw.cubes.len());
        for (i, raw_cube) in raw.cubes.iter().enumerate() {
            let routes = match &raw_cube.z_mapping {
                Some(raw_routes) => {
                    let mut routes = Vec::with_capacity(raw_routes.len());
                    for raw_route in raw_routes {
                        for &z in &raw_route.z_indices {
                            if z >= cube_dims.length {
                                return Err(ConfigError::RouteZIndexOutOfRange {
                                    cube_index: i,
                                    z_index: z,
                                    cube_length: cube_dims.length,
                                });
                            }
                        }
                        routes.push(Route {
                            ip: raw_route.ip.clone().unwrap_or_else(|| default_endpoint.ip.clone()),
                            port: raw_route.port.unwrap_or(default_endpoint.port),
                            base_universe: raw_route.base_universe,
                            universes_per_layer: raw_route.universes_per_layer,
                            z_indices: raw_route.z_indices.clone(),
                        });
                    }
                    routes
                }
                None => vec![default_route(
                    i,
                    default_endpoint.ip.clone(),
                    default_endpoint.port,
                    cube_dims.width,
                    cube_dims.height,
                    cube_dims.length,
                )],
            };

            cubes.push(CubeLayout {
                grid_position: (raw_cube.position[0], raw_cube.position[1], raw_cube.position[2]),
                routes,
            });
        }

        let mut controller_addresses = HashMap::with_capacity(raw.controller_addresses.len());
        for (dip_str, endpoint) in &raw.controller_addresses {
            let dip: u16 = dip_str
                .parse()
                .map_err(|_| ConfigError::InvalidControllerDip { value: dip_str.clone() })?;
            controller_addresses.insert(dip, (endpoint.ip.clone(), endpoint.port));
        }

        let mut scene_controller_mappings = HashMap::with_capacity(raw.scene.len());
        for (scene_name, scene_config) in raw.scene {
            scene_controller_mappings.insert(scene_name, scene_config.controller_mapping);
        }

        Ok(Config {
            world,
            cube_dims,
            orientation,
            cubes,
            controller_addresses,
            scene_controller_mappings,
            frame_rate: raw.frame_rate,
            lcd_interval_ms: raw.lcd_interval_ms,
            cooldown_seconds: raw.cooldown_seconds,
            enum_timeout_ms: raw.enum_timeout_ms,
            connect_timeout_ms: raw.connect_timeout_ms,
            brightness: raw.brightness,
            monitor: raw.monitor.map(|m| MonitorConfig {
                bind_address: m.bind_address,
                port: m.port,
            }),
            log: LogConfig {
                level: raw.log.level,
                ansi: raw.log.ansi,
            },
        })
    }
}

/// Number of universes a single z-layer of `dims` needs; re-exported here for
/// callers building configs programmatically (e.g. tests) without going
/// through TOML.
pub fn layer_universe_count(dims: Dimensions) -> u16 {
    universes_per_layer(dims.width, dims.height)
}

/// Maximum pixels per DMX universe, re-exported for config-adjacent callers.
pub const PIXELS_PER_UNIVERSE: usize = MAX_DMX_PAYLOAD_PIXELS;

#[cfg(test)]
mod test {
    use super::*;

    const MINIMAL: &str = r#"
        geometry = "20x20x20"
        cube_geometry = "20x20x20"

        [defaults]
        ip = "127.0.0.1"
        port = 6454

        [[cubes]]
        position = [0, 0, 0]
    "#;

    #[test]
    fn minimal_config_synthesizes_default_route() {
        let config = Config::parse(MINIMAL, "test").unwrap();
        assert_eq!(config.cubes.len(), 1);
        let route = &config.cubes[0].routes[0];
        assert_eq!(route.ip, "127.0.0.1");
        assert_eq!(route.universes_per_layer, 3);
        assert_eq!(route.z_indices.len(), 20);
    }

    #[test]
    fn frame_rate_defaults_to_30() {
        let config = Config::parse(MINIMAL, "test").unwrap();
        assert_eq!(config.frame_rate, 30);
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let bad = MINIMAL.replace("20x20x20", "20x20");
        assert!(matches!(
            Config::parse(&bad, "test"),
            Err(ConfigError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn over_long_z_indices_is_a_config_error() {
        let text = r#"
            geometry = "20x20x20"
            cube_geometry = "20x20x20"

            [defaults]
            ip = "127.0.0.1"

            [[cubes]]
            position = [0, 0, 0]

            [[cubes.z_mapping]]
            base_universe = 0
            universes_per_layer = 3
            z_indices = [0, 1, 20]
        "#;
        assert!(matches!(
            Config::parse(text, "test"),
            Err(ConfigError::RouteZIndexOutOfRange { z_index: 20, .. })
        ));
    }

    #[test]
    fn controller_addresses_and_scene_mapping_parse() {
        let text = format!(
            "{MINIMAL}\n[controller_addresses.0]\nip = \"10.0.0.1\"\n\n[scene.3d_snake.controller_mapping]\nP1 = 0\n"
        );
        let config = Config::parse(&text, "test").unwrap();
        assert_eq!(config.controller_addresses.get(&0).unwrap().0, "10.0.0.1");
        assert_eq!(
            config.scene_controller_mappings.get("3d_snake").unwrap().get("P1"),
            Some(&0)
        );
    }

    #[test]
    fn out_of_range_brightness_is_rejected() {
        let text = format!("{MINIMAL}\nbrightness = 1.5\n");
        assert!(matches!(
            Config::parse(&text, "test"),
            Err(ConfigError::InvalidBrightness { .. })
        ));
    }
}
