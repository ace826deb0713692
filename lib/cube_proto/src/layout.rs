//! Physical cube placement and ArtNet universe routing.

use serde::{Deserialize, Serialize};

/// One contiguous run of ArtNet universes on a single `(ip,port)` endpoint,
/// carrying a subset of a cube's z-layers.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct Route {
    /// Destination IP address (or broadcast address) for this route's datagrams.
    pub ip: String,
    /// Destination UDP port. Defaults to the standard ArtNet port 6454.
    #[serde(default = "default_artnet_port")]
    pub port: u16,
    /// The first universe this route transmits on.
    pub base_universe: u16,
    /// Number of universes consumed per transmitted z-layer.
    pub universes_per_layer: u16,
    /// Which local z-layers of the cube this route transmits, in transmission order.
    pub z_indices: Vec<u16>,
}

/// Default ArtNet UDP port, per the ArtNet specification.
pub const fn default_artnet_port() -> u16 {
    6454
}

impl Route {
    /// The socket address string this route sends to, as `ip:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// The universe a given position `i` within `z_indices` transmits its
    /// first chunk on.
    pub fn universe_for_layer(&self, layer_position: usize) -> u16 {
        self.base_universe
            .wrapping_add((layer_position as u16).wrapping_mul(self.universes_per_layer))
    }
}

/// One physically independent LED sub-volume, placed at a tile position in
/// the world grid and addressed by one or more [`Route`]s.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct CubeLayout {
    /// Tile coordinates of this cube within the world grid (not voxel coordinates).
    pub grid_position: (u16, u16, u16),
    /// The routes that together cover this cube's z-layers.
    pub routes: Vec<Route>,
}

/// Computes the number of universes one z-layer of a `width x height` cube
/// needs, given the 170-pixels-per-universe limit.
pub fn universes_per_layer(width: u16, height: u16) -> u16 {
    let pixels_per_layer = width as u32 * height as u32;
    (pixels_per_layer.div_ceil(crate::artnet::MAX_DMX_PAYLOAD_PIXELS as u32)) as u16
}

/// Synthesizes the default route for cube index `i` when the configuration
/// omits an explicit `z_mapping`: a single route covering every z-layer,
/// addressed at `i * universes_per_cube`.
pub fn default_route(cube_index: usize, ip: String, port: u16, width: u16, height: u16, length: u16) -> Route {
    let per_layer = universes_per_layer(width, height);
    let universes_per_cube = per_layer as u32 * length as u32;
    Route {
        ip,
        port,
        base_universe: (cube_index as u32 * universes_per_cube) as u16,
        universes_per_layer: per_layer,
        z_indices: (0..length).collect(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn universes_per_layer_matches_scenario_a() {
        // 20x20 layer = 400 pixels, ceil(400/170) = 3.
        assert_eq!(universes_per_layer(20, 20), 3);
    }

    #[test]
    fn universes_per_layer_exact_multiple() {
        assert_eq!(universes_per_layer(17, 10), 1);
        assert_eq!(universes_per_layer(34, 10), 2);
    }

    #[test]
    fn default_route_spans_every_layer() {
        let route = default_route(1, "10.0.0.5".into(), 6454, 20, 20, 20);
        assert_eq!(route.base_universe, 60); // 1 * (3 * 20)
        assert_eq!(route.universes_per_layer, 3);
        assert_eq!(route.z_indices, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn universe_for_layer_advances_by_stride() {
        let route = Route {
            ip: "127.0.0.1".into(),
            port: 6454,
            base_universe: 10,
            universes_per_layer: 3,
            z_indices: vec![0, 1, 2],
        };
        assert_eq!(route.universe_for_layer(0), 10);
        assert_eq!(route.universe_for_layer(1), 13);
        assert_eq!(route.universe_for_layer(2), 16);
    }
}
