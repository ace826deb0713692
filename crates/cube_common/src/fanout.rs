//! Transforms a world raster into UDP ArtNet datagrams per cube, consulting
//! the [`SenderMonitor`] and reporting every send outcome back to it.

use std::net::UdpSocket as StdUdpSocket;
use std::net::{SocketAddr, ToSocketAddrs};

use cube_proto::artnet::{encode_dmx, encode_sync, MAX_DMX_PAYLOAD_BYTES};
use cube_proto::color::Rgb;
use cube_proto::layout::CubeLayout;
use cube_proto::raster::Raster;
use cube_proto::ArtNetSendError;

use crate::sender_monitor::SenderMonitor;

/// Per-cube voxel dimensions; uniform across every configured cube (§3: `world = grid_dim * cube_dim`).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct CubeDims {
    /// Width of one cube, in voxels.
    pub width: u16,
    /// Height of one cube, in voxels.
    pub height: u16,
    /// Length (depth) of one cube, in voxels.
    pub length: u16,
}

/// Owns the UDP socket used to transmit every cube's DMX/Sync stream.
pub struct FanOut {
    socket: StdUdpSocket,
    cubes: Vec<CubeLayout>,
    cube_dims: CubeDims,
}

impl FanOut {
    /// Binds a UDP socket (broadcast-enabled) and takes ownership of the cube layout table.
    pub fn new(cubes: Vec<CubeLayout>, cube_dims: CubeDims) -> std::io::Result<Self> {
        let socket = StdUdpSocket::bind("0.0.0.0:0")?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket, cubes, cube_dims })
    }

    /// Registers every configured route's endpoint with the monitor.
    pub fn register_endpoints(&self, monitor: &SenderMonitor) {
        for cube in &self.cubes {
            for route in &cube.routes {
                if let Some(addr) = resolve(&route.addr()) {
                    monitor.register(addr);
                }
            }
        }
    }

    /// Emits one frame: for every cube, every route, every configured
    /// z-layer in order, slice the sub-volume into ≤170-pixel chunks and
    /// send them as DMX PDUs on consecutive universes, followed by exactly
    /// one Sync PDU per cube (skipped if the route is not currently routable).
    pub fn emit(&self, raster: &Raster, monitor: &SenderMonitor) {
        for cube in &self.cubes {
            self.emit_cube(cube, raster, monitor);
        }
    }

    fn emit_cube(&self, cube: &CubeLayout, raster: &Raster, monitor: &SenderMonitor) {
        let (gx, gy, gz) = cube.grid_position;
        let x0 = gx * self.cube_dims.width;
        let y0 = gy * self.cube_dims.height;

        for route in &cube.routes {
            let Some(addr) = resolve(&route.addr()) else { continue };
            if !monitor.is_routable(addr) {
                continue;
            }
            let mut send_failed = false;
            for (layer_position, &zl) in route.z_indices.iter().enumerate() {
                let world_z = gz * self.cube_dims.length + zl;
                let layer = match raster.window_layer(x0, y0, self.cube_dims.width, self.cube_dims.height, world_z) {
                    Ok(layer) => layer,
                    Err(e) => {
                        tracing::warn!("skipping out-of-bounds cube layer: {e}");
                        continue;
                    }
                };
                let base_universe = route.universe_for_layer(layer_position);
                for (chunk_index, chunk) in chunk_pixels(&layer, raster.brightness).enumerate() {
                    let universe = base_universe.wrapping_add(chunk_index as u16);
                    let packet = encode_dmx(universe, &chunk);
                    if let Err(e) = self.socket.send_to(&packet, addr) {
                        monitor.report_failure(addr, ArtNetSendError::Io { addr: addr.to_string(), reason: e.to_string() });
                        send_failed = true;
                        break;
                    }
                }
                if send_failed {
                    break;
                }
            }
            if send_failed {
                continue;
            }
            let sync = encode_sync();
            match self.socket.send_to(&sync, addr) {
                Ok(_) => monitor.report_success(addr),
                Err(e) => monitor.report_failure(addr, ArtNetSendError::Io { addr: addr.to_string(), reason: e.to_string() }),
            }
        }
    }
}

/// Splits a row-major pixel layer into row-major byte chunks of at most 510
/// bytes (170 pixels), applying `brightness` to each channel.
fn chunk_pixels(pixels: &[Rgb], brightness: f32) -> impl Iterator<Item = Vec<u8>> + '_ {
    pixels.chunks(MAX_DMX_PAYLOAD_BYTES / 3).map(move |chunk| {
        let mut bytes = Vec::with_capacity(chunk.len() * 3);
        for pixel in chunk {
            let scaled = pixel.scale(brightness);
            bytes.push(scaled.r);
            bytes.push(scaled.g);
            bytes.push(scaled.b);
        }
        bytes
    })
}

fn resolve(addr: &str) -> Option<SocketAddr> {
    addr.to_socket_addrs().ok()?.next()
}

#[cfg(test)]
mod test {
    use cube_proto::layout::{default_route, CubeLayout};
    use cube_proto::raster::Orientation;

    use super::*;
    use crate::sender_monitor::SenderMonitor;

    #[test]
    fn chunk_pixels_splits_at_170() {
        let pixels = vec![Rgb::new(1, 2, 3); 400];
        let chunks: Vec<_> = chunk_pixels(&pixels, 1.0).collect();
        assert_eq!(chunks.len(), 3); // ceil(400/170)
        assert_eq!(chunks[0].len(), 170 * 3);
        assert_eq!(chunks[2].len(), (400 - 170 * 2) * 3);
    }

    #[test]
    fn chunk_pixels_applies_brightness() {
        let pixels = vec![Rgb::new(255, 255, 255); 1];
        let chunks: Vec<_> = chunk_pixels(&pixels, 0.5).collect();
        assert_eq!(chunks[0], vec![127, 127, 127]);
    }

    #[test]
    fn emit_skips_unroutable_cube() {
        let monitor = SenderMonitor::new(std::time::Duration::from_secs(30), 30);
        let route = default_route(0, "127.0.0.1".into(), 6454, 2, 2, 2);
        let addr: SocketAddr = route.addr().parse().unwrap();
        monitor.report_failure(addr, "down");
        let cube = CubeLayout { grid_position: (0, 0, 0), routes: vec![route] };
        let dims = CubeDims { width: 2, height: 2, length: 2 };
        let fanout = FanOut::new(vec![cube], dims).unwrap();
        let raster = Raster::new(2, 2, 2, Orientation::default());
        fanout.emit(&raster, &monitor);
        // Skipped because not routable: the failure state from setup is untouched,
        // no fresh success was reported.
        assert!(!monitor.is_routable(addr));
    }

    #[test]
    fn emit_extracts_correct_tile_for_second_cube_in_a_grid() {
        // Two cubes side by side on X: world is 4x2x2, each cube 2x2x2.
        let mut raster = Raster::new(4, 2, 2, Orientation::default());
        raster.set_pix(2, 0, 0, Rgb::new(1, 2, 3)).unwrap();
        let cube0 = default_route(0, "127.0.0.1".into(), 7000, 2, 2, 2);
        let cube1 = default_route(1, "127.0.0.1".into(), 7001, 2, 2, 2);
        let cubes = vec![
            CubeLayout { grid_position: (0, 0, 0), routes: vec![cube0] },
            CubeLayout { grid_position: (1, 0, 0), routes: vec![cube1] },
        ];
        let dims = CubeDims { width: 2, height: 2, length: 2 };
        let monitor = SenderMonitor::new(std::time::Duration::from_secs(30), 30);
        let fanout = FanOut::new(cubes, dims).unwrap();
        fanout.register_endpoints(&monitor);
        // Sanity: the second cube's local (0,0) tile should see world pixel (2,0,0).
        let tile = raster.window_layer(2, 0, 2, 2, 0).unwrap();
        assert_eq!(tile[0], Rgb::new(1, 2, 3));
        fanout.emit(&raster, &monitor);
    }
}
