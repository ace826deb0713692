//! Pure data model and wire codecs for the volumetric display pipeline:
//! colors, the voxel raster, ArtNet PDU encoding, cube/route layout, and the
//! configuration document. Nothing in this crate performs I/O.

pub mod artnet;
pub mod color;
pub mod config;
pub mod error;
pub mod layout;
pub mod raster;

pub use color::{Hsv, Rgb};
pub use config::Config;
pub use error::{
    ArtNetSendError, ConfigError, ControllerConnectError, ControllerIoError, ControllerProtocolError, OutOfBounds,
    SceneError,
};
pub use layout::{CubeLayout, Route};
pub use raster::{Axis, Orientation, Raster};
