//! Error taxonomy shared across the display pipeline.
//!
//! Each variant here corresponds to one of the error categories in the
//! design's error-handling section; callers are expected to match on the
//! taxonomy rather than treat every failure as fatal.

use thiserror::Error;

/// A scene wrote to, or read from, a coordinate outside the raster bounds.
///
/// This is a programmer error in a `Scene` implementation, not a hardware or
/// network fault. It is returned as a `Result::Err` rather than panicking so
/// the renderer tick can log and skip a single broken frame instead of
/// crashing the process.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
#[error("coordinate ({x}, {y}, {z}) out of bounds for raster {width}x{height}x{length}")]
pub struct OutOfBounds {
    /// The out-of-range x coordinate.
    pub x: u16,
    /// The out-of-range y coordinate.
    pub y: u16,
    /// The out-of-range z coordinate.
    pub z: u16,
    /// The raster's width.
    pub width: u16,
    /// The raster's height.
    pub height: u16,
    /// The raster's length.
    pub length: u16,
}

/// Errors raised while loading or validating the configuration document.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read from disk.
    #[error("could not read config file {path}: {reason}")]
    Io {
        /// Path that was attempted.
        path: String,
        /// Underlying OS error message.
        reason: String,
    },
    /// The config file is not valid TOML, or is missing/mistyped fields.
    #[error("could not parse config file {path}: {reason}")]
    Parse {
        /// Path that was attempted.
        path: String,
        /// Parser error message.
        reason: String,
    },
    /// A `"WxHxL"` geometry string was malformed.
    #[error("invalid geometry string {value:?}: expected \"WxHxL\"")]
    InvalidGeometry {
        /// The offending string.
        value: String,
    },
    /// An orientation axis token was not one of `X`, `-X`, `Y`, `-Y`, `Z`, `-Z`.
    #[error("invalid orientation axis {value:?}")]
    InvalidAxis {
        /// The offending token.
        value: String,
    },
    /// A `[controller_addresses]` table key was not a valid `u16` DIP.
    #[error("invalid controller DIP {value:?}: expected a number")]
    InvalidControllerDip {
        /// The offending table key.
        value: String,
    },
    /// A cube's route specifies `z_indices` that run past the cube's declared length.
    #[error("cube {cube_index} route specifies z index {z_index} but cube length is only {cube_length}")]
    RouteZIndexOutOfRange {
        /// Index of the offending cube in the `cubes` list.
        cube_index: usize,
        /// The offending z index.
        z_index: u16,
        /// The cube's declared length.
        cube_length: u16,
    },
    /// A brightness value outside `[0,1]` was supplied.
    #[error("brightness {value} out of range [0,1]")]
    InvalidBrightness {
        /// The offending value.
        value: f32,
    },
}

/// Errors raised while the loaded scene does not satisfy the `Scene` contract.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum SceneError {
    /// No scene implementation was found for the requested id.
    #[error("no scene registered for id {0:?}")]
    UnknownSceneId(String),
    /// Scene construction failed.
    #[error("failed to construct scene {id:?}: {reason}")]
    ConstructionFailed {
        /// The scene id that failed to construct.
        id: String,
        /// Human-readable failure reason.
        reason: String,
    },
}

/// Errors raised while emitting ArtNet datagrams for a single cube/route.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum ArtNetSendError {
    /// The UDP `sendto` call itself failed.
    #[error("sendto {addr} failed: {reason}")]
    Io {
        /// The destination address.
        addr: String,
        /// The OS error message.
        reason: String,
    },
    /// A payload chunk exceeded 510 bytes (170 pixels); indicates a fan-out bug.
    #[error("DMX payload of {0} bytes exceeds the 510-byte limit")]
    PayloadTooLarge(usize),
}

/// Errors raised while attempting to reach a controller.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum ControllerConnectError {
    /// The TCP connect attempt timed out.
    #[error("connect to {addr} timed out after {timeout_ms}ms")]
    Timeout {
        /// The destination address.
        addr: String,
        /// The configured timeout, in milliseconds.
        timeout_ms: u64,
    },
    /// The TCP connect attempt failed for a reason other than timeout.
    #[error("connect to {addr} failed: {reason}")]
    Io {
        /// The destination address.
        addr: String,
        /// The OS error message.
        reason: String,
    },
}

/// Errors raised while reading or writing an already-connected controller socket.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum ControllerIoError {
    /// A send failed; the session should mark itself disconnected.
    #[error("send to {addr} failed: {reason}")]
    SendFailed {
        /// The destination address.
        addr: String,
        /// The OS error message.
        reason: String,
    },
    /// A read failed for a reason other than a clean peer close.
    #[error("read from {addr} failed: {reason}")]
    ReadFailed {
        /// The destination address.
        addr: String,
        /// The OS error message.
        reason: String,
    },
    /// The peer closed the connection (EOF on read).
    #[error("connection to {addr} closed by peer")]
    Eof {
        /// The destination address.
        addr: String,
    },
}

/// A malformed or unrecognized line received from a controller. Never fatal
/// to the session: the line is dropped, counted, and the session continues.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum ControllerProtocolError {
    /// The line was not valid JSON.
    #[error("malformed JSON line from controller: {reason}")]
    InvalidJson {
        /// The parser error message.
        reason: String,
    },
    /// The JSON was valid but did not contain a 5-element `buttons` array.
    #[error("JSON line missing or malformed `buttons` field")]
    MissingButtons,
}
