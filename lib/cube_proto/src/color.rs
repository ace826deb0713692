//! Color types shared by the raster and the wire codecs.

use serde::{Deserialize, Serialize};

/// An 8-bit-per-channel RGB color, stored in the same byte order the ArtNet
/// codec writes to the wire.
#[derive(Copy, Clone, Eq, PartialEq, Default, Debug, Hash, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Black, the zero value.
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    /// Constructs a color from its three channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scales every channel by `brightness` (clamped to `[0,1]`), truncating
    /// (not rounding) to `u8` -- matching the source implementation's
    /// `int()`/NumPy `astype(uint8)` truncating cast.
    pub fn scale(self, brightness: f32) -> Rgb {
        let b = brightness.clamp(0.0, 1.0);
        let scale_channel = |c: u8| (c as f32 * b) as u8;
        Rgb {
            r: scale_channel(self.r),
            g: scale_channel(self.g),
            b: scale_channel(self.b),
        }
    }
}

/// A hue/saturation/value color, each channel encoded as a byte (0..=255
/// maps hue onto 0..360 degrees).
#[derive(Copy, Clone, Eq, PartialEq, Default, Debug, Hash)]
pub struct Hsv {
    /// Hue, 0..=255 mapped onto 0..360 degrees.
    pub h: u8,
    /// Saturation, 0..=255 mapped onto 0..1.
    pub s: u8,
    /// Value, 0..=255 mapped onto 0..1.
    pub v: u8,
}

impl Hsv {
    /// Constructs an HSV color from its three byte channels.
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }
}

impl From<Hsv> for Rgb {
    /// Canonical 6-sector HSV->RGB conversion.
    fn from(hsv: Hsv) -> Self {
        let h = hsv.h as f32 / (256.0 / 6.0);
        let s = hsv.s as f32 / 255.0;
        let v = hsv.v as f32 / 255.0;

        let c = v * s;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let m = v - c;

        let (r, g, b) = if h < 1.0 {
            (c, x, 0.0)
        } else if h < 2.0 {
            (x, c, 0.0)
        } else if h < 3.0 {
            (0.0, c, x)
        } else if h < 4.0 {
            (0.0, x, c)
        } else if h < 5.0 {
            (x, 0.0, c)
        } else {
            (c, 0.0, x)
        };

        Rgb {
            r: saturate_u8((r + m) * 255.0),
            g: saturate_u8((g + m) * 255.0),
            b: saturate_u8((b + m) * 255.0),
        }
    }
}

/// Saturates a floating-point channel value into the `[0,255]` `u8` range.
pub fn saturate_u8(value: f32) -> u8 {
    value.clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hsv_primary_red() {
        let rgb: Rgb = Hsv::new(0, 255, 255).into();
        assert_eq!(rgb, Rgb::new(255, 0, 0));
    }

    #[test]
    fn hsv_primary_green() {
        let rgb: Rgb = Hsv::new(85, 255, 255).into();
        assert_eq!(rgb.g, 255);
        assert!(rgb.r < 10 && rgb.b < 10);
    }

    #[test]
    fn scale_truncates() {
        // 255 * 0.5 = 127.5, truncated to 127, not rounded to 128.
        assert_eq!(Rgb::new(255, 255, 255).scale(0.5), Rgb::new(127, 127, 127));
    }

    #[test]
    fn scale_clamps_out_of_range_brightness() {
        assert_eq!(Rgb::new(10, 20, 30).scale(2.0), Rgb::new(10, 20, 30));
        assert_eq!(Rgb::new(10, 20, 30).scale(-1.0), Rgb::BLACK);
    }
}
