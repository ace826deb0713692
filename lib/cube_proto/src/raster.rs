//! The world raster: a 3-D voxel buffer with a configurable storage orientation.

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::error::OutOfBounds;

/// One of the six signed cardinal directions a storage axis can be mapped
/// from a logical axis.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum Axis {
    /// Logical +X.
    X,
    /// Logical -X.
    NegX,
    /// Logical +Y.
    Y,
    /// Logical -Y.
    NegY,
    /// Logical +Z.
    Z,
    /// Logical -Z.
    NegZ,
}

impl Axis {
    /// Parses the `±X`/`±Y`/`±Z` token used in the configuration document.
    pub fn parse(token: &str) -> Option<Axis> {
        match token {
            "X" | "+X" => Some(Axis::X),
            "-X" => Some(Axis::NegX),
            "Y" | "+Y" => Some(Axis::Y),
            "-Y" => Some(Axis::NegY),
            "Z" | "+Z" => Some(Axis::Z),
            "-Z" => Some(Axis::NegZ),
            _ => None,
        }
    }

    /// Index (0=X, 1=Y, 2=Z) of the source axis this token reads from.
    fn source_index(self) -> usize {
        match self {
            Axis::X | Axis::NegX => 0,
            Axis::Y | Axis::NegY => 1,
            Axis::Z | Axis::NegZ => 2,
        }
    }

    /// Whether this token inverts its source axis.
    fn is_negated(self) -> bool {
        matches!(self, Axis::NegX | Axis::NegY | Axis::NegZ)
    }
}

/// The orientation transform applied to every `set_pix`/`get_pix` call: a
/// permutation of the three logical axes, each with an optional sign flip.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct Orientation(pub [Axis; 3]);

impl Default for Orientation {
    fn default() -> Self {
        Orientation([Axis::X, Axis::Y, Axis::Z])
    }
}

impl Orientation {
    /// Transforms a logical `(x,y,z)` coordinate into the storage-axis
    /// coordinate, given the raster's dimensions.
    fn transform(self, coords: [u16; 3], dims: [u16; 3]) -> [u16; 3] {
        let mut out = [0u16; 3];
        for (i, axis) in self.0.iter().enumerate() {
            let src = axis.source_index();
            out[i] = if axis.is_negated() {
                dims[src] - 1 - coords[src]
            } else {
                coords[src]
            };
        }
        out
    }
}

/// A 3-D RGB voxel buffer. Storage is (z,y,x) major order after the
/// orientation transform is applied: `index = z*H*W + y*W + x`.
///
/// Brightness is *not* applied here -- it is a property consulted only by
/// the fan-out at emission time, so the raster always holds the clean,
/// unscaled ground truth a scene wrote.
#[derive(Clone, Debug)]
pub struct Raster {
    width: u16,
    height: u16,
    length: u16,
    orientation: Orientation,
    /// Brightness multiplier applied by consumers (e.g. the ArtNet fan-out)
    /// at emission time. Stored here for convenience since it travels with
    /// the raster through the render tick, but never consulted by
    /// `set_pix`/`get_pix`/`clear`.
    pub brightness: f32,
    pixels: Vec<Rgb>,
}

impl Raster {
    /// Allocates a new, all-black raster of the given dimensions and orientation.
    pub fn new(width: u16, height: u16, length: u16, orientation: Orientation) -> Self {
        let count = width as usize * height as usize * length as usize;
        Self {
            width,
            height,
            length,
            orientation,
            brightness: 1.0,
            pixels: vec![Rgb::BLACK; count],
        }
    }

    /// The raster's width, in voxels.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// The raster's height, in voxels.
    pub fn height(&self) -> u16 {
        self.height
    }

    /// The raster's length (depth), in voxels.
    pub fn length(&self) -> u16 {
        self.length
    }

    fn check_bounds(&self, x: u16, y: u16, z: u16) -> Result<(), OutOfBounds> {
        if x < self.width && y < self.height && z < self.length {
            Ok(())
        } else {
            Err(OutOfBounds {
                x,
                y,
                z,
                width: self.width,
                height: self.height,
                length: self.length,
            })
        }
    }

    fn storage_index(&self, x: u16, y: u16, z: u16) -> usize {
        let dims = [self.width, self.height, self.length];
        let [tx, ty, tz] = self.orientation.transform([x, y, z], dims);
        tz as usize * self.height as usize * self.width as usize + ty as usize * self.width as usize + tx as usize
    }

    /// Sets the voxel at logical `(x,y,z)` to `color`.
    pub fn set_pix(&mut self, x: u16, y: u16, z: u16, color: Rgb) -> Result<(), OutOfBounds> {
        self.check_bounds(x, y, z)?;
        let idx = self.storage_index(x, y, z);
        self.pixels[idx] = color;
        Ok(())
    }

    /// Reads the voxel at logical `(x,y,z)`.
    pub fn get_pix(&self, x: u16, y: u16, z: u16) -> Result<Rgb, OutOfBounds> {
        self.check_bounds(x, y, z)?;
        Ok(self.pixels[self.storage_index(x, y, z)])
    }

    /// Zeroes every voxel.
    pub fn clear(&mut self) {
        self.pixels.fill(Rgb::BLACK);
    }

    /// Reads a whole storage-order layer (all voxels at a fixed transformed
    /// `z`), in row-major `(y outer, x inner)` order. Used by the fan-out to
    /// avoid one `get_pix` call per pixel; `z` here is already a *storage*
    /// index, not a logical coordinate.
    pub fn storage_layer(&self, storage_z: u16) -> &[Rgb] {
        let w = self.width as usize;
        let h = self.height as usize;
        let start = storage_z as usize * h * w;
        &self.pixels[start..start + h * w]
    }

    /// Reads a logical sub-rectangle `[x0, x0+w) x [y0, y0+h)` at a fixed
    /// logical `z`, in row-major `(y outer, x inner)` order. Used by the
    /// fan-out to extract one cube's layer out of a multi-cube world raster.
    pub fn window_layer(&self, x0: u16, y0: u16, w: u16, h: u16, z: u16) -> Result<Vec<Rgb>, OutOfBounds> {
        let mut out = Vec::with_capacity(w as usize * h as usize);
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                out.push(self.get_pix(x, y, z)?);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let mut r = Raster::new(4, 5, 6, Orientation::default());
        r.set_pix(1, 2, 3, Rgb::new(9, 8, 7)).unwrap();
        assert_eq!(r.get_pix(1, 2, 3).unwrap(), Rgb::new(9, 8, 7));
    }

    #[test]
    fn clear_zeroes_everything() {
        let mut r = Raster::new(2, 2, 2, Orientation::default());
        for z in 0..2 {
            for y in 0..2 {
                for x in 0..2 {
                    r.set_pix(x, y, z, Rgb::new(1, 2, 3)).unwrap();
                }
            }
        }
        r.clear();
        for z in 0..2 {
            for y in 0..2 {
                for x in 0..2 {
                    assert_eq!(r.get_pix(x, y, z).unwrap(), Rgb::BLACK);
                }
            }
        }
    }

    #[test]
    fn out_of_bounds_is_an_error_not_a_panic() {
        let r = Raster::new(2, 2, 2, Orientation::default());
        assert!(r.get_pix(2, 0, 0).is_err());
        assert!(r.get_pix(0, 2, 0).is_err());
        assert!(r.get_pix(0, 0, 2).is_err());
    }

    #[test]
    fn negated_axis_mirrors_storage() {
        // Flip X only: logical (0,0,0) should land where logical (W-1,0,0)
        // would land under the identity orientation.
        let orientation = Orientation([Axis::NegX, Axis::Y, Axis::Z]);
        let mut flipped = Raster::new(4, 1, 1, orientation);
        let mut identity = Raster::new(4, 1, 1, Orientation::default());
        flipped.set_pix(0, 0, 0, Rgb::new(5, 6, 7)).unwrap();
        identity.set_pix(3, 0, 0, Rgb::new(5, 6, 7)).unwrap();
        assert_eq!(flipped.storage_layer(0), identity.storage_layer(0));
    }

    #[test]
    fn storage_layer_matches_row_major_get_pix() {
        let mut r = Raster::new(3, 2, 1, Orientation::default());
        r.set_pix(0, 0, 0, Rgb::new(1, 0, 0)).unwrap();
        r.set_pix(1, 0, 0, Rgb::new(2, 0, 0)).unwrap();
        r.set_pix(0, 1, 0, Rgb::new(3, 0, 0)).unwrap();
        let layer = r.storage_layer(0);
        assert_eq!(layer[0], Rgb::new(1, 0, 0));
        assert_eq!(layer[1], Rgb::new(2, 0, 0));
        assert_eq!(layer[3], Rgb::new(3, 0, 0));
    }

    #[test]
    fn window_layer_extracts_one_cube_tile_from_a_multi_cube_world() {
        let mut r = Raster::new(4, 2, 1, Orientation::default());
        r.set_pix(2, 0, 0, Rgb::new(9, 9, 9)).unwrap();
        r.set_pix(3, 1, 0, Rgb::new(5, 5, 5)).unwrap();
        let tile = r.window_layer(2, 0, 2, 2, 0).unwrap();
        assert_eq!(tile, vec![Rgb::new(9, 9, 9), Rgb::BLACK, Rgb::BLACK, Rgb::new(5, 5, 5)]);
    }
}
