//! `LabImage` — a W×H grid of Lab colors, the engine's input representation.

use std::ops::{Index, IndexMut};

use glam::UVec2;
use palette::{FromColor, Lab};

use crate::{
    color::Color,
    error::{PixelartError, Result},
};

/// A rectangular grid of [`Color`] values in row-major order (`x` fastest).
#[derive(Debug, Clone)]
pub struct LabImage {
    pixels: Vec<Color>,
    size: UVec2,
}

impl LabImage {
    fn coord_to_idx(&self, coord: UVec2) -> usize {
        (coord.x + self.size.x * coord.y) as usize
    }

    /// Build a grid directly from already-converted Lab pixels.
    pub fn from_pixels(pixels: Vec<Color>, size: UVec2) -> Result<Self> {
        if size.x == 0 || size.y == 0 {
            return Err(PixelartError::InvalidDimensions(
                "LabImage size must be non-zero in both dimensions".into(),
            ));
        }
        if pixels.len() != (size.x * size.y) as usize {
            return Err(PixelartError::ShapeMismatch(format!(
                "expected {} pixels for a {}x{} image, got {}",
                size.x * size.y,
                size.x,
                size.y,
                pixels.len()
            )));
        }
        Ok(LabImage { pixels, size })
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.x
    }

    pub fn height(&self) -> u32 {
        self.size.y
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    pub fn get(&self, coord: UVec2) -> Option<&Color> {
        if coord.x < self.size.x && coord.y < self.size.y {
            Some(&self[coord])
        } else {
            None
        }
    }
}

impl From<image::DynamicImage> for LabImage {
    fn from(img: image::DynamicImage) -> Self {
        let img = img.to_rgb8();
        let size = UVec2 {
            x: img.width(),
            y: img.height(),
        };
        let pixels = img
            .pixels()
            .map(|pixel| {
                let srgb: palette::rgb::Srgb<f64> =
                    palette::rgb::Srgb::new(pixel.0[0], pixel.0[1], pixel.0[2]).into_format();
                Lab::from_color(srgb)
            })
            .map(|lab| Color::new(lab.l, lab.a, lab.b))
            .collect::<Vec<_>>();

        LabImage { pixels, size }
    }
}

impl Index<UVec2> for LabImage {
    type Output = Color;

    fn index(&self, index: UVec2) -> &Self::Output {
        &self.pixels[self.coord_to_idx(index)]
    }
}

impl IndexMut<UVec2> for LabImage {
    fn index_mut(&mut self, index: UVec2) -> &mut Self::Output {
        let idx = self.coord_to_idx(index);
        &mut self.pixels[idx]
    }
}

/// A W×H grid of importance weights (`ω`), independent of the color data so
/// a caller can supply a saliency/attention map of the same dimensions as
/// the input image.
#[derive(Debug, Clone)]
pub struct WeightMap {
    weights: Vec<f64>,
    size: UVec2,
}

impl WeightMap {
    /// A uniform weight map of all `1.0`, the default when the caller never
    /// calls `set_importance_weights`.
    pub fn uniform(size: UVec2) -> Self {
        WeightMap {
            weights: vec![1.0; (size.x * size.y) as usize],
            size,
        }
    }

    pub fn from_weights(weights: Vec<f64>, size: UVec2) -> Result<Self> {
        if weights.len() != (size.x * size.y) as usize {
            return Err(PixelartError::ShapeMismatch(format!(
                "expected {} weights for a {}x{} image, got {}",
                size.x * size.y,
                size.x,
                size.y,
                weights.len()
            )));
        }
        Ok(WeightMap { weights, size })
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }
}

impl Index<UVec2> for WeightMap {
    type Output = f64;

    fn index(&self, index: UVec2) -> &Self::Output {
        &self.weights[(index.x + self.size.x * index.y) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_pixels_rejects_shape_mismatch() {
        let size = UVec2::new(2, 2);
        let err = LabImage::from_pixels(vec![Color::BLACK; 3], size).unwrap_err();
        assert!(matches!(err, PixelartError::ShapeMismatch(_)));
    }

    #[test]
    fn from_pixels_rejects_zero_dimensions() {
        let err = LabImage::from_pixels(vec![], UVec2::new(0, 4)).unwrap_err();
        assert!(matches!(err, PixelartError::InvalidDimensions(_)));
    }

    #[test]
    fn index_round_trips_row_major() {
        let size = UVec2::new(2, 2);
        let pixels = vec![
            Color::new(1.0, 0.0, 0.0),
            Color::new(2.0, 0.0, 0.0),
            Color::new(3.0, 0.0, 0.0),
            Color::new(4.0, 0.0, 0.0),
        ];
        let img = LabImage::from_pixels(pixels, size).unwrap();
        assert_eq!(img[UVec2::new(1, 1)].l(), 4.0);
        assert_eq!(img[UVec2::new(0, 1)].l(), 3.0);
    }

    #[test]
    fn uniform_weight_map_is_all_ones() {
        let w = WeightMap::uniform(UVec2::new(3, 3));
        assert_eq!(w[UVec2::new(2, 2)], 1.0);
    }
}
