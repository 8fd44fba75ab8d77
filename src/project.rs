//! Optional self-describing project serialization, with "resume as
//! converged" reload semantics. Not wired to any I/O automatically — a
//! caller picks the file format and location; this module only does the
//! (de)serializable data shape via `serde_json`.

use glam::{DVec2, UVec2};
use serde::{Deserialize, Serialize};

use crate::{
    color::Color,
    engine::{Engine, EngineParams},
    image::{LabImage, WeightMap},
};

#[derive(Debug, Serialize, Deserialize)]
struct SerializableColor {
    l: f64,
    a: f64,
    b: f64,
}

impl From<Color> for SerializableColor {
    fn from(c: Color) -> Self {
        SerializableColor {
            l: c.l(),
            a: c.a(),
            b: c.b(),
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(c: SerializableColor) -> Self {
        Color::new(c.l, c.a, c.b)
    }
}

/// Everything needed to reconstruct an [`Engine`]: input image, weights,
/// dimensions, scalar parameters, and the full mutable state.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectFile {
    input_size: UVec2,
    input_pixels: Vec<SerializableColor>,
    weights: Vec<f64>,
    out_size: UVec2,
    palette_target_size: usize,
    params: SerializableParams,

    positions: Vec<DVec2>,
    mean_colors: Vec<SerializableColor>,
    assignment: Vec<usize>,
    palette_colors: Vec<SerializableColor>,
    priors: Vec<f64>,
    locks: Vec<bool>,
    constraints: Vec<Vec<usize>>,
    pairs: Option<Vec<(usize, usize)>>,
    iteration: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SerializableParams {
    slic_factor: f64,
    sigma_color: f64,
    sigma_pos: f64,
    smooth_pos: f64,
    saturation: f64,
}

impl From<EngineParams> for SerializableParams {
    fn from(p: EngineParams) -> Self {
        SerializableParams {
            slic_factor: p.slic_factor,
            sigma_color: p.sigma_color,
            sigma_pos: p.sigma_pos,
            smooth_pos: p.smooth_pos,
            saturation: p.saturation,
        }
    }
}

impl From<SerializableParams> for EngineParams {
    fn from(p: SerializableParams) -> Self {
        EngineParams {
            slic_factor: p.slic_factor,
            sigma_color: p.sigma_color,
            sigma_pos: p.sigma_pos,
            smooth_pos: p.smooth_pos,
            saturation: p.saturation,
        }
    }
}

impl ProjectFile {
    /// Capture everything needed to reconstruct `engine`, including its
    /// immutable input image and weights.
    pub fn from_engine(engine: &Engine) -> Self {
        ProjectFile {
            input_size: engine.input().size(),
            input_pixels: engine.input().pixels().iter().copied().map(Into::into).collect(),
            weights: engine.importance_weight_values(),
            out_size: engine.superpixel_grid_size(),
            palette_target_size: engine.palette_target_size(),
            params: engine.params().into(),

            positions: engine.superpixel_positions().to_vec(),
            mean_colors: engine.superpixel_mean_colors().iter().copied().map(Into::into).collect(),
            assignment: engine.palette_assignment().to_vec(),
            palette_colors: engine.palette_colors().iter().copied().map(Into::into).collect(),
            priors: engine.palette_priors().to_vec(),
            locks: engine.palette_locks().to_vec(),
            constraints: engine.palette_constraints().to_vec(),
            pairs: engine.palette_pairs().map(|p| p.to_vec()),
            iteration: engine.iteration(),
        }
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse from a JSON string previously produced by [`Self::to_json`].
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Reconstruct an [`Engine`] from this project file. The engine is
    /// marked converged immediately: a saved project is assumed to have
    /// been saved at or after convergence, so reloading it should not
    /// resume active annealing by surprise.
    pub fn into_engine(self) -> crate::error::Result<Engine> {
        let input_pixels: Vec<Color> = self.input_pixels.into_iter().map(Into::into).collect();
        let input = LabImage::from_pixels(input_pixels, self.input_size)?;
        let weights = WeightMap::from_weights(self.weights, self.input_size)?;

        let mean_colors: Vec<Color> = self.mean_colors.into_iter().map(Into::into).collect();
        let palette_colors: Vec<Color> = self.palette_colors.into_iter().map(Into::into).collect();

        Engine::from_parts(
            input,
            weights,
            self.out_size,
            self.palette_target_size,
            self.params.into(),
            self.positions,
            mean_colors,
            palette_colors,
            self.assignment,
            self.priors,
            self.locks,
            self.constraints,
            self.pairs,
            self.iteration,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let pixels = vec![Color::new(50.0, 0.0, 0.0); 16];
        let input = LabImage::from_pixels(pixels, UVec2::new(4, 4)).unwrap();
        let engine = Engine::new(input, UVec2::new(2, 2), 2, EngineParams::default()).unwrap();

        let project = ProjectFile::from_engine(&engine);
        let json = project.to_json().unwrap();
        let reloaded = ProjectFile::from_json(&json).unwrap();
        let restored = reloaded.into_engine().unwrap();

        assert!(restored.has_converged());
        assert_eq!(restored.iteration(), engine.iteration());
    }
}
