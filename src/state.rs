//! Deep-copyable state snapshots for undo/redo.
//!
//! `T`, `slic_factor`, the input image/weights, and output dimensions are
//! parameters of the engine, not of its evolving state, and are deliberately
//! excluded here.

use glam::DVec2;

use crate::color::Color;

/// An immutable, independently-owned copy of everything a snapshot retains.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub positions: Vec<DVec2>,
    pub mean_colors: Vec<Color>,
    pub assignment: Vec<usize>,
    pub palette_colors: Vec<Color>,
    pub priors: Vec<f64>,
    pub locks: Vec<bool>,
    pub constraints: Vec<Vec<usize>>,
    pub pairs: Option<Vec<(usize, usize)>>,
    pub iteration: u64,
    pub saturation: f64,
}
