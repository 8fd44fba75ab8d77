//! Numeric constants that are part of the algorithm's interface contract,
//! not tunable parameters.

/// Cooling factor applied to the temperature on every sub-tolerance
/// refinement (`T ← max(T·COOLING_FACTOR, T_FINAL)`).
pub const COOLING_FACTOR: f64 = 0.7;

/// Temperature floor; once `T == T_FINAL` and the palette error next falls
/// under tolerance, the engine converges.
pub const T_FINAL: f64 = 1.0;

/// `RefinePalette` error must fall below this before cooling/expansion runs.
pub const PALETTE_ERROR_TOLERANCE: f64 = 1.0;

/// A pair's two subclusters split once their Lab distance exceeds this.
pub const SUBCLUSTER_SPLIT_THRESHOLD: f64 = 1.6;

/// Magnitude of the perturbation applied along the dominant eigenvector when
/// seeding a new subcluster or re-perturbing a stale pair.
pub const SUBCLUSTER_PERTURBATION: f64 = 0.8;

/// Safety multiplier applied to the initial temperature bound derived from
/// the input's color covariance.
pub const INITIAL_TEMPERATURE_SAFETY_FACTOR: f64 = 1.1;

/// Bound on the number of retained undo/redo snapshots.
pub const MAX_HISTORY_DEPTH: usize = 12;
