//! Global tolerances and tunable parameters for collision detection.
//!
//! The constants are tuned for a world where objects are between
//! 0.1 and 10 units in size and moving objects have speeds of a few units per step.

use std::f64::consts::PI;

/// The maximum number of contact points between two convex shapes.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// The maximum number of vertices on a convex polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// A small length used as a collision and constraint tolerance.
/// Usually chosen to be numerically significant but visually insignificant.
pub const LINEAR_SLOP: f64 = 0.005;

/// A small angle used as a collision and constraint tolerance.
pub const ANGULAR_SLOP: f64 = 2.0 / 180.0 * PI;

/// The radius of the polygon/edge shape skin.
/// This should not be modified. Making it smaller means polygons will have an
/// insufficient buffer for continuous collision.
/// Making it larger may create artifacts for vertex collision.
pub const POLYGON_RADIUS: f64 = 2.0 * LINEAR_SLOP;

/// Machine epsilon used for degenerate-case checks.
pub const EPSILON: f64 = f64::EPSILON;

/// Fattening margin added to every proxy AABB in the dynamic tree.
/// This allows proxies to move by a small amount without triggering a tree update.
pub const AABB_EXTENSION: f64 = 0.1;

/// Used to fatten AABBs in the dynamic tree along the direction of motion.
/// This is used to predict the future position based on the current displacement.
pub const AABB_MULTIPLIER: f64 = 2.0;

/// Iteration cap for the GJK distance algorithm.
pub const MAX_GJK_ITERATIONS: usize = 20;

/// Iteration cap for the outer conservative advancement loop of time of impact.
pub const MAX_TOI_ITERATIONS: usize = 20;

/// Iteration cap for the root finder inside time of impact.
pub const MAX_TOI_ROOT_ITERATIONS: usize = 50;

/// Parameters for the creation of a dynamic AABB tree.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct TreeParams {
    /// Margin added on every side of a proxy's AABB when it is inserted.
    /// Larger margins mean fewer tree updates for slowly moving objects
    /// but more false positive pairs.
    pub aabb_extension: f64,
    /// Factor applied to a proxy's displacement when it is reinserted,
    /// extending its fat AABB in the direction of travel.
    pub aabb_multiplier: f64,
    /// How many nodes to initially allocate space for.
    /// More space will be allocated as needed.
    pub initial_capacity: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            aabb_extension: AABB_EXTENSION,
            aabb_multiplier: AABB_MULTIPLIER,
            initial_capacity: 16,
        }
    }
}

/// Parameters for time of impact computation.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct ToiParams {
    /// The slop used to compute the target separation.
    /// Time of impact stops `3 * linear_slop` short of touching
    /// and uses `linear_slop / 4` as its tolerance.
    pub linear_slop: f64,
    /// Cap on the outer conservative advancement loop.
    pub max_iterations: usize,
    /// Cap on the inner root finder.
    pub max_root_iterations: usize,
}

impl Default for ToiParams {
    fn default() -> Self {
        Self {
            linear_slop: LINEAR_SLOP,
            max_iterations: MAX_TOI_ITERATIONS,
            max_root_iterations: MAX_TOI_ROOT_ITERATIONS,
        }
    }
}
