//! 2D collision detection for rigid bodies.
//!
//! The pieces, leaves first:
//!
//! - [`DynamicTree`][collision::DynamicTree], a balanced AABB tree over fattened
//!   proxy bounds,
//! - [`DynamicTreeBroadPhase`][collision::DynamicTreeBroadPhase], which turns tree
//!   overlaps into deduplicated candidate pairs,
//! - [`compute_distance`][collision::compute_distance], GJK distance between convex shapes,
//! - manifold generation for every supported shape pair
//!   ([`collide`][collision::collide] and the per-pair functions it dispatches to),
//! - [`time_of_impact`][collision::time_of_impact()], conservative advancement for
//!   continuous collision.
//!
//! Everything here is synchronous and single-threaded per call.
//! Scratch state lives in caller-owned contexts
//! ([`DistanceContext`][collision::DistanceContext],
//! [`CollisionContext`][collision::CollisionContext],
//! [`ToiContext`][collision::ToiContext]),
//! so separate contexts can be used from separate threads.

/// Profiling span that only does something with the `tracy` feature enabled.
/// Bind the result to a variable to keep the span alive until the end of the scope.
macro_rules! tracy_span {
    ($name:expr, $fn_name:expr) => {{
        #[cfg(feature = "tracy")]
        let span = tracy_client::Client::running()
            .map(|client| client.span_alloc(Some($name), $fn_name, file!(), line!(), 0));
        #[cfg(not(feature = "tracy"))]
        let span = ();
        span
    }};
}

pub mod math;
pub use math::{uv, Angle, Pose, Rotor2, Sweep, Vec2};

pub mod settings;
pub use settings::{ToiParams, TreeParams};

pub mod collision;
pub use collision::{
    collide, compute_distance, time_of_impact, BroadPhase, ChainShape, CircleShape,
    CollisionContext, ContactFeature, ContactId, DistanceContext, DistanceInput, DistanceOutput,
    DistanceProxy, DynamicTree, DynamicTreeBroadPhase, EdgeShape, Manifold, ManifoldKind,
    ManifoldPoint, Pair, PolygonShape, ProxyId, RayCastInput, RayCastOutput, Shape, ShapeError,
    SimplexCache, ToiContext, ToiInput, ToiOutput, ToiState, WorldManifold, AABB,
};
