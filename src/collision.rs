//! Broad phase, narrow phase and continuous collision detection.

mod aabb;
pub use aabb::{RayCastInput, RayCastOutput, AABB};

pub mod shape;
pub use shape::{ChainShape, CircleShape, EdgeShape, PolygonShape, Shape, ShapeError, ShapeType};

pub mod dynamic_tree;
pub use dynamic_tree::{DynamicTree, ProxyId, TreeError, NULL_NODE};

pub mod broadphase;
pub use broadphase::{BroadPhase, DynamicTreeBroadPhase, Pair};

pub mod distance;
pub use distance::{
    compute_distance, DistanceContext, DistanceInput, DistanceOutput, DistanceProxy, SimplexCache,
};

pub mod manifold;
pub use manifold::{
    clip_segment_to_line, point_states, ClipVertex, ContactFeature, ContactFeatureType, ContactId,
    Manifold, ManifoldKind, ManifoldPoint, PointState, WorldManifold,
};

mod collide_circle;
pub use collide_circle::{collide_circles, collide_polygon_and_circle};

mod collide_polygon;
pub use collide_polygon::collide_polygons;

mod collide_edge;
pub use collide_edge::{collide_edge_and_circle, collide_edge_and_polygon, EdgePolygonCollider};

pub mod narrowphase;
pub use narrowphase::{collide, CollisionContext};

pub mod time_of_impact;
pub use time_of_impact::{time_of_impact, ToiContext, ToiInput, ToiOutput, ToiState};
