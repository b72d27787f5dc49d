//! Dispatch of shape pairs to the matching manifold generator.

use super::{
    collide_circle::{collide_circles, collide_polygon_and_circle},
    collide_edge::{collide_edge_and_circle, EdgePolygonCollider},
    collide_polygon::collide_polygons,
    distance::DistanceContext,
    manifold::Manifold,
    shape::{CircleShape, EdgeShape, PolygonShape, Shape},
};
use crate::math::Pose;

/// Caller-owned scratch state for narrow phase collision.
///
/// Reusing a context avoids reinitializing the edge-polygon collider
/// and accumulates GJK statistics from overlap tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct CollisionContext {
    edge_polygon: EdgePolygonCollider,
    pub distance: DistanceContext,
}

impl CollisionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the contact manifold between child `child_a` of `shape_a`
    /// and child `child_b` of `shape_b`.
    ///
    /// The manifold is always expressed with `shape_a` as shape A,
    /// so its normal points from A to B.
    /// Pairs of edges or chains never collide and give an empty manifold.
    pub fn collide(
        &mut self,
        shape_a: &Shape,
        child_a: usize,
        pose_a: &Pose,
        shape_b: &Shape,
        child_b: usize,
        pose_b: &Pose,
    ) -> Manifold {
        let _span = tracy_span!("collide", "CollisionContext::collide");

        use ConvexChild::*;
        match (ConvexChild::of(shape_a, child_a), ConvexChild::of(shape_b, child_b)) {
            (Circle(a), Circle(b)) => collide_circles(a, pose_a, b, pose_b),

            (Polygon(a), Circle(b)) => collide_polygon_and_circle(a, pose_a, b, pose_b),
            (Circle(a), Polygon(b)) => collide_polygon_and_circle(b, pose_b, a, pose_a).flipped(),

            (Polygon(a), Polygon(b)) => collide_polygons(a, pose_a, b, pose_b),

            (Edge(a), Circle(b)) => collide_edge_and_circle(&a, pose_a, b, pose_b),
            (Circle(a), Edge(b)) => collide_edge_and_circle(&b, pose_b, a, pose_a).flipped(),

            (Edge(a), Polygon(b)) => self.edge_polygon.collide(&a, pose_a, b, pose_b),
            (Polygon(a), Edge(b)) => self.edge_polygon.collide(&b, pose_b, a, pose_a).flipped(),

            (Edge(_), Edge(_)) => Manifold::empty(),
        }
    }

    /// Test whether two shape children overlap using GJK.
    /// See [`DistanceContext::test_overlap`].
    pub fn test_overlap(
        &mut self,
        shape_a: &Shape,
        child_a: usize,
        pose_a: &Pose,
        shape_b: &Shape,
        child_b: usize,
        pose_b: &Pose,
    ) -> bool {
        self.distance
            .test_overlap(shape_a, child_a, pose_a, shape_b, child_b, pose_b)
    }
}

/// A single convex piece of a shape. Chains contribute one edge per child.
enum ConvexChild<'a> {
    Circle(&'a CircleShape),
    Polygon(&'a PolygonShape),
    Edge(EdgeShape),
}

impl<'a> ConvexChild<'a> {
    fn of(shape: &'a Shape, child: usize) -> Self {
        match shape {
            Shape::Circle(c) => ConvexChild::Circle(c),
            Shape::Polygon(p) => ConvexChild::Polygon(p),
            Shape::Edge(e) => ConvexChild::Edge(*e),
            Shape::Chain(c) => ConvexChild::Edge(c.child_edge(child)),
        }
    }
}

/// Compute the contact manifold between two shape children with a fresh context.
/// See [`CollisionContext::collide`].
pub fn collide(
    shape_a: &Shape,
    child_a: usize,
    pose_a: &Pose,
    shape_b: &Shape,
    child_b: usize,
    pose_b: &Pose,
) -> Manifold {
    CollisionContext::new().collide(shape_a, child_a, pose_a, shape_b, child_b, pose_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collision::{
            manifold::{ManifoldKind, WorldManifold},
            shape::ChainShape,
        },
        math as m,
    };

    fn at(x: f64, y: f64) -> Pose {
        Pose::new(m::Vec2::new(x, y), m::Rotor2::identity())
    }

    fn world(manifold: &Manifold, a: &Shape, pose_a: &Pose, b: &Shape, pose_b: &Pose) -> WorldManifold {
        WorldManifold::new(manifold, pose_a, a.radius(), pose_b, b.radius())
    }

    #[test]
    fn circle_square_either_order() {
        let square: Shape = PolygonShape::new_box(1.0, 1.0).into();
        let circle: Shape = CircleShape::new(0.5).into();
        let (pose_sq, pose_c) = (at(0.0, 0.0), at(1.3, 0.2));

        let forward = collide(&square, 0, &pose_sq, &circle, 0, &pose_c);
        let reverse = collide(&circle, 0, &pose_c, &square, 0, &pose_sq);
        assert_eq!(forward.point_count, 1);
        assert_eq!(reverse.point_count, 1);
        assert_eq!(forward.kind, ManifoldKind::FaceA);
        assert_eq!(reverse.kind, ManifoldKind::FaceB);

        let wf = world(&forward, &square, &pose_sq, &circle, &pose_c);
        let wr = world(&reverse, &circle, &pose_c, &square, &pose_sq);
        // same contact, opposite normal
        assert!((wf.normal + wr.normal).mag() < 1e-12);
        assert!((wf.separations[0] - wr.separations[0]).abs() < 1e-12);
        assert!((wf.points[0] - wr.points[0]).mag() < 1e-12);
    }

    #[test]
    fn reversed_circles_swap_local_points() {
        let a: Shape = CircleShape::new(1.0).with_position(m::Vec2::new(0.1, 0.0)).into();
        let b: Shape = CircleShape::new(0.5).into();
        let (pose_a, pose_b) = (at(0.0, 0.0), at(1.2, 0.0));

        let forward = collide(&a, 0, &pose_a, &b, 0, &pose_b);
        let reverse = collide(&b, 0, &pose_b, &a, 0, &pose_a);
        assert_eq!(forward.flipped(), reverse);

        let wr = world(&reverse, &b, &pose_b, &a, &pose_a);
        assert!((wr.normal + m::Vec2::unit_x()).mag() < 1e-12);
    }

    #[test]
    fn polygon_on_chain() {
        let ground: Shape = ChainShape::new_open(&[
            m::Vec2::new(-4.0, 0.0),
            m::Vec2::new(-2.0, 0.0),
            m::Vec2::new(2.0, 0.0),
            m::Vec2::new(4.0, 0.0),
        ])
        .unwrap()
        .into();
        let square: Shape = PolygonShape::new_box(0.5, 0.5).into();
        let pose_sq = at(0.0, 0.49);
        let pose_ground = at(0.0, 0.0);

        let mut ctx = CollisionContext::new();
        // the middle child is directly below the box
        let manifold = ctx.collide(&ground, 1, &pose_ground, &square, 0, &pose_sq);
        assert_eq!(manifold.point_count, 2);
        let wm = world(&manifold, &ground, &pose_ground, &square, &pose_sq);
        assert!((wm.normal - m::Vec2::unit_y()).mag() < 1e-12);

        // reversed, the normal points down from the box into the ground
        let manifold = ctx.collide(&square, 0, &pose_sq, &ground, 1, &pose_ground);
        assert_eq!(manifold.point_count, 2);
        let wm = world(&manifold, &square, &pose_sq, &ground, &pose_ground);
        assert!((wm.normal + m::Vec2::unit_y()).mag() < 1e-12);

        // the box doesn't reach the outer children
        assert!(ctx.collide(&ground, 0, &pose_ground, &square, 0, &pose_sq).is_empty());
        assert!(ctx.test_overlap(&ground, 1, &pose_ground, &square, 0, &pose_sq));
        assert!(!ctx.test_overlap(&ground, 0, &pose_ground, &square, 0, &pose_sq));
    }

    #[test]
    fn edges_never_collide_with_edges() {
        let edge: Shape = EdgeShape::new(m::Vec2::new(-1.0, 0.0), m::Vec2::new(1.0, 0.0)).into();
        let manifold = collide(&edge, 0, &at(0.0, 0.0), &edge, 0, &at(0.0, 0.0));
        assert!(manifold.is_empty());
    }
}
