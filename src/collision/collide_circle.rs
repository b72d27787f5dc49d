use super::{
    manifold::{ContactId, Manifold, ManifoldKind},
    shape::{CircleShape, PolygonShape},
};
use crate::{
    math::{self as m, Pose},
    settings::EPSILON,
};

//
// CIRCLE <-> CIRCLE
//

/// Compute the collision manifold between two circles.
pub fn collide_circles(
    circle_a: &CircleShape,
    pose_a: &Pose,
    circle_b: &CircleShape,
    pose_b: &Pose,
) -> Manifold {
    let mut manifold = Manifold::empty();

    let p_a = *pose_a * circle_a.position;
    let p_b = *pose_b * circle_b.position;

    let dist_sq = (p_b - p_a).mag_sq();
    let radius = circle_a.radius + circle_b.radius;
    if dist_sq > radius * radius {
        return manifold;
    }

    manifold.kind = ManifoldKind::Circles;
    manifold.local_point = circle_a.position;
    manifold.local_normal = m::Vec2::zero();
    manifold.push_point(circle_b.position, ContactId::default());
    manifold
}

//
// POLYGON <-> CIRCLE
//

/// Compute the collision manifold between a polygon and a circle.
pub fn collide_polygon_and_circle(
    polygon_a: &PolygonShape,
    pose_a: &Pose,
    circle_b: &CircleShape,
    pose_b: &Pose,
) -> Manifold {
    let mut manifold = Manifold::empty();

    // circle position in the frame of the polygon
    let c = *pose_b * circle_b.position;
    let c_local = m::inv_transform(pose_a, c);

    let radius = polygon_a.radius + circle_b.radius;
    let vertices = polygon_a.vertices();
    let normals = polygon_a.normals();

    // find the min separating edge
    let mut normal_index = 0;
    let mut separation = f64::MIN;
    for (i, (v, n)) in vertices.iter().zip(normals).enumerate() {
        let s = n.dot(c_local - *v);
        if s > radius {
            // early out
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    // vertices that subtend the incident face
    let v1 = vertices[normal_index];
    let v2 = vertices[(normal_index + 1) % vertices.len()];

    manifold.kind = ManifoldKind::FaceA;

    // if the center is inside the polygon
    if separation < EPSILON {
        manifold.local_normal = normals[normal_index];
        manifold.local_point = 0.5 * (v1 + v2);
        manifold.push_point(circle_b.position, ContactId::default());
        return manifold;
    }

    // compute barycentric coordinates
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);

    if u1 <= 0.0 {
        // closest to v1
        if (c_local - v1).mag_sq() > radius * radius {
            return Manifold::empty();
        }
        manifold.local_normal = (c_local - v1).normalized();
        manifold.local_point = v1;
    } else if u2 <= 0.0 {
        // closest to v2
        if (c_local - v2).mag_sq() > radius * radius {
            return Manifold::empty();
        }
        manifold.local_normal = (c_local - v2).normalized();
        manifold.local_point = v2;
    } else {
        // closest to the face
        let face_center = 0.5 * (v1 + v2);
        let s = (c_local - face_center).dot(normals[normal_index]);
        if s > radius {
            return Manifold::empty();
        }
        manifold.local_normal = normals[normal_index];
        manifold.local_point = face_center;
    }

    manifold.push_point(circle_b.position, ContactId::default());
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::manifold::WorldManifold;

    fn at(x: f64, y: f64) -> Pose {
        Pose::new(m::Vec2::new(x, y), m::Rotor2::identity())
    }

    #[test]
    fn circles_touch_within_radius_sum() {
        let c = CircleShape::new(1.0);
        let manifold = collide_circles(&c, &at(0.0, 0.0), &c, &at(1.5, 0.0));
        assert_eq!(manifold.point_count, 1);
        assert_eq!(manifold.kind, ManifoldKind::Circles);
        assert_eq!(manifold.points[0].id.key(), 0);

        let wm = WorldManifold::new(&manifold, &at(0.0, 0.0), 1.0, &at(1.5, 0.0), 1.0);
        assert!((wm.normal - m::Vec2::unit_x()).mag() < 1e-12);
        assert!((wm.separations[0] + 0.5).abs() < 1e-12);

        assert!(collide_circles(&c, &at(0.0, 0.0), &c, &at(2.01, 0.0)).is_empty());
        // exactly touching counts
        assert_eq!(collide_circles(&c, &at(0.0, 0.0), &c, &at(2.0, 0.0)).point_count, 1);
    }

    #[test]
    fn circle_on_square_face() {
        let square = PolygonShape::new_box(1.0, 1.0);
        let circle = CircleShape::new(0.5);
        let manifold = collide_polygon_and_circle(&square, &at(0.0, 0.0), &circle, &at(0.0, 1.4));
        assert_eq!(manifold.point_count, 1);
        assert_eq!(manifold.kind, ManifoldKind::FaceA);
        assert!((manifold.local_normal - m::Vec2::unit_y()).mag() < 1e-12);

        let wm = WorldManifold::new(&manifold, &at(0.0, 0.0), square.radius, &at(0.0, 1.4), 0.5);
        assert!((wm.normal - m::Vec2::unit_y()).mag() < 1e-12);
        // penetration of 0.1 plus the polygon skin
        assert!((wm.separations[0] + 0.1 + square.radius).abs() < 1e-12);

        assert!(collide_polygon_and_circle(&square, &at(0.0, 0.0), &circle, &at(0.0, 1.6)).is_empty());
    }

    #[test]
    fn circle_near_square_corner() {
        let square = PolygonShape::new_box(1.0, 1.0);
        let circle = CircleShape::new(0.5);
        let manifold = collide_polygon_and_circle(&square, &at(0.0, 0.0), &circle, &at(1.3, 1.3));
        assert_eq!(manifold.point_count, 1);
        assert!((manifold.local_point - m::Vec2::new(1.0, 1.0)).mag() < 1e-12);
        let diagonal = m::Vec2::new(1.0, 1.0).normalized();
        assert!((manifold.local_normal - diagonal).mag() < 1e-12);

        // out of reach diagonally even though both face separations are within the radius
        assert!(collide_polygon_and_circle(&square, &at(0.0, 0.0), &circle, &at(1.45, 1.45)).is_empty());
    }

    #[test]
    fn circle_center_inside_polygon() {
        let square = PolygonShape::new_box(1.0, 1.0);
        let circle = CircleShape::new(0.25);
        let manifold = collide_polygon_and_circle(&square, &at(0.0, 0.0), &circle, &at(0.9, 0.0));
        assert_eq!(manifold.point_count, 1);
        assert!((manifold.local_normal - m::Vec2::unit_x()).mag() < 1e-12);
        assert!((manifold.local_point - m::Vec2::new(1.0, 0.0)).mag() < 1e-12);
    }
}
