use super::{
    manifold::{clip_segment_to_line, ClipVertex, ContactFeature, ContactFeatureType, Manifold, ManifoldKind},
    shape::PolygonShape,
};
use crate::math::{self as m, Pose};

/// Relative tolerance for preferring the first polygon's reference face.
pub(crate) const RELATIVE_TOL: f64 = 0.98;
/// Absolute tolerance for preferring the first polygon's reference face.
pub(crate) const ABSOLUTE_TOL: f64 = 0.001;

//
// POLYGON <-> POLYGON
//

/// Separation of `poly2` from the edge `edge1` of `poly1`,
/// measured from the deepest vertex of `poly2` along the edge normal.
fn edge_separation(
    poly1: &PolygonShape,
    pose1: &Pose,
    edge1: usize,
    poly2: &PolygonShape,
    pose2: &Pose,
) -> f64 {
    // convert normal from poly1's frame into poly2's frame
    let normal1_world = pose1.rotation * poly1.normals()[edge1];
    let normal1 = m::inv_rotate(pose2, normal1_world);

    // find support vertex on poly2 for -normal
    let vertices2 = poly2.vertices();
    let mut index = 0;
    let mut min_dot = f64::MAX;
    for (i, v) in vertices2.iter().enumerate() {
        let dot = v.dot(normal1);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let v1 = *pose1 * poly1.vertices()[edge1];
    let v2 = *pose2 * vertices2[index];
    (v2 - v1).dot(normal1_world)
}

/// Find the edge of `poly1` with the largest separation from `poly2`.
///
/// Starts from the edge facing the centroid of `poly2`
/// and climbs towards neighbors with larger separation.
fn find_max_separation(
    poly1: &PolygonShape,
    pose1: &Pose,
    poly2: &PolygonShape,
    pose2: &Pose,
) -> (usize, f64) {
    let count1 = poly1.vertex_count();

    // vector pointing from the centroid of poly1 to the centroid of poly2
    let d = *pose2 * poly2.centroid() - *pose1 * poly1.centroid();
    let d_local1 = m::inv_rotate(pose1, d);

    // find edge normal on poly1 that has the largest projection onto d
    let mut edge = 0;
    let mut max_dot = f64::MIN;
    for (i, n) in poly1.normals().iter().enumerate() {
        let dot = n.dot(d_local1);
        if dot > max_dot {
            max_dot = dot;
            edge = i;
        }
    }

    // get the separation for the edge normal and its neighbors
    let s = edge_separation(poly1, pose1, edge, poly2, pose2);
    let prev_edge = (edge + count1 - 1) % count1;
    let s_prev = edge_separation(poly1, pose1, prev_edge, poly2, pose2);
    let next_edge = (edge + 1) % count1;
    let s_next = edge_separation(poly1, pose1, next_edge, poly2, pose2);

    // find the best edge and the search direction
    let (forward, mut best_edge, mut best_separation) = if s_prev > s && s_prev > s_next {
        (false, prev_edge, s_prev)
    } else if s_next > s {
        (true, next_edge, s_next)
    } else {
        return (edge, s);
    };

    // perform a local search for the best edge normal
    loop {
        let edge = if forward {
            (best_edge + 1) % count1
        } else {
            (best_edge + count1 - 1) % count1
        };
        let s = edge_separation(poly1, pose1, edge, poly2, pose2);
        if s > best_separation {
            best_edge = edge;
            best_separation = s;
        } else {
            break;
        }
    }

    (best_edge, best_separation)
}

/// Find the edge of `poly2` most anti-parallel to the reference edge `edge1` of `poly1`,
/// in world coordinates.
fn find_incident_edge(
    poly1: &PolygonShape,
    pose1: &Pose,
    edge1: usize,
    poly2: &PolygonShape,
    pose2: &Pose,
) -> [ClipVertex; 2] {
    // get the normal of the reference edge in poly2's frame
    let normal1 = m::inv_rotate(pose2, pose1.rotation * poly1.normals()[edge1]);

    // find the incident edge on poly2
    let mut index = 0;
    let mut min_dot = f64::MAX;
    for (i, n) in poly2.normals().iter().enumerate() {
        let dot = normal1.dot(*n);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = (i1 + 1) % poly2.vertex_count();
    let face_vertex = |i: usize| ClipVertex {
        v: *pose2 * poly2.vertices()[i],
        id: ContactFeature {
            index_a: edge1 as u8,
            index_b: i as u8,
            type_a: ContactFeatureType::Face,
            type_b: ContactFeatureType::Vertex,
        },
    };
    [face_vertex(i1), face_vertex(i2)]
}

/// Compute the collision manifold between two polygons.
///
/// Find edge normal of max separation on A, return if separating axis is found.
/// Find edge normal of max separation on B, return if separating axis is found.
/// Choose reference edge as min(minA, minB).
/// Find incident edge.
/// Clip.
pub fn collide_polygons(
    poly_a: &PolygonShape,
    pose_a: &Pose,
    poly_b: &PolygonShape,
    pose_b: &Pose,
) -> Manifold {
    let mut manifold = Manifold::empty();
    let total_radius = poly_a.radius + poly_b.radius;

    let (edge_a, separation_a) = find_max_separation(poly_a, pose_a, poly_b, pose_b);
    if separation_a > total_radius {
        return manifold;
    }

    let (edge_b, separation_b) = find_max_separation(poly_b, pose_b, poly_a, pose_a);
    if separation_b > total_radius {
        return manifold;
    }

    // prefer A's face unless B's is clearly better, to avoid flip-flopping
    let (poly1, pose1, poly2, pose2, edge1, flip) =
        if separation_b > RELATIVE_TOL * separation_a + ABSOLUTE_TOL {
            manifold.kind = ManifoldKind::FaceB;
            (poly_b, pose_b, poly_a, pose_a, edge_b, true)
        } else {
            manifold.kind = ManifoldKind::FaceA;
            (poly_a, pose_a, poly_b, pose_b, edge_a, false)
        };

    let incident_edge = find_incident_edge(poly1, pose1, edge1, poly2, pose2);

    let iv1 = edge1;
    let iv2 = (edge1 + 1) % poly1.vertex_count();

    let v11 = poly1.vertices()[iv1];
    let v12 = poly1.vertices()[iv2];

    let local_tangent = (v12 - v11).normalized();
    let local_normal = m::right_normal(local_tangent);
    let plane_point = 0.5 * (v11 + v12);

    let tangent = pose1.rotation * local_tangent;
    let normal = m::right_normal(tangent);

    let v11 = *pose1 * v11;
    let v12 = *pose1 * v12;

    // face offset
    let front_offset = normal.dot(v11);

    // side offsets, extended by polytope skin thickness
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    // clip incident edge against extruded edge1 side edges
    let (clip_points1, np) = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1);
    if np < 2 {
        return Manifold::empty();
    }
    let (clip_points2, np) = clip_segment_to_line(&clip_points1, tangent, side_offset2, iv2);
    if np < 2 {
        return Manifold::empty();
    }

    // now clip_points2 contains the clipped points
    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    for cp in &clip_points2 {
        let separation = normal.dot(cp.v) - front_offset;
        if separation <= total_radius {
            let id = if flip { cp.id.swapped() } else { cp.id };
            manifold.push_point(m::inv_transform(pose2, cp.v), id);
        }
    }

    manifold
}
