use super::{
    collide_polygon::{ABSOLUTE_TOL, RELATIVE_TOL},
    manifold::{clip_segment_to_line, ClipVertex, ContactFeature, ContactFeatureType, Manifold, ManifoldKind},
    shape::{CircleShape, EdgeShape, PolygonShape},
};
use crate::{
    math::{self as m, Pose},
    settings::{ANGULAR_SLOP, EPSILON, MAX_MANIFOLD_POINTS, MAX_POLYGON_VERTICES},
};

//
// EDGE <-> CIRCLE
//

/// Compute the collision manifold between an edge and a circle.
///
/// Ghost vertices on the edge suppress contacts that belong to a neighboring edge.
pub fn collide_edge_and_circle(
    edge_a: &EdgeShape,
    pose_a: &Pose,
    circle_b: &CircleShape,
    pose_b: &Pose,
) -> Manifold {
    let mut manifold = Manifold::empty();

    // compute circle in the frame of the edge
    let q = m::inv_transform(pose_a, *pose_b * circle_b.position);

    let a = edge_a.v1;
    let b = edge_a.v2;
    let e = b - a;
    let den = e.mag_sq();
    if den <= EPSILON * EPSILON {
        return manifold;
    }

    // barycentric coordinates
    let u = e.dot(b - q);
    let v = e.dot(q - a);

    let radius = edge_a.radius + circle_b.radius;

    let mut id = ContactFeature {
        index_b: 0,
        type_b: ContactFeatureType::Vertex,
        ..Default::default()
    };

    // region A
    if v <= 0.0 {
        let d = q - a;
        if d.mag_sq() > radius * radius {
            return manifold;
        }

        // is there an edge connected to A?
        if edge_a.has_vertex0 {
            let a1 = edge_a.v0;
            let b1 = a;
            let e1 = b1 - a1;
            let u1 = e1.dot(b1 - q);
            // is the circle in region AB of the previous edge?
            if u1 > 0.0 {
                return manifold;
            }
        }

        id.index_a = 0;
        id.type_a = ContactFeatureType::Vertex;
        manifold.kind = ManifoldKind::Circles;
        manifold.local_normal = m::Vec2::zero();
        manifold.local_point = a;
        manifold.push_point(circle_b.position, id);
        return manifold;
    }

    // region B
    if u <= 0.0 {
        let d = q - b;
        if d.mag_sq() > radius * radius {
            return manifold;
        }

        // is there an edge connected to B?
        if edge_a.has_vertex3 {
            let b2 = edge_a.v3;
            let a2 = b;
            let e2 = b2 - a2;
            let v2 = e2.dot(q - a2);
            // is the circle in region AB of the next edge?
            if v2 > 0.0 {
                return manifold;
            }
        }

        id.index_a = 1;
        id.type_a = ContactFeatureType::Vertex;
        manifold.kind = ManifoldKind::Circles;
        manifold.local_normal = m::Vec2::zero();
        manifold.local_point = b;
        manifold.push_point(circle_b.position, id);
        return manifold;
    }

    // region AB
    let p = (1.0 / den) * (u * a + v * b);
    let d = q - p;
    if d.mag_sq() > radius * radius {
        return manifold;
    }

    let mut n = m::left_normal(e);
    if n.dot(q - a) < 0.0 {
        n = -n;
    }

    id.index_a = 0;
    id.type_a = ContactFeatureType::Face;
    manifold.kind = ManifoldKind::FaceA;
    manifold.local_normal = n.normalized();
    manifold.local_point = a;
    manifold.push_point(circle_b.position, id);
    manifold
}

//
// EDGE <-> POLYGON
//

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AxisKind {
    EdgeA,
    EdgeB,
}

/// A separating axis candidate.
#[derive(Clone, Copy, Debug)]
struct Axis {
    kind: AxisKind,
    index: usize,
    separation: f64,
}

/// The polygon in the edge's frame of reference.
#[derive(Clone, Copy, Debug)]
struct TempPolygon {
    vertices: [m::Vec2; MAX_POLYGON_VERTICES],
    normals: [m::Vec2; MAX_POLYGON_VERTICES],
    count: usize,
}

impl Default for TempPolygon {
    fn default() -> Self {
        Self {
            vertices: [m::Vec2::zero(); MAX_POLYGON_VERTICES],
            normals: [m::Vec2::zero(); MAX_POLYGON_VERTICES],
            count: 0,
        }
    }
}

/// The face the incident edge is clipped against.
#[derive(Clone, Copy, Debug, Default)]
struct ReferenceFace {
    i1: usize,
    i2: usize,
    v1: m::Vec2,
    v2: m::Vec2,
    normal: m::Vec2,
    side_normal1: m::Vec2,
    side_offset1: f64,
    side_normal2: m::Vec2,
    side_offset2: f64,
}

/// Working state for edge-polygon collision.
///
/// This algorithm accounts for the neighbors of the edge (ghost vertices)
/// so that polygons sliding across a chain don't catch on the internal corners.
/// The polygon is transformed into the edge's frame and the edge normal is
/// limited to the range allowed by the neighboring edges.
///
/// Algorithm:
/// 1. Classify v1 and v2
/// 2. Classify polygon centroid as front or back
/// 3. Flip normal if necessary
/// 4. Initialize normal range to [-pi, pi] about face normal
/// 5. Adjust normal range according to adjacent edges
/// 6. Visit each separating axis, only accept axes within the range
/// 7. Return if _any_ axis indicates separation
/// 8. Clip
#[derive(Clone, Copy, Debug)]
pub struct EdgePolygonCollider {
    polygon_b: TempPolygon,

    pose: Pose,
    centroid_b: m::Vec2,
    v0: m::Vec2,
    v1: m::Vec2,
    v2: m::Vec2,
    v3: m::Vec2,
    normal0: m::Vec2,
    normal1: m::Vec2,
    normal2: m::Vec2,
    normal: m::Vec2,
    lower_limit: m::Vec2,
    upper_limit: m::Vec2,
    radius: f64,
    front: bool,
}

impl Default for EdgePolygonCollider {
    fn default() -> Self {
        Self {
            polygon_b: TempPolygon::default(),
            pose: Pose::identity(),
            centroid_b: m::Vec2::zero(),
            v0: m::Vec2::zero(),
            v1: m::Vec2::zero(),
            v2: m::Vec2::zero(),
            v3: m::Vec2::zero(),
            normal0: m::Vec2::zero(),
            normal1: m::Vec2::zero(),
            normal2: m::Vec2::zero(),
            normal: m::Vec2::zero(),
            lower_limit: m::Vec2::zero(),
            upper_limit: m::Vec2::zero(),
            radius: 0.0,
            front: false,
        }
    }
}

impl EdgePolygonCollider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the collision manifold between an edge and a polygon.
    pub fn collide(
        &mut self,
        edge_a: &EdgeShape,
        pose_a: &Pose,
        polygon_b: &PolygonShape,
        pose_b: &Pose,
    ) -> Manifold {
        let mut manifold = Manifold::empty();

        self.pose = m::relative_pose(pose_a, pose_b);
        self.centroid_b = self.pose * polygon_b.centroid();

        self.v0 = edge_a.v0;
        self.v1 = edge_a.v1;
        self.v2 = edge_a.v2;
        self.v3 = edge_a.v3;

        let has_vertex0 = edge_a.has_vertex0;
        let has_vertex3 = edge_a.has_vertex3;

        let edge1 = self.v2 - self.v1;
        if edge1.mag_sq() <= EPSILON * EPSILON {
            return manifold;
        }
        let edge1 = edge1.normalized();
        self.normal1 = m::right_normal(edge1);
        let offset1 = self.normal1.dot(self.centroid_b - self.v1);
        let mut offset0 = 0.0;
        let mut offset2 = 0.0;
        let mut convex1 = false;
        let mut convex2 = false;

        // is there a preceding edge?
        if has_vertex0 {
            let edge0 = (self.v1 - self.v0).normalized();
            self.normal0 = m::right_normal(edge0);
            convex1 = m::cross(edge0, edge1) >= 0.0;
            offset0 = self.normal0.dot(self.centroid_b - self.v0);
        }

        // is there a following edge?
        if has_vertex3 {
            let edge2 = (self.v3 - self.v2).normalized();
            self.normal2 = m::right_normal(edge2);
            convex2 = m::cross(edge1, edge2) > 0.0;
            offset2 = self.normal2.dot(self.centroid_b - self.v2);
        }

        self.classify(has_vertex0, has_vertex3, convex1, convex2, offset0, offset1, offset2);

        // get the polygon in the edge's frame
        self.polygon_b.count = polygon_b.vertex_count();
        for (i, (v, n)) in polygon_b.vertices().iter().zip(polygon_b.normals()).enumerate() {
            self.polygon_b.vertices[i] = self.pose * *v;
            self.polygon_b.normals[i] = self.pose.rotation * *n;
        }

        self.radius = polygon_b.radius + edge_a.radius;

        let edge_axis = self.compute_edge_separation();
        if edge_axis.separation > self.radius {
            return manifold;
        }

        let polygon_axis = self.compute_polygon_separation();
        if let Some(axis) = polygon_axis {
            if axis.separation > self.radius {
                return manifold;
            }
        }

        // use hysteresis for jitter reduction
        let primary_axis = match polygon_axis {
            Some(axis) if axis.separation > RELATIVE_TOL * edge_axis.separation + ABSOLUTE_TOL => axis,
            _ => edge_axis,
        };

        let count = self.polygon_b.count;
        let (incident_edge, rf) = if primary_axis.kind == AxisKind::EdgeA {
            manifold.kind = ManifoldKind::FaceA;

            // search for the polygon normal that is most anti-parallel to the edge normal
            let mut best_index = 0;
            let mut best_value = self.normal.dot(self.polygon_b.normals[0]);
            for i in 1..count {
                let value = self.normal.dot(self.polygon_b.normals[i]);
                if value < best_value {
                    best_value = value;
                    best_index = i;
                }
            }

            let i1 = best_index;
            let i2 = (i1 + 1) % count;
            let face_vertex = |i: usize| ClipVertex {
                v: self.polygon_b.vertices[i],
                id: ContactFeature {
                    index_a: 0,
                    index_b: i as u8,
                    type_a: ContactFeatureType::Face,
                    type_b: ContactFeatureType::Vertex,
                },
            };
            let incident_edge = [face_vertex(i1), face_vertex(i2)];

            let rf = if self.front {
                ReferenceFace {
                    i1: 0,
                    i2: 1,
                    v1: self.v1,
                    v2: self.v2,
                    normal: self.normal1,
                    ..Default::default()
                }
            } else {
                ReferenceFace {
                    i1: 1,
                    i2: 0,
                    v1: self.v2,
                    v2: self.v1,
                    normal: -self.normal1,
                    ..Default::default()
                }
            };
            (incident_edge, rf)
        } else {
            manifold.kind = ManifoldKind::FaceB;

            // ids are labeled from the reference polygon's side and swapped back below
            let edge_vertex = |v: m::Vec2, i: usize| ClipVertex {
                v,
                id: ContactFeature {
                    index_a: primary_axis.index as u8,
                    index_b: i as u8,
                    type_a: ContactFeatureType::Face,
                    type_b: ContactFeatureType::Vertex,
                },
            };
            let incident_edge = [edge_vertex(self.v1, 0), edge_vertex(self.v2, 1)];

            let i1 = primary_axis.index;
            let i2 = (i1 + 1) % count;
            let rf = ReferenceFace {
                i1,
                i2,
                v1: self.polygon_b.vertices[i1],
                v2: self.polygon_b.vertices[i2],
                normal: self.polygon_b.normals[i1],
                ..Default::default()
            };
            (incident_edge, rf)
        };

        let rf = ReferenceFace {
            side_normal1: m::right_normal(rf.normal),
            side_normal2: -m::right_normal(rf.normal),
            side_offset1: m::right_normal(rf.normal).dot(rf.v1),
            side_offset2: -m::right_normal(rf.normal).dot(rf.v2),
            ..rf
        };

        // clip incident edge against extruded edge1 side edges
        let (clip_points1, np) =
            clip_segment_to_line(&incident_edge, rf.side_normal1, rf.side_offset1, rf.i1);
        if np < MAX_MANIFOLD_POINTS {
            return Manifold::empty();
        }
        let (clip_points2, np) =
            clip_segment_to_line(&clip_points1, rf.side_normal2, rf.side_offset2, rf.i2);
        if np < MAX_MANIFOLD_POINTS {
            return Manifold::empty();
        }

        // now clip_points2 contains the clipped points
        if primary_axis.kind == AxisKind::EdgeA {
            manifold.local_normal = rf.normal;
            manifold.local_point = rf.v1;
        } else {
            manifold.local_normal = polygon_b.normals()[rf.i1];
            manifold.local_point = polygon_b.vertices()[rf.i1];
        }

        for cp in &clip_points2 {
            let separation = rf.normal.dot(cp.v - rf.v1);
            if separation <= self.radius {
                if primary_axis.kind == AxisKind::EdgeA {
                    manifold.push_point(m::inv_transform(&self.pose, cp.v), cp.id);
                } else {
                    manifold.push_point(cp.v, cp.id.swapped());
                }
            }
        }

        manifold
    }

    /// Determine front or back collision and the collision normal limits
    /// from the convexity of the neighboring edges.
    #[allow(clippy::too_many_arguments)]
    fn classify(
        &mut self,
        has_vertex0: bool,
        has_vertex3: bool,
        convex1: bool,
        convex2: bool,
        offset0: f64,
        offset1: f64,
        offset2: f64,
    ) {
        let (n0, n1, n2) = (self.normal0, self.normal1, self.normal2);

        // (front, normal if front, lower and upper limits if front, same for back)
        let (front, lower_front, upper_front, lower_back, upper_back) = match (has_vertex0, has_vertex3) {
            (true, true) => match (convex1, convex2) {
                (true, true) => (
                    offset0 >= 0.0 || offset1 >= 0.0 || offset2 >= 0.0,
                    n0,
                    n2,
                    -n1,
                    -n1,
                ),
                (true, false) => (
                    offset0 >= 0.0 || (offset1 >= 0.0 && offset2 >= 0.0),
                    n0,
                    n1,
                    -n2,
                    -n1,
                ),
                (false, true) => (
                    offset2 >= 0.0 || (offset0 >= 0.0 && offset1 >= 0.0),
                    n1,
                    n2,
                    -n1,
                    -n0,
                ),
                (false, false) => (
                    offset0 >= 0.0 && offset1 >= 0.0 && offset2 >= 0.0,
                    n1,
                    n1,
                    -n2,
                    -n0,
                ),
            },
            (true, false) => {
                if convex1 {
                    (offset0 >= 0.0 || offset1 >= 0.0, n0, -n1, n1, -n1)
                } else {
                    (offset0 >= 0.0 && offset1 >= 0.0, n1, -n1, n1, -n0)
                }
            }
            (false, true) => {
                if convex2 {
                    (offset1 >= 0.0 || offset2 >= 0.0, -n1, n2, -n1, n1)
                } else {
                    (offset1 >= 0.0 && offset2 >= 0.0, -n1, n1, -n2, n1)
                }
            }
            (false, false) => (offset1 >= 0.0, -n1, -n1, n1, n1),
        };

        self.front = front;
        if front {
            self.normal = n1;
            self.lower_limit = lower_front;
            self.upper_limit = upper_front;
        } else {
            self.normal = -n1;
            self.lower_limit = lower_back;
            self.upper_limit = upper_back;
        }
    }

    fn compute_edge_separation(&self) -> Axis {
        let separation = self.polygon_b.vertices[..self.polygon_b.count]
            .iter()
            .map(|v| self.normal.dot(*v - self.v1))
            .fold(f64::MAX, f64::min);

        Axis {
            kind: AxisKind::EdgeA,
            index: if self.front { 0 } else { 1 },
            separation,
        }
    }

    /// Find the polygon face with the largest separation from the edge,
    /// among the faces whose normals are within the allowed range.
    fn compute_polygon_separation(&self) -> Option<Axis> {
        let mut axis: Option<Axis> = None;

        let perp = m::left_normal(self.normal);

        for i in 0..self.polygon_b.count {
            let n = -self.polygon_b.normals[i];

            let s1 = n.dot(self.polygon_b.vertices[i] - self.v1);
            let s2 = n.dot(self.polygon_b.vertices[i] - self.v2);
            let s = s1.min(s2);

            if s > self.radius {
                // no collision
                return Some(Axis {
                    kind: AxisKind::EdgeB,
                    index: i,
                    separation: s,
                });
            }

            if !self.axis_in_range(n, perp) {
                continue;
            }

            if axis.map_or(true, |best| s > best.separation) {
                axis = Some(Axis {
                    kind: AxisKind::EdgeB,
                    index: i,
                    separation: s,
                });
            }
        }

        axis
    }

    /// Whether a polygon axis lies within the normal range set by the adjacent edges.
    fn axis_in_range(&self, n: m::Vec2, perp: m::Vec2) -> bool {
        let limit = if n.dot(perp) >= 0.0 {
            self.upper_limit
        } else {
            self.lower_limit
        };
        (n - limit).dot(self.normal) >= -ANGULAR_SLOP
    }
}

/// Compute the collision manifold between an edge and a polygon
/// using a fresh [`EdgePolygonCollider`].
pub fn collide_edge_and_polygon(
    edge_a: &EdgeShape,
    pose_a: &Pose,
    polygon_b: &PolygonShape,
    pose_b: &Pose,
) -> Manifold {
    EdgePolygonCollider::new().collide(edge_a, pose_a, polygon_b, pose_b)
}
