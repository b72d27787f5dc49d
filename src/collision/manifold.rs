//! Contact manifolds and the building blocks shared by the per-shape-pair collision functions.

use crate::{
    math::{self as m, Pose},
    settings::{EPSILON, MAX_MANIFOLD_POINTS},
};

//
// Contact ids
//

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ContactFeatureType {
    #[default]
    Vertex = 0,
    Face = 1,
}

/// The features that intersect to form a contact point.
/// This must fit in 4 bytes so it can be compared as a single integer key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ContactFeature {
    /// Feature index on shape A.
    pub index_a: u8,
    /// Feature index on shape B.
    pub index_b: u8,
    /// The feature type on shape A.
    pub type_a: ContactFeatureType,
    /// The feature type on shape B.
    pub type_b: ContactFeatureType,
}

/// Contact ids identify a contact point across time steps for warm starting.
pub type ContactId = ContactFeature;

impl ContactFeature {
    /// A contact between a vertex of shape A and a face of shape B.
    pub(crate) fn vertex_face(index_a: usize, index_b: usize) -> Self {
        Self {
            index_a: index_a as u8,
            index_b: index_b as u8,
            type_a: ContactFeatureType::Vertex,
            type_b: ContactFeatureType::Face,
        }
    }

    /// The feature packed into a single integer.
    #[inline]
    pub fn key(&self) -> u32 {
        self.index_a as u32
            | (self.index_b as u32) << 8
            | (self.type_a as u32) << 16
            | (self.type_b as u32) << 24
    }

    /// The same feature seen from the other shape.
    #[inline]
    pub fn swapped(self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

//
// Manifold
//

/// A manifold point is a contact point belonging to a contact manifold.
///
/// The local point usage depends on the manifold kind:
/// - `Circles`: the local center of circle B
/// - `FaceA`: the local center of circle B or the clip point of polygon B
/// - `FaceB`: the clip point of polygon A
///
/// The impulses are never touched by collision detection.
/// They are stored here for the solver's warm starting.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ManifoldPoint {
    pub local_point: m::Vec2,
    /// The non-penetration impulse.
    pub normal_impulse: f64,
    /// The friction impulse.
    pub tangent_impulse: f64,
    /// Uniquely identifies a contact point between two shapes.
    pub id: ContactId,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ManifoldKind {
    #[default]
    Circles,
    FaceA,
    FaceB,
}

/// A manifold for two touching convex shapes.
///
/// Multiple types of contact are supported:
/// - clip point versus plane with radius
/// - point versus point with radius (circles)
///
/// The local point usage depends on the manifold kind:
/// - `Circles`: the local center of circle A
/// - `FaceA`: the center of face A
/// - `FaceB`: the center of face B
///
/// Similarly the local normal usage:
/// - `Circles`: not used
/// - `FaceA`: the normal on polygon A
/// - `FaceB`: the normal on polygon B
///
/// Everything is stored in local coordinates so the manifold
/// stays valid while the bodies move during position correction.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Manifold {
    pub kind: ManifoldKind,
    pub local_normal: m::Vec2,
    pub local_point: m::Vec2,
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    pub point_count: usize,
}

impl Manifold {
    /// A manifold with no points.
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The contact points currently in use.
    #[inline]
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    pub(crate) fn push_point(&mut self, local_point: m::Vec2, id: ContactId) {
        debug_assert!(self.point_count < MAX_MANIFOLD_POINTS);
        self.points[self.point_count] = ManifoldPoint {
            local_point,
            id,
            ..Default::default()
        };
        self.point_count += 1;
    }

    /// The same manifold with the roles of shapes A and B exchanged.
    pub fn flipped(mut self) -> Self {
        match self.kind {
            ManifoldKind::FaceA => self.kind = ManifoldKind::FaceB,
            ManifoldKind::FaceB => self.kind = ManifoldKind::FaceA,
            ManifoldKind::Circles => {
                if self.point_count > 0 {
                    std::mem::swap(&mut self.local_point, &mut self.points[0].local_point);
                }
            }
        }
        for point in &mut self.points[..self.point_count] {
            point.id = point.id.swapped();
        }
        self
    }
}

/// A manifold converted into world space, used by the solver.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WorldManifold {
    /// World vector pointing from A to B.
    pub normal: m::Vec2,
    /// World contact points, halfway between the surfaces.
    pub points: [m::Vec2; MAX_MANIFOLD_POINTS],
    /// A negative value indicates overlap.
    pub separations: [f64; MAX_MANIFOLD_POINTS],
    pub point_count: usize,
}

impl WorldManifold {
    /// Evaluate the manifold with the given poses and shape radii.
    pub fn new(manifold: &Manifold, pose_a: &Pose, radius_a: f64, pose_b: &Pose, radius_b: f64) -> Self {
        let mut wm = WorldManifold {
            point_count: manifold.point_count,
            ..Default::default()
        };
        if manifold.point_count == 0 {
            return wm;
        }

        match manifold.kind {
            ManifoldKind::Circles => {
                wm.normal = m::Vec2::unit_x();
                let point_a = *pose_a * manifold.local_point;
                let point_b = *pose_b * manifold.points[0].local_point;
                if (point_b - point_a).mag_sq() > EPSILON * EPSILON {
                    wm.normal = (point_b - point_a).normalized();
                }

                let c_a = point_a + radius_a * wm.normal;
                let c_b = point_b - radius_b * wm.normal;
                wm.points[0] = 0.5 * (c_a + c_b);
                wm.separations[0] = (c_b - c_a).dot(wm.normal);
            }
            ManifoldKind::FaceA => {
                wm.normal = pose_a.rotation * manifold.local_normal;
                let plane_point = *pose_a * manifold.local_point;

                for (i, mp) in manifold.points().iter().enumerate() {
                    let clip_point = *pose_b * mp.local_point;
                    let c_a = clip_point
                        + (radius_a - (clip_point - plane_point).dot(wm.normal)) * wm.normal;
                    let c_b = clip_point - radius_b * wm.normal;
                    wm.points[i] = 0.5 * (c_a + c_b);
                    wm.separations[i] = (c_b - c_a).dot(wm.normal);
                }
            }
            ManifoldKind::FaceB => {
                wm.normal = pose_b.rotation * manifold.local_normal;
                let plane_point = *pose_b * manifold.local_point;

                for (i, mp) in manifold.points().iter().enumerate() {
                    let clip_point = *pose_a * mp.local_point;
                    let c_b = clip_point
                        + (radius_b - (clip_point - plane_point).dot(wm.normal)) * wm.normal;
                    let c_a = clip_point - radius_a * wm.normal;
                    wm.points[i] = 0.5 * (c_a + c_b);
                    wm.separations[i] = (c_a - c_b).dot(wm.normal);
                }

                // ensure normal points from A to B
                wm.normal = -wm.normal;
            }
        }

        wm
    }

    #[inline]
    pub fn points(&self) -> &[m::Vec2] {
        &self.points[..self.point_count]
    }
}

/// The state of a contact point going from one manifold to the next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PointState {
    /// Point does not exist.
    #[default]
    Null,
    /// Point was added in the update.
    Add,
    /// Point persisted across the update.
    Persist,
    /// Point was removed in the update.
    Remove,
}

/// Compare two manifolds of the same shape pair to find which points
/// were removed from the first and which were added in the second.
pub fn point_states(
    manifold1: &Manifold,
    manifold2: &Manifold,
) -> ([PointState; MAX_MANIFOLD_POINTS], [PointState; MAX_MANIFOLD_POINTS]) {
    let mut state1 = [PointState::Null; MAX_MANIFOLD_POINTS];
    let mut state2 = [PointState::Null; MAX_MANIFOLD_POINTS];

    // detect persists and removes
    for (i, p1) in manifold1.points().iter().enumerate() {
        let key = p1.id.key();
        state1[i] = if manifold2.points().iter().any(|p2| p2.id.key() == key) {
            PointState::Persist
        } else {
            PointState::Remove
        };
    }

    // detect persists and adds
    for (i, p2) in manifold2.points().iter().enumerate() {
        let key = p2.id.key();
        state2[i] = if manifold1.points().iter().any(|p1| p1.id.key() == key) {
            PointState::Persist
        } else {
            PointState::Add
        };
    }

    (state1, state2)
}

//
// Clipping
//

/// A vertex used for computing contact manifolds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClipVertex {
    pub v: m::Vec2,
    pub id: ContactId,
}

/// Sutherland-Hodgman clipping of a segment against the half-plane
/// `dot(normal, p) <= offset`.
///
/// Returns the clipped segment and the number of points in it (0, 1 or 2).
/// A point created by the clip gets a vertex-face id
/// with `vertex_index_a` as the clipping vertex.
pub fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: m::Vec2,
    offset: f64,
    vertex_index_a: usize,
) -> ([ClipVertex; 2], usize) {
    let mut v_out = [ClipVertex::default(); 2];
    let mut count = 0;

    // calculate the distance of end points to the line
    let distance0 = normal.dot(v_in[0].v) - offset;
    let distance1 = normal.dot(v_in[1].v) - offset;

    // if the points are behind the plane
    if distance0 <= 0.0 {
        v_out[count] = v_in[0];
        count += 1;
    }
    if distance1 <= 0.0 {
        v_out[count] = v_in[1];
        count += 1;
    }

    // if the points are on different sides of the plane
    if distance0 * distance1 < 0.0 {
        // find intersection point of edge and plane
        let interp = distance0 / (distance0 - distance1);
        v_out[count] = ClipVertex {
            v: v_in[0].v + interp * (v_in[1].v - v_in[0].v),
            // vertex A is hitting edge B
            id: ContactFeature::vertex_face(vertex_index_a, v_in[0].id.index_b as usize),
        };
        count += 1;
    }

    (v_out, count)
}
