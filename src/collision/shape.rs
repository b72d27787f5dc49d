//! The closed set of shapes that collision detection understands.

use super::{RayCastInput, RayCastOutput, AABB};
use crate::{
    math::{self as m, Pose},
    settings::{EPSILON, LINEAR_SLOP, MAX_POLYGON_VERTICES, POLYGON_RADIUS},
};

use itertools::Itertools;

/// Error when constructing a shape from invalid geometry.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("A polygon needs at least 3 distinct points, got {0}")]
    TooFewPoints(usize),
    #[error("A polygon can have at most {max} vertices, got {got}", max = MAX_POLYGON_VERTICES)]
    TooManyPoints { got: usize },
    #[error("The polygon's points are collinear")]
    Degenerate,
    #[error("A chain loop needs at least 3 vertices and an open chain at least 2, got {0}")]
    ChainTooShort(usize),
    #[error("Chain vertices {0} and {1} are too close together")]
    ChainVerticesTooClose(usize, usize),
}

/// Discriminant of [`Shape`], ordered the same way as the variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShapeType {
    Circle,
    Edge,
    Polygon,
    Chain,
}

/// The physical shape of a collider.
///
/// All shapes are convex except chains, which are made of edges
/// and collide one edge (called a child) at a time.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum Shape {
    Circle(CircleShape),
    Edge(EdgeShape),
    Polygon(PolygonShape),
    Chain(ChainShape),
}

impl Shape {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Circle(_) => ShapeType::Circle,
            Shape::Edge(_) => ShapeType::Edge,
            Shape::Polygon(_) => ShapeType::Polygon,
            Shape::Chain(_) => ShapeType::Chain,
        }
    }

    /// The skin radius of the shape.
    /// For circles this is the actual radius, for the others a small collision margin.
    pub fn radius(&self) -> f64 {
        match self {
            Shape::Circle(c) => c.radius,
            Shape::Edge(e) => e.radius,
            Shape::Polygon(p) => p.radius,
            Shape::Chain(c) => c.radius,
        }
    }

    /// Number of convex children. Only chains have more than one.
    pub fn child_count(&self) -> usize {
        match self {
            Shape::Chain(c) => c.edge_count(),
            _ => 1,
        }
    }

    /// Compute the bounding box of a child shape given the shape's pose.
    pub fn compute_aabb(&self, pose: &Pose, child: usize) -> AABB {
        match self {
            Shape::Circle(c) => c.compute_aabb(pose),
            Shape::Edge(e) => e.compute_aabb(pose),
            Shape::Polygon(p) => p.compute_aabb(pose),
            Shape::Chain(c) => c.child_edge(child).compute_aabb(pose),
        }
    }

    /// Cast a ray against a child shape.
    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        pose: &Pose,
        child: usize,
    ) -> Option<RayCastOutput> {
        match self {
            Shape::Circle(c) => c.ray_cast(input, pose),
            Shape::Edge(e) => e.ray_cast(input, pose),
            Shape::Polygon(p) => p.ray_cast(input, pose),
            Shape::Chain(c) => c.child_edge(child).ray_cast(input, pose),
        }
    }

    /// Check whether or not a point is inside the shape.
    /// Edges and chains have no area and never contain points.
    pub fn test_point(&self, pose: &Pose, point: m::Vec2) -> bool {
        match self {
            Shape::Circle(c) => c.test_point(pose, point),
            Shape::Polygon(p) => p.test_point(pose, point),
            Shape::Edge(_) | Shape::Chain(_) => false,
        }
    }
}

impl From<CircleShape> for Shape {
    fn from(c: CircleShape) -> Self {
        Shape::Circle(c)
    }
}
impl From<EdgeShape> for Shape {
    fn from(e: EdgeShape) -> Self {
        Shape::Edge(e)
    }
}
impl From<PolygonShape> for Shape {
    fn from(p: PolygonShape) -> Self {
        Shape::Polygon(p)
    }
}
impl From<ChainShape> for Shape {
    fn from(c: ChainShape) -> Self {
        Shape::Chain(c)
    }
}

//
// Circle
//

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct CircleShape {
    /// Center of the circle in shape-local space.
    pub position: m::Vec2,
    pub radius: f64,
}

impl CircleShape {
    pub fn new(radius: f64) -> Self {
        Self {
            position: m::Vec2::zero(),
            radius,
        }
    }

    pub fn with_position(mut self, position: m::Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn compute_aabb(&self, pose: &Pose) -> AABB {
        let p = *pose * self.position;
        AABB::new(p, p).padded(self.radius)
    }

    pub fn test_point(&self, pose: &Pose, point: m::Vec2) -> bool {
        let center = *pose * self.position;
        (point - center).mag_sq() <= self.radius * self.radius
    }

    /// Collision detection in "Real-Time Collision Detection", p. 177.
    pub fn ray_cast(&self, input: &RayCastInput, pose: &Pose) -> Option<RayCastOutput> {
        let position = *pose * self.position;
        let s = input.p1 - position;
        let b = s.mag_sq() - self.radius * self.radius;

        // solve quadratic equation
        let r = input.p2 - input.p1;
        let c = s.dot(r);
        let rr = r.mag_sq();
        let sigma = c * c - rr * b;

        // check for negative discriminant and short segment
        if sigma < 0.0 || rr < EPSILON {
            return None;
        }

        // find the point of intersection of the line with the circle
        let a = -(c + sigma.sqrt());

        // is the intersection point on the segment?
        if 0.0 <= a && a <= input.max_fraction * rr {
            let fraction = a / rr;
            Some(RayCastOutput {
                normal: (s + fraction * r).normalized(),
                fraction,
            })
        } else {
            None
        }
    }
}

//
// Polygon
//

/// A convex polygon with counter-clockwise winding.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "PolygonDef", into = "PolygonDef")
)]
pub struct PolygonShape {
    vertices: Vec<m::Vec2>,
    normals: Vec<m::Vec2>,
    centroid: m::Vec2,
    pub radius: f64,
}

impl PolygonShape {
    /// Create a convex polygon from a point cloud.
    ///
    /// The convex hull of the points is computed, so the points don't need to be
    /// in any particular order. Points closer than half the linear slop to each other
    /// are welded together.
    pub fn new(points: &[m::Vec2]) -> Result<Self, ShapeError> {
        if points.len() > MAX_POLYGON_VERTICES {
            return Err(ShapeError::TooManyPoints { got: points.len() });
        }

        // weld points that are too close together
        let weld_dist_sq = (0.5 * LINEAR_SLOP) * (0.5 * LINEAR_SLOP);
        let mut unique: Vec<m::Vec2> = Vec::with_capacity(points.len());
        for &p in points {
            if unique.iter().all(|u| (p - *u).mag_sq() >= weld_dist_sq) {
                unique.push(p);
            }
        }
        if unique.len() < 3 {
            return Err(ShapeError::TooFewPoints(unique.len()));
        }

        // gift wrapping algorithm, starting from the rightmost point
        // (lowest one if there are several)
        let mut i0 = 0;
        for (i, p) in unique.iter().enumerate().skip(1) {
            let best = unique[i0];
            if p.x > best.x || (p.x == best.x && p.y < best.y) {
                i0 = i;
            }
        }

        let mut hull: Vec<usize> = Vec::with_capacity(unique.len());
        let mut ih = i0;
        loop {
            hull.push(ih);
            let mut ie = 0;
            for j in 1..unique.len() {
                if ie == ih {
                    ie = j;
                    continue;
                }
                let r = unique[ie] - unique[ih];
                let v = unique[j] - unique[ih];
                let c = m::cross(r, v);
                // j is more to the right, or collinear and further away
                if c < 0.0 || (c == 0.0 && v.mag_sq() > r.mag_sq()) {
                    ie = j;
                }
            }
            ih = ie;
            if ie == i0 || hull.len() > unique.len() {
                break;
            }
        }

        if hull.len() < 3 {
            return Err(ShapeError::Degenerate);
        }

        let vertices: Vec<m::Vec2> = hull.iter().map(|&i| unique[i]).collect();
        Self::from_hull(vertices)
    }

    /// Build a polygon from vertices already known to form a counter-clockwise convex hull.
    fn from_hull(vertices: Vec<m::Vec2>) -> Result<Self, ShapeError> {
        let mut normals = Vec::with_capacity(vertices.len());
        for (v1, v2) in vertices.iter().circular_tuple_windows() {
            let edge = *v2 - *v1;
            if edge.mag_sq() <= EPSILON * EPSILON {
                return Err(ShapeError::Degenerate);
            }
            normals.push(m::right_normal(edge).normalized());
        }

        let centroid = compute_centroid(&vertices).ok_or(ShapeError::Degenerate)?;

        Ok(Self {
            vertices,
            normals,
            centroid,
            radius: POLYGON_RADIUS,
        })
    }

    /// An axis-aligned box centered at the origin.
    pub fn new_box(hw: f64, hh: f64) -> Self {
        Self {
            vertices: vec![
                m::Vec2::new(-hw, -hh),
                m::Vec2::new(hw, -hh),
                m::Vec2::new(hw, hh),
                m::Vec2::new(-hw, hh),
            ],
            normals: vec![
                m::Vec2::new(0.0, -1.0),
                m::Vec2::new(1.0, 0.0),
                m::Vec2::new(0.0, 1.0),
                m::Vec2::new(-1.0, 0.0),
            ],
            centroid: m::Vec2::zero(),
            radius: POLYGON_RADIUS,
        }
    }

    /// A box with the given half-widths, rotated and moved within the shape's local space.
    pub fn new_oriented_box(hw: f64, hh: f64, center: m::Vec2, angle: m::Angle) -> Self {
        let mut poly = Self::new_box(hw, hh);
        let pose = Pose::new(center, angle.into());
        for v in &mut poly.vertices {
            *v = pose * *v;
        }
        for n in &mut poly.normals {
            *n = pose.rotation * *n;
        }
        poly.centroid = center;
        poly
    }

    #[inline]
    pub fn vertices(&self) -> &[m::Vec2] {
        &self.vertices
    }

    /// Outward unit normals. `normals()[i]` is the normal of the edge
    /// from `vertices()[i]` to `vertices()[i + 1]`.
    #[inline]
    pub fn normals(&self) -> &[m::Vec2] {
        &self.normals
    }

    #[inline]
    pub fn centroid(&self) -> m::Vec2 {
        self.centroid
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn compute_aabb(&self, pose: &Pose) -> AABB {
        // polygons always have at least 3 vertices so this can't be None,
        // but fall back to the pose's position just in case
        AABB::from_points(self.vertices.iter().map(|v| *pose * *v))
            .unwrap_or_else(|| AABB::new(pose.translation, pose.translation))
            .padded(self.radius)
    }

    pub fn test_point(&self, pose: &Pose, point: m::Vec2) -> bool {
        let p_local = m::inv_transform(pose, point);
        self.vertices
            .iter()
            .zip(&self.normals)
            .all(|(v, n)| n.dot(p_local - *v) <= 0.0)
    }

    pub fn ray_cast(&self, input: &RayCastInput, pose: &Pose) -> Option<RayCastOutput> {
        // put the ray into the polygon's frame of reference
        let p1 = m::inv_transform(pose, input.p1);
        let p2 = m::inv_transform(pose, input.p2);
        let d = p2 - p1;

        let mut lower = 0.0;
        let mut upper = input.max_fraction;
        let mut index = None;

        for (i, (v, n)) in self.vertices.iter().zip(&self.normals).enumerate() {
            // p = p1 + a * d
            // dot(normal, p - v) = 0
            // dot(normal, p1 - v) + a * dot(normal, d) = 0
            let numerator = n.dot(*v - p1);
            let denominator = n.dot(d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else if denominator < 0.0 && numerator < lower * denominator {
                // the segment enters this half-space
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator > 0.0 && numerator < upper * denominator {
                // the segment exits this half-space
                upper = numerator / denominator;
            }

            if upper < lower {
                return None;
            }
        }

        index.map(|i| RayCastOutput {
            normal: pose.rotation * self.normals[i],
            fraction: lower,
        })
    }
}

/// Centroid of a counter-clockwise polygon, or None if it has no area.
fn compute_centroid(vertices: &[m::Vec2]) -> Option<m::Vec2> {
    let mut c = m::Vec2::zero();
    let mut area = 0.0;
    // use the first vertex as the reference point of the triangle fan
    // to keep rounding errors small for polygons far from the origin
    let p_ref = vertices[0];
    const INV3: f64 = 1.0 / 3.0;

    for (p2, p3) in vertices.iter().circular_tuple_windows() {
        let e1 = *p2 - p_ref;
        let e2 = *p3 - p_ref;
        let triangle_area = 0.5 * m::cross(e1, e2);
        area += triangle_area;
        c += triangle_area * INV3 * (p_ref + *p2 + *p3);
    }

    if area <= EPSILON {
        return None;
    }
    Some(c / area)
}

/// Serialized form of a polygon.
/// Deserializing goes through [`PolygonShape::new`], so hulls are rebuilt and validated.
#[cfg(feature = "serde-types")]
#[derive(serde::Serialize, serde::Deserialize)]
struct PolygonDef {
    vertices: Vec<m::Vec2>,
    #[serde(default = "default_radius")]
    radius: f64,
}

#[cfg(feature = "serde-types")]
fn default_radius() -> f64 {
    POLYGON_RADIUS
}

#[cfg(feature = "serde-types")]
impl TryFrom<PolygonDef> for PolygonShape {
    type Error = ShapeError;

    fn try_from(def: PolygonDef) -> Result<Self, Self::Error> {
        let mut poly = PolygonShape::new(&def.vertices)?;
        poly.radius = def.radius;
        Ok(poly)
    }
}

#[cfg(feature = "serde-types")]
impl From<PolygonShape> for PolygonDef {
    fn from(poly: PolygonShape) -> Self {
        Self {
            vertices: poly.vertices,
            radius: poly.radius,
        }
    }
}

//
// Edge
//

/// A line segment, possibly with ghost vertices from neighboring edges.
///
/// Ghost vertices don't collide on their own. They are used by chains to
/// prevent collisions against the internal corners between edges.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeShape {
    /// Ghost vertex before `v1`, only valid if `has_vertex0`.
    pub v0: m::Vec2,
    pub v1: m::Vec2,
    pub v2: m::Vec2,
    /// Ghost vertex after `v2`, only valid if `has_vertex3`.
    pub v3: m::Vec2,
    pub has_vertex0: bool,
    pub has_vertex3: bool,
    pub radius: f64,
}

impl EdgeShape {
    /// A lone edge with no neighbors.
    pub fn new(v1: m::Vec2, v2: m::Vec2) -> Self {
        Self {
            v0: m::Vec2::zero(),
            v1,
            v2,
            v3: m::Vec2::zero(),
            has_vertex0: false,
            has_vertex3: false,
            radius: POLYGON_RADIUS,
        }
    }

    pub fn with_vertex0(mut self, v0: m::Vec2) -> Self {
        self.v0 = v0;
        self.has_vertex0 = true;
        self
    }

    pub fn with_vertex3(mut self, v3: m::Vec2) -> Self {
        self.v3 = v3;
        self.has_vertex3 = true;
        self
    }

    pub fn compute_aabb(&self, pose: &Pose) -> AABB {
        let v1 = *pose * self.v1;
        let v2 = *pose * self.v2;
        AABB::new(v1.min_by_component(v2), v1.max_by_component(v2)).padded(self.radius)
    }

    pub fn ray_cast(&self, input: &RayCastInput, pose: &Pose) -> Option<RayCastOutput> {
        // put the ray into the edge's frame of reference
        let p1 = m::inv_transform(pose, input.p1);
        let p2 = m::inv_transform(pose, input.p2);
        let d = p2 - p1;

        let e = self.v2 - self.v1;
        let rr = e.mag_sq();
        if rr == 0.0 {
            return None;
        }
        let normal = m::right_normal(e).normalized();

        // q = p1 + t * d
        // dot(normal, q - v1) = 0
        // dot(normal, p1 - v1) + t * dot(normal, d) = 0
        let numerator = normal.dot(self.v1 - p1);
        let denominator = normal.dot(d);
        if denominator == 0.0 {
            return None;
        }

        let t = numerator / denominator;
        if t < 0.0 || input.max_fraction < t {
            return None;
        }

        let q = p1 + t * d;
        // q = v1 + s * r
        // s = dot(q - v1, r) / dot(r, r)
        let s = (q - self.v1).dot(e) / rr;
        if !(0.0..=1.0).contains(&s) {
            return None;
        }

        let normal = if numerator > 0.0 { -normal } else { normal };
        Some(RayCastOutput {
            normal: pose.rotation * normal,
            fraction: t,
        })
    }
}

//
// Chain
//

/// A free-form sequence of line segments, either open or closed into a loop.
///
/// Chains have two-sided collision and are meant for static level geometry.
/// Contacts are generated against one edge at a time,
/// with ghost vertices providing smooth transitions between edges.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "ChainDef", into = "ChainDef")
)]
pub struct ChainShape {
    vertices: Vec<m::Vec2>,
    is_loop: bool,
    prev_vertex: Option<m::Vec2>,
    next_vertex: Option<m::Vec2>,
    pub radius: f64,
}

impl ChainShape {
    /// A closed chain. The last vertex is connected back to the first automatically.
    pub fn new_loop(vertices: &[m::Vec2]) -> Result<Self, ShapeError> {
        if vertices.len() < 3 {
            return Err(ShapeError::ChainTooShort(vertices.len()));
        }
        Self::check_spacing(vertices, true)?;
        Ok(Self {
            vertices: vertices.to_vec(),
            is_loop: true,
            prev_vertex: None,
            next_vertex: None,
            radius: POLYGON_RADIUS,
        })
    }

    /// An open chain from the first vertex to the last.
    pub fn new_open(vertices: &[m::Vec2]) -> Result<Self, ShapeError> {
        if vertices.len() < 2 {
            return Err(ShapeError::ChainTooShort(vertices.len()));
        }
        Self::check_spacing(vertices, false)?;
        Ok(Self {
            vertices: vertices.to_vec(),
            is_loop: false,
            prev_vertex: None,
            next_vertex: None,
            radius: POLYGON_RADIUS,
        })
    }

    fn check_spacing(vertices: &[m::Vec2], is_loop: bool) -> Result<(), ShapeError> {
        let min_dist_sq = LINEAR_SLOP * LINEAR_SLOP;
        let n = vertices.len();
        let pair_count = if is_loop { n } else { n - 1 };
        for i in 0..pair_count {
            let j = (i + 1) % n;
            if (vertices[j] - vertices[i]).mag_sq() <= min_dist_sq {
                return Err(ShapeError::ChainVerticesTooClose(i, j));
            }
        }
        Ok(())
    }

    /// Establish connectivity to a vertex that precedes the first vertex of an open chain.
    /// Has no effect on loops.
    pub fn with_prev_vertex(mut self, v: m::Vec2) -> Self {
        if !self.is_loop {
            self.prev_vertex = Some(v);
        }
        self
    }

    /// Establish connectivity to a vertex that follows the last vertex of an open chain.
    /// Has no effect on loops.
    pub fn with_next_vertex(mut self, v: m::Vec2) -> Self {
        if !self.is_loop {
            self.next_vertex = Some(v);
        }
        self
    }

    #[inline]
    pub fn vertices(&self) -> &[m::Vec2] {
        &self.vertices
    }

    #[inline]
    pub fn is_loop(&self) -> bool {
        self.is_loop
    }

    /// Number of edges in the chain.
    #[inline]
    pub fn edge_count(&self) -> usize {
        if self.is_loop {
            self.vertices.len()
        } else {
            self.vertices.len() - 1
        }
    }

    /// The two endpoints of an edge.
    pub fn edge_vertices(&self, index: usize) -> (m::Vec2, m::Vec2) {
        debug_assert!(index < self.edge_count());
        let n = self.vertices.len();
        (self.vertices[index], self.vertices[(index + 1) % n])
    }

    /// Get an edge of the chain as a standalone edge shape
    /// with ghost vertices set from its neighbors.
    pub fn child_edge(&self, index: usize) -> EdgeShape {
        debug_assert!(index < self.edge_count());
        let n = self.vertices.len();
        let (v1, v2) = self.edge_vertices(index);

        let v0 = if self.is_loop {
            Some(self.vertices[(index + n - 1) % n])
        } else if index > 0 {
            Some(self.vertices[index - 1])
        } else {
            self.prev_vertex
        };

        let v3 = if self.is_loop {
            Some(self.vertices[(index + 2) % n])
        } else if index + 2 < n {
            Some(self.vertices[index + 2])
        } else {
            self.next_vertex
        };

        EdgeShape {
            v0: v0.unwrap_or_else(m::Vec2::zero),
            v1,
            v2,
            v3: v3.unwrap_or_else(m::Vec2::zero),
            has_vertex0: v0.is_some(),
            has_vertex3: v3.is_some(),
            radius: self.radius,
        }
    }
}

/// Serialized form of a chain, validated through the chain constructors on load.
#[cfg(feature = "serde-types")]
#[derive(serde::Serialize, serde::Deserialize)]
struct ChainDef {
    vertices: Vec<m::Vec2>,
    #[serde(default)]
    is_loop: bool,
    #[serde(default)]
    prev_vertex: Option<m::Vec2>,
    #[serde(default)]
    next_vertex: Option<m::Vec2>,
    #[serde(default = "default_radius")]
    radius: f64,
}

#[cfg(feature = "serde-types")]
impl TryFrom<ChainDef> for ChainShape {
    type Error = ShapeError;

    fn try_from(def: ChainDef) -> Result<Self, Self::Error> {
        let mut chain = if def.is_loop {
            ChainShape::new_loop(&def.vertices)?
        } else {
            ChainShape::new_open(&def.vertices)?
        };
        if let Some(v) = def.prev_vertex {
            chain = chain.with_prev_vertex(v);
        }
        if let Some(v) = def.next_vertex {
            chain = chain.with_next_vertex(v);
        }
        chain.radius = def.radius;
        Ok(chain)
    }
}

#[cfg(feature = "serde-types")]
impl From<ChainShape> for ChainDef {
    fn from(chain: ChainShape) -> Self {
        Self {
            vertices: chain.vertices,
            is_loop: chain.is_loop,
            prev_vertex: chain.prev_vertex,
            next_vertex: chain.next_vertex,
            radius: chain.radius,
        }
    }
}
