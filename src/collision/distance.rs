//! Closest points and distance between convex shapes using the GJK algorithm.
//!
//! Shapes enter GJK as [`DistanceProxy`]s, which are just vertex lists with a radius.
//! The core algorithm works on the vertices only and the radii are applied at the end.

use super::shape::Shape;
use crate::{
    math::{self as m, Pose},
    settings::{EPSILON, MAX_GJK_ITERATIONS, MAX_POLYGON_VERTICES},
};

/// A convex shape in the form used by GJK.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceProxy {
    vertices: [m::Vec2; MAX_POLYGON_VERTICES],
    count: usize,
    pub radius: f64,
}

impl DistanceProxy {
    /// Make a proxy out of a child of a shape.
    pub fn new(shape: &Shape, child: usize) -> Self {
        match shape {
            Shape::Circle(c) => Self::from_vertices(&[c.position], c.radius),
            Shape::Polygon(p) => Self::from_vertices(p.vertices(), p.radius),
            Shape::Edge(e) => Self::from_vertices(&[e.v1, e.v2], e.radius),
            Shape::Chain(c) => {
                let (v1, v2) = c.edge_vertices(child);
                Self::from_vertices(&[v1, v2], c.radius)
            }
        }
    }

    /// Make a proxy from a list of vertices forming a convex shape.
    /// Vertices beyond `MAX_POLYGON_VERTICES` are ignored.
    pub fn from_vertices(vertices: &[m::Vec2], radius: f64) -> Self {
        debug_assert!(!vertices.is_empty() && vertices.len() <= MAX_POLYGON_VERTICES);
        let mut proxy = Self {
            vertices: [m::Vec2::zero(); MAX_POLYGON_VERTICES],
            count: vertices.len().min(MAX_POLYGON_VERTICES),
            radius,
        };
        proxy.vertices[..proxy.count].copy_from_slice(&vertices[..proxy.count]);
        proxy
    }

    #[inline]
    pub fn vertices(&self) -> &[m::Vec2] {
        &self.vertices[..self.count]
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn vertex(&self, index: usize) -> m::Vec2 {
        debug_assert!(index < self.count);
        self.vertices[index]
    }

    /// Index of the vertex furthest in the direction `d`.
    pub fn support(&self, d: m::Vec2) -> usize {
        let mut best_index = 0;
        let mut best_value = self.vertices[0].dot(d);
        for (i, v) in self.vertices().iter().enumerate().skip(1) {
            let value = v.dot(d);
            if value > best_value {
                best_index = i;
                best_value = value;
            }
        }
        best_index
    }

    #[inline]
    pub fn support_vertex(&self, d: m::Vec2) -> m::Vec2 {
        self.vertices[self.support(d)]
    }
}

/// Warm start data for GJK, returned from one call and passed into the next.
/// Set `count` to zero on the first call.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SimplexCache {
    /// Length or area of the simplex.
    pub metric: f64,
    pub count: usize,
    /// Vertices on shape A.
    pub index_a: [usize; 3],
    /// Vertices on shape B.
    pub index_b: [usize; 3],
}

#[derive(Clone, Copy, Debug)]
pub struct DistanceInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub pose_a: Pose,
    pub pose_b: Pose,
    /// Whether to account for shape radii in the result.
    pub use_radii: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceOutput {
    /// Closest point on shape A.
    pub point_a: m::Vec2,
    /// Closest point on shape B.
    pub point_b: m::Vec2,
    pub distance: f64,
    /// Number of GJK iterations used.
    pub iterations: usize,
}

//
// Simplex
//

#[derive(Clone, Copy, Debug, Default)]
struct SimplexVertex {
    /// Support point on proxy A.
    w_a: m::Vec2,
    /// Support point on proxy B.
    w_b: m::Vec2,
    /// `w_b - w_a`
    w: m::Vec2,
    /// Barycentric coordinate for the closest point.
    a: f64,
    index_a: usize,
    index_b: usize,
}

impl SimplexVertex {
    fn new(
        proxy_a: &DistanceProxy,
        pose_a: &Pose,
        index_a: usize,
        proxy_b: &DistanceProxy,
        pose_b: &Pose,
        index_b: usize,
    ) -> Self {
        let w_a = *pose_a * proxy_a.vertex(index_a);
        let w_b = *pose_b * proxy_b.vertex(index_b);
        Self {
            w_a,
            w_b,
            w: w_b - w_a,
            a: 1.0,
            index_a,
            index_b,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn read_cache(
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        pose_a: &Pose,
        proxy_b: &DistanceProxy,
        pose_b: &Pose,
    ) -> Self {
        debug_assert!(cache.count <= 3);
        let mut simplex = Simplex::default();

        // copy data from the cache, as long as it still refers to valid vertices
        let cache_valid = cache.count <= 3
            && (0..cache.count).all(|i| {
                cache.index_a[i] < proxy_a.vertex_count() && cache.index_b[i] < proxy_b.vertex_count()
            });
        if cache_valid {
            simplex.count = cache.count;
            for i in 0..cache.count {
                let mut v = SimplexVertex::new(
                    proxy_a,
                    pose_a,
                    cache.index_a[i],
                    proxy_b,
                    pose_b,
                    cache.index_b[i],
                );
                v.a = 0.0;
                simplex.v[i] = v;
            }
        }

        // compute the new simplex metric, if it is substantially different than
        // the old metric then flush the simplex
        if simplex.count > 1 {
            let metric1 = cache.metric;
            let metric2 = simplex.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < EPSILON {
                simplex.count = 0;
            }
        }

        // if the cache is empty or invalid, start from the first vertices
        if simplex.count == 0 {
            simplex.v[0] = SimplexVertex::new(proxy_a, pose_a, 0, proxy_b, pose_b, 0);
            simplex.count = 1;
        }

        simplex
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for (i, v) in self.v[..self.count].iter().enumerate() {
            cache.index_a[i] = v.index_a;
            cache.index_b[i] = v.index_b;
        }
    }

    fn search_direction(&self) -> m::Vec2 {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = m::cross(e12, -self.v[0].w);
                if sgn > 0.0 {
                    // origin is left of e12
                    m::left_normal(e12)
                } else {
                    // origin is right of e12
                    m::right_normal(e12)
                }
            }
            _ => {
                debug_assert!(false, "no search direction for simplex of {}", self.count);
                m::Vec2::zero()
            }
        }
    }

    fn witness_points(&self) -> (m::Vec2, m::Vec2) {
        let [v1, v2, v3] = &self.v;
        match self.count {
            1 => (v1.w_a, v1.w_b),
            2 => (
                v1.a * v1.w_a + v2.a * v2.w_a,
                v1.a * v1.w_b + v2.a * v2.w_b,
            ),
            3 => {
                let p = v1.a * v1.w_a + v2.a * v2.w_a + v3.a * v3.w_a;
                (p, p)
            }
            _ => {
                debug_assert!(false, "invalid simplex size {}", self.count);
                (m::Vec2::zero(), m::Vec2::zero())
            }
        }
    }

    fn metric(&self) -> f64 {
        let [v1, v2, v3] = &self.v;
        match self.count {
            2 => (v1.w - v2.w).mag(),
            3 => m::cross(v2.w - v1.w, v3.w - v1.w),
            _ => 0.0,
        }
    }

    // Solve a line segment using barycentric coordinates.
    //
    // p = a1 * w1 + a2 * w2
    // a1 + a2 = 1
    //
    // The vector from the origin to the closest point on the line is
    // perpendicular to the line.
    // e12 = w2 - w1
    // dot(p, e) = 0
    // a1 * dot(w1, e) + a2 * dot(w2, e) = 0
    //
    // 2-by-2 linear system
    // [1      1     ][a1] = [1]
    // [w1.e12 w2.e12][a2] = [0]
    //
    // Define
    // d12_1 =  dot(w2, e12)
    // d12_2 = -dot(w1, e12)
    // d12 = d12_1 + d12_2
    //
    // Solution
    // a1 = d12_1 / d12
    // a2 = d12_2 / d12
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        // w1 region
        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            // a2 <= 0, so we clamp it to 0
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // w2 region
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            // a1 <= 0, so we clamp it to 0
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // must be in e12 region
        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv_d12;
        self.v[1].a = d12_2 * inv_d12;
        self.count = 2;
    }

    // Possible regions:
    // - points[2]
    // - edge points[0]-points[2]
    // - edge points[1]-points[2]
    // - inside the triangle
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        // edge12
        // [1      1     ][a1] = [1]
        // [w1.e12 w2.e12][a2] = [0]
        // a3 = 0
        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        // edge13
        // [1      1     ][a1] = [1]
        // [w1.e13 w3.e13][a3] = [0]
        // a2 = 0
        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        // edge23
        // [1      1     ][a2] = [1]
        // [w2.e23 w3.e23][a3] = [0]
        // a1 = 0
        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        // triangle123
        let n123 = m::cross(e12, e13);
        let d123_1 = n123 * m::cross(w2, w3);
        let d123_2 = n123 * m::cross(w3, w1);
        let d123_3 = n123 * m::cross(w1, w2);

        // w1 region
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // e12
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv_d12 = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv_d12;
            self.v[1].a = d12_2 * inv_d12;
            self.count = 2;
            return;
        }

        // e13
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv_d13 = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv_d13;
            self.v[2].a = d13_2 * inv_d13;
            self.count = 2;
            self.v[1] = self.v[2];
            return;
        }

        // w2 region
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // w3 region
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[2].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[2];
            return;
        }

        // e23
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv_d23 = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv_d23;
            self.v[2].a = d23_2 * inv_d23;
            self.count = 2;
            self.v[0] = self.v[2];
            return;
        }

        // must be in triangle123
        let inv_d123 = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv_d123;
        self.v[1].a = d123_2 * inv_d123;
        self.v[2].a = d123_3 * inv_d123;
        self.count = 3;
    }
}

//
// Context
//

/// Caller-owned state for GJK queries, tracking statistics across calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DistanceContext {
    /// Number of distance queries run.
    pub calls: usize,
    /// Total number of GJK iterations across all queries.
    pub iterations: usize,
    /// The most iterations any single query has used.
    pub max_iterations: usize,
}

impl DistanceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the statistics.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Compute the closest points between two shapes.
    ///
    /// The cache is read for warm starting and rewritten with the final simplex.
    /// On the first call set `cache.count` to zero.
    pub fn distance(&mut self, input: &DistanceInput, cache: &mut SimplexCache) -> DistanceOutput {
        self.calls += 1;

        let proxy_a = &input.proxy_a;
        let proxy_b = &input.proxy_b;
        let pose_a = &input.pose_a;
        let pose_b = &input.pose_b;

        // initialize the simplex
        let mut simplex = Simplex::read_cache(cache, proxy_a, pose_a, proxy_b, pose_b);

        // get simplex vertices as an array
        let mut save_a = [0; 3];
        let mut save_b = [0; 3];

        // main iteration loop
        let mut iter = 0;
        while iter < MAX_GJK_ITERATIONS {
            // copy simplex so we can identify duplicates
            let save_count = simplex.count;
            for i in 0..save_count {
                save_a[i] = simplex.v[i].index_a;
                save_b[i] = simplex.v[i].index_b;
            }

            match simplex.count {
                2 => simplex.solve2(),
                3 => simplex.solve3(),
                _ => {}
            }

            // if we have 3 points, then the origin is in the corresponding triangle
            if simplex.count == 3 {
                break;
            }

            let d = simplex.search_direction();

            // ensure the search direction is numerically fit
            if d.mag_sq() < EPSILON * EPSILON {
                // the origin is probably contained by a line segment or triangle,
                // thus the shapes are overlapped. we can't return zero here even
                // though there may be overlap
                break;
            }

            // compute a tentative new simplex vertex using support points
            let index_a = proxy_a.support(m::inv_rotate(pose_a, -d));
            let index_b = proxy_b.support(m::inv_rotate(pose_b, d));
            simplex.v[simplex.count] =
                SimplexVertex::new(proxy_a, pose_a, index_a, proxy_b, pose_b, index_b);

            iter += 1;
            self.iterations += 1;

            // check for duplicate support points. this is the main termination criterion
            let duplicate = (0..save_count).any(|i| save_a[i] == index_a && save_b[i] == index_b);
            if duplicate {
                // if we found a duplicate support point we must exit to avoid cycling
                break;
            }

            // new vertex is ok and needed
            simplex.count += 1;
        }

        self.max_iterations = self.max_iterations.max(iter);
        if iter == MAX_GJK_ITERATIONS {
            log::debug!("GJK exited on the iteration cap of {}", MAX_GJK_ITERATIONS);
        }

        // prepare output
        let (mut point_a, mut point_b) = simplex.witness_points();
        let mut distance = (point_b - point_a).mag();

        simplex.write_cache(cache);

        // apply radii if requested
        if input.use_radii {
            let r_a = proxy_a.radius;
            let r_b = proxy_b.radius;

            if distance > r_a + r_b && distance > EPSILON {
                // shapes are still not overlapped,
                // move the witness points to the outer surface
                distance -= r_a + r_b;
                let normal = (point_b - point_a).normalized();
                point_a += r_a * normal;
                point_b -= r_b * normal;
            } else {
                // shapes are overlapped when radii are considered,
                // move the witness points to the middle
                let p = 0.5 * (point_a + point_b);
                point_a = p;
                point_b = p;
                distance = 0.0;
            }
        }

        DistanceOutput {
            point_a,
            point_b,
            distance,
            iterations: iter,
        }
    }

    /// Test whether two shape children overlap, accounting for their radii.
    pub fn test_overlap(
        &mut self,
        shape_a: &Shape,
        child_a: usize,
        pose_a: &Pose,
        shape_b: &Shape,
        child_b: usize,
        pose_b: &Pose,
    ) -> bool {
        let input = DistanceInput {
            proxy_a: DistanceProxy::new(shape_a, child_a),
            proxy_b: DistanceProxy::new(shape_b, child_b),
            pose_a: *pose_a,
            pose_b: *pose_b,
            use_radii: true,
        };
        let mut cache = SimplexCache::default();
        let output = self.distance(&input, &mut cache);
        output.distance < 10.0 * EPSILON
    }
}

/// Compute the closest points between two shapes without tracking statistics.
/// See [`DistanceContext::distance`].
pub fn compute_distance(input: &DistanceInput, cache: &mut SimplexCache) -> DistanceOutput {
    DistanceContext::new().distance(input, cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collision::shape::{CircleShape, EdgeShape, PolygonShape},
        settings::POLYGON_RADIUS,
    };
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn v(x: f64, y: f64) -> m::Vec2 {
        m::Vec2::new(x, y)
    }

    fn at(x: f64, y: f64) -> Pose {
        Pose::new(v(x, y), m::Rotor2::identity())
    }

    fn input(a: &Shape, pose_a: Pose, b: &Shape, pose_b: Pose, use_radii: bool) -> DistanceInput {
        DistanceInput {
            proxy_a: DistanceProxy::new(a, 0),
            proxy_b: DistanceProxy::new(b, 0),
            pose_a,
            pose_b,
            use_radii,
        }
    }

    fn point_segment_distance(p: m::Vec2, a: m::Vec2, b: m::Vec2) -> f64 {
        let ab = b - a;
        let t = ((p - a).dot(ab) / ab.mag_sq()).clamp(0.0, 1.0);
        (p - (a + t * ab)).mag()
    }

    /// Distance between separated convex polygons, the slow way.
    fn brute_force_distance(a: &[m::Vec2], b: &[m::Vec2]) -> f64 {
        let mut min = f64::MAX;
        for (poly, other) in [(a, b), (b, a)] {
            for p in poly {
                for i in 0..other.len() {
                    let q1 = other[i];
                    let q2 = other[(i + 1) % other.len()];
                    min = min.min(point_segment_distance(*p, q1, q2));
                }
            }
        }
        min
    }

    #[test]
    fn separated_boxes() {
        let square = Shape::from(PolygonShape::new_box(1.0, 1.0));
        let mut cache = SimplexCache::default();
        let out = compute_distance(&input(&square, at(0.0, 0.0), &square, at(5.0, 0.0), false), &mut cache);
        assert!((out.distance - 3.0).abs() < 1e-12);
        assert!((out.point_a.x - 1.0).abs() < 1e-12);
        assert!((out.point_b.x - 4.0).abs() < 1e-12);
        assert!(cache.count > 0);

        let mut cache = SimplexCache::default();
        let out = compute_distance(&input(&square, at(0.0, 0.0), &square, at(5.0, 0.0), true), &mut cache);
        assert!((out.distance - (3.0 - 2.0 * POLYGON_RADIUS)).abs() < 1e-12);
        assert!((out.point_a.x - (1.0 + POLYGON_RADIUS)).abs() < 1e-12);
    }

    #[test]
    fn circle_and_box() {
        let circle = Shape::from(CircleShape::new(0.5));
        let square = Shape::from(PolygonShape::new_box(1.0, 1.0));
        let mut cache = SimplexCache::default();
        let out = compute_distance(&input(&square, at(0.0, 0.0), &circle, at(3.0, 0.5), true), &mut cache);
        assert!((out.distance - (3.0 - 1.0 - 0.5 - POLYGON_RADIUS)).abs() < 1e-12);
        assert!((out.point_b - v(2.5, 0.5)).mag() < 1e-12);
    }

    #[test]
    fn swapping_shapes_swaps_witness_points() {
        let circle = Shape::from(CircleShape::new(0.5));
        let square = Shape::from(PolygonShape::new_box(1.0, 1.0));
        let (pose_sq, pose_c) = (at(0.0, 0.0), at(3.0, 0.7));

        let mut cache = SimplexCache::default();
        let ab = compute_distance(&input(&square, pose_sq, &circle, pose_c, true), &mut cache);
        let mut cache = SimplexCache::default();
        let ba = compute_distance(&input(&circle, pose_c, &square, pose_sq, true), &mut cache);

        assert!((ab.distance - ba.distance).abs() < 1e-12);
        assert!((ab.point_a - v(1.0 + POLYGON_RADIUS, 0.7)).mag() < 1e-12);
        assert!((ab.point_b - v(2.5, 0.7)).mag() < 1e-12);
        assert!((ba.point_a - ab.point_b).mag() < 1e-12);
        assert!((ba.point_b - ab.point_a).mag() < 1e-12);

        // corner against face has a unique closest pair
        let diamond = Shape::from(PolygonShape::new_oriented_box(
            0.5,
            0.5,
            m::Vec2::zero(),
            m::Angle::Deg(45.0),
        ));
        let pose_d = at(3.0, 0.2);
        let mut cache = SimplexCache::default();
        let ab = compute_distance(&input(&square, pose_sq, &diamond, pose_d, false), &mut cache);
        let mut cache = SimplexCache::default();
        let ba = compute_distance(&input(&diamond, pose_d, &square, pose_sq, false), &mut cache);

        let corner = v(3.0 - 0.5 * 2.0_f64.sqrt(), 0.2);
        assert!((ab.distance - (corner.x - 1.0)).abs() < 1e-9);
        assert!((ab.point_b - corner).mag() < 1e-9);
        assert!((ab.point_a - v(1.0, 0.2)).mag() < 1e-9);
        assert!((ba.point_a - ab.point_b).mag() < 1e-9);
        assert!((ba.point_b - ab.point_a).mag() < 1e-9);
    }

    #[test]
    fn touching_cores() {
        let square = Shape::from(PolygonShape::new_box(1.0, 1.0));
        let (pose_a, pose_b) = (at(0.0, 0.0), at(2.0, 0.3));

        let mut cache = SimplexCache::default();
        let out = compute_distance(&input(&square, pose_a, &square, pose_b, false), &mut cache);
        assert!(out.distance.abs() < 1e-9);
        assert!((out.point_a.x - 1.0).abs() < 1e-9);
        assert!((out.point_b.x - 1.0).abs() < 1e-9);
        assert!((out.point_a - out.point_b).mag() < 1e-9);

        // the skins overlap, so the witness points meet in the middle
        let mut cache = SimplexCache::default();
        let out = compute_distance(&input(&square, pose_a, &square, pose_b, true), &mut cache);
        assert_eq!(out.distance, 0.0);
        assert_eq!(out.point_a, out.point_b);
        assert!((out.point_a.x - 1.0).abs() < 1e-9);

        // circle center exactly on the face
        let circle = Shape::from(CircleShape::new(0.5));
        let mut cache = SimplexCache::default();
        let out = compute_distance(&input(&square, pose_a, &circle, at(1.0, 0.2), true), &mut cache);
        assert_eq!(out.distance, 0.0);
        assert_eq!(out.point_a, out.point_b);
        assert!((out.point_a - v(1.0, 0.2)).mag() < 1e-9);
    }

    #[test]
    fn overlapping_shapes_have_zero_distance() {
        let square = Shape::from(PolygonShape::new_box(1.0, 1.0));
        let rotated = Pose::new(v(1.0, 0.5), m::Rotor2::from_angle(0.3));
        let mut cache = SimplexCache::default();
        let out = compute_distance(&input(&square, at(0.0, 0.0), &square, rotated, true), &mut cache);
        assert_eq!(out.distance, 0.0);
        assert_eq!(out.point_a, out.point_b);

        let mut ctx = DistanceContext::new();
        assert!(ctx.test_overlap(&square, 0, &at(0.0, 0.0), &square, 0, &rotated));
        // gap smaller than the two skins still counts as overlap
        assert!(ctx.test_overlap(&square, 0, &at(0.0, 0.0), &square, 0, &at(2.0 + POLYGON_RADIUS, 0.0)));
        assert!(!ctx.test_overlap(&square, 0, &at(0.0, 0.0), &square, 0, &at(2.1, 0.0)));
        assert_eq!(ctx.calls, 3);
    }

    #[test]
    fn edge_proxies() {
        let edge = Shape::from(EdgeShape::new(v(-1.0, 0.0), v(1.0, 0.0)));
        let circle = Shape::from(CircleShape::new(0.25));
        let mut cache = SimplexCache::default();
        let out = compute_distance(&input(&edge, at(0.0, 0.0), &circle, at(0.3, 1.0), false), &mut cache);
        assert!((out.distance - 1.0).abs() < 1e-12);
        assert!((out.point_a - v(0.3, 0.0)).mag() < 1e-12);
        assert_eq!(cache.count, 2);
    }

    #[test]
    fn warm_start_reuses_simplex() {
        let a = Shape::from(PolygonShape::new(&[v(0.0, 0.0), v(2.0, 0.3), v(1.5, 1.7), v(-0.4, 1.1)]).unwrap());
        let b = Shape::from(PolygonShape::new(&[v(0.1, -1.0), v(1.0, 0.2), v(-1.0, 0.9)]).unwrap());
        let pose_b = Pose::new(v(4.0, 1.0), m::Rotor2::from_angle(0.4));
        let mut ctx = DistanceContext::new();
        let mut cache = SimplexCache::default();

        let cold = ctx.distance(&input(&a, at(0.0, 0.0), &b, pose_b, false), &mut cache);
        let warm = ctx.distance(&input(&a, at(0.0, 0.0), &b, pose_b, false), &mut cache);
        assert!((cold.distance - warm.distance).abs() < 1e-12);
        assert!(warm.iterations <= cold.iterations);
        assert_eq!(ctx.calls, 2);
        assert_eq!(ctx.iterations, cold.iterations + warm.iterations);
        assert_eq!(ctx.max_iterations, cold.iterations);
    }

    #[test]
    fn stale_cache_indices_are_ignored() {
        let square = Shape::from(PolygonShape::new_box(1.0, 1.0));
        let circle = Shape::from(CircleShape::new(1.0));
        let mut cache = SimplexCache {
            metric: 1.0,
            count: 2,
            index_a: [3, 2, 0],
            index_b: [3, 1, 0],
        };
        let out = compute_distance(&input(&square, at(0.0, 0.0), &circle, at(4.0, 0.0), false), &mut cache);
        assert!((out.distance - 3.0).abs() < 1e-12);
    }

    #[test]
    fn random_polygons_match_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut ctx = DistanceContext::new();

        for _ in 0..200 {
            let mut random_poly = || {
                let n = rng.gen_range(3..=MAX_POLYGON_VERTICES);
                let points: Vec<m::Vec2> = (0..n)
                    .map(|_| v(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
                    .collect();
                PolygonShape::new(&points).ok()
            };
            let (Some(poly_a), Some(poly_b)) = (random_poly(), random_poly()) else {
                continue;
            };

            let pose_a = Pose::new(v(0.0, 0.0), m::Rotor2::from_angle(rng.gen_range(0.0..6.0)));
            let pose_b = Pose::new(
                v(rng.gen_range(3.0..5.0), rng.gen_range(-3.0..3.0)),
                m::Rotor2::from_angle(rng.gen_range(0.0..6.0)),
            );
            let world_a: Vec<m::Vec2> = poly_a.vertices().iter().map(|p| pose_a * *p).collect();
            let world_b: Vec<m::Vec2> = poly_b.vertices().iter().map(|p| pose_b * *p).collect();
            let expected = brute_force_distance(&world_a, &world_b);

            let shape_a = Shape::from(poly_a);
            let shape_b = Shape::from(poly_b);
            let mut cache = SimplexCache::default();
            let ab = ctx.distance(&input(&shape_a, pose_a, &shape_b, pose_b, false), &mut cache);
            let mut cache = SimplexCache::default();
            let ba = ctx.distance(&input(&shape_b, pose_b, &shape_a, pose_a, false), &mut cache);

            assert!((ab.distance - expected).abs() < 1e-7, "{} != {}", ab.distance, expected);
            assert!((ab.distance - ba.distance).abs() < 1e-7);
            assert!(((ab.point_b - ab.point_a).mag() - ab.distance).abs() < 1e-9);
            assert!(((ba.point_b - ba.point_a).mag() - ba.distance).abs() < 1e-9);
            // swapped witness points still lie on their own shapes
            let on_boundary = |p: m::Vec2, poly: &[m::Vec2]| {
                (0..poly.len())
                    .map(|i| point_segment_distance(p, poly[i], poly[(i + 1) % poly.len()]))
                    .fold(f64::MAX, f64::min)
                    < 1e-7
            };
            assert!(on_boundary(ab.point_a, &world_a) && on_boundary(ab.point_b, &world_b));
            assert!(on_boundary(ba.point_a, &world_b) && on_boundary(ba.point_b, &world_a));
        }
        assert!(ctx.max_iterations < MAX_GJK_ITERATIONS);
    }
}
