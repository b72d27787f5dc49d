//! Time of impact between moving convex shapes using conservative advancement.

use super::distance::{DistanceContext, DistanceInput, DistanceProxy, SimplexCache};
use crate::{
    math::{self as m, Pose, Sweep},
    settings::{ToiParams, MAX_POLYGON_VERTICES},
};

#[derive(Clone, Copy, Debug)]
pub struct ToiInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    /// Defines the sweep interval `[0, t_max]`.
    pub t_max: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ToiState {
    #[default]
    Unknown,
    /// The iteration caps were hit before converging.
    Failed,
    /// The shapes overlap at the start of the interval.
    Overlapped,
    /// The shapes come within the target separation at `t`.
    Touching,
    /// The shapes stay apart for the whole interval.
    Separated,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ToiOutput {
    pub state: ToiState,
    /// Time of impact, or `t_max` if the shapes stay separated.
    pub t: f64,
}

//
// Separation function
//

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SeparationKind {
    Points,
    FaceA,
    FaceB,
}

/// Separation of two shapes along an axis fixed by the closest features
/// found by GJK, evaluated at any time of the sweeps.
struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationKind,
    local_point: m::Vec2,
    axis: m::Vec2,
}

impl<'a> SeparationFunction<'a> {
    /// Build the function from a GJK cache at time `t1`.
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: f64,
    ) -> Self {
        debug_assert!(0 < cache.count && cache.count < 3);

        let pose_a = sweep_a.transform(t1);
        let pose_b = sweep_b.transform(t1);

        let mut f = Self {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            kind: SeparationKind::Points,
            local_point: m::Vec2::zero(),
            axis: m::Vec2::zero(),
        };

        if cache.count == 1 {
            let point_a = pose_a * proxy_a.vertex(cache.index_a[0]);
            let point_b = pose_b * proxy_b.vertex(cache.index_b[0]);
            f.axis = point_b - point_a;
            m::normalize_mut(&mut f.axis);
        } else if cache.index_a[0] == cache.index_a[1] {
            // two points on B and one on A
            f.kind = SeparationKind::FaceB;
            let local_b1 = proxy_b.vertex(cache.index_b[0]);
            let local_b2 = proxy_b.vertex(cache.index_b[1]);

            f.axis = m::right_normal(local_b2 - local_b1);
            m::normalize_mut(&mut f.axis);
            let normal = pose_b.rotation * f.axis;

            f.local_point = 0.5 * (local_b1 + local_b2);
            let point_b = pose_b * f.local_point;
            let point_a = pose_a * proxy_a.vertex(cache.index_a[0]);

            if (point_a - point_b).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        } else {
            // two points on A and one or two points on B
            f.kind = SeparationKind::FaceA;
            let local_a1 = proxy_a.vertex(cache.index_a[0]);
            let local_a2 = proxy_a.vertex(cache.index_a[1]);

            f.axis = m::right_normal(local_a2 - local_a1);
            m::normalize_mut(&mut f.axis);
            let normal = pose_a.rotation * f.axis;

            f.local_point = 0.5 * (local_a1 + local_a2);
            let point_a = pose_a * f.local_point;
            let point_b = pose_b * proxy_b.vertex(cache.index_b[0]);

            if (point_b - point_a).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        }

        f
    }

    fn poses(&self, t: f64) -> (Pose, Pose) {
        (self.sweep_a.transform(t), self.sweep_b.transform(t))
    }

    /// Find the deepest points at time `t`.
    /// Returns the support vertex indices and the separation.
    /// The index on a face side is unused and left at zero.
    fn find_min_separation(&self, t: f64) -> (usize, usize, f64) {
        let (pose_a, pose_b) = self.poses(t);

        match self.kind {
            SeparationKind::Points => {
                let index_a = self.proxy_a.support(m::inv_rotate(&pose_a, self.axis));
                let index_b = self.proxy_b.support(m::inv_rotate(&pose_b, -self.axis));
                let point_a = pose_a * self.proxy_a.vertex(index_a);
                let point_b = pose_b * self.proxy_b.vertex(index_b);
                (index_a, index_b, (point_b - point_a).dot(self.axis))
            }
            SeparationKind::FaceA => {
                let normal = pose_a.rotation * self.axis;
                let point_a = pose_a * self.local_point;
                let index_b = self.proxy_b.support(m::inv_rotate(&pose_b, -normal));
                let point_b = pose_b * self.proxy_b.vertex(index_b);
                (0, index_b, (point_b - point_a).dot(normal))
            }
            SeparationKind::FaceB => {
                let normal = pose_b.rotation * self.axis;
                let point_b = pose_b * self.local_point;
                let index_a = self.proxy_a.support(m::inv_rotate(&pose_a, -normal));
                let point_a = pose_a * self.proxy_a.vertex(index_a);
                (index_a, 0, (point_a - point_b).dot(normal))
            }
        }
    }

    /// Separation of the given support points at time `t`.
    fn evaluate(&self, index_a: usize, index_b: usize, t: f64) -> f64 {
        let (pose_a, pose_b) = self.poses(t);

        match self.kind {
            SeparationKind::Points => {
                let point_a = pose_a * self.proxy_a.vertex(index_a);
                let point_b = pose_b * self.proxy_b.vertex(index_b);
                (point_b - point_a).dot(self.axis)
            }
            SeparationKind::FaceA => {
                let normal = pose_a.rotation * self.axis;
                let point_a = pose_a * self.local_point;
                let point_b = pose_b * self.proxy_b.vertex(index_b);
                (point_b - point_a).dot(normal)
            }
            SeparationKind::FaceB => {
                let normal = pose_b.rotation * self.axis;
                let point_b = pose_b * self.local_point;
                let point_a = pose_a * self.proxy_a.vertex(index_a);
                (point_a - point_b).dot(normal)
            }
        }
    }
}

//
// Context
//

/// Caller-owned state for time of impact queries, tracking statistics across calls.
#[derive(Clone, Copy, Debug, Default)]
pub struct ToiContext {
    pub params: ToiParams,
    /// GJK statistics from the distance queries made during time of impact.
    pub distance: DistanceContext,
    pub calls: usize,
    pub iterations: usize,
    pub max_iterations: usize,
    pub root_iterations: usize,
    pub max_root_iterations: usize,
}

impl ToiContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: ToiParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    /// Compute the upper bound on time before two shapes penetrate.
    ///
    /// Time is represented as a fraction between `[0, t_max]`.
    /// This uses a swept separating axis and may miss some intermediate,
    /// non-tunneling collisions.
    /// The shapes are advanced until they are a little closer than touching,
    /// leaving `3 * linear_slop` of the total radius as a margin
    /// so the resulting contact has something to solve.
    pub fn time_of_impact(&mut self, input: &ToiInput) -> ToiOutput {
        let _span = tracy_span!("time_of_impact", "ToiContext::time_of_impact");

        self.calls += 1;

        let mut output = ToiOutput {
            state: ToiState::Unknown,
            t: input.t_max,
        };

        let proxy_a = &input.proxy_a;
        let proxy_b = &input.proxy_b;

        let mut sweep_a = input.sweep_a;
        let mut sweep_b = input.sweep_b;

        // large rotations can make the root finder fail, so we normalize the sweep angles
        sweep_a.normalize();
        sweep_b.normalize();

        let t_max = input.t_max;
        let linear_slop = self.params.linear_slop;

        let total_radius = proxy_a.radius + proxy_b.radius;
        let target = linear_slop.max(total_radius - 3.0 * linear_slop);
        let tolerance = 0.25 * linear_slop;
        debug_assert!(target > tolerance);

        let mut t1 = 0.0;
        let mut iter = 0;

        // prepare input for the distance query
        let mut cache = SimplexCache::default();
        let mut distance_input = DistanceInput {
            proxy_a: input.proxy_a,
            proxy_b: input.proxy_b,
            pose_a: Pose::identity(),
            pose_b: Pose::identity(),
            use_radii: false,
        };

        // the outer loop progressively attempts to compute new separating axes.
        // this loop terminates when an axis is repeated (no progress is made)
        loop {
            distance_input.pose_a = sweep_a.transform(t1);
            distance_input.pose_b = sweep_b.transform(t1);

            // get the distance between shapes. we can also use the results
            // to get a separating axis
            let distance_output = self.distance.distance(&distance_input, &mut cache);

            // if the shapes are overlapped, we give up on continuous collision
            if distance_output.distance <= 0.0 {
                output = ToiOutput {
                    state: ToiState::Overlapped,
                    t: 0.0,
                };
                break;
            }

            if distance_output.distance < target + tolerance {
                // victory!
                output = ToiOutput {
                    state: ToiState::Touching,
                    t: t1,
                };
                break;
            }

            // initialize the separating axis
            let f = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

            // compute the TOI on the separating axis. we do this by successively
            // resolving the deepest point. this loop is bounded by the number of vertices
            let mut done = false;
            let mut t2 = t_max;
            let mut push_back_iter = 0;
            loop {
                // find the deepest point at t2. store the witness point indices
                let (index_a, index_b, mut s2) = f.find_min_separation(t2);

                // is the final configuration separated?
                if s2 > target + tolerance {
                    // victory!
                    output = ToiOutput {
                        state: ToiState::Separated,
                        t: t_max,
                    };
                    done = true;
                    break;
                }

                // has the separation reached tolerance?
                if s2 > target - tolerance {
                    // advance the sweeps
                    t1 = t2;
                    break;
                }

                // compute the initial separation of the witness points
                let mut s1 = f.evaluate(index_a, index_b, t1);

                // check for initial overlap. this might happen if the root finder
                // runs out of iterations
                if s1 < target - tolerance {
                    output = ToiOutput {
                        state: ToiState::Failed,
                        t: t1,
                    };
                    done = true;
                    break;
                }

                // check for touching
                if s1 <= target + tolerance {
                    // victory! t1 should hold the TOI (could be 0.0)
                    output = ToiOutput {
                        state: ToiState::Touching,
                        t: t1,
                    };
                    done = true;
                    break;
                }

                // compute 1D root of: f(x) - target = 0
                let mut root_iter = 0;
                let mut a1 = t1;
                let mut a2 = t2;
                loop {
                    // use a mix of the secant rule and bisection
                    let t = if root_iter & 1 == 1 {
                        // secant rule to improve convergence
                        a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                    } else {
                        // bisection to guarantee progress
                        0.5 * (a1 + a2)
                    };

                    root_iter += 1;
                    self.root_iterations += 1;

                    let s = f.evaluate(index_a, index_b, t);

                    if (s - target).abs() < tolerance {
                        // t2 holds a tentative value for t1
                        t2 = t;
                        break;
                    }

                    // ensure we continue to bracket the root
                    if s > target {
                        a1 = t;
                        s1 = s;
                    } else {
                        a2 = t;
                        s2 = s;
                    }

                    if root_iter == self.params.max_root_iterations {
                        break;
                    }
                }

                self.max_root_iterations = self.max_root_iterations.max(root_iter);

                push_back_iter += 1;
                if push_back_iter == MAX_POLYGON_VERTICES {
                    break;
                }
            }

            iter += 1;
            self.iterations += 1;

            if done {
                break;
            }

            if iter == self.params.max_iterations {
                // root finder got stuck. semi-victory
                output = ToiOutput {
                    state: ToiState::Failed,
                    t: t1,
                };
                break;
            }
        }

        self.max_iterations = self.max_iterations.max(iter);

        if output.state == ToiState::Failed {
            log::warn!(
                "time of impact failed to converge after {} iterations, stopping at t = {}",
                iter,
                output.t
            );
        }

        output
    }
}

/// Compute the time of impact with default parameters and no statistics.
/// See [`ToiContext::time_of_impact`].
pub fn time_of_impact(input: &ToiInput) -> ToiOutput {
    ToiContext::new().time_of_impact(input)
}
