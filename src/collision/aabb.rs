use crate::math as m;

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct AABB {
    /// The lower left corner.
    pub min: m::Vec2,
    /// The upper right corner.
    pub max: m::Vec2,
}

impl AABB {
    pub fn new(min: m::Vec2, max: m::Vec2) -> Self {
        Self { min, max }
    }

    pub fn zero() -> Self {
        Self {
            min: m::Vec2::zero(),
            max: m::Vec2::zero(),
        }
    }

    /// The smallest AABB containing all of the given points.
    /// Returns `None` if there are no points.
    pub fn from_points(points: impl IntoIterator<Item = m::Vec2>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), |aabb, p| Self {
            min: aabb.min.min_by_component(p),
            max: aabb.max.max_by_component(p),
        }))
    }

    /// Check that the bounds are sorted and finite.
    pub fn is_valid(&self) -> bool {
        let d = self.max - self.min;
        d.x >= 0.0
            && d.y >= 0.0
            && self.min.x.is_finite()
            && self.min.y.is_finite()
            && self.max.x.is_finite()
            && self.max.y.is_finite()
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn center(&self) -> m::Vec2 {
        0.5 * (self.min + self.max)
    }

    /// Half-widths of the box.
    #[inline]
    pub fn extents(&self) -> m::Vec2 {
        0.5 * (self.max - self.min)
    }

    /// The perimeter of the box, used as the cost metric of the dynamic tree.
    #[inline]
    pub fn perimeter(&self) -> f64 {
        2.0 * (self.width() + self.height())
    }

    /// The smallest AABB containing both `self` and `other`.
    #[inline]
    pub fn union(&self, other: &AABB) -> AABB {
        AABB {
            min: self.min.min_by_component(other.min),
            max: self.max.max_by_component(other.max),
        }
    }

    /// Check whether `other` is entirely inside `self`.
    #[inline]
    pub fn contains(&self, other: &AABB) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }

    #[inline]
    pub fn contains_point(&self, point: m::Vec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// Check whether the boxes overlap. Touching boxes count as overlapping.
    #[inline]
    pub fn overlaps(&self, other: &AABB) -> bool {
        let d1 = other.min - self.max;
        let d2 = self.min - other.max;
        !(d1.x > 0.0 || d1.y > 0.0 || d2.x > 0.0 || d2.y > 0.0)
    }

    /// Get the intersection of two AABBs if there is one.
    pub fn intersection(&self, other: &AABB) -> Option<AABB> {
        let isect = AABB {
            min: self.min.max_by_component(other.min),
            max: self.max.min_by_component(other.max),
        };
        if isect.max.x < isect.min.x || isect.max.y < isect.min.y {
            None
        } else {
            Some(isect)
        }
    }

    /// Get an AABB that's larger than this by `amount` on every side.
    #[inline]
    pub fn padded(&self, amount: f64) -> AABB {
        let pad = m::Vec2::new(amount, amount);
        AABB {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    /// Move the box by `offset`.
    #[inline]
    pub fn translated(&self, offset: m::Vec2) -> AABB {
        AABB {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Cast a ray against the box using the slab method.
    ///
    /// A ray starting inside the box does not hit it.
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let mut t_min = f64::MIN;
        let mut t_max = f64::MAX;

        let p = input.p1;
        let d = input.p2 - input.p1;
        let mut normal = m::Vec2::zero();

        let axes = [
            (p.x, d.x, self.min.x, self.max.x, m::Vec2::unit_x()),
            (p.y, d.y, self.min.y, self.max.y, m::Vec2::unit_y()),
        ];
        for (p, d, lower, upper, axis) in axes {
            if d.abs() < crate::settings::EPSILON {
                // parallel
                if p < lower || upper < p {
                    return None;
                }
            } else {
                let inv_d = 1.0 / d;
                let mut t1 = (lower - p) * inv_d;
                let mut t2 = (upper - p) * inv_d;
                // sign of the normal vector
                let mut s = -1.0;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                    s = 1.0;
                }
                // push the min up
                if t1 > t_min {
                    normal = s * axis;
                    t_min = t1;
                }
                // pull the max down
                t_max = t_max.min(t2);
                if t_min > t_max {
                    return None;
                }
            }
        }

        // does the ray start inside the box?
        // does the ray intersect beyond the max fraction?
        if t_min < 0.0 || input.max_fraction < t_min {
            return None;
        }

        Some(RayCastOutput {
            normal,
            fraction: t_min,
        })
    }
}

/// Ray-cast input data. The ray extends from `p1` to `p1 + max_fraction * (p2 - p1)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayCastInput {
    pub p1: m::Vec2,
    pub p2: m::Vec2,
    pub max_fraction: f64,
}

impl RayCastInput {
    /// The point at a given fraction along the ray.
    #[inline]
    pub fn point_at(&self, fraction: f64) -> m::Vec2 {
        self.p1 + fraction * (self.p2 - self.p1)
    }
}

/// Ray-cast output data. The ray hits at `p1 + fraction * (p2 - p1)`,
/// where `p1` and `p2` come from [`RayCastInput`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayCastOutput {
    /// Surface normal at the hit point, pointing out of the hit shape.
    pub normal: m::Vec2,
    pub fraction: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aabb(min: [f64; 2], max: [f64; 2]) -> AABB {
        AABB::new(m::Vec2::from(min), m::Vec2::from(max))
    }

    #[test]
    fn union_and_containment() {
        let a = aabb([0.0, 0.0], [1.0, 1.0]);
        let b = aabb([2.0, -1.0], [3.0, 0.5]);
        let u = a.union(&b);
        assert_eq!(u, aabb([0.0, -1.0], [3.0, 1.0]));
        assert!(u.contains(&a) && u.contains(&b));
        assert!(!a.contains(&u));
        assert_eq!(u.perimeter(), 2.0 * (3.0 + 2.0));
        assert!(u.is_valid());
        assert!(!aabb([1.0, 0.0], [0.0, 1.0]).is_valid());
    }

    #[test]
    fn overlap_includes_touching() {
        let a = aabb([0.0, 0.0], [1.0, 1.0]);
        assert!(a.overlaps(&aabb([1.0, 0.5], [2.0, 2.0])));
        assert!(!a.overlaps(&aabb([1.01, 0.5], [2.0, 2.0])));
        assert!(a.intersection(&aabb([0.5, 0.5], [2.0, 2.0])).is_some());
        assert!(a.intersection(&aabb([0.5, 1.5], [2.0, 2.0])).is_none());
    }

    #[test]
    fn ray_hits_nearest_face() {
        let a = aabb([1.0, -1.0], [3.0, 1.0]);
        let hit = a
            .ray_cast(&RayCastInput {
                p1: m::Vec2::new(0.0, 0.0),
                p2: m::Vec2::new(4.0, 0.0),
                max_fraction: 1.0,
            })
            .unwrap();
        assert!((hit.fraction - 0.25).abs() < 1e-12);
        assert_eq!(hit.normal, m::Vec2::new(-1.0, 0.0));

        // too short
        assert!(a
            .ray_cast(&RayCastInput {
                p1: m::Vec2::new(0.0, 0.0),
                p2: m::Vec2::new(4.0, 0.0),
                max_fraction: 0.2,
            })
            .is_none());
        // parallel and outside
        assert!(a
            .ray_cast(&RayCastInput {
                p1: m::Vec2::new(0.0, 2.0),
                p2: m::Vec2::new(4.0, 2.0),
                max_fraction: 1.0,
            })
            .is_none());
    }
}
