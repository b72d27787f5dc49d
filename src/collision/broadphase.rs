//! Broad phase collision detection algorithms
//! are responsible for detecting pairs of possibly intersecting objects
//! for further, more accurate narrow phase inspection.

use super::{
    dynamic_tree::{DynamicTree, ProxyId, NULL_NODE},
    RayCastInput, AABB,
};
use crate::{math as m, settings::TreeParams};

/// A pair of proxies whose fat AABBs overlap, ordered so that `proxy_a < proxy_b`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pair {
    pub proxy_a: ProxyId,
    pub proxy_b: ProxyId,
}

impl Pair {
    #[inline]
    pub fn new(a: ProxyId, b: ProxyId) -> Self {
        Self {
            proxy_a: a.min(b),
            proxy_b: a.max(b),
        }
    }
}

/// A broad phase algorithm.
///
/// Objects are tracked as proxies with user data of type `T`.
/// Proxies that are added, moved out of their fat AABB, or touched
/// are buffered and checked for new pairs on the next [`update_pairs`][Self::update_pairs].
pub trait BroadPhase<T> {
    /// Create a proxy with the given tight AABB. The proxy is buffered for pair updates.
    fn add_proxy(&mut self, aabb: AABB, user_data: T) -> ProxyId;

    /// Destroy a proxy, returning its user data.
    fn remove_proxy(&mut self, id: ProxyId) -> Option<T>;

    /// Move a proxy. It is buffered for pair updates only if it left its fat AABB.
    fn move_proxy(&mut self, id: ProxyId, aabb: AABB, displacement: m::Vec2);

    /// Buffer a proxy for pair updates without moving it.
    fn touch_proxy(&mut self, id: ProxyId);

    fn fat_aabb(&self, id: ProxyId) -> AABB;

    fn user_data(&self, id: ProxyId) -> Option<&T>;

    /// Test whether the fat AABBs of two proxies overlap.
    fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool;

    fn proxy_count(&self) -> usize;

    /// Find new overlapping pairs among buffered proxies and report each one once.
    fn update_pairs(&mut self, callback: impl FnMut(&T, &T));

    /// Call `callback` for every proxy whose fat AABB overlaps `aabb`.
    /// Returning `false` stops the query.
    fn query(&self, aabb: &AABB, callback: impl FnMut(ProxyId) -> bool);

    /// Cast a ray against the proxies. See [`DynamicTree::ray_cast`] for the callback contract.
    fn ray_cast(&self, input: &RayCastInput, callback: impl FnMut(&RayCastInput, ProxyId) -> f64);

    /// Shift the world origin, useful for large worlds.
    fn shift_origin(&mut self, new_origin: m::Vec2);
}

/// Broad phase built on a [`DynamicTree`].
#[derive(Clone, Debug)]
pub struct DynamicTreeBroadPhase<T> {
    tree: DynamicTree<T>,
    /// Proxies to query on the next pair update. Removed proxies are nulled out.
    move_buffer: Vec<ProxyId>,
    pair_buffer: Vec<Pair>,
}

impl<T> Default for DynamicTreeBroadPhase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DynamicTreeBroadPhase<T> {
    pub fn new() -> Self {
        Self::with_params(TreeParams::default())
    }

    pub fn with_params(params: TreeParams) -> Self {
        Self {
            tree: DynamicTree::with_params(params),
            move_buffer: Vec::with_capacity(params.initial_capacity),
            pair_buffer: Vec::with_capacity(params.initial_capacity),
        }
    }

    /// Access the underlying tree.
    #[inline]
    pub fn tree(&self) -> &DynamicTree<T> {
        &self.tree
    }

    #[inline]
    pub fn tree_height(&self) -> usize {
        self.tree.height()
    }

    #[inline]
    pub fn tree_balance(&self) -> usize {
        self.tree.max_balance()
    }

    #[inline]
    pub fn tree_quality(&self) -> f64 {
        self.tree.area_ratio()
    }

    fn buffer_move(&mut self, id: ProxyId) {
        self.move_buffer.push(id);
    }

    fn unbuffer_move(&mut self, id: ProxyId) {
        for buffered in self.move_buffer.iter_mut().filter(|b| **b == id) {
            *buffered = NULL_NODE;
        }
    }
}

impl<T> BroadPhase<T> for DynamicTreeBroadPhase<T> {
    fn add_proxy(&mut self, aabb: AABB, user_data: T) -> ProxyId {
        let id = self.tree.create_proxy(aabb, user_data);
        self.buffer_move(id);
        id
    }

    fn remove_proxy(&mut self, id: ProxyId) -> Option<T> {
        self.unbuffer_move(id);
        self.tree.destroy_proxy(id)
    }

    fn move_proxy(&mut self, id: ProxyId, aabb: AABB, displacement: m::Vec2) {
        if self.tree.move_proxy(id, aabb, displacement) {
            self.buffer_move(id);
        }
    }

    fn touch_proxy(&mut self, id: ProxyId) {
        self.buffer_move(id);
    }

    #[inline]
    fn fat_aabb(&self, id: ProxyId) -> AABB {
        self.tree.fat_aabb(id)
    }

    #[inline]
    fn user_data(&self, id: ProxyId) -> Option<&T> {
        self.tree.user_data(id)
    }

    fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        self.tree.fat_aabb(a).overlaps(&self.tree.fat_aabb(b))
    }

    #[inline]
    fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }

    fn update_pairs(&mut self, mut callback: impl FnMut(&T, &T)) {
        let _span = tracy_span!("update broad phase pairs", "update_pairs");

        self.pair_buffer.clear();

        // query the tree with every moved proxy
        for &query_id in &self.move_buffer {
            if query_id == NULL_NODE {
                continue;
            }
            let fat = self.tree.fat_aabb(query_id);
            let pairs = &mut self.pair_buffer;
            self.tree.query(&fat, |id| {
                // a proxy cannot form a pair with itself
                if id != query_id {
                    pairs.push(Pair::new(id, query_id));
                }
                true
            });
        }

        // two moved proxies overlapping each other are found twice
        self.pair_buffer.sort_unstable();
        self.pair_buffer.dedup();

        log::trace!(
            "{} unique pairs from {} moved proxies",
            self.pair_buffer.len(),
            self.move_buffer.len()
        );

        for pair in &self.pair_buffer {
            if let (Some(a), Some(b)) = (
                self.tree.user_data(pair.proxy_a),
                self.tree.user_data(pair.proxy_b),
            ) {
                callback(a, b);
            }
        }

        self.move_buffer.clear();
        self.pair_buffer.clear();
    }

    fn query(&self, aabb: &AABB, callback: impl FnMut(ProxyId) -> bool) {
        self.tree.query(aabb, callback);
    }

    fn ray_cast(&self, input: &RayCastInput, callback: impl FnMut(&RayCastInput, ProxyId) -> f64) {
        self.tree.ray_cast(input, callback);
    }

    fn shift_origin(&mut self, new_origin: m::Vec2) {
        self.tree.shift_origin(new_origin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn square(x: f64, y: f64, half_width: f64) -> AABB {
        AABB::new(
            m::Vec2::new(x - half_width, y - half_width),
            m::Vec2::new(x + half_width, y + half_width),
        )
    }

    fn collect_pairs(bp: &mut DynamicTreeBroadPhase<&'static str>) -> Vec<(&'static str, &'static str)> {
        let mut pairs = Vec::new();
        bp.update_pairs(|a, b| {
            // order by name so the assertions don't depend on proxy ids
            pairs.push(if a < b { (*a, *b) } else { (*b, *a) });
        });
        pairs.sort_unstable();
        pairs
    }

    #[test]
    fn pair_ordering() {
        assert_eq!(Pair::new(5, 2), Pair::new(2, 5));
        assert!(Pair::new(1, 9) < Pair::new(2, 3));
        assert!(Pair::new(1, 3) < Pair::new(1, 4));
    }

    #[test]
    fn each_pair_reported_once() {
        let mut bp = DynamicTreeBroadPhase::new();
        bp.add_proxy(square(0.0, 0.0, 1.0), "a");
        bp.add_proxy(square(1.5, 0.0, 1.0), "b");
        bp.add_proxy(square(1.5, 1.5, 1.0), "c");
        bp.add_proxy(square(10.0, 0.0, 1.0), "far");

        let pairs = collect_pairs(&mut bp);
        // all of a, b and c were moved and overlap each other, but each pair appears once
        assert_eq!(pairs, vec![("a", "b"), ("a", "c"), ("b", "c")]);
        assert!(pairs.iter().all_unique());

        // buffers are cleared after an update
        assert!(collect_pairs(&mut bp).is_empty());
    }

    #[test]
    fn moving_within_fat_aabb_reports_nothing() {
        let mut bp = DynamicTreeBroadPhase::new();
        let a = bp.add_proxy(square(0.0, 0.0, 1.0), "a");
        let b = bp.add_proxy(square(1.5, 0.0, 1.0), "b");
        collect_pairs(&mut bp);

        bp.move_proxy(a, square(0.01, 0.0, 1.0), m::Vec2::new(0.01, 0.0));
        assert!(collect_pairs(&mut bp).is_empty());

        // touching re-reports existing overlaps
        bp.touch_proxy(a);
        assert_eq!(collect_pairs(&mut bp), vec![("a", "b")]);

        // moving away out of the fat AABB is buffered but finds nothing
        bp.move_proxy(a, square(-5.0, 0.0, 1.0), m::Vec2::new(-5.0, 0.0));
        assert!(collect_pairs(&mut bp).is_empty());
        assert!(!bp.test_overlap(a, b));
    }

    #[test]
    fn removed_proxies_are_not_reported() {
        let mut bp = DynamicTreeBroadPhase::new();
        let a = bp.add_proxy(square(0.0, 0.0, 1.0), "a");
        let b = bp.add_proxy(square(0.5, 0.0, 1.0), "b");
        assert!(bp.test_overlap(a, b));

        assert_eq!(bp.remove_proxy(b), Some("b"));
        assert_eq!(bp.proxy_count(), 1);
        assert!(collect_pairs(&mut bp).is_empty());
        assert_eq!(bp.user_data(a), Some(&"a"));
    }

    #[test]
    fn queries_pass_through_to_tree() {
        let mut bp = DynamicTreeBroadPhase::new();
        let ids: Vec<ProxyId> = (0..5)
            .map(|i| bp.add_proxy(square(3.0 * i as f64, 0.0, 0.5), i))
            .collect();

        let mut found = Vec::new();
        bp.query(&square(3.0, 0.0, 2.5), |id| {
            found.push(id);
            true
        });
        found.sort_unstable();
        assert_eq!(found, vec![ids[0], ids[1], ids[2]]);

        let input = RayCastInput {
            p1: m::Vec2::new(-2.0, 0.0),
            p2: m::Vec2::new(2.0, 0.0),
            max_fraction: 1.0,
        };
        let mut hit = Vec::new();
        bp.ray_cast(&input, |sub_input, id| {
            hit.push(id);
            sub_input.max_fraction
        });
        assert_eq!(hit, vec![ids[0]]);

        bp.shift_origin(m::Vec2::new(3.0, 0.0));
        let fat = bp.fat_aabb(ids[1]);
        assert!(fat.contains(&square(0.0, 0.0, 0.5)));
        assert!(bp.tree_height() >= 2);
        assert!(bp.tree_quality() >= 1.0);
        assert!(bp.tree_balance() < bp.tree_height());
    }
}
