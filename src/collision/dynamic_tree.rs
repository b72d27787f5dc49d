//! A dynamic AABB tree for broad phase collision detection and spatial queries.
//!
//! Leaves hold fattened AABBs of user objects, so that small movements
//! don't require updating the tree. Nodes are pooled in a vector
//! and referenced by index, with freed nodes recycled through a free list.

use std::cell::RefCell;

use super::{RayCastInput, AABB};
use crate::{math as m, settings::TreeParams};

/// Handle to a leaf of a [`DynamicTree`].
pub type ProxyId = usize;

/// Index marking the absence of a node.
pub const NULL_NODE: usize = usize::MAX;

//
// Internal types
//

#[derive(Clone, Debug)]
struct TreeNode<T> {
    /// Fat AABB for leaves, union of the children for internal nodes.
    aabb: AABB,
    user_data: Option<T>,
    /// Parent while in the tree, next free node while in the free list.
    parent_or_next: usize,
    child1: usize,
    child2: usize,
    /// Leaf = 0, free node = -1.
    height: i32,
}

impl<T> TreeNode<T> {
    fn free(next: usize) -> Self {
        Self {
            aabb: AABB::zero(),
            user_data: None,
            parent_or_next: next,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: -1,
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// A structural problem found by [`DynamicTree::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("The root node {0} has a parent")]
    RootHasParent(usize),
    #[error("Node index {0} is out of bounds")]
    BadIndex(usize),
    #[error("Node {0} is reachable from the root but is in the free list")]
    FreeNodeInTree(usize),
    #[error("Leaf node {0} has a child or nonzero height")]
    BadLeaf(usize),
    #[error("Node {node} doesn't point back to its parent {parent}")]
    BadParent { node: usize, parent: usize },
    #[error("Node {node} has height {actual}, expected {expected}")]
    WrongHeight {
        node: usize,
        expected: i32,
        actual: i32,
    },
    #[error("The AABB of node {0} is not the union of its children")]
    WrongAabb(usize),
    #[error("The free list is corrupted")]
    FreeListCorrupt,
    #[error("{live} live and {free} free nodes don't add up to a capacity of {capacity}")]
    NodeCountMismatch {
        live: usize,
        free: usize,
        capacity: usize,
    },
    #[error("Found {found} leaves but {expected} proxies were created")]
    ProxyCountMismatch { found: usize, expected: usize },
}

//
// The tree itself
//

/// A dynamic AABB tree broad-phase.
///
/// Insertion picks the sibling that minimizes the total perimeter of the tree
/// and ancestors are rebalanced with rotations, keeping the tree shallow
/// even when proxies are inserted in a sorted order.
#[derive(Clone, Debug)]
pub struct DynamicTree<T> {
    root: usize,
    nodes: Vec<TreeNode<T>>,
    free_list: usize,
    node_count: usize,
    proxy_count: usize,
    params: TreeParams,
    /// Traversal stack kept around so that queries don't allocate.
    shared_stack: RefCell<Vec<usize>>,
}

impl<T> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DynamicTree<T> {
    pub fn new() -> Self {
        Self::with_params(TreeParams::default())
    }

    pub fn with_params(params: TreeParams) -> Self {
        Self {
            root: NULL_NODE,
            nodes: Vec::with_capacity(params.initial_capacity),
            free_list: NULL_NODE,
            node_count: 0,
            proxy_count: 0,
            params,
            shared_stack: RefCell::new(Vec::with_capacity(64)),
        }
    }

    #[inline]
    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    /// Create a proxy for an object with the given tight AABB.
    /// The stored AABB is fattened by `aabb_extension`.
    pub fn create_proxy(&mut self, aabb: AABB, user_data: T) -> ProxyId {
        let id = self.allocate_node();
        let node = &mut self.nodes[id];
        node.aabb = aabb.padded(self.params.aabb_extension);
        node.user_data = Some(user_data);
        node.height = 0;

        self.insert_leaf(id);
        self.proxy_count += 1;
        id
    }

    /// Remove a proxy from the tree, returning its user data.
    pub fn destroy_proxy(&mut self, id: ProxyId) -> Option<T> {
        debug_assert!(self.nodes[id].is_leaf() && self.nodes[id].height == 0);

        self.remove_leaf(id);
        let user_data = self.nodes[id].user_data.take();
        self.free_node(id);
        self.proxy_count -= 1;
        user_data
    }

    /// Move a proxy to a new tight AABB with the given displacement.
    ///
    /// If the proxy's fat AABB still contains the new AABB nothing happens and
    /// `false` is returned. Otherwise the proxy is reinserted with a fat AABB
    /// that is additionally extended in the direction of `displacement`,
    /// and `true` is returned.
    pub fn move_proxy(&mut self, id: ProxyId, aabb: AABB, displacement: m::Vec2) -> bool {
        debug_assert!(self.nodes[id].is_leaf() && self.nodes[id].height == 0);

        if self.nodes[id].aabb.contains(&aabb) {
            return false;
        }

        self.remove_leaf(id);

        let mut fat = aabb.padded(self.params.aabb_extension);
        // predict where the proxy is going
        let d = self.params.aabb_multiplier * displacement;
        if d.x < 0.0 {
            fat.min.x += d.x;
        } else {
            fat.max.x += d.x;
        }
        if d.y < 0.0 {
            fat.min.y += d.y;
        } else {
            fat.max.y += d.y;
        }
        self.nodes[id].aabb = fat;

        self.insert_leaf(id);
        true
    }

    /// Get the user data of a proxy, or `None` if the id isn't a live proxy.
    #[inline]
    pub fn user_data(&self, id: ProxyId) -> Option<&T> {
        self.nodes.get(id).and_then(|node| node.user_data.as_ref())
    }

    /// Get the fat AABB of a proxy.
    #[inline]
    pub fn fat_aabb(&self, id: ProxyId) -> AABB {
        debug_assert!(self.nodes[id].height >= 0);
        self.nodes[id].aabb
    }

    #[inline]
    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Number of nodes currently in the tree, internal nodes included.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Call `callback` for every proxy whose fat AABB overlaps `aabb`.
    /// Returning `false` from the callback stops the query.
    pub fn query(&self, aabb: &AABB, mut callback: impl FnMut(ProxyId) -> bool) {
        self.with_stack(|stack| {
            stack.push(self.root);

            while let Some(id) = stack.pop() {
                if id == NULL_NODE {
                    continue;
                }
                let node = &self.nodes[id];
                if !node.aabb.overlaps(aabb) {
                    continue;
                }
                if node.is_leaf() {
                    if !callback(id) {
                        return;
                    }
                } else {
                    stack.push(node.child1);
                    stack.push(node.child2);
                }
            }
        });
    }

    /// Cast a ray against the proxies in the tree.
    ///
    /// The callback receives the ray clipped to the current max fraction
    /// and returns the new max fraction:
    /// 0 terminates the ray cast, a negative value ignores the proxy,
    /// and a positive value clips the ray to that fraction.
    /// Returning `input.max_fraction` continues the ray cast without clipping.
    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        mut callback: impl FnMut(&RayCastInput, ProxyId) -> f64,
    ) {
        let p1 = input.p1;
        let p2 = input.p2;
        let mut r = p2 - p1;
        if m::normalize_mut(&mut r) == 0.0 {
            return;
        }

        // v is perpendicular to the segment
        let v = m::left_normal(r);
        let abs_v = m::Vec2::new(v.x.abs(), v.y.abs());

        // separating axis for segment (Gino, p80)
        // |dot(v, p1 - c)| > dot(|v|, h)

        let mut max_fraction = input.max_fraction;
        let segment_aabb = |max_fraction: f64| {
            let t = p1 + max_fraction * (p2 - p1);
            AABB::new(p1.min_by_component(t), p1.max_by_component(t))
        };
        let mut seg_aabb = segment_aabb(max_fraction);

        self.with_stack(|stack| {
            stack.push(self.root);

            while let Some(id) = stack.pop() {
                if id == NULL_NODE {
                    continue;
                }
                let node = &self.nodes[id];
                if !node.aabb.overlaps(&seg_aabb) {
                    continue;
                }

                let c = node.aabb.center();
                let h = node.aabb.extents();
                let separation = v.dot(p1 - c).abs() - abs_v.dot(h);
                if separation > 0.0 {
                    continue;
                }

                if node.is_leaf() {
                    let sub_input = RayCastInput {
                        p1,
                        p2,
                        max_fraction,
                    };
                    let value = callback(&sub_input, id);

                    if value == 0.0 {
                        // the client has terminated the ray cast
                        return;
                    }
                    if value > 0.0 {
                        max_fraction = value;
                        seg_aabb = segment_aabb(max_fraction);
                    }
                } else {
                    stack.push(node.child1);
                    stack.push(node.child2);
                }
            }
        });
    }

    /// Run a traversal on the shared stack.
    /// A traversal started from inside a query callback gets a stack of its own.
    fn with_stack(&self, traverse: impl FnOnce(&mut Vec<usize>)) {
        match self.shared_stack.try_borrow_mut() {
            Ok(mut stack) => {
                stack.clear();
                traverse(&mut stack);
            }
            Err(_) => traverse(&mut Vec::with_capacity(64)),
        }
    }

    //
    // diagnostics
    //

    /// Height of the tree. An empty tree and a tree with one proxy both have height 0.
    pub fn height(&self) -> usize {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root].height as usize
        }
    }

    /// The largest height difference between the two children of any node.
    pub fn max_balance(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| node.height > 1)
            .map(|node| {
                let h1 = self.nodes[node.child1].height;
                let h2 = self.nodes[node.child2].height;
                (h2 - h1).unsigned_abs() as usize
            })
            .max()
            .unwrap_or(0)
    }

    /// Ratio of the sum of node perimeters to the root perimeter.
    /// Lower is better.
    pub fn area_ratio(&self) -> f64 {
        if self.root == NULL_NODE {
            return 0.0;
        }
        let root_area = self.nodes[self.root].aabb.perimeter();
        let total_area: f64 = self
            .nodes
            .iter()
            .filter(|node| node.height >= 0)
            .map(|node| node.aabb.perimeter())
            .sum();
        if root_area == 0.0 {
            0.0
        } else {
            total_area / root_area
        }
    }

    /// Check the structure and metrics of the whole tree.
    pub fn validate(&self) -> Result<(), TreeError> {
        if self.root != NULL_NODE {
            let root = self.nodes.get(self.root).ok_or(TreeError::BadIndex(self.root))?;
            if root.parent_or_next != NULL_NODE {
                return Err(TreeError::RootHasParent(self.root));
            }
        }

        let leaf_count = self.validate_subtree(self.root)?;
        if leaf_count != self.proxy_count {
            return Err(TreeError::ProxyCountMismatch {
                found: leaf_count,
                expected: self.proxy_count,
            });
        }

        let mut free_count = 0;
        let mut free_idx = self.free_list;
        while free_idx != NULL_NODE {
            let node = self.nodes.get(free_idx).ok_or(TreeError::FreeListCorrupt)?;
            if node.height != -1 || free_count > self.nodes.len() {
                return Err(TreeError::FreeListCorrupt);
            }
            free_idx = node.parent_or_next;
            free_count += 1;
        }

        if self.node_count + free_count != self.nodes.len() {
            return Err(TreeError::NodeCountMismatch {
                live: self.node_count,
                free: free_count,
                capacity: self.nodes.len(),
            });
        }

        Ok(())
    }

    /// Validate a subtree recursively, returning the number of leaves in it.
    fn validate_subtree(&self, index: usize) -> Result<usize, TreeError> {
        if index == NULL_NODE {
            return Ok(0);
        }
        let node = self.nodes.get(index).ok_or(TreeError::BadIndex(index))?;
        if node.height < 0 {
            return Err(TreeError::FreeNodeInTree(index));
        }

        if node.is_leaf() {
            if node.child2 != NULL_NODE || node.height != 0 {
                return Err(TreeError::BadLeaf(index));
            }
            return Ok(1);
        }

        let child1 = self.nodes.get(node.child1).ok_or(TreeError::BadIndex(node.child1))?;
        let child2 = self.nodes.get(node.child2).ok_or(TreeError::BadIndex(node.child2))?;
        for (child_idx, child) in [(node.child1, child1), (node.child2, child2)] {
            if child.parent_or_next != index {
                return Err(TreeError::BadParent {
                    node: child_idx,
                    parent: index,
                });
            }
        }

        let expected = 1 + child1.height.max(child2.height);
        if node.height != expected {
            return Err(TreeError::WrongHeight {
                node: index,
                expected,
                actual: node.height,
            });
        }
        if node.aabb != child1.aabb.union(&child2.aabb) {
            return Err(TreeError::WrongAabb(index));
        }

        Ok(self.validate_subtree(node.child1)? + self.validate_subtree(node.child2)?)
    }

    //
    // maintenance
    //

    /// Build an optimal-ish tree from scratch out of the current leaves.
    /// Very expensive, meant for testing and for static geometry.
    pub fn rebuild_bottom_up(&mut self) {
        let mut leaves: Vec<usize> = Vec::with_capacity(self.proxy_count);

        // free everything except the leaves
        for i in 0..self.nodes.len() {
            if self.nodes[i].height < 0 {
                continue;
            }
            if self.nodes[i].is_leaf() {
                self.nodes[i].parent_or_next = NULL_NODE;
                leaves.push(i);
            } else {
                self.free_node(i);
            }
        }

        while leaves.len() > 1 {
            let mut min_cost = f64::MAX;
            let (mut i_min, mut j_min) = (0, 1);
            for i in 0..leaves.len() {
                let aabb_i = self.nodes[leaves[i]].aabb;
                for j in i + 1..leaves.len() {
                    let cost = aabb_i.union(&self.nodes[leaves[j]].aabb).perimeter();
                    if cost < min_cost {
                        i_min = i;
                        j_min = j;
                        min_cost = cost;
                    }
                }
            }

            let index1 = leaves[i_min];
            let index2 = leaves[j_min];
            let parent = self.allocate_node();
            self.nodes[parent].child1 = index1;
            self.nodes[parent].child2 = index2;
            self.nodes[parent].height = 1 + self.nodes[index1].height.max(self.nodes[index2].height);
            self.nodes[parent].aabb = self.nodes[index1].aabb.union(&self.nodes[index2].aabb);
            self.nodes[parent].parent_or_next = NULL_NODE;
            self.nodes[index1].parent_or_next = parent;
            self.nodes[index2].parent_or_next = parent;

            leaves[i_min] = parent;
            leaves.swap_remove(j_min);
        }

        self.root = leaves.first().copied().unwrap_or(NULL_NODE);
    }

    /// Shift the world origin. Every stored AABB moves by `-new_origin`.
    pub fn shift_origin(&mut self, new_origin: m::Vec2) {
        for node in self.nodes.iter_mut().filter(|node| node.height >= 0) {
            node.aabb = node.aabb.translated(-new_origin);
        }
    }

    //
    // node pool
    //

    fn allocate_node(&mut self) -> usize {
        let id = if self.free_list == NULL_NODE {
            self.nodes.push(TreeNode::free(NULL_NODE));
            self.nodes.len() - 1
        } else {
            let id = self.free_list;
            self.free_list = self.nodes[id].parent_or_next;
            id
        };

        let node = &mut self.nodes[id];
        node.parent_or_next = NULL_NODE;
        node.child1 = NULL_NODE;
        node.child2 = NULL_NODE;
        node.height = 0;
        node.user_data = None;
        self.node_count += 1;
        id
    }

    fn free_node(&mut self, id: usize) {
        debug_assert!(self.node_count > 0);
        let node = &mut self.nodes[id];
        node.parent_or_next = self.free_list;
        node.child1 = NULL_NODE;
        node.child2 = NULL_NODE;
        node.height = -1;
        node.user_data = None;
        self.free_list = id;
        self.node_count -= 1;
    }

    //
    // insertion and removal
    //

    fn insert_leaf(&mut self, leaf: usize) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent_or_next = NULL_NODE;
            return;
        }

        // find the best sibling for this node
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let node = &self.nodes[index];
            let (child1, child2) = (node.child1, node.child2);

            let area = node.aabb.perimeter();
            let combined_area = node.aabb.union(&leaf_aabb).perimeter();

            // cost of creating a new parent for this node and the new leaf
            let cost = 2.0 * combined_area;
            // minimum cost of pushing the leaf further down the tree
            let inheritance_cost = 2.0 * (combined_area - area);

            let cost1 = self.descend_cost(child1, &leaf_aabb) + inheritance_cost;
            let cost2 = self.descend_cost(child2, &leaf_aabb) + inheritance_cost;

            if cost < cost1 && cost < cost2 {
                break;
            }
            index = if cost1 < cost2 { child1 } else { child2 };
        }
        let sibling = index;

        // create a new parent
        let old_parent = self.nodes[sibling].parent_or_next;
        let new_parent = self.allocate_node();
        self.nodes[new_parent].parent_or_next = old_parent;
        self.nodes[new_parent].aabb = leaf_aabb.union(&self.nodes[sibling].aabb);
        self.nodes[new_parent].height = self.nodes[sibling].height + 1;
        self.nodes[new_parent].child1 = sibling;
        self.nodes[new_parent].child2 = leaf;
        self.nodes[sibling].parent_or_next = new_parent;
        self.nodes[leaf].parent_or_next = new_parent;

        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else if self.nodes[old_parent].child1 == sibling {
            self.nodes[old_parent].child1 = new_parent;
        } else {
            self.nodes[old_parent].child2 = new_parent;
        }

        // walk back up the tree fixing heights and AABBs
        self.refit_ancestors(self.nodes[leaf].parent_or_next);
    }

    /// Cost of descending into `child` with a leaf of the given AABB.
    fn descend_cost(&self, child: usize, leaf_aabb: &AABB) -> f64 {
        let child = &self.nodes[child];
        let union_area = leaf_aabb.union(&child.aabb).perimeter();
        if child.is_leaf() {
            union_area
        } else {
            union_area - child.aabb.perimeter()
        }
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent_or_next;
        let grand_parent = self.nodes[parent].parent_or_next;
        let sibling = if self.nodes[parent].child1 == leaf {
            self.nodes[parent].child2
        } else {
            self.nodes[parent].child1
        };

        if grand_parent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling].parent_or_next = NULL_NODE;
            self.free_node(parent);
            return;
        }

        // destroy the parent and connect the sibling to the grandparent
        if self.nodes[grand_parent].child1 == parent {
            self.nodes[grand_parent].child1 = sibling;
        } else {
            self.nodes[grand_parent].child2 = sibling;
        }
        self.nodes[sibling].parent_or_next = grand_parent;
        self.free_node(parent);

        self.refit_ancestors(grand_parent);
    }

    /// Rebalance and recompute AABBs and heights from `index` up to the root.
    fn refit_ancestors(&mut self, mut index: usize) {
        while index != NULL_NODE {
            index = self.balance(index);

            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;
            debug_assert!(child1 != NULL_NODE && child2 != NULL_NODE);

            self.nodes[index].height = 1 + self.nodes[child1].height.max(self.nodes[child2].height);
            self.nodes[index].aabb = self.nodes[child1].aabb.union(&self.nodes[child2].aabb);

            index = self.nodes[index].parent_or_next;
        }
    }

    /// Perform a left or right rotation if node A is imbalanced.
    /// Returns the new root index of the subtree.
    fn balance(&mut self, i_a: usize) -> usize {
        let a = &self.nodes[i_a];
        if a.is_leaf() || a.height < 2 {
            return i_a;
        }

        let (i_b, i_c) = (a.child1, a.child2);
        let balance = self.nodes[i_c].height - self.nodes[i_b].height;

        if balance > 1 {
            self.rotate_up(i_a, i_c, true)
        } else if balance < -1 {
            self.rotate_up(i_a, i_b, false)
        } else {
            i_a
        }
    }

    /// Rotate the child `i_up` of `i_a` into `i_a`'s place.
    /// `up_is_child2` tells which side of `i_a` the child is on.
    fn rotate_up(&mut self, i_a: usize, i_up: usize, up_is_child2: bool) -> usize {
        let i_f = self.nodes[i_up].child1;
        let i_g = self.nodes[i_up].child2;
        let i_keep = if up_is_child2 {
            self.nodes[i_a].child1
        } else {
            self.nodes[i_a].child2
        };

        // swap A and the rotated node
        let a_parent = self.nodes[i_a].parent_or_next;
        self.nodes[i_up].child1 = i_a;
        self.nodes[i_up].parent_or_next = a_parent;
        self.nodes[i_a].parent_or_next = i_up;

        if a_parent == NULL_NODE {
            self.root = i_up;
        } else if self.nodes[a_parent].child1 == i_a {
            self.nodes[a_parent].child1 = i_up;
        } else {
            debug_assert_eq!(self.nodes[a_parent].child2, i_a);
            self.nodes[a_parent].child2 = i_up;
        }

        // the taller grandchild stays under the rotated node, the other moves to A
        let (i_tall, i_short) = if self.nodes[i_f].height > self.nodes[i_g].height {
            (i_f, i_g)
        } else {
            (i_g, i_f)
        };
        self.nodes[i_up].child2 = i_tall;
        if up_is_child2 {
            self.nodes[i_a].child2 = i_short;
        } else {
            self.nodes[i_a].child1 = i_short;
        }
        self.nodes[i_short].parent_or_next = i_a;

        self.nodes[i_a].aabb = self.nodes[i_keep].aabb.union(&self.nodes[i_short].aabb);
        self.nodes[i_up].aabb = self.nodes[i_a].aabb.union(&self.nodes[i_tall].aabb);
        self.nodes[i_a].height = 1 + self.nodes[i_keep].height.max(self.nodes[i_short].height);
        self.nodes[i_up].height = 1 + self.nodes[i_a].height.max(self.nodes[i_tall].height);

        i_up
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn unit_box_at(x: f64, y: f64) -> AABB {
        AABB::new(m::Vec2::new(x, y), m::Vec2::new(x + 1.0, y + 1.0))
    }

    fn query_all<T>(tree: &DynamicTree<T>, aabb: &AABB) -> Vec<ProxyId> {
        let mut found = Vec::new();
        tree.query(aabb, |id| {
            found.push(id);
            true
        });
        found.sort_unstable();
        found
    }

    #[test]
    fn fat_aabb_contains_tight() {
        let mut tree = DynamicTree::new();
        let aabb = unit_box_at(0.0, 0.0);
        let id = tree.create_proxy(aabb, "a");
        let fat = tree.fat_aabb(id);
        assert!(fat.contains(&aabb));
        assert!((fat.width() - (1.0 + 2.0 * tree.params().aabb_extension)).abs() < 1e-12);
        assert_eq!(tree.user_data(id), Some(&"a"));
        assert_eq!(tree.height(), 0);
        tree.validate().unwrap();
    }

    #[test]
    fn insert_then_remove_restores_shape() {
        let mut tree = DynamicTree::new();
        tree.create_proxy(unit_box_at(0.0, 0.0), 0);
        tree.create_proxy(unit_box_at(2.0, 0.0), 1);
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.height(), 1);

        let far = tree.create_proxy(unit_box_at(100.0, 0.0), 2);
        assert_eq!(tree.node_count(), 5);
        assert_eq!(tree.height(), 2);
        tree.validate().unwrap();

        assert_eq!(tree.destroy_proxy(far), Some(2));
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.proxy_count(), 2);
        assert_eq!(tree.user_data(far), None);
        tree.validate().unwrap();

        // freed nodes get reused
        let capacity_before = tree.nodes.len();
        tree.create_proxy(unit_box_at(50.0, 0.0), 3);
        assert_eq!(tree.nodes.len(), capacity_before);
        tree.validate().unwrap();
    }

    #[test]
    fn move_only_when_leaving_fat_aabb() {
        let mut tree = DynamicTree::new();
        let id = tree.create_proxy(unit_box_at(0.0, 0.0), ());
        tree.create_proxy(unit_box_at(5.0, 5.0), ());

        // small move stays within the fat margin
        let nudged = unit_box_at(0.05, 0.0);
        assert!(!tree.move_proxy(id, nudged, m::Vec2::new(0.05, 0.0)));

        let moved = unit_box_at(1.0, 0.0);
        let displacement = m::Vec2::new(0.95, 0.0);
        assert!(tree.move_proxy(id, moved, displacement));
        let fat = tree.fat_aabb(id);
        assert!(fat.contains(&moved));
        let ext = tree.params().aabb_extension;
        let mult = tree.params().aabb_multiplier;
        // extended forward along the motion, not backward
        assert!((fat.max.x - (2.0 + ext + mult * 0.95)).abs() < 1e-12);
        assert!((fat.min.x - (1.0 - ext)).abs() < 1e-12);
        assert!((fat.max.y - (1.0 + ext)).abs() < 1e-12);

        // now contained again
        assert!(!tree.move_proxy(id, moved, m::Vec2::zero()));
        tree.validate().unwrap();
    }

    #[test]
    fn query_and_early_exit() {
        let mut tree = DynamicTree::new();
        let ids: Vec<ProxyId> = (0..10)
            .map(|i| tree.create_proxy(unit_box_at(2.0 * i as f64, 0.0), i))
            .collect();

        let found = query_all(&tree, &AABB::new(m::Vec2::new(3.5, 0.5), m::Vec2::new(6.5, 0.6)));
        assert_eq!(found, vec![ids[2], ids[3]]);

        let mut calls = 0;
        tree.query(&AABB::new(m::Vec2::new(-1.0, -1.0), m::Vec2::new(30.0, 2.0)), |_| {
            calls += 1;
            false
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn queries_reuse_traversal_stack() {
        let mut tree = DynamicTree::new();
        let ids: Vec<ProxyId> = (0..32)
            .map(|i| tree.create_proxy(unit_box_at(2.0 * i as f64, 0.0), i))
            .collect();
        let everything = AABB::new(m::Vec2::new(-1.0, -1.0), m::Vec2::new(70.0, 2.0));
        let stack_ptr = tree.shared_stack.borrow().as_ptr();

        // an early exit leaves nodes on the stack, which must not leak into the next query
        tree.query(&everything, |_| false);
        let mut sorted_ids = ids.clone();
        sorted_ids.sort_unstable();
        for _ in 0..3 {
            assert_eq!(query_all(&tree, &everything), sorted_ids);
        }

        let input = RayCastInput {
            p1: m::Vec2::new(-1.0, 0.5),
            p2: m::Vec2::new(70.0, 0.5),
            max_fraction: 1.0,
        };
        let mut hits = 0;
        tree.ray_cast(&input, |sub_input, _| {
            hits += 1;
            sub_input.max_fraction
        });
        assert_eq!(hits, ids.len());
        assert_eq!(tree.shared_stack.borrow().as_ptr(), stack_ptr);

        // queries started from a callback still see the whole tree
        let mut nested = 0;
        tree.query(&unit_box_at(0.0, 0.0), |_| {
            nested += query_all(&tree, &everything).len();
            true
        });
        assert_eq!(nested, ids.len());
    }

    #[test]
    fn ray_cast_clips_to_closest() {
        let mut tree = DynamicTree::new();
        let boxes: Vec<AABB> = (0..8).map(|i| unit_box_at(3.0 * i as f64, -0.5)).collect();
        for (i, aabb) in boxes.iter().enumerate() {
            tree.create_proxy(*aabb, i);
        }
        // one box out of the ray's way
        tree.create_proxy(unit_box_at(4.0, 10.0), 100);

        let input = RayCastInput {
            p1: m::Vec2::new(-1.0, 0.0),
            p2: m::Vec2::new(30.0, 0.0),
            max_fraction: 1.0,
        };
        let mut closest = None;
        let mut visited = Vec::new();
        tree.ray_cast(&input, |sub_input, id| {
            let data = *tree.user_data(id).unwrap();
            visited.push(data);
            match boxes.get(data).and_then(|b| b.ray_cast(sub_input)) {
                Some(hit) => {
                    closest = Some((data, hit.fraction));
                    hit.fraction
                }
                None => -1.0,
            }
        });

        let (data, fraction) = closest.unwrap();
        assert_eq!(data, 0);
        assert!((fraction - 1.0 / 31.0).abs() < 1e-12);
        assert!(!visited.contains(&100));

        // terminating on the first hit
        let mut hits = 0;
        tree.ray_cast(&input, |_, _| {
            hits += 1;
            0.0
        });
        assert_eq!(hits, 1);
    }

    #[test]
    fn sorted_insertion_stays_balanced() {
        let mut tree = DynamicTree::new();
        for i in 0..128 {
            tree.create_proxy(unit_box_at(1.5 * i as f64, 0.0), i);
        }
        tree.validate().unwrap();
        // a degenerate list would have height 127
        assert!(tree.height() <= 20, "height {}", tree.height());
        assert!(tree.max_balance() < tree.height());
        assert!(tree.area_ratio() > 1.0);
    }

    #[test]
    fn randomized_operations_keep_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut tree = DynamicTree::new();
        let mut live: Vec<(ProxyId, AABB)> = Vec::new();

        let random_aabb = |rng: &mut StdRng| {
            let x = rng.gen_range(-50.0..50.0);
            let y = rng.gen_range(-50.0..50.0);
            let w = rng.gen_range(0.1..4.0);
            let h = rng.gen_range(0.1..4.0);
            AABB::new(m::Vec2::new(x, y), m::Vec2::new(x + w, y + h))
        };

        for step in 0..2000 {
            match rng.gen_range(0..10) {
                0..=4 => {
                    let aabb = random_aabb(&mut rng);
                    let id = tree.create_proxy(aabb, step);
                    live.push((id, aabb));
                }
                5..=6 if !live.is_empty() => {
                    let i = rng.gen_range(0..live.len());
                    let (id, _) = live.swap_remove(i);
                    assert!(tree.destroy_proxy(id).is_some());
                }
                _ if !live.is_empty() => {
                    let i = rng.gen_range(0..live.len());
                    let d = m::Vec2::new(rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0));
                    let (id, aabb) = live[i];
                    let moved = aabb.translated(d);
                    tree.move_proxy(id, moved, d);
                    live[i].1 = moved;
                }
                _ => {}
            }

            if step % 100 == 0 {
                tree.validate().unwrap();
            }
        }
        tree.validate().unwrap();
        assert_eq!(tree.proxy_count(), live.len());

        // fat AABBs always contain the tight ones, so every real overlap must be reported
        let region = AABB::new(m::Vec2::new(-10.0, -10.0), m::Vec2::new(10.0, 10.0));
        let found = query_all(&tree, &region);
        for (id, aabb) in &live {
            assert!(tree.fat_aabb(*id).contains(aabb));
            if aabb.overlaps(&region) {
                assert!(found.binary_search(id).is_ok());
            }
        }

        let before = query_all(&tree, &region);
        tree.rebuild_bottom_up();
        tree.validate().unwrap();
        assert_eq!(query_all(&tree, &region), before);
    }

    #[test]
    fn shift_origin_moves_everything() {
        let mut tree = DynamicTree::new();
        let a = tree.create_proxy(unit_box_at(10.0, 10.0), ());
        tree.create_proxy(unit_box_at(0.0, 0.0), ());
        let before = tree.fat_aabb(a);

        tree.shift_origin(m::Vec2::new(10.0, 10.0));
        tree.validate().unwrap();
        let after = tree.fat_aabb(a);
        assert!((after.min - (before.min - m::Vec2::new(10.0, 10.0))).mag() < 1e-12);
        assert_eq!(query_all(&tree, &unit_box_at(0.0, 0.0)), vec![a]);
    }
}
