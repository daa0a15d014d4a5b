//! # scapegoat-rs
//!
//! An ordered map backed by a scapegoat tree, used as the per-node child-edge
//! index during online suffix-tree construction: given an edge's leading
//! symbol, locate the outgoing edge in logarithmic time, staying balanced
//! under arbitrary insertion/deletion patterns.
//!
//! Based on "Scapegoat Trees" (SODA 1993, Galperin and Rivest). Balance is
//! restored by rebuilding whole subtrees instead of rotating: insertion may
//! trigger a local rebuild at a scapegoat ancestor, deletion may trigger a
//! global rebuild once the live size falls below `alpha` times the high-water
//! mark. Both rebuilds relink existing nodes in place and cost O(subtree).
//!
//! ## Example
//!
//! ```rust
//! use scapegoat_rs::ScapegoatTree;
//!
//! let mut edges: ScapegoatTree<char, u64> = ScapegoatTree::new();
//! edges.insert('a', 1).unwrap();
//! edges.insert('b', 2).unwrap();
//!
//! assert_eq!(edges.get(&'a'), Some(&1));
//! assert_eq!(edges.get(&'z'), None);
//! assert!(edges.insert('a', 3).is_err());
//! ```
//!
//! Single-threaded by design: every operation runs synchronously to
//! completion and callers must serialize access to a shared instance.

use std::cmp::Ordering;

use smallvec::SmallVec;

// =============================================================================
// Configuration
// =============================================================================

/// Weight-balance tuning constant used by [`ScapegoatTree::new`].
///
/// Must lie in (0, 1); values closer to 1 tolerate more skew before
/// rebuilding, values closer to 0.5 keep the tree tighter at the cost of more
/// frequent rebuilds.
pub const DEFAULT_ALPHA: f64 = 0.58;

/// Maximum permitted subtree height for `size` nodes: `floor(log_{1/alpha}(size))`.
#[inline]
fn h_alpha(alpha: f64, size: usize) -> usize {
    debug_assert!(size > 0);
    ((size as f64).ln() / alpha.recip().ln()).floor() as usize
}

// =============================================================================
// Errors
// =============================================================================

/// Errors triggered by tree mutations.
///
/// Structural-invariant violations ("claimed child is not a child of the
/// claimed parent", "no scapegoat among the recorded ancestors") are contract
/// errors, not data errors: they panic instead of appearing here.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TreeError<K, V> {
    /// Insertion of a key that is already present. The rejected pair is
    /// handed back to the caller; the tree is left unchanged.
    #[error("key is already present in the tree")]
    DuplicateKey(K, V),
}

// =============================================================================
// Node arena
// =============================================================================

/// Handle to a node slot in the tree's arena. NULL marks an absent child.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Ref(u32);

impl Ref {
    const NULL: Ref = Ref(u32::MAX);

    #[inline]
    fn is_null(self) -> bool {
        self.0 == Self::NULL.0
    }

    #[inline]
    fn idx(self) -> usize {
        debug_assert!(!self.is_null());
        self.0 as usize
    }
}

/// A binary-search-tree cell: an immutable key/value pair plus two child
/// handles. Nodes never store a parent link; ancestry is recovered from the
/// explicit path recorded while descending.
#[derive(Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    left: Ref,
    right: Ref,
}

/// Transient ancestor path recorded during descent, root first.
type AncestorPath = SmallVec<[Ref; 16]>;

// =============================================================================
// Tree
// =============================================================================

/// An ordered map balanced by scapegoat rebuilds.
///
/// Keys are compared with a caller-supplied total order `C` (equality is
/// comparator-equality). Values are immutable once stored; changing a mapping
/// requires [`remove`](Self::remove) followed by [`insert`](Self::insert).
///
/// Nodes live in an arena and are addressed by index, so rebuilds only
/// rewrite child handles and dropping the tree never recurses.
#[derive(Clone)]
pub struct ScapegoatTree<K, V, C = fn(&K, &K) -> Ordering> {
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<u32>,
    root: Ref,
    /// Live node count.
    len: usize,
    /// Largest `len` observed as of the most recent successful insertion;
    /// reset by a delete-triggered global rebuild. Gates global rebuilds only.
    high_water: usize,
    alpha: f64,
    cmp: C,
}

impl<K: Ord, V> ScapegoatTree<K, V> {
    /// Creates an empty tree ordered by `K`'s natural order, with
    /// [`DEFAULT_ALPHA`].
    pub fn new() -> Self {
        Self::with_alpha(DEFAULT_ALPHA)
    }

    /// Creates an empty tree ordered by `K`'s natural order.
    ///
    /// # Panics
    /// Panics if `alpha` is not in (0, 1).
    pub fn with_alpha(alpha: f64) -> Self {
        Self::with_comparator_and_alpha(K::cmp as fn(&K, &K) -> Ordering, alpha)
    }
}

impl<K: Ord, V> Default for ScapegoatTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C> ScapegoatTree<K, V, C>
where
    C: Fn(&K, &K) -> Ordering,
{
    /// Creates an empty tree using `cmp` as the total order over keys, with
    /// [`DEFAULT_ALPHA`].
    pub fn with_comparator(cmp: C) -> Self {
        Self::with_comparator_and_alpha(cmp, DEFAULT_ALPHA)
    }

    /// Creates an empty tree using `cmp` as the total order over keys.
    ///
    /// `alpha` is fixed for the lifetime of the instance.
    ///
    /// # Panics
    /// Panics if `alpha` is not in (0, 1).
    pub fn with_comparator_and_alpha(cmp: C, alpha: f64) -> Self {
        assert!(
            alpha > 0.0 && alpha < 1.0,
            "alpha must lie in (0, 1), got {alpha}"
        );
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: Ref::NULL,
            len: 0,
            high_water: 0,
            alpha,
            cmp,
        }
    }

    /// Returns a reference to the value mapped to `key`, descending from the
    /// root by comparator order. Cost is proportional to depth.
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut cur = self.root;
        while !cur.is_null() {
            let node = self.node(cur);
            cur = match (self.cmp)(key, &node.key) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return Some(&node.value),
            };
        }
        None
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Inserts a new mapping.
    ///
    /// Fails with [`TreeError::DuplicateKey`] (handing the pair back) if the
    /// key is already present; the tree is left unchanged in that case. On
    /// success the high-water mark is raised to the new size, and if the new
    /// node came to rest deeper than `h_alpha(len)` the scapegoat ancestor's
    /// subtree is rebuilt in place.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), TreeError<K, V>> {
        let node = self.alloc(key, value);
        let path = match self.claim_slot(node) {
            Some(path) => path,
            None => {
                let (key, value) = self.release(node);
                return Err(TreeError::DuplicateKey(key, value));
            }
        };
        self.len += 1;
        self.high_water = self.len;

        let depth = path.len();
        if depth > h_alpha(self.alpha, self.len) {
            let (scapegoat, sg_parent) = self.find_scapegoat(&path, node);
            let was_left = !sg_parent.is_null() && self.left(sg_parent) == scapegoat;
            let size = self.subtree_size(scapegoat);
            let rebuilt = self.rebuild(size, scapegoat);
            if sg_parent.is_null() {
                self.root = rebuilt;
            } else if was_left {
                self.set_left(sg_parent, rebuilt);
            } else {
                self.set_right(sg_parent, rebuilt);
            }
        }
        Ok(())
    }

    /// Removes the mapping for `key`, returning its value.
    ///
    /// Removing an absent key is a no-op returning `None`. After a successful
    /// removal, once the live size falls below `alpha` times the high-water
    /// mark the whole tree is rebuilt and the mark is reset to the size.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.unlink(key)?;
        if (self.len as f64) < self.alpha * self.high_water as f64 && !self.root.is_null() {
            self.root = self.rebuild(self.len, self.root);
            self.high_water = self.len;
        }
        Some(value)
    }

    /// Descends from the root claiming empty child slots until `node` comes
    /// to rest, recording every visited ancestor. Returns `None` when an
    /// equal key is found; no slot has been claimed at that point, so the
    /// tree is structurally untouched.
    fn claim_slot(&mut self, node: Ref) -> Option<AncestorPath> {
        let mut path = AncestorPath::new();
        if self.root.is_null() {
            self.root = node;
            return Some(path);
        }
        let mut cur = self.root;
        while cur != node {
            path.push(cur);
            cur = match (self.cmp)(self.key(node), self.key(cur)) {
                Ordering::Less => self.get_or_set_left(cur, node),
                Ordering::Greater => self.get_or_set_right(cur, node),
                Ordering::Equal => return None,
            };
        }
        Some(path)
    }

    /// Unlinks the node holding `key` and vacates its arena slot, returning
    /// the stored value. Does not touch the high-water mark.
    fn unlink(&mut self, key: &K) -> Option<V> {
        let mut parent = Ref::NULL;
        let mut cur = self.root;
        while !cur.is_null() {
            match (self.cmp)(key, self.key(cur)) {
                Ordering::Less => {
                    parent = cur;
                    cur = self.left(cur);
                }
                Ordering::Greater => {
                    parent = cur;
                    cur = self.right(cur);
                }
                Ordering::Equal => {
                    if !self.left(cur).is_null() && !self.right(cur).is_null() {
                        // Substitute the in-order successor: the minimum of
                        // the right subtree, which has no left child.
                        let (succ, succ_parent) = self.find_minimum(self.right(cur), cur);
                        self.splice_leafward(succ, succ_parent);
                        let (left, right) = {
                            let node = self.node(cur);
                            (node.left, node.right)
                        };
                        let succ_node = self.node_mut(succ);
                        succ_node.left = left;
                        succ_node.right = right;
                        self.replace_child(parent, cur, succ);
                    } else {
                        self.splice_leafward(cur, parent);
                    }
                    let (_, value) = self.release(cur);
                    return Some(value);
                }
            }
        }
        None
    }

    /// Walks upward from the freshly inserted `node` through its recorded
    /// ancestors (nearest first), accumulating subtree size and height, and
    /// returns the first ancestor whose height exceeds `h_alpha` of its
    /// accumulated size, paired with that ancestor's own parent (NULL if it
    /// is the root).
    ///
    /// Because the weight-balance invariant held before this insertion, a
    /// scapegoat exists whenever the inserted depth exceeds `h_alpha(len)`;
    /// running out of ancestors means the precondition was violated.
    fn find_scapegoat(&self, path: &[Ref], node: Ref) -> (Ref, Ref) {
        let mut current = node;
        let mut size = 1usize;
        let mut height = 0usize;
        let mut i = path.len();
        while i > 0 {
            i -= 1;
            let parent = path[i];
            height += 1;
            let total = 1 + size + self.subtree_size(self.sibling_of(parent, current));
            if height > h_alpha(self.alpha, total) {
                let grandparent = if i > 0 { path[i - 1] } else { Ref::NULL };
                return (parent, grandparent);
            }
            current = parent;
            size = total;
        }
        unreachable!("no scapegoat among the recorded ancestors");
    }
}

// Operations that do not consult the comparator.
impl<K, V, C> ScapegoatTree<K, V, C> {
    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.root.is_null()
    }

    /// Returns `true` if the tree holds exactly one entry.
    pub fn contains_one(&self) -> bool {
        !self.root.is_null() && self.left(self.root).is_null() && self.right(self.root).is_null()
    }

    /// Returns the root's value, or `None` on an empty tree. Fast path for
    /// low-fan-out suffix-tree nodes.
    pub fn first(&self) -> Option<&V> {
        if self.root.is_null() {
            None
        } else {
            Some(&self.node(self.root).value)
        }
    }

    /// Pre-order enumeration of all live entries. The order is not sorted;
    /// each call starts a fresh traversal.
    pub fn entries(&self) -> Entries<'_, K, V, C> {
        let mut stack = Vec::new();
        if !self.root.is_null() {
            stack.push(self.root);
        }
        Entries { tree: self, stack }
    }

    // -- arena ----------------------------------------------------------------

    #[inline]
    fn node(&self, r: Ref) -> &Node<K, V> {
        self.slots[r.idx()].as_ref().expect("node slot is vacant")
    }

    #[inline]
    fn node_mut(&mut self, r: Ref) -> &mut Node<K, V> {
        self.slots[r.idx()].as_mut().expect("node slot is vacant")
    }

    #[inline]
    fn key(&self, r: Ref) -> &K {
        &self.node(r).key
    }

    #[inline]
    fn left(&self, r: Ref) -> Ref {
        self.node(r).left
    }

    #[inline]
    fn right(&self, r: Ref) -> Ref {
        self.node(r).right
    }

    #[inline]
    fn set_left(&mut self, r: Ref, child: Ref) {
        self.node_mut(r).left = child;
    }

    #[inline]
    fn set_right(&mut self, r: Ref, child: Ref) {
        self.node_mut(r).right = child;
    }

    fn alloc(&mut self, key: K, value: V) -> Ref {
        let node = Node {
            key,
            value,
            left: Ref::NULL,
            right: Ref::NULL,
        };
        match self.free.pop() {
            Some(i) => {
                debug_assert!(self.slots[i as usize].is_none());
                self.slots[i as usize] = Some(node);
                Ref(i)
            }
            None => {
                debug_assert!(self.slots.len() < Ref::NULL.0 as usize);
                let i = self.slots.len() as u32;
                self.slots.push(Some(node));
                Ref(i)
            }
        }
    }

    /// Vacates `r`'s slot, recycling the index and returning the stored pair.
    fn release(&mut self, r: Ref) -> (K, V) {
        let node = self.slots[r.idx()].take().expect("node slot is vacant");
        self.free.push(r.0);
        (node.key, node.value)
    }

    // -- node primitives ------------------------------------------------------

    /// Claims `parent`'s left slot for `child` if empty; returns the
    /// occupant either way, so repeated descent-and-claim is safe.
    #[inline]
    fn get_or_set_left(&mut self, parent: Ref, child: Ref) -> Ref {
        let node = self.node_mut(parent);
        if node.left.is_null() {
            node.left = child;
        }
        node.left
    }

    /// Right-slot counterpart of [`get_or_set_left`](Self::get_or_set_left).
    #[inline]
    fn get_or_set_right(&mut self, parent: Ref, child: Ref) -> Ref {
        let node = self.node_mut(parent);
        if node.right.is_null() {
            node.right = child;
        }
        node.right
    }

    /// Asserts that `child` is one of `parent`'s two children. A failure is
    /// a contract violation (corrupted tree or foreign node), not a data
    /// error, so it halts loudly in debug builds.
    #[inline]
    fn debug_check_is_child(&self, parent: Ref, child: Ref) {
        debug_assert!(
            parent.is_null() || self.left(parent) == child || self.right(parent) == child,
            "claimed child is not a child of the claimed parent"
        );
    }

    /// Returns `parent`'s other child relative to `node` (possibly NULL).
    fn sibling_of(&self, parent: Ref, node: Ref) -> Ref {
        let p = self.node(parent);
        if p.left == node {
            p.right
        } else if p.right == node {
            p.left
        } else {
            panic!("node is not a child of the claimed parent");
        }
    }

    /// Number of nodes in the subtree at `root` (0 for NULL).
    fn subtree_size(&self, root: Ref) -> usize {
        let mut count = 0usize;
        let mut stack: SmallVec<[Ref; 32]> = SmallVec::new();
        if !root.is_null() {
            stack.push(root);
        }
        while let Some(r) = stack.pop() {
            count += 1;
            let node = self.node(r);
            if !node.left.is_null() {
                stack.push(node.left);
            }
            if !node.right.is_null() {
                stack.push(node.right);
            }
        }
        count
    }

    // -- splicing -------------------------------------------------------------

    /// Leftmost node of the subtree at `node`, with its parent.
    fn find_minimum(&self, mut node: Ref, mut parent: Ref) -> (Ref, Ref) {
        loop {
            self.debug_check_is_child(parent, node);
            let left = self.left(node);
            if left.is_null() {
                return (node, parent);
            }
            parent = node;
            node = left;
        }
    }

    /// Splices out a node with at most one child, replacing it in `parent`
    /// with its sole child (or NULL). Decrements the live count.
    fn splice_leafward(&mut self, node: Ref, parent: Ref) {
        self.debug_check_is_child(parent, node);
        let (left, right) = {
            let n = self.node(node);
            (n.left, n.right)
        };
        debug_assert!(
            left.is_null() || right.is_null(),
            "spliced node must have an empty child"
        );
        let replacement = if right.is_null() { left } else { right };
        self.replace_child(parent, node, replacement);
        self.len -= 1;
    }

    /// Rewrites `parent`'s link to `old_child` to point at `new_child`; a
    /// NULL parent rewrites the root.
    fn replace_child(&mut self, parent: Ref, old_child: Ref, new_child: Ref) {
        if parent.is_null() {
            self.root = new_child;
        } else if self.left(parent) == old_child {
            self.set_left(parent, new_child);
        } else if self.right(parent) == old_child {
            self.set_right(parent, new_child);
        } else {
            panic!("old child is not a child of the claimed parent");
        }
    }

    // -- vine construction and rebuilding -------------------------------------

    /// Linearizes the subtree at `root` into a right-linked chain in
    /// ascending key order, terminated by `tail` (possibly NULL), clearing
    /// the left pointer of every node. Returns the head of the chain.
    ///
    /// Runs a reverse in-order walk with an explicit stack: flatten executes
    /// on pre-rebalance subtrees whose right spine can be arbitrarily long,
    /// so the spine must not be walked by recursion.
    fn flatten(&mut self, root: Ref, tail: Ref) -> Ref {
        let mut head = tail;
        let mut stack: Vec<Ref> = Vec::new();
        let mut cur = root;
        loop {
            while !cur.is_null() {
                stack.push(cur);
                cur = self.right(cur);
            }
            let Some(r) = stack.pop() else { break };
            cur = self.left(r);
            let node = self.node_mut(r);
            node.right = head;
            node.left = Ref::NULL;
            head = r;
        }
        head
    }

    /// Consumes the first `size` nodes of a right-linked chain and rebuilds
    /// a height-balanced subtree from them, returning the new subtree root
    /// and the rightmost node so callers can splice continuations. The
    /// resulting tree has `ceil(log2(size + 1))` levels.
    ///
    /// Recursion depth is O(log size), safe on any chain length.
    fn build_balanced(&mut self, size: usize, head: Ref) -> (Ref, Ref) {
        debug_assert!(size >= 1 && !head.is_null());
        if size == 1 {
            return (head, head);
        }
        if size == 2 {
            let root = self.right(head);
            self.set_left(root, head);
            self.set_right(head, Ref::NULL);
            return (root, root);
        }
        let (left_root, left_last) = self.build_balanced(size / 2, head);
        let root = self.right(left_last);
        self.set_left(root, left_root);
        let (right_root, right_last) = self.build_balanced(size - size / 2 - 1, self.right(root));
        self.set_right(root, right_root);
        // Sever the left subtree's trailing link so it no longer points past
        // its own root.
        self.set_right(left_last, Ref::NULL);
        (root, right_last)
    }

    /// Rebuilds the subtree at `root` (of known `size`) into height-balanced
    /// form, returning the new subtree root. Each node is visited twice.
    fn rebuild(&mut self, size: usize, root: Ref) -> Ref {
        debug_assert!(size > 0 && !root.is_null());
        let head = self.flatten(root, Ref::NULL);
        let (new_root, _) = self.build_balanced(size, head);
        new_root
    }
}

// =============================================================================
// Iteration
// =============================================================================

/// Pre-order iterator over a tree's live entries.
///
/// Created by [`ScapegoatTree::entries`].
pub struct Entries<'a, K, V, C = fn(&K, &K) -> Ordering> {
    tree: &'a ScapegoatTree<K, V, C>,
    stack: Vec<Ref>,
}

impl<'a, K, V, C> Iterator for Entries<'a, K, V, C> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let r = self.stack.pop()?;
        let node = self.tree.node(r);
        if !node.right.is_null() {
            self.stack.push(node.right);
        }
        if !node.left.is_null() {
            self.stack.push(node.left);
        }
        Some((&node.key, &node.value))
    }
}

impl<'a, K, V, C> IntoIterator for &'a ScapegoatTree<K, V, C> {
    type Item = (&'a K, &'a V);
    type IntoIter = Entries<'a, K, V, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
impl<K, V, C> ScapegoatTree<K, V, C> {
    /// Maximum depth in edges; 0 for empty or single-node trees.
    fn height(&self) -> usize {
        let mut max = 0usize;
        let mut stack: Vec<(Ref, usize)> = Vec::new();
        if !self.root.is_null() {
            stack.push((self.root, 0));
        }
        while let Some((r, depth)) = stack.pop() {
            max = max.max(depth);
            let node = self.node(r);
            if !node.left.is_null() {
                stack.push((node.left, depth + 1));
            }
            if !node.right.is_null() {
                stack.push((node.right, depth + 1));
            }
        }
        max
    }
}


#[cfg(test)]
mod proptests;
