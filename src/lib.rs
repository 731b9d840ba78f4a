//! # tst-rs
//!
//! A ternary search tree (TST) mapping ordered sequences of comparable
//! tokens to payload values.
//!
//! Beyond the textbook structure it provides:
//! - Weight-based self-rebalancing (`optimize`) driven by per-node payload
//!   counters, to bound mean access depth as the tree grows incrementally
//! - A stateful cursor for explicit position-by-position navigation
//! - A textual persistence format with explicit parent/link tags, so a tree
//!   can be saved and reconstructed without a pointer-stable layout
//!
//! ## Example
//!
//! ```rust
//! use tst_rs::TernaryTree;
//!
//! let mut tree: TernaryTree<char, u32> = TernaryTree::new();
//! tree.insert(&['c', 'a', 't'], 1);
//! tree.insert(&['c', 'a', 'r'], 2);
//!
//! assert_eq!(tree.get(&['c', 'a', 't']), Some(&1));
//! assert_eq!(tree.get(&['c', 'a', 'r']), Some(&2));
//! assert_eq!(tree.get(&['c', 'a']), None); // path exists, no payload
//! ```
//!
//! The tree is single-threaded: callers needing shared access must wrap it
//! in their own synchronization.

#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use log::debug;
use thiserror::Error;

mod persist;

pub use persist::ParseError;

// =============================================================================
// Links and errors
// =============================================================================

/// Names one of the three child slots of a node.
///
/// `Smaller` and `Greater` connect horizontal siblings competing on token
/// order at the same key position; `Next` advances to the following key
/// position for sequences that matched this node's token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Link {
    Smaller,
    Greater,
    Next,
}

impl Link {
    /// The opposite horizontal direction. `Next` has no mirror.
    fn mirrored(self) -> Link {
        match self {
            Link::Smaller => Link::Greater,
            Link::Greater => Link::Smaller,
            Link::Next => Link::Next,
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Link::Smaller => "smaller",
            Link::Greater => "greater",
            Link::Next => "next",
        })
    }
}

/// Caller-contract violations surfaced by cursor and accessor operations.
///
/// None of these indicate structural corruption, and the operation that
/// reports one never leaves partial mutation behind.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum TreeError {
    /// The operation requires a cursor but the tree is empty or the cursor
    /// is unset.
    #[error("the tree is empty or the cursor is unset")]
    EmptyTree,
    /// A child accessor named a link the cursor node does not have.
    #[error("the cursor node has no {0} child")]
    MissingChild(Link),
    /// A payload accessor was used on a node that stores none.
    #[error("the node stores no payload")]
    MissingPayload,
}

// =============================================================================
// Node arena
// =============================================================================

/// Stable handle to a node slot in the arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct NodeId(u32);

impl NodeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Back-reference identifying the exact slot that points at a node: either
/// the tree's root slot or one named child slot of a parent node.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ParentLink {
    Root,
    Child(NodeId, Link),
}

#[derive(Clone, Debug)]
struct Node<T, P> {
    token: T,
    /// Present iff some stored key terminates exactly at this node.
    payload: Option<P>,
    smaller: Option<NodeId>,
    greater: Option<NodeId>,
    next: Option<NodeId>,
    /// Payload-bearing nodes in the subtree rooted at each child. A node's
    /// own payload is counted by its parent's counter, never by its own.
    count_smaller: u32,
    count_greater: u32,
    count_next: u32,
    parent: ParentLink,
}

impl<T, P> Node<T, P> {
    fn new(token: T, parent: ParentLink) -> Self {
        Self {
            token,
            payload: None,
            smaller: None,
            greater: None,
            next: None,
            count_smaller: 0,
            count_greater: 0,
            count_next: 0,
            parent,
        }
    }

    #[inline]
    fn child(&self, link: Link) -> Option<NodeId> {
        match link {
            Link::Smaller => self.smaller,
            Link::Greater => self.greater,
            Link::Next => self.next,
        }
    }

    #[inline]
    fn child_mut(&mut self, link: Link) -> &mut Option<NodeId> {
        match link {
            Link::Smaller => &mut self.smaller,
            Link::Greater => &mut self.greater,
            Link::Next => &mut self.next,
        }
    }

    #[inline]
    fn count(&self, link: Link) -> u32 {
        match link {
            Link::Smaller => self.count_smaller,
            Link::Greater => self.count_greater,
            Link::Next => self.count_next,
        }
    }

    #[inline]
    fn count_mut(&mut self, link: Link) -> &mut u32 {
        match link {
            Link::Smaller => &mut self.count_smaller,
            Link::Greater => &mut self.count_greater,
            Link::Next => &mut self.count_next,
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.smaller.is_none() && self.greater.is_none() && self.next.is_none()
    }
}

// =============================================================================
// Tree engine
// =============================================================================

/// Where a cursor-relative key walk ended.
enum WalkEnd {
    /// Every token matched; holds the key's terminal node.
    Found(NodeId),
    /// The walk stopped at `at`: `key[pos]` would have continued through the
    /// `take` child, which is absent.
    Stopped { at: NodeId, pos: usize, take: Link },
    /// No cursor to walk from.
    Empty,
}

/// A ternary search tree over token sequences.
///
/// Keys are non-empty `&[T]` slices compared token-by-token; a payload is
/// attached to the node where a key terminates. Nodes live in an arena and
/// reference each other through stable handles, so rebalancing and removal
/// relink slots without touching memory layout.
#[derive(Clone)]
pub struct TernaryTree<T, P> {
    slots: Vec<Option<Node<T, P>>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    /// Single movable, non-owning position marker for relative operations.
    cursor: Option<NodeId>,
    node_count: usize,
    payload_count: usize,
}

impl<T, P> TernaryTree<T, P> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
            cursor: None,
            node_count: 0,
            payload_count: 0,
        }
    }

    /// Number of nodes in the tree (including payload-less interior nodes).
    #[inline]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Number of stored payloads.
    #[inline]
    pub fn payload_count(&self) -> usize {
        self.payload_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Drops every node. The arena is released flat, so teardown cost does
    /// not depend on tree depth.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.root = None;
        self.cursor = None;
        self.node_count = 0;
        self.payload_count = 0;
    }

    // --- arena -----------------------------------------------------------

    fn alloc(&mut self, token: T, parent: ParentLink) -> NodeId {
        let node = Node::new(token, parent);
        self.node_count += 1;
        match self.free.pop() {
            Some(id) => {
                self.slots[id.index()] = Some(node);
                id
            }
            None => {
                let id = NodeId(self.slots.len() as u32);
                self.slots.push(Some(node));
                id
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        let slot = self.slots[id.index()].take();
        debug_assert!(slot.is_some(), "released a vacant slot");
        self.node_count -= 1;
        self.free.push(id);
    }

    #[inline]
    fn node(&self, id: NodeId) -> &Node<T, P> {
        self.slots[id.index()].as_ref().expect("stale node handle")
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut Node<T, P> {
        self.slots[id.index()].as_mut().expect("stale node handle")
    }

    /// Rewrites the slot identified by `parent` to point at `child`.
    fn set_parent_slot(&mut self, parent: ParentLink, child: Option<NodeId>) {
        match parent {
            ParentLink::Root => self.root = child,
            ParentLink::Child(p, link) => *self.node_mut(p).child_mut(link) = child,
        }
    }

    /// Adds `delta` to the counter of every ancestor slot on the path from
    /// `id` (exclusive) up to the root. This is the incremental accounting
    /// that keeps the weight counters equal to per-subtree payload counts.
    fn propagate_weight(&mut self, mut id: NodeId, delta: i32) {
        while let ParentLink::Child(parent, link) = self.node(id).parent {
            let count = self.node_mut(parent).count_mut(link);
            *count = count
                .checked_add_signed(delta)
                .expect("weight counter out of range");
            id = parent;
        }
    }

    // --- payloads ----------------------------------------------------------

    /// Attaches or overwrites the payload at the cursor node, returning the
    /// previous payload if any.
    ///
    /// A newly attached payload increments every ancestor counter up to the
    /// root; overwriting leaves counters untouched.
    pub fn set(&mut self, payload: P) -> Result<Option<P>, TreeError> {
        let id = self.cursor.ok_or(TreeError::EmptyTree)?;
        let prev = self.node_mut(id).payload.replace(payload);
        if prev.is_none() {
            self.payload_count += 1;
            self.propagate_weight(id, 1);
        }
        Ok(prev)
    }

    // --- removal -----------------------------------------------------------

    /// Removes the key terminating at the cursor node, then resets the
    /// cursor to the root (removal invalidates position semantics).
    ///
    /// The node itself is retained when it still has a `next` child, since
    /// longer keys extend through it; otherwise it is spliced out of its
    /// sibling BST and any now-useless chain ancestors (no children, no
    /// payload) are pruned. Returns whether the tree changed.
    pub fn remove_at_cursor(&mut self) -> Result<bool, TreeError> {
        let id = self.cursor.ok_or(TreeError::EmptyTree)?;
        Ok(self.remove_node(id))
    }

    fn remove_node(&mut self, id: NodeId) -> bool {
        let mut changed = false;
        if self.node_mut(id).payload.take().is_some() {
            self.payload_count -= 1;
            self.propagate_weight(id, -1);
            changed = true;
        }
        if self.node(id).next.is_none() {
            let parent = self.splice(id);
            self.prune_chain(parent);
            changed = true;
        }
        self.cursor = self.root;
        changed
    }

    /// Splices a payload-less node without a `next` child out of its sibling
    /// BST and returns its former parent link.
    ///
    /// With two horizontal children this is the standard BST deletion applied
    /// at the sibling level: the `greater` child is promoted and the old
    /// `smaller` subtree is grafted under the smallest descendant of the
    /// promoted subtree, transferring its payload weight along that path.
    fn splice(&mut self, id: NodeId) -> ParentLink {
        let node = self.node(id);
        debug_assert!(node.payload.is_none() && node.next.is_none());
        let parent = node.parent;
        let replacement = match (node.smaller, node.greater) {
            (None, None) => None,
            (Some(s), None) => Some(s),
            (None, Some(g)) => Some(g),
            (Some(s), Some(g)) => {
                let grafted_weight = node.count_smaller;
                let mut at = g;
                loop {
                    let n = self.node_mut(at);
                    n.count_smaller += grafted_weight;
                    match n.smaller {
                        Some(next) => at = next,
                        None => break,
                    }
                }
                self.node_mut(at).smaller = Some(s);
                self.node_mut(s).parent = ParentLink::Child(at, Link::Smaller);
                Some(g)
            }
        };
        if let Some(r) = replacement {
            self.node_mut(r).parent = parent;
        }
        self.set_parent_slot(parent, replacement);
        self.release(id);
        parent
    }

    /// Walks upward from a splice point deleting chain ancestors that no
    /// longer serve any key, stopping at the first node that still has a
    /// child or a payload.
    fn prune_chain(&mut self, mut parent: ParentLink) {
        while let ParentLink::Child(id, _) = parent {
            let node = self.node(id);
            if node.payload.is_some() || !node.is_leaf() {
                break;
            }
            parent = self.splice(id);
        }
    }

    // --- rebalancing ---------------------------------------------------------

    /// Rebalances the tree by payload weight.
    ///
    /// Run explicitly after a batch of inserts or removals; it is never
    /// triggered automatically. A node whose `greater` subtree carries more
    /// payload weight than everything else at that node combined plus one is
    /// rotated so the `greater` child takes its slot (symmetrically for an
    /// over-weight `smaller` subtree). The criterion tolerates moderate
    /// imbalance, in the manner of weight-balanced BSTs rather than a strict
    /// AVL/red-black discipline.
    ///
    /// Lookups observe the same results before and after; only access depth
    /// changes. The cursor is reset to the root, since rotation invalidates
    /// previously held positions.
    pub fn optimize(&mut self) {
        let Some(root) = self.root else { return };
        let mut visited = HashSet::new();
        let mut rotations = 0usize;
        self.balance(root, &mut visited, &mut rotations);
        self.cursor = self.root;
        debug!(
            "rebalance pass examined {} nodes, {} rotations",
            visited.len(),
            rotations
        );
    }

    /// One step of the rebalancing walk. The visited set stops the pass from
    /// reprocessing a subtree that a rotation moved into a position the walk
    /// reaches again.
    fn balance(&mut self, id: NodeId, visited: &mut HashSet<NodeId>, rotations: &mut usize) {
        if !visited.insert(id) {
            return;
        }
        let promoted = self.rebalance_at(id);
        if promoted.is_some() {
            *rotations += 1;
        }
        let node = self.node(id);
        let (s, g, n) = (node.smaller, node.greater, node.next);
        if let Some(s) = s {
            self.balance(s, visited, rotations);
        }
        if let Some(g) = g {
            self.balance(g, visited, rotations);
        }
        if let Some(n) = n {
            self.balance(n, visited, rotations);
        }
        // A rotation put a new occupant in this node's former slot; its
        // subtree belongs to the pass too.
        if let Some(p) = promoted {
            self.balance(p, visited, rotations);
        }
    }

    fn rebalance_at(&mut self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        if node.count_next + node.count_smaller + 1 < node.count_greater {
            Some(self.rotate_up(id, Link::Greater))
        } else if node.count_next + node.count_greater + 1 < node.count_smaller {
            Some(self.rotate_up(id, Link::Smaller))
        } else {
            None
        }
    }

    /// Promotes the `heavy` child of `id` into `id`'s slot and grafts `id`
    /// as the extreme opposite-side descendant of the promoted subtree,
    /// transferring the demoted subtree's payload weight along the graft
    /// path. Returns the promoted node.
    fn rotate_up(&mut self, id: NodeId, heavy: Link) -> NodeId {
        debug_assert!(heavy != Link::Next);
        let light = heavy.mirrored();
        let parent = self.node(id).parent;
        let promoted = self
            .node(id)
            .child(heavy)
            .expect("an over-weight side cannot be empty");

        let demoted_weight = {
            let node = self.node_mut(id);
            *node.child_mut(heavy) = None;
            *node.count_mut(heavy) = 0;
            node.count(light) + node.count_next + u32::from(node.payload.is_some())
        };

        self.node_mut(promoted).parent = parent;
        self.set_parent_slot(parent, Some(promoted));

        let mut at = promoted;
        loop {
            let n = self.node_mut(at);
            *n.count_mut(light) += demoted_weight;
            match n.child(light) {
                Some(c) => at = c,
                None => break,
            }
        }
        *self.node_mut(at).child_mut(light) = Some(id);
        self.node_mut(id).parent = ParentLink::Child(at, light);
        promoted
    }

    // --- cursor surface ------------------------------------------------------

    /// Returns the cursor to the root. A missing root leaves the cursor unset.
    pub fn reset_cursor(&mut self) {
        self.cursor = self.root;
    }

    /// Moves the cursor one step through `link`, reporting whether it moved.
    /// An absent child leaves the cursor in place.
    pub fn move_to(&mut self, link: Link) -> bool {
        match self.cursor.and_then(|id| self.node(id).child(link)) {
            Some(child) => {
                self.cursor = Some(child);
                true
            }
            None => false,
        }
    }

    pub fn move_to_smaller(&mut self) -> bool {
        self.move_to(Link::Smaller)
    }

    pub fn move_to_greater(&mut self) -> bool {
        self.move_to(Link::Greater)
    }

    pub fn move_to_next(&mut self) -> bool {
        self.move_to(Link::Next)
    }

    /// Whether the cursor node has the named child. `false` when the cursor
    /// is unset.
    pub fn child_exists(&self, link: Link) -> bool {
        self.cursor
            .is_some_and(|id| self.node(id).child(link).is_some())
    }

    pub fn smaller_exists(&self) -> bool {
        self.child_exists(Link::Smaller)
    }

    pub fn greater_exists(&self) -> bool {
        self.child_exists(Link::Greater)
    }

    pub fn next_exists(&self) -> bool {
        self.child_exists(Link::Next)
    }

    /// True iff the cursor is set and all three children are absent.
    pub fn cursor_is_leaf(&self) -> bool {
        self.cursor.is_some_and(|id| self.node(id).is_leaf())
    }

    fn cursor_node(&self) -> Result<&Node<T, P>, TreeError> {
        self.cursor
            .map(|id| self.node(id))
            .ok_or(TreeError::EmptyTree)
    }

    /// Token of the cursor node.
    pub fn token(&self) -> Result<&T, TreeError> {
        Ok(&self.cursor_node()?.token)
    }

    /// Payload of the cursor node, if one is stored there.
    pub fn payload(&self) -> Result<&P, TreeError> {
        self.cursor_node()?
            .payload
            .as_ref()
            .ok_or(TreeError::MissingPayload)
    }

    /// Token of the named child of the cursor node.
    pub fn child_token(&self, link: Link) -> Result<&T, TreeError> {
        let id = self
            .cursor_node()?
            .child(link)
            .ok_or(TreeError::MissingChild(link))?;
        Ok(&self.node(id).token)
    }

    /// Payload of the named child of the cursor node.
    pub fn child_payload(&self, link: Link) -> Result<&P, TreeError> {
        let id = self
            .cursor_node()?
            .child(link)
            .ok_or(TreeError::MissingChild(link))?;
        self.node(id)
            .payload
            .as_ref()
            .ok_or(TreeError::MissingPayload)
    }

    /// Token of the root node, without moving the cursor.
    pub fn root_token(&self) -> Result<&T, TreeError> {
        let id = self.root.ok_or(TreeError::EmptyTree)?;
        Ok(&self.node(id).token)
    }

    /// Payload of the root node, without moving the cursor.
    pub fn root_payload(&self) -> Result<&P, TreeError> {
        let id = self.root.ok_or(TreeError::EmptyTree)?;
        self.node(id)
            .payload
            .as_ref()
            .ok_or(TreeError::MissingPayload)
    }
}

// =============================================================================
// Key-oriented operations
// =============================================================================

impl<T: Ord, P> TernaryTree<T, P> {
    /// The three-way descent shared by lookup, insertion and removal: at a
    /// fixed position the walk branches on token order through `smaller` or
    /// `greater`, and only an exact match advances the position through
    /// `next`. Starts at the cursor and leaves it on the last node visited.
    fn walk(&mut self, key: &[T]) -> WalkEnd {
        debug_assert!(!key.is_empty());
        let Some(mut at) = self.cursor else {
            return WalkEnd::Empty;
        };
        let mut pos = 0;
        loop {
            let node = self.node(at);
            let take = match key[pos].cmp(&node.token) {
                Ordering::Equal => {
                    if pos + 1 == key.len() {
                        self.cursor = Some(at);
                        return WalkEnd::Found(at);
                    }
                    pos += 1;
                    Link::Next
                }
                Ordering::Less => Link::Smaller,
                Ordering::Greater => Link::Greater,
            };
            match self.node(at).child(take) {
                Some(child) => at = child,
                None => {
                    self.cursor = Some(at);
                    return WalkEnd::Stopped { at, pos, take };
                }
            }
        }
    }

    /// Exact-path lookup from the root.
    ///
    /// Succeeds iff every token of `key` matches, leaving the cursor on the
    /// key's terminal node; whether a payload is stored there is a separate
    /// question ([`payload`](Self::payload) reports `MissingPayload` for
    /// path-only prefixes). On failure the cursor is left on the last node
    /// visited. An empty key never matches.
    pub fn find(&mut self, key: &[T]) -> bool {
        self.cursor = self.root;
        self.find_from_cursor(key)
    }

    /// Exact-path lookup relative to the current cursor position, for
    /// callers walking subtrees explicitly.
    pub fn find_from_cursor(&mut self, key: &[T]) -> bool {
        if key.is_empty() {
            return false;
        }
        matches!(self.walk(key), WalkEnd::Found(_))
    }

    /// Looks up `key` from the root and returns its payload, if the key is
    /// stored with one. Moves the cursor like [`find`](Self::find).
    pub fn get(&mut self, key: &[T]) -> Option<&P> {
        if !self.find(key) {
            return None;
        }
        self.payload().ok()
    }

    /// Removes `key`, looked up from the root. Returns whether the tree
    /// changed; the cursor resets to the root.
    ///
    /// Keys that share a prefix with `key` are unaffected: a terminal node
    /// that still has a `next` child only has its payload cleared.
    pub fn remove(&mut self, key: &[T]) -> bool {
        if key.is_empty() {
            return false;
        }
        self.cursor = self.root;
        match self.walk(key) {
            WalkEnd::Found(id) => self.remove_node(id),
            WalkEnd::Stopped { .. } | WalkEnd::Empty => {
                self.cursor = self.root;
                false
            }
        }
    }
}

impl<T: Ord + Clone, P> TernaryTree<T, P> {
    /// Inserts the node path for `key` without touching payloads, starting
    /// from the root.
    ///
    /// Appends one node per missing suffix position: the first new node
    /// hangs off whichever branch of the stopped node would have matched,
    /// the rest chain through `next`. Returns `true` iff the structure
    /// changed; either way the cursor ends on the key's terminal node, so a
    /// following [`set`](Self::set) attaches the payload (`add` and `set`
    /// are orthogonal).
    pub fn add(&mut self, key: &[T]) -> bool {
        if key.is_empty() {
            return false;
        }
        self.cursor = self.root;
        match self.walk(key) {
            WalkEnd::Found(_) => false,
            WalkEnd::Empty => {
                let first = self.alloc(key[0].clone(), ParentLink::Root);
                self.root = Some(first);
                self.extend_chain(first, &key[1..]);
                true
            }
            WalkEnd::Stopped { at, pos, take } => {
                let id = self.alloc(key[pos].clone(), ParentLink::Child(at, take));
                *self.node_mut(at).child_mut(take) = Some(id);
                self.extend_chain(id, &key[pos + 1..]);
                true
            }
        }
    }

    /// Stores `payload` under `key`, overwriting any previous payload.
    /// Returns `true` iff the node path was newly created.
    pub fn insert(&mut self, key: &[T], payload: P) -> bool {
        if key.is_empty() {
            return false;
        }
        let created = self.add(key);
        self.set(payload)
            .expect("add leaves the cursor on the key's terminal node");
        created
    }

    /// Appends a `next` chain below `at`, one node per remaining token, and
    /// leaves the cursor on the chain's terminal node.
    fn extend_chain(&mut self, mut at: NodeId, rest: &[T]) {
        for token in rest {
            let id = self.alloc(token.clone(), ParentLink::Child(at, Link::Next));
            self.node_mut(at).next = Some(id);
            at = id;
        }
        self.cursor = Some(at);
    }
}

impl<T, P> Default for TernaryTree<T, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, P> fmt::Debug for TernaryTree<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TernaryTree")
            .field("node_count", &self.node_count)
            .field("payload_count", &self.payload_count)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod proptests;
