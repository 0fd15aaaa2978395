use std::{
    cmp::Ordering,
    mem,
    sync::atomic::{self, AtomicU64},
};

use log::{debug, trace};

use crate::cmp::{Comparator, NaturalOrder};
use crate::depth::Depth;
use crate::error::Error;

/// Handle to a node inside a single [`RbTree`] instance. Handles are
/// never invalidated, nodes are not removed once inserted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Color tag for a node, absent children are always [`Color::Black`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    Red,
    Black,
}

/// Side of a parent node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

/// RbTree manage a single instance of in-memory index using
/// [red-black][rbtree] tree, ordered by a caller supplied [`Comparator`].
///
/// Mutating operations take `&mut self`. To share an instance between
/// threads wrap it in a `RwLock`, concurrent readers are fine as long as
/// no writer holds the lock.
///
/// [rbtree]: https://en.wikipedia.org/wiki/Red%E2%80%93black_tree
pub struct RbTree<K, V, C = NaturalOrder> {
    name: String,
    root: Option<NodeId>,
    nodes: Vec<Node<K, V>>,
    cmp: C,
    n_puts: AtomicU64, // number of put operations, including overwrites.
}

/// Different ways to construct a new RbTree instance.
impl<K, V> RbTree<K, V, NaturalOrder>
where
    K: Clone + Ord,
    V: Clone,
{
    /// Create an empty instance of RbTree, identified by `name`, keys
    /// are ordered by their [`Ord`] implementation.
    pub fn new<S>(name: S) -> RbTree<K, V, NaturalOrder>
    where
        S: AsRef<str>,
    {
        RbTree::with_comparator(name, NaturalOrder)
    }
}

impl<K, V, C> RbTree<K, V, C>
where
    K: Clone,
    V: Clone,
    C: Comparator<K>,
{
    /// Create an empty instance of RbTree, identified by `name`, keys
    /// are ordered by `cmp` for the lifetime of this instance.
    pub fn with_comparator<S>(name: S, cmp: C) -> RbTree<K, V, C>
    where
        S: AsRef<str>,
    {
        debug!("rbtree {:?} created", name.as_ref());
        RbTree {
            name: name.as_ref().to_string(),
            root: Default::default(),
            nodes: Default::default(),
            cmp,
            n_puts: Default::default(),
        }
    }
}

/// Maintenance API.
impl<K, V, C> RbTree<K, V, C>
where
    K: Clone,
    V: Clone,
    C: Comparator<K>,
{
    /// Identify this instance. Applications can choose unique names while
    /// creating RbTree instances.
    #[inline]
    pub fn id(&self) -> String {
        self.name.clone()
    }

    /// Return the number of put operations applied to this instance.
    /// Overwriting an existing key is counted as well, hence this is not
    /// the number of distinct keys in the tree.
    #[inline]
    pub fn size(&self) -> u64 {
        self.n_puts.load(atomic::Ordering::SeqCst)
    }

    /// Check whether this index is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Count black nodes along the leftmost spine. Same as the black
    /// height of every other path, as long as the tree is balanced.
    pub fn black_height(&self) -> usize {
        let (mut node, mut blacks) = (self.root, 0);
        while let Some(id) = node {
            let n = self.node(id);
            if n.is_black() {
                blacks += 1;
            }
            node = n.left;
        }
        blacks
    }

    /// Return quickly with basic statisics, only puts(), nodes() and
    /// node_size() are valid with this statisics.
    pub fn stats(&self) -> Stats {
        Stats::new(self.size(), self.nodes.len(), mem::size_of::<Node<K, V>>())
    }
}

/// Write operations on RbTree instance.
impl<K, V, C> RbTree<K, V, C>
where
    K: Clone,
    V: Clone,
    C: Comparator<K>,
{
    /// Set value for key. If there is an existing entry for key,
    /// overwrite the old value in place, tree shape is left untouched.
    pub fn put(&mut self, key: K, value: V) -> Result<(), Error<K>> {
        self.check_key(&key)?;
        let (node, needfix) = self.inner_put(key, value);
        if needfix {
            self.fixup(node);
        }
        Ok(())
    }

    /// Deletion is not supported by this index, always fails with
    /// [`Error::NotImplemented`] once the key is validated.
    pub fn delete(&mut self, key: &K) -> Result<Option<V>, Error<K>> {
        self.check_key(key)?;
        Err(Error::NotImplemented("delete"))
    }

    /// Validate red-black tree with following rules:
    ///
    /// * Root is black.
    /// * From root to any leaf, no consecutive reds allowed in its path.
    /// * Number of blacks should be same under left child and right child.
    /// * Make sure keys are in sorted order.
    /// * Every child points back to its parent.
    ///
    /// Additionally return full statistics on the tree. Refer to [`Stats`]
    /// for more information.
    pub fn validate(&self) -> Result<Stats, Error<K>> {
        if self.color_of(self.root) == Color::Red {
            return Err(Error::RedRoot);
        }
        if let Some(root) = self.root {
            if let Some(parent) = self.node(root).parent {
                let err = format!("root has parent {:?}", parent);
                return Err(Error::BrokenParent(err));
            }
        }
        let mut stats = self.stats();
        stats.set_depths(Depth::new());
        let blacks = self.validate_tree(self.root, false, 0, 0, &mut stats)?;
        stats.set_blacks(blacks);
        Ok(stats)
    }
}

/// Read operations on RbTree instance.
impl<K, V, C> RbTree<K, V, C>
where
    K: Clone,
    V: Clone,
    C: Comparator<K>,
{
    /// Get the value for key, `Ok(None)` when key is not present.
    pub fn get(&self, key: &K) -> Result<Option<V>, Error<K>> {
        self.check_key(key)?;
        Ok(self.get_node(key).map(|id| self.node(id).value.clone()))
    }

    /// Check whether key is present in this instance.
    pub fn has(&self, key: &K) -> bool {
        self.search(key).found
    }

    /// Render the tree in pre-order, `format` is called for every node
    /// with its depth (root is at 0). A node with at least one child is
    /// followed by a parenthesised group for each side, `()` for the
    /// missing side. Leaf nodes are rendered without groups.
    pub fn pre_order_string<F>(&self, mut format: F) -> String
    where
        F: FnMut(&Node<K, V>, usize) -> String,
    {
        enum Step {
            Visit(NodeId, usize),
            Text(&'static str),
        }

        let mut out = String::new();
        let mut stack: Vec<Step> = vec![];
        if let Some(root) = self.root {
            stack.push(Step::Visit(root, 0));
        }
        while let Some(step) = stack.pop() {
            let (id, level) = match step {
                Step::Text(s) => {
                    out.push_str(s);
                    continue;
                }
                Step::Visit(id, level) => (id, level),
            };
            let node = self.node(id);
            out.push_str(&format(node, level));
            if node.left.is_none() && node.right.is_none() {
                continue;
            }
            stack.push(Step::Text(")"));
            if let Some(right) = node.right {
                stack.push(Step::Visit(right, level + 1));
            }
            stack.push(Step::Text(")("));
            if let Some(left) = node.left {
                stack.push(Step::Visit(left, level + 1));
            }
            stack.push(Step::Text("("));
        }
        out
    }
}

/// Low level API, used for testing and extending this index. Calling
/// these directly can break the red-black invariants, subsequent
/// [`RbTree::put`] calls will not repair a tree unbalanced this way.
impl<K, V, C> RbTree<K, V, C>
where
    K: Clone,
    V: Clone,
    C: Comparator<K>,
{
    /// Return the root node, if any.
    #[inline]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Return the node behind `id`. Panics if `id` was not handed out by
    /// this instance.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node<K, V> {
        &self.nodes[id.0]
    }

    /// Locate the node holding `key`.
    pub fn get_node(&self, key: &K) -> Option<NodeId> {
        self.resolve(&self.search(key))
    }

    /// Side of its parent that `id` hangs from, `None` for the root.
    pub fn direction(&self, id: NodeId) -> Option<Direction> {
        let parent = self.node(id).parent?;
        if self.node(parent).left == Some(id) {
            Some(Direction::Left)
        } else {
            Some(Direction::Right)
        }
    }

    /// Plain binary-search-tree insert, without rebalancing. Return the
    /// node holding `key` and whether the caller has to fix colors. A
    /// new node is linked in red, except for the root which is black,
    /// an existing node only gets its value replaced.
    pub fn inner_put(&mut self, key: K, value: V) -> (NodeId, bool) {
        self.n_puts.fetch_add(1, atomic::Ordering::SeqCst);

        if self.root.is_none() {
            let root = self.alloc(Node::new(key, value, Color::Black, None));
            self.root = Some(root);
            return (root, false);
        }

        let search = self.search(&key);
        if let Some(id) = self.resolve(&search) {
            self.node_mut(id).set_value(value);
            return (id, false);
        }

        let id = self.alloc(Node::new(key, value, Color::Red, search.parent));
        if let Some(parent) = search.parent {
            match search.dir {
                Some(Direction::Left) => self.node_mut(parent).left = Some(id),
                _ => self.node_mut(parent).right = Some(id),
            }
        }
        (id, true)
    }

    //              (p)                      (p)
    //               |                        |
    //               x                        y
    //              / \                      / \
    //             a   y         =>         x   c
    //                / \                  / \
    //               b   c                a   b
    //
    /// Promote the right child of `x` into its place. No-op when `x` has
    /// no right child. Colors are left untouched.
    pub fn rotate_left(&mut self, x: NodeId) {
        let y = match self.node(x).right {
            Some(y) => y,
            None => return,
        };
        trace!("rotate-left {:?} {:?}", x, y);
        let (b, p) = (self.node(y).left, self.node(x).parent);

        self.node_mut(x).right = b;
        if let Some(b) = b {
            self.node_mut(b).parent = Some(x);
        }
        self.node_mut(y).parent = p;
        self.replace_child(p, x, y);
        self.node_mut(y).left = Some(x);
        self.node_mut(x).parent = Some(y);
    }

    //              (p)                      (p)
    //               |                        |
    //               y                        x
    //              / \                      / \
    //             x   c         =>         a   y
    //            / \                          / \
    //           a   b                        b   c
    //
    /// Promote the left child of `y` into its place. No-op when `y` has
    /// no left child. Colors are left untouched.
    pub fn rotate_right(&mut self, y: NodeId) {
        let x = match self.node(y).left {
            Some(x) => x,
            None => return,
        };
        trace!("rotate-right {:?} {:?}", y, x);
        let (b, p) = (self.node(x).right, self.node(y).parent);

        self.node_mut(y).left = b;
        if let Some(b) = b {
            self.node_mut(b).parent = Some(y);
        }
        self.node_mut(x).parent = p;
        self.replace_child(p, y, x);
        self.node_mut(x).right = Some(y);
        self.node_mut(y).parent = Some(x);
    }
}

/// Outcome of descending the tree for a key. `parent` is the last node
/// visited before the match or before falling off the tree, `dir` is the
/// side of `parent` leading to the match or to the insertion slot. Both
/// are `None` when the key sits at the root or the tree is empty.
struct Search {
    found: bool,
    parent: Option<NodeId>,
    dir: Option<Direction>,
}

impl<K, V, C> RbTree<K, V, C>
where
    K: Clone,
    V: Clone,
    C: Comparator<K>,
{
    fn check_key(&self, _key: &K) -> Result<(), Error<K>> {
        Ok(())
    }

    fn search(&self, key: &K) -> Search {
        let (mut parent, mut dir, mut node) = (None, None, self.root);
        while let Some(id) = node {
            let n = self.node(id);
            match self.cmp.compare(key, &n.key) {
                Ordering::Greater => {
                    parent = Some(id);
                    dir = Some(Direction::Right);
                    node = n.right;
                }
                Ordering::Less => {
                    parent = Some(id);
                    dir = Some(Direction::Left);
                    node = n.left;
                }
                Ordering::Equal => return Search { found: true, parent, dir },
            }
        }
        Search { found: false, parent, dir }
    }

    // node matched by `search`, if any.
    fn resolve(&self, search: &Search) -> Option<NodeId> {
        if !search.found {
            return None;
        }
        match (search.parent, search.dir) {
            (None, _) => self.root,
            (Some(parent), Some(Direction::Left)) => self.node(parent).left,
            (Some(parent), _) => self.node(parent).right,
        }
    }

    // Restore colors after `node` was linked in red. Walks toward the
    // root while a red-red conflict remains.
    fn fixup(&mut self, mut node: NodeId) {
        loop {
            if self.node(node).is_black() {
                return;
            }
            let parent = match self.node(node).parent {
                Some(parent) if self.node(parent).is_red() => parent,
                _ => return,
            };
            // red parent is never the root, grandparent is present.
            let grand = match self.node(parent).parent {
                Some(grand) => grand,
                None => return,
            };

            let (gl, gr) = (self.node(grand).left, self.node(grand).right);
            if self.color_of(gl) == Color::Red && self.color_of(gr) == Color::Red {
                trace!("fixup {:?} red uncle", node);
                self.paint(gl, Color::Black);
                self.paint(gr, Color::Black);
                if Some(grand) == self.root {
                    return;
                }
                self.paint(Some(grand), Color::Red);
                node = grand;
                continue;
            }

            // zig-zag, rotate the parent so that both reds line up.
            let (side, pside) = (self.direction(node), self.direction(parent));
            if side == Some(Direction::Left) && pside == Some(Direction::Right) {
                trace!("fixup {:?} zig-zag right", node);
                node = parent;
                self.rotate_right(node);
            }
            let pside = self.node(node).parent.and_then(|p| self.direction(p));
            if self.direction(node) == Some(Direction::Right)
                && pside == Some(Direction::Left)
            {
                trace!("fixup {:?} zig-zag left", node);
                node = match self.node(node).parent {
                    Some(parent) => parent,
                    None => return,
                };
                self.rotate_left(node);
            }

            let parent = match self.node(node).parent {
                Some(parent) => parent,
                None => return,
            };
            let grand = match self.node(parent).parent {
                Some(grand) => grand,
                None => return,
            };
            self.paint(Some(parent), Color::Black);

            let (gl, gr) = (self.node(grand).left, self.node(grand).right);
            if self.color_of(gl) == self.color_of(gr) {
                trace!("fixup {:?} black uncle", node);
                self.paint(Some(grand), Color::Red);
                if gl == Some(parent) {
                    self.rotate_right(grand);
                } else {
                    self.rotate_left(grand);
                }
                return;
            }

            trace!("fixup {:?} red uncle after realign", node);
            let uncle = if gl == Some(parent) { gr } else { gl };
            self.paint(uncle, Color::Black);
            if Some(grand) == self.root {
                return;
            }
            self.paint(Some(grand), Color::Red);
            node = grand;
        }
    }

    fn validate_tree(
        &self,
        node: Option<NodeId>,
        fromred: bool,
        mut nb: usize,
        depth: usize,
        stats: &mut Stats,
    ) -> Result<usize, Error<K>> {
        let id = match node {
            None => {
                if let Some(depths) = stats.depths.as_mut() {
                    depths.sample(depth);
                }
                return Ok(nb);
            }
            Some(id) => id,
        };

        let n = self.node(id);
        if fromred && n.is_red() {
            return Err(Error::ConsecutiveReds);
        }
        if n.is_black() {
            nb += 1;
        }
        for child in [n.left, n.right].iter().filter_map(|c| *c) {
            if self.node(child).parent != Some(id) {
                let err = format!("{:?} under {:?}", child, id);
                return Err(Error::BrokenParent(err));
            }
        }

        let lblacks = self.validate_tree(n.left, n.is_red(), nb, depth + 1, stats)?;
        let rblacks = self.validate_tree(n.right, n.is_red(), nb, depth + 1, stats)?;
        if lblacks != rblacks {
            let err = format!("left: {} right: {}", lblacks, rblacks);
            return Err(Error::UnbalancedBlacks(err));
        }
        if let Some(left) = n.left.map(|l| self.node(l)) {
            if self.cmp.compare(&left.key, &n.key) != Ordering::Less {
                return Err(Error::SortError(left.key.clone(), n.key.clone()));
            }
        }
        if let Some(right) = n.right.map(|r| self.node(r)) {
            if self.cmp.compare(&right.key, &n.key) != Ordering::Greater {
                return Err(Error::SortError(right.key.clone(), n.key.clone()));
            }
        }
        Ok(lblacks)
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut Node<K, V> {
        &mut self.nodes[id.0]
    }

    fn alloc(&mut self, node: Node<K, V>) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    #[inline]
    fn color_of(&self, node: Option<NodeId>) -> Color {
        node.map_or(Color::Black, |id| self.node(id).color)
    }

    #[inline]
    fn paint(&mut self, node: Option<NodeId>, color: Color) {
        if let Some(id) = node {
            self.node_mut(id).color = color
        }
    }

    // point `parent`'s link at `old` to `new`, or the root if `parent`
    // is absent.
    fn replace_child(&mut self, parent: Option<NodeId>, old: NodeId, new: NodeId) {
        match parent {
            None => self.root = Some(new),
            Some(p) => {
                let pn = self.node_mut(p);
                if pn.left == Some(old) {
                    pn.left = Some(new)
                } else {
                    pn.right = Some(new)
                }
            }
        }
    }
}

impl<K, V, C> Clone for RbTree<K, V, C>
where
    K: Clone,
    V: Clone,
    C: Clone,
{
    fn clone(&self) -> Self {
        RbTree {
            name: self.name.clone(),
            root: self.root,
            nodes: self.nodes.clone(),
            cmp: self.cmp.clone(),
            n_puts: AtomicU64::new(self.n_puts.load(atomic::Ordering::SeqCst)),
        }
    }
}

/// Node corresponds to a single entry in RbTree instance.
#[derive(Clone)]
pub struct Node<K, V> {
    key: K,
    value: V,
    color: Color,
    parent: Option<NodeId>, // navigation only, never owns
    left: Option<NodeId>,
    right: Option<NodeId>,
}

impl<K, V> Node<K, V> {
    fn new(key: K, value: V, color: Color, parent: Option<NodeId>) -> Node<K, V> {
        Node {
            key,
            value,
            color,
            parent,
            left: None,
            right: None,
        }
    }

    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    pub fn color(&self) -> Color {
        self.color
    }

    #[inline]
    pub fn is_black(&self) -> bool {
        self.color == Color::Black
    }

    #[inline]
    pub fn is_red(&self) -> bool {
        self.color == Color::Red
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn left(&self) -> Option<NodeId> {
        self.left
    }

    #[inline]
    pub fn right(&self) -> Option<NodeId> {
        self.right
    }

    // SET / UPDATE, topology and color stay as they are.
    #[inline]
    fn set_value(&mut self, value: V) {
        self.value = value
    }
}

/// Statistics on [`RbTree`] tree. Serves two purpose:
///
/// * To get partial but quick statistics via [`RbTree::stats`] method.
/// * To get full statisics via [`RbTree::validate`] method.
#[derive(Default, Debug)]
pub struct Stats {
    puts: u64,
    nodes: usize,
    node_size: usize,
    blacks: Option<usize>,
    depths: Option<Depth>,
}

impl Stats {
    fn new(puts: u64, nodes: usize, node_size: usize) -> Stats {
        Stats {
            puts,
            nodes,
            node_size,
            blacks: Default::default(),
            depths: Default::default(),
        }
    }

    #[inline]
    fn set_blacks(&mut self, blacks: usize) {
        self.blacks = Some(blacks)
    }

    #[inline]
    fn set_depths(&mut self, depths: Depth) {
        self.depths = Some(depths)
    }

    /// Return number of put operations on [`RbTree`] instance.
    #[inline]
    pub fn puts(&self) -> u64 {
        self.puts
    }

    /// Return number of distinct keys held by [`RbTree`] instance.
    #[inline]
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// Return node-size, including over-head for `RbTree<K, V>`. The
    /// overhead is constant, node size varies with key and value types.
    #[inline]
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// Return number of black nodes from root to leaf, on both left
    /// and right child.
    #[inline]
    pub fn blacks(&self) -> Option<usize> {
        self.blacks
    }

    /// Return [`Depth`] statistics.
    pub fn depths(&self) -> Option<Depth> {
        match &self.depths {
            Some(depths) if depths.samples() > 0 => Some(depths.clone()),
            _ => None,
        }
    }
}
