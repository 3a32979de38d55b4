/// Persistent indexed tree backing vectors.
///
/// A `Slice` is an immutable 16-way trie plus a short tail array; edits go
/// through a `Transient` which copies nodes on first write (keyed by a unique
/// transient id) and republishes with `persist`. Published slices are
/// read-only and freely shared between threads; a transient allows concurrent
/// `set`/`at` on distinct indices during parallel elementwise operations.
///
/// Layout: full chunks of 16 live in a balanced trie of height
/// ⌈log16(tlen)⌉; the final 0..15 elements live in the tail. A missing child
/// pointer is a run of zeros (holes created by `resize`).
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::RwLock;

use crate::core::value::Value;

pub const CHUNK: usize = 16;
const NBITS: u32 = 4;
const MASK: usize = CHUNK - 1;

/// Owner ids are monotone and never reused, so a persisted tree can never be
/// written by a later transient without copy-on-write.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

const FROZEN: u64 = 0;

struct Node {
    id: AtomicU64,
    kind: Kind,
}

enum Kind {
    Branch([ArcSwapOption<Node>; CHUNK]),
    Leaf(RwLock<Vec<Value>>),
}

impl Node {
    fn new_branch(id: u64) -> Node {
        Node {
            id: AtomicU64::new(id),
            kind: Kind::Branch(std::array::from_fn(|_| ArcSwapOption::new(None))),
        }
    }

    fn new_leaf(id: u64, values: Vec<Value>) -> Node {
        debug_assert_eq!(values.len(), CHUNK);
        Node {
            id: AtomicU64::new(id),
            kind: Kind::Leaf(RwLock::new(values)),
        }
    }

    fn zero_leaf(id: u64) -> Node {
        Node::new_leaf(id, vec![Value::zero(); CHUNK])
    }

    fn copy_with_id(&self, id: u64) -> Node {
        match &self.kind {
            Kind::Branch(children) => Node {
                id: AtomicU64::new(id),
                kind: Kind::Branch(std::array::from_fn(|i| {
                    ArcSwapOption::new(children[i].load_full())
                })),
            },
            Kind::Leaf(cell) => Node {
                id: AtomicU64::new(id),
                kind: Kind::Leaf(RwLock::new(cell.read().clone())),
            },
        }
    }
}

fn same(a: &Option<Arc<Node>>, b: &Option<Arc<Node>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

/// Read an element out of the trie. Holes read as zero.
fn tree_at(root: &Option<Arc<Node>>, height: u32, i: usize) -> Value {
    let mut node = match root {
        Some(n) => Arc::clone(n),
        None => return Value::zero(),
    };
    let mut level = height;
    while level > 1 {
        let idx = (i >> (NBITS * (level - 1))) & MASK;
        let child = match &node.kind {
            Kind::Branch(children) => children[idx].load_full(),
            Kind::Leaf(_) => unreachable!("leaf above level 1"),
        };
        node = match child {
            Some(n) => n,
            None => return Value::zero(),
        };
        level -= 1;
    }
    match &node.kind {
        Kind::Leaf(cell) => cell.read()[i & MASK].clone(),
        Kind::Branch(_) => unreachable!("branch at leaf level"),
    }
}

fn capacity(height: u32) -> usize {
    if height == 0 {
        0
    } else {
        1usize << (NBITS * height)
    }
}

fn height_for(tlen: usize) -> u32 {
    let mut h = 0;
    while capacity(h) < tlen {
        h += 1;
    }
    h
}

// ── Published slice ──────────────────────────────────────────────────────────

/// An immutable, structurally shared sequence of values.
#[derive(Clone)]
pub struct Slice {
    root: Option<Arc<Node>>,
    height: u32,
    tlen: usize,
    tail: Arc<Vec<Value>>,
}

impl Slice {
    pub fn empty() -> Slice {
        Slice {
            root: None,
            height: 0,
            tlen: 0,
            tail: Arc::new(Vec::new()),
        }
    }

    /// Build directly, bottom-up: cheaper than a transient for bulk loads.
    pub fn from_values(values: Vec<Value>) -> Slice {
        let tlen = values.len() - values.len() % CHUNK;
        let mut it = values.into_iter();
        let mut level: Vec<Arc<Node>> = Vec::with_capacity(tlen / CHUNK);
        for _ in 0..tlen / CHUNK {
            let chunk: Vec<Value> = it.by_ref().take(CHUNK).collect();
            level.push(Arc::new(Node::new_leaf(FROZEN, chunk)));
        }
        let tail: Vec<Value> = it.collect();
        let mut height = u32::from(!level.is_empty());
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(CHUNK));
            for group in level.chunks(CHUNK) {
                let branch = Node::new_branch(FROZEN);
                if let Kind::Branch(children) = &branch.kind {
                    for (i, child) in group.iter().enumerate() {
                        children[i].store(Some(Arc::clone(child)));
                    }
                }
                next.push(Arc::new(branch));
            }
            level = next;
            height += 1;
        }
        Slice {
            root: level.pop(),
            height,
            tlen,
            tail: Arc::new(tail),
        }
    }

    pub fn len(&self) -> usize {
        self.tlen + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn at(&self, i: usize) -> Value {
        assert!(i < self.len(), "slice read at {} beyond {}", i, self.len());
        if i >= self.tlen {
            self.tail[i - self.tlen].clone()
        } else {
            tree_at(&self.root, self.height, i)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).map(move |i| self.at(i))
    }

    pub fn transient(&self) -> Transient {
        Transient {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            root: ArcSwapOption::new(self.root.clone()),
            height: self.height,
            tlen: self.tlen,
            tail: RwLock::new((*self.tail).clone()),
        }
    }
}

impl PartialEq for Slice {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && (0..self.len()).all(|i| self.at(i) == other.at(i))
    }
}

impl std::fmt::Debug for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

// ── Transient editor ─────────────────────────────────────────────────────────

/// A mutable handle over a slice. `set` copies shared nodes on first touch
/// and claims the copies with this transient's id, swapping them in with an
/// atomic compare-and-swap so concurrent setters of distinct indices race
/// safely. `persist` consumes the handle; the id is never reused.
pub struct Transient {
    id: u64,
    root: ArcSwapOption<Node>,
    height: u32,
    tlen: usize,
    tail: RwLock<Vec<Value>>,
}

impl Transient {
    /// A transient of the given length with every element zero.
    pub fn with_len(len: usize) -> Transient {
        let mut t = Slice::empty().transient();
        t.resize(len);
        t
    }

    pub fn len(&self) -> usize {
        self.tlen + self.tail.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn at(&self, i: usize) -> Value {
        assert!(i < self.len(), "transient read at {} beyond {}", i, self.len());
        if i >= self.tlen {
            self.tail.read()[i - self.tlen].clone()
        } else {
            tree_at(&self.root.load_full(), self.height, i)
        }
    }

    pub fn set(&self, i: usize, v: Value) {
        assert!(i < self.len(), "transient write at {} beyond {}", i, self.len());
        if i >= self.tlen {
            self.tail.write()[i - self.tlen] = v;
            return;
        }
        let mut level = self.height;
        let mut node = self.own(&self.root, level);
        while level > 1 {
            let idx = (i >> (NBITS * (level - 1))) & MASK;
            let slot = match &node.kind {
                Kind::Branch(children) => &children[idx],
                Kind::Leaf(_) => unreachable!("leaf above level 1"),
            };
            let child = self.own(slot, level - 1);
            node = child;
            level -= 1;
        }
        match &node.kind {
            Kind::Leaf(cell) => cell.write()[i & MASK] = v,
            Kind::Branch(_) => unreachable!("branch at leaf level"),
        }
    }

    /// Return the node in `slot`, owned by this transient: materialize holes,
    /// copy-on-write anything another owner published, CAS the copy in.
    fn own(&self, slot: &ArcSwapOption<Node>, level: u32) -> Arc<Node> {
        loop {
            let cur = slot.load_full();
            match &cur {
                None => {
                    let fresh = Arc::new(if level > 1 {
                        Node::new_branch(self.id)
                    } else {
                        Node::zero_leaf(self.id)
                    });
                    let prev = slot.compare_and_swap(&cur, Some(Arc::clone(&fresh)));
                    if same(&*prev, &cur) {
                        return fresh;
                    }
                }
                Some(node) => {
                    if node.id.load(Ordering::Acquire) == self.id {
                        return Arc::clone(node);
                    }
                    let copy = Arc::new(node.copy_with_id(self.id));
                    let prev = slot.compare_and_swap(&cur, Some(Arc::clone(&copy)));
                    if same(&*prev, &cur) {
                        return copy;
                    }
                }
            }
            // Lost the race to a sibling worker of this transient; reload.
        }
    }

    /// Change the length. Grown elements read as zero until initialized;
    /// callers must not rely on their values.
    pub fn resize(&mut self, new_len: usize) {
        let new_tail_len = new_len % CHUNK;
        let new_tlen = new_len - new_tail_len;
        let tail = self.tail.get_mut();

        if new_tlen > self.tlen {
            // Old tail elements become tree elements.
            let moving: Vec<Value> = tail.drain(..).collect();
            let need = height_for(new_tlen);
            if self.root.load_full().is_none() {
                // All holes; `set` materializes nodes on demand.
                self.height = need;
            } else {
                while self.height < need {
                    let grown = Node::new_branch(self.id);
                    if let Kind::Branch(children) = &grown.kind {
                        children[0].store(self.root.load_full());
                    }
                    self.root.store(Some(Arc::new(grown)));
                    self.height += 1;
                }
            }
            let old_tlen = self.tlen;
            self.tlen = new_tlen;
            for (k, v) in moving.into_iter().enumerate() {
                self.set(old_tlen + k, v);
            }
        } else if new_tlen < self.tlen {
            // Load the fresh tail fragment out of the tree, then drop levels.
            let root = self.root.load_full();
            let mut fragment = Vec::with_capacity(new_tail_len);
            for i in new_tlen..new_tlen + new_tail_len {
                fragment.push(tree_at(&root, self.height, i));
            }
            *tail = fragment;
            self.tlen = new_tlen;
            let need = height_for(new_tlen);
            let mut root = root;
            let mut height = self.height;
            while height > need.max(1) && height > 1 {
                root = match &root {
                    Some(node) => match &node.kind {
                        Kind::Branch(children) => children[0].load_full(),
                        Kind::Leaf(_) => unreachable!("leaf above level 1"),
                    },
                    None => None,
                };
                height -= 1;
            }
            if new_tlen == 0 {
                root = None;
                height = 0;
            }
            self.root.store(root);
            self.height = height;
            return;
        } else {
            self.tlen = new_tlen;
        }

        let tail = self.tail.get_mut();
        match new_tail_len.cmp(&tail.len()) {
            std::cmp::Ordering::Less => tail.truncate(new_tail_len),
            std::cmp::Ordering::Greater => tail.resize(new_tail_len, Value::zero()),
            std::cmp::Ordering::Equal => {}
        }
    }

    /// Publish. Consuming the transient retires its id, so every node the
    /// editor claimed is frozen from here on.
    pub fn persist(self) -> Slice {
        Slice {
            root: self.root.load_full(),
            height: self.height,
            tlen: self.tlen,
            tail: Arc::new(self.tail.into_inner()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(n: usize) -> Slice {
        Slice::from_values((0..n as i64).map(Value::Int).collect())
    }

    #[test]
    fn build_and_read() {
        for n in [0usize, 1, 15, 16, 17, 255, 256, 257, 5000] {
            let s = ints(n);
            assert_eq!(s.len(), n);
            for i in (0..n).step_by(97.max(n / 13 + 1)) {
                assert_eq!(s.at(i), Value::Int(i as i64), "n={} i={}", n, i);
            }
            if n > 0 {
                assert_eq!(s.at(n - 1), Value::Int(n as i64 - 1));
            }
        }
    }

    #[test]
    fn edit_preserves_original() {
        let s = ints(1000);
        let t = s.transient();
        t.set(3, Value::Int(-1));
        t.set(999, Value::Int(-2));
        let u = t.persist();
        assert_eq!(u.at(3), Value::Int(-1));
        assert_eq!(u.at(999), Value::Int(-2));
        assert_eq!(u.at(500), Value::Int(500));
        assert_eq!(s.at(3), Value::Int(3));
        assert_eq!(s.at(999), Value::Int(999));
        assert_eq!(u.len(), s.len());
    }

    #[test]
    fn tail_edits() {
        let s = ints(20);
        let t = s.transient();
        t.set(19, Value::Int(77));
        let u = t.persist();
        assert_eq!(u.at(19), Value::Int(77));
        assert_eq!(s.at(19), Value::Int(19));
    }

    #[test]
    fn grow_reads_zero_then_initializes() {
        let s = ints(10);
        let mut t = s.transient();
        t.resize(300);
        assert_eq!(t.len(), 300);
        for i in 0..10 {
            assert_eq!(t.at(i), Value::Int(i as i64));
        }
        t.set(299, Value::Int(9));
        assert_eq!(t.persist().at(299), Value::Int(9));
    }

    #[test]
    fn shrink_reloads_tail() {
        let s = ints(1000);
        let mut t = s.transient();
        t.resize(37);
        let u = t.persist();
        assert_eq!(u.len(), 37);
        for i in 0..37 {
            assert_eq!(u.at(i), Value::Int(i as i64));
        }
    }

    #[test]
    fn shrink_to_empty_and_regrow() {
        let mut t = ints(100).transient();
        t.resize(0);
        assert_eq!(t.len(), 0);
        t.resize(50);
        t.set(49, Value::Int(7));
        let u = t.persist();
        assert_eq!(u.len(), 50);
        assert_eq!(u.at(49), Value::Int(7));
    }

    #[test]
    fn concurrent_sets_on_distinct_indices() {
        let s = ints(4096);
        let t = s.transient();
        rayon::scope(|scope| {
            let t = &t;
            for w in 0..8usize {
                scope.spawn(move |_| {
                    for i in (w..4096).step_by(8) {
                        t.set(i, Value::Int(-(i as i64)));
                    }
                });
            }
        });
        let u = t.persist();
        for i in 0..4096 {
            assert_eq!(u.at(i), Value::Int(-(i as i64)));
        }
        assert_eq!(s.at(100), Value::Int(100));
    }
}
