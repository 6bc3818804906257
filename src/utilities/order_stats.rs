//! Arena-backed AVL tree keyed on `(value, position)`.
//!
//! Nodes live in a `Vec` and link to each other by index; removed slots go on
//! a free list and are reused by the next insert, so a window that slides
//! forever allocates at most `window` nodes. Every node stores the size and
//! the position sum of its subtree, which gives O(log n) rank queries and the
//! position sums the rank-correlation engine needs.

use std::cmp::Ordering;

use crate::utilities::sample::RankValue;

const NIL: usize = usize::MAX;

#[derive(Clone, Debug)]
struct Node<T> {
    value: T,
    pos: usize,
    left: usize,
    right: usize,
    height: u8,
    size: usize,
    pos_sum: u128,
}

#[derive(Clone, Debug)]
pub struct OrderStatTree<T> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    root: usize,
}

#[inline(always)]
fn cmp_key<T: RankValue>(a: T, a_pos: usize, b: T, b_pos: usize) -> Ordering {
    a.rank_cmp(&b).then(a_pos.cmp(&b_pos))
}

impl<T: RankValue> Default for OrderStatTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: RankValue> OrderStatTree<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(cap),
            free: Vec::new(),
            root: NIL,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.size(self.root)
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.root == NIL
    }

    /// Drops every key but keeps the arena allocation.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = NIL;
    }

    pub fn insert(&mut self, value: T, pos: usize) {
        let idx = self.alloc(value, pos);
        self.root = self.insert_at(self.root, idx);
    }

    /// Returns `false` if `(value, pos)` was not stored.
    pub fn remove(&mut self, value: T, pos: usize) -> bool {
        let (root, removed) = self.remove_at(self.root, value, pos);
        self.root = root;
        match removed {
            Some(idx) => {
                self.free.push(idx);
                true
            }
            None => false,
        }
    }

    /// Number of keys strictly below `(value, pos)`.
    #[inline]
    pub fn rank_of(&self, value: T, pos: usize) -> usize {
        self.prefix(|v, p| cmp_key(v, p, value, pos) == Ordering::Less)
            .0
    }

    /// Number of keys whose value is strictly below `value`.
    #[inline]
    pub fn rank_of_less_than(&self, value: T) -> usize {
        self.prefix(|v, _| v.rank_cmp(&value) == Ordering::Less).0
    }

    /// Number of keys whose value is at most `value`.
    #[inline]
    pub fn rank_of_at_most(&self, value: T) -> usize {
        self.prefix(|v, _| v.rank_cmp(&value) != Ordering::Greater)
            .0
    }

    #[inline]
    pub fn position_sum_less_than(&self, value: T) -> u128 {
        self.prefix(|v, _| v.rank_cmp(&value) == Ordering::Less).1
    }

    #[inline]
    pub fn position_sum_at_most(&self, value: T) -> u128 {
        self.prefix(|v, _| v.rank_cmp(&value) != Ordering::Greater)
            .1
    }

    #[inline(always)]
    pub fn position_sum(&self) -> u128 {
        self.sum(self.root)
    }

    /// Count and position sum of the in-order prefix on which `below` holds.
    /// `below` must be monotone over the key order.
    #[inline(always)]
    fn prefix(&self, below: impl Fn(T, usize) -> bool) -> (usize, u128) {
        let mut count = 0usize;
        let mut sum = 0u128;
        let mut at = self.root;
        while at != NIL {
            let n = &self.nodes[at];
            if below(n.value, n.pos) {
                count += self.size(n.left) + 1;
                sum += self.sum(n.left) + n.pos as u128;
                at = n.right;
            } else {
                at = n.left;
            }
        }
        (count, sum)
    }

    #[inline(always)]
    fn size(&self, i: usize) -> usize {
        if i == NIL {
            0
        } else {
            self.nodes[i].size
        }
    }

    #[inline(always)]
    fn height(&self, i: usize) -> u8 {
        if i == NIL {
            0
        } else {
            self.nodes[i].height
        }
    }

    #[inline(always)]
    fn sum(&self, i: usize) -> u128 {
        if i == NIL {
            0
        } else {
            self.nodes[i].pos_sum
        }
    }

    fn alloc(&mut self, value: T, pos: usize) -> usize {
        let node = Node {
            value,
            pos,
            left: NIL,
            right: NIL,
            height: 1,
            size: 1,
            pos_sum: pos as u128,
        };
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    #[inline(always)]
    fn update(&mut self, i: usize) {
        let (l, r) = (self.nodes[i].left, self.nodes[i].right);
        let size = self.size(l) + self.size(r) + 1;
        let height = self.height(l).max(self.height(r)) + 1;
        let pos_sum = self.sum(l) + self.sum(r) + self.nodes[i].pos as u128;
        let n = &mut self.nodes[i];
        n.size = size;
        n.height = height;
        n.pos_sum = pos_sum;
    }

    #[inline(always)]
    fn balance_factor(&self, i: usize) -> i16 {
        self.height(self.nodes[i].left) as i16 - self.height(self.nodes[i].right) as i16
    }

    fn rotate_right(&mut self, y: usize) -> usize {
        let x = self.nodes[y].left;
        self.nodes[y].left = self.nodes[x].right;
        self.nodes[x].right = y;
        self.update(y);
        self.update(x);
        x
    }

    fn rotate_left(&mut self, x: usize) -> usize {
        let y = self.nodes[x].right;
        self.nodes[x].right = self.nodes[y].left;
        self.nodes[y].left = x;
        self.update(x);
        self.update(y);
        y
    }

    fn rebalance(&mut self, i: usize) -> usize {
        self.update(i);
        let bf = self.balance_factor(i);
        if bf > 1 {
            let l = self.nodes[i].left;
            if self.balance_factor(l) < 0 {
                self.nodes[i].left = self.rotate_left(l);
            }
            return self.rotate_right(i);
        }
        if bf < -1 {
            let r = self.nodes[i].right;
            if self.balance_factor(r) > 0 {
                self.nodes[i].right = self.rotate_right(r);
            }
            return self.rotate_left(i);
        }
        i
    }

    fn insert_at(&mut self, at: usize, idx: usize) -> usize {
        if at == NIL {
            return idx;
        }
        let (v, p) = (self.nodes[idx].value, self.nodes[idx].pos);
        if cmp_key(v, p, self.nodes[at].value, self.nodes[at].pos) == Ordering::Less {
            let l = self.insert_at(self.nodes[at].left, idx);
            self.nodes[at].left = l;
        } else {
            let r = self.insert_at(self.nodes[at].right, idx);
            self.nodes[at].right = r;
        }
        self.rebalance(at)
    }

    fn remove_at(&mut self, at: usize, value: T, pos: usize) -> (usize, Option<usize>) {
        if at == NIL {
            return (NIL, None);
        }
        match cmp_key(value, pos, self.nodes[at].value, self.nodes[at].pos) {
            Ordering::Less => {
                let (l, removed) = self.remove_at(self.nodes[at].left, value, pos);
                if removed.is_none() {
                    return (at, None);
                }
                self.nodes[at].left = l;
                (self.rebalance(at), removed)
            }
            Ordering::Greater => {
                let (r, removed) = self.remove_at(self.nodes[at].right, value, pos);
                if removed.is_none() {
                    return (at, None);
                }
                self.nodes[at].right = r;
                (self.rebalance(at), removed)
            }
            Ordering::Equal => {
                let (l, r) = (self.nodes[at].left, self.nodes[at].right);
                let replacement = if l == NIL {
                    r
                } else if r == NIL {
                    l
                } else {
                    let (rest, min) = self.take_min(r);
                    self.nodes[min].left = l;
                    self.nodes[min].right = rest;
                    self.rebalance(min)
                };
                (replacement, Some(at))
            }
        }
    }

    /// Detaches the leftmost node of the subtree at `at`.
    /// Returns the new subtree root and the detached index.
    fn take_min(&mut self, at: usize) -> (usize, usize) {
        let l = self.nodes[at].left;
        if l == NIL {
            return (self.nodes[at].right, at);
        }
        let (rest, min) = self.take_min(l);
        self.nodes[at].left = rest;
        (self.rebalance(at), min)
    }
}
