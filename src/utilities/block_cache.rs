//! Range-rank queries over a static series via cached sorted blocks.
//!
//! Block `(level, index)` holds the orderable values of positions
//! `[index << level, (index + 1) << level)` in sorted order. Blocks above
//! `LEAF_LEVEL` are merged from their two children the first time a query
//! covers them; smaller ranges are scanned directly. Blocks are never
//! modified once built, only dropped by `remove_cache_before`.

use std::collections::HashMap;

use crate::utilities::sample::RankValue;

/// Level of the smallest cached block (16 positions).
pub const LEAF_LEVEL: u32 = 4;

#[derive(Debug, Clone)]
pub struct BlockRankCache<'a, T> {
    data: &'a [T],
    blocks: HashMap<(u32, usize), Vec<T>>,
}

impl<'a, T: RankValue> BlockRankCache<'a, T> {
    pub fn new(data: &'a [T]) -> Self {
        Self {
            data,
            blocks: HashMap::new(),
        }
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Orderable values in `data[lo..hi]` strictly below `value`.
    pub fn count_less(&mut self, lo: usize, hi: usize, value: T) -> usize {
        self.count(lo, hi, &|x: &T| x.rank_cmp(&value).is_lt())
    }

    /// Orderable values in `data[lo..hi]` at most `value`.
    pub fn count_at_most(&mut self, lo: usize, hi: usize, value: T) -> usize {
        self.count(lo, hi, &|x: &T| x.rank_cmp(&value).is_le())
    }

    /// Drops every block lying entirely before `pos`.
    pub fn remove_cache_before(&mut self, pos: usize) {
        let before = self.blocks.len();
        self.blocks
            .retain(|&(level, index), _| (index + 1) << level > pos);
        tracing::trace!(
            pos,
            dropped = before - self.blocks.len(),
            kept = self.blocks.len(),
            "block cache eviction"
        );
    }

    fn count(&mut self, lo: usize, hi: usize, below: &dyn Fn(&T) -> bool) -> usize {
        debug_assert!(hi <= self.data.len());
        if lo >= hi {
            return 0;
        }
        let mut level = 0u32;
        while (lo >> level) != ((hi - 1) >> level) {
            level += 1;
        }
        self.count_in(level, lo >> level, lo, hi, below)
    }

    fn count_in(
        &mut self,
        level: u32,
        index: usize,
        lo: usize,
        hi: usize,
        below: &dyn Fn(&T) -> bool,
    ) -> usize {
        let start = index << level;
        let end = start + (1usize << level);
        let lo = lo.max(start);
        let hi = hi.min(end);
        if lo >= hi {
            return 0;
        }
        let covered = lo == start && hi == end;
        if covered && level >= LEAF_LEVEL {
            return self.block(level, index).partition_point(|x| below(x));
        }
        if level <= LEAF_LEVEL {
            return self.data[lo..hi]
                .iter()
                .filter(|x| !x.is_missing() && below(*x))
                .count();
        }
        self.count_in(level - 1, index * 2, lo, hi, below)
            + self.count_in(level - 1, index * 2 + 1, lo, hi, below)
    }

    fn block(&mut self, level: u32, index: usize) -> &[T] {
        let key = (level, index);
        if !self.blocks.contains_key(&key) {
            let sorted = if level == LEAF_LEVEL {
                let start = index << level;
                let mut v: Vec<T> = self.data[start..start + (1usize << level)]
                    .iter()
                    .copied()
                    .filter(|x| !x.is_missing())
                    .collect();
                v.sort_unstable_by(|a, b| a.rank_cmp(b));
                v
            } else {
                self.block(level - 1, index * 2);
                self.block(level - 1, index * 2 + 1);
                merge_sorted(
                    &self.blocks[&(level - 1, index * 2)],
                    &self.blocks[&(level - 1, index * 2 + 1)],
                )
            };
            self.blocks.insert(key, sorted);
        }
        &self.blocks[&key]
    }
}

fn merge_sorted<T: RankValue>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if b[j].rank_cmp(&a[i]).is_lt() {
            out.push(b[j]);
            j += 1;
        } else {
            out.push(a[i]);
            i += 1;
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}
