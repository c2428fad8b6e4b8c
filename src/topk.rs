/**
 * BlendReco
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde_derive::{Deserialize, Serialize};

/// Result type used to find the top-k items via a binary heap
#[derive(PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item: u32,
    pub score: f64,
}

/// Ordering for our max-heap: "greater" means "ranks worse", so the top of the heap is the
/// weakest of the current top-k. Higher scores rank first, equal scores rank by ascending item
/// index. There is no total order on floating point numbers, incomparable scores count as equal.
fn cmp_reverse(scored_item_a: &ScoredItem, scored_item_b: &ScoredItem) -> Ordering {
    let by_score = match scored_item_a.score.partial_cmp(&scored_item_b.score) {
        Some(Ordering::Less) => Ordering::Greater,
        Some(Ordering::Greater) => Ordering::Less,
        Some(Ordering::Equal) => Ordering::Equal,
        None => Ordering::Equal
    };

    by_score.then_with(|| scored_item_a.item.cmp(&scored_item_b.item))
}

impl Eq for ScoredItem {}

impl Ord for ScoredItem {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_reverse(self, other)
    }
}

impl PartialOrd for ScoredItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(cmp_reverse(self, other))
    }
}

// The heap grows on demand beyond this, `k` may be far larger than what is ever offered
const MAX_PREALLOCATED: usize = 1024;

/// Keeps the `k` best of the offered items, bounded memory regardless of the number offered.
pub struct TopK {
    k: usize,
    heap: BinaryHeap<ScoredItem>,
}

impl TopK {

    pub fn new(k: usize) -> Self {
        TopK { k, heap: BinaryHeap::with_capacity(k.min(MAX_PREALLOCATED)) }
    }

    pub fn offer(&mut self, scored_item: ScoredItem) {
        if self.k == 0 {
            return;
        }

        if self.heap.len() < self.k {
            self.heap.push(scored_item);
        } else if let Some(mut top) = self.heap.peek_mut() {
            if scored_item < *top {
                *top = scored_item;
            }
        }
    }

    /// Best item first
    pub fn into_sorted_vec(self) -> Vec<ScoredItem> {
        self.heap.into_sorted_vec()
    }
}

pub fn top_k<I>(scored_items: I, k: usize) -> Vec<ScoredItem>
    where I: IntoIterator<Item=ScoredItem> {

    let mut top = TopK::new(k);
    for scored_item in scored_items {
        top.offer(scored_item);
    }
    top.into_sorted_vec()
}

/// Sorts a full candidate list best first, the same order `top_k` produces.
pub fn rank(mut scored_items: Vec<ScoredItem>) -> Vec<ScoredItem> {
    scored_items.sort();
    scored_items
}
