//! Lazy enumeration of the ways to split a set of triples.
//!
//! Both generators are pure functions of their input: enumerating again yields the
//! same sequence. Evaluators stop pulling as soon as one split succeeds, so unexplored
//! branches are never built.

use std::iter;

/// Enumerates the partitions of `items` into exactly `k` non-empty, unordered blocks.
///
/// Recursive construction: the first item either forms a new singleton block next to
/// a partition of the rest into `k - 1` blocks, or joins one of the blocks of a
/// partition of the rest into `k` blocks.
pub(crate) fn set_partitions<'a, T: Copy + 'a>(
    items: &'a [T],
    k: usize,
) -> Box<dyn Iterator<Item = Vec<Vec<T>>> + 'a> {
    if k == 0 {
        return if items.is_empty() {
            Box::new(iter::once(Vec::new()))
        } else {
            Box::new(iter::empty())
        };
    }
    if items.len() < k {
        return Box::new(iter::empty());
    }
    if items.len() == k {
        return Box::new(iter::once(items.iter().map(|&item| vec![item]).collect()));
    }
    let Some((&first, rest)) = items.split_first() else {
        return Box::new(iter::empty());
    };
    let with_singleton = set_partitions(rest, k - 1).map(move |mut blocks| {
        blocks.push(vec![first]);
        blocks
    });
    let with_joined = set_partitions(rest, k).flat_map(move |blocks| {
        (0..blocks.len()).map(move |i| {
            let mut blocks = blocks.clone();
            blocks[i].push(first);
            blocks
        })
    });
    Box::new(with_singleton.chain(with_joined))
}

/// Enumerates the assignments of each item to one of the groups allowed for it.
///
/// `choices[i]` lists the groups item `i` may go to, in `0..width`. Each assignment is
/// returned as `width` disjoint groups, groups with nothing assigned being empty.
/// This is the cross product of the per item choices, advanced like an odometer.
pub(crate) struct Assignments<'a, T> {
    items: &'a [T],
    choices: &'a [Vec<usize>],
    width: usize,
    cursor: Vec<usize>,
    exhausted: bool,
}

impl<'a, T: Copy> Assignments<'a, T> {
    pub(crate) fn new(items: &'a [T], choices: &'a [Vec<usize>], width: usize) -> Self {
        debug_assert_eq!(items.len(), choices.len(), "one choice list per item");
        Self {
            items,
            choices,
            width,
            cursor: vec![0; items.len()],
            // An item with no allowed group makes every assignment impossible
            exhausted: choices.iter().any(Vec::is_empty),
        }
    }

    fn advance(&mut self) {
        for (position, legal) in self.cursor.iter_mut().zip(self.choices).rev() {
            *position += 1;
            if *position < legal.len() {
                return;
            }
            *position = 0;
        }
        self.exhausted = true;
    }
}

impl<T: Copy> Iterator for Assignments<'_, T> {
    type Item = Vec<Vec<T>>;

    fn next(&mut self) -> Option<Vec<Vec<T>>> {
        if self.exhausted {
            return None;
        }
        let mut groups = vec![Vec::new(); self.width];
        for ((&item, legal), &position) in self.items.iter().zip(self.choices).zip(&self.cursor) {
            groups[legal[position]].push(item);
        }
        self.advance();
        Some(groups)
    }
}
