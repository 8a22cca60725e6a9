//! Order-maintenance list: a total order over opaque tokens supporting
//! `insert_after`, `remove`, and comparison, all in amortised O(1).
//!
//! This is the two-level labeler from the design notes: a *quadratic*
//! labeler over "buckets" (the upper list), each owning a small *exponential*
//! labeler over the real tokens it currently holds (the lower list). A
//! bucket's lower list is rebalanced — split across one or more fresh
//! buckets — whenever its exponential label space runs out.
//!
//! Tokens never move once inserted except during a rebalance they're
//! caught up in, and their underlying storage is never reclaimed (there is
//! no GC of unreachable versions — see the crate's non-goals), so `Token`
//! indices are stable for the engine's whole lifetime.

use crate::llist;

/// An opaque handle to a position in the total order. Only meaningful in
/// combination with the [`OrderList`] that produced it.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct Token(u32);

struct TokenSlot {
    bucket: llist::Link,
    label: u64,
}

struct Bucket {
    /// Quadratic-labeler position among buckets.
    label: u64,
    /// Bit-width of this bucket's exponential label space (`2^capacity`).
    capacity: u32,
    /// Tokens currently assigned to this bucket, in order. Kept as a plain
    /// sorted `Vec` rather than a second intrusive list: bucket size is
    /// already bounded at O(log n) by the rebalance trigger, so a `Vec`
    /// insert costs the same order of work the textbook linked lower-list
    /// splice does, without a second handle-validity story.
    lower: Vec<Token>,
}

/// A total order over tokens, maintained under arbitrary insertion with
/// amortised O(1) insert and O(1) compare.
pub struct OrderList {
    buckets: llist::List<Bucket>,
    tokens: Vec<TokenSlot>,
    /// Total live token count, used to size fresh buckets on rebalance.
    size: usize,
}

impl Default for OrderList {
    fn default() -> Self {
        Self::new()
    }
}

fn bit_length(n: u64) -> u32 {
    u64::BITS - n.leading_zeros()
}

impl OrderList {
    /// Creates an order-maintenance list with a single empty bucket.
    pub fn new() -> Self {
        let mut buckets = llist::List::new();
        buckets.insert_after(
            None,
            Bucket {
                label: 0,
                capacity: 5,
                lower: Vec::new(),
            },
        );
        Self {
            buckets,
            tokens: Vec::new(),
            size: 0,
        }
    }

    /// Number of live tokens.
    pub fn len(&self) -> usize {
        self.size
    }

    /// True if no tokens have been inserted (or all have been removed).
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Inserts a new token immediately after `pred` (or at the very front
    /// of the order if `pred` is `None`).
    pub fn insert_after(&mut self, pred: Option<Token>) -> Token {
        let (bucket_link, position) = match pred {
            None => (
                self.buckets.front().expect("order list always has a bucket"),
                0,
            ),
            Some(pred) => {
                let bucket_link = self.tokens[pred.0 as usize].bucket;
                let position = self.position_in_bucket(bucket_link, pred) + 1;
                (bucket_link, position)
            }
        };

        self.size += 1;

        let (prev_label, next_label) = {
            let bucket = self.buckets.get(bucket_link);
            let prev_label = if position == 0 {
                0
            } else {
                self.tokens[bucket.lower[position - 1].0 as usize].label
            };
            let next_label = if position == bucket.lower.len() {
                1u64 << bucket.capacity
            } else {
                self.tokens[bucket.lower[position].0 as usize].label
            };
            (prev_label, next_label)
        };

        if next_label.saturating_sub(prev_label) <= 1 {
            self.rebalance(bucket_link, position)
        } else {
            let label = prev_label + (next_label - prev_label) / 2;
            let token = self.push_token(bucket_link, label);
            self.buckets.get_mut(bucket_link).lower.insert(position, token);
            token
        }
    }

    /// Removes `token` from the order. The underlying arena slot is not
    /// reused; callers must not compare a removed token afterwards.
    pub fn remove(&mut self, token: Token) {
        let bucket_link = self.tokens[token.0 as usize].bucket;
        let pos = self.position_in_bucket(bucket_link, token);
        self.buckets.get_mut(bucket_link).lower.remove(pos);
        self.size -= 1;
    }

    /// Total order comparison between two live tokens.
    pub fn compare(&self, a: Token, b: Token) -> std::cmp::Ordering {
        let sa = &self.tokens[a.0 as usize];
        let sb = &self.tokens[b.0 as usize];
        let bucket_a = self.buckets.get(sa.bucket).label;
        let bucket_b = self.buckets.get(sb.bucket).label;
        (bucket_a, sa.label).cmp(&(bucket_b, sb.label))
    }

    /// `true` if `a` is strictly before `b` in the order.
    pub fn lt(&self, a: Token, b: Token) -> bool {
        self.compare(a, b) == std::cmp::Ordering::Less
    }

    /// `true` if `a` is strictly after `b` in the order.
    pub fn gt(&self, a: Token, b: Token) -> bool {
        self.compare(a, b) == std::cmp::Ordering::Greater
    }

    /// The token immediately following `token` in the order, if any.
    ///
    /// Used by the linearised-full dnode variants to splice in a successor
    /// record that preserves the value seen from the "un-version" interval
    /// a mid-timeline write opens up (see [`crate::dnode`]).
    pub fn next_of(&self, token: Token) -> Option<Token> {
        let slot = &self.tokens[token.0 as usize];
        let bucket = self.buckets.get(slot.bucket);
        let pos = self.position_in_bucket(slot.bucket, token);
        if pos + 1 < bucket.lower.len() {
            return Some(bucket.lower[pos + 1]);
        }
        let mut cur = slot.bucket;
        while let Some(next_bucket) = self.buckets.next(cur) {
            if let Some(&first) = self.buckets.get(next_bucket).lower.first() {
                return Some(first);
            }
            cur = next_bucket;
        }
        None
    }

    fn position_in_bucket(&self, bucket_link: llist::Link, token: Token) -> usize {
        self.buckets
            .get(bucket_link)
            .lower
            .iter()
            .position(|&t| t == token)
            .expect("token belongs to the bucket it records")
    }

    fn push_token(&mut self, bucket: llist::Link, label: u64) -> Token {
        let token = Token(self.tokens.len() as u32);
        self.tokens.push(TokenSlot { bucket, label });
        token
    }

    /// Splits the overflowing bucket at `bucket_link` into one or more
    /// fresh buckets, distributing its existing tokens (and the not-yet-
    /// allocated token logically at `position`) across them, then returns
    /// the newly allocated token.
    fn rebalance(&mut self, bucket_link: llist::Link, position: usize) -> Token {
        let new_capacity = bit_length(self.size as u64).max(2);
        let per_bucket = ((new_capacity / 2).max(1)) as usize;

        let old_tokens = std::mem::take(&mut self.buckets.get_mut(bucket_link).lower);
        self.buckets.get_mut(bucket_link).capacity = new_capacity;

        tracing::trace!(
            target: "palimpsest::ordmaint",
            bucket_size = old_tokens.len(),
            new_capacity,
            "rebalancing overflowing bucket"
        );

        enum Item {
            Old(Token),
            New,
        }
        let mut items = Vec::with_capacity(old_tokens.len() + 1);
        items.extend(old_tokens[..position].iter().copied().map(Item::Old));
        items.push(Item::New);
        items.extend(old_tokens[position..].iter().copied().map(Item::Old));

        let mut new_token = None;
        let mut cur_bucket = bucket_link;
        let mut cur_count = 0usize;
        let mut prev_label: Option<u64> = None;

        for item in items {
            if cur_count == per_bucket {
                cur_bucket = self.insert_bucket_after(Some(cur_bucket));
                self.buckets.get_mut(cur_bucket).capacity = new_capacity;
                cur_count = 0;
                prev_label = None;
            }

            let ceiling = 1u64 << new_capacity;
            let base = prev_label.unwrap_or(0);
            let label = base + (ceiling - base) / 2;

            match item {
                Item::Old(token) => {
                    self.tokens[token.0 as usize].bucket = cur_bucket;
                    self.tokens[token.0 as usize].label = label;
                    self.buckets.get_mut(cur_bucket).lower.push(token);
                }
                Item::New => {
                    let token = self.push_token(cur_bucket, label);
                    self.buckets.get_mut(cur_bucket).lower.push(token);
                    new_token = Some(token);
                }
            }

            prev_label = Some(label);
            cur_count += 1;
        }

        new_token.expect("the not-yet-allocated token is always one of the items")
    }

    /// Inserts a fresh, empty bucket immediately after `pred` (`None` for
    /// the front), relabeling a tag-range-doubling window of the quadratic
    /// upper labeler around the insertion point.
    fn insert_bucket_after(&mut self, pred: Option<llist::Link>) -> llist::Link {
        let new_link = self.buckets.insert_after(
            pred,
            Bucket {
                label: 0,
                capacity: 0,
                lower: Vec::new(),
            },
        );

        let mut min_label = match pred {
            None => 1,
            Some(p) => self.buckets.get(p).label + 1,
        };
        let mut max_label = min_label;

        let mut first = new_link;
        let mut last = new_link;
        let mut num_nodes: u64 = 1;
        let mut layer: u32 = 0;
        let mut max_nodes: u64 = 1;

        loop {
            while let Some(p) = self.buckets.prev(first) {
                if self.buckets.get(p).label < min_label {
                    break;
                }
                first = p;
                num_nodes += 1;
            }
            while let Some(n) = self.buckets.next(last) {
                if self.buckets.get(n).label > max_label {
                    break;
                }
                last = n;
                num_nodes += 1;
            }

            if num_nodes <= max_nodes {
                break;
            }

            layer += 1;
            max_nodes = 1u64 << layer;
            let mask = (1u64 << (2 * layer)) - 1;
            min_label &= !mask;
            max_label |= mask;
        }

        let step = (max_label - min_label + 1) / max_nodes;
        let mut cur = first;
        let mut label = min_label;
        loop {
            self.buckets.get_mut(cur).label = label;
            if cur == last {
                break;
            }
            cur = self
                .buckets
                .next(cur)
                .expect("last is reachable by walking next from first");
            label += step;
        }

        new_link
    }
}
