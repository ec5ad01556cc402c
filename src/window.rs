//! Window accounting for a single tier.
//!
//! A tier's window is approximated by a ring of `bucket_count` counters, each
//! covering one `bucket_width_micros` slice of time. Slice `s` covers
//! `[s * width, (s + 1) * width)` and occupies ring slot `s % bucket_count`.
//!
//! Only occupied slots are materialised, ordered by slice, so an idle key costs
//! nothing and a busy one at most `bucket_count` entries. A slice is inside the
//! window while `s > current_slice - bucket_count`; older slices are logically
//! zero and are dropped the next time the key is touched.

use std::collections::VecDeque;

use crate::Tier;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Bucket {
    pub slice: u64,
    pub count: u64,
}

/// Mutable per-key state of one tier.
#[derive(Clone, Debug, Default)]
pub struct WindowState {
    buckets: VecDeque<Bucket>,
    last_action_micros: Option<u64>,
    expires_at_micros: u64,
    pub(crate) retired: bool,
}

/// A single tier's answer to "may `increment` more actions happen at `now`?".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierVerdict {
    /// Whether the tier admits the increment.
    pub allowed: bool,
    /// Actions counted inside the trailing window before this request.
    pub used: u64,
    /// Capacity left before this request, `max - used`.
    pub remaining: u64,
    /// Time until the increment would be admitted; `0` when allowed.
    pub wait_micros: u64,
}

/// Slice index covering `now`.
pub(crate) fn slice_of(tier: &Tier, now_micros: u64) -> u64 {
    now_micros / tier.bucket_width_micros()
}

/// Ring slot for `now`.
pub fn current_bucket(tier: &Tier, now_micros: u64) -> u64 {
    slice_of(tier, now_micros) % tier.bucket_count()
}

impl WindowState {
    /// An empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all counters still inside the window at `now`, without mutating.
    pub fn used(&self, tier: &Tier, now_micros: u64) -> u64 {
        let horizon = slice_of(tier, now_micros).checked_sub(tier.bucket_count());
        self.buckets
            .iter()
            .filter(|b| horizon.is_none_or(|h| b.slice > h))
            .map(|b| b.count)
            .sum()
    }

    /// Timestamp of the last admitted action, if any.
    pub fn last_action_micros(&self) -> Option<u64> {
        self.last_action_micros
    }

    /// Whether the key holds no state that could affect a future decision.
    pub(crate) fn is_expired(&self, now_micros: u64) -> bool {
        now_micros >= self.expires_at_micros
    }

    #[cfg(test)]
    pub(crate) fn buckets(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.iter()
    }

    /// Reset slices that have fully left the window.
    fn evict(&mut self, tier: &Tier, now_micros: u64) {
        let Some(horizon) = slice_of(tier, now_micros).checked_sub(tier.bucket_count()) else {
            return;
        };

        while self.buckets.front().is_some_and(|b| b.slice <= horizon) {
            self.buckets.pop_front();
        }
    }

    /// Evaluate `increment` against this tier without recording anything.
    ///
    /// Stale buckets are reset as a side effect.
    pub fn evaluate(&mut self, tier: &Tier, increment: u64, now_micros: u64) -> TierVerdict {
        self.evict(tier, now_micros);

        let used: u64 = self.buckets.iter().map(|b| b.count).sum();
        let max = tier.max_in_interval();
        let has_capacity = used.saturating_add(increment) <= max;

        let spacing_wait = match self.last_action_micros {
            Some(last) if tier.min_difference_micros() > 0 => {
                last.saturating_add(tier.min_difference_micros())
                    .saturating_sub(now_micros)
            }
            _ => 0,
        };

        let capacity_wait = if has_capacity {
            0
        } else {
            self.capacity_wait(tier, used, increment, now_micros)
        };

        TierVerdict {
            allowed: has_capacity && spacing_wait == 0,
            used,
            remaining: max.saturating_sub(used),
            wait_micros: capacity_wait.max(spacing_wait),
        }
    }

    /// Time until enough of the oldest buckets leave the window to fit `increment`.
    fn capacity_wait(&self, tier: &Tier, used: u64, increment: u64, now_micros: u64) -> u64 {
        let exits_at =
            |b: &Bucket| (b.slice + tier.bucket_count()).saturating_mul(tier.bucket_width_micros());

        // An increment above capacity never fits; report the time for the whole window to clear.
        if increment > tier.max_in_interval() {
            return match self.buckets.back() {
                Some(newest) => exits_at(newest).saturating_sub(now_micros),
                None => tier.window_micros(),
            };
        }

        let to_free = used.saturating_add(increment) - tier.max_in_interval();
        let mut freed = 0;
        for bucket in &self.buckets {
            freed += bucket.count;
            if freed >= to_free {
                return exits_at(bucket).saturating_sub(now_micros);
            }
        }

        tier.window_micros()
    }

    /// Record `charge` in the bucket covering `now`.
    pub fn commit(&mut self, tier: &Tier, charge: u64, now_micros: u64) {
        let slice = slice_of(tier, now_micros);

        match self.buckets.back_mut() {
            Some(newest) if newest.slice == slice => newest.count += charge,
            Some(newest) if newest.slice < slice => {
                self.buckets.push_back(Bucket { slice, count: charge })
            }
            None => self.buckets.push_back(Bucket { slice, count: charge }),
            // Out-of-order timestamp: keep the ring ordered by slice.
            Some(_) => match self.buckets.binary_search_by_key(&slice, |b| b.slice) {
                Ok(pos) => self.buckets[pos].count += charge,
                Err(pos) => self.buckets.insert(pos, Bucket { slice, count: charge }),
            },
        }

        self.last_action_micros = Some(
            self.last_action_micros
                .map_or(now_micros, |last| last.max(now_micros)),
        );
        self.expires_at_micros = self
            .expires_at_micros
            .max(now_micros.saturating_add(tier.retention_micros()));
    }
}
