//! The unit of work handed to a [`WindowStore`](crate::WindowStore).
//!
//! An [`Evaluation`] carries everything the atomic procedure needs: one
//! storage key per tier plus the scalar parameters, laid out on the wire as
//!
//! ```text
//! args[0]                 tier count N
//! args[1 ..= N]           storage key per tier
//! args[N+1]               mode ordinal
//! args[N+2]               increment
//! args[N+3]               now (µs)
//! args[N+4 ..]            min difference (µs) per tier
//! then                    max in interval per tier
//! then                    bucket width (µs) per tier
//! then                    bucket count per tier
//! ```
//!
//! The first element doubles as the `numkeys` argument of `EVAL`/`EVALSHA`,
//! so the keys land in `KEYS` and the remaining values in `ARGV`.

use std::sync::Arc;

use crate::{Mode, Tier};

/// Build the storage key for one tier and subject.
///
/// Empty segments are omitted: `namespace[:tier][:subject]`.
pub fn storage_key(namespace: &str, tier_index: &str, subject: &str) -> String {
    [namespace, tier_index, subject]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(":")
}

/// A fully resolved admission request, ready for atomic evaluation.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub(crate) keys: Vec<String>,
    pub(crate) tiers: Arc<[Tier]>,
    pub(crate) mode: Mode,
    pub(crate) increment: u64,
    pub(crate) now_micros: u64,
}

impl Evaluation {
    pub(crate) fn new(
        namespace: &str,
        subject: &str,
        tiers: Arc<[Tier]>,
        mode: Mode,
        increment: u64,
        now_micros: u64,
    ) -> Self {
        let keys = tiers
            .iter()
            .map(|tier| storage_key(namespace, tier.index(), subject))
            .collect();

        Self {
            keys,
            tiers,
            mode,
            increment,
            now_micros,
        }
    }

    /// Storage key per tier, in tier order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Tiers being evaluated.
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Combination mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Requested increment.
    pub fn increment(&self) -> u64 {
        self.increment
    }

    /// Evaluation timestamp in microseconds since the Unix epoch.
    pub fn now_micros(&self) -> u64 {
        self.now_micros
    }

    /// Scalar parameters (`ARGV`), in wire order.
    pub fn scalar_args(&self) -> Vec<u64> {
        let n = self.tiers.len();
        let mut args = Vec::with_capacity(3 + 4 * n);

        args.push(u64::from(self.mode.ordinal()));
        args.push(self.increment);
        args.push(self.now_micros);
        args.extend(self.tiers.iter().map(Tier::min_difference_micros));
        args.extend(self.tiers.iter().map(Tier::max_in_interval));
        args.extend(self.tiers.iter().map(Tier::bucket_width_micros));
        args.extend(self.tiers.iter().map(Tier::bucket_count));

        args
    }

    /// The complete argument list, `numkeys` first, rendered as strings.
    pub fn wire_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(1 + self.keys.len() + 3 + 4 * self.tiers.len());

        args.push(self.keys.len().to_string());
        args.extend(self.keys.iter().cloned());
        args.extend(self.scalar_args().into_iter().map(|v| v.to_string()));

        args
    }
}
