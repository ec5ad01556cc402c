use std::{fmt, ops::Deref, str::FromStr, time::Duration};

use crate::RateTiersError;

/// Default number of buckets a tier's window is split into.
pub const DEFAULT_BUCKET_COUNT: u64 = 10_000;

/// Length of a tier's trailing window, in milliseconds.
///
/// Must be greater than zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntervalMs(u64);

impl Deref for IntervalMs {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for IntervalMs {
    type Error = &'static str;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err("Interval must be greater than 0")
        } else {
            Ok(Self(value))
        }
    }
}

/// Maximum number of actions admitted inside one window.
///
/// Must be greater than zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaxInInterval(u64);

impl Deref for MaxInInterval {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for MaxInInterval {
    type Error = &'static str;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err("Max in interval must be greater than 0")
        } else {
            Ok(Self(value))
        }
    }
}

/// Number of time buckets a window is subdivided into.
///
/// More buckets approximate a true sliding window more closely at the cost of
/// more state per key. Defaults to [`DEFAULT_BUCKET_COUNT`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketCount(u64);

impl Default for BucketCount {
    fn default() -> Self {
        Self(DEFAULT_BUCKET_COUNT)
    }
}

impl Deref for BucketCount {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for BucketCount {
    type Error = &'static str;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err("Bucket count must be greater than 0")
        } else {
            Ok(Self(value))
        }
    }
}

/// Minimum spacing between two admitted actions, in milliseconds.
///
/// `0` disables spacing enforcement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MinDifferenceMs(u64);

impl Deref for MinDifferenceMs {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<u64> for MinDifferenceMs {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl TryFrom<i64> for MinDifferenceMs {
    type Error = &'static str;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u64::try_from(value)
            .map(Self)
            .map_err(|_| "Min difference cannot be negative")
    }
}

/// User-facing options for one tier.
///
/// Values are validated when the owning [`RateLimiter`](crate::RateLimiter) is built.
///
/// # Examples
///
/// ```
/// use ratetiers::TierOptions;
///
/// // 5 actions per 10 seconds, at least 500ms apart.
/// let tier = TierOptions::new(10_000, 5).min_difference_ms(500);
/// assert_eq!(tier.buckets, None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierOptions {
    /// Window length in milliseconds.
    pub interval_ms: u64,
    /// Capacity of the window.
    pub max_in_interval: u64,
    /// Window subdivisions; [`DEFAULT_BUCKET_COUNT`] when `None`.
    pub buckets: Option<u64>,
    /// Minimum spacing between admitted actions in milliseconds; `0` when `None`.
    pub min_difference_ms: Option<u64>,
}

impl TierOptions {
    /// Options for `max_in_interval` actions per `interval_ms` milliseconds.
    pub fn new(interval_ms: u64, max_in_interval: u64) -> Self {
        Self {
            interval_ms,
            max_in_interval,
            buckets: None,
            min_difference_ms: None,
        }
    }

    /// Override the bucket count.
    pub fn buckets(mut self, buckets: u64) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Require `min_difference_ms` milliseconds between admitted actions.
    pub fn min_difference_ms(mut self, min_difference_ms: u64) -> Self {
        self.min_difference_ms = Some(min_difference_ms);
        self
    }
}

/// A validated tier, with all durations converted to microseconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tier {
    index: String,
    interval_micros: u64,
    bucket_count: u64,
    bucket_width_micros: u64,
    max_in_interval: u64,
    min_difference_micros: u64,
}

impl Tier {
    /// Validate `options` for the tier identified by `index`.
    pub fn new(index: impl Into<String>, options: &TierOptions) -> Result<Self, RateTiersError> {
        let index = index.into();
        let invalid = |reason: &'static str| RateTiersError::InvalidTier {
            tier: index.clone(),
            reason,
        };

        let interval = IntervalMs::try_from(options.interval_ms).map_err(invalid)?;
        let max_in_interval = MaxInInterval::try_from(options.max_in_interval).map_err(invalid)?;
        let buckets = match options.buckets {
            Some(buckets) => BucketCount::try_from(buckets).map_err(invalid)?,
            None => BucketCount::default(),
        };
        let min_difference = MinDifferenceMs::from(options.min_difference_ms.unwrap_or(0));

        let interval_micros = interval
            .checked_mul(1000)
            .ok_or_else(|| invalid("Interval is too large"))?;
        let min_difference_micros = min_difference
            .checked_mul(1000)
            .ok_or_else(|| invalid("Min difference is too large"))?;

        let bucket_width_micros = interval_micros / *buckets;
        if bucket_width_micros == 0 {
            return Err(invalid("Bucket width must be at least 1 microsecond"));
        }

        Ok(Self {
            index,
            interval_micros,
            bucket_count: *buckets,
            bucket_width_micros,
            max_in_interval: *max_in_interval,
            min_difference_micros,
        })
    }

    /// Key segment naming this tier (empty for the unnamed first tier).
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Configured window length.
    pub fn interval_micros(&self) -> u64 {
        self.interval_micros
    }

    /// Number of buckets in the window.
    pub fn bucket_count(&self) -> u64 {
        self.bucket_count
    }

    /// `interval / buckets`, truncated to whole microseconds.
    pub fn bucket_width_micros(&self) -> u64 {
        self.bucket_width_micros
    }

    /// Window capacity.
    pub fn max_in_interval(&self) -> u64 {
        self.max_in_interval
    }

    /// Minimum spacing between admitted actions; `0` when disabled.
    pub fn min_difference_micros(&self) -> u64 {
        self.min_difference_micros
    }

    /// Span actually covered by the bucket ring (`width * buckets`).
    pub(crate) fn window_micros(&self) -> u64 {
        self.bucket_width_micros.saturating_mul(self.bucket_count)
    }

    /// How long an idle key has to be kept before it is equivalent to an empty one.
    pub(crate) fn retention_micros(&self) -> u64 {
        self.window_micros().max(self.min_difference_micros)
    }
}

/// How the verdicts of several tiers are combined.
///
/// The ordinal is part of the wire format sent to the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Every tier records the full increment.
    Uniform,
    /// The first tier records the increment, later tiers count requests.
    #[default]
    Binary,
    /// Tier `k` (1-based) records `ceil(increment / k)`.
    Nary,
}

impl Mode {
    /// Ordinal used on the wire: `0=uniform`, `1=binary`, `2=nary`.
    pub fn ordinal(self) -> u8 {
        match self {
            Mode::Uniform => 0,
            Mode::Binary => 1,
            Mode::Nary => 2,
        }
    }
}

impl TryFrom<u8> for Mode {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Mode::Uniform),
            1 => Ok(Mode::Binary),
            2 => Ok(Mode::Nary),
            _ => Err("Mode ordinal must be 0, 1 or 2"),
        }
    }
}

impl FromStr for Mode {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uniform" => Ok(Mode::Uniform),
            "binary" => Ok(Mode::Binary),
            "nary" => Ok(Mode::Nary),
            _ => Err("Mode should be one of `uniform`, `binary` and `nary`"),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Uniform => write!(f, "uniform"),
            Mode::Binary => write!(f, "binary"),
            Mode::Nary => write!(f, "nary"),
        }
    }
}

/// One admission request as seen by the caller.
///
/// The `From` impls mirror the accepted call shapes:
///
/// - `()`: empty subject, increment `1`
/// - a number: increment only
/// - a string: subject only, increment `1`
/// - `(subject, increment)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdmissionRequest {
    /// Subject the request is scoped to; empty segments are omitted from keys.
    pub subject: String,
    /// Number of actions to record.
    pub increment: u64,
}

impl Default for AdmissionRequest {
    fn default() -> Self {
        Self {
            subject: String::new(),
            increment: 1,
        }
    }
}

impl From<()> for AdmissionRequest {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<u64> for AdmissionRequest {
    fn from(increment: u64) -> Self {
        Self {
            subject: String::new(),
            increment,
        }
    }
}

impl From<&str> for AdmissionRequest {
    fn from(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            increment: 1,
        }
    }
}

impl From<String> for AdmissionRequest {
    fn from(subject: String) -> Self {
        Self {
            subject,
            increment: 1,
        }
    }
}

impl From<(&str, u64)> for AdmissionRequest {
    fn from((subject, increment): (&str, u64)) -> Self {
        Self {
            subject: subject.to_string(),
            increment,
        }
    }
}

/// Outcome of one admission request, aggregated over every tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdmissionResult {
    /// Capacity left in the most constraining tier after this call.
    pub actions_remaining: u64,
    /// Increment committed by this call: the full increment or `0`.
    pub actions_recorded: u64,
    /// Time until the same call is expected to succeed; `0` when admitted.
    pub wait_micros: u64,
}

impl AdmissionResult {
    /// Whether the request was admitted.
    pub fn is_allowed(&self) -> bool {
        self.actions_recorded > 0
    }

    /// [`wait_micros`](Self::wait_micros) as a [`Duration`].
    pub fn wait(&self) -> Duration {
        Duration::from_micros(self.wait_micros)
    }

    /// Wait in (fractional) milliseconds, for display.
    pub fn wait_ms(&self) -> f64 {
        self.wait_micros as f64 / 1000.0
    }
}
