//! Caller-facing limiter.
//!
//! A [`RateLimiter`] owns a validated set of tiers and forwards every
//! admission request, as one [`Evaluation`], to its [`WindowStore`].

use std::{collections::HashSet, sync::Arc};

use crate::{
    AdmissionRequest, AdmissionResult, Clock, Evaluation, Mode, RateTiersError, SystemClock,
    Tier, TierOptions, WindowStore, storage_key,
};

/// The tiers a limiter enforces.
#[derive(Clone, Debug)]
pub enum Limits {
    /// One tier; its key segment is empty.
    Single(TierOptions),
    /// Positional tiers; the first has an empty key segment, tier `i > 0` uses `"i"`.
    List(Vec<TierOptions>),
    /// Named tiers; the name is the key segment. Order is preserved.
    Named(Vec<(String, TierOptions)>),
}

/// Top-level configuration for [`RateLimiter`].
///
/// # Examples
///
/// ```
/// use ratetiers::{Mode, RateLimiterOptions, TierOptions};
///
/// // "5 per 10s, 500ms apart" and "25 per 100s" at the same time.
/// let options = RateLimiterOptions::list(
///     "MyNamespace",
///     vec![
///         TierOptions::new(10_000, 5).min_difference_ms(500),
///         TierOptions::new(100_000, 25),
///     ],
/// )
/// .mode(Mode::Uniform);
/// assert_eq!(options.mode, Mode::Uniform);
/// ```
#[derive(Clone, Debug)]
pub struct RateLimiterOptions {
    /// Prefix shared by every storage key of this limiter. May be empty.
    ///
    /// Must not contain `:`.
    pub namespace: String,
    /// How tier verdicts are combined. Defaults to [`Mode::Binary`].
    pub mode: Mode,
    /// Tiers to enforce.
    pub limits: Limits,
}

impl RateLimiterOptions {
    /// A limiter with a single tier.
    pub fn single(namespace: impl Into<String>, tier: TierOptions) -> Self {
        Self {
            namespace: namespace.into(),
            mode: Mode::default(),
            limits: Limits::Single(tier),
        }
    }

    /// A limiter with positional tiers.
    pub fn list(namespace: impl Into<String>, tiers: Vec<TierOptions>) -> Self {
        Self {
            namespace: namespace.into(),
            mode: Mode::default(),
            limits: Limits::List(tiers),
        }
    }

    /// A limiter with named tiers.
    pub fn named<K, I>(namespace: impl Into<String>, tiers: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, TierOptions)>,
    {
        Self {
            namespace: namespace.into(),
            mode: Mode::default(),
            limits: Limits::Named(tiers.into_iter().map(|(k, t)| (k.into(), t)).collect()),
        }
    }

    /// Override the combination mode.
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}

fn build_tiers(limits: &Limits) -> Result<Vec<Tier>, RateTiersError> {
    match limits {
        Limits::Single(options) => Ok(vec![Tier::new("", options)?]),
        Limits::List(list) => {
            if list.is_empty() {
                return Err(RateTiersError::NoTiers);
            }

            list.iter()
                .enumerate()
                .map(|(i, options)| {
                    let index = if i == 0 { String::new() } else { i.to_string() };
                    Tier::new(index, options)
                })
                .collect()
        }
        Limits::Named(named) => {
            if named.is_empty() {
                return Err(RateTiersError::NoTiers);
            }

            let mut seen = HashSet::new();
            let mut tiers = Vec::with_capacity(named.len());
            for (name, options) in named {
                if name.is_empty() {
                    return Err(RateTiersError::InvalidTier {
                        tier: name.clone(),
                        reason: "Tier name must not be empty",
                    });
                }
                if name.contains(':') {
                    return Err(RateTiersError::InvalidTier {
                        tier: name.clone(),
                        reason: "Tier name must not contain colons",
                    });
                }
                if !seen.insert(name.as_str()) {
                    return Err(RateTiersError::DuplicateTier(name.clone()));
                }

                tiers.push(Tier::new(name.clone(), options)?);
            }

            Ok(tiers)
        }
    }
}

/// Multi-tier admission controller.
///
/// Every call to [`admit`](Self::admit) is evaluated against all configured
/// tiers in one atomic step of the store: the increment is committed to every
/// tier or to none.
///
/// # Examples
///
/// ```ignore
/// use ratetiers::{RateLimiter, RateLimiterOptions, RedisWindowStore, TierOptions};
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
/// let store = RedisWindowStore::new(client.get_connection_manager().await?);
///
/// let limiter = RateLimiter::new(
///     RateLimiterOptions::single("login", TierOptions::new(10_000, 5).min_difference_ms(500)),
///     store,
/// )?;
///
/// let result = limiter.admit("user_123").await?;
/// if !result.is_allowed() {
///     // send 429, retry after result.wait()
/// }
/// ```
pub struct RateLimiter<S, C = SystemClock> {
    namespace: String,
    mode: Mode,
    tiers: Arc<[Tier]>,
    store: S,
    clock: C,
}

impl<S: WindowStore> RateLimiter<S> {
    /// Validate `options` and build a limiter timed by the system clock.
    pub fn new(options: RateLimiterOptions, store: S) -> Result<Self, RateTiersError> {
        Self::with_clock(options, store, SystemClock)
    }
}

impl<S: WindowStore, C: Clock> RateLimiter<S, C> {
    /// Validate `options` and build a limiter timed by `clock`.
    ///
    /// Fails without producing a limiter if any tier is invalid.
    pub fn with_clock(
        options: RateLimiterOptions,
        store: S,
        clock: C,
    ) -> Result<Self, RateTiersError> {
        if options.namespace.contains(':') {
            return Err(RateTiersError::InvalidNamespace(
                "Namespace must not contain colons",
            ));
        }

        let tiers = build_tiers(&options.limits)?;

        tracing::debug!(
            namespace = %options.namespace,
            mode = %options.mode,
            tiers = tiers.len(),
            "rate_limiter.new"
        );

        Ok(Self {
            namespace: options.namespace,
            mode: options.mode,
            tiers: tiers.into(),
            store,
            clock,
        })
    } // end constructor

    /// Validated tiers, in evaluation order.
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Combination mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Key prefix.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Storage keys used for `subject`, one per tier.
    pub fn keys_for(&self, subject: &str) -> Vec<String> {
        self.tiers
            .iter()
            .map(|tier| storage_key(&self.namespace, tier.index(), subject))
            .collect()
    }

    /// Check admission for `request` now and, if allowed, record it in every tier.
    ///
    /// # Arguments
    ///
    /// - `request`: anything convertible into an [`AdmissionRequest`]:
    ///   `()`, an increment, a subject, or `(subject, increment)`
    ///
    /// # Errors
    ///
    /// - [`RateTiersError::InvalidIncrement`] / [`RateTiersError::InvalidSubject`]
    ///   before the store is contacted
    /// - [`RateTiersError::StoreUnavailable`] if the store could not evaluate
    pub async fn admit(
        &self,
        request: impl Into<AdmissionRequest>,
    ) -> Result<AdmissionResult, RateTiersError> {
        self.admit_at(request, self.clock.now_micros()).await
    } // end method admit

    /// Same as [`admit`](Self::admit) with an explicit timestamp (µs since the Unix epoch).
    pub async fn admit_at(
        &self,
        request: impl Into<AdmissionRequest>,
        now_micros: u64,
    ) -> Result<AdmissionResult, RateTiersError> {
        let request = request.into();
        let evaluation = self.prepare(&request, now_micros)?;

        match self.store.evaluate(&evaluation).await {
            Ok(result) => {
                if !result.is_allowed() {
                    tracing::debug!(
                        namespace = %self.namespace,
                        subject = %request.subject,
                        increment = request.increment,
                        remaining = result.actions_remaining,
                        wait_micros = result.wait_micros,
                        "rate_limiter.denied"
                    );
                }

                Ok(result)
            }
            Err(err) => {
                tracing::error!(error = ?err, namespace = %self.namespace, "rate_limiter.store_error");
                Err(err)
            }
        }
    } // end method admit_at

    pub(crate) fn prepare(
        &self,
        request: &AdmissionRequest,
        now_micros: u64,
    ) -> Result<Evaluation, RateTiersError> {
        if request.increment == 0 {
            return Err(RateTiersError::InvalidIncrement);
        }

        self.validate_subject(&request.subject)?;

        Ok(Evaluation::new(
            &self.namespace,
            &request.subject,
            self.tiers.clone(),
            self.mode,
            request.increment,
            now_micros,
        ))
    }

    fn validate_subject(&self, subject: &str) -> Result<(), RateTiersError> {
        if subject.contains(':') {
            return Err(RateTiersError::InvalidSubject(
                "Subject must not contain colons",
            ));
        }

        // `ns:<subject>` of an unnamed tier would alias `ns:<index>` of another tier.
        let has_unnamed = self.tiers.iter().any(|t| t.index().is_empty());
        if has_unnamed && !subject.is_empty() && self.tiers.iter().any(|t| t.index() == subject) {
            return Err(RateTiersError::InvalidSubject(
                "Subject must not equal a tier index",
            ));
        }

        Ok(())
    }
}
