use std::{
    future::{Future, ready},
    sync::{Arc, Mutex, MutexGuard},
};

use dashmap::DashMap;

use crate::{
    AdmissionResult, Evaluation, RateTiersError, WindowState, WindowStore, coordinator,
};

/// In-process [`WindowStore`].
///
/// Keeps one [`WindowState`] per storage key behind its own mutex. An
/// evaluation locks the windows of all its tiers in ascending key order, which
/// makes the evaluate-then-commit step atomic per request and deadlock free
/// across requests sharing keys.
///
/// # Semantics & Limitations
///
/// **Process-scoped:**
/// - State is only shared by limiters holding the same store (wrap it in an
///   [`Arc`] to share it)
/// - Use [`RedisWindowStore`](crate::RedisWindowStore) for state shared across processes
///
/// **Memory growth:**
/// - Keys are created lazily on first use and are never dropped automatically
/// - Call [`purge_idle`](Self::purge_idle) periodically to drop keys whose window is empty
///
/// # Examples
///
/// ```
/// use ratetiers::{LocalWindowStore, RateLimiter, RateLimiterOptions, TierOptions};
///
/// let limiter = RateLimiter::new(
///     RateLimiterOptions::single("api", TierOptions::new(1_000, 2)),
///     LocalWindowStore::new(),
/// )
/// .unwrap();
///
/// futures::executor::block_on(async {
///     let result = limiter.admit_at("user_1", 1_000_000).await.unwrap();
///     assert!(result.is_allowed());
///     assert_eq!(result.actions_remaining, 1);
/// });
/// ```
#[derive(Debug, Default)]
pub struct LocalWindowStore {
    windows: DashMap<String, Arc<Mutex<WindowState>>>,
}

impl LocalWindowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    } // end constructor

    /// Number of keys currently holding state.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no key holds state.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Snapshot of the window stored under `key`, or `None` if the key holds no state.
    ///
    /// # Errors
    ///
    /// - [`RateTiersError::StoreUnavailable`] if the window's lock is poisoned
    pub fn window(&self, key: &str) -> Result<Option<WindowState>, RateTiersError> {
        let Some(handle) = self.windows.get(key).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };
        let window = handle.lock().map_err(|_| poisoned())?;

        Ok(Some(window.clone()))
    }

    /// Drop every key that has been idle for a full window and its spacing period.
    ///
    /// Dropped keys behave exactly like keys that were never used. Returns the
    /// number of keys removed.
    pub fn purge_idle(&self, now_micros: u64) -> usize {
        let before = self.windows.len();

        self.windows.retain(|_, handle| match handle.lock() {
            Ok(mut window) if window.is_expired(now_micros) => {
                // An evaluation still holding this handle retries with a fresh entry.
                window.retired = true;
                false
            }
            Ok(_) => true,
            Err(_) => false,
        });

        let purged = before.saturating_sub(self.windows.len());
        tracing::debug!(purged, "local.purge_idle");

        purged
    } // end method purge_idle

    fn evaluate_locked(&self, evaluation: &Evaluation) -> Result<AdmissionResult, RateTiersError> {
        let keys = evaluation.keys();

        let mut lock_order: Vec<usize> = (0..keys.len()).collect();
        lock_order.sort_by(|&a, &b| keys[a].cmp(&keys[b]));

        loop {
            let handles: Vec<Arc<Mutex<WindowState>>> = keys
                .iter()
                .map(|key| self.windows.entry(key.clone()).or_default().clone())
                .collect();

            let mut slots: Vec<Option<MutexGuard<'_, WindowState>>> =
                handles.iter().map(|_| None).collect();
            for &i in &lock_order {
                let guard = handles[i].lock().map_err(|_| poisoned())?;
                slots[i] = Some(guard);
            }
            let mut guards: Vec<MutexGuard<'_, WindowState>> = slots.into_iter().flatten().collect();

            if guards.iter().any(|window| window.retired) {
                continue;
            }

            let mut windows: Vec<&mut WindowState> = guards.iter_mut().map(|g| &mut **g).collect();

            let result = coordinator::admit(
                evaluation.mode(),
                evaluation.tiers(),
                &mut windows,
                evaluation.increment(),
                evaluation.now_micros(),
            );

            tracing::trace!(
                keys = ?keys,
                allowed = result.is_allowed(),
                remaining = result.actions_remaining,
                wait_micros = result.wait_micros,
                "local.evaluate"
            );

            return Ok(result);
        }
    } // end method evaluate_locked
}

fn poisoned() -> RateTiersError {
    RateTiersError::StoreUnavailable("local window lock poisoned".into())
}

impl WindowStore for LocalWindowStore {
    fn evaluate(
        &self,
        evaluation: &Evaluation,
    ) -> impl Future<Output = Result<AdmissionResult, RateTiersError>> + Send {
        ready(self.evaluate_locked(evaluation))
    }
}
