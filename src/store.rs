use std::future::Future;

use crate::{AdmissionResult, Evaluation, RateTiersError};

/// A shared store able to run one [`Evaluation`] atomically.
///
/// Implementations must guarantee that, for the keys of one evaluation, no
/// other evaluation observes or commits in between: either every tier is
/// updated or none is. Evaluations over disjoint keys may run concurrently.
///
/// A store that cannot complete the evaluation returns
/// [`RateTiersError::StoreUnavailable`]; it never guesses a decision.
pub trait WindowStore: Send + Sync {
    /// Evaluate and, when admitted, commit `evaluation`.
    fn evaluate(
        &self,
        evaluation: &Evaluation,
    ) -> impl Future<Output = Result<AdmissionResult, RateTiersError>> + Send;
}

impl<S: WindowStore> WindowStore for std::sync::Arc<S> {
    fn evaluate(
        &self,
        evaluation: &Evaluation,
    ) -> impl Future<Output = Result<AdmissionResult, RateTiersError>> + Send {
        (**self).evaluate(evaluation)
    }
}
