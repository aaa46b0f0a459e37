//! The till: submits movements and purges the current month.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::{
    LedgerState, MovementForm, MovementInput, MovementKind, ResultEngine, SubmitError, Viewport,
    ledger::{Period, in_period},
    store::{LedgerFeed, MovementStore, SaleOutcome, SaleRegistrar},
    submit::{Dispatch, prepare},
};

/// Where the till is in the submission cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SubmissionState {
    #[default]
    Idle,
    Submitting,
    Succeeded,
    Failed(SubmitError),
}

/// A recorded movement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub kind: MovementKind,
    pub movement_id: String,
}

pub struct Till<S, R> {
    store: Arc<S>,
    registrar: Arc<R>,
    feed: Mutex<LedgerFeed>,
    submission: Mutex<SubmissionState>,
}

impl<S, R> Till<S, R>
where
    S: MovementStore,
    R: SaleRegistrar,
{
    pub fn new(store: Arc<S>, registrar: Arc<R>, feed: LedgerFeed) -> Self {
        Self {
            store,
            registrar,
            feed: Mutex::new(feed),
            submission: Mutex::new(SubmissionState::Idle),
        }
    }

    /// The newest snapshot delivered by the store subscriptions.
    pub fn snapshot(&self) -> LedgerState {
        self.feed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latest()
    }

    pub fn submission_state(&self) -> SubmissionState {
        self.submission
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validates `input` against the latest snapshot and records it.
    ///
    /// Fails with [`SubmitError::Busy`] while another submission is running.
    pub async fn submit(
        &self,
        input: &MovementInput,
        viewport: Viewport,
        now: DateTime<Utc>,
    ) -> Result<Receipt, SubmitError> {
        let guard = SubmissionGuard::begin(&self.submission)?;
        let result = self.record(input, viewport, now).await;
        guard.finish(&result);
        result
    }

    /// Submits the form; on success the input goes back to its defaults, on
    /// failure it is kept so the operator can fix it.
    pub async fn submit_form(
        &self,
        form: &mut MovementForm,
        viewport: Viewport,
        now: DateTime<Utc>,
    ) -> Result<Receipt, SubmitError> {
        let result = self.submit(&form.input, viewport, now).await;
        match &result {
            Ok(_) => {
                form.input = MovementInput::default();
                form.ui.succeeded();
            }
            Err(err) => form.ui.failed(err),
        }
        result
    }

    async fn record(
        &self,
        input: &MovementInput,
        viewport: Viewport,
        now: DateTime<Utc>,
    ) -> Result<Receipt, SubmitError> {
        let state = self.snapshot();
        let dispatch = prepare(input, viewport, &state, now).inspect_err(|err| {
            tracing::debug!(kind = %input.kind, "movement refused: {err}");
        })?;

        let movement_id = match dispatch {
            Dispatch::Sale(sale) => match self.registrar.register(sale).await {
                Ok(SaleOutcome::Registered { movement_id }) => movement_id,
                Ok(SaleOutcome::Rejected { reason }) => {
                    tracing::warn!("sale rejected: {reason}");
                    return Err(SubmitError::SaleRegistrationFailed { reason });
                }
                Err(err) => {
                    tracing::error!("sale registration failed: {err}");
                    return Err(SubmitError::UnknownFailure);
                }
            },
            Dispatch::Create(movement) => self.store.create(movement).await.map_err(|err| {
                tracing::error!(kind = %input.kind, "failed to create movement: {err}");
                SubmitError::UnknownFailure
            })?,
        };

        tracing::info!(kind = %input.kind, id = %movement_id, "movement recorded");
        Ok(Receipt {
            kind: input.kind,
            movement_id,
        })
    }

    /// Deletes every movement of the current civil month. Movements without
    /// a readable timestamp are kept.
    pub async fn purge_month(&self, now: DateTime<Utc>) -> ResultEngine<usize> {
        let ids: Vec<String> = self
            .snapshot()
            .movements()
            .iter()
            .filter(|movement| in_period(movement, Period::ThisMonth, now))
            .map(|movement| movement.id.clone())
            .collect();
        for (deleted, id) in ids.iter().enumerate() {
            if let Err(err) = self.store.delete(id).await {
                tracing::error!(deleted, "purge of the current month stopped at {id}: {err}");
                return Err(err);
            }
        }
        tracing::info!(deleted = ids.len(), "purged movements of the current month");
        Ok(ids.len())
    }
}

/// Holds the till in `Submitting`; a submission dropped half way leaves it
/// `Idle` again.
struct SubmissionGuard<'a> {
    state: &'a Mutex<SubmissionState>,
    finished: bool,
}

impl<'a> SubmissionGuard<'a> {
    fn begin(state: &'a Mutex<SubmissionState>) -> Result<Self, SubmitError> {
        let mut current = state.lock().unwrap_or_else(PoisonError::into_inner);
        if *current == SubmissionState::Submitting {
            return Err(SubmitError::Busy);
        }
        *current = SubmissionState::Submitting;
        Ok(Self {
            state,
            finished: false,
        })
    }

    fn finish<T>(mut self, result: &Result<T, SubmitError>) {
        let next = match result {
            Ok(_) => SubmissionState::Succeeded,
            Err(err) => SubmissionState::Failed(err.clone()),
        };
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
        self.finished = true;
    }
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.state.lock().unwrap_or_else(PoisonError::into_inner) = SubmissionState::Idle;
        }
    }
}
