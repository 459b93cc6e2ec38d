//! # Dirty-Form Registry
//!
//! Tracks editable forms whose contents diverge from their last saved state
//! and saves or discards them as one unit.
//!
//! A form moves `clean -> dirty` when registered and back to `clean` when
//! unregistered. `save_all` is all-or-nothing *visibility*, not a
//! transaction: when any save fails every form stays registered, including
//! the ones whose own save already took effect.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use errors::{FormError, MutationError};
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

pub type SaveFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), MutationError>> + Send + Sync>;
pub type ResetFn = Arc<dyn Fn() -> Result<(), FormError> + Send + Sync>;

/// One form with unsaved edits.
#[derive(Clone)]
pub struct DirtyForm {
    pub id: String,
    pub name: String,
    on_save: SaveFn,
    on_reset: ResetFn,
}

impl DirtyForm {
    pub fn new<S, Fut, R>(
        id: impl Into<String>,
        name: impl Into<String>,
        on_save: S,
        on_reset: R,
    ) -> Self
    where
        S: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), MutationError>> + Send + 'static,
        R: Fn() -> Result<(), FormError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            name: name.into(),
            on_save: Arc::new(move || -> BoxFuture<'static, Result<(), MutationError>> {
                Box::pin(on_save())
            }),
            on_reset: Arc::new(on_reset),
        }
    }

    pub async fn save(&self) -> Result<(), MutationError> {
        (self.on_save)().await
    }

    pub fn reset(&self) -> Result<(), FormError> {
        (self.on_reset)()
    }

    /// Whether both values came from the same `register_form` call.
    fn same_registration(&self, other: &DirtyForm) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.on_save, &other.on_save)
    }
}

impl std::fmt::Debug for DirtyForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirtyForm")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Result of [`DirtyFormRegistry::reset_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetOutcome {
    pub reset: usize,
    /// Ids of forms whose reset callback reported a failure.
    pub failed: Vec<String>,
}

/// Session-scoped set of dirty forms keyed by id.
///
/// Cloning shares the underlying registry. The lock is never held while a
/// callback runs, so callbacks may register or unregister forms themselves.
#[derive(Clone, Default)]
pub struct DirtyFormRegistry {
    forms: Arc<Mutex<HashMap<String, DirtyForm>>>,
}

impl DirtyFormRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the form with `form.id`. Returns true when an
    /// existing registration was replaced.
    pub fn register_form(&self, form: DirtyForm) -> bool {
        debug!("Registering dirty form {} ({})", form.id, form.name);
        self.forms.lock().insert(form.id.clone(), form).is_some()
    }

    pub fn unregister_form(&self, id: &str) -> bool {
        self.forms.lock().remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.forms.lock().contains_key(id)
    }

    pub fn dirty_count(&self) -> usize {
        self.forms.lock().len()
    }

    pub fn has_dirty_forms(&self) -> bool {
        !self.forms.lock().is_empty()
    }

    /// Display names of the dirty forms, sorted.
    pub fn form_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.forms.lock().values().map(|f| f.name.clone()).collect();
        names.sort();
        names
    }

    fn registered(&self) -> Vec<DirtyForm> {
        self.forms.lock().values().cloned().collect()
    }

    /// Run every form's save concurrently.
    ///
    /// All saves run to completion even after one fails. On full success the
    /// saved registrations are removed and their count returned. Otherwise
    /// the first failure to arrive is returned and the registry is untouched.
    ///
    /// A form registered or re-registered while the batch was in flight
    /// carries edits the batch never saw, so it stays registered.
    pub async fn save_all(&self) -> Result<usize, FormError> {
        let forms = self.registered();
        if forms.is_empty() {
            return Ok(0);
        }

        let mut pending: FuturesUnordered<_> = forms
            .iter()
            .cloned()
            .map(|form| async move {
                let result = form.save().await;
                (form.id, result)
            })
            .collect();

        let mut saved = 0;
        let mut first_error = None;
        while let Some((id, result)) = pending.next().await {
            match result {
                Ok(()) => saved += 1,
                Err(source) => {
                    warn!("Form {} failed to save: {}", id, source);
                    if first_error.is_none() {
                        first_error = Some(FormError::SaveFailed {
                            form_id: id,
                            source,
                        });
                    }
                }
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }

        let mut registered = self.forms.lock();
        for form in &forms {
            if registered
                .get(&form.id)
                .is_some_and(|current| current.same_registration(form))
            {
                registered.remove(&form.id);
            }
        }
        let remaining = registered.len();
        drop(registered);

        if remaining > 0 {
            debug!("{} forms changed during save_all and stay dirty", remaining);
        }
        info!("Saved {} dirty forms", saved);
        Ok(saved)
    }

    /// Run every form's reset, then clear the registry.
    ///
    /// Clearing is unconditional: a form whose reset fails or panics is
    /// still removed and reported in [`ResetOutcome::failed`].
    pub fn reset_all(&self) -> ResetOutcome {
        let mut outcome = ResetOutcome::default();
        for form in self.registered() {
            match panic::catch_unwind(AssertUnwindSafe(|| form.reset())) {
                Ok(Ok(())) => outcome.reset += 1,
                Ok(Err(e)) => {
                    warn!("Form {} failed to reset: {}", form.id, e);
                    outcome.failed.push(form.id);
                }
                Err(_) => {
                    error!("Form {} panicked while resetting", form.id);
                    outcome.failed.push(form.id);
                }
            }
        }
        outcome.failed.sort();

        self.forms.lock().clear();
        outcome
    }
}
