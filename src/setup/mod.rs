//! Onboarding wizard step gating.
//!
//! The school setup wizard is an ordered list of steps. A step may only be
//! opened once every step before it is complete; a request for a later step
//! is redirected to the first incomplete one.


use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::api::transport::HttpTransport;

/// Backend route holding the wizard progress for the current school.
pub const PROGRESS_PATH: &str = "/setup/progress";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetupError {
    #[error("Setup step {step} does not exist (wizard has {total} steps)")]
    OutOfRange { step: usize, total: usize },

    #[error("Setup step {requested} is locked; complete step {redirect_to} first")]
    Blocked { requested: usize, redirect_to: usize },
}

/// Completed step indices of a wizard with `total_steps` steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupProgress {
    total_steps: usize,
    #[serde(default)]
    completed_steps: BTreeSet<usize>,
}

impl SetupProgress {
    pub fn new(total_steps: usize) -> Self {
        Self {
            total_steps,
            completed_steps: BTreeSet::new(),
        }
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn is_completed(&self, step: usize) -> bool {
        self.completed_steps.contains(&step)
    }

    /// Lowest step index not yet completed, `None` once the wizard is done.
    pub fn first_incomplete(&self) -> Option<usize> {
        (0..self.total_steps).find(|step| !self.completed_steps.contains(step))
    }

    pub fn is_complete(&self) -> bool {
        self.first_incomplete().is_none()
    }

    /// True iff `step` exists and every step before it is completed.
    pub fn can_access(&self, step: usize) -> bool {
        step < self.total_steps && (0..step).all(|prev| self.completed_steps.contains(&prev))
    }

    /// `Ok` if `step` may be shown, otherwise where to send the user instead.
    pub fn validate_route(&self, step: usize) -> Result<(), SetupError> {
        if step >= self.total_steps {
            return Err(SetupError::OutOfRange {
                step,
                total: self.total_steps,
            });
        }
        match self.first_incomplete() {
            Some(first) if first < step => Err(SetupError::Blocked {
                requested: step,
                redirect_to: first,
            }),
            _ => Ok(()),
        }
    }

    /// Mark `step` as completed. Completing an already-completed step is a
    /// no-op.
    pub fn complete(&mut self, step: usize) -> Result<(), SetupError> {
        self.validate_route(step)?;
        self.completed_steps.insert(step);
        Ok(())
    }

    /// Drop completed indices past `total_steps`, e.g. after the wizard
    /// lost a step.
    fn normalize(mut self) -> Self {
        let total = self.total_steps;
        self.completed_steps.retain(|step| *step < total);
        self
    }
}

/// GET the stored wizard progress.
pub async fn fetch_progress<T: HttpTransport>(
    client: &ApiClient<T>,
) -> Result<SetupProgress, ApiError> {
    let progress: SetupProgress = client.get(PROGRESS_PATH).await?;
    Ok(progress.normalize())
}

/// PUT the wizard progress back to the backend.
pub async fn save_progress<T: HttpTransport>(
    client: &ApiClient<T>,
    progress: &SetupProgress,
) -> Result<(), ApiError> {
    let _: serde_json::Value = client.put(PROGRESS_PATH, progress).await?;
    log::debug!(
        "Saved setup progress ({}/{} steps)",
        progress.completed_steps.len(),
        progress.total_steps
    );
    Ok(())
}
