//! Repair job engine.
//!
//! Each module owns one slice of a job's sub-state:
//! - `cart`: parts attached to the job and their inventory movements
//! - `discounts`: named discounts against the base total
//! - `additional_services`: post-diagnosis add-ons with paid/unpaid state
//! - `status`: lifecycle transitions
//! - `pricing`: pure derivation of all monetary totals
//! - `audit`: the append-only change history
//! - `job`: creation and partial field updates, composed from the above
//!
//! Mutations run against a copy of the job and only replace the caller's
//! record once totals have been recomputed and validated.

pub mod additional_services;
pub mod audit;
pub mod cart;
pub mod discounts;
pub mod job;
pub mod pricing;
pub mod status;

use crate::error::{EngineError, EngineResult};
use crate::models::{RepairJob, RepairStatus};

/// Apply `mutate` to a copy of `job`, reprice it and commit only on success.
pub(crate) fn transact<T>(
    job: &mut RepairJob,
    mutate: impl FnOnce(&mut RepairJob) -> EngineResult<T>,
) -> EngineResult<T> {
    let mut next = job.clone();
    let outcome = mutate(&mut next)?;
    let totals = next.totals()?;
    pricing::ensure_within_base(&totals)?;
    next.apply_totals(&totals);
    *job = next;
    Ok(outcome)
}

/// Cancelled jobs accept status changes only.
pub(crate) fn ensure_open(job: &RepairJob) -> EngineResult<()> {
    if job.status == RepairStatus::Cancelled {
        return Err(EngineError::Conflict(format!(
            "Job {} is cancelled and cannot be modified",
            job.job_number
        )));
    }
    Ok(())
}
