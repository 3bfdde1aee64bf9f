//! # Status State Machine
//!
//! `Pending -> InProgress -> Completed`, with `Cancelled` reachable from any
//! state. The engine does not forbid any transition. Completing a job that
//! still has unpaid additional services needs explicit confirmation.

use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};

use super::{audit, pricing, transact};
use crate::error::{EngineError, EngineResult};
use crate::models::{Actor, ChangeKind, RepairJob, RepairStatus};

/// What a proposed transition would do, for callers that want to prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionCheck {
    pub from: RepairStatus,
    pub to: RepairStatus,
    pub unpaid_services: usize,
    pub unpaid_amount: Decimal,
}

impl TransitionCheck {
    pub fn needs_confirmation(&self) -> bool {
        self.to == RepairStatus::Completed
            && self.from != RepairStatus::Completed
            && self.unpaid_services > 0
    }
}

pub fn check_transition(job: &RepairJob, to: RepairStatus) -> EngineResult<TransitionCheck> {
    Ok(TransitionCheck {
        from: job.status,
        to,
        unpaid_services: job
            .additional_services
            .iter()
            .filter(|service| !service.is_paid)
            .count(),
        unpaid_amount: pricing::unpaid_services_total(&job.additional_services)?,
    })
}

/// Move the job to `to`. Returns `false` if it was already there.
pub fn set_status(
    job: &mut RepairJob,
    to: RepairStatus,
    confirmed: bool,
    actor: &Actor,
) -> EngineResult<bool> {
    let check = check_transition(job, to)?;
    if check.from == check.to {
        return Ok(false);
    }
    if check.needs_confirmation() {
        if !confirmed {
            return Err(EngineError::ConfirmationRequired {
                count: check.unpaid_services,
                unpaid: check.unpaid_amount,
            });
        }
        warn!(
            job_id = %job.id,
            unpaid = %check.unpaid_amount,
            actor = %actor,
            "Completing job with unpaid additional services"
        );
    }

    transact(job, |next| {
        next.status = to;
        audit::record_change(
            next,
            "repairStatus",
            json!(check.from),
            json!(check.to),
            ChangeKind::Update,
            actor,
        );
        Ok(())
    })?;

    info!(
        job_id = %job.id,
        from = %check.from,
        to = %check.to,
        amount_owed = %job.amount_owed(),
        actor = %actor,
        "Repair status changed"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::additional_services::{add_service, mark_paid};
    use crate::handlers::test_support::job_with_cart;
    use crate::models::NewService;
    use rust_decimal_macros::dec;

    fn with_unpaid_service() -> RepairJob {
        let mut job = job_with_cart();
        add_service(
            &mut job,
            NewService {
                service_name: "Hinge".into(),
                service_amount: dec!(800),
                description: None,
            },
            &Actor::default(),
        )
        .unwrap();
        job
    }

    #[test]
    fn status_change_is_audited() {
        let mut job = job_with_cart();
        let before = job.change_history.len();
        assert!(set_status(&mut job, RepairStatus::InProgress, false, &Actor::new("tech")).unwrap());

        let entry = job.change_history.last().unwrap();
        assert_eq!(job.change_history.len(), before + 1);
        assert_eq!(entry.field, "repairStatus");
        assert_eq!(entry.old_value, json!("Pending"));
        assert_eq!(entry.new_value, json!("InProgress"));
    }

    #[test]
    fn same_status_is_a_no_op() {
        let mut job = job_with_cart();
        let before = job.change_history.len();
        assert!(!set_status(&mut job, RepairStatus::Pending, false, &Actor::default()).unwrap());
        assert_eq!(job.change_history.len(), before);
    }

    #[test]
    fn completing_with_unpaid_services_needs_confirmation() {
        let mut job = with_unpaid_service();
        let check = check_transition(&job, RepairStatus::Completed).unwrap();
        assert!(check.needs_confirmation());
        assert_eq!(check.unpaid_amount, dec!(800));

        let err = set_status(&mut job, RepairStatus::Completed, false, &Actor::default()).unwrap_err();
        assert!(matches!(err, EngineError::ConfirmationRequired { count: 1, .. }));
        assert_eq!(job.status, RepairStatus::Pending);

        set_status(&mut job, RepairStatus::Completed, true, &Actor::default()).unwrap();
        assert_eq!(job.status, RepairStatus::Completed);
        assert_eq!(job.amount_owed(), dec!(800));
        assert_eq!(job.final_amount, dec!(2300));
    }

    #[test]
    fn completed_job_with_everything_paid_owes_nothing() {
        let mut job = with_unpaid_service();
        mark_paid(&mut job, 0, &Actor::default()).unwrap();
        assert!(!check_transition(&job, RepairStatus::Completed).unwrap().needs_confirmation());

        set_status(&mut job, RepairStatus::Completed, false, &Actor::default()).unwrap();
        assert_eq!(job.amount_owed(), Decimal::ZERO);
    }

    #[test]
    fn any_transition_is_permitted() {
        let mut job = job_with_cart();
        for to in [
            RepairStatus::Cancelled,
            RepairStatus::Pending,
            RepairStatus::Completed,
            RepairStatus::InProgress,
        ] {
            set_status(&mut job, to, false, &Actor::default()).unwrap();
            assert_eq!(job.status, to);
        }
    }
}
