//! # Additional-Service Ledger
//!
//! Work found after the initial estimate, charged separately from the repair
//! itself. Paying a service flips its flag; the entry stays on the job with
//! its original amount.

use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;

use super::{audit, ensure_open, transact};
use crate::error::{EngineError, EngineResult};
use crate::models::{Actor, AdditionalService, ChangeKind, NewService, RepairJob};

pub fn validate_new_service(service: &NewService) -> EngineResult<()> {
    if service.service_name.trim().is_empty() {
        return Err(EngineError::validation("Service name is required"));
    }
    if service.service_amount <= Decimal::ZERO {
        return Err(EngineError::validation("Service amount must be greater than zero"));
    }
    Ok(())
}

pub fn add_service(job: &mut RepairJob, service: NewService, actor: &Actor) -> EngineResult<()> {
    ensure_open(job)?;
    validate_new_service(&service)?;

    transact(job, |next| {
        let entry = AdditionalService {
            service_name: service.service_name,
            service_amount: service.service_amount,
            description: service.description.filter(|d| !d.trim().is_empty()),
            is_paid: false,
        };
        let created = json!(entry);
        next.additional_services.push(entry);
        audit::record_change(
            next,
            "additionalServices",
            serde_json::Value::Null,
            created,
            ChangeKind::Create,
            actor,
        );
        Ok(())
    })?;

    info!(
        job_id = %job.id,
        unpaid_services = %job.total_additional_services_amount,
        actor = %actor,
        "Additional service added"
    );
    Ok(())
}

/// Mark one service as paid. Returns `false` when it already was, in which
/// case nothing changes and nothing is recorded.
pub fn mark_paid(job: &mut RepairJob, index: usize, actor: &Actor) -> EngineResult<bool> {
    let Some(service) = job.additional_services.get(index) else {
        return Err(EngineError::NotFound(format!(
            "No additional service at position {}",
            index
        )));
    };
    if service.is_paid {
        return Ok(false);
    }

    transact(job, |next| {
        let service = &mut next.additional_services[index];
        service.is_paid = true;
        let field = format!("additionalServices[{}].isPaid", index);
        let name = service.service_name.clone();
        let amount = service.service_amount;
        audit::record_change(
            next,
            &field,
            json!({ "serviceName": name, "serviceAmount": amount, "isPaid": false }),
            json!({ "serviceName": name, "serviceAmount": amount, "isPaid": true }),
            ChangeKind::Update,
            actor,
        );
        Ok(())
    })?;

    info!(
        job_id = %job.id,
        index,
        unpaid_services = %job.total_additional_services_amount,
        actor = %actor,
        "Additional service paid"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::discounts::add_discount;
    use crate::handlers::test_support::job_with_cart;
    use crate::models::{DiscountEntry, RepairStatus};
    use rust_decimal_macros::dec;

    fn service(name: &str, amount: Decimal) -> NewService {
        NewService {
            service_name: name.into(),
            service_amount: amount,
            description: None,
        }
    }

    fn discounted_job() -> RepairJob {
        let mut job = job_with_cart();
        add_discount(
            &mut job,
            DiscountEntry {
                discount_name: "Promo".into(),
                discount_amount: dec!(300),
                description: None,
            },
            &Actor::default(),
        )
        .unwrap();
        job
    }

    #[test]
    fn add_then_pay_moves_final_amount() {
        let mut job = discounted_job();
        add_service(&mut job, service("Keyboard", dec!(800)), &Actor::default()).unwrap();
        assert!(!job.additional_services[0].is_paid);
        assert_eq!(job.total_additional_services_amount, dec!(800));
        assert_eq!(job.final_amount, dec!(2000));

        assert!(mark_paid(&mut job, 0, &Actor::default()).unwrap());
        assert_eq!(job.total_additional_services_amount, Decimal::ZERO);
        assert_eq!(job.final_amount, dec!(1200));
        assert_eq!(job.total_repair_cost, dec!(1200));
        assert_eq!(job.additional_services[0].service_amount, dec!(800));
    }

    #[test]
    fn paying_twice_is_a_no_op() {
        let mut job = discounted_job();
        add_service(&mut job, service("Keyboard", dec!(800)), &Actor::default()).unwrap();
        mark_paid(&mut job, 0, &Actor::default()).unwrap();
        let history = job.change_history.len();

        assert!(!mark_paid(&mut job, 0, &Actor::default()).unwrap());
        assert_eq!(job.total_additional_services_amount, Decimal::ZERO);
        assert_eq!(job.change_history.len(), history);
    }

    #[test]
    fn paying_one_of_several_only_subtracts_that_amount() {
        let mut job = discounted_job();
        add_service(&mut job, service("Keyboard", dec!(800)), &Actor::default()).unwrap();
        add_service(&mut job, service("Fan", dec!(250)), &Actor::default()).unwrap();
        assert_eq!(job.total_additional_services_amount, dec!(1050));

        mark_paid(&mut job, 1, &Actor::default()).unwrap();
        assert_eq!(job.total_additional_services_amount, dec!(800));
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let mut job = job_with_cart();
        assert!(add_service(&mut job, service("Free", Decimal::ZERO), &Actor::default()).is_err());
        assert!(add_service(&mut job, service("Neg", dec!(-1)), &Actor::default()).is_err());
        assert!(job.additional_services.is_empty());
    }

    #[test]
    fn unknown_index_is_not_found() {
        let mut job = job_with_cart();
        assert!(matches!(
            mark_paid(&mut job, 3, &Actor::default()),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn cancelled_jobs_reject_new_services() {
        let mut job = job_with_cart();
        job.status = RepairStatus::Cancelled;
        assert!(add_service(&mut job, service("Late", dec!(10)), &Actor::default()).is_err());
    }
}
