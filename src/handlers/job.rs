//! Job creation and partial field updates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{audit, discounts, status, transact};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    Actor, ChangeKind, CreateRepairRequest, Customer, Device, RepairJob, RepairStatus,
    UpdateRepairRequest,
};

fn require(value: &str, label: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(format!("{} is required", label)));
    }
    Ok(())
}

fn require_non_negative(value: Decimal, label: &str) -> EngineResult<()> {
    if value < Decimal::ZERO {
        return Err(EngineError::validation(format!("{} cannot be negative", label)));
    }
    Ok(())
}

fn validate_customer(customer: &Customer) -> EngineResult<()> {
    require(&customer.name, "Customer name")?;
    require(&customer.phone, "Customer phone")
}

fn validate_device(device: &Device) -> EngineResult<()> {
    require(&device.device_type, "Device type")?;
    require(&device.issue, "Issue description")
}

/// Build a new Pending job with empty ledgers and its CREATE entry.
pub fn create_job(
    req: CreateRepairRequest,
    id: Uuid,
    job_number: String,
    now: DateTime<Utc>,
    actor: &Actor,
) -> EngineResult<RepairJob> {
    validate_customer(&req.customer)?;
    validate_device(&req.device)?;
    require_non_negative(req.checking_charge, "Checking charge")?;
    require_non_negative(req.estimation_value, "Estimation value")?;
    require_non_negative(req.repair_cost, "Repair cost")?;

    let mut job = RepairJob {
        id,
        job_number,
        customer: req.customer,
        device: req.device,
        checking_charge: req.checking_charge,
        estimation_value: req.estimation_value,
        repair_cost: req.repair_cost,
        cart_total: Decimal::ZERO,
        total_discount_amount: Decimal::ZERO,
        total_repair_cost: Decimal::ZERO,
        total_additional_services_amount: Decimal::ZERO,
        final_amount: Decimal::ZERO,
        status: RepairStatus::Pending,
        cart: Vec::new(),
        discounts: Vec::new(),
        additional_services: Vec::new(),
        change_history: Vec::new(),
        technician_review: req.technician_review,
        created_at: now,
        updated_at: now,
    };
    let totals = job.totals()?;
    job.apply_totals(&totals);

    let snapshot = json!({
        "jobNumber": job.job_number,
        "customer": job.customer.name,
        "deviceType": job.device.device_type,
        "repairCost": job.repair_cost,
        "repairStatus": job.status,
    });
    audit::record_change(
        &mut job,
        "repairJob",
        serde_json::Value::Null,
        snapshot,
        ChangeKind::Create,
        actor,
    );

    info!(job_id = %job.id, job_number = %job.job_number, actor = %actor, "Repair job created");
    Ok(job)
}

fn set_amount(
    job: &mut RepairJob,
    field: &str,
    label: &str,
    value: Option<Decimal>,
    actor: &Actor,
    slot: fn(&mut RepairJob) -> &mut Decimal,
) -> EngineResult<()> {
    let Some(value) = value else {
        return Ok(());
    };
    require_non_negative(value, label)?;
    let current = slot(job);
    if *current == value {
        return Ok(());
    }
    let old = *current;
    *current = value;
    audit::record_change(job, field, json!(old), json!(value), ChangeKind::Update, actor);
    Ok(())
}

/// Apply a partial update. Plain fields go first, then the discount list,
/// then status, so the ceiling check and the completion check both see the
/// final figures. A request that reopens a cancelled job changes status
/// before the discount list, which a cancelled job refuses. All-or-nothing.
pub fn apply_update(job: &mut RepairJob, req: UpdateRepairRequest, actor: &Actor) -> EngineResult<()> {
    let reopening = job.status == RepairStatus::Cancelled
        && req.repair_status.is_some_and(|to| to != RepairStatus::Cancelled);

    transact(job, |next| {
        if reopening {
            if let Some(target) = req.repair_status {
                status::set_status(next, target, req.confirm_unpaid, actor)?;
            }
        }

        if let Some(customer) = req.customer {
            validate_customer(&customer)?;
            if customer != next.customer {
                let old = json!(next.customer);
                next.customer = customer;
                let new = json!(next.customer);
                audit::record_change(next, "customer", old, new, ChangeKind::Update, actor);
            }
        }

        if let Some(device) = req.device {
            validate_device(&device)?;
            if device != next.device {
                let old = json!(next.device);
                next.device = device;
                let new = json!(next.device);
                audit::record_change(next, "device", old, new, ChangeKind::Update, actor);
            }
        }

        set_amount(next, "checkingCharge", "Checking charge", req.checking_charge, actor, |j| {
            &mut j.checking_charge
        })?;
        set_amount(next, "estimationValue", "Estimation value", req.estimation_value, actor, |j| {
            &mut j.estimation_value
        })?;
        set_amount(next, "repairCost", "Repair cost", req.repair_cost, actor, |j| {
            &mut j.repair_cost
        })?;

        if let Some(review) = req.technician_review {
            let review = Some(review).filter(|r| !r.trim().is_empty());
            if review != next.technician_review {
                let old = json!(next.technician_review);
                next.technician_review = review;
                let new = json!(next.technician_review);
                audit::record_change(next, "technicianReview", old, new, ChangeKind::Update, actor);
            }
        }

        if let Some(entries) = req.discounts {
            discounts::apply_all(next, entries, actor)?;
        }

        if !reopening {
            if let Some(target) = req.repair_status {
                status::set_status(next, target, req.confirm_unpaid, actor)?;
            }
        }

        Ok(())
    })
}
