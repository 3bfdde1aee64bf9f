//! # Discount Ledger
//!
//! Named discounts applied against the base total (cart + labor). The
//! cumulative discount may equal the base but never exceed it.

use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;

use super::{audit, ensure_open, transact};
use crate::error::{EngineError, EngineResult};
use crate::models::{Actor, ChangeKind, DiscountEntry, RepairJob};

fn validate_entry(entry: &DiscountEntry) -> EngineResult<()> {
    if entry.discount_name.trim().is_empty() {
        return Err(EngineError::validation("Discount name is required"));
    }
    if entry.discount_amount < Decimal::ZERO {
        return Err(EngineError::validation(format!(
            "Discount '{}' cannot be negative",
            entry.discount_name
        )));
    }
    Ok(())
}

pub fn add_discount(job: &mut RepairJob, entry: DiscountEntry, actor: &Actor) -> EngineResult<()> {
    ensure_open(job)?;
    validate_entry(&entry)?;

    transact(job, |next| {
        let created = json!(entry);
        next.discounts.push(entry);
        audit::record_change(next, "discounts", serde_json::Value::Null, created, ChangeKind::Create, actor);
        Ok(())
    })?;

    info!(
        job_id = %job.id,
        total_discount = %job.total_discount_amount,
        actor = %actor,
        "Discount added"
    );
    Ok(())
}

pub fn remove_discount(job: &mut RepairJob, index: usize, actor: &Actor) -> EngineResult<DiscountEntry> {
    ensure_open(job)?;
    if index >= job.discounts.len() {
        return Err(EngineError::NotFound(format!("No discount at position {}", index)));
    }

    let removed = transact(job, |next| {
        let removed = next.discounts.remove(index);
        audit::record_change(next, "discounts", json!(removed), serde_json::Value::Null, ChangeKind::Delete, actor);
        Ok(removed)
    })?;

    info!(job_id = %job.id, discount = %removed.discount_name, actor = %actor, "Discount removed");
    Ok(removed)
}

/// Replace the whole discount list, e.g. after a bulk edit. Same ceiling
/// check as a single add; an identical list is a no-op.
pub fn apply_all(job: &mut RepairJob, entries: Vec<DiscountEntry>, actor: &Actor) -> EngineResult<()> {
    if entries == job.discounts {
        return Ok(());
    }
    ensure_open(job)?;
    for entry in &entries {
        validate_entry(entry)?;
    }

    transact(job, |next| {
        let old = json!(next.discounts);
        next.discounts = entries;
        let new = json!(next.discounts);
        audit::record_change(next, "discounts", old, new, ChangeKind::Update, actor);
        Ok(())
    })
}
