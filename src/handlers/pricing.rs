//! # Pricing Engine
//!
//! Pure derivation of a job's monetary totals from its sub-state. Every
//! mutation in the other handlers ends by calling [`compute`] and, through
//! [`ensure_within_base`], refusing any state whose discounts exceed the base
//! total. No other code computes these figures.
//!
//! ```text
//! cart_total        = Σ max(0, line.cost)
//! base_total        = cart_total + max(0, repair_cost)
//! total_discount    = Σ max(0, discount.amount)             (≤ base_total)
//! total_repair_cost = max(0, base_total − total_discount)
//! unpaid_services   = Σ max(0, service.amount) where !is_paid
//! final_amount      = total_repair_cost + unpaid_services
//! amount_owed       = unpaid_services                        if Completed
//!                     total_repair_cost + unpaid_services    otherwise
//! ```

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::models::{AdditionalService, CartItem, DiscountEntry, RepairStatus};

/// Derived totals for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub cart_total: Decimal,
    pub base_total: Decimal,
    pub total_discount_amount: Decimal,
    pub total_repair_cost: Decimal,
    pub total_additional_services_amount: Decimal,
    pub final_amount: Decimal,
    pub amount_owed: Decimal,
}

fn non_negative(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

pub(crate) fn amount_too_large() -> EngineError {
    EngineError::validation("Amount too large")
}

/// Add two amounts, refusing results outside the representable range.
pub(crate) fn checked_add(a: Decimal, b: Decimal) -> EngineResult<Decimal> {
    a.checked_add(b).ok_or_else(amount_too_large)
}

fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> EngineResult<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |total, value| checked_add(total, non_negative(value)))
}

pub fn cart_total(cart: &[CartItem]) -> EngineResult<Decimal> {
    checked_sum(cart.iter().map(|item| item.cost))
}

pub fn discount_total(discounts: &[DiscountEntry]) -> EngineResult<Decimal> {
    checked_sum(discounts.iter().map(|entry| entry.discount_amount))
}

/// Sum of additional services not yet paid. Paid entries are settled.
pub fn unpaid_services_total(services: &[AdditionalService]) -> EngineResult<Decimal> {
    checked_sum(
        services
            .iter()
            .filter(|service| !service.is_paid)
            .map(|service| service.service_amount),
    )
}

pub fn compute(
    cart: &[CartItem],
    discounts: &[DiscountEntry],
    services: &[AdditionalService],
    repair_cost: Decimal,
    status: RepairStatus,
) -> EngineResult<Totals> {
    let cart_total = cart_total(cart)?;
    let base_total = checked_add(cart_total, non_negative(repair_cost))?;
    let total_discount_amount = discount_total(discounts)?;
    let total_repair_cost = non_negative(base_total - total_discount_amount);
    let total_additional_services_amount = unpaid_services_total(services)?;
    let final_amount = checked_add(total_repair_cost, total_additional_services_amount)?;

    // A completed job presumes the repair itself was settled at hand-over.
    let amount_owed = if status == RepairStatus::Completed {
        total_additional_services_amount
    } else {
        final_amount
    };

    Ok(Totals {
        cart_total,
        base_total,
        total_discount_amount,
        total_repair_cost,
        total_additional_services_amount,
        final_amount,
        amount_owed,
    })
}

pub fn ensure_within_base(totals: &Totals) -> EngineResult<()> {
    if totals.total_discount_amount > totals.base_total {
        return Err(EngineError::DiscountExceedsBase {
            discount: totals.total_discount_amount,
            base: totals.base_total,
        });
    }
    Ok(())
}
