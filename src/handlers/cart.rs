//! # Cart Manager
//!
//! Parts consumed by a job. Selection helpers (`add_or_increment`,
//! `fill_default_suppliers`, `clamp_return_quantity`) work on a caller-side
//! list before anything is committed; the job operations return the stock
//! movements the inventory collaborator must apply in one call.

use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info};

use super::{audit, ensure_open, pricing, transact};
use crate::error::{EngineError, EngineResult};
use crate::inventory::StockMove;
use crate::models::{Actor, CartItem, CatalogPart, ChangeKind, RepairJob, ReturnLine, DEFAULT_SUPPLIER};

/// A usable supplier reference; blank or missing becomes the sentinel.
pub fn supplier_or_default(supplier: Option<&str>) -> String {
    match supplier.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => DEFAULT_SUPPLIER.to_string(),
    }
}

fn add_quantity(current: u32, extra: u32, item_code: &str) -> EngineResult<u32> {
    current.checked_add(extra).ok_or_else(|| {
        EngineError::validation(format!("Quantity for part {} is too large", item_code))
    })
}

/// A line may only grow with stock from the supplier it was taken from.
fn ensure_same_supplier(line: &CartItem, supplier_name: &str) -> EngineResult<()> {
    if line.supplier_name.trim().is_empty() || line.supplier_name == supplier_name {
        return Ok(());
    }
    Err(EngineError::validation(format!(
        "Part {} is already in the cart from {}, not {}",
        line.item_code, line.supplier_name, supplier_name
    )))
}

/// Add `quantity` (at least one) of a catalog part to a selection, merging
/// with an existing line for the same code. Returns the line index.
pub fn add_or_increment(
    lines: &mut Vec<CartItem>,
    part: &CatalogPart,
    quantity: u32,
) -> EngineResult<usize> {
    let quantity = quantity.max(1);
    let line_cost = part
        .selling_price
        .max(Decimal::ZERO)
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(pricing::amount_too_large)?;
    let supplier_name = supplier_or_default(part.supplier_name.as_deref());

    if let Some(index) = lines.iter().position(|line| line.item_code == part.item_code) {
        let line = &mut lines[index];
        ensure_same_supplier(line, &supplier_name)?;
        line.quantity = add_quantity(line.quantity, quantity, &line.item_code)?;
        line.cost = pricing::checked_add(line.cost, line_cost)?;
        line.supplier_name = supplier_name;
        return Ok(index);
    }

    lines.push(CartItem {
        item_code: part.item_code.clone(),
        item_name: part.item_name.clone(),
        quantity,
        cost: line_cost,
        supplier_name,
    });
    Ok(lines.len() - 1)
}

/// Replace blank supplier references with the sentinel before submitting.
pub fn fill_default_suppliers(lines: &mut [CartItem]) {
    for line in lines {
        if line.supplier_name.trim().is_empty() {
            line.supplier_name = DEFAULT_SUPPLIER.to_string();
        }
    }
}

fn validate_selection(selection: &[CartItem]) -> EngineResult<()> {
    if selection.is_empty() {
        return Err(EngineError::validation("No parts selected"));
    }
    for line in selection {
        if line.item_code.trim().is_empty() {
            return Err(EngineError::validation("Part code is required"));
        }
        if line.quantity == 0 {
            return Err(EngineError::validation(format!(
                "Quantity for part {} must be at least 1",
                line.item_code
            )));
        }
        if line.cost < Decimal::ZERO {
            return Err(EngineError::validation(format!(
                "Cost for part {} cannot be negative",
                line.item_code
            )));
        }
        if line.supplier_name.trim().is_empty() {
            return Err(EngineError::validation(format!(
                "Supplier name is required for part {}; use '{}' when none is known",
                line.item_code, DEFAULT_SUPPLIER
            )));
        }
    }
    Ok(())
}

/// Merge a selection into the job's cart. The whole selection is rejected if
/// any line is unusable, including a repeat of a cart part under a different
/// supplier. Returns the stock to take from inventory.
pub fn merge_selection(
    job: &mut RepairJob,
    selection: Vec<CartItem>,
    actor: &Actor,
) -> EngineResult<Vec<StockMove>> {
    ensure_open(job)?;
    validate_selection(&selection)?;

    let moves = transact(job, |next| {
        let old = json!(next.cart);
        let mut moves = Vec::with_capacity(selection.len());
        for line in selection {
            moves.push(StockMove {
                item_code: line.item_code.clone(),
                supplier_name: line.supplier_name.clone(),
                quantity: line.quantity,
            });
            match next.cart.iter_mut().find(|item| item.item_code == line.item_code) {
                Some(existing) => {
                    ensure_same_supplier(existing, &line.supplier_name)?;
                    existing.quantity = add_quantity(existing.quantity, line.quantity, &line.item_code)?;
                    existing.cost = pricing::checked_add(existing.cost, line.cost)?;
                    existing.supplier_name = line.supplier_name;
                }
                None => next.cart.push(line),
            }
        }
        let new = json!(next.cart);
        audit::record_change(next, "cart", old, new, ChangeKind::Update, actor);
        Ok(moves)
    })?;

    info!(
        job_id = %job.id,
        lines = moves.len(),
        cart_total = %job.cart_total,
        actor = %actor,
        "Cart updated"
    );
    Ok(moves)
}

/// Take one unit off a line, dropping the line when it was the last unit.
pub fn decrement_line(job: &mut RepairJob, index: usize, actor: &Actor) -> EngineResult<()> {
    ensure_open(job)?;
    if index >= job.cart.len() {
        return Err(EngineError::NotFound(format!("No cart line at position {}", index)));
    }

    transact(job, |next| {
        let old = json!(next.cart[index]);
        let line = &mut next.cart[index];
        if line.quantity <= 1 {
            next.cart.remove(index);
            audit::record_change(next, "cart", old, serde_json::Value::Null, ChangeKind::Delete, actor);
        } else {
            let unit = line.unit_cost().round_dp(2);
            line.quantity -= 1;
            line.cost = (line.cost - unit).max(Decimal::ZERO);
            let new = json!(line);
            audit::record_change(next, "cart", old, new, ChangeKind::Update, actor);
        }
        Ok(())
    })?;

    debug!(job_id = %job.id, index, cart_total = %job.cart_total, "Cart line decremented");
    Ok(())
}

/// Client-side bound for a return request: negative becomes zero and
/// anything above the line's quantity becomes that quantity.
pub fn clamp_return_quantity(requested: i64, available: u32) -> u32 {
    requested.clamp(0, i64::from(available)) as u32
}

/// Move returned quantities out of the cart. Returns the stock to put back.
pub fn return_to_stock(
    job: &mut RepairJob,
    returns: &[ReturnLine],
    actor: &Actor,
) -> EngineResult<Vec<StockMove>> {
    let requested: Vec<&ReturnLine> = returns.iter().filter(|line| line.quantity > 0).collect();
    if requested.is_empty() {
        return Err(EngineError::validation("Select at least one part quantity to return"));
    }

    let moves = transact(job, |next| {
        let old = json!(next.cart);
        let mut moves = Vec::with_capacity(requested.len());
        for ret in requested {
            let index = next
                .cart
                .iter()
                .position(|item| item.item_code == ret.item_code)
                .ok_or_else(|| {
                    EngineError::NotFound(format!("Part {} is not in the cart", ret.item_code))
                })?;
            let line = &mut next.cart[index];
            if ret.quantity > line.quantity {
                return Err(EngineError::validation(format!(
                    "Cannot return {} of part {}: only {} in the cart",
                    ret.quantity, ret.item_code, line.quantity
                )));
            }

            // Stock goes back to the supplier it was taken from.
            let supplier_name = supplier_or_default(Some(&line.supplier_name));
            if !ret.supplier_name.trim().is_empty() && ret.supplier_name.trim() != supplier_name {
                return Err(EngineError::validation(format!(
                    "Part {} was taken from {}, not {}",
                    ret.item_code, supplier_name, ret.supplier_name
                )));
            }

            let refund = line
                .unit_cost()
                .checked_mul(Decimal::from(ret.quantity))
                .ok_or_else(pricing::amount_too_large)?
                .round_dp(2);
            line.quantity -= ret.quantity;
            line.cost = (line.cost - refund).max(Decimal::ZERO);

            moves.push(StockMove {
                item_code: ret.item_code.clone(),
                supplier_name,
                quantity: ret.quantity,
            });

            if line.quantity == 0 {
                next.cart.remove(index);
            }
        }
        let new = json!(next.cart);
        audit::record_change(next, "cart", old, new, ChangeKind::Update, actor);
        Ok(moves)
    })?;

    info!(
        job_id = %job.id,
        returned = moves.len(),
        cart_total = %job.cart_total,
        actor = %actor,
        "Parts returned to stock"
    );
    Ok(moves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::discounts::add_discount;
    use crate::handlers::test_support::{job_with_cart, line, sample_job};
    use crate::models::{DiscountEntry, RepairStatus};
    use rust_decimal_macros::dec;

    fn catalog(code: &str, price: Decimal, supplier: Option<&str>) -> CatalogPart {
        CatalogPart {
            item_code: code.into(),
            item_name: format!("Part {}", code),
            selling_price: price,
            supplier_name: supplier.map(String::from),
        }
    }

    fn ret(code: &str, quantity: u32) -> ReturnLine {
        ReturnLine {
            item_code: code.into(),
            quantity,
            supplier_name: String::new(),
        }
    }

    #[test]
    fn add_or_increment_merges_by_code() {
        let mut lines = Vec::new();
        let part = catalog("RAM-8", dec!(4500), None);

        assert_eq!(add_or_increment(&mut lines, &part, 1).unwrap(), 0);
        assert_eq!(add_or_increment(&mut lines, &part, 2).unwrap(), 0);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(lines[0].cost, dec!(13500));
        assert_eq!(lines[0].supplier_name, DEFAULT_SUPPLIER);
    }

    #[test]
    fn add_or_increment_repairs_blank_supplier() {
        let mut lines = vec![line("SSD-1", 1, 9000)];
        lines[0].supplier_name.clear();
        add_or_increment(&mut lines, &catalog("SSD-1", dec!(9000), Some("Tech Hub")), 0).unwrap();
        assert_eq!(lines[0].quantity, 2);
        assert_eq!(lines[0].supplier_name, "Tech Hub");
    }

    #[test]
    fn merge_selection_updates_totals_and_moves() {
        let mut job = sample_job();
        let before = job.change_history.len();
        let moves = merge_selection(&mut job, vec![line("SCR-01", 2, 1000)], &Actor::default()).unwrap();

        assert_eq!(job.cart_total, dec!(1000));
        assert_eq!(job.total_repair_cost, dec!(1500));
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].quantity, 2);
        assert_eq!(job.change_history.len(), before + 1);

        merge_selection(&mut job, vec![line("SCR-01", 1, 500)], &Actor::default()).unwrap();
        assert_eq!(job.cart.len(), 1);
        assert_eq!(job.cart[0].quantity, 3);
        assert_eq!(job.cart_total, dec!(1500));
    }

    #[test]
    fn blank_supplier_fails_whole_selection() {
        let mut job = sample_job();
        let mut blank = line("BAT-2", 1, 300);
        blank.supplier_name = "  ".into();

        let err = merge_selection(&mut job, vec![line("SCR-01", 1, 500), blank.clone()], &Actor::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(job.cart.is_empty());

        let mut fixed = vec![blank];
        fill_default_suppliers(&mut fixed);
        assert!(merge_selection(&mut job, fixed, &Actor::default()).is_ok());
        assert_eq!(job.cart[0].supplier_name, DEFAULT_SUPPLIER);
    }

    #[test]
    fn decrement_reduces_then_removes() {
        let mut job = job_with_cart();
        decrement_line(&mut job, 0, &Actor::default()).unwrap();
        assert_eq!(job.cart[0].quantity, 1);
        assert_eq!(job.cart[0].cost, dec!(500));
        assert_eq!(job.cart_total, dec!(500));

        decrement_line(&mut job, 0, &Actor::default()).unwrap();
        assert!(job.cart.is_empty());
        assert_eq!(job.cart_total, Decimal::ZERO);
        assert_eq!(job.change_history.last().unwrap().change_type, ChangeKind::Delete);

        assert!(matches!(
            decrement_line(&mut job, 0, &Actor::default()),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn return_half_of_line_halves_cost() {
        let mut job = job_with_cart();
        let moves = return_to_stock(&mut job, &[ret("SCR-01", 1)], &Actor::default()).unwrap();

        assert_eq!(job.cart[0].quantity, 1);
        assert_eq!(job.cart[0].cost, dec!(500));
        assert_eq!(job.cart_total, dec!(500));
        assert_eq!(moves[0].supplier_name, "Acme Parts");
    }

    #[test]
    fn returning_everything_removes_line() {
        let mut job = job_with_cart();
        return_to_stock(&mut job, &[ret("SCR-01", 2)], &Actor::default()).unwrap();
        assert!(job.cart.is_empty());
    }

    #[test]
    fn over_return_and_empty_return_are_rejected() {
        let mut job = job_with_cart();
        let snapshot = job.clone();
        assert!(matches!(
            return_to_stock(&mut job, &[ret("SCR-01", 3)], &Actor::default()),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            return_to_stock(&mut job, &[ret("SCR-01", 0)], &Actor::default()),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            return_to_stock(&mut job, &[ret("NOPE", 1)], &Actor::default()),
            Err(EngineError::NotFound(_))
        ));
        assert_eq!(job, snapshot);
    }

    #[test]
    fn return_that_would_undercut_discounts_is_rejected() {
        let mut job = job_with_cart();
        add_discount(
            &mut job,
            DiscountEntry {
                discount_name: "Promo".into(),
                discount_amount: dec!(1200),
                description: None,
            },
            &Actor::default(),
        )
        .unwrap();
        assert!(matches!(
            return_to_stock(&mut job, &[ret("SCR-01", 2)], &Actor::default()),
            Err(EngineError::DiscountExceedsBase { .. })
        ));
        assert_eq!(job.cart[0].quantity, 2);
    }

    #[test]
    fn clamp_bounds_requests() {
        assert_eq!(clamp_return_quantity(-4, 3), 0);
        assert_eq!(clamp_return_quantity(2, 3), 2);
        assert_eq!(clamp_return_quantity(9, 3), 3);
    }

    #[test]
    fn cancelled_jobs_reject_cart_changes() {
        let mut job = job_with_cart();
        job.status = RepairStatus::Cancelled;
        assert!(merge_selection(&mut job, vec![line("X", 1, 1)], &Actor::default()).is_err());
        assert!(decrement_line(&mut job, 0, &Actor::default()).is_err());
        assert!(return_to_stock(&mut job, &[ret("SCR-01", 1)], &Actor::default()).is_ok());
    }

    #[test]
    fn add_or_increment_keeps_one_supplier_per_line() {
        let mut lines = Vec::new();
        add_or_increment(&mut lines, &catalog("SCR-01", dec!(500), Some("Acme Parts")), 1).unwrap();
        let err = add_or_increment(&mut lines, &catalog("SCR-01", dec!(450), Some("Other Supplier")), 1)
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(lines[0].quantity, 1);
        assert_eq!(lines[0].supplier_name, "Acme Parts");
    }

    #[test]
    fn stock_returns_to_the_supplier_it_came_from() {
        let mut job = sample_job();
        let mut other = line("SCR-01", 1, 500);
        other.supplier_name = "Other Supplier".into();

        let taken = merge_selection(&mut job, vec![line("SCR-01", 1, 500)], &Actor::default()).unwrap();
        assert_eq!(taken[0].supplier_name, "Acme Parts");

        let snapshot = job.clone();
        let err = merge_selection(&mut job, vec![other], &Actor::default()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(job, snapshot);

        merge_selection(&mut job, vec![line("SCR-01", 1, 500)], &Actor::default()).unwrap();
        let restocked = return_to_stock(&mut job, &[ret("SCR-01", 2)], &Actor::default()).unwrap();
        assert_eq!(restocked[0].supplier_name, "Acme Parts");
        assert_eq!(restocked[0].quantity, 2);
    }

    #[test]
    fn return_naming_another_supplier_is_rejected() {
        let mut job = job_with_cart();
        let mut wrong = ret("SCR-01", 1);
        wrong.supplier_name = "Other Supplier".into();
        assert!(matches!(
            return_to_stock(&mut job, &[wrong], &Actor::default()),
            Err(EngineError::Validation(_))
        ));
        assert_eq!(job.cart[0].quantity, 2);
    }

    #[test]
    fn oversized_amounts_fail_without_panicking() {
        let mut job = sample_job();
        let huge = Decimal::from_i128_with_scale(50_000_000_000_000_000_000_000_000_000, 0);
        let mut first = line("SCR-01", 1, 0);
        first.cost = huge;
        let second = first.clone();

        let err = merge_selection(&mut job, vec![first, second], &Actor::default()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(ref message) if message == "Amount too large"));
        assert!(job.cart.is_empty());

        let mut job = job_with_cart();
        job.cart[0].quantity = u32::MAX;
        let err = merge_selection(&mut job, vec![line("SCR-01", 1, 500)], &Actor::default()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let mut lines = Vec::new();
        assert!(add_or_increment(&mut lines, &catalog("BIG", Decimal::MAX, None), 2).is_err());
        assert!(lines.is_empty());
    }
}
