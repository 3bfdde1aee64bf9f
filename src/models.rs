//! Domain models for the repair desk.
//!
//! `RepairJob` is the aggregate root. Its derived monetary fields are owned by
//! [`crate::handlers::pricing`] and are never written anywhere else. Wire
//! names are camelCase to match the job-records API.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::handlers::pricing::{self, Totals};

/// Supplier reference used when a catalog entry carries none.
pub const DEFAULT_SUPPLIER: &str = "Default Supplier";

/// Actor recorded when the caller supplies no identity.
pub const SYSTEM_ACTOR: &str = "System";

// ============================================================================
// Actor
// ============================================================================

/// Identity of whoever issued a mutation. Supplied by the caller; never read
/// from ambient session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.trim().is_empty() {
            Self::default()
        } else {
            Self(name)
        }
    }

    /// Blank or missing identities collapse to the system actor.
    pub fn from_option(name: Option<&str>) -> Self {
        name.map(Self::new).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Actor {
    fn default() -> Self {
        Self(SYSTEM_ACTOR.to_string())
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Enumerations
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerType {
    #[default]
    New,
    Existing,
    Corporate,
    #[serde(rename = "VIP")]
    Vip,
}

/// Lifecycle status of a repair job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepairStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl fmt::Display for RepairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RepairStatus::Pending => "Pending",
            RepairStatus::InProgress => "InProgress",
            RepairStatus::Completed => "Completed",
            RepairStatus::Cancelled => "Cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

// ============================================================================
// Aggregate and value types
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(default)]
    pub customer_type: CustomerType,
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Older records stored this as `itemName`.
    #[serde(alias = "itemName")]
    pub device_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    pub issue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A part consumed by a job. `cost` is the line total, not the unit price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub item_code: String,
    pub item_name: String,
    pub quantity: u32,
    pub cost: Decimal,
    #[serde(default)]
    pub supplier_name: String,
}

impl CartItem {
    pub fn unit_cost(&self) -> Decimal {
        if self.quantity == 0 {
            self.cost
        } else {
            self.cost / Decimal::from(self.quantity)
        }
    }
}

/// An entry from the external inventory catalog, as offered to the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPart {
    pub item_code: String,
    pub item_name: String,
    pub selling_price: Decimal,
    #[serde(default)]
    pub supplier_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountEntry {
    pub discount_name: String,
    pub discount_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalService {
    pub service_name: String,
    pub service_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_paid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeHistoryEntry {
    pub changed_at: DateTime<Utc>,
    pub changed_by: Actor,
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
    pub change_type: ChangeKind,
}

/// A device repair job and everything that has been charged against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairJob {
    pub id: Uuid,
    pub job_number: String,
    pub customer: Customer,
    pub device: Device,

    #[serde(default)]
    pub checking_charge: Decimal,
    #[serde(default)]
    pub estimation_value: Decimal,
    #[serde(default)]
    pub repair_cost: Decimal,

    #[serde(default)]
    pub cart_total: Decimal,
    #[serde(default)]
    pub total_discount_amount: Decimal,
    #[serde(default)]
    pub total_repair_cost: Decimal,
    #[serde(default)]
    pub total_additional_services_amount: Decimal,
    #[serde(default)]
    pub final_amount: Decimal,

    #[serde(rename = "repairStatus", default)]
    pub status: RepairStatus,
    #[serde(default)]
    pub cart: Vec<CartItem>,
    #[serde(default)]
    pub discounts: Vec<DiscountEntry>,
    #[serde(default)]
    pub additional_services: Vec<AdditionalService>,
    #[serde(default)]
    pub change_history: Vec<ChangeHistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technician_review: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RepairJob {
    /// Derive totals from the current sub-state without touching the record.
    pub fn totals(&self) -> EngineResult<Totals> {
        pricing::compute(
            &self.cart,
            &self.discounts,
            &self.additional_services,
            self.repair_cost,
            self.status,
        )
    }

    /// Amount still due, given the current status. Not stored.
    pub fn amount_owed(&self) -> Decimal {
        if self.status == RepairStatus::Completed {
            self.total_additional_services_amount
        } else {
            self.final_amount
        }
    }

    pub(crate) fn apply_totals(&mut self, totals: &Totals) {
        self.cart_total = totals.cart_total;
        self.total_discount_amount = totals.total_discount_amount;
        self.total_repair_cost = totals.total_repair_cost;
        self.total_additional_services_amount = totals.total_additional_services_amount;
        self.final_amount = totals.final_amount;
    }

    /// Bring a record loaded from storage into canonical shape: stored
    /// derived totals are replaced by freshly computed ones and blank supplier
    /// references get the sentinel.
    pub fn normalize(mut self) -> Self {
        for item in &mut self.cart {
            if item.supplier_name.trim().is_empty() {
                item.supplier_name = DEFAULT_SUPPLIER.to_string();
            }
        }
        // Stored totals are kept when the amounts no longer sum.
        if let Ok(totals) = self.totals() {
            self.apply_totals(&totals);
        }
        self
    }
}

// ============================================================================
// Request Models
// ============================================================================

/// Request body for `POST /repairs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRepairRequest {
    pub customer: Customer,
    pub device: Device,
    #[serde(default)]
    pub checking_charge: Decimal,
    #[serde(default)]
    pub estimation_value: Decimal,
    #[serde(default)]
    pub repair_cost: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technician_review: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_by: Option<String>,
}

/// Partial field set for `PATCH /repairs/{id}`. Absent fields are untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRepairRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair_status: Option<RepairStatus>,
    /// Acknowledges completing a job with unpaid additional services.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub confirm_unpaid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discounts: Option<Vec<DiscountEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair_cost: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checking_charge: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimation_value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technician_review: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCartRequest {
    pub selected_products: Vec<CartItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnLine {
    pub item_code: String,
    pub quantity: u32,
    #[serde(default)]
    pub supplier_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnCartRequest {
    pub return_products: Vec<ReturnLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecrementCartRequest {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewService {
    pub service_name: String,
    pub service_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddServiceRequest {
    pub additional_service: NewService,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayServiceRequest {
    pub service_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_by: Option<String>,
}

// ============================================================================
// Response Models
// ============================================================================

/// Generic API response wrapper.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
    pub message: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}
