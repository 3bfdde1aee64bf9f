//! Typed client for the job-records API.
//!
//! Callers keep no optimistic state: every method returns the record exactly
//! as the server answered, and callers replace their local view with it.
//! Requests are validated locally first so that avoidable failures never
//! reach the wire (blank suppliers get the sentinel, service amounts must be
//! positive, return quantities are clamped, discounts are checked against the
//! base total).

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config;
use crate::error::{EngineError, EngineResult};
use crate::handlers::{additional_services, cart, discounts, status};
use crate::models::{
    Actor, AddServiceRequest, ApiResponse, CartItem, CatalogPart, CreateRepairRequest,
    DecrementCartRequest, DiscountEntry, ErrorBody, NewService, PayServiceRequest, RepairJob,
    RepairStatus, ReturnCartRequest, ReturnLine, UpdateCartRequest, UpdateRepairRequest,
};

/// Header carrying the caller's role for admin-only operations.
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
/// Header carrying the caller's identity where there is no body.
pub const ACTOR_HEADER: &str = "x-actor";

#[derive(Clone)]
pub struct RepairsClient {
    client: Client,
    base_url: String,
}

impl RepairsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(config::repairs_api_url())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send and unwrap the `ApiResponse` envelope. Non-2xx answers surface
    /// the server's `message` verbatim.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> EngineResult<T> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            let body: ApiResponse<T> = response.json().await?;
            return Ok(body.data);
        }
        Err(remote_error(status, response.text().await.unwrap_or_default()))
    }

    async fn patch<B: Serialize>(&self, path: &str, body: &B) -> EngineResult<RepairJob> {
        self.send(self.client.patch(self.url(path)).json(body)).await
    }

    pub async fn create(&self, req: &CreateRepairRequest) -> EngineResult<RepairJob> {
        self.send(self.client.post(self.url("/repairs")).json(req)).await
    }

    pub async fn get(&self, id: Uuid) -> EngineResult<RepairJob> {
        self.send(self.client.get(self.url(&format!("/repairs/{}", id)))).await
    }

    pub async fn list(&self) -> EngineResult<Vec<RepairJob>> {
        self.send(self.client.get(self.url("/repairs"))).await
    }

    /// PATCH a partial update, retrying once with PUT if the endpoint answers
    /// 404 or 405.
    pub async fn update(&self, id: Uuid, req: &UpdateRepairRequest) -> EngineResult<RepairJob> {
        let url = self.url(&format!("/repairs/{}", id));
        match self.send(self.client.request(Method::PATCH, &url).json(req)).await {
            Err(EngineError::Remote { status, message })
                if status == StatusCode::NOT_FOUND.as_u16()
                    || status == StatusCode::METHOD_NOT_ALLOWED.as_u16() =>
            {
                warn!(job_id = %id, status, %message, "PATCH rejected, retrying with PUT");
                self.send(self.client.request(Method::PUT, &url).json(req)).await
            }
            other => other,
        }
    }

    pub async fn add_discount(
        &self,
        job: &RepairJob,
        entry: DiscountEntry,
        actor: &Actor,
    ) -> EngineResult<RepairJob> {
        let mut draft = job.clone();
        discounts::add_discount(&mut draft, entry, actor)?;
        self.send_discounts(job.id, draft.discounts, actor).await
    }

    pub async fn remove_discount(
        &self,
        job: &RepairJob,
        index: usize,
        actor: &Actor,
    ) -> EngineResult<RepairJob> {
        let mut draft = job.clone();
        discounts::remove_discount(&mut draft, index, actor)?;
        self.send_discounts(job.id, draft.discounts, actor).await
    }

    async fn send_discounts(
        &self,
        id: Uuid,
        entries: Vec<DiscountEntry>,
        actor: &Actor,
    ) -> EngineResult<RepairJob> {
        let req = UpdateRepairRequest {
            discounts: Some(entries),
            changed_by: Some(actor.to_string()),
            ..Default::default()
        };
        self.update(id, &req).await
    }

    /// Change status. Completing with unpaid services fails locally with
    /// `ConfirmationRequired` unless `confirmed` is set.
    pub async fn set_status(
        &self,
        job: &RepairJob,
        to: RepairStatus,
        confirmed: bool,
        actor: &Actor,
    ) -> EngineResult<RepairJob> {
        let check = status::check_transition(job, to)?;
        if check.needs_confirmation() && !confirmed {
            return Err(EngineError::ConfirmationRequired {
                count: check.unpaid_services,
                unpaid: check.unpaid_amount,
            });
        }
        let req = UpdateRepairRequest {
            repair_status: Some(to),
            confirm_unpaid: confirmed,
            changed_by: Some(actor.to_string()),
            ..Default::default()
        };
        self.update(job.id, &req).await
    }

    /// Commit a part selection. Blank suppliers are replaced with the
    /// sentinel before the request is built.
    pub async fn update_cart(
        &self,
        id: Uuid,
        mut selection: Vec<CartItem>,
        actor: &Actor,
    ) -> EngineResult<RepairJob> {
        if selection.is_empty() {
            return Err(EngineError::validation("No parts selected"));
        }
        cart::fill_default_suppliers(&mut selection);
        let body = UpdateCartRequest {
            selected_products: selection,
            changed_by: Some(actor.to_string()),
        };
        self.patch(&format!("/repairs/update-cart/{}", id), &body).await
    }

    /// Build a selection from catalog picks and commit it. Repeated codes are
    /// merged into one line before the request is sent.
    pub async fn add_parts(
        &self,
        id: Uuid,
        picks: &[(CatalogPart, u32)],
        actor: &Actor,
    ) -> EngineResult<RepairJob> {
        let mut selection = Vec::with_capacity(picks.len());
        for (part, quantity) in picks {
            cart::add_or_increment(&mut selection, part, *quantity)?;
        }
        self.update_cart(id, selection, actor).await
    }

    pub async fn decrement_line(&self, id: Uuid, index: usize, actor: &Actor) -> EngineResult<RepairJob> {
        let body = DecrementCartRequest {
            index,
            changed_by: Some(actor.to_string()),
        };
        self.patch(&format!("/repairs/decrement-cart/{}", id), &body).await
    }

    /// Return parts to stock. `requests` pairs a cart line index with the
    /// quantity typed by the user; each is clamped to the line's quantity.
    pub async fn return_parts(
        &self,
        job: &RepairJob,
        requests: &[(usize, i64)],
        actor: &Actor,
    ) -> EngineResult<RepairJob> {
        let mut lines = Vec::new();
        for &(index, requested) in requests {
            let item = job
                .cart
                .get(index)
                .ok_or_else(|| EngineError::NotFound(format!("No cart line at position {}", index)))?;
            let quantity = cart::clamp_return_quantity(requested, item.quantity);
            if quantity > 0 {
                lines.push(ReturnLine {
                    item_code: item.item_code.clone(),
                    quantity,
                    supplier_name: cart::supplier_or_default(Some(&item.supplier_name)),
                });
            }
        }
        if lines.is_empty() {
            return Err(EngineError::validation("Select at least one part quantity to return"));
        }

        let body = ReturnCartRequest {
            return_products: lines,
            changed_by: Some(actor.to_string()),
        };
        self.patch(&format!("/repairs/return-cart/{}", job.id), &body).await
    }

    pub async fn add_service(
        &self,
        id: Uuid,
        name: &str,
        amount: Decimal,
        description: Option<String>,
        actor: &Actor,
    ) -> EngineResult<RepairJob> {
        let service = NewService {
            service_name: name.trim().to_string(),
            service_amount: amount,
            description,
        };
        additional_services::validate_new_service(&service)?;
        let body = AddServiceRequest {
            additional_service: service,
            changed_by: Some(actor.to_string()),
        };
        self.patch(&format!("/repairs/add-service/{}", id), &body).await
    }

    pub async fn pay_service(&self, id: Uuid, index: usize, actor: &Actor) -> EngineResult<RepairJob> {
        let body = PayServiceRequest {
            service_index: index,
            changed_by: Some(actor.to_string()),
        };
        self.patch(&format!("/repairs/pay-service/{}", id), &body).await
    }

    /// Delete a job outright. The server only honours this for admins.
    pub async fn delete(&self, id: Uuid, actor: &Actor, role: &str) -> EngineResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("/repairs/{}", id)))
            .header(ACTOR_HEADER, actor.as_str())
            .header(ACTOR_ROLE_HEADER, role)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            debug!(job_id = %id, "Repair job deleted");
            return Ok(());
        }
        Err(remote_error(status, response.text().await.unwrap_or_default()))
    }
}

fn remote_error(status: StatusCode, body: String) -> EngineError {
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => parsed.message,
        Err(_) if !body.trim().is_empty() => body,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string(),
    };
    EngineError::Remote {
        status: status.as_u16(),
        message,
    }
}
