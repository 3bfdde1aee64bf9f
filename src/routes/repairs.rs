//! Repair job routes.
//!
//! POST   /repairs                       - Create a job
//! GET    /repairs                       - List jobs
//! GET    /repairs/{id}                  - Retrieve a job
//! PATCH  /repairs/{id}                  - Update fields, discounts or status (PUT accepted too)
//! DELETE /repairs/{id}                  - Delete a job and its history (admin only)
//! PATCH  /repairs/update-cart/{id}      - Merge selected parts into the cart
//! PATCH  /repairs/decrement-cart/{id}   - Take one unit off a cart line
//! PATCH  /repairs/return-cart/{id}      - Return parts to inventory
//! PATCH  /repairs/add-service/{id}      - Add an additional service
//! PATCH  /repairs/pay-service/{id}      - Mark an additional service paid
//!
//! Every mutation loads the job, applies one engine operation, and saves the
//! result. Cart operations reach the inventory only after the engine has
//! accepted the change, and the job is saved only after inventory succeeds.

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::{ACTOR_HEADER, ACTOR_ROLE_HEADER};
use crate::db::AppDb;
use crate::error::{EngineError, EngineResult};
use crate::handlers::{additional_services, cart, job};
use crate::inventory::AppInventory;
use crate::models::{
    Actor, AddServiceRequest, ApiResponse, CreateRepairRequest, DecrementCartRequest,
    PayServiceRequest, RepairJob, ReturnCartRequest, UpdateCartRequest, UpdateRepairRequest,
};

type JobResponse = Json<ApiResponse<RepairJob>>;

/// Build the repairs router.
pub fn router() -> Router {
    Router::new()
        .route("/repairs", post(create_job).get(list_jobs))
        .route(
            "/repairs/{id}",
            get(get_job).patch(update_job).put(update_job).delete(delete_job),
        )
        .route("/repairs/update-cart/{id}", patch(update_cart))
        .route("/repairs/decrement-cart/{id}", patch(decrement_cart))
        .route("/repairs/return-cart/{id}", patch(return_cart))
        .route("/repairs/add-service/{id}", patch(add_service))
        .route("/repairs/pay-service/{id}", patch(pay_service))
}

fn respond(job: RepairJob, message: &str) -> JobResponse {
    Json(ApiResponse {
        data: job,
        message: message.to_string(),
    })
}

async fn load(store: &AppDb, id: Uuid) -> EngineResult<RepairJob> {
    store
        .get(id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("Repair job {} not found", id)))
}

async fn create_job(
    Extension(store): Extension<AppDb>,
    Json(req): Json<CreateRepairRequest>,
) -> Result<(StatusCode, JobResponse), EngineError> {
    let actor = Actor::from_option(req.changed_by.as_deref());
    let job_number = store.next_job_number().await?;
    let job = job::create_job(req, Uuid::new_v4(), job_number, Utc::now(), &actor)?;
    store.insert(&job).await?;

    Ok((StatusCode::CREATED, respond(job, "Repair job created")))
}

async fn list_jobs(
    Extension(store): Extension<AppDb>,
) -> Result<Json<ApiResponse<Vec<RepairJob>>>, EngineError> {
    let jobs = store.list().await?;
    Ok(Json(ApiResponse {
        message: format!("{} repair job(s)", jobs.len()),
        data: jobs,
    }))
}

async fn get_job(
    Extension(store): Extension<AppDb>,
    Path(id): Path<Uuid>,
) -> Result<JobResponse, EngineError> {
    let job = load(&store, id).await?;
    Ok(respond(job, "Repair job retrieved"))
}

async fn update_job(
    Extension(store): Extension<AppDb>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRepairRequest>,
) -> Result<JobResponse, EngineError> {
    let actor = Actor::from_option(req.changed_by.as_deref());
    let mut job = load(&store, id).await?;
    job::apply_update(&mut job, req, &actor)?;
    store.save(&job).await?;

    Ok(respond(job, "Repair job updated"))
}

async fn delete_job(
    Extension(store): Extension<AppDb>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<StatusCode, EngineError> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let actor = Actor::from_option(header(ACTOR_HEADER));
    let is_admin = header(ACTOR_ROLE_HEADER)
        .map(|role| role.trim().eq_ignore_ascii_case("admin"))
        .unwrap_or(false);

    if !is_admin {
        warn!(job_id = %id, actor = %actor, "Non-admin delete refused");
        return Err(EngineError::Forbidden(
            "Only administrators can delete repair jobs".to_string(),
        ));
    }

    if !store.delete(id).await? {
        return Err(EngineError::NotFound(format!("Repair job {} not found", id)));
    }
    info!(job_id = %id, actor = %actor, "Repair job deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn update_cart(
    Extension(store): Extension<AppDb>,
    Extension(inventory): Extension<AppInventory>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCartRequest>,
) -> Result<JobResponse, EngineError> {
    let actor = Actor::from_option(req.changed_by.as_deref());
    let mut job = load(&store, id).await?;
    let moves = cart::merge_selection(&mut job, req.selected_products, &actor)?;
    inventory.take(&moves).await?;
    store.save(&job).await?;

    Ok(respond(job, "Cart updated"))
}

async fn decrement_cart(
    Extension(store): Extension<AppDb>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecrementCartRequest>,
) -> Result<JobResponse, EngineError> {
    let actor = Actor::from_option(req.changed_by.as_deref());
    let mut job = load(&store, id).await?;
    cart::decrement_line(&mut job, req.index, &actor)?;
    store.save(&job).await?;

    Ok(respond(job, "Cart line decremented"))
}

async fn return_cart(
    Extension(store): Extension<AppDb>,
    Extension(inventory): Extension<AppInventory>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReturnCartRequest>,
) -> Result<JobResponse, EngineError> {
    let actor = Actor::from_option(req.changed_by.as_deref());
    let mut job = load(&store, id).await?;
    let moves = cart::return_to_stock(&mut job, &req.return_products, &actor)?;
    inventory.restock(&moves).await?;
    store.save(&job).await?;

    Ok(respond(job, "Parts returned to stock"))
}

async fn add_service(
    Extension(store): Extension<AppDb>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddServiceRequest>,
) -> Result<JobResponse, EngineError> {
    let actor = Actor::from_option(req.changed_by.as_deref());
    let mut job = load(&store, id).await?;
    additional_services::add_service(&mut job, req.additional_service, &actor)?;
    store.save(&job).await?;

    Ok(respond(job, "Additional service added"))
}

async fn pay_service(
    Extension(store): Extension<AppDb>,
    Path(id): Path<Uuid>,
    Json(req): Json<PayServiceRequest>,
) -> Result<JobResponse, EngineError> {
    let actor = Actor::from_option(req.changed_by.as_deref());
    let mut job = load(&store, id).await?;
    if !additional_services::mark_paid(&mut job, req.service_index, &actor)? {
        return Ok(respond(job, "Additional service already paid"));
    }
    store.save(&job).await?;

    Ok(respond(job, "Additional service marked paid"))
}
