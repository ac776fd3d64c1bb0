use actix_web::{HttpResponse, delete, get, patch, post, web};
use pulse_service::{TargetUpdate, UptimeService};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct NewTarget {
    pub name: String,
    pub url: String,
    pub interval_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct UptimeReport {
    pub target_id: Uuid,
    pub window_days: u32,
    /// `null` while the window holds no checks
    pub uptime: Option<f64>,
}

const DEFAULT_HISTORY_DAYS: u32 = 30;

#[get("/targets")]
pub async fn list_targets(service: web::Data<UptimeService>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.list_targets().await?))
}

#[post("/targets")]
pub async fn create_target(
    service: web::Data<UptimeService>,
    body: web::Json<NewTarget>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let interval = body.interval_minutes.unwrap_or(service.settings().default_interval_minutes);
    let target = service.add_target(&body.name, &body.url, interval).await?;
    Ok(HttpResponse::Created().json(target))
}

#[get("/targets/{id}")]
pub async fn get_target(service: web::Data<UptimeService>, id: web::Path<Uuid>) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let target = service.get_target(id).await?.ok_or(ApiError::TargetNotFound(id))?;
    Ok(HttpResponse::Ok().json(target))
}

#[patch("/targets/{id}")]
pub async fn update_target(
    service: web::Data<UptimeService>,
    id: web::Path<Uuid>,
    body: web::Json<TargetUpdate>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let target = service.update_target(id, body.into_inner()).await?.ok_or(ApiError::TargetNotFound(id))?;
    Ok(HttpResponse::Ok().json(target))
}

#[delete("/targets/{id}")]
pub async fn delete_target(service: web::Data<UptimeService>, id: web::Path<Uuid>) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    if !service.remove_target(id).await? {
        return Err(ApiError::TargetNotFound(id));
    }
    Ok(HttpResponse::NoContent().finish())
}

#[get("/targets/{id}/uptime")]
pub async fn target_uptime(
    service: web::Data<UptimeService>,
    id: web::Path<Uuid>,
    query: web::Query<DaysQuery>,
) -> Result<HttpResponse, ApiError> {
    let target_id = id.into_inner();
    let window_days = query.days.unwrap_or(service.settings().uptime_window_days);
    let uptime = service.get_uptime_over(target_id, window_days).await?;
    Ok(HttpResponse::Ok().json(UptimeReport { target_id, window_days, uptime }))
}

#[get("/targets/{id}/history")]
pub async fn target_history(
    service: web::Data<UptimeService>,
    id: web::Path<Uuid>,
    query: web::Query<DaysQuery>,
) -> Result<HttpResponse, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    Ok(HttpResponse::Ok().json(service.daily_history(id.into_inner(), days).await?))
}
