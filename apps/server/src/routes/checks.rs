use actix_web::{HttpResponse, post, web};
use pulse_service::{ForceScope, UptimeService};
use uuid::Uuid;

use crate::error::ApiError;

/// Check one target now. Answers with the settlements, empty when the target
/// was already being probed.
#[post("/targets/{id}/check")]
pub async fn check_target(service: web::Data<UptimeService>, id: web::Path<Uuid>) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    if service.get_target(id).await?.is_none() {
        return Err(ApiError::TargetNotFound(id));
    }
    Ok(HttpResponse::Ok().json(service.force_check_now(ForceScope::Target(id)).await?))
}

#[post("/check")]
pub async fn check_all(service: web::Data<UptimeService>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.force_check_now(ForceScope::All).await?))
}
