use std::sync::Arc;

use actix_web::{web, HttpResponse};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::error::ApiError;
use crate::models::*;
use crate::repo::FeedbackStore;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()))
        .app_data(web::PathConfig::default().error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()))
        .app_data(web::QueryConfig::default().error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()))
        .service(
            web::resource("/feedback")
                .route(web::post().to(create_feedback)),
        )
        .service(
            web::resource("/feedback/{id}")
                .route(web::get().to(get_feedback))
                .route(web::patch().to(update_feedback))
                .route(web::delete().to(delete_feedback)),
        )
        .service(web::resource("/feedback/{id}/restore").route(web::post().to(restore_feedback)))
        .service(web::resource("/feedbacks").route(web::get().to(list_feedbacks)))
        .service(web::resource("/stats/{user_id}").route(web::get().to(get_stats)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/metrics").route(web::get().to(render_metrics)));
}

/// Shared handler state. The store is injected once at startup.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn FeedbackStore>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(store: Arc<dyn FeedbackStore>) -> Self {
        Self { store, metrics: None }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

#[utoipa::path(
    get,
    path = "/feedback/{id}",
    params(("id" = i64, Path, description = "Feedback id")),
    responses(
        (status = 200, description = "Feedback", body = Feedback),
        (status = 404, description = "Feedback not found or deleted")
    )
)]
pub async fn get_feedback(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let feedback = data.store.find_by_id(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(feedback))
}

#[utoipa::path(
    get,
    path = "/feedbacks",
    params(FeedbackQuery),
    responses(
        (status = 200, description = "Page of feedbacks, latest first", body = FeedbackResponse),
        (status = 400, description = "Unparsable query")
    )
)]
pub async fn list_feedbacks(data: web::Data<AppState>, query: web::Query<FeedbackQuery>) -> Result<HttpResponse, ApiError> {
    let filter = FeedbackFilter::from(query.into_inner());
    let page = data.store.find(&filter).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/feedback",
    request_body = FeedbackRequest,
    responses(
        (status = 201, description = "Feedback created", body = Feedback),
        (status = 400, description = "Validation failed")
    )
)]
pub async fn create_feedback(data: web::Data<AppState>, payload: web::Json<FeedbackRequest>) -> Result<HttpResponse, ApiError> {
    let id = data.store.create(payload.into_inner()).await?;
    let feedback = data.store.find_by_id(id).await?;
    Ok(HttpResponse::Created().json(feedback))
}

#[utoipa::path(
    patch,
    path = "/feedback/{id}",
    request_body = UpdateRequest,
    params(("id" = i64, Path, description = "Feedback id")),
    responses(
        (status = 204, description = "Feedback updated"),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Feedback not found or deleted")
    )
)]
pub async fn update_feedback(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateRequest>,
) -> Result<HttpResponse, ApiError> {
    data.store.update(&FeedbackSelector::Id(path.into_inner()), payload.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    delete,
    path = "/feedback/{id}",
    params(("id" = i64, Path, description = "Feedback id")),
    responses(
        (status = 204, description = "Feedback soft-deleted"),
        (status = 404, description = "Feedback not found or already deleted")
    )
)]
pub async fn delete_feedback(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    data.store.delete(&FeedbackSelector::Id(path.into_inner())).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/feedback/{id}/restore",
    params(("id" = i64, Path, description = "Feedback id")),
    responses(
        (status = 204, description = "Feedback restored"),
        (status = 404, description = "No deleted feedback with this id")
    )
)]
pub async fn restore_feedback(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    data.store.restore(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/stats/{user_id}",
    params(("user_id" = i64, Path, description = "Receiver id")),
    responses(
        (status = 200, description = "Positive / negative totals", body = FeedbackStats),
        (status = 404, description = "User never received feedback")
    )
)]
pub async fn get_stats(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let stats = data.store.stats(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(stats))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

pub async fn render_metrics(data: web::Data<AppState>) -> HttpResponse {
    let body = data.metrics.as_ref().map(PrometheusHandle::render).unwrap_or_default();
    HttpResponse::Ok().content_type("text/plain; version=0.0.4").body(body)
}
