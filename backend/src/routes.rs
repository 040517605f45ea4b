use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures::future::BoxFuture;
use log::{error, info, warn};
use serde_json::json;
use shared::{CropAdviceRequest, CropAdviceResponse};
use std::path::PathBuf;
use std::time::Duration;

use crate::api_error::ApiError;
use crate::inference::InferenceError;
use crate::intake::upload::{DetectUpload, read_upload};
use crate::state::AppState;
use crate::storage::detection_store::{DetectionStore, NewDetection, image_reference};

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: Option<PathBuf>) {
    cfg.service(web::resource("/api/detect-pest").route(web::post().to(detect_pest)))
        .service(web::resource("/api/detections/{user_id}").route(web::get().to(list_detections)))
        .service(web::resource("/api/crop-advice").route(web::post().to(crop_advice)))
        .service(web::resource("/api/health").route(web::get().to(health)));
    if let Some(dir) = static_dir {
        cfg.service(Files::new("/static", dir).index_file("index.html"));
    }
}

async fn with_deadline<T>(
    deadline: Duration,
    call: BoxFuture<'_, Result<T, InferenceError>>,
) -> Result<T, InferenceError> {
    tokio::time::timeout(deadline, call).await.unwrap_or_else(|_| {
        warn!("Upstream call abandoned after {:?}", deadline);
        Err(InferenceError::Timeout(deadline))
    })
}

async fn detect_pest(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let DetectUpload { image, user_id } = read_upload(payload, &state.intake).await?;
    let media_type = image.media_type().to_string();
    let image_data = image.into_bytes().await?;
    info!("Analysing {} image ({} bytes)", media_type, image_data.len());

    let result = with_deadline(
        state.upstream_timeout,
        state.inference.analyze_image(&image_data, &media_type),
    )
    .await?;

    if let Some(user_id) = user_id {
        let detection = NewDetection {
            user_id: Some(user_id),
            image_path: image_reference(&image_data, &media_type),
            result: result.clone(),
        };
        record_detection(state.store.as_ref(), detection).await;
    }

    Ok(HttpResponse::Ok().json(result))
}

/// Persists a detection. Failures are logged here and never reach the caller.
async fn record_detection(store: &dyn DetectionStore, detection: NewDetection) {
    let user_id = detection.user_id.clone().unwrap_or_default();
    match store.save(detection).await {
        Ok(record) => info!("Recorded detection {} for user {}", record.id, user_id),
        Err(e) => error!("Failed to record detection for user {}: {}", user_id, e),
    }
}

async fn list_detections(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let records = state
        .store
        .list_by_user(&user_id)
        .await
        .map_err(ApiError::History)?;
    info!("Retrieved {} detections for user {}", records.len(), user_id);
    Ok(HttpResponse::Ok().json(records))
}

async fn crop_advice(
    state: web::Data<AppState>,
    body: web::Json<CropAdviceRequest>,
) -> Result<HttpResponse, ApiError> {
    let crop = body.crop_type.trim();
    let issue = body.issue.trim();
    if crop.is_empty() || issue.is_empty() {
        return Err(ApiError::BadRequest("cropType and issue are required".into()));
    }

    let advice = with_deadline(state.upstream_timeout, state.inference.crop_advice(crop, issue))
        .await?;
    Ok(HttpResponse::Ok().json(CropAdviceResponse { advice }))
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "upstreamConfigured": state.inference.is_configured(),
    }))
}
