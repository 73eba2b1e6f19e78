//! Analysis endpoints.
//!
//! `POST /api/analyze/text`: JSON `{ message, userAllergies }`.
//! `POST /api/analyze/image`: multipart with `image` and optional
//! `userAllergies` (JSON array) parts.
//!
//! Each request runs under the configured deadline. Dropping the handler
//! future (client disconnect) abandons all in-flight upstream calls.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{AnalysisResponse, ApiContext, TextAnalysisRequest};
use crate::models::{collect_allergies, resolve_mime, AllergyInput, ImagePayload};
use crate::pipeline::CancelSignal;

/// `POST /api/analyze/text`
pub async fn text(
    State(ctx): State<ApiContext>,
    payload: Result<Json<TextAnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let allergies = collect_allergies(req.user_allergies);
    let cancel = CancelSignal::never().with_timeout(ctx.request_timeout);

    let result = ctx
        .pipeline
        .analyze_text(&req.message, &allergies, &cancel)
        .await?;

    Ok(Json(AnalysisResponse::from_text(result)))
}

/// `POST /api/analyze/image`
pub async fn image(
    State(ctx): State<ApiContext>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let mut image: Option<ImagePayload> = None;
    let mut allergy_inputs: Vec<AllergyInput> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" => {
                let declared = field.content_type().map(str::to_string);
                let file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Could not read image: {e}")))?;

                let mime = resolve_mime(declared.as_deref(), &bytes, file_name.as_deref())
                    .or(declared)
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                image = Some(ImagePayload::new(bytes.to_vec(), mime));
            }
            "userAllergies" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Could not read userAllergies: {e}")))?;
                if !raw.trim().is_empty() {
                    allergy_inputs = serde_json::from_str(&raw).map_err(|e| {
                        ApiError::BadRequest(format!("userAllergies must be a JSON array: {e}"))
                    })?;
                }
            }
            other => {
                tracing::debug!(part = other, "Ignoring unknown multipart part");
            }
        }
    }

    let image = image.ok_or_else(|| ApiError::BadRequest("Missing 'image' part".into()))?;
    let allergies = collect_allergies(allergy_inputs);
    let cancel = CancelSignal::never().with_timeout(ctx.request_timeout);

    let result = ctx
        .pipeline
        .analyze_image(&image, &allergies, &cancel)
        .await?;

    Ok(Json(AnalysisResponse::from_image(result)))
}
