//! # Transcribe-and-Translate Endpoint
//!
//! `POST /v1/transcribe_translate` takes a multipart form with the audio in
//! `file` and an optional `target_lang` display name ("English", "Turkish",
//! "Persian", "Arabic").
//!
//! `target_lang` is validated the moment its field is read, so a client that
//! sends it first gets an unsupported-language error before any audio is
//! buffered. The upload is size-capped while streaming.

use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use bytes::{Bytes, BytesMut};
use futures_util::stream::StreamExt;
use std::time::Instant;

use crate::error::{AppError, AppResult};
use crate::language::TargetLanguage;
use crate::state::AppState;

const FILE_FIELD: &str = "file";
const TARGET_LANG_FIELD: &str = "target_lang";
/// Upper bound for plain text form fields.
const MAX_TEXT_FIELD_BYTES: usize = 256;

pub async fn transcribe_translate(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let start_time = Instant::now();
    let max_upload_bytes = state.config.audio.max_upload_bytes;

    let mut target: Option<TargetLanguage> = None;
    let mut upload: Option<Bytes> = None;
    let mut filename: Option<String> = None;

    while let Some(item) = payload.next().await {
        let mut field = item?;
        let field_name = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .unwrap_or_default()
            .to_string();

        match field_name.as_str() {
            TARGET_LANG_FIELD => {
                let raw = read_field(&mut field, MAX_TEXT_FIELD_BYTES).await?;
                let name = String::from_utf8(raw.to_vec()).map_err(|_| {
                    AppError::ValidationError("target_lang must be UTF-8 text".to_string())
                })?;
                let language = TargetLanguage::from_name(&name).ok_or_else(|| {
                    AppError::BadRequest(format!("Unsupported target_lang: {}", name))
                })?;
                target = Some(language);
            }
            FILE_FIELD => {
                filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .map(|s| s.to_string());
                upload = Some(read_field(&mut field, max_upload_bytes).await?);
            }
            _ => {
                // Unknown fields are drained and ignored
                while let Some(chunk) = field.next().await {
                    chunk?;
                }
            }
        }
    }

    let upload = upload.ok_or_else(|| AppError::BadRequest("No audio file provided".to_string()))?;
    let target = target.unwrap_or_else(|| state.config.default_target_language());

    tracing::info!(
        filename = filename.as_deref().unwrap_or("unknown"),
        size_bytes = upload.len(),
        target = target.code(),
        "Audio upload received"
    );

    let _job = state.start_job();
    let response = state.pipeline.run(upload, target).await.map_err(|e| {
        tracing::error!(
            error = %e,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Transcribe-translate failed"
        );
        AppError::from(e)
    })?;

    Ok(HttpResponse::Ok().json(response))
}

/// Collect a field's chunks, failing once more than `limit` bytes arrive.
async fn read_field(field: &mut Field, limit: usize) -> AppResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        if buf.len() + chunk.len() > limit {
            return Err(AppError::BadRequest(format!(
                "Field '{}' too large (max: {} bytes)",
                field.name().unwrap_or_default(),
                limit
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}
