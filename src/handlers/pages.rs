//! Static HTML pages served from configured files.

use actix_web::{web, HttpResponse};
use std::path::Path;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// `GET /`
pub async fn landing_page(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    serve_html(&state.config.pages.landing_page, "Landing page").await
}

/// `GET /privacy-policy`
pub async fn privacy_policy(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    serve_html(&state.config.pages.privacy_policy, "Privacy policy").await
}

async fn serve_html(path: &Path, what: &str) -> AppResult<HttpResponse> {
    match tokio::fs::read_to_string(path).await {
        Ok(html) => Ok(HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(html)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "{} file missing", what);
            Err(AppError::NotFound(format!("{} not found", what)))
        }
        Err(e) => Err(AppError::Internal(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}
