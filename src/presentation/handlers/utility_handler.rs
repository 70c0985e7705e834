// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::dto::utility::{
    ExtractImagesRequest, ExtractLinksRequest, ImagesResponse, LinksResponse, MethodInfo,
    QuickScrapeRequest, QuickScrapeResponse, UrlValidation, ValidateUrlRequest,
};
use crate::presentation::errors::AppError;
use crate::presentation::state::AppState;
use axum::{extract::State, Json};

pub async fn validate_url(
    State(state): State<AppState>,
    Json(request): Json<ValidateUrlRequest>,
) -> Json<UrlValidation> {
    Json(state.utilities.validate_url(&request.url).await)
}

pub async fn extract_links(
    State(state): State<AppState>,
    Json(request): Json<ExtractLinksRequest>,
) -> Result<Json<LinksResponse>, AppError> {
    Ok(Json(state.utilities.extract_links(request).await?))
}

pub async fn extract_images(
    State(state): State<AppState>,
    Json(request): Json<ExtractImagesRequest>,
) -> Result<Json<ImagesResponse>, AppError> {
    Ok(Json(state.utilities.extract_images(request).await?))
}

pub async fn quick_scrape(
    State(state): State<AppState>,
    Json(request): Json<QuickScrapeRequest>,
) -> Result<Json<QuickScrapeResponse>, AppError> {
    Ok(Json(state.utilities.quick_scrape(request).await?))
}

pub async fn supported_methods(State(state): State<AppState>) -> Json<Vec<MethodInfo>> {
    Json(state.utilities.supported_methods())
}
