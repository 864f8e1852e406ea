use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use super::dto::{RecipeResponse, RecipeWriteRequest};
use super::filters::RecipeQuery;
use super::{repo, services};
use crate::{
    auth::extractors::{AuthUser, MaybeAuthUser},
    error::AppError,
    extract::{ApiJson, ApiPath, ApiQuery},
    images::services::{discard_image, store_recipe_image},
    pagination::Page,
    state::AppState,
};

pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes", get(list_recipes).post(create_recipe))
        .route(
            "/recipes/:id",
            get(get_recipe).patch(update_recipe).delete(delete_recipe),
        )
        // base64 images travel inside the JSON body
        .layer(DefaultBodyLimit::max(16 * 1024 * 1024))
}

#[instrument(skip(state, params))]
pub async fn list_recipes(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    ApiQuery(params): ApiQuery<Vec<(String, String)>>,
) -> Result<Json<Page<RecipeResponse>>, AppError> {
    let (filter, page) = RecipeQuery::from_pairs(params)?.into_filter(viewer);
    let (rows, count) = repo::list(&state.db, viewer, &filter, page.limit, page.offset).await?;
    let results = services::assemble(&state, viewer, rows).await?;
    Ok(Json(Page { count, results }))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<RecipeResponse>, AppError> {
    Ok(Json(services::load_one(&state, viewer, id).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<RecipeWriteRequest>,
) -> Result<(StatusCode, HeaderMap, Json<RecipeResponse>), AppError> {
    let (write, image) = services::validate_write(payload)?;
    services::ensure_references(&state, &write).await?;

    let image_key = match image {
        Some(img) => Some(store_recipe_image(&state, img).await?),
        None => None,
    };

    let id = match repo::create(&state.db, user_id, &write, image_key.as_deref()).await {
        Ok(id) => id,
        Err(e) => {
            discard_image(&state, image_key).await;
            return Err(e.into());
        }
    };
    info!(recipe_id = id, %user_id, "recipe created");

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/api/recipes/{id}")) {
        headers.insert(LOCATION, location);
    }
    let body = services::load_one(&state, Some(user_id), id).await?;
    Ok((StatusCode::CREATED, headers, Json(body)))
}

#[instrument(skip(state, payload))]
pub async fn update_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<RecipeWriteRequest>,
) -> Result<Json<RecipeResponse>, AppError> {
    let recipe = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Recipe"))?;
    services::authorize_change(&state, user_id, recipe.author_id).await?;

    let (write, image) = services::validate_write(payload)?;
    services::ensure_references(&state, &write).await?;

    let new_key = match image {
        Some(img) => Some(store_recipe_image(&state, img).await?),
        None => None,
    };

    if let Err(e) = repo::update(&state.db, id, &write, new_key.as_deref()).await {
        discard_image(&state, new_key).await;
        return Err(e.into());
    }
    if new_key.is_some() {
        discard_image(&state, recipe.image).await;
    }
    info!(recipe_id = id, %user_id, "recipe updated");

    Ok(Json(services::load_one(&state, Some(user_id), id).await?))
}

#[instrument(skip(state))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    let recipe = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Recipe"))?;
    services::authorize_change(&state, user_id, recipe.author_id).await?;

    if !repo::delete(&state.db, id).await? {
        return Err(AppError::not_found("Recipe"));
    }
    discard_image(&state, recipe.image).await;
    info!(recipe_id = id, %user_id, "recipe deleted");

    Ok(StatusCode::NO_CONTENT)
}
