use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::extractors::AuthUser,
    error::AppError,
    extract::ApiPath,
    recipes::{dto::RecipeShort, repo_types::RecipeMark, services},
    state::AppState,
};

pub fn favorite_routes() -> Router<AppState> {
    Router::new().route(
        "/recipes/:id/favorite",
        post(add_favorite).delete(remove_favorite),
    )
}

#[instrument(skip(state))]
pub async fn add_favorite(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(recipe_id): ApiPath<i64>,
) -> Result<(StatusCode, Json<RecipeShort>), AppError> {
    let recipe = services::add_to_list(&state, RecipeMark::Favorite, user_id, recipe_id).await?;
    info!(%user_id, recipe_id, "recipe favorited");
    Ok((StatusCode::CREATED, Json(recipe)))
}

#[instrument(skip(state))]
pub async fn remove_favorite(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(recipe_id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    services::remove_from_list(&state, RecipeMark::Favorite, user_id, recipe_id).await?;
    info!(%user_id, recipe_id, "recipe unfavorited");
    Ok(StatusCode::NO_CONTENT)
}
