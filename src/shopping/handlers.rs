use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use super::{repo, services};
use crate::{
    auth::extractors::AuthUser,
    error::AppError,
    extract::ApiPath,
    recipes::{dto::RecipeShort, repo_types::RecipeMark, services as recipe_services},
    state::AppState,
};

pub fn shopping_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/recipes/:id/shopping_cart",
            post(add_to_cart).delete(remove_from_cart),
        )
        .route("/recipes/download_shopping_cart", get(download_shopping_cart))
}

#[instrument(skip(state))]
pub async fn add_to_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(recipe_id): ApiPath<i64>,
) -> Result<(StatusCode, Json<RecipeShort>), AppError> {
    let recipe =
        recipe_services::add_to_list(&state, RecipeMark::ShoppingCart, user_id, recipe_id).await?;
    info!(%user_id, recipe_id, "recipe added to cart");
    Ok((StatusCode::CREATED, Json(recipe)))
}

#[instrument(skip(state))]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(recipe_id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    recipe_services::remove_from_list(&state, RecipeMark::ShoppingCart, user_id, recipe_id).await?;
    info!(%user_id, recipe_id, "recipe removed from cart");
    Ok(StatusCode::NO_CONTENT)
}

/// Plain-text purchase list with amounts summed across the cart.
#[instrument(skip(state))]
pub async fn download_shopping_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let rows = repo::cart_ingredients(&state.db, user_id).await?;
    let items = services::aggregate(&rows);
    info!(%user_id, items = items.len(), "shopping list generated");

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"shopping_list.txt\"",
            ),
        ],
        services::render(&items),
    ))
}
