use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;

use super::repo::{self, Ingredient};
use crate::{
    error::AppError,
    extract::{ApiPath, ApiQuery},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct IngredientQuery {
    pub name: Option<String>,
}

pub fn ingredient_routes() -> Router<AppState> {
    Router::new()
        .route("/ingredients", get(list_ingredients))
        .route("/ingredients/:id", get(get_ingredient))
}

#[instrument(skip(state))]
pub async fn list_ingredients(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<IngredientQuery>,
) -> Result<Json<Vec<Ingredient>>, AppError> {
    Ok(Json(repo::search(&state.db, q.name.as_deref()).await?))
}

#[instrument(skip(state))]
pub async fn get_ingredient(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Ingredient>, AppError> {
    repo::get(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Ingredient"))
}
