use serde::{Deserialize, Serialize};

use crate::tags::repo::Tag;
use crate::users::dto::UserResponse;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IngredientAmount {
    pub id: i64,
    pub amount: i32,
}

/// Body of `POST /recipes` and `PATCH /recipes/:id`.
#[derive(Debug, Deserialize)]
pub struct RecipeWriteRequest {
    pub ingredients: Vec<IngredientAmount>,
    pub tags: Vec<i64>,
    /// Base64 data URI; omitted on update keeps the current image.
    #[serde(default)]
    pub image: Option<String>,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeIngredient {
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Serialize)]
pub struct RecipeResponse {
    pub id: i64,
    pub tags: Vec<Tag>,
    pub author: UserResponse,
    pub ingredients: Vec<RecipeIngredient>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: Option<String>,
    pub text: String,
    pub cooking_time: i32,
}

/// Compact recipe used in favorites, cart and subscription responses.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeShort {
    pub id: i64,
    pub name: String,
    pub image: Option<String>,
    pub cooking_time: i32,
}
