use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Recipe record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct Recipe {
    pub id: i64,
    pub author_id: Uuid,
    pub name: String,
    pub text: String,
    pub image: Option<String>, // object storage key
    pub cooking_time: i32,
    pub created_at: OffsetDateTime,
}

/// Recipe plus the viewer's favorite/cart flags.
#[derive(Debug, Clone, FromRow)]
pub struct RecipeRow {
    pub id: i64,
    pub author_id: Uuid,
    pub name: String,
    pub text: String,
    pub image: Option<String>,
    pub cooking_time: i32,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct RecipeTagRow {
    pub recipe_id: i64,
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
    pub slug: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct RecipeIngredientRow {
    pub recipe_id: i64,
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct RecipeShortRow {
    pub author_id: Uuid,
    pub id: i64,
    pub name: String,
    pub image: Option<String>,
    pub cooking_time: i32,
}

/// Recipe list filter after viewer context has been applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeFilter {
    pub author: Option<Uuid>,
    pub tags: Vec<String>,
    pub favorited_by: Option<Uuid>,
    pub in_cart_of: Option<Uuid>,
}

/// Validated recipe fields ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeWrite {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub tags: Vec<i64>,
    pub ingredients: Vec<(i64, i32)>, // (ingredient id, amount)
}

/// Per-user recipe lists backed by a unique (user, recipe) table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeMark {
    Favorite,
    ShoppingCart,
}

impl RecipeMark {
    pub fn table(self) -> &'static str {
        match self {
            RecipeMark::Favorite => "favorites",
            RecipeMark::ShoppingCart => "shopping_carts",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RecipeMark::Favorite => "favorites",
            RecipeMark::ShoppingCart => "shopping cart",
        }
    }
}
