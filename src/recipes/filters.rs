use uuid::Uuid;

use super::repo_types::RecipeFilter;
use crate::error::AppError;
use crate::pagination::Pagination;

/// Recipe list query string. `tags` may repeat, so it is read from raw pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeQuery {
    pub author: Option<Uuid>,
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub pagination: Pagination,
}

fn parse_bool(key: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" | "" => Ok(false),
        _ => Err(AppError::Validation(format!("{key}: expected 0/1 or true/false"))),
    }
}

fn parse_int(key: &str, value: &str) -> Result<i64, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("{key}: expected an integer")))
}

impl RecipeQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Result<Self, AppError> {
        let mut q = RecipeQuery::default();
        for (key, value) in pairs {
            match key.as_str() {
                "author" => {
                    let id = Uuid::parse_str(value.trim())
                        .map_err(|_| AppError::Validation("author: expected a user id".into()))?;
                    q.author = Some(id);
                }
                "tags" => {
                    let slug = value.trim();
                    if !slug.is_empty() && !q.tags.iter().any(|t| t == slug) {
                        q.tags.push(slug.to_string());
                    }
                }
                "is_favorited" => q.is_favorited = parse_bool(&key, &value)?,
                "is_in_shopping_cart" => q.is_in_shopping_cart = parse_bool(&key, &value)?,
                "limit" => q.pagination.limit = parse_int(&key, &value)?,
                "offset" => q.pagination.offset = parse_int(&key, &value)?,
                _ => {}
            }
        }
        q.pagination = q.pagination.normalized();
        Ok(q)
    }

    /// Favorite/cart filters only apply to a known viewer.
    pub fn into_filter(self, viewer: Option<Uuid>) -> (RecipeFilter, Pagination) {
        let filter = RecipeFilter {
            author: self.author,
            tags: self.tags,
            favorited_by: viewer.filter(|_| self.is_favorited),
            in_cart_of: viewer.filter(|_| self.is_in_shopping_cart),
        };
        (filter, self.pagination)
    }
}
