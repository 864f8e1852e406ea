use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use super::dto::{RecipeIngredient, RecipeResponse, RecipeShort, RecipeWriteRequest};
use super::repo;
use super::repo_types::{RecipeMark, RecipeRow, RecipeWrite};
use crate::error::{is_foreign_key_violation, AppError};
use crate::images::services::{decode_data_uri, image_url, DecodedImage};
use crate::state::AppState;
use crate::tags::repo::{self as tags_repo, Tag};
use crate::ingredients::repo as ingredients_repo;
use crate::users::{dto::UserResponse, repo as users_repo, repo_types::User};

const MAX_RECIPE_NAME_LEN: usize = 256;

/// Check a write payload and split it into persistable fields and an optional new image.
pub fn validate_write(
    req: RecipeWriteRequest,
) -> Result<(RecipeWrite, Option<DecodedImage>), AppError> {
    let name = req.name.trim().to_string();
    if name.is_empty() || name.chars().count() > MAX_RECIPE_NAME_LEN {
        return Err(AppError::Validation("name: required, up to 256 characters".into()));
    }
    let text = req.text.trim().to_string();
    if text.is_empty() {
        return Err(AppError::Validation("text: required".into()));
    }
    if req.cooking_time < 1 {
        return Err(AppError::Validation("cooking_time: must be at least 1".into()));
    }

    if req.tags.is_empty() {
        return Err(AppError::Validation("tags: at least one tag is required".into()));
    }
    let mut seen_tags = HashSet::new();
    if !req.tags.iter().all(|t| seen_tags.insert(*t)) {
        return Err(AppError::Validation("tags: duplicate tag".into()));
    }

    if req.ingredients.is_empty() {
        return Err(AppError::Validation(
            "ingredients: at least one ingredient is required".into(),
        ));
    }
    let mut seen_ingredients = HashSet::new();
    let mut ingredients = Vec::with_capacity(req.ingredients.len());
    for item in &req.ingredients {
        if !seen_ingredients.insert(item.id) {
            return Err(AppError::Validation(format!(
                "ingredients: ingredient {} is listed twice",
                item.id
            )));
        }
        if item.amount < 1 {
            return Err(AppError::Validation(format!(
                "ingredients: amount for ingredient {} must be at least 1",
                item.id
            )));
        }
        ingredients.push((item.id, item.amount));
    }

    let image = req
        .image
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(decode_data_uri)
        .transpose()?;

    Ok((
        RecipeWrite {
            name,
            text,
            cooking_time: req.cooking_time,
            tags: req.tags,
            ingredients,
        },
        image,
    ))
}

/// Unknown tags are a bad request, unknown ingredients are not found.
pub async fn ensure_references(st: &AppState, write: &RecipeWrite) -> Result<(), AppError> {
    let missing_tags = tags_repo::missing(&st.db, &write.tags).await?;
    if let Some(id) = missing_tags.first() {
        return Err(AppError::Validation(format!("tags: tag {id} does not exist")));
    }
    let ids: Vec<i64> = write.ingredients.iter().map(|(id, _)| *id).collect();
    let missing = ingredients_repo::missing(&st.db, &ids).await?;
    if let Some(id) = missing.first() {
        return Err(AppError::NotFound(format!("Ingredient {id} not found")));
    }
    Ok(())
}

/// Authors may change their own recipes; staff may change any.
pub fn can_modify(author_id: Uuid, actor: &User) -> bool {
    actor.is_staff || actor.id == author_id
}

/// Load the acting user and check they may modify a recipe by `author_id`.
pub async fn authorize_change(
    st: &AppState,
    actor_id: Uuid,
    author_id: Uuid,
) -> Result<(), AppError> {
    let actor = User::find_by_id(&st.db, actor_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;
    if !can_modify(author_id, &actor) {
        return Err(AppError::Forbidden(
            "Only the author or an administrator can change this recipe".into(),
        ));
    }
    Ok(())
}

/// Attach tags, ingredients, authors and image URLs to recipe rows, keeping row order.
pub async fn assemble(
    st: &AppState,
    viewer: Option<Uuid>,
    rows: Vec<RecipeRow>,
) -> anyhow::Result<Vec<RecipeResponse>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let author_ids: Vec<Uuid> = rows
        .iter()
        .map(|r| r.author_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let mut tags: HashMap<i64, Vec<Tag>> = HashMap::new();
    for t in repo::tags_for(&st.db, &ids).await? {
        tags.entry(t.recipe_id).or_default().push(Tag {
            id: t.id,
            name: t.name,
            color: t.color,
            slug: t.slug,
        });
    }

    let mut ingredients: HashMap<i64, Vec<RecipeIngredient>> = HashMap::new();
    for i in repo::ingredients_for(&st.db, &ids).await? {
        ingredients.entry(i.recipe_id).or_default().push(RecipeIngredient {
            id: i.id,
            name: i.name,
            measurement_unit: i.measurement_unit,
            amount: i.amount,
        });
    }

    let authors: HashMap<Uuid, UserResponse> = users_repo::users_by_ids(&st.db, viewer, &author_ids)
        .await?
        .into_iter()
        .map(|u| (u.id, UserResponse::from(u)))
        .collect();

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(author) = authors.get(&row.author_id).cloned() else {
            // author removed between queries; the recipe went with them
            continue;
        };
        out.push(RecipeResponse {
            id: row.id,
            tags: tags.remove(&row.id).unwrap_or_default(),
            author,
            ingredients: ingredients.remove(&row.id).unwrap_or_default(),
            is_favorited: row.is_favorited,
            is_in_shopping_cart: row.is_in_shopping_cart,
            image: image_url(st, row.image.as_deref()).await,
            name: row.name,
            text: row.text,
            cooking_time: row.cooking_time,
        });
    }
    Ok(out)
}

/// Full representation of one recipe for `viewer`.
pub async fn load_one(
    st: &AppState,
    viewer: Option<Uuid>,
    id: i64,
) -> Result<RecipeResponse, AppError> {
    let row = repo::get(&st.db, viewer, id)
        .await?
        .ok_or_else(|| AppError::not_found("Recipe"))?;
    assemble(st, viewer, vec![row])
        .await?
        .pop()
        .ok_or_else(|| AppError::not_found("Recipe"))
}

/// Add a recipe to the user's favorites or cart. A second add is a 400.
pub async fn add_to_list(
    st: &AppState,
    mark: RecipeMark,
    user_id: Uuid,
    recipe_id: i64,
) -> Result<RecipeShort, AppError> {
    let recipe = repo::find(&st.db, recipe_id)
        .await?
        .ok_or_else(|| AppError::not_found("Recipe"))?;

    // the recipe can vanish between the lookup and the insert
    let inserted = repo::add_mark(&st.db, mark, user_id, recipe_id)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::not_found("Recipe")
            } else {
                AppError::Internal(e)
            }
        })?;
    ensure_added(mark, inserted)?;

    Ok(RecipeShort {
        id: recipe.id,
        image: image_url(st, recipe.image.as_deref()).await,
        name: recipe.name,
        cooking_time: recipe.cooking_time,
    })
}

pub async fn remove_from_list(
    st: &AppState,
    mark: RecipeMark,
    user_id: Uuid,
    recipe_id: i64,
) -> Result<(), AppError> {
    if repo::find(&st.db, recipe_id).await?.is_none() {
        return Err(AppError::not_found("Recipe"));
    }
    let deleted = repo::remove_mark(&st.db, mark, user_id, recipe_id).await?;
    ensure_removed(mark, deleted)
}

fn ensure_added(mark: RecipeMark, inserted: bool) -> Result<(), AppError> {
    if inserted {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("Recipe is already in {}", mark.label())))
    }
}

fn ensure_removed(mark: RecipeMark, deleted: bool) -> Result<(), AppError> {
    if deleted {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("Recipe is not in {}", mark.label())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipes::dto::IngredientAmount;
    use time::OffsetDateTime;

    fn request() -> RecipeWriteRequest {
        RecipeWriteRequest {
            ingredients: vec![
                IngredientAmount { id: 1, amount: 200 },
                IngredientAmount { id: 2, amount: 2 },
            ],
            tags: vec![1, 2],
            image: None,
            name: "  Pancakes ".into(),
            text: "Whisk, fry, flip.".into(),
            cooking_time: 15,
        }
    }

    fn user(is_staff: bool) -> User {
        User {
            id: Uuid::new_v4(),
            email: "u@example.com".into(),
            username: "u".into(),
            first_name: "U".into(),
            last_name: "V".into(),
            password_hash: String::new(),
            is_staff,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn accepts_valid_payload() {
        let (write, image) = validate_write(request()).unwrap();
        assert_eq!(write.name, "Pancakes");
        assert_eq!(write.ingredients, vec![(1, 200), (2, 2)]);
        assert!(image.is_none());
    }

    #[test]
    fn rejects_empty_or_duplicate_ingredients() {
        let mut req = request();
        req.ingredients.clear();
        assert!(matches!(validate_write(req), Err(AppError::Validation(_))));

        let mut req = request();
        req.ingredients.push(IngredientAmount { id: 1, amount: 5 });
        assert!(matches!(validate_write(req), Err(AppError::Validation(_))));

        let mut req = request();
        req.ingredients[0].amount = 0;
        assert!(matches!(validate_write(req), Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_bad_tags_time_and_image() {
        let mut req = request();
        req.tags = vec![3, 3];
        assert!(matches!(validate_write(req), Err(AppError::Validation(_))));

        let mut req = request();
        req.tags.clear();
        assert!(matches!(validate_write(req), Err(AppError::Validation(_))));

        let mut req = request();
        req.cooking_time = 0;
        assert!(matches!(validate_write(req), Err(AppError::Validation(_))));

        let mut req = request();
        req.image = Some("not a data uri".into());
        assert!(matches!(validate_write(req), Err(AppError::Validation(_))));
    }

    #[test]
    fn blank_image_means_no_change() {
        let mut req = request();
        req.image = Some("  ".into());
        let (_, image) = validate_write(req).unwrap();
        assert!(image.is_none());
    }

    #[test]
    fn repeated_add_is_bad_request_and_missing_remove_is_not_found() {
        for mark in [RecipeMark::Favorite, RecipeMark::ShoppingCart] {
            assert!(ensure_added(mark, true).is_ok());
            assert!(matches!(ensure_added(mark, false), Err(AppError::BadRequest(_))));
            assert!(ensure_removed(mark, true).is_ok());
            assert!(matches!(ensure_removed(mark, false), Err(AppError::NotFound(_))));
        }
    }

    #[test]
    fn only_author_or_staff_may_modify() {
        let author = user(false);
        let stranger = user(false);
        let admin = user(true);
        assert!(can_modify(author.id, &author));
        assert!(!can_modify(author.id, &stranger));
        assert!(can_modify(author.id, &admin));
    }
}

#[cfg(test)]
mod db_tests {
    use super::*;
    use crate::images::storage::MemoryImageStore;
    use crate::recipes::repo::test_support::{ingredient_ids, insert_recipe};
    use crate::users::repo::test_support::insert_user;
    use sqlx::PgPool;
    use std::sync::Arc;

    fn state(db: &PgPool) -> AppState {
        AppState::for_tests(db.clone(), Arc::new(MemoryImageStore::default()))
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn second_favorite_is_a_bad_request(db: PgPool) {
        let st = state(&db);
        let cook = insert_user(&db, "cook").await;
        let ids = ingredient_ids(&db, &[("flour", "g")]).await;
        let recipe = insert_recipe(&db, cook.id, "Bread", vec![(ids[0], 500)]).await;

        let short = add_to_list(&st, RecipeMark::Favorite, cook.id, recipe).await.unwrap();
        assert_eq!(short.id, recipe);
        assert_eq!(short.name, "Bread");
        assert!(short.image.is_none());

        let again = add_to_list(&st, RecipeMark::Favorite, cook.id, recipe).await;
        assert!(matches!(again, Err(AppError::BadRequest(_))));

        // the cart is a separate list
        add_to_list(&st, RecipeMark::ShoppingCart, cook.id, recipe).await.unwrap();
        let again = add_to_list(&st, RecipeMark::ShoppingCart, cook.id, recipe).await;
        assert!(matches!(again, Err(AppError::BadRequest(_))));
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn removing_what_is_not_there_is_not_found(db: PgPool) {
        let st = state(&db);
        let cook = insert_user(&db, "cook").await;
        let ids = ingredient_ids(&db, &[("rice", "g")]).await;
        let recipe = insert_recipe(&db, cook.id, "Pilaf", vec![(ids[0], 200)]).await;

        let never_added = remove_from_list(&st, RecipeMark::Favorite, cook.id, recipe).await;
        assert!(matches!(never_added, Err(AppError::NotFound(_))));

        let missing_recipe =
            remove_from_list(&st, RecipeMark::ShoppingCart, cook.id, recipe + 1000).await;
        assert!(matches!(missing_recipe, Err(AppError::NotFound(_))));

        let add_missing = add_to_list(&st, RecipeMark::Favorite, cook.id, recipe + 1000).await;
        assert!(matches!(add_missing, Err(AppError::NotFound(_))));

        add_to_list(&st, RecipeMark::Favorite, cook.id, recipe).await.unwrap();
        remove_from_list(&st, RecipeMark::Favorite, cook.id, recipe).await.unwrap();
        let twice = remove_from_list(&st, RecipeMark::Favorite, cook.id, recipe).await;
        assert!(matches!(twice, Err(AppError::NotFound(_))));
    }
}
