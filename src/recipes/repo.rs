use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::repo_types::{
    Recipe, RecipeFilter, RecipeIngredientRow, RecipeMark, RecipeRow, RecipeShortRow,
    RecipeTagRow, RecipeWrite,
};

// $1..$4 are the filter parameters.
const FILTER_SQL: &str = r#"
     WHERE ($1::uuid IS NULL OR r.author_id = $1)
       AND (cardinality($2::text[]) = 0 OR EXISTS (
                SELECT 1 FROM recipe_tags rt JOIN tags t ON t.id = rt.tag_id
                 WHERE rt.recipe_id = r.id AND t.slug = ANY($2)))
       AND ($3::uuid IS NULL OR EXISTS (
                SELECT 1 FROM favorites fv WHERE fv.recipe_id = r.id AND fv.user_id = $3))
       AND ($4::uuid IS NULL OR EXISTS (
                SELECT 1 FROM shopping_carts sc WHERE sc.recipe_id = r.id AND sc.user_id = $4))
"#;

/// Recipe columns plus viewer flags, with the viewer bound at placeholder `viewer`.
fn row_sql(viewer: &str) -> String {
    format!(
        r#"
    SELECT r.id, r.author_id, r.name, r.text, r.image, r.cooking_time,
           EXISTS (SELECT 1 FROM favorites fv
                    WHERE fv.recipe_id = r.id AND fv.user_id = {viewer}::uuid) AS is_favorited,
           EXISTS (SELECT 1 FROM shopping_carts sc
                    WHERE sc.recipe_id = r.id AND sc.user_id = {viewer}::uuid) AS is_in_shopping_cart
      FROM recipes r
"#
    )
}

pub async fn list(
    db: &PgPool,
    viewer: Option<Uuid>,
    filter: &RecipeFilter,
    limit: i64,
    offset: i64,
) -> anyhow::Result<(Vec<RecipeRow>, i64)> {
    let rows = sqlx::query_as::<_, RecipeRow>(&format!(
        "{} {FILTER_SQL} ORDER BY r.created_at DESC, r.id DESC LIMIT $6 OFFSET $7",
        row_sql("$5")
    ))
    .bind(filter.author)
    .bind(&filter.tags)
    .bind(filter.favorited_by)
    .bind(filter.in_cart_of)
    .bind(viewer)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("list recipes")?;

    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM recipes r {FILTER_SQL}"))
        .bind(filter.author)
        .bind(&filter.tags)
        .bind(filter.favorited_by)
        .bind(filter.in_cart_of)
        .fetch_one(db)
        .await
        .context("count recipes")?;

    Ok((rows, count))
}

pub async fn get(db: &PgPool, viewer: Option<Uuid>, id: i64) -> anyhow::Result<Option<RecipeRow>> {
    let row = sqlx::query_as::<_, RecipeRow>(&format!("{} WHERE r.id = $2", row_sql("$1")))
        .bind(viewer)
        .bind(id)
        .fetch_optional(db)
        .await
        .context("get recipe")?;
    Ok(row)
}

pub async fn find(db: &PgPool, id: i64) -> anyhow::Result<Option<Recipe>> {
    let row = sqlx::query_as::<_, Recipe>(
        r#"
        SELECT id, author_id, name, text, image, cooking_time, created_at
          FROM recipes
         WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await
    .context("find recipe")?;
    Ok(row)
}

pub async fn tags_for(db: &PgPool, recipe_ids: &[i64]) -> anyhow::Result<Vec<RecipeTagRow>> {
    let rows = sqlx::query_as::<_, RecipeTagRow>(
        r#"
        SELECT rt.recipe_id, t.id, t.name, t.color, t.slug
          FROM recipe_tags rt
          JOIN tags t ON t.id = rt.tag_id
         WHERE rt.recipe_id = ANY($1)
         ORDER BY t.id
        "#,
    )
    .bind(recipe_ids)
    .fetch_all(db)
    .await
    .context("load recipe tags")?;
    Ok(rows)
}

pub async fn ingredients_for(
    db: &PgPool,
    recipe_ids: &[i64],
) -> anyhow::Result<Vec<RecipeIngredientRow>> {
    let rows = sqlx::query_as::<_, RecipeIngredientRow>(
        r#"
        SELECT ir.recipe_id, i.id, i.name, i.measurement_unit, ir.amount
          FROM ingredient_recipes ir
          JOIN ingredients i ON i.id = ir.ingredient_id
         WHERE ir.recipe_id = ANY($1)
         ORDER BY ir.id
        "#,
    )
    .bind(recipe_ids)
    .fetch_all(db)
    .await
    .context("load recipe ingredients")?;
    Ok(rows)
}

async fn replace_links(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: i64,
    write: &RecipeWrite,
) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tx)
        .await
        .context("clear recipe tags")?;
    sqlx::query("DELETE FROM ingredient_recipes WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tx)
        .await
        .context("clear recipe ingredients")?;

    sqlx::query(
        r#"
        INSERT INTO recipe_tags (recipe_id, tag_id)
        SELECT $1, tag_id FROM UNNEST($2::bigint[]) AS t(tag_id)
        "#,
    )
    .bind(recipe_id)
    .bind(&write.tags)
    .execute(&mut **tx)
    .await
    .context("insert recipe tags")?;

    let (ids, amounts): (Vec<i64>, Vec<i32>) = write.ingredients.iter().copied().unzip();
    sqlx::query(
        r#"
        INSERT INTO ingredient_recipes (recipe_id, ingredient_id, amount)
        SELECT $1, x.ingredient_id, x.amount
          FROM UNNEST($2::bigint[], $3::int[]) AS x(ingredient_id, amount)
        "#,
    )
    .bind(recipe_id)
    .bind(&ids)
    .bind(&amounts)
    .execute(&mut **tx)
    .await
    .context("insert recipe ingredients")?;

    Ok(())
}

pub async fn create(
    db: &PgPool,
    author_id: Uuid,
    write: &RecipeWrite,
    image: Option<&str>,
) -> anyhow::Result<i64> {
    let mut tx = db.begin().await.context("begin tx")?;

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO recipes (author_id, name, text, image, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(author_id)
    .bind(&write.name)
    .bind(&write.text)
    .bind(image)
    .bind(write.cooking_time)
    .fetch_one(&mut *tx)
    .await
    .context("insert recipe")?;

    replace_links(&mut tx, id, write).await?;
    tx.commit().await.context("commit tx")?;
    Ok(id)
}

/// Replace fields, tags and ingredients. `image` of `None` keeps the current image.
pub async fn update(
    db: &PgPool,
    id: i64,
    write: &RecipeWrite,
    image: Option<&str>,
) -> anyhow::Result<()> {
    let mut tx = db.begin().await.context("begin tx")?;

    sqlx::query(
        r#"
        UPDATE recipes
           SET name = $2, text = $3, cooking_time = $4, image = COALESCE($5, image)
         WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&write.name)
    .bind(&write.text)
    .bind(write.cooking_time)
    .bind(image)
    .execute(&mut *tx)
    .await
    .context("update recipe")?;

    replace_links(&mut tx, id, write).await?;
    tx.commit().await.context("commit tx")?;
    Ok(())
}

/// Tags, ingredients, favorites and cart rows cascade with the recipe.
pub async fn delete(db: &PgPool, id: i64) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(db)
        .await
        .context("delete recipe")?;
    Ok(res.rows_affected() > 0)
}

// ---- Author previews for the subscriptions feed ----

/// Newest recipes of each author, at most `per_author` each when given.
pub async fn short_by_authors(
    db: &PgPool,
    authors: &[Uuid],
    per_author: Option<i64>,
) -> anyhow::Result<Vec<RecipeShortRow>> {
    let rows = sqlx::query_as::<_, RecipeShortRow>(
        r#"
        SELECT author_id, id, name, image, cooking_time
          FROM (
                SELECT r.author_id, r.id, r.name, r.image, r.cooking_time, r.created_at,
                       ROW_NUMBER() OVER (PARTITION BY r.author_id
                                          ORDER BY r.created_at DESC, r.id DESC) AS rn
                  FROM recipes r
                 WHERE r.author_id = ANY($1)
               ) ranked
         WHERE $2::bigint IS NULL OR rn <= $2
         ORDER BY author_id, rn
        "#,
    )
    .bind(authors)
    .bind(per_author)
    .fetch_all(db)
    .await
    .context("load author recipes")?;
    Ok(rows)
}

pub async fn count_by_authors(db: &PgPool, authors: &[Uuid]) -> anyhow::Result<Vec<(Uuid, i64)>> {
    let rows: Vec<(Uuid, i64)> = sqlx::query_as(
        r#"
        SELECT author_id, COUNT(*)
          FROM recipes
         WHERE author_id = ANY($1)
         GROUP BY author_id
        "#,
    )
    .bind(authors)
    .fetch_all(db)
    .await
    .context("count author recipes")?;
    Ok(rows)
}

// ---- Favorites and shopping cart ----

/// Returns `false` when the recipe is already in the list.
pub async fn add_mark(
    db: &PgPool,
    mark: RecipeMark,
    user_id: Uuid,
    recipe_id: i64,
) -> anyhow::Result<bool> {
    let inserted: Option<(i64,)> = sqlx::query_as(&format!(
        r#"
        INSERT INTO {table} (user_id, recipe_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, recipe_id) DO NOTHING
        RETURNING id
        "#,
        table = mark.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .fetch_optional(db)
    .await
    .with_context(|| format!("insert into {}", mark.table()))?;
    Ok(inserted.is_some())
}

/// Returns `false` when the recipe was not in the list.
pub async fn remove_mark(
    db: &PgPool,
    mark: RecipeMark,
    user_id: Uuid,
    recipe_id: i64,
) -> anyhow::Result<bool> {
    let res = sqlx::query(&format!(
        "DELETE FROM {table} WHERE user_id = $1 AND recipe_id = $2",
        table = mark.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(db)
    .await
    .with_context(|| format!("delete from {}", mark.table()))?;
    Ok(res.rows_affected() > 0)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::ingredients::repo::{self as ingredients, NewIngredient};

    /// Insert ingredients by (name, unit) and return their ids in order.
    pub async fn ingredient_ids(db: &PgPool, items: &[(&str, &str)]) -> Vec<i64> {
        let new: Vec<NewIngredient> = items
            .iter()
            .map(|(n, u)| NewIngredient { name: n.to_string(), measurement_unit: u.to_string() })
            .collect();
        ingredients::insert_many(db, &new).await.unwrap();
        let mut ids = Vec::new();
        for (name, unit) in items {
            let (id,): (i64,) = sqlx::query_as(
                "SELECT id FROM ingredients WHERE name = $1 AND measurement_unit = $2",
            )
            .bind(name)
            .bind(unit)
            .fetch_one(db)
            .await
            .unwrap();
            ids.push(id);
        }
        ids
    }

    pub async fn first_tag(db: &PgPool) -> i64 {
        let (id,): (i64,) = sqlx::query_as("SELECT id FROM tags ORDER BY id LIMIT 1")
            .fetch_one(db)
            .await
            .unwrap();
        id
    }

    pub async fn insert_recipe(
        db: &PgPool,
        author: Uuid,
        name: &str,
        ingredients: Vec<(i64, i32)>,
    ) -> i64 {
        let write = RecipeWrite {
            name: name.into(),
            text: "mix and bake".into(),
            cooking_time: 10,
            tags: vec![first_tag(db).await],
            ingredients,
        };
        create(db, author, &write, None).await.unwrap()
    }
}

#[cfg(test)]
mod db_tests {
    use super::test_support::*;
    use super::*;
    use crate::users::repo::test_support::insert_user;

    async fn count(db: &PgPool, table: &str, recipe_id: i64) -> i64 {
        let (n,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM {table} WHERE recipe_id = $1"))
                .bind(recipe_id)
                .fetch_one(db)
                .await
                .unwrap();
        n
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn favorite_twice_keeps_one_row(db: PgPool) {
        let cook = insert_user(&db, "cook").await;
        let ids = ingredient_ids(&db, &[("flour", "g")]).await;
        let recipe = insert_recipe(&db, cook.id, "Bread", vec![(ids[0], 500)]).await;

        assert!(add_mark(&db, RecipeMark::Favorite, cook.id, recipe).await.unwrap());
        assert!(!add_mark(&db, RecipeMark::Favorite, cook.id, recipe).await.unwrap());
        assert_eq!(count(&db, "favorites", recipe).await, 1);

        let row = get(&db, Some(cook.id), recipe).await.unwrap().unwrap();
        assert!(row.is_favorited);
        assert!(!row.is_in_shopping_cart);
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn marking_a_missing_recipe_is_a_foreign_key_violation(db: PgPool) {
        let cook = insert_user(&db, "cook").await;
        let err = add_mark(&db, RecipeMark::ShoppingCart, cook.id, 424_242)
            .await
            .unwrap_err();
        assert!(crate::error::is_foreign_key_violation(&err));
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn deleting_a_recipe_cascades(db: PgPool) {
        let cook = insert_user(&db, "cook").await;
        let ids = ingredient_ids(&db, &[("flour", "g"), ("egg", "pcs")]).await;
        let recipe = insert_recipe(&db, cook.id, "Cake", vec![(ids[0], 200), (ids[1], 2)]).await;
        add_mark(&db, RecipeMark::Favorite, cook.id, recipe).await.unwrap();
        add_mark(&db, RecipeMark::ShoppingCart, cook.id, recipe).await.unwrap();

        assert!(delete(&db, recipe).await.unwrap());

        for table in ["ingredient_recipes", "recipe_tags", "favorites", "shopping_carts"] {
            assert_eq!(count(&db, table, recipe).await, 0, "{table} not cleaned up");
        }
        assert!(find(&db, recipe).await.unwrap().is_none());
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn filters_by_author_tag_and_marks(db: PgPool) {
        let alice = insert_user(&db, "alice").await;
        let bob = insert_user(&db, "bob").await;
        let ids = ingredient_ids(&db, &[("rice", "g")]).await;
        let a = insert_recipe(&db, alice.id, "Risotto", vec![(ids[0], 100)]).await;
        let b = insert_recipe(&db, bob.id, "Pilaf", vec![(ids[0], 200)]).await;
        add_mark(&db, RecipeMark::ShoppingCart, alice.id, b).await.unwrap();

        let by_alice = RecipeFilter { author: Some(alice.id), ..Default::default() };
        let (rows, total) = list(&db, None, &by_alice, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].id, a);

        let in_cart = RecipeFilter { in_cart_of: Some(alice.id), ..Default::default() };
        let (rows, _) = list(&db, Some(alice.id), &in_cart, 10, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, b);
        assert!(rows[0].is_in_shopping_cart);

        let unknown_tag = RecipeFilter { tags: vec!["no-such-tag".into()], ..Default::default() };
        let (rows, total) = list(&db, None, &unknown_tag, 10, 0).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 0);
    }
}
