use anyhow::Context;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// One ingredient usage of one recipe in a user's cart.
#[derive(Debug, Clone, FromRow)]
pub struct CartIngredientRow {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

pub async fn cart_ingredients(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<CartIngredientRow>> {
    let rows = sqlx::query_as::<_, CartIngredientRow>(
        r#"
        SELECT i.name, i.measurement_unit, ir.amount
          FROM shopping_carts sc
          JOIN ingredient_recipes ir ON ir.recipe_id = sc.recipe_id
          JOIN ingredients i ON i.id = ir.ingredient_id
         WHERE sc.user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("load cart ingredients")?;
    Ok(rows)
}
