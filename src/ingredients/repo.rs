use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
}

/// An ingredient to insert, as read from a reference data file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewIngredient {
    pub name: String,
    pub measurement_unit: String,
}

/// Escape `%`, `_` and `\` so user input matches literally inside `LIKE`.
pub(crate) fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Case-insensitive prefix search on name; `None` lists everything.
pub async fn search(db: &PgPool, prefix: Option<&str>) -> anyhow::Result<Vec<Ingredient>> {
    let pattern = prefix
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("{}%", escape_like(&p.to_lowercase())));

    let rows = sqlx::query_as::<_, Ingredient>(
        r#"
        SELECT id, name, measurement_unit
          FROM ingredients
         WHERE $1::text IS NULL OR lower(name) LIKE $1
         ORDER BY name, measurement_unit
        "#,
    )
    .bind(pattern)
    .fetch_all(db)
    .await
    .context("search ingredients")?;
    Ok(rows)
}

pub async fn get(db: &PgPool, id: i64) -> anyhow::Result<Option<Ingredient>> {
    let row = sqlx::query_as::<_, Ingredient>(
        "SELECT id, name, measurement_unit FROM ingredients WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(db)
    .await
    .context("get ingredient")?;
    Ok(row)
}

/// Ids from `ids` that have no ingredient row.
pub async fn missing(db: &PgPool, ids: &[i64]) -> anyhow::Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT want.id
          FROM UNNEST($1::bigint[]) AS want(id)
         WHERE NOT EXISTS (SELECT 1 FROM ingredients i WHERE i.id = want.id)
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await
    .context("check ingredients exist")?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Insert in one statement, skipping pairs that already exist. Returns rows inserted.
pub async fn insert_many(db: &PgPool, items: &[NewIngredient]) -> anyhow::Result<u64> {
    let (names, units): (Vec<&str>, Vec<&str>) = items
        .iter()
        .map(|i| (i.name.as_str(), i.measurement_unit.as_str()))
        .unzip();

    let res = sqlx::query(
        r#"
        INSERT INTO ingredients (name, measurement_unit)
        SELECT * FROM UNNEST($1::text[], $2::text[])
        ON CONFLICT (name, measurement_unit) DO NOTHING
        "#,
    )
    .bind(&names)
    .bind(&units)
    .execute(db)
    .await
    .context("insert ingredients")?;
    Ok(res.rows_affected())
}
