use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
    pub slug: String,
}

pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Tag>> {
    let rows = sqlx::query_as::<_, Tag>("SELECT id, name, color, slug FROM tags ORDER BY id")
        .fetch_all(db)
        .await
        .context("list tags")?;
    Ok(rows)
}

pub async fn get(db: &PgPool, id: i64) -> anyhow::Result<Option<Tag>> {
    let row = sqlx::query_as::<_, Tag>("SELECT id, name, color, slug FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await
        .context("get tag")?;
    Ok(row)
}

/// Ids from `ids` that have no tag row.
pub async fn missing(db: &PgPool, ids: &[i64]) -> anyhow::Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT want.id
          FROM UNNEST($1::bigint[]) AS want(id)
         WHERE NOT EXISTS (SELECT 1 FROM tags t WHERE t.id = want.id)
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await
    .context("check tags exist")?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
