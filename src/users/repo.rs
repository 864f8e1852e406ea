use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use crate::users::repo_types::{NewUser, User, UserWithFollow};

const USER_COLUMNS: &str =
    "id, email, username, first_name, last_name, password_hash, is_staff, created_at";

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    /// Returns `(email_taken, username_taken)`.
    pub async fn taken(db: &PgPool, email: &str, username: &str) -> anyhow::Result<(bool, bool)> {
        let row: (bool, bool) = sqlx::query_as(
            r#"
            SELECT EXISTS (SELECT 1 FROM users WHERE email = $1),
                   EXISTS (SELECT 1 FROM users WHERE username = $2)
            "#,
        )
        .bind(email)
        .bind(username)
        .fetch_one(db)
        .await
        .context("check email/username")?;
        Ok(row)
    }

    /// Create a new user with hashed password.
    pub async fn create(db: &PgPool, new: NewUser<'_>) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, username, first_name, last_name, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new.email)
        .bind(new.username)
        .bind(new.first_name)
        .bind(new.last_name)
        .bind(new.password_hash)
        .fetch_one(db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    pub async fn set_password_hash(db: &PgPool, id: Uuid, hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(db)
            .await
            .context("update password")?;
        Ok(())
    }

    /// Grant or revoke staff rights. Returns `false` when no user has that email.
    pub async fn set_staff(db: &PgPool, email: &str, is_staff: bool) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE users SET is_staff = $2 WHERE email = lower(trim($1))")
            .bind(email)
            .bind(is_staff)
            .execute(db)
            .await
            .context("update staff flag")?;
        Ok(res.rows_affected() > 0)
    }

    /// Remove the user with everything they own. Returns the image keys of
    /// their recipes so the objects can be dropped too, or `None` if no such user.
    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Vec<String>>> {
        let mut tx = db.begin().await.context("begin tx")?;

        let images: Vec<(Option<String>,)> =
            sqlx::query_as("DELETE FROM recipes WHERE author_id = $1 RETURNING image")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .context("delete user recipes")?;

        // follows, favorites and cart rows cascade
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("delete user")?;
        if res.rows_affected() == 0 {
            return Ok(None);
        }

        tx.commit().await.context("commit tx")?;
        Ok(Some(images.into_iter().filter_map(|(key,)| key).collect()))
    }
}

// ---- Listing with viewer context ----

pub async fn list_users(
    db: &PgPool,
    viewer: Option<Uuid>,
    limit: i64,
    offset: i64,
) -> anyhow::Result<(Vec<UserWithFollow>, i64)> {
    let rows = sqlx::query_as::<_, UserWithFollow>(
        r#"
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
               EXISTS (SELECT 1 FROM follows f WHERE f.user_id = $1 AND f.author_id = u.id)
                   AS is_subscribed
          FROM users u
         ORDER BY u.username
         LIMIT $2 OFFSET $3
        "#,
    )
    .bind(viewer)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("list users")?;

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(db)
        .await
        .context("count users")?;

    Ok((rows, count))
}

pub async fn get_user(
    db: &PgPool,
    viewer: Option<Uuid>,
    id: Uuid,
) -> anyhow::Result<Option<UserWithFollow>> {
    let row = sqlx::query_as::<_, UserWithFollow>(
        r#"
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
               EXISTS (SELECT 1 FROM follows f WHERE f.user_id = $1 AND f.author_id = u.id)
                   AS is_subscribed
          FROM users u
         WHERE u.id = $2
        "#,
    )
    .bind(viewer)
    .bind(id)
    .fetch_optional(db)
    .await
    .context("get user")?;
    Ok(row)
}

pub async fn users_by_ids(
    db: &PgPool,
    viewer: Option<Uuid>,
    ids: &[Uuid],
) -> anyhow::Result<Vec<UserWithFollow>> {
    let rows = sqlx::query_as::<_, UserWithFollow>(
        r#"
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
               EXISTS (SELECT 1 FROM follows f WHERE f.user_id = $1 AND f.author_id = u.id)
                   AS is_subscribed
          FROM users u
         WHERE u.id = ANY($2)
        "#,
    )
    .bind(viewer)
    .bind(ids)
    .fetch_all(db)
    .await
    .context("load users by id")?;
    Ok(rows)
}

// ---- Follows ----

/// Returns `false` when the pair already exists.
pub async fn follow(db: &PgPool, user_id: Uuid, author_id: Uuid) -> anyhow::Result<bool> {
    let inserted: Option<(i64,)> = sqlx::query_as(
        r#"
        INSERT INTO follows (user_id, author_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, author_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(author_id)
    .fetch_optional(db)
    .await
    .context("insert follow")?;
    Ok(inserted.is_some())
}

/// Returns `false` when there was nothing to remove.
pub async fn unfollow(db: &PgPool, user_id: Uuid, author_id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
        .bind(user_id)
        .bind(author_id)
        .execute(db)
        .await
        .context("delete follow")?;
    Ok(res.rows_affected() > 0)
}

pub async fn list_subscriptions(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> anyhow::Result<(Vec<UserWithFollow>, i64)> {
    let rows = sqlx::query_as::<_, UserWithFollow>(
        r#"
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
               TRUE AS is_subscribed
          FROM follows f
          JOIN users u ON u.id = f.author_id
         WHERE f.user_id = $1
         ORDER BY f.created_at DESC, f.id DESC
         LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("list subscriptions")?;

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM follows WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(db)
        .await
        .context("count subscriptions")?;

    Ok((rows, count))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub async fn insert_user(db: &PgPool, name: &str) -> User {
        User::create(
            db,
            NewUser {
                email: &format!("{name}@example.com"),
                username: name,
                first_name: name,
                last_name: "Tester",
                password_hash: "x",
            },
        )
        .await
        .expect("insert user")
    }
}
