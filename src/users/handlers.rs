use std::collections::HashMap;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        extractors::{AuthUser, MaybeAuthUser},
        services::{hash_password, verify_password},
    },
    error::{is_foreign_key_violation, is_unique_violation, AppError},
    extract::{ApiJson, ApiPath, ApiQuery},
    images::services::{discard_images, image_url},
    pagination::{Page, Pagination},
    recipes::{dto::RecipeShort, repo as recipes_repo},
    state::AppState,
    users::{
        dto::{
            RegisterRequest, RegisteredUser, SetPasswordRequest, SubscriptionResponse,
            SubscriptionsQuery, UserResponse,
        },
        repo,
        repo_types::{NewUser, User, UserWithFollow},
        services::{ensure_not_self, validate_password, validate_registration},
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(register))
        .route("/users/me", get(get_me).delete(delete_me))
        .route("/users/set_password", post(set_password))
        .route("/users/subscriptions", get(subscriptions))
        .route("/users/:id", get(get_user))
        .route("/users/:id/subscribe", post(subscribe).delete(unsubscribe))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(mut payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisteredUser>), AppError> {
    validate_registration(&mut payload)?;

    let (email_taken, username_taken) =
        User::taken(&state.db, &payload.email, &payload.username).await?;
    if email_taken {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }
    if username_taken {
        warn!(username = %payload.username, "username already taken");
        return Err(AppError::Conflict("Username already taken".into()));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(
        &state.db,
        NewUser {
            email: &payload.email,
            username: &payload.username,
            first_name: &payload.first_name,
            last_name: &payload.last_name,
            password_hash: &hash,
        },
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Email or username already registered".into())
        } else {
            error!(error = %e, "create user failed");
            AppError::Internal(e)
        }
    })?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(RegisteredUser::from(user))))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    ApiQuery(page): ApiQuery<Pagination>,
) -> Result<Json<Page<UserResponse>>, AppError> {
    let page = page.normalized();
    let (rows, count) = repo::list_users(&state.db, viewer, page.limit, page.offset).await?;
    Ok(Json(Page {
        count,
        results: rows.into_iter().map(UserResponse::from).collect(),
    }))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    repo::get_user(&state.db, viewer, id)
        .await?
        .map(|u| Json(UserResponse::from(u)))
        .ok_or_else(|| AppError::not_found("User"))
}

async fn current_user(state: &AppState, user_id: Uuid) -> Result<User, AppError> {
    User::find_by_id(&state.db, user_id).await?.ok_or_else(|| {
        warn!(%user_id, "token for a missing user");
        AppError::Unauthorized("User not found".into())
    })
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(UserResponse::own(current_user(&state, user_id).await?)))
}

#[instrument(skip(state))]
pub async fn delete_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<StatusCode, AppError> {
    let Some(images) = User::delete(&state.db, user_id).await? else {
        return Err(AppError::Unauthorized("User not found".into()));
    };
    info!(%user_id, images = images.len(), "account deleted");
    discard_images(&state, images).await;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn set_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<SetPasswordRequest>,
) -> Result<StatusCode, AppError> {
    validate_password(&payload.new_password)?;
    let user = current_user(&state, user_id).await?;

    if !verify_password(&payload.current_password, &user.password_hash)? {
        warn!(%user_id, "set_password with wrong current password");
        return Err(AppError::BadRequest("current_password: invalid password".into()));
    }

    let hash = hash_password(&payload.new_password)?;
    User::set_password_hash(&state.db, user_id, &hash).await?;
    info!(%user_id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}

/// Attach recipe previews and counts to followed authors.
async fn with_recipes(
    state: &AppState,
    authors: Vec<UserWithFollow>,
    recipes_limit: Option<i64>,
) -> Result<Vec<SubscriptionResponse>, AppError> {
    let ids: Vec<Uuid> = authors.iter().map(|a| a.id).collect();
    let per_author = recipes_limit.map(|l| l.max(0));

    let mut previews: HashMap<Uuid, Vec<RecipeShort>> = HashMap::new();
    for r in recipes_repo::short_by_authors(&state.db, &ids, per_author).await? {
        let image = image_url(state, r.image.as_deref()).await;
        previews.entry(r.author_id).or_default().push(RecipeShort {
            id: r.id,
            name: r.name,
            image,
            cooking_time: r.cooking_time,
        });
    }
    let counts: HashMap<Uuid, i64> = recipes_repo::count_by_authors(&state.db, &ids)
        .await?
        .into_iter()
        .collect();

    Ok(authors
        .into_iter()
        .map(|a| {
            let id = a.id;
            SubscriptionResponse {
                user: UserResponse::from(a),
                recipes: previews.remove(&id).unwrap_or_default(),
                recipes_count: counts.get(&id).copied().unwrap_or(0),
            }
        })
        .collect())
}

#[instrument(skip(state))]
pub async fn subscriptions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiQuery(q): ApiQuery<SubscriptionsQuery>,
) -> Result<Json<Page<SubscriptionResponse>>, AppError> {
    let page = Pagination {
        limit: q.limit,
        offset: q.offset,
    }
    .normalized();
    let (authors, count) =
        repo::list_subscriptions(&state.db, user_id, page.limit, page.offset).await?;
    let results = with_recipes(&state, authors, q.recipes_limit).await?;
    Ok(Json(Page { count, results }))
}

#[instrument(skip(state))]
pub async fn subscribe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(author_id): ApiPath<Uuid>,
    ApiQuery(q): ApiQuery<SubscriptionsQuery>,
) -> Result<(StatusCode, Json<SubscriptionResponse>), AppError> {
    if let Err(e) = ensure_not_self(user_id, author_id) {
        warn!(%user_id, "self-subscription rejected");
        return Err(e);
    }

    let author = repo::get_user(&state.db, Some(user_id), author_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let created = repo::follow(&state.db, user_id, author_id)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::not_found("User")
            } else {
                AppError::Internal(e)
            }
        })?;
    if !created {
        return Err(AppError::BadRequest("Already subscribed to this author".into()));
    }
    info!(%user_id, %author_id, "subscribed");

    let author = UserWithFollow {
        is_subscribed: true,
        ..author
    };
    let mut out = with_recipes(&state, vec![author], q.recipes_limit).await?;
    let body = out
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("subscription response missing")))?;
    Ok((StatusCode::CREATED, Json(body)))
}

#[instrument(skip(state))]
pub async fn unsubscribe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(author_id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    if User::find_by_id(&state.db, author_id).await?.is_none() {
        return Err(AppError::not_found("User"));
    }
    if !repo::unfollow(&state.db, user_id, author_id).await? {
        return Err(AppError::NotFound("Not subscribed to this author".into()));
    }
    info!(%user_id, %author_id, "unsubscribed");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod db_tests {
    use super::*;
    use crate::images::{
        services::{decode_data_uri, store_recipe_image},
        storage::MemoryImageStore,
    };
    use crate::recipes::{
        repo::test_support::{first_tag, ingredient_ids},
        repo_types::RecipeWrite,
    };
    use crate::users::repo::test_support::insert_user;
    use sqlx::PgPool;
    use std::sync::Arc;

    const PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    fn no_preview() -> SubscriptionsQuery {
        SubscriptionsQuery {
            limit: 10,
            offset: 0,
            recipes_limit: None,
        }
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn deleting_account_drops_recipe_images(db: PgPool) {
        let images = Arc::new(MemoryImageStore::default());
        let state = AppState::for_tests(db.clone(), images.clone());
        let cook = insert_user(&db, "cook").await;
        let ids = ingredient_ids(&db, &[("flour", "g")]).await;
        let write = RecipeWrite {
            name: "Bread".into(),
            text: "knead and bake".into(),
            cooking_time: 90,
            tags: vec![first_tag(&db).await],
            ingredients: vec![(ids[0], 500)],
        };

        let key = store_recipe_image(&state, decode_data_uri(PNG).unwrap())
            .await
            .unwrap();
        recipes_repo::create(&db, cook.id, &write, Some(&key)).await.unwrap();
        recipes_repo::create(&db, cook.id, &write, None).await.unwrap();
        assert_eq!(images.keys(), vec![key]);

        let status = delete_me(State(state.clone()), AuthUser(cook.id)).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(images.keys().is_empty());
        assert!(User::find_by_id(&db, cook.id).await.unwrap().is_none());

        let gone = delete_me(State(state), AuthUser(cook.id)).await;
        assert!(matches!(gone, Err(AppError::Unauthorized(_))));
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn second_follow_is_bad_request_and_absent_unfollow_is_not_found(db: PgPool) {
        let state = AppState::for_tests(db.clone(), Arc::new(MemoryImageStore::default()));
        let alice = insert_user(&db, "alice").await;
        let bob = insert_user(&db, "bob").await;

        let (status, Json(body)) = subscribe(
            State(state.clone()),
            AuthUser(alice.id),
            ApiPath(bob.id),
            ApiQuery(no_preview()),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(body.user.is_subscribed);
        assert_eq!(body.recipes_count, 0);

        let again = subscribe(
            State(state.clone()),
            AuthUser(alice.id),
            ApiPath(bob.id),
            ApiQuery(no_preview()),
        )
        .await;
        assert!(matches!(again, Err(AppError::BadRequest(_))));

        let missing = subscribe(
            State(state.clone()),
            AuthUser(alice.id),
            ApiPath(Uuid::new_v4()),
            ApiQuery(no_preview()),
        )
        .await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        let status = unsubscribe(State(state.clone()), AuthUser(alice.id), ApiPath(bob.id))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        let twice = unsubscribe(State(state), AuthUser(alice.id), ApiPath(bob.id)).await;
        assert!(matches!(twice, Err(AppError::NotFound(_))));
    }
}
