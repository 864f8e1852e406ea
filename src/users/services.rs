use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use crate::auth::services::is_valid_email;
use crate::error::AppError;
use crate::users::dto::RegisterRequest;

const MAX_NAME_LEN: usize = 150;
const MAX_EMAIL_LEN: usize = 254;
pub const MIN_PASSWORD_LEN: usize = 8;

fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

/// Trim and normalize a registration payload, then validate it in place.
pub fn validate_registration(req: &mut RegisterRequest) -> Result<(), AppError> {
    req.email = req.email.trim().to_lowercase();
    req.username = req.username.trim().to_string();
    req.first_name = req.first_name.trim().to_string();
    req.last_name = req.last_name.trim().to_string();

    if req.email.len() > MAX_EMAIL_LEN || !is_valid_email(&req.email) {
        return Err(AppError::Validation("email: invalid email".into()));
    }
    if req.username.is_empty()
        || req.username.chars().count() > MAX_NAME_LEN
        || !is_valid_username(&req.username)
    {
        return Err(AppError::Validation(
            "username: letters, digits and @/./+/-/_ only, up to 150 characters".into(),
        ));
    }
    for (field, value) in [("first_name", &req.first_name), ("last_name", &req.last_name)] {
        if value.is_empty() || value.chars().count() > MAX_NAME_LEN {
            return Err(AppError::Validation(format!(
                "{field}: required, up to 150 characters"
            )));
        }
    }
    validate_password(&req.password)
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation("password: too short".into()));
    }
    Ok(())
}

/// A user may not subscribe to themselves.
pub fn ensure_not_self(user_id: Uuid, author_id: Uuid) -> Result<(), AppError> {
    if user_id == author_id {
        return Err(AppError::BadRequest("You cannot subscribe to yourself".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RegisterRequest {
        RegisterRequest {
            email: "  Cook@Example.COM ".into(),
            username: "cook_42".into(),
            first_name: "Julia".into(),
            last_name: "Child".into(),
            password: "long-enough".into(),
        }
    }

    #[test]
    fn normalizes_email() {
        let mut req = request();
        validate_registration(&mut req).unwrap();
        assert_eq!(req.email, "cook@example.com");
    }

    #[test]
    fn rejects_bad_username_and_short_password() {
        let mut req = request();
        req.username = "no spaces".into();
        assert!(matches!(validate_registration(&mut req), Err(AppError::Validation(_))));

        let mut req = request();
        req.password = "short".into();
        assert!(matches!(validate_registration(&mut req), Err(AppError::Validation(_))));

        let mut req = request();
        req.last_name = "   ".into();
        assert!(matches!(validate_registration(&mut req), Err(AppError::Validation(_))));
    }

    #[test]
    fn self_subscription_is_rejected() {
        let me = Uuid::new_v4();
        assert!(matches!(ensure_not_self(me, me), Err(AppError::BadRequest(_))));
        assert!(ensure_not_self(me, Uuid::new_v4()).is_ok());
    }
}
