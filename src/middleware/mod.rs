use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

use crate::error::DomainError;

/// Verified caller identity, supplied by the upstream authentication
/// collaborator. The gateway strips these headers from the outside world and
/// injects them after verifying credentials, so the core trusts them as-is.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), DomainError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::Unauthorized)
        }
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "missing authenticated identity".to_string(),
            ))?
            .to_string();

        let role = match parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            None => Role::User,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "user" => Role::User,
                "admin" => Role::Admin,
                _ => {
                    return Err((
                        StatusCode::UNAUTHORIZED,
                        "unrecognized role".to_string(),
                    ))
                }
            },
        };

        Ok(Identity { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(req: Request<()>) -> Result<Identity, (StatusCode, String)> {
        let (mut parts, _) = req.into_parts();
        Identity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn missing_identity_is_rejected() {
        let req = Request::builder().body(()).unwrap();
        assert!(extract(req).await.is_err());
    }

    #[tokio::test]
    async fn role_defaults_to_user() {
        let req = Request::builder()
            .header(USER_ID_HEADER, "alice")
            .body(())
            .unwrap();
        let identity = extract(req).await.unwrap();
        assert_eq!(identity.user_id, "alice");
        assert_eq!(identity.role, Role::User);
        assert!(!identity.is_admin());
    }

    #[tokio::test]
    async fn admin_role_is_recognized() {
        let req = Request::builder()
            .header(USER_ID_HEADER, "root")
            .header(USER_ROLE_HEADER, "admin")
            .body(())
            .unwrap();
        let identity = extract(req).await.unwrap();
        assert!(identity.require_admin().is_ok());
    }

    #[tokio::test]
    async fn unknown_role_is_rejected() {
        let req = Request::builder()
            .header(USER_ID_HEADER, "bob")
            .header(USER_ROLE_HEADER, "superuser")
            .body(())
            .unwrap();
        assert!(extract(req).await.is_err());
    }
}
