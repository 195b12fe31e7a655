use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::utils::api_response::ApiResponse;

/// JWT Claims issued by the identity service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject - User ID as String
    pub sub: String,
    /// The username of the authenticated user.
    pub username: String,
    /// Expiration timestamp (UNIX TIME)
    pub exp: usize,
}

impl Claims {
    /// Converts `sub` (user ID) to `i32`, or returns a descriptive error.
    pub fn user_id(&self) -> Result<i32, ApiResponse<()>> {
        self.sub.parse::<i32>().map_err(|_| {
            ApiResponse::error(
                StatusCode::UNAUTHORIZED,
                "Invalid user ID format in token",
                None,
            )
        })
    }
}

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::openapi::Components;
use utoipa::{Modify, OpenApi};

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut components = openapi.components.clone().unwrap_or(Components::default());
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
        openapi.components = Some(components);
    }
}

/// Tokens are issued elsewhere; this only documents the bearer scheme.
#[derive(OpenApi)]
#[openapi(modifiers(&SecurityAddon))]
pub struct AuthDoc;

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str) -> Claims {
        Claims {
            sub: sub.to_string(),
            username: "petrov".to_string(),
            exp: 0,
        }
    }

    #[test]
    fn numeric_subject_is_the_user_id() {
        assert_eq!(claims("42").user_id().ok(), Some(42));
    }

    #[test]
    fn non_numeric_subject_is_rejected() {
        let err = claims("petrov").user_id().unwrap_err();
        assert_eq!(err.status_code, 401);
    }

    #[test]
    fn bearer_scheme_is_documented() {
        let doc = AuthDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearerAuth"));
    }
}
