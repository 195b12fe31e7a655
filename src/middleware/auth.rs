use std::collections::HashSet;
use std::sync::Arc;
use axum::{
    extract::{Request, State},
    body::Body,
    http::StatusCode,
    middleware::Next,
    response::{Response, IntoResponse},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::error;
use moka::sync::Cache; // ✅ High-performance TTL Cache
use std::time::Duration;
use crate::app_state::AppState;
use crate::config::Config;
use crate::utils::api_response::ApiResponse;
use crate::workflow::roles::{Actor, Role};
use serde_json::json;
use crate::api::auth::Claims;

/// ✅ **RBAC Permissions Cache Using `moka`**
pub type PermissionCache = Arc<Cache<i32, UserPermissions>>;

/// ✅ **Initialize the `moka` Cache**
pub fn create_permission_cache(ttl_secs: u64) -> PermissionCache {
    Arc::new(
        Cache::builder()
            .time_to_live(Duration::from_secs(ttl_secs))
            .build(),
    )
}

/// ✅ **JWT Middleware** (Handles Token Authentication)
pub async fn jwt_middleware(
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    // Step 1: Extract Authorization header
    let auth_header = req.headers().get("Authorization").ok_or_else(|| {
        tracing::warn!("Missing Authorization header");
        ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, "Missing Authorization header", None).into_response()
    })?;

    // Step 2: Convert header to string
    let token_str = auth_header.to_str().map_err(|_| {
        tracing::warn!("Invalid Authorization header format");
        ApiResponse::<()>::error(StatusCode::BAD_REQUEST, "Invalid Authorization header format", None).into_response()
    })?;

    // Step 3: Strip "Bearer " prefix
    let token = token_str.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::warn!("Invalid token format (missing 'Bearer ' prefix)");
        ApiResponse::<()>::error(StatusCode::BAD_REQUEST, "Invalid token format (missing 'Bearer ' prefix)", None).into_response()
    })?;

    let config = Config::try_get().ok_or_else(|| {
        error!("Config not initialized, cannot verify tokens");
        ApiResponse::<()>::error(StatusCode::INTERNAL_SERVER_ERROR, "Server is not configured", None).into_response()
    })?;

    // Step 4: Decode the JWT token
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::warn!("JWT decoding failed: {:?}", e);
        ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, "Invalid token", Some(json!({ "error": e.to_string() }))).into_response()
    })?;

    // Step 5: Insert claims into request extensions
    tracing::debug!(user = %token_data.claims.username, "JWT decoded successfully");
    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}

/// ✅ **User Permissions Structure**
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserPermissions {
    pub user_id: i32,
    pub username: String,
    pub company_id: i32,
    pub role: Role,
    /// `resource:action` pairs granted by the access matrix
    pub capabilities: HashSet<String>,
}

impl UserPermissions {
    /// ✅ **Check if user is a company administrator**
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// ✅ **Single capability query used by every handler**
    pub fn has_capability(&self, resource: &str, action: &str) -> bool {
        self.is_admin() || self.capabilities.contains(&capability_key(resource, action))
    }

    /// ✅ **Request-scoped actor passed into workflow operations**
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id,
            company_id: self.company_id,
            role: self.role,
            username: self.username.clone(),
        }
    }

    pub fn require_capability(&self, resource: &str, action: &str) -> Result<(), ApiResponse<()>> {
        if self.has_capability(resource, action) {
            return Ok(());
        }
        Err(ApiResponse::error(
            StatusCode::FORBIDDEN,
            format!("Missing capability {}", capability_key(resource, action)),
            Some(json!({ "kind": "authorization_error", "rule": capability_key(resource, action) })),
        ))
    }
}

pub fn capability_key(resource: &str, action: &str) -> String {
    format!("{}:{}", resource, action)
}

/// ✅ **RBAC Middleware with `moka`**
pub async fn rbac_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let claims = req.extensions()
        .get::<Claims>()
        .cloned()
        .ok_or_else(|| {
            error!("Missing JWT claims in request");
            ApiResponse::<()>::error(
                StatusCode::UNAUTHORIZED,
                "Missing JWT claims in request",
                None,
            ).into_response()
        })?;

    let user_id = claims.user_id().map_err(|e| e.into_response())?;

    // ✅ **Check cache first before querying DB**
    if let Some(cached_permissions) = state.permission_cache.get(&user_id) {
        req.extensions_mut().insert(cached_permissions);
        return Ok(next.run(req).await);
    }

    // ❌ **If not cached, query database**
    let user_permissions = match fetch_rbac_from_db(user_id, &state.pool).await {
        Ok(Some(permissions)) => permissions,
        Ok(None) => {
            return Err(ApiResponse::<()>::error(
                StatusCode::UNAUTHORIZED,
                "User is unknown or locked",
                None,
            ).into_response());
        }
        Err(err) => {
            error!("Database query failed: {:?}", err);
            return Err(ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load user permissions",
                Some(json!({ "error": err.to_string() })),
            ).into_response());
        }
    };

    state.permission_cache.insert(user_id, user_permissions.clone());

    req.extensions_mut().insert(user_permissions);
    Ok(next.run(req).await)
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i32,
    username: String,
    company_id: i32,
    role: Role,
}

/// ✅ **Query Database for RBAC Data**
async fn fetch_rbac_from_db(user_id: i32, pool: &PgPool) -> Result<Option<UserPermissions>, sqlx::Error> {
    let user = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, username, company_id, role
        FROM users
        WHERE id = $1 AND account_locked = FALSE AND deleted_at IS NULL
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some(user) = user else {
        return Ok(None);
    };

    let capabilities: Vec<(String, String)> = sqlx::query_as(
        "SELECT resource, action FROM role_capabilities WHERE company_id = $1 AND role = $2",
    )
    .bind(user.company_id)
    .bind(user.role)
    .fetch_all(pool)
    .await?;

    Ok(Some(UserPermissions {
        user_id: user.id,
        username: user.username,
        company_id: user.company_id,
        role: user.role,
        capabilities: capabilities
            .into_iter()
            .map(|(resource, action)| capability_key(&resource, &action))
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permissions(role: Role, caps: &[&str]) -> UserPermissions {
        UserPermissions {
            user_id: 1,
            username: "ivanov".into(),
            company_id: 2,
            role,
            capabilities: caps.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn capability_comes_from_the_access_matrix() {
        let foreman = permissions(Role::Foreman, &["material_request_items:cancel"]);
        assert!(foreman.has_capability("material_request_items", "cancel"));
        assert!(!foreman.has_capability("approval_templates", "manage"));
    }

    #[test]
    fn admin_holds_every_capability() {
        let admin = permissions(Role::Admin, &[]);
        assert!(admin.has_capability("approval_templates", "manage"));
    }

    #[test]
    fn actor_carries_identity_and_role() {
        let actor = permissions(Role::Director, &[]).actor();
        assert_eq!(actor.company_id, 2);
        assert_eq!(actor.role, Role::Director);
    }
}
