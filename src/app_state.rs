use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::middleware::auth::PermissionCache;
use crate::utils::notification::NotificationSink;
use crate::workflow::roles::TransitionPolicy;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub notifier: Arc<dyn NotificationSink>,
    pub policy: Arc<TransitionPolicy>,
    pub permission_cache: PermissionCache,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
