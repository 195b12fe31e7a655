use sqlx::PgConnection;

use crate::workflow::roles::{Role, StaffedRoles};

/// Roles currently held by at least one active user of the company.
pub async fn load_staffed_roles(
    conn: &mut PgConnection,
    company_id: i32,
) -> Result<StaffedRoles, sqlx::Error> {
    let roles: Vec<Role> = sqlx::query_scalar(
        r#"
        SELECT DISTINCT role
        FROM users
        WHERE company_id = $1 AND account_locked = FALSE AND deleted_at IS NULL
        "#,
    )
    .bind(company_id)
    .fetch_all(conn)
    .await?;

    Ok(StaffedRoles::new(company_id, roles))
}
