use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::{PgStore, contains_pattern, text_enum};
use crate::account::{
    NewUser, Role, User, UserActivityCounts, UserCredentials, UserQuery, UserSummary,
};
use crate::audit::{self, AuditEntry};
use crate::db::store::UserStore;
use crate::error::{LibraryError, LibraryResult};
use crate::pagination::Page;

const USER_COLUMNS: &str = "u.id, u.email, u.name, u.role, u.email_verified, u.created_at, u.updated_at";

const COUNT_COLUMNS: &str = r#"
    (SELECT COUNT(*) FROM resources_tb r WHERE r.uploaded_by_id = u.id) AS uploaded_resources,
    (SELECT COUNT(*) FROM download_logs_tb d WHERE d.user_id = u.id) AS download_logs,
    (SELECT COUNT(*) FROM requests_tb q WHERE q.user_id = u.id) AS requests
"#;

fn row_to_user(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        role: text_enum(row, "role")?,
        email_verified: row.try_get("email_verified")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_counts(row: &PgRow, with_searches: bool) -> Result<UserActivityCounts, sqlx::Error> {
    Ok(UserActivityCounts {
        uploaded_resources: row.try_get("uploaded_resources")?,
        download_logs: row.try_get("download_logs")?,
        requests: row.try_get("requests")?,
        search_logs: if with_searches {
            Some(row.try_get("search_logs")?)
        } else {
            None
        },
    })
}

fn push_user_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &UserQuery) {
    qb.push(" WHERE TRUE");
    if let Some(role) = query.role {
        qb.push(" AND u.role = ").push_bind(role.as_str());
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = contains_pattern(search);
        qb.push(" AND (u.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: &NewUser) -> LibraryResult<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users_tb (id, email, name, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, name, role, email_verified, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_user(&row)?)
    }

    async fn find_user(&self, id: Uuid) -> LibraryResult<Option<User>> {
        let sql = format!("SELECT {} FROM users_tb u WHERE u.id = $1", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_user).transpose()?)
    }

    async fn find_credentials(&self, email: &str) -> LibraryResult<Option<UserCredentials>> {
        let sql = format!(
            "SELECT {}, u.password_hash FROM users_tb u WHERE u.email = $1",
            USER_COLUMNS
        );
        let Some(row) = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(UserCredentials {
            user: row_to_user(&row)?,
            password_hash: row.try_get("password_hash")?,
        }))
    }

    async fn user_summary(&self, id: Uuid) -> LibraryResult<Option<UserSummary>> {
        let sql = format!(
            r#"
            SELECT {}, {},
                (SELECT COUNT(*) FROM search_logs_tb s WHERE s.user_id = u.id) AS search_logs
            FROM users_tb u
            WHERE u.id = $1
            "#,
            USER_COLUMNS, COUNT_COLUMNS
        );
        let Some(row) = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(UserSummary {
            user: row_to_user(&row)?,
            counts: row_to_counts(&row, true)?,
        }))
    }

    async fn list_users(&self, query: &UserQuery) -> LibraryResult<Page<UserSummary>> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users_tb u");
        push_user_filters(&mut count_qb, query);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let column = query.sort_by.column();
        let dir = query.sort_order.as_sql();
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {}, {} FROM users_tb u",
            USER_COLUMNS, COUNT_COLUMNS
        ));
        push_user_filters(&mut qb, query);
        qb.push(format!(" ORDER BY u.{column} {dir}, u.id {dir} LIMIT "))
            .push_bind(query.window.limit)
            .push(" OFFSET ")
            .push_bind(query.window.offset());

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut data = Vec::with_capacity(rows.len());
        for row in &rows {
            data.push(UserSummary {
                user: row_to_user(row)?,
                counts: row_to_counts(row, false)?,
            });
        }
        Ok(Page::offset(data, query.window, total))
    }

    async fn update_user_role(
        &self,
        id: Uuid,
        role: Role,
        audit: &AuditEntry,
    ) -> LibraryResult<User> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            r#"
            UPDATE users_tb SET role = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, name, role, email_verified, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(role.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| LibraryError::not_found("User"))?;

        audit::record(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(row_to_user(&row)?)
    }

    async fn delete_user(&self, id: Uuid, audit: &AuditEntry) -> LibraryResult<()> {
        let mut tx = self.pool.begin().await?;

        // Lock every admin row plus the target so two concurrent deletes
        // cannot both see a second admin.
        let rows = sqlx::query(
            "SELECT id, role FROM users_tb WHERE role = 'ADMIN' OR id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let mut target_role = None;
        let mut admins = 0usize;
        for row in &rows {
            let role: Role = text_enum(row, "role")?;
            if role == Role::Admin {
                admins += 1;
            }
            let row_id: Uuid = row.try_get("id")?;
            if row_id == id {
                target_role = Some(role);
            }
        }

        let Some(role) = target_role else {
            return Err(LibraryError::not_found("User"));
        };
        if role == Role::Admin && admins <= 1 {
            return Err(LibraryError::BadRequest(
                "Cannot delete the last admin".to_string(),
            ));
        }

        sqlx::query("DELETE FROM users_tb WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        audit::record(&mut *tx, audit).await?;
        tx.commit().await?;

        tracing::info!(user_id = %id, "User deleted");
        Ok(())
    }
}
