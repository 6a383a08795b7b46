use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};

use super::{PgStore, text_enum};
use crate::account::Role;
use crate::audit::{AuditLog, AuditPerformer, AuditQuery};
use crate::db::store::AuditStore;
use crate::error::LibraryResult;
use crate::pagination::Page;

fn row_to_audit_log(row: &PgRow) -> Result<AuditLog, sqlx::Error> {
    // performer columns are NULL once the user is gone
    let performer_name: Option<String> = row.try_get("performer_name")?;
    let performed_by = match performer_name {
        Some(name) => {
            let role: Option<Role> = super::optional_text_enum(row, "performer_role")?;
            Some(AuditPerformer {
                id: row.try_get("performed_by_id")?,
                name,
                email: row.try_get::<Option<String>, _>("performer_email")?.unwrap_or_default(),
                role: role.unwrap_or(Role::Student),
            })
        }
        None => None,
    };

    Ok(AuditLog {
        id: row.try_get("id")?,
        entity: text_enum(row, "entity")?,
        entity_id: row.try_get("entity_id")?,
        action: text_enum(row, "action")?,
        performed_by_id: row.try_get("performed_by_id")?,
        meta: row.try_get("meta")?,
        timestamp: row.try_get("timestamp")?,
        performed_by,
    })
}

fn push_audit_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &AuditQuery) {
    qb.push(" WHERE TRUE");
    if let Some(entity) = query.entity {
        qb.push(" AND a.entity = ").push_bind(entity.as_str());
    }
    if let Some(action) = query.action {
        qb.push(" AND a.action = ").push_bind(action.as_str());
    }
    if let Some(performer) = query.performed_by_id {
        qb.push(" AND a.performed_by_id = ").push_bind(performer);
    }
    if let Some(start) = query.start_date {
        qb.push(" AND a.timestamp >= ").push_bind(start);
    }
    if let Some(end) = query.end_date {
        qb.push(" AND a.timestamp <= ").push_bind(end);
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn list_audit_logs(&self, query: &AuditQuery) -> LibraryResult<Page<AuditLog>> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs_tb a");
        push_audit_filters(&mut count_qb, query);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT a.*, u.name AS performer_name, u.email AS performer_email, u.role AS performer_role
            FROM audit_logs_tb a
            LEFT JOIN users_tb u ON u.id = a.performed_by_id
            "#,
        );
        push_audit_filters(&mut qb, query);
        qb.push(" ORDER BY a.timestamp DESC, a.id DESC LIMIT ")
            .push_bind(query.window.limit)
            .push(" OFFSET ")
            .push_bind(query.window.offset());

        let data = qb
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_audit_log)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::offset(data, query.window, total))
    }
}
