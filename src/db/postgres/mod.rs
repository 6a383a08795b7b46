//! PostgreSQL store
//!
//! Runtime queries only (no compile-time database connection). Mutations
//! open a transaction, apply the change, write the audit row through
//! [`crate::audit::record`] and commit.

mod audit;
mod metrics;
mod requests;
mod resources;
mod sessions;
mod users;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;

use crate::account::UserRef;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Decode a TEXT column into one of the domain enums
fn text_enum<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}

fn optional_text_enum<T>(row: &PgRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr<Err = String>,
{
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| {
        s.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: e.into(),
        })
    })
    .transpose()
}

/// `uploader_*` / `user_*` joined columns
fn user_ref(row: &PgRow, id_col: &str, name_col: &str, email_col: Option<&str>) -> Result<UserRef, sqlx::Error> {
    Ok(UserRef {
        id: row.try_get(id_col)?,
        name: row.try_get(name_col)?,
        email: match email_col {
            Some(col) => Some(row.try_get(col)?),
            None => None,
        },
    })
}

/// ILIKE pattern for a substring match with wildcards in the input escaped
fn contains_pattern(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() + 2);
    escaped.push('%');
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}
