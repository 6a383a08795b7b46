use async_trait::async_trait;
use uuid::Uuid;

use super::PgStore;
use crate::db::store::SessionStore;
use crate::error::LibraryResult;
use crate::user_auth::RefreshTokenRecord;

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> LibraryResult<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens_tb (jti, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(record.jti)
        .bind(record.user_id)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        old_jti: Uuid,
        next: &RefreshTokenRecord,
    ) -> LibraryResult<bool> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens_tb SET revoked_at = NOW()
            WHERE jti = $1 AND user_id = $2 AND revoked_at IS NULL AND expires_at > NOW()
            "#,
        )
        .bind(old_jti)
        .bind(next.user_id)
        .execute(&mut *tx)
        .await?;
        if revoked.rows_affected() != 1 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO refresh_tokens_tb (jti, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(next.jti)
        .bind(next.user_id)
        .bind(next.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn revoke_user_refresh_tokens(&self, user_id: Uuid) -> LibraryResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens_tb SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
