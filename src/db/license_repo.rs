// src/db/license_repo.rs

use sqlx::{Executor, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::license::{License, LicenseStatus},
};

const LICENSE_CONFLICT: &str = "Este aluno já possui uma licença neste plano.";

// Filtro de status em texto; lista vazia significa "todas"
fn status_filter(statuses: &[LicenseStatus]) -> Vec<String> {
    statuses.iter().map(|status| status.to_string()).collect()
}

// Repositório de licenças
#[derive(Clone)]
pub struct LicenseRepository {
    pool: PgPool,
}

impl LicenseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ---
    // Funções de "Leitura"
    // ---

    pub async fn find(&self, uuid: Uuid) -> Result<Option<License>, AppError> {
        let license = sqlx::query_as::<_, License>("SELECT * FROM licenses WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(license)
    }

    pub async fn find_by_activation_key(&self, key: Uuid) -> Result<Option<License>, AppError> {
        let license = sqlx::query_as::<_, License>("SELECT * FROM licenses WHERE activation_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(license)
    }

    pub async fn list_for_plan(
        &self,
        plan_uuid: Uuid,
        statuses: &[LicenseStatus],
    ) -> Result<Vec<License>, AppError> {
        let licenses = sqlx::query_as::<_, License>(
            r#"
            SELECT * FROM licenses
            WHERE subscription_plan_uuid = $1
              AND (cardinality($2::text[]) = 0 OR status::text = ANY($2))
            ORDER BY created ASC
            "#,
        )
            .bind(plan_uuid)
            .bind(status_filter(statuses))
            .fetch_all(&self.pool)
            .await?;
        Ok(licenses)
    }

    pub async fn count_for_plan(
        &self,
        plan_uuid: Uuid,
        statuses: &[LicenseStatus],
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM licenses
            WHERE subscription_plan_uuid = $1
              AND (cardinality($2::text[]) = 0 OR status::text = ANY($2))
            "#,
        )
            .bind(plan_uuid)
            .bind(status_filter(statuses))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn list_by_user_email(&self, user_email: &str) -> Result<Vec<License>, AppError> {
        let licenses = sqlx::query_as::<_, License>(
            "SELECT * FROM licenses WHERE user_email = $1 ORDER BY created ASC",
        )
            .bind(user_email)
            .fetch_all(&self.pool)
            .await?;
        Ok(licenses)
    }

    // ---
    // Funções de "Escrita" (sempre dentro de uma transação aberta pelo store)
    // ---

    /// Insere as licenças em lotes de `batch_size` (um INSERT por lote).
    pub async fn insert_many(
        &self,
        conn: &mut PgConnection,
        licenses: &[License],
        batch_size: usize,
    ) -> Result<(), AppError> {
        for chunk in licenses.chunks(batch_size.max(1)) {
            let mut query = QueryBuilder::<Postgres>::new(
                "INSERT INTO licenses (uuid, status, assigned_date, activation_date, activation_key, \
                 last_remind_date, revoked_date, user_email, lms_user_id, subscription_plan_uuid, \
                 created, modified) ",
            );
            query.push_values(chunk, |mut row, license| {
                row.push_bind(license.uuid)
                    .push_bind(license.status)
                    .push_bind(license.assigned_date)
                    .push_bind(license.activation_date)
                    .push_bind(license.activation_key)
                    .push_bind(license.last_remind_date)
                    .push_bind(license.revoked_date)
                    .push_bind(license.user_email.clone())
                    .push_bind(license.lms_user_id)
                    .push_bind(license.subscription_plan_uuid)
                    .push_bind(license.created)
                    .push_bind(license.modified);
            });
            query
                .build()
                .execute(&mut *conn)
                .await
                .map_err(|e| AppError::from_db(e, LICENSE_CONFLICT))?;
        }
        Ok(())
    }

    pub async fn update<'e, E>(&self, executor: E, license: &License) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE licenses
            SET status = $2, assigned_date = $3, activation_date = $4, activation_key = $5,
                last_remind_date = $6, revoked_date = $7, user_email = $8, lms_user_id = $9,
                modified = $10
            WHERE uuid = $1
            "#,
        )
            .bind(license.uuid)
            .bind(license.status)
            .bind(license.assigned_date)
            .bind(license.activation_date)
            .bind(license.activation_key)
            .bind(license.last_remind_date)
            .bind(license.revoked_date)
            .bind(&license.user_email)
            .bind(license.lms_user_id)
            .bind(license.modified)
            .execute(executor)
            .await
            .map_err(|e| AppError::from_db(e, LICENSE_CONFLICT))?;

        if result.rows_affected() == 0 {
            return Err(AppError::LicenseNotFound);
        }
        Ok(())
    }

    pub async fn update_many(
        &self,
        conn: &mut PgConnection,
        licenses: &[License],
        batch_size: usize,
    ) -> Result<(), AppError> {
        for (index, chunk) in licenses.chunks(batch_size.max(1)).enumerate() {
            for license in chunk {
                self.update(&mut *conn, license).await?;
            }
            tracing::debug!("Lote {} de licenças atualizado ({} registros)", index + 1, chunk.len());
        }
        Ok(())
    }

    pub async fn delete_many(&self, conn: &mut PgConnection, uuids: &[Uuid]) -> Result<u64, AppError> {
        if uuids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM licenses WHERE uuid = ANY($1)")
            .bind(uuids)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}
