// src/db/history_repo.rs

use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    common::{error::AppError, utils::utc_now},
    models::history::{Audited, ChangeType, HistoryRecord},
};

// Linha crua de uma tabela historical_*
type HistoryRow<T> = (i64, Uuid, DateTime<Utc>, ChangeType, Json<T>);

// Repositório das trilhas de auditoria (uma tabela historical_* por entidade)
#[derive(Clone)]
pub struct HistoryRepository {
    pool: PgPool,
}

impl HistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Grava uma entrada de histórico por registro, em lotes de `batch_size`.
    /// Precisa rodar na mesma transação da escrita auditada.
    pub async fn append<T: Audited>(
        &self,
        conn: &mut PgConnection,
        records: &[T],
        change: ChangeType,
        batch_size: usize,
    ) -> Result<(), AppError> {
        let now = utc_now();

        for chunk in records.chunks(batch_size.max(1)) {
            let mut query = QueryBuilder::<Postgres>::new(format!(
                "INSERT INTO {} (record_uuid, history_date, history_type, record) ",
                T::HISTORY_TABLE
            ));
            query.push_values(chunk, |mut row, record| {
                row.push_bind(record.record_uuid())
                    .push_bind(now)
                    .push_bind(change)
                    .push_bind(Json(record.clone()));
            });
            query.build().execute(&mut *conn).await?;
        }

        Ok(())
    }

    // Histórico completo de um registro, do mais antigo para o mais novo
    pub async fn list<T: Audited>(&self, record_uuid: Uuid) -> Result<Vec<HistoryRecord<T>>, AppError> {
        let sql = format!(
            "SELECT history_id, record_uuid, history_date, history_type, record \
             FROM {} WHERE record_uuid = $1 ORDER BY history_id ASC",
            T::HISTORY_TABLE
        );

        let rows = sqlx::query_as::<_, HistoryRow<T>>(&sql)
            .bind(record_uuid)
            .fetch_all(&self.pool)
            .await?;

        let history = rows
            .into_iter()
            .map(|(history_id, record_uuid, history_date, history_type, Json(record))| {
                HistoryRecord {
                    history_id,
                    record_uuid,
                    history_date,
                    history_type,
                    record,
                }
            })
            .collect();

        Ok(history)
    }

    /// Apaga e-mail e id do usuário de todas as versões históricas de uma licença.
    pub async fn clear_license_pii(
        &self,
        conn: &mut PgConnection,
        license_uuid: Uuid,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE historical_licenses
            SET record = record || jsonb_build_object('userEmail', NULL::text, 'lmsUserId', NULL::int)
            WHERE record_uuid = $1
            "#,
        )
            .bind(license_uuid)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }
}
