// src/db/agreement_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{common::error::AppError, models::agreement::CustomerAgreement};

// O repositório de contratos, responsável pelas interações com a tabela 'customer_agreements'
#[derive(Clone)]
pub struct AgreementRepository {
    pool: PgPool,
}

impl AgreementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Busca um contrato pelo seu UUID
    pub async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<CustomerAgreement>, AppError> {
        let maybe_agreement = sqlx::query_as::<_, CustomerAgreement>(
            "SELECT * FROM customer_agreements WHERE uuid = $1",
        )
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(maybe_agreement)
    }

    // Cria um novo contrato
    // Com tratamento de erro específico para cliente/slug duplicados.
    pub async fn create<'e, E>(
        &self,
        executor: E,
        agreement: &CustomerAgreement,
    ) -> Result<CustomerAgreement, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let created = sqlx::query_as::<_, CustomerAgreement>(
            r#"
            INSERT INTO customer_agreements (
                uuid, enterprise_customer_uuid, enterprise_customer_slug,
                default_enterprise_catalog_uuid, created, modified
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
            .bind(agreement.uuid)
            .bind(agreement.enterprise_customer_uuid)
            .bind(&agreement.enterprise_customer_slug)
            .bind(agreement.default_enterprise_catalog_uuid)
            .bind(agreement.created)
            .bind(agreement.modified)
            .fetch_one(executor)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.is_unique_violation() {
                        if let Some(constraint) = db_err.constraint() {
                            return match constraint {
                                "customer_agreements_enterprise_customer_uuid_key" => {
                                    AppError::UniqueConstraintViolation(
                                        "Já existe um contrato para este cliente.".into(),
                                    )
                                }
                                "customer_agreements_enterprise_customer_slug_key" => {
                                    AppError::UniqueConstraintViolation(
                                        "Já existe um contrato com este slug.".into(),
                                    )
                                }
                                _ => AppError::UniqueConstraintViolation(constraint.to_string()),
                            };
                        }
                    }
                }
                e.into()
            })?;

        Ok(created)
    }
}
