// src/db/subscription_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::{error::AppError, utils::utc_now},
    models::subscription::{SubscriptionPlan, SubscriptionPlanRenewal},
};

// Repositório de planos de assinatura e das suas renovações
#[derive(Clone)]
pub struct SubscriptionRepository {
    pool: PgPool,
}

impl SubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ---
    // Planos
    // ---

    pub async fn find_plan(&self, uuid: Uuid) -> Result<Option<SubscriptionPlan>, AppError> {
        let plan = sqlx::query_as::<_, SubscriptionPlan>(
            "SELECT * FROM subscription_plans WHERE uuid = $1",
        )
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(plan)
    }

    pub async fn list_plans_for_agreement(
        &self,
        agreement_uuid: Uuid,
    ) -> Result<Vec<SubscriptionPlan>, AppError> {
        let plans = sqlx::query_as::<_, SubscriptionPlan>(
            "SELECT * FROM subscription_plans WHERE customer_agreement_uuid = $1 ORDER BY created ASC",
        )
            .bind(agreement_uuid)
            .fetch_all(&self.pool)
            .await?;
        Ok(plans)
    }

    pub async fn insert_plan<'e, E>(
        &self,
        executor: E,
        plan: &SubscriptionPlan,
    ) -> Result<SubscriptionPlan, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let created = sqlx::query_as::<_, SubscriptionPlan>(
            r#"
            INSERT INTO subscription_plans (
                uuid, title, start_date, expiration_date, expiration_processed,
                enterprise_catalog_uuid, customer_agreement_uuid, is_active,
                revoke_max_percentage, num_revocations_applied,
                salesforce_opportunity_id, netsuite_product_id, for_internal_use_only,
                created, modified
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
            .bind(plan.uuid)
            .bind(&plan.title)
            .bind(plan.start_date)
            .bind(plan.expiration_date)
            .bind(plan.expiration_processed)
            .bind(plan.enterprise_catalog_uuid)
            .bind(plan.customer_agreement_uuid)
            .bind(plan.is_active)
            .bind(plan.revoke_max_percentage)
            .bind(plan.num_revocations_applied)
            .bind(&plan.salesforce_opportunity_id)
            .bind(plan.netsuite_product_id)
            .bind(plan.for_internal_use_only)
            .bind(plan.created)
            .bind(plan.modified)
            .fetch_one(executor)
            .await
            .map_err(|e| AppError::from_db(e, "Já existe um plano com esse título neste contrato."))?;

        Ok(created)
    }

    /// Incrementa o contador de revogações só se ele ainda estiver abaixo de `allowed`.
    /// `None` significa que o limite já foi atingido (ou o plano não existe).
    pub async fn increment_revocations<'e, E>(
        &self,
        executor: E,
        plan_uuid: Uuid,
        allowed: i64,
    ) -> Result<Option<SubscriptionPlan>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let plan = sqlx::query_as::<_, SubscriptionPlan>(
            r#"
            UPDATE subscription_plans
            SET num_revocations_applied = num_revocations_applied + 1, modified = $3
            WHERE uuid = $1 AND num_revocations_applied < $2
            RETURNING *
            "#,
        )
            .bind(plan_uuid)
            .bind(allowed)
            .bind(utc_now())
            .fetch_optional(executor)
            .await?;
        Ok(plan)
    }

    // ---
    // Renovações
    // ---

    pub async fn find_renewal(&self, uuid: Uuid) -> Result<Option<SubscriptionPlanRenewal>, AppError> {
        let renewal = sqlx::query_as::<_, SubscriptionPlanRenewal>(
            "SELECT * FROM subscription_plan_renewals WHERE uuid = $1",
        )
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(renewal)
    }

    pub async fn find_renewal_by_prior(
        &self,
        prior_plan_uuid: Uuid,
    ) -> Result<Option<SubscriptionPlanRenewal>, AppError> {
        let renewal = sqlx::query_as::<_, SubscriptionPlanRenewal>(
            "SELECT * FROM subscription_plan_renewals WHERE prior_subscription_plan_uuid = $1",
        )
            .bind(prior_plan_uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(renewal)
    }

    pub async fn find_renewal_by_renewed(
        &self,
        renewed_plan_uuid: Uuid,
    ) -> Result<Option<SubscriptionPlanRenewal>, AppError> {
        let renewal = sqlx::query_as::<_, SubscriptionPlanRenewal>(
            "SELECT * FROM subscription_plan_renewals WHERE renewed_subscription_plan_uuid = $1",
        )
            .bind(renewed_plan_uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(renewal)
    }

    // Todas as renovações cujo plano anterior pertence ao contrato
    pub async fn list_renewals_for_agreement(
        &self,
        agreement_uuid: Uuid,
    ) -> Result<Vec<SubscriptionPlanRenewal>, AppError> {
        let renewals = sqlx::query_as::<_, SubscriptionPlanRenewal>(
            r#"
            SELECT r.*
            FROM subscription_plan_renewals r
            INNER JOIN subscription_plans p ON p.uuid = r.prior_subscription_plan_uuid
            WHERE p.customer_agreement_uuid = $1
            ORDER BY r.created ASC
            "#,
        )
            .bind(agreement_uuid)
            .fetch_all(&self.pool)
            .await?;
        Ok(renewals)
    }

    pub async fn insert_renewal<'e, E>(
        &self,
        executor: E,
        renewal: &SubscriptionPlanRenewal,
    ) -> Result<SubscriptionPlanRenewal, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let created = sqlx::query_as::<_, SubscriptionPlanRenewal>(
            r#"
            INSERT INTO subscription_plan_renewals (
                uuid, prior_subscription_plan_uuid, renewed_subscription_plan_uuid,
                salesforce_opportunity_id, number_of_licenses, effective_date,
                renewed_expiration_date, processed, created, modified
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
            .bind(renewal.uuid)
            .bind(renewal.prior_subscription_plan_uuid)
            .bind(renewal.renewed_subscription_plan_uuid)
            .bind(&renewal.salesforce_opportunity_id)
            .bind(renewal.number_of_licenses)
            .bind(renewal.effective_date)
            .bind(renewal.renewed_expiration_date)
            .bind(renewal.processed)
            .bind(renewal.created)
            .bind(renewal.modified)
            .fetch_one(executor)
            .await
            .map_err(|e| AppError::from_db(e, "Este plano já possui uma renovação."))?;

        Ok(created)
    }

    pub async fn update_renewal<'e, E>(
        &self,
        executor: E,
        renewal: &SubscriptionPlanRenewal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE subscription_plan_renewals
            SET renewed_subscription_plan_uuid = $2, processed = $3, modified = $4
            WHERE uuid = $1
            "#,
        )
            .bind(renewal.uuid)
            .bind(renewal.renewed_subscription_plan_uuid)
            .bind(renewal.processed)
            .bind(renewal.modified)
            .execute(executor)
            .await
            .map_err(|e| AppError::from_db(e, "O plano renovado já é alvo de outra renovação."))?;
        Ok(())
    }
}
