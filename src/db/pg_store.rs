// src/db/pg_store.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{
        agreement_repo::AgreementRepository, history_repo::HistoryRepository,
        license_repo::LicenseRepository, store::SubscriptionStore,
        subscription_repo::SubscriptionRepository,
    },
    models::{
        agreement::CustomerAgreement,
        history::{ChangeType, HistoryRecord},
        license::{License, LicenseStatus},
        subscription::{SubscriptionPlan, SubscriptionPlanRenewal},
    },
};

/// Store em Postgres. Cada escrita abre uma transação e grava o histórico junto.
#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: PgPool,
    agreements: AgreementRepository,
    subscriptions: SubscriptionRepository,
    licenses: LicenseRepository,
    history: HistoryRepository,
}

impl PgSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            agreements: AgreementRepository::new(pool.clone()),
            subscriptions: SubscriptionRepository::new(pool.clone()),
            licenses: LicenseRepository::new(pool.clone()),
            history: HistoryRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn create_agreement(&self, agreement: &CustomerAgreement) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let created = self.agreements.create(&mut *tx, agreement).await?;
        self.history
            .append(&mut tx, std::slice::from_ref(&created), ChangeType::Created, 1)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_agreement(&self, uuid: Uuid) -> Result<Option<CustomerAgreement>, AppError> {
        self.agreements.find_by_uuid(uuid).await
    }

    async fn create_plan(
        &self,
        plan: &SubscriptionPlan,
        licenses: &[License],
        batch_size: usize,
    ) -> Result<(), AppError> {
        // 1. Inicia transação
        let mut tx = self.pool.begin().await?;

        // 2. Plano + histórico
        let created = self.subscriptions.insert_plan(&mut *tx, plan).await?;
        self.history
            .append(&mut tx, std::slice::from_ref(&created), ChangeType::Created, 1)
            .await?;

        // 3. Licenças iniciais + histórico
        self.licenses.insert_many(&mut tx, licenses, batch_size).await?;
        self.history
            .append(&mut tx, licenses, ChangeType::Created, batch_size)
            .await?;

        // 4. Commit
        tx.commit().await?;
        Ok(())
    }

    async fn find_plan(&self, uuid: Uuid) -> Result<Option<SubscriptionPlan>, AppError> {
        self.subscriptions.find_plan(uuid).await
    }

    async fn list_plans_for_agreement(
        &self,
        agreement_uuid: Uuid,
    ) -> Result<Vec<SubscriptionPlan>, AppError> {
        self.subscriptions.list_plans_for_agreement(agreement_uuid).await
    }

    async fn plan_history(
        &self,
        uuid: Uuid,
    ) -> Result<Vec<HistoryRecord<SubscriptionPlan>>, AppError> {
        self.history.list(uuid).await
    }

    async fn create_renewal(&self, renewal: &SubscriptionPlanRenewal) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let created = self.subscriptions.insert_renewal(&mut *tx, renewal).await?;
        self.history
            .append(&mut tx, std::slice::from_ref(&created), ChangeType::Created, 1)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_renewal(&self, uuid: Uuid) -> Result<Option<SubscriptionPlanRenewal>, AppError> {
        self.subscriptions.find_renewal(uuid).await
    }

    async fn find_renewal_for_plan(
        &self,
        prior_plan_uuid: Uuid,
    ) -> Result<Option<SubscriptionPlanRenewal>, AppError> {
        self.subscriptions.find_renewal_by_prior(prior_plan_uuid).await
    }

    async fn find_renewal_into_plan(
        &self,
        renewed_plan_uuid: Uuid,
    ) -> Result<Option<SubscriptionPlanRenewal>, AppError> {
        self.subscriptions.find_renewal_by_renewed(renewed_plan_uuid).await
    }

    async fn list_renewals_for_agreement(
        &self,
        agreement_uuid: Uuid,
    ) -> Result<Vec<SubscriptionPlanRenewal>, AppError> {
        self.subscriptions.list_renewals_for_agreement(agreement_uuid).await
    }

    async fn apply_renewal(
        &self,
        renewal: &SubscriptionPlanRenewal,
        renewed_plan: &SubscriptionPlan,
        licenses: &[License],
        batch_size: usize,
    ) -> Result<(), AppError> {
        // 1. Inicia transação
        let mut tx = self.pool.begin().await?;

        // 2. Plano renovado
        let created = self.subscriptions.insert_plan(&mut *tx, renewed_plan).await?;
        self.history
            .append(&mut tx, std::slice::from_ref(&created), ChangeType::Created, 1)
            .await?;

        // 3. Licenças copiadas + assentos novos
        self.licenses.insert_many(&mut tx, licenses, batch_size).await?;
        self.history
            .append(&mut tx, licenses, ChangeType::Created, batch_size)
            .await?;

        // 4. Marca a renovação como processada
        self.subscriptions.update_renewal(&mut *tx, renewal).await?;
        self.history
            .append(&mut tx, std::slice::from_ref(renewal), ChangeType::Changed, 1)
            .await?;

        // 5. Commit
        tx.commit().await?;
        Ok(())
    }

    async fn find_license(&self, uuid: Uuid) -> Result<Option<License>, AppError> {
        self.licenses.find(uuid).await
    }

    async fn find_license_by_activation_key(
        &self,
        activation_key: Uuid,
    ) -> Result<Option<License>, AppError> {
        self.licenses.find_by_activation_key(activation_key).await
    }

    async fn list_licenses_for_plan(
        &self,
        plan_uuid: Uuid,
        statuses: &[LicenseStatus],
    ) -> Result<Vec<License>, AppError> {
        self.licenses.list_for_plan(plan_uuid, statuses).await
    }

    async fn count_licenses(
        &self,
        plan_uuid: Uuid,
        statuses: &[LicenseStatus],
    ) -> Result<i64, AppError> {
        self.licenses.count_for_plan(plan_uuid, statuses).await
    }

    async fn licenses_by_user_email(&self, user_email: &str) -> Result<Vec<License>, AppError> {
        self.licenses.list_by_user_email(user_email).await
    }

    async fn save_license(&self, license: &License) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        self.licenses.update(&mut *tx, license).await?;
        self.history
            .append(&mut tx, std::slice::from_ref(license), ChangeType::Changed, 1)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn bulk_create_licenses(
        &self,
        licenses: &[License],
        batch_size: usize,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        self.licenses.insert_many(&mut tx, licenses, batch_size).await?;
        self.history
            .append(&mut tx, licenses, ChangeType::Created, batch_size)
            .await?;

        tx.commit().await?;
        tracing::info!("✅ {} licenças criadas em lotes de {}", licenses.len(), batch_size);
        Ok(())
    }

    async fn commit_license_batch(
        &self,
        updated: &[License],
        deleted: &[License],
        batch_size: usize,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        // Remoções primeiro: liberam (plano, e-mail) antes das atualizações
        let deleted_uuids: Vec<Uuid> = deleted.iter().map(|license| license.uuid).collect();
        self.licenses.delete_many(&mut tx, &deleted_uuids).await?;
        self.history
            .append(&mut tx, deleted, ChangeType::Deleted, batch_size)
            .await?;

        self.licenses.update_many(&mut tx, updated, batch_size).await?;
        self.history
            .append(&mut tx, updated, ChangeType::Changed, batch_size)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn apply_revocation(
        &self,
        revoked: &License,
        replacement: &License,
        allowed: i64,
    ) -> Result<SubscriptionPlan, AppError> {
        let plan_uuid = revoked.subscription_plan_uuid;

        // 1. Inicia transação
        let mut tx = self.pool.begin().await?;

        // 2. Incremento condicional: falha se o limite já foi atingido
        let plan = self
            .subscriptions
            .increment_revocations(&mut *tx, plan_uuid, allowed)
            .await?
            .ok_or(AppError::RevocationLimitExceeded { plan_uuid, allowed })?;
        self.history
            .append(&mut tx, std::slice::from_ref(&plan), ChangeType::Changed, 1)
            .await?;

        // 3. Licença revogada
        self.licenses.update(&mut *tx, revoked).await?;
        self.history
            .append(&mut tx, std::slice::from_ref(revoked), ChangeType::Changed, 1)
            .await?;

        // 4. Assento substituto
        self.licenses
            .insert_many(&mut tx, std::slice::from_ref(replacement), 1)
            .await?;
        self.history
            .append(&mut tx, std::slice::from_ref(replacement), ChangeType::Created, 1)
            .await?;

        // 5. Commit
        tx.commit().await?;
        Ok(plan)
    }

    async fn clear_license_history_pii(&self, uuid: Uuid) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;
        let cleared = self.history.clear_license_pii(&mut tx, uuid).await?;
        tx.commit().await?;
        Ok(cleared)
    }

    async fn license_history(&self, uuid: Uuid) -> Result<Vec<HistoryRecord<License>>, AppError> {
        self.history.list(uuid).await
    }
}
