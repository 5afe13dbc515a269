// src/db/store.rs

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        agreement::CustomerAgreement,
        history::HistoryRecord,
        license::{License, LicenseStatus},
        subscription::{SubscriptionPlan, SubscriptionPlanRenewal},
    },
};

// Tamanho padrão dos lotes nas operações em massa de licenças
pub const LICENSE_BULK_OPERATION_BATCH_SIZE: usize = 100;

/// Persistência de contratos, planos, renovações e licenças.
///
/// Toda operação de escrita grava também a trilha de auditoria (uma entrada
/// por registro afetado), inclusive as operações em massa. Cada método roda
/// numa única transação.
#[async_trait]
pub trait SubscriptionStore: Send + Sync + 'static {
    // --- Contratos ---
    async fn create_agreement(&self, agreement: &CustomerAgreement) -> Result<(), AppError>;
    async fn find_agreement(&self, uuid: Uuid) -> Result<Option<CustomerAgreement>, AppError>;

    // --- Planos ---

    /// Cria o plano e as suas licenças iniciais.
    async fn create_plan(
        &self,
        plan: &SubscriptionPlan,
        licenses: &[License],
        batch_size: usize,
    ) -> Result<(), AppError>;
    async fn find_plan(&self, uuid: Uuid) -> Result<Option<SubscriptionPlan>, AppError>;
    async fn list_plans_for_agreement(
        &self,
        agreement_uuid: Uuid,
    ) -> Result<Vec<SubscriptionPlan>, AppError>;
    async fn plan_history(
        &self,
        uuid: Uuid,
    ) -> Result<Vec<HistoryRecord<SubscriptionPlan>>, AppError>;

    // --- Renovações ---
    async fn create_renewal(&self, renewal: &SubscriptionPlanRenewal) -> Result<(), AppError>;
    async fn find_renewal(&self, uuid: Uuid) -> Result<Option<SubscriptionPlanRenewal>, AppError>;

    /// A renovação cujo plano anterior é `prior_plan_uuid` (no máximo uma).
    async fn find_renewal_for_plan(
        &self,
        prior_plan_uuid: Uuid,
    ) -> Result<Option<SubscriptionPlanRenewal>, AppError>;

    /// A renovação que tem `renewed_plan_uuid` como plano renovado.
    async fn find_renewal_into_plan(
        &self,
        renewed_plan_uuid: Uuid,
    ) -> Result<Option<SubscriptionPlanRenewal>, AppError>;
    async fn list_renewals_for_agreement(
        &self,
        agreement_uuid: Uuid,
    ) -> Result<Vec<SubscriptionPlanRenewal>, AppError>;

    /// Grava a renovação processada junto com o plano renovado e as suas licenças.
    async fn apply_renewal(
        &self,
        renewal: &SubscriptionPlanRenewal,
        renewed_plan: &SubscriptionPlan,
        licenses: &[License],
        batch_size: usize,
    ) -> Result<(), AppError>;

    // --- Licenças ---
    async fn find_license(&self, uuid: Uuid) -> Result<Option<License>, AppError>;
    async fn find_license_by_activation_key(
        &self,
        activation_key: Uuid,
    ) -> Result<Option<License>, AppError>;

    /// Licenças do plano; `statuses` vazio significa "todas".
    async fn list_licenses_for_plan(
        &self,
        plan_uuid: Uuid,
        statuses: &[LicenseStatus],
    ) -> Result<Vec<License>, AppError>;

    /// Contagem de licenças do plano; `statuses` vazio significa "todas".
    async fn count_licenses(
        &self,
        plan_uuid: Uuid,
        statuses: &[LicenseStatus],
    ) -> Result<i64, AppError>;
    async fn licenses_by_user_email(&self, user_email: &str) -> Result<Vec<License>, AppError>;

    async fn save_license(&self, license: &License) -> Result<(), AppError>;
    async fn bulk_create_licenses(
        &self,
        licenses: &[License],
        batch_size: usize,
    ) -> Result<(), AppError>;

    /// Atualiza `updated` e remove `deleted` atomicamente, em lotes.
    async fn commit_license_batch(
        &self,
        updated: &[License],
        deleted: &[License],
        batch_size: usize,
    ) -> Result<(), AppError>;

    async fn bulk_update_licenses(
        &self,
        licenses: &[License],
        batch_size: usize,
    ) -> Result<(), AppError> {
        self.commit_license_batch(licenses, &[], batch_size).await
    }

    /// Grava a licença revogada, cria o assento substituto e incrementa o
    /// contador do plano, desde que ele continue abaixo de `allowed`.
    /// Devolve o plano atualizado.
    async fn apply_revocation(
        &self,
        revoked: &License,
        replacement: &License,
        allowed: i64,
    ) -> Result<SubscriptionPlan, AppError>;

    /// Remove e-mail e id do usuário de todas as entradas de histórico da licença.
    async fn clear_license_history_pii(&self, uuid: Uuid) -> Result<u64, AppError>;
    async fn license_history(&self, uuid: Uuid) -> Result<Vec<HistoryRecord<License>>, AppError>;
}
