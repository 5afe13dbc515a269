// src/db/memory_store.rs

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    common::{error::AppError, utils::utc_now},
    db::store::SubscriptionStore,
    models::{
        agreement::CustomerAgreement,
        history::{Audited, ChangeType, HistoryRecord},
        license::{License, LicenseStatus},
        subscription::{SubscriptionPlan, SubscriptionPlanRenewal},
    },
};

#[derive(Default)]
struct MemoryState {
    agreements: Vec<CustomerAgreement>,
    plans: Vec<SubscriptionPlan>,
    renewals: Vec<SubscriptionPlanRenewal>,
    licenses: Vec<License>,

    agreement_history: Vec<HistoryRecord<CustomerAgreement>>,
    plan_history: Vec<HistoryRecord<SubscriptionPlan>>,
    renewal_history: Vec<HistoryRecord<SubscriptionPlanRenewal>>,
    license_history: Vec<HistoryRecord<License>>,
    next_history_id: i64,
}

impl MemoryState {
    fn record<T: Audited>(&mut self, record: &T, change: ChangeType) -> HistoryRecord<T> {
        self.next_history_id += 1;
        HistoryRecord {
            history_id: self.next_history_id,
            record_uuid: record.record_uuid(),
            history_date: utc_now(),
            history_type: change,
            record: record.clone(),
        }
    }

    fn record_licenses(&mut self, licenses: &[License], change: ChangeType) {
        for license in licenses {
            let entry = self.record(license, change);
            self.license_history.push(entry);
        }
    }

    fn record_plan(&mut self, plan: &SubscriptionPlan, change: ChangeType) {
        let entry = self.record(plan, change);
        self.plan_history.push(entry);
    }

    fn record_renewal(&mut self, renewal: &SubscriptionPlanRenewal, change: ChangeType) {
        let entry = self.record(renewal, change);
        self.renewal_history.push(entry);
    }

    fn insert_plan(&mut self, plan: &SubscriptionPlan) -> Result<(), AppError> {
        let duplicated = self.plans.iter().any(|p| {
            p.uuid == plan.uuid
                || (p.title == plan.title && p.customer_agreement_uuid == plan.customer_agreement_uuid)
        });
        if duplicated {
            return Err(AppError::UniqueConstraintViolation(
                "Já existe um plano com esse título neste contrato.".into(),
            ));
        }
        self.plans.push(plan.clone());
        self.record_plan(plan, ChangeType::Created);
        Ok(())
    }

    // Aplica inserções/atualizações/remoções numa cópia e só troca se as
    // restrições de unicidade continuarem válidas.
    fn apply_licenses(
        &mut self,
        created: &[License],
        updated: &[License],
        deleted: &[License],
    ) -> Result<(), AppError> {
        let mut licenses = self.licenses.clone();

        for license in updated {
            let slot = licenses
                .iter_mut()
                .find(|l| l.uuid == license.uuid)
                .ok_or(AppError::LicenseNotFound)?;
            *slot = license.clone();
        }

        let deleted_uuids: HashSet<Uuid> = deleted.iter().map(|l| l.uuid).collect();
        licenses.retain(|l| !deleted_uuids.contains(&l.uuid));

        for license in created {
            if licenses.iter().any(|l| l.uuid == license.uuid) {
                return Err(AppError::UniqueConstraintViolation("Licença duplicada.".into()));
            }
            licenses.push(license.clone());
        }

        check_license_uniqueness(&licenses)?;

        self.licenses = licenses;
        self.record_licenses(created, ChangeType::Created);
        self.record_licenses(updated, ChangeType::Changed);
        self.record_licenses(deleted, ChangeType::Deleted);
        Ok(())
    }
}

fn check_license_uniqueness(licenses: &[License]) -> Result<(), AppError> {
    let mut emails = HashSet::new();
    let mut user_ids = HashSet::new();
    let mut keys = HashSet::new();

    for license in licenses {
        if let Some(email) = &license.user_email {
            if !emails.insert((license.subscription_plan_uuid, email.clone())) {
                return Err(AppError::UniqueConstraintViolation(
                    "Este e-mail já possui uma licença neste plano.".into(),
                ));
            }
        }
        if let Some(user_id) = license.lms_user_id {
            if !user_ids.insert((license.subscription_plan_uuid, user_id)) {
                return Err(AppError::UniqueConstraintViolation(
                    "Este usuário já possui uma licença neste plano.".into(),
                ));
            }
        }
        if let Some(key) = license.activation_key {
            if !keys.insert(key) {
                return Err(AppError::UniqueConstraintViolation(
                    "Chave de ativação já usada por outra licença.".into(),
                ));
            }
        }
    }
    Ok(())
}

fn status_matches(license: &License, statuses: &[LicenseStatus]) -> bool {
    statuses.is_empty() || statuses.contains(&license.status)
}

/// Store em memória. Usado nos testes e quando a aplicação sobe sem `DATABASE_URL`.
#[derive(Clone, Default)]
pub struct MemorySubscriptionStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::InternalServerError(anyhow::anyhow!("store em memória envenenado")))
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn create_agreement(&self, agreement: &CustomerAgreement) -> Result<(), AppError> {
        let mut state = self.state()?;
        let duplicated = state.agreements.iter().any(|a| {
            a.uuid == agreement.uuid
                || a.enterprise_customer_uuid == agreement.enterprise_customer_uuid
                || a.enterprise_customer_slug == agreement.enterprise_customer_slug
        });
        if duplicated {
            return Err(AppError::UniqueConstraintViolation(
                "Já existe um contrato para este cliente ou slug.".into(),
            ));
        }
        state.agreements.push(agreement.clone());
        let entry = state.record(agreement, ChangeType::Created);
        state.agreement_history.push(entry);
        Ok(())
    }

    async fn find_agreement(&self, uuid: Uuid) -> Result<Option<CustomerAgreement>, AppError> {
        let state = self.state()?;
        Ok(state.agreements.iter().find(|a| a.uuid == uuid).cloned())
    }

    async fn create_plan(
        &self,
        plan: &SubscriptionPlan,
        licenses: &[License],
        _batch_size: usize,
    ) -> Result<(), AppError> {
        let mut state = self.state()?;
        if !state.agreements.iter().any(|a| a.uuid == plan.customer_agreement_uuid) {
            return Err(AppError::CustomerAgreementNotFound);
        }
        // Confere as licenças antes de gravar o plano, para não deixar meio caminho feito
        let mut all = state.licenses.clone();
        all.extend_from_slice(licenses);
        check_license_uniqueness(&all)?;

        state.insert_plan(plan)?;
        state.apply_licenses(licenses, &[], &[])
    }

    async fn find_plan(&self, uuid: Uuid) -> Result<Option<SubscriptionPlan>, AppError> {
        let state = self.state()?;
        Ok(state.plans.iter().find(|p| p.uuid == uuid).cloned())
    }

    async fn list_plans_for_agreement(
        &self,
        agreement_uuid: Uuid,
    ) -> Result<Vec<SubscriptionPlan>, AppError> {
        let state = self.state()?;
        Ok(state
            .plans
            .iter()
            .filter(|p| p.customer_agreement_uuid == agreement_uuid)
            .cloned()
            .collect())
    }

    async fn plan_history(
        &self,
        uuid: Uuid,
    ) -> Result<Vec<HistoryRecord<SubscriptionPlan>>, AppError> {
        let state = self.state()?;
        Ok(state
            .plan_history
            .iter()
            .filter(|h| h.record_uuid == uuid)
            .cloned()
            .collect())
    }

    async fn create_renewal(&self, renewal: &SubscriptionPlanRenewal) -> Result<(), AppError> {
        let mut state = self.state()?;
        let duplicated = state.renewals.iter().any(|r| {
            r.uuid == renewal.uuid
                || r.prior_subscription_plan_uuid == renewal.prior_subscription_plan_uuid
                || (renewal.renewed_subscription_plan_uuid.is_some()
                    && r.renewed_subscription_plan_uuid == renewal.renewed_subscription_plan_uuid)
        });
        if duplicated {
            return Err(AppError::UniqueConstraintViolation(
                "Este plano já possui uma renovação.".into(),
            ));
        }
        state.renewals.push(renewal.clone());
        state.record_renewal(renewal, ChangeType::Created);
        Ok(())
    }

    async fn find_renewal(&self, uuid: Uuid) -> Result<Option<SubscriptionPlanRenewal>, AppError> {
        let state = self.state()?;
        Ok(state.renewals.iter().find(|r| r.uuid == uuid).cloned())
    }

    async fn find_renewal_for_plan(
        &self,
        prior_plan_uuid: Uuid,
    ) -> Result<Option<SubscriptionPlanRenewal>, AppError> {
        let state = self.state()?;
        Ok(state
            .renewals
            .iter()
            .find(|r| r.prior_subscription_plan_uuid == prior_plan_uuid)
            .cloned())
    }

    async fn find_renewal_into_plan(
        &self,
        renewed_plan_uuid: Uuid,
    ) -> Result<Option<SubscriptionPlanRenewal>, AppError> {
        let state = self.state()?;
        Ok(state
            .renewals
            .iter()
            .find(|r| r.renewed_subscription_plan_uuid == Some(renewed_plan_uuid))
            .cloned())
    }

    async fn list_renewals_for_agreement(
        &self,
        agreement_uuid: Uuid,
    ) -> Result<Vec<SubscriptionPlanRenewal>, AppError> {
        let state = self.state()?;
        let plan_uuids: HashSet<Uuid> = state
            .plans
            .iter()
            .filter(|p| p.customer_agreement_uuid == agreement_uuid)
            .map(|p| p.uuid)
            .collect();
        Ok(state
            .renewals
            .iter()
            .filter(|r| plan_uuids.contains(&r.prior_subscription_plan_uuid))
            .cloned()
            .collect())
    }

    async fn apply_renewal(
        &self,
        renewal: &SubscriptionPlanRenewal,
        renewed_plan: &SubscriptionPlan,
        licenses: &[License],
        _batch_size: usize,
    ) -> Result<(), AppError> {
        let mut state = self.state()?;
        if !state.renewals.iter().any(|r| r.uuid == renewal.uuid) {
            return Err(AppError::RenewalNotFound);
        }
        let mut all = state.licenses.clone();
        all.extend_from_slice(licenses);
        check_license_uniqueness(&all)?;

        state.insert_plan(renewed_plan)?;
        state.apply_licenses(licenses, &[], &[])?;

        if let Some(slot) = state.renewals.iter_mut().find(|r| r.uuid == renewal.uuid) {
            *slot = renewal.clone();
        }
        state.record_renewal(renewal, ChangeType::Changed);
        Ok(())
    }

    async fn find_license(&self, uuid: Uuid) -> Result<Option<License>, AppError> {
        let state = self.state()?;
        Ok(state.licenses.iter().find(|l| l.uuid == uuid).cloned())
    }

    async fn find_license_by_activation_key(
        &self,
        activation_key: Uuid,
    ) -> Result<Option<License>, AppError> {
        let state = self.state()?;
        Ok(state
            .licenses
            .iter()
            .find(|l| l.activation_key == Some(activation_key))
            .cloned())
    }

    async fn list_licenses_for_plan(
        &self,
        plan_uuid: Uuid,
        statuses: &[LicenseStatus],
    ) -> Result<Vec<License>, AppError> {
        let state = self.state()?;
        Ok(state
            .licenses
            .iter()
            .filter(|l| l.subscription_plan_uuid == plan_uuid && status_matches(l, statuses))
            .cloned()
            .collect())
    }

    async fn count_licenses(
        &self,
        plan_uuid: Uuid,
        statuses: &[LicenseStatus],
    ) -> Result<i64, AppError> {
        let state = self.state()?;
        let count = state
            .licenses
            .iter()
            .filter(|l| l.subscription_plan_uuid == plan_uuid && status_matches(l, statuses))
            .count();
        Ok(count as i64)
    }

    async fn licenses_by_user_email(&self, user_email: &str) -> Result<Vec<License>, AppError> {
        let state = self.state()?;
        Ok(state
            .licenses
            .iter()
            .filter(|l| l.user_email.as_deref() == Some(user_email))
            .cloned()
            .collect())
    }

    async fn save_license(&self, license: &License) -> Result<(), AppError> {
        let mut state = self.state()?;
        state.apply_licenses(&[], std::slice::from_ref(license), &[])
    }

    async fn bulk_create_licenses(
        &self,
        licenses: &[License],
        _batch_size: usize,
    ) -> Result<(), AppError> {
        let mut state = self.state()?;
        state.apply_licenses(licenses, &[], &[])
    }

    async fn commit_license_batch(
        &self,
        updated: &[License],
        deleted: &[License],
        _batch_size: usize,
    ) -> Result<(), AppError> {
        let mut state = self.state()?;
        state.apply_licenses(&[], updated, deleted)
    }

    async fn apply_revocation(
        &self,
        revoked: &License,
        replacement: &License,
        allowed: i64,
    ) -> Result<SubscriptionPlan, AppError> {
        let mut state = self.state()?;
        let plan_uuid = revoked.subscription_plan_uuid;
        let plan = state
            .plans
            .iter()
            .find(|p| p.uuid == plan_uuid)
            .cloned()
            .ok_or(AppError::SubscriptionPlanNotFound)?;

        if i64::from(plan.num_revocations_applied) >= allowed {
            return Err(AppError::RevocationLimitExceeded { plan_uuid, allowed });
        }

        state.apply_licenses(
            std::slice::from_ref(replacement),
            std::slice::from_ref(revoked),
            &[],
        )?;

        let mut updated_plan = plan;
        updated_plan.num_revocations_applied += 1;
        updated_plan.modified = utc_now();
        if let Some(slot) = state.plans.iter_mut().find(|p| p.uuid == plan_uuid) {
            *slot = updated_plan.clone();
        }
        state.record_plan(&updated_plan, ChangeType::Changed);
        Ok(updated_plan)
    }

    async fn clear_license_history_pii(&self, uuid: Uuid) -> Result<u64, AppError> {
        let mut state = self.state()?;
        let mut cleared = 0;
        for entry in state.license_history.iter_mut().filter(|h| h.record_uuid == uuid) {
            entry.record.clear_pii();
            cleared += 1;
        }
        Ok(cleared)
    }

    async fn license_history(&self, uuid: Uuid) -> Result<Vec<HistoryRecord<License>>, AppError> {
        let state = self.state()?;
        Ok(state
            .license_history
            .iter()
            .filter(|h| h.record_uuid == uuid)
            .cloned()
            .collect())
    }
}
