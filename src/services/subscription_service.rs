// src/services/subscription_service.rs

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{error::AppError, utils::utc_now},
    db::SubscriptionStore,
    models::{
        agreement::CustomerAgreement,
        history::HistoryRecord,
        license::{License, LicenseStatus},
        subscription::{
            CreateRenewalPayload, CreateSubscriptionPlanPayload, RenewalChain, SubscriptionPlan,
            SubscriptionPlanRenewal, SubscriptionPlanSummary, DEFAULT_REVOKE_MAX_PERCENTAGE,
            MAX_RENEWAL_CHAIN_LENGTH,
        },
    },
    services::catalog_client::CatalogClient,
};

// Licenças que contam para o tamanho do plano (revogadas ficam de fora)
pub const COUNTED_STATUSES: [LicenseStatus; 3] = [
    LicenseStatus::Unassigned,
    LicenseStatus::Assigned,
    LicenseStatus::Activated,
];
pub const ALLOCATED_STATUSES: [LicenseStatus; 2] = [LicenseStatus::Assigned, LicenseStatus::Activated];

#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    catalog: Arc<dyn CatalogClient>,
    batch_size: usize,
}

impl SubscriptionService {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        catalog: Arc<dyn CatalogClient>,
        batch_size: usize,
    ) -> Self {
        Self { store, catalog, batch_size }
    }

    // =========================================================================
    //  1. PLANOS
    // =========================================================================

    pub async fn create_plan(
        &self,
        agreement_uuid: Uuid,
        payload: CreateSubscriptionPlanPayload,
    ) -> Result<SubscriptionPlan, AppError> {
        payload.validate()?;

        let agreement = self
            .store
            .find_agreement(agreement_uuid)
            .await?
            .ok_or(AppError::CustomerAgreementNotFound)?;

        // O catálogo do plano cai para o padrão do contrato
        let enterprise_catalog_uuid = payload
            .enterprise_catalog_uuid
            .or(agreement.default_enterprise_catalog_uuid)
            .ok_or(AppError::MissingCatalog)?;

        let now = utc_now();
        let plan = SubscriptionPlan {
            uuid: Uuid::new_v4(),
            title: payload.title.trim().to_string(),
            start_date: payload.start_date,
            expiration_date: payload.expiration_date,
            expiration_processed: false,
            enterprise_catalog_uuid,
            customer_agreement_uuid: agreement.uuid,
            is_active: payload.is_active,
            revoke_max_percentage: payload
                .revoke_max_percentage
                .unwrap_or(DEFAULT_REVOKE_MAX_PERCENTAGE),
            num_revocations_applied: 0,
            salesforce_opportunity_id: payload.salesforce_opportunity_id,
            netsuite_product_id: payload.netsuite_product_id,
            for_internal_use_only: payload.for_internal_use_only,
            created: now,
            modified: now,
        };

        let licenses: Vec<License> = (0..payload.num_licenses)
            .map(|_| License::new_unassigned(plan.uuid, now))
            .collect();

        self.store.create_plan(&plan, &licenses, self.batch_size).await?;

        tracing::info!("✅ Plano criado: {} com {} licenças", plan, licenses.len());
        Ok(plan)
    }

    pub async fn get_plan(&self, uuid: Uuid) -> Result<SubscriptionPlan, AppError> {
        self.store
            .find_plan(uuid)
            .await?
            .ok_or(AppError::SubscriptionPlanNotFound)
    }

    /// Plano e o contrato dono dele (o contrato define o contexto de permissão).
    pub async fn get_plan_with_agreement(
        &self,
        uuid: Uuid,
    ) -> Result<(SubscriptionPlan, CustomerAgreement), AppError> {
        let plan = self.get_plan(uuid).await?;
        let agreement = self
            .store
            .find_agreement(plan.customer_agreement_uuid)
            .await?
            .ok_or(AppError::CustomerAgreementNotFound)?;
        Ok((plan, agreement))
    }

    pub async fn summary(
        &self,
        plan: SubscriptionPlan,
        today: NaiveDate,
    ) -> Result<SubscriptionPlanSummary, AppError> {
        let num_licenses = self.store.count_licenses(plan.uuid, &COUNTED_STATUSES).await?;
        let num_allocated_licenses = self.store.count_licenses(plan.uuid, &ALLOCATED_STATUSES).await?;
        let num_unassigned_licenses = self
            .store
            .count_licenses(plan.uuid, &[LicenseStatus::Unassigned])
            .await?;
        let days_until_expiration_including_renewals = self
            .days_until_expiration_including_renewals(&plan, today)
            .await?;

        Ok(SubscriptionPlanSummary {
            num_licenses,
            num_allocated_licenses,
            num_unassigned_licenses,
            num_revocations_remaining: plan.num_revocations_remaining(num_licenses),
            days_until_expiration: plan.days_until_expiration(today),
            days_until_expiration_including_renewals,
            plan,
        })
    }

    /// Cria `num_licenses` assentos novos (sem dono) no plano.
    pub async fn increase_num_licenses(
        &self,
        plan_uuid: Uuid,
        num_licenses: i64,
    ) -> Result<Vec<License>, AppError> {
        let plan = self.get_plan(plan_uuid).await?;
        let now = utc_now();

        let licenses: Vec<License> = (0..num_licenses)
            .map(|_| License::new_unassigned(plan.uuid, now))
            .collect();
        self.store.bulk_create_licenses(&licenses, self.batch_size).await?;

        tracing::info!("✅ {} licenças adicionadas ao plano {}", licenses.len(), plan.uuid);
        Ok(licenses)
    }

    pub async fn plan_history(
        &self,
        plan_uuid: Uuid,
    ) -> Result<Vec<HistoryRecord<SubscriptionPlan>>, AppError> {
        self.store.plan_history(plan_uuid).await
    }

    // =========================================================================
    //  2. CADEIA DE RENOVAÇÕES
    // =========================================================================

    /// Carrega, elo a elo, as renovações alcançáveis a partir do plano.
    async fn renewal_chain(&self, plan: &SubscriptionPlan) -> Result<RenewalChain, AppError> {
        let mut renewals = Vec::new();
        let mut visited = HashSet::from([plan.uuid]);
        let mut next = Some(plan.uuid);

        while let Some(plan_uuid) = next.take() {
            if renewals.len() >= MAX_RENEWAL_CHAIN_LENGTH {
                break;
            }
            let Some(renewal) = self.store.find_renewal_for_plan(plan_uuid).await? else {
                break;
            };
            next = renewal
                .renewed_subscription_plan_uuid
                .filter(|renewed| visited.insert(*renewed));
            renewals.push(renewal);
        }

        Ok(RenewalChain::new(renewals))
    }

    pub async fn future_renewals(
        &self,
        plan: &SubscriptionPlan,
    ) -> Result<Vec<SubscriptionPlanRenewal>, AppError> {
        Ok(self.renewal_chain(plan).await?.future_renewals(plan.uuid))
    }

    pub async fn days_until_expiration_including_renewals(
        &self,
        plan: &SubscriptionPlan,
        today: NaiveDate,
    ) -> Result<i64, AppError> {
        Ok(self
            .renewal_chain(plan)
            .await?
            .days_until_expiration_including_renewals(plan, today))
    }

    // =========================================================================
    //  3. CATÁLOGO
    // =========================================================================

    pub async fn contains_content(
        &self,
        plan: &SubscriptionPlan,
        content_ids: &[String],
    ) -> Result<bool, AppError> {
        self.catalog
            .contains_content_items(plan.enterprise_catalog_uuid, content_ids)
            .await
    }

    // =========================================================================
    //  4. RENOVAÇÕES
    // =========================================================================

    pub async fn create_renewal(
        &self,
        prior_plan_uuid: Uuid,
        payload: CreateRenewalPayload,
    ) -> Result<SubscriptionPlanRenewal, AppError> {
        payload.validate()?;

        // 1. O plano anterior existe e ainda não foi renovado
        let prior = self.get_plan(prior_plan_uuid).await?;
        if self.store.find_renewal_for_plan(prior.uuid).await?.is_some() {
            return Err(AppError::UniqueConstraintViolation(
                "Este plano já possui uma renovação.".into(),
            ));
        }

        // 2. O plano renovado (se informado) é outro plano e não é sucessor de ninguém
        if let Some(renewed_uuid) = payload.renewed_subscription_plan_uuid {
            if renewed_uuid == prior.uuid {
                return Err(AppError::InvalidRenewal(
                    "um plano não pode renovar a si mesmo".into(),
                ));
            }
            let renewed = self.get_plan(renewed_uuid).await?;
            if renewed.customer_agreement_uuid != prior.customer_agreement_uuid {
                return Err(AppError::InvalidRenewal(
                    "o plano renovado precisa pertencer ao mesmo contrato".into(),
                ));
            }
            if self.store.find_renewal_into_plan(renewed_uuid).await?.is_some() {
                return Err(AppError::UniqueConstraintViolation(
                    "O plano renovado já é alvo de outra renovação.".into(),
                ));
            }
        }

        // 3. Datas
        if payload.renewed_expiration_date <= payload.effective_date {
            return Err(AppError::InvalidRenewal(
                "a nova expiração deve ser posterior à data de vigência".into(),
            ));
        }
        if payload.effective_date < prior.expiration_date {
            return Err(AppError::InvalidRenewal(
                "a vigência não pode começar antes da expiração do plano anterior".into(),
            ));
        }

        let now = utc_now();
        let renewal = SubscriptionPlanRenewal {
            uuid: Uuid::new_v4(),
            prior_subscription_plan_uuid: prior.uuid,
            renewed_subscription_plan_uuid: payload.renewed_subscription_plan_uuid,
            salesforce_opportunity_id: payload.salesforce_opportunity_id,
            number_of_licenses: payload.number_of_licenses,
            effective_date: payload.effective_date,
            renewed_expiration_date: payload.renewed_expiration_date,
            processed: false,
            created: now,
            modified: now,
        };
        self.store.create_renewal(&renewal).await?;

        tracing::info!("✅ Renovação criada: {}", renewal);
        Ok(renewal)
    }

    pub async fn get_renewal(&self, uuid: Uuid) -> Result<SubscriptionPlanRenewal, AppError> {
        self.store
            .find_renewal(uuid)
            .await?
            .ok_or(AppError::RenewalNotFound)
    }

    /// Materializa a renovação: cria o plano renovado, copia as licenças alocadas
    /// e completa o restante com assentos vazios. Tudo numa única transação.
    pub async fn process_renewal(
        &self,
        renewal_uuid: Uuid,
    ) -> Result<(SubscriptionPlanRenewal, SubscriptionPlan), AppError> {
        let mut renewal = self.get_renewal(renewal_uuid).await?;

        // 1. Só processa uma vez, e só renovações que ainda não apontam para um plano
        if renewal.processed {
            return Err(AppError::RenewalAlreadyProcessed(renewal.uuid));
        }
        if let Some(linked) = renewal.renewed_subscription_plan_uuid {
            return Err(AppError::InvalidRenewal(format!(
                "a renovação já está ligada ao plano {linked}"
            )));
        }

        // 2. Licenças alocadas do plano anterior precisam caber na renovação
        let prior = self.get_plan(renewal.prior_subscription_plan_uuid).await?;
        let allocated = self
            .store
            .list_licenses_for_plan(prior.uuid, &ALLOCATED_STATUSES)
            .await?;
        let seats = usize::try_from(renewal.number_of_licenses).unwrap_or(0);
        if allocated.len() > seats {
            return Err(AppError::RenewalLicenseShortfall {
                renewed: renewal.number_of_licenses,
                allocated: allocated.len(),
            });
        }

        // 3. Monta o plano renovado
        let now = utc_now();
        let renewed_plan = SubscriptionPlan {
            uuid: Uuid::new_v4(),
            title: format!("{} (Renewal)", prior.title),
            start_date: renewal.effective_date,
            expiration_date: renewal.renewed_expiration_date,
            expiration_processed: false,
            is_active: true,
            num_revocations_applied: 0,
            salesforce_opportunity_id: renewal.salesforce_opportunity_id.clone(),
            created: now,
            modified: now,
            ..prior.clone()
        };

        // 4. Copia as alocadas e completa com assentos vazios
        let mut licenses: Vec<License> = allocated
            .iter()
            .map(|license| license.copy_into_plan(renewed_plan.uuid, now))
            .collect();
        licenses.extend((allocated.len()..seats).map(|_| License::new_unassigned(renewed_plan.uuid, now)));

        // 5. Liga a renovação ao novo plano e grava tudo junto
        renewal.renewed_subscription_plan_uuid = Some(renewed_plan.uuid);
        renewal.processed = true;
        renewal.modified = now;
        self.store
            .apply_renewal(&renewal, &renewed_plan, &licenses, self.batch_size)
            .await?;

        tracing::info!(
            "✅ Renovação {} processada: plano {} criado com {} licenças ({} copiadas)",
            renewal.uuid,
            renewed_plan.uuid,
            licenses.len(),
            allocated.len()
        );
        Ok((renewal, renewed_plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            auth::User, history::ChangeType, license::AssignLicensesPayload, license::LicenseAssignee,
        },
        services::{
            catalog_client::StaticCatalogClient,
            test_support::{date, plan_payload, Fixture},
        },
    };

    fn renewal_payload(effective: NaiveDate, expires: NaiveDate, seats: i32) -> CreateRenewalPayload {
        CreateRenewalPayload {
            renewed_subscription_plan_uuid: None,
            salesforce_opportunity_id: "000000000000ABCABC".into(),
            number_of_licenses: seats,
            effective_date: effective,
            renewed_expiration_date: expires,
        }
    }

    #[tokio::test]
    async fn plan_falls_back_to_agreement_catalog() {
        let fx = Fixture::new();
        let default_catalog = Uuid::new_v4();
        let agreement = fx.agreement("acme", Some(default_catalog)).await;

        let mut payload = plan_payload("Plano", 3, date(2025, 1, 1));
        payload.enterprise_catalog_uuid = None;
        let plan = fx.subscriptions.create_plan(agreement.uuid, payload).await.unwrap();

        assert_eq!(plan.enterprise_catalog_uuid, default_catalog);
        assert_eq!(plan.revoke_max_percentage, DEFAULT_REVOKE_MAX_PERCENTAGE);
    }

    #[tokio::test]
    async fn plan_without_any_catalog_is_rejected() {
        let fx = Fixture::new();
        let agreement = fx.agreement("acme", None).await;

        let mut payload = plan_payload("Plano", 0, date(2025, 1, 1));
        payload.enterprise_catalog_uuid = None;
        let result = fx.subscriptions.create_plan(agreement.uuid, payload).await;
        assert!(matches!(result, Err(AppError::MissingCatalog)));
    }

    #[tokio::test]
    async fn duplicated_title_in_agreement_is_rejected() {
        let fx = Fixture::new();
        let agreement = fx.agreement("acme", None).await;
        fx.plan(&agreement, "Plano", 0, date(2025, 1, 1)).await;

        let result = fx
            .subscriptions
            .create_plan(agreement.uuid, plan_payload("Plano", 0, date(2025, 1, 1)))
            .await;
        assert!(matches!(result, Err(AppError::UniqueConstraintViolation(_))));
    }

    #[tokio::test]
    async fn invalid_salesforce_id_fails_validation() {
        let fx = Fixture::new();
        let agreement = fx.agreement("acme", None).await;
        let mut payload = plan_payload("Plano", 0, date(2025, 1, 1));
        payload.salesforce_opportunity_id = "123".into();

        let result = fx.subscriptions.create_plan(agreement.uuid, payload).await;
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }

    #[tokio::test]
    async fn bulk_create_writes_one_history_entry_per_license() {
        let fx = Fixture::new();
        let agreement = fx.agreement("acme", None).await;
        let plan = fx.plan(&agreement, "Plano", 0, date(2025, 1, 1)).await;

        // Lotes de 2: 5 licenças passam por 3 lotes
        let created = fx.subscriptions.increase_num_licenses(plan.uuid, 5).await.unwrap();
        assert_eq!(created.len(), 5);

        for license in &created {
            let history = fx.store.license_history(license.uuid).await.unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].history_type, ChangeType::Created);
        }

        let summary = fx
            .subscriptions
            .summary(plan, date(2024, 6, 1))
            .await
            .unwrap();
        assert_eq!(summary.num_licenses, 5);
        assert_eq!(summary.num_unassigned_licenses, 5);
        assert_eq!(summary.num_allocated_licenses, 0);
        assert_eq!(summary.num_revocations_remaining, 1);
    }

    #[tokio::test]
    async fn chain_of_three_plans_is_walked_in_order() {
        let fx = Fixture::new();
        let agreement = fx.agreement("acme", None).await;
        let p1 = fx.plan(&agreement, "P1", 0, date(2024, 12, 31)).await;
        let p2 = fx.plan(&agreement, "P2", 0, date(2025, 12, 31)).await;
        let p3 = fx.plan(&agreement, "P3", 0, date(2026, 12, 31)).await;

        let mut payload = renewal_payload(date(2024, 12, 31), date(2025, 12, 31), 0);
        payload.renewed_subscription_plan_uuid = Some(p2.uuid);
        let r12 = fx.subscriptions.create_renewal(p1.uuid, payload).await.unwrap();

        let mut payload = renewal_payload(date(2025, 12, 31), date(2026, 12, 31), 0);
        payload.renewed_subscription_plan_uuid = Some(p3.uuid);
        let r23 = fx.subscriptions.create_renewal(p2.uuid, payload).await.unwrap();

        let renewals = fx.subscriptions.future_renewals(&p1).await.unwrap();
        assert_eq!(renewals, vec![r12, r23]);
        assert!(fx.subscriptions.future_renewals(&p3).await.unwrap().is_empty());

        let today = date(2024, 6, 1);
        let days = fx
            .subscriptions
            .days_until_expiration_including_renewals(&p1, today)
            .await
            .unwrap();
        assert_eq!(days, (date(2026, 12, 31) - today).num_days());
    }

    #[tokio::test]
    async fn renewal_validations() {
        let fx = Fixture::new();
        let agreement = fx.agreement("acme", None).await;
        let prior = fx.plan(&agreement, "P1", 0, date(2024, 12, 31)).await;

        // Vigência antes da expiração do plano anterior
        let result = fx
            .subscriptions
            .create_renewal(prior.uuid, renewal_payload(date(2024, 6, 1), date(2025, 6, 1), 0))
            .await;
        assert!(matches!(result, Err(AppError::InvalidRenewal(_))));

        // Expiração antes da vigência
        let result = fx
            .subscriptions
            .create_renewal(prior.uuid, renewal_payload(date(2025, 1, 1), date(2024, 12, 31), 0))
            .await;
        assert!(matches!(result, Err(AppError::InvalidRenewal(_))));

        // Renovar a si mesmo
        let mut payload = renewal_payload(date(2025, 1, 1), date(2026, 1, 1), 0);
        payload.renewed_subscription_plan_uuid = Some(prior.uuid);
        let result = fx.subscriptions.create_renewal(prior.uuid, payload).await;
        assert!(matches!(result, Err(AppError::InvalidRenewal(_))));

        // Segunda renovação do mesmo plano
        fx.subscriptions
            .create_renewal(prior.uuid, renewal_payload(date(2025, 1, 1), date(2026, 1, 1), 0))
            .await
            .unwrap();
        let result = fx
            .subscriptions
            .create_renewal(prior.uuid, renewal_payload(date(2025, 1, 1), date(2026, 1, 1), 0))
            .await;
        assert!(matches!(result, Err(AppError::UniqueConstraintViolation(_))));
    }

    #[tokio::test]
    async fn processing_a_renewal_copies_allocated_licenses() {
        let fx = Fixture::new();
        let agreement = fx.agreement("acme", None).await;
        let prior = fx.plan(&agreement, "P1", 3, date(2024, 12, 31)).await;

        fx.licenses
            .assign_licenses(
                prior.uuid,
                AssignLicensesPayload {
                    assignees: vec![LicenseAssignee {
                        user_email: "learner@example.com".into(),
                        lms_user_id: Some(7),
                    }],
                    greeting: String::new(),
                    closing: String::new(),
                },
            )
            .await
            .unwrap();

        let renewal = fx
            .subscriptions
            .create_renewal(prior.uuid, renewal_payload(date(2025, 1, 1), date(2026, 1, 1), 5))
            .await
            .unwrap();
        let (processed, renewed_plan) = fx.subscriptions.process_renewal(renewal.uuid).await.unwrap();

        assert!(processed.processed);
        assert_eq!(processed.renewed_subscription_plan_uuid, Some(renewed_plan.uuid));
        assert_eq!(renewed_plan.customer_agreement_uuid, agreement.uuid);
        assert_eq!(renewed_plan.enterprise_catalog_uuid, prior.enterprise_catalog_uuid);
        assert_eq!(renewed_plan.expiration_date, date(2026, 1, 1));

        let licenses = fx
            .store
            .list_licenses_for_plan(renewed_plan.uuid, &[])
            .await
            .unwrap();
        assert_eq!(licenses.len(), 5);
        let copied: Vec<&License> = licenses
            .iter()
            .filter(|l| l.status == LicenseStatus::Assigned)
            .collect();
        assert_eq!(copied.len(), 1);
        assert_eq!(copied[0].user_email.as_deref(), Some("learner@example.com"));

        // O plano anterior agora aponta para o renovado
        let future = fx.subscriptions.future_renewals(&prior).await.unwrap();
        assert_eq!(future, vec![processed]);

        let again = fx.subscriptions.process_renewal(renewal.uuid).await;
        assert!(matches!(again, Err(AppError::RenewalAlreadyProcessed(_))));
    }

    #[tokio::test]
    async fn renewal_smaller_than_allocation_is_rejected() {
        let fx = Fixture::new();
        let agreement = fx.agreement("acme", None).await;
        let prior = fx.plan(&agreement, "P1", 2, date(2024, 12, 31)).await;
        fx.licenses
            .assign_licenses(
                prior.uuid,
                AssignLicensesPayload {
                    assignees: vec![
                        LicenseAssignee { user_email: "a@example.com".into(), lms_user_id: None },
                        LicenseAssignee { user_email: "b@example.com".into(), lms_user_id: None },
                    ],
                    greeting: String::new(),
                    closing: String::new(),
                },
            )
            .await
            .unwrap();

        let renewal = fx
            .subscriptions
            .create_renewal(prior.uuid, renewal_payload(date(2025, 1, 1), date(2026, 1, 1), 1))
            .await
            .unwrap();
        let result = fx.subscriptions.process_renewal(renewal.uuid).await;
        assert!(matches!(
            result,
            Err(AppError::RenewalLicenseShortfall { renewed: 1, allocated: 2 })
        ));
    }

    #[tokio::test]
    async fn contains_content_uses_plan_catalog() {
        let catalog = StaticCatalogClient::answering(true);
        let fx = Fixture::with_catalog(catalog.clone());
        let agreement = fx.agreement("acme", None).await;
        let plan = fx.plan(&agreement, "Plano", 0, date(2025, 1, 1)).await;

        let ids = vec!["course-v1:edX+DemoX".to_string()];
        assert!(fx.subscriptions.contains_content(&plan, &ids).await.unwrap());
        assert_eq!(catalog.calls(), vec![(plan.enterprise_catalog_uuid, ids)]);
    }

    #[tokio::test]
    async fn catalog_failure_propagates() {
        let fx = Fixture::with_catalog(StaticCatalogClient::failing());
        let agreement = fx.agreement("acme", None).await;
        let plan = fx.plan(&agreement, "Plano", 0, date(2025, 1, 1)).await;

        let result = fx
            .subscriptions
            .contains_content(&plan, &["x".to_string()])
            .await;
        assert!(matches!(result, Err(AppError::CatalogServiceError(_))));
    }

    #[tokio::test]
    async fn plan_history_records_creation() {
        let fx = Fixture::new();
        let agreement = fx.agreement("acme", None).await;
        let plan = fx.plan(&agreement, "Plano", 0, date(2025, 1, 1)).await;

        let history = fx.subscriptions.plan_history(plan.uuid).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].record.title, "Plano");
    }

    #[tokio::test]
    async fn renewed_plan_from_other_agreement_is_rejected() {
        let fx = Fixture::new();
        let acme = fx.agreement("acme", None).await;
        let globex = fx.agreement("globex", None).await;
        let prior = fx.plan(&acme, "P1", 0, date(2024, 12, 31)).await;
        let foreign = fx.plan(&globex, "P2", 0, date(2025, 12, 31)).await;

        let mut payload = renewal_payload(date(2024, 12, 31), date(2025, 12, 31), 0);
        payload.renewed_subscription_plan_uuid = Some(foreign.uuid);
        let result = fx.subscriptions.create_renewal(prior.uuid, payload).await;

        assert!(matches!(result, Err(AppError::InvalidRenewal(_))));
        assert!(fx.subscriptions.future_renewals(&prior).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn activation_after_renewal_reaches_the_renewed_license() {
        let fx = Fixture::new();
        let agreement = fx.agreement("acme", None).await;
        let prior = fx.plan(&agreement, "P1", 1, date(2024, 12, 31)).await;
        let assigned = fx
            .licenses
            .assign_licenses(
                prior.uuid,
                AssignLicensesPayload {
                    assignees: vec![LicenseAssignee {
                        user_email: "learner@example.com".into(),
                        lms_user_id: None,
                    }],
                    greeting: String::new(),
                    closing: String::new(),
                },
            )
            .await
            .unwrap();
        let prior_key = assigned[0].activation_key.unwrap();

        let renewal = fx
            .subscriptions
            .create_renewal(prior.uuid, renewal_payload(date(2025, 1, 1), date(2026, 1, 1), 1))
            .await
            .unwrap();
        let (_, renewed_plan) = fx.subscriptions.process_renewal(renewal.uuid).await.unwrap();

        let copy = fx
            .store
            .list_licenses_for_plan(renewed_plan.uuid, &[LicenseStatus::Assigned])
            .await
            .unwrap()
            .remove(0);
        let renewed_key = copy.activation_key.unwrap();
        assert_ne!(renewed_key, prior_key);

        let learner = User {
            id: "7".into(),
            email: Some("learner@example.com".into()),
            lms_user_id: Some(7),
            assignments: vec![],
        };
        let activated = fx.licenses.activate(&learner, renewed_key).await.unwrap();
        assert_eq!(activated.uuid, copy.uuid);
        assert_eq!(activated.subscription_plan_uuid, renewed_plan.uuid);
        assert_eq!(activated.status, LicenseStatus::Activated);

        // A licença do plano anterior continua com a própria chave
        let untouched = fx.licenses.get_license(assigned[0].uuid).await.unwrap();
        assert_eq!(untouched.status, LicenseStatus::Assigned);
        let prior_activated = fx.licenses.activate(&learner, prior_key).await.unwrap();
        assert_eq!(prior_activated.uuid, assigned[0].uuid);
    }
}
