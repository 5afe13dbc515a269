// src/services/agreement_service.rs

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{error::AppError, utils::utc_now},
    db::SubscriptionStore,
    models::{
        agreement::{
            order_plan_expirations, CreateCustomerAgreementPayload, CustomerAgreement,
            PlanExpiration,
        },
        subscription::RenewalChain,
    },
};

#[derive(Clone)]
pub struct AgreementService {
    store: Arc<dyn SubscriptionStore>,
}

impl AgreementService {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    pub async fn create_agreement(
        &self,
        payload: CreateCustomerAgreementPayload,
    ) -> Result<CustomerAgreement, AppError> {
        payload.validate()?;

        let agreement = CustomerAgreement::new(
            payload.enterprise_customer_uuid,
            payload.enterprise_customer_slug.trim().to_string(),
            payload.default_enterprise_catalog_uuid,
            utc_now(),
        );
        self.store.create_agreement(&agreement).await?;

        tracing::info!("✅ Contrato criado: {}", agreement);
        Ok(agreement)
    }

    pub async fn get_agreement(&self, uuid: Uuid) -> Result<CustomerAgreement, AppError> {
        self.store
            .find_agreement(uuid)
            .await?
            .ok_or(AppError::CustomerAgreementNotFound)
    }

    /// Expirações de todos os planos do contrato, ativos primeiro e, dentro de
    /// cada grupo, quem dura mais (contando renovações) primeiro.
    pub async fn ordered_subscription_plan_expirations(
        &self,
        agreement: &CustomerAgreement,
        today: NaiveDate,
    ) -> Result<Vec<PlanExpiration>, AppError> {
        let plans = self.store.list_plans_for_agreement(agreement.uuid).await?;
        let chain = RenewalChain::new(self.store.list_renewals_for_agreement(agreement.uuid).await?);

        let expirations = plans
            .iter()
            .map(|plan| PlanExpiration {
                uuid: plan.uuid,
                days_until_expiration: plan.days_until_expiration(today),
                days_until_expiration_including_renewals: chain
                    .days_until_expiration_including_renewals(plan, today),
                is_active: plan.is_active,
            })
            .collect();

        Ok(order_plan_expirations(expirations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{date, plan_payload, Fixture};

    #[tokio::test]
    async fn duplicated_slug_is_rejected() {
        let fx = Fixture::new();
        fx.agreement("acme", None).await;

        let result = fx
            .agreements
            .create_agreement(CreateCustomerAgreementPayload {
                enterprise_customer_uuid: Uuid::new_v4(),
                enterprise_customer_slug: "acme".into(),
                default_enterprise_catalog_uuid: None,
            })
            .await;
        assert!(matches!(result, Err(AppError::UniqueConstraintViolation(_))));
    }

    #[tokio::test]
    async fn empty_slug_fails_validation() {
        let fx = Fixture::new();
        let result = fx
            .agreements
            .create_agreement(CreateCustomerAgreementPayload {
                enterprise_customer_uuid: Uuid::new_v4(),
                enterprise_customer_slug: String::new(),
                default_enterprise_catalog_uuid: None,
            })
            .await;
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }

    #[tokio::test]
    async fn unknown_agreement_is_not_found() {
        let fx = Fixture::new();
        let result = fx.agreements.get_agreement(Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::CustomerAgreementNotFound)));
    }

    #[tokio::test]
    async fn plan_expirations_are_ordered_active_first() {
        let fx = Fixture::new();
        let today = date(2024, 6, 1);
        let agreement = fx.agreement("acme", None).await;

        // A: ativo, 10 dias; B: inativo, 50 dias; C: ativo, 5 dias
        let a = fx.plan(&agreement, "A", 0, date(2024, 6, 11)).await;
        let mut b_payload = plan_payload("B", 0, date(2024, 7, 21));
        b_payload.is_active = false;
        let b = fx.subscriptions.create_plan(agreement.uuid, b_payload).await.unwrap();
        let c = fx.plan(&agreement, "C", 0, date(2024, 6, 6)).await;

        let ordered = fx
            .agreements
            .ordered_subscription_plan_expirations(&agreement, today)
            .await
            .unwrap();
        let order: Vec<Uuid> = ordered.iter().map(|e| e.uuid).collect();
        assert_eq!(order, vec![a.uuid, c.uuid, b.uuid]);
        assert_eq!(ordered[0].days_until_expiration, 10);
    }

    #[tokio::test]
    async fn renewals_push_a_plan_up_the_order() {
        let fx = Fixture::new();
        let today = date(2024, 6, 1);
        let agreement = fx.agreement("acme", None).await;

        let short = fx.plan(&agreement, "Curto", 0, date(2024, 6, 11)).await;
        let long = fx.plan(&agreement, "Longo", 0, date(2024, 8, 1)).await;

        // Renova o plano curto até 2025
        fx.subscriptions
            .create_renewal(
                short.uuid,
                crate::models::subscription::CreateRenewalPayload {
                    renewed_subscription_plan_uuid: None,
                    salesforce_opportunity_id: "000000000000ABCABC".into(),
                    number_of_licenses: 0,
                    effective_date: date(2024, 6, 11),
                    renewed_expiration_date: date(2025, 6, 11),
                },
            )
            .await
            .unwrap();

        let ordered = fx
            .agreements
            .ordered_subscription_plan_expirations(&agreement, today)
            .await
            .unwrap();
        assert_eq!(ordered[0].uuid, short.uuid);
        assert_eq!(ordered[0].days_until_expiration, 10);
        assert_eq!(ordered[1].uuid, long.uuid);
    }
}
