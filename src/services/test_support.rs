// src/services/test_support.rs
// Montagem comum dos testes de serviço: store e e-mail em memória, catálogo fixo.

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    db::{MemorySubscriptionStore, SubscriptionStore},
    models::{
        agreement::{CreateCustomerAgreementPayload, CustomerAgreement},
        subscription::{CreateSubscriptionPlanPayload, SubscriptionPlan},
    },
    services::{
        agreement_service::AgreementService,
        catalog_client::StaticCatalogClient,
        email_service::{EmailService, MemoryEmailProvider},
        license_service::LicenseService,
        subscription_service::SubscriptionService,
    },
};

pub const PORTAL_URL: &str = "https://portal.example.com";
pub const CAP_RECIPIENT: &str = "support@example.com";

pub struct Fixture {
    pub store: Arc<MemorySubscriptionStore>,
    pub emails: MemoryEmailProvider,
    pub catalog: StaticCatalogClient,
    pub agreements: AgreementService,
    pub subscriptions: SubscriptionService,
    pub licenses: LicenseService,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_catalog(StaticCatalogClient::answering(true))
    }

    pub fn with_catalog(catalog: StaticCatalogClient) -> Self {
        Self::build(catalog, MemoryEmailProvider::default())
    }

    pub fn with_emails(emails: MemoryEmailProvider) -> Self {
        Self::build(StaticCatalogClient::answering(true), emails)
    }

    fn build(catalog: StaticCatalogClient, emails: MemoryEmailProvider) -> Self {
        let store = Arc::new(MemorySubscriptionStore::new());
        let email_service = EmailService::new(
            Arc::new(emails.clone()),
            PORTAL_URL.to_string(),
            Some(CAP_RECIPIENT.to_string()),
        );
        let dyn_store: Arc<dyn SubscriptionStore> = store.clone();

        Self {
            agreements: AgreementService::new(dyn_store.clone()),
            subscriptions: SubscriptionService::new(dyn_store.clone(), Arc::new(catalog.clone()), 2),
            licenses: LicenseService::new(dyn_store, email_service, 2),
            store,
            emails,
            catalog,
        }
    }

    pub async fn agreement(&self, slug: &str, default_catalog: Option<Uuid>) -> CustomerAgreement {
        self.agreements
            .create_agreement(CreateCustomerAgreementPayload {
                enterprise_customer_uuid: Uuid::new_v4(),
                enterprise_customer_slug: slug.to_string(),
                default_enterprise_catalog_uuid: default_catalog,
            })
            .await
            .unwrap()
    }

    pub async fn plan(
        &self,
        agreement: &CustomerAgreement,
        title: &str,
        num_licenses: i64,
        expiration_date: NaiveDate,
    ) -> SubscriptionPlan {
        self.subscriptions
            .create_plan(agreement.uuid, plan_payload(title, num_licenses, expiration_date))
            .await
            .unwrap()
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn plan_payload(
    title: &str,
    num_licenses: i64,
    expiration_date: NaiveDate,
) -> CreateSubscriptionPlanPayload {
    CreateSubscriptionPlanPayload {
        title: title.to_string(),
        start_date: date(2024, 1, 1),
        expiration_date,
        enterprise_catalog_uuid: Some(Uuid::new_v4()),
        is_active: true,
        revoke_max_percentage: None,
        salesforce_opportunity_id: "000000000000ABCABC".to_string(),
        netsuite_product_id: 1,
        for_internal_use_only: false,
        num_licenses,
    }
}
