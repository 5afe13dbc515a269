// src/models/subscription.rs

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::common::utils::days_until;
use crate::models::history::Audited;

// O Salesforce Opportunity ID tem exatamente 18 caracteres
pub const SALESFORCE_ID_LENGTH: u64 = 18;

pub const MIN_NUM_LICENSES: i64 = 0;
pub const MAX_NUM_LICENSES: i64 = 5000;

pub const DEFAULT_REVOKE_MAX_PERCENTAGE: i32 = 5;

// Limite de saltos ao percorrer uma cadeia de renovações
pub const MAX_RENEWAL_CHAIN_LENGTH: usize = 100;

// ---
// SubscriptionPlan (Um "pool" de licenças comprado pelo cliente)
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlan {
    pub uuid: Uuid,
    #[schema(example = "Plano Anual 2024")]
    pub title: String,
    pub start_date: NaiveDate,
    pub expiration_date: NaiveDate,
    pub expiration_processed: bool,
    pub enterprise_catalog_uuid: Uuid,
    pub customer_agreement_uuid: Uuid,
    pub is_active: bool,
    // Percentual das licenças que podem ser revogadas
    #[schema(example = 5)]
    pub revoke_max_percentage: i32,
    pub num_revocations_applied: i32,
    #[schema(example = "000000000000ABCABC")]
    pub salesforce_opportunity_id: String,
    pub netsuite_product_id: i32,
    pub for_internal_use_only: bool,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl SubscriptionPlan {
    pub fn days_until_expiration(&self, today: NaiveDate) -> i64 {
        days_until(self.expiration_date, today)
    }

    /// Revogações permitidas para `num_licenses` licenças (arredondado para cima).
    pub fn num_revocations_allowed(&self, num_licenses: i64) -> i64 {
        let percentage = i64::from(self.revoke_max_percentage.max(0));
        (num_licenses * percentage + 99) / 100
    }

    pub fn num_revocations_remaining(&self, num_licenses: i64) -> i64 {
        self.num_revocations_allowed(num_licenses) - i64::from(self.num_revocations_applied)
    }
}

impl fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<SubscriptionPlan with Title '{}' for CustomerAgreement '{}'{}>",
            self.title,
            self.customer_agreement_uuid,
            if self.for_internal_use_only { " (for internal use only)" } else { "" }
        )
    }
}

impl Audited for SubscriptionPlan {
    const HISTORY_TABLE: &'static str = "historical_subscription_plans";

    fn record_uuid(&self) -> Uuid {
        self.uuid
    }
}

// ---
// SubscriptionPlanRenewal (O "elo" entre um plano e o seu sucessor)
// ---
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlanRenewal {
    pub uuid: Uuid,
    // No máximo uma renovação por plano anterior
    pub prior_subscription_plan_uuid: Uuid,
    pub renewed_subscription_plan_uuid: Option<Uuid>,
    pub salesforce_opportunity_id: String,
    #[schema(example = 100)]
    pub number_of_licenses: i32,
    pub effective_date: NaiveDate,
    pub renewed_expiration_date: NaiveDate,
    pub processed: bool,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl fmt::Display for SubscriptionPlanRenewal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<SubscriptionPlanRenewal with id '{}' for subscription '{}' effective on '{}'>",
            self.uuid, self.prior_subscription_plan_uuid, self.effective_date
        )
    }
}

impl Audited for SubscriptionPlanRenewal {
    const HISTORY_TABLE: &'static str = "historical_subscription_plan_renewals";

    fn record_uuid(&self) -> Uuid {
        self.uuid
    }
}

// ---
// Cadeia de renovações: plano anterior -> renovação
// ---

/// Índice de adjacência "plano anterior -> renovação", montado a partir das
/// renovações de um contrato.
#[derive(Debug, Default)]
pub struct RenewalChain {
    by_prior_plan: HashMap<Uuid, SubscriptionPlanRenewal>,
}

impl RenewalChain {
    pub fn new(renewals: impl IntoIterator<Item = SubscriptionPlanRenewal>) -> Self {
        let by_prior_plan = renewals
            .into_iter()
            .map(|renewal| (renewal.prior_subscription_plan_uuid, renewal))
            .collect();
        Self { by_prior_plan }
    }

    pub fn renewal_for(&self, plan_uuid: Uuid) -> Option<&SubscriptionPlanRenewal> {
        self.by_prior_plan.get(&plan_uuid)
    }

    /// Renovações "futuras" de um plano, na ordem em que a cadeia é percorrida.
    /// Não inclui a renovação que criou o plano.
    ///
    /// Nada no modelo impede um ciclo, então a travessia para ao revisitar um
    /// plano ou ao atingir `MAX_RENEWAL_CHAIN_LENGTH`.
    pub fn future_renewals(&self, plan_uuid: Uuid) -> Vec<SubscriptionPlanRenewal> {
        let mut renewals = Vec::new();
        let mut visited = HashSet::from([plan_uuid]);
        let mut current = self.renewal_for(plan_uuid);

        while let Some(renewal) = current {
            if renewals.len() >= MAX_RENEWAL_CHAIN_LENGTH {
                tracing::warn!(
                    "⚠️ Cadeia de renovações do plano {} excedeu {} elos; travessia interrompida",
                    plan_uuid,
                    MAX_RENEWAL_CHAIN_LENGTH
                );
                break;
            }
            renewals.push(renewal.clone());

            current = match renewal.renewed_subscription_plan_uuid {
                Some(next) if !visited.insert(next) => {
                    tracing::warn!(
                        "⚠️ Ciclo detectado na cadeia de renovações do plano {} (plano {} repetido)",
                        plan_uuid,
                        next
                    );
                    None
                }
                Some(next) => self.renewal_for(next),
                None => None,
            };
        }

        renewals
    }

    /// Dias até a expiração contando as renovações futuras. Sem renovações,
    /// usa a data de expiração do próprio plano.
    pub fn days_until_expiration_including_renewals(
        &self,
        plan: &SubscriptionPlan,
        today: NaiveDate,
    ) -> i64 {
        self.future_renewals(plan.uuid)
            .iter()
            .map(|renewal| renewal.renewed_expiration_date)
            .max()
            .map(|date| days_until(date, today))
            .unwrap_or_else(|| plan.days_until_expiration(today))
    }
}

// --- Payloads ---

fn validate_salesforce_id(value: &str) -> Result<(), ValidationError> {
    if value.chars().count() as u64 != SALESFORCE_ID_LENGTH {
        let mut error = ValidationError::new("salesforce_id_length");
        error.message = Some("O Salesforce Opportunity ID deve ter exatamente 18 caracteres.".into());
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionPlanPayload {
    #[validate(length(min = 1, max = 128, message = "O título deve ter entre 1 e 128 caracteres."))]
    pub title: String,
    pub start_date: NaiveDate,
    pub expiration_date: NaiveDate,
    // Se omitido, usa o catálogo padrão do contrato
    pub enterprise_catalog_uuid: Option<Uuid>,
    #[serde(default)]
    pub is_active: bool,
    #[validate(range(min = 0, max = 100, message = "O percentual deve estar entre 0 e 100."))]
    pub revoke_max_percentage: Option<i32>,
    #[validate(custom(function = "validate_salesforce_id"))]
    pub salesforce_opportunity_id: String,
    pub netsuite_product_id: i32,
    #[serde(default)]
    pub for_internal_use_only: bool,
    #[serde(default)]
    #[validate(range(min = MIN_NUM_LICENSES, max = MAX_NUM_LICENSES, message = "O número de licenças deve estar entre 0 e 5000."))]
    pub num_licenses: i64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IncreaseLicensesPayload {
    #[validate(range(min = 1, max = MAX_NUM_LICENSES, message = "O número de licenças deve estar entre 1 e 5000."))]
    pub num_licenses: i64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRenewalPayload {
    pub renewed_subscription_plan_uuid: Option<Uuid>,
    #[validate(custom(function = "validate_salesforce_id"))]
    pub salesforce_opportunity_id: String,
    #[validate(range(min = 0, max = 5000, message = "O número de licenças deve estar entre 0 e 5000."))]
    pub number_of_licenses: i32,
    pub effective_date: NaiveDate,
    pub renewed_expiration_date: NaiveDate,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ContainsContentQuery {
    // Lista separada por vírgulas
    #[schema(example = "course-v1:edX+DemoX+Demo_Course,course-v1:edX+X+2024")]
    pub content_ids: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainsContentResponse {
    pub contains_content_items: bool,
}

// Resposta completa (Plano + números derivados)
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlanSummary {
    #[serde(flatten)]
    pub plan: SubscriptionPlan,
    pub num_licenses: i64,
    pub num_allocated_licenses: i64,
    pub num_unassigned_licenses: i64,
    pub num_revocations_remaining: i64,
    pub days_until_expiration: i64,
    pub days_until_expiration_including_renewals: i64,
}

// Resultado do processamento de uma renovação
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedRenewal {
    pub renewal: SubscriptionPlanRenewal,
    pub renewed_subscription_plan: SubscriptionPlan,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn plan(expiration_date: NaiveDate) -> SubscriptionPlan {
        SubscriptionPlan {
            uuid: Uuid::new_v4(),
            title: "Plano".into(),
            start_date: date(2024, 1, 1),
            expiration_date,
            expiration_processed: false,
            enterprise_catalog_uuid: Uuid::new_v4(),
            customer_agreement_uuid: Uuid::new_v4(),
            is_active: true,
            revoke_max_percentage: DEFAULT_REVOKE_MAX_PERCENTAGE,
            num_revocations_applied: 0,
            salesforce_opportunity_id: "000000000000ABCABC".into(),
            netsuite_product_id: 1,
            for_internal_use_only: false,
            created: Utc::now(),
            modified: Utc::now(),
        }
    }

    fn renewal(prior: Uuid, renewed: Option<Uuid>, expires: NaiveDate) -> SubscriptionPlanRenewal {
        SubscriptionPlanRenewal {
            uuid: Uuid::new_v4(),
            prior_subscription_plan_uuid: prior,
            renewed_subscription_plan_uuid: renewed,
            salesforce_opportunity_id: "000000000000ABCABC".into(),
            number_of_licenses: 10,
            effective_date: expires - chrono::Days::new(365),
            renewed_expiration_date: expires,
            processed: false,
            created: Utc::now(),
            modified: Utc::now(),
        }
    }

    #[test]
    fn revocation_cap_rounds_up() {
        let plan = plan(date(2024, 12, 31));
        assert_eq!(plan.num_revocations_allowed(0), 0);
        assert_eq!(plan.num_revocations_allowed(1), 1);
        assert_eq!(plan.num_revocations_allowed(20), 1);
        assert_eq!(plan.num_revocations_allowed(21), 2);
        assert_eq!(plan.num_revocations_remaining(21), 2);
    }

    #[test]
    fn plan_without_renewal_uses_own_expiration() {
        let today = date(2024, 6, 1);
        let plan = plan(date(2024, 6, 11));
        let chain = RenewalChain::default();

        assert!(chain.future_renewals(plan.uuid).is_empty());
        assert_eq!(
            chain.days_until_expiration_including_renewals(&plan, today),
            plan.days_until_expiration(today)
        );
    }

    #[test]
    fn chain_is_walked_in_order() {
        let (p1, p2, p3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let r12 = renewal(p1, Some(p2), date(2025, 6, 1));
        let r23 = renewal(p2, Some(p3), date(2026, 6, 1));
        let chain = RenewalChain::new(vec![r23.clone(), r12.clone()]);

        assert_eq!(chain.future_renewals(p1), vec![r12, r23.clone()]);
        assert_eq!(chain.future_renewals(p2), vec![r23]);
        assert!(chain.future_renewals(p3).is_empty());
    }

    #[test]
    fn expiration_uses_latest_renewal_date() {
        let today = date(2024, 6, 1);
        let p1 = plan(date(2024, 6, 11));
        let p2 = Uuid::new_v4();
        let chain = RenewalChain::new(vec![
            renewal(p1.uuid, Some(p2), date(2025, 6, 1)),
            renewal(p2, None, date(2026, 6, 1)),
        ]);

        assert_eq!(
            chain.days_until_expiration_including_renewals(&p1, today),
            days_until(date(2026, 6, 1), today)
        );
    }

    #[test]
    fn renewal_without_successor_ends_chain() {
        let p1 = Uuid::new_v4();
        let r = renewal(p1, None, date(2025, 6, 1));
        let chain = RenewalChain::new(vec![r.clone()]);
        assert_eq!(chain.future_renewals(p1), vec![r]);
    }

    #[test]
    fn cyclic_chain_terminates() {
        let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
        let chain = RenewalChain::new(vec![
            renewal(p1, Some(p2), date(2025, 6, 1)),
            renewal(p2, Some(p1), date(2026, 6, 1)),
        ]);

        let renewals = chain.future_renewals(p1);
        assert_eq!(renewals.len(), 2);
    }

    #[test]
    fn salesforce_id_must_have_18_chars() {
        assert!(validate_salesforce_id("000000000000ABCABC").is_ok());
        assert!(validate_salesforce_id("short").is_err());
    }
}
