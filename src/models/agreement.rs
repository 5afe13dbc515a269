// src/models/agreement.rs

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::history::Audited;

// ---
// CustomerAgreement (O "Contrato" de um cliente corporativo)
// ---
// Agrupa todos os planos de assinatura de um cliente
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerAgreement {
    pub uuid: Uuid,
    // Único por contrato
    pub enterprise_customer_uuid: Uuid,
    // Único por contrato
    #[schema(example = "acme-corp")]
    pub enterprise_customer_slug: String,
    // Catálogo usado quando o plano não define um explicitamente
    pub default_enterprise_catalog_uuid: Option<Uuid>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl CustomerAgreement {
    pub fn new(
        enterprise_customer_uuid: Uuid,
        enterprise_customer_slug: String,
        default_enterprise_catalog_uuid: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            enterprise_customer_uuid,
            enterprise_customer_slug,
            default_enterprise_catalog_uuid,
            created: now,
            modified: now,
        }
    }
}

impl fmt::Display for CustomerAgreement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<CustomerAgreement: '{}'>", self.enterprise_customer_slug)
    }
}

impl Audited for CustomerAgreement {
    const HISTORY_TABLE: &'static str = "historical_customer_agreements";

    fn record_uuid(&self) -> Uuid {
        self.uuid
    }
}

// O Payload para criar um contrato
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerAgreementPayload {
    pub enterprise_customer_uuid: Uuid,

    #[validate(length(min = 1, max = 128, message = "O slug deve ter entre 1 e 128 caracteres."))]
    #[schema(example = "acme-corp")]
    pub enterprise_customer_slug: String,

    pub default_enterprise_catalog_uuid: Option<Uuid>,
}

// Dados de expiração de um plano, usados para ordenar os planos do contrato
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanExpiration {
    pub uuid: Uuid,
    #[schema(example = 30)]
    pub days_until_expiration: i64,
    #[schema(example = 395)]
    pub days_until_expiration_including_renewals: i64,
    pub is_active: bool,
}

/// Ordena do "mais relevante" para o menos: planos ativos primeiro e, dentro
/// de cada grupo, quem expira mais tarde (contando renovações) primeiro.
/// Empates mantêm a ordem de entrada.
pub fn order_plan_expirations(mut expirations: Vec<PlanExpiration>) -> Vec<PlanExpiration> {
    expirations.sort_by(|a, b| compare_expirations(b, a));
    expirations
}

fn compare_expirations(a: &PlanExpiration, b: &PlanExpiration) -> Ordering {
    (a.is_active, a.days_until_expiration_including_renewals)
        .cmp(&(b.is_active, b.days_until_expiration_including_renewals))
}

// Resposta completa (Contrato + expirações ordenadas)
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerAgreementDetail {
    #[serde(flatten)]
    pub agreement: CustomerAgreement,
    pub ordered_subscription_plan_expirations: Vec<PlanExpiration>,
}
