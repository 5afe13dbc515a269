// src/models/license.rs

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::common::{error::AppError, utils::license_activation_link};
use crate::models::history::Audited;

// --- Enums ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "license_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Unassigned,
    Assigned,
    Activated,
    Revoked,
}

impl LicenseStatus {
    /// Alocada = atribuída ou ativada. Revogadas não contam.
    pub fn is_allocated(self) -> bool {
        matches!(self, LicenseStatus::Assigned | LicenseStatus::Activated)
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LicenseStatus::Unassigned => "unassigned",
            LicenseStatus::Assigned => "assigned",
            LicenseStatus::Activated => "activated",
            LicenseStatus::Revoked => "revoked",
        };
        f.write_str(name)
    }
}

// ---
// License (Um "assento" dentro de um plano)
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct License {
    pub uuid: Uuid,
    pub status: LicenseStatus,
    pub assigned_date: Option<DateTime<Utc>>,
    pub activation_date: Option<DateTime<Utc>>,
    pub activation_key: Option<Uuid>,
    pub last_remind_date: Option<DateTime<Utc>>,
    pub revoked_date: Option<DateTime<Utc>>,
    pub user_email: Option<String>,
    pub lms_user_id: Option<i32>,
    pub subscription_plan_uuid: Uuid,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,

    // Calculado uma única vez por instância (não é coluna)
    #[sqlx(skip)]
    #[serde(skip)]
    activation_link: OnceLock<Option<String>>,
}

impl License {
    /// Cria um assento novo, ainda sem dono.
    pub fn new_unassigned(subscription_plan_uuid: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            status: LicenseStatus::Unassigned,
            assigned_date: None,
            activation_date: None,
            activation_key: None,
            last_remind_date: None,
            revoked_date: None,
            user_email: None,
            lms_user_id: None,
            subscription_plan_uuid,
            created: now,
            modified: now,
            activation_link: OnceLock::new(),
        }
    }

    /// Cópia de uma licença alocada para outro plano (usada ao processar renovações).
    /// A cópia ganha chave de ativação própria: cada chave aponta para uma única licença.
    pub fn copy_into_plan(&self, subscription_plan_uuid: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            activation_key: self.activation_key.map(|_| Uuid::new_v4()),
            subscription_plan_uuid,
            created: now,
            modified: now,
            activation_link: OnceLock::new(),
            ..self.clone()
        }
    }

    fn holds(&self, email: &str, lms_user_id: Option<i32>) -> bool {
        let same_email = self
            .user_email
            .as_deref()
            .is_some_and(|current| current.eq_ignore_ascii_case(email));
        let same_user = match (self.lms_user_id, lms_user_id) {
            (Some(current), Some(requested)) => current == requested,
            _ => true,
        };
        same_email && same_user
    }

    /// Atribui a licença a um aluno.
    ///
    /// Retorna `Ok(false)` quando a licença já pertence à mesma identidade (no-op).
    pub fn assign(
        &mut self,
        email: &str,
        lms_user_id: Option<i32>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        match self.status {
            LicenseStatus::Unassigned | LicenseStatus::Revoked => {
                self.status = LicenseStatus::Assigned;
                self.user_email = Some(email.to_string());
                self.lms_user_id = lms_user_id;
                self.assigned_date = Some(now);
                self.activation_key = Some(Uuid::new_v4());
                self.activation_date = None;
                self.revoked_date = None;
                self.last_remind_date = None;
                self.activation_link = OnceLock::new();
                self.modified = now;
                Ok(true)
            }
            LicenseStatus::Assigned | LicenseStatus::Activated if self.holds(email, lms_user_id) => {
                Ok(false)
            }
            other => Err(AppError::InvalidLicenseTransition {
                from: other.to_string(),
                to: LicenseStatus::Assigned.to_string(),
            }),
        }
    }

    /// Ativa a licença. A chave precisa bater com a gerada na atribuição.
    ///
    /// Reativar com a mesma chave é um no-op (`Ok(false)`).
    pub fn activate(&mut self, activation_key: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        match self.status {
            LicenseStatus::Assigned | LicenseStatus::Activated => {
                if self.activation_key != Some(activation_key) {
                    return Err(AppError::InvalidActivationKey);
                }
                if self.status == LicenseStatus::Activated {
                    return Ok(false);
                }
                self.status = LicenseStatus::Activated;
                self.activation_date = Some(now);
                self.modified = now;
                Ok(true)
            }
            other => Err(AppError::InvalidLicenseTransition {
                from: other.to_string(),
                to: LicenseStatus::Activated.to_string(),
            }),
        }
    }

    /// Marca a licença como revogada. Retorna `false` se ela já estava revogada,
    /// para que o contador do plano não seja incrementado duas vezes.
    pub fn revoke(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == LicenseStatus::Revoked {
            return false;
        }
        self.status = LicenseStatus::Revoked;
        self.revoked_date = Some(now);
        self.modified = now;
        true
    }

    /// Volta a licença para "unassigned" e limpa os campos que deixaram de valer.
    ///
    /// NÃO persiste nada: quem chama decide quando salvar (ou usa o bulk update).
    pub fn reset_to_unassigned(&mut self, now: DateTime<Utc>) {
        self.status = LicenseStatus::Unassigned;
        self.user_email = None;
        self.lms_user_id = None;
        self.last_remind_date = None;
        self.activation_date = None;
        self.activation_key = None;
        self.assigned_date = None;
        self.revoked_date = None;
        self.activation_link = OnceLock::new();
        self.modified = now;
    }

    /// Remove os dados pessoais (e-mail e id do usuário) do registro vivo.
    pub fn clear_pii(&mut self) {
        self.user_email = None;
        self.lms_user_id = None;
    }

    /// Link de ativação derivado do slug do cliente e da chave de ativação.
    /// Calculado na primeira chamada e reaproveitado enquanto a instância existir.
    pub fn activation_link(&self, portal_base_url: &str, enterprise_slug: &str) -> Option<&str> {
        self.activation_link
            .get_or_init(|| {
                self.activation_key
                    .map(|key| license_activation_link(portal_base_url, enterprise_slug, key))
            })
            .as_deref()
    }
}

impl fmt::Display for License {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<License with UUID '{}' for SubscriptionPlan '{}'>",
            self.uuid, self.subscription_plan_uuid
        )
    }
}

impl Audited for License {
    const HISTORY_TABLE: &'static str = "historical_licenses";

    fn record_uuid(&self) -> Uuid {
        self.uuid
    }
}

// --- Payloads ---

// Um destinatário de licença
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LicenseAssignee {
    #[validate(email(message = "O e-mail fornecido é inválido."))]
    #[schema(example = "aluno@example.com")]
    pub user_email: String,
    pub lms_user_id: Option<i32>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignLicensesPayload {
    #[validate(length(min = 1, message = "Informe pelo menos um destinatário."), nested)]
    pub assignees: Vec<LicenseAssignee>,
    #[serde(default)]
    pub greeting: String,
    #[serde(default)]
    pub closing: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemindLicensesPayload {
    #[validate(length(min = 1, message = "Informe pelo menos um e-mail."))]
    pub user_emails: Vec<String>,
    #[serde(default)]
    pub greeting: String,
    #[serde(default)]
    pub closing: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokeLicensePayload {
    #[validate(email(message = "O e-mail fornecido é inválido."))]
    pub user_email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivateLicensePayload {
    pub activation_key: Uuid,
}

// Resultado de uma revogação: a licença revogada e o assento que a substitui
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevocationOutcome {
    pub revoked_license: License,
    pub replacement_license: Option<License>,
    pub revocations_remaining: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assigned_license() -> License {
        let mut license = License::new_unassigned(Uuid::new_v4(), Utc::now());
        license.assign("learner@example.com", Some(42), Utc::now()).unwrap();
        license
    }

    #[test]
    fn assign_sets_holder_and_activation_key() {
        let license = assigned_license();
        assert_eq!(license.status, LicenseStatus::Assigned);
        assert_eq!(license.user_email.as_deref(), Some("learner@example.com"));
        assert_eq!(license.lms_user_id, Some(42));
        assert!(license.assigned_date.is_some());
        assert!(license.activation_key.is_some());
    }

    #[test]
    fn assigning_same_identity_again_is_a_noop() {
        let mut license = assigned_license();
        let key = license.activation_key;
        let changed = license.assign("learner@example.com", Some(42), Utc::now()).unwrap();
        assert!(!changed);
        assert_eq!(license.activation_key, key);
    }

    #[test]
    fn assigning_held_license_to_someone_else_fails() {
        let mut license = assigned_license();
        let result = license.assign("other@example.com", None, Utc::now());
        assert!(matches!(result, Err(AppError::InvalidLicenseTransition { .. })));
    }

    #[test]
    fn revoked_license_can_be_reassigned() {
        let mut license = assigned_license();
        assert!(license.revoke(Utc::now()));
        assert!(license.assign("learner@example.com", Some(42), Utc::now()).unwrap());
        assert_eq!(license.status, LicenseStatus::Assigned);
        assert!(license.revoked_date.is_none());
    }

    #[test]
    fn activate_requires_matching_key() {
        let mut license = assigned_license();
        let result = license.activate(Uuid::new_v4(), Utc::now());
        assert!(matches!(result, Err(AppError::InvalidActivationKey)));
        assert_eq!(license.status, LicenseStatus::Assigned);

        let key = license.activation_key.unwrap();
        assert!(license.activate(key, Utc::now()).unwrap());
        assert_eq!(license.status, LicenseStatus::Activated);
        assert!(license.activation_date.is_some());

        // Segunda ativação com a mesma chave não muda nada
        assert!(!license.activate(key, Utc::now()).unwrap());
    }

    #[test]
    fn unassigned_license_cannot_be_activated() {
        let mut license = License::new_unassigned(Uuid::new_v4(), Utc::now());
        let result = license.activate(Uuid::new_v4(), Utc::now());
        assert!(matches!(result, Err(AppError::InvalidLicenseTransition { .. })));
    }

    #[test]
    fn revoke_twice_only_changes_once() {
        let mut license = assigned_license();
        assert!(license.revoke(Utc::now()));
        let revoked_at = license.revoked_date;
        assert!(!license.revoke(Utc::now()));
        assert_eq!(license.revoked_date, revoked_at);
        assert_eq!(license.status, LicenseStatus::Revoked);
    }

    #[test]
    fn copy_into_plan_gets_its_own_activation_key() {
        let license = assigned_license();
        let renewed_plan = Uuid::new_v4();
        let copy = license.copy_into_plan(renewed_plan, Utc::now());

        assert_ne!(copy.uuid, license.uuid);
        assert_eq!(copy.subscription_plan_uuid, renewed_plan);
        assert_eq!(copy.status, LicenseStatus::Assigned);
        assert_eq!(copy.user_email, license.user_email);
        assert!(copy.activation_key.is_some());
        assert_ne!(copy.activation_key, license.activation_key);

        let unassigned = License::new_unassigned(Uuid::new_v4(), Utc::now());
        assert!(unassigned.copy_into_plan(renewed_plan, Utc::now()).activation_key.is_none());
    }

    #[test]
    fn reset_clears_every_assignment_field() {
        let mut license = assigned_license();
        let key = license.activation_key.unwrap();
        license.activate(key, Utc::now()).unwrap();
        let reset_at = Utc::now();
        license.reset_to_unassigned(reset_at);

        assert_eq!(license.status, LicenseStatus::Unassigned);
        assert!(license.user_email.is_none());
        assert!(license.lms_user_id.is_none());
        assert!(license.activation_key.is_none());
        assert!(license.activation_date.is_none());
        assert!(license.assigned_date.is_none());
        assert!(license.revoked_date.is_none());
        assert!(license.last_remind_date.is_none());
        assert_eq!(license.modified, reset_at);
    }

    #[test]
    fn clear_pii_keeps_status() {
        let mut license = assigned_license();
        license.clear_pii();
        assert!(license.user_email.is_none());
        assert!(license.lms_user_id.is_none());
        assert_eq!(license.status, LicenseStatus::Assigned);
    }

    #[test]
    fn activation_link_is_cached_for_the_instance() {
        let license = assigned_license();
        let key = license.activation_key.unwrap();
        let first = license
            .activation_link("https://portal.example.com", "acme")
            .map(str::to_string);
        assert_eq!(
            first.as_deref(),
            Some(format!("https://portal.example.com/acme/licenses/{key}/activate").as_str())
        );

        // Mesmo com outro slug, a instância devolve o valor calculado na primeira vez
        let second = license.activation_link("https://portal.example.com", "other");
        assert_eq!(second, first.as_deref());
    }

    #[test]
    fn unassigned_license_has_no_activation_link() {
        let license = License::new_unassigned(Uuid::new_v4(), Utc::now());
        assert!(license.activation_link("https://portal.example.com", "acme").is_none());
    }
}
