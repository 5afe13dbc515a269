// src/services/license_service.rs

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{error::AppError, utils::utc_now},
    db::SubscriptionStore,
    models::{
        agreement::CustomerAgreement,
        auth::User,
        email::EmailTemplateText,
        history::HistoryRecord,
        license::{
            AssignLicensesPayload, License, LicenseStatus, RemindLicensesPayload, RevocationOutcome,
        },
        subscription::SubscriptionPlan,
    },
    services::{email_service::EmailService, subscription_service::COUNTED_STATUSES},
};

// E-mails são comparados sem diferenciar maiúsculas
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone)]
pub struct LicenseService {
    store: Arc<dyn SubscriptionStore>,
    email: EmailService,
    batch_size: usize,
}

impl LicenseService {
    pub fn new(store: Arc<dyn SubscriptionStore>, email: EmailService, batch_size: usize) -> Self {
        Self { store, email, batch_size }
    }

    async fn plan_with_agreement(
        &self,
        plan_uuid: Uuid,
    ) -> Result<(SubscriptionPlan, CustomerAgreement), AppError> {
        let plan = self
            .store
            .find_plan(plan_uuid)
            .await?
            .ok_or(AppError::SubscriptionPlanNotFound)?;
        let agreement = self
            .store
            .find_agreement(plan.customer_agreement_uuid)
            .await?
            .ok_or(AppError::CustomerAgreementNotFound)?;
        Ok((plan, agreement))
    }

    pub async fn get_license(&self, uuid: Uuid) -> Result<License, AppError> {
        self.store
            .find_license(uuid)
            .await?
            .ok_or(AppError::LicenseNotFound)
    }

    /// Licença junto com o plano e o contrato (para checar permissões).
    pub async fn get_license_with_owner(
        &self,
        uuid: Uuid,
    ) -> Result<(License, SubscriptionPlan, CustomerAgreement), AppError> {
        let license = self.get_license(uuid).await?;
        let (plan, agreement) = self.plan_with_agreement(license.subscription_plan_uuid).await?;
        Ok((license, plan, agreement))
    }

    // =========================================================================
    //  1. ATRIBUIÇÃO
    // =========================================================================

    /// Atribui licenças aos destinatários e envia os e-mails de ativação.
    ///
    /// Quem já tem licença alocada no plano é ignorado. Quem tinha uma licença
    /// revogada no plano recebe essa mesma licença de volta, e o assento vazio
    /// criado na revogação é removido.
    pub async fn assign_licenses(
        &self,
        plan_uuid: Uuid,
        payload: AssignLicensesPayload,
    ) -> Result<Vec<License>, AppError> {
        payload.validate()?;
        let (plan, agreement) = self.plan_with_agreement(plan_uuid).await?;
        let now = utc_now();

        // 1. Carrega as licenças do plano
        let existing = self.store.list_licenses_for_plan(plan.uuid, &[]).await?;
        let mut unassigned = existing
            .iter()
            .filter(|l| l.status == LicenseStatus::Unassigned)
            .cloned();

        // 2. Decide, destinatário por destinatário, qual licença usar
        let mut seen = HashSet::new();
        let mut to_assign = Vec::new();
        let mut reused = 0usize;
        for assignee in &payload.assignees {
            let email = normalize_email(&assignee.user_email);
            if !seen.insert(email.clone()) {
                continue;
            }

            let held = existing
                .iter()
                .find(|l| l.user_email.as_deref() == Some(email.as_str()));
            match held {
                Some(license) if license.status.is_allocated() => {
                    tracing::info!("{} já está com {}; nada a fazer", email, license);
                }
                Some(license) => {
                    reused += 1;
                    to_assign.push((Some(license.clone()), email, assignee.lms_user_id));
                }
                None => to_assign.push((None, email, assignee.lms_user_id)),
            }
        }

        // 3. Cada atribuição consome um assento vazio (removido, no caso de reuso)
        let available = existing
            .iter()
            .filter(|l| l.status == LicenseStatus::Unassigned)
            .count();
        if to_assign.len() > available {
            return Err(AppError::NotEnoughUnassignedLicenses {
                requested: to_assign.len(),
                available,
            });
        }

        let mut updated = Vec::with_capacity(to_assign.len());
        let mut deleted = Vec::with_capacity(reused);
        for (revoked, email, lms_user_id) in to_assign {
            let seat = unassigned.next().ok_or(AppError::NotEnoughUnassignedLicenses {
                requested: updated.len() + 1,
                available,
            })?;
            let mut license = match revoked {
                Some(license) => {
                    deleted.push(seat);
                    license
                }
                None => seat,
            };
            license.assign(&email, lms_user_id, now)?;
            updated.push(license);
        }

        if updated.is_empty() {
            return Ok(updated);
        }

        // 4. Grava tudo junto e envia os e-mails
        self.store
            .commit_license_batch(&updated, &deleted, self.batch_size)
            .await?;
        tracing::info!(
            "✅ {} licença(s) atribuída(s) no plano {} ({} reaproveitada(s))",
            updated.len(),
            plan.uuid,
            reused
        );

        let text = EmailTemplateText {
            greeting: payload.greeting,
            closing: payload.closing,
        };
        // A atribuição já foi gravada: falha de entrega vira aviso no log
        if let Err(e) = self
            .email
            .send_activation_emails(&text, &updated, &plan, &agreement)
            .await
        {
            tracing::warn!("⚠️ Licenças atribuídas no plano {}, mas: {}", plan.uuid, e);
        }

        Ok(updated)
    }

    // =========================================================================
    //  2. LEMBRETES
    // =========================================================================

    /// Reenvia o e-mail para licenças atribuídas e ainda não ativadas e marca
    /// `last_remind_date` em todas elas.
    pub async fn remind(
        &self,
        plan_uuid: Uuid,
        payload: RemindLicensesPayload,
    ) -> Result<Vec<License>, AppError> {
        payload.validate()?;
        let (plan, agreement) = self.plan_with_agreement(plan_uuid).await?;

        let emails: HashSet<String> = payload.user_emails.iter().map(|e| normalize_email(e)).collect();
        let mut recipients: Vec<License> = self
            .store
            .list_licenses_for_plan(plan.uuid, &[LicenseStatus::Assigned])
            .await?
            .into_iter()
            .filter(|l| l.user_email.as_ref().is_some_and(|e| emails.contains(e)))
            .collect();

        if recipients.len() < emails.len() {
            tracing::warn!(
                "⚠️ {} e-mail(s) sem licença pendente no plano {}",
                emails.len() - recipients.len(),
                plan.uuid
            );
        }
        if recipients.is_empty() {
            return Ok(recipients);
        }

        let text = EmailTemplateText {
            greeting: payload.greeting,
            closing: payload.closing,
        };
        self.email
            .send_reminder_emails(&text, &recipients, &plan, &agreement)
            .await?;

        let now = utc_now();
        for license in &mut recipients {
            license.last_remind_date = Some(now);
            license.modified = now;
        }
        self.store
            .bulk_update_licenses(&recipients, self.batch_size)
            .await?;

        Ok(recipients)
    }

    // =========================================================================
    //  3. REVOGAÇÃO
    // =========================================================================

    /// Revoga a licença de `user_email` no plano e cria um assento vazio no lugar.
    ///
    /// Revogar de novo uma licença já revogada não conta contra o limite.
    pub async fn revoke(&self, plan_uuid: Uuid, user_email: &str) -> Result<RevocationOutcome, AppError> {
        let (plan, agreement) = self.plan_with_agreement(plan_uuid).await?;
        let email = normalize_email(user_email);

        // 1. Localiza a licença
        let mut license = self
            .store
            .list_licenses_for_plan(plan.uuid, &[])
            .await?
            .into_iter()
            .find(|l| l.user_email.as_deref() == Some(email.as_str()))
            .ok_or(AppError::LicenseNotFound)?;

        let num_licenses = self.store.count_licenses(plan.uuid, &COUNTED_STATUSES).await?;

        // 2. Já revogada: nada muda
        if !license.revoke(utc_now()) {
            return Ok(RevocationOutcome {
                revoked_license: license,
                replacement_license: None,
                revocations_remaining: plan.num_revocations_remaining(num_licenses),
            });
        }

        // 3. Limite de revogações
        let allowed = plan.num_revocations_allowed(num_licenses);
        if i64::from(plan.num_revocations_applied) >= allowed {
            return Err(AppError::RevocationLimitExceeded {
                plan_uuid: plan.uuid,
                allowed,
            });
        }

        // 4. Revoga, cria o substituto e incrementa o contador atomicamente
        let replacement = License::new_unassigned(plan.uuid, utc_now());
        let updated_plan = self
            .store
            .apply_revocation(&license, &replacement, allowed)
            .await?;
        let revocations_remaining = updated_plan.num_revocations_remaining(num_licenses);

        tracing::info!(
            "✅ {} revogada; restam {} revogações no plano",
            license,
            revocations_remaining
        );

        // 5. Limite esgotado: avisa a equipe responsável
        if revocations_remaining <= 0 {
            if let Err(e) = self
                .email
                .send_revocation_cap_notification(
                    &updated_plan,
                    &agreement,
                    updated_plan.num_revocations_applied,
                )
                .await
            {
                tracing::warn!("⚠️ Revogação gravada no plano {}, mas: {}", updated_plan.uuid, e);
            }
        }

        Ok(RevocationOutcome {
            revoked_license: license,
            replacement_license: Some(replacement),
            revocations_remaining,
        })
    }

    // =========================================================================
    //  4. ATIVAÇÃO (ALUNO)
    // =========================================================================

    pub async fn activate(&self, user: &User, activation_key: Uuid) -> Result<License, AppError> {
        let mut license = self
            .store
            .find_license_by_activation_key(activation_key)
            .await?
            .ok_or(AppError::InvalidActivationKey)?;

        // A licença precisa ser do próprio usuário
        let owns = match (&license.user_email, &user.email) {
            (Some(holder), Some(requester)) => holder == &normalize_email(requester),
            _ => false,
        };
        if !owns {
            return Err(AppError::Forbidden);
        }

        let now = utc_now();
        if license.activate(activation_key, now)? {
            if license.lms_user_id.is_none() {
                license.lms_user_id = user.lms_user_id;
            }
            self.store.save_license(&license).await?;
            tracing::info!("✅ {} ativada", license);
        }

        Ok(license)
    }

    pub async fn learner_licenses(&self, user: &User) -> Result<Vec<License>, AppError> {
        let email = user.email.as_deref().ok_or(AppError::Forbidden)?;
        self.store.licenses_by_user_email(&normalize_email(email)).await
    }

    // =========================================================================
    //  5. MANUTENÇÃO
    // =========================================================================

    /// Devolve a licença ao estado "unassigned" e grava.
    ///
    /// Licenças revogadas não voltam: a revogação já criou o assento substituto.
    pub async fn reset(&self, license_uuid: Uuid) -> Result<License, AppError> {
        let mut license = self.get_license(license_uuid).await?;
        if license.status == LicenseStatus::Revoked {
            return Err(AppError::InvalidLicenseTransition {
                from: LicenseStatus::Revoked.to_string(),
                to: LicenseStatus::Unassigned.to_string(),
            });
        }
        license.reset_to_unassigned(utc_now());
        self.store.save_license(&license).await?;

        tracing::info!("✅ {} voltou para unassigned", license);
        Ok(license)
    }

    /// Remove os dados pessoais do registro vivo e de todo o histórico da licença.
    pub async fn retire(&self, license_uuid: Uuid) -> Result<License, AppError> {
        let mut license = self.get_license(license_uuid).await?;
        license.clear_pii();
        license.modified = utc_now();
        self.store.save_license(&license).await?;

        let cleared = self.store.clear_license_history_pii(license.uuid).await?;
        tracing::info!("✅ Dados pessoais removidos de {} ({} versões históricas)", license, cleared);
        Ok(license)
    }

    pub async fn license_history(
        &self,
        license_uuid: Uuid,
    ) -> Result<Vec<HistoryRecord<License>>, AppError> {
        self.store.license_history(license_uuid).await
    }
}
