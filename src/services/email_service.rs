// src/services/email_service.rs

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    common::error::AppError,
    models::{
        agreement::CustomerAgreement,
        email::{
            EmailMessage, EmailTemplateText, LICENSE_ACTIVATION_EMAIL_SUBJECT,
            LICENSE_ACTIVATION_EMAIL_TEMPLATE, LICENSE_REMINDER_EMAIL_SUBJECT,
            LICENSE_REMINDER_EMAIL_TEMPLATE, REVOCATION_CAP_NOTIFICATION_EMAIL_SUBJECT,
            REVOCATION_CAP_NOTIFICATION_EMAIL_TEMPLATE,
        },
        license::License,
        subscription::SubscriptionPlan,
    },
};

/// Canal de entrega dos e-mails (SMTP, API de terceiros, console...).
#[async_trait]
pub trait EmailProvider: Send + Sync + 'static {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError>;
}

/// Provedor de desenvolvimento: só registra a mensagem no log.
pub struct ConsoleEmailProvider;

#[async_trait]
impl EmailProvider for ConsoleEmailProvider {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError> {
        tracing::info!(
            "📧 [{}] Para: {} | Assunto: {} | Corpo: {}",
            message.template,
            message.to,
            message.subject,
            message.body
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct EmailService {
    provider: Arc<dyn EmailProvider>,
    portal_base_url: String,
    revocation_cap_recipient: Option<String>,
}

impl EmailService {
    pub fn new(
        provider: Arc<dyn EmailProvider>,
        portal_base_url: String,
        revocation_cap_recipient: Option<String>,
    ) -> Self {
        Self {
            provider,
            portal_base_url,
            revocation_cap_recipient,
        }
    }

    /// Envia um e-mail de ativação por destinatário. Retorna quantos foram enviados.
    ///
    /// Uma falha de entrega não interrompe os demais envios; ao final, devolve
    /// `EmailDeliveryError` listando quem não recebeu.
    pub async fn send_activation_emails(
        &self,
        text: &EmailTemplateText,
        recipients: &[License],
        plan: &SubscriptionPlan,
        agreement: &CustomerAgreement,
    ) -> Result<usize, AppError> {
        self.send_license_emails(
            text,
            recipients,
            plan,
            agreement,
            LICENSE_ACTIVATION_EMAIL_TEMPLATE,
            LICENSE_ACTIVATION_EMAIL_SUBJECT,
        )
        .await
    }

    /// Envia um lembrete por destinatário. Retorna quantos foram enviados.
    pub async fn send_reminder_emails(
        &self,
        text: &EmailTemplateText,
        recipients: &[License],
        plan: &SubscriptionPlan,
        agreement: &CustomerAgreement,
    ) -> Result<usize, AppError> {
        self.send_license_emails(
            text,
            recipients,
            plan,
            agreement,
            LICENSE_REMINDER_EMAIL_TEMPLATE,
            LICENSE_REMINDER_EMAIL_SUBJECT,
        )
        .await
    }

    async fn send_license_emails(
        &self,
        text: &EmailTemplateText,
        recipients: &[License],
        plan: &SubscriptionPlan,
        agreement: &CustomerAgreement,
        template: &'static str,
        subject: &str,
    ) -> Result<usize, AppError> {
        let mut sent = 0;
        let mut failed: Vec<String> = Vec::new();

        for license in recipients {
            let Some(to) = license.user_email.as_deref() else {
                tracing::warn!("⚠️ {} não tem e-mail; nada a enviar", license);
                continue;
            };
            let link = license
                .activation_link(&self.portal_base_url, &agreement.enterprise_customer_slug)
                .unwrap_or_default();

            let message = EmailMessage {
                to: to.to_string(),
                subject: subject.to_string(),
                body: license_email_body(template, text, &plan.title, link),
                template,
            };
            match self.provider.send(&message).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!("⚠️ Falha ao enviar '{}' para {}: {}", template, to, e);
                    failed.push(to.to_string());
                }
            }
        }

        if !failed.is_empty() {
            return Err(AppError::EmailDeliveryError(format!(
                "'{}' não entregue para {} de {} destinatário(s): {}",
                template,
                failed.len(),
                recipients.len(),
                failed.join(", ")
            )));
        }

        tracing::info!(
            "✅ {} e-mail(s) '{}' enviados para o plano {}",
            sent,
            template,
            plan.uuid
        );
        Ok(sent)
    }

    /// Avisa a equipe responsável que o plano esgotou as revogações.
    /// Sem destinatário configurado, apenas registra no log.
    pub async fn send_revocation_cap_notification(
        &self,
        plan: &SubscriptionPlan,
        agreement: &CustomerAgreement,
        num_revocations_applied: i32,
    ) -> Result<bool, AppError> {
        let Some(to) = self.revocation_cap_recipient.as_deref() else {
            tracing::warn!(
                "⚠️ Limite de revogações atingido no plano {}, mas nenhum destinatário foi configurado",
                plan.uuid
            );
            return Ok(false);
        };

        let message = EmailMessage {
            to: to.to_string(),
            subject: REVOCATION_CAP_NOTIFICATION_EMAIL_SUBJECT
                .replace("{}", &agreement.enterprise_customer_slug),
            body: format!(
                "Enterprise customer '{}' has reached the revocation cap of subscription plan '{}' ({}) after {} revocation(s).",
                agreement.enterprise_customer_slug, plan.title, plan.uuid, num_revocations_applied
            ),
            template: REVOCATION_CAP_NOTIFICATION_EMAIL_TEMPLATE,
        };
        self.provider
            .send(&message)
            .await
            .map_err(|e| AppError::EmailDeliveryError(format!("'{}' para {}: {}", message.template, to, e)))?;
        Ok(true)
    }
}

fn license_email_body(
    template: &'static str,
    text: &EmailTemplateText,
    plan_title: &str,
    activation_link: &str,
) -> String {
    let content = if template == LICENSE_REMINDER_EMAIL_TEMPLATE {
        format!(
            "Reminder: your license for the edX subscription '{plan_title}' is still waiting for you. \
             Activate it here: {activation_link}"
        )
    } else {
        format!(
            "Your organization has invited you to the edX subscription '{plan_title}'. \
             Activate your license here: {activation_link}"
        )
    };

    [text.greeting.trim(), content.as_str(), text.closing.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Provedor que guarda as mensagens em memória, para os testes.
/// Com `failing()`, toda entrega falha (e nada é guardado).
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemoryEmailProvider {
    sent: Arc<std::sync::Mutex<Vec<EmailMessage>>>,
    fail: bool,
}

#[cfg(test)]
impl MemoryEmailProvider {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl EmailProvider for MemoryEmailProvider {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::EmailDeliveryError("servidor SMTP indisponível".into()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn plan(agreement: &CustomerAgreement) -> SubscriptionPlan {
        SubscriptionPlan {
            uuid: Uuid::new_v4(),
            title: "Plano Anual".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            expiration_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            expiration_processed: false,
            enterprise_catalog_uuid: Uuid::new_v4(),
            customer_agreement_uuid: agreement.uuid,
            is_active: true,
            revoke_max_percentage: 5,
            num_revocations_applied: 0,
            salesforce_opportunity_id: "000000000000ABCABC".into(),
            netsuite_product_id: 1,
            for_internal_use_only: false,
            created: Utc::now(),
            modified: Utc::now(),
        }
    }

    fn recipients(plan: &SubscriptionPlan, count: usize) -> Vec<License> {
        (0..count)
            .map(|i| {
                let mut license = License::new_unassigned(plan.uuid, Utc::now());
                license
                    .assign(&format!("learner{i}@example.com"), None, Utc::now())
                    .unwrap();
                license
            })
            .collect()
    }

    fn service(provider: &MemoryEmailProvider, cap_recipient: Option<&str>) -> EmailService {
        EmailService::new(
            Arc::new(provider.clone()),
            "https://portal.example.com".into(),
            cap_recipient.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn activation_emails_go_one_per_recipient() {
        let provider = MemoryEmailProvider::default();
        let agreement = CustomerAgreement::new(Uuid::new_v4(), "acme".into(), None, Utc::now());
        let plan = plan(&agreement);
        let licenses = recipients(&plan, 3);
        let text = EmailTemplateText {
            greeting: "Olá!".into(),
            closing: "Abraços".into(),
        };

        let sent = service(&provider, None)
            .send_activation_emails(&text, &licenses, &plan, &agreement)
            .await
            .unwrap();

        assert_eq!(sent, 3);
        let messages = provider.sent();
        assert_eq!(messages.len(), 3);
        for (message, license) in messages.iter().zip(&licenses) {
            assert_eq!(message.subject, LICENSE_ACTIVATION_EMAIL_SUBJECT);
            assert!(!message.body.contains("Reminder"));
            assert_eq!(Some(message.to.as_str()), license.user_email.as_deref());
            let key = license.activation_key.unwrap();
            assert!(message
                .body
                .contains(&format!("https://portal.example.com/acme/licenses/{key}/activate")));
            assert!(message.body.starts_with("Olá!"));
        }
    }

    #[tokio::test]
    async fn reminder_emails_mention_reminder() {
        let provider = MemoryEmailProvider::default();
        let agreement = CustomerAgreement::new(Uuid::new_v4(), "acme".into(), None, Utc::now());
        let plan = plan(&agreement);
        let licenses = recipients(&plan, 2);

        service(&provider, None)
            .send_reminder_emails(&EmailTemplateText::default(), &licenses, &plan, &agreement)
            .await
            .unwrap();

        let messages = provider.sent();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.body.contains("Reminder")));
        assert!(messages.iter().all(|m| m.subject == LICENSE_REMINDER_EMAIL_SUBJECT));
    }

    #[tokio::test]
    async fn revocation_cap_notification_needs_a_recipient() {
        let provider = MemoryEmailProvider::default();
        let agreement = CustomerAgreement::new(Uuid::new_v4(), "acme".into(), None, Utc::now());
        let plan = plan(&agreement);

        let skipped = service(&provider, None)
            .send_revocation_cap_notification(&plan, &agreement, 1)
            .await
            .unwrap();
        assert!(!skipped);
        assert!(provider.sent().is_empty());

        let delivered = service(&provider, Some("support@example.com"))
            .send_revocation_cap_notification(&plan, &agreement, 1)
            .await
            .unwrap();
        assert!(delivered);
        let messages = provider.sent();
        assert_eq!(messages[0].subject, "REVOCATION CAP REACHED: acme");
        assert_eq!(messages[0].to, "support@example.com");
    }

    #[tokio::test]
    async fn delivery_failure_is_reported_after_trying_everyone() {
        let provider = MemoryEmailProvider::failing();
        let agreement = CustomerAgreement::new(Uuid::new_v4(), "acme".into(), None, Utc::now());
        let plan = plan(&agreement);
        let licenses = recipients(&plan, 2);

        let result = service(&provider, None)
            .send_activation_emails(&EmailTemplateText::default(), &licenses, &plan, &agreement)
            .await;

        match result {
            Err(AppError::EmailDeliveryError(detail)) => {
                assert!(detail.contains("learner0@example.com"));
                assert!(detail.contains("learner1@example.com"));
            }
            other => panic!("esperava EmailDeliveryError, veio {other:?}"),
        }
    }
}
