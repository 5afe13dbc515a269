// src/models/email.rs

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Assuntos dos e-mails
pub const LICENSE_ACTIVATION_EMAIL_SUBJECT: &str = "Start your edX Subscription";
pub const LICENSE_REMINDER_EMAIL_SUBJECT: &str = "Your edX License is pending";
pub const REVOCATION_CAP_NOTIFICATION_EMAIL_SUBJECT: &str = "REVOCATION CAP REACHED: {}";

// Nomes dos templates
pub const LICENSE_ACTIVATION_EMAIL_TEMPLATE: &str = "activation";
pub const LICENSE_REMINDER_EMAIL_TEMPLATE: &str = "reminder";
pub const REVOCATION_CAP_NOTIFICATION_EMAIL_TEMPLATE: &str = "revocation_cap";

/// Texto personalizado pelo administrador (saudação e despedida).
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplateText {
    pub greeting: String,
    pub closing: String,
}

/// Uma mensagem pronta para envio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub template: &'static str,
}
