// src/common/utils.rs

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Momento atual em UTC (todas as datas de licença são gravadas em UTC).
pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Data de "hoje" usada nos cálculos de expiração.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Número de dias entre `today` e `end_date` (negativo se já passou).
pub fn days_until(end_date: NaiveDate, today: NaiveDate) -> i64 {
    (end_date - today).num_days()
}

/// Link do portal do aluno para um cliente. Sem barra no final.
pub fn learner_portal_url(portal_base_url: &str, enterprise_slug: &str) -> String {
    format!("{}/{}", portal_base_url.trim_end_matches('/'), enterprise_slug)
}

/// Link de ativação exibido no e-mail enviado ao aluno.
pub fn license_activation_link(
    portal_base_url: &str,
    enterprise_slug: &str,
    activation_key: Uuid,
) -> String {
    format!(
        "{}/licenses/{}/activate",
        learner_portal_url(portal_base_url, enterprise_slug),
        activation_key
    )
}
