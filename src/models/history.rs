// src/models/history.rs

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// Tipo da mudança registrada na trilha de auditoria
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "history_change_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Changed,
    Deleted,
}

/// Uma entrada (somente inserção) da trilha de auditoria de uma entidade.
/// Guarda o registro completo como estava no momento da mudança.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord<T> {
    pub history_id: i64,
    pub record_uuid: Uuid,
    pub history_date: DateTime<Utc>,
    pub history_type: ChangeType,
    pub record: T,
}

/// Entidades que possuem tabela de histórico.
pub trait Audited: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    const HISTORY_TABLE: &'static str;

    fn record_uuid(&self) -> Uuid;
}
