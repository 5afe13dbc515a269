// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    // Violação de unicidade (título+contrato, plano+e-mail, slug, ...)
    #[error("Violação de unicidade: {0}")]
    UniqueConstraintViolation(String),

    #[error("Chave de ativação inválida")]
    InvalidActivationKey,

    #[error("Limite de revogações atingido para o plano {plan_uuid} ({allowed} permitidas)")]
    RevocationLimitExceeded { plan_uuid: Uuid, allowed: i64 },

    #[error("Transição de licença inválida: {from} -> {to}")]
    InvalidLicenseTransition { from: String, to: String },

    #[error("Licenças não atribuídas insuficientes: {requested} pedidas, {available} disponíveis")]
    NotEnoughUnassignedLicenses { requested: usize, available: usize },

    #[error("Nenhum catálogo definido para o plano nem para o contrato")]
    MissingCatalog,

    #[error("Renovação {0} já foi processada")]
    RenewalAlreadyProcessed(Uuid),

    #[error("A renovação prevê {renewed} licenças, mas {allocated} já estão alocadas")]
    RenewalLicenseShortfall { renewed: i32, allocated: usize },

    #[error("Renovação inválida: {0}")]
    InvalidRenewal(String),

    #[error("Contrato não encontrado")]
    CustomerAgreementNotFound,

    #[error("Plano de assinatura não encontrado")]
    SubscriptionPlanNotFound,

    #[error("Renovação não encontrada")]
    RenewalNotFound,

    #[error("Licença não encontrada")]
    LicenseNotFound,

    #[error("Token inválido")]
    InvalidToken,

    #[error("Acesso negado")]
    Forbidden,

    // Falhas do serviço de catálogo são propagadas sem retry
    #[error("Erro no serviço de catálogo: {0}")]
    CatalogServiceError(String),

    #[error("Erro no cliente HTTP: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("Falha no envio de e-mail: {0}")]
    EmailDeliveryError(String),

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    /// Converte erros do sqlx, transformando violações de unicidade no nosso tipo.
    pub fn from_db(e: sqlx::Error, conflict_message: &str) -> Self {
        if let Some(db_err) = e.as_database_error() {
            if db_err.is_unique_violation() {
                return AppError::UniqueConstraintViolation(conflict_message.to_string());
            }
        }
        AppError::DatabaseError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            // Retorna todos os detalhes da validação.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors.iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            ref e @ AppError::UniqueConstraintViolation(_) => (StatusCode::CONFLICT, e.to_string()),
            ref e @ (AppError::InvalidActivationKey
            | AppError::RevocationLimitExceeded { .. }
            | AppError::InvalidLicenseTransition { .. }
            | AppError::NotEnoughUnassignedLicenses { .. }
            | AppError::RenewalAlreadyProcessed(_)
            | AppError::RenewalLicenseShortfall { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            ref e @ (AppError::MissingCatalog | AppError::InvalidRenewal(_)) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            ref e @ (AppError::CustomerAgreementNotFound
            | AppError::SubscriptionPlanNotFound
            | AppError::RenewalNotFound
            | AppError::LicenseNotFound) => (StatusCode::NOT_FOUND, e.to_string()),
            AppError::InvalidToken | AppError::JwtError(_) => (
                StatusCode::UNAUTHORIZED,
                "Token de autenticação inválido ou ausente.".to_string(),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "Você não tem permissão para realizar esta ação.".to_string(),
            ),
            ref e @ (AppError::CatalogServiceError(_) | AppError::HttpClientError(_)) => {
                tracing::error!("Falha no serviço de catálogo: {}", e);
                (StatusCode::BAD_GATEWAY, e.to_string())
            }

            // Todos os outros erros (DatabaseError, InternalServerError, e-mail) viram 500.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Ocorreu um erro inesperado.".to_string())
            }
        };

        // Resposta padrão para erros simples que só têm uma mensagem.
        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rule_errors_are_unprocessable() {
        let response = AppError::InvalidActivationKey.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = AppError::RevocationLimitExceeded {
            plan_uuid: Uuid::new_v4(),
            allowed: 1,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn uniqueness_violation_maps_to_conflict() {
        let response = AppError::UniqueConstraintViolation("slug".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn missing_records_map_to_not_found() {
        assert_eq!(
            AppError::LicenseNotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::SubscriptionPlanNotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
