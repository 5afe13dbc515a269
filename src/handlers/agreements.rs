// src/handlers/agreements.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    common::{error::AppError, utils::today},
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::{
        agreement::{CreateCustomerAgreementPayload, CustomerAgreement, CustomerAgreementDetail},
        rbac::Permission,
    },
};

// POST /api/customer-agreements
#[utoipa::path(
    post,
    path = "/api/customer-agreements",
    tag = "Customer Agreements",
    request_body = CreateCustomerAgreementPayload,
    responses(
        (status = 201, description = "Contrato criado", body = CustomerAgreement),
        (status = 400, description = "Dados inválidos"),
        (status = 403, description = "Sem acesso de administrador"),
        (status = 409, description = "Cliente ou slug já possui contrato")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_agreement(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCustomerAgreementPayload>,
) -> Result<impl IntoResponse, AppError> {
    user.require(Permission::AdminAccess, Some(payload.enterprise_customer_uuid))?;

    let agreement = app_state.agreement_service.create_agreement(payload).await?;

    Ok((StatusCode::CREATED, Json(agreement)))
}

// GET /api/customer-agreements/{uuid}
#[utoipa::path(
    get,
    path = "/api/customer-agreements/{uuid}",
    tag = "Customer Agreements",
    params(
        ("uuid" = Uuid, Path, description = "UUID do contrato")
    ),
    responses(
        (status = 200, description = "Contrato e expirações ordenadas dos planos", body = CustomerAgreementDetail),
        (status = 404, description = "Contrato não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_agreement(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(uuid): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let agreement = app_state.agreement_service.get_agreement(uuid).await?;
    user.require(
        Permission::LearnerOrAdminAccess,
        Some(agreement.enterprise_customer_uuid),
    )?;

    let ordered_subscription_plan_expirations = app_state
        .agreement_service
        .ordered_subscription_plan_expirations(&agreement, today())
        .await?;

    Ok(Json(CustomerAgreementDetail {
        agreement,
        ordered_subscription_plan_expirations,
    }))
}
