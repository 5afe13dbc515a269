// src/handlers/licenses.rs

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::{
        history::HistoryRecord,
        license::{
            ActivateLicensePayload, AssignLicensesPayload, License, RemindLicensesPayload,
            RevocationOutcome, RevokeLicensePayload,
        },
        rbac::Permission,
    },
};

// =============================================================================
//  ÁREA 1: ADMINISTRAÇÃO (por plano)
// =============================================================================

// POST /api/subscriptions/{uuid}/assign
#[utoipa::path(
    post,
    path = "/api/subscriptions/{uuid}/assign",
    tag = "Licenses",
    request_body = AssignLicensesPayload,
    params(
        ("uuid" = Uuid, Path, description = "UUID do plano")
    ),
    responses(
        (status = 200, description = "Licenças atribuídas (e-mails de ativação enviados)", body = [License]),
        (status = 400, description = "Dados inválidos"),
        (status = 409, description = "Aluno já possui licença neste plano"),
        (status = 422, description = "Licenças disponíveis insuficientes")
    ),
    security(("api_jwt" = []))
)]
pub async fn assign_licenses(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(uuid): Path<Uuid>,
    Json(payload): Json<AssignLicensesPayload>,
) -> Result<impl IntoResponse, AppError> {
    let (plan, agreement) = app_state.subscription_service.get_plan_with_agreement(uuid).await?;
    user.require(Permission::AdminAccess, Some(agreement.enterprise_customer_uuid))?;

    let licenses = app_state
        .license_service
        .assign_licenses(plan.uuid, payload)
        .await?;
    Ok(Json(licenses))
}

// POST /api/subscriptions/{uuid}/remind
#[utoipa::path(
    post,
    path = "/api/subscriptions/{uuid}/remind",
    tag = "Licenses",
    request_body = RemindLicensesPayload,
    params(
        ("uuid" = Uuid, Path, description = "UUID do plano")
    ),
    responses(
        (status = 200, description = "Licenças lembradas", body = [License]),
        (status = 404, description = "Plano não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn remind(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(uuid): Path<Uuid>,
    Json(payload): Json<RemindLicensesPayload>,
) -> Result<impl IntoResponse, AppError> {
    let (plan, agreement) = app_state.subscription_service.get_plan_with_agreement(uuid).await?;
    user.require(Permission::AdminAccess, Some(agreement.enterprise_customer_uuid))?;

    let licenses = app_state.license_service.remind(plan.uuid, payload).await?;
    Ok(Json(licenses))
}

// POST /api/subscriptions/{uuid}/revoke
#[utoipa::path(
    post,
    path = "/api/subscriptions/{uuid}/revoke",
    tag = "Licenses",
    request_body = RevokeLicensePayload,
    params(
        ("uuid" = Uuid, Path, description = "UUID do plano")
    ),
    responses(
        (status = 200, description = "Licença revogada", body = RevocationOutcome),
        (status = 404, description = "Licença não encontrada"),
        (status = 422, description = "Limite de revogações atingido")
    ),
    security(("api_jwt" = []))
)]
pub async fn revoke(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(uuid): Path<Uuid>,
    Json(payload): Json<RevokeLicensePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let (plan, agreement) = app_state.subscription_service.get_plan_with_agreement(uuid).await?;
    user.require(Permission::AdminAccess, Some(agreement.enterprise_customer_uuid))?;

    let outcome = app_state
        .license_service
        .revoke(plan.uuid, &payload.user_email)
        .await?;
    Ok(Json(outcome))
}

// =============================================================================
//  ÁREA 2: ADMINISTRAÇÃO (por licença)
// =============================================================================

// POST /api/licenses/{uuid}/reset
#[utoipa::path(
    post,
    path = "/api/licenses/{uuid}/reset",
    tag = "Licenses",
    params(
        ("uuid" = Uuid, Path, description = "UUID da licença")
    ),
    responses(
        (status = 200, description = "Licença devolvida ao estado unassigned", body = License),
        (status = 404, description = "Licença não encontrada"),
        (status = 422, description = "Licença revogada não pode ser reiniciada")
    ),
    security(("api_jwt" = []))
)]
pub async fn reset_license(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(uuid): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (license, _, agreement) = app_state.license_service.get_license_with_owner(uuid).await?;
    user.require(Permission::AdminAccess, Some(agreement.enterprise_customer_uuid))?;

    let license = app_state.license_service.reset(license.uuid).await?;
    Ok(Json(license))
}

// POST /api/licenses/{uuid}/retire
#[utoipa::path(
    post,
    path = "/api/licenses/{uuid}/retire",
    tag = "Licenses",
    params(
        ("uuid" = Uuid, Path, description = "UUID da licença")
    ),
    responses(
        (status = 200, description = "Dados pessoais removidos da licença e do histórico", body = License),
        (status = 404, description = "Licença não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn retire_license(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(uuid): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (license, _, agreement) = app_state.license_service.get_license_with_owner(uuid).await?;
    user.require(Permission::AdminAccess, Some(agreement.enterprise_customer_uuid))?;

    let license = app_state.license_service.retire(license.uuid).await?;
    Ok(Json(license))
}

// GET /api/licenses/{uuid}/history
#[utoipa::path(
    get,
    path = "/api/licenses/{uuid}/history",
    tag = "Licenses",
    params(
        ("uuid" = Uuid, Path, description = "UUID da licença")
    ),
    responses(
        (status = 200, description = "Trilha de auditoria da licença", body = [HistoryRecord<License>]),
        (status = 404, description = "Licença não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn license_history(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(uuid): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (license, _, agreement) = app_state.license_service.get_license_with_owner(uuid).await?;
    user.require(Permission::AdminAccess, Some(agreement.enterprise_customer_uuid))?;

    let history = app_state.license_service.license_history(license.uuid).await?;
    Ok(Json(history))
}

// =============================================================================
//  ÁREA 3: ALUNO
// =============================================================================

// POST /api/licenses/activate
#[utoipa::path(
    post,
    path = "/api/licenses/activate",
    tag = "Learner",
    request_body = ActivateLicensePayload,
    responses(
        (status = 200, description = "Licença ativada", body = License),
        (status = 403, description = "A licença não pertence ao usuário"),
        (status = 422, description = "Chave de ativação inválida")
    ),
    security(("api_jwt" = []))
)]
pub async fn activate_license(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(payload): Json<ActivateLicensePayload>,
) -> Result<impl IntoResponse, AppError> {
    let license = app_state
        .license_service
        .activate(&user, payload.activation_key)
        .await?;
    Ok(Json(license))
}

// GET /api/learner-licenses
#[utoipa::path(
    get,
    path = "/api/learner-licenses",
    tag = "Learner",
    responses(
        (status = 200, description = "Licenças do usuário autenticado", body = [License])
    ),
    security(("api_jwt" = []))
)]
pub async fn learner_licenses(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let licenses = app_state.license_service.learner_licenses(&user).await?;
    Ok(Json(licenses))
}
