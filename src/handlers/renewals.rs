// src/handlers/renewals.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::{
        rbac::Permission,
        subscription::{CreateRenewalPayload, ProcessedRenewal, SubscriptionPlanRenewal},
    },
};

// GET /api/subscriptions/{uuid}/renewals
#[utoipa::path(
    get,
    path = "/api/subscriptions/{uuid}/renewals",
    tag = "Renewals",
    params(
        ("uuid" = Uuid, Path, description = "UUID do plano")
    ),
    responses(
        (status = 200, description = "Renovações futuras, na ordem da cadeia", body = [SubscriptionPlanRenewal]),
        (status = 404, description = "Plano não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_future_renewals(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(uuid): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (plan, agreement) = app_state.subscription_service.get_plan_with_agreement(uuid).await?;
    user.require(Permission::AdminAccess, Some(agreement.enterprise_customer_uuid))?;

    let renewals = app_state.subscription_service.future_renewals(&plan).await?;
    Ok(Json(renewals))
}

// POST /api/subscriptions/{uuid}/renewals
#[utoipa::path(
    post,
    path = "/api/subscriptions/{uuid}/renewals",
    tag = "Renewals",
    request_body = CreateRenewalPayload,
    params(
        ("uuid" = Uuid, Path, description = "UUID do plano anterior")
    ),
    responses(
        (status = 201, description = "Renovação criada", body = SubscriptionPlanRenewal),
        (status = 400, description = "Datas ou planos inválidos"),
        (status = 409, description = "O plano já possui renovação")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_renewal(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(uuid): Path<Uuid>,
    Json(payload): Json<CreateRenewalPayload>,
) -> Result<impl IntoResponse, AppError> {
    let (plan, agreement) = app_state.subscription_service.get_plan_with_agreement(uuid).await?;
    user.require(Permission::AdminAccess, Some(agreement.enterprise_customer_uuid))?;

    let renewal = app_state
        .subscription_service
        .create_renewal(plan.uuid, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(renewal)))
}

// POST /api/renewals/{uuid}/process
#[utoipa::path(
    post,
    path = "/api/renewals/{uuid}/process",
    tag = "Renewals",
    params(
        ("uuid" = Uuid, Path, description = "UUID da renovação")
    ),
    responses(
        (status = 200, description = "Renovação processada", body = ProcessedRenewal),
        (status = 404, description = "Renovação não encontrada"),
        (status = 422, description = "Já processada ou licenças alocadas não cabem")
    ),
    security(("api_jwt" = []))
)]
pub async fn process_renewal(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(uuid): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let renewal = app_state.subscription_service.get_renewal(uuid).await?;
    let (_, agreement) = app_state
        .subscription_service
        .get_plan_with_agreement(renewal.prior_subscription_plan_uuid)
        .await?;
    user.require(Permission::AdminAccess, Some(agreement.enterprise_customer_uuid))?;

    let (renewal, renewed_subscription_plan) =
        app_state.subscription_service.process_renewal(renewal.uuid).await?;

    Ok(Json(ProcessedRenewal {
        renewal,
        renewed_subscription_plan,
    }))
}
