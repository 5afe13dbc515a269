// src/handlers/subscriptions.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    common::{error::AppError, utils::today},
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::{
        history::HistoryRecord,
        rbac::Permission,
        subscription::{
            ContainsContentQuery, ContainsContentResponse, CreateSubscriptionPlanPayload,
            IncreaseLicensesPayload, SubscriptionPlan, SubscriptionPlanSummary,
        },
    },
};

// "a, b,,c" -> ["a", "b", "c"]
fn parse_content_ids(raw: &str) -> Result<Vec<String>, AppError> {
    let ids: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    if ids.is_empty() {
        let mut errors = ValidationErrors::new();
        errors.add(
            "content_ids",
            ValidationError::new("required").with_message("Informe pelo menos um conteúdo.".into()),
        );
        return Err(AppError::ValidationError(errors));
    }
    Ok(ids)
}

// POST /api/customer-agreements/{uuid}/subscriptions
#[utoipa::path(
    post,
    path = "/api/customer-agreements/{uuid}/subscriptions",
    tag = "Subscriptions",
    request_body = CreateSubscriptionPlanPayload,
    params(
        ("uuid" = Uuid, Path, description = "UUID do contrato")
    ),
    responses(
        (status = 201, description = "Plano criado", body = SubscriptionPlanSummary),
        (status = 400, description = "Dados inválidos ou nenhum catálogo disponível"),
        (status = 404, description = "Contrato não encontrado"),
        (status = 409, description = "Título já usado neste contrato")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_plan(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(agreement_uuid): Path<Uuid>,
    Json(payload): Json<CreateSubscriptionPlanPayload>,
) -> Result<impl IntoResponse, AppError> {
    let agreement = app_state.agreement_service.get_agreement(agreement_uuid).await?;
    user.require(Permission::AdminAccess, Some(agreement.enterprise_customer_uuid))?;

    let plan = app_state
        .subscription_service
        .create_plan(agreement.uuid, payload)
        .await?;
    let summary = app_state.subscription_service.summary(plan, today()).await?;

    Ok((StatusCode::CREATED, Json(summary)))
}

// GET /api/subscriptions/{uuid}
#[utoipa::path(
    get,
    path = "/api/subscriptions/{uuid}",
    tag = "Subscriptions",
    params(
        ("uuid" = Uuid, Path, description = "UUID do plano")
    ),
    responses(
        (status = 200, description = "Plano com os números derivados", body = SubscriptionPlanSummary),
        (status = 404, description = "Plano não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_plan(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(uuid): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (plan, agreement) = app_state.subscription_service.get_plan_with_agreement(uuid).await?;
    user.require(
        Permission::LearnerOrAdminAccess,
        Some(agreement.enterprise_customer_uuid),
    )?;

    let summary = app_state.subscription_service.summary(plan, today()).await?;
    Ok(Json(summary))
}

// POST /api/subscriptions/{uuid}/licenses
#[utoipa::path(
    post,
    path = "/api/subscriptions/{uuid}/licenses",
    tag = "Subscriptions",
    request_body = IncreaseLicensesPayload,
    params(
        ("uuid" = Uuid, Path, description = "UUID do plano")
    ),
    responses(
        (status = 200, description = "Licenças adicionadas", body = SubscriptionPlanSummary),
        (status = 400, description = "Quantidade inválida"),
        (status = 404, description = "Plano não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn increase_licenses(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(uuid): Path<Uuid>,
    Json(payload): Json<IncreaseLicensesPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let (plan, agreement) = app_state.subscription_service.get_plan_with_agreement(uuid).await?;
    user.require(Permission::AdminAccess, Some(agreement.enterprise_customer_uuid))?;

    app_state
        .subscription_service
        .increase_num_licenses(plan.uuid, payload.num_licenses)
        .await?;

    let summary = app_state.subscription_service.summary(plan, today()).await?;
    Ok(Json(summary))
}

// GET /api/subscriptions/{uuid}/contains-content?content_ids=a,b
#[utoipa::path(
    get,
    path = "/api/subscriptions/{uuid}/contains-content",
    tag = "Subscriptions",
    params(
        ("uuid" = Uuid, Path, description = "UUID do plano"),
        ("content_ids" = String, Query, description = "Conteúdos separados por vírgula")
    ),
    responses(
        (status = 200, description = "Resposta do serviço de catálogo", body = ContainsContentResponse),
        (status = 400, description = "Nenhum conteúdo informado"),
        (status = 502, description = "Falha no serviço de catálogo")
    ),
    security(("api_jwt" = []))
)]
pub async fn contains_content(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(uuid): Path<Uuid>,
    Query(query): Query<ContainsContentQuery>,
) -> Result<impl IntoResponse, AppError> {
    let content_ids = parse_content_ids(&query.content_ids)?;

    let (plan, agreement) = app_state.subscription_service.get_plan_with_agreement(uuid).await?;
    user.require(
        Permission::LearnerOrAdminAccess,
        Some(agreement.enterprise_customer_uuid),
    )?;

    let contains_content_items = app_state
        .subscription_service
        .contains_content(&plan, &content_ids)
        .await?;

    Ok(Json(ContainsContentResponse { contains_content_items }))
}

// GET /api/subscriptions/{uuid}/history
#[utoipa::path(
    get,
    path = "/api/subscriptions/{uuid}/history",
    tag = "Subscriptions",
    params(
        ("uuid" = Uuid, Path, description = "UUID do plano")
    ),
    responses(
        (status = 200, description = "Trilha de auditoria do plano", body = [HistoryRecord<SubscriptionPlan>]),
        (status = 404, description = "Plano não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn plan_history(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(uuid): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (plan, agreement) = app_state.subscription_service.get_plan_with_agreement(uuid).await?;
    user.require(Permission::AdminAccess, Some(agreement.enterprise_customer_uuid))?;

    let history = app_state.subscription_service.plan_history(plan.uuid).await?;
    Ok(Json(history))
}
