// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Customer Agreements ---
        handlers::agreements::create_agreement,
        handlers::agreements::get_agreement,

        // --- Subscriptions ---
        handlers::subscriptions::create_plan,
        handlers::subscriptions::get_plan,
        handlers::subscriptions::increase_licenses,
        handlers::subscriptions::contains_content,
        handlers::subscriptions::plan_history,

        // --- Renewals ---
        handlers::renewals::list_future_renewals,
        handlers::renewals::create_renewal,
        handlers::renewals::process_renewal,

        // --- Licenses ---
        handlers::licenses::assign_licenses,
        handlers::licenses::remind,
        handlers::licenses::revoke,
        handlers::licenses::reset_license,
        handlers::licenses::retire_license,
        handlers::licenses::license_history,

        // --- Learner ---
        handlers::licenses::activate_license,
        handlers::licenses::learner_licenses,
    ),
    components(
        schemas(
            // --- Customer Agreements ---
            models::agreement::CustomerAgreement,
            models::agreement::CreateCustomerAgreementPayload,
            models::agreement::PlanExpiration,
            models::agreement::CustomerAgreementDetail,

            // --- Subscriptions ---
            models::subscription::SubscriptionPlan,
            models::subscription::SubscriptionPlanSummary,
            models::subscription::CreateSubscriptionPlanPayload,
            models::subscription::IncreaseLicensesPayload,
            models::subscription::ContainsContentResponse,

            // --- Renewals ---
            models::subscription::SubscriptionPlanRenewal,
            models::subscription::CreateRenewalPayload,
            models::subscription::ProcessedRenewal,

            // --- Licenses ---
            models::license::LicenseStatus,
            models::license::License,
            models::license::LicenseAssignee,
            models::license::AssignLicensesPayload,
            models::license::RemindLicensesPayload,
            models::license::RevokeLicensePayload,
            models::license::ActivateLicensePayload,
            models::license::RevocationOutcome,

            // --- History ---
            models::history::ChangeType,
        )
    ),
    tags(
        (name = "Customer Agreements", description = "Contratos dos clientes corporativos"),
        (name = "Subscriptions", description = "Planos de assinatura e números derivados"),
        (name = "Renewals", description = "Renovações e cadeia de expiração"),
        (name = "Licenses", description = "Ciclo de vida das licenças (administração)"),
        (name = "Learner", description = "Ativação e consulta das licenças do aluno")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
