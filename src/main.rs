//src/main.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;

// Declaração dos nossos módulos
mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod services;

// Importações principais
use crate::config::{AppState, Settings};
use crate::docs::ApiDoc;
use crate::middleware::auth::auth_guard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Inicializa o logger (RUST_LOG, padrão "info")
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    // Se a configuração falhar, a aplicação não deve iniciar.
    let settings = Settings::from_env()?;
    let app_state = AppState::new(&settings).await?;

    // Faz o app rodar as migrações do SQLx na inicialização (só com Postgres)
    if let Some(pool) = &app_state.db_pool {
        sqlx::migrate!().run(pool).await?;
        tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");
    }

    let app = build_router(app_state);

    // Inicia o servidor
    let listener = TcpListener::bind(&settings.bind_address).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(app_state: AppState) -> Router {
    // Rotas administrativas de contratos e planos
    let agreement_routes = Router::new()
        .route("/", post(handlers::agreements::create_agreement))
        .route("/{uuid}", get(handlers::agreements::get_agreement))
        .route("/{uuid}/subscriptions", post(handlers::subscriptions::create_plan));

    let subscription_routes = Router::new()
        .route("/{uuid}", get(handlers::subscriptions::get_plan))
        .route("/{uuid}/licenses", post(handlers::subscriptions::increase_licenses))
        .route("/{uuid}/contains-content", get(handlers::subscriptions::contains_content))
        .route("/{uuid}/history", get(handlers::subscriptions::plan_history))
        .route(
            "/{uuid}/renewals",
            get(handlers::renewals::list_future_renewals).post(handlers::renewals::create_renewal),
        )
        .route("/{uuid}/assign", post(handlers::licenses::assign_licenses))
        .route("/{uuid}/remind", post(handlers::licenses::remind))
        .route("/{uuid}/revoke", post(handlers::licenses::revoke));

    let renewal_routes = Router::new()
        .route("/{uuid}/process", post(handlers::renewals::process_renewal));

    let license_routes = Router::new()
        .route("/activate", post(handlers::licenses::activate_license))
        .route("/{uuid}/reset", post(handlers::licenses::reset_license))
        .route("/{uuid}/retire", post(handlers::licenses::retire_license))
        .route("/{uuid}/history", get(handlers::licenses::license_history));

    // Tudo abaixo exige Bearer token
    let protected_routes = Router::new()
        .nest("/customer-agreements", agreement_routes)
        .nest("/subscriptions", subscription_routes)
        .nest("/renewals", renewal_routes)
        .nest("/licenses", license_routes)
        .route("/learner-licenses", get(handlers::licenses::learner_licenses))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Combina tudo no router principal
    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api", protected_routes)
        .with_state(app_state)
}
