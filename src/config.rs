// src/config.rs

use std::{env, sync::Arc, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::{MemorySubscriptionStore, PgSubscriptionStore, SubscriptionStore, LICENSE_BULK_OPERATION_BATCH_SIZE},
    services::{
        agreement_service::AgreementService,
        auth::AuthService,
        catalog_client::{CatalogClient, EnterpriseCatalogApiClient},
        email_service::{ConsoleEmailProvider, EmailProvider, EmailService},
        license_service::LicenseService,
        subscription_service::SubscriptionService,
    },
};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
const DEFAULT_LEARNER_PORTAL_BASE_URL: &str = "http://localhost:8734";
const DEFAULT_ENTERPRISE_CATALOG_URL: &str = "http://localhost:18160";
const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);

// Configuração lida do ambiente (.env incluso)
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub learner_portal_base_url: String,
    pub enterprise_catalog_url: String,
    pub bind_address: String,
    pub bulk_batch_size: usize,
    pub revocation_cap_notification_email: Option<String>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET deve ser definido"))?;

        let bulk_batch_size = match env::var("LICENSE_BULK_BATCH_SIZE") {
            Ok(value) => value
                .parse::<usize>()
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| anyhow::anyhow!("LICENSE_BULK_BATCH_SIZE inválido: {}", value))?,
            Err(_) => LICENSE_BULK_OPERATION_BATCH_SIZE,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            jwt_secret,
            learner_portal_base_url: env::var("LEARNER_PORTAL_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_LEARNER_PORTAL_BASE_URL.to_string()),
            enterprise_catalog_url: env::var("ENTERPRISE_CATALOG_URL")
                .unwrap_or_else(|_| DEFAULT_ENTERPRISE_CATALOG_URL.to_string()),
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
            bulk_batch_size,
            revocation_cap_notification_email: env::var("REVOCATION_CAP_NOTIFICATION_EMAIL")
                .ok()
                .filter(|email| !email.is_empty()),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    // Só existe quando rodando com Postgres (usado pelas migrações)
    pub db_pool: Option<PgPool>,
    pub auth_service: AuthService,
    pub agreement_service: AgreementService,
    pub subscription_service: SubscriptionService,
    pub license_service: LicenseService,
}

impl AppState {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        // Conecta ao banco de dados, se houver um configurado
        let (db_pool, store): (Option<PgPool>, Arc<dyn SubscriptionStore>) = match &settings.database_url {
            Some(database_url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .acquire_timeout(Duration::from_secs(3))
                    .connect(database_url)
                    .await?;
                tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");
                (Some(pool.clone()), Arc::new(PgSubscriptionStore::new(pool)))
            }
            None => {
                tracing::warn!("⚠️ DATABASE_URL não definida: usando o store em memória (dados não persistem)");
                (None, Arc::new(MemorySubscriptionStore::new()))
            }
        };

        let catalog: Arc<dyn CatalogClient> = Arc::new(EnterpriseCatalogApiClient::new(
            &settings.enterprise_catalog_url,
            CATALOG_TIMEOUT,
        )?);
        let email_provider: Arc<dyn EmailProvider> = Arc::new(ConsoleEmailProvider);

        Ok(Self::from_parts(settings, db_pool, store, catalog, email_provider))
    }

    // --- Monta o gráfico de dependências ---
    pub fn from_parts(
        settings: &Settings,
        db_pool: Option<PgPool>,
        store: Arc<dyn SubscriptionStore>,
        catalog: Arc<dyn CatalogClient>,
        email_provider: Arc<dyn EmailProvider>,
    ) -> Self {
        let email_service = EmailService::new(
            email_provider,
            settings.learner_portal_base_url.clone(),
            settings.revocation_cap_notification_email.clone(),
        );

        Self {
            db_pool,
            auth_service: AuthService::new(settings.jwt_secret.clone()),
            agreement_service: AgreementService::new(store.clone()),
            subscription_service: SubscriptionService::new(
                store.clone(),
                catalog,
                settings.bulk_batch_size,
            ),
            license_service: LicenseService::new(store, email_service, settings.bulk_batch_size),
        }
    }
}
