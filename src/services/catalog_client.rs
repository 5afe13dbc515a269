// src/services/catalog_client.rs

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::common::error::AppError;

/// Consulta ao serviço externo de catálogos corporativos.
#[async_trait]
pub trait CatalogClient: Send + Sync + 'static {
    /// O catálogo cobre os conteúdos pedidos? Repassa a resposta do serviço como veio.
    async fn contains_content_items(
        &self,
        catalog_uuid: Uuid,
        content_ids: &[String],
    ) -> Result<bool, AppError>;
}

#[derive(Debug, Deserialize)]
struct ContainsContentItemsResponse {
    contains_content_items: bool,
}

// Cliente HTTP do enterprise-catalog (sem retry: falhas sobem para quem chamou)
#[derive(Clone)]
pub struct EnterpriseCatalogApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl EnterpriseCatalogApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn contains_content_items_url(&self, catalog_uuid: Uuid) -> String {
        format!(
            "{}/api/v1/enterprise-catalogs/{}/contains_content_items/",
            self.base_url, catalog_uuid
        )
    }
}

#[async_trait]
impl CatalogClient for EnterpriseCatalogApiClient {
    async fn contains_content_items(
        &self,
        catalog_uuid: Uuid,
        content_ids: &[String],
    ) -> Result<bool, AppError> {
        let query: Vec<(&str, &str)> = content_ids
            .iter()
            .map(|id| ("course_run_ids", id.as_str()))
            .collect();

        let response = self
            .http
            .get(self.contains_content_items_url(catalog_uuid))
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                "❌ Serviço de catálogo respondeu {} para o catálogo {}",
                status,
                catalog_uuid
            );
            return Err(AppError::CatalogServiceError(format!(
                "status {} ao consultar o catálogo {}",
                status, catalog_uuid
            )));
        }

        let body: ContainsContentItemsResponse = response.json().await?;
        Ok(body.contains_content_items)
    }
}

/// Cliente fixo para os testes: responde sempre a mesma coisa e guarda as chamadas.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct StaticCatalogClient {
    answer: Option<bool>,
    calls: std::sync::Arc<std::sync::Mutex<Vec<(Uuid, Vec<String>)>>>,
}

#[cfg(test)]
impl StaticCatalogClient {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer: Some(answer),
            ..Self::default()
        }
    }

    // Sem resposta configurada = serviço fora do ar
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(Uuid, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl CatalogClient for StaticCatalogClient {
    async fn contains_content_items(
        &self,
        catalog_uuid: Uuid,
        content_ids: &[String],
    ) -> Result<bool, AppError> {
        self.calls
            .lock()
            .unwrap()
            .push((catalog_uuid, content_ids.to_vec()));
        self.answer
            .ok_or_else(|| AppError::CatalogServiceError("serviço indisponível".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_has_no_double_slash() {
        let client =
            EnterpriseCatalogApiClient::new("https://catalog.example.com/", Duration::from_secs(5))
                .unwrap();
        let catalog = Uuid::nil();
        assert_eq!(
            client.contains_content_items_url(catalog),
            format!("https://catalog.example.com/api/v1/enterprise-catalogs/{catalog}/contains_content_items/")
        );
    }

    #[tokio::test]
    async fn unreachable_service_surfaces_http_error() {
        let client =
            EnterpriseCatalogApiClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let result = client
            .contains_content_items(Uuid::new_v4(), &["course-v1:edX+DemoX".to_string()])
            .await;
        assert!(matches!(result, Err(AppError::HttpClientError(_))));
    }
}
