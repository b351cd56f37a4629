//! Typed access to the prompt store. Each call carries the bearer credential.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use shared::{
    domain::{CatalogEntry, Category},
    error::ApiError,
    protocol::{
        CategoryResponse, HealthResponse, PromptListResponse, PromptTestRequest,
        PromptTestResponse, PromptUpdateRequest, StatusResponse,
    },
};
use tracing::debug;
use url::Url;

use crate::error::GatewayError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Rendered {
        text: String,
        missing_variables: Vec<String>,
    },
    Failed {
        message: String,
    },
}

impl TestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Rendered { .. })
    }
}

impl From<PromptTestResponse> for TestOutcome {
    fn from(value: PromptTestResponse) -> Self {
        if value.success {
            Self::Rendered {
                text: value.rendered_prompt.unwrap_or_default(),
                missing_variables: value.missing_variables,
            }
        } else {
            Self::Failed {
                message: value
                    .error
                    .unwrap_or_else(|| "prompt rendering failed".to_string()),
            }
        }
    }
}

#[async_trait]
pub trait RequestGateway: Send + Sync {
    async fn list_categories(&self, credential: &str) -> Result<Vec<CatalogEntry>, GatewayError>;
    async fn get_category(&self, credential: &str, name: &str) -> Result<Category, GatewayError>;
    /// Returns the server's confirmation message.
    async fn replace_category(
        &self,
        credential: &str,
        name: &str,
        category: &Category,
    ) -> Result<String, GatewayError>;
    async fn test_template(
        &self,
        credential: &str,
        request: &PromptTestRequest,
    ) -> Result<TestOutcome, GatewayError>;
    async fn backup_category(&self, credential: &str, name: &str) -> Result<String, GatewayError>;
}

pub struct HttpGateway {
    http: Client,
    base_url: Url,
}

impl HttpGateway {
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let http = Client::builder().timeout(timeout).build()?;
        Self::with_client(http, base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self, GatewayError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GatewayError::Network(format!("invalid server url '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::Network(format!(
                "server url '{base_url}' cannot carry a path"
            )));
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                GatewayError::Network(format!("server url '{}' cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            debug!(status = status.as_u16(), "request rejected");
            return Err(ApiError::from_body(status.as_u16(), &body).into());
        }
        serde_json::from_str(&body)
            .map_err(|e| GatewayError::Network(format!("invalid response body: {e}")))
    }

    async fn send_status(&self, request: RequestBuilder) -> Result<String, GatewayError> {
        let response: StatusResponse = self.send(request).await?;
        if !response.success {
            return Err(GatewayError::Server {
                status: 200,
                message: response
                    .error
                    .or(response.message)
                    .unwrap_or_else(|| "request was not successful".to_string()),
            });
        }
        Ok(response.message.unwrap_or_default())
    }

    /// Service liveness; does not need a credential.
    pub async fn health(&self) -> Result<HealthResponse, GatewayError> {
        let url = self.endpoint(&["health"])?;
        self.send(self.http.get(url)).await
    }
}

#[async_trait]
impl RequestGateway for HttpGateway {
    async fn list_categories(&self, credential: &str) -> Result<Vec<CatalogEntry>, GatewayError> {
        let url = self.endpoint(&["api", "prompts"])?;
        let response: PromptListResponse = self
            .send(self.http.get(url).bearer_auth(credential))
            .await?;
        Ok(response.into_entries())
    }

    async fn get_category(&self, credential: &str, name: &str) -> Result<Category, GatewayError> {
        let url = self.endpoint(&["api", "prompts", name])?;
        let response: CategoryResponse = self
            .send(self.http.get(url).bearer_auth(credential))
            .await?;
        Ok(response.category)
    }

    async fn replace_category(
        &self,
        credential: &str,
        name: &str,
        category: &Category,
    ) -> Result<String, GatewayError> {
        let url = self.endpoint(&["api", "prompts", name])?;
        let body = PromptUpdateRequest {
            data: category.clone(),
        };
        self.send_status(self.http.put(url).bearer_auth(credential).json(&body))
            .await
    }

    async fn test_template(
        &self,
        credential: &str,
        request: &PromptTestRequest,
    ) -> Result<TestOutcome, GatewayError> {
        let url = self.endpoint(&["api", "prompts", "test"])?;
        let response: PromptTestResponse = self
            .send(self.http.post(url).bearer_auth(credential).json(request))
            .await?;
        Ok(response.into())
    }

    async fn backup_category(&self, credential: &str, name: &str) -> Result<String, GatewayError> {
        let url = self.endpoint(&["api", "admin", "backup", name])?;
        self.send_status(self.http.post(url).bearer_auth(credential))
            .await
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
