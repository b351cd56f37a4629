use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{CatalogEntry, Category, DEFAULT_CATEGORY_VERSION};

fn default_version() -> String {
    DEFAULT_CATEGORY_VERSION.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySummary {
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub template_count: usize,
    #[serde(default)]
    pub template_names: Vec<String>,
}

/// `GET /api/prompts`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptListResponse {
    pub success: bool,
    #[serde(default)]
    pub categories: BTreeMap<String, CategorySummary>,
    #[serde(default)]
    pub total_categories: usize,
    #[serde(default)]
    pub total_templates: usize,
}

impl PromptListResponse {
    pub fn into_entries(self) -> Vec<CatalogEntry> {
        self.categories
            .into_iter()
            .map(|(name, summary)| CatalogEntry {
                name,
                description: summary.description,
                version: summary.version,
                template_count: summary.template_count,
                template_names: summary.template_names,
            })
            .collect()
    }
}

/// `GET /api/prompts/{category}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryResponse {
    pub success: bool,
    pub category: Category,
}

/// Body of `PUT /api/prompts/{category}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptUpdateRequest {
    pub data: Category,
}

/// Reply shape shared by the update and backup endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `POST /api/prompts/test`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTestRequest {
    pub category: String,
    pub template_name: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTestResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub missing_variables: Vec<String>,
}

/// `GET /health`, the only unauthenticated endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub categories_count: usize,
    #[serde(default)]
    pub available_categories: Vec<String>,
}
