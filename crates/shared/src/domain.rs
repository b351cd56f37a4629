use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_CATEGORY_VERSION: &str = "1.0.0";
pub const DEFAULT_TEMPLATE_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

fn default_version() -> String {
    DEFAULT_CATEGORY_VERSION.to_string()
}

fn default_model() -> String {
    DEFAULT_TEMPLATE_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

// Optional template fields may be stored as explicit nulls; treat those like
// absent keys.

fn nullable_description<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_model<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_model))
}

fn nullable_max_tokens<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(DEFAULT_MAX_TOKENS))
}

/// A named unit of prompt text. The name is the key under which the template
/// is stored in [`Category::templates`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Template {
    #[serde(default, deserialize_with = "nullable_description")]
    pub description: String,
    #[serde(default = "default_model", deserialize_with = "nullable_model")]
    pub model: String,
    #[serde(default = "default_max_tokens", deserialize_with = "nullable_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub variables: Vec<String>,
    pub content: String,
}

impl Template {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            description: String::new(),
            model: default_model(),
            max_tokens: DEFAULT_MAX_TOKENS,
            variables: Vec::new(),
            content: content.into(),
        }
    }

    pub fn with_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = variables.into_iter().map(Into::into).collect();
        self
    }
}

/// A named, versioned collection of templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Category {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(rename = "category")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub templates: BTreeMap<String, Template>,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: default_version(),
            name: name.into(),
            description: String::new(),
            templates: BTreeMap::new(),
        }
    }

    pub fn with_template(mut self, name: impl Into<String>, template: Template) -> Self {
        self.templates.insert(name.into(), template);
        self
    }

    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn template_names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    /// Reduced projection used for browsing.
    pub fn summary(&self) -> CatalogEntry {
        CatalogEntry {
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            template_count: self.templates.len(),
            template_names: self.template_names(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub description: String,
    pub version: String,
    pub template_count: usize,
    pub template_names: Vec<String>,
}
