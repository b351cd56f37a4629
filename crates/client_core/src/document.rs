//! The currently loaded category document and its editor buffer.

use chrono::{DateTime, Utc};
use shared::domain::Category;
use tracing::debug;

use crate::{
    error::{SchemaError, SessionError},
    variables::{extract_placeholders, substitute, VariableValues},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Empty,
    Clean,
    Dirty,
    Saving,
}

/// Local rendering of the selected template against the preview values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub template: String,
    pub placeholders: Vec<String>,
    pub declared: Vec<String>,
    /// Placeholders used in the content but missing from `declared`.
    pub undeclared: Vec<String>,
    pub rendered: String,
    /// Set while the buffer cannot be parsed; the other fields hold the last
    /// good rendering.
    pub degraded: bool,
}

/// Everything a save needs, captured when the save starts.
#[derive(Debug, Clone)]
pub struct SaveTicket {
    pub category: String,
    pub document: Category,
    pub text: String,
}

/// Parses editor text into a category. Text that is not JSON is a parse
/// error; JSON of the wrong shape is a schema error.
pub fn parse_document(text: &str) -> Result<Category, SessionError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| SessionError::Parse(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| SchemaError::InvalidShape(e.to_string()).into())
}

pub fn parse_document_for(text: &str, template: &str) -> Result<Category, SessionError> {
    let category = parse_document(text)?;
    ensure_template(&category, template)?;
    Ok(category)
}

fn ensure_template(category: &Category, template: &str) -> Result<(), SchemaError> {
    if category.template(template).is_none() {
        return Err(SchemaError::MissingTemplate {
            category: category.name.clone(),
            template: template.to_string(),
        });
    }
    Ok(())
}

pub fn render_document(category: &Category) -> Result<String, SessionError> {
    serde_json::to_string_pretty(category)
        .map_err(|e| SchemaError::InvalidShape(e.to_string()).into())
}

#[derive(Debug, Clone)]
pub struct DocumentSession {
    state: DocumentState,
    category: Option<String>,
    template: Option<String>,
    text: String,
    confirmed_text: String,
    in_flight_text: Option<String>,
    confirmed_at: Option<DateTime<Utc>>,
    preview: Option<Preview>,
}

impl Default for DocumentSession {
    fn default() -> Self {
        Self {
            state: DocumentState::Empty,
            category: None,
            template: None,
            text: String::new(),
            confirmed_text: String::new(),
            in_flight_text: None,
            confirmed_at: None,
            preview: None,
        }
    }
}

impl DocumentSession {
    pub fn state(&self) -> DocumentState {
        self.state
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn confirmed_text(&self) -> &str {
        &self.confirmed_text
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.state != DocumentState::Empty && self.text != self.confirmed_text
    }

    pub fn is_saving(&self) -> bool {
        self.state == DocumentState::Saving
    }

    /// Installs a freshly fetched document stored under `key`. Discarding
    /// unsaved edits is the caller's decision and must already have been made.
    pub fn replace_with<V>(
        &mut self,
        key: &str,
        category: Category,
        template: &str,
        values: &V,
    ) -> Result<(), SessionError>
    where
        V: VariableValues + ?Sized,
    {
        ensure_template(&category, template)?;
        let text = render_document(&category)?;

        self.state = DocumentState::Clean;
        self.category = Some(key.to_string());
        self.template = Some(template.to_string());
        self.confirmed_text = text.clone();
        self.text = text;
        self.in_flight_text = None;
        self.confirmed_at = Some(Utc::now());
        self.preview = None;
        self.refresh_preview(values);
        Ok(())
    }

    /// Records new editor content. Never fails; an unparseable buffer only
    /// degrades the preview.
    pub fn mark_edited<V>(&mut self, text: &str, values: &V)
    where
        V: VariableValues + ?Sized,
    {
        if self.state == DocumentState::Empty {
            debug!("ignoring editor change with no document loaded");
            return;
        }

        self.text = text.to_string();
        if self.state != DocumentState::Saving {
            self.settle();
        }
        self.refresh_preview(values);
    }

    pub fn begin_save(&mut self) -> Result<SaveTicket, SessionError> {
        let (category, template) = match (&self.category, &self.template) {
            (Some(category), Some(template)) => (category.clone(), template.clone()),
            _ => return Err(SessionError::NoSelection),
        };
        if self.state == DocumentState::Saving {
            return Err(SessionError::SaveInProgress);
        }

        let document = parse_document_for(&self.text, &template)?;
        self.state = DocumentState::Saving;
        self.in_flight_text = Some(self.text.clone());
        Ok(SaveTicket {
            category,
            document,
            text: self.text.clone(),
        })
    }

    pub fn save_succeeded(&mut self) {
        if self.state != DocumentState::Saving {
            return;
        }
        if let Some(sent) = self.in_flight_text.take() {
            self.confirmed_text = sent;
        }
        self.confirmed_at = Some(Utc::now());
        self.settle();
    }

    /// Unsaved text is kept as-is.
    pub fn save_failed(&mut self) {
        if self.state != DocumentState::Saving {
            return;
        }
        self.in_flight_text = None;
        self.settle();
    }

    pub fn refresh_preview<V>(&mut self, values: &V)
    where
        V: VariableValues + ?Sized,
    {
        let Some(template_name) = self.template.clone() else {
            self.preview = None;
            return;
        };

        match parse_document_for(&self.text, &template_name) {
            Ok(category) => {
                let Some(template) = category.template(&template_name) else {
                    return;
                };
                let placeholders = extract_placeholders(&template.content);
                let undeclared = placeholders
                    .iter()
                    .filter(|name| !template.variables.contains(*name))
                    .cloned()
                    .collect();
                self.preview = Some(Preview {
                    template: template_name,
                    placeholders,
                    declared: template.variables.clone(),
                    undeclared,
                    rendered: substitute(&template.content, values),
                    degraded: false,
                });
            }
            Err(err) => {
                debug!(error = %err, "preview degraded");
                if let Some(preview) = self.preview.as_mut() {
                    preview.degraded = true;
                }
            }
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn settle(&mut self) {
        self.state = if self.text == self.confirmed_text {
            DocumentState::Clean
        } else {
            DocumentState::Dirty
        };
    }
}

#[cfg(test)]
#[path = "tests/document_tests.rs"]
mod tests;
