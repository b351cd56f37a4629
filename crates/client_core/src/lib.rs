use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use shared::protocol::PromptTestRequest;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod catalog;
pub mod credentials;
pub mod document;
pub mod editor;
pub mod error;
pub mod gateway;
pub mod variables;

pub use catalog::{CatalogCache, CatalogView, CategoryVisibility, TemplateVisibility};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use document::{DocumentSession, DocumentState, Preview};
pub use editor::{DetachedEditor, EditorSurface, TextBuffer};
pub use error::{GatewayError, SchemaError, SessionError};
pub use gateway::{HttpGateway, RequestGateway, TestOutcome};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Issued for every catalog fetch and document load; only a response carrying
/// the latest token for its kind is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardConfirmation {
    NotGiven,
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    Applied,
    /// The session holds unsaved edits; nothing was changed.
    ConfirmationRequired,
    /// A later selection was issued before this one resolved.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { message: String },
    /// No category is selected.
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InFlight {
    pub load: Option<RequestToken>,
    pub catalog: Option<RequestToken>,
    pub save: Option<RequestToken>,
    pub tests: usize,
    pub backups: usize,
}

impl InFlight {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// Everything a UI needs to render the session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub selected_category: Option<String>,
    pub selected_template: Option<String>,
    pub document_state: DocumentState,
    pub document_text: String,
    pub dirty: bool,
    pub in_flight: InFlight,
    pub preview: Option<Preview>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub total_categories: usize,
    pub total_templates: usize,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    ConnectionChanged(ConnectionState),
    CatalogUpdated {
        total_categories: usize,
        total_templates: usize,
    },
    DocumentLoaded {
        category: String,
        template: String,
    },
    DocumentChanged {
        dirty: bool,
    },
    Saved {
        category: String,
        message: String,
    },
    TestCompleted(TestOutcome),
    BackupCompleted {
        category: String,
        message: String,
    },
    Error(String),
}

struct ControllerState {
    connection: ConnectionState,
    credential: Option<String>,
    catalog: CatalogCache,
    document: DocumentSession,
    preview_values: HashMap<String, String>,
    next_token: u64,
    in_flight: InFlight,
}

impl ControllerState {
    fn new() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            credential: None,
            catalog: CatalogCache::default(),
            document: DocumentSession::default(),
            preview_values: HashMap::new(),
            next_token: 0,
            in_flight: InFlight::default(),
        }
    }

    fn issue_token(&mut self) -> RequestToken {
        self.next_token += 1;
        RequestToken(self.next_token)
    }

    fn active_credential(&self) -> Result<String, SessionError> {
        match (&self.connection, &self.credential) {
            (ConnectionState::Connected, Some(credential)) => Ok(credential.clone()),
            _ => Err(SessionError::NotConnected),
        }
    }

    /// Drops the credential and every piece of server-derived state. Pending
    /// loads and catalog fetches become stale.
    fn reset(&mut self) {
        self.connection = ConnectionState::Disconnected;
        self.credential = None;
        self.catalog.clear();
        self.document.clear();
        // Tests and backups still settle against these counters.
        self.in_flight = InFlight {
            tests: self.in_flight.tests,
            backups: self.in_flight.backups,
            ..InFlight::default()
        };
    }

    fn editor_locked(&self) -> bool {
        self.document.state() == DocumentState::Empty
            || self.in_flight.load.is_some()
            || self.in_flight.save.is_some()
    }
}

/// Owns all mutable session state and drives the load/edit/save/test/backup
/// lifecycle against a [`RequestGateway`].
pub struct SessionController {
    gateway: Arc<dyn RequestGateway>,
    credentials: Arc<dyn CredentialStore>,
    editor: Arc<dyn EditorSurface>,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(gateway: Arc<dyn RequestGateway>) -> Arc<Self> {
        Self::new_with_dependencies(
            gateway,
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(DetachedEditor),
        )
    }

    pub fn new_with_dependencies(
        gateway: Arc<dyn RequestGateway>,
        credentials: Arc<dyn CredentialStore>,
        editor: Arc<dyn EditorSurface>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        editor.set_read_only(true);
        Arc::new(Self {
            gateway,
            credentials,
            editor,
            inner: Mutex::new(ControllerState::new()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn sync_editor_lock(&self, state: &ControllerState) {
        self.editor.set_read_only(state.editor_locked());
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let guard = self.inner.lock().await;
        SessionSnapshot {
            connection: guard.connection,
            selected_category: guard.document.category().map(str::to_string),
            selected_template: guard.document.template().map(str::to_string),
            document_state: guard.document.state(),
            document_text: guard.document.text().to_string(),
            dirty: guard.document.is_dirty(),
            in_flight: guard.in_flight.clone(),
            preview: guard.document.preview().cloned(),
            confirmed_at: guard.document.confirmed_at(),
            total_categories: guard.catalog.total_categories(),
            total_templates: guard.catalog.total_templates(),
        }
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.lock().await.connection
    }

    pub async fn catalog(&self) -> CatalogCache {
        self.inner.lock().await.catalog.clone()
    }

    pub async fn catalog_view(&self, term: &str) -> CatalogView {
        self.inner.lock().await.catalog.filter(term)
    }

    /// Reports a failed remote call. An auth failure for the credential still
    /// in use tears the whole session down.
    async fn gateway_failure(&self, credential: &str, err: GatewayError) -> SessionError {
        if err.is_auth() {
            let torn_down = {
                let mut guard = self.inner.lock().await;
                if guard.credential.as_deref() == Some(credential) {
                    guard.reset();
                    self.sync_editor_lock(&guard);
                    true
                } else {
                    false
                }
            };
            if torn_down {
                warn!("credential rejected; session disconnected");
                self.editor.set_content("");
                if let Err(store_err) = self.credentials.clear().await {
                    warn!(error = %store_err, "failed to clear stored credential");
                }
                self.emit(SessionEvent::ConnectionChanged(
                    ConnectionState::Disconnected,
                ));
            }
        } else {
            warn!(error = %err, "remote operation failed");
        }
        self.emit(SessionEvent::Error(err.to_string()));
        SessionError::Gateway(err)
    }

    /// Fails with [`SessionError::NotConnected`] when a later `connect` or
    /// `disconnect` overtakes this attempt.
    pub async fn connect(&self, credential: &str) -> Result<(), SessionError> {
        let credential = credential.trim().to_string();
        let token = {
            let mut guard = self.inner.lock().await;
            guard.reset();
            guard.connection = ConnectionState::Connecting;
            guard.credential = Some(credential.clone());
            let token = guard.issue_token();
            guard.in_flight.catalog = Some(token);
            self.sync_editor_lock(&guard);
            token
        };
        self.editor.set_content("");
        self.emit(SessionEvent::ConnectionChanged(ConnectionState::Connecting));
        info!(token = token.value(), "connecting");

        let result = self.gateway.list_categories(&credential).await;

        let mut guard = self.inner.lock().await;
        if guard.in_flight.catalog != Some(token) {
            debug!(token = token.value(), "connect superseded");
            return Err(SessionError::NotConnected);
        }
        guard.in_flight.catalog = None;

        match result {
            Ok(entries) => {
                guard.connection = ConnectionState::Connected;
                guard.catalog.replace(entries);
                let (total_categories, total_templates) = (
                    guard.catalog.total_categories(),
                    guard.catalog.total_templates(),
                );
                drop(guard);

                info!(total_categories, total_templates, "connected");
                if let Err(err) = self.credentials.store(&credential).await {
                    warn!(error = %err, "failed to persist credential");
                }
                self.emit(SessionEvent::ConnectionChanged(ConnectionState::Connected));
                self.emit(SessionEvent::CatalogUpdated {
                    total_categories,
                    total_templates,
                });
                Ok(())
            }
            Err(err) => {
                guard.reset();
                drop(guard);

                warn!(error = %err, "connect failed");
                if err.is_auth() {
                    if let Err(store_err) = self.credentials.clear().await {
                        warn!(error = %store_err, "failed to clear stored credential");
                    }
                }
                self.emit(SessionEvent::ConnectionChanged(
                    ConnectionState::Disconnected,
                ));
                self.emit(SessionEvent::Error(err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Connects with the persisted credential. Returns `false` when none is
    /// stored.
    pub async fn connect_stored(&self) -> Result<bool, SessionError> {
        match self.credentials.load().await? {
            Some(credential) => {
                self.connect(&credential).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn disconnect(&self) -> Result<(), SessionError> {
        {
            let mut guard = self.inner.lock().await;
            guard.reset();
            self.sync_editor_lock(&guard);
        }
        self.editor.set_content("");
        info!("disconnected");
        self.emit(SessionEvent::ConnectionChanged(ConnectionState::Disconnected));
        self.credentials.clear().await
    }

    pub async fn refresh_catalog(&self) -> Result<RefreshOutcome, SessionError> {
        let (credential, token) = {
            let mut guard = self.inner.lock().await;
            let credential = guard.active_credential()?;
            let token = guard.issue_token();
            guard.in_flight.catalog = Some(token);
            (credential, token)
        };
        debug!(token = token.value(), "refreshing catalog");

        let result = self.gateway.list_categories(&credential).await;

        let mut guard = self.inner.lock().await;
        if guard.in_flight.catalog != Some(token) {
            debug!(token = token.value(), "discarding stale catalog response");
            return Ok(RefreshOutcome::Superseded);
        }
        guard.in_flight.catalog = None;

        match result {
            Ok(entries) => {
                guard.catalog.replace(entries);
                let event = SessionEvent::CatalogUpdated {
                    total_categories: guard.catalog.total_categories(),
                    total_templates: guard.catalog.total_templates(),
                };
                drop(guard);
                self.emit(event);
                Ok(RefreshOutcome::Applied)
            }
            Err(err) => {
                drop(guard);
                Err(self.gateway_failure(&credential, err).await)
            }
        }
    }

    /// Loads `category` and selects `template` in it. With unsaved edits the
    /// caller must pass [`DiscardConfirmation::Discard`], otherwise nothing
    /// happens and [`SelectOutcome::ConfirmationRequired`] is returned.
    pub async fn select_template(
        &self,
        category: &str,
        template: &str,
        confirmation: DiscardConfirmation,
    ) -> Result<SelectOutcome, SessionError> {
        let (credential, token, text_at_issue) = {
            let mut guard = self.inner.lock().await;
            let credential = guard.active_credential()?;
            if guard.document.is_dirty() && confirmation != DiscardConfirmation::Discard {
                debug!(category, template, "selection needs discard confirmation");
                return Ok(SelectOutcome::ConfirmationRequired);
            }
            let token = guard.issue_token();
            guard.in_flight.load = Some(token);
            self.sync_editor_lock(&guard);
            (credential, token, guard.document.text().to_string())
        };
        info!(category, template, token = token.value(), "loading template");

        let result = self.gateway.get_category(&credential, category).await;

        let mut guard = self.inner.lock().await;
        if guard.in_flight.load != Some(token) {
            debug!(category, template, token = token.value(), "discarding stale load");
            return Ok(SelectOutcome::Superseded);
        }
        guard.in_flight.load = None;

        // Edits made after the selection was issued were never confirmed for
        // discarding.
        if guard.document.is_dirty() && guard.document.text() != text_at_issue {
            self.sync_editor_lock(&guard);
            debug!(category, template, "edits arrived during load; keeping buffer");
            return Ok(SelectOutcome::ConfirmationRequired);
        }

        let document = match result {
            Ok(document) => document,
            Err(err) => {
                self.sync_editor_lock(&guard);
                drop(guard);
                return Err(self.gateway_failure(&credential, err).await);
            }
        };

        let state = &mut *guard;
        if let Err(err) = state
            .document
            .replace_with(category, document, template, &state.preview_values)
        {
            self.sync_editor_lock(state);
            drop(guard);
            warn!(category, template, error = %err, "fetched document rejected");
            self.emit(SessionEvent::Error(err.to_string()));
            return Err(err);
        }

        self.editor.set_content(state.document.text());
        self.sync_editor_lock(state);
        drop(guard);

        self.emit(SessionEvent::DocumentLoaded {
            category: category.to_string(),
            template: template.to_string(),
        });
        Ok(SelectOutcome::Applied)
    }

    pub async fn on_editor_content_changed(&self, text: &str) {
        let dirty = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            state.document.mark_edited(text, &state.preview_values);
            state.document.is_dirty()
        };
        self.emit(SessionEvent::DocumentChanged { dirty });
    }

    pub async fn set_preview_value(&self, name: &str, value: &str) {
        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        state
            .preview_values
            .insert(name.to_string(), value.to_string());
        state.document.refresh_preview(&state.preview_values);
    }

    pub async fn clear_preview_values(&self) {
        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        state.preview_values.clear();
        state.document.refresh_preview(&state.preview_values);
    }

    pub async fn save(&self) -> Result<SaveOutcome, SessionError> {
        let (credential, ticket, token) = {
            let mut guard = self.inner.lock().await;
            let credential = guard.active_credential()?;
            if guard.document.category().is_none() {
                warn!("save requested with no category selected");
                return Ok(SaveOutcome::Skipped);
            }
            if guard.in_flight.save.is_some() {
                return Err(SessionError::SaveInProgress);
            }
            let begun = guard.document.begin_save();
            let ticket = match begun {
                Ok(ticket) => ticket,
                Err(err) => {
                    drop(guard);
                    warn!(error = %err, "save aborted before contacting server");
                    self.emit(SessionEvent::Error(err.to_string()));
                    return Err(err);
                }
            };
            let token = guard.issue_token();
            guard.in_flight.save = Some(token);
            self.sync_editor_lock(&guard);
            (credential, ticket, token)
        };
        info!(category = %ticket.category, token = token.value(), "saving category");

        let result = self
            .gateway
            .replace_category(&credential, &ticket.category, &ticket.document)
            .await;

        let mut guard = self.inner.lock().await;
        if guard.in_flight.save != Some(token) {
            // The session was torn down while the request was out.
            debug!(token = token.value(), "save settled after session reset");
            drop(guard);
            return match result {
                Ok(message) => Ok(SaveOutcome::Saved { message }),
                Err(err) => Err(err.into()),
            };
        }
        guard.in_flight.save = None;
        match result {
            Ok(message) => {
                guard.document.save_succeeded();
                let dirty = guard.document.is_dirty();
                self.sync_editor_lock(&guard);
                drop(guard);

                info!(category = %ticket.category, "category saved");
                self.emit(SessionEvent::Saved {
                    category: ticket.category.clone(),
                    message: message.clone(),
                });
                self.emit(SessionEvent::DocumentChanged { dirty });

                // Counts and version may have changed server-side.
                if let Err(err) = self.refresh_catalog().await {
                    warn!(error = %err, "catalog refresh after save failed");
                }
                Ok(SaveOutcome::Saved { message })
            }
            Err(err) => {
                guard.document.save_failed();
                self.sync_editor_lock(&guard);
                drop(guard);
                Err(self.gateway_failure(&credential, err).await)
            }
        }
    }

    /// Asks the server to render the selected template. Independent of the
    /// editor buffer and never touches the document session.
    pub async fn test<I>(&self, variables: I) -> Result<TestOutcome, SessionError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let variables: BTreeMap<String, String> = variables.into_iter().collect();
        let (credential, request) = {
            let mut guard = self.inner.lock().await;
            let credential = guard.active_credential()?;
            let (Some(category), Some(template)) =
                (guard.document.category(), guard.document.template())
            else {
                return Err(SessionError::NoSelection);
            };
            let request = PromptTestRequest {
                category: category.to_string(),
                template_name: template.to_string(),
                variables,
            };
            guard.in_flight.tests += 1;
            (credential, request)
        };
        debug!(
            category = %request.category,
            template = %request.template_name,
            "testing template"
        );

        let result = self.gateway.test_template(&credential, &request).await;

        {
            let mut guard = self.inner.lock().await;
            guard.in_flight.tests = guard.in_flight.tests.saturating_sub(1);
        }

        match result {
            Ok(outcome) => {
                self.emit(SessionEvent::TestCompleted(outcome.clone()));
                Ok(outcome)
            }
            Err(err) => Err(self.gateway_failure(&credential, err).await),
        }
    }

    pub async fn backup(&self) -> Result<String, SessionError> {
        let (credential, category) = {
            let mut guard = self.inner.lock().await;
            let credential = guard.active_credential()?;
            let category = guard
                .document
                .category()
                .map(str::to_string)
                .ok_or(SessionError::NoSelection)?;
            guard.in_flight.backups += 1;
            (credential, category)
        };
        info!(category = %category, "requesting backup");

        let result = self.gateway.backup_category(&credential, &category).await;

        {
            let mut guard = self.inner.lock().await;
            guard.in_flight.backups = guard.in_flight.backups.saturating_sub(1);
        }

        match result {
            Ok(message) => {
                self.emit(SessionEvent::BackupCompleted {
                    category,
                    message: message.clone(),
                });
                Ok(message)
            }
            Err(err) => Err(self.gateway_failure(&credential, err).await),
        }
    }
}

#[cfg(test)]
#[path = "tests/mock_server.rs"]
mod mock_server;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
