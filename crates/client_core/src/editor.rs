use std::sync::Mutex;

/// The structured-text editing widget owned by the UI. The controller pushes
/// freshly loaded documents into it and toggles it read-only; content changes
/// flow back through `SessionController::on_editor_content_changed`.
pub trait EditorSurface: Send + Sync {
    fn set_content(&self, text: &str);
    fn content(&self) -> String;
    fn set_read_only(&self, read_only: bool);
}

/// Used when no widget is attached, e.g. by command-line front ends.
pub struct DetachedEditor;

impl EditorSurface for DetachedEditor {
    fn set_content(&self, _text: &str) {}

    fn content(&self) -> String {
        String::new()
    }

    fn set_read_only(&self, _read_only: bool) {}
}

#[derive(Debug, Default)]
struct BufferState {
    text: String,
    read_only: bool,
}

/// In-memory editor holding plain text.
#[derive(Debug, Default)]
pub struct TextBuffer {
    inner: Mutex<BufferState>,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_read_only(&self) -> bool {
        self.inner
            .lock()
            .map(|state| state.read_only)
            .unwrap_or(true)
    }
}

impl EditorSurface for TextBuffer {
    fn set_content(&self, text: &str) {
        if let Ok(mut state) = self.inner.lock() {
            state.text = text.to_string();
        }
    }

    fn content(&self) -> String {
        self.inner
            .lock()
            .map(|state| state.text.clone())
            .unwrap_or_default()
    }

    fn set_read_only(&self, read_only: bool) {
        if let Ok(mut state) = self.inner.lock() {
            state.read_only = read_only;
        }
    }
}
