use std::sync::{Arc, Mutex};

/// Buffer shared between the controller and whoever displays or edits it
pub type SharedBuffer = Arc<Mutex<TextBuffer>>;

/// Editable text with a cursor
///
/// Offsets count `char`s, never bytes, so a cursor can never land inside a
/// multi-byte character.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
    cursor: usize,
}

impl TextBuffer {
    /// Buffer holding `text` with the cursor at its end
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = text.chars().count();
        Self { text, cursor }
    }

    /// Wraps the buffer for sharing
    #[must_use]
    pub fn shared(self) -> SharedBuffer {
        Arc::new(Mutex::new(self))
    }

    /// Current contents
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Cursor position in chars
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Length in chars
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Moves the cursor, clamped to the end of the text
    pub fn set_cursor(&mut self, offset: usize) {
        self.cursor = offset.min(self.char_len());
    }

    /// Replaces the contents, clamping the cursor to the new text
    pub fn replace_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.cursor = self.cursor.min(self.char_len());
    }

    /// Splices `insertion` at `offset` and places the cursor right after it
    ///
    /// An offset past the end (the text shrank since it was captured) is
    /// clamped to the end. Returns the new cursor.
    pub fn insert_at(&mut self, offset: usize, insertion: &str) -> usize {
        let offset = offset.min(self.char_len());
        let byte_index = self
            .text
            .char_indices()
            .nth(offset)
            .map_or(self.text.len(), |(index, _)| index);

        self.text.insert_str(byte_index, insertion);
        self.cursor = offset + insertion.chars().count();
        self.cursor
    }
}

/// Generate preview of text for logging
///
/// Truncates text over 50 chars with a "..." suffix.
#[must_use]
pub fn generate_text_preview(text: &str) -> String {
    if text.chars().count() > 50 {
        let head: String = text.chars().take(47).collect();
        format!("{head}...")
    } else {
        text.to_owned()
    }
}
