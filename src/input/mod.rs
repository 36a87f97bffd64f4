/// Text buffer the transcript is spliced into
pub mod buffer;
/// Global key events and their subscriptions
pub mod keys;

pub use buffer::{generate_text_preview, SharedBuffer, TextBuffer};
pub use keys::{key_name, KeyAction, KeyEvent, KeyHub, KeySubscription};
