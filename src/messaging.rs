//! Platform adapters: the Discord source and the Telegram destination.

pub mod discord;
pub mod telegram;
pub mod traits;

pub use traits::{Messaging, MessagingDyn};

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_message(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
