pub mod chat;
pub mod image;
pub mod pages;
pub mod search;

pub use chat::{chat_claude2, chat_haiku};
pub use image::analyze_image;
pub use pages::{aoss_greeting, health_check};
pub use search::{query, rag_query};

/// Content type of plain-text model answers.
pub(crate) const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
