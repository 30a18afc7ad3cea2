//! Request shaping for the model calls.

pub mod image;
pub mod rag;

pub use image::{build_image_request, ImageFormat, DEFAULT_IMAGE_PROMPT};
pub use rag::build_rag_request;
