//! Prompt compilation and image generation

mod client;
pub mod prompts;

pub use client::{Generation, GenerationClient};
pub use prompts::{COMPILATION_SYSTEM_PROMPT, PICASSO_INSTRUCTIONS};
