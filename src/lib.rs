//! Persona-tailored marketing creative generation.
//!
//! [`workflow::CreativeWorkflow`] infers a persona, generates an image through
//! the Flux API and writes copy through a chat-completion API, degrading to a
//! fallback image when image generation fails.

pub mod bfl;
pub mod config;
pub mod error;
pub mod models;
pub mod openai;
pub mod persona;
pub mod prompt;
pub mod routes;
pub mod workflow;
