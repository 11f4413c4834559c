// Generation collaborator: turns (code, language) into a raw test artifact.

pub mod client;
pub mod client_impl;
pub mod factory;
pub mod prompts;

pub use client::{LlmClient, MockLlmClient};
pub use factory::create_client;
