//! testsmith - Generate, repair and run unit tests for source files
//!
//! Asks an LLM provider (Groq, OpenAI, OpenAI-compatible, Anthropic) for a unit
//! test, cleans up the reply, stages it next to the code in an isolated
//! workspace and runs it with the language's toolchain (Python unittest, Maven).

pub mod cli;
pub mod config;
pub mod language;
pub mod llm;
pub mod pipeline;
pub mod util;
