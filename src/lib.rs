//! Conversational form filling backed by an LLM collaborator.

pub mod config;
pub mod error;
pub mod llm;
pub mod store;
pub mod survey;
pub mod tools;
