// ABOUTME: Backend implementations (LLM persona, direct CLI, mock).
// ABOUTME: Each backend implements AgentBackend trait.

pub mod direct_cli;
pub mod llm;
pub mod mock;
