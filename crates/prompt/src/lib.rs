//! Prompt system for Planes.
//!
//! - YAML prompt definitions, three of them built in
//! - Workspace overrides under `.planes/prompts/`
//! - Handlebars template rendering

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::{build_prompt, render_template};
pub use loader::{
    builtin_prompt, is_overridden, list_prompts, load_prompt, ANSWER_GROUNDED, INTENT_CLASSIFY, PARTIES_EXTRACT,
};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptBehavior, PromptDefinition, PromptInputSpec, PromptOutputSpec};
