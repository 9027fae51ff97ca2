//! Model provider implementations for Avacyn.
//!
//! All providers implement the `avacyn_core::Provider` trait. The
//! OpenAI-compatible provider covers every production backend; the mock
//! provider drives orchestrator and gateway tests without a network.

pub mod mock;
pub mod openai_compat;
pub mod partial_json;

pub use mock::{MockProvider, ScriptedTurn};
pub use openai_compat::OpenAiCompatProvider;

use avacyn_config::AppConfig;

/// Build the configured provider.
pub fn from_config(config: &AppConfig) -> OpenAiCompatProvider {
    OpenAiCompatProvider::new(
        "openai",
        config.api_url.clone(),
        config.api_key.clone().unwrap_or_default(),
    )
}
