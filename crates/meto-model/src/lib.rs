// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod error;
mod mock;
mod openai;
mod provider;
mod types;

use std::sync::Arc;

pub use error::ModelCallError;
pub use mock::{text_script, tool_call_event, MockProvider, Script, ScriptedMockProvider};
pub use openai::OpenAiProvider;
pub use provider::{ModelProvider, ResponseStream};
pub use types::*;

use meto_config::{ModelConfig, ProviderKind};

/// Construct the provider selected by `cfg.provider`.
pub fn from_config(cfg: &ModelConfig) -> Arc<dyn ModelProvider> {
    match cfg.provider {
        ProviderKind::Openai => Arc::new(OpenAiProvider::from_config(cfg)),
        ProviderKind::Mock => Arc::new(MockProvider),
    }
}
