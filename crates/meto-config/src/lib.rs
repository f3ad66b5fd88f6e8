// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod env;
mod schema;
mod loader;

pub use env::{apply_env_overrides, ENV_PREFIX};
pub use schema::*;
pub use loader::{load, load_with_env};
