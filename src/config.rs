//! Process-level configuration.
//!
//! Configuration is via environment variables:
//! - `AGILE_PLANNER_OUTPUT_ROOT` - default output root when a call supplies none
//! - `RUST_LOG` - log filter (read by the binary)
//!
//! Only [`Config::from_env`] reads ambient state; everything downstream gets a
//! `Config` or an already resolved path.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::backlog::paths;

/// Environment variable selecting the default output root.
pub const OUTPUT_ROOT_ENV: &str = "AGILE_PLANNER_OUTPUT_ROOT";

#[derive(Debug, Clone)]
pub struct Config {
    /// Value of the output root override, if set and non-empty.
    pub output_root_override: Option<PathBuf>,
    /// Working directory used as the last fallback and to absolutize relative roots.
    pub working_dir: PathBuf,
}

impl Config {
    /// Create config from the process environment.
    pub fn from_env() -> Result<Self> {
        let working_dir =
            std::env::current_dir().context("Could not determine working directory")?;
        let output_root_override = std::env::var_os(OUTPUT_ROOT_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Ok(Self::new(working_dir, output_root_override))
    }

    /// Create with explicit configuration.
    pub fn new(working_dir: impl Into<PathBuf>, output_root_override: Option<PathBuf>) -> Self {
        Self {
            output_root_override,
            working_dir: working_dir.into(),
        }
    }

    /// Resolve the output root for one call: explicit > override > working dir.
    pub fn resolve_output_root(&self, explicit: Option<&Path>) -> PathBuf {
        paths::resolve_output_root(
            explicit,
            self.output_root_override.as_deref(),
            &self.working_dir,
        )
    }
}
