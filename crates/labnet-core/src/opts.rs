//! This module defines the [`PipelineOpts`] configuration which describes how connections are
//! installed and how long they live.

use crate::install::InstallMode;

/// Pipeline options.
#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub struct PipelineOpts {
    /// How compiled rules are pushed.
    #[builder(default)]
    pub install_mode: InstallMode,
    /// How long a connection lives before it may be reaped. `None` keeps connections until they
    /// are torn down explicitly.
    #[builder(default, setter(strip_option))]
    pub ttl: Option<chrono::Duration>,
    /// Seed for handler suffixes. Handlers are only reproducible when this is set.
    #[builder(default, setter(strip_option))]
    pub seed: Option<u64>,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self::builder().build()
    }
}
