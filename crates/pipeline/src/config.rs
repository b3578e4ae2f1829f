//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use slipway_build::BuildConfig;
use slipway_publish::StorageConfig;

/// Everything a run needs, passed explicitly into each phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub build: BuildConfig,
    pub storage: StorageConfig,
}
