use crate::backup::compress::CompressorConfig;
use crate::backup::controller::{BackupController, DEFAULT_FAN_OUT, DEFAULT_POLL_INTERVAL};
use crate::backup::copy_policy::{
    CopyPolicy, CustomDeserializedGlob, IncludeAll, PriorBackupPolicy, PriorBackupRecord,
};
use crate::backup::function_path;
use crate::backup::path_unit::{CopyMode, PathKind, PathUnit};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use crate::backup::validate::validate_writable_or_creatable_dir;
use function_name::named;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use validator::{Validate, ValidationError};

/// One seed path of the backup.
#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub path: PathBuf,
    /// Read from disk when omitted
    pub kind: Option<PathKind>,
    #[serde(default)]
    pub copy_mode: CopyMode,
}

impl SourceConfig {
    #[named]
    fn to_unit(&self) -> Result<PathUnit> {
        let path: Arc<Path> = std::path::absolute(&self.path)
            .map_err(Error::from)
            .with_debug_object_and_fn_name(self.path.clone(), function_path!())?
            .into();
        Ok(match self.kind {
            Some(kind) => PathUnit::new(kind, self.copy_mode, path),
            None => PathUnit::from_disk(path, self.copy_mode),
        })
    }
}

#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    #[validate(custom(function = validate_out_dir))]
    pub out_dir: Arc<Path>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// Discovery workers per destination
    #[validate(range(min = 1))]
    pub fan_out: Option<usize>,
    #[serde(default, with = "humantime_serde")]
    pub poll_interval: Option<Duration>,
    #[serde(default)]
    pub exclude: Vec<CustomDeserializedGlob>,
    #[serde(default)]
    pub prior_backups: Vec<PriorBackupRecord>,
    #[serde(default)]
    #[validate(nested)]
    pub compressor: CompressorConfig,
    #[serde(default)]
    pub log_stats: bool,
}

/// Checked without touching the disk; the controller creates it on start.
fn validate_out_dir(dir: &Arc<Path>) -> std::result::Result<(), ValidationError> {
    validate_writable_or_creatable_dir(dir)
}

impl BackupConfig {
    pub fn fan_out(&self) -> usize {
        self.fan_out.unwrap_or(DEFAULT_FAN_OUT)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    fn copy_policy(&self) -> Result<Arc<dyn CopyPolicy>> {
        if self.exclude.is_empty() && self.prior_backups.is_empty() {
            return Ok(Arc::new(IncludeAll));
        }
        let policy = PriorBackupPolicy::new(self.prior_backups.clone(), &self.exclude)
            .with_msg("Building copy policy failed")?;
        Ok(Arc::new(policy))
    }

    /// Validates the config and turns it into a ready-to-start controller.
    pub fn build_controller(&self) -> Result<BackupController> {
        self.validate()
            .map_err(Error::from)
            .with_msg("Config validation failed")?;

        let (seeds, errors): (Vec<_>, Vec<_>) = self
            .sources
            .iter()
            .map(SourceConfig::to_unit)
            .partition_result();
        convert_error_vec(errors).with_msg("Resolving source paths failed")?;
        debug!("Resolved {} seed units", seeds.len());

        Ok(BackupController::builder()
            .out_dir(self.out_dir.to_path_buf())
            .seeds(seeds)
            .policy(self.copy_policy()?)
            .fan_out(self.fan_out())
            .poll_interval(self.poll_interval())
            .compressor(self.compressor.clone())
            .build())
    }
}
