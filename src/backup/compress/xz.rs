use crate::backup::compress::{Compressor, CompressorBuilder};
use crate::backup::result_error::result::Result;
use bon::Builder;
use getset::CopyGetters;
use liblzma::stream::{Check, MtStreamBuilder};
use liblzma::write::XzEncoder;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::io::Write;
use validator::Validate;

/// Default compression level (balance of speed vs size)
pub static DEFAULT_COMPRESSION_LEVEL: u32 = 3;

/// XZ (LZMA) settings for every destination container.
///
/// Each destination already has its own writer thread, so the encoder itself
/// stays single-threaded unless `thread` asks otherwise.
#[skip_serializing_none]
#[derive(
    Clone, Default, Validate, Serialize, Deserialize, Debug, PartialEq, Eq, Builder, CopyGetters,
)]
#[serde(deny_unknown_fields)]
#[getset(get_copy = "pub")]
pub struct XzConfig {
    /// Compression level, 0 (fastest) to 9 (smallest)
    #[validate(range(min = 0, max = 9))]
    level: Option<u32>,

    /// Encoder threads per container
    #[validate(range(min = 1))]
    thread: Option<u32>,
}

impl XzConfig {
    pub fn effective_level(&self) -> u32 {
        self.level.unwrap_or(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl<W: Write> CompressorBuilder<W> for XzConfig {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>> {
        let level = self.effective_level();
        let thread = self.thread.unwrap_or(1);

        tracing::debug!("Creating XZ compressor with level={}, threads={}", level, thread);

        if thread == 1 {
            Ok(XzEncoder::new(writer, level).into())
        } else {
            let stream = MtStreamBuilder::new()
                .preset(level)
                .check(Check::Crc64)
                .threads(thread)
                .encoder()?;
            Ok(XzEncoder::new_stream(writer, stream).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_xz_config_default() {
        let config = XzConfig::default();
        assert!(config.level().is_none());
        assert!(config.thread().is_none());
        assert_eq!(config.effective_level(), DEFAULT_COMPRESSION_LEVEL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_xz_config_validation() {
        assert!(XzConfig::builder().level(9).thread(4).build().validate().is_ok());
        assert!(XzConfig::builder().level(10).build().validate().is_err());
        assert!(XzConfig::builder().thread(0).build().validate().is_err());
    }

    #[test]
    fn test_build_compressor_single_thread() {
        let config = XzConfig::builder().level(6).build();
        let compressor = config.build_compressor(Cursor::new(Vec::new())).unwrap();
        assert!(matches!(compressor, Compressor::XzEncoder(_)));
    }

    #[test]
    fn test_build_compressor_multi_thread() {
        let config = XzConfig::builder().level(6).thread(2).build();
        let compressor = config.build_compressor(Cursor::new(Vec::new())).unwrap();
        assert!(matches!(compressor, Compressor::XzEncoder(_)));
    }

    #[test]
    fn test_xz_config_rejects_unknown_fields() {
        let result = serde_json::from_str::<XzConfig>(r#"{"level": 1, "speed": 2}"#);
        assert!(result.is_err());
    }
}
