//! Compression stage between the tar stream and the container file.

pub mod xz;

use crate::backup::file_ext::FileExtProvider;
use crate::backup::finish::Finish;
use crate::backup::function_path;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithDebugObjectAndFnName;
use derive_more::From;
use function_name::named;
use io_enum::Write;
use liblzma::write::XzEncoder;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::io;
use std::io::Write;
use std::sync::Arc;
use validator::{Validate, ValidationErrors};

const XZ_FILE_EXT: &str = "xz";

/// Writer sitting under the tar builder of one destination container.
#[derive(Write, From)]
pub enum Compressor<W: Write> {
    /// Plain `.tar` output
    None(W),
    XzEncoder(XzEncoder<W>),
}

/// Compression applied to every destination container of a run.
///
/// Each container gets its own encoder built from this config, so containers
/// never share encoder state.
#[derive(Clone, From, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "compressor_type")]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum CompressorConfig {
    None,
    Xz(xz::XzConfig),
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self::Xz(xz::XzConfig::default())
    }
}

impl Display for CompressorConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "uncompressed"),
            Self::Xz(xz) => write!(
                f,
                "xz level {}, {} encoder threads",
                xz.effective_level(),
                xz.thread().unwrap_or(1)
            ),
        }
    }
}

impl Validate for CompressorConfig {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        match self {
            Self::None => Ok(()),
            Self::Xz(xz) => xz.validate(),
        }
    }
}

/// Wraps a container file writer in the configured compression stage.
pub trait CompressorBuilder<W: Write> {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>>;
}

impl<W: Write> CompressorBuilder<W> for CompressorConfig {
    #[named]
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>> {
        match self {
            Self::None => Ok(Compressor::None(writer)),
            Self::Xz(xz) => xz.build_compressor(writer),
        }
        .with_debug_object_and_fn_name(self.clone(), function_path!())
    }
}

impl<W: Write> Finish<W> for Compressor<W> {
    /// Writes the stream footer, if any, and returns the file writer.
    fn finish(self) -> io::Result<W> {
        match self {
            Compressor::None(w) => Ok(w),
            Compressor::XzEncoder(w) => w.finish(),
        }
    }
}

impl FileExtProvider for CompressorConfig {
    fn file_ext(&self) -> Option<Arc<str>> {
        match self {
            Self::None => None,
            Self::Xz(_) => Some(XZ_FILE_EXT.into()),
        }
    }
}
