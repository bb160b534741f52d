use crate::backup::compress::{Compressor, CompressorBuilder, CompressorConfig};
use crate::backup::file_ext::FileExtProvider;
use crate::backup::finish::Finish;
use crate::backup::path_unit::DestinationId;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use itertools::Itertools;
use std::fs::File;
use std::io::{BufWriter, IntoInnerError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

static TAR_FILE_EXT: OnceLock<Arc<str>> = OnceLock::new();

type ContainerWriter = BufWriter<Compressor<BufWriter<File>>>;

/// `tar` plus the compressor extension, e.g. `tar.xz`.
pub fn container_file_ext(compressor: &CompressorConfig) -> Arc<str> {
    std::iter::once(TAR_FILE_EXT.get_or_init(|| "tar".into()).clone())
        .chain(compressor.file_ext())
        .join(".")
        .into()
}

/// Where the container for `destination` lives inside `out_dir`.
pub fn container_path<P: AsRef<Path>>(
    out_dir: P,
    destination: &DestinationId,
    compressor: &CompressorConfig,
) -> PathBuf {
    let base_name = sanitize_filename::sanitize(destination.as_ref());
    out_dir
        .as_ref()
        .join(format!("{}.{}", base_name, container_file_ext(compressor)))
}

/// One compressed tar stream being written.
pub struct TarContainer {
    path: PathBuf,
    builder: tar::Builder<ContainerWriter>,
    entry_count: usize,
}

impl TarContainer {
    /// Creates (or truncates) the container file.
    pub fn create<P: Into<PathBuf>>(path: P, compressor: &CompressorConfig) -> Result<Self> {
        let path = path.into();
        let builder = File::create(&path)
            .map(BufWriter::new)
            .map_err(Error::from)
            .and_then(|f| compressor.build_compressor(f))
            .map(BufWriter::new)
            .map(tar::Builder::new)
            .with_msg(format!("Creating container {:?} failed", path))?;

        Ok(Self {
            path,
            builder,
            entry_count: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Appends the file at `src` as `entry_name` and returns its original size.
    ///
    /// The source is opened before anything is written, so an unreadable file
    /// leaves the stream untouched.
    pub fn append_entry<P1: AsRef<Path>, P2: AsRef<Path>>(
        &mut self,
        src: P1,
        entry_name: P2,
    ) -> Result<u64> {
        let mut file = File::open(src.as_ref())?;
        let size = file.metadata()?.len();
        self.builder.append_file(entry_name.as_ref(), &mut file)?;
        self.entry_count += 1;
        Ok(size)
    }

    /// Writes the tar trailer, flushes the compressor and closes the file.
    pub fn finish(self) -> Result<PathBuf> {
        self.builder
            .into_inner()?
            .into_inner()
            .map_err(IntoInnerError::into_error)?
            .finish()?
            .into_inner()
            .map_err(IntoInnerError::into_error)?
            .sync_all()?;
        tracing::info!(
            "Closed container {:?} with {} entries",
            self.path,
            self.entry_count
        );
        Ok(self.path)
    }
}
