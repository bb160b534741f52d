use std::sync::Arc;

/// Extension a stream stage appends after `tar` in the container file name,
/// e.g. `xz` for `C.tar.xz`. `None` for stages that do not change the name.
pub trait FileExtProvider {
    fn file_ext(&self) -> Option<Arc<str>>;
}
