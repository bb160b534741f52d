use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use itertools::Itertools;
use std::fmt::Debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    LiblzmaStream(#[from] liblzma::stream::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    GlobSet(#[from] globset::Error),
    #[error("Spawning thread {name:?} failed: {source}")]
    ThreadSpawn {
        name: String,
        source: std::io::Error,
    },
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send + Sync>,
        fn_name: String,
    },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>, O: Debug + Send + Sync + 'static> WithDebugObjectAndFnName<S, O> for Error {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        Self::LotsOfError(errors.into_iter().flat_map(Error::into_iter).collect_vec())
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(Error::into_iter)),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    /// Wraps a failed `std::thread::Builder::spawn` with the thread name.
    pub fn thread_spawn<S: Into<String>>(name: S, source: std::io::Error) -> Error {
        Error::ThreadSpawn {
            name: name.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found(msg: &str) -> Error {
        Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, msg.to_string()))
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::from(io_error);

        match error {
            Error::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_with_msg() {
        let error = not_found("file not found").with_msg("Custom message");

        match error {
            Error::WithMsg { msg, .. } => assert_eq!(msg, "Custom message"),
            _ => panic!("Expected WithMsg error"),
        }
    }

    #[test]
    fn test_error_with_debug_object_and_fn_name() {
        let error = not_found("file not found")
            .with_debug_object_and_fn_name("C:\\foo.txt", "append_entry");

        match error {
            Error::WithDebugObjAndFnName { fn_name, .. } => assert_eq!(fn_name, "append_entry"),
            _ => panic!("Expected WithDebugObjAndFnName error"),
        }
    }

    #[test]
    fn test_error_from_vec_flattens_nested() {
        let nested = not_found("a").chain(not_found("b"));
        let combined = Error::from(vec![nested, not_found("c")]);

        match combined {
            Error::LotsOfError(errors) => assert_eq!(errors.len(), 3),
            _ => panic!("Expected LotsOfError"),
        }
    }

    #[test]
    fn test_error_into_iter_single() {
        let mut iter = not_found("test").into_iter();
        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_thread_spawn_display() {
        let error = Error::thread_spawn(
            "archive-C",
            std::io::Error::new(std::io::ErrorKind::WouldBlock, "no threads left"),
        );
        let error_str = error.to_string();
        assert!(error_str.contains("archive-C"));
        assert!(error_str.contains("no threads left"));
    }

    #[test]
    fn test_error_with_msg_display_indents_inner() {
        let error = not_found("file not found").with_msg("Opening container failed");
        let error_str = error.to_string();

        assert!(error_str.starts_with("Opening container failed:\n"));
        assert!(error_str.contains("  file not found"));
    }
}
