//! Crate error type and the context helpers used to annotate failures with
//! the path or config value being processed.

use std::fmt::Debug;
pub mod error;
pub mod result;

/// Wraps an error with the object being processed and the function that
/// failed, usually filled in with `function_path!()`.
pub trait WithDebugObjectAndFnName<S: Into<String>, O: Debug + 'static> {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self;
}

/// Prefixes an error with a human readable message.
pub trait WithMsg<S: Into<String>> {
    fn with_msg(self, msg: S) -> Self;
}
