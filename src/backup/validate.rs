//! Validation functions for configuration values.

use validator::ValidationError;

use std::path::Path;

pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return std::fs::create_dir_all(dir).map_err(|e| {
            ValidationError::new("InvalidDirectory").with_message(
                format!("cannot create or access out_dir path {:?}: {}", dir, e).into(),
            )
        });
    }

    Ok(())
}

fn validate_writable<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    let md = std::fs::metadata(dir).map_err(|e| {
        ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot access metadata for {:?}: {}", dir, e).into())
    })?;
    if !md.is_dir() {
        Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("{:?} is not a directory", dir).into()))
    } else if md.permissions().readonly() {
        Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot write to dir {:?}", dir).into()))
    } else {
        Ok(())
    }
}

/// Accepts a writable directory, or a missing path whose nearest existing
/// ancestor is a writable directory. Never creates anything.
pub fn validate_writable_or_creatable_dir<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        return validate_writable(dir);
    }

    let ancestor = dir
        .ancestors()
        .skip(1)
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .unwrap_or(Path::new("."));
    validate_writable(ancestor).map_err(|e| {
        ValidationError::new("InvalidDirectory").with_message(
            format!("cannot create out_dir path {:?}: {}", dir, e).into(),
        )
    })
}
