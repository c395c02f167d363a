//! Validation functions for configuration values.
//!
//! Custom `validator` functions for the job file, the completion log location
//! and the backup system address.

use validator::ValidationError;

use std::path::Path;

pub fn validate_file_exist<P: AsRef<Path>>(file: P) -> Result<(), ValidationError> {
    let file = file.as_ref();
    if !file.exists() {
        return Err(ValidationError::new("InvalidFile")
            .with_message(format!("{:?} not found", file).into()));
    }
    if !file.is_file() {
        return Err(ValidationError::new("InvalidFile")
            .with_message(format!("{:?} is not a file", file).into()));
    }

    Ok(())
}

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
                format!("cannot create or access directory {:?}: {}", dir, e).into(),
            )
        });
    }

    Ok(())
}

pub fn validate_writable_dir<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    validate_dir_exist_or_created(dir)?;
    let md = std::fs::metadata(dir).map_err(|e| {
        ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot access metadata for {:?}: {}", dir, e).into())
    })?;
    if md.permissions().readonly() {
        Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot write to dir {:?}", dir).into()))
    } else {
        Ok(())
    }
}

/// The log file itself may not exist yet, its directory must be writable.
pub fn validate_log_file<P: AsRef<Path>>(file: P) -> Result<(), ValidationError> {
    let file = file.as_ref();
    if file.is_dir() {
        return Err(ValidationError::new("InvalidLogFile")
            .with_message(format!("{:?} is a directory", file).into()));
    }
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => validate_writable_dir(parent),
        _ => validate_writable_dir("."),
    }
}

pub fn validate_address<S: AsRef<str>>(address: S) -> Result<(), ValidationError> {
    let address = address.as_ref();
    if address.trim().is_empty() || address.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("InvalidAddress")
            .with_message(format!("Invalid backup system address: {address:?}").into()));
    }

    Ok(())
}
