//! # Input Validation Utilities
//!
//! Validation helpers for the values that arrive on the unpublish path:
//! package names, version strings and tarball filenames. None of these
//! functions touch storage.

use crate::types::Revision;

/// Maximum allowed package name length (npm limit)
pub const MAX_PACKAGE_NAME_LENGTH: usize = 214;

/// Maximum allowed version string length
pub const MAX_VERSION_LENGTH: usize = 256;

/// Error types for validation failures
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Input too long: {actual} exceeds maximum {max}")]
    TooLong { actual: usize, max: usize },

    #[error("Input too short: {actual} is below minimum {min}")]
    TooShort { actual: usize, min: usize },

    #[error("Invalid characters in input: {input}")]
    InvalidCharacters { input: String },

    #[error("Invalid format: {reason}")]
    InvalidFormat { reason: String },

    #[error("Contains control characters")]
    ControlCharacters,
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate an npm package name, scoped (`@scope/name`) or not.
pub fn validate_package_name(name: &str) -> ValidationResult<()> {
    if name.is_empty() {
        return Err(ValidationError::TooShort { actual: 0, min: 1 });
    }

    if name.len() > MAX_PACKAGE_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            actual: name.len(),
            max: MAX_PACKAGE_NAME_LENGTH,
        });
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(ValidationError::ControlCharacters);
    }

    let bare = match name.strip_prefix('@') {
        Some(scoped) => {
            let (scope, bare) = scoped
                .split_once('/')
                .ok_or_else(|| ValidationError::InvalidFormat {
                    reason: "scoped package names must look like @scope/name".to_string(),
                })?;
            validate_name_segment(scope, name)?;
            bare
        }
        None => name,
    };
    validate_name_segment(bare, name)
}

fn validate_name_segment(segment: &str, full: &str) -> ValidationResult<()> {
    if segment.is_empty() {
        return Err(ValidationError::TooShort { actual: 0, min: 1 });
    }

    if segment.starts_with('.') || segment.starts_with('_') {
        return Err(ValidationError::InvalidFormat {
            reason: "npm package names cannot start with . or _".to_string(),
        });
    }

    if segment.to_lowercase() != segment {
        return Err(ValidationError::InvalidFormat {
            reason: "npm package names must be lowercase".to_string(),
        });
    }

    if !segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '~'))
    {
        return Err(ValidationError::InvalidCharacters {
            input: full.to_string(),
        });
    }

    Ok(())
}

/// Parse a version string, accepting only full semantic versions.
pub fn parse_version(raw: &str) -> ValidationResult<semver::Version> {
    if raw.len() > MAX_VERSION_LENGTH {
        return Err(ValidationError::TooLong {
            actual: raw.len(),
            max: MAX_VERSION_LENGTH,
        });
    }

    semver::Version::parse(raw).map_err(|e| ValidationError::InvalidFormat {
        reason: format!("not a semantic version: {e}"),
    })
}

/// Parse a revision token supplied by a caller.
pub fn parse_revision(raw: &str) -> ValidationResult<Revision> {
    raw.parse().map_err(|e: crate::types::RevisionParseError| {
        ValidationError::InvalidFormat {
            reason: e.to_string(),
        }
    })
}

/// Extract the version from an npm tarball filename.
///
/// npm names tarballs `<unscoped-name>-<version>.tgz`, so `@scope/pkg` at
/// `1.2.3` downloads as `pkg-1.2.3.tgz`. Returns `None` when the filename
/// does not belong to `package`; the returned string is not yet checked
/// for semver validity.
pub fn version_from_filename<'a>(package: &str, filename: &'a str) -> Option<&'a str> {
    let unscoped = package.rsplit('/').next().unwrap_or(package);
    let stem = filename.strip_suffix(".tgz")?;
    let version = stem.strip_prefix(unscoped)?.strip_prefix('-')?;
    (!version.is_empty()).then_some(version)
}
