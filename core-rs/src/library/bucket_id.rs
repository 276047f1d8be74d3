// library/bucket_id.rs - Bucket naming rules and id generation
//
// Bucket and project names become directory and file names, so they are
// restricted to a portable character set. Shared bucket ids are the
// bucket name plus an 8 hex digit suffix derived from the name, the
// owning project, the creation time and a random salt.

use chrono::Utc;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use crate::errors::{LizzyError, Result};

/// Maximum length of a bucket or project name
pub const MAX_NAME_LEN: usize = 64;

/// Maximum length of a bucket id: a full-length name plus "_" and 8 hex digits
pub const MAX_BUCKET_ID_LEN: usize = MAX_NAME_LEN + 9;

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("name pattern is valid")
});

static BUCKET_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*_[0-9a-f]{8}$").expect("bucket id pattern is valid")
});

/// Validate a bucket or project name
///
/// `kind` is only used in the error message ("bucket", "project").
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LizzyError::InvalidName(format!("{} name cannot be empty", kind)));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(LizzyError::InvalidName(format!(
            "{} name '{}' exceeds {} characters",
            kind, name, MAX_NAME_LEN
        )));
    }
    if !NAME_PATTERN.is_match(name) {
        return Err(LizzyError::InvalidName(format!(
            "{} name '{}' may only contain letters, digits, '_', '.', '-' and must start with a letter or digit",
            kind, name
        )));
    }
    Ok(())
}

/// Validate a bucket id before it is joined onto a path
///
/// Accepts generated ids and legacy ids (plain names) up to
/// `MAX_BUCKET_ID_LEN` characters of the portable name set.
pub fn validate_bucket_id(bucket_id: &str) -> Result<()> {
    if bucket_id.is_empty() {
        return Err(LizzyError::InvalidName("bucket id cannot be empty".to_string()));
    }
    if bucket_id.len() > MAX_BUCKET_ID_LEN {
        return Err(LizzyError::InvalidName(format!(
            "bucket id '{}' exceeds {} characters",
            bucket_id, MAX_BUCKET_ID_LEN
        )));
    }
    if !NAME_PATTERN.is_match(bucket_id) {
        return Err(LizzyError::InvalidName(format!(
            "bucket id '{}' may only contain letters, digits, '_', '.', '-' and must start with a letter or digit",
            bucket_id
        )));
    }
    Ok(())
}

/// Check that a string has the shape of a generated bucket id
pub fn looks_like_bucket_id(candidate: &str) -> bool {
    BUCKET_ID_PATTERN.is_match(candidate)
}

/// Generate a shared bucket id: `<name>_<8 hex>`
pub fn generate_bucket_id(bucket_name: &str, project_name: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S%.f");
    let salt: u64 = rand::thread_rng().gen();

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(format!("{}_{}_{}_{}", bucket_name, project_name, timestamp, salt).as_bytes());

    format!("{}_{:08x}", bucket_name, hasher.finalize())
}

/// Bucket name part of a generated id (the id itself if it has no suffix)
pub fn name_from_bucket_id(bucket_id: &str) -> &str {
    if looks_like_bucket_id(bucket_id) {
        // Suffix is "_" + 8 ASCII hex digits
        &bucket_id[..bucket_id.len() - 9]
    } else {
        bucket_id
    }
}
