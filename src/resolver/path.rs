//! Relative path normalization
//!
//! Cleaning is purely lexical. The result never starts with `/`, never
//! contains `.` or `..` segments and never climbs above the mount root.

use crate::error::{GatewayError, Result};

/// Normalize a client-supplied relative path.
///
/// `a//b/./c.mp4` and `/a/b/c.mp4` both clean to `a/b/c.mp4`; `a/x/../b.mp4`
/// cleans to `a/b.mp4`. A `..` that would leave the root is rejected.
pub fn clean_relative_path(raw: &str) -> Result<String> {
    if raw.contains('\0') {
        return Err(GatewayError::InvalidPath(raw.to_string()));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(GatewayError::InvalidPath(raw.to_string()));
                }
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(GatewayError::InvalidPath(raw.to_string()));
    }

    Ok(segments.join("/"))
}
