//! Node path helpers
//!
//! Paths are absolute and `/`-separated. The root `/` always exists; every
//! other path has no trailing slash and no empty, `.` or `..` segments.

use crate::error::StoreError;

/// The root node
pub const ROOT: &str = "/";

/// Check that a path is well-formed
pub fn validate(path: &str) -> Result<(), StoreError> {
    let invalid = |reason| StoreError::InvalidPath {
        path: path.to_string(),
        reason,
    };

    if !path.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if path == ROOT {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(invalid("must not end with '/'"));
    }
    if path.contains('\0') {
        return Err(invalid("must not contain NUL"));
    }
    for segment in path[1..].split('/') {
        match segment {
            "" => return Err(invalid("empty segment")),
            "." | ".." => return Err(invalid("relative segment")),
            _ => {}
        }
    }
    Ok(())
}

/// Parent of a path, `None` for the root
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of a path
pub fn name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Join a child name onto a parent path
pub fn join(parent: &str, child: &str) -> String {
    if parent == ROOT {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Proper ancestors of a path, shallowest first, excluding the root
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = parent(path);
    while let Some(p) = current {
        if p == ROOT {
            break;
        }
        out.push(p);
        current = parent(p);
    }
    out.reverse();
    out
}
