//! Owner and group resolution against the system identity database.

use nix::unistd::{Group, User};

use crate::error::PermissionError;

/// Resolves a user name or numeric uid to a uid.
///
/// # Errors
///
/// Returns `UnknownOwner` if no such user exists, or `LookupFailed` if the
/// identity database cannot be queried.
pub fn resolve_owner(name_or_id: &str) -> Result<u32, PermissionError> {
    let name = name_or_id.trim();
    if let Ok(uid) = name.parse::<u32>() {
        return Ok(uid);
    }
    if name.is_empty() {
        return Err(PermissionError::UnknownOwner {
            name: name.to_string(),
        });
    }

    match User::from_name(name) {
        Ok(Some(user)) => Ok(user.uid.as_raw()),
        Ok(None) => Err(PermissionError::UnknownOwner {
            name: name.to_string(),
        }),
        Err(e) => Err(PermissionError::LookupFailed {
            name: name.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Resolves a group name or numeric gid to a gid.
///
/// # Errors
///
/// Returns `UnknownGroup` if no such group exists, or `LookupFailed` if the
/// identity database cannot be queried.
pub fn resolve_group(name_or_id: &str) -> Result<u32, PermissionError> {
    let name = name_or_id.trim();
    if let Ok(gid) = name.parse::<u32>() {
        return Ok(gid);
    }
    if name.is_empty() {
        return Err(PermissionError::UnknownGroup {
            name: name.to_string(),
        });
    }

    match Group::from_name(name) {
        Ok(Some(group)) => Ok(group.gid.as_raw()),
        Ok(None) => Err(PermissionError::UnknownGroup {
            name: name.to_string(),
        }),
        Err(e) => Err(PermissionError::LookupFailed {
            name: name.to_string(),
            message: e.to_string(),
        }),
    }
}
