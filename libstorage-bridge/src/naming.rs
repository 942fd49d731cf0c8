//! Resource identifiers, hierarchical names and update masks.
//!
//! A resource name looks like `//storage.rk8s.io/volumes/vol1` or, for
//! resources scoped under a parent,
//! `//storage.rk8s.io/remoteControllers/c1/paths/p1`.  The final segment is
//! the *system id*: the flat identifier the engine knows the device by.

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Prefix of every resource name issued by the bridge.
pub const NAME_DOMAIN: &str = "//storage.rk8s.io";

/// Wildcard update-mask path selecting every mutable field.
pub const MASK_WILDCARD: &str = "*";

const MAX_ID_LEN: usize = 63;

/// Return `user` after validating it, or a fresh system id when it is empty.
///
/// User ids may only contain lowercase ASCII letters, digits and `-`.
pub fn allocate_resource_id(user: &str) -> Result<String, BridgeError> {
    if user.is_empty() {
        return Ok(uuid::Uuid::new_v4().to_string());
    }
    if let Some((pos, c)) = user
        .chars()
        .enumerate()
        .find(|&(_, c)| !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'))
    {
        return Err(BridgeError::validation(format!(
            "invalid character '{c}' at position {pos} in resource id '{user}'"
        )));
    }
    Ok(user.to_owned())
}

/// Name of the top-level collection `collection`.
pub fn collection_parent(collection: &str) -> String {
    format!("{NAME_DOMAIN}/{collection}")
}

/// Join `parent` and `id` into a resource name.
pub fn build_resource_name(parent: &str, id: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), id)
}

/// The final segment of `name`.
pub fn resolve_system_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Check that `name` sits directly under `parent`.
pub fn validate_parent(name: &str, parent: &str) -> Result<(), BridgeError> {
    match name.rsplit_once('/') {
        Some((p, _)) if p == parent.trim_end_matches('/') => Ok(()),
        _ => Err(BridgeError::validation(format!(
            "resource name '{name}' does not belong under {parent}"
        ))),
    }
}

/// Check that `name` is non-empty and ends in a DNS-label-like leaf.
pub fn validate_resource_name(name: &str) -> Result<(), BridgeError> {
    if name.is_empty() {
        return Err(BridgeError::validation("missing required field: name"));
    }
    let leaf = resolve_system_id(name);
    if leaf.is_empty() {
        return Err(BridgeError::validation(format!(
            "resource name '{name}' has an empty id segment"
        )));
    }
    if leaf.len() > MAX_ID_LEN {
        return Err(BridgeError::validation(format!(
            "resource id '{leaf}' is longer than {MAX_ID_LEN} characters"
        )));
    }
    if leaf.starts_with('-') || leaf.ends_with('-') {
        return Err(BridgeError::validation(format!(
            "resource id '{leaf}' must not start or end with '-'"
        )));
    }
    if !leaf
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(BridgeError::validation(format!(
            "resource id '{leaf}' may only contain lowercase letters, digits and '-'"
        )));
    }
    Ok(())
}

/// Fields selected for an update.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldMask {
    #[serde(default)]
    pub paths: Vec<String>,
}

impl FieldMask {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the mask selects every mutable field.
    pub fn is_full(&self) -> bool {
        self.paths.is_empty() || self.paths.iter().all(|p| p == MASK_WILDCARD)
    }

    /// Whether `field` is selected.
    pub fn selects(&self, field: &str) -> bool {
        self.is_full() || self.names(field)
    }

    /// Whether `field` is listed by name rather than through the wildcard.
    pub fn names(&self, field: &str) -> bool {
        self.paths.iter().any(|p| p == field)
    }

    /// Whether the secret `field` should be overwritten.
    ///
    /// Reads return secrets blanked, so under the wildcard a secret is only
    /// taken when the update carries one.  Naming the field always takes it,
    /// which is how a secret is cleared.
    pub fn selects_secret(&self, field: &str, supplied: bool) -> bool {
        self.names(field) || (self.is_full() && supplied)
    }
}

/// Reject a mask that mixes the wildcard with other paths or names a field
/// outside `allowed`.
pub fn validate_field_mask(mask: &FieldMask, allowed: &[&str]) -> Result<(), BridgeError> {
    let has_wildcard = mask.paths.iter().any(|p| p == MASK_WILDCARD);
    if has_wildcard && mask.paths.iter().any(|p| p != MASK_WILDCARD) {
        return Err(BridgeError::validation(
            "update mask must not mix '*' with other field paths",
        ));
    }
    if let Some(unknown) = mask
        .paths
        .iter()
        .find(|p| p.as_str() != MASK_WILDCARD && !allowed.contains(&p.as_str()))
    {
        return Err(BridgeError::validation(format!(
            "update mask names unknown or immutable field '{unknown}'"
        )));
    }
    Ok(())
}
