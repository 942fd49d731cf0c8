//! Cross-resource checks between remote controllers and their paths.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::BridgeError;
use crate::naming::{build_resource_name, collection_parent};
use crate::types::{Path, RemoteController, Resource, ResourceKind};

/// Full resource name of a controller given either its name or its bare id.
pub fn controller_name(parent: &str) -> String {
    if parent.contains('/') {
        parent.trim_end_matches('/').to_owned()
    } else {
        build_resource_name(
            &collection_parent(ResourceKind::RemoteController.collection()),
            parent,
        )
    }
}

/// Name prefix under which the paths of `controller` live.
pub fn paths_parent(controller: &str) -> String {
    build_resource_name(controller, ResourceKind::Path.collection())
}

/// Controller that owns the path named `path_name`, if the name is shaped
/// like `<controller>/paths/<id>`.
pub fn owning_controller(path_name: &str) -> Option<&str> {
    let (parent, _) = path_name.rsplit_once('/')?;
    parent.strip_suffix(&format!("/{}", ResourceKind::Path.collection()))
}

/// Reject a path whose transport runs over a different channel than the
/// controller's.
pub fn check_transport(controller: &RemoteController, path: &Path) -> Result<(), BridgeError> {
    if controller.transport.channel() != path.transport.channel() {
        return Err(BridgeError::validation(format!(
            "path transport {} does not match transport {} of controller {}",
            path.transport.engine_name(),
            controller.transport.engine_name(),
            controller.name(),
        )));
    }
    Ok(())
}

/// Engine `multipath` argument for the next path of `controller`.
///
/// The first path of a controller carries none; every later one carries the
/// controller's policy.
pub fn multipath_param(controller: &RemoteController, existing_paths: usize) -> Option<String> {
    (existing_paths > 0).then(|| controller.multipath.engine_name().to_owned())
}

/// Refuse to delete a controller that still has paths.
pub fn check_no_paths(controller: &str, paths: usize) -> Result<(), BridgeError> {
    if paths > 0 {
        return Err(BridgeError::conflict(format!(
            "remote controller {controller} still has {paths} path(s) attached"
        )));
    }
    Ok(())
}

/// Owner-only temporary file holding a TLS pre-shared key.
///
/// The file is removed when the value is dropped.
#[derive(Debug)]
pub struct PskFile {
    file: NamedTempFile,
}

impl PskFile {
    pub fn write(key: &[u8]) -> Result<Self, BridgeError> {
        let mut file = tempfile::Builder::new()
            .prefix("sbridge-psk-")
            .tempfile()
            .map_err(BridgeError::infrastructure)?;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(BridgeError::infrastructure)?;
        file.write_all(key).map_err(BridgeError::infrastructure)?;
        file.flush().map_err(BridgeError::infrastructure)?;
        debug!(path = %file.path().display(), "wrote psk file");
        Ok(Self { file })
    }

    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }

    /// Path as passed to the engine.
    pub fn path_string(&self) -> String {
        self.file.path().to_string_lossy().into_owned()
    }
}
