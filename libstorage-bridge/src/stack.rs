//! Volume composition stacks.
//!
//! Every backend volume starts a *lineage*: an ordered stack of devices with
//! the backend device at the bottom and overlay transforms (encryption, QoS)
//! above it.  The engine chains transforms the same way, so teardown must be
//! strictly LIFO.
//!
//! Stacks live in a [`StackArena`].  Nodes carry no reference to their stack;
//! the arena keeps a membership map from resource name to [`StackId`], and
//! ids carry a generation so an id kept across a release never resolves to a
//! newer stack in the same slot.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::BridgeError;

/// Engine device kinds that may sit at the bottom of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    Aio,
    Null,
    Malloc,
}

/// Transforms that may be layered on top of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverlayKind {
    Crypto,
    Qos,
}

impl fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crypto => f.write_str("crypto"),
            Self::Qos => f.write_str("qos"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Backend(BackendKind),
    Overlay(OverlayKind),
}

/// One element of a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeNode {
    /// Resource that owns this node.
    pub resource_name: String,
    /// Engine device the node exposes.  QoS nodes alias the device beneath.
    pub bdev_name: String,
    pub kind: NodeKind,
}

impl VolumeNode {
    pub fn backend(resource_name: impl Into<String>, bdev_name: impl Into<String>, kind: BackendKind) -> Self {
        Self {
            resource_name: resource_name.into(),
            bdev_name: bdev_name.into(),
            kind: NodeKind::Backend(kind),
        }
    }

    pub fn overlay(resource_name: impl Into<String>, bdev_name: impl Into<String>, kind: OverlayKind) -> Self {
        Self {
            resource_name: resource_name.into(),
            bdev_name: bdev_name.into(),
            kind: NodeKind::Overlay(kind),
        }
    }
}

/// LIFO of devices for a single lineage.
#[derive(Debug, Default)]
pub struct VolumeStack {
    nodes: Vec<VolumeNode>,
}

impl VolumeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `node` if the layering rules allow it.
    pub fn push(&mut self, node: VolumeNode) -> Result<(), BridgeError> {
        self.check_push(&node)?;
        self.nodes.push(node);
        Ok(())
    }

    /// Check the layering rules for `node` without pushing it.
    pub fn check_push(&self, node: &VolumeNode) -> Result<(), BridgeError> {
        match (self.nodes.is_empty(), node.kind) {
            (true, NodeKind::Backend(_)) => Ok(()),
            (true, NodeKind::Overlay(kind)) => Err(BridgeError::validation(format!(
                "{kind} overlay {} needs a backend device beneath it",
                node.resource_name
            ))),
            (false, NodeKind::Backend(_)) => Err(BridgeError::validation(format!(
                "backend device {} cannot be layered on another device",
                node.resource_name
            ))),
            (false, NodeKind::Overlay(kind)) if self.has_kind(NodeKind::Overlay(kind)) => {
                Err(BridgeError::conflict(format!(
                    "a {kind} overlay already exists on {}",
                    self.base_name().unwrap_or_default()
                )))
            }
            (false, NodeKind::Overlay(_)) => Ok(()),
        }
    }

    /// Remove the node owned by `resource_name`, which must be on top.
    pub fn pop(&mut self, resource_name: &str) -> Result<VolumeNode, BridgeError> {
        self.check_pop(resource_name)?;
        self.nodes
            .pop()
            .ok_or_else(|| BridgeError::conflict("volume stack is empty"))
    }

    /// Check that `resource_name` is the current top.
    pub fn check_pop(&self, resource_name: &str) -> Result<(), BridgeError> {
        match self.top() {
            None => Err(BridgeError::conflict("volume stack is empty")),
            Some(top) if top.resource_name == resource_name => Ok(()),
            Some(top) => Err(BridgeError::conflict(format!(
                "{resource_name} is not on top of stack, {} is layered above it",
                top.resource_name
            ))),
        }
    }

    pub fn top(&self) -> Option<&VolumeNode> {
        self.nodes.last()
    }

    pub fn has_kind(&self, kind: NodeKind) -> bool {
        self.nodes.iter().any(|n| n.kind == kind)
    }

    /// Resource name of the backend node.
    pub fn base_name(&self) -> Option<&str> {
        self.nodes.first().map(|n| n.resource_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[VolumeNode] {
        &self.nodes
    }
}

/// Handle to a stack inside a [`StackArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackId {
    index: usize,
    generation: u64,
}

/// A stack behind the async mutex that serializes its push/pop.
pub type SharedStack = Arc<AsyncMutex<VolumeStack>>;

#[derive(Debug)]
struct Slot {
    generation: u64,
    stack: Option<SharedStack>,
}

#[derive(Debug, Default)]
struct ArenaInner {
    slots: Vec<Slot>,
    free: Vec<usize>,
    members: HashMap<String, StackId>,
}

/// Owner of every lineage stack.
///
/// The arena's own mutex only guards slot bookkeeping and is never held
/// across an await; engine calls run under the per-stack async mutex.
#[derive(Debug, Default)]
pub struct StackArena {
    inner: Mutex<ArenaInner>,
}

impl StackArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new lineage whose bottom node is `root`.
    pub fn create(&self, root: VolumeNode) -> Result<StackId, BridgeError> {
        let mut stack = VolumeStack::new();
        let name = root.resource_name.clone();
        stack.push(root)?;
        let shared = Arc::new(AsyncMutex::new(stack));

        let mut inner = self.lock();
        if inner.members.contains_key(&name) {
            return Err(BridgeError::conflict(format!(
                "{name} already belongs to a volume stack"
            )));
        }
        let id = match inner.free.pop() {
            Some(index) => {
                let slot = &mut inner.slots[index];
                slot.stack = Some(shared);
                StackId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                inner.slots.push(Slot {
                    generation: 0,
                    stack: Some(shared),
                });
                StackId {
                    index: inner.slots.len() - 1,
                    generation: 0,
                }
            }
        };
        inner.members.insert(name, id);
        Ok(id)
    }

    /// Lineage that `resource_name` belongs to.
    pub fn lineage_of(&self, resource_name: &str) -> Option<(StackId, SharedStack)> {
        let inner = self.lock();
        let id = *inner.members.get(resource_name)?;
        Self::resolve(&inner, id).map(|stack| (id, stack))
    }

    /// Stack behind `id`, unless it has been released.
    pub fn get(&self, id: StackId) -> Option<SharedStack> {
        Self::resolve(&self.lock(), id)
    }

    /// Record that `resource_name` now has a node in stack `id`.
    pub fn attach(&self, resource_name: &str, id: StackId) {
        self.lock().members.insert(resource_name.to_owned(), id);
    }

    /// Forget the membership of `resource_name`.
    pub fn detach(&self, resource_name: &str) {
        self.lock().members.remove(resource_name);
    }

    /// Free the slot of `id`.  Ids minted before the release stop resolving.
    pub fn release(&self, id: StackId) {
        let mut inner = self.lock();
        let Some(slot) = inner.slots.get_mut(id.index) else {
            return;
        };
        if slot.generation != id.generation || slot.stack.is_none() {
            return;
        }
        slot.stack = None;
        slot.generation += 1;
        inner.free.push(id.index);
        inner.members.retain(|_, member| *member != id);
    }

    /// Number of live stacks.
    pub fn len(&self) -> usize {
        self.lock().slots.iter().filter(|s| s.stack.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve(inner: &ArenaInner, id: StackId) -> Option<SharedStack> {
        let slot = inner.slots.get(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.stack.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ArenaInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
