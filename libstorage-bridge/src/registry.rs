//! Generic resource registry.
//!
//! [`ResourceRegistry`] owns the canonical copy of every resource of one
//! kind and runs the uniform Create/Get/Update/Delete/List/Stats flows.
//! Anything kind specific (engine calls, composition stack bookkeeping,
//! referential checks) is delegated to a [`Provisioner`].
//!
//! Values never leave the registry by reference: callers always receive a
//! redacted clone, and the stored value is replaced wholesale on update.
//!
//! Mutating flows hold a per-name async lock from [`KeyedLocks`] across the
//! engine calls they issue, so two requests for the same name are
//! serialized while requests for different names proceed in parallel.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::error::{AdapterError, BridgeError};
use crate::naming::{
    FieldMask, allocate_resource_id, build_resource_name, validate_field_mask, validate_parent,
    validate_resource_name,
};
use crate::pagination::{PageTokenStore, extract_pagination, limit_pagination};
use crate::store::KvStore;
use crate::transport::CallContext;
use crate::types::{ListRequest, ListResponse, Resource, VolumeStats};

// ---------------------------------------------------------------------------
// Keyed locks
// ---------------------------------------------------------------------------

type LockTable = DashMap<String, Arc<AsyncMutex<()>>>;

/// Per-name async mutexes.
///
/// An entry exists only while some task holds or waits for it; the last
/// guard to drop removes it from the table.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    table: Arc<LockTable>,
}

/// Exclusive hold on one name of a [`KeyedLocks`].
#[derive(Debug)]
pub struct KeyedGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<LockTable>,
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.table
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyedGuard {
        let lock = self
            .table
            .entry(key.to_owned())
            .or_default()
            .value()
            .clone();
        let guard = lock.lock_owned().await;
        KeyedGuard {
            key: key.to_owned(),
            guard: Some(guard),
            table: Arc::clone(&self.table),
        }
    }

    /// Lock every key in order, skipping repeats.
    ///
    /// Callers pass a resource's own name first and then the names it
    /// depends on, so the acquisition order always follows references.
    pub async fn lock_all<I>(&self, keys: I) -> Vec<KeyedGuard>
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let mut guards = Vec::new();
        for key in keys {
            if seen.insert(key.clone()) {
                guards.push(self.lock(&key).await);
            }
        }
        guards
    }

    /// Number of names currently locked or waited on.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Provisioner hooks
// ---------------------------------------------------------------------------

/// What happened to the engine state when an update failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The old device was never torn down.
    Untouched,
    /// The old device was torn down and brought back.
    Restored,
    /// The old device was torn down and could not be brought back.
    Lost,
}

/// Failure of [`Provisioner::replace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceError {
    pub error: BridgeError,
    pub outcome: ReplaceOutcome,
}

impl ReplaceError {
    pub fn untouched(error: BridgeError) -> Self {
        Self {
            error,
            outcome: ReplaceOutcome::Untouched,
        }
    }
}

/// Kind-specific half of the registry flows.
#[async_trait]
pub trait Provisioner<T: Resource>: Send + Sync {
    /// Names that must be locked together with the resource's own name.
    fn dependencies(&self, _resource: &T) -> Vec<String> {
        Vec::new()
    }

    /// Create the engine state for `resource`.  May fill in engine-assigned
    /// fields.
    async fn provision(&self, ctx: &CallContext, resource: &mut T) -> Result<(), BridgeError>;

    /// Tear down the engine state for `resource`.  With `allow_missing`, an
    /// engine report that the device is already gone counts as success.
    async fn deprovision(
        &self,
        ctx: &CallContext,
        resource: &T,
        allow_missing: bool,
    ) -> Result<(), BridgeError>;

    /// Move the engine state from `old` to `new`.
    ///
    /// Tears `old` down first.  If bringing `new` up fails, `old` is
    /// provisioned again and the outcome says whether that worked.
    async fn replace(&self, ctx: &CallContext, old: &T, new: &mut T) -> Result<(), ReplaceError> {
        self.deprovision(ctx, old, false)
            .await
            .map_err(ReplaceError::untouched)?;

        let Err(error) = self.provision(ctx, new).await else {
            return Ok(());
        };
        let mut restore = old.clone();
        let outcome = match self.provision(ctx, &mut restore).await {
            Ok(()) => ReplaceOutcome::Restored,
            Err(e) => {
                warn!(name = %old.name(), error = %e, "failed to restore resource after update failure");
                ReplaceOutcome::Lost
            }
        };
        Err(ReplaceError { error, outcome })
    }

    /// Precondition checked under lock before `deprovision`.
    async fn check_delete(&self, _resource: &T) -> Result<(), BridgeError> {
        Ok(())
    }

    /// Bring a stored copy up to date before it is returned from Get.
    async fn refresh(&self, _ctx: &CallContext, resource: T) -> Result<T, BridgeError> {
        Ok(resource)
    }

    /// Candidate set for List.  `stored` holds the registry entries under
    /// the listed parent.
    async fn gather(
        &self,
        _ctx: &CallContext,
        _parent: &str,
        stored: Vec<T>,
    ) -> Result<Vec<T>, BridgeError> {
        Ok(stored)
    }

    async fn stats(&self, _ctx: &CallContext, _resource: &T) -> Result<VolumeStats, BridgeError> {
        Ok(VolumeStats::UNAVAILABLE)
    }
}

/// Interpret the result of an engine destroy call for `device`.
///
/// The engine answers destroy calls with a boolean; `false` means it kept
/// the device.  A missing device is absorbed when `allow_missing` is set.
pub fn check_destroyed(
    device: &str,
    result: Result<bool, AdapterError>,
    allow_missing: bool,
) -> Result<(), BridgeError> {
    match result {
        Ok(true) => Ok(()),
        Ok(false) => Err(BridgeError::validation(format!(
            "could not delete {device}"
        ))),
        Err(e) if allow_missing && e.is_no_device() => {
            debug!(%device, "device already gone");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Canonical store for resources of kind `T`.
pub struct ResourceRegistry<T: Resource> {
    items: DashMap<String, T>,
    locks: Arc<KeyedLocks>,
    tokens: Arc<PageTokenStore>,
    store: Option<Arc<dyn KvStore>>,
}

impl<T: Resource> ResourceRegistry<T> {
    /// `locks` and `tokens` are shared between the registries of a bridge so
    /// that dependency locks span kinds.
    pub fn new(locks: Arc<KeyedLocks>, tokens: Arc<PageTokenStore>) -> Self {
        Self {
            items: DashMap::new(),
            locks,
            tokens,
            store: None,
        }
    }

    /// Write every change through to `store`.
    pub fn with_store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Stored copy of `name`, unredacted.
    pub fn lookup(&self, name: &str) -> Option<T> {
        self.items.get(name).map(|e| e.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    /// Number of stored resources matching `pred`.
    pub fn count_where<F>(&self, pred: F) -> usize
    where
        F: Fn(&T) -> bool,
    {
        self.items.iter().filter(|e| pred(e.value())).count()
    }

    /// Stored resources matching `pred`, unredacted.
    pub fn find_all<F>(&self, pred: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.items
            .iter()
            .filter(|e| pred(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn not_found(name: &str) -> BridgeError {
        BridgeError::not_found(format!("{} {name} not found", T::KIND))
    }

    /// Keep `resource` and write it through, with secrets blanked, to the
    /// store.
    async fn save(&self, resource: T) -> Result<(), BridgeError> {
        let name = resource.name().to_owned();
        let encoded = match &self.store {
            Some(_) => Some(
                serde_json::to_vec(&resource.redacted()).map_err(BridgeError::infrastructure)?,
            ),
            None => None,
        };
        self.items.insert(name.clone(), resource);
        if let (Some(store), Some(bytes)) = (&self.store, encoded) {
            store.set(&name, bytes).await?;
        }
        Ok(())
    }

    async fn forget(&self, name: &str) -> Result<(), BridgeError> {
        self.items.remove(name);
        if let Some(store) = &self.store {
            store.delete(name).await?;
        }
        Ok(())
    }

    async fn lock_for<P>(&self, prov: &P, resource: &T) -> Vec<KeyedGuard>
    where
        P: Provisioner<T> + ?Sized,
    {
        let keys = std::iter::once(resource.name().to_owned()).chain(prov.dependencies(resource));
        self.locks.lock_all(keys).await
    }

    /// Create `payload` as `<parent>/<id>`.
    ///
    /// Creating a name that already exists returns the stored resource
    /// without touching the engine.
    #[instrument(skip_all, fields(kind = %T::KIND, %parent, %id))]
    pub async fn create<P>(
        &self,
        ctx: &CallContext,
        prov: &P,
        parent: &str,
        id: &str,
        mut payload: T,
    ) -> Result<T, BridgeError>
    where
        P: Provisioner<T> + ?Sized,
    {
        if parent.is_empty() {
            return Err(BridgeError::validation("missing required field: parent"));
        }
        payload.validate()?;
        let id = allocate_resource_id(id)?;
        let name = build_resource_name(parent, &id);
        validate_resource_name(&name)?;
        payload.set_name(name);

        let _guards = self.lock_for(prov, &payload).await;
        self.create_locked(ctx, prov, payload).await
    }

    async fn create_locked<P>(
        &self,
        ctx: &CallContext,
        prov: &P,
        mut payload: T,
    ) -> Result<T, BridgeError>
    where
        P: Provisioner<T> + ?Sized,
    {
        if let Some(existing) = self.lookup(payload.name()) {
            debug!(name = %existing.name(), "returning existing resource for idempotent create");
            return Ok(existing.redacted());
        }
        payload.normalize();
        prov.provision(ctx, &mut payload).await?;
        let created = payload.redacted();
        self.save(payload).await?;
        info!(name = %created.name(), "resource created");
        Ok(created)
    }

    /// Stored copy of `name`, refreshed by the provisioner.
    #[instrument(skip_all, fields(kind = %T::KIND, %name))]
    pub async fn get<P>(&self, ctx: &CallContext, prov: &P, name: &str) -> Result<T, BridgeError>
    where
        P: Provisioner<T> + ?Sized,
    {
        validate_resource_name(name)?;
        let stored = self.lookup(name).ok_or_else(|| Self::not_found(name))?;
        let current = prov.refresh(ctx, stored).await?;
        Ok(current.redacted())
    }

    /// Apply the fields of `payload` selected by `mask` to the stored
    /// resource named `payload.name()`, which must sit under `parent`.
    ///
    /// With `allow_missing` a missing resource is created from `payload`.
    #[instrument(skip_all, fields(kind = %T::KIND, name = %payload.name()))]
    pub async fn update<P>(
        &self,
        ctx: &CallContext,
        prov: &P,
        parent: &str,
        payload: T,
        mask: &FieldMask,
        allow_missing: bool,
    ) -> Result<T, BridgeError>
    where
        P: Provisioner<T> + ?Sized,
    {
        validate_field_mask(mask, T::MUTABLE_FIELDS)?;
        validate_resource_name(payload.name())?;
        validate_parent(payload.name(), parent)?;

        let lock_basis = self.lookup(payload.name()).unwrap_or_else(|| payload.clone());
        let _guards = self.lock_for(prov, &lock_basis).await;

        let Some(old) = self.lookup(payload.name()) else {
            if !allow_missing {
                return Err(Self::not_found(payload.name()));
            }
            payload.validate()?;
            return self.create_locked(ctx, prov, payload).await;
        };

        let mut new = old.clone();
        new.apply_mask(&payload, mask);
        new.validate()?;
        new.normalize();
        if new == old {
            debug!("update changes nothing");
            return Ok(old.redacted());
        }

        match prov.replace(ctx, &old, &mut new).await {
            Ok(()) => {
                let updated = new.redacted();
                self.save(new).await?;
                info!("resource updated");
                Ok(updated)
            }
            Err(ReplaceError { error, outcome }) => {
                if outcome == ReplaceOutcome::Lost {
                    warn!(error = %error, "dropping resource whose device could not be restored");
                    self.forget(old.name()).await?;
                }
                Err(error)
            }
        }
    }

    /// Delete `name`.  A missing name is an error unless `allow_missing`.
    #[instrument(skip_all, fields(kind = %T::KIND, %name, allow_missing = allow_missing))]
    pub async fn delete<P>(
        &self,
        ctx: &CallContext,
        prov: &P,
        name: &str,
        allow_missing: bool,
    ) -> Result<(), BridgeError>
    where
        P: Provisioner<T> + ?Sized,
    {
        validate_resource_name(name)?;
        let Some(basis) = self.lookup(name) else {
            return self.missing(name, allow_missing);
        };
        let _guards = self.lock_for(prov, &basis).await;

        let Some(stored) = self.lookup(name) else {
            return self.missing(name, allow_missing);
        };
        prov.check_delete(&stored).await?;
        prov.deprovision(ctx, &stored, allow_missing).await?;
        self.forget(name).await?;
        info!("resource deleted");
        Ok(())
    }

    fn missing(&self, name: &str, allow_missing: bool) -> Result<(), BridgeError> {
        if allow_missing {
            debug!("resource already absent");
            return Ok(());
        }
        Err(Self::not_found(name))
    }

    /// One page of the resources under `scope`, sorted by name.
    ///
    /// `req.parent` must be set; `scope` is the name prefix it resolves to.
    #[instrument(skip_all, fields(kind = %T::KIND, parent = %req.parent, page_size = req.page_size))]
    pub async fn list<P>(
        &self,
        ctx: &CallContext,
        prov: &P,
        req: &ListRequest,
        scope: &str,
    ) -> Result<ListResponse<T>, BridgeError>
    where
        P: Provisioner<T> + ?Sized,
    {
        if req.parent.is_empty() {
            return Err(BridgeError::validation("missing required field: parent"));
        }
        let (size, offset) = extract_pagination(req.page_size, &req.page_token, &self.tokens)?;

        let prefix = format!("{}/", scope.trim_end_matches('/'));
        let stored = self.find_all(|r| r.name().starts_with(&prefix));
        let mut items = prov.gather(ctx, scope, stored).await?;
        items.sort_by(|a, b| a.name().cmp(b.name()));

        let (page, has_more) = limit_pagination(items, offset, size);
        let next_page_token = if has_more {
            self.tokens.mint(offset + page.len())
        } else {
            String::new()
        };
        debug!(count = page.len(), has_more, "listed resources");
        Ok(ListResponse {
            items: page.iter().map(T::redacted).collect(),
            next_page_token,
        })
    }

    /// I/O counters of `name`.
    #[instrument(skip_all, fields(kind = %T::KIND, %name))]
    pub async fn stats<P>(
        &self,
        ctx: &CallContext,
        prov: &P,
        name: &str,
    ) -> Result<VolumeStats, BridgeError>
    where
        P: Provisioner<T> + ?Sized,
    {
        validate_resource_name(name)?;
        let stored = self.lookup(name).ok_or_else(|| Self::not_found(name))?;
        prov.stats(ctx, &stored).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::naming::collection_parent;
    use crate::store::MemoryKvStore;
    use crate::types::{Volume, VolumeSpec};

    /// Provisioner recording every engine-facing hook it runs.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail_provision_of: Mutex<Vec<String>>,
        fail_deprovision: Mutex<bool>,
        provisions: AtomicUsize,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn fail_provision_of(&self, filenames: &[&str]) {
            *self.fail_provision_of.lock().unwrap() =
                filenames.iter().map(|f| f.to_string()).collect();
        }
    }

    fn filename(v: &Volume) -> String {
        match &v.spec {
            VolumeSpec::Aio { filename, .. } => filename.clone(),
            _ => String::new(),
        }
    }

    #[async_trait]
    impl Provisioner<Volume> for Recorder {
        async fn provision(&self, _ctx: &CallContext, v: &mut Volume) -> Result<(), BridgeError> {
            self.provisions.fetch_add(1, Ordering::SeqCst);
            let file = filename(v);
            self.calls.lock().unwrap().push(format!("create {file}"));
            if self.fail_provision_of.lock().unwrap().contains(&file) {
                return Err(BridgeError::validation(format!("cannot open {file}")));
            }
            v.uuid = Some("u-1".into());
            Ok(())
        }

        async fn deprovision(
            &self,
            _ctx: &CallContext,
            v: &Volume,
            _allow_missing: bool,
        ) -> Result<(), BridgeError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("delete {}", filename(v)));
            if *self.fail_deprovision.lock().unwrap() {
                return Err(BridgeError::validation("could not delete vol1"));
            }
            Ok(())
        }
    }

    fn registry() -> ResourceRegistry<Volume> {
        ResourceRegistry::new(Arc::new(KeyedLocks::new()), Arc::new(PageTokenStore::new(16)))
    }

    fn aio(file: &str) -> Volume {
        Volume {
            name: String::new(),
            spec: VolumeSpec::Aio {
                filename: file.into(),
                block_size: 0,
                blocks_count: 0,
            },
            uuid: None,
        }
    }

    fn parent() -> String {
        collection_parent("volumes")
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let reg = registry();
        let prov = Recorder::default();
        let ctx = CallContext::background();

        let first = reg.create(&ctx, &prov, &parent(), "vol1", aio("/tmp/f")).await.unwrap();
        assert_eq!(first.name, "//storage.rk8s.io/volumes/vol1");
        assert_eq!(first.spec.block_size(), 512);
        assert_eq!(first.uuid.as_deref(), Some("u-1"));

        let second = reg.create(&ctx, &prov, &parent(), "vol1", aio("/tmp/other")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(prov.provisions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn create_rejects_bad_input_before_provisioning() {
        let reg = registry();
        let prov = Recorder::default();
        let ctx = CallContext::background();

        let err = reg.create(&ctx, &prov, &parent(), "Vol", aio("/tmp/f")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
        let err = reg.create(&ctx, &prov, "", "vol", aio("/tmp/f")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
        let err = reg.create(&ctx, &prov, &parent(), "vol", aio("")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
        assert!(prov.calls().is_empty());
    }

    #[tokio::test]
    async fn get_and_delete_semantics() {
        let reg = registry();
        let prov = Recorder::default();
        let ctx = CallContext::background();
        let name = "//storage.rk8s.io/volumes/vol1";

        assert!(matches!(reg.get(&ctx, &prov, name).await, Err(BridgeError::NotFound(_))));
        reg.delete(&ctx, &prov, name, true).await.unwrap();
        assert!(matches!(
            reg.delete(&ctx, &prov, name, false).await,
            Err(BridgeError::NotFound(_))
        ));

        reg.create(&ctx, &prov, &parent(), "vol1", aio("/tmp/f")).await.unwrap();
        assert_eq!(reg.get(&ctx, &prov, name).await.unwrap().name, name);

        *prov.fail_deprovision.lock().unwrap() = true;
        let err = reg.delete(&ctx, &prov, name, false).await.unwrap_err();
        assert_eq!(err, BridgeError::Validation("could not delete vol1".into()));
        assert!(reg.contains(name));

        *prov.fail_deprovision.lock().unwrap() = false;
        reg.delete(&ctx, &prov, name, false).await.unwrap();
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn update_under_mask() {
        let reg = registry();
        let prov = Recorder::default();
        let ctx = CallContext::background();
        reg.create(&ctx, &prov, &parent(), "vol1", aio("/tmp/a")).await.unwrap();

        let mut payload = aio("/tmp/b");
        payload.name = "//storage.rk8s.io/volumes/vol1".into();

        let err = reg
            .update(&ctx, &prov, &parent(), payload.clone(), &FieldMask::new(["*", "filename"]), false)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));

        let updated = reg
            .update(&ctx, &prov, &parent(), payload, &FieldMask::new(["filename"]), false)
            .await
            .unwrap();
        assert_eq!(filename(&updated), "/tmp/b");
        assert_eq!(prov.calls(), ["create /tmp/a", "delete /tmp/a", "create /tmp/b"]);
    }

    #[tokio::test]
    async fn update_missing_resource() {
        let reg = registry();
        let prov = Recorder::default();
        let ctx = CallContext::background();
        let mut payload = aio("/tmp/a");
        payload.name = "//storage.rk8s.io/volumes/vol9".into();

        let err = reg
            .update(&ctx, &prov, &parent(), payload.clone(), &FieldMask::default(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));

        let created = reg
            .update(&ctx, &prov, &parent(), payload, &FieldMask::default(), true)
            .await
            .unwrap();
        assert_eq!(created.name, "//storage.rk8s.io/volumes/vol9");
        assert!(reg.contains(&created.name));

        let mut stray = aio("/tmp/c");
        stray.name = "//storage.rk8s.io/remoteControllers/x".into();
        let err = reg
            .update(&ctx, &prov, &parent(), stray, &FieldMask::default(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
        assert!(!reg.contains("//storage.rk8s.io/remoteControllers/x"));
        assert_eq!(prov.provisions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn update_destroy_failure_keeps_old_copy() {
        let reg = registry();
        let prov = Recorder::default();
        let ctx = CallContext::background();
        let old = reg.create(&ctx, &prov, &parent(), "vol1", aio("/tmp/a")).await.unwrap();

        *prov.fail_deprovision.lock().unwrap() = true;
        let mut payload = aio("/tmp/b");
        payload.name = old.name.clone();
        let err = reg
            .update(&ctx, &prov, &parent(), payload, &FieldMask::default(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
        assert_eq!(reg.lookup(&old.name), Some(old));
        assert_eq!(prov.calls(), ["create /tmp/a", "delete /tmp/a"]);
    }

    #[tokio::test]
    async fn update_recreate_failure_restores_old_device() {
        let reg = registry();
        let prov = Recorder::default();
        let ctx = CallContext::background();
        let old = reg.create(&ctx, &prov, &parent(), "vol1", aio("/tmp/a")).await.unwrap();

        prov.fail_provision_of(&["/tmp/b"]);
        let mut payload = aio("/tmp/b");
        payload.name = old.name.clone();
        let err = reg
            .update(&ctx, &prov, &parent(), payload, &FieldMask::default(), false)
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::Validation("cannot open /tmp/b".into()));
        assert_eq!(reg.lookup(&old.name), Some(old));
        assert_eq!(
            prov.calls(),
            ["create /tmp/a", "delete /tmp/a", "create /tmp/b", "create /tmp/a"]
        );
    }

    #[tokio::test]
    async fn update_recreate_and_restore_failure_drops_entry() {
        let reg = registry();
        let prov = Recorder::default();
        let ctx = CallContext::background();
        let old = reg.create(&ctx, &prov, &parent(), "vol1", aio("/tmp/a")).await.unwrap();

        prov.fail_provision_of(&["/tmp/a", "/tmp/b"]);
        let mut payload = aio("/tmp/b");
        payload.name = old.name.clone();
        let err = reg
            .update(&ctx, &prov, &parent(), payload, &FieldMask::default(), false)
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::Validation("cannot open /tmp/b".into()));
        assert!(!reg.contains(&old.name));
    }

    #[tokio::test]
    async fn list_pages_through_everything() {
        let reg = registry();
        let prov = Recorder::default();
        let ctx = CallContext::background();
        for i in (0..7).rev() {
            reg.create(&ctx, &prov, &parent(), &format!("vol{i}"), aio("/tmp/f"))
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut token = String::new();
        loop {
            let page = reg
                .list(&ctx, &prov, &ListRequest::new(parent(), 3, token.clone()), &parent())
                .await
                .unwrap();
            assert!(page.items.len() <= 3);
            seen.extend(page.items.into_iter().map(|v| v.name));
            if page.next_page_token.is_empty() {
                break;
            }
            token = page.next_page_token;
        }
        let expected: Vec<String> = (0..7)
            .map(|i| format!("//storage.rk8s.io/volumes/vol{i}"))
            .collect();
        assert_eq!(seen, expected);

        let err = reg
            .list(&ctx, &prov, &ListRequest::new("", 0, ""), &parent())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
        let err = reg
            .list(&ctx, &prov, &ListRequest::new(parent(), 1, "bogus"), &parent())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn stats_default_to_sentinel() {
        let reg = registry();
        let prov = Recorder::default();
        let ctx = CallContext::background();
        let vol = reg.create(&ctx, &prov, &parent(), "vol1", aio("/tmp/f")).await.unwrap();
        assert_eq!(
            reg.stats(&ctx, &prov, &vol.name).await.unwrap(),
            VolumeStats::UNAVAILABLE
        );
        assert!(matches!(
            reg.stats(&ctx, &prov, "//storage.rk8s.io/volumes/nope").await,
            Err(BridgeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn writes_through_to_store() {
        let store = Arc::new(MemoryKvStore::new());
        let reg = registry().with_store(store.clone());
        let prov = Recorder::default();
        let ctx = CallContext::background();

        let vol = reg.create(&ctx, &prov, &parent(), "vol1", aio("/tmp/f")).await.unwrap();
        let bytes = store.get(&vol.name).await.unwrap().unwrap();
        let persisted: Volume = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(persisted, vol);

        reg.delete(&ctx, &prov, &vol.name, false).await.unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn destroy_results() {
        check_destroyed("v1", Ok(true), false).unwrap();
        assert_eq!(
            check_destroyed("v1", Ok(false), false).unwrap_err(),
            BridgeError::Validation("could not delete v1".into())
        );
        let gone = AdapterError::Remote {
            method: "bdev_null_delete".into(),
            code: -19,
            message: "No such device".into(),
        };
        check_destroyed("v1", Err(gone.clone()), true).unwrap();
        assert!(check_destroyed("v1", Err(gone), false).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn keyed_locks_serialize_and_clean_up() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock("a").await;
        let other = locks.lock("b").await;
        assert_eq!(locks.len(), 2);
        drop(other);
        assert_eq!(locks.len(), 1);

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.lock("a").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
        assert!(locks.is_empty());

        let guards = locks.lock_all(["x".to_string(), "x".to_string(), "y".to_string()]).await;
        assert_eq!(guards.len(), 2);
    }
}
