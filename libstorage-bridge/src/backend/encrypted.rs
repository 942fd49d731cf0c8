//! Encrypted volumes: a crypto device stacked on another volume's device.

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::engine::*;
use crate::error::BridgeError;
use crate::naming::collection_parent;
use crate::overlay::EncryptedVolumeService;
use crate::registry::{Provisioner, check_destroyed};
use crate::stack::{OverlayKind, VolumeNode};
use crate::transport::{CallContext, call_as};
use crate::types::*;

use super::StorageBridge;

fn encrypted_parent() -> String {
    collection_parent(ResourceKind::EncryptedVolume.collection())
}

/// Name of the engine key backing the crypto device `bdev`.
fn key_name(bdev: &str) -> String {
    format!("{bdev}_key")
}

#[async_trait]
impl Provisioner<EncryptedVolume> for StorageBridge {
    fn dependencies(&self, enc: &EncryptedVolume) -> Vec<String> {
        vec![enc.volume_name_ref.clone()]
    }

    #[instrument(skip_all, fields(name = %enc.name, volume = %enc.volume_name_ref))]
    async fn provision(&self, ctx: &CallContext, enc: &mut EncryptedVolume) -> Result<(), BridgeError> {
        let (id, stack) = self.lineage(&enc.volume_name_ref)?;
        let mut stack = stack.lock().await;
        let bdev = enc.system_id().to_owned();
        let node = VolumeNode::overlay(enc.name.clone(), bdev.clone(), OverlayKind::Crypto);
        stack.check_push(&node)?;
        let base = stack
            .top()
            .map(|n| n.bdev_name.clone())
            .ok_or_else(|| BridgeError::not_found(format!("volume {} not found", enc.volume_name_ref)))?;

        let key = key_name(&bdev);
        let key_params = CryptoKeyCreateParams {
            cipher: enc.cipher.engine_name().to_owned(),
            name: key.clone(),
            key: hex::encode(&enc.key),
            key2: (enc.cipher == Cipher::AesXts).then(|| hex::encode(&enc.key2)),
        };
        let created: bool = call_as(self.engine(), ctx, ACCEL_CRYPTO_KEY_CREATE, &key_params).await?;
        if !created {
            return Err(BridgeError::validation(format!("could not create key {key}")));
        }

        let crypto = CryptoCreateParams {
            base_bdev_name: base,
            name: bdev.clone(),
            key_name: key.clone(),
        };
        let result: Result<String, _> = call_as(self.engine(), ctx, BDEV_CRYPTO_CREATE, &crypto).await;
        let created = match result {
            Ok(name) if name == bdev => Ok(()),
            Ok(_) => Err(BridgeError::validation(format!("could not create {bdev}"))),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = created {
            let destroy = CryptoKeyDestroyParams { key_name: key.clone() };
            let undo: Result<bool, _> =
                call_as(self.engine(), ctx, ACCEL_CRYPTO_KEY_DESTROY, &destroy).await;
            if let Err(undo_err) = check_destroyed(&key, undo, true) {
                warn!(%key, error = %undo_err, "failed to destroy key after crypto create failure");
            }
            return Err(e);
        }

        stack.push(node)?;
        drop(stack);
        self.stacks.attach(&enc.name, id);
        Ok(())
    }

    #[instrument(skip_all, fields(name = %enc.name))]
    async fn deprovision(
        &self,
        ctx: &CallContext,
        enc: &EncryptedVolume,
        allow_missing: bool,
    ) -> Result<(), BridgeError> {
        let bdev = enc.system_id();
        let lineage = self.stacks.lineage_of(&enc.name);
        // Off the stack means an earlier delete already removed the crypto
        // device and stopped at the key.
        let torn_down = lineage.is_none();
        let mut stack = match &lineage {
            Some((_, stack)) => Some(stack.lock().await),
            None => None,
        };
        if let Some(stack) = &stack {
            stack.check_pop(&enc.name)?;
        }

        let result = call_as(self.engine(), ctx, BDEV_CRYPTO_DELETE, &NameParams::new(bdev)).await;
        check_destroyed(bdev, result, allow_missing || torn_down)?;
        if let Some(stack) = stack.as_mut() {
            stack.pop(&enc.name)?;
        }
        drop(stack);
        self.stacks.detach(&enc.name);

        let key = key_name(bdev);
        let destroy = CryptoKeyDestroyParams { key_name: key.clone() };
        let result = call_as(self.engine(), ctx, ACCEL_CRYPTO_KEY_DESTROY, &destroy).await;
        check_destroyed(&key, result, allow_missing || torn_down)
    }

    async fn stats(&self, ctx: &CallContext, enc: &EncryptedVolume) -> Result<VolumeStats, BridgeError> {
        self.iostat(ctx, enc.system_id()).await
    }
}

#[async_trait]
impl EncryptedVolumeService for StorageBridge {
    async fn create_encrypted_volume(
        &self,
        ctx: &CallContext,
        req: CreateRequest<EncryptedVolume>,
    ) -> Result<EncryptedVolume, BridgeError> {
        self.encrypted
            .create(ctx, self, &encrypted_parent(), &req.id, req.resource)
            .await
    }

    async fn get_encrypted_volume(
        &self,
        ctx: &CallContext,
        req: GetRequest,
    ) -> Result<EncryptedVolume, BridgeError> {
        self.encrypted.get(ctx, self, &req.name).await
    }

    async fn update_encrypted_volume(
        &self,
        ctx: &CallContext,
        req: UpdateRequest<EncryptedVolume>,
    ) -> Result<EncryptedVolume, BridgeError> {
        self.encrypted
            .update(ctx, self, &encrypted_parent(), req.resource, &req.update_mask, req.allow_missing)
            .await
    }

    async fn delete_encrypted_volume(
        &self,
        ctx: &CallContext,
        req: DeleteRequest,
    ) -> Result<(), BridgeError> {
        self.encrypted
            .delete(ctx, self, &req.name, req.allow_missing)
            .await
    }

    async fn list_encrypted_volumes(
        &self,
        ctx: &CallContext,
        req: ListRequest,
    ) -> Result<ListResponse<EncryptedVolume>, BridgeError> {
        self.encrypted
            .list(ctx, self, &req, &encrypted_parent())
            .await
    }

    async fn stats_encrypted_volume(
        &self,
        ctx: &CallContext,
        req: StatsRequest,
    ) -> Result<VolumeStats, BridgeError> {
        self.encrypted.stats(ctx, self, &req.name).await
    }
}
