// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Asset collaborators: the encode-time link resolver and the decode-time loader.
//!
//! The codec does not know what an asset is. It hands `ASSET_UUID` leaves to
//! these ports and stores whatever comes back.

use futures_util::future::{try_join_all, BoxFuture};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{AssetLoadError, CodecError};
use crate::hook::{HookOutcome, LeafContext};
use crate::storage::StorageType;
use crate::value::{AssetRef, NodeId, ObjectGraph, Slot, Value};
use crate::ComposerOptions;

/// Maps an asset uuid to the uuid actually written (default-asset links).
///
/// Implemented for every `Fn(Uuid) -> Uuid`.
pub trait AssetLinkResolver {
    /// Resolve `uuid`.
    fn resolve(&self, uuid: Uuid) -> Uuid;
}

impl<F> AssetLinkResolver for F
where
    F: Fn(Uuid) -> Uuid,
{
    fn resolve(&self, uuid: Uuid) -> Uuid {
        self(uuid)
    }
}

/// Loads live assets for `ASSET_UUID` leaves.
pub trait AssetLoader: Send + Sync {
    /// Load the asset for `uuid`; `None` is an absent (all-zero) uuid.
    ///
    /// `Ok(None)` stores [`Value::Null`].
    fn get_asset(&self, uuid: Option<Uuid>)
        -> BoxFuture<'_, Result<Option<AssetRef>, AssetLoadError>>;
}

/// Decode, then load every `ASSET_UUID` leaf through `loader`.
///
/// The graph is fully built before the first load starts. Loads run
/// concurrently and each writes its own slot once all of them have settled.
/// The first failing load fails the call.
#[instrument(skip_all, fields(len = bytes.len()))]
pub async fn binary_to_object_with_asset_loader<L>(
    bytes: &[u8],
    opts: &ComposerOptions<'_>,
    loader: &L,
) -> Result<(ObjectGraph, NodeId), CodecError>
where
    L: AssetLoader + ?Sized,
{
    let mut pending: Vec<(Slot, Option<Uuid>)> = Vec::new();
    let (mut graph, root) = crate::decode::binary_to_object_with_hook(
        bytes,
        opts,
        &mut |leaf: &LeafContext<'_>| {
            if leaf.storage_type != StorageType::AssetUuid {
                return HookOutcome::Keep;
            }
            let uuid = match leaf.value {
                Value::Uuid(uuid) => Some(*uuid),
                _ => None,
            };
            pending.push((leaf.slot.clone(), uuid));
            HookOutcome::Defer
        },
    )?;

    debug!(assets = pending.len(), "loading assets");
    let loaded = try_join_all(pending.iter().map(|(_, uuid)| loader.get_asset(*uuid))).await?;
    for ((slot, _), asset) in pending.iter().zip(loaded) {
        graph.set_slot(slot, asset.map_or(Value::Null, Value::Asset))?;
    }
    Ok((graph, root))
}
