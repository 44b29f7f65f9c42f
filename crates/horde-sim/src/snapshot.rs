//! Read-only views of tracker state.
//!
//! The tracker publishes a [`ClusterTable`] after every tick for readers on
//! other threads (populators, map overlays). [`TrackerSnapshot`] is a fuller
//! capture with a BLAKE3 digest of its serialized form, used to check that
//! runs with different worker counts end in the same state.

use std::collections::BTreeMap;

use glam::Vec3;
use serde::Serialize;

use crate::horde::cluster::{ClusterId, HordeCluster, SpawnState};
use crate::horde::kind::HordeKindId;
use crate::horde::world_horde::WorldHorde;
use crate::horde::HordeId;

// ---------------------------------------------------------------------------
// ClusterSnapshot / ClusterTable
// ---------------------------------------------------------------------------

/// One cluster as published to readers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusterSnapshot {
    pub kind: HordeKindId,
    /// Location of the owning horde.
    pub location: Vec3,
    pub density: f32,
}

/// Clusters grouped by kind.
pub type ClusterTable = BTreeMap<HordeKindId, Vec<ClusterSnapshot>>;

/// Build the table from the current hordes, in horde order.
pub fn cluster_table<'a>(hordes: impl IntoIterator<Item = &'a WorldHorde>) -> ClusterTable {
    let mut table = ClusterTable::new();
    for horde in hordes {
        for cluster in horde.clusters() {
            table.entry(cluster.kind_id()).or_default().push(ClusterSnapshot {
                kind: cluster.kind_id(),
                location: horde.location(),
                density: cluster.density(),
            });
        }
    }
    table
}

/// Summed density per kind.
pub fn density_by_kind(table: &ClusterTable) -> BTreeMap<HordeKindId, f32> {
    table
        .iter()
        .map(|(kind, clusters)| (*kind, clusters.iter().map(|c| c.density).sum()))
        .collect()
}

// ---------------------------------------------------------------------------
// TrackerSnapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterState {
    pub id: ClusterId,
    pub kind: HordeKindId,
    pub state: SpawnState,
    pub density: f32,
    pub members: usize,
    pub live_members: usize,
}

impl From<&HordeCluster> for ClusterState {
    fn from(cluster: &HordeCluster) -> Self {
        Self {
            id: cluster.id(),
            kind: cluster.kind_id(),
            state: cluster.state(),
            density: cluster.density(),
            members: cluster.entities().len(),
            live_members: cluster.entities().iter().filter(|e| e.is_spawned()).count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HordeState {
    pub id: u64,
    pub sequence: u64,
    pub location: Vec3,
    pub sleeping: bool,
    pub despawn_pending: bool,
    pub live_entities: usize,
    pub clusters: Vec<ClusterState>,
}

/// Serializable capture of every horde after a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerSnapshot {
    pub tick: u64,
    pub hordes: Vec<HordeState>,
    /// BLAKE3 hex digest (64 lowercase hex chars) of `tick` and `hordes`.
    pub hash: String,
}

impl TrackerSnapshot {
    pub fn capture<'a>(tick: u64, hordes: impl IntoIterator<Item = (HordeId, &'a WorldHorde)>) -> Self {
        let hordes: Vec<HordeState> = hordes
            .into_iter()
            .map(|(id, horde)| HordeState {
                id: id.to_raw(),
                sequence: horde.sequence(),
                location: horde.location(),
                sleeping: horde.is_sleeping(),
                despawn_pending: horde.is_despawn_pending(),
                live_entities: horde.live_entities(),
                clusters: horde.clusters().iter().map(ClusterState::from).collect(),
            })
            .collect();
        let hash = compute_hash(tick, &hordes);
        Self { tick, hordes, hash }
    }

    pub fn total_density(&self) -> f32 {
        self.hordes
            .iter()
            .flat_map(|h| h.clusters.iter())
            .map(|c| c.density)
            .sum()
    }
}

fn compute_hash(tick: u64, hordes: &[HordeState]) -> String {
    #[derive(Serialize)]
    struct HashableState<'a> {
        tick: u64,
        hordes: &'a [HordeState],
    }

    // Plain data with string keys; serialization cannot fail.
    let bytes = serde_json::to_vec(&HashableState { tick, hordes }).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}
