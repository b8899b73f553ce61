//! Per-scenario isolated cluster state with a replayable mutation log.
//!
//! A [`ScenarioContext`] owns a deep copy of the cluster taken at creation
//! time plus an append-only [`StateChange`] log. Nothing here aliases the
//! global [`ClusterStore`]; the only way context mutations reach global
//! state is [`ScenarioContext::apply_to_global`], which replays the log in
//! insertion order through the store's own entry points.

use crate::cluster::{
    ClusterState, ClusterStore, GpuPatch, NodeHealth, NodePatch, SlurmState, XidEvent,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// One tagged, append-only mutation record.
///
/// Records are never rewritten, only replayed. The `Unknown` variant keeps
/// replay of logs authored by newer versions non-fatal: unrecognized tags
/// are logged and skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StateChange {
    GpuUpdate {
        timestamp: DateTime<Utc>,
        node_id: String,
        gpu_index: u32,
        patch: GpuPatch,
        command: Option<String>,
    },
    NodeUpdate {
        timestamp: DateTime<Utc>,
        node_id: String,
        patch: NodePatch,
        command: Option<String>,
    },
    NodeHealth {
        timestamp: DateTime<Utc>,
        node_id: String,
        health: NodeHealth,
        command: Option<String>,
    },
    XidError {
        timestamp: DateTime<Utc>,
        node_id: String,
        gpu_index: u32,
        event: XidEvent,
        command: Option<String>,
    },
    SlurmState {
        timestamp: DateTime<Utc>,
        node_id: String,
        state: SlurmState,
        reason: Option<String>,
        command: Option<String>,
    },
    MigMode {
        timestamp: DateTime<Utc>,
        node_id: String,
        gpu_index: u32,
        enabled: bool,
        command: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Isolated, mutation-logged copy of cluster state for one lab exercise.
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    id: String,
    cluster: ClusterState,
    mutations: Vec<StateChange>,
    readonly: bool,
    created_at: DateTime<Utc>,
}

impl ScenarioContext {
    /// Deep-copy `base` into a fresh writable context.
    pub fn new(id: impl Into<String>, base: &ClusterState) -> Self {
        Self {
            id: id.into(),
            cluster: base.clone(),
            mutations: Vec::new(),
            readonly: false,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn readonly(&self) -> bool {
        self.readonly
    }

    pub fn set_readonly(&mut self, readonly: bool) {
        self.readonly = readonly;
    }

    /// The isolated cluster copy, read-only.
    pub fn cluster(&self) -> &ClusterState {
        &self.cluster
    }

    /// Ordered mutation log; grows until [`reset`](Self::reset).
    pub fn mutations(&self) -> &[StateChange] {
        &self.mutations
    }

    /// Defensive deep copy for external inspection without write access.
    pub fn snapshot(&self) -> ClusterState {
        self.cluster.clone()
    }

    fn blocked(&self, what: &str) -> bool {
        if self.readonly {
            warn!(context = %self.id, op = what, "mutation ignored: context is readonly");
            return true;
        }
        false
    }

    /// Patch one GPU in the isolated copy and log the change.
    ///
    /// Like every mutating operation here, this is a logged no-op when the
    /// context is readonly or the target does not exist.
    pub fn update_gpu(&mut self, node: &str, index: u32, patch: GpuPatch, command: Option<&str>) {
        if self.blocked("update_gpu") {
            return;
        }
        match self.cluster.gpu_mut(node, index) {
            Some(gpu) => {
                patch.apply(gpu);
                self.mutations.push(StateChange::GpuUpdate {
                    timestamp: Utc::now(),
                    node_id: node.to_string(),
                    gpu_index: index,
                    patch,
                    command: command.map(str::to_string),
                });
            }
            None => warn!(node, index, "update_gpu ignored: no such GPU"),
        }
    }

    pub fn update_node(&mut self, node: &str, patch: NodePatch, command: Option<&str>) {
        if self.blocked("update_node") {
            return;
        }
        match self.cluster.node_mut(node) {
            Some(n) => {
                patch.apply(n);
                self.mutations.push(StateChange::NodeUpdate {
                    timestamp: Utc::now(),
                    node_id: node.to_string(),
                    patch,
                    command: command.map(str::to_string),
                });
            }
            None => warn!(node, "update_node ignored: no such node"),
        }
    }

    pub fn update_node_health(&mut self, node: &str, health: NodeHealth, command: Option<&str>) {
        if self.blocked("update_node_health") {
            return;
        }
        match self.cluster.node_mut(node) {
            Some(n) => {
                n.health = health;
                self.mutations.push(StateChange::NodeHealth {
                    timestamp: Utc::now(),
                    node_id: node.to_string(),
                    health,
                    command: command.map(str::to_string),
                });
            }
            None => warn!(node, "update_node_health ignored: no such node"),
        }
    }

    pub fn add_xid_error(&mut self, node: &str, index: u32, event: XidEvent, command: Option<&str>) {
        if self.blocked("add_xid_error") {
            return;
        }
        match self.cluster.gpu_mut(node, index) {
            Some(gpu) => {
                gpu.xid_events.push(event.clone());
                gpu.ecc_errors += 1;
                self.mutations.push(StateChange::XidError {
                    timestamp: Utc::now(),
                    node_id: node.to_string(),
                    gpu_index: index,
                    event,
                    command: command.map(str::to_string),
                });
            }
            None => warn!(node, index, "add_xid_error ignored: no such GPU"),
        }
    }

    pub fn set_mig_mode(&mut self, node: &str, index: u32, enabled: bool, command: Option<&str>) {
        if self.blocked("set_mig_mode") {
            return;
        }
        match self.cluster.gpu_mut(node, index) {
            Some(gpu) => {
                gpu.mig_enabled = enabled;
                self.mutations.push(StateChange::MigMode {
                    timestamp: Utc::now(),
                    node_id: node.to_string(),
                    gpu_index: index,
                    enabled,
                    command: command.map(str::to_string),
                });
            }
            None => warn!(node, index, "set_mig_mode ignored: no such GPU"),
        }
    }

    pub fn set_slurm_state(
        &mut self,
        node: &str,
        state: SlurmState,
        reason: Option<String>,
        command: Option<&str>,
    ) {
        if self.blocked("set_slurm_state") {
            return;
        }
        match self.cluster.node_mut(node) {
            Some(n) => {
                n.slurm_state = state;
                n.slurm_reason = reason.clone();
                self.mutations.push(StateChange::SlurmState {
                    timestamp: Utc::now(),
                    node_id: node.to_string(),
                    state,
                    reason,
                    command: command.map(str::to_string),
                });
            }
            None => warn!(node, "set_slurm_state ignored: no such node"),
        }
    }

    /// Replay this context's mutation log against the global store.
    ///
    /// Replays in insertion order through the store's own entry points.
    /// Individual replay failures (target vanished) and unknown tags are
    /// logged and skipped, never fatal. Readonly contexts never merge.
    pub fn apply_to_global(&self, store: &mut ClusterStore) {
        if self.readonly {
            warn!(context = %self.id, "merge skipped: context is readonly");
            return;
        }
        for change in &self.mutations {
            let outcome = match change {
                StateChange::GpuUpdate {
                    node_id, gpu_index, patch, ..
                } => store.update_gpu(node_id, *gpu_index, patch),
                StateChange::NodeUpdate { node_id, patch, .. } => store.update_node(node_id, patch),
                StateChange::NodeHealth { node_id, health, .. } => {
                    store.update_node_health(node_id, *health)
                }
                StateChange::XidError {
                    node_id, gpu_index, event, ..
                } => store.add_xid_error(node_id, *gpu_index, event.clone()),
                StateChange::SlurmState {
                    node_id, state, reason, ..
                } => store.set_slurm_state(node_id, *state, reason.clone()),
                StateChange::MigMode {
                    node_id, gpu_index, enabled, ..
                } => store.set_mig_mode(node_id, *gpu_index, *enabled),
                StateChange::Unknown => {
                    warn!(context = %self.id, "skipping unknown state change tag during replay");
                    continue;
                }
            };
            if let Err(e) = outcome {
                warn!(context = %self.id, error = %e, "skipping unreplayable state change");
            }
        }
        info!(context = %self.id, changes = self.mutations.len(), "merged mutation log into global state");
    }

    /// Re-clone from `base` and clear the mutation log.
    pub fn reset(&mut self, base: &ClusterState) {
        self.cluster = base.clone();
        self.mutations.clear();
        debug!(context = %self.id, "context reset");
    }
}

/// Owns every live scenario context and tracks which one is active.
///
/// At most one context is active at a time; switching is a single
/// assignment of the active id.
#[derive(Debug, Default)]
pub struct ScenarioContextManager {
    contexts: HashMap<String, ScenarioContext>,
    active: Option<String>,
}

impl ScenarioContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) the context for `id`, deep-copying `base`.
    pub fn create_context(&mut self, id: &str, base: &ClusterState) -> &mut ScenarioContext {
        use std::collections::hash_map::Entry;
        info!(context = id, "creating scenario context");
        match self.contexts.entry(id.to_string()) {
            Entry::Occupied(mut e) => {
                e.insert(ScenarioContext::new(id, base));
                e.into_mut()
            }
            Entry::Vacant(e) => e.insert(ScenarioContext::new(id, base)),
        }
    }

    pub fn get_or_create(&mut self, id: &str, base: &ClusterState) -> &mut ScenarioContext {
        self.contexts
            .entry(id.to_string())
            .or_insert_with(|| ScenarioContext::new(id, base))
    }

    pub fn get(&self, id: &str) -> Option<&ScenarioContext> {
        self.contexts.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ScenarioContext> {
        self.contexts.get_mut(id)
    }

    /// Make `id` the active context. Returns false when no such context.
    pub fn set_active(&mut self, id: &str) -> bool {
        if self.contexts.contains_key(id) {
            self.active = Some(id.to_string());
            true
        } else {
            warn!(context = id, "cannot activate missing context");
            false
        }
    }

    pub fn clear_active(&mut self) {
        self.active = None;
    }

    pub fn active(&self) -> Option<&ScenarioContext> {
        self.active.as_ref().and_then(|id| self.contexts.get(id))
    }

    pub fn active_mut(&mut self) -> Option<&mut ScenarioContext> {
        let id = self.active.clone()?;
        self.contexts.get_mut(&id)
    }

    /// Evict a context, deactivating it first if needed.
    pub fn delete_context(&mut self, id: &str) {
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        self.contexts.remove(id);
    }
}

/// The single seam through which emulators see cluster state.
///
/// Reads resolve to the active scenario context's isolated copy when one
/// exists, otherwise to the global store; writes go to the active context
/// (appending to its log) or straight through the store's entry points.
/// Handing emulators this seam instead of raw state is what keeps the
/// isolation invariant out of their hands entirely.
#[derive(Debug)]
pub struct ClusterWorld {
    pub store: ClusterStore,
    pub contexts: ScenarioContextManager,
}

impl ClusterWorld {
    pub fn new(store: ClusterStore) -> Self {
        Self {
            store,
            contexts: ScenarioContextManager::new(),
        }
    }

    /// The cluster state commands should observe right now.
    pub fn cluster(&self) -> &ClusterState {
        match self.contexts.active() {
            Some(ctx) => ctx.cluster(),
            None => self.store.state(),
        }
    }

    pub fn update_gpu(&mut self, node: &str, index: u32, patch: GpuPatch, command: Option<&str>) {
        match self.contexts.active_mut() {
            Some(ctx) => ctx.update_gpu(node, index, patch, command),
            None => {
                if let Err(e) = self.store.update_gpu(node, index, &patch) {
                    warn!(error = %e, "global update_gpu ignored");
                }
            }
        }
    }

    pub fn update_node_health(&mut self, node: &str, health: NodeHealth, command: Option<&str>) {
        match self.contexts.active_mut() {
            Some(ctx) => ctx.update_node_health(node, health, command),
            None => {
                if let Err(e) = self.store.update_node_health(node, health) {
                    warn!(error = %e, "global update_node_health ignored");
                }
            }
        }
    }

    pub fn add_xid_error(&mut self, node: &str, index: u32, event: XidEvent, command: Option<&str>) {
        match self.contexts.active_mut() {
            Some(ctx) => ctx.add_xid_error(node, index, event, command),
            None => {
                if let Err(e) = self.store.add_xid_error(node, index, event) {
                    warn!(error = %e, "global add_xid_error ignored");
                }
            }
        }
    }

    pub fn set_mig_mode(&mut self, node: &str, index: u32, enabled: bool, command: Option<&str>) {
        match self.contexts.active_mut() {
            Some(ctx) => ctx.set_mig_mode(node, index, enabled, command),
            None => {
                if let Err(e) = self.store.set_mig_mode(node, index, enabled) {
                    warn!(error = %e, "global set_mig_mode ignored");
                }
            }
        }
    }

    pub fn set_slurm_state(
        &mut self,
        node: &str,
        state: SlurmState,
        reason: Option<String>,
        command: Option<&str>,
    ) {
        match self.contexts.active_mut() {
            Some(ctx) => ctx.set_slurm_state(node, state, reason, command),
            None => {
                if let Err(e) = self.store.set_slurm_state(node, state, reason) {
                    warn!(error = %e, "global set_slurm_state ignored");
                }
            }
        }
    }
}
