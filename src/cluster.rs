//! Simulated cluster hardware model and the authoritative global store.
//!
//! One [`ClusterStore`] instance holds the canonical [`ClusterState`];
//! scenario contexts hold independent deep copies and merge back through
//! the store's mutation entry points (see `context`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typed state-level errors for cluster lookups and persistence.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Target node does not exist in this cluster
    #[error("no such node: {0}")]
    NodeNotFound(String),

    /// Target GPU index does not exist on the node
    #[error("no such GPU {index} on node {node}")]
    GpuNotFound { node: String, index: u32 },

    /// Imported cluster JSON failed to parse; state is left unchanged
    #[error("invalid cluster JSON: {0}")]
    InvalidClusterJson(#[from] serde_json::Error),
}

/// Overall node health as reported by the management plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeHealth {
    Healthy,
    Degraded,
    Critical,
    Unknown,
}

/// Slurm node state as shown by `sinfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlurmState {
    Idle,
    Alloc,
    Mix,
    Drain,
    Down,
    Maint,
}

impl SlurmState {
    /// Parse the forms accepted by `scontrol update state=...`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "idle" => Some(SlurmState::Idle),
            "alloc" | "allocated" => Some(SlurmState::Alloc),
            "mix" | "mixed" => Some(SlurmState::Mix),
            "drain" | "draining" | "drained" => Some(SlurmState::Drain),
            "down" => Some(SlurmState::Down),
            "maint" | "maintenance" => Some(SlurmState::Maint),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SlurmState::Idle => "idle",
            SlurmState::Alloc => "alloc",
            SlurmState::Mix => "mix",
            SlurmState::Drain => "drain",
            SlurmState::Down => "down",
            SlurmState::Maint => "maint",
        }
    }
}

/// InfiniBand link state of an HCA port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkState {
    Active,
    Init,
    Down,
}

/// One recorded XID error on a GPU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XidEvent {
    pub code: u32,
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Mutable telemetry for one GPU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gpu {
    pub index: u32,
    pub model: String,
    pub uuid: String,
    pub temperature_c: u32,
    pub utilization_pct: u32,
    pub memory_used_mib: u64,
    pub memory_total_mib: u64,
    pub ecc_errors: u64,
    pub mig_enabled: bool,
    pub xid_events: Vec<XidEvent>,
}

/// One host channel adapter port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hca {
    pub device: String,
    pub port: u32,
    pub link_state: LinkState,
    pub rate_gbps: u32,
}

/// A compute node with its devices and health/scheduler state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub id: String,
    pub health: NodeHealth,
    pub slurm_state: SlurmState,
    pub slurm_reason: Option<String>,
    pub gpus: Vec<Gpu>,
    pub hcas: Vec<Hca>,
}

/// The full simulated cluster: a tree of nodes and their devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterState {
    pub name: String,
    pub nodes: Vec<ClusterNode>,
}

impl ClusterState {
    pub fn node(&self, id: &str) -> Option<&ClusterNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut ClusterNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn gpu(&self, node: &str, index: u32) -> Option<&Gpu> {
        self.node(node)?.gpus.iter().find(|g| g.index == index)
    }

    pub fn gpu_mut(&mut self, node: &str, index: u32) -> Option<&mut Gpu> {
        self.node_mut(node)?.gpus.iter_mut().find(|g| g.index == index)
    }

    /// Small fixed two-node training cluster used by the binary and tests.
    pub fn demo() -> Self {
        let gpu = |index: u32, node: &str| Gpu {
            index,
            model: "NVIDIA H100 80GB HBM3".to_string(),
            uuid: format!("GPU-{node}-{index:02}"),
            temperature_c: 41 + index,
            utilization_pct: 0,
            memory_used_mib: 0,
            memory_total_mib: 81_559,
            ecc_errors: 0,
            mig_enabled: false,
            xid_events: Vec::new(),
        };
        let hca = |port: u32| Hca {
            device: "mlx5_0".to_string(),
            port,
            link_state: LinkState::Active,
            rate_gbps: 400,
        };
        let node = |id: &str| ClusterNode {
            id: id.to_string(),
            health: NodeHealth::Healthy,
            slurm_state: SlurmState::Idle,
            slurm_reason: None,
            gpus: (0..4).map(|i| gpu(i, id)).collect(),
            hcas: vec![hca(1)],
        };
        ClusterState {
            name: "dclab".to_string(),
            nodes: vec![node("node1"), node("node2")],
        }
    }
}

/// Partial update applied to one GPU's telemetry fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuPatch {
    pub temperature_c: Option<u32>,
    pub utilization_pct: Option<u32>,
    pub memory_used_mib: Option<u64>,
    pub ecc_errors: Option<u64>,
}

impl GpuPatch {
    pub fn apply(&self, gpu: &mut Gpu) {
        if let Some(v) = self.temperature_c {
            gpu.temperature_c = v;
        }
        if let Some(v) = self.utilization_pct {
            gpu.utilization_pct = v;
        }
        if let Some(v) = self.memory_used_mib {
            gpu.memory_used_mib = v;
        }
        if let Some(v) = self.ecc_errors {
            gpu.ecc_errors = v;
        }
    }
}

/// Partial update applied to one node's non-device fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    pub health: Option<NodeHealth>,
    pub slurm_state: Option<SlurmState>,
    pub slurm_reason: Option<String>,
}

impl NodePatch {
    pub fn apply(&self, node: &mut ClusterNode) {
        if let Some(h) = self.health {
            node.health = h;
        }
        if let Some(s) = self.slurm_state {
            node.slurm_state = s;
        }
        if let Some(r) = &self.slurm_reason {
            node.slurm_reason = Some(r.clone());
        }
    }
}

/// Authoritative holder of the global cluster state.
///
/// All writes to the global state go through these entry points; scenario
/// contexts never touch it directly and merge back by replaying their
/// mutation log against these same methods.
#[derive(Debug, Clone)]
pub struct ClusterStore {
    state: ClusterState,
}

impl ClusterStore {
    pub fn new(state: ClusterState) -> Self {
        Self { state }
    }

    /// Read-only view of the current global state.
    pub fn state(&self) -> &ClusterState {
        &self.state
    }

    /// Defensive deep copy for external inspection.
    pub fn snapshot(&self) -> ClusterState {
        self.state.clone()
    }

    /// Mutable GPU lookup with node/GPU distinguished in the error.
    fn gpu_entry(&mut self, node: &str, index: u32) -> Result<&mut Gpu, ClusterError> {
        if self.state.node(node).is_none() {
            return Err(ClusterError::NodeNotFound(node.to_string()));
        }
        self.state
            .gpu_mut(node, index)
            .ok_or_else(|| ClusterError::GpuNotFound {
                node: node.to_string(),
                index,
            })
    }

    pub fn update_gpu(&mut self, node: &str, index: u32, patch: &GpuPatch) -> Result<(), ClusterError> {
        patch.apply(self.gpu_entry(node, index)?);
        Ok(())
    }

    pub fn update_node(&mut self, node: &str, patch: &NodePatch) -> Result<(), ClusterError> {
        let n = self
            .state
            .node_mut(node)
            .ok_or_else(|| ClusterError::NodeNotFound(node.to_string()))?;
        patch.apply(n);
        Ok(())
    }

    pub fn update_node_health(&mut self, node: &str, health: NodeHealth) -> Result<(), ClusterError> {
        let n = self
            .state
            .node_mut(node)
            .ok_or_else(|| ClusterError::NodeNotFound(node.to_string()))?;
        n.health = health;
        Ok(())
    }

    pub fn add_xid_error(&mut self, node: &str, index: u32, event: XidEvent) -> Result<(), ClusterError> {
        let gpu = self.gpu_entry(node, index)?;
        gpu.xid_events.push(event);
        gpu.ecc_errors += 1;
        Ok(())
    }

    pub fn set_mig_mode(&mut self, node: &str, index: u32, enabled: bool) -> Result<(), ClusterError> {
        self.gpu_entry(node, index)?.mig_enabled = enabled;
        Ok(())
    }

    pub fn set_slurm_state(
        &mut self,
        node: &str,
        state: SlurmState,
        reason: Option<String>,
    ) -> Result<(), ClusterError> {
        let n = self
            .state
            .node_mut(node)
            .ok_or_else(|| ClusterError::NodeNotFound(node.to_string()))?;
        n.slurm_state = state;
        n.slurm_reason = reason;
        Ok(())
    }

    /// Replace the global state from exported JSON.
    ///
    /// Parses into a scratch value first so a malformed document leaves the
    /// current state untouched.
    pub fn import_json(&mut self, json: &str) -> Result<(), ClusterError> {
        let parsed: ClusterState = serde_json::from_str(json)?;
        self.state = parsed;
        Ok(())
    }

    pub fn export_json(&self) -> Result<String, ClusterError> {
        Ok(serde_json::to_string_pretty(&self.state)?)
    }
}
