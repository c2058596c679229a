//! Node configuration parameters
//!
//! Boot-time settings for the protocol engine. Persisted as a postcard blob
//! through [`ConfigPort`](crate::app::ports::ConfigPort); the runtime
//! parameter table (served over `param.GetSet`) lives in
//! [`crate::node::params`] instead.

use serde::{Deserialize, Serialize};

/// Maximum length of the GetNodeInfo name field.
pub const NODE_NAME_LEN: usize = 80;

/// Core node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    // --- Identity ---
    /// Reverse-domain node name reported by GetNodeInfo
    pub node_name: heapless::String<NODE_NAME_LEN>,
    /// Fixed node ID; `None` runs dynamic allocation
    pub static_node_id: Option<u8>,
    /// Node ID requested from the allocator when the NODEID parameter is unset
    pub preferred_node_id: u8,

    // --- Versions ---
    pub hardware_version: (u8, u8),
    pub software_version: (u8, u8),
    /// Short VCS commit hash, 0 if unknown
    pub vcs_commit: u32,

    // --- Timing ---
    /// Slow task group period (stale purge, NodeStatus) in milliseconds
    pub slow_task_period_ms: u32,
    /// Retry interval for an unanswered file.Read request
    pub firmware_retry_interval_ms: u32,
    /// Minimum spacing between allocation requests
    pub allocation_min_request_period_ms: u32,
    /// Upper bound of the random extra delay added to each allocation request
    pub allocation_max_followup_delay_ms: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let mut node_name = heapless::String::new();
        node_name.push_str("org.cannode.node").ok();

        Self {
            // Identity
            node_name,
            static_node_id: None,
            preferred_node_id: 69,

            // Versions
            hardware_version: (2, 3),
            software_version: (1, 2),
            vcs_commit: 0,

            // Timing
            slow_task_period_ms: 1000,               // 1 Hz
            firmware_retry_interval_ms: 750,
            allocation_min_request_period_ms: 600,
            allocation_max_followup_delay_ms: 400,
        }
    }
}
