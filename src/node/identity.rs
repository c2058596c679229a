//! Node identity: the 16-byte hardware unique ID and the (at most once)
//! assigned node address.

use core::fmt;

use log::{info, warn};

use crate::dronecan::NodeId;
use crate::dronecan::messages::UNIQUE_ID_LEN;

/// Hardware-derived identifier, immutable for the life of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniqueId(pub [u8; UNIQUE_ID_LEN]);

impl UniqueId {
    pub fn as_bytes(&self) -> &[u8; UNIQUE_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NodeIdentity {
    local: Option<NodeId>,
    unique_id: UniqueId,
}

impl NodeIdentity {
    pub fn new(unique_id: UniqueId, static_node_id: Option<NodeId>) -> Self {
        Self {
            local: static_node_id,
            unique_id,
        }
    }

    /// The node's address, `None` while unallocated.
    pub fn local_address(&self) -> Option<NodeId> {
        self.local
    }

    pub fn unique_id(&self) -> &UniqueId {
        &self.unique_id
    }

    /// Adopt `node_id`. Only the first assignment per boot takes effect;
    /// returns whether this call changed the address.
    pub fn assign(&mut self, node_id: NodeId) -> bool {
        match self.local {
            None => {
                info!("Identity: node ID {} assigned", node_id);
                self.local = Some(node_id);
                true
            }
            Some(current) => {
                if current != node_id {
                    warn!(
                        "Identity: ignoring node ID {}, already running as {}",
                        node_id, current
                    );
                }
                false
            }
        }
    }
}
