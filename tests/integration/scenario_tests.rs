//! Whole-node scenarios: restart, bus trouble, GetNodeInfo, health.

use cannode::app::events::NodeEvent;
use cannode::config::NodeConfig;
use cannode::dronecan::messages::{
    GetNodeInfoResponse, Health, Message, Mode, NodeStatus, RestartNodeRequest,
};
use cannode::dronecan::{NodeId, TransferKind, data_types};
use cannode::error::{BusError, Fatal, TransportError};

use crate::mock_bus::{Harness, request, test_uid};

#[test]
fn restart_request_halts_the_pump() {
    let mut h = Harness::allocated(20);
    let req = RestartNodeRequest {
        magic_number: RestartNodeRequest::MAGIC,
    }
    .encode();
    h.inject(request(data_types::RESTART_NODE, 5, 1, &req));

    assert_eq!(
        h.tick_at(10),
        Err(Fatal::RestartRequested {
            requester: NodeId::new(5)
        })
    );
    assert!(h.events.events.contains(&NodeEvent::RestartRequested {
        requester: NodeId::new(5)
    }));
    assert!(h.sent(data_types::RESTART_NODE, TransferKind::Response).is_empty());
}

#[test]
fn get_node_info_reports_identity_and_versions() {
    let mut h = Harness::boot(NodeConfig {
        static_node_id: Some(20),
        vcs_commit: 0x00C0_FFEE,
        ..NodeConfig::default()
    });
    h.inject(request(data_types::GET_NODE_INFO, 7, 12, &[]));
    h.tick_at(5_000).unwrap();

    let sent = h.sent(data_types::GET_NODE_INFO, TransferKind::Response);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].destination, NodeId::new(7));
    let info: GetNodeInfoResponse = sent[0].decode();
    assert_eq!(info.status.uptime_sec, 5);
    assert_eq!(info.status.mode, Mode::Operational);
    assert_eq!(info.software_version.vcs_commit, 0x00C0_FFEE);
    assert_eq!(info.hardware_version.unique_id, test_uid().0);
    assert_eq!(info.name.as_slice(), b"org.cannode.node");
}

#[test]
fn status_is_broadcast_once_per_period_with_health() {
    let mut h = Harness::allocated(20);
    h.node.set_health(Health::Warning);
    for t in (0..=3_000).step_by(100) {
        h.tick_at(t).unwrap();
    }

    let status = h.sent(data_types::NODE_STATUS, TransferKind::Broadcast);
    assert_eq!(status.len(), 3);
    let tids: Vec<u8> = status.iter().map(|s| s.transfer_id.get()).collect();
    assert_eq!(tids, vec![0, 1, 2]);
    let last: NodeStatus = status[2].decode();
    assert_eq!(last.health, Health::Warning);
    assert_eq!(last.uptime_sec, 3);
}

#[test]
fn busy_bus_keeps_frames_queued() {
    let mut h = Harness::allocated(20);
    h.inject(request(data_types::GET_NODE_INFO, 7, 1, &[]));
    h.tick_at(10).unwrap();
    assert_eq!(h.transport.tx.len(), 1);

    h.bus.fail_with = Some(BusError::Busy);
    h.tick_at(20).unwrap();
    assert_eq!(h.transport.tx.len(), 1);
    assert!(!h.events.events.iter().any(|e| matches!(e, NodeEvent::BusError(_))));

    h.bus.fail_with = None;
    h.tick_at(30).unwrap();
    assert!(h.transport.tx.is_empty());
    assert_eq!(h.bus.frames_sent, 1);
}

#[test]
fn bus_fault_is_reported_and_tick_continues() {
    let mut h = Harness::allocated(20);
    h.inject(request(data_types::GET_NODE_INFO, 7, 1, &[]));
    h.tick_at(10).unwrap();

    h.bus.fail_with = Some(BusError::Offline);
    h.inject(request(data_types::GET_NODE_INFO, 7, 2, &[]));
    h.tick_at(20).unwrap();

    assert!(h.events.events.contains(&NodeEvent::BusError(BusError::Offline)));
    // The second request was still served.
    assert_eq!(h.sent(data_types::GET_NODE_INFO, TransferKind::Response).len(), 2);
    assert_eq!(h.transport.tx.len(), 2);
}

#[test]
fn full_tx_queue_is_reported() {
    let mut h = Harness::allocated(20);
    h.transport.reject = Some(TransportError::QueueFull);
    h.tick_at(0).unwrap();
    h.tick_at(1_000).unwrap();

    assert!(h.events.events.contains(&NodeEvent::TransmitFailed {
        what: "NodeStatus",
        error: TransportError::QueueFull,
    }));
    assert_eq!(h.node.status().transfer_id().get(), 0);

    h.transport.reject = None;
    h.tick_at(2_000).unwrap();
    assert_eq!(h.node.status().transfer_id().get(), 1);
}

#[test]
fn unsubscribed_traffic_is_ignored() {
    let mut h = Harness::allocated(20);
    h.inject(request(data_types::NODE_STATUS, 7, 1, &[0; 7]));
    h.tick_at(10).unwrap();
    assert!(h.transport.sent.is_empty());
    assert_eq!(h.node.tick_count(), 1);
}
