//! Dynamic node ID allocation, end to end through the pump.

use cannode::app::events::NodeEvent;
use cannode::config::NodeConfig;
use cannode::dronecan::messages::{Allocation, GetNodeInfoResponse, Message, NodeStatus, UniqueIdBytes};
use cannode::dronecan::{NodeId, TransferKind, data_types};

use crate::mock_bus::{Harness, broadcast, request, test_uid};

fn allocator_echo(node_id: u8, prefix_len: usize) -> Vec<u8> {
    let uid = test_uid();
    let mut unique_id = UniqueIdBytes::new();
    unique_id.extend_from_slice(&uid.0[..prefix_len]).unwrap();
    Allocation {
        node_id,
        first_part_of_unique_id: false,
        unique_id,
    }
    .encode()
    .to_vec()
}

fn allocation_requests(h: &Harness) -> Vec<Allocation> {
    h.sent(data_types::ALLOCATION, TransferKind::Broadcast)
        .iter()
        .map(|s| s.decode::<Allocation>())
        .collect()
}

#[test]
fn unallocated_node_sends_first_request_immediately() {
    let mut h = Harness::boot(NodeConfig::default());
    h.tick_at(0).unwrap();

    let reqs = allocation_requests(&h);
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0].node_id, 69);
    assert!(reqs[0].first_part_of_unique_id);
    assert_eq!(reqs[0].unique_id.as_slice(), &test_uid().0[..6]);
    // Anonymous: no source address.
    assert_eq!(h.transport.sent[0].source, None);
}

#[test]
fn partial_then_full_match_resolves_to_allocated_address() {
    let mut h = Harness::boot(NodeConfig::default());
    h.rng.0 = 100;
    h.tick_at(0).unwrap();

    // Allocator confirms the first 6 bytes.
    h.inject(broadcast(data_types::ALLOCATION, Some(1), &allocator_echo(0, 6)));
    h.tick_at(100).unwrap();
    assert_eq!(h.node.allocation().matched_prefix_len(), 6);
    assert!(h.events.events.contains(&NodeEvent::AllocationProgress { matched: 6 }));

    // The follow-up goes out after the jitter and carries the next slice.
    h.tick_at(200).unwrap();
    let reqs = allocation_requests(&h);
    assert_eq!(reqs.len(), 2);
    let follow_up = reqs.last().unwrap();
    assert!(!follow_up.first_part_of_unique_id);
    assert_eq!(follow_up.unique_id.as_slice(), &test_uid().0[6..12]);

    // Allocator confirms all 16 bytes and assigns 42.
    h.inject(broadcast(data_types::ALLOCATION, Some(1), &allocator_echo(42, 16)));
    h.tick_at(250).unwrap();

    assert_eq!(h.node.local_node_id(), NodeId::new(42));
    assert_eq!(h.transport.local, NodeId::new(42));
    assert!(h.events.events.contains(&NodeEvent::AddressAllocated(NodeId::new(42).unwrap())));

    // Everything from now on originates from node 42.
    h.clear_sent();
    h.tick_at(1_000).unwrap();
    h.tick_at(2_100).unwrap();
    h.inject(request(data_types::GET_NODE_INFO, 7, 3, &[]));
    h.tick_at(2_200).unwrap();

    let status = h.sent(data_types::NODE_STATUS, TransferKind::Broadcast);
    assert!(!status.is_empty());
    assert!(status.iter().all(|s| s.source == NodeId::new(42)));
    assert_eq!(status[0].decode::<NodeStatus>().uptime_sec, 1);

    let info = h.sent(data_types::GET_NODE_INFO, TransferKind::Response);
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].source, NodeId::new(42));
    let info: GetNodeInfoResponse = info[0].decode();
    assert_eq!(info.hardware_version.unique_id, test_uid().0);

    // No more allocation traffic once resolved.
    assert!(allocation_requests(&h).is_empty());
}

#[test]
fn mismatched_echo_restarts_from_first_part() {
    let mut h = Harness::boot(NodeConfig::default());
    h.rng.0 = 100;
    h.tick_at(0).unwrap();
    h.inject(broadcast(data_types::ALLOCATION, Some(1), &allocator_echo(0, 6)));
    h.tick_at(100).unwrap();
    assert_eq!(h.node.allocation().matched_prefix_len(), 6);

    // Another node's prefix.
    let foreign = Allocation {
        node_id: 0,
        first_part_of_unique_id: false,
        unique_id: UniqueIdBytes::from_slice(&[0xFF; 6]).unwrap(),
    }
    .encode();
    h.inject(broadcast(data_types::ALLOCATION, Some(1), &foreign));
    h.tick_at(150).unwrap();
    assert_eq!(h.node.allocation().matched_prefix_len(), 0);

    // Next request waits out the minimum period plus jitter and starts over.
    h.clear_sent();
    h.tick_at(500).unwrap();
    assert!(allocation_requests(&h).is_empty());
    h.tick_at(850).unwrap();
    let reqs = allocation_requests(&h);
    assert_eq!(reqs.len(), 1);
    assert!(reqs[0].first_part_of_unique_id);
}

#[test]
fn anonymous_allocation_traffic_resets_progress() {
    let mut h = Harness::boot(NodeConfig::default());
    h.rng.0 = 100;
    h.tick_at(0).unwrap();
    h.inject(broadcast(data_types::ALLOCATION, Some(1), &allocator_echo(0, 6)));
    h.tick_at(100).unwrap();

    // Another allocatee's request.
    h.inject(broadcast(data_types::ALLOCATION, None, &allocator_echo(0, 6)));
    h.tick_at(120).unwrap();
    assert_eq!(h.node.allocation().matched_prefix_len(), 0);
    assert!(h.node.local_node_id().is_none());
}

#[test]
fn static_node_never_allocates() {
    let mut h = Harness::allocated(17);
    for t in [0, 600, 1_200, 2_400] {
        h.tick_at(t).unwrap();
    }
    assert!(allocation_requests(&h).is_empty());
    assert_eq!(h.node.local_node_id(), NodeId::new(17));
}

#[test]
fn no_status_until_allocated() {
    let mut h = Harness::boot(NodeConfig::default());
    for t in [0, 1_000, 2_000, 3_000] {
        h.tick_at(t).unwrap();
    }
    assert!(h.sent(data_types::NODE_STATUS, TransferKind::Broadcast).is_empty());
    assert_eq!(h.node.status().transfer_id().get(), 0);
}
