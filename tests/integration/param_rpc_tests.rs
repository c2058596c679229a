//! param.GetSet / param.ExecuteOpcode over the pump, with NVS-backed slots.

use cannode::adapters::nvs::NvsAdapter;
use cannode::app::events::NodeEvent;
use cannode::app::ports::ParamStorage;
use cannode::config::NodeConfig;
use cannode::dronecan::messages::{
    Allocation, ExecuteOpcodeRequest, ExecuteOpcodeResponse, GetSetRequest, GetSetResponse,
    Message, NumericValue, OPCODE_ERASE, OPCODE_SAVE, ParamName, ParamValue, bounded_bytes,
};
use cannode::dronecan::{NodeId, TransferId, TransferKind, data_types};

use crate::mock_bus::{Harness, request};

fn get_set(index: u16, value: ParamValue, name: &str) -> Vec<u8> {
    GetSetRequest {
        index,
        value,
        name: bounded_bytes(name),
    }
    .encode()
    .to_vec()
}

fn last_get_set(h: &Harness) -> GetSetResponse {
    h.sent(data_types::PARAM_GET_SET, TransferKind::Response)
        .last()
        .unwrap()
        .decode()
}

#[test]
fn set_by_name_then_get_by_index() {
    let mut h = Harness::allocated(20);

    h.inject(request(data_types::PARAM_GET_SET, 9, 4, &get_set(0, ParamValue::Integer(55), "NODEID")));
    h.tick_at(10).unwrap();

    let reply = last_get_set(&h);
    assert_eq!(reply.value, ParamValue::Integer(55));
    assert_eq!(reply.name.as_slice(), b"NODEID");
    assert_eq!(reply.min_value, NumericValue::Integer(0));
    assert_eq!(reply.max_value, NumericValue::Integer(127));

    // Persisted before the response went out.
    assert_eq!(h.storage.read_slot(0), Ok(55.0));
    assert!(h.events.events.contains(&NodeEvent::ParamWritten { index: 0, value: 55.0 }));

    h.inject(request(data_types::PARAM_GET_SET, 9, 5, &get_set(0, ParamValue::Empty, "")));
    h.tick_at(20).unwrap();
    assert_eq!(last_get_set(&h).value, ParamValue::Integer(55));
}

#[test]
fn response_echoes_request_addressing() {
    let mut h = Harness::allocated(20);
    h.inject(request(data_types::PARAM_GET_SET, 9, 17, &get_set(3, ParamValue::Empty, "")));
    h.tick_at(10).unwrap();

    let sent = h.sent(data_types::PARAM_GET_SET, TransferKind::Response);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].destination, NodeId::new(9));
    assert_eq!(sent[0].transfer_id, TransferId::new(17));
    let reply: GetSetResponse = sent[0].decode();
    assert_eq!(reply.name.as_slice(), b"PARM_3");
    assert_eq!(reply.max_value, NumericValue::Real(3.0));
}

#[test]
fn unknown_index_and_name_yield_empty_reply() {
    let mut h = Harness::allocated(20);
    h.inject(request(data_types::PARAM_GET_SET, 9, 1, &get_set(100, ParamValue::Empty, "")));
    h.tick_at(10).unwrap();
    assert_eq!(last_get_set(&h), GetSetResponse::empty());

    h.inject(request(data_types::PARAM_GET_SET, 9, 2, &get_set(0, ParamValue::Real(1.0), "NOPE")));
    h.tick_at(20).unwrap();
    assert_eq!(last_get_set(&h).name, ParamName::new());
    assert_eq!(h.storage.read_slot(0), Err(cannode::app::ports::StorageError::NotFound));
}

#[test]
fn wrong_value_kind_reads_without_writing() {
    let mut h = Harness::allocated(20);
    h.inject(request(data_types::PARAM_GET_SET, 9, 1, &get_set(0, ParamValue::Real(9.0), "PARM_1")));
    h.tick_at(10).unwrap();
    assert_eq!(last_get_set(&h).value, ParamValue::Real(9.0));

    h.inject(request(data_types::PARAM_GET_SET, 9, 2, &get_set(0, ParamValue::Integer(3), "PARM_1")));
    h.tick_at(20).unwrap();
    assert_eq!(last_get_set(&h).value, ParamValue::Real(9.0));
}

#[test]
fn erase_restores_defaults_and_persists_them() {
    let mut h = Harness::allocated(20);
    h.inject(request(data_types::PARAM_GET_SET, 9, 1, &get_set(0, ParamValue::Real(0.5), "PARM_1")));
    h.tick_at(10).unwrap();

    let erase = ExecuteOpcodeRequest {
        opcode: OPCODE_ERASE,
        argument: 0,
    }
    .encode();
    h.inject(request(data_types::PARAM_EXECUTE_OPCODE, 9, 2, &erase));
    h.tick_at(20).unwrap();

    let reply: ExecuteOpcodeResponse = h
        .sent(data_types::PARAM_EXECUTE_OPCODE, TransferKind::Response)[0]
        .decode();
    assert!(reply.ok);
    assert_eq!(h.node.params().get(1).map(|p| p.value), Some(0.0));
    assert_eq!(h.storage.read_slot(4), Ok(0.0));
    assert!(h.events.events.contains(&NodeEvent::ParamsErased));
}

#[test]
fn unknown_opcode_is_refused() {
    let mut h = Harness::allocated(20);
    let req = ExecuteOpcodeRequest {
        opcode: 7,
        argument: 0,
    }
    .encode();
    h.inject(request(data_types::PARAM_EXECUTE_OPCODE, 9, 1, &req));
    h.tick_at(10).unwrap();
    let reply: ExecuteOpcodeResponse = h
        .sent(data_types::PARAM_EXECUTE_OPCODE, TransferKind::Response)[0]
        .decode();
    assert!(!reply.ok);
}

#[test]
fn saved_nodeid_becomes_preferred_address_after_reboot() {
    let mut h = Harness::allocated(20);
    h.inject(request(data_types::PARAM_GET_SET, 9, 1, &get_set(0, ParamValue::Integer(55), "NODEID")));
    h.tick_at(10).unwrap();
    let save = ExecuteOpcodeRequest {
        opcode: OPCODE_SAVE,
        argument: 0,
    }
    .encode();
    h.inject(request(data_types::PARAM_EXECUTE_OPCODE, 9, 2, &save));
    h.tick_at(20).unwrap();
    assert!(h.events.events.contains(&NodeEvent::ParamsSaved));

    // Reboot on the same flash, this time without a static address.
    let storage: NvsAdapter = h.storage;
    cannode::app::ports::ConfigPort::save(&storage, &NodeConfig::default()).unwrap();
    let mut rebooted = Harness::boot_with_storage(storage);
    assert_eq!(rebooted.node.params().get(0).map(|p| p.value), Some(55.0));

    rebooted.tick_at(0).unwrap();
    let req: Allocation = rebooted.sent(data_types::ALLOCATION, TransferKind::Broadcast)[0].decode();
    assert_eq!(req.node_id, 55);
}
