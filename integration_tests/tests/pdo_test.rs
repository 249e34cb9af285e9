use std::sync::{Arc, Mutex};

use drivecan_client::{
    PdoConfigError, PdoConfiguration, PdoTransmissionType, ReceivePdo, SdoClient, TransmitPdo,
};
use integration_tests::mock_bus::{MockBus, MockSender};

mod utils;
use utils::{respond_in_order, sdo_frame, TIMEOUT};

const NODE_ID: u8 = 0x05;

const RPDO_COMM: u16 = 0x1400;
const RPDO_MAPPING: u16 = 0x1600;
const TPDO_COMM: u16 = 0x1800;
const TPDO_MAPPING: u16 = 0x1A00;

const INHIBIT_TIME: u16 = 0x1234;
const EVENT_TIMER: u16 = 0x5678;

const MAPPING1: u16 = 0x1111;
const MAPPING1_SUB: u8 = 0x45;
const MAPPING2: u16 = 0x2000;

fn setup() -> (MockBus, Arc<SdoClient<MockSender>>) {
    let bus = MockBus::new();
    let sdo = Arc::new(SdoClient::new(NODE_ID, bus.new_sender(), TIMEOUT));
    (bus, sdo)
}

fn confirms(n: usize) -> Vec<[u8; 8]> {
    vec![sdo_frame(0x60, 0, 0, 0); n]
}

#[test]
fn receive_pdo_configure_sequence() {
    let (bus, sdo) = setup();
    let rpdo = ReceivePdo::new(NODE_ID, 0x200, 1, sdo.clone(), bus.new_sender());
    let cob_id = 0x205u32;
    assert_eq!(rpdo.cob_id(), 0x205);

    let mut conf = PdoConfiguration::new();
    conf.set_transmission_type(PdoTransmissionType::SynchronousAcyclic);
    conf.set_inhibit_time(INHIBIT_TIME);
    conf.set_event_timer(EVENT_TIMER);
    conf.add_mapping::<i16>(MAPPING1, MAPPING1_SUB).add_mapping::<i32>(MAPPING2, 0);
    conf.set_valid(true);

    let mut responses = vec![sdo_frame(0x43, RPDO_COMM, 0x01, cob_id)];
    responses.extend(confirms(9));
    let responder = respond_in_order(sdo.clone(), responses);
    rpdo.configure(&conf).unwrap();
    responder.join().unwrap();

    assert_eq!(bus.message_count(), 10);
    for i in 0..10 {
        assert_eq!(bus.message(i).id().raw(), 0x605);
        assert_eq!(bus.message(i).data().len(), 8);
    }

    assert_eq!(bus.message(0).data(), sdo_frame(0x40, RPDO_COMM, 0x01, 0));
    assert_eq!(bus.message(1).data(), sdo_frame(0x23, RPDO_COMM, 0x01, cob_id | 1 << 31));
    assert_eq!(bus.message(2).data(), sdo_frame(0x2F, RPDO_COMM, 0x02, 0));
    assert_eq!(bus.message(3).data(), sdo_frame(0x2B, RPDO_COMM, 0x03, INHIBIT_TIME as u32));
    assert_eq!(bus.message(4).data(), sdo_frame(0x2B, RPDO_COMM, 0x05, EVENT_TIMER as u32));
    assert_eq!(bus.message(5).data(), sdo_frame(0x2F, RPDO_MAPPING, 0x00, 0));
    assert_eq!(
        bus.message(6).data(),
        sdo_frame(0x23, RPDO_MAPPING, 0x01, (MAPPING1 as u32) << 16 | (MAPPING1_SUB as u32) << 8 | 16)
    );
    assert_eq!(
        bus.message(7).data(),
        sdo_frame(0x23, RPDO_MAPPING, 0x02, (MAPPING2 as u32) << 16 | 32)
    );
    assert_eq!(bus.message(8).data(), sdo_frame(0x2F, RPDO_MAPPING, 0x00, 2));
    assert_eq!(bus.message(9).data(), sdo_frame(0x23, RPDO_COMM, 0x01, cob_id));
}

#[test]
fn receive_pdo_write_packs_mapped_values() {
    let (bus, sdo) = setup();
    let rpdo = ReceivePdo::new(NODE_ID, 0x200, 1, sdo, bus.new_sender());

    rpdo.write((0x1234i16, 0x98765432u32 as i32)).unwrap();

    let msg = bus.last_message();
    assert_eq!(msg.id().raw(), 0x205);
    assert_eq!(msg.data().len(), 6);
    assert_eq!(msg.data(), &[0x34, 0x12, 0x32, 0x54, 0x76, 0x98]);
}

#[test]
fn receive_pdo_rejects_rtr_before_writing() {
    let (bus, sdo) = setup();
    let rpdo = ReceivePdo::new(NODE_ID, 0x200, 1, sdo.clone(), bus.new_sender());

    let mut conf = PdoConfiguration::new();
    conf.set_rtr(true);
    conf.set_valid(true);

    // Only the COB-ID read happens; the failure comes before the first write
    let responder = respond_in_order(sdo.clone(), vec![sdo_frame(0x43, RPDO_COMM, 0x01, 0x205)]);
    let result = rpdo.configure(&conf);
    responder.join().unwrap();

    assert_eq!(result, Err(PdoConfigError::UnsupportedProperty { property: "RTR" }));
    assert_eq!(bus.message_count(), 1);
    assert_eq!(bus.message(0).data(), sdo_frame(0x40, RPDO_COMM, 0x01, 0));
}

#[test]
fn receive_pdo_rejects_sync_start_before_writing() {
    let (bus, sdo) = setup();
    let rpdo = ReceivePdo::new(NODE_ID, 0x200, 1, sdo.clone(), bus.new_sender());

    let mut conf = PdoConfiguration::new();
    conf.set_sync_start(0x77);

    let responder = respond_in_order(sdo.clone(), vec![sdo_frame(0x43, RPDO_COMM, 0x01, 0x205)]);
    let result = rpdo.configure(&conf);
    responder.join().unwrap();

    assert_eq!(
        result,
        Err(PdoConfigError::UnsupportedProperty { property: "sync start value" })
    );
    assert_eq!(bus.message_count(), 1);
}

#[test]
fn transmit_pdo_configure_sequence() {
    let (bus, sdo) = setup();
    let tpdo = TransmitPdo::new(NODE_ID, 0x180, 1, sdo.clone());
    let cob_id = 0x185u32;
    assert_eq!(tpdo.cob_id(), 0x185);

    let mut conf = PdoConfiguration::new();
    conf.set_rtr(false);
    conf.set_transmission_type(PdoTransmissionType::SynchronousCyclic(0x04));
    conf.set_inhibit_time(INHIBIT_TIME);
    conf.set_event_timer(EVENT_TIMER);
    conf.set_sync_start(0x77);
    conf.add_mapping::<i16>(MAPPING1, MAPPING1_SUB).add_mapping::<i32>(MAPPING2, 0);
    conf.set_valid(true);

    let mut responses = vec![sdo_frame(0x43, TPDO_COMM, 0x01, cob_id)];
    responses.extend(confirms(10));
    let responder = respond_in_order(sdo.clone(), responses);
    tpdo.configure(&conf).unwrap();
    responder.join().unwrap();

    assert_eq!(bus.message_count(), 11);
    for i in 0..11 {
        assert_eq!(bus.message(i).id().raw(), 0x605);
        assert_eq!(bus.message(i).data().len(), 8);
    }

    assert_eq!(bus.message(0).data(), sdo_frame(0x40, TPDO_COMM, 0x01, 0));
    assert_eq!(
        bus.message(1).data(),
        sdo_frame(0x23, TPDO_COMM, 0x01, cob_id | 1 << 31 | 1 << 30)
    );
    assert_eq!(bus.message(2).data(), sdo_frame(0x2F, TPDO_COMM, 0x02, 0x04));
    assert_eq!(bus.message(3).data(), sdo_frame(0x2B, TPDO_COMM, 0x03, INHIBIT_TIME as u32));
    assert_eq!(bus.message(4).data(), sdo_frame(0x2B, TPDO_COMM, 0x05, EVENT_TIMER as u32));
    assert_eq!(bus.message(5).data(), sdo_frame(0x2F, TPDO_COMM, 0x06, 0x77));
    assert_eq!(bus.message(6).data(), sdo_frame(0x2F, TPDO_MAPPING, 0x00, 0));
    assert_eq!(
        bus.message(7).data(),
        sdo_frame(0x23, TPDO_MAPPING, 0x01, (MAPPING1 as u32) << 16 | (MAPPING1_SUB as u32) << 8 | 16)
    );
    assert_eq!(
        bus.message(8).data(),
        sdo_frame(0x23, TPDO_MAPPING, 0x02, (MAPPING2 as u32) << 16 | 32)
    );
    assert_eq!(bus.message(9).data(), sdo_frame(0x2F, TPDO_MAPPING, 0x00, 2));
    assert_eq!(bus.message(10).data(), sdo_frame(0x23, TPDO_COMM, 0x01, cob_id | 1 << 30));
}

#[test]
fn configure_reports_failing_step() {
    let (bus, sdo) = setup();
    let rpdo = ReceivePdo::new(NODE_ID, 0x200, 1, sdo.clone(), bus.new_sender());

    let mut conf = PdoConfiguration::new();
    conf.set_transmission_type(PdoTransmissionType::EventDrivenManufacturer);
    conf.set_valid(true);

    // COB-ID read and disable succeed; the transmission type write aborts
    let responses = vec![
        sdo_frame(0x43, RPDO_COMM, 0x01, 0x205),
        sdo_frame(0x60, 0, 0, 0),
        sdo_frame(0x80, RPDO_COMM, 0x02, 0x0601_0002),
    ];
    let responder = respond_in_order(sdo.clone(), responses);
    let result = rpdo.configure(&conf);
    responder.join().unwrap();

    match result {
        Err(PdoConfigError::Transfer { step, .. }) => assert_eq!(step, "transmission type"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn transmit_pdo_dispatches_to_registered_handler() {
    let (_bus, sdo) = setup();
    let tpdo = TransmitPdo::new(NODE_ID, 0x180, 1, sdo);

    // No handler attached yet
    assert!(!tpdo.accept(&[]));

    let received: Arc<Mutex<Option<(u8, i16, u32)>>> = Arc::new(Mutex::new(None));
    let slot = received.clone();
    tpdo.register_handler(move |values: (u8, i16, u32)| {
        *slot.lock().unwrap() = Some(values);
    });

    let mut raw = [0u8; 7];
    raw[0] = 0x12;
    raw[1..3].copy_from_slice(&0x1234i16.to_le_bytes());
    raw[3..7].copy_from_slice(&0x12345678u32.to_le_bytes());
    assert!(tpdo.accept(&raw));

    assert_eq!(*received.lock().unwrap(), Some((0x12, 0x1234, 0x12345678)));

    // Payload shorter than the registered layout is refused
    assert!(!tpdo.accept(&raw[..6]));

    tpdo.unregister_handler();
    assert!(!tpdo.accept(&raw));
}

#[test]
fn reregistration_replaces_handler() {
    let (_bus, sdo) = setup();
    let tpdo = TransmitPdo::new(NODE_ID, 0x180, 1, sdo);

    let first: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
    let second: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));

    let slot = first.clone();
    tpdo.register_handler(move |value: u32| *slot.lock().unwrap() = value);
    let slot = second.clone();
    tpdo.register_handler(move |value: u32| *slot.lock().unwrap() = value);

    assert!(tpdo.accept(&0xDEADBEEFu32.to_le_bytes()));
    assert_eq!(*first.lock().unwrap(), 0);
    assert_eq!(*second.lock().unwrap(), 0xDEADBEEF);
}
