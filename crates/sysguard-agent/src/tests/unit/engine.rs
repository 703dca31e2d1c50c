//! Engine correlation, dedup and failure handling.

use std::io;
use std::sync::Arc;
use std::sync::mpsc;

use rstest::rstest;

use crate::engine::Engine;
use crate::events::{EngineEvents, EngineId, HostEventKind, HostStatus};
use crate::request::{Request, SensorClient};
use crate::tests::support::{BANNER, Delivery, RecordingClient, TestWorld, ready_world};
use crate::transport::{MockCommandSink, TransportError};

#[rstest]
fn answers_and_unknown_sensors_reach_their_clients(mut ready_world: TestWorld) {
    assert!(ready_world.request("A", "cpu/load", 1));
    ready_world.reply("3.2");
    assert!(ready_world.request("B", "bogus/sensor", 2));
    ready_world.reply("UNKNOWN COMMAND");

    assert_eq!(
        ready_world.client("A").deliveries(),
        vec![Delivery::answer(1, &["3.2"])]
    );
    assert_eq!(ready_world.client("B").deliveries(), vec![Delivery::Lost(2)]);
}

#[rstest]
fn blank_line_before_the_prompt_keeps_unknown_sensors_lost(mut ready_world: TestWorld) {
    assert!(ready_world.request("B", "bogus/sensor", 2));
    ready_world.engine.receive(b"UNKNOWN COMMAND\n\nksysguardd> ");
    assert!(ready_world.request("A", "cpu/load", 1));
    ready_world.engine.receive(b"3.2\n\nksysguardd> ");

    assert_eq!(ready_world.client("B").deliveries(), vec![Delivery::Lost(2)]);
    assert_eq!(
        ready_world.client("A").deliveries(),
        vec![Delivery::answer(1, &["3.2"])]
    );
}

#[rstest]
fn banner_brings_engine_online_without_callbacks() {
    let mut world = TestWorld::offline();
    assert!(world.request("A", "cpu/load", 1));
    assert!(world.written().is_empty(), "nothing is written before the prompt");

    world.engine.receive(BANNER);

    assert!(world.engine.is_online());
    assert!(world.client("A").deliveries().is_empty());
    assert_eq!(world.written(), vec![String::from("cpu/load")]);
    assert_eq!(world.engine.in_flight(), 1);
}

#[rstest]
fn commands_are_written_one_at_a_time_in_order(mut ready_world: TestWorld) {
    for (id, sensor) in (1..).zip(["cpu/load", "mem/free", "net/eth0/receiver/data"]) {
        assert!(ready_world.request("A", sensor, id));
    }
    assert_eq!(ready_world.written(), vec![String::from("cpu/load")]);
    assert_eq!(ready_world.engine.queued(), 2);

    for value in ["3.2", "1024", "77"] {
        ready_world.reply(value);
    }

    assert_eq!(
        ready_world.written(),
        vec![
            String::from("cpu/load"),
            String::from("mem/free"),
            String::from("net/eth0/receiver/data"),
        ]
    );
    assert_eq!(
        ready_world.client("A").deliveries(),
        vec![
            Delivery::answer(1, &["3.2"]),
            Delivery::answer(2, &["1024"]),
            Delivery::answer(3, &["77"]),
        ]
    );
}

#[rstest]
fn duplicate_outstanding_requests_are_ignored(mut ready_world: TestWorld) {
    assert!(ready_world.request("A", "cpu/load", 1));
    assert!(!ready_world.request("A", "cpu/load", 1));
    assert!(ready_world.request("A", "cpu/load", 2), "a different id is distinct");

    ready_world.reply("3.2");
    ready_world.reply("3.3");

    assert_eq!(
        ready_world.written(),
        vec![String::from("cpu/load"), String::from("cpu/load")]
    );
    assert_eq!(
        ready_world.client("A").deliveries(),
        vec![Delivery::answer(1, &["3.2"]), Delivery::answer(2, &["3.3"])]
    );
    assert!(ready_world.request("A", "cpu/load", 1), "resolved keys are released");
}

#[rstest]
fn disconnected_client_is_skipped_without_breaking_order(mut ready_world: TestWorld) {
    ready_world.request("A", "cpu/load", 1);
    ready_world.request("B", "mem/free", 2);
    ready_world.request("A", "cpu/idle", 3);
    ready_world.disconnect("A");

    ready_world.reply("3.2");
    ready_world.reply("1024");
    ready_world.reply("95");

    assert!(ready_world.client("A").deliveries().is_empty());
    assert_eq!(
        ready_world.client("B").deliveries(),
        vec![Delivery::answer(2, &["1024"])]
    );
    assert_eq!(ready_world.written().len(), 3);
}

#[rstest]
fn disconnect_releases_dedup_keys(mut ready_world: TestWorld) {
    ready_world.request("A", "cpu/load", 1);
    ready_world.disconnect("A");

    assert!(ready_world.request("A", "cpu/load", 1));
    ready_world.reply("3.2");
    ready_world.reply("3.4");

    assert_eq!(
        ready_world.client("A").deliveries(),
        vec![Delivery::answer(1, &["3.4"])]
    );
}

#[rstest]
fn dropped_client_answers_are_discarded(mut ready_world: TestWorld) {
    let transient: Arc<dyn SensorClient> = RecordingClient::new();
    ready_world
        .engine
        .send_request(Request::new("cpu/load", &transient, 1));
    ready_world.request("B", "mem/free", 2);
    drop(transient);

    ready_world.reply("3.2");
    ready_world.reply("1024");

    assert_eq!(
        ready_world.client("B").deliveries(),
        vec![Delivery::answer(2, &["1024"])]
    );
}

#[rstest]
fn anonymous_requests_are_consumed_silently(mut ready_world: TestWorld) {
    ready_world
        .engine
        .send_request(Request::anonymous("monitors", 0));
    ready_world.request("A", "cpu/load", 1);

    ready_world
        .engine
        .receive(b"cpu/load\tfloat\nmem/free\tinteger\nksysguardd> ");
    ready_world.reply("3.2");

    assert_eq!(
        ready_world.client("A").deliveries(),
        vec![Delivery::answer(1, &["3.2"])]
    );
}

#[rstest]
fn unsolicited_prompt_is_discarded(mut ready_world: TestWorld) {
    ready_world.reply("stray");
    ready_world.request("A", "cpu/load", 1);
    ready_world.reply("3.2");

    assert_eq!(
        ready_world.client("A").deliveries(),
        vec![Delivery::answer(1, &["3.2"])]
    );
}

#[rstest]
fn multi_line_answers_keep_their_lines(mut ready_world: TestWorld) {
    ready_world.request("A", "ps", 1);
    ready_world
        .engine
        .receive(b"1\tinit\t0\n2\tkthreadd\t0\nksysguardd> ");

    assert_eq!(
        ready_world.client("A").deliveries(),
        vec![Delivery::answer(1, &["1\tinit\t0", "2\tkthreadd\t0"])]
    );
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(5)]
fn fragmented_streams_deliver_the_same_answers(#[case] size: usize) {
    let stream: &[u8] = b"ksysguardd 4.0.0\nksysguardd> 3.2\n\x1bhot\x1bksysguardd> \
        UNKNOWN COMMAND\nksysguardd> 1024\nksysguardd> ";
    let mut world = TestWorld::offline();
    world.request("A", "cpu/load", 1);
    world.request("B", "bogus/sensor", 2);
    world.request("A", "mem/free", 3);

    for piece in stream.chunks(size) {
        world.engine.receive(piece);
    }

    assert_eq!(
        world.client("A").deliveries(),
        vec![Delivery::answer(1, &["3.2"]), Delivery::answer(3, &["1024"])]
    );
    assert_eq!(world.client("B").deliveries(), vec![Delivery::Lost(2)]);
    assert_eq!(
        world.host_events(),
        vec![HostEventKind::Notification(String::from("hot"))]
    );
}

#[rstest]
fn out_of_band_text_becomes_host_events(mut ready_world: TestWorld) {
    ready_world.engine.receive(b"\x1bdisk almost");
    ready_world.engine.receive(b" full\x1b\x1bRECONFIGURE\x1b");

    assert_eq!(
        ready_world.host_events(),
        vec![
            HostEventKind::Notification(String::from("disk almost full")),
            HostEventKind::Reconfigure,
        ]
    );
}

#[rstest]
fn restart_drops_the_awaited_request_and_waits_for_a_new_banner(mut ready_world: TestWorld) {
    ready_world.request("A", "cpu/load", 1);
    ready_world.request("A", "mem/free", 2);

    ready_world.engine.restart_session();
    assert!(!ready_world.engine.is_online());
    assert_eq!(ready_world.engine.in_flight(), 0);

    ready_world.engine.receive(BANNER);
    ready_world.reply("1024");

    assert_eq!(
        ready_world.written(),
        vec![String::from("cpu/load"), String::from("mem/free")]
    );
    assert_eq!(
        ready_world.client("A").deliveries(),
        vec![Delivery::answer(2, &["1024"])]
    );
    assert!(ready_world.request("A", "cpu/load", 1), "dropped keys are released");
}

#[rstest]
fn write_failure_takes_the_engine_offline_and_reports_it() {
    let mut sink = MockCommandSink::new();
    sink.expect_write()
        .withf(|bytes| bytes.starts_with(b"cpu/load") && bytes.ends_with(b"\n"))
        .times(1)
        .returning(|_| {
            Err(TransportError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "pipe closed",
            )))
        });
    let (sender, events) = mpsc::channel();
    let status = HostStatus::new("alpha");
    let mut engine = Engine::new(
        sink,
        EngineEvents::new(EngineId::new(7), "alpha", sender),
        Arc::clone(&status),
    );
    engine.receive(BANNER);
    let client: Arc<dyn SensorClient> = RecordingClient::new();

    assert!(engine.send_request(Request::new("cpu/load", &client, 1)));
    assert!(engine.send_request(Request::new("mem/free", &client, 2)));

    assert!(!engine.is_online());
    assert!(!status.is_online());
    assert_eq!(engine.in_flight(), 1);
    assert_eq!(engine.queued(), 1);
    let reason = status.offline_reason().expect("offline reason recorded");
    assert!(reason.contains("pipe closed"), "unexpected reason: {reason}");
    let kinds: Vec<HostEventKind> = events.try_iter().map(|event| event.kind).collect();
    assert!(matches!(kinds.as_slice(), [HostEventKind::WriteFailed(_)]));
}
