//! Client and server peers exchanging real packets over simulated links.

use glam::Vec2;
use strider_movement::{ActorEvent, DiscardSink, MoveInput};
use strider_network::LinkConditions;
use strider_state::{CombineConfig, PredictorConfig};
use strider_test_utils::{init_test_logging, InputScript, LoopbackHarness, NetworkConditions};

/// Clear both links so everything still owed can arrive.
fn heal(harness: &mut LoopbackHarness) {
    harness
        .client
        .transport_mut()
        .set_conditions(LinkConditions::default());
    harness
        .server
        .transport_mut()
        .set_conditions(LinkConditions::default());
}

/// Accepted steps may leave sub-tolerance differences behind, so after loss
/// the peers agree within the validator's tolerances rather than bit for bit.
fn assert_agree(harness: &LoopbackHarness) {
    let client = harness.client.predictor().actor().snapshot();
    let server = harness.server.validator().actor().snapshot();
    let tolerances = harness.server.validator().config();
    let error = client.position.distance(server.position);
    assert!(error <= tolerances.position_tolerance, "position error {error}");
    assert!((client.stamina - server.stamina).abs() <= tolerances.stamina_threshold);
    assert!((client.charge - server.charge).abs() <= tolerances.charge_threshold);
    assert_eq!(client.grounded, server.grounded);
    assert_eq!(harness.client.predictor().pending(), 0);
}

#[test]
fn perfect_link_never_corrects() {
    init_test_logging();
    for combine in [CombineConfig::default(), CombineConfig::disabled()] {
        let mut harness = LoopbackHarness::new(
            NetworkConditions::perfect(),
            strider::Scenario::Walk.world(),
            PredictorConfig {
                combine,
                ..PredictorConfig::default()
            },
            1,
        )
        .expect("harness");
        harness.run(&InputScript::parkour()).expect("run");
        harness.settle().expect("settle");

        assert!(harness.client.is_connected());
        assert_eq!(harness.server.validator().stats().corrected(), 0);
        assert_eq!(harness.client.predictor().stats().corrections_applied, 0);
        assert_eq!(harness.client.predictor().pending(), 0);
        assert!(harness.in_sync());
        assert_eq!(harness.client.stats().decode_failures, 0);
        assert_eq!(harness.server.stats().decode_failures, 0);
    }
}

#[test]
fn lost_batches_are_repaired_by_corrections() {
    init_test_logging();
    let mut harness =
        LoopbackHarness::flat(NetworkConditions::lossy_uplink(0.3), 7).expect("harness");
    harness.run(&InputScript::parkour()).expect("run");

    assert!(harness.client.transport_mut().stats().dropped > 0);
    assert!(harness.server.validator().stats().corrected() > 0);
    assert!(harness.client.predictor().stats().corrections_applied > 0);

    heal(&mut harness);
    harness
        .run(&InputScript::new().walk(Vec2::X, 30).idle(30))
        .expect("run");
    harness.settle().expect("settle");
    assert_agree(&harness);
}

#[test]
fn reordering_and_duplicates_converge() {
    init_test_logging();
    let conditions = NetworkConditions::symmetric(LinkConditions {
        packet_loss: 0.05,
        latency_ms: 50,
        jitter_ms: 80,
        duplicate_probability: 0.2,
    });
    let mut harness = LoopbackHarness::flat(conditions, 11).expect("harness");
    harness.run(&InputScript::random(11, 400)).expect("run");

    // Duplicated and overtaken batches are refused, not re-simulated
    assert!(harness.server.validator().stats().rejected > 0);

    heal(&mut harness);
    harness.run(&InputScript::new().idle(60)).expect("run");
    harness.settle().expect("settle");
    assert_agree(&harness);
}

#[test]
fn server_gameplay_change_reaches_client() {
    init_test_logging();
    let mut harness = LoopbackHarness::flat(NetworkConditions::perfect(), 3).expect("harness");
    harness
        .run(&InputScript::new().walk(Vec2::Y, 30))
        .expect("run");

    harness
        .server
        .validator_mut()
        .actor_mut()
        .stamina
        .set(10.0, &mut DiscardSink);
    harness
        .run(&InputScript::new().walk(Vec2::Y, 10))
        .expect("run");
    harness.settle().expect("settle");

    assert!(harness.server.validator().stats().stamina >= 1);
    assert!(harness.in_sync());
    let client_stamina = harness.client.predictor().actor().stamina.value();
    assert!(client_stamina < 20.0, "stamina {client_stamina}");
}

#[test]
fn dash_pulse_survives_the_wire() {
    init_test_logging();
    let mut harness = LoopbackHarness::flat(NetworkConditions::perfect(), 5).expect("harness");
    harness
        .run(
            &InputScript::new()
                .walk(Vec2::X, 10)
                .dash(Vec2::X)
                .walk(Vec2::X, 60),
        )
        .expect("run");
    harness.settle().expect("settle");

    let events = harness.client.drain_events();
    let finished = events
        .iter()
        .filter(|e| matches!(e, strider_movement::ActorEvent::TransitionFinished { .. }))
        .count();
    assert_eq!(finished, 1);
    assert!(harness.in_sync());
    assert_eq!(harness.server.validator().stats().corrected(), 0);
}

#[test]
fn lost_crouch_edge_is_resent_until_acknowledged() {
    init_test_logging();
    let mut harness = LoopbackHarness::flat(NetworkConditions::perfect(), 13).expect("harness");
    harness.run(&InputScript::new().idle(10)).expect("run");
    harness.server.validator_mut().drain_events();

    // Only the datagram carrying the crouch start goes missing
    harness
        .client
        .transport_mut()
        .set_conditions(LinkConditions {
            packet_loss: 1.0,
            ..Default::default()
        });
    harness
        .tick(MoveInput::default().with_crouch())
        .expect("tick");
    heal(&mut harness);
    assert_eq!(harness.client.transport_mut().stats().dropped, 1);

    harness.run(&InputScript::new().idle(30)).expect("run");
    harness.settle().expect("settle");

    let events = harness.server.validator_mut().drain_events();
    assert!(events.contains(&ActorEvent::CrouchStarted), "{events:?}");
    assert!(events.contains(&ActorEvent::UncrouchStarted), "{events:?}");
    assert!(harness.client.predictor().stats().resent_important >= 1);
    assert_eq!(harness.client.predictor().pending(), 0);
}

#[test]
fn idle_client_sends_little() {
    let mut harness = LoopbackHarness::flat(NetworkConditions::perfect(), 9).expect("harness");
    for _ in 0..120 {
        harness.tick(MoveInput::default()).expect("tick");
    }
    harness.settle().expect("settle");

    // Resting steps merge up to the combine limit and encode minimally
    let stats = harness.client.stats();
    assert!(stats.messages_sent <= 62, "sent {}", stats.messages_sent);
    assert!(harness.client.predictor().stats().combined > 0);
}
