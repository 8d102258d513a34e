use strider::{run_realtime, run_session, Scenario, SessionConfig};
use strider_network::CompressionAlgorithm;
use strider_test_utils::{init_test_logging, NetworkConditions};

#[test]
fn every_honest_scenario_stays_in_sync() {
    init_test_logging();
    for scenario in [
        Scenario::Walk,
        Scenario::Sprint,
        Scenario::Dash,
        Scenario::Ledge,
        Scenario::Crouch,
    ] {
        let report = run_session(&SessionConfig {
            scenario,
            ticks: 900,
            ..SessionConfig::default()
        })
        .expect("session");

        assert_eq!(report.validation.corrected(), 0, "{scenario:?}");
        assert_eq!(report.validation.rejected, 0, "{scenario:?}");
        assert_eq!(report.pending_steps, 0, "{scenario:?}");
        assert!(report.in_sync, "{scenario:?}:\n{report}");
    }
}

#[test]
fn desync_scenario_is_corrected_each_time() {
    init_test_logging();
    let report = run_session(&SessionConfig {
        scenario: Scenario::Desync,
        ticks: 600,
        ..SessionConfig::default()
    })
    .expect("session");

    assert_eq!(report.interventions, 5);
    assert!(report.validation.stamina >= 5);
    assert!(report.prediction.corrections_applied >= 5);
    assert!(report.in_sync, "{report}");
}

#[test]
fn same_seed_same_run() {
    let config = SessionConfig {
        scenario: Scenario::Dash,
        ticks: 480,
        uplink: NetworkConditions::poor().uplink,
        downlink: NetworkConditions::poor().downlink,
        seed: 1234,
        ..SessionConfig::default()
    };
    let a = run_session(&config).expect("session");
    let b = run_session(&config).expect("session");

    assert_eq!(a.uplink.dropped, b.uplink.dropped);
    assert_eq!(a.downlink.dropped, b.downlink.dropped);
    assert_eq!(a.validation.corrected(), b.validation.corrected());
    assert_eq!(a.prediction.replayed_steps, b.prediction.replayed_steps);
    assert_eq!(a.final_divergence, b.final_divergence);
}

#[test]
fn forced_compression_round_trips() {
    for algorithm in [CompressionAlgorithm::Lz4, CompressionAlgorithm::Zstd] {
        let report = run_session(&SessionConfig {
            scenario: Scenario::Sprint,
            ticks: 240,
            compression: Some(algorithm),
            ..SessionConfig::default()
        })
        .expect("session");
        assert_eq!(report.server_traffic.decode_failures, 0, "{algorithm:?}");
        assert!(report.in_sync, "{algorithm:?}");
    }
}

#[test]
fn invalid_movement_config_is_reported() {
    let mut config = SessionConfig::default();
    config.movement.stamina.max = -1.0;
    let err = run_session(&config).expect_err("negative max");
    assert!(format!("{err:#}").contains("Invalid movement configuration"));
}

#[tokio::test(start_paused = true)]
async fn realtime_server_task_agrees() {
    init_test_logging();
    let report = run_realtime(SessionConfig {
        scenario: Scenario::Dash,
        ticks: 240,
        ..SessionConfig::default()
    })
    .await
    .expect("session");

    assert_eq!(report.validation.corrected(), 0);
    assert_eq!(report.pending_steps, 0);
    assert!(report.in_sync, "{report}");
}

#[tokio::test]
async fn realtime_refuses_desync() {
    let err = run_realtime(SessionConfig {
        scenario: Scenario::Desync,
        ..SessionConfig::default()
    })
    .await
    .expect_err("lockstep only");
    assert!(err.to_string().contains("lockstep"));
}
