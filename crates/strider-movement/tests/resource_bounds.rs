use proptest::prelude::*;
use strider_movement::{
    ActorEvent, BoundedResource, DiscardSink, DrainRecovery, ResourceConfig, ResourceKind,
};

fn stamina() -> BoundedResource {
    BoundedResource::full(ResourceKind::Stamina, &ResourceConfig::default())
}

#[test]
fn stamina_hysteresis_scenario() {
    // 100/100, regen 10/s, externally drained to 0 at t=0.
    let mut r = stamina();
    let mut events = Vec::new();
    r.set(0.0, &mut events);
    assert!(r.is_drained());

    let dt = 0.1;
    for _ in 0..99 {
        r.tick(10.0, dt, &mut events);
    }
    // t = 9.9s
    assert!((r.value() - 99.0).abs() < 1e-3, "value {}", r.value());
    assert!(r.is_drained(), "partial recovery must not clear drained");

    r.tick(10.0, dt, &mut events);
    // t = 10.0s
    assert_eq!(r.value(), 100.0);
    assert!(!r.is_drained());
    assert_eq!(
        events.last(),
        Some(&ActorEvent::DrainRecovered(ResourceKind::Stamina))
    );
}

#[test]
fn fraction_policy_is_configurable() {
    let mut r = BoundedResource::new(
        ResourceKind::Stamina,
        100.0,
        0.0,
        DrainRecovery::Fraction(0.1),
    );
    for _ in 0..9 {
        r.tick(10.0, 0.1, &mut DiscardSink);
    }
    assert!(r.is_drained());
    r.tick(10.0, 0.1, &mut DiscardSink);
    assert!(!r.is_drained());
}

#[derive(Debug, Clone)]
enum Op {
    Tick { rate: f32, dt: f32 },
    Set(f32),
    SetMax(f32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-500.0f32..500.0, 0.0f32..0.5).prop_map(|(rate, dt)| Op::Tick { rate, dt }),
        (-1000.0f32..1000.0).prop_map(Op::Set),
        (0.0f32..300.0).prop_map(Op::SetMax),
    ]
}

proptest! {
    #[test]
    fn value_never_escapes_bounds(ops in prop::collection::vec(op(), 1..200)) {
        let mut r = stamina();
        let mut events = Vec::new();
        for op in ops {
            match op {
                Op::Tick { rate, dt } => r.tick(rate, dt, &mut events),
                Op::Set(v) => r.set(v, &mut events),
                Op::SetMax(m) => r.set_max(m, &mut events),
            }
            prop_assert!(r.value() >= 0.0 && r.value() <= r.max(),
                "value {} outside [0, {}]", r.value(), r.max());
        }
    }

    #[test]
    fn drained_flips_only_at_exact_bounds(
        ops in prop::collection::vec((-300.0f32..300.0, 0.0f32..0.5), 1..300)
    ) {
        let mut r = stamina();
        for (rate, dt) in ops {
            let was_drained = r.is_drained();
            r.tick(rate, dt, &mut DiscardSink);
            if !was_drained && r.is_drained() {
                prop_assert_eq!(r.value(), 0.0);
            }
            if was_drained && !r.is_drained() {
                prop_assert_eq!(r.value(), r.max());
            }
            if r.value() == 0.0 {
                prop_assert!(r.is_drained());
            }
        }
    }

    #[test]
    fn notifications_only_on_real_change(values in prop::collection::vec(0.0f32..100.0, 1..50)) {
        let mut r = stamina();
        for v in values {
            let before = r.value();
            let mut events = Vec::new();
            r.set(v, &mut events);
            let changed = events.iter().any(|e| matches!(e, ActorEvent::ValueChanged { .. }));
            prop_assert_eq!(changed, before != r.value());
        }
    }
}
