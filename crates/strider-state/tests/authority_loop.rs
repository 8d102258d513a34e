//! Predictor and validator wired back to back with no transport in between.

use glam::{Vec2, Vec3};
use proptest::prelude::*;
use strider_movement::{
    ActorState, CollisionQuery, DiscardSink, FlatGround, Ledge, MoveInput, MovementConfig,
    MovementModel,
};
use strider_state::{
    AuthorityValidator, CombineConfig, Divergence, Predictor, PredictorConfig, StateError,
    StepRecord, ValidatorConfig, Verdict,
};

const DT: f32 = 1.0 / 60.0;

struct Pair {
    client: Predictor,
    server: AuthorityValidator,
    corrections: Vec<Divergence>,
}

impl Pair {
    fn new(combine: CombineConfig) -> Self {
        let model = MovementModel::new(MovementConfig::default()).expect("config");
        let client = Predictor::new(
            model.clone(),
            ActorState::new(model.config(), Vec3::ZERO),
            PredictorConfig {
                combine,
                send_interval: 1.0 / 30.0,
                max_pending: 96,
            },
        );
        let server = AuthorityValidator::new(
            model.clone(),
            ActorState::new(model.config(), Vec3::ZERO),
            ValidatorConfig::default(),
        );
        Self {
            client,
            server,
            corrections: Vec::new(),
        }
    }

    fn tick(&mut self, input: MoveInput, world: &dyn CollisionQuery) {
        self.client.tick(input, DT, world);
        let steps = self.client.take_outgoing();
        self.deliver(steps, world);
    }

    /// Push out whatever the send interval is still holding back.
    fn flush(&mut self, world: &dyn CollisionQuery) {
        let steps = self.client.flush();
        self.deliver(steps, world);
    }

    fn deliver(&mut self, steps: Vec<StepRecord>, world: &dyn CollisionQuery) {
        for step in steps {
            match self.server.validate(&step, world).expect("valid step") {
                Verdict::Accept => self.client.acknowledge(step.timestamp),
                Verdict::Correct { correction, cause } => {
                    self.corrections.push(cause);
                    self.client.apply_correction(&correction, world);
                }
            }
        }
    }
}

#[test]
fn honest_client_is_never_corrected() {
    let world = Ledge {
        edge_x: 300.0,
        upper: 0.0,
        lower: -200.0,
    };
    for combine in [CombineConfig::default(), CombineConfig::disabled()] {
        let mut pair = Pair::new(combine);
        for tick in 0..240 {
            let input = match tick {
                0..=59 => MoveInput::new(Vec2::X).with_sprint(),
                60 => MoveInput::new(Vec2::X).with_dash(),
                61..=119 => MoveInput::new(Vec2::X),
                120..=150 => MoveInput::new(Vec2::NEG_X).with_crouch(),
                151 => MoveInput::new(Vec2::NEG_X).with_jump(),
                _ => MoveInput::new(Vec2::Y),
            };
            pair.tick(input, &world);
        }
        pair.flush(&world);
        assert!(pair.corrections.is_empty(), "{:?}", pair.corrections);
        assert_eq!(pair.server.stats().corrected(), 0);
        assert_eq!(
            pair.client.actor().snapshot(),
            pair.server.actor().snapshot()
        );
    }
}

#[test]
fn tampered_stamina_is_corrected_once() {
    let world = FlatGround::default();
    let mut pair = Pair::new(CombineConfig::default());
    for _ in 0..30 {
        pair.tick(MoveInput::new(Vec2::X).with_sprint(), &world);
    }
    pair.client.actor_mut().stamina.set(10.0, &mut DiscardSink);
    for _ in 0..4 {
        pair.tick(MoveInput::new(Vec2::X).with_sprint(), &world);
    }

    assert!(!pair.corrections.is_empty());
    assert!(pair
        .corrections
        .iter()
        .all(|c| matches!(c, Divergence::Stamina { .. })));
    let corrected = pair.corrections.len();

    // Back in sync: no further corrections.
    for _ in 0..30 {
        pair.tick(MoveInput::new(Vec2::X).with_sprint(), &world);
    }
    pair.flush(&world);
    assert_eq!(pair.corrections.len(), corrected);
    assert_eq!(
        pair.client.actor().stamina.value(),
        pair.server.actor().stamina.value()
    );
}

#[test]
fn teleported_client_is_corrected_on_position() {
    let world = FlatGround::default();
    let mut pair = Pair::new(CombineConfig::default());
    for _ in 0..10 {
        pair.tick(MoveInput::new(Vec2::X), &world);
    }
    pair.client.actor_mut().position.x += 25.0;
    pair.tick(MoveInput::new(Vec2::X), &world);
    pair.tick(MoveInput::new(Vec2::X), &world);
    pair.flush(&world);

    assert!(matches!(
        pair.corrections.first(),
        Some(Divergence::Position { .. })
    ));
    assert_eq!(pair.client.actor().position, pair.server.actor().position);
}

#[test]
fn out_of_order_steps_are_rejected() {
    let world = FlatGround::default();
    let mut client = Pair::new(CombineConfig::disabled()).client;
    let model = client.model().clone();
    let mut server = AuthorityValidator::new(
        model.clone(),
        ActorState::new(model.config(), Vec3::ZERO),
        ValidatorConfig::default(),
    );

    client.tick(MoveInput::new(Vec2::X), DT, &world);
    client.tick(MoveInput::new(Vec2::X), DT, &world);
    let steps = client.take_outgoing();
    assert_eq!(steps.len(), 2);

    server.validate(&steps[1], &world).expect("newest step");
    let position = server.actor().position;
    assert!(matches!(
        server.validate(&steps[0], &world),
        Err(StateError::OutOfOrder { .. })
    ));
    assert_eq!(server.actor().position, position);
    assert_eq!(server.stats().rejected, 1);
}

#[test]
fn oversized_delta_is_rejected() {
    let world = FlatGround::default();
    let mut pair = Pair::new(CombineConfig::disabled());
    pair.client.tick(MoveInput::default(), 1.0, &world);
    let steps = pair.client.take_outgoing();
    assert_eq!(
        pair.server.validate(&steps[0], &world),
        Err(StateError::InvalidDelta(1.0))
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn stamina_divergence_follows_threshold(offset in -10.0f32..10.0) {
        prop_assume!((offset.abs() - 2.0).abs() > 1e-3);
        let world = FlatGround::default();
        let mut pair = Pair::new(CombineConfig::disabled());
        pair.client.actor_mut().stamina.set(50.0, &mut DiscardSink);
        pair.server.actor_mut().stamina.set(50.0, &mut DiscardSink);
        pair.client.actor_mut().stamina.set(50.0 + offset, &mut DiscardSink);

        // Standing still: stamina regenerates identically on both sides.
        pair.tick(MoveInput::default(), &world);
        pair.tick(MoveInput::default(), &world);

        let corrected = pair
            .corrections
            .iter()
            .any(|c| matches!(c, Divergence::Stamina { .. }));
        prop_assert_eq!(corrected, offset.abs() > 2.0);
    }
}
