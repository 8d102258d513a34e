use glam::{Vec2, Vec3};
use pretty_assertions::assert_eq;
use strider_movement::{
    ActorEvent, ActorState, CrouchPhase, DiscardSink, FlatGround, LowCeiling, MoveInput,
    MovementConfig, MovementModel, StepMode,
};

fn model() -> MovementModel {
    MovementModel::new(MovementConfig::default()).expect("valid config")
}

fn crouch_fully(model: &MovementModel, actor: &mut ActorState, world: &dyn strider_movement::CollisionQuery) {
    let crouch = MoveInput::default().with_crouch();
    for _ in 0..5 {
        model.step(actor, &crouch, 0.1, StepMode::Live, world, &mut DiscardSink);
    }
    assert_eq!(actor.crouch.phase(), CrouchPhase::Crouched);
}

#[test]
fn uncrouch_blocked_under_ceiling() {
    let model = model();
    let world = LowCeiling {
        floor: 0.0,
        ceiling: 150.0,
        start_x: -50.0,
        end_x: 50.0,
    };
    let mut actor = ActorState::new(model.config(), Vec3::ZERO);
    crouch_fully(&model, &mut actor, &world);

    let mut events = Vec::new();
    let stand = MoveInput::default();
    model.step(&mut actor, &stand, 0.1, StepMode::Live, &world, &mut events);
    assert_eq!(actor.crouch.phase(), CrouchPhase::Crouched);
    assert!(events.contains(&ActorEvent::UncrouchBlocked));

    // Crawl out from under the ceiling, then stand.
    let crawl = MoveInput::new(Vec2::X).with_crouch();
    for _ in 0..60 {
        model.step(&mut actor, &crawl, 0.05, StepMode::Live, &world, &mut DiscardSink);
    }
    assert!(actor.position.x >= 50.0);

    events.clear();
    model.step(&mut actor, &stand, 0.1, StepMode::Live, &world, &mut events);
    assert_eq!(actor.crouch.phase(), CrouchPhase::TransitioningToStanding);
    assert!(events.contains(&ActorEvent::UncrouchStarted));
}

#[test]
fn reversal_mid_transition_keeps_progress() {
    let model = model();
    let world = FlatGround::default();
    let mut actor = ActorState::new(model.config(), Vec3::ZERO);

    let crouch = MoveInput::default().with_crouch();
    model.step(&mut actor, &crouch, 0.05, StepMode::Live, &world, &mut DiscardSink);
    model.step(&mut actor, &crouch, 0.1, StepMode::Live, &world, &mut DiscardSink);
    assert_eq!(actor.crouch.phase(), CrouchPhase::TransitioningToCrouched);
    let before = actor.crouch.crouch_fraction();

    // Let go: the timer reverses rather than restarting.
    model.step(&mut actor, &MoveInput::default(), 0.0, StepMode::Live, &world, &mut DiscardSink);
    assert_eq!(actor.crouch.phase(), CrouchPhase::TransitioningToStanding);
    assert!((actor.crouch.crouch_fraction() - before).abs() < 1e-5);
    assert!((actor.crouch.progress() - 0.1).abs() < 1e-5);
}

#[test]
fn airborne_transition_uses_airborne_duration() {
    let mut config = MovementConfig::default();
    config.crouch.airborne_duration = 0.5;
    let model = MovementModel::new(config).expect("valid config");
    let world = FlatGround::default();
    let mut actor = ActorState::new(model.config(), Vec3::new(0.0, 0.0, 500.0));
    actor.grounded = false;

    let crouch = MoveInput::default().with_crouch();
    model.step(&mut actor, &crouch, 0.01, StepMode::Live, &world, &mut DiscardSink);
    assert_eq!(actor.crouch.duration(), 0.5);
    assert!(actor.crouch.is_transitioning());
}

#[test]
fn transitioning_flag_matches_timer() {
    let model = model();
    let world = FlatGround::default();
    let mut actor = ActorState::new(model.config(), Vec3::ZERO);
    let inputs = [true, true, false, true, true, true, true, false, false, false, false];
    for crouch in inputs {
        let input = MoveInput {
            crouch,
            ..Default::default()
        };
        model.step(&mut actor, &input, 0.07, StepMode::Live, &world, &mut DiscardSink);
        assert_eq!(
            actor.crouch.is_transitioning(),
            actor.crouch.progress() < actor.crouch.duration()
        );
        assert!(actor.crouch.progress() >= 0.0);
        assert!(actor.crouch.progress() <= actor.crouch.duration());
    }
}
