use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strider_movement::MoveInput;

/// Tick length used throughout the tests.
pub const DT: f32 = 1.0 / 60.0;

/// A list of per-tick inputs built up phrase by phrase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputScript {
    inputs: Vec<MoveInput>,
}

impl InputScript {
    pub fn new() -> Self {
        Self::default()
    }

    fn repeat(mut self, input: MoveInput, ticks: usize) -> Self {
        self.inputs.extend(std::iter::repeat(input).take(ticks));
        self
    }

    pub fn idle(self, ticks: usize) -> Self {
        self.repeat(MoveInput::default(), ticks)
    }

    pub fn walk(self, direction: Vec2, ticks: usize) -> Self {
        self.repeat(MoveInput::new(direction), ticks)
    }

    pub fn sprint(self, direction: Vec2, ticks: usize) -> Self {
        self.repeat(MoveInput::new(direction).with_sprint(), ticks)
    }

    pub fn crouch(self, direction: Vec2, ticks: usize) -> Self {
        self.repeat(MoveInput::new(direction).with_crouch(), ticks)
    }

    /// One tick with the jump button down.
    pub fn jump(self, direction: Vec2) -> Self {
        self.repeat(MoveInput::new(direction).with_jump(), 1)
    }

    /// One tick with the dash button down.
    pub fn dash(self, direction: Vec2) -> Self {
        self.repeat(MoveInput::new(direction).with_dash(), 1)
    }

    /// Sprint, dash, jump, crouch and rest in one go.
    pub fn parkour() -> Self {
        Self::new()
            .sprint(Vec2::X, 60)
            .dash(Vec2::X)
            .walk(Vec2::X, 30)
            .jump(Vec2::X)
            .walk(Vec2::new(0.5, 0.5), 40)
            .crouch(Vec2::NEG_X, 30)
            .idle(20)
            .sprint(Vec2::Y, 90)
            .dash(Vec2::NEG_Y)
            .idle(30)
    }

    /// Random buttons and directions, reproducible from `seed`.
    pub fn random(seed: u64, ticks: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let inputs = (0..ticks)
            .map(|_| {
                let direction = if rng.gen_bool(0.2) {
                    Vec2::ZERO
                } else {
                    Vec2::from_angle(rng.gen_range(0.0..std::f32::consts::TAU))
                };
                MoveInput {
                    jump: rng.gen_bool(0.03),
                    crouch: rng.gen_bool(0.15),
                    sprint: rng.gen_bool(0.4),
                    dash: rng.gen_bool(0.02),
                    ..MoveInput::new(direction)
                }
            })
            .collect();
        Self { inputs }
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MoveInput> {
        self.inputs.iter()
    }
}
