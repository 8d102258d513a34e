//! Client and server wired back to back
//!
//! [`run_session`] drives both peers in lockstep over simulated links with a
//! virtual clock, so a seed reproduces a run exactly. [`run_realtime`] runs
//! the server as a tokio task and ticks the client on a wall-clock interval.

use crate::{ClientPeer, ServerPeer};
use anyhow::{bail, Context, Result};
use glam::{Vec2, Vec3};
use std::fmt;
use std::time::Duration;
use strider_movement::{
    ActorState, Capsule, CollisionQuery, DiscardSink, FlatGround, Ledge, LowCeiling, MoveInput,
    MovementConfig, MovementModel, ResizeOutcome,
};
use strider_network::{
    channel_pair, AdaptiveCompressor, CompressionAlgorithm, LinkConditions, LinkStats,
    MessageStats, SimulatedLink, StepCodec, StepDefaults,
};
use strider_state::{
    AuthorityValidator, PredictionStats, Predictor, PredictorConfig, ValidationStats,
    ValidatorConfig,
};
use tracing::{debug, info};

/// Link time given to in-flight packets after the last tick.
const SETTLE_SECONDS: f64 = 2.0;
const SETTLE_STEP: f64 = 0.05;

/// Scripted input and geometry for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    /// Walk in a slow circle on flat ground
    Walk,
    /// Alternate long sprints and rests, draining stamina
    Sprint,
    /// Walk forward and dash at a fixed cadence
    Dash,
    /// Run off a ledge, land and jump
    Ledge,
    /// Crouch under a low ceiling and try to stand up
    Crouch,
    /// Walk while the server empties or refills stamina now and then
    Desync,
}

impl Scenario {
    pub fn world(self) -> ScenarioWorld {
        match self {
            Self::Ledge => ScenarioWorld::Ledge(Ledge {
                edge_x: 300.0,
                upper: 0.0,
                lower: -200.0,
            }),
            Self::Crouch => ScenarioWorld::Ceiling(LowCeiling {
                floor: 0.0,
                ceiling: 150.0,
                start_x: 200.0,
                end_x: 600.0,
            }),
            _ => ScenarioWorld::Flat(FlatGround { height: 0.0 }),
        }
    }

    /// Input for `tick` at `tick_rate` ticks per second.
    pub fn input(self, tick: u32, tick_rate: u32) -> MoveInput {
        let rate = tick_rate.max(1);
        let t = tick as f32 / rate as f32;
        let at = |seconds: f32| tick == (seconds * rate as f32).round() as u32;

        match self {
            Self::Walk => MoveInput::new(Vec2::from_angle(t * 0.5)),
            Self::Sprint => {
                let input = MoveInput::new(Vec2::from_angle(t * 0.2));
                if t % 8.0 < 5.0 {
                    input.with_sprint()
                } else {
                    input
                }
            }
            Self::Dash => {
                let input = MoveInput::new(if t % 6.0 < 3.0 { Vec2::X } else { Vec2::NEG_X });
                if tick > 0 && tick % (rate * 3 / 2).max(1) == 0 {
                    input.with_dash()
                } else {
                    input
                }
            }
            Self::Ledge => {
                let phase = t % 6.0;
                if phase < 2.0 {
                    MoveInput::new(Vec2::X).with_sprint()
                } else if at(2.5) || at(8.5) {
                    MoveInput::new(Vec2::Y).with_jump()
                } else if phase < 3.5 {
                    MoveInput::new(Vec2::Y)
                } else {
                    MoveInput::new(Vec2::NEG_Y)
                }
            }
            Self::Crouch => {
                let forward = if t % 16.0 < 8.0 { Vec2::X } else { Vec2::NEG_X };
                match t % 8.0 {
                    p if p < 2.0 => MoveInput::new(forward).with_crouch(),
                    p if p < 3.0 => MoveInput::new(Vec2::ZERO),
                    p if p < 4.0 => MoveInput::new(forward),
                    _ => MoveInput::new(Vec2::ZERO),
                }
            }
            Self::Desync => {
                let input = MoveInput::new(Vec2::from_angle(t * 0.3));
                if t % 4.0 < 1.0 {
                    input.with_sprint()
                } else {
                    input
                }
            }
        }
    }

    /// Server-side gameplay for this tick, if any. Returns true when it ran.
    pub fn interfere(self, tick: u32, tick_rate: u32, actor: &mut ActorState) -> bool {
        let rate = tick_rate.max(1);
        if self != Self::Desync || tick == 0 || tick % (rate * 2) != rate {
            return false;
        }
        let stamina = &mut actor.stamina;
        let target = if stamina.value() > stamina.max() * 0.5 {
            0.0
        } else {
            stamina.max()
        };
        stamina.set(target, &mut DiscardSink);
        true
    }
}

/// Geometry of a [`Scenario`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScenarioWorld {
    Flat(FlatGround),
    Ledge(Ledge),
    Ceiling(LowCeiling),
}

impl ScenarioWorld {
    fn query(&self) -> &dyn CollisionQuery {
        match self {
            Self::Flat(world) => world,
            Self::Ledge(world) => world,
            Self::Ceiling(world) => world,
        }
    }
}

impl CollisionQuery for ScenarioWorld {
    fn resize_capsule(&self, position: Vec3, from: Capsule, to: Capsule) -> ResizeOutcome {
        self.query().resize_capsule(position, from, to)
    }

    fn ground_height(&self, position: Vec3, max_distance: f32) -> Option<f32> {
        self.query().ground_height(position, max_distance)
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub movement: MovementConfig,
    pub predictor: PredictorConfig,
    pub validator: ValidatorConfig,
    pub tick_rate: u32,
    pub ticks: u32,
    pub scenario: Scenario,
    /// Client to server
    pub uplink: LinkConditions,
    /// Server to client
    pub downlink: LinkConditions,
    pub seed: u64,
    /// `None` picks per batch by size.
    pub compression: Option<CompressionAlgorithm>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            movement: MovementConfig::default(),
            predictor: PredictorConfig::default(),
            validator: ValidatorConfig::default(),
            tick_rate: 60,
            ticks: 600,
            scenario: Scenario::Walk,
            uplink: LinkConditions::default(),
            downlink: LinkConditions::default(),
            seed: 0,
            compression: None,
        }
    }
}

impl SessionConfig {
    fn dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    fn compressor(&self) -> AdaptiveCompressor {
        match self.compression {
            Some(algorithm) => AdaptiveCompressor::fixed(algorithm),
            None => AdaptiveCompressor::new(),
        }
    }
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub scenario: Scenario,
    pub ticks: u32,
    pub prediction: PredictionStats,
    pub validation: ValidationStats,
    pub steps_received: u64,
    pub interventions: u32,
    pub client_traffic: MessageStats,
    pub server_traffic: MessageStats,
    pub uplink: LinkStats,
    pub downlink: LinkStats,
    /// Steps the client still holds unacknowledged.
    pub pending_steps: usize,
    /// Distance between the client's and the server's final positions.
    pub final_divergence: f32,
    /// Client and server ended on identical state.
    pub in_sync: bool,
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "scenario            {:?}", self.scenario)?;
        writeln!(f, "ticks               {}", self.ticks)?;
        writeln!(
            f,
            "steps               {} combined, {} important ({} resent), {} received by server",
            self.prediction.combined,
            self.prediction.important,
            self.prediction.resent_important,
            self.steps_received
        )?;
        writeln!(
            f,
            "server verdicts     {} accepted, {} corrected, {} rejected",
            self.validation.accepted,
            self.validation.corrected(),
            self.validation.rejected
        )?;
        writeln!(
            f,
            "corrections         {} applied, {} superseded, {} steps replayed",
            self.prediction.corrections_applied,
            self.prediction.corrections_superseded,
            self.prediction.replayed_steps
        )?;
        writeln!(
            f,
            "traffic             {} B up in {} packets, {} B down in {} packets",
            self.client_traffic.bytes_sent,
            self.client_traffic.messages_sent,
            self.server_traffic.bytes_sent,
            self.server_traffic.messages_sent
        )?;
        writeln!(
            f,
            "link losses         {} up, {} down",
            self.uplink.dropped, self.downlink.dropped
        )?;
        writeln!(
            f,
            "pending steps       {} (peak {})",
            self.pending_steps, self.prediction.peak_pending
        )?;
        write!(
            f,
            "final divergence    {:.3} ({})",
            self.final_divergence,
            if self.in_sync { "identical state" } else { "state differs" }
        )
    }
}

type Link = SimulatedLink<strider_network::ChannelTransport>;

fn build_peers(config: &SessionConfig) -> Result<(Predictor, AuthorityValidator, StepCodec)> {
    let model =
        MovementModel::new(config.movement.clone()).context("Invalid movement configuration")?;
    let spawn = Vec3::ZERO;
    let predictor = Predictor::new(
        model.clone(),
        ActorState::new(model.config(), spawn),
        config.predictor.clone(),
    );
    let validator = AuthorityValidator::new(
        model.clone(),
        ActorState::new(model.config(), spawn),
        config.validator.clone(),
    );
    let codec = StepCodec::new(StepDefaults::from_config(model.config()));
    Ok((predictor, validator, codec))
}

/// Move both links forward by `dt` and let each peer handle what arrived.
fn exchange(
    client: &mut ClientPeer<Link>,
    server: &mut ServerPeer<Link>,
    dt: f64,
    world: &ScenarioWorld,
) -> Result<()> {
    client.transport_mut().advance(dt)?;
    server.poll(world)?;
    server.flush_responses()?;
    server.transport_mut().advance(dt)?;
    client.poll(world)?;
    Ok(())
}

/// Deterministic lockstep run over simulated links.
pub fn run_session(config: &SessionConfig) -> Result<SessionReport> {
    let (predictor, validator, codec) = build_peers(config)?;
    let world = config.scenario.world();
    let dt = config.dt();

    let (client_end, server_end) = channel_pair();
    let mut client = ClientPeer::new(
        predictor,
        codec.clone(),
        config.compressor(),
        SimulatedLink::new(client_end, config.uplink.clone(), config.seed),
    );
    let mut server = ServerPeer::new(
        validator,
        codec,
        config.compressor(),
        SimulatedLink::new(server_end, config.downlink.clone(), config.seed.wrapping_add(1)),
    );

    info!(
        scenario = ?config.scenario,
        ticks = config.ticks,
        tick_rate = config.tick_rate,
        "Starting session"
    );
    client.hello()?;

    let mut interventions = 0;
    for tick in 0..config.ticks {
        if config
            .scenario
            .interfere(tick, config.tick_rate, server.validator_mut().actor_mut())
        {
            interventions += 1;
            debug!(tick, "Server changed authoritative state");
        }
        let input = config.scenario.input(tick, config.tick_rate);
        client.tick(input, dt, &world)?;
        exchange(&mut client, &mut server, f64::from(dt), &world)?;
    }

    client.flush()?;
    let mut settled = 0.0;
    while settled < SETTLE_SECONDS {
        exchange(&mut client, &mut server, SETTLE_STEP, &world)?;
        settled += SETTLE_STEP;
    }

    let uplink = client.transport_mut().stats().clone();
    let downlink = server.transport_mut().stats().clone();
    Ok(report(
        config,
        client.predictor(),
        client.stats(),
        &server,
        interventions,
        uplink,
        downlink,
    ))
}

fn report<T: strider_network::Transport>(
    config: &SessionConfig,
    predictor: &Predictor,
    client_traffic: &MessageStats,
    server: &ServerPeer<T>,
    interventions: u32,
    uplink: LinkStats,
    downlink: LinkStats,
) -> SessionReport {
    let client_state = predictor.actor().snapshot();
    let server_state = server.validator().actor().snapshot();
    let report = SessionReport {
        scenario: config.scenario,
        ticks: config.ticks,
        prediction: predictor.stats().clone(),
        validation: server.validator().stats().clone(),
        steps_received: server.steps_received(),
        interventions,
        client_traffic: client_traffic.clone(),
        server_traffic: server.stats().clone(),
        uplink,
        downlink,
        pending_steps: predictor.pending(),
        final_divergence: client_state.position.distance(server_state.position),
        in_sync: client_state == server_state,
    };
    info!(
        corrected = report.validation.corrected(),
        applied = report.prediction.corrections_applied,
        in_sync = report.in_sync,
        "Session finished"
    );
    report
}

/// Server on a tokio task, client ticking on a wall-clock interval.
///
/// The link is a plain in-process channel without impairments.
pub async fn run_realtime(config: SessionConfig) -> Result<SessionReport> {
    if config.scenario == Scenario::Desync {
        bail!("The desync scenario needs the lockstep driver");
    }
    let (predictor, validator, codec) = build_peers(&config)?;
    let world = config.scenario.world();
    let dt = config.dt();

    let (client_end, server_end) = channel_pair();
    let mut server = ServerPeer::new(validator, codec.clone(), config.compressor(), server_end);
    let server_task = tokio::spawn(async move {
        while let Some(packet) = server.transport_mut().recv().await {
            server.handle_packet(&packet, &world)?;
            server.flush_responses()?;
        }
        Ok::<_, anyhow::Error>(server)
    });

    let mut client = ClientPeer::new(predictor, codec, config.compressor(), client_end);
    client.hello()?;
    let mut interval = tokio::time::interval(Duration::from_secs_f32(dt));
    for tick in 0..config.ticks {
        interval.tick().await;
        // Acks first, so the batch below carries no needless resend.
        client.poll(&world)?;
        client.tick(config.scenario.input(tick, config.tick_rate), dt, &world)?;
    }
    client.flush()?;

    // Wait for the answers to the last batch.
    let deadline = tokio::time::Instant::now() + Duration::from_secs_f64(SETTLE_SECONDS);
    while client.predictor().pending() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
        client.poll(&world)?;
    }

    let (predictor, client_traffic) = client.into_parts();
    let server = server_task.await.context("Server task panicked")??;
    Ok(report(
        &config,
        &predictor,
        &client_traffic,
        &server,
        0,
        LinkStats::default(),
        LinkStats::default(),
    ))
}
