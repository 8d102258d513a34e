use crate::{InputScript, NetworkConditions, DT};
use anyhow::{Context, Result};
use glam::Vec3;
use strider::{ClientPeer, ScenarioWorld, ServerPeer};
use strider_movement::{ActorState, FlatGround, MoveInput, MovementConfig, MovementModel};
use strider_network::{
    channel_pair, AdaptiveCompressor, ChannelTransport, SimulatedLink, StepCodec, StepDefaults,
};
use strider_state::{AuthorityValidator, PredictorConfig, Predictor, ValidatorConfig};

type Link = SimulatedLink<ChannelTransport>;

/// Client and server peers over simulated links, advanced tick by tick.
pub struct LoopbackHarness {
    pub client: ClientPeer<Link>,
    pub server: ServerPeer<Link>,
    world: ScenarioWorld,
}

impl LoopbackHarness {
    pub fn new(
        conditions: NetworkConditions,
        world: ScenarioWorld,
        predictor: PredictorConfig,
        seed: u64,
    ) -> Result<Self> {
        let model = MovementModel::new(MovementConfig::default()).context("Invalid config")?;
        let codec = StepCodec::new(StepDefaults::from_config(model.config()));
        let (client_end, server_end) = channel_pair();

        let mut client = ClientPeer::new(
            Predictor::new(
                model.clone(),
                ActorState::new(model.config(), Vec3::ZERO),
                predictor,
            ),
            codec.clone(),
            AdaptiveCompressor::new(),
            SimulatedLink::new(client_end, conditions.uplink, seed),
        );
        let server = ServerPeer::new(
            AuthorityValidator::new(
                model.clone(),
                ActorState::new(model.config(), Vec3::ZERO),
                ValidatorConfig::default(),
            ),
            codec,
            AdaptiveCompressor::new(),
            SimulatedLink::new(server_end, conditions.downlink, seed.wrapping_add(1)),
        );
        client.hello()?;

        Ok(Self {
            client,
            server,
            world,
        })
    }

    /// Flat ground, default predictor.
    pub fn flat(conditions: NetworkConditions, seed: u64) -> Result<Self> {
        Self::new(
            conditions,
            ScenarioWorld::Flat(FlatGround { height: 0.0 }),
            PredictorConfig::default(),
            seed,
        )
    }

    /// Move the links on by `dt` and let both peers react.
    pub fn exchange(&mut self, dt: f64) -> Result<()> {
        self.client.transport_mut().advance(dt)?;
        self.server.poll(&self.world)?;
        self.server.flush_responses()?;
        self.server.transport_mut().advance(dt)?;
        self.client.poll(&self.world)?;
        Ok(())
    }

    pub fn tick(&mut self, input: MoveInput) -> Result<()> {
        self.client.tick(input, DT, &self.world)?;
        self.exchange(f64::from(DT))
    }

    pub fn run(&mut self, script: &InputScript) -> Result<()> {
        for input in script.iter() {
            self.tick(*input)?;
        }
        Ok(())
    }

    /// Flush the client and give in-flight packets two seconds to land.
    pub fn settle(&mut self) -> Result<()> {
        self.client.flush()?;
        for _ in 0..40 {
            self.exchange(0.05)?;
        }
        Ok(())
    }

    pub fn in_sync(&self) -> bool {
        self.client.predictor().actor().snapshot() == self.server.validator().actor().snapshot()
    }
}
