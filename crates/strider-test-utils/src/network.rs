use strider_network::LinkConditions;

/// Impairments for both directions of a client/server pair.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetworkConditions {
    /// Client to server
    pub uplink: LinkConditions,
    /// Server to client
    pub downlink: LinkConditions,
}

impl NetworkConditions {
    /// Same conditions both ways
    pub fn symmetric(link: LinkConditions) -> Self {
        Self {
            uplink: link.clone(),
            downlink: link,
        }
    }

    /// Perfect network conditions
    pub fn perfect() -> Self {
        Self::default()
    }

    /// Typical mobile network (3G/4G)
    pub fn mobile() -> Self {
        Self::symmetric(LinkConditions {
            packet_loss: 0.02,
            latency_ms: 75,
            jitter_ms: 25,
            duplicate_probability: 0.001,
        })
    }

    /// Poor network conditions
    pub fn poor() -> Self {
        Self::symmetric(LinkConditions {
            packet_loss: 0.10,
            latency_ms: 250,
            jitter_ms: 100,
            duplicate_probability: 0.02,
        })
    }

    /// Satellite internet conditions
    pub fn satellite() -> Self {
        Self::symmetric(LinkConditions {
            packet_loss: 0.01,
            latency_ms: 300,
            jitter_ms: 50,
            duplicate_probability: 0.005,
        })
    }

    /// Loses step batches but never answers.
    pub fn lossy_uplink(packet_loss: f64) -> Self {
        Self {
            uplink: LinkConditions {
                packet_loss,
                ..Default::default()
            },
            downlink: LinkConditions::default(),
        }
    }
}
