//! Per-tick movement intent

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Squared-length overshoot tolerated before a direction is renormalized.
const DIRECTION_SLACK: f32 = 1e-4;

/// Boolean input channels packed into one byte.
///
/// Bit layout, fixed on the wire:
///
/// | bit | mask | channel  |
/// |-----|------|----------|
/// | 0   | 0x01 | jump     |
/// | 1   | 0x02 | crouch   |
/// | 2   | 0x04 | sprint   |
/// | 3   | 0x08 | dash     |
/// | 4   | 0x10 | reserved |
/// | 5   | 0x20 | reserved |
/// | 6   | 0x40 | reserved |
/// | 7   | 0x80 | reserved |
///
/// Senders leave reserved bits clear and receivers ignore them, so a newer
/// peer can claim one without shifting existing channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompressedFlags(u8);

impl CompressedFlags {
    pub const JUMP: u8 = 0x01;
    pub const CROUCH: u8 = 0x02;
    pub const SPRINT: u8 = 0x04;
    pub const DASH: u8 = 0x08;
    pub const RESERVED_4: u8 = 0x10;
    pub const RESERVED_5: u8 = 0x20;
    pub const RESERVED_6: u8 = 0x40;
    pub const RESERVED_7: u8 = 0x80;

    /// Bits this build understands.
    pub const KNOWN: u8 = Self::JUMP | Self::CROUCH | Self::SPRINT | Self::DASH;

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    /// Reserved bits that were set by the sender.
    pub fn unknown_bits(self) -> u8 {
        self.0 & !Self::KNOWN
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveInput {
    /// Wish direction on the ground plane. Length at most 1.
    pub direction: Vec2,
    pub jump: bool,
    pub crouch: bool,
    pub sprint: bool,
    pub dash: bool,
}

impl MoveInput {
    pub fn new(direction: Vec2) -> Self {
        Self {
            direction: Self::sanitize(direction),
            ..Default::default()
        }
    }

    pub fn with_jump(mut self) -> Self {
        self.jump = true;
        self
    }

    pub fn with_crouch(mut self) -> Self {
        self.crouch = true;
        self
    }

    pub fn with_sprint(mut self) -> Self {
        self.sprint = true;
        self
    }

    pub fn with_dash(mut self) -> Self {
        self.dash = true;
        self
    }

    /// Rebuild from a direction and a flags byte.
    pub fn from_flags(direction: Vec2, flags: CompressedFlags) -> Self {
        Self {
            direction: Self::sanitize(direction),
            jump: flags.contains(CompressedFlags::JUMP),
            crouch: flags.contains(CompressedFlags::CROUCH),
            sprint: flags.contains(CompressedFlags::SPRINT),
            dash: flags.contains(CompressedFlags::DASH),
        }
    }

    /// Derived every time; never stored alongside the booleans.
    pub fn compressed_flags(&self) -> CompressedFlags {
        let mut bits = 0;
        if self.jump {
            bits |= CompressedFlags::JUMP;
        }
        if self.crouch {
            bits |= CompressedFlags::CROUCH;
        }
        if self.sprint {
            bits |= CompressedFlags::SPRINT;
        }
        if self.dash {
            bits |= CompressedFlags::DASH;
        }
        CompressedFlags(bits)
    }

    pub fn is_moving(&self) -> bool {
        self.direction.length_squared() > 0.0
    }

    /// Idempotent, so a direction that crossed the wire rebuilds to the
    /// same bits the sender simulated with.
    fn sanitize(direction: Vec2) -> Vec2 {
        if !direction.is_finite() {
            return Vec2::ZERO;
        }
        if direction.length_squared() > 1.0 + DIRECTION_SLACK {
            direction.normalize_or_zero()
        } else {
            direction
        }
    }
}
