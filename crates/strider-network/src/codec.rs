//! Binary encoding of step records and corrections
//!
//! All multi-byte values are big-endian.
//!
//! # Step payload
//!
//! ```text
//! f64   timestamp
//! f32   delta
//! u8    compressed input flags (always present)
//! u16   presence mask
//! f32×3 position (always present)
//! then, in mask order, each field whose bit is set
//! ```
//!
//! Optional fields are omitted when equal to their default. Boolean fields
//! have no body: the bit is the value.
//!
//! | bit | field                        | body            | default             |
//! |-----|------------------------------|-----------------|---------------------|
//! | 0   | input direction              | f32×2           | zero                |
//! | 1   | velocity                     | f32×3           | zero                |
//! | 2   | stamina                      | f32             | stamina max         |
//! | 3   | charge                       | f32             | charge max          |
//! | 4   | grace window                 | f32             | 0                   |
//! | 5   | crouch progress              | f32             | 0                   |
//! | 6   | stamina drained              | -               | false               |
//! | 7   | charge drained               | -               | false               |
//! | 8   | grace window drained         | -               | false               |
//! | 9   | crouch transitioning         | -               | false               |
//! | 10  | grounded                     | -               | false               |
//! | 11  | animation transition name    | u8 len + UTF-8  | empty               |
//! | 12  | animation finished last step | -               | false               |
//! | 13  | motion transition name       | u8 len + UTF-8  | empty               |
//! | 14  | motion finished last step    | -               | false               |
//! | 15  | reserved, must be clear      |                 |                     |
//!
//! Start-of-step values and the important flag stay on the sender.
//!
//! # Correction payload
//!
//! Always complete: timestamp, position, velocity, a state flags byte,
//! the three resources, the crouch phase with its timer, then each motion
//! override present in the flags byte.

use bytes::{Buf, BufMut, BytesMut};
use glam::{Vec2, Vec3};
use strider_movement::{
    ActorSnapshot, CompressedFlags, CrouchPhase, CrouchState, MotionOverride, MoveInput,
    MovementConfig, TransitionMark,
};
use strider_state::{Correction, CustomState, StepRecord};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Payload truncated while reading {0}")]
    Truncated(&'static str),

    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("Unknown presence bits: {0:#06x}")]
    UnknownPresenceBits(u16),

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("Unknown crouch phase: {0}")]
    UnknownCrouchPhase(u8),

    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    #[error("Field {field} too large: {len} bytes")]
    Oversized { field: &'static str, len: usize },
}

/// Presence bits of the step payload.
pub mod presence {
    pub const DIRECTION: u16 = 1 << 0;
    pub const VELOCITY: u16 = 1 << 1;
    pub const STAMINA: u16 = 1 << 2;
    pub const CHARGE: u16 = 1 << 3;
    pub const GRACE_WINDOW: u16 = 1 << 4;
    pub const CROUCH_PROGRESS: u16 = 1 << 5;
    pub const STAMINA_DRAINED: u16 = 1 << 6;
    pub const CHARGE_DRAINED: u16 = 1 << 7;
    pub const GRACE_WINDOW_DRAINED: u16 = 1 << 8;
    pub const CROUCH_TRANSITIONING: u16 = 1 << 9;
    pub const GROUNDED: u16 = 1 << 10;
    pub const ANIMATION_NAME: u16 = 1 << 11;
    pub const ANIMATION_FINISHED: u16 = 1 << 12;
    pub const MOTION_NAME: u16 = 1 << 13;
    pub const MOTION_FINISHED: u16 = 1 << 14;

    pub const KNOWN: u16 = 0x7fff;
}

// Correction flags byte.
const GROUNDED: u8 = 1 << 0;
const STAMINA_DRAINED: u8 = 1 << 1;
const CHARGE_DRAINED: u8 = 1 << 2;
const GRACE_WINDOW_DRAINED: u8 = 1 << 3;
const ANIMATION_OVERRIDE: u8 = 1 << 4;
const MOTION_OVERRIDE: u8 = 1 << 5;
const CORRECTION_KNOWN: u8 = 0x3f;

/// Values both peers assume for absent optional fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepDefaults {
    pub stamina: f32,
    pub charge: f32,
}

impl StepDefaults {
    pub fn from_config(config: &MovementConfig) -> Self {
        Self {
            stamina: config.stamina.max,
            charge: config.charge.max,
        }
    }
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self::from_config(&MovementConfig::default())
    }
}

/// Encoder and decoder for step payloads and batches of them.
#[derive(Debug, Clone, Default)]
pub struct StepCodec {
    defaults: StepDefaults,
}

impl StepCodec {
    pub fn new(defaults: StepDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &StepDefaults {
        &self.defaults
    }

    /// Append one step payload to `buf`.
    pub fn encode(&self, step: &StepRecord, buf: &mut BytesMut) -> Result<(), CodecError> {
        use presence::*;

        let d = &self.defaults;
        let end = &step.end;
        let animation = &step.marks[0];
        let motion = &step.marks[1];

        let mut mask = 0u16;
        let mut set = |bit: u16, on: bool| {
            if on {
                mask |= bit;
            }
        };
        set(DIRECTION, step.input.direction != Vec2::ZERO);
        set(VELOCITY, step.velocity != Vec3::ZERO);
        set(STAMINA, end.stamina != d.stamina);
        set(CHARGE, end.charge != d.charge);
        set(GRACE_WINDOW, end.grace_window != 0.0);
        set(CROUCH_PROGRESS, end.crouch_progress != 0.0);
        set(STAMINA_DRAINED, end.stamina_drained);
        set(CHARGE_DRAINED, end.charge_drained);
        set(GRACE_WINDOW_DRAINED, end.grace_window_drained);
        set(CROUCH_TRANSITIONING, end.crouch_transitioning);
        set(GROUNDED, step.grounded);
        set(ANIMATION_NAME, !animation.name.is_empty());
        set(ANIMATION_FINISHED, animation.finished_last_step);
        set(MOTION_NAME, !motion.name.is_empty());
        set(MOTION_FINISHED, motion.finished_last_step);

        check_finite_f64(step.timestamp, "timestamp")?;
        buf.put_f64(step.timestamp);
        put_f32(buf, step.delta, "delta")?;
        buf.put_u8(step.compressed_flags().bits());
        buf.put_u16(mask);
        put_vec3(buf, step.position, "position")?;

        if mask & DIRECTION != 0 {
            put_f32(buf, step.input.direction.x, "direction")?;
            put_f32(buf, step.input.direction.y, "direction")?;
        }
        if mask & VELOCITY != 0 {
            put_vec3(buf, step.velocity, "velocity")?;
        }
        if mask & STAMINA != 0 {
            put_f32(buf, end.stamina, "stamina")?;
        }
        if mask & CHARGE != 0 {
            put_f32(buf, end.charge, "charge")?;
        }
        if mask & GRACE_WINDOW != 0 {
            put_f32(buf, end.grace_window, "grace window")?;
        }
        if mask & CROUCH_PROGRESS != 0 {
            put_f32(buf, end.crouch_progress, "crouch progress")?;
        }
        if mask & ANIMATION_NAME != 0 {
            put_name(buf, &animation.name, "animation name")?;
        }
        if mask & MOTION_NAME != 0 {
            put_name(buf, &motion.name, "motion name")?;
        }
        Ok(())
    }

    /// Decode exactly one step payload.
    pub fn decode(&self, mut data: &[u8]) -> Result<StepRecord, CodecError> {
        use presence::*;

        let buf = &mut data;
        let d = &self.defaults;

        let timestamp = get_f64(buf, "timestamp")?;
        let delta = get_f32(buf, "delta")?;
        let flags = CompressedFlags::from_bits(get_u8(buf, "input flags")?);
        let mask = get_u16(buf, "presence mask")?;
        if mask & !KNOWN != 0 {
            return Err(CodecError::UnknownPresenceBits(mask & !KNOWN));
        }
        let position = get_vec3(buf, "position")?;

        let direction = if mask & DIRECTION != 0 {
            Vec2::new(get_f32(buf, "direction")?, get_f32(buf, "direction")?)
        } else {
            Vec2::ZERO
        };
        let velocity = if mask & VELOCITY != 0 {
            get_vec3(buf, "velocity")?
        } else {
            Vec3::ZERO
        };
        let mut optional = |bit: u16, default: f32, field: &'static str| {
            if mask & bit != 0 {
                get_f32(buf, field)
            } else {
                Ok(default)
            }
        };
        let stamina = optional(STAMINA, d.stamina, "stamina")?;
        let charge = optional(CHARGE, d.charge, "charge")?;
        let grace_window = optional(GRACE_WINDOW, 0.0, "grace window")?;
        let crouch_progress = optional(CROUCH_PROGRESS, 0.0, "crouch progress")?;

        let animation_name = if mask & ANIMATION_NAME != 0 {
            get_name(buf, "animation name")?
        } else {
            String::new()
        };
        let motion_name = if mask & MOTION_NAME != 0 {
            get_name(buf, "motion name")?
        } else {
            String::new()
        };

        if !buf.is_empty() {
            return Err(CodecError::TrailingBytes(buf.len()));
        }

        Ok(StepRecord {
            timestamp,
            delta,
            input: MoveInput::from_flags(direction, flags),
            position,
            velocity,
            grounded: mask & GROUNDED != 0,
            end: CustomState {
                stamina,
                stamina_drained: mask & STAMINA_DRAINED != 0,
                charge,
                charge_drained: mask & CHARGE_DRAINED != 0,
                grace_window,
                grace_window_drained: mask & GRACE_WINDOW_DRAINED != 0,
                crouch_progress,
                crouch_transitioning: mask & CROUCH_TRANSITIONING != 0,
            },
            marks: [
                TransitionMark {
                    name: animation_name,
                    finished_last_step: mask & ANIMATION_FINISHED != 0,
                },
                TransitionMark {
                    name: motion_name,
                    finished_last_step: mask & MOTION_FINISHED != 0,
                },
            ],
            ..Default::default()
        })
    }

    /// Encode several steps, each behind its own u16 length.
    pub fn encode_batch(&self, steps: &[StepRecord]) -> Result<BytesMut, CodecError> {
        let count = u16::try_from(steps.len()).map_err(|_| CodecError::Oversized {
            field: "batch",
            len: steps.len(),
        })?;

        let mut buf = BytesMut::with_capacity(2 + steps.len() * 48);
        buf.put_u16(count);
        let mut payload = BytesMut::new();
        for step in steps {
            payload.clear();
            self.encode(step, &mut payload)?;
            let len = u16::try_from(payload.len()).map_err(|_| CodecError::Oversized {
                field: "step",
                len: payload.len(),
            })?;
            buf.put_u16(len);
            buf.extend_from_slice(&payload);
        }
        Ok(buf)
    }

    /// Decode a batch.
    ///
    /// The outer error means the framing itself is broken. A step that fails
    /// to decode yields an inner error while its neighbours still decode.
    pub fn decode_batch(
        &self,
        mut data: &[u8],
    ) -> Result<Vec<Result<StepRecord, CodecError>>, CodecError> {
        let buf = &mut data;
        let count = get_u16(buf, "batch count")?;
        let mut steps = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let len = usize::from(get_u16(buf, "step length")?);
            if buf.len() < len {
                return Err(CodecError::Truncated("step"));
            }
            let data: &[u8] = *buf;
            let (payload, rest) = data.split_at(len);
            steps.push(self.decode(payload));
            *buf = rest;
        }
        if !buf.is_empty() {
            return Err(CodecError::TrailingBytes(buf.len()));
        }
        Ok(steps)
    }
}

/// Append a complete correction payload to `buf`.
pub fn encode_correction(correction: &Correction, buf: &mut BytesMut) -> Result<(), CodecError> {
    let s = &correction.snapshot;
    let [animation, motion] = &s.overrides;

    let mut flags = 0u8;
    for (bit, on) in [
        (GROUNDED, s.grounded),
        (STAMINA_DRAINED, s.stamina_drained),
        (CHARGE_DRAINED, s.charge_drained),
        (GRACE_WINDOW_DRAINED, s.grace_window_drained),
        (ANIMATION_OVERRIDE, animation.is_some()),
        (MOTION_OVERRIDE, motion.is_some()),
    ] {
        if on {
            flags |= bit;
        }
    }

    check_finite_f64(correction.timestamp, "timestamp")?;
    buf.put_f64(correction.timestamp);
    put_vec3(buf, s.position, "position")?;
    put_vec3(buf, s.velocity, "velocity")?;
    buf.put_u8(flags);
    put_f32(buf, s.stamina, "stamina")?;
    put_f32(buf, s.charge, "charge")?;
    put_f32(buf, s.grace_window, "grace window")?;
    buf.put_u8(s.crouch.phase().to_u8());
    put_f32(buf, s.crouch.progress(), "crouch progress")?;
    put_f32(buf, s.crouch.duration(), "crouch duration")?;

    for motion in s.overrides.iter().flatten() {
        put_name(buf, &motion.name, "override name")?;
        put_vec3(buf, motion.velocity, "override velocity")?;
        put_f32(buf, motion.remaining, "override remaining")?;
    }
    Ok(())
}

/// Decode exactly one correction payload.
pub fn decode_correction(mut data: &[u8]) -> Result<Correction, CodecError> {
    let buf = &mut data;

    let timestamp = get_f64(buf, "timestamp")?;
    let position = get_vec3(buf, "position")?;
    let velocity = get_vec3(buf, "velocity")?;
    let flags = get_u8(buf, "state flags")?;
    if flags & !CORRECTION_KNOWN != 0 {
        return Err(CodecError::UnknownPresenceBits(u16::from(
            flags & !CORRECTION_KNOWN,
        )));
    }
    let stamina = get_f32(buf, "stamina")?;
    let charge = get_f32(buf, "charge")?;
    let grace_window = get_f32(buf, "grace window")?;
    let raw_phase = get_u8(buf, "crouch phase")?;
    let phase = CrouchPhase::from_u8(raw_phase).ok_or(CodecError::UnknownCrouchPhase(raw_phase))?;
    let progress = get_f32(buf, "crouch progress")?;
    let duration = get_f32(buf, "crouch duration")?;

    let mut overrides = [None, None];
    for (slot, bit) in overrides.iter_mut().zip([ANIMATION_OVERRIDE, MOTION_OVERRIDE]) {
        if flags & bit != 0 {
            let name = get_name(buf, "override name")?;
            let velocity = get_vec3(buf, "override velocity")?;
            let remaining = get_f32(buf, "override remaining")?;
            *slot = Some(MotionOverride::new(name, velocity, remaining));
        }
    }

    if !buf.is_empty() {
        return Err(CodecError::TrailingBytes(buf.len()));
    }

    Ok(Correction {
        timestamp,
        snapshot: ActorSnapshot {
            position,
            velocity,
            grounded: flags & GROUNDED != 0,
            stamina,
            stamina_drained: flags & STAMINA_DRAINED != 0,
            charge,
            charge_drained: flags & CHARGE_DRAINED != 0,
            grace_window,
            grace_window_drained: flags & GRACE_WINDOW_DRAINED != 0,
            crouch: CrouchState::from_parts(phase, progress, duration),
            overrides,
        },
    })
}

fn check_finite_f64(value: f64, field: &'static str) -> Result<(), CodecError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CodecError::NonFinite(field))
    }
}

fn put_f32(buf: &mut BytesMut, value: f32, field: &'static str) -> Result<(), CodecError> {
    if !value.is_finite() {
        return Err(CodecError::NonFinite(field));
    }
    buf.put_f32(value);
    Ok(())
}

fn put_vec3(buf: &mut BytesMut, value: Vec3, field: &'static str) -> Result<(), CodecError> {
    put_f32(buf, value.x, field)?;
    put_f32(buf, value.y, field)?;
    put_f32(buf, value.z, field)
}

fn put_name(buf: &mut BytesMut, name: &str, field: &'static str) -> Result<(), CodecError> {
    let len = u8::try_from(name.len()).map_err(|_| CodecError::Oversized {
        field,
        len: name.len(),
    })?;
    buf.put_u8(len);
    buf.extend_from_slice(name.as_bytes());
    Ok(())
}

fn get_u8(buf: &mut &[u8], field: &'static str) -> Result<u8, CodecError> {
    if buf.remaining() < 1 {
        return Err(CodecError::Truncated(field));
    }
    Ok(buf.get_u8())
}

fn get_u16(buf: &mut &[u8], field: &'static str) -> Result<u16, CodecError> {
    if buf.remaining() < 2 {
        return Err(CodecError::Truncated(field));
    }
    Ok(buf.get_u16())
}

fn get_f32(buf: &mut &[u8], field: &'static str) -> Result<f32, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::Truncated(field));
    }
    let value = buf.get_f32();
    if !value.is_finite() {
        return Err(CodecError::NonFinite(field));
    }
    Ok(value)
}

fn get_f64(buf: &mut &[u8], field: &'static str) -> Result<f64, CodecError> {
    if buf.remaining() < 8 {
        return Err(CodecError::Truncated(field));
    }
    let value = buf.get_f64();
    check_finite_f64(value, field)?;
    Ok(value)
}

fn get_vec3(buf: &mut &[u8], field: &'static str) -> Result<Vec3, CodecError> {
    Ok(Vec3::new(
        get_f32(buf, field)?,
        get_f32(buf, field)?,
        get_f32(buf, field)?,
    ))
}

fn get_name(buf: &mut &[u8], field: &'static str) -> Result<String, CodecError> {
    let len = usize::from(get_u8(buf, field)?);
    if buf.remaining() < len {
        return Err(CodecError::Truncated(field));
    }
    let data: &[u8] = *buf;
    let (bytes, rest) = data.split_at(len);
    let name = std::str::from_utf8(bytes)
        .map_err(|_| CodecError::InvalidUtf8(field))?
        .to_string();
    *buf = rest;
    Ok(name)
}
