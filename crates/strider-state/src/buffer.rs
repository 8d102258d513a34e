//! Unacknowledged step log and the combine gate

use crate::record::StepRecord;
use std::collections::VecDeque;
use tracing::{trace, warn};

/// Limits for merging two adjacent records.
#[derive(Debug, Clone, PartialEq)]
pub struct CombineConfig {
    /// Longest merged delta, in seconds. Zero disables combining.
    pub max_combined_delta: f32,
    /// Allowed difference in input direction (1 - cosine, and length).
    pub direction_tolerance: f32,
    /// Allowed gap between the older end and the newer start position.
    pub position_tolerance: f32,
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            max_combined_delta: 0.05,
            direction_tolerance: 0.01,
            position_tolerance: 0.01,
        }
    }
}

impl CombineConfig {
    pub fn disabled() -> Self {
        Self {
            max_combined_delta: 0.0,
            ..Default::default()
        }
    }
}

/// Can `b`, the tick right after `a`, be merged into it?
///
/// Every condition must hold. Any flipped drained flag, crouch transition or
/// transition pulse keeps the two apart so the edge reaches the server on
/// its own record.
pub fn try_combine(a: &StepRecord, b: &StepRecord, config: &CombineConfig) -> bool {
    if a.important || b.important {
        return false;
    }
    if a.end.drained_flags() != b.end.drained_flags() {
        return false;
    }
    if a.marks[0].finished_last_step != b.marks[0].finished_last_step
        || a.marks[1].finished_last_step != b.marks[1].finished_last_step
    {
        return false;
    }
    if a.end.crouch_transitioning != b.end.crouch_transitioning {
        return false;
    }
    if a.compressed_flags() != b.compressed_flags() {
        return false;
    }
    movement_continuous(a, b, config)
}

/// Base-movement part of the gate: time, mode, input and position continuity.
fn movement_continuous(a: &StepRecord, b: &StepRecord, config: &CombineConfig) -> bool {
    if b.timestamp <= a.timestamp || a.delta + b.delta > config.max_combined_delta {
        return false;
    }
    if a.start_grounded != b.start_grounded || a.grounded != b.grounded {
        return false;
    }
    if (a.start_velocity.length_squared() == 0.0) != (b.start_velocity.length_squared() == 0.0) {
        return false;
    }

    let (da, db) = (a.input.direction, b.input.direction);
    match (da.length_squared() == 0.0, db.length_squared() == 0.0) {
        (true, true) => {}
        (false, false) => {
            let cosine = da.normalize().dot(db.normalize());
            if 1.0 - cosine > config.direction_tolerance
                || (da.length() - db.length()).abs() > config.direction_tolerance
            {
                return false;
            }
        }
        _ => return false,
    }

    b.start_position.distance(a.position) <= config.position_tolerance
}

/// Ordered log of records the server has not acknowledged yet.
///
/// The first `sent` records went out already and are only touched again
/// by replay. Combining only ever happens on an unsent tail.
///
/// Records leave only through acknowledgment or correction. Replay needs
/// every tick after the corrected one, so a gap would put the actor back
/// in time. Growing past `soft_limit` is logged, never enforced.
#[derive(Debug, Clone)]
pub struct StepBuffer {
    steps: VecDeque<StepRecord>,
    sent: usize,
    soft_limit: usize,
    over_limit: bool,
    config: CombineConfig,
    peak: usize,
}

impl StepBuffer {
    pub fn new(soft_limit: usize, config: CombineConfig) -> Self {
        Self {
            steps: VecDeque::new(),
            sent: 0,
            soft_limit: soft_limit.max(1),
            over_limit: false,
            config,
            peak: 0,
        }
    }

    pub fn combine_config(&self) -> &CombineConfig {
        &self.config
    }

    /// Add `step` at the tail.
    pub fn append(&mut self, step: StepRecord) {
        if let Some(last) = self.steps.back() {
            debug_assert!(step.timestamp > last.timestamp, "step timestamps must increase");
        }
        self.steps.push_back(step);
        self.peak = self.peak.max(self.steps.len());

        if self.steps.len() > self.soft_limit && !self.over_limit {
            self.over_limit = true;
            warn!(
                pending = self.steps.len(),
                limit = self.soft_limit,
                "Unacknowledged steps piling up"
            );
        }
    }

    /// Would `step` merge into the current tail?
    pub fn can_combine_tail(&self, step: &StepRecord) -> bool {
        match self.unsent_tail() {
            Some(tail) => {
                let ok = try_combine(tail, step, &self.config);
                trace!(
                    tail = tail.timestamp,
                    step = step.timestamp,
                    ok,
                    "Combine check"
                );
                ok
            }
            None => false,
        }
    }

    /// Merge `step` into the tail if the gate allows it, otherwise append.
    /// Returns true when merged.
    pub fn push(&mut self, step: StepRecord) -> bool {
        if self.can_combine_tail(&step) {
            self.combine_tail(&step);
            true
        } else {
            self.append(step);
            false
        }
    }

    /// Fold `step` into the unsent tail without checking the gate.
    ///
    /// Callers that re-simulate the merged pair first use this with the
    /// re-simulated end state.
    pub fn combine_tail(&mut self, step: &StepRecord) {
        if self.steps.len() > self.sent {
            if let Some(tail) = self.steps.back_mut() {
                tail.combine_with(step);
            }
        }
    }

    /// Drop every record at or before `timestamp`. Returns how many went.
    pub fn prune_acked(&mut self, timestamp: f64) -> usize {
        let mut pruned = 0;
        while self
            .steps
            .front()
            .map_or(false, |s| s.timestamp <= timestamp)
        {
            self.steps.pop_front();
            self.sent = self.sent.saturating_sub(1);
            pruned += 1;
        }
        if self.steps.len() <= self.soft_limit {
            self.over_limit = false;
        }
        pruned
    }

    /// Records not yet sent, in order.
    pub fn unsent(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().skip(self.sent)
    }

    /// Copy out the unsent records and mark them sent.
    pub fn take_unsent(&mut self) -> Vec<StepRecord> {
        let out: Vec<StepRecord> = self.unsent().cloned().collect();
        self.sent = self.steps.len();
        out
    }

    pub fn has_unsent_important(&self) -> bool {
        self.unsent().any(|s| s.important)
    }

    /// Oldest important record that went out but is not acknowledged yet.
    pub fn oldest_sent_important(&self) -> Option<&StepRecord> {
        self.steps.iter().take(self.sent).find(|s| s.important)
    }

    pub fn unsent_tail(&self) -> Option<&StepRecord> {
        if self.steps.len() > self.sent {
            self.steps.back()
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StepRecord> {
        self.steps.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn sent_count(&self) -> usize {
        self.sent
    }

    /// Most records ever held at once.
    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn is_over_limit(&self) -> bool {
        self.over_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};
    use strider_movement::MoveInput;

    fn step(timestamp: f64, x: f32) -> StepRecord {
        StepRecord {
            timestamp,
            delta: 0.01,
            input: MoveInput::new(Vec2::X),
            start_position: Vec3::new(x, 0.0, 0.0),
            start_velocity: Vec3::X,
            start_grounded: true,
            position: Vec3::new(x + 1.0, 0.0, 0.0),
            velocity: Vec3::X,
            grounded: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_adjacent_steps_combine() {
        let mut buffer = StepBuffer::new(16, CombineConfig::default());
        assert!(!buffer.push(step(0.01, 0.0)));
        assert!(buffer.push(step(0.02, 1.0)));
        assert_eq!(buffer.len(), 1);
        let merged = buffer.iter().next().expect("one record");
        assert_eq!(merged.timestamp, 0.02);
        assert!((merged.delta - 0.02).abs() < 1e-6);
        assert_eq!(merged.start_position, Vec3::ZERO);
        assert_eq!(merged.position, Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_sent_tail_is_frozen() {
        let mut buffer = StepBuffer::new(16, CombineConfig::default());
        buffer.push(step(0.01, 0.0));
        assert_eq!(buffer.take_unsent().len(), 1);
        assert!(!buffer.push(step(0.02, 1.0)));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.unsent().count(), 1);
    }

    #[test]
    fn test_discontinuous_position_refused() {
        let config = CombineConfig::default();
        assert!(!try_combine(&step(0.01, 0.0), &step(0.02, 5.0), &config));
    }

    #[test]
    fn test_delta_limit() {
        let config = CombineConfig::disabled();
        assert!(!try_combine(&step(0.01, 0.0), &step(0.02, 1.0), &config));
    }

    #[test]
    fn test_direction_change_refused() {
        let config = CombineConfig::default();
        let a = step(0.01, 0.0);
        let mut b = step(0.02, 1.0);
        b.input.direction = Vec2::Y;
        assert!(!try_combine(&a, &b, &config));
    }

    #[test]
    fn test_prune_acked_prefix() {
        let mut buffer = StepBuffer::new(16, CombineConfig::disabled());
        for i in 1..=5 {
            buffer.push(step(i as f64 * 0.01, i as f32));
        }
        buffer.take_unsent();
        assert_eq!(buffer.prune_acked(0.03), 3);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.sent_count(), 2);
        assert_eq!(buffer.prune_acked(0.0), 0);
    }

    #[test]
    fn test_soft_limit_keeps_unacknowledged() {
        let mut buffer = StepBuffer::new(3, CombineConfig::disabled());
        for i in 1..=5 {
            buffer.push(step(i as f64, i as f32));
        }
        assert_eq!(buffer.len(), 5);
        assert!(buffer.is_over_limit());
        assert_eq!(buffer.iter().next().map(|s| s.timestamp), Some(1.0));

        buffer.take_unsent();
        buffer.prune_acked(3.0);
        assert_eq!(buffer.len(), 2);
        assert!(!buffer.is_over_limit());
        assert_eq!(buffer.peak(), 5);
    }

    #[test]
    fn test_oldest_sent_important() {
        let mut buffer = StepBuffer::new(16, CombineConfig::disabled());
        buffer.push(step(0.01, 0.0));
        let mut edge = step(0.02, 1.0);
        edge.important = true;
        buffer.push(edge);
        assert!(buffer.oldest_sent_important().is_none());

        buffer.take_unsent();
        buffer.push(step(0.03, 2.0));
        assert_eq!(
            buffer.oldest_sent_important().map(|s| s.timestamp),
            Some(0.02)
        );

        buffer.prune_acked(0.02);
        assert!(buffer.oldest_sent_important().is_none());
    }
}
