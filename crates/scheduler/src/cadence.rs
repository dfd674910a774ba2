//! Per-sensor render grid bookkeeping.
//!
//! Slot `k` of a sensor lies at `first_capture_time + k * period`. Slot times
//! are always recomputed from `k`, never accumulated, so a sensor stays on
//! its grid no matter how many ticks other sensors insert in between.

use contracts::{SchedulerConfig, SensorDefinition};

#[derive(Debug, Clone, Default)]
pub(crate) struct Cadence {
    /// Render slots consumed in the current sequence
    renders_issued: u64,
    /// Manual capture requested for the next tick
    capture_requested: bool,
}

impl Cadence {
    pub(crate) fn slot_time(definition: &SensorDefinition, slot: u64) -> f64 {
        definition.first_capture_time + slot as f64 * definition.period
    }

    /// Whether a render in `slot` also produces a capture
    pub(crate) fn captures_on(definition: &SensorDefinition, slot: u64) -> bool {
        slot % (u64::from(definition.frames_between_captures) + 1) == 0
    }

    pub(crate) fn renders_issued(&self) -> u64 {
        self.renders_issued
    }

    pub(crate) fn next_render_time(&self, definition: &SensorDefinition) -> f64 {
        Self::slot_time(definition, self.renders_issued)
    }

    /// First slot index `>= from` that is not in the past relative to `now`.
    ///
    /// With `inclusive` a slot exactly at `now` still counts (no tick has
    /// landed on `now` yet); otherwise it has already been served.
    pub(crate) fn first_open_slot(
        definition: &SensorDefinition,
        from: u64,
        now: f64,
        inclusive: bool,
        config: &SchedulerConfig,
    ) -> u64 {
        let mut slot = from;
        if definition.period <= 0.0 {
            return slot;
        }

        if Self::slot_time(definition, slot) < now {
            let behind = ((now - definition.first_capture_time) / definition.period).floor();
            if behind > slot as f64 {
                slot = behind as u64;
            }
        }

        loop {
            let t = Self::slot_time(definition, slot);
            let at_now = config.coincides(t, now);
            let past = if inclusive {
                t < now && !at_now
            } else {
                t < now || at_now
            };
            if !past {
                return slot;
            }
            slot += 1;
        }
    }

    /// Skip slots that went by while the sensor was disabled or unregistered.
    /// Returns how many were skipped.
    pub(crate) fn catch_up(
        &mut self,
        definition: &SensorDefinition,
        now: f64,
        inclusive: bool,
        config: &SchedulerConfig,
    ) -> u64 {
        let open = Self::first_open_slot(definition, self.renders_issued, now, inclusive, config);
        let skipped = open - self.renders_issued;
        self.renders_issued = open;
        skipped
    }

    /// Consume the current slot, returning its index
    pub(crate) fn consume_render(&mut self) -> u64 {
        let slot = self.renders_issued;
        self.renders_issued += 1;
        slot
    }

    pub(crate) fn request_capture(&mut self) {
        self.capture_requested = true;
    }

    pub(crate) fn is_capture_requested(&self) -> bool {
        self.capture_requested
    }

    pub(crate) fn take_request(&mut self) -> bool {
        std::mem::take(&mut self.capture_requested)
    }

    /// Back to slot 0 for a new sequence; a pending manual request survives
    pub(crate) fn restart(&mut self) {
        self.renders_issued = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SensorSpec;

    fn definition(period: f64, first: f64, frames_between: u32) -> SensorDefinition {
        SensorDefinition::from_spec(
            "cam".into(),
            "ego".into(),
            SensorSpec::scheduled("camera", period)
                .with_first_capture_time(first)
                .with_frames_between_captures(frames_between),
        )
    }

    #[test]
    fn test_slot_time_is_not_accumulated() {
        let def = definition(0.1, 0.0, 0);
        assert_eq!(Cadence::slot_time(&def, 3), 0.0 + 3.0 * 0.1);
        assert_eq!(Cadence::slot_time(&def, 1000), 1000.0 * 0.1);
    }

    #[test]
    fn test_first_open_slot_inclusive_boundary() {
        let config = SchedulerConfig::default();
        let def = definition(2.0, 0.0, 0);

        assert_eq!(Cadence::first_open_slot(&def, 0, 0.0, true, &config), 0);
        assert_eq!(Cadence::first_open_slot(&def, 0, 0.0, false, &config), 1);
        assert_eq!(Cadence::first_open_slot(&def, 0, 5.0, true, &config), 3);
    }

    #[test]
    fn test_catch_up_skips_missed_slots() {
        let config = SchedulerConfig::default();
        let def = definition(1.0, 0.0, 0);
        let mut cadence = Cadence::default();

        let skipped = cadence.catch_up(&def, 4.0, false, &config);
        assert_eq!(skipped, 5);
        assert_eq!(cadence.next_render_time(&def), 5.0);
    }

    #[test]
    fn test_captures_on_modulus() {
        let def = definition(1.0, 0.0, 2);
        let captured: Vec<u64> = (0..7).filter(|k| Cadence::captures_on(&def, *k)).collect();
        assert_eq!(captured, vec![0, 3, 6]);
    }

    #[test]
    fn test_request_is_taken_once() {
        let mut cadence = Cadence::default();
        cadence.request_capture();
        assert!(cadence.is_capture_requested());
        assert!(cadence.take_request());
        assert!(!cadence.take_request());
    }

    #[test]
    fn test_restart_keeps_manual_request() {
        let def = definition(1.0, 0.0, 0);
        let mut cadence = Cadence::default();
        cadence.consume_render();
        cadence.request_capture();

        cadence.restart();
        assert_eq!(cadence.next_render_time(&def), 0.0);
        assert!(cadence.is_capture_requested());
    }
}
