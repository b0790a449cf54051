//! Decay-function clamping (spec §4.5 step 2).

const MAX_TRIP_DURATION_MINUTES: u32 = 120;

/// A travel-time decay curve: tells the regional handler at what
/// trip-duration-in-seconds the weight for a given cutoff first reaches
/// zero. The curve itself belongs to the routing capability; this crate
/// only clamps its answer.
pub trait DecayFunction {
    fn seconds_to_zero(&self, cutoff_minutes: u32) -> f64;
}

/// Computes `maxTripDurationMinutes` for a regional task (§4.5 step 2):
/// asks the decay function where it reaches zero for the largest cutoff,
/// rounds up to whole minutes, and caps at 120 — an invariant checked by
/// §8's testable properties.
pub fn max_trip_duration_minutes(decay: &dyn DecayFunction, cutoffs_minutes: &[u32]) -> u32 {
    let max_cutoff = cutoffs_minutes.iter().copied().max().unwrap_or(0);
    let seconds = decay.seconds_to_zero(max_cutoff);
    let minutes = (seconds / 60.0).ceil() as u32;
    if minutes > MAX_TRIP_DURATION_MINUTES {
        tracing::warn!(
            requested_minutes = minutes,
            cap = MAX_TRIP_DURATION_MINUTES,
            "decay function trip duration exceeds cap, clamping"
        );
        MAX_TRIP_DURATION_MINUTES
    } else {
        minutes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDecay(f64);
    impl DecayFunction for FixedDecay {
        fn seconds_to_zero(&self, _cutoff_minutes: u32) -> f64 {
            self.0
        }
    }

    #[test]
    fn clamps_at_120_minutes() {
        let decay = FixedDecay(200.0 * 60.0);
        assert_eq!(max_trip_duration_minutes(&decay, &[60]), 120);
    }

    #[test]
    fn rounds_up_to_whole_minutes_when_under_cap() {
        let decay = FixedDecay(61.0);
        assert_eq!(max_trip_duration_minutes(&decay, &[30]), 2);
    }

    #[test]
    fn uses_the_largest_cutoff() {
        let decay = FixedDecay(30.0);
        assert_eq!(max_trip_duration_minutes(&decay, &[10, 60, 20]), 1);
    }
}
