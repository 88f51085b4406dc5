use std::time::Duration;

use crate::event::SaveReason;

/// Inputs to the per-camera save decision
#[derive(Debug, Clone, Copy)]
pub struct SaveInputs {
    pub object_detected: bool,
    pub presence: bool,
    pub manual: bool,
    pub since_last_save: Duration,
    /// `Duration::ZERO` turns the silence fallback off
    pub max_silence: Duration,
}

/// Why the frame should be saved, or `None` to skip it.
///
/// Any one signal is enough. When several hold, the reported reason is the
/// most specific: object, then presence, then manual, then silence.
pub fn decide(inputs: SaveInputs) -> Option<SaveReason> {
    if inputs.object_detected {
        Some(SaveReason::Object)
    } else if inputs.presence {
        Some(SaveReason::Presence)
    } else if inputs.manual {
        Some(SaveReason::Manual)
    } else if !inputs.max_silence.is_zero() && inputs.since_last_save > inputs.max_silence {
        Some(SaveReason::Silence)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> SaveInputs {
        SaveInputs {
            object_detected: false,
            presence: false,
            manual: false,
            since_last_save: Duration::from_secs(1),
            max_silence: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_no_signal_no_save() {
        assert_eq!(decide(quiet()), None);
    }

    #[test]
    fn test_presence_alone_saves() {
        let inputs = SaveInputs {
            presence: true,
            ..quiet()
        };
        assert_eq!(decide(inputs), Some(SaveReason::Presence));
    }

    #[test]
    fn test_object_wins_over_presence() {
        let inputs = SaveInputs {
            object_detected: true,
            presence: true,
            ..quiet()
        };
        assert_eq!(decide(inputs), Some(SaveReason::Object));
    }

    #[test]
    fn test_silence_fallback() {
        let at_limit = SaveInputs {
            since_last_save: Duration::from_secs(60),
            ..quiet()
        };
        assert_eq!(decide(at_limit), None);

        let past_limit = SaveInputs {
            since_last_save: Duration::from_secs(61),
            ..quiet()
        };
        assert_eq!(decide(past_limit), Some(SaveReason::Silence));

        let disabled = SaveInputs {
            since_last_save: Duration::from_secs(1_000_000),
            max_silence: Duration::ZERO,
            ..quiet()
        };
        assert_eq!(decide(disabled), None);
    }

    #[test]
    fn test_manual_trigger() {
        let inputs = SaveInputs {
            manual: true,
            ..quiet()
        };
        assert_eq!(decide(inputs), Some(SaveReason::Manual));
    }
}
