//! Wall-clock helpers shared by the signal implementations.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current time.
pub fn now() -> SystemTime {
    SystemTime::now()
}

/// Converts a timestamp to nanoseconds since the unix epoch, saturating at
/// zero for pre-epoch times.
pub fn to_unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_epoch_saturates() {
        let before = UNIX_EPOCH - Duration::from_secs(1);
        assert_eq!(to_unix_nanos(before), 0);
    }

    #[test]
    fn epoch_offset_round_trips() {
        let t = UNIX_EPOCH + Duration::from_nanos(1_234_567_890);
        assert_eq!(to_unix_nanos(t), 1_234_567_890);
    }
}
