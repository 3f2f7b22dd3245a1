use crate::observation::Observation;
use std::time::{Duration, SystemTime};

/// Build an observation with a deterministic timestamp `offset_secs` past
/// the Unix epoch.
pub fn observation(name: &str, rssi: i16, offset_secs: u64) -> Observation {
    Observation {
        name: name.to_string(),
        rssi,
        captured_at: SystemTime::UNIX_EPOCH + Duration::from_secs(offset_secs),
    }
}
