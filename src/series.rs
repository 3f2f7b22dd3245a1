//! Per-device time-series storage.

use crate::observation::Observation;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// A retained signal-strength reading inside a device's series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Capture time of the originating observation.
    pub captured_at: SystemTime,
    /// Signal strength in dBm.
    pub rssi: i16,
}

/// Append-only map from device name to its samples, in arrival order.
///
/// Exclusively owned and mutated by the aggregator while the pipeline is
/// live, then moved to the report stage; the two never touch it
/// concurrently.
#[derive(Debug, Default)]
pub struct SeriesStore {
    series: HashMap<String, Vec<Sample>>,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation's sample at the tail of its device's series.
    ///
    /// A series is created on its first sample, so stored series are never
    /// empty.
    pub fn append(&mut self, observation: Observation) {
        debug_assert!(!observation.name.is_empty(), "observation with empty name");
        let sample = Sample {
            captured_at: observation.captured_at,
            rssi: observation.rssi,
        };
        self.series.entry(observation.name).or_default().push(sample);
    }

    pub fn get(&self, name: &str) -> Option<&[Sample]> {
        self.series.get(name).map(Vec::as_slice)
    }

    /// Iterate device series; iteration order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Sample])> {
        self.series
            .iter()
            .map(|(name, samples)| (name.as_str(), samples.as_slice()))
    }

    pub fn device_count(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Time spanned between a series' first and last sample.
///
/// Zero for a single sample, and zero when the wall clock stepped backwards
/// between the two.
pub fn elapsed(samples: &[Sample]) -> Duration {
    match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => last
            .captured_at
            .duration_since(first.captured_at)
            .unwrap_or(Duration::ZERO),
        _ => Duration::ZERO,
    }
}

/// Chart points for a series: seconds since the first sample on the x axis
/// against RSSI on the y axis.
pub fn chart_points(samples: &[Sample]) -> Vec<(f64, f64)> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    samples
        .iter()
        .map(|sample| {
            let x = sample
                .captured_at
                .duration_since(first.captured_at)
                .map(|offset| offset.as_secs_f64())
                .unwrap_or(0.0);
            (x, f64::from(sample.rssi))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::observation;

    #[test]
    fn appends_in_arrival_order() {
        let mut store = SeriesStore::new();
        store.append(observation("CoSensor", -40, 0));
        store.append(observation("CoSensor", -42, 1));
        store.append(observation("CoSensor", -41, 2));

        let samples = store.get("CoSensor").unwrap();
        assert_eq!(
            samples.iter().map(|s| s.rssi).collect::<Vec<_>>(),
            vec![-40, -42, -41]
        );
    }

    #[test]
    fn keys_are_created_on_first_append_only() {
        let mut store = SeriesStore::new();
        assert!(store.is_empty());
        assert!(store.get("CoSensor").is_none());

        store.append(observation("CoSensor", -40, 0));
        assert_eq!(store.device_count(), 1);
        for (_, samples) in store.iter() {
            assert!(!samples.is_empty());
        }
    }

    #[test]
    fn devices_are_kept_apart() {
        let mut store = SeriesStore::new();
        store.append(observation("CoSensor", -40, 0));
        store.append(observation("CoMeter", -60, 1));
        store.append(observation("CoSensor", -42, 2));

        assert_eq!(store.device_count(), 2);
        assert_eq!(store.get("CoSensor").unwrap().len(), 2);
        assert_eq!(store.get("CoMeter").unwrap().len(), 1);
    }

    #[test]
    fn elapsed_spans_first_to_last_sample() {
        let mut store = SeriesStore::new();
        store.append(observation("CoSensor", -40, 10));
        store.append(observation("CoSensor", -42, 25));

        let samples = store.get("CoSensor").unwrap();
        assert_eq!(elapsed(samples), Duration::from_secs(15));
    }

    #[test]
    fn elapsed_is_zero_for_a_single_sample() {
        let mut store = SeriesStore::new();
        store.append(observation("CoX", -40, 10));
        assert_eq!(elapsed(store.get("CoX").unwrap()), Duration::ZERO);
    }

    #[test]
    fn elapsed_is_zero_when_the_clock_steps_backwards() {
        let samples = [
            Sample {
                captured_at: SystemTime::UNIX_EPOCH + Duration::from_secs(20),
                rssi: -40,
            },
            Sample {
                captured_at: SystemTime::UNIX_EPOCH + Duration::from_secs(10),
                rssi: -42,
            },
        ];
        assert_eq!(elapsed(&samples), Duration::ZERO);
    }

    #[test]
    fn chart_points_offset_from_first_sample() {
        let mut store = SeriesStore::new();
        store.append(observation("CoSensor", -40, 100));
        store.append(observation("CoSensor", -42, 101));
        store.append(observation("CoSensor", -45, 103));

        let points = chart_points(store.get("CoSensor").unwrap());
        assert_eq!(points, vec![(0.0, -40.0), (1.0, -42.0), (3.0, -45.0)]);
    }

    #[test]
    fn chart_points_for_empty_slice_is_empty() {
        assert!(chart_points(&[]).is_empty());
    }
}
