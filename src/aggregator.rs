//! Single-consumer aggregation of observations into per-device series.

use crate::channel::ObservationSource;
use crate::series::SeriesStore;

/// Drain `source` until the channel closes, then hand back the finished
/// store.
///
/// Spawn this on a task and await its handle: by the time the store is
/// returned, every observation admitted to the channel has been appended,
/// so completion signaling and store visibility are one handoff.
pub async fn aggregate(mut source: ObservationSource) -> SeriesStore {
    let mut store = SeriesStore::new();
    while let Some(observation) = source.receive().await {
        store.append(observation);
    }
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::bounded;
    use crate::test_utils::observation;

    #[tokio::test]
    async fn per_device_sequences_follow_arrival_order() {
        let (sink, source) = bounded(16);
        sink.submit(observation("CoSensor", -40, 0)).await;
        sink.submit(observation("CoMeter", -60, 1)).await;
        sink.submit(observation("CoSensor", -42, 2)).await;
        sink.submit(observation("CoMeter", -61, 3)).await;
        sink.submit(observation("CoSensor", -44, 4)).await;
        sink.close();

        let store = aggregate(source).await;
        let sensor: Vec<i16> = store
            .get("CoSensor")
            .unwrap()
            .iter()
            .map(|s| s.rssi)
            .collect();
        let meter: Vec<i16> = store
            .get("CoMeter")
            .unwrap()
            .iter()
            .map(|s| s.rssi)
            .collect();

        assert_eq!(sensor, vec![-40, -42, -44]);
        assert_eq!(meter, vec![-60, -61]);
    }

    #[tokio::test]
    async fn no_admitted_observation_is_lost_after_close() {
        let (sink, source) = bounded(32);
        for i in 0..20 {
            sink.submit(observation("CoSensor", -(40 + i), i as u64)).await;
        }
        sink.close();

        let store = aggregate(source).await;
        assert_eq!(store.get("CoSensor").unwrap().len(), 20);
    }

    #[tokio::test]
    async fn store_arrives_only_after_the_channel_drained() {
        let (sink, source) = bounded(4);
        let aggregator = tokio::spawn(aggregate(source));

        for i in 0..10 {
            sink.submit(observation("CoSensor", -40, i)).await;
        }
        sink.close();

        let store = aggregator.await.unwrap();
        assert_eq!(store.get("CoSensor").unwrap().len(), 10);
    }

    #[tokio::test]
    async fn empty_run_yields_empty_store() {
        let (sink, source) = bounded(4);
        sink.close();

        let store = aggregate(source).await;
        assert!(store.is_empty());
        assert_eq!(store.device_count(), 0);
    }
}
