//! BlueZ D-Bus backend.
//!
//! Discovers peripherals through the `bluer` crate and follows each one's
//! RSSI property updates for the lifetime of the scan. Requires the
//! `bluetoothd` daemon.

use super::{ScanConfig, ScanError, ScanOutcome};
use crate::channel::ObservationSink;
use crate::filter::NameFilter;
use bluer::{
    Adapter, AdapterEvent, Address, DeviceEvent, DeviceProperty, DiscoveryFilter,
    DiscoveryTransport, Session,
};
use futures::StreamExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Scan for advertisements using the BlueZ D-Bus backend.
///
/// Each discovered device gets a watcher task that pushes its filtered
/// RSSI readings into the sink. On any termination cause the discovery
/// stream ends first, every watcher is joined, and only then does the
/// channel close; nothing can submit after end-of-stream.
pub async fn scan(
    config: ScanConfig,
    filter: NameFilter,
    sink: ObservationSink,
    cancel: CancellationToken,
) -> Result<ScanOutcome, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;
    adapter
        .set_discovery_filter(DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: config.allow_duplicates,
            ..Default::default()
        })
        .await?;

    let mut discovery = adapter.discover_devices().await?;
    let watcher_cancel = cancel.child_token();
    let mut watchers = JoinSet::new();

    tokio::pin! {
        let deadline = super::deadline(config.duration);
    }

    let outcome = loop {
        tokio::select! {
            () = cancel.cancelled() => break ScanOutcome::Cancelled,
            () = &mut deadline => break ScanOutcome::DeadlineExceeded,
            event = discovery.next() => match event {
                Some(AdapterEvent::DeviceAdded(address)) => {
                    watchers.spawn(watch_device(
                        adapter.clone(),
                        address,
                        filter.clone(),
                        sink.clone(),
                        watcher_cancel.clone(),
                    ));
                }
                Some(_) => {}
                None => break ScanOutcome::Stopped,
            },
        }
    };

    // Producers must quiesce before the channel closes: end discovery, stop
    // the watchers, join every one of them.
    drop(discovery);
    watcher_cancel.cancel();
    while watchers.join_next().await.is_some() {}
    sink.close();

    Ok(outcome)
}

/// Follow one discovered device, submitting a filtered observation for the
/// initial reading and for every RSSI update after it.
async fn watch_device(
    adapter: Adapter,
    address: Address,
    filter: NameFilter,
    sink: ObservationSink,
    cancel: CancellationToken,
) {
    // A device can vanish between discovery and the property reads; there
    // is nothing to record for it then.
    let Ok(device) = adapter.device(address) else {
        return;
    };
    let Ok(mut events) = device.events().await else {
        return;
    };
    let mut name = device.name().await.ok().flatten();

    if let (Some(name), Ok(Some(rssi))) = (name.as_deref(), device.rssi().await)
        && let Some(observation) = filter.observe(name, rssi)
    {
        sink.submit(observation).await;
    }

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = events.next() => match event {
                Some(DeviceEvent::PropertyChanged(DeviceProperty::Name(updated))) => {
                    name = Some(updated);
                }
                Some(DeviceEvent::PropertyChanged(DeviceProperty::Rssi(rssi))) => {
                    if let Some(name) = name.as_deref()
                        && let Some(observation) = filter.observe(name, rssi)
                    {
                        sink.submit(observation).await;
                    }
                }
                Some(_) => {}
                None => break,
            },
        }
    }
}
