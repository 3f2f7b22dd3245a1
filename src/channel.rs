//! Bounded hand-off channel between advertisement producers and the
//! aggregator.
//!
//! Producers block on [`ObservationSink::submit`] once the buffer is full;
//! nothing admitted is ever dropped. The scan driver owns the close side:
//! [`ObservationSink::close`] is idempotent, and submitting after it is a
//! lifecycle violation that panics.

use crate::observation::Observation;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Channel capacity used by the application pipeline.
pub const DEFAULT_CAPACITY: usize = 100;

/// Create a bounded observation channel.
pub fn bounded(capacity: usize) -> (ObservationSink, ObservationSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        ObservationSink {
            tx: Arc::new(Mutex::new(Some(tx))),
        },
        ObservationSource { rx },
    )
}

/// Producer half of the channel. Cloneable; all clones share the closed
/// state.
#[derive(Debug, Clone)]
pub struct ObservationSink {
    tx: Arc<Mutex<Option<mpsc::Sender<Observation>>>>,
}

impl ObservationSink {
    /// Hand an observation to the aggregator, waiting while the channel is
    /// at capacity.
    ///
    /// # Panics
    /// Panics when called after [`ObservationSink::close`].
    pub async fn submit(&self, observation: Observation) {
        let tx = self
            .tx
            .lock()
            .expect("observation channel lock poisoned")
            .clone();
        match tx {
            Some(tx) => {
                if tx.send(observation).await.is_err() {
                    panic!("observation channel receiver dropped while scanning");
                }
            }
            None => panic!("observation submitted after channel close"),
        }
    }

    /// Signal that no further observations will be submitted. Idempotent.
    ///
    /// Items already admitted stay readable; the source reports end of
    /// stream once they are drained.
    pub fn close(&self) {
        self.tx
            .lock()
            .expect("observation channel lock poisoned")
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .expect("observation channel lock poisoned")
            .is_none()
    }
}

/// Consumer half of the channel; owned by the aggregator alone.
#[derive(Debug)]
pub struct ObservationSource {
    rx: mpsc::Receiver<Observation>,
}

impl ObservationSource {
    /// Receive the next observation, or `None` once the channel is closed
    /// and fully drained.
    pub async fn receive(&mut self) -> Option<Observation> {
        self.rx.recv().await
    }
}
