use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{PublishSink, sink_err};
use crate::batch::WireBatch;
use crate::error::CoreResult;

/// Forwards batches to an in-process consumer. Publishing waits while the
/// channel is full.
pub struct ChannelSink {
    tx: mpsc::Sender<WireBatch>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<WireBatch>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl PublishSink for ChannelSink {
    async fn publish(&self, batch: &WireBatch) -> CoreResult<()> {
        self.tx
            .send(batch.clone())
            .await
            .map_err(|_| sink_err("channel receiver dropped"))
    }
}
