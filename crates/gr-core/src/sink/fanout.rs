use async_trait::async_trait;

use super::PublishSink;
use crate::batch::WireBatch;
use crate::error::{CoreError, CoreResult};

/// Publishes every batch to several sinks.
///
/// Keeps going when one sink fails and returns the first error.
pub struct FanOutSink {
    sinks: Vec<Box<dyn PublishSink>>,
}

impl FanOutSink {
    pub fn new(sinks: Vec<Box<dyn PublishSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

fn keep_first(first: &mut Option<CoreError>, result: CoreResult<()>) {
    if let Err(e) = result
        && first.is_none()
    {
        *first = Some(e);
    }
}

#[async_trait]
impl PublishSink for FanOutSink {
    async fn publish(&self, batch: &WireBatch) -> CoreResult<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            keep_first(&mut first_err, sink.publish(batch).await);
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn flush(&self) -> CoreResult<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            keep_first(&mut first_err, sink.flush().await);
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn close(&self) -> CoreResult<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            keep_first(&mut first_err, sink.close().await);
        }
        first_err.map_or(Ok(()), Err)
    }
}
