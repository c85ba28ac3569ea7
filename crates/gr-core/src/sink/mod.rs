//! Destinations for published wire batches.

mod arrow_ipc;
mod channel;
mod fanout;
mod jsonl;

use std::sync::Arc;

use async_trait::async_trait;
use orion_error::StructError;

use crate::batch::WireBatch;
use crate::error::{CoreError, CoreReason, CoreResult};

pub use arrow_ipc::ArrowIpcSink;
pub use channel::ChannelSink;
pub use fanout::FanOutSink;
pub use jsonl::JsonlSink;

/// Receives wire batches one at a time, in publish order.
#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn publish(&self, batch: &WireBatch) -> CoreResult<()>;

    async fn flush(&self) -> CoreResult<()> {
        Ok(())
    }

    /// Finish the output. Publishing after close is an error for sinks
    /// that own a file.
    async fn close(&self) -> CoreResult<()> {
        self.flush().await
    }
}

#[async_trait]
impl<T: PublishSink + ?Sized> PublishSink for Arc<T> {
    async fn publish(&self, batch: &WireBatch) -> CoreResult<()> {
        (**self).publish(batch).await
    }

    async fn flush(&self) -> CoreResult<()> {
        (**self).flush().await
    }

    async fn close(&self) -> CoreResult<()> {
        (**self).close().await
    }
}

fn sink_err(detail: impl Into<String>) -> CoreError {
    StructError::from(CoreReason::Sink).with_detail(detail.into())
}
