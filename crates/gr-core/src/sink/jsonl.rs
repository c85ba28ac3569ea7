use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use super::{PublishSink, sink_err};
use crate::batch::WireBatch;
use crate::error::CoreResult;

type Writer = BufWriter<Box<dyn AsyncWrite + Unpin + Send>>;

/// Writes one wire batch per line as JSON.
pub struct JsonlSink {
    target: String,
    writer: Mutex<Option<Writer>>,
}

impl JsonlSink {
    /// Append to `path`, creating it and its parent directories.
    pub async fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                sink_err(format!("failed to create directory {}: {e}", parent.display()))
            })?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| sink_err(format!("failed to open {}: {e}", path.display())))?;
        Ok(Self::from_writer(path.display().to_string(), Box::new(file)))
    }

    pub fn stdout() -> Self {
        Self::from_writer("stdout", Box::new(tokio::io::stdout()))
    }

    fn from_writer(target: impl Into<String>, writer: Box<dyn AsyncWrite + Unpin + Send>) -> Self {
        Self {
            target: target.into(),
            writer: Mutex::new(Some(BufWriter::new(writer))),
        }
    }
}

#[async_trait]
impl PublishSink for JsonlSink {
    async fn publish(&self, batch: &WireBatch) -> CoreResult<()> {
        let json = serde_json::to_string(batch)
            .map_err(|e| sink_err(format!("failed to encode batch: {e}")))?;
        let mut guard = self.writer.lock().await;
        let w = guard
            .as_mut()
            .ok_or_else(|| sink_err(format!("{} is closed", self.target)))?;
        w.write_all(json.as_bytes())
            .await
            .map_err(|e| sink_err(format!("write to {}: {e}", self.target)))?;
        w.write_all(b"\n")
            .await
            .map_err(|e| sink_err(format!("write to {}: {e}", self.target)))?;
        w.flush()
            .await
            .map_err(|e| sink_err(format!("flush {}: {e}", self.target)))?;
        Ok(())
    }

    async fn flush(&self) -> CoreResult<()> {
        if let Some(w) = self.writer.lock().await.as_mut() {
            w.flush()
                .await
                .map_err(|e| sink_err(format!("flush {}: {e}", self.target)))?;
        }
        Ok(())
    }

    async fn close(&self) -> CoreResult<()> {
        if let Some(mut w) = self.writer.lock().await.take() {
            w.flush()
                .await
                .map_err(|e| sink_err(format!("flush {}: {e}", self.target)))?;
            w.shutdown()
                .await
                .map_err(|e| sink_err(format!("shutdown {}: {e}", self.target)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchContext, Provenance, RecordBatch};
    use crate::error::CoreReason;
    use crate::testutil::ctd_schema;

    fn sample() -> WireBatch {
        let mut b = RecordBatch::new(ctd_schema(), BatchContext::default());
        b.set("time", vec![1.0, 2.0]).unwrap();
        b.set("temp_counts", vec![100_000_i64, 110_000]).unwrap();
        b.to_wire(&Provenance::new("test"))
    }

    #[tokio::test]
    async fn writes_one_batch_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("granules.jsonl");

        let sink = JsonlSink::open(&path).await.unwrap();
        sink.publish(&sample()).await.unwrap();
        sink.publish(&sample()).await.unwrap();
        sink.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["schema_ref"], "ctd");
        assert_eq!(parsed["producer_id"], "test");
        assert_eq!(parsed["columns"]["temp"], serde_json::json!([0.0, 1.0]));
        assert!(parsed["columns"]["pressure"].is_null());
    }

    #[tokio::test]
    async fn publish_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::open(dir.path().join("g.jsonl")).await.unwrap();
        sink.close().await.unwrap();
        let err = sink.publish(&sample()).await.unwrap_err();
        assert_eq!(err.reason(), &CoreReason::Sink);
        // closing twice is fine
        sink.close().await.unwrap();
    }
}
