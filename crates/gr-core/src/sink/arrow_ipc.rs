use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use arrow::ipc::writer::FileWriter;
use async_trait::async_trait;

use super::{PublishSink, sink_err};
use crate::batch::WireBatch;
use crate::error::CoreResult;
use crate::schema::SchemaRegistry;

enum State {
    /// No batch yet; the file is created with the first batch's layout.
    Pending,
    Open(FileWriter<BufWriter<File>>),
    Closed,
}

/// Writes every published batch as one record batch of a single Arrow IPC
/// file. All batches must carry the same columns.
pub struct ArrowIpcSink {
    path: PathBuf,
    schemas: Arc<dyn SchemaRegistry>,
    state: Mutex<State>,
}

impl ArrowIpcSink {
    pub fn create(path: impl AsRef<Path>, schemas: Arc<dyn SchemaRegistry>) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                sink_err(format!("failed to create directory {}: {e}", parent.display()))
            })?;
        }
        Ok(Self {
            path,
            schemas,
            state: Mutex::new(State::Pending),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PublishSink for ArrowIpcSink {
    async fn publish(&self, batch: &WireBatch) -> CoreResult<()> {
        let schema = self.schemas.resolve(&batch.schema_ref)?;
        let arrow_batch = batch.to_arrow(&schema)?;

        let mut state = self
            .state
            .lock()
            .map_err(|_| sink_err("arrow sink lock poisoned"))?;
        if let State::Pending = *state {
            let file = File::create(&self.path).map_err(|e| {
                sink_err(format!("failed to create {}: {e}", self.path.display()))
            })?;
            let writer = FileWriter::try_new(BufWriter::new(file), &arrow_batch.schema())
                .map_err(|e| sink_err(format!("{}: {e}", self.path.display())))?;
            *state = State::Open(writer);
        }
        match &mut *state {
            State::Open(writer) => writer
                .write(&arrow_batch)
                .map_err(|e| sink_err(format!("{}: {e}", self.path.display()))),
            _ => Err(sink_err(format!("{} is closed", self.path.display()))),
        }
    }

    async fn close(&self) -> CoreResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| sink_err("arrow sink lock poisoned"))?;
        if let State::Open(writer) = &mut *state {
            writer
                .finish()
                .map_err(|e| sink_err(format!("{}: {e}", self.path.display())))?;
        }
        *state = State::Closed;
        Ok(())
    }
}
