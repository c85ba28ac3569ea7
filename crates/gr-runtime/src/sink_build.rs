use std::path::Path;
use std::sync::Arc;

use orion_error::prelude::*;

use gr_config::{OutputUri, resolve_path};
use gr_core::error::CoreReason;
use gr_core::schema::SchemaRegistry;
use gr_core::sink::{ArrowIpcSink, FanOutSink, JsonlSink, PublishSink};

use crate::error::{RuntimeReason, RuntimeResult};

/// Open the sink for one output destination. Relative paths resolve against
/// `base_dir`.
pub async fn open_sink(
    uri: &OutputUri,
    base_dir: &Path,
    schemas: &Arc<dyn SchemaRegistry>,
) -> RuntimeResult<Box<dyn PublishSink>> {
    let sink: Box<dyn PublishSink> = match uri {
        OutputUri::Jsonl { path } => {
            let path = resolve_path(path, base_dir);
            Box::new(JsonlSink::open(&path).await.err_conv()?)
        }
        OutputUri::ArrowIpc { path } => {
            let path = resolve_path(path, base_dir);
            Box::new(ArrowIpcSink::create(&path, Arc::clone(schemas)).err_conv()?)
        }
        OutputUri::Stdout => Box::new(JsonlSink::stdout()),
    };
    gr_debug!(res, output = %uri, "sink opened");
    Ok(sink)
}

/// Build the sink a replay publishes to. Several destinations are fanned
/// out in the given order.
pub async fn build_publish_sink(
    uris: &[OutputUri],
    base_dir: &Path,
    schemas: Arc<dyn SchemaRegistry>,
) -> RuntimeResult<Arc<dyn PublishSink>> {
    let mut sinks = Vec::with_capacity(uris.len());
    for uri in uris {
        sinks.push(open_sink(uri, base_dir, &schemas).await?);
    }
    match sinks.len() {
        0 => StructError::from(RuntimeReason::Core(CoreReason::Configuration))
            .with_detail("no output destination given".to_string())
            .err(),
        1 => Ok(Arc::from(sinks.remove(0))),
        n => {
            gr_info!(res, outputs = n, "fanning out replay output");
            Ok(Arc::new(FanOutSink::new(sinks)))
        }
    }
}
