use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use gr_config::{DeliveryFormat, OutputUri, ReplayConfig, ServiceConfig};
use gr_core::batch::Provenance;
use gr_core::sink::PublishSink;
use gr_runtime::signal::wait_for_signal;
use gr_runtime::sink_build::build_publish_sink;
use gr_runtime::tracing_init::init_tracing;
use gr_runtime::{Catalog, ReplayController, Retriever};

#[derive(Parser)]
#[command(name = "granule", about = "Dataset retrieval and granule replay")]
struct Cli {
    /// Path to granule.toml
    #[arg(short, long, global = true, default_value = "granule.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read one window and print it as a wire batch
    Retrieve(JobArgs),
    /// Stream a window to one or more outputs in batches
    Replay {
        #[command(flatten)]
        job: JobArgs,
        /// Output URI (file://, arrow://, stdout:); repeatable. Overrides
        /// the job's output_destination.
        #[arg(short, long = "output")]
        outputs: Vec<OutputUri>,
    },
    /// Print the last N rows of a dataset
    Last {
        dataset: String,
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        /// Delivery schema or view
        #[arg(long)]
        schema: Option<String>,
    },
    /// Print a dataset's layout
    Info { dataset: String },
}

#[derive(Args)]
struct JobArgs {
    /// Replay job file; flags below override its fields
    #[arg(short, long)]
    job: Option<PathBuf>,
    #[arg(short, long)]
    dataset: Option<String>,
    /// Window start, Unix seconds
    #[arg(long)]
    start: Option<f64>,
    /// Window end (exclusive), Unix seconds
    #[arg(long)]
    end: Option<f64>,
    /// Stride in seconds
    #[arg(long)]
    stride: Option<f64>,
    #[arg(long)]
    exact_stride: bool,
    /// Parameter to include; repeatable
    #[arg(short, long = "param")]
    params: Vec<String>,
    /// Rows per published batch
    #[arg(long)]
    limit: Option<usize>,
}

impl JobArgs {
    fn into_config(self, catalog: &Catalog) -> Result<ReplayConfig> {
        let mut cfg = match &self.job {
            Some(path) => ReplayConfig::load(path)?,
            None => {
                let mut cfg = ReplayConfig::default();
                cfg.query.publish_limit = catalog.publish_limit();
                cfg
            }
        };
        if self.dataset.is_some() {
            cfg.dataset_id = self.dataset;
        }
        if self.start.is_some() {
            cfg.query.start_time = self.start;
        }
        if self.end.is_some() {
            cfg.query.end_time = self.end;
        }
        if self.stride.is_some() {
            cfg.query.stride_time = self.stride;
        }
        cfg.query.exact_stride |= self.exact_stride;
        if !self.params.is_empty() {
            cfg.query.parameters = self.params;
        }
        if let Some(limit) = self.limit {
            cfg.query.publish_limit = limit;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("config path '{}': {e}", cli.config.display()))?;
    let service = ServiceConfig::load(&config_path)?;
    let base_dir = config_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("config path has no parent directory"))?
        .to_path_buf();

    let _guard = init_tracing(&service.logging, &base_dir)?;

    let catalog =
        Arc::new(Catalog::bootstrap(&service, &base_dir).map_err(|e| anyhow::anyhow!("{e}"))?);
    let retriever = Retriever::new(Arc::clone(&catalog));

    match cli.command {
        Commands::Retrieve(job) => {
            let cfg = job.into_config(&catalog)?;
            let mut batch = retriever
                .execute_retrieve(&cfg)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            let wire = batch.to_wire(&Provenance::new("granule-cli"));
            println!("{}", serde_json::to_string(&wire)?);
        }
        Commands::Replay { job, outputs } => {
            let cfg = job.into_config(&catalog)?;
            let outputs = if outputs.is_empty() {
                cfg.output_uri()?.into_iter().collect()
            } else {
                outputs
            };
            replay(cfg, &outputs, &base_dir, catalog).await?;
        }
        Commands::Last {
            dataset,
            count,
            schema,
        } => {
            let mut batch = retriever
                .last_values(&dataset, count, &DeliveryFormat { schema })
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            let wire = batch.to_wire(&Provenance::new("granule-cli"));
            println!("{}", serde_json::to_string(&wire)?);
        }
        Commands::Info { dataset } => {
            let info = retriever
                .dataset_info(&dataset)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }

    Ok(())
}

async fn replay(
    cfg: ReplayConfig,
    outputs: &[OutputUri],
    base_dir: &Path,
    catalog: Arc<Catalog>,
) -> Result<()> {
    let sink = build_publish_sink(outputs, base_dir, Arc::clone(catalog.schemas()))
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let controller = ReplayController::new(cfg, catalog, Arc::clone(&sink))
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let cancel = CancellationToken::new();
    let signals = tokio::spawn(wait_for_signal(cancel.clone()));

    controller.start().map_err(|e| anyhow::anyhow!("{e}"))?;
    tracing::info!(domain = "sys", dataset = %controller.dataset_id(), "replay running");

    let join = controller.join();
    tokio::pin!(join);
    let result = tokio::select! {
        r = &mut join => r,
        _ = cancel.cancelled() => {
            controller.stop();
            join.await
        }
    };
    cancel.cancel();
    let _ = signals.await;

    let close = sink.close().await;
    let summary = result.map_err(|e| anyhow::anyhow!("{e}"))?;
    close.map_err(|e| anyhow::anyhow!("{e}"))?;
    tracing::info!(
        domain = "sys",
        batches = summary.batches,
        rows = summary.rows,
        stopped = summary.stopped,
        "replay done"
    );
    Ok(())
}
