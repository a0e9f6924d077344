//! Pipeline orchestrator - config -> outputs -> router, then replay.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use buffer::{create_writer, BufferSettings, ConfiguredWriter, MemoryBuffer};
use contracts::{
    BufferError, Emitter, EventStream, OutputConfig, OutputError, PipelineConfig, WriterConfig,
    WriterType,
};
use dispatcher::{RouteTable, RoutingOutput};
use output::{Output, OutputSettings};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, instrument, warn};

use super::{parse_line, RunStats};
use crate::error::CliError;

/// Upper bound of events in one `emits` call
const MAX_BATCH_EVENTS: usize = 1000;
/// Overflow retries before a batch is counted as rejected
const OVERFLOW_RETRIES: u32 = 50;
const OVERFLOW_BACKOFF: Duration = Duration::from_millis(100);

type ConfiguredOutput = Output<MemoryBuffer<ConfiguredWriter>>;

/// Replay options
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// JSON lines input ("-" = stdin)
    pub input: PathBuf,

    /// Replay timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, options: PipelineOptions) -> Self {
        Self { config, options }
    }

    /// Replay the input until EOF, timeout or `shutdown`, then tear down every output
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<RunStats> {
        let start_time = Instant::now();

        // Initialize Metrics (optional)
        if let Some(port) = self.options.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let outputs = build_outputs(&self.config).await?;

        let mut table = RouteTable::new();
        for (output, config) in outputs.iter().zip(&self.config.outputs) {
            let emitter: Arc<dyn Emitter> = output.clone();
            if let Err(e) = table.register(config.tags.iter().cloned(), emitter) {
                teardown(&outputs).await;
                return Err(e).context("Failed to build route table");
            }
        }
        info!(outputs = outputs.len(), routes = table.len(), "Router configured");
        let router = RoutingOutput::new("router", table);

        let mut stats = RunStats::default();
        let replayed = {
            let replay = async {
                let reader = open_input(&self.options.input).await?;
                replay(reader, &router, &mut stats).await
            };
            let replay = async {
                match self.options.timeout {
                    Some(timeout) => tokio::time::timeout(timeout, replay)
                        .await
                        .unwrap_or_else(|_| {
                            warn!(timeout_secs = timeout.as_secs(), "Replay timed out");
                            Ok(())
                        }),
                    None => replay.await,
                }
            };

            tokio::select! {
                result = replay => result,
                _ = shutdown => {
                    warn!("Received shutdown signal, tearing down outputs...");
                    Ok(())
                }
            }
        };

        info!("Shutting down outputs...");
        stats.teardown_failures = teardown(&outputs).await;

        let route_metrics = router.metrics().snapshot();
        debug!(?route_metrics, "Router metrics");

        for output in &outputs {
            let snapshot = output.snapshot();
            let mut delivery = output.buffer().metrics().snapshot().delivery_stats();
            delivery.events_emitted = snapshot.events_emitted;
            delivery.emits_rejected = snapshot.emits_rejected;
            stats.delivery.update(&snapshot.name, &delivery);
        }
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            events = stats.events_routed,
            "Pipeline shutdown complete"
        );

        replayed.map(|()| stats)
    }
}

/// Build, configure and start one output per configuration entry
#[instrument(name = "pipeline_build_outputs", skip(config), fields(outputs = config.outputs.len()))]
async fn build_outputs(config: &PipelineConfig) -> Result<Vec<Arc<ConfiguredOutput>>> {
    let mut outputs = Vec::with_capacity(config.outputs.len());

    for output_config in &config.outputs {
        match build_output(output_config).await {
            Ok(output) => outputs.push(output),
            Err(e) => {
                teardown(&outputs).await;
                return Err(e.into());
            }
        }
    }

    Ok(outputs)
}

async fn build_output(config: &OutputConfig) -> Result<Arc<ConfiguredOutput>, CliError> {
    let name = config.name.as_str();

    let writer = create_writer(name, &writer_config(config))
        .map_err(|e| CliError::pipeline(name, e.to_string()))?;
    let buffer = MemoryBuffer::new(name, BufferSettings::from(&config.buffer), writer);
    let output = Arc::new(Output::new(name, buffer));

    let settings =
        OutputSettings::from_config(config).map_err(|e| CliError::pipeline(name, e.to_string()))?;
    output
        .configure(settings)
        .map_err(|e| CliError::pipeline(name, e.to_string()))?;
    output
        .start()
        .await
        .map_err(|e| CliError::pipeline(name, e.to_string()))?;

    info!(
        output = name,
        tags = ?config.tags,
        writer = %config.writer.writer_type,
        "Output started"
    );
    Ok(output)
}

/// File chunks default to `.msgpack` for bulk encoding and `.log` for formatted text
fn writer_config(config: &OutputConfig) -> WriterConfig {
    let mut writer = config.writer.clone();
    if writer.writer_type == WriterType::File {
        let extension = if config.format.is_some() { "log" } else { "msgpack" };
        writer
            .params
            .entry("extension".to_string())
            .or_insert_with(|| extension.to_string());
    }
    writer
}

/// Run the full teardown on every output, returning how many failed
async fn teardown(outputs: &[Arc<ConfiguredOutput>]) -> usize {
    let mut failures = 0;
    for output in outputs {
        if let Err(e) = output.terminate().await {
            failures += 1;
            warn!(output = output.name(), error = %e, "Error during output teardown");
        }
    }
    failures
}

async fn open_input(path: &Path) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if path == Path::new("-") {
        info!("Reading events from stdin");
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }

    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open input {}", path.display()))?;
    info!(input = %path.display(), "Reading events from file");
    Ok(Box::new(BufReader::new(file)))
}

/// Replay JSON lines, one `emits` call per run of consecutive same-tag lines
async fn replay<R>(reader: R, router: &impl Emitter, stats: &mut RunStats) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut batch: Option<(String, EventStream)> = None;
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        stats.lines_read += 1;

        let event = match parse_line(&line, line_no) {
            Ok(event) => event,
            Err(e) => {
                stats.parse_errors += 1;
                warn!(error = %e, "Skipping input line");
                continue;
            }
        };

        let same_batch = matches!(
            &batch,
            Some((tag, stream)) if *tag == event.tag && stream.len() < MAX_BATCH_EVENTS
        );
        if !same_batch {
            if let Some((tag, stream)) = batch.take() {
                dispatch(router, &tag, &stream, stats).await;
            }
        }

        let (_, stream) = batch.get_or_insert_with(|| (event.tag.clone(), EventStream::new()));
        stream.add(event.time, event.record);
    }

    if let Some((tag, stream)) = batch.take() {
        dispatch(router, &tag, &stream, stats).await;
    }

    info!(lines = stats.lines_read, batches = stats.batches, "Input exhausted");
    Ok(())
}

async fn dispatch(router: &impl Emitter, tag: &str, stream: &EventStream, stats: &mut RunStats) {
    stats.batches += 1;
    let events = stream.len() as u64;
    let mut attempt = 0;

    loop {
        match router.emits(tag, stream) {
            Ok(()) => {
                stats.events_routed += events;
                return;
            }
            // groups accepted before the overflow are appended again on retry
            Err(OutputError::Buffer(BufferError::Overflow { .. })) if attempt < OVERFLOW_RETRIES => {
                attempt += 1;
                debug!(tag, attempt, "Buffer full, backing off");
                tokio::time::sleep(OVERFLOW_BACKOFF).await;
            }
            Err(OutputError::NoRoute { .. }) => {
                stats.route_misses += events;
                return;
            }
            Err(e) => {
                stats.events_rejected += events;
                warn!(tag, events, error = %e, "Emit failed");
                return;
            }
        }
    }
}
