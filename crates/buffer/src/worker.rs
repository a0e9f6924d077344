//! Flush worker - drains sealed chunks into a chunk writer with retry

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, instrument, warn};

use contracts::{Chunk, ChunkWriter};

use crate::metrics::BufferMetrics;
use crate::settings::RetryPolicy;

/// Worker task that consumes sealed chunks and writes them
///
/// Runs until every sender is dropped, so queued chunks are always drained
/// before the writer is flushed and closed.
#[instrument(
    name = "buffer_flush_worker",
    skip(writer, rx, retry, metrics),
    fields(writer = writer.name())
)]
pub(crate) async fn flush_worker<W: ChunkWriter>(
    mut writer: W,
    mut rx: mpsc::Receiver<Chunk>,
    retry: RetryPolicy,
    metrics: Arc<BufferMetrics>,
    output: String,
) {
    debug!(output = %output, "Flush worker started");

    while let Some(chunk) = rx.recv().await {
        metrics.set_queue_len(rx.len());
        observability::record_buffer_queue_depth(&output, rx.len());

        write_with_retry(&mut writer, &chunk, &retry, &metrics, &output).await;
    }

    // Cleanup
    if let Err(e) = writer.flush().await {
        error!(output = %output, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = writer.close().await {
        error!(output = %output, error = %e, "Close failed on shutdown");
    }

    debug!(output = %output, "Flush worker stopped");
}

async fn write_with_retry<W: ChunkWriter>(
    writer: &mut W,
    chunk: &Chunk,
    retry: &RetryPolicy,
    metrics: &BufferMetrics,
    output: &str,
) {
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        match writer.write(chunk).await {
            Ok(()) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                metrics.record_flush(chunk.records, chunk.bytesize(), latency_ms);
                observability::record_chunk_flushed(
                    output,
                    writer.name(),
                    chunk.records,
                    chunk.bytesize(),
                );
                debug!(
                    output = %output,
                    chunk_id = %chunk.id,
                    records = chunk.records,
                    attempts = attempt + 1,
                    "Chunk flushed"
                );
                return;
            }
            Err(e) if attempt >= retry.max_times => {
                metrics.inc_discarded();
                observability::record_chunk_discarded(output);
                error!(
                    output = %output,
                    chunk_id = %chunk.id,
                    key = %chunk.key,
                    records = chunk.records,
                    retries = attempt,
                    error = %e,
                    "Retry limit exceeded, chunk discarded"
                );
                return;
            }
            Err(e) => {
                let wait = retry.backoff(attempt);
                attempt += 1;
                metrics.inc_retry();
                observability::record_flush_retry(output, attempt);
                warn!(
                    output = %output,
                    chunk_id = %chunk.id,
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "Write failed, retrying"
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}
