//! MemoryBuffer - keyed in-memory chunk staging with a bounded flush queue

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use contracts::{
    Buffer, BufferError, BufferLifecycle, Chunk, ChunkId, ChunkWriter, FlushMode, MetadataKey,
};

use crate::metrics::BufferMetrics;
use crate::settings::BufferSettings;
use crate::worker::flush_worker;

/// Buffer phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Not started, appends rejected
    Idle,
    /// Accepting appends
    Running,
    /// Teardown in progress, appends rejected
    Draining,
    /// Queue closed and worker finished
    Closed,
}

/// Open chunk for one metadata key
#[derive(Debug)]
struct StagedChunk {
    id: ChunkId,
    data: BytesMut,
    records: usize,
    created: Instant,
}

impl StagedChunk {
    fn seal(self, key: MetadataKey) -> Chunk {
        Chunk::new(self.id, key, self.data.freeze(), self.records)
    }
}

/// Mutable state, guarded together so sealing and enqueueing are atomic
#[derive(Debug)]
struct Staging {
    phase: Phase,
    chunks: HashMap<MetadataKey, StagedChunk>,
    tx: Option<mpsc::Sender<Chunk>>,
}

impl Staging {
    fn sender(&self) -> Result<&mpsc::Sender<Chunk>, BufferError> {
        sender(self.phase, self.tx.as_ref())
    }
}

fn sender(
    phase: Phase,
    tx: Option<&mpsc::Sender<Chunk>>,
) -> Result<&mpsc::Sender<Chunk>, BufferError> {
    match (phase, tx) {
        (Phase::Running, Some(tx)) => Ok(tx),
        (Phase::Idle, _) => Err(BufferError::NotStarted),
        _ => Err(BufferError::Closed),
    }
}

#[derive(Debug)]
struct Shared {
    name: String,
    settings: BufferSettings,
    staging: Mutex<Staging>,
    next_id: AtomicU64,
    metrics: Arc<BufferMetrics>,
}

impl Shared {
    fn next_chunk_id(&self) -> ChunkId {
        ChunkId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Seal the chunk for `key` and hand it to the flush queue
    ///
    /// On a full queue the chunk stays staged, untouched.
    fn seal(&self, staging: &mut Staging, key: &MetadataKey) -> Result<(), BufferError> {
        let Staging { phase, chunks, tx } = staging;
        let permit = match sender(*phase, tx.as_ref())?.try_reserve() {
            Ok(permit) => permit,
            Err(mpsc::error::TrySendError::Full(())) => {
                return Err(BufferError::Overflow {
                    queued: self.settings.queue_limit,
                    limit: self.settings.queue_limit,
                })
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                error!(output = %self.name, "Flush worker closed unexpectedly");
                return Err(BufferError::Closed);
            }
        };

        if let Some((key, staged)) = chunks.remove_entry(key) {
            let chunk = staged.seal(key);
            debug!(
                output = %self.name,
                chunk_id = %chunk.id,
                records = chunk.records,
                bytes = chunk.bytesize(),
                "Chunk sealed"
            );
            permit.send(chunk);
            self.metrics.inc_sealed();
        }
        Ok(())
    }

    /// Seal without failing the caller; a full queue leaves the chunk staged
    fn try_seal(&self, staging: &mut Staging, key: &MetadataKey) {
        if let Err(e) = self.seal(staging, key) {
            debug!(output = %self.name, key = %key, error = %e, "Seal deferred");
        }
    }

    /// Append `records` entries worth `payload` bytes to the chunk for `key`
    fn append(&self, key: MetadataKey, payload: &[Bytes], records: usize) -> Result<(), BufferError> {
        let size: usize = payload.iter().map(Bytes::len).sum();
        let limits = &self.settings;

        let mut staging = self.staging.lock();
        staging.sender()?;

        // Seal first when this append would overflow the open chunk
        let must_seal = staging.chunks.get(&key).is_some_and(|open| {
            open.records > 0
                && (open.data.len() + size > limits.chunk_limit_bytes
                    || open.records + records > limits.chunk_limit_records)
        });
        if must_seal {
            if let Err(e) = self.seal(&mut staging, &key) {
                if matches!(e, BufferError::Overflow { .. }) {
                    self.metrics.inc_overflow();
                    warn!(output = %self.name, key = %key, "Flush queue full, append rejected");
                }
                return Err(e);
            }
        }

        let id = match staging.chunks.get(&key) {
            Some(open) => open.id,
            None => self.next_chunk_id(),
        };
        let open = staging
            .chunks
            .entry(key.clone())
            .or_insert_with(|| StagedChunk {
                id,
                data: BytesMut::with_capacity(size),
                records: 0,
                created: Instant::now(),
            });
        for part in payload {
            open.data.extend_from_slice(part);
        }
        open.records += records;

        let full =
            open.data.len() >= limits.chunk_limit_bytes || open.records >= limits.chunk_limit_records;
        if full || limits.flush_mode == FlushMode::Immediate {
            self.try_seal(&mut staging, &key);
        }
        drop(staging);

        self.metrics.add_appended(records);
        observability::record_chunk_appended(&self.name, records, size);
        Ok(())
    }

    /// Seal staged chunks older than `max_age`
    fn seal_expired(&self, max_age: Duration) {
        let mut staging = self.staging.lock();
        if staging.phase != Phase::Running {
            return;
        }

        let mut expired: Vec<(ChunkId, MetadataKey)> = staging
            .chunks
            .iter()
            .filter(|(_, c)| c.created.elapsed() >= max_age)
            .map(|(k, c)| (c.id, k.clone()))
            .collect();
        expired.sort_by_key(|(id, _)| *id);

        for (_, key) in expired {
            self.try_seal(&mut staging, &key);
        }
    }

    /// Take every staged chunk, oldest first
    fn take_staged(staging: &mut Staging) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = staging
            .chunks
            .drain()
            .map(|(key, staged)| staged.seal(key))
            .collect();
        chunks.sort_by_key(|c| c.id);
        chunks
    }
}

#[derive(Debug, Default)]
struct Tasks {
    worker: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
}

/// In-memory keyed chunk buffer
///
/// One open chunk per metadata key. Sealed chunks go through a bounded queue
/// to a flush worker owning the writer `W`.
pub struct MemoryBuffer<W> {
    shared: Arc<Shared>,
    writer: Mutex<Option<W>>,
    tasks: Mutex<Tasks>,
}

impl<W> MemoryBuffer<W>
where
    W: ChunkWriter + Send + 'static,
{
    /// Create a new MemoryBuffer
    pub fn new(name: impl Into<String>, settings: BufferSettings, writer: W) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                settings,
                staging: Mutex::new(Staging {
                    phase: Phase::Idle,
                    chunks: HashMap::new(),
                    tx: None,
                }),
                next_id: AtomicU64::new(0),
                metrics: Arc::new(BufferMetrics::new()),
            }),
            writer: Mutex::new(Some(writer)),
            tasks: Mutex::new(Tasks::default()),
        }
    }

    /// Get buffer name
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn settings(&self) -> &BufferSettings {
        &self.shared.settings
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<BufferMetrics> {
        &self.shared.metrics
    }

    /// Number of open (unsealed) chunks
    pub fn staged_chunks(&self) -> usize {
        self.shared.staging.lock().chunks.len()
    }

    fn spawn_ticker(shared: Arc<Shared>) -> JoinHandle<()> {
        let max_age = match shared.settings.flush_mode {
            FlushMode::Immediate => Duration::ZERO,
            _ => shared.settings.flush_interval,
        };
        let period = shared.settings.flush_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if shared.staging.lock().phase != Phase::Running {
                    break;
                }
                shared.seal_expired(max_age);
            }
        })
    }

    fn stop_ticker(&self) {
        if let Some(ticker) = self.tasks.lock().ticker.take() {
            ticker.abort();
        }
    }
}

impl<W> Buffer for MemoryBuffer<W>
where
    W: ChunkWriter + Send + 'static,
{
    fn emit_bulk(&self, key: MetadataKey, data: Bytes, count: usize) -> Result<(), BufferError> {
        self.shared.append(key, std::slice::from_ref(&data), count)
    }

    fn emit(&self, key: MetadataKey, items: Vec<Bytes>) -> Result<(), BufferError> {
        let count = items.len();
        self.shared.append(key, &items, count)
    }
}

impl<W> BufferLifecycle for MemoryBuffer<W>
where
    W: ChunkWriter + Send + 'static,
{
    #[instrument(name = "memory_buffer_start", skip(self), fields(output = %self.shared.name))]
    async fn start(&self) -> Result<(), BufferError> {
        let mut staging = self.shared.staging.lock();
        if staging.phase != Phase::Idle {
            return Ok(());
        }

        let writer = self
            .writer
            .lock()
            .take()
            .ok_or_else(|| BufferError::write(&self.shared.name, "writer already taken"))?;

        let settings = &self.shared.settings;
        let (tx, rx) = mpsc::channel(settings.queue_limit);
        let worker = tokio::spawn(flush_worker(
            writer,
            rx,
            settings.retry,
            Arc::clone(&self.shared.metrics),
            self.shared.name.clone(),
        ));

        staging.tx = Some(tx);
        staging.phase = Phase::Running;
        drop(staging);

        let mut tasks = self.tasks.lock();
        tasks.worker = Some(worker);
        if settings.flush_mode != FlushMode::Lazy {
            tasks.ticker = Some(Self::spawn_ticker(Arc::clone(&self.shared)));
        }

        info!(
            output = %self.shared.name,
            flush_mode = ?settings.flush_mode,
            queue_limit = settings.queue_limit,
            "Buffer started"
        );
        Ok(())
    }

    #[instrument(name = "memory_buffer_before_shutdown", skip(self), fields(output = %self.shared.name))]
    async fn before_shutdown(&self) -> Result<(), BufferError> {
        self.stop_ticker();

        let (chunks, tx) = {
            let mut staging = self.shared.staging.lock();
            if staging.phase != Phase::Running {
                return Ok(());
            }
            staging.phase = Phase::Draining;
            if !self.shared.settings.flush_at_shutdown {
                return Ok(());
            }
            (Shared::take_staged(&mut staging), staging.tx.clone())
        };

        let Some(tx) = tx else {
            return Ok(());
        };
        let count = chunks.len();
        for chunk in chunks {
            // Waits for queue space; the worker is still draining
            if tx.send(chunk).await.is_err() {
                error!(output = %self.shared.name, "Flush worker closed unexpectedly");
                return Err(BufferError::Closed);
            }
            self.shared.metrics.inc_sealed();
        }

        debug!(output = %self.shared.name, chunks = count, "Staged chunks enqueued for shutdown");
        Ok(())
    }

    #[instrument(name = "memory_buffer_shutdown", skip(self), fields(output = %self.shared.name))]
    async fn shutdown(&self) -> Result<(), BufferError> {
        self.stop_ticker();

        {
            let mut staging = self.shared.staging.lock();
            if staging.phase == Phase::Running {
                staging.phase = Phase::Draining;
            }
            // Dropping the sender lets the worker drain and exit
            staging.tx = None;
        }

        let worker = self.tasks.lock().worker.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(output = %self.shared.name, error = ?e, "Flush worker panicked");
            }
            debug!(output = %self.shared.name, "Flush worker joined");
        }

        let mut staging = self.shared.staging.lock();
        if staging.phase == Phase::Draining {
            staging.phase = Phase::Closed;
        }
        Ok(())
    }

    #[instrument(name = "memory_buffer_close", skip(self), fields(output = %self.shared.name))]
    async fn close(&self) -> Result<(), BufferError> {
        let leftover = {
            let mut staging = self.shared.staging.lock();
            staging.tx = None;
            if staging.phase != Phase::Idle {
                staging.phase = Phase::Closed;
            }
            Shared::take_staged(&mut staging)
        };

        if !leftover.is_empty() {
            let records: usize = leftover.iter().map(|c| c.records).sum();
            for _ in &leftover {
                self.shared.metrics.inc_discarded();
                observability::record_chunk_discarded(&self.shared.name);
            }
            warn!(
                output = %self.shared.name,
                chunks = leftover.len(),
                records,
                "Buffer closed with staged chunks, dropped"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::BufferConfig;
    use std::sync::atomic::AtomicBool;

    /// Writer collecting chunks in memory
    #[derive(Clone, Default)]
    struct CollectingWriter {
        chunks: Arc<Mutex<Vec<Chunk>>>,
        closed: Arc<AtomicBool>,
    }

    impl ChunkWriter for CollectingWriter {
        fn name(&self) -> &str {
            "collect"
        }

        async fn write(&mut self, chunk: &Chunk) -> Result<(), BufferError> {
            self.chunks.lock().push(chunk.clone());
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), BufferError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), BufferError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Writer that never finishes a write
    struct StuckWriter;

    impl ChunkWriter for StuckWriter {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn write(&mut self, _chunk: &Chunk) -> Result<(), BufferError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), BufferError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), BufferError> {
            Ok(())
        }
    }

    fn lazy_settings() -> BufferSettings {
        BufferSettings {
            flush_mode: FlushMode::Lazy,
            ..BufferSettings::from(&BufferConfig::default())
        }
    }

    fn key(tag: &str) -> MetadataKey {
        MetadataKey::new(None, Some(tag.to_string()), None)
    }

    async fn teardown<W: ChunkWriter + Send + 'static>(buffer: &MemoryBuffer<W>) {
        buffer.before_shutdown().await.unwrap();
        buffer.shutdown().await.unwrap();
        buffer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_append_before_start_rejected() {
        let buffer = MemoryBuffer::new("out", lazy_settings(), CollectingWriter::default());
        let err = buffer
            .emit_bulk(key("a"), Bytes::from_static(b"x"), 1)
            .unwrap_err();
        assert!(matches!(err, BufferError::NotStarted));
    }

    #[tokio::test]
    async fn test_same_key_appends_share_chunk() {
        let writer = CollectingWriter::default();
        let buffer = MemoryBuffer::new("out", lazy_settings(), writer.clone());
        buffer.start().await.unwrap();

        buffer.emit_bulk(key("a"), Bytes::from_static(b"12"), 2).unwrap();
        buffer.emit_bulk(key("b"), Bytes::from_static(b"3"), 1).unwrap();
        buffer
            .emit(key("a"), vec![Bytes::from_static(b"4"), Bytes::from_static(b"5")])
            .unwrap();
        assert_eq!(buffer.staged_chunks(), 2);

        teardown(&buffer).await;

        let chunks = writer.chunks.lock().clone();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].key, key("a"));
        assert_eq!(&chunks[0].data[..], b"1245");
        assert_eq!(chunks[0].records, 4);
        assert_eq!(chunks[1].key, key("b"));
        assert!(writer.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_record_limit_seals_chunk() {
        let writer = CollectingWriter::default();
        let settings = BufferSettings {
            chunk_limit_records: 3,
            ..lazy_settings()
        };
        let buffer = MemoryBuffer::new("out", settings, writer.clone());
        buffer.start().await.unwrap();

        buffer.emit_bulk(key("a"), Bytes::from_static(b"ab"), 2).unwrap();
        // 2 + 2 > 3: the first chunk is sealed before this append
        buffer.emit_bulk(key("a"), Bytes::from_static(b"cd"), 2).unwrap();
        teardown(&buffer).await;

        let chunks = writer.chunks.lock().clone();
        let records: Vec<_> = chunks.iter().map(|c| c.records).collect();
        assert_eq!(records, vec![2, 2]);
        assert!(chunks[0].id < chunks[1].id);
    }

    #[tokio::test]
    async fn test_oversized_append_becomes_own_chunk() {
        let writer = CollectingWriter::default();
        let settings = BufferSettings {
            chunk_limit_bytes: 4,
            ..lazy_settings()
        };
        let buffer = MemoryBuffer::new("out", settings, writer.clone());
        buffer.start().await.unwrap();

        buffer
            .emit_bulk(key("a"), Bytes::from_static(b"0123456789"), 1)
            .unwrap();
        // full chunk sealed right away
        assert_eq!(buffer.staged_chunks(), 0);
        teardown(&buffer).await;

        assert_eq!(writer.chunks.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_surfaces_overflow() {
        let settings = BufferSettings {
            flush_mode: FlushMode::Immediate,
            queue_limit: 1,
            ..lazy_settings()
        };
        let buffer = MemoryBuffer::new("out", settings, StuckWriter);
        buffer.start().await.unwrap();

        // the worker takes one chunk and blocks, the queue holds the next
        buffer.emit_bulk(key("a"), Bytes::from_static(b"1"), 1).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        buffer.emit_bulk(key("b"), Bytes::from_static(b"2"), 1).unwrap();

        // staged (seal deferred), then a limit-triggered seal must fail
        buffer.emit_bulk(key("c"), Bytes::from_static(b"3"), 1).unwrap();
        assert_eq!(buffer.staged_chunks(), 1);

        let settings_records = buffer.settings().chunk_limit_records;
        let err = buffer
            .emit_bulk(key("c"), Bytes::from_static(b"4"), settings_records)
            .unwrap_err();
        assert!(matches!(err, BufferError::Overflow { .. }));
        assert_eq!(buffer.staged_chunks(), 1);
        assert_eq!(buffer.metrics().snapshot().overflow_count, 1);
    }

    #[tokio::test]
    async fn test_interval_mode_flushes_by_age() {
        let writer = CollectingWriter::default();
        let settings = BufferSettings {
            flush_mode: FlushMode::Interval,
            flush_interval: Duration::from_millis(10),
            ..lazy_settings()
        };
        let buffer = MemoryBuffer::new("out", settings, writer.clone());
        buffer.start().await.unwrap();

        buffer.emit_bulk(key("a"), Bytes::from_static(b"x"), 1).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(buffer.staged_chunks(), 0);
        assert_eq!(writer.chunks.lock().len(), 1);
        teardown(&buffer).await;
    }

    #[tokio::test]
    async fn test_no_flush_at_shutdown_drops_on_close() {
        let writer = CollectingWriter::default();
        let settings = BufferSettings {
            flush_at_shutdown: false,
            ..lazy_settings()
        };
        let buffer = MemoryBuffer::new("out", settings, writer.clone());
        buffer.start().await.unwrap();
        buffer.emit_bulk(key("a"), Bytes::from_static(b"x"), 1).unwrap();

        teardown(&buffer).await;

        assert!(writer.chunks.lock().is_empty());
        assert_eq!(buffer.metrics().snapshot().discarded_count, 1);
    }

    #[tokio::test]
    async fn test_hooks_idempotent_and_closed_after_shutdown() {
        let writer = CollectingWriter::default();
        let buffer = MemoryBuffer::new("out", lazy_settings(), writer.clone());
        buffer.start().await.unwrap();
        buffer.start().await.unwrap();
        buffer.emit_bulk(key("a"), Bytes::from_static(b"x"), 1).unwrap();

        teardown(&buffer).await;
        teardown(&buffer).await;

        assert_eq!(writer.chunks.lock().len(), 1);
        let err = buffer
            .emit_bulk(key("a"), Bytes::from_static(b"y"), 1)
            .unwrap_err();
        assert!(matches!(err, BufferError::Closed));
    }
}
