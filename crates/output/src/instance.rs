//! Output instance and its lifecycle state machine

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chunking::ChunkingEngine;
use contracts::{
    BufferError, BufferLifecycle, Emitter, EventStream, LifecycleState, OutputError,
};
use tracing::{debug, info, instrument, warn};

use crate::OutputSettings;

struct Inner {
    state: LifecycleState,
    settings: Option<OutputSettings>,
    engine: Option<ChunkingEngine>,
}

/// Point-in-time view of an output
#[derive(Debug, Clone, Serialize)]
pub struct OutputSnapshot {
    pub name: String,
    pub state: LifecycleState,
    pub events_emitted: u64,
    pub emits_rejected: u64,
}

/// One output instance: lifecycle gate, chunking engine and buffer
///
/// Emits hold the state read lock for the whole chunking call, and every
/// state change takes the write lock. Once `stop` returns no emit is in
/// flight and none can succeed.
pub struct Output<B> {
    name: String,
    buffer: Arc<B>,
    inner: RwLock<Inner>,
    /// Serializes `advance_to` callers; hooks run outside `inner`
    transition: tokio::sync::Mutex<()>,
    emitted: AtomicU64,
    rejected: AtomicU64,
}

impl<B: BufferLifecycle> Output<B> {
    /// Create an unconfigured output owning `buffer`
    pub fn new(name: impl Into<String>, buffer: B) -> Self {
        Self::with_shared(name, Arc::new(buffer))
    }

    /// Create an unconfigured output over a shared buffer handle
    pub fn with_shared(name: impl Into<String>, buffer: Arc<B>) -> Self {
        Self {
            name: name.into(),
            buffer,
            inner: RwLock::new(Inner {
                state: LifecycleState::Unconfigured,
                settings: None,
                engine: None,
            }),
            transition: tokio::sync::Mutex::new(()),
            emitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn buffer(&self) -> &Arc<B> {
        &self.buffer
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.read().state
    }

    pub fn snapshot(&self) -> OutputSnapshot {
        OutputSnapshot {
            name: self.name.clone(),
            state: self.state(),
            events_emitted: self.emitted.load(Ordering::Relaxed),
            emits_rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Freeze chunking settings
    ///
    /// Repeating the call with identical settings is a no-op.
    ///
    /// # Errors
    /// `Configuration` when settings differ from the frozen ones, or when the
    /// instance was torn down without ever being configured.
    pub fn configure(&self, settings: OutputSettings) -> Result<(), OutputError> {
        let mut inner = self.inner.write();

        if inner.state == LifecycleState::Unconfigured {
            info!(
                output = %self.name,
                chunk_keys = ?settings.spec.chunk_keys(),
                format = ?settings.format,
                time_as_integer = settings.time_as_integer,
                "Output configured"
            );
            inner.engine = Some(ChunkingEngine::new(
                settings.spec.clone(),
                settings.format.clone(),
                settings.time_as_integer,
            ));
            inner.settings = Some(settings);
            inner.state = LifecycleState::Configured;
            return Ok(());
        }

        match &inner.settings {
            Some(current) if current.same_as(&settings) => {
                debug!(output = %self.name, "Already configured with identical settings");
                Ok(())
            }
            Some(_) => Err(OutputError::configuration(
                &self.name,
                "already configured with different settings",
            )),
            None => Err(OutputError::configuration(
                &self.name,
                format!("cannot configure in state {}", inner.state),
            )),
        }
    }

    /// Move forward to `target`, running each intermediate step once
    ///
    /// Already reached states are skipped, so repeated or overlapping calls
    /// only execute the remaining steps. An instance that never started
    /// jumps straight to `stopped` when a teardown state is requested.
    ///
    /// # Errors
    /// `InvalidTransition` when `target` is `configured` or `started` and
    /// cannot be reached (configuration needs settings). A failing start
    /// hook leaves the instance configured. Teardown hook failures are
    /// logged, the state still advances and the first error is returned.
    #[instrument(name = "output_advance_to", skip(self), fields(output = %self.name))]
    pub async fn advance_to(&self, target: LifecycleState) -> Result<(), OutputError> {
        let _guard = self.transition.lock().await;
        let mut first_error = None;

        loop {
            let current = self.state();
            if current >= target {
                break;
            }

            let next = if current < LifecycleState::Started && target.is_teardown() {
                LifecycleState::Stopped
            } else {
                match current.next() {
                    Some(next) => next,
                    None => break,
                }
            };

            if next == LifecycleState::Configured {
                return Err(OutputError::InvalidTransition {
                    from: current,
                    to: target,
                });
            }

            if let Err(e) = self.run_hook(next).await {
                if next == LifecycleState::Started {
                    return Err(e.into());
                }
                warn!(output = %self.name, state = %next, error = %e, "Lifecycle hook failed");
                first_error.get_or_insert(e);
            }
            self.set_state(next);
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn run_hook(&self, state: LifecycleState) -> Result<(), BufferError> {
        match state {
            LifecycleState::Started => self.buffer.start().await,
            LifecycleState::BeforeShutdown => self.buffer.before_shutdown().await,
            LifecycleState::Shutdown => self.buffer.shutdown().await,
            LifecycleState::AfterShutdown => {
                debug!(output = %self.name, "Buffer shut down");
                Ok(())
            }
            LifecycleState::Closed => self.buffer.close().await,
            LifecycleState::Terminated => {
                self.inner.write().engine = None;
                Ok(())
            }
            // stop is the state change itself
            LifecycleState::Unconfigured | LifecycleState::Configured | LifecycleState::Stopped => {
                Ok(())
            }
        }
    }

    fn set_state(&self, state: LifecycleState) {
        let mut inner = self.inner.write();
        let from = inner.state;
        inner.state = state;
        drop(inner);
        info!(output = %self.name, from = %from, to = %state, "Lifecycle transition");
    }

    pub async fn start(&self) -> Result<(), OutputError> {
        self.advance_to(LifecycleState::Started).await
    }

    pub async fn stop(&self) -> Result<(), OutputError> {
        self.advance_to(LifecycleState::Stopped).await
    }

    pub async fn before_shutdown(&self) -> Result<(), OutputError> {
        self.advance_to(LifecycleState::BeforeShutdown).await
    }

    pub async fn shutdown(&self) -> Result<(), OutputError> {
        self.advance_to(LifecycleState::Shutdown).await
    }

    pub async fn after_shutdown(&self) -> Result<(), OutputError> {
        self.advance_to(LifecycleState::AfterShutdown).await
    }

    pub async fn close(&self) -> Result<(), OutputError> {
        self.advance_to(LifecycleState::Closed).await
    }

    pub async fn terminate(&self) -> Result<(), OutputError> {
        self.advance_to(LifecycleState::Terminated).await
    }
}

fn reject_reason(err: &OutputError) -> &'static str {
    match err {
        OutputError::NotReady { .. } => "not_ready",
        OutputError::Formatter { .. } => "formatter",
        OutputError::Buffer(BufferError::Overflow { .. }) => "overflow",
        OutputError::Buffer(_) => "buffer",
        _ => "other",
    }
}

impl<B: BufferLifecycle> Emitter for Output<B> {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "output_emits",
        skip(self, stream),
        fields(output = %self.name, events = stream.len())
    )]
    fn emits(&self, tag: &str, stream: &EventStream) -> Result<(), OutputError> {
        let inner = self.inner.read();

        let result = match (&inner.engine, inner.state.accepts_events()) {
            (Some(engine), true) => engine.execute_chunking(tag, stream, self.buffer.as_ref()),
            _ => Err(OutputError::not_ready(&self.name, inner.state)),
        };

        match result {
            Ok(outcome) => {
                self.emitted
                    .fetch_add(outcome.events as u64, Ordering::Relaxed);
                observability::record_events_emitted(&self.name, tag, outcome.events);
                Ok(())
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                observability::record_emit_rejected(&self.name, reject_reason(&e));
                Err(e)
            }
        }
    }
}
