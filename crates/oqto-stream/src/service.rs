//! The reconciler's event loop.
//!
//! One task owns the [`Reconciler`] and serializes everything that touches
//! it: transport lines, session start/close commands, frame ticks and
//! completed state refreshes. No handler suspends mid-edit.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, trace, warn};

use oqto_stream_protocol::SessionEventEnvelope;

use crate::config::StreamConfig;
use crate::error::{RuntimeError, ServiceStopped};
use crate::ingest::{parse_line, shorten_for_log};
use crate::reconciler::Reconciler;
use crate::registry::RuntimeFactory;
use crate::runtime::{AgentSnapshot, SessionRuntime};

const INBOUND_CAPACITY: usize = 1024;
const LOG_LINE_CHARS: usize = 400;

type RefreshOutcome = (String, Result<AgentSnapshot, RuntimeError>);

/// Input to the service task.
#[derive(Debug)]
pub enum Inbound {
    /// One raw transport line.
    Line(String),
    /// An already-parsed envelope.
    Envelope(SessionEventEnvelope),
    StartSession(String),
    CloseSession(String),
    /// Flush every session and stop.
    Shutdown,
}

/// Cloneable sender side of a running service.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    tx: mpsc::Sender<Inbound>,
}

impl StreamHandle {
    pub async fn send(&self, inbound: Inbound) -> Result<(), ServiceStopped> {
        self.tx.send(inbound).await.map_err(|_| ServiceStopped)
    }

    pub async fn send_line(&self, line: impl Into<String>) -> Result<(), ServiceStopped> {
        self.send(Inbound::Line(line.into())).await
    }

    pub async fn send_envelope(&self, envelope: SessionEventEnvelope) -> Result<(), ServiceStopped> {
        self.send(Inbound::Envelope(envelope)).await
    }

    pub async fn start_session(&self, session_id: impl Into<String>) -> Result<(), ServiceStopped> {
        self.send(Inbound::StartSession(session_id.into())).await
    }

    pub async fn close_session(&self, session_id: impl Into<String>) -> Result<(), ServiceStopped> {
        self.send(Inbound::CloseSession(session_id.into())).await
    }

    pub async fn shutdown(&self) -> Result<(), ServiceStopped> {
        self.send(Inbound::Shutdown).await
    }
}

pub struct StreamService;

impl StreamService {
    /// Spawn the service on the current runtime. The task ends on
    /// [`Inbound::Shutdown`] or when every handle is dropped, and returns the
    /// reconciler with all pending deltas committed.
    pub fn spawn<R>(
        config: StreamConfig,
        factory: RuntimeFactory<R>,
    ) -> (StreamHandle, JoinHandle<Reconciler<R>>)
    where
        R: SessionRuntime + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let reconciler = Reconciler::new(config, factory);
        let task = tokio::spawn(run(reconciler, rx));
        (StreamHandle { tx }, task)
    }
}

#[instrument(skip_all)]
async fn run<R>(mut reconciler: Reconciler<R>, mut rx: mpsc::Receiver<Inbound>) -> Reconciler<R>
where
    R: SessionRuntime + Send + 'static,
{
    let period = Duration::from_millis(reconciler.config().frame_interval_ms.max(1));
    let mut frames = tokio::time::interval(period);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut refreshes: FuturesUnordered<BoxFuture<'static, RefreshOutcome>> =
        FuturesUnordered::new();
    info!(frame_ms = period.as_millis() as u64, "Stream service started");

    loop {
        tokio::select! {
            inbound = rx.recv() => match inbound {
                Some(Inbound::Shutdown) | None => break,
                Some(inbound) => dispatch(&mut reconciler, inbound),
            },
            _ = frames.tick(), if reconciler.has_scheduled_frames() => {
                reconciler.on_frame();
            }
            Some((session_id, outcome)) = refreshes.next(), if !refreshes.is_empty() => {
                reconciler.apply_refresh(&session_id, outcome);
            }
        }

        for refresh in reconciler.take_refreshes() {
            refreshes.push(async move { (refresh.session_id, refresh.future.await) }.boxed());
        }
    }

    reconciler.flush_all();
    if !refreshes.is_empty() {
        debug!(count = refreshes.len(), "Dropping in-flight state refreshes");
    }
    info!(sessions = reconciler.session_ids().len(), "Stream service stopped");
    reconciler
}

fn dispatch<R: SessionRuntime>(reconciler: &mut Reconciler<R>, inbound: Inbound) {
    match inbound {
        Inbound::Line(line) => ingest_line(reconciler, &line),
        Inbound::Envelope(envelope) => reconciler.handle_envelope(envelope),
        Inbound::StartSession(session_id) => {
            reconciler.open_session(&session_id);
        }
        Inbound::CloseSession(session_id) => {
            reconciler.close_session(&session_id);
        }
        Inbound::Shutdown => {}
    }
}

fn ingest_line<R: SessionRuntime>(reconciler: &mut Reconciler<R>, line: &str) {
    match parse_line(line, reconciler.config()) {
        Ok(Some(envelope)) => {
            if envelope.event.is_delta() {
                trace!(session_id = %envelope.session_id, "delta");
            } else {
                debug!(
                    session_id = %envelope.session_id,
                    event = envelope.event.kind(),
                    "Session event"
                );
            }
            reconciler.handle_envelope(envelope);
        }
        Ok(None) => {}
        Err(err) if err.is_transport() => {
            warn!(
                "Dropping invalid line: {} ({})",
                err,
                shorten_for_log(line, LOG_LINE_CHARS)
            );
        }
        Err(err) => debug!("Ignoring line: {}", err),
    }
}
