use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::events::{EventDispatcher, SlackEnvelope, SlackEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `Ok(None)` once the server closes the stream.
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

enum PumpError {
    /// Never connected; counts against the retry budget.
    Connect(TransportError),
    /// Dropped after a successful connect; the retry budget starts over.
    Session(TransportError),
}

/// Socket Mode event loop.
///
/// Every envelope is acknowledged before it is handled. Handling runs on its own
/// task so a long release does not block the stream; in-flight tasks are drained
/// before the transport disconnects or the runner returns.
pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: Arc<EventDispatcher>,
    reconnect_policy: ReconnectPolicy,
    drain_timeout: Duration,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: Arc<EventDispatcher>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy, drain_timeout: Duration::from_secs(15) }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub async fn start(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    pub async fn run_until<S>(&self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send,
    {
        let mut in_flight = JoinSet::new();
        let shutdown_requested = tokio::select! {
            () = self.reconnect_loop(&mut in_flight) => false,
            () = shutdown => true,
        };

        if shutdown_requested {
            info!(in_flight = in_flight.len(), "shutdown requested; draining in-flight events");
            self.drain(&mut in_flight).await;
            if let Err(error) = self.transport.disconnect().await {
                warn!(error = %error, "socket mode disconnect failed during shutdown");
            }
        } else {
            self.drain(&mut in_flight).await;
        }
        Ok(())
    }

    async fn reconnect_loop(&self, in_flight: &mut JoinSet<()>) {
        let mut attempt = 0;
        loop {
            let error = match self.connect_and_pump(attempt, in_flight).await {
                Ok(()) => return,
                Err(PumpError::Session(error)) => {
                    attempt = 0;
                    error
                }
                Err(PumpError::Connect(error)) => error,
            };

            warn!(
                attempt,
                max_retries = self.reconnect_policy.max_retries,
                error = %error,
                "socket mode transport failed"
            );

            if attempt >= self.reconnect_policy.max_retries {
                warn!(
                    max_retries = self.reconnect_policy.max_retries,
                    "socket mode retries exhausted; continuing process without crash"
                );
                return;
            }

            let delay = self.reconnect_policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    async fn connect_and_pump(
        &self,
        attempt: u32,
        in_flight: &mut JoinSet<()>,
    ) -> Result<(), PumpError> {
        info!(attempt, "opening socket mode transport connection");
        self.transport.connect().await.map_err(PumpError::Connect)?;
        info!(attempt, "socket mode transport connected");

        loop {
            while in_flight.try_join_next().is_some() {}

            let Some(envelope) =
                self.transport.next_envelope().await.map_err(PumpError::Session)?
            else {
                info!(attempt, in_flight = in_flight.len(), "socket mode transport stream closed");
                self.drain(in_flight).await;
                self.transport.disconnect().await.map_err(PumpError::Session)?;
                return Ok(());
            };
            let correlation_id = correlation_id(&envelope);

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = correlation_id.as_deref().unwrap_or("unknown"),
                "received slack envelope"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = correlation_id.as_deref().unwrap_or("unknown"),
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = correlation_id.as_deref().unwrap_or("unknown"),
                    "acknowledged slack envelope"
                );
            }

            let dispatcher = Arc::clone(&self.dispatcher);
            in_flight.spawn(async move {
                if let Err(error) = dispatcher.dispatch(&envelope).await {
                    warn!(
                        envelope_id = %envelope.envelope_id,
                        correlation_id = correlation_id.as_deref().unwrap_or("unknown"),
                        error = %error,
                        "event dispatch failed; continuing socket loop"
                    );
                }
            });
        }
    }

    async fn drain(&self, in_flight: &mut JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }

        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(joined) = in_flight.join_next().await {
                if let Err(error) = joined {
                    warn!(error = %error, "event handler task ended abnormally");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                abandoned = in_flight.len(),
                timeout_secs = self.drain_timeout.as_secs(),
                "in-flight events did not finish before the drain timeout"
            );
            in_flight.abort_all();
        }
    }
}

fn correlation_id(envelope: &SlackEnvelope) -> Option<String> {
    match &envelope.event {
        SlackEvent::Mention(event) => Some(event.message_ts.clone()),
        SlackEvent::BlockAction(event) => Some(event.message_ts.clone()),
        SlackEvent::Unsupported { .. } => None,
    }
}
