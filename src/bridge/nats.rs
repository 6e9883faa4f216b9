//! NATS transport for the capture host
//!
//! The finished recording travels as one base64 message, so it is bounded
//! by the server's `max_payload` (1 MB by default). That is roughly 23
//! seconds of 16kHz mono PCM, or a few minutes of Opus in WebM. A host
//! whose final message is rejected never answers, and the session ends
//! through the finish timeout with `remote-host-unavailable`. Raise
//! `max_payload` on the server for longer takes.

use anyhow::{Context, Result};
use async_nats::Client;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::{BridgeCommand, BridgeEvent};
use super::transport::MessageTransport;

/// Bridge transport over NATS
///
/// Commands go to `<prefix>.<host_id>.command`, the host publishes its
/// events on `<prefix>.<host_id>.event`.
pub struct NatsTransport {
    client: Client,
    command_subject: String,
    event_subject: String,
}

impl NatsTransport {
    /// Connect to NATS server
    pub async fn connect(url: &str, subject_prefix: &str, host_id: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            command_subject: format!("{}.{}.command", subject_prefix, host_id),
            event_subject: format!("{}.{}.event", subject_prefix, host_id),
        })
    }

    pub fn command_subject(&self) -> &str {
        &self.command_subject
    }

    pub fn event_subject(&self) -> &str {
        &self.event_subject
    }
}

#[async_trait]
impl MessageTransport for NatsTransport {
    async fn is_available(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    async fn send(&self, command: BridgeCommand) -> Result<()> {
        let payload = serde_json::to_vec(&command)?;

        self.client
            .publish(self.command_subject.clone(), payload.into())
            .await
            .context("Failed to publish capture command")?;
        self.client
            .flush()
            .await
            .context("Failed to flush capture command")?;

        info!(
            "Published capture command to {} (session={})",
            self.command_subject,
            command.session_id()
        );
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<BridgeEvent>> {
        info!("Subscribing to capture host events on {}", self.event_subject);

        let mut subscriber = self
            .client
            .subscribe(self.event_subject.clone())
            .await
            .context("Failed to subscribe to capture host events")?;

        let (tx, rx) = mpsc::channel(256);
        let subject = self.event_subject.clone();

        tokio::spawn(async move {
            relay((&mut subscriber).map(|message| message.payload), tx, &subject).await;

            if let Err(e) = subscriber.unsubscribe().await {
                debug!("Unsubscribe from {} failed: {}", subject, e);
            }
            debug!("Capture host event relay for {} ended", subject);
        });

        Ok(rx)
    }
}

/// Forward decoded events until the stream ends or the receiver goes away
///
/// A dropped receiver is noticed right away, not on the next message.
async fn relay<S, P>(mut payloads: S, tx: mpsc::Sender<BridgeEvent>, subject: &str)
where
    S: Stream<Item = P> + Unpin,
    P: AsRef<[u8]>,
{
    loop {
        let payload = tokio::select! {
            _ = tx.closed() => break,
            next = payloads.next() => match next {
                Some(payload) => payload,
                None => break,
            },
        };

        let event = match serde_json::from_slice::<BridgeEvent>(payload.as_ref()) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping malformed capture host event on {}: {}", subject, e);
                continue;
            }
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }
}
