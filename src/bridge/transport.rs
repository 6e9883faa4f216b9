use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

use super::messages::{BridgeCommand, BridgeEvent};

const CHANNEL_CAPACITY: usize = 256;

/// Message link to the process hosting browser-embedded capture
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Whether a capture host is currently reachable
    async fn is_available(&self) -> bool;

    async fn send(&self, command: BridgeCommand) -> Result<()>;

    /// New receiver for every event the host emits from now on
    async fn subscribe(&self) -> Result<mpsc::Receiver<BridgeEvent>>;
}

/// Transport used when no capture host is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

#[async_trait]
impl MessageTransport for NullTransport {
    async fn is_available(&self) -> bool {
        false
    }

    async fn send(&self, _command: BridgeCommand) -> Result<()> {
        bail!("No capture host configured")
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<BridgeEvent>> {
        bail!("No capture host configured")
    }
}

type Subscribers = Arc<Mutex<Vec<mpsc::Sender<BridgeEvent>>>>;

/// In-process transport: the orchestrator holds this half, an embedding
/// host (or a test) drives the [`HostEndpoint`] half
#[derive(Clone)]
pub struct ChannelTransport {
    commands: mpsc::Sender<BridgeCommand>,
    subscribers: Subscribers,
    connected: Arc<AtomicBool>,
}

impl ChannelTransport {
    pub fn pair() -> (ChannelTransport, HostEndpoint) {
        let (commands_tx, commands_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let transport = ChannelTransport {
            commands: commands_tx,
            subscribers: subscribers.clone(),
            connected: connected.clone(),
        };
        let endpoint = HostEndpoint {
            commands: commands_rx,
            emitter: EventEmitter {
                subscribers,
                connected,
            },
        };
        (transport, endpoint)
    }
}

#[async_trait]
impl MessageTransport for ChannelTransport {
    async fn is_available(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.commands.is_closed()
    }

    async fn send(&self, command: BridgeCommand) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            bail!("Capture host is disconnected");
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("Capture host went away"))
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<BridgeEvent>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        Ok(rx)
    }
}

/// Capture-host side of a [`ChannelTransport`]
pub struct HostEndpoint {
    commands: mpsc::Receiver<BridgeCommand>,
    emitter: EventEmitter,
}

impl HostEndpoint {
    pub async fn recv_command(&mut self) -> Option<BridgeCommand> {
        self.commands.recv().await
    }

    pub async fn emit(&self, event: BridgeEvent) -> usize {
        self.emitter.emit(event).await
    }

    pub fn emitter(&self) -> EventEmitter {
        self.emitter.clone()
    }

    /// Simulate the host window going away (or coming back)
    pub fn set_connected(&self, connected: bool) {
        self.emitter.connected.store(connected, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct EventEmitter {
    subscribers: Subscribers,
    connected: Arc<AtomicBool>,
}

impl EventEmitter {
    /// Deliver to every live subscriber, returning how many received it
    pub async fn emit(&self, event: BridgeEvent) -> usize {
        let targets: Vec<mpsc::Sender<BridgeEvent>> = {
            let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
            subscribers.retain(|tx| !tx.is_closed());
            subscribers.clone()
        };

        let mut delivered = 0;
        for tx in targets {
            if tx.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        debug!("Capture host event delivered to {} listener(s)", delivered);
        delivered
    }
}
