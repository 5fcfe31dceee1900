//! Relay network layer handling UDP forwarding between peers

use crate::peer_manager::PeerManager;
use log::{debug, error, info, trace, warn};
use shared::{split_header, MAX_DATAGRAM, RELAY_HELLO};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Messages sent from network tasks to the main relay loop
#[derive(Debug)]
pub enum RelayMessage {
    DatagramReceived { data: Vec<u8>, addr: SocketAddr },
    PeerTimeout { peer_id: u32 },
    Shutdown,
}

/// Messages sent from the relay loop to the sender task
#[derive(Debug)]
pub enum ForwardMessage {
    Forward {
        data: Vec<u8>,
        targets: Vec<SocketAddr>,
    },
}

/// UDP relay forwarding every datagram to every other registered peer
pub struct Relay {
    socket: Arc<UdpSocket>,
    peers: Arc<RwLock<PeerManager>>,
    forwarded: u64,

    relay_tx: mpsc::UnboundedSender<RelayMessage>,
    relay_rx: mpsc::UnboundedReceiver<RelayMessage>,
    forward_tx: mpsc::UnboundedSender<ForwardMessage>,
    forward_rx: mpsc::UnboundedReceiver<ForwardMessage>,
}

impl Relay {
    pub async fn new(
        addr: &str,
        max_peers: usize,
        timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Relay listening on {}", socket.local_addr()?);

        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        let (forward_tx, forward_rx) = mpsc::unbounded_channel();

        Ok(Relay {
            socket,
            peers: Arc::new(RwLock::new(PeerManager::new(max_peers, timeout))),
            forwarded: 0,
            relay_tx,
            relay_rx,
            forward_tx,
            forward_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle for stopping the relay from outside
    pub fn sender(&self) -> mpsc::UnboundedSender<RelayMessage> {
        self.relay_tx.clone()
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let relay_tx = self.relay_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let data = buffer[..len].to_vec();
                        if let Err(e) = relay_tx.send(RelayMessage::DatagramReceived { data, addr })
                        {
                            error!("Failed to send datagram to main loop: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing forward queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut forward_rx = std::mem::replace(&mut self.forward_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = forward_rx.recv().await {
                match message {
                    ForwardMessage::Forward { data, targets } => {
                        for addr in targets {
                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to forward to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that drops silent peers
    fn spawn_timeout_checker(&self) {
        let peers = Arc::clone(&self.peers);
        let relay_tx = self.relay_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut peers_guard = peers.write().await;
                    peers_guard.check_timeouts()
                };

                for peer_id in timed_out {
                    if let Err(e) = relay_tx.send(RelayMessage::PeerTimeout { peer_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    /// Registers the sender and queues the datagram for everyone else
    async fn handle_datagram(&mut self, data: Vec<u8>, addr: SocketAddr) {
        let (sender, targets) = {
            let mut peers = self.peers.write().await;
            match peers.observe(addr) {
                Some(sender) => (sender, peers.forward_targets(sender)),
                None => {
                    warn!("Relay full, ignoring {}", addr);
                    return;
                }
            }
        };

        if data == RELAY_HELLO.as_bytes() {
            trace!("Keepalive from peer {}", sender);
            return;
        }
        if targets.is_empty() {
            return;
        }

        if log::log_enabled!(log::Level::Debug) {
            let tag = std::str::from_utf8(&data)
                .ok()
                .and_then(|text| split_header(text).ok())
                .map(|(tag, _)| tag)
                .unwrap_or_else(|| "<opaque>".to_string());
            debug!("Peer {} -> {} peers: {}", sender, targets.len(), tag);
        }

        self.forwarded += 1;
        if let Err(e) = self.forward_tx.send(ForwardMessage::Forward { data, targets }) {
            error!("Failed to queue forward: {}", e);
        }
    }

    /// Main relay loop
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Relay started");

        loop {
            tokio::select! {
                message = self.relay_rx.recv() => {
                    match message {
                        Some(RelayMessage::DatagramReceived { data, addr }) => {
                            self.handle_datagram(data, addr).await;
                        },
                        Some(RelayMessage::PeerTimeout { peer_id }) => {
                            info!("Peer {} timed out", peer_id);
                        },
                        Some(RelayMessage::Shutdown) | None => {
                            info!("Relay shutting down after {} forwards", self.forwarded);
                            break;
                        }
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                },
            }
        }

        Ok(())
    }
}
