//! Client network layer: relay I/O and the session tick loop.
//!
//! Socket reads, socket writes, the relay keepalive and stdin each run in
//! their own task. All of them talk to the main loop through channels, so
//! the session itself is only ever touched from [`Peer::run`].

use crate::events::GameEvent;
use crate::input::{apply_action, ActionResult, InputManager};
use crate::session::Session;
use log::{debug, error, info, trace, warn};
use shared::{MAX_DATAGRAM, RELAY_HELLO};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

/// How often the relay is reminded that this peer exists.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Messages sent from the I/O tasks to the main loop
#[derive(Debug)]
pub enum PeerMessage {
    Datagram(Vec<u8>),
    Input(String),
    Shutdown,
}

pub struct Peer {
    socket: Arc<UdpSocket>,
    relay_addr: SocketAddr,
    session: Session,
    input: InputManager,
    tick_duration: Duration,
    read_stdin: bool,

    peer_tx: mpsc::UnboundedSender<PeerMessage>,
    peer_rx: mpsc::UnboundedReceiver<PeerMessage>,
    out_tx: mpsc::UnboundedSender<Vec<u8>>,
    out_rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Peer {
    pub async fn new(
        bind_addr: &str,
        relay_addr: &str,
        session: Session,
        tick_rate: u32,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let relay_addr = relay_addr.parse()?;
        info!("Bound {}, relaying through {}", socket.local_addr()?, relay_addr);

        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        Ok(Peer {
            socket,
            relay_addr,
            session,
            input: InputManager::new(),
            tick_duration: Duration::from_secs_f64(1.0 / tick_rate.max(1) as f64),
            read_stdin: false,
            peer_tx,
            peer_rx,
            out_tx,
            out_rx,
        })
    }

    /// Also read player commands from stdin while running.
    pub fn with_stdin(mut self) -> Self {
        self.read_stdin = true;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Handle for feeding the main loop from outside, e.g. to shut it down.
    pub fn sender(&self) -> mpsc::UnboundedSender<PeerMessage> {
        self.peer_tx.clone()
    }

    /// Spawns task that continuously listens for datagrams from the relay
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let relay_addr = self.relay_addr;
        let peer_tx = self.peer_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if addr != relay_addr {
                            debug!("Ignoring datagram from {}", addr);
                            continue;
                        }
                        let datagram = buffer[..len].to_vec();
                        if let Err(e) = peer_tx.send(PeerMessage::Datagram(datagram)) {
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

    /// Spawns task that drains the outgoing queue to the relay
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let relay_addr = self.relay_addr;
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(datagram) = out_rx.recv().await {
                if let Err(e) = socket.send_to(&datagram, relay_addr).await {
                    error!("Failed to send to relay {}: {}", relay_addr, e);
                }
            }
        });
    }

    /// Spawns task that registers with the relay and keeps the entry fresh
    fn spawn_keepalive(&self) {
        let out_tx = self.out_tx.clone();

        tokio::spawn(async move {
            let mut interval = interval(KEEPALIVE_INTERVAL);
            loop {
                interval.tick().await;
                if out_tx.send(RELAY_HELLO.as_bytes().to_vec()).is_err() {
                    break;
                }
            }
        });
    }

    fn spawn_stdin_reader(&self) {
        let peer_tx = self.peer_tx.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if peer_tx.send(PeerMessage::Input(line)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        });
    }

    /// Encodes and queues everything the session produced this tick.
    fn flush_outbox(&mut self) {
        for message in self.session.drain_outbox() {
            match message.encode_bytes() {
                Ok(datagram) => {
                    trace!("Sending {}", message.header().as_str());
                    if let Err(e) = self.out_tx.send(datagram) {
                        error!("Failed to queue datagram: {}", e);
                    }
                }
                Err(e) => error!("Failed to encode {}: {}", message.header().as_str(), e),
            }
        }
    }

    fn report_events(&mut self) {
        for event in self.session.drain_events() {
            match event {
                GameEvent::Notice(text) => info!("{}", text),
                GameEvent::LineDefeated { spawner_id } => {
                    warn!("Line {} was overrun", spawner_id)
                }
                GameEvent::WaveStarted {
                    spawner_id,
                    wave_index,
                } => info!("Line {} wave {}", spawner_id, wave_index + 1),
                GameEvent::MatchStarted { start_unix } => info!("Match started at {}", start_unix),
                quiet @ (GameEvent::FloatingText { .. } | GameEvent::Sound(_)) => {
                    trace!("{:?}", quiet)
                }
                other => debug!("{:?}", other),
            }
        }
    }

    /// Returns false when the player asked to quit.
    fn handle_line(&mut self, line: &str) -> bool {
        if line.trim().is_empty() {
            return true;
        }
        match self.input.parse_line(line) {
            Ok(action) => match apply_action(&mut self.session, action) {
                ActionResult::Done(false) => debug!("'{}' had no effect", line.trim()),
                ActionResult::Done(true) => {}
                ActionResult::Status(status) => info!("{}", status),
                ActionResult::Quit => return false,
            },
            Err(e) => warn!("{}", e),
        }
        true
    }

    /// Main loop: applies remote messages and input, ticks the session and
    /// ships its outbox until shut down.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_keepalive();
        if self.read_stdin {
            self.spawn_stdin_reader();
        }

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();
        let mut ticks: u64 = 0;
        let status_every = (10.0 / self.tick_duration.as_secs_f64()).max(1.0) as u64;

        info!("Peer started for player {}", self.session.local_player());

        loop {
            tokio::select! {
                message = self.peer_rx.recv() => {
                    match message {
                        Some(PeerMessage::Datagram(datagram)) => {
                            self.session.receive_datagram(&datagram);
                        }
                        Some(PeerMessage::Input(line)) => {
                            if !self.handle_line(&line) {
                                info!("Quitting");
                                break;
                            }
                        }
                        Some(PeerMessage::Shutdown) | None => {
                            info!("Peer shutting down");
                            break;
                        }
                    }
                    self.flush_outbox();
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.session.tick(dt);
                    self.flush_outbox();
                    self.report_events();

                    ticks += 1;
                    if ticks % status_every == 0 {
                        debug!("{}", self.session.status_line());
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                },
            }
        }

        self.session.shutdown();
        self.flush_outbox();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use tokio::time::{sleep, timeout};
    use tokio_test::assert_ok;

    async fn fake_relay() -> (UdpSocket, String) {
        let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = relay.local_addr().unwrap().to_string();
        (relay, addr)
    }

    async fn peer(relay_addr: &str) -> Peer {
        Peer::new("127.0.0.1:0", relay_addr, Session::new(SessionConfig::default()), 60)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_peer_registers_with_relay() {
        let (relay, relay_addr) = fake_relay().await;
        let mut peer = peer(&relay_addr).await;
        let peer_addr = peer.local_addr().unwrap();
        let tx = peer.sender();

        let driver = tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM];
            let received = timeout(Duration::from_secs(2), relay.recv_from(&mut buffer)).await;
            tx.send(PeerMessage::Shutdown).unwrap();
            let (len, from) = received.unwrap().unwrap();
            (buffer[..len].to_vec(), from)
        });

        assert_ok!(peer.run().await);
        let (datagram, from) = driver.await.unwrap();
        assert_eq!(datagram, RELAY_HELLO.as_bytes());
        assert_eq!(from.port(), peer_addr.port());
    }

    #[tokio::test]
    async fn test_start_command_is_broadcast() {
        let (relay, relay_addr) = fake_relay().await;
        let mut peer = peer(&relay_addr).await;
        let tx = peer.sender();

        let driver = tokio::spawn(async move {
            tx.send(PeerMessage::Input("start".to_string())).unwrap();
            let mut buffer = [0u8; MAX_DATAGRAM];
            let seen = timeout(Duration::from_secs(2), async {
                loop {
                    let (len, _) = relay.recv_from(&mut buffer).await.unwrap();
                    if buffer[..len].starts_with(b"GAME_START|") {
                        break;
                    }
                }
            })
            .await
            .is_ok();
            tx.send(PeerMessage::Shutdown).unwrap();
            seen
        });

        assert_ok!(peer.run().await);
        assert!(driver.await.unwrap());
        assert!(peer.session().is_started());
    }

    #[tokio::test]
    async fn test_relayed_messages_reach_session() {
        let (relay, relay_addr) = fake_relay().await;
        let mut peer = peer(&relay_addr).await;
        let peer_addr = peer.local_addr().unwrap();
        let tx = peer.sender();

        let driver = tokio::spawn(async move {
            relay
                .send_to(b"GAME_TIMESCALE|{\"scale\":2.0}", peer_addr)
                .await
                .unwrap();
            relay.send_to(b"not a message", peer_addr).await.unwrap();
            sleep(Duration::from_millis(200)).await;
            tx.send(PeerMessage::Shutdown).unwrap();
        });

        assert_ok!(peer.run().await);
        driver.await.unwrap();
        assert_eq!(peer.session().time_scale(), 2.0);
    }

    #[tokio::test]
    async fn test_quit_command_stops_loop() {
        let (_relay, relay_addr) = fake_relay().await;
        let mut peer = peer(&relay_addr).await;
        peer.sender()
            .send(PeerMessage::Input("quit".to_string()))
            .unwrap();
        timeout(Duration::from_secs(2), peer.run())
            .await
            .unwrap()
            .unwrap();
    }
}
