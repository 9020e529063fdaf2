//! UDP listener for RTP/RTCP ingestion
//!
//! One listener owns one socket in one role. A dedicated reader task pulls
//! datagrams, resolves their source against the client table and feeds the
//! RTP or RTCP pipeline; a thread-safe writer sends outgoing packets with a
//! per-send deadline. Closing the listener stops the reader and waits for
//! it to finish.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::buffer::BufferPool;
use crate::error::Error;
use crate::packet::rtcp::RtcpPacket;
use crate::packet::RtpPacket;
use crate::server::ServerSession;
use crate::Result;

use super::clients::{ClientEntry, ClientTable, PeerAddr};
use super::{ListenerBinding, ListenerRole, UdpListenerConfig};

/// UDP listener for one transport role
pub struct UdpListener {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    role: ListenerRole,
    write_timeout: Duration,
    clients: Arc<ClientTable>,
    terminate_tx: watch::Sender<bool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl UdpListener {
    /// Bind a socket per the configuration and start the reader task
    pub async fn bind(config: UdpListenerConfig) -> Result<Self> {
        let socket = match &config.binding {
            ListenerBinding::Unicast(addr) => {
                bind_socket(*addr, config.read_buffer_size)?
            }
            ListenerBinding::Multicast { group, port } => bind_multicast(
                *group,
                *port,
                config.multicast_ttl,
                config.read_buffer_size,
            )?,
        };

        let socket = Arc::new(
            UdpSocket::from_std(socket.into())
                .map_err(|e| Error::Transport(format!("Failed to register socket: {}", e)))?,
        );
        let local_addr = socket
            .local_addr()
            .map_err(|e| Error::Transport(format!("Failed to get local address: {}", e)))?;

        info!("{:?} UDP listener bound to {}", config.role, local_addr);

        let clients = Arc::new(ClientTable::new());
        let (terminate_tx, terminate_rx) = watch::channel(false);

        let reader = tokio::spawn(run_reader(
            socket.clone(),
            clients.clone(),
            config.role,
            config.max_packet_size,
            terminate_rx,
        ));

        Ok(Self {
            socket,
            local_addr,
            role: config.role,
            write_timeout: config.write_timeout,
            clients,
            terminate_tx,
            reader: Mutex::new(Some(reader)),
        })
    }

    /// Bind the RTP/RTCP listener pair serving one multicast stream
    ///
    /// `config` supplies everything but role and binding (TTL, buffer
    /// sizes, timeouts). If the RTCP listener fails to bind, the RTP
    /// listener is closed before the error is returned.
    pub async fn bind_multicast_pair(
        group: Ipv4Addr,
        rtp_port: u16,
        rtcp_port: u16,
        config: &UdpListenerConfig,
    ) -> Result<(UdpListener, UdpListener)> {
        let rtp = UdpListener::bind(UdpListenerConfig {
            role: ListenerRole::Rtp,
            binding: ListenerBinding::Multicast { group, port: rtp_port },
            ..config.clone()
        })
        .await?;

        let rtcp = match UdpListener::bind(UdpListenerConfig {
            role: ListenerRole::Rtcp,
            binding: ListenerBinding::Multicast { group, port: rtcp_port },
            ..config.clone()
        })
        .await
        {
            Ok(rtcp) => rtcp,
            Err(e) => {
                rtp.close().await;
                return Err(e);
            }
        };

        Ok((rtp, rtcp))
    }

    /// The address the socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The listener's transport role
    pub fn role(&self) -> ListenerRole {
        self.role
    }

    /// Register a peer address for a session track
    pub fn add_client(
        &self,
        ip: IpAddr,
        port: u16,
        session: Arc<ServerSession>,
        track_id: usize,
        is_publishing: bool,
    ) {
        self.clients.add_client(ip, port, session, track_id, is_publishing);
    }

    /// Drop every registration belonging to a session
    pub fn remove_session(&self, session: &Arc<ServerSession>) {
        self.clients.remove_session(session);
    }

    /// Send one datagram with the configured write deadline
    ///
    /// Callable concurrently; the OS serialises socket-level writes.
    pub async fn write(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        match tokio::time::timeout(self.write_timeout, self.socket.send_to(data, addr)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(Error::Transport(format!("Failed to send packet: {}", e))),
            Err(_) => Err(Error::WriteTimeout),
        }
    }

    /// Stop the reader task and wait for it to exit
    pub async fn close(&self) {
        let _ = self.terminate_tx.send(true);
        let reader = self.reader.lock().unwrap().take();
        if let Some(reader) = reader {
            let _ = reader.await;
        }
        debug!("{:?} UDP listener on {} closed", self.role, self.local_addr);
    }
}

/// Create, configure and bind the underlying socket
fn bind_socket(addr: SocketAddr, read_buffer_size: usize) -> Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| Error::Transport(format!("Failed to create socket: {}", e)))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| Error::Transport(format!("Failed to set SO_REUSEADDR: {}", e)))?;

    if read_buffer_size > 0 {
        socket
            .set_recv_buffer_size(read_buffer_size)
            .map_err(|e| Error::Transport(format!("Failed to set SO_RCVBUF: {}", e)))?;
    }

    socket
        .set_nonblocking(true)
        .map_err(|e| Error::Transport(format!("Failed to set nonblocking: {}", e)))?;

    socket
        .bind(&addr.into())
        .map_err(|e| Error::Transport(format!("Failed to bind {}: {}", addr, e)))?;

    Ok(socket)
}

/// Bind the wildcard address and join the group on every interface
fn bind_multicast(
    group: Ipv4Addr,
    port: u16,
    ttl: u32,
    read_buffer_size: usize,
) -> Result<Socket> {
    if !group.is_multicast() {
        return Err(Error::InvalidParameter(format!(
            "{} is not a multicast address",
            group
        )));
    }

    let socket = bind_socket(
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
        read_buffer_size,
    )?;

    socket
        .set_multicast_ttl_v4(ttl)
        .map_err(|e| Error::Transport(format!("Failed to set multicast TTL: {}", e)))?;

    let interfaces = if_addrs::get_if_addrs()
        .map_err(|e| Error::Transport(format!("Failed to enumerate interfaces: {}", e)))?;

    for interface in interfaces {
        if let IpAddr::V4(local) = interface.ip() {
            // Some platforms expose interfaces that advertise multicast but
            // reject the join; those failures must not fail the listener.
            if let Err(e) = socket.join_multicast_v4(&group, &local) {
                debug!("multicast join on {} failed: {}", local, e);
            }
        }
    }

    Ok(socket)
}

/// The per-listener reader loop
async fn run_reader(
    socket: Arc<UdpSocket>,
    clients: Arc<ClientTable>,
    role: ListenerRole,
    max_packet_size: usize,
    mut terminate_rx: watch::Receiver<bool>,
) {
    // One extra byte so a datagram that fills the buffer completely is
    // detectable as oversized rather than silently truncated.
    let pool = BufferPool::new(max_packet_size + 1, 1);

    loop {
        let mut buf = pool.get();

        let received = tokio::select! {
            _ = terminate_rx.changed() => break,
            received = socket.recv_from(&mut buf) => received,
        };

        let (n, source) = match received {
            Ok(received) => received,
            Err(e) => {
                debug!("UDP listener read failed, shutting down: {}", e);
                break;
            }
        };

        if let Some(entry) = clients.lookup(&PeerAddr::from(source)) {
            match role {
                ListenerRole::Rtp => process_rtp(&entry, &buf[..n], max_packet_size),
                ListenerRole::Rtcp => process_rtcp(&entry, &buf[..n], max_packet_size),
            }
        }

        pool.put(buf);
    }
}

/// Handle one RTP datagram for a registered client
fn process_rtp(entry: &ClientEntry, payload: &[u8], max_packet_size: usize) {
    let session = &entry.session;
    let handler = session.handler().clone();

    if payload.len() == max_packet_size + 1 {
        handler.on_decode_error(session, &Error::OversizedPacket);
        return;
    }

    let pkt = match RtpPacket::parse(payload) {
        Ok(pkt) => pkt,
        Err(e) => {
            handler.on_decode_error(session, &e);
            return;
        }
    };

    let now = Instant::now();
    session.stamp_packet_time();

    let track = match session.track(entry.track_id) {
        Some(track) => track,
        None => {
            warn!("client registered for unknown track {}", entry.track_id);
            return;
        }
    };

    let (packets, missing) = track.reorder(pkt);
    if missing > 0 {
        // deliverable packets are still processed below
        handler.on_decode_error(session, &Error::PacketsLost(missing));
    }

    for pkt in packets {
        let pts_equals_dts = track.pts_equals_dts(&pkt);
        track.rtcp_receiver().process_rtp(now, &pkt, pts_equals_dts);
        handler.on_packet_rtp(session, track.id(), &pkt, pts_equals_dts);
    }
}

/// Handle one RTCP datagram for a registered client
fn process_rtcp(entry: &ClientEntry, payload: &[u8], max_packet_size: usize) {
    let session = &entry.session;
    let handler = session.handler().clone();

    if payload.len() == max_packet_size + 1 {
        handler.on_decode_error(session, &Error::OversizedPacket);
        return;
    }

    let packets = match RtcpPacket::parse_compound(payload) {
        Ok(packets) => packets,
        Err(e) => {
            handler.on_decode_error(session, &e);
            return;
        }
    };

    let track = match session.track(entry.track_id) {
        Some(track) => track,
        None => {
            warn!("client registered for unknown track {}", entry.track_id);
            return;
        }
    };

    if entry.is_publishing {
        let now = Instant::now();
        session.stamp_packet_time();

        for pkt in &packets {
            track.rtcp_receiver().process_rtcp(now, pkt);
        }
    }

    for pkt in &packets {
        handler.on_packet_rtcp(session, track.id(), pkt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_unicast_ephemeral() {
        let listener = UdpListener::bind(UdpListenerConfig {
            binding: ListenerBinding::Unicast("127.0.0.1:0".parse().unwrap()),
            ..Default::default()
        })
        .await
        .unwrap();

        assert_ne!(listener.local_addr().port(), 0);
        assert_eq!(listener.role(), ListenerRole::Rtp);

        listener.close().await;
    }

    #[tokio::test]
    async fn test_bind_multicast_joins_are_best_effort() {
        let listener = UdpListener::bind(UdpListenerConfig {
            role: ListenerRole::Rtcp,
            binding: ListenerBinding::Multicast {
                group: "239.255.42.42".parse().unwrap(),
                port: 0,
            },
            ..Default::default()
        })
        .await
        .unwrap();

        listener.close().await;
    }

    #[tokio::test]
    async fn test_bind_multicast_pair() {
        let (rtp, rtcp) = UdpListener::bind_multicast_pair(
            "239.255.42.43".parse().unwrap(),
            0,
            0,
            &UdpListenerConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(rtp.role(), ListenerRole::Rtp);
        assert_eq!(rtcp.role(), ListenerRole::Rtcp);

        rtp.close().await;
        rtcp.close().await;
    }

    #[tokio::test]
    async fn test_multicast_rejects_unicast_group() {
        let result = UdpListener::bind(UdpListenerConfig {
            binding: ListenerBinding::Multicast {
                group: "10.0.0.1".parse().unwrap(),
                port: 0,
            },
            ..Default::default()
        })
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_write_sends_datagram() {
        let listener = UdpListener::bind(UdpListenerConfig {
            binding: ListenerBinding::Unicast("127.0.0.1:0".parse().unwrap()),
            ..Default::default()
        })
        .await
        .unwrap();

        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest = receiver.local_addr().unwrap();

        listener.write(b"hello", dest).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, _) = tokio::time::timeout(Duration::from_secs(1), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"hello");

        listener.close().await;
    }
}
