//! Server network layer: the UDP socket and the receive/dispatch/reply loop

use crate::config::ServerConfig;
use crate::engine::{DefaultHooks, IncomingRequest, ProtocolEngine, RequestHooks};
use crate::error::{MasterServerError, Result};
use log::{debug, error, info, warn};
use shared::{Endpoint, MAX_DATAGRAM_SIZE};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// How long a single receive waits before reporting that nothing arrived
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// UDP socket wrapper with the master server's bind options
///
/// Receives time out instead of blocking forever, so the caller's poll loop
/// keeps turning even when no traffic arrives.
#[derive(Debug)]
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    receive_timeout: Duration,
}

impl UdpTransport {
    pub fn new() -> Self {
        Self::with_receive_timeout(RECEIVE_TIMEOUT)
    }

    pub fn with_receive_timeout(receive_timeout: Duration) -> Self {
        Self {
            socket: None,
            receive_timeout,
        }
    }

    /// Creates the socket with `SO_REUSEADDR` and binds it
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`MasterServerError::AlreadyBound`] if this transport already owns a
    /// socket.
    pub fn bind(&mut self, address: Ipv4Addr, port: u16) -> Result<()> {
        if self.socket.is_some() {
            return Err(MasterServerError::AlreadyBound);
        }

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(MasterServerError::transport("failed to create socket"))?;
        socket
            .set_reuse_address(true)
            .map_err(MasterServerError::transport("failed to set SO_REUSEADDR"))?;
        socket
            .set_nonblocking(true)
            .map_err(MasterServerError::transport("failed to set non-blocking mode"))?;

        let addr = SocketAddr::V4(SocketAddrV4::new(address, port));
        socket
            .bind(&addr.into())
            .map_err(MasterServerError::transport("failed to bind socket"))?;

        let socket = UdpSocket::from_std(socket.into())
            .map_err(MasterServerError::transport("failed to register socket"))?;

        match socket.local_addr() {
            Ok(local) => info!("Master server listening on {}", local),
            Err(_) => info!("Master server listening on {}", addr),
        }

        self.socket = Some(socket);
        Ok(())
    }

    /// Waits for one datagram of at most `max_len` bytes
    ///
    /// `Ok(None)` means nothing usable arrived: the timeout elapsed, the
    /// datagram was empty, or it came from a non-IPv4 sender.
    pub async fn receive(&self, max_len: usize) -> Result<Option<IncomingRequest>> {
        let socket = self.socket.as_ref().ok_or(MasterServerError::NotBound)?;
        let mut buffer = vec![0u8; max_len];

        let (len, addr) = match timeout(self.receive_timeout, socket.recv_from(&mut buffer)).await
        {
            Err(_) => return Ok(None),
            Ok(Err(e)) => {
                warn!("Error receiving datagram: {}", e);
                return Ok(None);
            }
            Ok(Ok(received)) => received,
        };

        if len == 0 {
            return Ok(None);
        }

        let Some(sender) = Endpoint::from_socket_addr(addr) else {
            debug!("Ignoring datagram from non-IPv4 sender {}", addr);
            return Ok(None);
        };

        buffer.truncate(len);
        Ok(Some(IncomingRequest::new(sender, buffer)))
    }

    pub async fn send_to(&self, destination: Endpoint, payload: &[u8]) -> Result<()> {
        let socket = self.socket.as_ref().ok_or(MasterServerError::NotBound)?;
        socket
            .send_to(payload, destination.socket_addr())
            .await
            .map_err(MasterServerError::transport("failed to send datagram"))?;
        Ok(())
    }

    /// Drops the socket. Safe to call when not bound.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            info!("Master server socket closed");
        }
    }

    pub fn is_bound(&self) -> bool {
        self.socket.is_some()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        let socket = self.socket.as_ref().ok_or(MasterServerError::NotBound)?;
        socket
            .local_addr()
            .map_err(MasterServerError::transport("failed to read local address"))
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Master server: one transport feeding one protocol engine
///
/// Datagrams are handled strictly one at a time, reply included, so the
/// registry never sees concurrent mutation.
pub struct MasterServer<H: RequestHooks = DefaultHooks> {
    transport: UdpTransport,
    engine: ProtocolEngine<H>,
    read_size: usize,
}

impl MasterServer<DefaultHooks> {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_parts(ProtocolEngine::new(config), UdpTransport::new())
    }
}

impl<H: RequestHooks> MasterServer<H> {
    pub fn with_parts(engine: ProtocolEngine<H>, transport: UdpTransport) -> Self {
        Self {
            transport,
            engine,
            read_size: MAX_DATAGRAM_SIZE,
        }
    }

    /// Largest datagram read from the socket; longer ones are truncated
    pub fn with_read_size(mut self, read_size: usize) -> Self {
        self.read_size = read_size;
        self
    }

    pub fn create(&mut self, address: Ipv4Addr, port: u16) -> Result<()> {
        self.transport.bind(address, port)
    }

    pub fn close(&mut self) {
        self.transport.close();
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn engine(&self) -> &ProtocolEngine<H> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ProtocolEngine<H> {
        &mut self.engine
    }

    /// Receives and handles at most one datagram
    ///
    /// Returns `Ok(false)` when the receive timed out. A reply that fails to
    /// send is logged and dropped.
    pub async fn listen(&mut self) -> Result<bool> {
        let Some(request) = self.transport.receive(self.read_size).await? else {
            return Ok(false);
        };

        if let Some(reply) = self.engine.handle(&request) {
            if let Err(e) = self
                .transport
                .send_to(reply.destination, &reply.payload)
                .await
            {
                error!("Failed to send reply to {}: {}", reply.destination, e);
            }
        }

        Ok(true)
    }

    /// Polls forever. Only returns if the transport is not bound.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "Master server started ({} servers preloaded)",
            self.engine.registry().len()
        );

        loop {
            self.listen().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{QueryReply, QueryRequest};
    use tokio_test::assert_ok;

    fn short_timeout_server(config: ServerConfig) -> MasterServer {
        let transport = UdpTransport::with_receive_timeout(Duration::from_millis(50));
        let mut server = MasterServer::with_parts(ProtocolEngine::new(config), transport);
        server.create(Ipv4Addr::LOCALHOST, 0).unwrap();
        server
    }

    async fn peer() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    #[tokio::test]
    async fn test_bind_twice_fails() {
        let mut transport = UdpTransport::new();
        transport.bind(Ipv4Addr::LOCALHOST, 0).unwrap();
        assert!(transport.is_bound());

        assert!(matches!(
            transport.bind(Ipv4Addr::LOCALHOST, 0),
            Err(MasterServerError::AlreadyBound)
        ));
    }

    #[tokio::test]
    async fn test_close_allows_rebind() {
        let mut transport = UdpTransport::new();
        transport.bind(Ipv4Addr::LOCALHOST, 0).unwrap();
        transport.close();
        assert!(!transport.is_bound());
        transport.close();

        assert_ok!(transport.bind(Ipv4Addr::LOCALHOST, 0));
    }

    #[tokio::test]
    async fn test_unbound_transport() {
        let transport = UdpTransport::new();
        assert!(matches!(
            transport.receive(MAX_DATAGRAM_SIZE).await,
            Err(MasterServerError::NotBound)
        ));
        assert!(matches!(
            transport.send_to(Endpoint::UNSPECIFIED, b"x").await,
            Err(MasterServerError::NotBound)
        ));
        assert!(transport.local_addr().is_err());
    }

    #[tokio::test]
    async fn test_receive_times_out() {
        let mut server = short_timeout_server(ServerConfig::default());
        assert!(!server.listen().await.unwrap());
    }

    #[tokio::test]
    async fn test_receive_reports_sender() {
        let mut transport = UdpTransport::with_receive_timeout(Duration::from_secs(2));
        transport.bind(Ipv4Addr::LOCALHOST, 0).unwrap();
        let addr = transport.local_addr().unwrap();

        let client = peer().await;
        client.send_to(b"hello", addr).await.unwrap();

        let request = assert_ok!(transport.receive(MAX_DATAGRAM_SIZE).await).unwrap();
        assert_eq!(request.payload, b"hello");
        assert_eq!(
            request.sender.socket_addr(),
            client.local_addr().unwrap()
        );
    }

    #[tokio::test]
    async fn test_empty_datagram_is_no_data() {
        let mut transport = UdpTransport::with_receive_timeout(Duration::from_secs(2));
        transport.bind(Ipv4Addr::LOCALHOST, 0).unwrap();
        let addr = transport.local_addr().unwrap();

        peer().await.send_to(&[], addr).await.unwrap();
        assert!(transport.receive(MAX_DATAGRAM_SIZE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listen_registers_and_answers() {
        let mut server = short_timeout_server(ServerConfig::default());
        let addr = server.local_addr().unwrap();

        let game_server = peer().await;
        game_server.send_to(&[0x71], addr).await.unwrap();
        assert!(server.listen().await.unwrap());
        assert_eq!(server.engine().registry().len(), 1);

        let player = peer().await;
        let query = QueryRequest::new(Endpoint::UNSPECIFIED, 0).encode();
        player.send_to(&query, addr).await.unwrap();
        assert!(server.listen().await.unwrap());

        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let (len, _) = timeout(Duration::from_secs(2), player.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let reply = QueryReply::decode(&buf[..len]).unwrap();

        assert!(reply.complete);
        assert_eq!(
            reply.servers.iter().map(Endpoint::socket_addr).collect::<Vec<_>>(),
            vec![game_server.local_addr().unwrap()]
        );
    }
}
