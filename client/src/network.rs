use crate::error::{ClientError, Result};
use log::{debug, info, warn};
use shared::{Endpoint, QueryReply, QueryRequest, MAX_DATAGRAM_SIZE, OP_REGISTER, OP_SHUTDOWN};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;

/// Talks to one master server over UDP
///
/// Registration is tied to the socket's source address, so a game server
/// should bind this client to the address it serves players on.
pub struct MasterClient {
    socket: UdpSocket,
    master_addr: SocketAddr,
    reply_timeout: Duration,
}

impl MasterClient {
    /// Binds an ephemeral local port and resolves `master` (`host:port`)
    pub async fn new(master: &str, reply_timeout: Duration) -> Result<Self> {
        Self::bind("0.0.0.0:0", master, reply_timeout).await
    }

    pub async fn bind(local: &str, master: &str, reply_timeout: Duration) -> Result<Self> {
        let master_addr = lookup_host(master)
            .await?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| ClientError::Unresolved(master.to_string()))?;

        let socket = UdpSocket::bind(local).await?;
        debug!(
            "Client bound to {} for master {}",
            socket.local_addr()?,
            master_addr
        );

        Ok(Self {
            socket,
            master_addr,
            reply_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn master_addr(&self) -> SocketAddr {
        self.master_addr
    }

    /// Announces this socket's address. The master never acknowledges it.
    pub async fn register(&self) -> Result<()> {
        self.socket.send_to(OP_REGISTER, self.master_addr).await?;
        info!("Registration sent to {}", self.master_addr);
        Ok(())
    }

    pub async fn deregister(&self) -> Result<()> {
        self.socket.send_to(OP_SHUTDOWN, self.master_addr).await?;
        info!("Deregistration sent to {}", self.master_addr);
        Ok(())
    }

    /// Sends one query and waits for the matching reply
    ///
    /// Datagrams from other addresses are skipped. A master that filters the
    /// query out by game id never answers, which surfaces as
    /// [`ClientError::Timeout`].
    pub async fn query_page(&self, request: &QueryRequest) -> Result<QueryReply> {
        self.socket
            .send_to(&request.encode(), self.master_addr)
            .await?;

        timeout(self.reply_timeout, self.receive_reply())
            .await
            .map_err(|_| ClientError::Timeout(self.reply_timeout))?
    }

    async fn receive_reply(&self) -> Result<QueryReply> {
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            let (len, addr) = self.socket.recv_from(&mut buffer).await?;
            if addr == self.master_addr {
                return Ok(QueryReply::decode(&buffer[..len])?);
            }
            warn!("Ignoring {} bytes from unexpected sender {}", len, addr);
        }
    }

    /// Walks every page starting from the request's cursor
    ///
    /// Stops at the terminator, at an empty page, or once `limit` servers
    /// have been collected.
    pub async fn query_all(
        &self,
        request: &QueryRequest,
        limit: Option<usize>,
    ) -> Result<Vec<Endpoint>> {
        let mut request = request.clone();
        let mut servers = Vec::new();

        loop {
            let reply = self.query_page(&request).await?;
            debug!(
                "Page after {} held {} servers",
                request.cursor,
                reply.servers.len()
            );

            let next_cursor = reply.last();
            servers.extend(reply.servers);

            if let Some(limit) = limit {
                if servers.len() >= limit {
                    servers.truncate(limit);
                    break;
                }
            }

            match next_cursor {
                Some(cursor) if !reply.complete => request.cursor = cursor.to_string(),
                _ => break,
            }
        }

        Ok(servers)
    }
}
