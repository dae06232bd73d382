use std::io;
use std::io::Read;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

/// The network side of a single probe attempt.
#[async_trait]
pub trait ProbeSocket: Send + Sync {
    async fn send_to(&self, buf: &[u8], socket_addr: SocketAddr) -> io::Result<usize>;
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn set_ttl(&self, ttl: u32) -> io::Result<()>;
}

/// Opens the sockets a probe attempt needs. Every call returns a fresh socket,
/// closed when dropped, so no receive state leaks from one probe to the next.
pub trait SocketFactory: Send + Sync {
    fn icmp_socket(&self) -> io::Result<Box<dyn ProbeSocket>>;
    fn udp_socket(&self) -> io::Result<Box<dyn ProbeSocket>>;
}

pub struct RawSocketFactory;

impl SocketFactory for RawSocketFactory {
    /// Requires `CAP_NET_RAW` (or root); fails with "permission denied" otherwise.
    fn icmp_socket(&self) -> io::Result<Box<dyn ProbeSocket>> {
        let socket = AsyncSocket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
        Ok(Box::new(socket))
    }

    fn udp_socket(&self) -> io::Result<Box<dyn ProbeSocket>> {
        let socket = AsyncSocket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        Ok(Box::new(socket))
    }
}

/// A non-blocking `socket2` socket driven by the tokio reactor.
pub struct AsyncSocket {
    socket: AsyncFd<SocketWrapper>,
}

impl AsyncSocket {
    pub fn new(domain: Domain, ty: Type, protocol: Option<Protocol>) -> io::Result<Self> {
        let socket = SocketWrapper::new(domain, ty, protocol)?;
        Ok(Self {
            socket: AsyncFd::new(socket)?,
        })
    }
}

#[async_trait]
impl ProbeSocket for AsyncSocket {
    async fn send_to(&self, buf: &[u8], socket_addr: SocketAddr) -> io::Result<usize> {
        self.socket
            .async_io(Interest::WRITABLE, |socket| socket.send_to(buf, socket_addr))
            .await
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket
            .async_io(Interest::READABLE, |socket| socket.recv(buf))
            .await
    }

    fn set_ttl(&self, ttl: u32) -> io::Result<()> {
        self.socket.get_ref().set_ttl(ttl)
    }
}

struct SocketWrapper {
    socket: Socket,
}

impl SocketWrapper {
    fn new(domain: Domain, ty: Type, protocol: Option<Protocol>) -> io::Result<Self> {
        let socket = Socket::new(domain, ty, protocol)?;

        socket.set_nonblocking(true)?;

        Ok(Self { socket })
    }

    fn send_to(&self, buf: &[u8], socket_addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, &socket_addr.into())
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.socket).read(buf)
    }

    fn set_ttl(&self, ttl: u32) -> io::Result<()> {
        self.socket.set_ttl(ttl)
    }
}

impl AsRawFd for SocketWrapper {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}
