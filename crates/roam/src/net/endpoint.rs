use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use super::message::{Message, WireError};
use super::MAX_DATAGRAM_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("round trip timed out")]
    Timeout,
    #[error("receive interrupted by signal")]
    Interrupted,
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl NetError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, NetError::Timeout)
    }
}

/// Blocking UDP endpoint connected to a single remote peer.
///
/// The session loop is strictly sequential, so every receive is bounded by
/// the socket read timeout rather than polled non-blocking.
pub struct Endpoint {
    socket: UdpSocket,
    remote: SocketAddr,
    recv_buffer: [u8; MAX_DATAGRAM_SIZE],
}

impl Endpoint {
    pub fn connect<A: ToSocketAddrs>(remote: A, timeout: Duration) -> io::Result<Self> {
        let remote = remote
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no address resolved"))?;

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(remote)?;
        socket.set_read_timeout(Some(timeout))?;

        Ok(Self {
            socket,
            remote,
            recv_buffer: [0u8; MAX_DATAGRAM_SIZE],
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn set_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.socket.set_read_timeout(Some(timeout))
    }

    pub fn send(&self, message: &Message) -> Result<(), NetError> {
        self.socket.send(&message.encode())?;
        Ok(())
    }

    /// Blocking receive bounded by the socket read timeout.
    pub fn recv(&mut self) -> Result<Message, NetError> {
        let size = self.socket.recv(&mut self.recv_buffer).map_err(|e| {
            match e.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => NetError::Timeout,
                io::ErrorKind::Interrupted => NetError::Interrupted,
                _ => NetError::Io(e),
            }
        })?;
        Ok(Message::decode(&self.recv_buffer[..size])?)
    }

    /// One timed round trip: send, await the reply, measure the elapsed time.
    pub fn exchange(&mut self, message: &Message) -> Result<(Message, Duration), NetError> {
        self.send(message)?;
        let start = Instant::now();
        let reply = self.recv()?;
        Ok((reply, start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recv_times_out() {
        // Nothing listens on the remote; recv must surface a timeout.
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut endpoint =
            Endpoint::connect(silent.local_addr().unwrap(), Duration::from_millis(20)).unwrap();

        match endpoint.recv() {
            Err(NetError::Timeout) => {}
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_exchange_measures_round_trip() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; MAX_DATAGRAM_SIZE];
            let (_, from) = server.recv_from(&mut buf).unwrap();
            server
                .send_to(&Message::HandshakeAccept { id: 7 }.encode(), from)
                .unwrap();
        });

        let mut endpoint = Endpoint::connect(server_addr, Duration::from_secs(1)).unwrap();
        let (reply, elapsed) = endpoint
            .exchange(&Message::HandshakeRequest { id: 7 })
            .unwrap();

        assert_eq!(reply, Message::HandshakeAccept { id: 7 });
        assert!(elapsed < Duration::from_secs(1));
        handle.join().unwrap();
    }
}
