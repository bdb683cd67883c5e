//! TCP socket adapter for embedded-tls
//!
//! `embedded-tls` reads and writes through the `embedded-io-async` traits;
//! this wraps `embassy_net::tcp::TcpSocket` and maps its errors onto
//! [`NetworkError`]. The socket itself lives in `session_buffers` behind a
//! `RefCell` so the session can ask whether bytes are queued while the TLS
//! stream owns the adapter.

use core::cell::RefCell;

use embassy_net::tcp::TcpSocket;
use embassy_net::IpEndpoint;
use embedded_io_async::{ErrorType, Read, Write};
use hal_abstractions::NetworkError;

/// The session's socket, shared between the TLS stream and readiness checks
pub type SharedSocket = &'static RefCell<TcpSocket<'static>>;

pub struct AsyncTcpSocket<'a> {
    socket: &'a RefCell<TcpSocket<'a>>,
}

// Only the device task touches the socket, and readiness checks use
// `try_borrow`, so a borrow held across an await never conflicts.
#[allow(clippy::await_holding_refcell_ref)]
impl<'a> AsyncTcpSocket<'a> {
    pub fn new(socket: &'a RefCell<TcpSocket<'a>>) -> Self {
        Self { socket }
    }

    /// Open the TCP connection
    ///
    /// # Errors
    ///
    /// `SocketError` if the connection is refused or the stack has no route.
    pub async fn connect(&mut self, endpoint: IpEndpoint) -> Result<(), NetworkError> {
        self.socket
            .borrow_mut()
            .connect(endpoint)
            .await
            .map_err(|_| NetworkError::SocketError)
    }
}

impl ErrorType for AsyncTcpSocket<'_> {
    type Error = NetworkError;
}

#[allow(clippy::await_holding_refcell_ref)]
impl Read for AsyncTcpSocket<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match self.socket.borrow_mut().read(buf).await {
            // EOF: the broker closed the connection
            Ok(0) if !buf.is_empty() => Err(NetworkError::TlsConnectionClosed),
            Ok(n) => Ok(n),
            Err(_) => Err(NetworkError::SocketError),
        }
    }
}

#[allow(clippy::await_holding_refcell_ref)]
impl Write for AsyncTcpSocket<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.socket
            .borrow_mut()
            .write(buf)
            .await
            .map_err(|_| NetworkError::SocketError)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.socket
            .borrow_mut()
            .flush()
            .await
            .map_err(|_| NetworkError::SocketError)
    }
}
