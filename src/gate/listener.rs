//! # Listener Crudo
//! src/gate/listener.rs
//!
//! Capacidades que el gate consume del socket que escucha: aceptar una
//! conexión, cerrar y reportar la dirección local.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};

/// Conexiones pendientes que acepta el kernel antes del `accept`
const LISTEN_BACKLOG: i32 = 1024;

/// Listener que el `ConnectionGate` envuelve
pub trait RawListener: Send + Sync {
    type Conn: Send;

    /// Bloquea hasta aceptar una conexión
    fn accept(&self) -> io::Result<Self::Conn>;

    /// Cierra el listener. Debe desbloquear un `accept` pendiente.
    fn close(&self) -> io::Result<()>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Listener TCP sobre un `socket2::Socket`
///
/// `close` hace `shutdown` del socket que escucha: en Linux eso saca al
/// socket del estado LISTEN, despierta al thread bloqueado en `accept` con
/// un error y el kernel rechaza las conexiones nuevas.
pub struct TcpGateListener {
    socket: Socket,
    local_addr: SocketAddr,
    closed: AtomicBool,
}

impl TcpGateListener {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let mut last_err = None;
        for addr in addr.to_socket_addrs()? {
            match Self::bind_addr(addr) {
                Ok(listener) => return Ok(listener),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "could not resolve to any address")
        }))
    }

    fn bind_addr(addr: SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;

        let local_addr = socket_addr(socket.local_addr()?)?;
        Ok(Self {
            socket,
            local_addr,
            closed: AtomicBool::new(false),
        })
    }

    fn closed_error() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionAborted, "listener closed")
    }
}

fn socket_addr(addr: SockAddr) -> io::Result<SocketAddr> {
    addr.as_socket()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "not an inet address"))
}

impl RawListener for TcpGateListener {
    type Conn = (TcpStream, SocketAddr);

    fn accept(&self) -> io::Result<Self::Conn> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Self::closed_error());
        }
        match self.socket.accept() {
            Ok((conn, peer)) => Ok((TcpStream::from(conn), socket_addr(peer)?)),
            Err(_) if self.closed.load(Ordering::Acquire) => Err(Self::closed_error()),
            Err(e) => Err(e),
        }
    }

    fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match self.socket.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Plataformas que no permiten shutdown sobre un socket en LISTEN
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_accept_real_connection() {
        let listener = TcpGateListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (_stream, peer) = listener.accept().unwrap();
        assert!(peer.ip().is_loopback());
        client.join().unwrap();
    }

    #[test]
    fn test_close_unblocks_pending_accept() {
        let listener = Arc::new(TcpGateListener::bind("127.0.0.1:0").unwrap());
        let acceptor = {
            let listener = Arc::clone(&listener);
            thread::spawn(move || listener.accept())
        };
        thread::sleep(Duration::from_millis(50));
        listener.close().unwrap();
        let result = acceptor.join().unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::ConnectionAborted);
    }

    #[test]
    fn test_accept_after_close_fails() {
        let listener = TcpGateListener::bind("127.0.0.1:0").unwrap();
        listener.close().unwrap();
        listener.close().unwrap();
        assert!(listener.accept().is_err());
    }

    #[test]
    fn test_bind_unspecified_reports_port() {
        let listener = TcpGateListener::bind("0.0.0.0:0").unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_unspecified());
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn test_connect_after_close_is_refused() {
        let listener = TcpGateListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        listener.close().unwrap();

        // El kernel rechaza o corta la conexión: nunca queda colgada
        if let Ok(mut client) = TcpStream::connect(addr) {
            client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
            let _ = client.write_all(b"GET / HTTP/1.0\r\n\r\n");
            let mut buf = [0u8; 16];
            match client.read(&mut buf) {
                Ok(n) => assert_eq!(n, 0),
                Err(e) => assert!(
                    !matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut),
                    "conexión colgada: {:?}",
                    e
                ),
            }
        }
    }
}
