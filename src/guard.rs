//! Single-instance guard.
//!
//! Exclusivity is proven by holding a listening socket on a fixed loopback port.
//! The socket is never accepted on; it exists only so the OS refuses a second
//! bind while this process lives and releases it on any exit, including a crash.

use crate::constants::{LOCK_PORT, LOCK_PORT_ENV};
use crate::core::GuardError;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use tracing::debug;

/// Proof that this process is the only running instance.
///
/// Dropping the handle releases the lock.
#[derive(Debug)]
pub struct LockHandle {
    listener: TcpListener,
}

impl LockHandle {
    /// The bound lock address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// Acquire the lock on the default port, or on `LIFELINE_LOCK_PORT` when set.
pub fn acquire() -> Result<LockHandle, GuardError> {
    acquire_on(lock_port())
}

/// The configured lock port.
pub fn lock_port() -> u16 {
    std::env::var(LOCK_PORT_ENV)
        .ok()
        .and_then(|p| p.parse().ok())
        .filter(|&p| p != 0)
        .unwrap_or(LOCK_PORT)
}

/// Acquire the lock on `port` of the IPv4 loopback interface.
///
/// Port 0 asks the OS for a free port, which tests use to avoid collisions.
pub fn acquire_on(port: u16) -> Result<LockHandle, GuardError> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    match TcpListener::bind(addr) {
        Ok(listener) => {
            debug!(addr = %addr, "Acquired single-instance lock");
            Ok(LockHandle { listener })
        }
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => Err(GuardError::AlreadyRunning { port }),
        Err(source) => Err(GuardError::Bind { addr, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let first = acquire_on(0).unwrap();
        let port = first.local_addr().unwrap().port();

        for _ in 0..3 {
            match acquire_on(port) {
                Err(GuardError::AlreadyRunning { port: p }) => assert_eq!(p, port),
                other => panic!("expected AlreadyRunning, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_release_allows_reacquire() {
        let first = acquire_on(0).unwrap();
        let port = first.local_addr().unwrap().port();
        drop(first);

        let second = acquire_on(port).unwrap();
        assert_eq!(second.local_addr().unwrap().port(), port);
    }
}
