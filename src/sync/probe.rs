use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

// Reachability check run before uploads in bandwidth-constrained modes:
// a bounded TCP connect against a well-known address.
pub fn is_reachable(addr: &str, timeout: Duration) -> bool {
    let Ok(addrs) = addr.to_socket_addrs() else {
        return false;
    };
    for addr in addrs {
        if TcpStream::connect_timeout(&addr, timeout).is_ok() {
            return true;
        }
    }
    false
}
