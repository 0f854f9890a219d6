//! Minimal external-collaborator shim: just enough of the DBS
//! (splitter-to-peer control channel) handshake for the join driver to
//! start from. Real DBS framing and chunk delivery are out of scope
//! (SPEC_FULL.md §1 Non-goals); this module only reads the monitor list
//! the real protocol sends ahead of the peer id and NTS peer list.

use nts_core::error::Result;
use nts_core::types::Endpoint;
use std::net::Ipv4Addr;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Reads `count: u16` followed by that many `ip(4) || port(2)` entries.
pub async fn receive_monitors(tcp: &mut TcpStream) -> Result<Vec<Endpoint>> {
    let count = tcp.read_u16().await?;
    let mut monitors = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let ip = Ipv4Addr::from(tcp.read_u32().await?);
        let port = tcp.read_u16().await?;
        monitors.push(Endpoint::new(ip, port));
    }
    Ok(monitors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn reads_monitor_list() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_u16(1).await.unwrap();
            sock.write_u32(u32::from(Ipv4Addr::new(10, 0, 0, 9))).await.unwrap();
            sock.write_u16(5000).await.unwrap();
            sock
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let monitors = receive_monitors(&mut client).await.unwrap();
        assert_eq!(monitors, vec![Endpoint::new(Ipv4Addr::new(10, 0, 0, 9), 5000)]);
        server.await.unwrap();
    }
}
