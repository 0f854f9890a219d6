//! C3 — Retransmit Ticker.
//!
//! Background task started once the player is alive: snapshot the pending
//! table, send every candidate-port burst, sweep timed-out entries, then
//! wait (bounded by `T_hello_period`, or woken early by `enqueue_message`)
//! before looping. See SPEC_FULL.md §4.3/§5.

use arc_swap::ArcSwap;
use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::pending_table::PendingHelloTable;

/// `player_alive` from spec.md §5: owned by the peer instance, flipped by
/// the (external) player thread. Wrapping the flag and its wake handle
/// together means "flip to dead" and "wake the ticker so it notices
/// promptly" can't be forgotten independently.
#[derive(Clone)]
pub struct PlayerAlive {
    flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl PlayerAlive {
    pub fn new(wake: Arc<Notify>) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            wake,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn set_alive(&self, alive: bool) {
        self.flag.store(alive, Ordering::Release);
        self.wake.notify_one();
    }
}

pub struct RetransmitTicker {
    table: PendingHelloTable,
    socket: Arc<ArcSwap<UdpSocket>>,
    player_alive: PlayerAlive,
    t_max_arriving: Duration,
    t_hello_period: Duration,
    t_intra_burst: Duration,
}

impl RetransmitTicker {
    pub fn new(
        table: PendingHelloTable,
        socket: Arc<ArcSwap<UdpSocket>>,
        player_alive: PlayerAlive,
        t_max_arriving: Duration,
        t_hello_period: Duration,
        t_intra_burst: Duration,
    ) -> Self {
        Self {
            table,
            socket,
            player_alive,
            t_max_arriving,
            t_hello_period,
            t_intra_burst,
        }
    }

    /// Runs until `player_alive` goes false. Intended to be spawned as its
    /// own task (`tokio::spawn(ticker.run())`).
    pub async fn run(self) {
        let wake = self.table.wake_handle();
        while self.player_alive.is_alive() {
            let socket = self.socket.load_full();
            let snapshot = self.table.snapshot().await;
            for (key, entry) in &snapshot {
                if entry.is_expired(self.t_max_arriving) {
                    continue;
                }
                for &port in &entry.candidate_ports {
                    let dest = SocketAddrV4::new(*key.destination.ip(), port);
                    if let Err(e) = socket.send_to(&key.payload, dest).await {
                        warn!(%dest, error = %e, "retransmit send failed, entry stays pending");
                    } else {
                        trace!(%dest, len = key.payload.len(), "sent burst datagram");
                    }
                    tokio::time::sleep(self.t_intra_burst).await;
                }
            }
            let expired = self.table.sweep_expired(self.t_max_arriving).await;
            if !expired.is_empty() {
                debug!(count = expired.len(), "evicted timed-out pending hellos");
            }

            tokio::select! {
                _ = wake.notified() => {}
                _ = tokio::time::sleep(self.t_hello_period) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Endpoint;
    use std::net::Ipv4Addr;

    async fn bind_loopback() -> Arc<ArcSwap<UdpSocket>> {
        Arc::new(ArcSwap::from_pointee(
            UdpSocket::bind("127.0.0.1:0").await.unwrap(),
        ))
    }

    /// S1: the first burst reaches both the monitor and the splitter with
    /// the local peer id as payload.
    #[tokio::test]
    async fn scenario_s1_first_burst_reaches_targets() {
        let table = PendingHelloTable::new();
        let monitor = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let splitter = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let monitor_addr = monitor.local_addr().unwrap();
        let splitter_addr = splitter.local_addr().unwrap();

        let peer_id = b"A".repeat(40);
        let monitor_ep = Endpoint::new(Ipv4Addr::new(127, 0, 0, 1), monitor_addr.port());
        let splitter_ep = Endpoint::new(Ipv4Addr::new(127, 0, 0, 1), splitter_addr.port());
        table.enqueue_hello(peer_id.clone(), monitor_ep, []).await;
        table.enqueue_hello(peer_id.clone(), splitter_ep, []).await;

        let socket = bind_loopback().await;
        let wake = Arc::new(Notify::new());
        let alive = PlayerAlive::new(wake);
        alive.set_alive(true);

        let ticker = RetransmitTicker::new(
            table,
            socket,
            alive.clone(),
            Duration::from_secs(5),
            Duration::from_millis(50),
            Duration::from_millis(1),
        );
        let handle = tokio::spawn(ticker.run());

        let mut buf = [0u8; 64];
        let (n, from) = tokio::time::timeout(Duration::from_secs(1), monitor.recv_from(&mut buf))
            .await
            .expect("monitor received a burst")
            .unwrap();
        assert_eq!(&buf[..n], peer_id.as_slice());
        assert_eq!(from.ip().to_string(), "127.0.0.1");

        let (n2, _) = tokio::time::timeout(Duration::from_secs(1), splitter.recv_from(&mut buf))
            .await
            .expect("splitter received a burst")
            .unwrap();
        assert_eq!(&buf[..n2], peer_id.as_slice());

        alive.set_alive(false);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("ticker exits promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn stops_promptly_when_player_dies() {
        let table = PendingHelloTable::new();
        let socket = bind_loopback().await;
        let wake = Arc::new(Notify::new());
        let alive = PlayerAlive::new(wake);
        alive.set_alive(true);
        let ticker = RetransmitTicker::new(
            table,
            socket,
            alive.clone(),
            Duration::from_secs(5),
            Duration::from_secs(5),
            Duration::from_millis(1),
        );
        let handle = tokio::spawn(ticker.run());
        tokio::time::sleep(Duration::from_millis(10)).await;
        alive.set_alive(false);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("ticker exits promptly")
            .unwrap();
    }
}
