//! C5 — Join Protocol Driver.
//!
//! Orchestrates the nine-step sequence in SPEC_FULL.md §4.5: id reception,
//! initial splitter/monitor hellos, peer-list reception, wait-for-
//! incorporation with retry-on-timeout, and the final confirmation
//! marker. Runs on the single I/O task alongside the Message Router
//! (spec.md §5) — `PeerTeamState` is plain, unlocked, owned state.

use arc_swap::ArcSwap;
use bytes::Bytes;
use socket2::{Domain, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::Instant as TokioInstant;
use tracing::{debug, info, warn};

use crate::config::NtsConfig;
use crate::error::{NtsError, Result};
use crate::pending_table::PendingHelloTable;
use crate::predictor::get_probable_source_ports;
use crate::router::{MessageRouter, PeerTeamState};
use crate::ticker::{PlayerAlive, RetransmitTicker};
use crate::types::{Endpoint, PeerId};
use crate::wire::{decode_peer_list_entry, encode_status_marker};

/// Everything the join protocol needs beyond the team state it builds.
pub struct JoinHandles {
    pub table: PendingHelloTable,
    pub team_socket: Arc<ArcSwap<UdpSocket>>,
    pub player_alive: PlayerAlive,
    pub ticker_task: tokio::task::JoinHandle<()>,
}

/// Binds a fresh team UDP socket: ephemeral port, `SO_REUSEADDR`, and a
/// one-second linger, matching `nyx-transport::UdpPool::bind`'s use of
/// `socket2` for options `tokio::net::UdpSocket` doesn't expose directly.
fn bind_team_socket() -> std::io::Result<UdpSocket> {
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_linger(Some(Duration::from_secs(1)))?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

/// Reads the `n_others` peer-list entries from the splitter over TCP and
/// enqueues a hello with predicted candidate ports toward each one
/// (spec.md §4.5 step 5 / retry step). Returns the peer ids to track as
/// the initial peer list.
async fn receive_peer_list(
    tcp: &mut TcpStream,
    table: &PendingHelloTable,
    local_peer_id: &PeerId,
    l_id: usize,
    max_predicted_ports: u16,
) -> Result<std::collections::HashSet<PeerId>> {
    let n_others = tcp.read_u16().await?;
    let mut initial_peer_list = std::collections::HashSet::with_capacity(n_others as usize);

    for _ in 0..n_others {
        let mut entry_buf = vec![0u8; l_id + 8];
        tcp.read_exact(&mut entry_buf).await?;
        let entry = decode_peer_list_entry(&entry_buf, l_id)
            .ok_or_else(|| NtsError::protocol("malformed peer-list entry"))?;

        initial_peer_list.insert(entry.peer_id.clone());

        let mut candidates = Vec::new();
        if entry.port_step > 0 {
            let mut port = entry.port_to_splitter as u32 + entry.port_step as u32;
            while port < 65_536 && candidates.len() < max_predicted_ports as usize {
                candidates.push(port as u16);
                port += entry.port_step as u32;
            }
        }
        let dest = Endpoint::new(entry.ip, entry.port_to_splitter);
        table
            .enqueue_hello(
                Bytes::copy_from_slice(local_peer_id.as_bytes()),
                dest,
                candidates,
            )
            .await;
        debug!(peer = %entry.peer_id, dest = %dest, "enqueued hello to peer-list entry");
    }
    Ok(initial_peer_list)
}

/// Runs the full join protocol to completion (including any retries) and
/// leaves the peer incorporated: the pending table holds only whatever
/// hellos are still outstanding, and the `'Y'` marker has been queued to
/// the splitter. `monitors` are the already-known first `M` peer-list
/// entries (received by the external DBS handshake prior to NTS join, per
/// SPEC_FULL.md §6).
#[allow(clippy::too_many_arguments)]
pub async fn run(
    cfg: &NtsConfig,
    mut splitter_tcp: TcpStream,
    splitter_udp: Endpoint,
    monitors: Vec<Endpoint>,
) -> Result<(PeerTeamState, JoinHandles)> {
    let table = PendingHelloTable::new();
    let initial_socket = bind_team_socket()?;
    let team_socket = Arc::new(ArcSwap::from_pointee(initial_socket));
    let player_alive = PlayerAlive::new(table.wake_handle());

    // Step 1: start the retransmit ticker.
    player_alive.set_alive(true);
    let ticker = RetransmitTicker::new(
        table.clone(),
        team_socket.clone(),
        player_alive.clone(),
        cfg.t_max_arriving(),
        cfg.t_hello_period(),
        cfg.t_intra_burst(),
    );
    let ticker_task = tokio::spawn(ticker.run());

    // Step 2: receive own peer id.
    let mut id_buf = vec![0u8; cfg.peer_id_len];
    splitter_tcp.read_exact(&mut id_buf).await?;
    let local_peer_id = PeerId::new(id_buf);
    info!(peer = %local_peer_id, "received id from splitter");

    let mut state = PeerTeamState::new(local_peer_id.clone(), splitter_udp, monitors.len());
    state.peer_list = monitors.clone();

    // Step 3: hello to every monitor.
    for &monitor in &monitors {
        table
            .enqueue_hello(
                Bytes::copy_from_slice(local_peer_id.as_bytes()),
                monitor,
                [],
            )
            .await;
    }

    // Step 4: hello to the splitter; wake the ticker.
    table
        .enqueue_hello(
            Bytes::copy_from_slice(local_peer_id.as_bytes()),
            splitter_udp,
            [],
        )
        .await;
    table.wake_ticker();

    // Step 5: receive the rest of the peer list.
    state.initial_peer_list = receive_peer_list(
        &mut splitter_tcp,
        &table,
        &local_peer_id,
        cfg.peer_id_len,
        cfg.max_predicted_ports,
    )
    .await?;

    // Step 6: wake the ticker; start the incorporation deadline.
    table.wake_ticker();
    let mut deadline = TokioInstant::now() + cfg.t_max_arriving();

    let router = MessageRouter::new(&table, cfg.max_predicted_ports, cfg.peer_id_len);

    // Step 7: process inbound datagrams until fully incorporated, retrying
    // on incorporation timeout.
    let mut recv_buf = vec![0u8; 2048];
    loop {
        if state.initial_peer_list.is_empty() {
            break;
        }

        let socket = team_socket.load_full();
        tokio::select! {
            result = socket.recv_from(&mut recv_buf) => {
                let (n, sender) = result?;
                router
                    .process(&recv_buf[..n], sender, &mut state, &socket)
                    .await;
            }
            _ = tokio::time::sleep_until(deadline) => {
                warn!(
                    remaining = state.initial_peer_list.len(),
                    "incorporation timed out, retrying"
                );
                table.clear().await;
                state.initial_peer_list.clear();
                state.peer_list.truncate(state.num_monitors);

                let new_socket = bind_team_socket()?;
                team_socket.store(Arc::new(new_socket));

                let retry_marker = encode_status_marker(&local_peer_id, false);
                table.enqueue_message(retry_marker.clone(), splitter_udp).await;
                for &monitor in &monitors {
                    table.enqueue_message(retry_marker.clone(), monitor).await;
                }

                state.initial_peer_list = receive_peer_list(
                    &mut splitter_tcp,
                    &table,
                    &local_peer_id,
                    cfg.peer_id_len,
                    cfg.max_predicted_ports,
                )
                .await?;
                deadline = TokioInstant::now() + cfg.t_max_arriving();
            }
        }
    }

    // Step 8: close the TCP control connection. Any failure here is fatal:
    // the splitter has most likely already evicted this peer.
    if let Err(e) = splitter_tcp.shutdown().await {
        warn!(error = %e, "splitter TCP shutdown failed during disconnect handshake");
        return Err(NtsError::SplitterLost);
    }

    // Step 9: confirm incorporation.
    let success_marker = encode_status_marker(&local_peer_id, true);
    table.enqueue_message(success_marker, splitter_udp).await;
    info!(peer = %local_peer_id, "incorporation successful");

    Ok((
        state,
        JoinHandles {
            table,
            team_socket,
            player_alive,
            ticker_task,
        },
    ))
}

/// Helper used by callers that need to expand a port-diff/peer-number pair
/// outside of the router's own directive handling (e.g. diagnostics).
pub fn predict_ports(src_port: u16, port_diff: i32, peer_number: u16, k: u16) -> Vec<u16> {
    get_probable_source_ports(src_port, port_diff, peer_number, k)
}
