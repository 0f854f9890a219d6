//! C4 — Message Router.
//!
//! Classifies an inbound datagram by `(sender, length)` and dispatches it
//! per the table in SPEC_FULL.md §4.4. Runs on the single I/O task that
//! also drives the join protocol (spec.md §5), so `PeerTeamState` needs no
//! lock of its own — only the Pending-Hello Table, shared with the ticker,
//! is synchronized.

use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::pending_table::PendingHelloTable;
use crate::predictor::get_probable_source_ports;
use crate::types::{Endpoint, PeerId};
use crate::wire::{decode_send_hello_directive, encode_observed_source_port};

/// Team membership and bookkeeping the router mutates. Owned by the peer
/// instance (spec.md §9's "global team state" note): not a process-wide
/// global, just a plain struct passed to the router and the join driver.
pub struct PeerTeamState {
    pub local_peer_id: PeerId,
    pub splitter: Endpoint,
    pub num_monitors: usize,
    pub peer_list: Vec<Endpoint>,
    pub initial_peer_list: HashSet<PeerId>,
    pub debt: HashMap<Endpoint, i64>,
}

impl PeerTeamState {
    pub fn new(local_peer_id: PeerId, splitter: Endpoint, num_monitors: usize) -> Self {
        Self {
            local_peer_id,
            splitter,
            num_monitors,
            peer_list: Vec::new(),
            initial_peer_list: HashSet::new(),
            debt: HashMap::new(),
        }
    }

    pub fn monitors(&self) -> &[Endpoint] {
        &self.peer_list[..self.num_monitors.min(self.peer_list.len())]
    }
}

/// What the router decided to do with a datagram, for the caller (and
/// tests) to observe. Side effects (table/peer-list mutation, the
/// immediate hello ack) already happened by the time this is returned.
#[derive(Debug, PartialEq, Eq)]
pub enum RouterAction {
    /// Splitter directive processed; a hello was enqueued toward the named
    /// peer (and, for the long variant, toward an extra splitter port too).
    HelloEnqueued,
    /// Matched and removed a pending entry.
    AcknowledgeConsumed,
    /// Looked like an ack shape but matched no pending entry.
    UnknownAcknowledge,
    /// Inbound hello from a peer: ack sent; `is_new` if this was the first
    /// time we saw that peer.
    HelloReceived { is_new: bool },
    /// Legacy single-byte `"H"` DBS noise.
    LegacyDbsNoise,
    /// Sender is neither the splitter nor a known peer.
    IgnoredUnknownSender,
    /// Join still in progress; DBS delegation withheld.
    IgnoredNotIncorporated,
    /// Fully incorporated; hand the raw datagram to DBS.
    Delegate,
    /// Length matched no known shape.
    Malformed,
}

pub struct MessageRouter<'a> {
    pub table: &'a PendingHelloTable,
    pub max_predicted_ports: u16,
    pub l_id: usize,
}

impl<'a> MessageRouter<'a> {
    pub fn new(table: &'a PendingHelloTable, max_predicted_ports: u16, l_id: usize) -> Self {
        Self {
            table,
            max_predicted_ports,
            l_id,
        }
    }

    /// Processes one inbound datagram. `team_socket` is used only to send
    /// the immediate (unreliable, one-shot) ack for an inbound hello — that
    /// echo is not itself retried, matching spec.md §4.4.
    pub async fn process(
        &self,
        bytes: &[u8],
        sender: SocketAddr,
        state: &mut PeerTeamState,
        team_socket: &tokio::net::UdpSocket,
    ) -> RouterAction {
        let sender_v4 = match sender {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => return RouterAction::Malformed,
        };
        let from_splitter = sender_v4 == state.splitter;
        let l_id = self.l_id;

        if from_splitter && (bytes.len() == l_id + 10 || bytes.len() == l_id + 12) {
            return self.handle_send_hello_directive(bytes, state).await;
        }

        if self.looks_like_ack(bytes, sender_v4, state) {
            let acked = self
                .table
                .ack(*sender_v4.ip(), sender_v4.port(), bytes)
                .await;
            if acked {
                return RouterAction::AcknowledgeConsumed;
            }
            warn!(%sender, "received acknowledge from unknown host");
            return RouterAction::UnknownAcknowledge;
        }

        if bytes.len() == l_id {
            return self
                .handle_inbound_hello(bytes, sender_v4, state, team_socket)
                .await;
        }

        if bytes.len() == 1 && bytes[0] == b'H' {
            return RouterAction::LegacyDbsNoise;
        }

        if !from_splitter && !state.peer_list.contains(&sender_v4) {
            info!(%sender, len = bytes.len(), "ignoring datagram from unknown sender");
            return RouterAction::IgnoredUnknownSender;
        }

        if state.initial_peer_list.is_empty() {
            RouterAction::Delegate
        } else {
            RouterAction::IgnoredNotIncorporated
        }
    }

    /// An ack shape per spec.md §4.4: the exact local peer id, or one of
    /// the splitter-sourced lengths `L_id+2`/`L_id+3`, or `L_id+1` from
    /// anyone.
    fn looks_like_ack(&self, bytes: &[u8], sender: Endpoint, state: &PeerTeamState) -> bool {
        let l_id = self.l_id;
        bytes == state.local_peer_id.as_bytes()
            || (sender == state.splitter && (bytes.len() == l_id + 2 || bytes.len() == l_id + 3))
            || bytes.len() == l_id + 1
    }

    async fn handle_send_hello_directive(
        &self,
        bytes: &[u8],
        state: &mut PeerTeamState,
    ) -> RouterAction {
        let Some(directive) = decode_send_hello_directive(bytes, self.l_id) else {
            return RouterAction::Malformed;
        };
        let predicted = get_probable_source_ports(
            directive.src_port,
            directive.port_diff as i32,
            directive.peer_number,
            self.max_predicted_ports,
        );
        let dest = Endpoint::new(directive.ip, directive.src_port);
        self.table
            .enqueue_hello(
                Bytes::copy_from_slice(state.local_peer_id.as_bytes()),
                dest,
                predicted,
            )
            .await;
        if let Some(extra_port) = directive.extra_splitter_port {
            let extra_dest = Endpoint::new(*state.splitter.ip(), extra_port);
            self.table
                .enqueue_hello(
                    Bytes::copy_from_slice(state.local_peer_id.as_bytes()),
                    extra_dest,
                    [],
                )
                .await;
        }
        self.table.wake_ticker();
        RouterAction::HelloEnqueued
    }

    async fn handle_inbound_hello(
        &self,
        bytes: &[u8],
        sender: Endpoint,
        state: &mut PeerTeamState,
        team_socket: &tokio::net::UdpSocket,
    ) -> RouterAction {
        if let Err(e) = team_socket.send_to(bytes, SocketAddr::V4(sender)).await {
            warn!(error = %e, %sender, "failed to send hello acknowledge");
        }
        let peer_id = PeerId::new(Bytes::copy_from_slice(bytes));
        let is_new = !state.peer_list.contains(&sender);
        if is_new {
            info!(%sender, "appending peer to team");
            state.peer_list.push(sender);
            state.debt.insert(sender, 0);

            let payload = encode_observed_source_port(&state.local_peer_id, sender.port());
            self.table.enqueue_message(payload, state.splitter).await;

            state.initial_peer_list.remove(&peer_id);
        }
        RouterAction::HelloReceived { is_new }
    }
}
