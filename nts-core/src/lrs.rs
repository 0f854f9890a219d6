//! C6 — LRS Chunk Buffer (splitter side).
//!
//! A fixed-size ring buffer of recently distributed chunks, so a single
//! lost-chunk report can be served from memory rather than asking the
//! original chunk source to resend. See SPEC_FULL.md §4.6.

use bytes::Bytes;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::warn;

pub struct ChunkRing {
    buffer: Vec<Option<Bytes>>,
}

impl ChunkRing {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "chunk ring size must be positive");
        Self {
            buffer: vec![None; size],
        }
    }

    fn slot(&self, chunk_number: u64) -> usize {
        (chunk_number % self.buffer.len() as u64) as usize
    }

    /// Called on every chunk send by the splitter, overwriting whatever
    /// previously occupied that slot.
    pub fn record(&mut self, chunk_number: u64, payload: impl Into<Bytes>) {
        let slot = self.slot(chunk_number);
        self.buffer[slot] = Some(payload.into());
    }

    pub fn get(&self, chunk_number: u64) -> Option<Bytes> {
        self.buffer[self.slot(chunk_number)].clone()
    }

    /// Retrieves the buffered payload for `lost_number` and resends it to
    /// `monitor`. Send errors are logged and swallowed — the monitor peer
    /// drives recovery, the splitter must not stall on it.
    pub async fn resend_lost_chunk(
        &self,
        lost_number: u64,
        monitor: SocketAddr,
        socket: &UdpSocket,
    ) {
        let Some(payload) = self.get(lost_number) else {
            warn!(lost_number, "no buffered payload for lost chunk report");
            return;
        };
        if let Err(e) = socket.send_to(&payload, monitor).await {
            warn!(error = %e, %monitor, lost_number, "failed to resend lost chunk");
        }
    }
}
