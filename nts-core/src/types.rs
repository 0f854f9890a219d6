//! Wire-level identity types shared across the NTS core.

use bytes::Bytes;
use std::fmt;
use std::net::SocketAddrV4;
use std::time::Instant;

/// `Endpoint` in the spec: an IPv4 address plus a UDP port. The wire
/// protocol is IPv4-only (see SPEC_FULL.md §3), so this is a plain alias
/// rather than a wrapper.
pub type Endpoint = SocketAddrV4;

/// Opaque peer identifier, `L_id` bytes long. Cheaply clonable (`Bytes`) so
/// it can be embedded in many in-flight `HelloKey`s without copying.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PeerId(Bytes);

impl PeerId {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({self})")
    }
}

impl fmt::Display for PeerId {
    /// Logs only a hex prefix: the full id is also carried as payload bytes
    /// in every hello, and dumping it in full on every log line is noise.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix_len = self.0.len().min(4);
        for byte in &self.0[..prefix_len] {
            write!(f, "{byte:02x}")?;
        }
        if self.0.len() > prefix_len {
            write!(f, "..")?;
        }
        Ok(())
    }
}

/// Identity of a pending control message: exact payload plus destination
/// endpoint. Two hellos with the same payload to different endpoints (or
/// different payloads to the same endpoint) are distinct entries.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HelloKey {
    pub payload: Bytes,
    pub destination: Endpoint,
}

impl HelloKey {
    pub fn new(payload: impl Into<Bytes>, destination: Endpoint) -> Self {
        Self {
            payload: payload.into(),
            destination,
        }
    }
}

impl fmt::Debug for HelloKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelloKey")
            .field("payload_len", &self.payload.len())
            .field("destination", &self.destination)
            .finish()
    }
}

/// One outstanding reliable send: when it was first enqueued, and the
/// ordered set of ports to fan out to on every retransmit burst.
#[derive(Clone, Debug)]
pub struct PendingEntry {
    pub first_sent_at: Instant,
    pub candidate_ports: Vec<u16>,
}

impl PendingEntry {
    pub fn new(destination_port: u16, extra_ports: impl IntoIterator<Item = u16>) -> Self {
        let mut candidate_ports: Vec<u16> = extra_ports.into_iter().collect();
        candidate_ports.push(destination_port);
        Self {
            first_sent_at: Instant::now(),
            candidate_ports,
        }
    }

    pub fn is_expired(&self, max_age: std::time::Duration) -> bool {
        self.first_sent_at.elapsed() > max_age
    }
}
