//! Big-endian wire codec for the NTS control protocol (SPEC_FULL.md §6).
//! All multi-byte integers are network byte order; `bytes::Buf`/`BufMut`
//! already default to big-endian reads/writes, so these helpers exist to
//! name the NTS message shapes rather than to reimplement byte swapping.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::Ipv4Addr;

use crate::types::PeerId;

/// `peer_id ∥ ip ∥ src_port ∥ port_diff ∥ peer_number`, length `L_id + 10`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendHelloDirective {
    pub peer_id: PeerId,
    pub ip: Ipv4Addr,
    pub src_port: u16,
    pub port_diff: u16,
    pub peer_number: u16,
    /// Present only on the `L_id + 12` variant.
    pub extra_splitter_port: Option<u16>,
}

/// Parses a splitter "send hello to X" directive. `len` must already have
/// been checked by the caller to be `l_id + 10` or `l_id + 12`.
pub fn decode_send_hello_directive(mut buf: &[u8], l_id: usize) -> Option<SendHelloDirective> {
    if buf.len() != l_id + 10 && buf.len() != l_id + 12 {
        return None;
    }
    if buf.remaining() < l_id {
        return None;
    }
    let peer_id = PeerId::new(Bytes::copy_from_slice(&buf[..l_id]));
    buf.advance(l_id);
    if buf.remaining() < 10 {
        return None;
    }
    let ip = Ipv4Addr::from(buf.get_u32());
    let src_port = buf.get_u16();
    let port_diff = buf.get_u16();
    let peer_number = buf.get_u16();
    let extra_splitter_port = if buf.remaining() >= 2 {
        Some(buf.get_u16())
    } else {
        None
    };
    Some(SendHelloDirective {
        peer_id,
        ip,
        src_port,
        port_diff,
        peer_number,
        extra_splitter_port,
    })
}

/// `peer_id ∥ observed_source_port`, sent to the splitter when a new peer's
/// hello reveals its true NAT-allocated source port.
pub fn encode_observed_source_port(peer_id: &PeerId, observed_port: u16) -> Bytes {
    let mut out = BytesMut::with_capacity(peer_id.len() + 2);
    out.put_slice(peer_id.as_bytes());
    out.put_u16(observed_port);
    out.freeze()
}

/// `peer_id ∥ 'Y'` or `peer_id ∥ 'N'`: incorporation status marker.
pub fn encode_status_marker(peer_id: &PeerId, incorporated: bool) -> Bytes {
    let mut out = BytesMut::with_capacity(peer_id.len() + 1);
    out.put_slice(peer_id.as_bytes());
    out.put_u8(if incorporated { b'Y' } else { b'N' });
    out.freeze()
}

/// One entry of the TCP peer-list response:
/// `peer_id (L_id) || ip_v4 (4) || port_to_splitter (2) || port_step (2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerListEntry {
    pub peer_id: PeerId,
    pub ip: Ipv4Addr,
    pub port_to_splitter: u16,
    pub port_step: u16,
}

pub fn decode_peer_list_entry(mut buf: &[u8], l_id: usize) -> Option<PeerListEntry> {
    if buf.len() != l_id + 8 {
        return None;
    }
    let peer_id = PeerId::new(Bytes::copy_from_slice(&buf[..l_id]));
    buf.advance(l_id);
    let ip = Ipv4Addr::from(buf.get_u32());
    let port_to_splitter = buf.get_u16();
    let port_step = buf.get_u16();
    Some(PeerListEntry {
        peer_id,
        ip,
        port_to_splitter,
        port_step,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn sample_peer_id(l_id: usize) -> PeerId {
        PeerId::new(Bytes::from(vec![b'A'; l_id]))
    }

    #[test]
    fn roundtrip_short_directive() {
        let l_id = 40;
        let mut buf = BytesMut::new();
        buf.put_slice(&vec![b'B'; l_id]);
        buf.put_u32(Ipv4Addr::new(10, 0, 0, 5).into());
        buf.put_u16(40_000);
        buf.put_u16(2);
        buf.put_u16(3);
        let decoded = decode_send_hello_directive(&buf, l_id).expect("decodes");
        assert_eq!(decoded.ip, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(decoded.src_port, 40_000);
        assert_eq!(decoded.port_diff, 2);
        assert_eq!(decoded.peer_number, 3);
        assert_eq!(decoded.extra_splitter_port, None);
    }

    #[test]
    fn roundtrip_long_directive_has_extra_port() {
        let l_id = 40;
        let mut buf = BytesMut::new();
        buf.put_slice(&vec![b'B'; l_id]);
        buf.put_u32(Ipv4Addr::new(10, 0, 0, 5).into());
        buf.put_u16(40_000);
        buf.put_u16(2);
        buf.put_u16(3);
        buf.put_u16(12_345);
        let decoded = decode_send_hello_directive(&buf, l_id).expect("decodes");
        assert_eq!(decoded.extra_splitter_port, Some(12_345));
    }

    #[test]
    fn status_marker_roundtrip() {
        let peer_id = sample_peer_id(4);
        let marker = encode_status_marker(&peer_id, true);
        assert_eq!(marker.last().copied(), Some(b'Y'));
        let marker = encode_status_marker(&peer_id, false);
        assert_eq!(marker.last().copied(), Some(b'N'));
    }

    #[test]
    fn observed_port_roundtrip() {
        let peer_id = sample_peer_id(4);
        let encoded = encode_observed_source_port(&peer_id, 5000);
        assert_eq!(encoded.len(), 6);
        let mut tail = &encoded[4..];
        assert_eq!(tail.get_u16(), 5000);
    }
}
