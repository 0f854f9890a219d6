//! C2 — Pending-Hello Table.
//!
//! A mapping `HelloKey -> PendingEntry` behind a single mutex, with
//! insertion-order iteration (`IndexMap`) so that, within one retransmit
//! burst, ports for a given key are always probed in the order they were
//! added (SPEC_FULL.md §5).

use indexmap::IndexMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

use crate::types::{Endpoint, HelloKey, PendingEntry};

#[derive(Clone)]
pub struct PendingHelloTable {
    inner: Arc<Mutex<IndexMap<HelloKey, PendingEntry>>>,
    /// Signalled by `enqueue_message`; the ticker also gets woken explicitly
    /// by the router/join driver after `enqueue_hello` calls, per
    /// SPEC_FULL.md §4.4/§4.5.
    wake: Arc<Notify>,
}

impl Default for PendingHelloTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingHelloTable {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(IndexMap::new())),
            wake: Arc::new(Notify::new()),
        }
    }

    /// A clone of the wake handle, held by the ticker for its bounded wait.
    pub fn wake_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    /// Wakes the ticker immediately, without inserting anything. Used after
    /// `enqueue_hello` calls and at join-protocol bootstrap points.
    pub fn wake_ticker(&self) {
        self.wake.notify_one();
    }

    /// `enqueue_hello(dest, extra_ports)`. Does not wake the ticker; callers
    /// that want an immediate burst call `wake_ticker()` explicitly, mirroring
    /// how spec.md §4.4/§4.5 spell out "enqueue hello; wake ticker" as two
    /// separate steps.
    pub async fn enqueue_hello(
        &self,
        payload: impl Into<bytes::Bytes>,
        dest: Endpoint,
        extra_ports: impl IntoIterator<Item = u16>,
    ) -> bool {
        let key = HelloKey::new(payload, dest);
        let mut table = self.inner.lock().await;
        if table.contains_key(&key) {
            return false;
        }
        table.insert(key, PendingEntry::new(dest.port(), extra_ports));
        true
    }

    /// `enqueue_message(payload, dest)`. Wakes the ticker on successful
    /// insertion; duplicate-suppressed like `enqueue_hello`.
    pub async fn enqueue_message(&self, payload: impl Into<bytes::Bytes>, dest: Endpoint) -> bool {
        let key = HelloKey::new(payload, dest);
        let inserted = {
            let mut table = self.inner.lock().await;
            if table.contains_key(&key) {
                false
            } else {
                table.insert(key, PendingEntry::new(dest.port(), std::iter::empty()));
                true
            }
        };
        if inserted {
            self.wake.notify_one();
        }
        inserted
    }

    /// `ack(sender, payload)`. Removes and returns true for the first entry
    /// whose payload matches exactly and whose destination address matches
    /// the sender's, with the sender's port among the entry's candidate
    /// ports.
    pub async fn ack(&self, sender_ip: Ipv4Addr, sender_port: u16, payload: &[u8]) -> bool {
        let mut table = self.inner.lock().await;
        let hit = table.iter().find_map(|(key, entry)| {
            if key.payload.as_ref() == payload
                && *key.destination.ip() == sender_ip
                && entry.candidate_ports.contains(&sender_port)
            {
                Some(key.clone())
            } else {
                None
            }
        });
        match hit {
            Some(key) => {
                table.shift_remove(&key);
                true
            }
            None => false,
        }
    }

    /// `sweep_expired(now)`: removes and returns every entry whose age
    /// exceeds `max_age`.
    pub async fn sweep_expired(&self, max_age: Duration) -> Vec<HelloKey> {
        let mut table = self.inner.lock().await;
        let expired: Vec<HelloKey> = table
            .iter()
            .filter(|(_, entry)| entry.is_expired(max_age))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            table.shift_remove(key);
        }
        expired
    }

    /// Snapshot under the lock, for the ticker to iterate and send from
    /// without holding the mutex during UDP I/O.
    pub async fn snapshot(&self) -> Vec<(HelloKey, PendingEntry)> {
        let table = self.inner.lock().await;
        table.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Removes every entry unconditionally. Used on incorporation retry
    /// (spec.md §4.5 step 7).
    pub async fn clear(&self) {
        let mut table = self.inner.lock().await;
        table.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ep(ip: [u8; 4], port: u16) -> Endpoint {
        Endpoint::new(Ipv4Addr::from(ip), port)
    }

    #[tokio::test]
    async fn enqueue_hello_is_idempotent() {
        let table = PendingHelloTable::new();
        let dest = ep([10, 0, 0, 5], 40_000);
        assert!(table.enqueue_hello(b"A".repeat(40), dest, [1, 2, 3]).await);
        assert!(!table.enqueue_hello(b"A".repeat(40), dest, [9]).await);
        assert_eq!(table.len().await, 1);
    }

    /// Invariant 2: destination port is always among the candidate ports.
    #[tokio::test]
    async fn destination_port_always_candidate() {
        let table = PendingHelloTable::new();
        let dest = ep([10, 0, 0, 5], 40_000);
        table
            .enqueue_hello(b"A".repeat(40), dest, [40_002, 40_004])
            .await;
        let snap = table.snapshot().await;
        let (_, entry) = &snap[0];
        assert!(entry.candidate_ports.contains(&40_000));
    }

    /// S3: after processing a directive, the entry's candidate ports are
    /// the predicted set unioned with the destination port.
    #[tokio::test]
    async fn scenario_s3_shape() {
        let table = PendingHelloTable::new();
        let dest = ep([10, 0, 0, 5], 40_000);
        let predicted = vec![40_001, 40_002];
        table
            .enqueue_hello(b"A".repeat(40), dest, predicted.clone())
            .await;
        let snap = table.snapshot().await;
        assert_eq!(snap.len(), 1);
        let (_, entry) = &snap[0];
        for p in &predicted {
            assert!(entry.candidate_ports.contains(p));
        }
        assert!(entry.candidate_ports.contains(&40_000));
    }

    /// S5: ack removes the entry and no further retransmit occurs.
    #[tokio::test]
    async fn scenario_s5_ack_removes_entry() {
        let table = PendingHelloTable::new();
        let dest = ep([10, 0, 0, 5], 40_000);
        table
            .enqueue_hello(b"A".repeat(40), dest, [40_002])
            .await;
        let removed = table
            .ack(Ipv4Addr::new(10, 0, 0, 5), 40_002, &b"A".repeat(40))
            .await;
        assert!(removed);
        assert!(table.is_empty().await);
    }

    /// Ack idempotence: applying twice removes at most one entry.
    #[tokio::test]
    async fn ack_idempotent() {
        let table = PendingHelloTable::new();
        let dest = ep([10, 0, 0, 5], 40_000);
        table.enqueue_hello(b"A".repeat(40), dest, []).await;
        assert!(
            table
                .ack(Ipv4Addr::new(10, 0, 0, 5), 40_000, &b"A".repeat(40))
                .await
        );
        assert!(
            !table
                .ack(Ipv4Addr::new(10, 0, 0, 5), 40_000, &b"A".repeat(40))
                .await
        );
    }

    #[tokio::test]
    async fn ack_requires_port_among_candidates() {
        let table = PendingHelloTable::new();
        let dest = ep([10, 0, 0, 5], 40_000);
        table.enqueue_hello(b"A".repeat(40), dest, []).await;
        let removed = table
            .ack(Ipv4Addr::new(10, 0, 0, 5), 59_999, &b"A".repeat(40))
            .await;
        assert!(!removed);
    }

    #[tokio::test]
    async fn sweep_expired_removes_stale_entries() {
        let table = PendingHelloTable::new();
        let dest = ep([10, 0, 0, 5], 40_000);
        table.enqueue_hello(b"A".repeat(40), dest, []).await;
        let expired = table.sweep_expired(Duration::from_secs(0)).await;
        assert_eq!(expired.len(), 1);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn enqueue_message_wakes_ticker() {
        let table = PendingHelloTable::new();
        let notified = table.wake_handle();
        let dest = ep([10, 0, 0, 1], 4000);
        let wait = tokio::spawn(async move {
            notified.notified().await;
        });
        table.enqueue_message(b"A".repeat(40), dest).await;
        tokio::time::timeout(Duration::from_secs(1), wait)
            .await
            .expect("notified within timeout")
            .unwrap();
    }
}
