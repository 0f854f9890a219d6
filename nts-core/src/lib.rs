#![forbid(unsafe_code)]

//! Core NAT Traversal Set of rules (NTS) and Lost-chunk Recovery Set (LRS)
//! building blocks for a P2PSP team member.
//!
//! This crate is the reusable library layer: pure port-prediction math,
//! the reliable send-over-UDP pending table, the retransmit ticker, the
//! message router, the join protocol driver, and the splitter-side chunk
//! ring. `nts-peer` and `nts-splitter` wire these into runnable binaries.

pub mod config;
pub mod error;
pub mod join;
pub mod lrs;
pub mod pending_table;
pub mod predictor;
pub mod router;
pub mod ticker;
pub mod types;
pub mod wire;

pub use config::NtsConfig;
pub use error::{NtsError, Result};
pub use pending_table::PendingHelloTable;
pub use router::{MessageRouter, PeerTeamState, RouterAction};
pub use ticker::{PlayerAlive, RetransmitTicker};
pub use types::{Endpoint, PeerId};
