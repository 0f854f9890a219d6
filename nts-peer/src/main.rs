//! `nts-peer`: runs one P2PSP team member's NAT Traversal Set of rules.
//!
//! The actual DBS (splitter protocol) payload delivery is out of scope
//! (SPEC_FULL.md §1 Non-goals) — `dbs_stub` implements just enough of the
//! TCP handshake to hand the join driver a connected socket and the
//! already-known monitor endpoints, mirroring the precondition the
//! original peer assumes before its NTS join sequence starts.

mod dbs_stub;

use clap::Parser;
use nts_core::config::NtsConfig;
use nts_core::error::NtsError;
use nts_core::join;
use nts_core::router::{MessageRouter, RouterAction};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, trace};

#[derive(Parser, Debug)]
#[command(name = "nts-peer", about = "P2PSP NAT traversal peer")]
struct Args {
    /// Splitter control-channel address, e.g. 203.0.113.1:6000.
    #[arg(long)]
    splitter: std::net::SocketAddrV4,

    /// Path to an nts.toml configuration file. Missing file falls back to
    /// built-in defaults.
    #[arg(long, default_value = "nts.toml")]
    config: PathBuf,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    let cfg = match NtsConfig::load(&args.config).map_err(anyhow::Error::from) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(cfg, args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<NtsError>() {
            Some(NtsError::SplitterLost) => {
                error!("splitter connection lost, exiting");
                ExitCode::FAILURE
            }
            _ => {
                error!(error = %e, "peer exited with error");
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(cfg: NtsConfig, args: Args) -> anyhow::Result<()> {
    let mut tcp = tokio::net::TcpStream::connect(args.splitter).await?;
    let monitors = dbs_stub::receive_monitors(&mut tcp).await?;
    info!(count = monitors.len(), "received monitor endpoints from splitter");

    let splitter_udp = nts_core::types::Endpoint::new(*args.splitter.ip(), args.splitter.port());
    let (mut state, handles) = join::run(&cfg, tcp, splitter_udp, monitors).await?;
    info!(peer = %state.local_peer_id, "join protocol complete");

    let router = MessageRouter::new(&handles.table, cfg.max_predicted_ports, cfg.peer_id_len);
    let mut recv_buf = vec![0u8; 2048];
    loop {
        let socket = handles.team_socket.load_full();
        let (n, sender) = socket.recv_from(&mut recv_buf).await?;
        let action = router
            .process(&recv_buf[..n], sender, &mut state, &socket)
            .await;
        if action == RouterAction::Delegate {
            trace!(%sender, len = n, "datagram delegated to DBS (not implemented)");
        }
    }
}

