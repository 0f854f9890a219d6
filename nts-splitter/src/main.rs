//! `nts-splitter`: demonstrates the Lost-chunk Recovery Set (LRS) in
//! isolation. Real chunk sourcing and the rest of the splitter's DBS duties
//! are out of scope (SPEC_FULL.md §1 Non-goals); this binary reads chunks
//! from stdin, records each into the ring, and serves UDP loss reports
//! (an 8-byte big-endian chunk number) from a single monitor peer.

use bytes::Bytes;
use clap::Parser;
use nts_core::config::NtsConfig;
use nts_core::lrs::ChunkRing;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "nts-splitter", about = "P2PSP splitter-side lost-chunk recovery")]
struct Args {
    /// Local UDP address to serve loss reports on.
    #[arg(long, default_value = "0.0.0.0:6000")]
    bind: std::net::SocketAddrV4,

    /// Fixed size of each chunk read from the input feed, in bytes.
    #[arg(long, default_value_t = 1024)]
    chunk_size: usize,

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

    let cfg = match NtsConfig::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = run(cfg, args).await {
        error!(error = %e, "splitter exited with error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Blocking stdin reader, fed to the async recorder over a channel. Reads
/// fixed-size chunks; a short final read (including zero bytes) ends the
/// feed.
fn spawn_stdin_feed(chunk_size: usize) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel(32);
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin().lock();
        let mut buf = vec![0u8; chunk_size];
        loop {
            match read_full_or_eof(&mut stdin, &mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stdin feed read failed, stopping");
                    break;
                }
            }
        }
    });
    rx
}

fn read_full_or_eof(r: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = r.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

async fn run(cfg: NtsConfig, args: Args) -> anyhow::Result<()> {
    let socket = UdpSocket::bind(args.bind).await?;
    info!(bind = %args.bind, "serving lost-chunk recovery");

    let ring = Arc::new(Mutex::new(ChunkRing::new(cfg.chunk_ring_size)));
    let mut feed = spawn_stdin_feed(args.chunk_size);
    let recorder_ring = ring.clone();
    tokio::spawn(async move {
        let mut chunk_number = 0u64;
        while let Some(payload) = feed.recv().await {
            recorder_ring.lock().await.record(chunk_number, payload);
            chunk_number += 1;
        }
        info!("stdin feed ended, ring no longer receiving new chunks");
    });

    let mut recv_buf = [0u8; 8];
    loop {
        let (n, monitor) = socket.recv_from(&mut recv_buf).await?;
        if n != 8 {
            warn!(%monitor, len = n, "malformed loss report, ignoring");
            continue;
        }
        let lost_number = u64::from_be_bytes(recv_buf);
        let guard = ring.lock().await;
        guard.resend_lost_chunk(lost_number, monitor, &socket).await;
    }
}
