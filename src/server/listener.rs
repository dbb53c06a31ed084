use anyhow::Context as _;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;

use crate::config::Config;
use crate::net::tcp::{TcpDataPorts, TcpSocket};
use crate::net::{LoggingCommands, Socket};
use crate::responder::{Protocol, TracingSink};
use crate::server::stack::Stack;
use crate::storage::DiskFileSystem;

/// Scheduling passes per tick while responders keep making progress.
const MAX_PASSES_PER_TICK: usize = 16;
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run(cfg: &Config) -> anyhow::Result<()> {
    let specs = cfg.listeners()?;

    let files = DiskFileSystem::new(&cfg.storage.root)?;
    info!("Serving files from {}", files.root().display());

    let data_ip = specs
        .iter()
        .find(|s| s.protocol == Protocol::Ftp)
        .and_then(|s| s.host.parse::<IpAddr>().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let ports = TcpDataPorts::new(data_ip, cfg.ftp.data_port_base, cfg.ftp.data_port_span);

    let mut stack = Stack::from_config(
        cfg,
        Box::new(files),
        Box::new(ports),
        Box::new(LoggingCommands),
    )?;

    let (tx, mut rx) = mpsc::channel::<(TcpStream, Protocol)>(16);
    for spec in specs {
        let listener = TcpListener::bind(spec.addr())
            .await
            .with_context(|| format!("Failed to bind {}:{}", spec.host, spec.port))?;
        info!("Listening on {}:{} ({})", spec.host, spec.port, spec.protocol);
        tokio::spawn(accept_loop(listener, spec.protocol, tx.clone()));
    }
    drop(tx);

    let started = Instant::now();
    let mut tick = tokio::time::interval(Duration::from_millis(cfg.server.poll_interval_ms.max(1)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut status = tokio::time::interval(STATUS_INTERVAL);
    status.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            accepted = rx.recv() => {
                let Some((stream, protocol)) = accepted else {
                    anyhow::bail!("All listeners stopped");
                };
                let now = started.elapsed().as_millis() as u64;
                if let Err(socket) = stack.accept(Box::new(TcpSocket::new(stream)), protocol, now) {
                    socket.close();
                }
            }

            _ = tick.tick() => {
                let now = started.elapsed().as_millis() as u64;
                for _ in 0..MAX_PASSES_PER_TICK {
                    if !stack.poll(now) {
                        break;
                    }
                }
            }

            _ = status.tick() => {
                stack.diagnostics(&mut TracingSink { channel: "status" });
            }
        }
    }
}

async fn accept_loop(listener: TcpListener, protocol: Protocol, tx: mpsc::Sender<(TcpStream, Protocol)>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, %protocol, "TCP connection");
                if tx.send((stream, protocol)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Accept failed on {} listener: {}", protocol, e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}
