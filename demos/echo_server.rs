use tracing::{info, warn};
use tracing_subscriber::filter::EnvFilter;
use clap::Parser;
use netutil::{AddrFlags, FdSet, Socket};
use std::collections::HashMap;
use std::io::Read;
use std::os::fd::{AsRawFd, RawFd};

fn init_env_filter(env_filter: EnvFilter) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_level(true)
        .with_target(true);

    let subscriber = subscriber.finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> std::io::Result<()> {
    // Initialize log bridge to capture log crate messages - MUST be first!
    tracing_log::LogTracer::init().expect("Failed to set logger");

    if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        init_env_filter(env_filter);
    }

    let args = Args::parse();
    let hints = netutil::tcphints(None, AddrFlags::PASSIVE);
    let (listener, ai) = netutil::bind_first(Some(args.host.as_str()), Some(args.port.as_str()), &hints, true)?;
    listener.listen(16)?;
    println!("Echo server listening on {}", netutil::AddrStr::from(ai.addr));

    let lfd = listener.as_raw_fd();
    let mut clients: HashMap<RawFd, Socket> = HashMap::new();
    let mut ready = FdSet::new();
    let mut buf = [0u8; 1024];
    loop {
        let mut fds: Vec<RawFd> = clients.keys().copied().collect();
        fds.push(lfd);
        netutil::clrfds(&mut ready, &fds);
        netutil::select(Some(&mut ready), None, None)?;

        for fd in ready.iter() {
            if fd == lfd {
                let (sock, addr) = listener.accept()?;
                info!("Accepted connection from {}", netutil::getaddrstr(&addr)?);
                clients.insert(sock.as_raw_fd(), sock);
                continue;
            }
            let Some(sock) = clients.get_mut(&fd) else { continue };
            let n = match sock.read(&mut buf) {
                Ok(n) => n,
                Err(e) => {
                    warn!("Read from descriptor {fd} failed: {e}");
                    0
                }
            };
            if n == 0 || netutil::sendall(sock, &buf[..n]).is_err() {
                info!("Closing descriptor {fd}");
                clients.remove(&fd);
            }
        }
    }
}

/// A select-driven echo server.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// The port or service name to listen on
    #[arg(short, long, default_value = "7890")]
    port: String,
}
