use clap::Parser;
use netutil::{AddrFlags, Socket};
use std::{fs::OpenOptions, io::Read, io::Write, time::{Duration, Instant}};
use tracing_subscriber::filter::EnvFilter;

/// An empty host leaves the choice to the resolver: loopback for clients,
/// every interface for servers.
fn node(host: &str) -> Option<&str> {
    if host.is_empty() { None } else { Some(host) }
}

fn run_client_mode(args: Args) -> std::io::Result<()> {
    let hints = netutil::tcphints(None, AddrFlags::empty());
    let (mut sock, ai) = netutil::connect_first(node(&args.host), Some(args.port.as_str()), &hints)?;
    println!("Connected successfully to {}", netutil::AddrStr::from(ai.addr));

    let sent = if let Some(n) = args.long {
        netutil::sendlong(&mut sock, n)? as u64
    } else if let Some(n) = args.double {
        netutil::senddouble(&mut sock, n)? as u64
    } else if let Some(path) = args.file {
        if !netutil::file_exist(&path) {
            return Err(std::io::Error::new(std::io::ErrorKind::NotFound, format!("cannot read {path}")));
        }
        let size = netutil::file_size(&path)?;
        println!("Sending {path} ({size} bytes)");
        netutil::sendfs(&mut sock, &mut std::fs::File::open(&path)?)?
    } else {
        netutil::sendfs(&mut sock, &mut std::io::stdin().lock())?
    };
    println!("Sent {sent} bytes");
    Ok(())
}

fn receive(mut sock: Socket, peer: String, out: Option<String>, period: Duration) -> std::io::Result<()> {
    let mut sink: Box<dyn Write> = match out {
        Some(path) => Box::new(OpenOptions::new().append(true).open(path)?),
        None => Box::new(std::io::sink()),
    };
    let mut buf = vec![0u8; 64 * 1024];
    let mut start = Instant::now();
    let mut total_recv = 0;
    let mut total = 0u64;
    loop {
        let n = sock.read(&mut buf)?;
        if n == 0 {
            println!("[{peer}]: socket closed by remote party after {total} bytes");
            return Ok(());
        }
        sink.write_all(&buf[..n])?;
        total += n as u64;
        total_recv += n;
        let delta = start.elapsed();
        if delta >= period {
            let throughput = ((total_recv * 8) as f32 / delta.as_secs_f32()) / (10u64.pow(6) as f32);
            println!("[{peer}]: {throughput} Mbps");
            start = Instant::now();
            total_recv = 0;
        }
    }
}

fn run_server_mode(args: Args) -> std::io::Result<()> {
    if let Some(path) = &args.out {
        netutil::file_wipe(path)?;
    }
    let hints = netutil::tcphints(None, AddrFlags::PASSIVE);
    let (listener, ai) = netutil::bind_first(node(&args.host), Some(args.port.as_str()), &hints, true)?;
    listener.listen(args.backlog)?;
    println!("Listening on {}", netutil::AddrStr::from(ai.addr));

    let period = Duration::from_secs(args.period);
    loop {
        match listener.accept() {
            Ok((sock, addr)) => {
                let peer = netutil::getaddrstr(&addr)?.to_string();
                println!("Accepted connection from: {peer}");
                let out = args.out.clone();
                std::thread::spawn(move || {
                    if let Err(e) = receive(sock, peer.clone(), out, period) {
                        tracing::warn!("Connection with {peer} failed: {e}");
                    }
                });
            }
            Err(e) => println!("Failed to accept connection: {e}"),
        }
    }
}

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
    // The log bridge has to be installed before anything logs.
    tracing_log::LogTracer::init().map_err(std::io::Error::other)?;

    if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        init_env_filter(env_filter);
    }

    let args = Args::parse();
    if args.client {
        run_client_mode(args)
    } else {
        run_server_mode(args)
    }
}

/// Sends a file or a number over TCP, or receives what others send.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Set the client mode for the application
    #[arg(short, long)]
    client: bool,
    /// The host to connect to or listen on (empty for loopback or every interface)
    #[arg(long, default_value = "")]
    host: String,
    /// The port number or service name
    #[arg(short, long)]
    port: String,
    /// Client: the file to send (stdin when no file or number is given)
    #[arg(short, long)]
    file: Option<String>,
    /// Client: send this integer instead of a file
    #[arg(short, long, conflicts_with_all = ["file", "double"], allow_hyphen_values = true)]
    long: Option<i64>,
    /// Client: send this number instead of a file
    #[arg(short, long, conflicts_with = "file", allow_hyphen_values = true)]
    double: Option<f64>,
    /// Server: append everything received to this file, wiped at startup
    #[arg(short, long)]
    out: Option<String>,
    /// Server: the listen backlog
    #[arg(short, long, default_value = "16")]
    backlog: i32,
    /// Server: the throughput sampling period in seconds
    #[arg(long, default_value = "1")]
    period: u64,
}
