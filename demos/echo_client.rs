use std::io::Read;
use tracing_subscriber::filter::EnvFilter;
use clap::Parser;
use netutil::AddrFlags;

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
    let hints = netutil::tcphints(None, AddrFlags::empty());
    let (mut sock, _) = netutil::connect_first(Some(args.host.as_str()), Some(args.port.as_str()), &hints)?;
    println!("Connected successfully");

    let count = netutil::prompt_int("How many messages (1-100)? ", 1, 100)?;
    for i in 0..count {
        let msg = format!("message {i}");
        netutil::sendall(&mut sock, msg.as_bytes())?;
        let mut echo = vec![0u8; msg.len()];
        sock.read_exact(&mut echo)?;
        println!("Echoed: {}", String::from_utf8_lossy(&echo));
    }
    Ok(())
}

/// A simple client for the echo server demo.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The server address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// The server port or service name
    #[arg(short, long, default_value = "7890")]
    port: String,
}
