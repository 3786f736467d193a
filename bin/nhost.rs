use clap::Parser;
use tracing_subscriber::filter::EnvFilter;

fn classify(addr: &str) -> &'static str {
    if netutil::valid4(addr) {
        "IPv4"
    } else if netutil::valid6(addr) {
        "IPv6"
    } else {
        "invalid"
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
    tracing_log::LogTracer::init().map_err(std::io::Error::other)?;

    if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        init_env_filter(env_filter);
    }

    let args = Args::parse();
    if args.addrs.is_empty() {
        let entry = netutil::gethostentry()?;
        println!("{}", entry.name);
        for ip in entry.addrs {
            println!("  {ip}");
        }
        return Ok(());
    }

    let mut all_valid = true;
    for addr in &args.addrs {
        let kind = classify(addr);
        all_valid &= kind != "invalid";
        println!("{addr}: {kind}");
    }
    if all_valid {
        Ok(())
    } else {
        std::process::exit(1)
    }
}

/// Prints the local host entry, or validates the given addresses.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Addresses to validate; without any the local host entry is printed
    addrs: Vec<String>,
}
