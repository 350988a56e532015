//! Worker daemon entry point.

use std::env;
use std::process;
use std::sync::Arc;

use clap::{App, Arg};
use log::info;

use xcdistcc::crypto::KeyPair;
use xcdistcc::errors::*;
use xcdistcc::server::{Builder, Listener, Runner};
use xcdistcc::{DEFAULT_CXX, DEFAULT_LISTEN_ADDRESS};

fn env_or(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

fn keypair_from_env() -> Result<Option<KeyPair>> {
    let public = env::var("XCDISTCCD_PUBLICKEY").unwrap_or_default();
    let private = env::var("XCDISTCCD_PRIVATEKEY").unwrap_or_default();
    match (public.is_empty(), private.is_empty()) {
        (true, true) => Ok(None),
        (false, false) => Ok(Some(KeyPair::from_hex(&private, &public)?)),
        _ => Err("XCDISTCCD_PUBLICKEY and XCDISTCCD_PRIVATEKEY must both be set".into()),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("xcdistccd: {}", error_string(&err));
        process::exit(3);
    }
}

fn run() -> Result<()> {
    let default_address = env_or("XCDISTCCD_ADDRESS", DEFAULT_LISTEN_ADDRESS);
    let default_workers = env_or("XCDISTCCD_MAXWORKERS", "5");
    let default_queue_size = env_or("XCDISTCCD_MAXQUEUESIZE", "500");
    let default_cxx = env_or("XCDISTCCD_CXXPATH", DEFAULT_CXX);

    let matches = App::new("xcdistccd")
        .about("xcdistcc compile worker daemon")
        .arg(
            Arg::with_name("address")
                .long("address")
                .takes_value(true)
                .default_value(&default_address)
                .help("listen address (XCDISTCCD_ADDRESS env)"),
        )
        .arg(
            Arg::with_name("max-workers")
                .long("max-workers")
                .takes_value(true)
                .default_value(&default_workers)
                .help("max compile workers (XCDISTCCD_MAXWORKERS env)"),
        )
        .arg(
            Arg::with_name("max-queue-size")
                .long("max-queue-size")
                .takes_value(true)
                .default_value(&default_queue_size)
                .help("max compile queue size (XCDISTCCD_MAXQUEUESIZE env)"),
        )
        .arg(
            Arg::with_name("cxx-path")
                .long("cxx-path")
                .takes_value(true)
                .default_value(&default_cxx)
                .help("c++ compiler path (XCDISTCCD_CXXPATH env)"),
        )
        .get_matches();

    let address = matches.value_of("address").unwrap().to_string();
    let max_workers: usize = matches
        .value_of("max-workers")
        .unwrap()
        .parse()
        .chain_err(|| "invalid max-workers")?;
    let max_queue_size: usize = matches
        .value_of("max-queue-size")
        .unwrap()
        .parse()
        .chain_err(|| "invalid max-queue-size")?;
    let cxx_path = matches.value_of("cxx-path").unwrap().to_string();
    let keypair = keypair_from_env()?;
    if keypair.is_some() {
        info!("frame encryption enabled");
    }

    let runner = Arc::new(Runner::new(
        max_workers,
        max_queue_size,
        Builder::new(cxx_path),
    )?);
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .chain_err(|| "failed to install signal handler")?;

    Listener::new(runner, &address, keypair, shutdown_rx).run()
}
