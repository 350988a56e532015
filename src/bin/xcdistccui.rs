//! Fleet status poller: probes every configured remote over the status RPC
//! on a fixed interval and renders worker slots and queue contents.

use std::process;
use std::thread;
use std::time::Duration;

use xcdistcc::client::{config, remote_status, Remote};
use xcdistcc::errors::error_string;
use xcdistcc::protocol::StatusResponse;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

fn main() {
    let config = match config::load_config_file() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("xcdistccui: {}", error_string(&err));
            process::exit(3);
        }
    };
    let remotes: Vec<Remote> = match config
        .remotes
        .iter()
        .map(|remote| remote.to_remote())
        .collect()
    {
        Ok(remotes) => remotes,
        Err(err) => {
            eprintln!("xcdistccui: {}", error_string(&err));
            process::exit(3);
        }
    };

    loop {
        for remote in &remotes {
            match remote_status(remote) {
                Ok(status) => render(remote, &status),
                Err(err) => println!("{}: unreachable: {}", remote.address, error_string(&err)),
            }
        }
        println!();
        thread::sleep(POLL_INTERVAL);
    }
}

fn render(remote: &Remote, status: &StatusResponse) {
    println!(
        "{}: {} workers, {} queued",
        remote.address,
        status.num_workers,
        status.queued.len()
    );
    for worker in &status.workers {
        match &worker.job {
            Some(job) => println!(
                "  worker {}: {} ({}) from {}",
                worker.id, job.filename, job.mode, job.source_address
            ),
            None => println!("  worker {}: idle", worker.id),
        }
    }
    for job in &status.queued {
        println!(
            "  queued: {} ({}) from {}",
            job.filename, job.mode, job.source_address
        );
    }
}
