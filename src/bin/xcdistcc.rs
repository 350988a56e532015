//! Client entry point. The entire argv tail is the intercepted compiler
//! invocation; exit status 3 signals any failure back to the build driver.

use std::env;
use std::process;

use xcdistcc::client::config;
use xcdistcc::client::dispatch::Dispatcher;
use xcdistcc::errors::error_string;

fn main() {
    process::exit(run());
}

fn run() -> i32 {
    if let Err(err) = config::init_logging() {
        eprintln!("xcdistcc: {}", error_string(&err));
        return 3;
    }
    let config = match config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("xcdistcc: {}", error_string(&err));
            return 3;
        }
    };
    let command = env::args().skip(1).collect::<Vec<String>>().join(" ");
    match Dispatcher::new(config).run(&command) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{}", error_string(&err));
            3
        }
    }
}
