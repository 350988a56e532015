#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod client;
pub mod cmdline;
pub mod crypto;
pub mod errors;
pub mod protocol;
pub mod rpc;
pub mod server;
pub mod util;

/// Port a worker daemon listens on when the configured address omits one.
pub const DEFAULT_LISTEN_PORT: u16 = 3896;

/// Default bind address for the worker daemon.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:3896";

/// C++ compiler invoked for preprocess and compile jobs unless overridden by
/// configuration. This is the Xcode default toolchain location.
pub const DEFAULT_CXX: &str =
    "/Applications/Xcode.app/Contents/Developer/Toolchains/XcodeDefault.xctoolchain/usr/bin/c++";
