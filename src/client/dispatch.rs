//! Drives one intercepted compiler invocation end to end: preprocess,
//! select a remote, ship the translation unit, write back the object and
//! dependency manifest the build driver expects.

use std::env;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use crate::cmdline::CompilerCmd;
use crate::errors::*;
use crate::protocol::{CompileRequest, CompileResponse, METHOD_COMPILE};
use crate::util::write_file_create_path;

use super::config::Config;
use super::dial_remote;
use super::preprocess::Preprocessor;
use super::select::RemoteSelector;

pub struct Dispatcher {
    selector: Arc<dyn RemoteSelector>,
    preprocessor: Box<dyn Preprocessor>,
}

impl Dispatcher {
    pub fn new(config: Config) -> Dispatcher {
        Dispatcher {
            selector: config.selector,
            preprocessor: config.preprocessor,
        }
    }

    pub fn run(&self, cmdline: &str) -> Result<()> {
        let mut cmd = CompilerCmd::new(cmdline);
        cmd.set_arch(env::consts::ARCH);
        let output_path = cmd.output().chain_err(|| "command has no output path")?;

        let preprocessed = self.preprocessor.preprocess(&cmd)?;
        debug!(
            "preprocessed: code: {} bytes, includes: {}",
            preprocessed.code.len(),
            preprocessed.includes.len()
        );

        let remote = self.selector.remote()?;
        debug!("selected remote: {}", remote.address);
        let mut conn = dial_remote(&remote)?;
        let resp: CompileResponse = conn.call(
            METHOD_COMPILE,
            &CompileRequest {
                command: preprocessed.cmd.command(),
                code: preprocessed.code,
                includes: preprocessed.includes,
            },
        )?;

        if let Ok(dep_path) = preprocessed.cmd.dep_file() {
            write_file_create_path(Path::new(&dep_path), &resp.dep)
                .chain_err(|| "failed to write dep file")?;
        }
        write_file_create_path(Path::new(&output_path), &resp.object)
            .chain_err(|| "failed to write object file")?;

        // compiler warnings pass through to the build driver untouched
        if !resp.output.is_empty() {
            let _ = io::stderr().write_all(resp.output.as_bytes());
        }
        Ok(())
    }
}
