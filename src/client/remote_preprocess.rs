use std::env;
use std::path::Path;
use std::sync::Arc;

use crate::cmdline::CompilerCmd;
use crate::errors::*;
use crate::protocol::{PreprocessRequest, PreprocessResponse, METHOD_PREPROCESS};
use crate::util::write_file_create_path;

use super::preprocess::{Preprocessed, Preprocessor};
use super::select::RemoteSelector;
use super::dial_remote;

/// Delegates preprocessing to a capable remote, falling back to a local
/// variant on any failure.
pub struct RemotePreprocessor {
    selector: Arc<dyn RemoteSelector>,
    fallback: Box<dyn Preprocessor>,
}

impl RemotePreprocessor {
    pub fn new(
        selector: Arc<dyn RemoteSelector>,
        fallback: Box<dyn Preprocessor>,
    ) -> RemotePreprocessor {
        RemotePreprocessor { selector, fallback }
    }

    fn preprocess_remote(&self, cmd: &CompilerCmd) -> Result<Preprocessed> {
        let remote = self.selector.remote_with_preprocessor()?;
        let mut conn = dial_remote(&remote)?;
        let cwd = env::current_dir().chain_err(|| "failed to get working directory")?;
        let resp: PreprocessResponse = conn.call(
            METHOD_PREPROCESS,
            &PreprocessRequest {
                dir: cwd.display().to_string(),
                command: cmd.command(),
            },
        )?;
        if let Ok(dep_path) = cmd.dep_file() {
            write_file_create_path(Path::new(&dep_path), &resp.dep)
                .chain_err(|| "failed to write dep file")?;
        }
        let mut retcmd = cmd.clone();
        retcmd.remove_dep_file();
        Ok(Preprocessed {
            code: resp.code,
            cmd: retcmd,
            includes: Vec::new(),
            output: resp.output,
        })
    }
}

impl Preprocessor for RemotePreprocessor {
    fn preprocess(&self, cmd: &CompilerCmd) -> Result<Preprocessed> {
        match self.preprocess_remote(cmd) {
            Ok(result) => Ok(result),
            Err(err) => {
                debug!(
                    "remote preprocess failed, using fallback: {}",
                    error_string(&err)
                );
                self.fallback.preprocess(cmd)
            }
        }
    }
}
