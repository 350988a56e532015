use std::path::{Path, PathBuf};
use std::process::Command;

use crate::cmdline::CompilerCmd;
use crate::errors::*;
use crate::protocol::IncludeEntry;
use crate::util::combined_output;

/// Result of the preprocessing stage: the bytes to ship, the command the
/// remote compile should run, and (for the scanning variant) the include
/// manifest accompanying unexpanded source.
pub struct Preprocessed {
    pub code: Vec<u8>,
    pub cmd: CompilerCmd,
    pub includes: Vec<IncludeEntry>,
    /// Diagnostics printed while preprocessing, empty for variants that do
    /// not run the compiler.
    pub output: String,
}

pub trait Preprocessor {
    fn preprocess(&self, cmd: &CompilerCmd) -> Result<Preprocessed>;
}

/// Runs the real preprocessor as a subprocess and ships expanded source.
pub struct LocalPreprocessor {
    cxx_path: String,
    work_dir: Option<PathBuf>,
}

impl LocalPreprocessor {
    pub fn new(cxx_path: String) -> LocalPreprocessor {
        LocalPreprocessor {
            cxx_path,
            work_dir: None,
        }
    }

    /// Server-side form: run in a caller-chosen directory so relative paths
    /// resolve as they would have on the requesting host.
    pub fn in_dir(cxx_path: String, dir: &Path) -> LocalPreprocessor {
        LocalPreprocessor {
            cxx_path,
            work_dir: Some(dir.to_path_buf()),
        }
    }
}

impl Preprocessor for LocalPreprocessor {
    fn preprocess(&self, basecmd: &CompilerCmd) -> Result<Preprocessed> {
        let mut precmd = basecmd.clone();
        let mut retcmd = basecmd.clone();
        precmd.strip_compiler();
        precmd.set_preprocessor_only();
        // -E writes to stdout, and the remote compile must not inherit a
        // client-side output path
        precmd.remove_output();

        let mut command = Command::new(&self.cxx_path);
        command.args(precmd.tokens());
        if let Some(ref dir) = self.work_dir {
            command.current_dir(dir);
        }
        trace!("preprocess: {} {}", self.cxx_path, precmd.command());
        let result = command
            .output()
            .chain_err(|| format!("failed to run preprocessor: {}", self.cxx_path))?;
        if !result.status.success() {
            let output = combined_output(&result);
            debug!("preprocess failed: {}", output);
            bail!(ErrorKind::PreprocessFailed(output));
        }

        // the dep file was produced here as a side effect, so the compile
        // command shipped onward must not mention the client-side path
        retcmd.remove_dep_file();
        Ok(Preprocessed {
            code: result.stdout,
            cmd: retcmd,
            includes: Vec::new(),
            output: String::from_utf8_lossy(&result.stderr).into_owned(),
        })
    }
}
