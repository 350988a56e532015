//! Executes jobs in an isolated per-job sandbox.
//!
//! A compile job stages the shipped translation unit (and any include
//! manifest) into a fresh temp directory, retargets the command's paths at
//! the sandbox, runs the compiler, and harvests the object file and the
//! dependency manifest. Dependency paths are repaired before they leave the
//! sandbox so the recorded paths are valid on the originating host.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempdir::TempDir;

use crate::client::preprocess::{LocalPreprocessor, Preprocessor};
use crate::cmdline::CompilerCmd;
use crate::errors::*;
use crate::protocol::{CompileResponse, IncludeEntry, PreprocessResponse};
use crate::util::{combined_output, replace_all_bytes, write_file_create_path};

pub struct Builder {
    cxx_path: String,
}

fn base_name(path: &str) -> Result<String> {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .map(String::from)
        .ok_or_else(|| Error::from(format!("invalid filename: {}", path)))
}

impl Builder {
    pub fn new(cxx_path: String) -> Builder {
        Builder { cxx_path }
    }

    pub fn compile(
        &self,
        code: &[u8],
        cmd: &CompilerCmd,
        includes: &[IncludeEntry],
    ) -> Result<CompileResponse> {
        let sandbox = TempDir::new("xc").chain_err(|| "failed to create sandbox")?;
        let sandbox_path = sandbox.path().to_path_buf();
        let mut ccmd = cmd.clone();

        let input = cmd.input().chain_err(|| "compile command has no input")?;
        let sandbox_input = sandbox_path.join(base_name(&input)?);
        fs::write(&sandbox_input, code).chain_err(|| "failed to write input file")?;
        let sandbox_input = sandbox_input.display().to_string();
        ccmd.set_input(&sandbox_input);

        let output = cmd.output().chain_err(|| "compile command has no output")?;
        let sandbox_output = sandbox_path.join(base_name(&output)?);
        ccmd.set_output(&sandbox_output.display().to_string());

        let sandbox_dep = match cmd.dep_file() {
            Ok(dep) => {
                let sandbox_dep = sandbox_path.join(base_name(&dep)?);
                ccmd.set_dep_file(&sandbox_dep.display().to_string());
                Some(sandbox_dep)
            }
            Err(_) => None,
        };

        if !includes.is_empty() {
            let base = sandbox_path.display().to_string();
            for entry in includes {
                // entry paths are absolute, so concatenation stays inside
                // the sandbox
                let staged = PathBuf::from(format!("{}{}", base, entry.path));
                write_file_create_path(&staged, &entry.data)
                    .chain_err(|| format!("failed to stage include {}", entry.path))?;
            }
            ccmd.localize_include_dirs(&base);
        }

        ccmd.strip_compiler();
        trace!("compile: {} {}", self.cxx_path, ccmd.command());
        let result = Command::new(&self.cxx_path)
            .args(ccmd.tokens())
            .output()
            .chain_err(|| format!("failed to run compiler: {}", self.cxx_path))?;
        let output_text = combined_output(&result);
        if !result.status.success() {
            bail!(ErrorKind::CompileFailed(output_text));
        }

        let object = fs::read(&sandbox_output).chain_err(|| "failed to read object file")?;
        let dep = match sandbox_dep {
            Some(path) => {
                let raw = fs::read(&path).chain_err(|| "failed to read dep file")?;
                replace_all_bytes(&raw, sandbox_input.as_bytes(), input.as_bytes())
            }
            None => Vec::new(),
        };
        Ok(CompileResponse {
            output: output_text,
            object,
            dep,
        })
    }

    /// Run the preprocessing stage on behalf of a client, in the client's
    /// declared working directory so relative paths resolve identically.
    pub fn preprocess(&self, dir: &str, cmd: &CompilerCmd) -> Result<PreprocessResponse> {
        let preprocessor = LocalPreprocessor::in_dir(self.cxx_path.clone(), Path::new(dir));
        let result = preprocessor.preprocess(cmd)?;
        let dep = match cmd.dep_file() {
            Ok(dep_path) => {
                let dep_path = if Path::new(&dep_path).is_absolute() {
                    PathBuf::from(&dep_path)
                } else {
                    Path::new(dir).join(&dep_path)
                };
                fs::read(&dep_path)
                    .chain_err(|| format!("failed to read dep file {}", dep_path.display()))?
            }
            Err(_) => Vec::new(),
        };
        Ok(PreprocessResponse {
            output: result.output,
            code: result.code,
            dep,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    // Stand-in compiler: copies its -c input to the -o output, writes a
    // make-style dep file when -MF is given, and prints a note on stderr.
    const FAKE_CXX: &str = r#"#!/bin/sh
input=""; output=""; dep=""
while [ $# -gt 0 ]; do
    case "$1" in
        -c) input="$2"; shift 2 ;;
        -o) output="$2"; shift 2 ;;
        -MF) dep="$2"; shift 2 ;;
        *) shift ;;
    esac
done
[ -n "$input" ] || { echo "no input" >&2; exit 1; }
if grep -q REJECT "$input"; then
    echo "error: rejected translation unit" >&2
    exit 1
fi
cp "$input" "$output" || exit 1
if [ -n "$dep" ]; then
    printf '%s: %s\n' "$output" "$input" > "$dep"
fi
echo "note: fake compile of $input" >&2
exit 0
"#;

    fn fake_cxx(dir: &Path) -> String {
        let path = dir.join("fakecxx.sh");
        fs::write(&path, FAKE_CXX).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_compile_in_sandbox() {
        let dir = TempDir::new("xcdistcc_builder").unwrap();
        let builder = Builder::new(fake_cxx(dir.path()));
        let cmd = CompilerCmd::new("cc -c /src/proj/a.cpp -o /src/proj/a.o");
        let res = builder.compile(b"int main() {}", &cmd, &[]).unwrap();
        assert_eq!(res.object, b"int main() {}");
        assert!(res.dep.is_empty());
        assert!(res.output.contains("fake compile"));
    }

    #[test]
    fn test_dep_paths_repaired() {
        let dir = TempDir::new("xcdistcc_builder").unwrap();
        let builder = Builder::new(fake_cxx(dir.path()));
        let cmd =
            CompilerCmd::new("cc -c /src/proj/a.cpp -o /src/proj/a.o -MF /src/proj/a.d");
        let res = builder.compile(b"code", &cmd, &[]).unwrap();
        let dep = String::from_utf8(res.dep).unwrap();
        // the sandboxed input path is rewritten back to the client path
        assert!(dep.ends_with(": /src/proj/a.cpp\n"), "{}", dep);
        assert!(
            !dep.split_whitespace().any(|tok| tok.contains("/xc") && tok.ends_with("a.cpp")),
            "{}",
            dep
        );
    }

    #[test]
    fn test_includes_staged_and_localized() {
        let dir = TempDir::new("xcdistcc_builder").unwrap();
        let builder = Builder::new(fake_cxx(dir.path()));
        let cmd = CompilerCmd::new("cc -I /src/proj/headers -c /src/proj/a.cpp -o /src/proj/a.o");
        let includes = vec![IncludeEntry {
            path: "/src/proj/headers/a.h".to_string(),
            data: b"#pragma once".to_vec(),
        }];
        builder.compile(b"code", &cmd, &includes).unwrap();
        // the staged header is cleaned up with the sandbox
        assert!(!Path::new("/src/proj/headers/a.h").exists());
    }

    #[test]
    fn test_compile_failure_carries_output() {
        let dir = TempDir::new("xcdistcc_builder").unwrap();
        let builder = Builder::new(fake_cxx(dir.path()));
        let cmd = CompilerCmd::new("cc -c /src/a.cpp -o /src/a.o");
        match builder.compile(b"REJECT", &cmd, &[]) {
            Err(Error(ErrorKind::CompileFailed(output), _)) => {
                assert!(output.contains("rejected translation unit"), "{}", output)
            }
            Err(err) => panic!("unexpected error: {}", err),
            Ok(_) => panic!("expected failure"),
        }
    }
}
