//! Include-scanning preprocessor.
//!
//! Ships raw source plus a manifest of every header reachable through
//! `#include`/`#import` directives instead of paying for a full preprocess
//! on the client. Over-inclusion is harmless; includes hidden behind macro
//! conditionals can be missed, which surfaces later as a remote compile
//! error.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::cmdline::CompilerCmd;
use crate::errors::*;
use crate::protocol::IncludeEntry;
use crate::util::absolute_path;

use super::preprocess::{Preprocessed, Preprocessor};

lazy_static! {
    static ref INCLUDE_RE: Regex =
        Regex::new(r#"^\s*#\s*(?:include|import)\s*["<]([^">]+)[">]"#).unwrap();
}

pub struct IncludeScanner;

impl IncludeScanner {
    pub fn new() -> IncludeScanner {
        IncludeScanner
    }

    fn includes_in_file(path: &Path) -> Result<Vec<String>> {
        let raw = fs::read(path)?;
        let text = String::from_utf8_lossy(&raw);
        Ok(text
            .lines()
            .filter_map(|line| {
                INCLUDE_RE
                    .captures(line)
                    .map(|caps| caps[1].to_string())
            })
            .collect())
    }

    /// First existing candidate wins, searching `dirs` in order.
    fn locate_include(include: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
        dirs.iter()
            .map(|dir| dir.join(include))
            .find(|candidate| candidate.exists())
    }

    fn collect_includes(
        &self,
        path: &Path,
        include_dirs: &[PathBuf],
        found: &mut BTreeMap<String, IncludeEntry>,
    ) {
        trace!("collecting: {}", path.display());
        let includes = match Self::includes_in_file(path) {
            Ok(includes) => includes,
            Err(err) => {
                debug!(
                    "failed to scan {}: {}",
                    path.display(),
                    error_string(&err)
                );
                return;
            }
        };
        // the scanned file's own directory is searched ahead of the
        // command's include dirs
        let mut search = Vec::with_capacity(include_dirs.len() + 1);
        if let Some(parent) = path.parent() {
            search.push(parent.to_path_buf());
        }
        search.extend_from_slice(include_dirs);

        for include in includes {
            let located = match Self::locate_include(&include, &search) {
                Some(located) => located,
                None => {
                    debug!("failed to locate include: {}", include);
                    continue;
                }
            };
            let abspath = match absolute_path(&located) {
                Some(abspath) => abspath,
                None => continue,
            };
            let key = abspath.display().to_string();
            if found.contains_key(&key) {
                continue;
            }
            let data = match fs::read(&abspath) {
                Ok(data) => data,
                Err(err) => {
                    debug!("failed to read include {}: {}", key, err);
                    continue;
                }
            };
            found.insert(
                key.clone(),
                IncludeEntry {
                    path: key,
                    data,
                },
            );
            self.collect_includes(&abspath, include_dirs, found);
        }
    }
}

impl Preprocessor for IncludeScanner {
    fn preprocess(&self, cmd: &CompilerCmd) -> Result<Preprocessed> {
        let mut retcmd = cmd.clone();
        let include_dirs = cmd.include_dirs();
        let input = cmd.input().chain_err(|| "failed to get input path")?;
        let code = fs::read(&input).chain_err(|| "failed to read input file")?;

        let input_abs = absolute_path(Path::new(&input))
            .ok_or_else(|| Error::from("failed to resolve input path"))?;
        let mut found = BTreeMap::new();
        self.collect_includes(&input_abs, &include_dirs, &mut found);
        for key in found.keys() {
            debug!("include: {}", key);
        }

        // the remote compiles from expanded search roots, so the input's own
        // directory has to be an explicit include dir there
        if let Some(parent) = input_abs.parent() {
            retcmd.add_include_dir(&parent.display().to_string());
        }
        Ok(Preprocessed {
            code,
            cmd: retcmd,
            includes: found.into_iter().map(|(_key, entry)| entry).collect(),
            output: String::new(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_directive_pattern() {
        let caps = |line| {
            INCLUDE_RE
                .captures(line)
                .map(|c| c[1].to_string())
        };
        assert_eq!(caps("#include \"a.h\""), Some("a.h".to_string()));
        assert_eq!(caps("#include <sys/types.h>"), Some("sys/types.h".to_string()));
        assert_eq!(caps("  #  import \"b.h\""), Some("b.h".to_string()));
        assert_eq!(caps("// #include \"a.h\""), None);
        assert_eq!(caps("int include = 3;"), None);
    }

    #[test]
    fn test_transitive_scan_with_missing_header() {
        let dir = TempDir::new("xcdistcc_scan").unwrap();
        let headers = dir.path().join("headers");
        fs::create_dir(&headers).unwrap();
        write(&headers, "a.h", "#include \"c.h\"\n");
        write(&headers, "c.h", "int c();\n");
        // b.h intentionally absent
        let main = write(
            dir.path(),
            "main.cpp",
            "#include \"a.h\"\n#include \"b.h\"\nint main() {}\n",
        );

        let cmd = CompilerCmd::new(&format!(
            "cc -I {} -c {} -o main.o",
            headers.display(),
            main.display()
        ));
        let result = IncludeScanner::new().preprocess(&cmd).unwrap();

        let paths: Vec<&str> = result.includes.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.iter().any(|p| p.ends_with("/a.h")), "{:?}", paths);
        assert!(paths.iter().any(|p| p.ends_with("/c.h")), "{:?}", paths);
        assert!(!paths.iter().any(|p| p.ends_with("/b.h")), "{:?}", paths);
        assert!(paths.iter().all(|p| Path::new(p).is_absolute()));
        assert_eq!(result.code, fs::read(&main).unwrap());
        assert!(result.includes.iter().any(|e| e.data == b"int c();\n"));
    }

    #[test]
    fn test_sibling_header_found_via_own_directory() {
        let dir = TempDir::new("xcdistcc_scan").unwrap();
        write(dir.path(), "next_to_main.h", "int f();\n");
        let main = write(dir.path(), "main.cpp", "#include \"next_to_main.h\"\n");

        let cmd = CompilerCmd::new(&format!("cc -c {} -o main.o", main.display()));
        let result = IncludeScanner::new().preprocess(&cmd).unwrap();
        assert_eq!(result.includes.len(), 1);
        assert!(result.includes[0].path.ends_with("/next_to_main.h"));
    }

    #[test]
    fn test_input_directory_appended() {
        let dir = TempDir::new("xcdistcc_scan").unwrap();
        let main = write(dir.path(), "main.cpp", "int main() {}\n");
        let cmd = CompilerCmd::new(&format!("cc -c {} -o main.o -MF main.d", main.display()));
        let result = IncludeScanner::new().preprocess(&cmd).unwrap();
        let last_two = &result.cmd.tokens()[result.cmd.tokens().len() - 2..];
        assert_eq!(last_two[0], "-I");
        assert_eq!(last_two[1], dir.path().display().to_string());
        // dep switch, unlike the subprocess variant, is left alone
        assert_eq!(result.cmd.dep_file().unwrap(), "main.d");
    }
}
