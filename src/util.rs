use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use crate::errors::*;

/// Interleave-free merge of a subprocess's stdout and stderr, the form
/// diagnostics travel in over the wire.
pub fn combined_output(output: &process::Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

/// Resolve a path against the process working directory without touching
/// the filesystem. `None` only when the working directory is unavailable.
pub fn absolute_path(path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        Some(path.to_path_buf())
    } else {
        env::current_dir().ok().map(|cwd| cwd.join(path))
    }
}

/// Write `data` to `path`, creating any missing parent directories.
pub fn write_file_create_path(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .chain_err(|| format!("failed to create directory {}", parent.display()))?;
    }
    fs::write(path, data).chain_err(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Replace every occurrence of `needle` in `haystack`. Bytes outside the
/// matches are untouched.
pub fn replace_all_bytes(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    if needle.is_empty() {
        return haystack.to_vec();
    }
    let mut out = Vec::with_capacity(haystack.len());
    let mut at = 0;
    while at < haystack.len() {
        if haystack[at..].starts_with(needle) {
            out.extend_from_slice(replacement);
            at += needle.len();
        } else {
            out.push(haystack[at]);
            at += 1;
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_write_file_create_path() {
        let dir = TempDir::new("xcdistcc_util").unwrap();
        let target = dir.path().join("a/b/c.o");
        write_file_create_path(&target, b"object bytes").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"object bytes");
    }

    #[test]
    fn test_replace_all_bytes() {
        assert_eq!(
            replace_all_bytes(b"/tmp/xc1/a.cpp: /tmp/xc1/a.cpp", b"/tmp/xc1/a.cpp", b"/src/a.cpp"),
            b"/src/a.cpp: /src/a.cpp".to_vec()
        );
        assert_eq!(replace_all_bytes(b"abc", b"zz", b"q"), b"abc".to_vec());
        assert_eq!(replace_all_bytes(b"aaa", b"aa", b"b"), b"ba".to_vec());
        assert_eq!(replace_all_bytes(b"abc", b"", b"q"), b"abc".to_vec());
    }
}
