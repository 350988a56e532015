//! Token-level model of a compiler invocation.
//!
//! Build drivers emit commands whose global token order matters (macro
//! precedence, link order), so every edit here is local: targeted switches
//! are removed in place and re-added at the tail, and all other tokens pass
//! through untouched.

use std::env;
use std::path::{Path, PathBuf};

use crate::errors::*;
use crate::util::absolute_path;

const INPUT_SWITCH: &str = "-c";
const OUTPUT_SWITCH: &str = "-o";
const DEP_SWITCH: &str = "-MF";
const ARCH_SWITCH: &str = "-arch";

/// Include-dir switches, each accepted in joined (`-Ifoo`) and separated
/// (`-I foo`) form.
const INCLUDE_SWITCHES: &[&str] = &["-I", "-isystem"];

fn canonical_arch(arch: &str) -> &str {
    match arch {
        "amd64" => "x86_64",
        other => other,
    }
}

fn abs_dir(path: &str) -> Option<PathBuf> {
    absolute_path(Path::new(path))
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompilerCmd {
    toks: Vec<String>,
}

impl CompilerCmd {
    pub fn new(cmd: &str) -> CompilerCmd {
        CompilerCmd {
            toks: cmd.split(' ').map(String::from).collect(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.toks
    }

    pub fn command(&self) -> String {
        self.toks.join(" ")
    }

    /// First occurrence wins when a switch is repeated.
    fn switch_with_arg(&self, name: &str) -> Result<&str> {
        for (index, tok) in self.toks.iter().enumerate() {
            if tok == name && index + 1 < self.toks.len() {
                return Ok(&self.toks[index + 1]);
            }
        }
        Err(ErrorKind::MissingSwitch(name.to_string()).into())
    }

    fn add_switch_with_arg(&mut self, name: &str, arg: &str) {
        self.toks.push(name.to_string());
        self.toks.push(arg.to_string());
    }

    /// Removing an absent switch is a no-op.
    fn remove_switch(&mut self, name: &str, has_arg: bool) {
        if let Some(index) = self.toks.iter().position(|t| t == name) {
            let stride = if has_arg { 2 } else { 1 };
            let end = (index + stride).min(self.toks.len());
            self.toks.drain(index..end);
        }
    }

    pub fn input(&self) -> Result<String> {
        self.switch_with_arg(INPUT_SWITCH)
            .map(String::from)
            .chain_err(|| "no input filepath switch")
    }

    pub fn output(&self) -> Result<String> {
        self.switch_with_arg(OUTPUT_SWITCH)
            .map(String::from)
            .chain_err(|| "no output filepath switch")
    }

    pub fn dep_file(&self) -> Result<String> {
        self.switch_with_arg(DEP_SWITCH)
            .map(String::from)
            .chain_err(|| "no dep filepath switch")
    }

    pub fn set_input(&mut self, path: &str) {
        self.remove_switch(INPUT_SWITCH, true);
        self.add_switch_with_arg(INPUT_SWITCH, path);
    }

    pub fn set_output(&mut self, path: &str) {
        self.remove_switch(OUTPUT_SWITCH, true);
        self.add_switch_with_arg(OUTPUT_SWITCH, path);
    }

    pub fn set_dep_file(&mut self, path: &str) {
        self.remove_switch(DEP_SWITCH, true);
        self.add_switch_with_arg(DEP_SWITCH, path);
    }

    pub fn remove_input(&mut self) {
        self.remove_switch(INPUT_SWITCH, true);
    }

    pub fn remove_output(&mut self) {
        self.remove_switch(OUTPUT_SWITCH, true);
    }

    pub fn remove_dep_file(&mut self) {
        self.remove_switch(DEP_SWITCH, true);
    }

    pub fn set_arch(&mut self, arch: &str) {
        let arch = canonical_arch(arch).to_string();
        self.remove_switch(ARCH_SWITCH, true);
        self.add_switch_with_arg(ARCH_SWITCH, &arch);
    }

    /// Target architecture, defaulting to the host's when not specified.
    pub fn arch(&self) -> String {
        match self.switch_with_arg(ARCH_SWITCH) {
            Ok(arch) => arch.to_string(),
            Err(_) => env::consts::ARCH.to_string(),
        }
    }

    pub fn set_preprocessor_only(&mut self) {
        self.toks.push("-E".to_string());
    }

    /// Drop the head token (the compiler executable path).
    pub fn strip_compiler(&mut self) {
        if !self.toks.is_empty() {
            self.toks.remove(0);
        }
    }

    pub fn add_include_dir(&mut self, dir: &str) {
        self.add_switch_with_arg("-I", dir);
    }

    /// Absolute include search directories, in command order. Tokens that
    /// cannot be resolved are skipped.
    pub fn include_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        let mut index = 0;
        while index < self.toks.len() {
            if let Some((dir, consumed)) = self.include_dir_at(index) {
                if let Some(abs) = abs_dir(&dir) {
                    dirs.push(abs);
                }
                index += consumed;
            } else {
                index += 1;
            }
        }
        dirs
    }

    /// Rewrite every include-dir token so its path lives under `base`, an
    /// absolute sandbox prefix. The joined/separated form of each token is
    /// preserved.
    pub fn localize_include_dirs(&mut self, base: &str) {
        let mut index = 0;
        while index < self.toks.len() {
            match self.include_dir_at(index) {
                Some((dir, 2)) => {
                    if let Some(abs) = abs_dir(&dir) {
                        self.toks[index + 1] = format!("{}{}", base, abs.display());
                    }
                    index += 2;
                }
                Some((dir, _)) => {
                    if let Some(abs) = abs_dir(&dir) {
                        let switch_len = self.toks[index].len() - dir.len();
                        let switch = self.toks[index][..switch_len].to_string();
                        self.toks[index] = format!("{}{}{}", switch, base, abs.display());
                    }
                    index += 1;
                }
                None => index += 1,
            }
        }
    }

    /// An include-dir path starting at token `index`, along with the number
    /// of tokens it spans (2 for the separated form, 1 for the joined form).
    fn include_dir_at(&self, index: usize) -> Option<(String, usize)> {
        let tok = &self.toks[index];
        for switch in INCLUDE_SWITCHES {
            if tok == switch {
                if index + 1 < self.toks.len() {
                    return Some((self.toks[index + 1].clone(), 2));
                }
                return None;
            }
            if tok.starts_with(switch) && tok.len() > switch.len() {
                return Some((tok[switch.len()..].to_string(), 1));
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_switch_roundtrip() {
        let mut cmd = CompilerCmd::new("cc -arch arm64 -c a.cpp -o a.o");
        assert_eq!(cmd.input().unwrap(), "a.cpp");
        assert_eq!(cmd.output().unwrap(), "a.o");
        assert!(cmd.dep_file().is_err());

        cmd.set_input("b.cpp");
        assert_eq!(cmd.input().unwrap(), "b.cpp");
        cmd.set_dep_file("b.d");
        assert_eq!(cmd.dep_file().unwrap(), "b.d");

        // repeated set leaves exactly one occurrence
        cmd.set_input("c.cpp");
        assert_eq!(
            cmd.tokens().iter().filter(|t| *t == "-c").count(),
            1,
            "{}",
            cmd.command()
        );

        cmd.remove_input();
        assert!(cmd.input().is_err());
        cmd.remove_input(); // removing an absent switch is a no-op
        assert!(cmd.input().is_err());
    }

    #[test]
    fn test_untargeted_tokens_preserved() {
        let mut cmd = CompilerCmd::new("cc -Wall -O2 -c a.cpp -std=c++17 -o a.o");
        cmd.set_output("b.o");
        let toks = cmd.tokens();
        let wall = toks.iter().position(|t| t == "-Wall").unwrap();
        let o2 = toks.iter().position(|t| t == "-O2").unwrap();
        let std = toks.iter().position(|t| t == "-std=c++17").unwrap();
        assert!(wall < o2 && o2 < std);
    }

    #[test]
    fn test_clone_independent() {
        let cmd = CompilerCmd::new("cc -c a.cpp");
        let mut copy = cmd.clone();
        assert_eq!(copy.tokens(), cmd.tokens());
        copy.set_input("b.cpp");
        assert_eq!(cmd.input().unwrap(), "a.cpp");
    }

    #[test]
    fn test_arch_canonicalization() {
        let mut cmd = CompilerCmd::new("cc -c a.cpp");
        cmd.set_arch("amd64");
        assert_eq!(cmd.arch(), "x86_64");
        cmd.set_arch("arm64");
        assert_eq!(cmd.arch(), "arm64");
        assert_eq!(
            cmd.tokens().iter().filter(|t| *t == "-arch").count(),
            1
        );
    }

    #[test]
    fn test_arch_defaults_to_host() {
        let cmd = CompilerCmd::new("cc -c a.cpp");
        assert_eq!(cmd.arch(), env::consts::ARCH);
    }

    #[test]
    fn test_strip_compiler() {
        let mut cmd = CompilerCmd::new("cc -c a.cpp");
        cmd.strip_compiler();
        assert_eq!(cmd.command(), "-c a.cpp");
    }

    #[test]
    fn test_preprocessor_only_appends() {
        let mut cmd = CompilerCmd::new("cc -c a.cpp");
        cmd.set_preprocessor_only();
        assert_eq!(cmd.tokens().last().unwrap(), "-E");
    }

    #[test]
    fn test_include_dirs_all_forms() {
        let cmd = CompilerCmd::new("cc -I /a -I/b -isystem /c -isystem/d -c x.cpp");
        let dirs = cmd.include_dirs();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/a"),
                PathBuf::from("/b"),
                PathBuf::from("/c"),
                PathBuf::from("/d"),
            ]
        );
    }

    #[test]
    fn test_include_dirs_relative_resolved() {
        let cmd = CompilerCmd::new("cc -I sub -c x.cpp");
        let dirs = cmd.include_dirs();
        assert_eq!(dirs.len(), 1);
        assert!(dirs[0].is_absolute());
        assert!(dirs[0].ends_with("sub"));
    }

    #[test]
    fn test_localize_include_dirs() {
        let mut cmd = CompilerCmd::new("cc -I /usr/include -isystem/opt/inc -c x.cpp");
        cmd.localize_include_dirs("/tmp/xcABC");
        assert_eq!(
            cmd.command(),
            "cc -I /tmp/xcABC/usr/include -isystem/tmp/xcABC/opt/inc -c x.cpp"
        );
    }

    #[test]
    fn test_add_include_dir_appends() {
        let mut cmd = CompilerCmd::new("cc -c x.cpp");
        cmd.add_include_dir("/src/headers");
        assert_eq!(cmd.command(), "cc -c x.cpp -I /src/headers");
    }
}
