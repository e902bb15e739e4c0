//! Compiler configuration
//!
//! Collects the switches of the command-line driver. Library entry points take a
//! [`CompilerConfig`] so tests and embedders can drive the same paths without the CLI.

use std::path::{Path, PathBuf};

/// File name of the bytecode module artifact
pub const WASM_FILE_NAME: &str = "int_calc.wasm";

/// File name of the native code artifact
pub const X64_FILE_NAME: &str = "int_calc.bin";

pub const LOG_FILE_NAME: &str = "intcalc.log";

/// Longest source accepted on the command line
pub const SOURCE_ARG_MAX: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Directory artifacts and the log file are written to
    pub output_dir: PathBuf,
    pub log_to_file: bool,
    /// No messages at all
    pub quiet: bool,
    /// Master switch for artifacts; when cleared, only the explicitly requested ones are written
    pub write_files: bool,
    pub write_wasm: bool,
    pub write_x64: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            log_to_file: false,
            quiet: false,
            write_files: true,
            write_wasm: false,
            write_x64: false,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that writes nothing to disk
    pub fn in_memory() -> Self {
        Self::default().with_write_files(false)
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_log_to_file(mut self, enabled: bool) -> Self {
        self.log_to_file = enabled;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_write_files(mut self, enabled: bool) -> Self {
        self.write_files = enabled;
        self
    }

    pub fn with_write_wasm(mut self, enabled: bool) -> Self {
        self.write_wasm = enabled;
        self
    }

    pub fn with_write_x64(mut self, enabled: bool) -> Self {
        self.write_x64 = enabled;
        self
    }

    pub fn wants_wasm(&self) -> bool {
        self.write_files || self.write_wasm
    }

    pub fn wants_x64(&self) -> bool {
        self.write_files || self.write_x64
    }

    /// Paths of the module and native code artifacts, in that order
    pub fn artifact_paths(&self) -> (PathBuf, PathBuf) {
        (
            self.output_dir.join(WASM_FILE_NAME),
            self.output_dir.join(X64_FILE_NAME),
        )
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join(LOG_FILE_NAME)
    }
}

/// Directory holding the running executable, falling back to the current directory
pub fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_writes_both_artifacts() {
        let config = CompilerConfig::default();
        assert!(config.wants_wasm());
        assert!(config.wants_x64());
        let (wasm, x64) = config.artifact_paths();
        assert_eq!(wasm, Path::new(".").join("int_calc.wasm"));
        assert_eq!(x64, Path::new(".").join("int_calc.bin"));
    }

    #[test]
    fn test_no_files_keeps_explicit_requests() {
        let config = CompilerConfig::in_memory();
        assert!(!config.wants_wasm());
        assert!(!config.wants_x64());

        let config = CompilerConfig::in_memory().with_write_x64(true);
        assert!(!config.wants_wasm());
        assert!(config.wants_x64());
    }

    #[test]
    fn test_builder_sets_paths() {
        let config = CompilerConfig::new()
            .with_output_dir("/tmp/out")
            .with_quiet(true)
            .with_log_to_file(true);
        assert!(config.quiet);
        assert_eq!(config.log_path(), Path::new("/tmp/out/intcalc.log"));
        assert_eq!(config.artifact_paths().1, Path::new("/tmp/out/int_calc.bin"));
    }
}
