//! End-to-end pipeline and JIT execution
//!
//! source text → tokens → parse tree → resolved program → bytecode module → decoded
//! routine → native code → result. The module always goes back through the generic
//! decoder, so a hand-authored module and a compiled one run the same way.

pub mod executor;

pub use executor::execute_module;

use crate::codegen::x86_64::compile_routine;
use crate::config::CompilerConfig;
use crate::error::Result;
use crate::parser::{Parser, resolve, tokenize};
use crate::wasm::origin::origin_module;
use crate::wasm::{ROUTINE_EXPORT_NAME, WasmModule, decode_module, encode_program};
use std::path::{Path, PathBuf};

/// Where the pipeline writes its intermediate artifacts, if anywhere
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSink {
    wasm: Option<PathBuf>,
    x64: Option<PathBuf>,
}

impl ArtifactSink {
    pub fn from_config(config: &CompilerConfig) -> Self {
        let (wasm, x64) = config.artifact_paths();
        Self {
            wasm: config.wants_wasm().then_some(wasm),
            x64: config.wants_x64().then_some(x64),
        }
    }

    pub fn wasm_path(&self) -> Option<&Path> {
        self.wasm.as_deref()
    }

    pub fn x64_path(&self) -> Option<&Path> {
        self.x64.as_deref()
    }

    pub fn write_wasm(&self, bytes: &[u8]) -> Result<()> {
        write_artifact(self.wasm.as_deref(), "bytecode module", bytes)
    }

    pub fn write_x64(&self, bytes: &[u8]) -> Result<()> {
        write_artifact(self.x64.as_deref(), "native code", bytes)
    }

    /// [`write_wasm`](Self::write_wasm), logging a failure instead of returning it
    pub fn persist_wasm(&self, bytes: &[u8]) {
        warn_unwritten(self.write_wasm(bytes), self.wasm_path());
    }

    /// [`write_x64`](Self::write_x64), logging a failure instead of returning it
    pub fn persist_x64(&self, bytes: &[u8]) {
        warn_unwritten(self.write_x64(bytes), self.x64_path());
    }
}

// Artifacts never decide the outcome of a run.
fn warn_unwritten(result: Result<()>, path: Option<&Path>) {
    if let (Err(e), Some(path)) = (result, path) {
        tracing::warn!(path = %path.display(), "artifact not written: {}", e);
    }
}

fn write_artifact(path: Option<&Path>, what: &str, bytes: &[u8]) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    std::fs::write(path, bytes)?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "wrote {}", what);
    Ok(())
}

/// Lex, parse, resolve and encode `source`
pub fn compile_source(source: &str) -> Result<WasmModule> {
    let tokens = tokenize(source)?;
    tracing::debug!(tokens = tokens.len(), "tokenized source");
    let tree = Parser::new(tokens).parse_program()?;
    let program = resolve(tree)?;
    tracing::debug!(var_count = program.var_count, "resolved program");
    encode_program(&program)
}

/// Native code for the routine exported by `bytes`, without running it
pub fn lower_module(bytes: &[u8]) -> Result<Vec<u8>> {
    let decoded = decode_module(bytes)?;
    let routine = decoded.locate_routine(ROUTINE_EXPORT_NAME)?;
    Ok(compile_routine(&routine.body)?)
}

fn run_module(module: &WasmModule, config: &CompilerConfig) -> Result<i32> {
    let artifacts = ArtifactSink::from_config(config);
    artifacts.persist_wasm(module.content());
    execute_module(module.content(), Some(&artifacts))
}

/// Compile and run `source`
pub fn run_source(source: &str, config: &CompilerConfig) -> Result<i32> {
    let module = compile_source(source)?;
    run_module(&module, config)
}

/// Run the built-in hand-authored module
pub fn run_origin(config: &CompilerConfig) -> Result<i32> {
    let module = origin_module()?;
    run_module(&module, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileError;
    use crate::parser::ParseError;

    #[test]
    fn test_compile_source_reports_frontend_errors() {
        let err = compile_source("int32_t a = b;\n").unwrap_err();
        assert!(matches!(
            err,
            CompileError::Parse(ParseError::UndefinedSymbol { .. })
        ));
        assert_eq!(err.to_string(), "use undefined symbol(b)");
        assert!(!err.is_internal());
    }

    #[test]
    fn test_lower_module_without_running() {
        let module = compile_source("int32_t value1 = 1 + 2;\n").unwrap();
        let code = lower_module(module.content()).unwrap();
        assert_eq!(code.first(), Some(&0x55));
        assert_eq!(code.last(), Some(&0xc3));
    }

    #[test]
    fn test_artifact_sink_honours_switches() {
        let sink = ArtifactSink::from_config(&CompilerConfig::in_memory());
        assert!(sink.wasm_path().is_none());
        assert!(sink.x64_path().is_none());
        sink.write_wasm(&[1, 2, 3]).unwrap();

        let config = CompilerConfig::in_memory()
            .with_output_dir("out")
            .with_write_wasm(true);
        let sink = ArtifactSink::from_config(&config);
        assert_eq!(sink.wasm_path(), Some(Path::new("out/int_calc.wasm")));
        assert!(sink.x64_path().is_none());
    }

    #[test]
    fn test_persist_tolerates_unwritable_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = CompilerConfig::new().with_output_dir(dir.path().join("missing"));
        let sink = ArtifactSink::from_config(&config);
        assert!(sink.write_wasm(&[1]).is_err());
        sink.persist_wasm(&[1]);
        sink.persist_x64(&[0xc3]);
        assert!(!dir.path().join("missing").exists());
    }
}
