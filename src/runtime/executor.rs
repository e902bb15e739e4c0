//! JIT execution of a bytecode module
//!
//! The routine is probed first so the code region can be mapped at its final size, then
//! emitted straight into the mapping, write-protected and called as `extern "C" fn() -> i32`.
//! The mapping is owned by an [`ExecutableMemory`] and released on every return path.

use super::ArtifactSink;
use crate::codegen::x86_64::{FramePlan, emit, probe};
use crate::error::Result;
use crate::wasm::opcode::disassemble;
use crate::wasm::{CodeBody, ROUTINE_EXPORT_NAME, decode_module};

/// Decode `bytes`, lower the exported routine and run it
pub fn execute_module(bytes: &[u8], artifacts: Option<&ArtifactSink>) -> Result<i32> {
    let decoded = decode_module(bytes)?;
    let routine = decoded.locate_routine(ROUTINE_EXPORT_NAME)?;
    if tracing::enabled!(tracing::Level::TRACE) {
        tracing::trace!("bytecode listing:\n{}", disassemble(routine.body.instructions)?);
    }

    let plan = probe(&routine.body)?;
    tracing::debug!(
        bytes = plan.total_size,
        stack_adjust = plan.stack_adjust(),
        "native routine planned"
    );
    run_planned(&routine.body, &plan, artifacts)
}

#[cfg(all(target_arch = "x86_64", unix))]
fn run_planned(
    body: &CodeBody<'_>,
    plan: &FramePlan,
    artifacts: Option<&ArtifactSink>,
) -> Result<i32> {
    use ras::{ExecutableMemory, SliceSink};

    let mut memory = ExecutableMemory::allocate_writable(plan.total_size)?;
    {
        let region = memory.as_mut_slice()?;
        let sink = emit(body, plan, SliceSink::new(&mut region[..plan.total_size]))?;
        if let Some(artifacts) = artifacts {
            artifacts.persist_x64(sink.written());
        }
    }
    memory.make_executable()?;

    // SAFETY: the region is executable and holds exactly the routine that `emit` verified
    // against the plan; it takes no arguments and returns its result in eax.
    let value = unsafe {
        let routine: unsafe extern "C" fn() -> i32 =
            std::mem::transmute(memory.as_function_ptr::<u8>());
        routine()
    };
    tracing::info!(value, "routine returned");
    Ok(value)
}

#[cfg(not(all(target_arch = "x86_64", unix)))]
fn run_planned(
    body: &CodeBody<'_>,
    plan: &FramePlan,
    artifacts: Option<&ArtifactSink>,
) -> Result<i32> {
    let code = emit(body, plan, Vec::with_capacity(plan.total_size))?;
    if let Some(artifacts) = artifacts {
        artifacts.persist_x64(&code);
    }
    Err(ras::RasError::UnsupportedTarget(format!(
        "generated x86-64 code cannot run on {}-{}",
        std::env::consts::ARCH,
        std::env::consts::OS
    ))
    .into())
}

#[cfg(all(test, target_arch = "x86_64", unix))]
mod tests {
    use super::*;
    use crate::wasm::origin::{ORIGIN_RESULT, origin_module};

    #[test]
    fn test_execute_origin_module() {
        let module = origin_module().unwrap();
        assert_eq!(execute_module(module.content(), None).unwrap(), ORIGIN_RESULT);
    }

    #[test]
    fn test_malformed_module_is_rejected_before_mapping() {
        let err = execute_module(&[0x00, 0x61, 0x73], None).unwrap_err();
        assert!(matches!(err, crate::error::CompileError::Decode(_)));
    }
}
