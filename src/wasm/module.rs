//! Module container and the fixed-shape sections.
//!
//! Every payload is written twice through the same writer: once into a [`CountingSink`]
//! to learn its length, then into a buffer allocated with exactly that capacity.

use super::{
    CODE_SECTION_ID, EXPORT_KIND_FUNCTION, EXPORT_KIND_MEMORY, EXPORT_SECTION_ID, FUNC_TYPE_FORM,
    FUNCREF_TYPE, FUNCTION_SECTION_ID, I32_TYPE, MEMORY_EXPORT_NAME, MEMORY_SECTION_ID,
    ROUTINE_EXPORT_NAME, TABLE_SECTION_ID, TYPE_SECTION_ID, WASM_MAGIC, WASM_VERSION,
    section_name,
};
use crate::error::{CompileError, Result};
use crate::leb128::write_uleb128_u32;
use ras::{ByteSink, CountingSink, RasError};

/// Run `write` against a counting sink, then into an exactly sized buffer
pub(crate) fn two_pass<F>(what: &str, mut write: F) -> Result<Vec<u8>>
where
    F: FnMut(&mut dyn ByteSink) -> Result<()>,
{
    let mut counter = CountingSink::new();
    write(&mut counter)?;
    let size = counter.count();

    let mut buffer = Vec::with_capacity(size);
    write(&mut buffer)?;
    if buffer.len() != size {
        return Err(CompileError::Internal(format!(
            "{} measured {} bytes but wrote {}",
            what,
            size,
            buffer.len()
        )));
    }
    Ok(buffer)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub id: u8,
    pub payload: Vec<u8>,
}

impl Section {
    pub fn new(id: u8, payload: Vec<u8>) -> Self {
        Self { id, payload }
    }

    pub fn name(&self) -> &'static str {
        section_name(self.id)
    }

    /// `[id][payload_len][payload]`
    pub fn write_to(&self, sink: &mut dyn ByteSink) -> std::result::Result<(), RasError> {
        write_uleb128_u32(sink, u32::from(self.id))?;
        write_uleb128_u32(sink, self.payload.len() as u32)?;
        sink.emit(&self.payload)
    }
}

/// A complete module: the section list and the flattened bytes built from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WasmModule {
    sections: Vec<Section>,
    content: Vec<u8>,
}

impl WasmModule {
    /// Flatten `sections` behind the magic and version header
    pub fn new(sections: Vec<Section>) -> Result<Self> {
        let content = two_pass("module content", |sink| {
            sink.emit(&WASM_MAGIC)?;
            sink.emit(&WASM_VERSION)?;
            for section in &sections {
                section.write_to(sink)?;
            }
            Ok(())
        })?;
        for section in &sections {
            tracing::debug!(
                section = section.name(),
                bytes = section.payload.len(),
                "module section"
            );
        }
        Ok(Self { sections, content })
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, id: u8) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// The module bytes
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn into_content(self) -> Vec<u8> {
        self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// One signature: `() -> i32`
pub fn type_section() -> Result<Section> {
    let payload = two_pass("type section", |sink| {
        write_uleb128_u32(sink, 1)?;
        sink.emit_byte(FUNC_TYPE_FORM)?;
        write_uleb128_u32(sink, 0)?;
        write_uleb128_u32(sink, 1)?;
        sink.emit_byte(I32_TYPE)?;
        Ok(())
    })?;
    Ok(Section::new(TYPE_SECTION_ID, payload))
}

/// One function of type 0
pub fn function_section() -> Result<Section> {
    let payload = two_pass("function section", |sink| {
        write_uleb128_u32(sink, 1)?;
        write_uleb128_u32(sink, 0)?;
        Ok(())
    })?;
    Ok(Section::new(FUNCTION_SECTION_ID, payload))
}

/// One empty funcref table
pub fn table_section() -> Result<Section> {
    let payload = two_pass("table section", |sink| {
        write_uleb128_u32(sink, 1)?;
        sink.emit_byte(FUNCREF_TYPE)?;
        write_uleb128_u32(sink, 0)?;
        write_uleb128_u32(sink, 0)?;
        Ok(())
    })?;
    Ok(Section::new(TABLE_SECTION_ID, payload))
}

/// One memory with a single initial page
pub fn memory_section() -> Result<Section> {
    let payload = two_pass("memory section", |sink| {
        write_uleb128_u32(sink, 1)?;
        write_uleb128_u32(sink, 0)?;
        write_uleb128_u32(sink, 1)?;
        Ok(())
    })?;
    Ok(Section::new(MEMORY_SECTION_ID, payload))
}

fn write_export(
    sink: &mut dyn ByteSink,
    name: &str,
    kind: u8,
    index: u32,
) -> std::result::Result<(), RasError> {
    write_uleb128_u32(sink, name.len() as u32)?;
    sink.emit(name.as_bytes())?;
    sink.emit_byte(kind)?;
    write_uleb128_u32(sink, index)?;
    Ok(())
}

/// Exports the memory, then the routine
pub fn export_section() -> Result<Section> {
    let payload = two_pass("export section", |sink| {
        write_uleb128_u32(sink, 2)?;
        write_export(sink, MEMORY_EXPORT_NAME, EXPORT_KIND_MEMORY, 0)?;
        write_export(sink, ROUTINE_EXPORT_NAME, EXPORT_KIND_FUNCTION, 0)?;
        Ok(())
    })?;
    Ok(Section::new(EXPORT_SECTION_ID, payload))
}

/// Code section holding a single body: one i32 local group, then `instructions`
pub fn code_section(var_count: u32, instructions: &[u8]) -> Result<Section> {
    let payload = two_pass("code section", |sink| {
        let mut locals = CountingSink::new();
        write_locals(&mut locals, var_count)?;
        let body_size = locals.count() + instructions.len();

        write_uleb128_u32(sink, 1)?;
        write_uleb128_u32(sink, body_size as u32)?;
        write_locals(sink, var_count)?;
        sink.emit(instructions)?;
        Ok(())
    })?;
    Ok(Section::new(CODE_SECTION_ID, payload))
}

fn write_locals(sink: &mut dyn ByteSink, var_count: u32) -> std::result::Result<(), RasError> {
    write_uleb128_u32(sink, 1)?;
    write_uleb128_u32(sink, var_count)?;
    sink.emit_byte(I32_TYPE)
}

/// Assemble the six sections around a finished instruction stream
pub fn build_module(var_count: u32, instructions: &[u8]) -> Result<WasmModule> {
    WasmModule::new(vec![
        type_section()?,
        function_section()?,
        table_section()?,
        memory_section()?,
        export_section()?,
        code_section(var_count, instructions)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_section_payloads() {
        assert_eq!(type_section().unwrap().payload, vec![0x01, 0x60, 0x00, 0x01, 0x7F]);
        assert_eq!(function_section().unwrap().payload, vec![0x01, 0x00]);
        assert_eq!(table_section().unwrap().payload, vec![0x01, 0x70, 0x00, 0x00]);
        assert_eq!(memory_section().unwrap().payload, vec![0x01, 0x00, 0x01]);

        let mut expected = vec![0x02, 0x06];
        expected.extend_from_slice(b"memory");
        expected.extend_from_slice(&[0x02, 0x00, 0x04]);
        expected.extend_from_slice(b"calc");
        expected.extend_from_slice(&[0x00, 0x00]);
        assert_eq!(export_section().unwrap().payload, expected);
    }

    #[test]
    fn test_code_section_body_size_counts_locals() {
        let section = code_section(2, &[0x41, 0x05, 0x0B]).unwrap();
        assert_eq!(
            section.payload,
            vec![0x01, 0x06, 0x01, 0x02, 0x7F, 0x41, 0x05, 0x0B]
        );
    }

    #[test]
    fn test_module_content_layout() {
        let module = build_module(1, &[0x41, 0x00, 0x22, 0x00, 0x0B]).unwrap();
        let content = module.content();
        assert_eq!(&content[..8], b"\0asm\x01\x00\x00\x00");
        assert_eq!(module.sections().len(), 6);
        // header, then the type section header and payload
        assert_eq!(&content[8..15], &[0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7F]);

        let expected_len: usize = 8 + module
            .sections()
            .iter()
            .map(|s| 2 + s.payload.len())
            .sum::<usize>();
        assert_eq!(module.len(), expected_len);
        assert!(module.section(CODE_SECTION_ID).is_some());
    }
}
