//! Module section decoder.
//!
//! Splits raw module bytes into sections and resolves the exported routine through the
//! export, function, type and code sections. Nothing here depends on how the module was
//! produced: the encoder's output and the hand-authored origin module take the same path.

use super::opcode::{Instruction, InstructionReader};
use super::{
    CODE_SECTION_ID, CUSTOM_SECTION_ID, DATA_SECTION_ID, EXPORT_KIND_FUNCTION, EXPORT_SECTION_ID,
    FUNC_TYPE_FORM, FUNCTION_SECTION_ID, HEADER_LEN, I32_TYPE, TYPE_SECTION_ID, WASM_MAGIC,
    WASM_VERSION, section_name,
};
use crate::leb128::{Leb128Error, read_uleb128_u32};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("module is {len} bytes, shorter than its 8-byte header")]
    TooShort { len: usize },
    #[error("bad magic {found:02x?}")]
    BadMagic { found: [u8; 4] },
    #[error("unsupported version {found:02x?}")]
    BadVersion { found: [u8; 4] },
    #[error("malformed {field} at offset {offset}: {source}")]
    Leb128 {
        field: &'static str,
        offset: usize,
        #[source]
        source: Leb128Error,
    },
    #[error(
        "section {id} at offset {offset} declares {declared} payload bytes but only {available} remain"
    )]
    SectionOverrun {
        id: u8,
        offset: usize,
        declared: usize,
        available: usize,
    },
    #[error("custom section at offset {offset} is not supported")]
    CustomSection { offset: usize },
    #[error("unknown section id {id} at offset {offset}")]
    UnknownSection { id: u8, offset: usize },
    #[error("duplicate {section} section at offset {offset}")]
    DuplicateSection { section: &'static str, offset: usize },
    #[error("missing {section} section")]
    MissingSection { section: &'static str },
    #[error("no function export named {name:?}")]
    MissingExport { name: String },
    #[error("{what} index {index} out of range ({count} entries)")]
    IndexOutOfRange {
        what: &'static str,
        index: u32,
        count: u32,
    },
    #[error("{field} is {found:#04x}, expected {expected:#04x}")]
    UnexpectedValue {
        field: &'static str,
        found: u32,
        expected: u32,
    },
    #[error("routine takes {params} parameters and returns {results} values, only () -> i32 runs")]
    UnsupportedSignature { params: u32, results: u32 },
    #[error("{section} section payload ends early")]
    TruncatedPayload { section: &'static str },
    #[error("{section} section payload has {extra} trailing bytes")]
    TrailingBytes { section: &'static str, extra: usize },
    #[error("function section declares {functions} functions but code section has {bodies} bodies")]
    CountMismatch { functions: u32, bodies: u32 },
    #[error("code body at offset {offset} is empty")]
    EmptyBody { offset: usize },
    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("i32.const operand {value} at offset {offset} does not fit in 32 bits")]
    ConstantOutOfRange { value: i64, offset: usize },
}

/// One section of a decoded module, borrowing its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionView<'a> {
    pub id: u8,
    /// Offset of the payload within the module
    pub offset: usize,
    pub payload: &'a [u8],
}

impl SectionView<'_> {
    pub fn name(&self) -> &'static str {
        section_name(self.id)
    }
}

/// Local declarations and instructions of one code body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeBody<'a> {
    /// Sum of all declared i32 locals
    pub var_count: u32,
    /// Offset of the first instruction within the module
    pub offset: usize,
    pub instructions: &'a [u8],
}

impl<'a> CodeBody<'a> {
    pub fn reader(&self) -> InstructionReader<'a> {
        InstructionReader::with_base(self.instructions, self.offset)
    }

    /// Decode every instruction up front
    pub fn decode_instructions(&self) -> Result<Vec<Instruction>, DecodeError> {
        self.reader()
            .map(|item| item.map(|(_, instruction)| instruction))
            .collect()
    }
}

/// The exported routine, resolved through export → function → type → code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routine<'a> {
    pub func_index: u32,
    pub type_index: u32,
    pub return_type: u8,
    pub body: CodeBody<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedModule<'a> {
    pub sections: Vec<SectionView<'a>>,
}

/// Cursor over a section payload that reports errors with module offsets
struct PayloadReader<'a> {
    section: &'static str,
    bytes: &'a [u8],
    base: usize,
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(section: &SectionView<'a>) -> Self {
        Self {
            section: section.name(),
            bytes: section.payload,
            base: section.offset,
            pos: 0,
        }
    }

    fn offset(&self) -> usize {
        self.base + self.pos
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        let offset = self.offset();
        let (value, len) =
            read_uleb128_u32(&self.bytes[self.pos..]).map_err(|source| DecodeError::Leb128 {
                field,
                offset,
                source,
            })?;
        self.pos += len;
        Ok(value)
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or(DecodeError::TruncatedPayload {
                section: self.section,
            })?;
        self.pos += 1;
        Ok(byte)
    }

    fn expect_byte(&mut self, field: &'static str, expected: u8) -> Result<(), DecodeError> {
        let found = self.byte()?;
        if found != expected {
            return Err(DecodeError::UnexpectedValue {
                field,
                found: u32::from(found),
                expected: u32::from(expected),
            });
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let bytes: &'a [u8] = self.bytes;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= bytes.len())
            .ok_or(DecodeError::TruncatedPayload {
                section: self.section,
            })?;
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn finish(&self) -> Result<(), DecodeError> {
        let extra = self.bytes.len() - self.pos;
        if extra != 0 {
            return Err(DecodeError::TrailingBytes {
                section: self.section,
                extra,
            });
        }
        Ok(())
    }
}

/// Split `bytes` into sections after checking the header.
///
/// Section payloads must tile the rest of the buffer exactly.
pub fn decode_module(bytes: &[u8]) -> Result<DecodedModule<'_>, DecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::TooShort { len: bytes.len() });
    }
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&bytes[0..4]);
    if magic != WASM_MAGIC {
        return Err(DecodeError::BadMagic { found: magic });
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[4..8]);
    if version != WASM_VERSION {
        return Err(DecodeError::BadVersion { found: version });
    }

    let mut sections: Vec<SectionView<'_>> = Vec::new();
    let mut pos = HEADER_LEN;
    while pos < bytes.len() {
        let header_offset = pos;
        let (raw_id, len) =
            read_uleb128_u32(&bytes[pos..]).map_err(|source| DecodeError::Leb128 {
                field: "section id",
                offset: pos,
                source,
            })?;
        pos += len;
        let id = u8::try_from(raw_id).unwrap_or(u8::MAX);
        if id == CUSTOM_SECTION_ID {
            return Err(DecodeError::CustomSection {
                offset: header_offset,
            });
        }
        if id > DATA_SECTION_ID {
            return Err(DecodeError::UnknownSection {
                id,
                offset: header_offset,
            });
        }
        if sections.iter().any(|s| s.id == id) {
            return Err(DecodeError::DuplicateSection {
                section: section_name(id),
                offset: header_offset,
            });
        }

        let (declared, len) =
            read_uleb128_u32(&bytes[pos..]).map_err(|source| DecodeError::Leb128 {
                field: "section size",
                offset: pos,
                source,
            })?;
        pos += len;
        let declared = declared as usize;
        let available = bytes.len() - pos;
        if declared > available {
            return Err(DecodeError::SectionOverrun {
                id,
                offset: header_offset,
                declared,
                available,
            });
        }

        sections.push(SectionView {
            id,
            offset: pos,
            payload: &bytes[pos..pos + declared],
        });
        pos += declared;
    }

    tracing::debug!(
        sections = sections.len(),
        bytes = bytes.len(),
        "decoded module"
    );
    Ok(DecodedModule { sections })
}

impl<'a> DecodedModule<'a> {
    pub fn section(&self, id: u8) -> Option<&SectionView<'a>> {
        self.sections.iter().find(|s| s.id == id)
    }

    fn required(&self, id: u8) -> Result<&SectionView<'a>, DecodeError> {
        self.section(id).ok_or(DecodeError::MissingSection {
            section: section_name(id),
        })
    }

    /// Item index of the export `name` with the given kind
    pub fn find_export(&self, name: &str, kind: u8) -> Result<u32, DecodeError> {
        let mut reader = PayloadReader::new(self.required(EXPORT_SECTION_ID)?);
        let count = reader.u32("export count")?;
        let mut found = None;
        for _ in 0..count {
            let name_len = reader.u32("export name length")? as usize;
            let export_name = reader.take(name_len)?;
            let export_kind = reader.byte()?;
            let index = reader.u32("export index")?;
            if found.is_none() && export_kind == kind && export_name == name.as_bytes() {
                found = Some(index);
            }
        }
        reader.finish()?;
        found.ok_or_else(|| DecodeError::MissingExport {
            name: name.to_string(),
        })
    }

    /// Declared type index of function `func_index`
    pub fn function_type_index(&self, func_index: u32) -> Result<u32, DecodeError> {
        let mut reader = PayloadReader::new(self.required(FUNCTION_SECTION_ID)?);
        let count = reader.u32("function count")?;
        let mut found = None;
        for i in 0..count {
            let type_index = reader.u32("function type index")?;
            if i == func_index {
                found = Some(type_index);
            }
        }
        reader.finish()?;
        found.ok_or(DecodeError::IndexOutOfRange {
            what: "function",
            index: func_index,
            count,
        })
    }

    /// Number of entries declared in the function section
    pub fn function_count(&self) -> Result<u32, DecodeError> {
        PayloadReader::new(self.required(FUNCTION_SECTION_ID)?).u32("function count")
    }

    /// Return type of signature `type_index`; rejects anything but `() -> one value`
    pub fn return_type(&self, type_index: u32) -> Result<u8, DecodeError> {
        let mut reader = PayloadReader::new(self.required(TYPE_SECTION_ID)?);
        let count = reader.u32("type count")?;
        let mut found = None;
        for i in 0..count {
            reader.expect_byte("type form", FUNC_TYPE_FORM)?;
            let params = reader.u32("parameter count")?;
            reader.take(params as usize)?;
            let results = reader.u32("result count")?;
            let result_types = reader.take(results as usize)?;
            if i == type_index {
                if params != 0 || results != 1 {
                    return Err(DecodeError::UnsupportedSignature { params, results });
                }
                found = Some(result_types[0]);
            }
        }
        reader.finish()?;
        found.ok_or(DecodeError::IndexOutOfRange {
            what: "type",
            index: type_index,
            count,
        })
    }

    /// Body `func_index` of the code section
    pub fn code_body(&self, func_index: u32) -> Result<CodeBody<'a>, DecodeError> {
        let code = *self.required(CODE_SECTION_ID)?;
        let mut reader = PayloadReader::new(&code);
        let bodies = reader.u32("code body count")?;
        let functions = self.function_count()?;
        if bodies != functions {
            return Err(DecodeError::CountMismatch { functions, bodies });
        }

        let mut found = None;
        for i in 0..bodies {
            let body_offset = reader.offset();
            let body_size = reader.u32("code body size")? as usize;
            if body_size == 0 {
                return Err(DecodeError::EmptyBody {
                    offset: body_offset,
                });
            }
            let start = reader.offset();
            let body = reader.take(body_size)?;
            if i == func_index {
                found = Some(parse_body(body, start)?);
            }
        }
        reader.finish()?;
        found.ok_or(DecodeError::IndexOutOfRange {
            what: "code body",
            index: func_index,
            count: bodies,
        })
    }

    /// Resolve the function exported as `name`
    pub fn locate_routine(&self, name: &str) -> Result<Routine<'a>, DecodeError> {
        let func_index = self.find_export(name, EXPORT_KIND_FUNCTION)?;
        let type_index = self.function_type_index(func_index)?;
        let return_type = self.return_type(type_index)?;
        if return_type != I32_TYPE {
            return Err(DecodeError::UnexpectedValue {
                field: "return type",
                found: u32::from(return_type),
                expected: u32::from(I32_TYPE),
            });
        }
        let body = self.code_body(func_index)?;
        tracing::debug!(
            name,
            func_index,
            type_index,
            var_count = body.var_count,
            code_bytes = body.instructions.len(),
            "located routine"
        );
        Ok(Routine {
            func_index,
            type_index,
            return_type,
            body,
        })
    }
}

/// Local declaration groups followed by instructions
fn parse_body(body: &[u8], base: usize) -> Result<CodeBody<'_>, DecodeError> {
    let section = SectionView {
        id: CODE_SECTION_ID,
        offset: base,
        payload: body,
    };
    let mut reader = PayloadReader::new(&section);
    let groups = reader.u32("local group count")?;
    let mut var_count: u32 = 0;
    for _ in 0..groups {
        let count = reader.u32("local count")?;
        reader.expect_byte("local type", I32_TYPE)?;
        var_count = var_count
            .checked_add(count)
            .ok_or(DecodeError::IndexOutOfRange {
                what: "local",
                index: count,
                count: var_count,
            })?;
    }
    let offset = reader.offset();
    let instructions = reader.take(body.len() - reader.pos)?;
    if instructions.is_empty() {
        return Err(DecodeError::EmptyBody { offset: base });
    }
    Ok(CodeBody {
        var_count,
        offset,
        instructions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wasm::MEMORY_SECTION_ID;

    fn module(sections: &[(u8, &[u8])]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&WASM_MAGIC);
        bytes.extend_from_slice(&WASM_VERSION);
        for (id, payload) in sections {
            bytes.push(*id);
            bytes.push(payload.len() as u8);
            bytes.extend_from_slice(payload);
        }
        bytes
    }

    const TYPE: &[u8] = &[0x01, 0x60, 0x00, 0x01, 0x7F];
    const FUNCTION: &[u8] = &[0x01, 0x00];
    const EXPORT: &[u8] = &[0x01, 0x04, b'c', b'a', b'l', b'c', 0x00, 0x00];
    // two local groups: 1 + 2 locals
    const CODE: &[u8] = &[
        0x01, 0x0A, 0x02, 0x01, 0x7F, 0x02, 0x7F, 0x41, 0x07, 0x22, 0x02, 0x0B,
    ];

    fn well_formed() -> Vec<u8> {
        module(&[
            (TYPE_SECTION_ID, TYPE),
            (FUNCTION_SECTION_ID, FUNCTION),
            (EXPORT_SECTION_ID, EXPORT),
            (CODE_SECTION_ID, CODE),
        ])
    }

    #[test]
    fn test_locate_routine_sums_local_groups() {
        let bytes = well_formed();
        let decoded = decode_module(&bytes).unwrap();
        assert_eq!(decoded.sections.len(), 4);

        let routine = decoded.locate_routine("calc").unwrap();
        assert_eq!(routine.func_index, 0);
        assert_eq!(routine.type_index, 0);
        assert_eq!(routine.return_type, I32_TYPE);
        assert_eq!(routine.body.var_count, 3);
        assert_eq!(
            routine.body.decode_instructions().unwrap(),
            vec![
                Instruction::I32Const(7),
                Instruction::TeeLocal(2),
                Instruction::End
            ]
        );
        assert_eq!(bytes[routine.body.offset], 0x41);
    }

    #[test]
    fn test_header_errors() {
        assert_eq!(
            decode_module(&[0x00, 0x61]),
            Err(DecodeError::TooShort { len: 2 })
        );

        let mut bad_magic = well_formed();
        bad_magic[1] = b'b';
        assert!(matches!(
            decode_module(&bad_magic),
            Err(DecodeError::BadMagic { .. })
        ));

        let mut bad_version = well_formed();
        bad_version[4] = 2;
        assert!(matches!(
            decode_module(&bad_version),
            Err(DecodeError::BadVersion { .. })
        ));
    }

    #[test]
    fn test_section_bounds_are_exact() {
        let mut overrun = well_formed();
        overrun.pop();
        assert!(matches!(
            decode_module(&overrun),
            Err(DecodeError::SectionOverrun {
                id: CODE_SECTION_ID,
                ..
            })
        ));

        // a lone id byte with no size after the last section
        let mut dangling = well_formed();
        dangling.push(MEMORY_SECTION_ID);
        assert!(matches!(
            decode_module(&dangling),
            Err(DecodeError::Leb128 {
                field: "section size",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_custom_unknown_and_duplicate_sections() {
        let custom = module(&[(CUSTOM_SECTION_ID, b"\x04name")]);
        assert_eq!(
            decode_module(&custom),
            Err(DecodeError::CustomSection { offset: 8 })
        );

        let unknown = module(&[(0x0D, &[])]);
        assert!(matches!(
            decode_module(&unknown),
            Err(DecodeError::UnknownSection { id: 0x0D, .. })
        ));

        let duplicate = module(&[(TYPE_SECTION_ID, TYPE), (TYPE_SECTION_ID, TYPE)]);
        assert!(matches!(
            decode_module(&duplicate),
            Err(DecodeError::DuplicateSection { .. })
        ));
    }

    #[test]
    fn test_resolution_errors() {
        let no_code = module(&[
            (TYPE_SECTION_ID, TYPE),
            (FUNCTION_SECTION_ID, FUNCTION),
            (EXPORT_SECTION_ID, EXPORT),
        ]);
        let decoded = decode_module(&no_code).unwrap();
        assert_eq!(
            decoded.locate_routine("calc"),
            Err(DecodeError::MissingSection { section: "code" })
        );

        let bytes = well_formed();
        let decoded = decode_module(&bytes).unwrap();
        assert!(matches!(
            decoded.locate_routine("main"),
            Err(DecodeError::MissingExport { .. })
        ));

        let two_params = module(&[
            (TYPE_SECTION_ID, &[0x01, 0x60, 0x02, 0x7F, 0x7F, 0x01, 0x7F]),
            (FUNCTION_SECTION_ID, FUNCTION),
            (EXPORT_SECTION_ID, EXPORT),
            (CODE_SECTION_ID, CODE),
        ]);
        let decoded = decode_module(&two_params).unwrap();
        assert_eq!(
            decoded.locate_routine("calc"),
            Err(DecodeError::UnsupportedSignature {
                params: 2,
                results: 1
            })
        );

        let bad_index = module(&[
            (TYPE_SECTION_ID, TYPE),
            (FUNCTION_SECTION_ID, &[0x01, 0x03]),
            (EXPORT_SECTION_ID, EXPORT),
            (CODE_SECTION_ID, CODE),
        ]);
        let decoded = decode_module(&bad_index).unwrap();
        assert!(matches!(
            decoded.locate_routine("calc"),
            Err(DecodeError::IndexOutOfRange { what: "type", .. })
        ));
    }

    #[test]
    fn test_code_body_errors() {
        let empty_body = module(&[
            (TYPE_SECTION_ID, TYPE),
            (FUNCTION_SECTION_ID, FUNCTION),
            (EXPORT_SECTION_ID, EXPORT),
            (CODE_SECTION_ID, &[0x01, 0x00]),
        ]);
        let decoded = decode_module(&empty_body).unwrap();
        assert!(matches!(
            decoded.locate_routine("calc"),
            Err(DecodeError::EmptyBody { .. })
        ));

        let i64_local = module(&[
            (TYPE_SECTION_ID, TYPE),
            (FUNCTION_SECTION_ID, FUNCTION),
            (EXPORT_SECTION_ID, EXPORT),
            (CODE_SECTION_ID, &[0x01, 0x04, 0x01, 0x01, 0x7E, 0x0B]),
        ]);
        let decoded = decode_module(&i64_local).unwrap();
        assert_eq!(
            decoded.locate_routine("calc"),
            Err(DecodeError::UnexpectedValue {
                field: "local type",
                found: 0x7E,
                expected: 0x7F
            })
        );

        let two_bodies = module(&[
            (TYPE_SECTION_ID, TYPE),
            (FUNCTION_SECTION_ID, FUNCTION),
            (EXPORT_SECTION_ID, EXPORT),
            (CODE_SECTION_ID, &[0x02, 0x02, 0x00, 0x0B, 0x02, 0x00, 0x0B]),
        ]);
        let decoded = decode_module(&two_bodies).unwrap();
        assert_eq!(
            decoded.locate_routine("calc"),
            Err(DecodeError::CountMismatch {
                functions: 1,
                bodies: 2
            })
        );
    }
}
