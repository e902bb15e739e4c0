//! Stack-machine bytecode modules: binary constants, instruction stream, module encoder,
//! section decoder and the hand-authored origin module.

pub mod codegen;
pub mod decoder;
pub mod module;
pub mod opcode;
pub mod origin;

pub use codegen::encode_program;
pub use decoder::{CodeBody, DecodeError, DecodedModule, Routine, SectionView, decode_module};
pub use module::{Section, WasmModule};
pub use opcode::{Instruction, InstructionReader};

/// Magic bytes: \0asm
pub const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];

/// Binary format version, little-endian u32
pub const WASM_VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Magic plus version
pub const HEADER_LEN: usize = 8;

// Section IDs
pub const CUSTOM_SECTION_ID: u8 = 0x00;
pub const TYPE_SECTION_ID: u8 = 0x01;
pub const IMPORT_SECTION_ID: u8 = 0x02;
pub const FUNCTION_SECTION_ID: u8 = 0x03;
pub const TABLE_SECTION_ID: u8 = 0x04;
pub const MEMORY_SECTION_ID: u8 = 0x05;
pub const GLOBAL_SECTION_ID: u8 = 0x06;
pub const EXPORT_SECTION_ID: u8 = 0x07;
pub const START_SECTION_ID: u8 = 0x08;
pub const ELEMENT_SECTION_ID: u8 = 0x09;
pub const CODE_SECTION_ID: u8 = 0x0A;
pub const DATA_SECTION_ID: u8 = 0x0B;

// Types
pub const FUNC_TYPE_FORM: u8 = 0x60;
pub const I32_TYPE: u8 = 0x7F;
pub const FUNCREF_TYPE: u8 = 0x70;

// Export kinds
pub const EXPORT_KIND_FUNCTION: u8 = 0x00;
pub const EXPORT_KIND_TABLE: u8 = 0x01;
pub const EXPORT_KIND_MEMORY: u8 = 0x02;
pub const EXPORT_KIND_GLOBAL: u8 = 0x03;

/// Exported name of the linear memory
pub const MEMORY_EXPORT_NAME: &str = "memory";

/// Exported name of the single routine
pub const ROUTINE_EXPORT_NAME: &str = "calc";

/// Human-readable section name for logs and errors
pub fn section_name(id: u8) -> &'static str {
    match id {
        CUSTOM_SECTION_ID => "custom",
        TYPE_SECTION_ID => "type",
        IMPORT_SECTION_ID => "import",
        FUNCTION_SECTION_ID => "function",
        TABLE_SECTION_ID => "table",
        MEMORY_SECTION_ID => "memory",
        GLOBAL_SECTION_ID => "global",
        EXPORT_SECTION_ID => "export",
        START_SECTION_ID => "start",
        ELEMENT_SECTION_ID => "element",
        CODE_SECTION_ID => "code",
        DATA_SECTION_ID => "data",
        _ => "unknown",
    }
}
