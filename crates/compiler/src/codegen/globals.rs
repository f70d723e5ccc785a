//! Data section emission
//!
//! String literals are interned by content and placed in `.rodata` under
//! generated `.LCn` labels. Initialized globals go to `.data`,
//! zero-initialized ones to `.bss`. Internal-linkage symbols simply skip
//! the `.globl` directive.

use super::error::CodeGenError;
use super::ir::{GlobalInit, Ir};
use crate::entity::EntityTable;
use crate::types::TypeTable;
use std::fmt::Write as _;

pub fn emit_data_sections(
    out: &mut String,
    ir: &Ir,
    entities: &EntityTable,
    types: &TypeTable,
) -> Result<(), CodeGenError> {
    if !ir.strings.is_empty() {
        writeln!(out, "\t.section .rodata")?;
        for (index, bytes) in ir.strings.iter().enumerate() {
            writeln!(out, ".LC{}:", index)?;
            writeln!(out, "\t.string \"{}\"", escape_string(bytes))?;
        }
    }

    let initialized: Vec<_> = ir
        .globals
        .iter()
        .filter(|g| !matches!(g.init, GlobalInit::Zero))
        .collect();
    if !initialized.is_empty() {
        writeln!(out, "\t.data")?;
        for global in initialized {
            let entity = entities.get(global.entity);
            let ty = entity.ty.ok_or_else(|| {
                CodeGenError::internal(&entity.location, "global has no resolved type")
            })?;
            let size = types.size_of(ty).unwrap_or(4);
            let align = types.align_of(ty).unwrap_or(4);
            if !entity.is_private() {
                writeln!(out, "\t.globl {}", entity.name)?;
            }
            writeln!(out, "\t.align {}", align)?;
            writeln!(out, "{}:", entity.name)?;
            match &global.init {
                GlobalInit::Int(value) => match size {
                    1 => writeln!(out, "\t.byte {}", *value as i8)?,
                    2 => writeln!(out, "\t.value {}", *value as i16)?,
                    _ => writeln!(out, "\t.long {}", *value as i32)?,
                },
                GlobalInit::Str(index) => writeln!(out, "\t.long .LC{}", index)?,
                GlobalInit::Zero => unreachable!("filtered above"),
            }
        }
    }

    let zeroed: Vec<_> = ir
        .globals
        .iter()
        .filter(|g| matches!(g.init, GlobalInit::Zero))
        .collect();
    if !zeroed.is_empty() {
        writeln!(out, "\t.section .bss")?;
        for global in zeroed {
            let entity = entities.get(global.entity);
            let ty = entity.ty.ok_or_else(|| {
                CodeGenError::internal(&entity.location, "global has no resolved type")
            })?;
            let size = types.size_of(ty).unwrap_or(4);
            let align = types.align_of(ty).unwrap_or(4);
            if !entity.is_private() {
                writeln!(out, "\t.globl {}", entity.name)?;
            }
            writeln!(out, "\t.align {}", align)?;
            writeln!(out, "{}:", entity.name)?;
            writeln!(out, "\t.zero {}", size)?;
        }
    }
    Ok(())
}

/// GNU as string escaping: printable ASCII stays, everything else is an
/// octal escape. The assembler appends the terminating NUL for `.string`.
fn escape_string(bytes: &[u8]) -> String {
    let mut escaped = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'"' => escaped.push_str("\\\""),
            b'\\' => escaped.push_str("\\\\"),
            0x20..=0x7e => escaped.push(b as char),
            _ => {
                escaped.push_str(&format!("\\{:03o}", b));
            }
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string(b"hello"), "hello");
        assert_eq!(escape_string(b"a\nb"), "a\\012b");
        assert_eq!(escape_string(b"say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(escape_string(b"back\\slash"), "back\\\\slash");
    }
}
