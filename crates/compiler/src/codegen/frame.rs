//! Storage assignment
//!
//! One frame layout per function, 32-bit cdecl: the caller has pushed
//! arguments right-to-left, then the return address, and the prologue
//! pushes the caller's %ebp. Parameters therefore live at +8, +12, ...
//! (one 4-byte slot each); locals and lowering temporaries grow downward
//! at negative offsets, aligned to their own alignment. Globals and
//! functions get their symbol name.

use super::error::CodeGenError;
use super::ir::{Ir, IrFunction};
use crate::entity::{EntityKind, EntityTable, MemRef};
use crate::types::TypeTable;

/// Offset of the first parameter from %ebp: saved %ebp + return address.
const PARAM_BASE_OFFSET: i32 = 8;
const PARAM_SLOT_SIZE: i32 = 4;

fn round_up(value: u32, align: u32) -> u32 {
    (value + align - 1) / align * align
}

pub fn assign_storage(
    ir: &mut Ir,
    entities: &mut EntityTable,
    types: &TypeTable,
) -> Result<(), CodeGenError> {
    // every named function or variable defaults to its symbol; frame
    // slots below overwrite the ones that live on a stack frame
    let symbols: Vec<(usize, String)> = entities
        .iter()
        .filter(|(_, e)| matches!(e.kind, EntityKind::Function | EntityKind::Variable))
        .map(|(id, e)| (id, e.name.clone()))
        .collect();
    for (id, name) in symbols {
        entities.get_mut(id).mem = Some(MemRef::Symbol(name));
    }

    for function in &mut ir.functions {
        assign_frame(function, entities, types)?;
    }
    Ok(())
}

fn assign_frame(
    function: &mut IrFunction,
    entities: &mut EntityTable,
    types: &TypeTable,
) -> Result<(), CodeGenError> {
    for (index, &param) in function.params.iter().enumerate() {
        let offset = PARAM_BASE_OFFSET + PARAM_SLOT_SIZE * index as i32;
        entities.get_mut(param).mem = Some(MemRef::Frame(offset));
    }

    let mut frame: u32 = 0;
    for &local in &function.locals {
        let entity = entities.get(local);
        let ty = entity.ty.ok_or_else(|| {
            CodeGenError::internal(&entity.location, "local variable has no resolved type")
        })?;
        let size = types.size_of(ty).unwrap_or(PARAM_SLOT_SIZE as u32);
        let align = types.align_of(ty).unwrap_or(1).max(1);
        frame = round_up(frame + size, align);
        entities.get_mut(local).mem = Some(MemRef::Frame(-(frame as i32)));
    }
    function.temp_offsets.clear();
    for _ in 0..function.temp_count {
        frame = round_up(frame + 4, 4);
        function.temp_offsets.push(-(frame as i32));
    }
    function.frame_size = round_up(frame, 4);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(0, 4), 0);
        assert_eq!(round_up(1, 4), 4);
        assert_eq!(round_up(4, 4), 4);
        assert_eq!(round_up(5, 2), 6);
    }
}
