//! The fixed table of external (builtin) functions.
//!
//! Signatures for `putb`/`endl`/`puti8`/`putc`/`getc`/`iogood` are grounded
//! on `original_source/src/state.cpp`'s stdlib registration block. `malloc`,
//! `free`, `deref` and `assign` have no counterpart in `original_source/` -
//! they back a small heap so Nandlang programs can allocate dynamically
//! sized buffers; their signatures and the [`crate::evaluator`] heap arena
//! backing them are this crate's own design, not a port.

use crate::constlevel::ConstantLevel;
use crate::lexer::POINTER_SIZE;

/// Total input/output bit widths and constant-foldability of one builtin.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinSignature {
    pub name: &'static str,
    pub inputs: usize,
    pub outputs: usize,
    pub level: ConstantLevel,
}

fn table() -> [BuiltinSignature; 10] {
    let p = POINTER_SIZE as usize;
    [
        BuiltinSignature { name: "putb", inputs: 1, outputs: 0, level: ConstantLevel::Global },
        BuiltinSignature { name: "endl", inputs: 0, outputs: 0, level: ConstantLevel::Global },
        BuiltinSignature { name: "puti8", inputs: 8, outputs: 0, level: ConstantLevel::Global },
        BuiltinSignature { name: "putc", inputs: 8, outputs: 0, level: ConstantLevel::Global },
        BuiltinSignature { name: "getc", inputs: 0, outputs: 8, level: ConstantLevel::Global },
        BuiltinSignature { name: "iogood", inputs: 0, outputs: 1, level: ConstantLevel::Global },
        BuiltinSignature { name: "malloc", inputs: p, outputs: p, level: ConstantLevel::Local },
        BuiltinSignature { name: "free", inputs: p, outputs: 0, level: ConstantLevel::Local },
        BuiltinSignature { name: "deref", inputs: p, outputs: 1, level: ConstantLevel::Local },
        BuiltinSignature { name: "assign", inputs: p + 1, outputs: 0, level: ConstantLevel::Local },
    ]
}

pub fn lookup(name: &str) -> Option<BuiltinSignature> {
    table().into_iter().find(|b| b.name == name)
}

pub fn is_builtin(name: &str) -> bool {
    lookup(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_builtins_are_global() {
        assert_eq!(lookup("putb").unwrap().level, ConstantLevel::Global);
        assert_eq!(lookup("getc").unwrap().outputs, 8);
    }

    #[test]
    fn heap_builtins_use_pointer_width() {
        let malloc = lookup("malloc").unwrap();
        assert_eq!(malloc.inputs, POINTER_SIZE as usize);
        assert_eq!(malloc.outputs, POINTER_SIZE as usize);
    }

    #[test]
    fn unknown_name_is_not_a_builtin() {
        assert!(!is_builtin("frobnicate"));
    }
}
