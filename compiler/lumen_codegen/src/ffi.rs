//! Foreign-function descriptor table
//!
//! Calls to foreign functions carry a packed 32-bit `(slot, index)`
//! address; the host resolves it against this table at load time.

use lumen_ir::{Context, Module, ValueKind};
use serde::{Deserialize, Serialize};

/// The address of a foreign function: an 11-bit slot and a 21-bit index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignFuncAddress {
    pub slot: u32,
    pub index: u32,
}

impl ForeignFuncAddress {
    pub fn new(slot: u32, index: u32) -> Self {
        debug_assert!(slot < (1 << 11), "slot exceeds 11 bits");
        debug_assert!(index < (1 << 21), "index exceeds 21 bits");
        Self { slot, index }
    }

    /// The packed `slot:11 | index:21` form carried in `callExt`.
    pub fn packed(self) -> u32 {
        (self.slot << 21) | self.index
    }

    pub fn unpack(packed: u32) -> Self {
        Self { slot: packed >> 21, index: packed & ((1 << 21) - 1) }
    }
}

/// One entry of the descriptor table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignFunctionDecl {
    pub name: String,
    pub lib_index: u32,
    pub address: ForeignFuncAddress,
    /// Size of the return value in bytes.
    pub ret_size: u64,
    /// Sizes of the argument types in bytes.
    pub arg_sizes: Vec<u64>,
}

/// Builds the descriptor table of a module in declaration order.
pub fn build_descriptor_table(ctx: &Context, module: &Module) -> Vec<ForeignFunctionDecl> {
    module
        .foreign_functions()
        .iter()
        .map(|&foreign| {
            let ValueKind::ForeignFunction(data) = &ctx.value_data(foreign).kind else {
                unreachable!("module foreign list holds foreign functions");
            };
            ForeignFunctionDecl {
                name: ctx.value_name(foreign).unwrap_or("").to_string(),
                lib_index: data.lib_index,
                address: ForeignFuncAddress::new(data.slot, data.index),
                ret_size: ctx.size_of(data.return_ty),
                arg_sizes: data.param_tys.iter().map(|&ty| ctx.size_of(ty)).collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_packs_into_32_bits() {
        let addr = ForeignFuncAddress::new(3, 70000);
        let packed = addr.packed();
        assert_eq!(ForeignFuncAddress::unpack(packed), addr);
        assert_eq!(packed >> 21, 3);
    }
}
