use alloc::vec::Vec;

use crate::err::{PcieError, Result};

/// One physical function of a multi-function endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpFunction {
    pub func_no: u8,
    /// MSI capability offset in this function's config header.
    pub msi_cap: u32,
    /// MSI-X capability offset, 0 if absent.
    pub msix_cap: u32,
}

/// Ordered function collection, keyed by function number.
///
/// Per-function config-space access goes through `conf_select`: the offset
/// is `func_no * func_offset` with a controller-variant stride, never an
/// assumed adjacency.
#[derive(Default)]
pub struct FunctionTable {
    funcs: Vec<EpFunction>,
    func_offset: u32,
}

impl FunctionTable {
    pub fn new(func_offset: u32) -> Self {
        Self {
            funcs: Vec::new(),
            func_offset,
        }
    }

    pub fn add(&mut self, func: EpFunction) -> Result<()> {
        if self.get(func.func_no).is_some() {
            return Err(PcieError::DuplicateFunction { func: func.func_no });
        }
        let at = self
            .funcs
            .iter()
            .position(|f| f.func_no > func.func_no)
            .unwrap_or(self.funcs.len());
        self.funcs.insert(at, func);
        Ok(())
    }

    pub fn get(&self, func_no: u8) -> Option<&EpFunction> {
        self.funcs.iter().find(|f| f.func_no == func_no)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EpFunction> {
        self.funcs.iter()
    }

    /// Byte offset of `func_no`'s config space within the function-indexed
    /// window.
    pub fn conf_select(&self, func_no: u8) -> u32 {
        func_no as u32 * self.func_offset
    }
}
