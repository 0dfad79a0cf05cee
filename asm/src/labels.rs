//! The label table (§3, §4.4): purely-decimal names are local and may be
//! defined any number of times, disambiguated at reference time by
//! nearest-forward (`f`) or nearest-backward (`b`); every other name is
//! global and must be defined exactly once.

use crate::error::AssembleError;
use std::collections::HashMap;

fn is_local_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_digit())
}

#[derive(Debug, Default)]
pub struct LabelTable {
    globals: HashMap<String, u32>,
    locals: HashMap<String, Vec<u32>>,
}

impl LabelTable {
    pub fn new() -> LabelTable {
        LabelTable::default()
    }

    pub fn define(&mut self, name: &str, addr: u32) -> Result<(), AssembleError> {
        if is_local_name(name) {
            let entries = self.locals.entry(name.to_string()).or_default();
            let pos = entries.binary_search(&addr).unwrap_or_else(|p| p);
            entries.insert(pos, addr);
        } else if self.globals.insert(name.to_string(), addr).is_some() {
            return Err(AssembleError::MultiplyDefinedLabel(name.to_string()));
        }
        Ok(())
    }

    /// `$name` resolution: global labels only; a local absolute reference
    /// is always illegal (§4.4).
    pub fn resolve_absolute(&self, name: &str) -> Result<u32, AssembleError> {
        if is_local_name(name) {
            return Err(AssembleError::LocalAbsoluteReference(name.to_string()));
        }
        self.globals
            .get(name)
            .copied()
            .ok_or_else(|| AssembleError::UndefinedLabel(name.to_string()))
    }

    /// `@name` resolution for a global label.
    pub fn resolve_global_address(&self, name: &str) -> Result<u32, AssembleError> {
        self.globals
            .get(name)
            .copied()
            .ok_or_else(|| AssembleError::UndefinedLabel(name.to_string()))
    }

    /// `@<num>f`: nearest local definition strictly after `pc`.
    pub fn resolve_local_forward(&self, num: &str, pc: u32) -> Result<u32, AssembleError> {
        self.locals
            .get(num)
            .and_then(|addrs| addrs.iter().copied().find(|a| *a > pc))
            .ok_or_else(|| AssembleError::UndefinedLabel(format!("{}f", num)))
    }

    /// `@<num>b`: nearest local definition at or before `pc`.
    pub fn resolve_local_backward(&self, num: &str, pc: u32) -> Result<u32, AssembleError> {
        self.locals
            .get(num)
            .and_then(|addrs| addrs.iter().copied().rev().find(|a| *a <= pc))
            .ok_or_else(|| AssembleError::UndefinedLabel(format!("{}b", num)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn local_labels_allow_redefinition_global_does_not() {
        let mut table = LabelTable::new();
        table.define("1", 0).unwrap();
        table.define("1", 10).unwrap();
        table.define("loop", 4).unwrap();
        assert!(table.define("loop", 8).is_err());
    }

    #[test]
    fn local_absolute_reference_is_illegal() {
        let mut table = LabelTable::new();
        table.define("1", 0).unwrap();
        assert!(table.resolve_absolute("1").is_err());
    }

    #[test]
    fn forward_and_backward_pick_nearest() {
        let mut table = LabelTable::new();
        table.define("1", 2).unwrap();
        table.define("1", 8).unwrap();
        assert_eq!(table.resolve_local_forward("1", 4).unwrap(), 8);
        assert_eq!(table.resolve_local_backward("1", 4).unwrap(), 2);
        assert_eq!(table.resolve_local_backward("1", 8).unwrap(), 8);
    }
}
