use crate::virtual_machine::errors::VMError;

/// Register file holding VM storage.
///
/// Every register holds a single `i64` and starts at zero. Register operands
/// arrive as raw code words, so indices are validated on every access.
pub(super) struct Registers {
    regs: Vec<i64>,
}

impl Registers {
    /// Creates a new register file with `count` zeroed registers.
    pub(super) fn new(count: usize) -> Self {
        Self {
            regs: vec![0; count],
        }
    }

    fn slot(&self, idx: i64) -> Result<usize, VMError> {
        usize::try_from(idx)
            .ok()
            .filter(|&i| i < self.regs.len())
            .ok_or(VMError::InvalidRegisterIndex {
                index: idx,
                available: self.regs.len(),
            })
    }

    /// Returns the value in register `idx`.
    ///
    /// Returns [`VMError::InvalidRegisterIndex`] if `idx` is out of bounds.
    pub(super) fn get(&self, idx: i64) -> Result<i64, VMError> {
        Ok(self.regs[self.slot(idx)?])
    }

    /// Stores a value into register `idx`.
    ///
    /// Returns [`VMError::InvalidRegisterIndex`] if `idx` is out of bounds.
    pub(super) fn set(&mut self, idx: i64, v: i64) -> Result<(), VMError> {
        let slot = self.slot(idx)?;
        self.regs[slot] = v;
        Ok(())
    }

    pub(super) fn as_slice(&self) -> &[i64] {
        &self.regs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_initialized() {
        let regs = Registers::new(16);
        assert_eq!(regs.as_slice(), &[0; 16]);
    }

    #[test]
    fn set_then_get() {
        let mut regs = Registers::new(4);
        regs.set(3, -8).unwrap();
        assert_eq!(regs.get(3).unwrap(), -8);
    }

    #[test]
    fn out_of_bounds() {
        let mut regs = Registers::new(16);
        assert!(matches!(
            regs.get(16),
            Err(VMError::InvalidRegisterIndex {
                index: 16,
                available: 16
            })
        ));
        assert!(matches!(
            regs.set(-1, 0),
            Err(VMError::InvalidRegisterIndex { index: -1, .. })
        ));
    }
}
