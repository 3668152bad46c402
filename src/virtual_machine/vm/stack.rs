use crate::virtual_machine::errors::VMError;

/// Which machine stack a [`BoundedStack`] backs; selects the fault reported.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum StackKind {
    Operand,
    Call,
}

impl StackKind {
    fn overflow(self, capacity: usize) -> VMError {
        match self {
            StackKind::Operand => VMError::StackOverflow { capacity },
            StackKind::Call => VMError::CallStackOverflow { capacity },
        }
    }

    fn underflow(self) -> VMError {
        match self {
            StackKind::Operand => VMError::StackUnderflow,
            StackKind::Call => VMError::CallStackUnderflow,
        }
    }
}

/// Fixed-capacity LIFO stack.
///
/// Pushing onto a full stack or popping an empty one is a fault.
pub(super) struct BoundedStack<T> {
    items: Vec<T>,
    capacity: usize,
    kind: StackKind,
}

impl<T: Copy> BoundedStack<T> {
    pub(super) fn new(capacity: usize, kind: StackKind) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            kind,
        }
    }

    pub(super) fn push(&mut self, value: T) -> Result<(), VMError> {
        if self.items.len() >= self.capacity {
            return Err(self.kind.overflow(self.capacity));
        }
        self.items.push(value);
        Ok(())
    }

    pub(super) fn pop(&mut self) -> Result<T, VMError> {
        self.items.pop().ok_or_else(|| self.kind.underflow())
    }

    /// Live contents, bottom first.
    pub(super) fn as_slice(&self) -> &[T] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifo_order() {
        let mut stack = BoundedStack::new(4, StackKind::Operand);
        stack.push(1i64).unwrap();
        stack.push(2).unwrap();
        assert_eq!(stack.as_slice(), &[1, 2]);
        assert_eq!(stack.pop().unwrap(), 2);
        assert_eq!(stack.pop().unwrap(), 1);
    }

    #[test]
    fn overflow_reports_kind() {
        let mut stack = BoundedStack::new(1, StackKind::Call);
        stack.push(0usize).unwrap();
        assert!(matches!(
            stack.push(1),
            Err(VMError::CallStackOverflow { capacity: 1 })
        ));
        assert_eq!(stack.as_slice(), &[0]);
    }

    #[test]
    fn underflow_reports_kind() {
        let mut operand: BoundedStack<i64> = BoundedStack::new(2, StackKind::Operand);
        assert!(matches!(operand.pop(), Err(VMError::StackUnderflow)));
        let mut call: BoundedStack<usize> = BoundedStack::new(2, StackKind::Call);
        assert!(matches!(call.pop(), Err(VMError::CallStackUnderflow)));
    }
}
