use crate::warn;

/// Number of general-purpose registers.
pub const REGISTER_COUNT: usize = 16;
/// Default operand stack capacity.
pub const STACK_SIZE: usize = 1024;
/// Default call stack capacity.
pub const CALL_STACK_SIZE: usize = 128;

const STACK_SIZE_VAR: &str = "GVM_STACK_SIZE";
const CALL_STACK_SIZE_VAR: &str = "GVM_CALL_STACK_SIZE";

/// Machine capacities used when constructing a VM.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineConfig {
    /// Size of the register file.
    pub registers: usize,
    /// Operand stack capacity.
    pub stack_size: usize,
    /// Call stack capacity.
    pub call_stack_size: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            registers: REGISTER_COUNT,
            stack_size: STACK_SIZE,
            call_stack_size: CALL_STACK_SIZE,
        }
    }
}

impl MachineConfig {
    /// Defaults, with stack capacities overridable through `GVM_STACK_SIZE`
    /// and `GVM_CALL_STACK_SIZE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(size) = capacity_override(STACK_SIZE_VAR, lookup(STACK_SIZE_VAR)) {
            config.stack_size = size;
        }
        if let Some(size) = capacity_override(CALL_STACK_SIZE_VAR, lookup(CALL_STACK_SIZE_VAR)) {
            config.call_stack_size = size;
        }
        config
    }
}

fn capacity_override(key: &str, value: Option<String>) -> Option<usize> {
    let raw = value?;
    match raw.trim().parse::<usize>() {
        Ok(size) if size > 0 => Some(size),
        _ => {
            warn!("ignoring {key}={raw}: expected a positive integer");
            None
        }
    }
}

/// Per-run inputs visible to the program.
#[derive(Clone, Debug, Default)]
pub struct ExecContext {
    /// Arguments read by `iarg`, indexed from zero.
    pub args: Vec<String>,
}

impl ExecContext {
    pub fn new(args: Vec<String>) -> Self {
        Self { args }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MachineConfig::default();
        assert_eq!(config.registers, 16);
        assert_eq!(config.stack_size, 1024);
        assert_eq!(config.call_stack_size, 128);
    }

    #[test]
    fn overrides_from_lookup() {
        let config = MachineConfig::from_lookup(|key| match key {
            STACK_SIZE_VAR => Some("64".to_string()),
            CALL_STACK_SIZE_VAR => Some(" 8 ".to_string()),
            _ => None,
        });
        assert_eq!(config.stack_size, 64);
        assert_eq!(config.call_stack_size, 8);
        assert_eq!(config.registers, REGISTER_COUNT);
    }

    #[test]
    fn invalid_overrides_ignored() {
        let config = MachineConfig::from_lookup(|key| match key {
            STACK_SIZE_VAR => Some("0".to_string()),
            CALL_STACK_SIZE_VAR => Some("lots".to_string()),
            _ => None,
        });
        assert_eq!(config, MachineConfig::default());
    }
}
