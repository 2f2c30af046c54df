//! Machine configuration.
//!
//! Loaded from a JSON file; every field is optional and falls back to its
//! default:
//!
//! ```json
//! { "word_count": 2048, "interactive": false, "debugging": false, "origin": 6 }
//! ```

use std::path::Path;
use serde::{Serialize, Deserialize};
use crate::cpu::fault::MachineError;
use crate::cpu::memory::{BOOT_POINTER, DEFAULT_WORD_COUNT, RESERVED_WORDS};
use crate::word::Address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Words of main memory.
    pub word_count: usize,
    /// Fatal conditions stop the run loop instead of failing the run.
    pub interactive: bool,
    /// Log a register dump after every instruction.
    pub debugging: bool,
    /// Load address for programs.
    pub origin: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            word_count: DEFAULT_WORD_COUNT,
            interactive: false,
            debugging: false,
            origin: BOOT_POINTER.index(),
        }
    }
}

impl MachineConfig {
    /// Parse a JSON document.
    pub fn from_json(text: &str) -> Result<Self, MachineError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| MachineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MachineError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MachineError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json(&text)
    }

    /// Reject memories that cannot hold the reserved region or exceed the
    /// 12-bit address space.
    pub fn validate(&self) -> Result<(), MachineError> {
        if self.word_count <= RESERVED_WORDS {
            return Err(MachineError::InvalidConfig(format!(
                "word_count {} must exceed the {} reserved words",
                self.word_count, RESERVED_WORDS
            )));
        }
        if self.word_count > Address::SPACE {
            return Err(MachineError::InvalidConfig(format!(
                "word_count {} exceeds the address space of {} words",
                self.word_count,
                Address::SPACE
            )));
        }
        if self.origin >= self.word_count {
            return Err(MachineError::InvalidConfig(format!(
                "origin {} lies outside memory",
                self.origin
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MachineConfig::default();
        assert_eq!(config.word_count, 2048);
        assert_eq!(config.origin, 6);
        assert!(!config.interactive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = MachineConfig::from_json(r#"{ "interactive": true }"#).unwrap();
        assert!(config.interactive);
        assert_eq!(config.word_count, 2048);
    }

    #[test]
    fn test_validation() {
        assert!(MachineConfig::from_json(r#"{ "word_count": 6 }"#).is_err());
        assert!(MachineConfig::from_json(r#"{ "word_count": 4097 }"#).is_err());
        assert!(MachineConfig::from_json(r#"{ "word_count": 4096 }"#).is_ok());
        assert!(MachineConfig::from_json(r#"{ "word_count": 64, "origin": 64 }"#).is_err());
        assert!(matches!(
            MachineConfig::from_json("{ nope"),
            Err(MachineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "word_count": 1024, "debugging": true }}"#).unwrap();
        let config = MachineConfig::load(file.path()).unwrap();
        assert_eq!(config.word_count, 1024);
        assert!(config.debugging);

        assert!(matches!(
            MachineConfig::load("/nonexistent/machine.json"),
            Err(MachineError::Io(_))
        ));
    }
}
