use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A byte signature for an instruction that loads a global via a RIP-relative
/// displacement, plus the recipe for turning a match into the global's address.
///
/// Resolution: `instr = match + instr_offset`,
/// `target = instr + instr_len + i32 at (instr + disp_offset)`, then optionally
/// `target = u64 at target` (`deref`) and finally `target += addend`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSignature {
    /// Hex bytes separated by spaces, `??` for wildcards
    pub pattern: String,
    /// Start of the instruction relative to the match
    #[serde(default)]
    pub instr_offset: usize,
    /// Position of the 32-bit displacement inside the instruction
    pub disp_offset: usize,
    /// Length of the instruction; the displacement is relative to its end
    pub instr_len: usize,
    #[serde(default)]
    pub deref: bool,
    #[serde(default)]
    pub addend: i64,
}

impl CodeSignature {
    pub fn pattern_bytes(&self) -> Result<Vec<Option<u8>>> {
        parse_pattern(&self.pattern)
    }

    /// Compute the final address for a match, given the displacement found at
    /// `instr + disp_offset`. Dereferencing is left to the caller.
    pub fn target_from_displacement(&self, match_address: u64, displacement: i32) -> u64 {
        let instr = match_address + self.instr_offset as u64;
        (instr + self.instr_len as u64).wrapping_add_signed(displacement as i64)
    }

    /// Address of the displacement field for a match.
    pub fn displacement_address(&self, match_address: u64) -> u64 {
        match_address + (self.instr_offset + self.disp_offset) as u64
    }
}

/// Parse `"48 8B 1D ?? ??"` into bytes, `None` marking wildcards.
pub fn parse_pattern(pattern: &str) -> Result<Vec<Option<u8>>> {
    let bytes = pattern
        .split_whitespace()
        .map(|token| match token {
            "?" | "??" => Ok(None),
            _ => u8::from_str_radix(token, 16).map(Some).map_err(|e| {
                Error::InvalidSignature(format!("Invalid signature token '{}': {}", token, e))
            }),
        })
        .collect::<Result<Vec<_>>>()?;

    if bytes.is_empty() {
        return Err(Error::InvalidSignature(
            "Signature pattern is empty".to_string(),
        ));
    }
    if bytes.iter().all(Option::is_none) {
        return Err(Error::InvalidSignature(
            "Signature pattern has no fixed bytes".to_string(),
        ));
    }

    Ok(bytes)
}

pub fn format_pattern(bytes: &[Option<u8>]) -> String {
    bytes
        .iter()
        .map(|b| match b {
            Some(value) => format!("{:02X}", value),
            None => "??".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::layout::world_chr_man;

    #[test]
    fn test_parse_world_chr_man_pattern() {
        let bytes = parse_pattern(world_chr_man::PATTERN).unwrap();
        assert_eq!(bytes.len(), 22);
        assert_eq!(&bytes[..3], &[Some(0x48), Some(0x8B), Some(0x1D)]);
        assert_eq!(&bytes[3..6], &[None, None, None]);
        assert_eq!(bytes[6], Some(0x04));
        assert_eq!(bytes.iter().filter(|b| b.is_none()).count(), 7);
    }

    #[test]
    fn test_parse_rejects_bad_tokens() {
        assert!(matches!(
            parse_pattern("48 XZ"),
            Err(Error::InvalidSignature(_))
        ));
        assert!(parse_pattern("   ").is_err());
        assert!(parse_pattern("?? ??").is_err());
    }

    #[test]
    fn test_format_pattern() {
        let pattern = vec![Some(0x48), Some(0x8B), None, Some(0x04)];
        assert_eq!(format_pattern(&pattern), "48 8B ?? 04");
    }

    #[test]
    fn test_rip_relative_target() {
        let signature = CodeSignature {
            pattern: "48 8B 1D ?? ?? ?? ??".to_string(),
            instr_offset: 0,
            disp_offset: 3,
            instr_len: 7,
            deref: true,
            addend: 0,
        };
        assert_eq!(signature.displacement_address(0x1000), 0x1003);
        assert_eq!(signature.target_from_displacement(0x1000, 0x100), 0x1107);
        assert_eq!(signature.target_from_displacement(0x1000, -0x7), 0x1000);
    }
}
