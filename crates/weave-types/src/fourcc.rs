use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Four-character code tagging wire messages and snapshot files.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FourCc([u8; 4]);

impl FourCc {
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub fn from_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    /// Parse a four byte ASCII string, space padding shorter codes.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() || s.len() > 4 || !s.is_ascii() {
            return Err(TypeError::InvalidFourCc(s.to_string()));
        }
        let mut code = [b' '; 4];
        code[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self(code))
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc('{self}')")
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pads_with_spaces() {
        assert_eq!(FourCc::parse("tx").unwrap(), FourCc::new(b"tx  "));
    }

    #[test]
    fn parse_rejects_long_codes() {
        assert!(FourCc::parse("toolong").is_err());
        assert!(FourCc::parse("").is_err());
    }

    #[test]
    fn u32_roundtrip_is_big_endian() {
        let code = FourCc::new(b"helo");
        assert_eq!(code.to_u32(), u32::from_be_bytes(*b"helo"));
        assert_eq!(FourCc::from_u32(code.to_u32()), code);
    }

    #[test]
    fn display_shows_ascii() {
        assert_eq!(FourCc::new(b"sqsh").to_string(), "sqsh");
    }
}
