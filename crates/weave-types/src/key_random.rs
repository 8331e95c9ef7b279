use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Opaque, globally unique key of a collection element.
///
/// Collections are unordered; the key only has to be unique across replicas,
/// so 128 random bits are drawn for every insertion.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyRandom([u8; 16]);

impl KeyRandom {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 16];
        rng.fill(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for KeyRandom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyRandom({})", self.short_hex())
    }
}

impl fmt::Display for KeyRandom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_keys_differ() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = KeyRandom::generate(&mut rng);
        let b = KeyRandom::generate(&mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_full_hex() {
        let key = KeyRandom::from_bytes([0xab; 16]);
        assert_eq!(key.to_string().len(), 32);
        assert_eq!(key.short_hex(), "abababab");
    }
}
