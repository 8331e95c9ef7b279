use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Fractional ordering key of an array element.
///
/// A key is a base-256 fraction `0.d1 d2 d3 ...` strictly inside `(0, 1)`,
/// stored as its digits without trailing zeros. Lexicographic comparison of
/// the digit strings then matches numeric comparison, and the digit string
/// can always grow, so a key strictly between any two distinct keys exists.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyFloat {
    digits: Vec<u8>,
}

impl KeyFloat {
    pub fn from_digits(digits: Vec<u8>) -> Result<Self, TypeError> {
        match digits.last() {
            None => Err(TypeError::InvalidKey("empty key".into())),
            Some(0) => Err(TypeError::InvalidKey("trailing zero digit".into())),
            Some(_) => Ok(Self { digits }),
        }
    }

    pub fn digits(&self) -> &[u8] {
        &self.digits
    }

    /// Deterministic key strictly between `left` and `right`.
    ///
    /// `None` stands for the open bounds 0 and 1.
    pub fn midpoint(left: Option<&KeyFloat>, right: Option<&KeyFloat>) -> KeyFloat {
        let lo: &[u8] = left.map(|k| k.digits.as_slice()).unwrap_or(&[]);
        let hi: Option<&[u8]> = right.map(|k| k.digits.as_slice());
        if let (Some(l), Some(r)) = (left, right) {
            if l >= r {
                crate::fatal!("key bounds out of order: {l:?} >= {r:?}");
            }
        }

        let digit = |d: &[u8], i: usize| d.get(i).copied().unwrap_or(0) as u16;
        let mut out = Vec::with_capacity(lo.len() + 1);
        let mut i = 0;

        // Shared prefix, then the first digit where the bounds differ.
        loop {
            let a = digit(lo, i);
            let b = hi.map(|h| digit(h, i)).unwrap_or(256);
            if a == b {
                out.push(a as u8);
                i += 1;
                continue;
            }
            if b - a > 1 {
                out.push(((a + b) / 2) as u8);
                return KeyFloat { digits: out };
            }
            out.push(a as u8);
            i += 1;
            break;
        }

        // Below the upper bound already; only need to exceed the lower one.
        loop {
            let a = digit(lo, i);
            if a < 255 {
                out.push((a + (256 - a) / 2) as u8);
                return KeyFloat { digits: out };
            }
            out.push(255);
            i += 1;
        }
    }

    /// Fresh key strictly between `left` and `right`.
    ///
    /// A random non-zero tail digit is appended to the midpoint so replicas
    /// inserting between the same neighbours concurrently pick distinct keys.
    pub fn generate<R: Rng + ?Sized>(
        left: Option<&KeyFloat>,
        right: Option<&KeyFloat>,
        rng: &mut R,
    ) -> KeyFloat {
        let mut key = Self::midpoint(left, right);
        key.digits.push(rng.gen_range(1..=255));
        key
    }

    /// Approximate numeric value, for display.
    pub fn to_f64(&self) -> f64 {
        let mut value = 0.0;
        let mut scale = 1.0 / 256.0;
        for &d in self.digits.iter().take(8) {
            value += d as f64 * scale;
            scale /= 256.0;
        }
        value
    }
}

impl fmt::Debug for KeyFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyFloat({})", hex::encode(&self.digits))
    }
}

impl fmt::Display for KeyFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.to_f64())
    }
}
