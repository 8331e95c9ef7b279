use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Document-scoped identity of a graph node.
///
/// The upper 32 bits name the actor (replica) that allocated the ref, the
/// lower 32 bits are that actor's running counter. Actor 0 is reserved for
/// the root object, which every replica builds identically.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Ref(u64);

impl Ref {
    /// "No object".
    pub const NULL: Ref = Ref(0);

    /// The root object of every document.
    pub const ROOT: Ref = Ref(1);

    pub const fn new(actor: u32, counter: u32) -> Self {
        Self(((actor as u64) << 32) | counter as u64)
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn actor(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn counter(self) -> u32 {
        self.0 as u32
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The ref `n` slots further in the same actor's span.
    pub fn offset(self, n: u32) -> Ref {
        match self.counter().checked_add(n) {
            Some(counter) => Ref::new(self.actor(), counter),
            None => crate::fatal!("ref span overflow at {self} + {n}"),
        }
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0.to_be_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength { expected: 8, actual: bytes.len() })?;
        Ok(Self(u64::from_be_bytes(arr)))
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Ref(null)")
        } else {
            write!(f, "Ref({}.{})", self.actor(), self.counter())
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Ref {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
