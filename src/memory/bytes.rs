// Byte-level view of stored values, with per-bit knowledge

use crate::interpreter::errors::CeskError;

/// One byte whose bits may be partly unknown.
/// Bits set in `known` are meaningful in `value`; the rest are TOP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartialByte {
    pub value: u8,
    pub known: u8,
    pub initialized: bool,
}

impl PartialByte {
    pub const UNKNOWN: PartialByte = PartialByte {
        value: 0,
        known: 0,
        initialized: true,
    };

    pub const UNINITIALIZED: PartialByte = PartialByte {
        value: 0,
        known: 0,
        initialized: false,
    };

    pub const fn exact(value: u8) -> Self {
        PartialByte {
            value,
            known: 0xff,
            initialized: true,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.initialized && self.known == 0xff
    }
}

/// Little-endian byte pattern read from, or destined for, the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ByteValue {
    pub bytes: Vec<PartialByte>,
}

impl ByteValue {
    /// Low `len` bytes of `pattern`
    pub fn from_le(pattern: u128, len: usize) -> Self {
        let bytes = (0..len)
            .map(|i| {
                let byte = if i < 16 { (pattern >> (8 * i)) as u8 } else { 0 };
                PartialByte::exact(byte)
            })
            .collect();
        ByteValue { bytes }
    }

    pub fn unknown(len: usize) -> Self {
        ByteValue {
            bytes: vec![PartialByte::UNKNOWN; len],
        }
    }

    pub fn uninitialized(len: usize) -> Self {
        ByteValue {
            bytes: vec![PartialByte::UNINITIALIZED; len],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        self.bytes.iter().all(|b| b.initialized)
    }

    pub fn is_exact(&self) -> bool {
        self.bytes.iter().all(|b| b.is_exact())
    }

    /// The pattern as an integer when every bit is known
    pub fn to_le(&self) -> Option<u128> {
        if !self.is_exact() || self.bytes.len() > 16 {
            return None;
        }
        Some(
            self.bytes
                .iter()
                .enumerate()
                .fold(0u128, |acc, (i, b)| acc | (u128::from(b.value) << (8 * i))),
        )
    }

    pub fn unknown_bits(&self) -> u32 {
        self.bytes.iter().map(|b| (!b.known).count_ones()).sum()
    }

    /// Every concrete pattern the unknown bits allow, if there are at most
    /// `max_unknown_bits` of them
    pub fn enumerate(&self, max_unknown_bits: u32) -> Result<Vec<u128>, CeskError> {
        if !self.is_initialized() {
            return Err(CeskError::uninitialized("byte pattern"));
        }
        if self.bytes.len() > 16 {
            return Err(CeskError::unsupported("byte pattern wider than 16 bytes"));
        }
        let unknown = self.unknown_bits();
        if unknown > max_unknown_bits {
            return Err(CeskError::unsupported(format!(
                "cannot concretize {} unknown bits",
                unknown
            )));
        }
        let mut base = 0u128;
        let mut free_bits = Vec::new();
        for (i, b) in self.bytes.iter().enumerate() {
            base |= u128::from(b.value & b.known) << (8 * i);
            for bit in 0..8 {
                if b.known & (1 << bit) == 0 {
                    free_bits.push(8 * i + bit);
                }
            }
        }
        let mut patterns = Vec::with_capacity(1 << free_bits.len());
        for combination in 0u32..(1u32 << free_bits.len()) {
            let mut pattern = base;
            for (n, bit) in free_bits.iter().enumerate() {
                if combination & (1 << n) != 0 {
                    pattern |= 1u128 << bit;
                }
            }
            patterns.push(pattern);
        }
        Ok(patterns)
    }

    /// `len` bytes starting at `offset`; positions past the end read as zero
    pub fn slice(&self, offset: usize, len: usize) -> ByteValue {
        let bytes = (offset..offset + len)
            .map(|i| self.bytes.get(i).copied().unwrap_or(PartialByte::exact(0)))
            .collect();
        ByteValue { bytes }
    }

    /// Copy with `patch` written over the bytes starting at `offset`
    pub fn splice(&self, offset: usize, patch: &ByteValue) -> ByteValue {
        let mut bytes = self.bytes.clone();
        for (i, b) in patch.bytes.iter().enumerate() {
            if let Some(slot) = bytes.get_mut(offset + i) {
                *slot = *b;
            }
        }
        ByteValue { bytes }
    }

    pub fn concat(&self, other: &ByteValue) -> ByteValue {
        let mut bytes = self.bytes.clone();
        bytes.extend_from_slice(&other.bytes);
        ByteValue { bytes }
    }

    /// Uninitialized bytes become known zeros
    pub fn initialized_or_zero(&self) -> ByteValue {
        let bytes = self
            .bytes
            .iter()
            .map(|b| if b.initialized { *b } else { PartialByte::exact(0) })
            .collect();
        ByteValue { bytes }
    }

    /// Same length, zero-padded or truncated to `len`
    pub fn resized(&self, len: usize) -> ByteValue {
        self.slice(0, len)
    }
}
