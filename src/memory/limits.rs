//! Numeric limits profiles
//!
//! A [`Limits`] value plays the role of `<limits.h>` for the emulated target:
//! byte widths of every C scalar, the signed number representation and the
//! struct packing scheme. Three profiles are available:
//!
//! | profile | widths | representation   | packing  |
//! |---------|--------|------------------|----------|
//! | `cesk`  | gcc    | two's complement | compact  |
//! | `gcc`   | gcc    | two's complement | gcc-std  |
//! | `std`   | C99 minimums | ones' complement | gcc-std |

use crate::ast::{FloatKind, IntKind, IntType};
use crate::interpreter::errors::CeskError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LimitsProfile {
    #[default]
    Cesk,
    Gcc,
    Std,
}

impl FromStr for LimitsProfile {
    type Err = CeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cesk" => Ok(LimitsProfile::Cesk),
            "gcc" => Ok(LimitsProfile::Gcc),
            "std" => Ok(LimitsProfile::Std),
            _ => Err(CeskError::unknown_configuration("limits", s)),
        }
    }
}

impl fmt::Display for LimitsProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LimitsProfile::Cesk => "cesk",
            LimitsProfile::Gcc => "gcc",
            LimitsProfile::Std => "std",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    OnesComplement,
    TwosComplement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Packing {
    /// Fields back to back, no padding
    Compact,
    /// Fields aligned to their size, tail padded to the widest alignment
    GccStd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Widths {
    char: usize,
    short: usize,
    int: usize,
    long: usize,
    long_long: usize,
    float: usize,
    double: usize,
    long_double: usize,
    word: usize,
}

const GCC_WIDTHS: Widths = Widths {
    char: 1,
    short: 2,
    int: 4,
    long: 8,
    long_long: 8,
    float: 4,
    double: 8,
    long_double: 16,
    word: 8,
};

const STD_WIDTHS: Widths = Widths {
    char: 1,
    short: 2,
    int: 2,
    long: 4,
    long_long: 8,
    float: 4,
    double: 8,
    long_double: 8,
    word: 4,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    profile: LimitsProfile,
    widths: Widths,
    representation: Representation,
    packing: Packing,
}

impl Limits {
    pub fn new(profile: LimitsProfile) -> Self {
        let (widths, representation, packing) = match profile {
            LimitsProfile::Cesk => (GCC_WIDTHS, Representation::TwosComplement, Packing::Compact),
            LimitsProfile::Gcc => (GCC_WIDTHS, Representation::TwosComplement, Packing::GccStd),
            LimitsProfile::Std => (STD_WIDTHS, Representation::OnesComplement, Packing::GccStd),
        };
        Limits {
            profile,
            widths,
            representation,
            packing,
        }
    }

    pub fn profile(&self) -> LimitsProfile {
        self.profile
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    pub fn packing(&self) -> Packing {
        self.packing
    }

    pub fn int_width(&self, kind: IntKind) -> usize {
        match kind {
            IntKind::Char => self.widths.char,
            IntKind::Short => self.widths.short,
            IntKind::Int => self.widths.int,
            IntKind::Long => self.widths.long,
            IntKind::LongLong => self.widths.long_long,
        }
    }

    pub fn float_width(&self, kind: FloatKind) -> usize {
        match kind {
            FloatKind::Float => self.widths.float,
            FloatKind::Double => self.widths.double,
            FloatKind::LongDouble => self.widths.long_double,
        }
    }

    /// Pointer width
    pub fn word_size(&self) -> usize {
        self.widths.word
    }

    /// Inclusive `(min, max)` of an integer type
    pub fn range(&self, ty: IntType) -> (i128, i128) {
        let bits = (self.int_width(ty.kind) * 8) as u32;
        if !ty.signed {
            return (0, (1i128 << bits) - 1);
        }
        let max = (1i128 << (bits - 1)) - 1;
        match self.representation {
            Representation::TwosComplement => (-max - 1, max),
            Representation::OnesComplement => (-max, max),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits::new(LimitsProfile::default())
    }
}
