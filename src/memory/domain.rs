//! Pluggable value interpretations
//!
//! The machine is generic over an [`Interpretation`], selected once at
//! startup. It fixes how integer and floating data are represented and how
//! operators act on them:
//!
//! - [`Concrete`]: exact values, integers wrapped into their C type's range
//! - [`SignAbstract`]: every number collapses to `ZERO`, `PLUS`, `MINUS` or `TOP`
//! - [`BoundedAbstract`]: integers in `[-1, K]` stay exact, anything else is `TOP`
//!
//! Operations return a list of results because an abstract operation may have
//! several possible outcomes (`PLUS + MINUS` may be any sign, `TOP == ZERO`
//! may be true or false). Callers collect them into a
//! [`ValueSet`](super::value::ValueSet), which is how non-determinism flows
//! through the interpreter.
//!
//! Operations are total over irregular bit patterns: byte decoding never
//! guesses, an abstract domain answers unknown bits with `TOP`. When an
//! abstract formula is uncertain it answers `TOP`.

use super::bytes::ByteValue;
use super::limits::{Limits, Representation};
use crate::ast::{BinOp, FloatKind, IntType, UnOp};
use crate::interpreter::constants::{BOUNDED_K, MAX_UNKNOWN_BITS};
use crate::interpreter::errors::CeskError;
use std::fmt;
use std::hash::Hash;

pub trait Interpretation:
    Clone + Copy + fmt::Debug + Default + PartialEq + Eq + Hash + 'static
{
    type Int: Clone + fmt::Debug + fmt::Display + PartialEq + Eq + Hash;
    type Float: Clone + fmt::Debug + fmt::Display + PartialEq;

    const NAME: &'static str;

    /// Abstraction of an exact integer already inside `ty`'s range
    fn int_from(value: i128, ty: IntType, limits: &Limits) -> Self::Int;

    /// The exact integers represented, or `None` when not enumerable
    fn int_concretize(data: &Self::Int) -> Option<Vec<i128>>;

    /// Arithmetic and bitwise operators; both operands already have type `ty`
    fn int_arith(
        op: BinOp,
        a: &Self::Int,
        b: &Self::Int,
        ty: IntType,
        limits: &Limits,
    ) -> Result<Vec<Self::Int>, CeskError>;

    fn int_compare(op: BinOp, a: &Self::Int, b: &Self::Int) -> Vec<bool>;

    /// `-`, `+` and `~`
    fn int_unary(
        op: UnOp,
        a: &Self::Int,
        ty: IntType,
        limits: &Limits,
    ) -> Result<Vec<Self::Int>, CeskError>;

    fn int_truth(a: &Self::Int) -> Vec<bool>;

    /// Conversion to another integer type, reducing modulo the new range
    fn int_cast(a: &Self::Int, from: IntType, to: IntType, limits: &Limits) -> Vec<Self::Int>;

    fn int_to_bytes(a: &Self::Int, ty: IntType, limits: &Limits) -> ByteValue;

    fn int_from_bytes(
        bytes: &ByteValue,
        ty: IntType,
        limits: &Limits,
    ) -> Result<Vec<Self::Int>, CeskError>;

    fn float_from(value: f64, kind: FloatKind) -> Self::Float;

    fn float_from_int(a: &Self::Int, kind: FloatKind) -> Self::Float;

    fn int_from_float(
        a: &Self::Float,
        ty: IntType,
        limits: &Limits,
    ) -> Result<Vec<Self::Int>, CeskError>;

    fn float_arith(
        op: BinOp,
        a: &Self::Float,
        b: &Self::Float,
        kind: FloatKind,
    ) -> Result<Vec<Self::Float>, CeskError>;

    fn float_compare(op: BinOp, a: &Self::Float, b: &Self::Float) -> Vec<bool>;

    fn float_unary(op: UnOp, a: &Self::Float) -> Result<Vec<Self::Float>, CeskError>;

    fn float_truth(a: &Self::Float) -> Vec<bool>;

    fn float_cast(a: &Self::Float, to: FloatKind) -> Self::Float;

    fn float_to_bytes(a: &Self::Float, kind: FloatKind, limits: &Limits) -> ByteValue;

    fn float_from_bytes(
        bytes: &ByteValue,
        kind: FloatKind,
        limits: &Limits,
    ) -> Result<Vec<Self::Float>, CeskError>;
}

// ---------------------------------------------------------------------------
// Exact integer helpers shared by the domains
// ---------------------------------------------------------------------------

/// Reduce `value` into `ty`'s range: `(v - min) mod (max - min + 1) + min`
pub fn bound(value: i128, ty: IntType, limits: &Limits) -> i128 {
    let (min, max) = limits.range(ty);
    if (min..=max).contains(&value) {
        return value;
    }
    let span = max - min + 1;
    (value - min).rem_euclid(span) + min
}

/// Bit pattern of an in-range value
pub fn encode_int(value: i128, ty: IntType, limits: &Limits) -> u128 {
    let bits = (limits.int_width(ty.kind) * 8) as u32;
    if value >= 0 {
        return value as u128;
    }
    let modulus = 1i128 << bits;
    match limits.representation() {
        Representation::TwosComplement => (value + modulus) as u128,
        Representation::OnesComplement => (value + modulus - 1) as u128,
    }
}

/// Value of a bit pattern read as `ty`
pub fn decode_int(pattern: u128, ty: IntType, limits: &Limits) -> i128 {
    let bits = (limits.int_width(ty.kind) * 8) as u32;
    let mask = if bits >= 128 { u128::MAX } else { (1u128 << bits) - 1 };
    let raw = (pattern & mask) as i128;
    if !ty.signed || raw < (1i128 << (bits - 1)) {
        return raw;
    }
    let modulus = 1i128 << bits;
    let value = match limits.representation() {
        Representation::TwosComplement => raw - modulus,
        Representation::OnesComplement => raw - (modulus - 1),
    };
    bound(value, ty, limits)
}

/// Exact integer operator, wrapped into `ty`
pub fn exact_arith(op: BinOp, a: i128, b: i128, ty: IntType, limits: &Limits) -> Result<i128, CeskError> {
    let bits = (limits.int_width(ty.kind) * 8) as i128;
    let raw = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(CeskError::DivisionByZero {
                    operation: "division".to_string(),
                });
            }
            a / b
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(CeskError::DivisionByZero {
                    operation: "modulo".to_string(),
                });
            }
            a % b
        }
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::Shl | BinOp::Shr => {
            if b < 0 || b >= bits {
                return Err(CeskError::unsupported(format!(
                    "shift by {} on a {}-bit operand",
                    b, bits
                )));
            }
            if op == BinOp::Shl {
                a.wrapping_shl(b as u32)
            } else {
                a >> b
            }
        }
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            return Err(CeskError::unsupported(format!(
                "relational operator {} used as arithmetic",
                op.symbol()
            )))
        }
    };
    Ok(bound(raw, ty, limits))
}

pub fn exact_compare<T: PartialOrd>(op: BinOp, a: T, b: T) -> bool {
    match op {
        BinOp::Eq => a == b,
        BinOp::Ne => a != b,
        BinOp::Lt => a < b,
        BinOp::Le => a <= b,
        BinOp::Gt => a > b,
        BinOp::Ge => a >= b,
        _ => false,
    }
}

fn exact_unary(op: UnOp, a: i128, ty: IntType, limits: &Limits) -> Result<i128, CeskError> {
    match op {
        UnOp::Neg => Ok(bound(a.wrapping_neg(), ty, limits)),
        UnOp::Plus => Ok(a),
        UnOp::BitNot => Ok(bound(!a, ty, limits)),
        UnOp::Not | UnOp::Deref | UnOp::AddrOf => Err(CeskError::unsupported(format!(
            "{:?} is not an arithmetic operator",
            op
        ))),
    }
}

fn float_bytes(value: f64, kind: FloatKind, limits: &Limits) -> ByteValue {
    let width = limits.float_width(kind);
    let pattern = if width == 4 {
        u128::from((value as f32).to_bits())
    } else {
        u128::from(value.to_bits())
    };
    ByteValue::from_le(pattern, width)
}

fn float_from_pattern(pattern: u128, kind: FloatKind, limits: &Limits) -> f64 {
    if limits.float_width(kind) == 4 {
        f64::from(f32::from_bits(pattern as u32))
    } else {
        f64::from_bits(pattern as u64)
    }
}

fn round_to(value: f64, kind: FloatKind) -> f64 {
    match kind {
        FloatKind::Float => f64::from(value as f32),
        FloatKind::Double | FloatKind::LongDouble => value,
    }
}

// ---------------------------------------------------------------------------
// Concrete
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Concrete;

impl Interpretation for Concrete {
    type Int = i128;
    type Float = f64;

    const NAME: &'static str = "concrete";

    fn int_from(value: i128, _ty: IntType, _limits: &Limits) -> i128 {
        value
    }

    fn int_concretize(data: &i128) -> Option<Vec<i128>> {
        Some(vec![*data])
    }

    fn int_arith(op: BinOp, a: &i128, b: &i128, ty: IntType, limits: &Limits) -> Result<Vec<i128>, CeskError> {
        Ok(vec![exact_arith(op, *a, *b, ty, limits)?])
    }

    fn int_compare(op: BinOp, a: &i128, b: &i128) -> Vec<bool> {
        vec![exact_compare(op, a, b)]
    }

    fn int_unary(op: UnOp, a: &i128, ty: IntType, limits: &Limits) -> Result<Vec<i128>, CeskError> {
        Ok(vec![exact_unary(op, *a, ty, limits)?])
    }

    fn int_truth(a: &i128) -> Vec<bool> {
        vec![*a != 0]
    }

    fn int_cast(a: &i128, _from: IntType, to: IntType, limits: &Limits) -> Vec<i128> {
        vec![bound(*a, to, limits)]
    }

    fn int_to_bytes(a: &i128, ty: IntType, limits: &Limits) -> ByteValue {
        ByteValue::from_le(encode_int(*a, ty, limits), limits.int_width(ty.kind))
    }

    fn int_from_bytes(bytes: &ByteValue, ty: IntType, limits: &Limits) -> Result<Vec<i128>, CeskError> {
        let patterns = bytes.resized(limits.int_width(ty.kind)).enumerate(MAX_UNKNOWN_BITS)?;
        let mut values: Vec<i128> = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let value = decode_int(pattern, ty, limits);
            if !values.contains(&value) {
                values.push(value);
            }
        }
        Ok(values)
    }

    fn float_from(value: f64, kind: FloatKind) -> f64 {
        round_to(value, kind)
    }

    fn float_from_int(a: &i128, kind: FloatKind) -> f64 {
        round_to(*a as f64, kind)
    }

    fn int_from_float(a: &f64, ty: IntType, limits: &Limits) -> Result<Vec<i128>, CeskError> {
        if !a.is_finite() {
            return Err(CeskError::unsupported(format!(
                "conversion of {} to {}",
                a,
                ty.name()
            )));
        }
        Ok(vec![bound(a.trunc() as i128, ty, limits)])
    }

    fn float_arith(op: BinOp, a: &f64, b: &f64, kind: FloatKind) -> Result<Vec<f64>, CeskError> {
        let result = match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            _ => {
                return Err(CeskError::type_error(
                    "integer operands",
                    format!("floating operands to {}", op.symbol()),
                ))
            }
        };
        Ok(vec![round_to(result, kind)])
    }

    fn float_compare(op: BinOp, a: &f64, b: &f64) -> Vec<bool> {
        vec![exact_compare(op, a, b)]
    }

    fn float_unary(op: UnOp, a: &f64) -> Result<Vec<f64>, CeskError> {
        match op {
            UnOp::Neg => Ok(vec![-a]),
            UnOp::Plus => Ok(vec![*a]),
            _ => Err(CeskError::type_error(
                "integer operand",
                format!("floating operand to {:?}", op),
            )),
        }
    }

    fn float_truth(a: &f64) -> Vec<bool> {
        vec![*a != 0.0]
    }

    fn float_cast(a: &f64, to: FloatKind) -> f64 {
        round_to(*a, to)
    }

    fn float_to_bytes(a: &f64, kind: FloatKind, limits: &Limits) -> ByteValue {
        float_bytes(*a, kind, limits)
    }

    fn float_from_bytes(bytes: &ByteValue, kind: FloatKind, limits: &Limits) -> Result<Vec<f64>, CeskError> {
        let width = limits.float_width(kind);
        let pattern = bytes
            .resized(width)
            .to_le()
            .ok_or_else(|| CeskError::unsupported("floating value with unknown bits"))?;
        Ok(vec![float_from_pattern(pattern, kind, limits)])
    }
}

// ---------------------------------------------------------------------------
// Sign lattice
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    Zero,
    Plus,
    Minus,
    Top,
}

const ALL_CLASSES: [i8; 3] = [-1, 0, 1];

impl Sign {
    pub fn of(value: i128) -> Sign {
        match value.signum() {
            0 => Sign::Zero,
            1 => Sign::Plus,
            _ => Sign::Minus,
        }
    }

    pub fn of_float(value: f64) -> Sign {
        if value.is_nan() {
            Sign::Top
        } else if value > 0.0 {
            Sign::Plus
        } else if value < 0.0 {
            Sign::Minus
        } else {
            Sign::Zero
        }
    }

    /// Concrete signs this element stands for
    fn classes(self) -> &'static [i8] {
        match self {
            Sign::Zero => &[0],
            Sign::Plus => &[1],
            Sign::Minus => &[-1],
            Sign::Top => &ALL_CLASSES,
        }
    }

    fn from_classes(classes: &[i8]) -> Vec<Sign> {
        let has = |c: i8| classes.contains(&c);
        if has(-1) && has(0) && has(1) {
            return vec![Sign::Top];
        }
        let mut signs = Vec::new();
        if has(0) {
            signs.push(Sign::Zero);
        }
        if has(1) {
            signs.push(Sign::Plus);
        }
        if has(-1) {
            signs.push(Sign::Minus);
        }
        signs
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sign::Zero => "ZERO",
            Sign::Plus => "PLUS",
            Sign::Minus => "MINUS",
            Sign::Top => "TOP",
        };
        f.write_str(name)
    }
}

fn class_arith(op: BinOp, a: i8, b: i8) -> Vec<i8> {
    match op {
        BinOp::Add => match (a, b) {
            (0, x) | (x, 0) => vec![x],
            (x, y) if x == y => vec![x],
            _ => ALL_CLASSES.to_vec(),
        },
        BinOp::Sub => class_arith(BinOp::Add, a, -b),
        BinOp::Mul => {
            if a == 0 || b == 0 {
                vec![0]
            } else if a == b {
                vec![1]
            } else {
                vec![-1]
            }
        }
        BinOp::Div => {
            if a == 0 {
                vec![0]
            } else if a == b {
                vec![0, 1]
            } else {
                vec![0, -1]
            }
        }
        BinOp::Mod => {
            if a == 0 {
                vec![0]
            } else {
                vec![0, a]
            }
        }
        BinOp::BitAnd => {
            if a == 0 || b == 0 {
                vec![0]
            } else if a == 1 || b == 1 {
                vec![0, 1]
            } else {
                vec![-1]
            }
        }
        BinOp::BitOr => match (a, b) {
            (0, x) | (x, 0) => vec![x],
            _ if a == -1 || b == -1 => vec![-1],
            _ => vec![1],
        },
        BinOp::BitXor => match (a, b) {
            (0, x) | (x, 0) => vec![x],
            _ if a == b => vec![0, 1],
            _ => vec![-1],
        },
        BinOp::Shl => {
            if a == 0 {
                vec![0]
            } else if b == 0 {
                vec![a]
            } else {
                ALL_CLASSES.to_vec()
            }
        }
        BinOp::Shr => {
            if a == 0 {
                vec![0]
            } else if b == 0 {
                vec![a]
            } else if b < 0 {
                ALL_CLASSES.to_vec()
            } else if a > 0 {
                vec![0, 1]
            } else {
                vec![-1]
            }
        }
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            ALL_CLASSES.to_vec()
        }
    }
}

fn class_compare(op: BinOp, a: i8, b: i8) -> Vec<bool> {
    let both = vec![true, false];
    match op {
        BinOp::Eq | BinOp::Ne => {
            let eq = if a != b {
                vec![false]
            } else if a == 0 {
                vec![true]
            } else {
                both
            };
            if op == BinOp::Ne {
                eq.into_iter().map(|t| !t).collect()
            } else {
                eq
            }
        }
        BinOp::Lt | BinOp::Le => {
            if a < b {
                vec![true]
            } else if a > b {
                vec![false]
            } else if a == 0 {
                vec![op == BinOp::Le]
            } else {
                both
            }
        }
        BinOp::Gt => class_compare(BinOp::Lt, b, a),
        BinOp::Ge => class_compare(BinOp::Le, b, a),
        _ => both,
    }
}

fn dedup_bools(mut values: Vec<bool>) -> Vec<bool> {
    values.sort_unstable();
    values.dedup();
    values
}

fn sign_arith(op: BinOp, a: Sign, b: Sign, signed: bool) -> Result<Vec<Sign>, CeskError> {
    if matches!(op, BinOp::Div | BinOp::Mod) && b == Sign::Zero {
        return Err(CeskError::DivisionByZero {
            operation: if op == BinOp::Div { "division" } else { "modulo" }.to_string(),
        });
    }
    let mut classes = Vec::new();
    for &ca in a.classes() {
        for &cb in b.classes() {
            if matches!(op, BinOp::Div | BinOp::Mod) && cb == 0 {
                continue;
            }
            classes.extend(class_arith(op, ca, cb));
        }
    }
    if !signed {
        classes = classes.into_iter().map(|c| c.abs()).collect();
    }
    Ok(Sign::from_classes(&classes))
}

fn sign_compare(op: BinOp, a: Sign, b: Sign) -> Vec<bool> {
    let mut results = Vec::new();
    for &ca in a.classes() {
        for &cb in b.classes() {
            results.extend(class_compare(op, ca, cb));
        }
    }
    dedup_bools(results)
}

fn sign_unary(op: UnOp, a: Sign, signed: bool) -> Result<Vec<Sign>, CeskError> {
    let mut classes = Vec::new();
    for &c in a.classes() {
        match op {
            UnOp::Neg => classes.push(-c),
            UnOp::Plus => classes.push(c),
            UnOp::BitNot => match c {
                -1 => classes.extend([0, 1]),
                _ => classes.push(-1),
            },
            UnOp::Not | UnOp::Deref | UnOp::AddrOf => {
                return Err(CeskError::unsupported(format!(
                    "{:?} is not an arithmetic operator",
                    op
                )))
            }
        }
    }
    if !signed {
        classes = classes.into_iter().map(|c| c.abs()).collect();
    }
    Ok(Sign::from_classes(&classes))
}

fn sign_truth(a: Sign) -> Vec<bool> {
    dedup_bools(a.classes().iter().map(|&c| c != 0).collect())
}

fn sign_cast(a: Sign, from: IntType, to: IntType, limits: &Limits) -> Vec<Sign> {
    let (from_min, from_max) = limits.range(from);
    let (to_min, to_max) = limits.range(to);
    if to_min <= from_min && from_max <= to_max {
        return vec![a];
    }
    let narrowing = limits.int_width(to.kind) < limits.int_width(from.kind);
    let mut classes = Vec::new();
    for &c in a.classes() {
        match (c, narrowing, to.signed) {
            (0, _, _) => classes.push(0),
            (_, true, true) => classes.extend(ALL_CLASSES),
            (_, true, false) => classes.extend([0, 1]),
            (_, false, true) => classes.extend([-1, 1]),
            (_, false, false) => classes.push(1),
        }
    }
    Sign::from_classes(&classes)
}

fn sign_from_bytes(bytes: &ByteValue, ty: IntType, limits: &Limits) -> Vec<Sign> {
    match bytes.resized(limits.int_width(ty.kind)).to_le() {
        Some(pattern) => vec![Sign::of(decode_int(pattern, ty, limits))],
        None if ty.signed => vec![Sign::Top],
        None => vec![Sign::Zero, Sign::Plus],
    }
}

// Floats under both abstract domains are tracked by sign

fn sign_float_arith(op: BinOp, a: Sign, b: Sign) -> Result<Vec<Sign>, CeskError> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul => sign_arith(op, a, b, true),
        BinOp::Div if b == Sign::Zero => Ok(vec![Sign::Top]),
        BinOp::Div => sign_arith(op, a, b, true),
        _ => Err(CeskError::type_error(
            "integer operands",
            format!("floating operands to {}", op.symbol()),
        )),
    }
}

fn sign_float_unary(op: UnOp, a: Sign) -> Result<Vec<Sign>, CeskError> {
    match op {
        UnOp::Neg | UnOp::Plus => sign_unary(op, a, true),
        _ => Err(CeskError::type_error(
            "integer operand",
            format!("floating operand to {:?}", op),
        )),
    }
}

fn sign_float_to_bytes(a: Sign, kind: FloatKind, limits: &Limits) -> ByteValue {
    match a {
        Sign::Zero => ByteValue::from_le(0, limits.float_width(kind)),
        _ => ByteValue::unknown(limits.float_width(kind)),
    }
}

fn sign_float_from_bytes(bytes: &ByteValue, kind: FloatKind, limits: &Limits) -> Vec<Sign> {
    match bytes.resized(limits.float_width(kind)).to_le() {
        Some(pattern) => vec![Sign::of_float(float_from_pattern(pattern, kind, limits))],
        None => vec![Sign::Top],
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SignAbstract;

impl Interpretation for SignAbstract {
    type Int = Sign;
    type Float = Sign;

    const NAME: &'static str = "sign";

    fn int_from(value: i128, _ty: IntType, _limits: &Limits) -> Sign {
        Sign::of(value)
    }

    fn int_concretize(data: &Sign) -> Option<Vec<i128>> {
        match data {
            Sign::Zero => Some(vec![0]),
            _ => None,
        }
    }

    fn int_arith(op: BinOp, a: &Sign, b: &Sign, ty: IntType, _limits: &Limits) -> Result<Vec<Sign>, CeskError> {
        sign_arith(op, *a, *b, ty.signed)
    }

    fn int_compare(op: BinOp, a: &Sign, b: &Sign) -> Vec<bool> {
        sign_compare(op, *a, *b)
    }

    fn int_unary(op: UnOp, a: &Sign, ty: IntType, _limits: &Limits) -> Result<Vec<Sign>, CeskError> {
        sign_unary(op, *a, ty.signed)
    }

    fn int_truth(a: &Sign) -> Vec<bool> {
        sign_truth(*a)
    }

    fn int_cast(a: &Sign, from: IntType, to: IntType, limits: &Limits) -> Vec<Sign> {
        sign_cast(*a, from, to, limits)
    }

    fn int_to_bytes(a: &Sign, ty: IntType, limits: &Limits) -> ByteValue {
        match a {
            Sign::Zero => ByteValue::from_le(0, limits.int_width(ty.kind)),
            _ => ByteValue::unknown(limits.int_width(ty.kind)),
        }
    }

    fn int_from_bytes(bytes: &ByteValue, ty: IntType, limits: &Limits) -> Result<Vec<Sign>, CeskError> {
        Ok(sign_from_bytes(bytes, ty, limits))
    }

    fn float_from(value: f64, _kind: FloatKind) -> Sign {
        Sign::of_float(value)
    }

    fn float_from_int(a: &Sign, _kind: FloatKind) -> Sign {
        *a
    }

    fn int_from_float(a: &Sign, ty: IntType, limits: &Limits) -> Result<Vec<Sign>, CeskError> {
        // truncation toward zero may reach zero
        let truncated = match a {
            Sign::Zero => vec![Sign::Zero],
            Sign::Plus => vec![Sign::Zero, Sign::Plus],
            Sign::Minus => vec![Sign::Zero, Sign::Minus],
            Sign::Top => vec![Sign::Top],
        };
        let mut out = Vec::new();
        for sign in truncated {
            for cast in sign_cast(sign, IntType::new(crate::ast::IntKind::LongLong, true), ty, limits) {
                if !out.contains(&cast) {
                    out.push(cast);
                }
            }
        }
        Ok(out)
    }

    fn float_arith(op: BinOp, a: &Sign, b: &Sign, _kind: FloatKind) -> Result<Vec<Sign>, CeskError> {
        sign_float_arith(op, *a, *b)
    }

    fn float_compare(op: BinOp, a: &Sign, b: &Sign) -> Vec<bool> {
        sign_compare(op, *a, *b)
    }

    fn float_unary(op: UnOp, a: &Sign) -> Result<Vec<Sign>, CeskError> {
        sign_float_unary(op, *a)
    }

    fn float_truth(a: &Sign) -> Vec<bool> {
        sign_truth(*a)
    }

    fn float_cast(a: &Sign, _to: FloatKind) -> Sign {
        *a
    }

    fn float_to_bytes(a: &Sign, kind: FloatKind, limits: &Limits) -> ByteValue {
        sign_float_to_bytes(*a, kind, limits)
    }

    fn float_from_bytes(bytes: &ByteValue, kind: FloatKind, limits: &Limits) -> Result<Vec<Sign>, CeskError> {
        Ok(sign_float_from_bytes(bytes, kind, limits))
    }
}

// ---------------------------------------------------------------------------
// Bounded integers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bounded {
    Known(i128),
    Top,
}

impl Bounded {
    pub fn of(value: i128) -> Bounded {
        if (-1..=BOUNDED_K).contains(&value) {
            Bounded::Known(value)
        } else {
            Bounded::Top
        }
    }
}

impl fmt::Display for Bounded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bounded::Known(value) => write!(f, "{}", value),
            Bounded::Top => f.write_str("TOP"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BoundedAbstract;

impl Interpretation for BoundedAbstract {
    type Int = Bounded;
    type Float = Sign;

    const NAME: &'static str = "bounded";

    fn int_from(value: i128, _ty: IntType, _limits: &Limits) -> Bounded {
        Bounded::of(value)
    }

    fn int_concretize(data: &Bounded) -> Option<Vec<i128>> {
        match data {
            Bounded::Known(value) => Some(vec![*value]),
            Bounded::Top => None,
        }
    }

    fn int_arith(op: BinOp, a: &Bounded, b: &Bounded, ty: IntType, limits: &Limits) -> Result<Vec<Bounded>, CeskError> {
        match (a, b) {
            (Bounded::Known(x), Bounded::Known(y)) => {
                Ok(vec![Bounded::of(exact_arith(op, *x, *y, ty, limits)?)])
            }
            (_, Bounded::Known(0)) if matches!(op, BinOp::Div | BinOp::Mod) => {
                Err(CeskError::DivisionByZero {
                    operation: if op == BinOp::Div { "division" } else { "modulo" }.to_string(),
                })
            }
            _ => Ok(vec![Bounded::Top]),
        }
    }

    fn int_compare(op: BinOp, a: &Bounded, b: &Bounded) -> Vec<bool> {
        match (a, b) {
            (Bounded::Known(x), Bounded::Known(y)) => vec![exact_compare(op, x, y)],
            _ => vec![false, true],
        }
    }

    fn int_unary(op: UnOp, a: &Bounded, ty: IntType, limits: &Limits) -> Result<Vec<Bounded>, CeskError> {
        match a {
            Bounded::Known(x) => Ok(vec![Bounded::of(exact_unary(op, *x, ty, limits)?)]),
            Bounded::Top => Ok(vec![Bounded::Top]),
        }
    }

    fn int_truth(a: &Bounded) -> Vec<bool> {
        match a {
            Bounded::Known(x) => vec![*x != 0],
            Bounded::Top => vec![false, true],
        }
    }

    fn int_cast(a: &Bounded, _from: IntType, to: IntType, limits: &Limits) -> Vec<Bounded> {
        match a {
            Bounded::Known(x) => vec![Bounded::of(bound(*x, to, limits))],
            Bounded::Top => vec![Bounded::Top],
        }
    }

    fn int_to_bytes(a: &Bounded, ty: IntType, limits: &Limits) -> ByteValue {
        let width = limits.int_width(ty.kind);
        match a {
            Bounded::Known(x) => ByteValue::from_le(encode_int(bound(*x, ty, limits), ty, limits), width),
            Bounded::Top => ByteValue::unknown(width),
        }
    }

    fn int_from_bytes(bytes: &ByteValue, ty: IntType, limits: &Limits) -> Result<Vec<Bounded>, CeskError> {
        Ok(match bytes.resized(limits.int_width(ty.kind)).to_le() {
            Some(pattern) => vec![Bounded::of(decode_int(pattern, ty, limits))],
            None => vec![Bounded::Top],
        })
    }

    fn float_from(value: f64, _kind: FloatKind) -> Sign {
        Sign::of_float(value)
    }

    fn float_from_int(a: &Bounded, _kind: FloatKind) -> Sign {
        match a {
            Bounded::Known(x) => Sign::of(*x),
            Bounded::Top => Sign::Top,
        }
    }

    fn int_from_float(a: &Sign, _ty: IntType, _limits: &Limits) -> Result<Vec<Bounded>, CeskError> {
        Ok(match a {
            Sign::Zero => vec![Bounded::Known(0)],
            _ => vec![Bounded::Top],
        })
    }

    fn float_arith(op: BinOp, a: &Sign, b: &Sign, _kind: FloatKind) -> Result<Vec<Sign>, CeskError> {
        sign_float_arith(op, *a, *b)
    }

    fn float_compare(op: BinOp, a: &Sign, b: &Sign) -> Vec<bool> {
        sign_compare(op, *a, *b)
    }

    fn float_unary(op: UnOp, a: &Sign) -> Result<Vec<Sign>, CeskError> {
        sign_float_unary(op, *a)
    }

    fn float_truth(a: &Sign) -> Vec<bool> {
        sign_truth(*a)
    }

    fn float_cast(a: &Sign, _to: FloatKind) -> Sign {
        *a
    }

    fn float_to_bytes(a: &Sign, kind: FloatKind, limits: &Limits) -> ByteValue {
        sign_float_to_bytes(*a, kind, limits)
    }

    fn float_from_bytes(bytes: &ByteValue, kind: FloatKind, limits: &Limits) -> Result<Vec<Sign>, CeskError> {
        Ok(sign_float_from_bytes(bytes, kind, limits))
    }
}
