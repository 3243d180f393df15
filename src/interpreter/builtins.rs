//! Built-in function implementations
//!
//! C library equivalents the machine provides when no user function of the
//! same name exists:
//!
//! - `printf(format, ...)`: formatted output to the run's output buffer
//! - `malloc(size)`, `calloc(n, size)`, `free(ptr)`: heap blocks
//! - `__VERIFIER_nondet_int()`: an arbitrary value, modeled as `{0, 1, 2}`
//! - `omp_get_thread_num()`, `omp_get_num_threads()`, `omp_set_num_threads(n)`
//!
//! # Implementation Notes
//!
//! - `printf` supports `%d %i %u %x %c %s %f %p %ld %lu %lld %%`; an
//!   argument with several possible values prints as `{a, b}`
//! - a `malloc` whose result is cast straight to `T*` lays the block out as
//!   repetitions of `T`; otherwise the block is a run of single bytes
//! - `free` of NULL is a no-op; anything but the start of a live block faults
//! - a request above `MAX_HEAP_BLOCK` bytes, or a `calloc` whose size
//!   overflows, returns NULL

use super::constants::MAX_HEAP_BLOCK;
use super::engine::{display_set, Machine};
use super::errors::CeskError;
use super::state::State;
use crate::ast::{Constant, IntKind, IntType, NodeId, NodeKind};
use crate::memory::domain::Interpretation;
use crate::memory::value::{Address, Scalar, Value, ValueSet};
use crate::memory::Unit;
use std::rc::Rc;
use tracing::warn;

/// Longest string `%s` will read before giving up on a terminator
const MAX_STRING_LEN: usize = 10_000;

impl<I: Interpretation> Machine<I> {
    pub(crate) fn call_builtin(&mut self, state: &State, call: NodeId, name: &str, args: &[NodeId]) -> Result<ValueSet<I>, CeskError> {
        let limits = *self.layouts.limits();
        match name {
            "printf" => self.builtin_printf(state, call, args),
            "malloc" => {
                expect_args(name, args, 1)?;
                let size = self.eval_count(args[0], state, name)?;
                self.builtin_malloc(call, size, false)
            }
            "calloc" => {
                expect_args(name, args, 2)?;
                let count = self.eval_count(args[0], state, name)?;
                let size = self.eval_count(args[1], state, name)?;
                match count.checked_mul(size) {
                    Some(total) => self.builtin_malloc(call, total, true),
                    None => {
                        warn!(count, size, "calloc size overflows");
                        Ok(ValueSet::singleton(Value::null(1)))
                    }
                }
            }
            "free" => {
                expect_args(name, args, 1)?;
                self.builtin_free(state, args[0])?;
                Ok(ValueSet::singleton(Value::int(0, &limits)))
            }
            "__VERIFIER_nondet_int" => {
                expect_args(name, args, 0)?;
                Ok((0..=2).map(|n| Value::int(n, &limits)).collect())
            }
            "omp_get_thread_num" => {
                expect_args(name, args, 0)?;
                let n = self.runtime.thread_num(state.tid);
                Ok(ValueSet::singleton(Value::int(n as i128, &limits)))
            }
            "omp_get_num_threads" => {
                expect_args(name, args, 0)?;
                let n = self.runtime.team_size(state.tid);
                Ok(ValueSet::singleton(Value::int(n as i128, &limits)))
            }
            "omp_set_num_threads" => {
                expect_args(name, args, 1)?;
                let n = self.eval_count(args[0], state, name)?;
                self.runtime.set_num_threads(n);
                Ok(ValueSet::singleton(Value::int(0, &limits)))
            }
            _ => Err(CeskError::UndefinedFunction {
                name: name.to_string(),
            }),
        }
    }

    /// A non-negative count argument with exactly one concrete value
    fn eval_count(&mut self, arg: NodeId, state: &State, function: &str) -> Result<usize, CeskError> {
        let values = self.eval(arg, state)?;
        let mut counts = Vec::new();
        for value in &values {
            counts.extend(value.concretize_int()?);
        }
        match counts.as_slice() {
            [n] if *n >= 0 => Ok(usize::try_from(*n).unwrap_or(usize::MAX)),
            [n] => Err(CeskError::unsupported(format!("{} called with negative count {}", function, n))),
            _ => Err(CeskError::unsupported(format!(
                "{} called with a count that is not a single constant",
                function
            ))),
        }
    }

    fn builtin_printf(&mut self, state: &State, call: NodeId, args: &[NodeId]) -> Result<ValueSet<I>, CeskError> {
        let program = Rc::clone(&self.program);
        let Some(&format_node) = args.first() else {
            return Err(CeskError::InvalidPrintfFormat {
                message: "printf requires at least one argument".to_string(),
            });
        };
        let Some(NodeKind::Constant(Constant::Str(format))) = program.kind(format_node) else {
            return Err(CeskError::InvalidPrintfFormat {
                message: "printf format must be a string literal".to_string(),
            });
        };

        let mut arg_values = Vec::new();
        for &arg in &args[1..] {
            arg_values.push(self.eval(arg, state)?);
        }

        let output = self.format_printf(format, &arg_values)?;
        let count = output.chars().count();
        self.output.print(output, state.tid, program.location(call));

        let limits = *self.layouts.limits();
        Ok(ValueSet::singleton(Value::int(count as i128, &limits)))
    }

    fn format_printf(&self, format: &str, args: &[ValueSet<I>]) -> Result<String, CeskError> {
        let mut output = String::new();
        let mut chars = format.chars().peekable();
        let mut arg_index = 0;

        while let Some(ch) = chars.next() {
            if ch == '%' {
                let mut length = 0usize;
                while chars.peek() == Some(&'l') {
                    chars.next();
                    length += 1;
                }
                let Some(spec) = chars.next() else {
                    output.push('%');
                    break;
                };
                if spec == '%' && length == 0 {
                    output.push('%');
                    continue;
                }
                let values = args.get(arg_index).ok_or_else(|| CeskError::InvalidPrintfFormat {
                    message: "not enough arguments for format string".to_string(),
                })?;
                arg_index += 1;
                let mut pieces = Vec::new();
                for value in values {
                    pieces.push(self.format_value(spec, length, value)?);
                }
                if pieces.len() == 1 {
                    output.push_str(&pieces.concat());
                } else {
                    output.push_str(&format!("{{{}}}", pieces.join(", ")));
                }
            } else if ch == '\\' {
                match chars.next() {
                    Some('n') => output.push('\n'),
                    Some('t') => output.push('\t'),
                    Some('r') => output.push('\r'),
                    Some('\\') => output.push('\\'),
                    Some('"') => output.push('"'),
                    Some(other) => {
                        output.push('\\');
                        output.push(other);
                    }
                    None => output.push('\\'),
                }
            } else {
                output.push(ch);
            }
        }

        Ok(output)
    }

    /// One conversion: `spec` with `length` `l` modifiers
    fn format_value(&self, spec: char, length: usize, value: &Value<I>) -> Result<String, CeskError> {
        let limits = self.layouts.limits();
        let mismatch = |expected: &str| CeskError::InvalidPrintfFormat {
            message: format!("%{} expects {}, got {}", spec, expected, value),
        };
        if let Value::Uninitialized(_) = value {
            return Err(CeskError::uninitialized(format!("printf argument for %{}", spec)));
        }
        match spec {
            'd' | 'i' => {
                let Value::Integer { .. } = value else {
                    return Err(mismatch("an integer"));
                };
                let ty = IntType::new(width_kind(length), true);
                Ok(display_set(&value.cast_to_int(ty, limits)?))
            }
            'u' | 'x' => {
                let Value::Integer { .. } = value else {
                    return Err(mismatch("an integer"));
                };
                let ty = IntType::new(width_kind(length), false);
                let converted = value.cast_to_int(ty, limits)?;
                if spec == 'u' {
                    return Ok(display_set(&converted));
                }
                let mut hex = Vec::new();
                for item in &converted {
                    match item.concretize_int() {
                        Ok(numbers) => hex.extend(numbers.iter().map(|n| format!("{:x}", n))),
                        Err(_) => hex.push(item.to_string()),
                    }
                }
                Ok(hex.join(", "))
            }
            'c' => match value.concretize_int() {
                Ok(codes) if codes.len() == 1 => Ok(((codes[0] as u8) as char).to_string()),
                Ok(_) | Err(CeskError::Unsupported { .. }) => Ok(value.to_string()),
                Err(_) => Err(mismatch("a character")),
            },
            's' => match value {
                Value::Pointer { address, .. } => self.read_string(address),
                _ => Err(mismatch("a pointer")),
            },
            'f' => {
                let Value::Float { .. } = value else {
                    return Err(mismatch("a floating value"));
                };
                let text = value.to_string();
                Ok(match text.parse::<f64>() {
                    Ok(number) => format!("{:.6}", number),
                    Err(_) => text,
                })
            }
            'p' => match value {
                Value::Pointer { address, .. } if address.is_null() => Ok("(nil)".to_string()),
                Value::Pointer { address, .. } => {
                    Ok(format!("0x{:x}", self.store.pointer_to_numeric(address)?))
                }
                Value::Function(name) => Ok(format!("<function {}>", name)),
                _ => Err(mismatch("a pointer")),
            },
            other => Err(CeskError::InvalidPrintfFormat {
                message: format!("unsupported format specifier %{}", other),
            }),
        }
    }

    /// NUL-terminated `char` string starting at `address`
    fn read_string(&self, address: &Address) -> Result<String, CeskError> {
        let scalar = Scalar::Int(IntType::CHAR);
        let step = self.layouts.limits().int_width(IntKind::Char) as i64;
        let mut bytes = Vec::new();
        loop {
            let values = self.store.read(&address.offset_by(bytes.len() as i64 * step), scalar)?;
            let mut candidates = values.iter();
            let (Some(value), None) = (candidates.next(), candidates.next()) else {
                return Err(CeskError::unsupported("%s of a string with uncertain contents"));
            };
            let byte = match value.concretize_int()?.as_slice() {
                [byte] => *byte as u8,
                _ => return Err(CeskError::unsupported("%s of a string with uncertain contents")),
            };
            if byte == 0 {
                break;
            }
            bytes.push(byte);
            if bytes.len() > MAX_STRING_LEN {
                return Err(CeskError::unsupported("string too long or missing NUL terminator"));
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn builtin_malloc(&mut self, call: NodeId, size: usize, zeroed: bool) -> Result<ValueSet<I>, CeskError> {
        if size == 0 {
            return Ok(ValueSet::singleton(Value::null(1)));
        }
        if size > MAX_HEAP_BLOCK {
            warn!(size, limit = MAX_HEAP_BLOCK, "allocation refused");
            return Ok(ValueSet::singleton(Value::null(1)));
        }
        let (units, count) = self.malloc_layout(call, size)?;
        let address = self.store.malloc(call, &units, count)?;
        if zeroed {
            self.store.zero_fill(&address.base)?;
        }
        Ok(ValueSet::singleton(Value::pointer(address, 1)))
    }

    /// Units of a block of `size` bytes: repetitions of the type the result is
    /// cast to when that divides the size, single bytes otherwise
    fn malloc_layout(&self, call: NodeId, size: usize) -> Result<(Vec<Unit>, usize), CeskError> {
        let hint = self.links.parent(call).and_then(|parent| match self.program.kind(parent) {
            Some(NodeKind::Cast { ty, .. }) if ty.is_pointer() => ty.pointee(),
            _ => None,
        });
        if let Some(element) = hint.filter(|ty| !ty.is_void()) {
            if let Ok((units, 1)) = self.layouts.units(&element) {
                let element_size: usize = units.iter().map(|unit| unit.size).sum();
                if element_size > 0 && size % element_size == 0 {
                    return Ok((units, size / element_size));
                }
            }
        }
        let byte = Unit {
            size: self.layouts.limits().int_width(IntKind::Char),
            scalar: Scalar::Int(IntType::UNSIGNED_CHAR),
        };
        Ok((vec![byte], size / byte.size.max(1)))
    }

    fn builtin_free(&mut self, state: &State, arg: NodeId) -> Result<(), CeskError> {
        let values = self.eval(arg, state)?;
        for value in &values {
            match value {
                Value::Pointer { address, .. } => self.store.free(address)?,
                Value::Uninitialized(_) => return Err(CeskError::uninitialized("free argument")),
                Value::Integer { .. } if value.concretize_int()? == vec![0] => {}
                other => return Err(CeskError::type_error("pointer", other.to_string())),
            }
        }
        Ok(())
    }
}

fn expect_args(function: &str, args: &[NodeId], expected: usize) -> Result<(), CeskError> {
    if args.len() != expected {
        return Err(CeskError::ArgumentCountMismatch {
            function: function.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

/// Integer rank selected by the number of `l` length modifiers
fn width_kind(length: usize) -> IntKind {
    match length {
        0 => IntKind::Int,
        1 => IntKind::Long,
        _ => IntKind::LongLong,
    }
}
