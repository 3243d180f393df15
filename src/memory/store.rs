//! The store: every object, heap block and continuation of a run
//!
//! Objects are laid out as runs of [`Cell`]s, one per layout [`Unit`]. Cells
//! are numbered by their first byte in one global address space that starts
//! at 1, so 0 doubles as the null sentinel of the predecessor/successor
//! links. The links thread the cells of one allocation in order, so offset
//! walking never needs to know the object's original shape.
//!
//! An access that lines up with a cell and has the cell's representation is
//! served from the cell directly. Anything else (reading two bytes of an
//! `int`, an `int` spanning two `char`s) is served byte by byte across as
//! many cells as needed. A write of that kind re-packs each touched cell from
//! its old bytes plus the new ones.
//!
//! Cells hold a [`ValueSet`]. A strong write replaces it; a weak write (weak
//! update policy, a summary base, or an ambiguous destination) merges.

use super::bytes::ByteValue;
use super::domain::Interpretation;
use super::heap::{BlockKind, Heap};
use super::limits::Limits;
use super::value::{Address, AllocationSite, Base, Scalar, Value, ValueSet};
use super::Unit;
use crate::ast::IntType;
use crate::interpreter::config::{HeapAlloc, StoreUpdate};
use crate::interpreter::constants::{FIRST_UNIT_ADDRESS, MAX_BYTE_COMBINATIONS, MAX_UNKNOWN_BITS};
use crate::interpreter::continuation::{Continuation, KontAddress};
use crate::interpreter::errors::CeskError;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use tracing::trace;

/// Link value meaning "no neighbour"
const NULL_LINK: usize = 0;

/// One unit of an allocated object
#[derive(Debug, Clone)]
pub struct Cell<I: Interpretation> {
    pub base: Base,
    /// Byte offset of this cell inside its base
    pub offset: usize,
    pub size: usize,
    pub scalar: Scalar,
    pub contents: ValueSet<I>,
    pub pred: usize,
    pub succ: usize,
}

#[derive(Debug, Clone)]
struct BaseInfo {
    first: usize,
    size: usize,
    summary: bool,
}

#[derive(Debug, Clone)]
pub struct Store<I: Interpretation> {
    cells: BTreeMap<usize, Cell<I>>,
    bases: FxHashMap<Base, BaseInfo>,
    next_address: usize,
    heap: Heap,
    konts: FxHashMap<KontAddress, Vec<Continuation>>,
    update: StoreUpdate,
    limits: Limits,
    generation: u64,
}

impl<I: Interpretation> Store<I> {
    pub fn new(limits: Limits, update: StoreUpdate, heap_policy: HeapAlloc) -> Self {
        Store {
            cells: BTreeMap::new(),
            bases: FxHashMap::default(),
            next_address: FIRST_UNIT_ADDRESS,
            heap: Heap::new(heap_policy),
            konts: FxHashMap::default(),
            update,
            limits,
            generation: 0,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Bumped whenever memory changes, so equal states over different memory differ
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn is_allocated(&self, base: &Base) -> bool {
        self.bases.contains_key(base)
    }

    /// Size in bytes of an allocated base
    pub fn base_size(&self, base: &Base) -> Option<usize> {
        self.bases.get(base).map(|info| info.size)
    }

    pub fn is_summary(&self, base: &Base) -> bool {
        let summary = self.bases.get(base).is_some_and(|info| info.summary);
        match base {
            Base::Heap(id) => summary || self.heap.is_summary(*id),
            _ => summary,
        }
    }

    pub fn mark_summary(&mut self, base: &Base) {
        if let Some(info) = self.bases.get_mut(base) {
            info.summary = true;
        }
    }

    /// Allocate `count` repetitions of `units` for `base`. Allocating a base
    /// that already exists turns it into a summary and keeps its cells.
    pub fn allocate(&mut self, base: Base, units: &[Unit], count: usize) -> Result<Address, CeskError> {
        if let Some(info) = self.bases.get_mut(&base) {
            info.summary = true;
            return Ok(Address::new(base, 0));
        }
        if units.is_empty() || count == 0 {
            return Err(CeskError::unsupported("allocation of a zero-sized object"));
        }
        let first = self.next_address;
        let mut prev = NULL_LINK;
        let mut offset = 0usize;
        for _ in 0..count {
            for unit in units {
                let key = self.next_address;
                self.cells.insert(
                    key,
                    Cell {
                        base: base.clone(),
                        offset,
                        size: unit.size,
                        scalar: unit.scalar,
                        contents: ValueSet::singleton(Value::Uninitialized(unit.scalar)),
                        pred: prev,
                        succ: NULL_LINK,
                    },
                );
                if let Some(previous) = self.cells.get_mut(&prev) {
                    previous.succ = key;
                }
                prev = key;
                self.next_address += unit.size;
                offset += unit.size;
            }
        }
        trace!(?base, first, size = offset, "allocated");
        self.bases.insert(
            base.clone(),
            BaseInfo {
                first,
                size: offset,
                summary: false,
            },
        );
        Ok(Address::new(base, 0))
    }

    /// Cell holding the first byte of `address`, and the byte position inside it
    fn locate(&self, address: &Address) -> Result<(usize, usize), CeskError> {
        if address.base == Base::Null {
            return Err(CeskError::seg_fault_at("null pointer dereference", address));
        }
        if let Base::Heap(id) = &address.base {
            self.heap.get_block(*id)?;
        }
        let info = self
            .bases
            .get(&address.base)
            .ok_or_else(|| CeskError::seg_fault_at("access to an unallocated address", address))?;
        if address.offset < 0 || address.offset as usize >= info.size {
            return Err(CeskError::seg_fault_at("out of bounds access", address));
        }
        let absolute = info.first + address.offset as usize;
        let (&key, _) = self
            .cells
            .range(..=absolute)
            .next_back()
            .ok_or_else(|| CeskError::seg_fault_at("access to an unallocated address", address))?;
        Ok((key, absolute - key))
    }

    fn cell(&self, key: usize) -> Result<&Cell<I>, CeskError> {
        self.cells
            .get(&key)
            .ok_or_else(|| CeskError::seg_fault(format!("dangling unit {}", key)))
    }

    /// Read a value of representation `scalar` at `address`
    pub fn read(&self, address: &Address, scalar: Scalar) -> Result<ValueSet<I>, CeskError> {
        let (key, within) = self.locate(address)?;
        let cell = self.cell(key)?;
        if within == 0 && cell.scalar.matches(&scalar) {
            return Ok(cell.contents.iter().map(|value| retag(value, scalar)).collect());
        }
        let size = scalar.size(&self.limits);
        let mut values = ValueSet::new();
        for bytes in self.collect_bytes(key, within, size, address)? {
            values.extend(self.decode(&bytes, scalar)?);
        }
        Ok(values)
    }

    /// Every byte pattern `len` bytes long starting `within` bytes into cell `key`
    fn collect_bytes(&self, key: usize, within: usize, len: usize, address: &Address) -> Result<Vec<ByteValue>, CeskError> {
        let mut variants = vec![ByteValue::default()];
        let mut remaining = len;
        let mut key = key;
        let mut within = within;
        while remaining > 0 {
            if key == NULL_LINK {
                return Err(CeskError::seg_fault_at("access runs past the end of the object", address));
            }
            let cell = self.cell(key)?;
            let take = (cell.size - within).min(remaining);
            let mut pieces: Vec<ByteValue> = Vec::new();
            for value in &cell.contents {
                let piece = self.value_bytes(value, cell.size)?.slice(within, take);
                if !pieces.contains(&piece) {
                    pieces.push(piece);
                }
            }
            let mut next = Vec::with_capacity(variants.len() * pieces.len());
            for prefix in &variants {
                for piece in &pieces {
                    next.push(prefix.concat(piece));
                }
            }
            if next.len() > MAX_BYTE_COMBINATIONS {
                return Err(CeskError::unsupported(format!(
                    "more than {} byte patterns for one access",
                    MAX_BYTE_COMBINATIONS
                )));
            }
            variants = next;
            remaining -= take;
            within = 0;
            key = cell.succ;
        }
        Ok(variants)
    }

    /// Bytes of a stored value, padded to `size`
    fn value_bytes(&self, value: &Value<I>, size: usize) -> Result<ByteValue, CeskError> {
        if let Some(bytes) = value.numeric_bytes(&self.limits) {
            return Ok(bytes.resized(size));
        }
        match value {
            Value::Pointer { address, .. } => {
                let numeric = self.pointer_to_numeric(address)?;
                Ok(ByteValue::from_le(numeric, self.limits.word_size()).resized(size))
            }
            _ => Err(CeskError::unsupported(format!(
                "byte-level access to {}",
                value
            ))),
        }
    }

    fn decode(&self, bytes: &ByteValue, scalar: Scalar) -> Result<ValueSet<I>, CeskError> {
        if let Some(result) = Value::from_numeric_bytes(bytes, scalar, &self.limits) {
            return result;
        }
        match scalar {
            Scalar::Pointer { pointee_size } => {
                let word = bytes.resized(self.limits.word_size());
                Ok(word
                    .enumerate(MAX_UNKNOWN_BITS)?
                    .into_iter()
                    .map(|pattern| self.pointer_from_numeric(pattern, pointee_size))
                    .collect())
            }
            _ => Err(CeskError::unsupported("byte-level access to a function pointer")),
        }
    }

    /// Write `values` as `scalar` at `address`
    pub fn write(&mut self, address: &Address, values: &ValueSet<I>, scalar: Scalar, force_weak: bool) -> Result<(), CeskError> {
        let (key, within) = self.locate(address)?;
        let weak = force_weak || self.update == StoreUpdate::Weak || self.is_summary(&address.base);
        let cell = self.cell(key)?;
        let updates = if within == 0
            && cell.scalar.matches(&scalar)
            && cell.scalar.size(&self.limits) == scalar.size(&self.limits)
        {
            let fresh: ValueSet<I> = values.iter().map(|value| retag(value, cell.scalar)).collect();
            vec![(key, self.merge(&cell.contents, fresh, weak))]
        } else {
            self.repack(key, within, values, scalar, weak, address)?
        };
        self.apply(updates);
        Ok(())
    }

    /// Install new cell contents, bumping the generation only on a real change
    fn apply(&mut self, updates: Vec<(usize, ValueSet<I>)>) {
        let mut changed = false;
        for (key, contents) in updates {
            if let Some(cell) = self.cells.get_mut(&key) {
                if cell.contents != contents {
                    cell.contents = contents;
                    changed = true;
                }
            }
        }
        if changed {
            self.generation += 1;
        }
    }

    fn merge(&self, old: &ValueSet<I>, fresh: ValueSet<I>, weak: bool) -> ValueSet<I> {
        if weak && !old.all_uninitialized() {
            old.clone().union(fresh)
        } else {
            fresh
        }
    }

    /// New contents of every cell touched by a byte-level write
    fn repack(
        &self,
        key: usize,
        within: usize,
        values: &ValueSet<I>,
        scalar: Scalar,
        weak: bool,
        address: &Address,
    ) -> Result<Vec<(usize, ValueSet<I>)>, CeskError> {
        let len = scalar.size(&self.limits);
        let mut patches = Vec::new();
        for value in values {
            patches.push(self.value_bytes(value, len)?);
        }
        let mut updates = Vec::new();
        let mut key = key;
        let mut within = within;
        let mut consumed = 0usize;
        while consumed < len {
            if key == NULL_LINK {
                return Err(CeskError::seg_fault_at("write runs past the end of the object", address));
            }
            let cell = self.cell(key)?;
            let take = (cell.size - within).min(len - consumed);
            let mut contents = ValueSet::new();
            for old in &cell.contents {
                let old_bytes = self.value_bytes(old, cell.size)?.initialized_or_zero();
                for patch in &patches {
                    let patched = old_bytes.splice(within, &patch.slice(consumed, take));
                    contents.extend(self.decode(&patched, cell.scalar)?);
                }
            }
            updates.push((key, self.merge(&cell.contents, contents, weak)));
            consumed += take;
            within = 0;
            key = cell.succ;
        }
        Ok(updates)
    }

    /// Move a pointer by `delta` bytes, following the unit chain. Walking off
    /// either end of the object is a fault. A pointer one past the end may
    /// start the walk: it steps back from the last unit.
    pub fn add_offset_to_pointer(&self, address: &Address, delta: i64) -> Result<Address, CeskError> {
        let past_end = self
            .bases
            .get(&address.base)
            .is_some_and(|info| address.offset > 0 && address.offset as usize == info.size);
        let (mut key, mut position) = if past_end {
            let (key, within) = self.locate(&address.offset_by(-1))?;
            (key, within as i64 + 1)
        } else {
            let (key, within) = self.locate(address)?;
            (key, within as i64)
        };
        position += delta;
        loop {
            let cell = self.cell(key)?;
            if position < 0 {
                key = cell.pred;
                if key == NULL_LINK {
                    return Err(CeskError::seg_fault_at("pointer moved before the start of the object", address));
                }
                position += self.cell(key)?.size as i64;
            } else if position >= cell.size as i64 {
                position -= cell.size as i64;
                key = cell.succ;
                if key == NULL_LINK {
                    return Err(CeskError::seg_fault_at("pointer moved past the end of the object", address));
                }
            } else {
                break;
            }
        }
        Ok(address.offset_by(delta))
    }

    /// Numeric value of a pointer in the global byte numbering
    pub fn pointer_to_numeric(&self, address: &Address) -> Result<u128, CeskError> {
        let first = match &address.base {
            Base::Null => 0,
            base => {
                self.bases
                    .get(base)
                    .ok_or_else(|| CeskError::seg_fault_at("pointer to an unallocated address", address))?
                    .first
            }
        };
        Ok((first as i128 + i128::from(address.offset)) as u128)
    }

    /// Pointer for an arbitrary number: the nearest unit at or below it, plus
    /// the remaining distance as an offset. Zero is the null pointer.
    pub fn pointer_from_numeric(&self, numeric: u128, pointee_size: usize) -> Value<I> {
        if numeric == 0 {
            return Value::null(pointee_size);
        }
        let position = usize::try_from(numeric).unwrap_or(usize::MAX);
        let address = match self.cells.range(..=position).next_back() {
            Some((&key, cell)) => Address::new(cell.base.clone(), (cell.offset + (position - key)) as i64),
            None => Address::new(Base::Null, position as i64),
        };
        Value::pointer(address, pointee_size)
    }

    /// Allocate a heap block for `malloc`/`calloc` called at `site`
    pub fn malloc(&mut self, site: AllocationSite, units: &[Unit], count: usize) -> Result<Address, CeskError> {
        let size = units.iter().map(|unit| unit.size).sum::<usize>() * count;
        let (id, fresh) = self.heap.allocate(site, size, BlockKind::Malloc);
        let base = Base::Heap(id);
        if !fresh {
            self.mark_summary(&base);
            return Ok(Address::new(base, 0));
        }
        self.allocate(base, units, count)
    }

    /// Materialize a NUL-terminated string literal as a `char` array
    pub fn literal(&mut self, site: AllocationSite, text: &[u8]) -> Result<Address, CeskError> {
        let char_scalar = Scalar::Int(IntType::CHAR);
        let unit = Unit {
            size: self.limits.int_width(IntType::CHAR.kind),
            scalar: char_scalar,
        };
        let (id, fresh) = self.heap.allocate(site, text.len() + 1, BlockKind::Literal);
        let base = Address::new(Base::Heap(id), 0);
        if !fresh {
            return Ok(base);
        }
        self.allocate(base.base.clone(), &[unit], text.len() + 1)?;
        for (i, &byte) in text.iter().chain(std::iter::once(&0u8)).enumerate() {
            let value = Value::integer(i128::from(byte as i8), IntType::CHAR, &self.limits);
            self.write(&base.offset_by((i * unit.size) as i64), &ValueSet::singleton(value), char_scalar, false)?;
        }
        Ok(base)
    }

    pub fn free(&mut self, address: &Address) -> Result<(), CeskError> {
        match &address.base {
            Base::Null if address.offset == 0 => Ok(()),
            Base::Heap(id) if address.offset == 0 => {
                if !self.bases.contains_key(&address.base) {
                    return Err(CeskError::seg_fault_at("free of an unallocated address", address));
                }
                self.heap.free(*id)?;
                self.generation += 1;
                Ok(())
            }
            Base::Heap(_) => Err(CeskError::seg_fault_at(
                "free of a pointer that is not the start of a block",
                address,
            )),
            _ => Err(CeskError::seg_fault_at("free of memory not obtained from malloc", address)),
        }
    }

    /// Set every unit of `base` to zero (calloc, static storage)
    pub fn zero_fill(&mut self, base: &Base) -> Result<(), CeskError> {
        let info = self
            .bases
            .get(base)
            .ok_or_else(|| CeskError::seg_fault("zero fill of an unallocated object"))?;
        let mut key = self.cells.range(info.first..).next().map(|(&key, _)| key).unwrap_or(NULL_LINK);
        let mut updates = Vec::new();
        while key != NULL_LINK {
            let cell = self.cell(key)?;
            let zeroed = match cell.scalar {
                Scalar::Function => ValueSet::singleton(Value::null(1)),
                scalar => self.decode(&ByteValue::from_le(0, cell.size), scalar)?,
            };
            updates.push((key, zeroed));
            key = cell.succ;
        }
        self.apply(updates);
        Ok(())
    }

    /// Record a continuation. With `merge` the address may already hold
    /// others and the new one joins them.
    pub fn write_kont(&mut self, address: KontAddress, kont: Continuation, merge: bool) {
        let slot = self.konts.entry(address).or_default();
        if !merge {
            slot.clear();
        }
        if !slot.contains(&kont) {
            slot.push(kont);
        }
    }

    /// Every continuation stored at `address`
    pub fn read_kont(&self, address: KontAddress) -> Result<Vec<Continuation>, CeskError> {
        self.konts
            .get(&address)
            .cloned()
            .ok_or_else(|| CeskError::unsupported(format!("no continuation at address {}", address.0)))
    }

    pub fn kont_count(&self) -> usize {
        self.konts.len()
    }

    /// Drop every continuation no address in `roots` reaches through parent
    /// links. Returns how many were dropped.
    pub fn sweep_konts(&mut self, roots: impl IntoIterator<Item = KontAddress>) -> usize {
        let mut live = FxHashSet::default();
        let mut pending: Vec<KontAddress> = roots.into_iter().collect();
        while let Some(address) = pending.pop() {
            if address.is_halt() || !live.insert(address) {
                continue;
            }
            if let Some(slot) = self.konts.get(&address) {
                pending.extend(slot.iter().map(|kont| kont.parent));
            }
        }
        let before = self.konts.len();
        self.konts.retain(|address, _| live.contains(address));
        let dropped = before - self.konts.len();
        trace!(dropped, kept = self.konts.len(), "continuations swept");
        dropped
    }
}

/// A stored value viewed with a compatible representation
fn retag<I: Interpretation>(value: &Value<I>, scalar: Scalar) -> Value<I> {
    match (value, scalar) {
        (Value::Pointer { address, .. }, Scalar::Pointer { pointee_size }) => Value::Pointer {
            address: address.clone(),
            pointee_size,
        },
        (Value::Uninitialized(_), scalar) => Value::Uninitialized(scalar),
        (value, _) => value.clone(),
    }
}
