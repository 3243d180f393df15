//! Heap block bookkeeping
//!
//! This module tracks the lifetime of dynamically created objects:
//! - `malloc`/`calloc` blocks, freed by `free`
//! - string literal blocks, which live for the whole run and cannot be freed
//!
//! Freed blocks are kept as tombstones so a later access reports a
//! use-after-free instead of an unknown address. Under the abstract heap
//! policy every allocation site owns exactly one block; allocating it again
//! turns it into a summary of all the concrete blocks the site produced.

use super::value::{AllocationSite, HeapId};
use crate::interpreter::config::HeapAlloc;
use crate::interpreter::errors::CeskError;
use rustc_hash::FxHashMap;

/// State of a heap block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Allocated,
    Tombstone, // Freed, kept to detect use-after-free
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Malloc,
    Literal,
}

/// A block of heap memory
#[derive(Debug, Clone)]
pub struct HeapBlock {
    pub size: usize,
    pub state: BlockState,
    pub kind: BlockKind,
    pub site: AllocationSite,
    /// Stands for more than one concrete block
    pub summary: bool,
}

/// The heap
#[derive(Debug, Clone)]
pub struct Heap {
    blocks: Vec<HeapBlock>,
    by_site: FxHashMap<(BlockKind, AllocationSite), HeapId>,
    policy: HeapAlloc,
}

impl Heap {
    pub fn new(policy: HeapAlloc) -> Self {
        Heap {
            blocks: Vec::new(),
            by_site: FxHashMap::default(),
            policy,
        }
    }

    /// Allocate a block, returning its id and whether it is new
    pub fn allocate(&mut self, site: AllocationSite, size: usize, kind: BlockKind) -> (HeapId, bool) {
        if self.policy == HeapAlloc::Abstract {
            if let Some(&id) = self.by_site.get(&(kind, site)) {
                let block = &mut self.blocks[id.0];
                block.summary = true;
                block.state = BlockState::Allocated;
                block.size = block.size.max(size);
                return (id, false);
            }
        }
        let id = HeapId(self.blocks.len());
        self.blocks.push(HeapBlock {
            size,
            state: BlockState::Allocated,
            kind,
            site,
            summary: false,
        });
        if self.policy == HeapAlloc::Abstract {
            self.by_site.insert((kind, site), id);
        }
        (id, true)
    }

    /// Free a block (mark as tombstone)
    pub fn free(&mut self, id: HeapId) -> Result<(), CeskError> {
        let block = self
            .blocks
            .get_mut(id.0)
            .ok_or_else(|| CeskError::seg_fault(format!("free of unknown block {}", id.0)))?;
        match (block.kind, block.state) {
            (BlockKind::Literal, _) => Err(CeskError::seg_fault("free of a string literal")),
            // a summary may still have live members
            (BlockKind::Malloc, _) if block.summary => Ok(()),
            (BlockKind::Malloc, BlockState::Allocated) => {
                block.state = BlockState::Tombstone;
                Ok(())
            }
            (BlockKind::Malloc, BlockState::Tombstone) => Err(CeskError::seg_fault(format!(
                "double free of block {}",
                id.0
            ))),
        }
    }

    /// Get a live heap block
    pub fn get_block(&self, id: HeapId) -> Result<&HeapBlock, CeskError> {
        match self.blocks.get(id.0) {
            Some(block) if block.state == BlockState::Allocated => Ok(block),
            Some(_) => Err(CeskError::seg_fault(format!(
                "use after free of block {}",
                id.0
            ))),
            None => Err(CeskError::seg_fault(format!(
                "block {} was never allocated",
                id.0
            ))),
        }
    }

    pub fn is_summary(&self, id: HeapId) -> bool {
        self.blocks.get(id.0).is_some_and(|block| block.summary)
    }

    pub fn live_blocks(&self) -> usize {
        self.blocks
            .iter()
            .filter(|block| block.state == BlockState::Allocated && block.kind == BlockKind::Malloc)
            .count()
    }
}
