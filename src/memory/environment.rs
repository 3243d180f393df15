//! Frames and identifier resolution
//!
//! This module provides the environment half of a machine state:
//! - [`Frame`]: the bindings introduced by one block activation
//! - [`Environment`]: every frame of a run plus the global frame
//!
//! A state only carries a [`FrameId`]; resolution walks the frame's parent
//! chain, then the global frame. Function bodies start a fresh chain, so a
//! callee never sees its caller's locals.
//!
//! # Implicit declarations
//!
//! C scopes cover the whole block, even the part before a declaration runs
//! (a `goto` may jump past it). When a name is not bound yet, resolution asks
//! the caller whether the frame's block declares it and binds it lazily.

use super::value::FrameAddress;
use crate::ast::{NodeId, Type};
use crate::interpreter::config::FrameAlloc;
use crate::interpreter::errors::CeskError;
use rustc_hash::FxHashMap;

/// Identifier of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl FrameId {
    pub const GLOBAL: FrameId = FrameId(0);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub address: FrameAddress,
    pub ty: Type,
}

/// Bindings of one block activation
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: FrameId,
    /// Block (or file) node this frame was created for
    pub scope: NodeId,
    pub parent: Option<FrameId>,
    bindings: FxHashMap<String, Binding>,
}

/// Outcome of resolving or declaring a name
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub address: FrameAddress,
    pub ty: Type,
    /// The binding was just created and its storage must be allocated
    pub fresh: bool,
}

#[derive(Debug, Clone)]
pub struct Environment {
    frames: FxHashMap<FrameId, Frame>,
    global: Option<FrameId>,
    by_scope: FxHashMap<NodeId, FrameId>,
    jump_cache: FxHashMap<(FrameId, NodeId), FrameId>,
    next_id: u64,
    policy: FrameAlloc,
}

impl Environment {
    pub fn new(policy: FrameAlloc) -> Self {
        Environment {
            frames: FxHashMap::default(),
            global: None,
            by_scope: FxHashMap::default(),
            jump_cache: FxHashMap::default(),
            next_id: 0,
            policy,
        }
    }

    /// Create the frame for an activation of `scope`, or reuse the single
    /// frame of that scope under 0-CFA. Returns the id and whether it was reused.
    pub fn push_frame(&mut self, scope: NodeId, parent: Option<FrameId>) -> (FrameId, bool) {
        if self.policy == FrameAlloc::ZeroCfa {
            if let Some(&id) = self.by_scope.get(&scope) {
                return (id, true);
            }
        }
        let id = FrameId(self.next_id);
        self.next_id += 1;
        self.frames.insert(
            id,
            Frame {
                id,
                scope,
                parent,
                bindings: FxHashMap::default(),
            },
        );
        if self.policy == FrameAlloc::ZeroCfa {
            self.by_scope.insert(scope, id);
        }
        (id, false)
    }

    pub fn frame(&self, id: FrameId) -> Result<&Frame, CeskError> {
        self.frames
            .get(&id)
            .ok_or_else(|| CeskError::unsupported(format!("unknown frame {}", id.0)))
    }

    pub fn scope_of(&self, id: FrameId) -> Result<NodeId, CeskError> {
        Ok(self.frame(id)?.scope)
    }

    pub fn parent_of(&self, id: FrameId) -> Result<Option<FrameId>, CeskError> {
        Ok(self.frame(id)?.parent)
    }

    /// Record the global frame; happens once, after globals are declared
    pub fn set_global(&mut self, id: FrameId) -> Result<(), CeskError> {
        if self.global.is_some() {
            return Err(CeskError::unsupported("global environment set twice"));
        }
        self.frame(id)?;
        self.global = Some(id);
        Ok(())
    }

    pub fn global(&self) -> Option<FrameId> {
        self.global
    }

    /// Bind `name` in `frame`. Idempotent: a second declaration of the same
    /// name in the same frame returns the existing address.
    pub fn declare(&mut self, frame: FrameId, name: &str, ty: &Type) -> Result<Resolved, CeskError> {
        let entry = self
            .frames
            .get_mut(&frame)
            .ok_or_else(|| CeskError::unsupported(format!("unknown frame {}", frame.0)))?;
        if let Some(binding) = entry.bindings.get(name) {
            return Ok(Resolved {
                address: binding.address.clone(),
                ty: binding.ty.clone(),
                fresh: false,
            });
        }
        let address = FrameAddress {
            frame,
            name: name.to_string(),
        };
        entry.bindings.insert(
            name.to_string(),
            Binding {
                address: address.clone(),
                ty: ty.clone(),
            },
        );
        Ok(Resolved {
            address,
            ty: ty.clone(),
            fresh: true,
        })
    }

    /// Binding visible from `frame` without lazy declaration
    pub fn lookup(&self, frame: FrameId, name: &str) -> Option<&Binding> {
        let mut current = Some(frame);
        while let Some(id) = current {
            let entry = self.frames.get(&id)?;
            if let Some(binding) = entry.bindings.get(name) {
                return Some(binding);
            }
            current = entry.parent;
        }
        let global = self.frames.get(&self.global?)?;
        global.bindings.get(name)
    }

    /// Resolve `name` from `frame`: local chain, then globals, then the
    /// implicit declaration lookup, which maps a frame's scope node to the
    /// type of `name` if that block declares it.
    pub fn resolve<F>(&mut self, frame: FrameId, name: &str, mut implicit: F) -> Result<Resolved, CeskError>
    where
        F: FnMut(NodeId) -> Option<Type>,
    {
        if let Some(binding) = self.lookup(frame, name) {
            return Ok(Resolved {
                address: binding.address.clone(),
                ty: binding.ty.clone(),
                fresh: false,
            });
        }
        let mut current = Some(frame);
        while let Some(id) = current {
            let entry = self.frame(id)?;
            let (scope, parent) = (entry.scope, entry.parent);
            if let Some(ty) = implicit(scope) {
                return self.declare(id, name, &ty);
            }
            current = parent;
        }
        Err(CeskError::UndefinedVariable {
            name: name.to_string(),
        })
    }

    /// Frame previously created for jumping into `block` from `anchor`
    pub fn cached_jump_frame(&self, anchor: FrameId, block: NodeId) -> Option<FrameId> {
        self.jump_cache.get(&(anchor, block)).copied()
    }

    pub fn cache_jump_frame(&mut self, anchor: FrameId, block: NodeId, frame: FrameId) {
        self.jump_cache.insert((anchor, block), frame);
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}
