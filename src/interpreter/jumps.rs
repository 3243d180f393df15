// Block entry, scope exit and goto

use super::control::Control;
use super::engine::Machine;
use super::errors::CeskError;
use super::state::State;
use crate::ast::NodeId;
use crate::memory::domain::Interpretation;
use crate::memory::environment::FrameId;
use std::rc::Rc;
use tracing::debug;

impl<I: Interpretation> Machine<I> {
    /// Frame for running the statements of `block` from `from`.
    ///
    /// Walks up `from`'s chain to the nearest frame whose block encloses
    /// `block`, then creates frames for the blocks in between. With `cached`
    /// those frames are created once per (anchor frame, block) and reused by
    /// later jumps.
    pub(crate) fn frame_for_block(&mut self, from: FrameId, block: NodeId, cached: bool) -> Result<FrameId, CeskError> {
        let chain = self.links.block_chain(&self.program, block);
        let mut current = Some(from);
        let mut anchor = None;
        while let Some(id) = current {
            let scope = self.env.scope_of(id)?;
            if let Some(depth) = chain.iter().position(|&outer| outer == scope) {
                anchor = Some((id, depth));
                break;
            }
            current = self.env.parent_of(id)?;
        }
        let (mut frame, depth) = anchor.ok_or_else(|| {
            CeskError::unsupported(format!("block {} is not reachable from frame {}", block, from.0))
        })?;
        for &inner in chain[..depth].iter().rev() {
            frame = match self.env.cached_jump_frame(frame, inner).filter(|_| cached) {
                Some(existing) => existing,
                None => {
                    let created = self.new_frame(inner, Some(frame));
                    if cached {
                        self.env.cache_jump_frame(frame, inner, created);
                    }
                    created
                }
            };
        }
        Ok(frame)
    }

    /// Give a state whose control moved the frame its new block runs in
    pub(crate) fn settle(&mut self, state: State) -> Result<State, CeskError> {
        match state.ctrl.block() {
            Some(block) => {
                let env = self.frame_for_block(state.env, block, false)?;
                Ok(State { env, ..state })
            }
            None => Ok(state),
        }
    }

    /// Start executing `block` (a branch, a loop body or a nested compound)
    pub(crate) fn enter_block(&mut self, state: &State, block: NodeId) -> Result<State, CeskError> {
        let program = Rc::clone(&self.program);
        let frame = self.frame_for_block(state.env, block, false)?;
        let ctrl = Control::enter(block, &program, &self.links)?;
        let entered = State {
            ctrl,
            env: frame,
            barrier: None,
            ..state.clone()
        };
        self.settle(entered)
    }

    pub(crate) fn goto(&mut self, state: &State, label: &str) -> Result<Vec<State>, CeskError> {
        let program = Rc::clone(&self.program);
        let stmt = state
            .ctrl
            .stmt(&program)
            .ok_or_else(|| CeskError::unsupported("goto outside statement control"))?;
        let function = self
            .links
            .function_of(stmt)
            .ok_or_else(|| CeskError::unsupported(format!("goto {} outside a function", label)))?;
        let target = self
            .links
            .label(function, label)
            .ok_or_else(|| CeskError::unsupported(format!("undefined label '{}'", label)))?;
        let (block, index) = self.links.position_of(&program, target)?;
        let env = self.frame_for_block(state.env, block, true)?;
        debug!(tid = state.tid.0, label, "jump");
        Ok(vec![State {
            ctrl: Control::at(block, index),
            env,
            barrier: None,
            ..state.clone()
        }])
    }
}
