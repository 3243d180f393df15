//! Program counter over the canonical AST
//!
//! A [`Control`] is in one of three modes:
//! - `Stmt { block, index }`: the next statement is `block[index]`
//! - `Expr(node)`: a sub-expression evaluated out of statement order, whose
//!   value goes to the state's continuation
//! - `Invoke`: control left a function body or an OpenMP structured block,
//!   so the continuation must be invoked
//!
//! Falling off the end of a block climbs the precomputed parent links until
//! a block with remaining statements is found. A loop body climbs back to
//! its `While`, which re-tests the condition.

use super::errors::CeskError;
use crate::ast::{Links, NodeId, NodeKind, Program};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Stmt { block: NodeId, index: usize },
    Expr(NodeId),
    Invoke,
}

impl Control {
    pub fn at(block: NodeId, index: usize) -> Self {
        Control::Stmt { block, index }
    }

    /// Statement node under this control, looking through labels
    pub fn stmt(&self, program: &Program) -> Option<NodeId> {
        match self {
            Control::Stmt { block, index } => {
                let mut id = *program.block_items(*block)?.get(*index)?;
                while let Some(NodeKind::Label { stmt, .. }) = program.kind(id) {
                    id = *stmt;
                }
                Some(id)
            }
            Control::Expr(node) => Some(*node),
            Control::Invoke => None,
        }
    }

    /// Syntactic successor of a statement control
    pub fn successor(&self, program: &Program, links: &Links) -> Result<Control, CeskError> {
        match self {
            Control::Stmt { block, index } => Control::at(*block, index + 1).normalize(program, links),
            Control::Expr(node) => Err(CeskError::unsupported(format!(
                "expression control {} has no statement successor",
                node
            ))),
            Control::Invoke => Ok(Control::Invoke),
        }
    }

    /// Statement following `stmt`, wherever it sits
    pub fn after_stmt(stmt: NodeId, program: &Program, links: &Links) -> Result<Control, CeskError> {
        let (block, index) = links.position_of(program, stmt)?;
        Control::at(block, index + 1).normalize(program, links)
    }

    /// First statement of `block`, or what follows it when it is empty
    pub fn enter(block: NodeId, program: &Program, links: &Links) -> Result<Control, CeskError> {
        Control::at(block, 0).normalize(program, links)
    }

    /// Climb out of exhausted blocks
    fn normalize(self, program: &Program, links: &Links) -> Result<Control, CeskError> {
        let mut current = self;
        loop {
            let Control::Stmt { block, index } = current else {
                return Ok(current);
            };
            let items = program.block_items(block).ok_or_else(|| {
                CeskError::unsupported(format!("node {} is not a block", block))
            })?;
            if index < items.len() {
                return Ok(current);
            }
            current = Self::after_block(block, program, links)?;
        }
    }

    /// Where control goes once `block` has run to completion
    fn after_block(block: NodeId, program: &Program, links: &Links) -> Result<Control, CeskError> {
        let Some(parent) = links.parent(block) else {
            return Ok(Control::Invoke);
        };
        match program.kind(parent) {
            Some(NodeKind::Compound { .. }) | Some(NodeKind::FileAst { .. }) => {
                Ok(Control::at(parent, links.index(block) + 1))
            }
            Some(NodeKind::Label { .. }) | Some(NodeKind::If { .. }) => {
                let (outer, index) = links.position_of(program, parent)?;
                Ok(Control::at(outer, index + 1))
            }
            Some(NodeKind::While { .. }) => {
                let (outer, index) = links.position_of(program, parent)?;
                Ok(Control::at(outer, index))
            }
            Some(NodeKind::FuncDef { .. })
            | Some(NodeKind::OmpParallel { .. })
            | Some(NodeKind::OmpFor { .. })
            | Some(NodeKind::OmpCritical { .. }) => Ok(Control::Invoke),
            Some(other) => Err(CeskError::unsupported(format!(
                "block {} nested in {}",
                block,
                other.tag()
            ))),
            None => Ok(Control::Invoke),
        }
    }

    /// Block this control runs in
    pub fn block(&self) -> Option<NodeId> {
        match self {
            Control::Stmt { block, .. } => Some(*block),
            _ => None,
        }
    }
}
