//! Precomputed lookup tables over a [`Program`]
//!
//! [`Links`] is built once per session and answers the structural questions
//! the machine asks while stepping:
//!
//! - the parent of a node and its index inside the parent's block
//! - the function enclosing a node and the labels declared in it
//! - the declarations made directly inside each block, used for lazy
//!   (implicit) declaration when a jump skips a declaration statement
//! - functions and struct/union declarations by name
//!
//! Building the tables also checks the shape invariants the desugaring
//! pipeline promises; a violation is reported as [`CeskError::Unsupported`].

use super::nodes::{NodeId, NodeKind, Program, Type};
use crate::interpreter::errors::CeskError;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
pub struct Links {
    parent: Vec<Option<NodeId>>,
    index: Vec<usize>,
    function_of: Vec<Option<NodeId>>,
    labels: FxHashMap<(NodeId, String), NodeId>,
    functions: FxHashMap<String, NodeId>,
    aggregates: FxHashMap<String, NodeId>,
    scope_decls: FxHashMap<NodeId, Vec<NodeId>>,
}

impl Links {
    pub fn build(program: &Program) -> Result<Self, CeskError> {
        let count = program.nodes.len();
        let mut links = Links {
            parent: vec![None; count],
            index: vec![0; count],
            function_of: vec![None; count],
            labels: FxHashMap::default(),
            functions: FxHashMap::default(),
            aggregates: FxHashMap::default(),
            scope_decls: FxHashMap::default(),
        };

        match program.kind(program.root) {
            Some(NodeKind::FileAst { .. }) => {}
            _ => return Err(CeskError::unsupported("program root is not a FileAST")),
        }

        let mut visited = vec![false; count];
        let mut stack = vec![(program.root, None::<NodeId>)];
        while let Some((id, function)) = stack.pop() {
            let kind = program
                .kind(id)
                .ok_or_else(|| CeskError::unsupported(format!("dangling node id {}", id)))?;
            if visited[id] {
                return Err(CeskError::unsupported(format!(
                    "node {} is shared between parents",
                    id
                )));
            }
            visited[id] = true;
            links.function_of[id] = function;

            let function = match kind {
                NodeKind::FuncDef { name, .. } => {
                    if links.functions.insert(name.clone(), id).is_some() {
                        return Err(CeskError::unsupported(format!(
                            "duplicate definition of function '{}'",
                            name
                        )));
                    }
                    Some(id)
                }
                NodeKind::StructDecl { name, .. } => {
                    links.aggregates.insert(name.clone(), id);
                    function
                }
                NodeKind::Label { name, .. } => {
                    let owner = function.ok_or_else(|| {
                        CeskError::unsupported(format!("label '{}' outside a function", name))
                    })?;
                    if links.labels.insert((owner, name.clone()), id).is_some() {
                        return Err(CeskError::unsupported(format!(
                            "duplicate label '{}'",
                            name
                        )));
                    }
                    function
                }
                _ => function,
            };

            links.check_shape(program, id, kind)?;

            let children = kind.children();
            for (position, &child) in children.iter().enumerate() {
                if child >= count {
                    return Err(CeskError::unsupported(format!("dangling node id {}", child)));
                }
                links.parent[child] = Some(id);
                links.index[child] = position;
            }
            if matches!(kind, NodeKind::Compound { .. } | NodeKind::FileAst { .. }) {
                let decls = declarations_in(program, &children);
                links.scope_decls.insert(id, decls);
            }
            for &child in children.iter().rev() {
                stack.push((child, function));
            }
        }

        links.check_single_returns(program)?;
        Ok(links)
    }

    fn check_shape(&self, program: &Program, id: NodeId, kind: &NodeKind) -> Result<(), CeskError> {
        let require_block = |child: NodeId, what: &str| -> Result<(), CeskError> {
            match program.kind(child) {
                Some(NodeKind::Compound { .. }) => Ok(()),
                _ => Err(CeskError::unsupported(format!(
                    "{} of node {} must be a compound block",
                    what, id
                ))),
            }
        };
        match kind {
            NodeKind::FuncDef { body, .. } => require_block(*body, "function body"),
            NodeKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                require_block(*then_branch, "then branch")?;
                if let Some(else_branch) = else_branch {
                    require_block(*else_branch, "else branch")?;
                }
                Ok(())
            }
            NodeKind::While { body, .. } => require_block(*body, "loop body"),
            NodeKind::OmpParallel { block, .. } | NodeKind::OmpCritical { block, .. } => {
                require_block(*block, "structured block")
            }
            NodeKind::OmpFor { body, .. } => require_block(*body, "loop body"),
            NodeKind::ArrayRef { array, .. } => match program.kind(*array) {
                Some(NodeKind::ArrayRef { .. }) => Err(CeskError::unsupported(
                    "nested array reference (multi-dimensional arrays must be flattened)",
                )),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    fn check_single_returns(&self, program: &Program) -> Result<(), CeskError> {
        let mut returns: FxHashMap<NodeId, usize> = FxHashMap::default();
        for (id, node) in program.nodes.iter().enumerate() {
            if let NodeKind::Return { .. } = node.kind {
                let Some(function) = self.function_of.get(id).copied().flatten() else {
                    continue;
                };
                let count = returns.entry(function).or_insert(0);
                *count += 1;
                if *count > 1 {
                    return Err(CeskError::unsupported(format!(
                        "function at node {} has more than one return site",
                        function
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parent.get(id).copied().flatten()
    }

    /// Position of `id` among its parent's children
    pub fn index(&self, id: NodeId) -> usize {
        self.index.get(id).copied().unwrap_or(0)
    }

    pub fn function_of(&self, id: NodeId) -> Option<NodeId> {
        self.function_of.get(id).copied().flatten()
    }

    pub fn function(&self, name: &str) -> Option<NodeId> {
        self.functions.get(name).copied()
    }

    pub fn aggregate(&self, name: &str) -> Option<NodeId> {
        self.aggregates.get(name).copied()
    }

    pub fn label(&self, function: NodeId, name: &str) -> Option<NodeId> {
        self.labels.get(&(function, name.to_string())).copied()
    }

    /// Declarations made directly inside a block, in source order
    pub fn scope_decls(&self, block: NodeId) -> &[NodeId] {
        self.scope_decls
            .get(&block)
            .map(|decls| decls.as_slice())
            .unwrap_or(&[])
    }

    /// Type of `name` if `block` declares it directly
    pub fn scope_decl_type(&self, program: &Program, block: NodeId, name: &str) -> Option<Type> {
        self.scope_decls(block)
            .iter()
            .find_map(|&decl| match program.kind(decl) {
                Some(NodeKind::Decl { name: declared, ty, .. }) if declared == name => {
                    Some(ty.clone())
                }
                _ => None,
            })
    }

    /// The block and index holding statement `stmt`, looking through labels
    pub fn position_of(&self, program: &Program, stmt: NodeId) -> Result<(NodeId, usize), CeskError> {
        let mut current = stmt;
        loop {
            let parent = self.parent(current).ok_or_else(|| {
                CeskError::unsupported(format!("statement {} is not inside a block", stmt))
            })?;
            match program.kind(parent) {
                Some(NodeKind::Compound { .. }) | Some(NodeKind::FileAst { .. }) => {
                    return Ok((parent, self.index(current)));
                }
                Some(NodeKind::Label { .. }) => current = parent,
                _ => {
                    return Err(CeskError::unsupported(format!(
                        "statement {} is not inside a block",
                        stmt
                    )))
                }
            }
        }
    }

    /// Blocks enclosing `block` (inclusive), innermost first, stopping at the
    /// function body or structured block that owns them
    pub fn block_chain(&self, program: &Program, block: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = Some(block);
        while let Some(id) = current {
            match program.kind(id) {
                Some(NodeKind::Compound { .. }) | Some(NodeKind::FileAst { .. }) => chain.push(id),
                Some(NodeKind::FuncDef { .. })
                | Some(NodeKind::OmpParallel { .. })
                | Some(NodeKind::OmpFor { .. })
                | Some(NodeKind::OmpCritical { .. }) => break,
                _ => {}
            }
            current = self.parent(id);
        }
        chain
    }
}

/// Decl nodes among `items`, including those wrapped in labels
fn declarations_in(program: &Program, items: &[NodeId]) -> Vec<NodeId> {
    let mut decls = Vec::new();
    for &item in items {
        let mut current = item;
        while let Some(NodeKind::Label { stmt, .. }) = program.kind(current) {
            current = *stmt;
        }
        if let Some(NodeKind::Decl { .. }) = program.kind(current) {
            decls.push(current);
        }
    }
    decls
}
