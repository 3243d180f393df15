// Programmatic construction of canonical programs

use super::nodes::*;

/// Appends nodes to an arena and hands back their ids.
///
/// Nodes are created bottom-up: children first, then the node that refers to
/// them. [`ProgramBuilder::finish`] wraps the top-level items in a `FileAst`.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    nodes: Vec<Node>,
    line: usize,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: NodeKind) -> NodeId {
        self.line += 1;
        self.nodes.push(Node {
            kind,
            location: SourceLocation::new(self.line, 1),
        });
        self.nodes.len() - 1
    }

    pub fn finish(mut self, items: Vec<NodeId>) -> Program {
        let root = self.push(NodeKind::FileAst { items });
        Program {
            nodes: self.nodes,
            root,
        }
    }

    // Expressions

    pub fn int(&mut self, value: i64) -> NodeId {
        self.push(NodeKind::Constant(Constant::Int {
            value,
            ty: IntType::INT,
        }))
    }

    pub fn typed_int(&mut self, value: i64, ty: IntType) -> NodeId {
        self.push(NodeKind::Constant(Constant::Int { value, ty }))
    }

    pub fn char_lit(&mut self, value: u8) -> NodeId {
        self.push(NodeKind::Constant(Constant::Char(value)))
    }

    pub fn float(&mut self, value: f64) -> NodeId {
        self.push(NodeKind::Constant(Constant::Float {
            value,
            kind: FloatKind::Double,
        }))
    }

    pub fn string(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Constant(Constant::Str(text.to_string())))
    }

    pub fn id(&mut self, name: &str) -> NodeId {
        self.push(NodeKind::Id {
            name: name.to_string(),
        })
    }

    pub fn binary(&mut self, op: BinOp, left: NodeId, right: NodeId) -> NodeId {
        self.push(NodeKind::BinaryOp { op, left, right })
    }

    pub fn unary(&mut self, op: UnOp, operand: NodeId) -> NodeId {
        self.push(NodeKind::UnaryOp { op, operand })
    }

    pub fn cast(&mut self, ty: Type, expr: NodeId) -> NodeId {
        self.push(NodeKind::Cast { ty, expr })
    }

    pub fn size_of(&mut self, ty: Type) -> NodeId {
        self.push(NodeKind::SizeOf { ty })
    }

    pub fn index(&mut self, array: NodeId, index: NodeId) -> NodeId {
        self.push(NodeKind::ArrayRef { array, index })
    }

    /// Call a function by name
    pub fn call(&mut self, name: &str, args: Vec<NodeId>) -> NodeId {
        let callee = self.id(name);
        self.push(NodeKind::FuncCall { callee, args })
    }

    /// `printf` with a literal format string
    pub fn printf(&mut self, format: &str, mut args: Vec<NodeId>) -> NodeId {
        let format = self.string(format);
        args.insert(0, format);
        self.call("printf", args)
    }

    // Statements

    pub fn decl(&mut self, name: &str, ty: Type, init: Option<NodeId>) -> NodeId {
        self.push(NodeKind::Decl {
            name: name.to_string(),
            ty,
            init,
        })
    }

    pub fn assign(&mut self, lvalue: NodeId, rvalue: NodeId) -> NodeId {
        self.push(NodeKind::Assignment { lvalue, rvalue })
    }

    /// `name = rvalue;`
    pub fn assign_to(&mut self, name: &str, rvalue: NodeId) -> NodeId {
        let lvalue = self.id(name);
        self.assign(lvalue, rvalue)
    }

    pub fn block(&mut self, items: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Compound { items })
    }

    pub fn if_else(&mut self, cond: NodeId, then_branch: NodeId, else_branch: Option<NodeId>) -> NodeId {
        self.push(NodeKind::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    pub fn while_loop(&mut self, cond: NodeId, body: NodeId) -> NodeId {
        self.push(NodeKind::While { cond, body })
    }

    pub fn goto(&mut self, label: &str) -> NodeId {
        self.push(NodeKind::Goto {
            label: label.to_string(),
        })
    }

    pub fn label(&mut self, name: &str, stmt: NodeId) -> NodeId {
        self.push(NodeKind::Label {
            name: name.to_string(),
            stmt,
        })
    }

    pub fn ret(&mut self, expr: Option<NodeId>) -> NodeId {
        self.push(NodeKind::Return { expr })
    }

    pub fn empty(&mut self) -> NodeId {
        self.push(NodeKind::EmptyStatement)
    }

    // Top-level items

    pub fn function(&mut self, name: &str, return_type: Type, params: Vec<Param>, items: Vec<NodeId>) -> NodeId {
        let body = self.block(items);
        self.push(NodeKind::FuncDef {
            name: name.to_string(),
            return_type,
            params,
            body,
        })
    }

    pub fn struct_decl(&mut self, name: &str, fields: Vec<Field>, union: bool) -> NodeId {
        self.push(NodeKind::StructDecl {
            name: name.to_string(),
            fields,
            union,
        })
    }

    // OpenMP

    pub fn omp_parallel(&mut self, clauses: Vec<OmpClause>, items: Vec<NodeId>) -> NodeId {
        let block = self.block(items);
        self.push(NodeKind::OmpParallel { clauses, block })
    }

    /// `for (var = init; var < bound; var = var + 1)` distributed over tasks
    pub fn omp_for(&mut self, clauses: Vec<OmpClause>, var: &str, init: NodeId, bound: NodeId, items: Vec<NodeId>) -> NodeId {
        let step = self.int(1);
        let body = self.block(items);
        self.push(NodeKind::OmpFor {
            clauses,
            var: var.to_string(),
            init,
            cond_op: BinOp::Lt,
            bound,
            step_op: BinOp::Add,
            step,
            body,
        })
    }

    pub fn omp_critical(&mut self, items: Vec<NodeId>) -> NodeId {
        let block = self.block(items);
        self.push(NodeKind::OmpCritical { name: None, block })
    }
}

pub fn param(name: &str, ty: Type) -> Param {
    Param {
        name: name.to_string(),
        ty,
    }
}

pub fn field(name: &str, ty: Type) -> Field {
    Field {
        name: name.to_string(),
        ty,
    }
}
