// Canonical AST consumed by the machine

use serde::{Deserialize, Serialize};

/// Stable index of a node in [`Program::nodes`]
pub type NodeId = usize;

/// Source location information for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Integer ranks, narrowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntKind {
    Char,
    Short,
    Int,
    Long,
    LongLong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloatKind {
    Float,
    Double,
    LongDouble,
}

/// An integer C type: rank plus signedness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntType {
    pub kind: IntKind,
    pub signed: bool,
}

impl IntType {
    pub const CHAR: IntType = IntType::new(IntKind::Char, true);
    pub const UNSIGNED_CHAR: IntType = IntType::new(IntKind::Char, false);
    pub const INT: IntType = IntType::new(IntKind::Int, true);
    pub const UNSIGNED_INT: IntType = IntType::new(IntKind::Int, false);
    pub const LONG: IntType = IntType::new(IntKind::Long, true);
    pub const UNSIGNED_LONG: IntType = IntType::new(IntKind::Long, false);

    pub const fn new(kind: IntKind, signed: bool) -> Self {
        IntType { kind, signed }
    }

    /// C spelling, used in diagnostics
    pub fn name(&self) -> String {
        let base = match self.kind {
            IntKind::Char => "char",
            IntKind::Short => "short",
            IntKind::Int => "int",
            IntKind::Long => "long",
            IntKind::LongLong => "long long",
        };
        if self.signed {
            base.to_string()
        } else {
            format!("unsigned {}", base)
        }
    }
}

/// Base types supported by the machine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseType {
    Void,
    Integer(IntType),
    Floating(FloatKind),
    Struct(String),
    Union(String),
    /// Function designator; `pointer_depth` 1 is a function pointer
    Function,
}

/// Type representation: base type, pointer depth and an optional
/// single array dimension (multi-dimensional arrays are flattened upstream)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Type {
    pub base: BaseType,
    #[serde(default)]
    pub pointer_depth: usize,
    #[serde(default)]
    pub array_len: Option<usize>,
}

impl Type {
    pub fn new(base: BaseType) -> Self {
        Type {
            base,
            pointer_depth: 0,
            array_len: None,
        }
    }

    pub fn void() -> Self {
        Type::new(BaseType::Void)
    }

    pub fn integer(ty: IntType) -> Self {
        Type::new(BaseType::Integer(ty))
    }

    pub fn int() -> Self {
        Type::integer(IntType::INT)
    }

    pub fn char() -> Self {
        Type::integer(IntType::CHAR)
    }

    pub fn floating(kind: FloatKind) -> Self {
        Type::new(BaseType::Floating(kind))
    }

    pub fn structure(name: &str) -> Self {
        Type::new(BaseType::Struct(name.to_string()))
    }

    pub fn with_pointer(mut self) -> Self {
        self.pointer_depth += 1;
        self
    }

    pub fn with_array(mut self, len: usize) -> Self {
        self.array_len = Some(len);
        self
    }

    pub fn is_array(&self) -> bool {
        self.array_len.is_some()
    }

    pub fn is_pointer(&self) -> bool {
        self.array_len.is_none() && self.pointer_depth > 0
    }

    pub fn is_void(&self) -> bool {
        self.array_len.is_none() && self.pointer_depth == 0 && self.base == BaseType::Void
    }

    /// The integer type of a plain integer scalar
    pub fn int_type(&self) -> Option<IntType> {
        match (&self.base, self.pointer_depth, self.array_len) {
            (BaseType::Integer(ty), 0, None) => Some(*ty),
            _ => None,
        }
    }

    /// Element type of an array
    pub fn element(&self) -> Type {
        Type {
            base: self.base.clone(),
            pointer_depth: self.pointer_depth,
            array_len: None,
        }
    }

    /// Type reached through one level of indirection (`*p` or `a[i]`)
    pub fn pointee(&self) -> Option<Type> {
        if self.array_len.is_some() {
            return Some(self.element());
        }
        if self.pointer_depth == 0 {
            return None;
        }
        Some(Type {
            base: self.base.clone(),
            pointer_depth: self.pointer_depth - 1,
            array_len: None,
        })
    }

    /// Pointer to this type; arrays decay to a pointer to their element
    pub fn address_of(&self) -> Type {
        self.element().with_pointer()
    }

    /// Type of the value an expression of this type yields: arrays decay
    pub fn decayed(&self) -> Type {
        if self.is_array() {
            self.address_of()
        } else {
            self.clone()
        }
    }
}

/// Binary operators left after desugaring (no short-circuit, no compound assignment)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

/// Unary operators (increments are lowered to assignments upstream)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Neg,    // -x
    Plus,   // +x
    Not,    // !x
    BitNot, // ~x
    Deref,  // *x
    AddrOf, // &x
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int { value: i64, ty: IntType },
    Float { value: f64, kind: FloatKind },
    Char(u8),
    Str(String),
}

/// Parsed OpenMP clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OmpClause {
    NumThreads(NodeId),
    Private(Vec<String>),
    FirstPrivate(Vec<String>),
    Shared(Vec<String>),
    NoWait,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// Struct or union member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

/// The closed set of node kinds in the canonical subset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    FileAst {
        items: Vec<NodeId>,
    },
    FuncDef {
        name: String,
        return_type: Type,
        params: Vec<Param>,
        body: NodeId,
    },
    StructDecl {
        name: String,
        fields: Vec<Field>,
        #[serde(default)]
        union: bool,
    },
    Decl {
        name: String,
        ty: Type,
        init: Option<NodeId>,
    },
    Compound {
        items: Vec<NodeId>,
    },
    Assignment {
        lvalue: NodeId,
        rvalue: NodeId,
    },
    If {
        cond: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    While {
        cond: NodeId,
        body: NodeId,
    },
    Goto {
        label: String,
    },
    Label {
        name: String,
        stmt: NodeId,
    },
    Return {
        expr: Option<NodeId>,
    },
    EmptyStatement,
    FuncCall {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    Id {
        name: String,
    },
    Constant(Constant),
    BinaryOp {
        op: BinOp,
        left: NodeId,
        right: NodeId,
    },
    UnaryOp {
        op: UnOp,
        operand: NodeId,
    },
    Cast {
        ty: Type,
        expr: NodeId,
    },
    SizeOf {
        ty: Type,
    },
    ArrayRef {
        array: NodeId,
        index: NodeId,
    },
    OmpParallel {
        clauses: Vec<OmpClause>,
        block: NodeId,
    },
    /// `for (var = init; var cond_op bound; var = var step_op step) body`
    OmpFor {
        clauses: Vec<OmpClause>,
        var: String,
        init: NodeId,
        cond_op: BinOp,
        bound: NodeId,
        step_op: BinOp,
        step: NodeId,
        body: NodeId,
    },
    OmpCritical {
        name: Option<String>,
        block: NodeId,
    },
}

impl NodeKind {
    /// Short tag for diagnostics
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::FileAst { .. } => "FileAST",
            NodeKind::FuncDef { .. } => "FuncDef",
            NodeKind::StructDecl { .. } => "StructDecl",
            NodeKind::Decl { .. } => "Decl",
            NodeKind::Compound { .. } => "Compound",
            NodeKind::Assignment { .. } => "Assignment",
            NodeKind::If { .. } => "If",
            NodeKind::While { .. } => "While",
            NodeKind::Goto { .. } => "Goto",
            NodeKind::Label { .. } => "Label",
            NodeKind::Return { .. } => "Return",
            NodeKind::EmptyStatement => "EmptyStatement",
            NodeKind::FuncCall { .. } => "FuncCall",
            NodeKind::Id { .. } => "ID",
            NodeKind::Constant(_) => "Constant",
            NodeKind::BinaryOp { .. } => "BinaryOp",
            NodeKind::UnaryOp { .. } => "UnaryOp",
            NodeKind::Cast { .. } => "Cast",
            NodeKind::SizeOf { .. } => "SizeOf",
            NodeKind::ArrayRef { .. } => "ArrayRef",
            NodeKind::OmpParallel { .. } => "OmpParallel",
            NodeKind::OmpFor { .. } => "OmpFor",
            NodeKind::OmpCritical { .. } => "OmpCritical",
        }
    }

    /// Direct children in source order
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::FileAst { items } | NodeKind::Compound { items } => items.clone(),
            NodeKind::FuncDef { body, .. } => vec![*body],
            NodeKind::StructDecl { .. }
            | NodeKind::Goto { .. }
            | NodeKind::EmptyStatement
            | NodeKind::Id { .. }
            | NodeKind::Constant(_)
            | NodeKind::SizeOf { .. } => Vec::new(),
            NodeKind::Decl { init, .. } => init.iter().copied().collect(),
            NodeKind::Assignment { lvalue, rvalue } => vec![*lvalue, *rvalue],
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let mut children = vec![*cond, *then_branch];
                children.extend(else_branch.iter().copied());
                children
            }
            NodeKind::While { cond, body } => vec![*cond, *body],
            NodeKind::Label { stmt, .. } => vec![*stmt],
            NodeKind::Return { expr } => expr.iter().copied().collect(),
            NodeKind::FuncCall { callee, args } => {
                let mut children = vec![*callee];
                children.extend(args.iter().copied());
                children
            }
            NodeKind::BinaryOp { left, right, .. } => vec![*left, *right],
            NodeKind::UnaryOp { operand, .. } => vec![*operand],
            NodeKind::Cast { expr, .. } => vec![*expr],
            NodeKind::ArrayRef { array, index } => vec![*array, *index],
            NodeKind::OmpParallel { clauses, block } => {
                let mut children = clause_children(clauses);
                children.push(*block);
                children
            }
            NodeKind::OmpFor {
                clauses,
                init,
                bound,
                step,
                body,
                ..
            } => {
                let mut children = clause_children(clauses);
                children.extend([*init, *bound, *step, *body]);
                children
            }
            NodeKind::OmpCritical { block, .. } => vec![*block],
        }
    }
}

fn clause_children(clauses: &[OmpClause]) -> Vec<NodeId> {
    clauses
        .iter()
        .filter_map(|clause| match clause {
            OmpClause::NumThreads(expr) => Some(*expr),
            _ => None,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    #[serde(default)]
    pub location: SourceLocation,
}

/// Arena holding every node of one translation unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub nodes: Vec<Node>,
    pub root: NodeId,
}

impl Program {
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id).map(|node| &node.kind)
    }

    pub fn location(&self, id: NodeId) -> SourceLocation {
        self.nodes
            .get(id)
            .map(|node| node.location)
            .unwrap_or_default()
    }

    /// Statement list of a `Compound` or `FileAst` node
    pub fn block_items(&self, id: NodeId) -> Option<&[NodeId]> {
        match self.kind(id)? {
            NodeKind::Compound { items } | NodeKind::FileAst { items } => Some(items),
            _ => None,
        }
    }
}
