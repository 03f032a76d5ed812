use std::fmt::Display;
use std::rc::Rc;

use crate::printer::AstPrinter;
use crate::token::TokenType;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 17] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Mod,
        BinaryOp::Pow,
        BinaryOp::Shl,
        BinaryOp::Shr,
        BinaryOp::BitAnd,
        BinaryOp::BitOr,
        BinaryOp::BitXor,
        BinaryOp::Eq,
        BinaryOp::Ne,
        BinaryOp::Lt,
        BinaryOp::Le,
        BinaryOp::Gt,
        BinaryOp::Ge,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.symbol() == symbol)
    }

    pub fn from_token(token_type: TokenType) -> Option<Self> {
        let op = match token_type {
            TokenType::Plus => BinaryOp::Add,
            TokenType::Minus => BinaryOp::Sub,
            TokenType::Star => BinaryOp::Mul,
            TokenType::Slash => BinaryOp::Div,
            TokenType::Percent => BinaryOp::Mod,
            TokenType::StarStar => BinaryOp::Pow,
            TokenType::LessLess => BinaryOp::Shl,
            TokenType::GreaterGreater => BinaryOp::Shr,
            TokenType::Ampersand => BinaryOp::BitAnd,
            TokenType::Pipe => BinaryOp::BitOr,
            TokenType::Caret => BinaryOp::BitXor,
            TokenType::EqualEqual => BinaryOp::Eq,
            TokenType::BangEqual => BinaryOp::Ne,
            TokenType::Less => BinaryOp::Lt,
            TokenType::LessEqual => BinaryOp::Le,
            TokenType::Greater => BinaryOp::Gt,
            TokenType::GreaterEqual => BinaryOp::Ge,
            _ => return None,
        };
        Some(op)
    }

    /// Operators whose operands may be swapped without changing the result.
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Mul
                | BinaryOp::BitAnd
                | BinaryOp::BitOr
                | BinaryOp::BitXor
                | BinaryOp::Eq
                | BinaryOp::Ne
        )
    }

    /// The operator that gives the same answer with the operands swapped (`a < b` is `b > a`).
    pub fn mirrored(self) -> Option<Self> {
        match self {
            BinaryOp::Lt => Some(BinaryOp::Gt),
            BinaryOp::Le => Some(BinaryOp::Ge),
            BinaryOp::Gt => Some(BinaryOp::Lt),
            BinaryOp::Ge => Some(BinaryOp::Le),
            op if op.is_commutative() => Some(op),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Pos,
    Invert,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Invert => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        value: Literal,
    },
    Variable {
        name: String,
    },
    Tuple {
        elements: Vec<Expr>,
    },
    List {
        elements: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        right: Box<Expr>,
    },
    Not {
        right: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
        keywords: Vec<(String, Expr)>,
    },
    Attribute {
        object: Box<Expr>,
        name: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        object: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    Lambda {
        decl: Rc<FunctionDecl>,
    },
}

impl Expr {
    pub fn int_literal(v: i64) -> Expr {
        Expr::Literal { value: Literal::Int(v) }
    }

    pub fn real_literal(v: f64) -> Expr {
        Expr::Literal { value: Literal::Real(v) }
    }

    pub fn variable(name: &str) -> Expr {
        Expr::Variable { name: name.to_owned() }
    }

    /// Whether the expression can appear on the left-hand side of `=`.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Expr::Variable { .. } | Expr::Attribute { .. } | Expr::Index { .. } | Expr::Slice { .. }
        )
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", AstPrinter::to_string(self))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<Expr>,
    pub variadic: bool,
}

/// A named function, a lambda (named `<lambda>`), a method or an operator (named after its
/// symbol, e.g. `+` or `len`).
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Vec<Expr>,
    pub body: Vec<Stmt>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassMember {
    Method(Rc<FunctionDecl>),
    Operator(Rc<FunctionDecl>),
    Attribute { name: String, value: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub name: String,
    pub error_type: Expr,
    pub body: Vec<Stmt>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportPath {
    /// `import "./util";`, relative to the importing module.
    Relative(String),
    /// `import math.vector;`, relative to the standard library root.
    Standard(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

impl Stmt {
    pub fn new(kind: StmtKind, line: u32) -> Self {
        Self { kind, line }
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", AstPrinter::stmt_to_string(self))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expression {
        expr: Expr,
    },
    Assign {
        targets: Vec<Expr>,
        values: Vec<Expr>,
    },
    /// A plain block, or a `try` block when `catches` is not empty.
    Block {
        statements: Vec<Stmt>,
        catches: Vec<CatchClause>,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        else_branch: Option<Vec<Stmt>>,
    },
    ForRange {
        variable: String,
        start: Expr,
        end: Expr,
        body: Vec<Stmt>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    Loop {
        body: Vec<Stmt>,
    },
    Break,
    Return {
        values: Vec<Expr>,
    },
    Throw {
        value: Expr,
    },
    Function {
        decl: Rc<FunctionDecl>,
    },
    Class {
        name: String,
        base: Option<Expr>,
        members: Vec<ClassMember>,
        value_type: bool,
    },
    Import {
        path: ImportPath,
        alias: Option<String>,
    },
}
