use crate::{span::Position, token::Token, types::Type};

/// An expression node. `ty` starts out as `Type::Empty` and is filled in
/// by semantic analysis; after a program checks cleanly every reachable
/// expression carries a non-empty type.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind:     ExprKind,
    pub ty:       Type,
    pub position: Position,
}

impl Expr {
    pub fn new(kind: ExprKind, position: Position) -> Self {
        Self {
            kind,
            ty: Type::Empty,
            position,
        }
    }

    /// Lvalues denote a location: a name, a call result or a member
    /// access.
    pub fn is_lvalue_shaped(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Ident(_) | ExprKind::Call(_, _) | ExprKind::Member(_, _, _)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Str(String),
    Char(String),
    Array(Vec<Expr>),
    Ident(Token),
    Unary(Token, Box<Expr>),
    Binary(Box<Expr>, Token, Box<Expr>),
    Assign(Box<Expr>, Token, Box<Expr>),
    Member(Box<Expr>, Token, Box<Expr>),
    Call(Token, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Null,
    Compound(Vec<Stmt>),
    Expr(Expr),
    Return(Expr, Token),
    If {
        cond:      Expr,
        then:      Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    Loop {
        body: Box<Stmt>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    /// `loop_id` is 0 until semantic analysis tags the statement with the
    /// identifier of its enclosing loop frame.
    Break {
        token:   Token,
        loop_id: u32,
    },
    Continue {
        token:   Token,
        loop_id: u32,
    },
    Var(VarDef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Token,
    pub ty:   Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDef {
    pub name:        Token,
    pub params:      Vec<Param>,
    pub return_ty:   Type,
    /// `None` for `external` declarations, which carry no body.
    pub body:        Option<Stmt>,
    pub is_external: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDef {
    pub name:      Token,
    pub ty:        Type,
    pub init:      Option<Expr>,
    pub is_const:  bool,
    pub is_global: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name:    Token,
    pub members: Vec<(Visibility, Def)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Def {
    Function(FnDef),
    Variable(VarDef),
    Class(ClassDef),
}

/// One parsed source file: the contents of the `<define>` region plus
/// the top-level statements that become the body of the implicit `main`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Program {
    pub definitions: Vec<Def>,
    pub statements:  Vec<Stmt>,
}
