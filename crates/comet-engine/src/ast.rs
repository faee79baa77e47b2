//! AST for the module subset.

use crate::lexer::Span;

/// A parsed module body.
#[derive(Debug, Clone)]
pub struct ModuleBody {
    /// Statements in source order.
    pub statements: Vec<Stmt>,
}

impl ModuleBody {
    /// The import declarations, in declaration order.
    pub fn imports(&self) -> impl Iterator<Item = &ImportDecl> {
        self.statements.iter().filter_map(|stmt| match &stmt.kind {
            StmtKind::Import(decl) => Some(decl),
            _ => None,
        })
    }
}

/// A statement with its source span.
#[derive(Debug, Clone)]
pub struct Stmt {
    /// What the statement is.
    pub kind: StmtKind,
    /// Where it starts in the source.
    pub span: Span,
}

/// Statement kinds.
#[derive(Debug, Clone)]
pub enum StmtKind {
    /// An `import` declaration.
    Import(ImportDecl),
    /// `export const name = init;`
    ExportConst {
        /// Exported (and local) binding name.
        name: String,
        /// Initializer expression.
        init: Expr,
    },
    /// `export default expr;`
    ExportDefault(Expr),
    /// `export { a, b as c };`
    ExportList(Vec<ExportEntry>),
    /// `const name = init;`
    Const {
        /// Local binding name.
        name: String,
        /// Initializer expression.
        init: Expr,
    },
    /// `throw expr;`
    Throw(Expr),
    /// A bare expression statement.
    Expr(Expr),
}

/// One entry of an `export { … }` list.
#[derive(Debug, Clone)]
pub struct ExportEntry {
    /// The local binding being exported.
    pub local: String,
    /// The name it is exported under.
    pub exported: String,
}

/// An `import` declaration.
#[derive(Debug, Clone)]
pub struct ImportDecl {
    /// The module specifier, as written.
    pub specifier: String,
    /// The bindings the declaration introduces; empty for a side-effect
    /// only import (`import 'spec';`).
    pub bindings: Vec<ImportBinding>,
}

/// One binding introduced by an import declaration.
#[derive(Debug, Clone)]
pub enum ImportBinding {
    /// `import local from 'spec'`
    Default {
        /// Local binding name.
        local: String,
    },
    /// `import { imported as local } from 'spec'`
    Named {
        /// The export name in the dependency.
        imported: String,
        /// Local binding name.
        local: String,
    },
    /// `import * as local from 'spec'`
    Namespace {
        /// Local binding name.
        local: String,
    },
}

/// Expression kinds.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Numeric literal
    Number(f64),
    /// String literal
    Str(String),
    /// Boolean literal
    Bool(bool),
    /// `null`
    Null,
    /// Identifier reference
    Ident(String),
    /// Binary arithmetic
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// Unary minus
    Neg(Box<Expr>),
    /// Property access `object.property`
    Member {
        /// Object expression
        object: Box<Expr>,
        /// Property name
        property: String,
    },
    /// `new Error(message)`
    NewError {
        /// Message expression
        message: Box<Expr>,
        /// Span of the `new` keyword, for stack strings.
        span: Span,
    },
    /// Dynamic `import(specifier)`
    DynamicImport(Box<Expr>),
    /// `import.meta`
    ImportMeta,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}
