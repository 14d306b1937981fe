//! Abstract Syntax Tree for jssp documents.
//!
//! Declarations carry [`NameRef`]s for every symbolic reference. The parser
//! records the scope each reference was written in; the binder fills in the
//! resolved [`SymbolId`] at the file's completion barrier.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use super::token::Position;
use crate::resolve::{FileId, ScopeId, SymbolId};

/// Identifier of a node, unique within one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

/// A value inside an annotation block.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl AnnotationValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for AnnotationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Ordered key/value metadata attached to the declaration that follows it.
///
/// Keys may repeat in source; the last occurrence wins but keeps the slot of
/// the first one, so iteration order stays stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationBlock {
    entries: Vec<(String, AnnotationValue)>,
}

impl AnnotationBlock {
    pub fn from_pairs(pairs: Vec<(String, AnnotationValue)>) -> Self {
        let mut block = Self::default();
        for (key, value) in pairs {
            block.insert(key, value);
        }
        block
    }

    pub fn insert(&mut self, key: String, value: AnnotationValue) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Merge another block into this one; `other` wins on conflicts.
    pub fn merge(&mut self, other: AnnotationBlock) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&AnnotationValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Value rendered as text, whatever its literal kind.
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).map(ToString::to_string)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnnotationValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where a document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOrigin {
    /// Part of the project being built; lowered into the code model.
    Project,
    /// Found through a builtin search root; provides symbols only.
    Builtin,
}

/// One parsed file.
#[derive(Debug, Clone)]
pub struct AstDocument {
    pub file: FileId,
    pub path: PathBuf,
    pub origin: DocumentOrigin,
    /// Root (file) scope of this document.
    pub scope: ScopeId,
    pub imports: Vec<ImportEdge>,
    pub nodes: Vec<AstNode>,
    /// Result shapes synthesized for `select` queries with undeclared return types.
    pub shapes: Vec<ResultShape>,
}

impl AstDocument {
    /// Top-level declaration with the given id.
    pub fn node(&self, id: NodeId) -> Option<&AstNode> {
        self.nodes.iter().find(|node| node.meta().id == id)
    }

    pub fn table(&self, id: NodeId) -> Option<&TableDecl> {
        self.nodes.iter().find_map(|node| match node {
            AstNode::Table(table) if table.meta.id == id => Some(table),
            _ => None,
        })
    }

    pub fn controller(&self, id: NodeId) -> Option<&ControllerDecl> {
        self.nodes.iter().find_map(|node| match node {
            AstNode::Controller(c) if c.meta.id == id => Some(c),
            _ => None,
        })
    }

    pub fn shape(&self, id: NodeId) -> Option<&ResultShape> {
        self.shapes.iter().find(|shape| shape.id == id)
    }
}

/// An `import` resolved to a parsed document.
#[derive(Debug, Clone)]
pub struct ImportEdge {
    pub importer: PathBuf,
    pub imported: PathBuf,
    pub document: Arc<AstDocument>,
}

/// Kind tag covering every declaration kind, nested ones included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Domain,
    Table,
    Entity,
    Struct,
    Mapper,
    Query,
    Controller,
    Handler,
    Api,
    Page,
    Property,
    Func,
    Import,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Domain => "domain",
            Self::Table => "table",
            Self::Entity => "entity",
            Self::Struct => "struct",
            Self::Mapper => "mapper",
            Self::Query => "query",
            Self::Controller => "controller",
            Self::Handler => "handler",
            Self::Api => "api",
            Self::Page => "page",
            Self::Property => "property",
            Self::Func => "func",
            Self::Import => "import",
        };
        f.write_str(name)
    }
}

/// Common header of every declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMeta {
    pub id: NodeId,
    pub pos: Position,
    pub annotations: AnnotationBlock,
}

/// A top-level declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Import(ImportDecl),
    Domain(DomainDecl),
    Table(TableDecl),
    Entity(EntityDecl),
    Struct(StructDecl),
    Mapper(MapperDecl),
    Controller(ControllerDecl),
    Api(ApiDecl),
    Page(PageDecl),
    Property(PropertyDecl),
    Func(FuncDecl),
}

impl AstNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Import(_) => NodeKind::Import,
            Self::Domain(_) => NodeKind::Domain,
            Self::Table(_) => NodeKind::Table,
            Self::Entity(_) => NodeKind::Entity,
            Self::Struct(_) => NodeKind::Struct,
            Self::Mapper(_) => NodeKind::Mapper,
            Self::Controller(_) => NodeKind::Controller,
            Self::Api(_) => NodeKind::Api,
            Self::Page(_) => NodeKind::Page,
            Self::Property(_) => NodeKind::Property,
            Self::Func(_) => NodeKind::Func,
        }
    }

    pub fn meta(&self) -> &NodeMeta {
        match self {
            Self::Import(d) => &d.meta,
            Self::Domain(d) => &d.meta,
            Self::Table(d) => &d.meta,
            Self::Entity(d) => &d.meta,
            Self::Struct(d) => &d.meta,
            Self::Mapper(d) => &d.meta,
            Self::Controller(d) => &d.meta,
            Self::Api(d) => &d.meta,
            Self::Page(d) => &d.meta,
            Self::Property(d) => &d.meta,
            Self::Func(d) => &d.meta,
        }
    }

    /// Declared name; imports have none.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Import(_) => None,
            Self::Domain(d) => Some(&d.name),
            Self::Table(d) => Some(&d.name),
            Self::Entity(d) => Some(&d.name),
            Self::Struct(d) => Some(&d.name),
            Self::Mapper(d) => Some(&d.name),
            Self::Controller(d) => Some(&d.name),
            Self::Api(d) => Some(&d.name),
            Self::Page(d) => Some(&d.name),
            Self::Property(d) => Some(&d.name),
            Self::Func(d) => Some(&d.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub meta: NodeMeta,
    /// Path as written in source.
    pub path: String,
    pub resolved: PathBuf,
}

/// A symbolic reference, resolved lazily by the binder.
#[derive(Debug, Clone, PartialEq)]
pub struct NameRef {
    pub name: String,
    pub pos: Position,
    pub scope: ScopeId,
    /// Source-order sequence number within the file.
    pub seq: u32,
    pub target: Option<SymbolId>,
}

/// Builtin scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Int,
    BigInt,
    Float,
    Double,
    Decimal,
    Bool,
    String,
    Text,
    Char(u32),
    Varchar(u32),
    Date,
    DateTime,
    Void,
    Any,
}

impl Primitive {
    /// Look up a primitive by keyword; sized types are handled by the parser.
    pub fn from_name(name: &str) -> Option<Self> {
        let p = match name {
            "int" => Self::Int,
            "bigint" | "long" => Self::BigInt,
            "float" => Self::Float,
            "double" => Self::Double,
            "decimal" => Self::Decimal,
            "bool" | "boolean" => Self::Bool,
            "string" => Self::String,
            "text" => Self::Text,
            "date" => Self::Date,
            "datetime" => Self::DateTime,
            "void" => Self::Void,
            "any" => Self::Any,
            _ => return None,
        };
        Some(p)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => f.write_str("int"),
            Self::BigInt => f.write_str("bigint"),
            Self::Float => f.write_str("float"),
            Self::Double => f.write_str("double"),
            Self::Decimal => f.write_str("decimal"),
            Self::Bool => f.write_str("bool"),
            Self::String => f.write_str("string"),
            Self::Text => f.write_str("text"),
            Self::Char(n) => write!(f, "char({n})"),
            Self::Varchar(n) => write!(f, "varchar({n})"),
            Self::Date => f.write_str("date"),
            Self::DateTime => f.write_str("datetime"),
            Self::Void => f.write_str("void"),
            Self::Any => f.write_str("any"),
        }
    }
}

/// Serialized as its source spelling, e.g. `varchar(100)`.
impl Serialize for Primitive {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A type as written in source.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Primitive(Primitive),
    List(Box<TypeRef>),
    Named(NameRef),
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => write!(f, "{p}"),
            Self::List(inner) => write!(f, "list<{inner}>"),
            Self::Named(name) => f.write_str(&name.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomainDecl {
    pub meta: NodeMeta,
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: TypeRef,
    pub auto: bool,
    pub nullable: bool,
    pub default: Option<Literal>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDecl {
    pub meta: NodeMeta,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub keys: Vec<String>,
    pub indexes: Vec<IndexDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityDecl {
    pub meta: NodeMeta,
    pub name: String,
    /// Table the entity is bound to (`entity User : tb_user`).
    pub table: Option<NameRef>,
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub meta: NodeMeta,
    pub name: String,
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapperDecl {
    pub meta: NodeMeta,
    pub name: String,
    pub queries: Vec<QueryDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryDecl {
    pub meta: NodeMeta,
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Option<TypeRef>,
    /// Raw SQL body.
    pub body: String,
    pub body_pos: Position,
    /// Scope the query header was declared in, for table lookups.
    pub scope: ScopeId,
    pub seq: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerDecl {
    pub meta: NodeMeta,
    pub name: String,
    pub handlers: Vec<HandlerDecl>,
}

impl ControllerDecl {
    pub fn handler(&self, name: &str) -> Option<&HandlerDecl> {
        self.handlers.iter().find(|h| h.func.name == name)
    }
}

/// A routed function inside a controller.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerDecl {
    pub func: FuncDecl,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiMember {
    pub controller: NameRef,
    /// `Controller.handler`; `None` pulls in every handler.
    pub handler: Option<String>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiDecl {
    pub meta: NodeMeta,
    pub name: String,
    pub members: Vec<ApiMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageDecl {
    pub meta: NodeMeta,
    pub name: String,
    pub parent: Option<NameRef>,
    pub layout: Option<NameRef>,
    pub markup: Vec<MarkupNode>,
}

/// Parsed template markup of a page.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupNode {
    Element(MarkupElement),
    Text(String),
    /// `{{ expr }}` kept verbatim.
    Interpolation(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkupElement {
    pub tag: String,
    pub attrs: Vec<(String, Option<String>)>,
    pub children: Vec<MarkupNode>,
    /// Capitalized tags refer to other pages used as components.
    pub component: Option<NameRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDecl {
    pub meta: NodeMeta,
    pub name: String,
    pub ty: TypeRef,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub meta: NodeMeta,
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Option<TypeRef>,
    pub body: Vec<Stmt>,
}

/// A synthesized record type describing the columns a `select` returns.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultShape {
    pub id: NodeId,
    pub name: String,
    pub mapper: String,
    pub query: String,
    pub columns: Vec<FieldDef>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Name(NameRef),
    Member {
        object: Box<Expr>,
        name: String,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `@console.log(...)`: platform-provided call, never resolved through symbols.
    Native {
        path: Vec<String>,
        args: Vec<Expr>,
        pos: Position,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForIter {
    Range(Expr, Expr),
    Each(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Var {
        name: String,
        ty: Option<TypeRef>,
        init: Option<Expr>,
        pos: Position,
    },
    Assign {
        target: Expr,
        value: Expr,
        pos: Position,
    },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Option<Vec<Stmt>>,
        pos: Position,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        pos: Position,
    },
    For {
        var: String,
        iter: ForIter,
        body: Vec<Stmt>,
        pos: Position,
    },
    Return(Option<Expr>, Position),
    Break(Position),
    Continue(Position),
    Expr(Expr, Position),
}
