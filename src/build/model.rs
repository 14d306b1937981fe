//! Platform-neutral code model produced by lowering.
//!
//! Everything here is fully resolved: no scopes, no symbol ids, just names and
//! types. Generators and the prompt builder consume the model read-only.

use std::path::PathBuf;

use serde::Serialize;

use crate::dsl::ast::{BinaryOp, Literal, Primitive, UnaryOp};
use crate::dsl::sql::StatementKind;

/// Source location a model element was lowered from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Origin {
    /// Local path; kept out of serialized output.
    #[serde(skip)]
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
    pub node: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Domain,
    Table,
    Entity,
    Struct,
    /// Record synthesized from a `select` list.
    QueryResult,
}

/// A resolved type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ModelType {
    Primitive(Primitive),
    List(Box<ModelType>),
    /// Reference to a data type of the model.
    Named { name: String, kind: DataKind },
}

impl ModelType {
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Element type of a list, or the type itself.
    pub fn element(&self) -> &ModelType {
        match self {
            Self::List(inner) => inner,
            other => other,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Primitive(Primitive::Void))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub ty: ModelType,
    pub nullable: bool,
    pub auto: bool,
    pub key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Literal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataType {
    pub name: String,
    pub kind: DataKind,
    pub fields: Vec<Field>,
    pub keys: Vec<String>,
    pub indexes: Vec<Index>,
    /// Backing table of an entity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Underlying type of a domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias_of: Option<ModelType>,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub ty: ModelType,
}

/// A mapper: named SQL operations against the data source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataAccess {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datasource: Option<String>,
    pub operations: Vec<DataAccessOperation>,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataAccessOperation {
    pub name: String,
    #[serde(serialize_with = "statement_kind")]
    pub kind: StatementKind,
    pub params: Vec<Parameter>,
    pub returns: Option<ModelType>,
    pub returns_many: bool,
    /// SQL as written, with `:name` parameters.
    pub sql: String,
    /// SQL with `?` placeholders.
    pub positional_sql: String,
    /// Parameter name for each placeholder of `positional_sql`.
    pub bind_order: Vec<String>,
    pub origin: Origin,
}

fn statement_kind<S: serde::Serializer>(kind: &StatementKind, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(kind.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn parse(s: &str) -> Option<Self> {
        let method = match s.to_ascii_lowercase().as_str() {
            "get" => Self::Get,
            "post" => Self::Post,
            "put" => Self::Put,
            "delete" => Self::Delete,
            "patch" => Self::Patch,
            "head" => Self::Head,
            "options" => Self::Options,
            _ => return None,
        };
        Some(method)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Lowercase spelling, as used by most routing libraries.
    pub fn lower(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Delete => "delete",
            Self::Patch => "patch",
            Self::Head => "head",
            Self::Options => "options",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingSource {
    Path,
    Query,
    Body,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteBinding {
    pub name: String,
    pub ty: ModelType,
    pub source: BindingSource,
}

/// A controller: routes served under one base URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub name: String,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub routes: Vec<Route>,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub handler: String,
    pub method: HttpMethod,
    /// Full path template, base URL included, e.g. `/api/v1/users/{id}`.
    pub path: String,
    pub bindings: Vec<RouteBinding>,
    pub returns: Option<ModelType>,
    pub body: Vec<Stmt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub origin: Origin,
}

/// Client-side view of a set of routes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientApi {
    pub name: String,
    pub base_url: String,
    pub calls: Vec<ClientCall>,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientCall {
    pub name: String,
    /// Controller the call targets.
    pub service: String,
    pub method: HttpMethod,
    pub path: String,
    pub bindings: Vec<RouteBinding>,
    pub returns: Option<ModelType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Markup {
    Element {
        tag: String,
        attrs: Vec<(String, Option<String>)>,
        children: Vec<Markup>,
        /// Tag refers to another page component.
        component: bool,
    },
    Text(String),
    Interpolation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageComponent {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    pub markup: Vec<Markup>,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Procedure {
    pub name: String,
    pub params: Vec<Parameter>,
    pub returns: Option<ModelType>,
    pub body: Vec<Stmt>,
    /// `main`: the program entry point.
    pub is_entry: bool,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constant {
    pub name: String,
    pub ty: ModelType,
    pub value: Option<Expr>,
    pub origin: Origin,
}

/// What a name in an expression refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameKind {
    Local,
    Param,
    Constant,
    Procedure,
    DataAccess,
    Service,
    Client,
    Type,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Expr {
    Literal(Literal),
    Name {
        name: String,
        kind: NameKind,
    },
    Member {
        object: Box<Expr>,
        name: String,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Native {
        path: Vec<String>,
        args: Vec<Expr>,
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

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ForIter {
    Range(Expr, Expr),
    Each(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Stmt {
    Var {
        name: String,
        ty: Option<ModelType>,
        init: Option<Expr>,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        var: String,
        iter: ForIter,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Expr(Expr),
}

/// The complete lowered program.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CodeModel {
    pub data_types: Vec<DataType>,
    pub mappers: Vec<DataAccess>,
    pub services: Vec<Service>,
    pub clients: Vec<ClientApi>,
    pub pages: Vec<PageComponent>,
    pub procedures: Vec<Procedure>,
    pub constants: Vec<Constant>,
}

impl CodeModel {
    /// Data types declared in source (tables, entities, structs, domains);
    /// synthesized query results are not counted.
    pub fn entity_count(&self) -> usize {
        self.data_types
            .iter()
            .filter(|t| t.kind != DataKind::QueryResult)
            .count()
    }

    pub fn data_type(&self, name: &str) -> Option<&DataType> {
        self.data_types.iter().find(|t| t.name == name)
    }

    /// Data types that generate a record/class (domains are inlined).
    pub fn records(&self) -> impl Iterator<Item = &DataType> {
        self.data_types.iter().filter(|t| t.kind != DataKind::Domain)
    }

    pub fn entry(&self) -> Option<&Procedure> {
        self.procedures.iter().find(|p| p.is_entry)
    }

    pub fn is_empty(&self) -> bool {
        self.data_types.is_empty()
            && self.mappers.is_empty()
            && self.services.is_empty()
            && self.clients.is_empty()
            && self.pages.is_empty()
            && self.procedures.is_empty()
            && self.constants.is_empty()
    }
}
