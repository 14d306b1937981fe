//! Lowering of bound AST documents into the [`CodeModel`].

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use super::model::*;
use crate::diagnostics::Diagnostics;
use crate::dsl::ast::{self as ast, AstDocument, AstNode, NameRef, NodeId, TypeRef};
use crate::dsl::error::CompileError;
use crate::dsl::sql;
use crate::dsl::token::Position;
use crate::platform::{Category, PlatformKey};
use crate::resolve::{ImportContext, Symbol, SymbolContainer, SymbolKind};

/// Nesting limit for domains defined in terms of other domains.
const MAX_DOMAIN_DEPTH: usize = 16;

/// Everything about a handler a route or client call needs.
struct RouteSpec {
    method: HttpMethod,
    path: String,
    bindings: Vec<RouteBinding>,
    returns: Option<ModelType>,
}

pub struct Builder<'a> {
    symbols: &'a SymbolContainer,
    imports: &'a ImportContext,
    platform: Option<PlatformKey>,
    lowered: HashSet<NodeId>,
    /// Handlers whose route errors were already reported.
    reported: HashSet<NodeId>,
    routes: HashMap<(HttpMethod, String), Position>,
    model: CodeModel,
}

impl<'a> Builder<'a> {
    pub fn new(
        symbols: &'a SymbolContainer,
        imports: &'a ImportContext,
        platform: Option<PlatformKey>,
    ) -> Self {
        Self {
            symbols,
            imports,
            platform,
            lowered: HashSet::new(),
            reported: HashSet::new(),
            routes: HashMap::new(),
            model: CodeModel::default(),
        }
    }

    /// Lower `documents` in order. Non-fatal problems go to `diagnostics`;
    /// a duplicate route aborts.
    pub fn lower(
        mut self,
        documents: &[Arc<AstDocument>],
        diagnostics: &mut Diagnostics,
    ) -> Result<CodeModel, CompileError> {
        for doc in documents {
            tracing::debug!(file = %doc.path.display(), "lowering");
            for node in &doc.nodes {
                if !self.lowered.insert(node.meta().id) {
                    continue;
                }
                self.lower_node(doc, node, diagnostics)?;
            }
            for shape in &doc.shapes {
                if self.lowered.insert(shape.id) && self.supports(Category::Data, diagnostics, || {
                    format!("query result {}", shape.name)
                }) {
                    let data = self.lower_shape(&doc.path, shape);
                    self.model.data_types.push(data);
                }
            }
        }

        tracing::info!(
            entities = self.model.entity_count(),
            mappers = self.model.mappers.len(),
            services = self.model.services.len(),
            "lowered code model"
        );
        Ok(self.model)
    }

    fn lower_node(
        &mut self,
        doc: &AstDocument,
        node: &AstNode,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), CompileError> {
        let path = doc.path.as_path();
        let name = node.name().unwrap_or_default();
        let construct = || format!("{} {name}", node.kind());
        match node {
            AstNode::Import(_) => {}
            AstNode::Domain(d) => {
                if self.supports(Category::Data, diagnostics, construct) {
                    let data = DataType {
                        name: d.name.clone(),
                        kind: DataKind::Domain,
                        fields: Vec::new(),
                        keys: Vec::new(),
                        indexes: Vec::new(),
                        table: None,
                        alias_of: Some(self.lower_type(&d.ty)),
                        origin: origin(path, d.meta.pos, d.meta.id),
                    };
                    self.model.data_types.push(data);
                }
            }
            AstNode::Table(t) => {
                if self.supports(Category::Data, diagnostics, construct) {
                    let data = self.lower_table(path, t);
                    self.model.data_types.push(data);
                }
            }
            AstNode::Entity(e) => {
                if self.supports(Category::Data, diagnostics, construct) {
                    let data = self.lower_entity(path, e);
                    self.model.data_types.push(data);
                }
            }
            AstNode::Struct(s) => {
                if self.supports(Category::Data, diagnostics, construct) {
                    let data = DataType {
                        name: s.name.clone(),
                        kind: DataKind::Struct,
                        fields: self.lower_fields(&s.fields),
                        keys: Vec::new(),
                        indexes: Vec::new(),
                        table: None,
                        alias_of: None,
                        origin: origin(path, s.meta.pos, s.meta.id),
                    };
                    self.model.data_types.push(data);
                }
            }
            AstNode::Mapper(m) => {
                if self.supports(Category::Mapper, diagnostics, construct) {
                    let mapper = self.lower_mapper(path, m, diagnostics);
                    self.model.mappers.push(mapper);
                }
            }
            AstNode::Controller(c) => {
                if self.supports(Category::Controller, diagnostics, construct) {
                    let service = self.lower_controller(path, c, diagnostics)?;
                    self.model.services.push(service);
                }
            }
            AstNode::Api(a) => {
                if self.supports(Category::Api, diagnostics, construct) {
                    let client = self.lower_api(path, a, diagnostics);
                    self.model.clients.push(client);
                }
            }
            AstNode::Page(p) => {
                if self.supports(Category::Page, diagnostics, construct) {
                    let page = PageComponent {
                        name: p.name.clone(),
                        route: p.meta.annotations.text("route"),
                        title: p.meta.annotations.text("title"),
                        parent: p.parent.as_ref().map(|r| r.name.clone()),
                        layout: p.layout.as_ref().map(|r| r.name.clone()),
                        markup: lower_markup(&p.markup),
                        origin: origin(path, p.meta.pos, p.meta.id),
                    };
                    self.model.pages.push(page);
                }
            }
            AstNode::Property(p) => {
                if self.supports(Category::Property, diagnostics, construct) {
                    let constant = Constant {
                        name: p.name.clone(),
                        ty: self.lower_type(&p.ty),
                        value: p.value.as_ref().map(|v| self.lower_expr(v)),
                        origin: origin(path, p.meta.pos, p.meta.id),
                    };
                    self.model.constants.push(constant);
                }
            }
            AstNode::Func(f) => {
                if self.supports(Category::Func, diagnostics, construct) {
                    let procedure = Procedure {
                        name: f.name.clone(),
                        params: self.lower_params(&f.params),
                        returns: self.lower_returns(f.returns.as_ref()),
                        body: self.lower_block(&f.body),
                        is_entry: f.name == "main",
                        origin: origin(path, f.meta.pos, f.meta.id),
                    };
                    self.model.procedures.push(procedure);
                }
            }
        }
        Ok(())
    }

    /// Whether the target platform takes `category`; reports a warning when not.
    fn supports(
        &self,
        category: Category,
        diagnostics: &mut Diagnostics,
        construct: impl FnOnce() -> String,
    ) -> bool {
        let Some(platform) = self.platform else {
            return true;
        };
        if platform.supports(category) {
            return true;
        }
        let warning = CompileError::PlatformUnsupported {
            platform: platform.as_str().to_string(),
            construct: construct(),
        };
        diagnostics.push(warning.to_diagnostic());
        false
    }

    // =========================================================================
    // Symbols
    // =========================================================================

    fn target(&self, name: &NameRef) -> Option<&'a Symbol> {
        name.target.map(|id| self.symbols.symbol(id))
    }

    fn document_of(&self, symbol: &Symbol) -> Option<&'a Arc<AstDocument>> {
        self.imports.get(&symbol.path)
    }

    // =========================================================================
    // Types and data
    // =========================================================================

    pub(crate) fn lower_type(&self, ty: &TypeRef) -> ModelType {
        self.lower_type_at(ty, 0)
    }

    fn lower_type_at(&self, ty: &TypeRef, depth: usize) -> ModelType {
        match ty {
            TypeRef::Primitive(p) => ModelType::Primitive(*p),
            TypeRef::List(inner) => ModelType::List(Box::new(self.lower_type_at(inner, depth))),
            TypeRef::Named(name) => {
                let Some(symbol) = self.target(name) else {
                    return ModelType::Primitive(ast::Primitive::Any);
                };
                let kind = match symbol.kind {
                    SymbolKind::Domain => return self.domain_type(symbol, depth),
                    SymbolKind::Table => DataKind::Table,
                    SymbolKind::Entity => DataKind::Entity,
                    SymbolKind::ResultShape => DataKind::QueryResult,
                    _ => DataKind::Struct,
                };
                ModelType::Named {
                    name: symbol.name.clone(),
                    kind,
                }
            }
        }
    }

    /// Domains are inlined to their underlying type.
    fn domain_type(&self, symbol: &Symbol, depth: usize) -> ModelType {
        if depth >= MAX_DOMAIN_DEPTH {
            return ModelType::Primitive(ast::Primitive::Any);
        }
        match self.document_of(symbol).and_then(|doc| doc.node(symbol.node)) {
            Some(AstNode::Domain(d)) => self.lower_type_at(&d.ty, depth + 1),
            _ => ModelType::Primitive(ast::Primitive::Any),
        }
    }

    fn lower_returns(&self, ty: Option<&TypeRef>) -> Option<ModelType> {
        ty.map(|t| self.lower_type(t)).filter(|t| !t.is_void())
    }

    fn lower_fields(&self, fields: &[ast::FieldDef]) -> Vec<Field> {
        fields
            .iter()
            .map(|f| Field {
                name: f.name.clone(),
                ty: self.lower_type(&f.ty),
                nullable: false,
                auto: false,
                key: false,
                default: None,
            })
            .collect()
    }

    fn lower_params(&self, params: &[ast::Param]) -> Vec<Parameter> {
        params
            .iter()
            .map(|p| Parameter {
                name: p.name.clone(),
                ty: self.lower_type(&p.ty),
            })
            .collect()
    }

    fn table_fields(&self, table: &ast::TableDecl) -> Vec<Field> {
        table
            .columns
            .iter()
            .map(|c| Field {
                name: c.name.clone(),
                ty: self.lower_type(&c.ty),
                nullable: c.nullable,
                auto: c.auto,
                key: table.keys.contains(&c.name),
                default: c.default.clone(),
            })
            .collect()
    }

    fn lower_table(&self, path: &Path, table: &ast::TableDecl) -> DataType {
        DataType {
            name: table.name.clone(),
            kind: DataKind::Table,
            fields: self.table_fields(table),
            keys: table.keys.clone(),
            indexes: table
                .indexes
                .iter()
                .map(|i| Index {
                    name: i.name.clone(),
                    columns: i.columns.clone(),
                    unique: i.unique,
                })
                .collect(),
            table: Some(table.name.clone()),
            alias_of: None,
            origin: origin(path, table.meta.pos, table.meta.id),
        }
    }

    fn lower_entity(&self, path: &Path, entity: &ast::EntityDecl) -> DataType {
        let table = entity.table.as_ref().and_then(|name| {
            let symbol = self.target(name)?;
            self.document_of(symbol)?.table(symbol.node)
        });

        let mut fields = table.map(|t| self.table_fields(t)).unwrap_or_default();
        fields.extend(self.lower_fields(&entity.fields));

        DataType {
            name: entity.name.clone(),
            kind: DataKind::Entity,
            fields,
            keys: table.map(|t| t.keys.clone()).unwrap_or_default(),
            indexes: Vec::new(),
            table: table.map(|t| t.name.clone()),
            alias_of: None,
            origin: origin(path, entity.meta.pos, entity.meta.id),
        }
    }

    fn lower_shape(&self, path: &Path, shape: &ast::ResultShape) -> DataType {
        DataType {
            name: shape.name.clone(),
            kind: DataKind::QueryResult,
            fields: self.lower_fields(&shape.columns),
            keys: Vec::new(),
            indexes: Vec::new(),
            table: None,
            alias_of: None,
            origin: origin(path, shape.pos, shape.id),
        }
    }

    // =========================================================================
    // Mappers
    // =========================================================================

    fn lower_mapper(
        &self,
        path: &Path,
        mapper: &ast::MapperDecl,
        diagnostics: &mut Diagnostics,
    ) -> DataAccess {
        let mut operations = Vec::new();
        'queries: for query in &mapper.queries {
            let declaration = format!("{}.{}", mapper.name, query.name);
            let used = sql::bind_parameters(&query.body);

            for name in &used {
                if !query.params.iter().any(|p| &p.name == name) {
                    let err = CompileError::UnboundParameter {
                        file: path.to_path_buf(),
                        position: query.body_pos,
                        declaration: declaration.clone(),
                        name: name.clone(),
                    };
                    diagnostics.push(err.to_diagnostic());
                    continue 'queries;
                }
            }
            for param in &query.params {
                if !used.contains(&param.name) {
                    let warning = CompileError::UnusedParameter {
                        file: path.to_path_buf(),
                        position: param.pos,
                        declaration: declaration.clone(),
                        name: param.name.clone(),
                    };
                    diagnostics.push(warning.to_diagnostic());
                }
            }

            let positional = sql::to_positional(&query.body);
            let returns = self.lower_returns(query.returns.as_ref());
            operations.push(DataAccessOperation {
                name: query.name.clone(),
                kind: sql::statement_kind(&query.body),
                params: self.lower_params(&query.params),
                returns_many: returns.as_ref().is_some_and(ModelType::is_list),
                returns,
                sql: query.body.clone(),
                positional_sql: positional.sql,
                bind_order: positional.bind_order,
                origin: origin(path, query.meta.pos, query.meta.id),
            });
        }

        DataAccess {
            name: mapper.name.clone(),
            datasource: mapper.meta.annotations.text("datasource"),
            operations,
            origin: origin(path, mapper.meta.pos, mapper.meta.id),
        }
    }

    // =========================================================================
    // Controllers and APIs
    // =========================================================================

    fn lower_controller(
        &mut self,
        path: &Path,
        controller: &ast::ControllerDecl,
        diagnostics: &mut Diagnostics,
    ) -> Result<Service, CompileError> {
        let base_url = controller
            .meta
            .annotations
            .text("baseUrl")
            .unwrap_or_default();

        let mut routes = Vec::new();
        for handler in &controller.handlers {
            let Some(spec) = self.route_spec(path, controller, handler, diagnostics) else {
                continue;
            };
            let func = &handler.func;
            let key = (spec.method, spec.path.clone());
            if self.routes.insert(key, func.meta.pos).is_some() {
                return Err(CompileError::DuplicateRoute {
                    file: path.to_path_buf(),
                    position: func.meta.pos,
                    method: spec.method.as_str().to_string(),
                    path: spec.path,
                });
            }
            routes.push(Route {
                handler: func.name.clone(),
                method: spec.method,
                path: spec.path,
                bindings: spec.bindings,
                returns: spec.returns,
                body: self.lower_block(&func.body),
                id: func.meta.annotations.get("id").and_then(|v| v.as_i64()),
                comment: func.meta.annotations.text("comment"),
                origin: origin(path, func.meta.pos, func.meta.id),
            });
        }

        Ok(Service {
            name: controller.name.clone(),
            base_url,
            comment: controller.meta.annotations.text("comment"),
            routes,
            origin: origin(path, controller.meta.pos, controller.meta.id),
        })
    }

    fn lower_api(
        &mut self,
        path: &Path,
        api: &ast::ApiDecl,
        diagnostics: &mut Diagnostics,
    ) -> ClientApi {
        let mut calls = Vec::new();
        for member in &api.members {
            let Some(symbol) = self.target(&member.controller) else {
                continue;
            };
            let Some(doc) = self.document_of(symbol) else {
                continue;
            };
            let Some(controller) = doc.controller(symbol.node) else {
                continue;
            };

            let handlers: Vec<&ast::HandlerDecl> = match &member.handler {
                None => controller.handlers.iter().collect(),
                Some(name) => match controller.handler(name) {
                    Some(handler) => vec![handler],
                    None => {
                        let err = CompileError::UnresolvedSymbol {
                            file: path.to_path_buf(),
                            position: member.pos,
                            name: format!("{}.{name}", controller.name),
                            context: format!("api {}", api.name),
                        };
                        diagnostics.push(err.to_diagnostic());
                        continue;
                    }
                },
            };

            for handler in handlers {
                let Some(spec) = self.route_spec(&doc.path, controller, handler, diagnostics) else {
                    continue;
                };
                calls.push(ClientCall {
                    name: handler.func.name.clone(),
                    service: controller.name.clone(),
                    method: spec.method,
                    path: spec.path,
                    bindings: spec.bindings,
                    returns: spec.returns,
                    comment: handler.func.meta.annotations.text("comment"),
                });
            }
        }

        ClientApi {
            name: api.name.clone(),
            base_url: api.meta.annotations.text("baseUrl").unwrap_or_default(),
            calls,
            origin: origin(path, api.meta.pos, api.meta.id),
        }
    }

    /// Method, path and bindings of a handler. `None` when the handler is
    /// malformed; validation or an unbound route parameter was reported.
    fn route_spec(
        &mut self,
        path: &Path,
        controller: &ast::ControllerDecl,
        handler: &ast::HandlerDecl,
        diagnostics: &mut Diagnostics,
    ) -> Option<RouteSpec> {
        let func = &handler.func;
        let annotations = &func.meta.annotations;
        let method = HttpMethod::parse(&annotations.text("method")?)?;
        let base = controller.meta.annotations.text("baseUrl").unwrap_or_default();
        let full = join_path(&base, &annotations.text("route")?);

        let placeholders = route_placeholders(&full);
        if let Some(missing) = placeholders
            .iter()
            .find(|name| !func.params.iter().any(|p| &p.name == *name))
        {
            if self.reported.insert(func.meta.id) {
                let err = CompileError::UnboundParameter {
                    file: path.to_path_buf(),
                    position: func.meta.pos,
                    declaration: format!("{}.{}", controller.name, func.name),
                    name: missing.clone(),
                };
                diagnostics.push(err.to_diagnostic());
            }
            return None;
        }

        let body = annotations.text("body");
        let bindings = func
            .params
            .iter()
            .map(|p| {
                let source = if placeholders.contains(&p.name) {
                    BindingSource::Path
                } else if body.as_deref() == Some(p.name.as_str()) {
                    BindingSource::Body
                } else {
                    BindingSource::Query
                };
                RouteBinding {
                    name: p.name.clone(),
                    ty: self.lower_type(&p.ty),
                    source,
                }
            })
            .collect();

        Some(RouteSpec {
            method,
            path: full,
            bindings,
            returns: self.lower_returns(func.returns.as_ref()),
        })
    }

    // =========================================================================
    // Statements and expressions
    // =========================================================================

    fn lower_block(&self, body: &[ast::Stmt]) -> Vec<Stmt> {
        body.iter().map(|s| self.lower_stmt(s)).collect()
    }

    fn lower_stmt(&self, stmt: &ast::Stmt) -> Stmt {
        match stmt {
            ast::Stmt::Var { name, ty, init, .. } => Stmt::Var {
                name: name.clone(),
                ty: ty.as_ref().map(|t| self.lower_type(t)),
                init: init.as_ref().map(|e| self.lower_expr(e)),
            },
            ast::Stmt::Assign { target, value, .. } => Stmt::Assign {
                target: self.lower_expr(target),
                value: self.lower_expr(value),
            },
            ast::Stmt::If {
                cond,
                then,
                otherwise,
                ..
            } => Stmt::If {
                cond: self.lower_expr(cond),
                then: self.lower_block(then),
                otherwise: otherwise.as_ref().map(|b| self.lower_block(b)),
            },
            ast::Stmt::While { cond, body, .. } => Stmt::While {
                cond: self.lower_expr(cond),
                body: self.lower_block(body),
            },
            ast::Stmt::For { var, iter, body, .. } => Stmt::For {
                var: var.clone(),
                iter: match iter {
                    ast::ForIter::Range(from, to) => {
                        ForIter::Range(self.lower_expr(from), self.lower_expr(to))
                    }
                    ast::ForIter::Each(e) => ForIter::Each(self.lower_expr(e)),
                },
                body: self.lower_block(body),
            },
            ast::Stmt::Return(value, _) => Stmt::Return(value.as_ref().map(|e| self.lower_expr(e))),
            ast::Stmt::Break(_) => Stmt::Break,
            ast::Stmt::Continue(_) => Stmt::Continue,
            ast::Stmt::Expr(e, _) => Stmt::Expr(self.lower_expr(e)),
        }
    }

    fn lower_expr(&self, expr: &ast::Expr) -> Expr {
        match expr {
            ast::Expr::Literal(lit) => Expr::Literal(lit.clone()),
            ast::Expr::Name(name) => Expr::Name {
                name: name.name.clone(),
                kind: self.target(name).map_or(NameKind::Other, |s| name_kind(s.kind)),
            },
            ast::Expr::Member { object, name } => Expr::Member {
                object: Box::new(self.lower_expr(object)),
                name: name.clone(),
            },
            ast::Expr::Call { callee, args } => Expr::Call {
                callee: Box::new(self.lower_expr(callee)),
                args: args.iter().map(|a| self.lower_expr(a)).collect(),
            },
            ast::Expr::Native { path, args, .. } => Expr::Native {
                path: path.clone(),
                args: args.iter().map(|a| self.lower_expr(a)).collect(),
            },
            ast::Expr::Unary { op, expr } => Expr::Unary {
                op: *op,
                expr: Box::new(self.lower_expr(expr)),
            },
            ast::Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op: *op,
                lhs: Box::new(self.lower_expr(lhs)),
                rhs: Box::new(self.lower_expr(rhs)),
            },
        }
    }
}

fn origin(path: &Path, pos: Position, id: NodeId) -> Origin {
    Origin {
        file: path.to_path_buf(),
        line: pos.line,
        column: pos.col,
        node: id.0,
    }
}

fn name_kind(kind: SymbolKind) -> NameKind {
    match kind {
        SymbolKind::Local => NameKind::Local,
        SymbolKind::Param => NameKind::Param,
        SymbolKind::Property => NameKind::Constant,
        SymbolKind::Func => NameKind::Procedure,
        SymbolKind::Mapper => NameKind::DataAccess,
        SymbolKind::Controller => NameKind::Service,
        SymbolKind::Api => NameKind::Client,
        k if k.is_type() => NameKind::Type,
        _ => NameKind::Other,
    }
}

fn lower_markup(nodes: &[ast::MarkupNode]) -> Vec<Markup> {
    nodes
        .iter()
        .map(|node| match node {
            ast::MarkupNode::Element(el) => Markup::Element {
                tag: el.tag.clone(),
                attrs: el.attrs.clone(),
                children: lower_markup(&el.children),
                component: el.component.is_some(),
            },
            ast::MarkupNode::Text(text) => Markup::Text(text.clone()),
            ast::MarkupNode::Interpolation(expr) => Markup::Interpolation(expr.clone()),
        })
        .collect()
}

/// Join a base URL and a route into one absolute path template.
pub fn join_path(base: &str, route: &str) -> String {
    let base = base.trim_end_matches('/');
    let route = route.trim_start_matches('/');
    let joined = match (base.is_empty(), route.is_empty()) {
        (true, true) => String::new(),
        (true, false) => route.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{route}"),
    };
    if joined.starts_with('/') || joined.contains("://") {
        joined
    } else {
        format!("/{joined}")
    }
}

/// Names of the `{x}` placeholders of a path template, in order.
pub fn route_placeholders(path: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        let inner = &rest[open + 1..open + close];
        let name = inner.split(':').next().unwrap_or_default().trim();
        if !name.is_empty() {
            names.push(name.to_string());
        }
        rest = &rest[open + close + 1..];
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCode;
    use crate::dsl::Compiler;
    use pretty_assertions::assert_eq;

    fn lower_src(src: &str, platform: Option<PlatformKey>) -> (Result<CodeModel, CompileError>, Compiler) {
        let mut compiler = Compiler::new(platform);
        compiler.compile_str(src, "lower.jssp").unwrap();
        let result = crate::build::lower(&mut compiler);
        (result, compiler)
    }

    const USERS: &str = "
        table tb_user {
            id bigint auto;
            name varchar(100);
            email varchar(200) null;
            key(id);
        }
        mapper UserMapper {
            query selectById(id bigint) UserVo {
                select id, name from tb_user where id = :id
            }
        }
    ";

    #[test]
    fn join_path_normalizes_slashes() {
        assert_eq!(join_path("/api/v1/", "/users/{id}"), "/api/v1/users/{id}");
        assert_eq!(join_path("", "users"), "/users");
        assert_eq!(join_path("api", ""), "/api");
        assert_eq!(join_path("", ""), "/");
    }

    #[test]
    fn placeholders_in_order() {
        assert_eq!(
            route_placeholders("/users/{id}/posts/{postId:int}"),
            vec!["id".to_string(), "postId".to_string()]
        );
    }

    #[test]
    fn select_result_becomes_query_result() {
        let (model, compiler) = lower_src(USERS, None);
        let model = model.unwrap();
        assert!(!compiler.context.diagnostics.has_errors());

        let vo = model.data_type("UserVo").unwrap();
        assert_eq!(vo.kind, DataKind::QueryResult);
        let names: Vec<_> = vo.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
        assert_eq!(model.entity_count(), 1);

        let op = &model.mappers[0].operations[0];
        assert_eq!(op.bind_order, vec!["id".to_string()]);
        assert_eq!(op.positional_sql, "select id, name from tb_user where id = ?");
        assert!(!op.returns_many);
    }

    #[test]
    fn unbound_parameter_skips_only_that_query() {
        let src = "
            table t { id int; key(id); }
            mapper M {
                query bad() int { delete from t where id = :id }
                query good(id int) int { delete from t where id = :id }
            }
        ";
        let (model, compiler) = lower_src(src, None);
        let model = model.unwrap();
        assert!(compiler.context.diagnostics.contains(DiagnosticCode::UnboundParameter));
        let names: Vec<_> = model.mappers[0].operations.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["good"]);
    }

    #[test]
    fn unused_parameter_is_a_warning() {
        let src = "table t { id int; key(id); } mapper M { query all(limit int) list<t> { select * from t } }";
        let (model, compiler) = lower_src(src, None);
        assert!(model.is_ok());
        let diagnostics = &compiler.context.diagnostics;
        assert!(diagnostics.contains(DiagnosticCode::UnusedParameter));
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn routes_join_base_url_and_classify_bindings() {
        let src = "
            struct User { name string; }
            [baseUrl='/api/v1']
            controller UserController {
                [method=post, route='/users/{group}', body=user]
                func add(group int, user User, dryRun bool) int { return 1; }
            }
        ";
        let (model, _) = lower_src(src, None);
        let route = &model.unwrap().services[0].routes[0];
        assert_eq!(route.path, "/api/v1/users/{group}");
        assert_eq!(route.method, HttpMethod::Post);
        let sources: Vec<_> = route.bindings.iter().map(|b| b.source).collect();
        assert_eq!(
            sources,
            vec![BindingSource::Path, BindingSource::Body, BindingSource::Query]
        );
    }

    #[test]
    fn route_placeholder_without_parameter() {
        let src = "
            controller C {
                [method=get, route='/items/{id}']
                func get() int { return 1; }
            }
        ";
        let (model, compiler) = lower_src(src, None);
        assert!(model.unwrap().services[0].routes.is_empty());
        assert!(compiler.context.diagnostics.contains(DiagnosticCode::UnboundParameter));
    }

    #[test]
    fn duplicate_route_is_fatal() {
        let src = "
            controller A { [method=get, route='/x'] func a() int { return 1; } }
            controller B { [method=get, route='/x'] func b() int { return 2; } }
        ";
        let (model, _) = lower_src(src, None);
        assert!(matches!(model, Err(CompileError::DuplicateRoute { .. })));
    }

    #[test]
    fn api_copies_route_metadata() {
        let src = "
            [baseUrl='/api']
            controller TodoController {
                [method=get, route='/todos']
                func listTodos() int { return 1; }
                [method=delete, route='/todos/{id}']
                func remove(id int) int { return 1; }
            }
            [baseUrl='http://localhost:8080']
            api TodoApi { TodoController.remove; }
        ";
        let (model, _) = lower_src(src, None);
        let client = &model.unwrap().clients[0];
        assert_eq!(client.base_url, "http://localhost:8080");
        assert_eq!(client.calls.len(), 1);
        assert_eq!(client.calls[0].path, "/api/todos/{id}");
        assert_eq!(client.calls[0].method, HttpMethod::Delete);
    }

    #[test]
    fn unsupported_category_is_skipped_with_a_warning() {
        let (model, compiler) = lower_src(USERS, Some(PlatformKey::Java));
        let model = model.unwrap();
        assert!(model.mappers.is_empty());
        assert!(model.data_type("tb_user").is_some());
        assert!(compiler.context.diagnostics.contains(DiagnosticCode::PlatformUnsupported));
        assert!(!compiler.context.diagnostics.has_errors());
    }

    #[test]
    fn domains_are_inlined_and_main_is_entry() {
        let src = "
            domain Email varchar(200);
            struct Contact { email Email; }
            func main() { var x = 1; }
        ";
        let (model, _) = lower_src(src, None);
        let model = model.unwrap();
        let contact = model.data_type("Contact").unwrap();
        assert_eq!(
            contact.fields[0].ty,
            ModelType::Primitive(ast::Primitive::Varchar(200))
        );
        assert!(model.entry().is_some());
        assert_eq!(model.records().count(), 1);
    }

    #[test]
    fn entity_count_matches_data_declarations() {
        let src = "
            domain Email varchar(200);
            table tb_user { id bigint auto; name varchar(100); key(id); }
            table tb_role { id int; title string; key(id); }
            entity User : tb_user;
            struct Contact { email Email; users list<User>; }
            mapper UserMapper {
                query byId(id bigint) tb_user { select id, name from tb_user where id = :id }
                query first() UserName { select id, name from tb_user }
            }
            property pageSize int = 20;
            func main() { var n = 1; }
            func twice(x int) int { return x * 2; }
        ";
        let (model, compiler) = lower_src(src, None);
        let model = model.unwrap();
        assert!(!compiler.context.diagnostics.has_errors());

        let kinds: Vec<_> = model.data_types.iter().map(|t| (t.name.as_str(), t.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("Email", DataKind::Domain),
                ("tb_user", DataKind::Table),
                ("tb_role", DataKind::Table),
                ("User", DataKind::Entity),
                ("Contact", DataKind::Struct),
                ("UserName", DataKind::QueryResult),
            ]
        );
        // domain + 2 tables + entity + struct
        assert_eq!(model.entity_count(), 5);
        assert_eq!(model.mappers.len(), 1);
        assert_eq!(model.mappers[0].operations.len(), 2);
        assert_eq!(model.constants.len(), 1);
        assert_eq!(model.procedures.len(), 2);
        assert!(model.services.is_empty() && model.clients.is_empty() && model.pages.is_empty());
    }
}
