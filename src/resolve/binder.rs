//! Completion barrier of a parsed file.
//!
//! Runs once the last declaration of a file has been parsed. Every name
//! reference recorded by the parser is resolved against the scope it was
//! written in, result shapes are synthesized for `select` queries whose return
//! type is not declared anywhere, and the outcome is recorded on the AST.
//!
//! Work is split in three passes so that later passes can rely on earlier
//! ones: domains and table columns first (result shapes copy their types),
//! then result shapes, then every other reference.

use std::path::Path;

use super::imports::ImportContext;
use super::scope::{Symbol, SymbolContainer, SymbolKind};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::dsl::ast::*;
use crate::dsl::context::ParserContext;
use crate::dsl::error::CompileError;
use crate::dsl::sql::{self, SelectColumn, StatementKind};

/// What a reference position accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Type,
    Table,
    Page,
    Controller,
    Value,
}

impl Expect {
    fn accepts(self, kind: SymbolKind) -> bool {
        match self {
            Self::Type => kind.is_type(),
            Self::Table => kind == SymbolKind::Table,
            Self::Page => kind == SymbolKind::Page,
            Self::Controller => kind == SymbolKind::Controller,
            Self::Value => true,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Type => "a type",
            Self::Table => "a table",
            Self::Page => "a page",
            Self::Controller => "a controller",
            Self::Value => "a value",
        }
    }
}

/// Resolve every pending reference of `doc`.
pub fn complete(doc: &mut AstDocument, ctx: &mut ParserContext, container: &mut SymbolContainer) {
    let path = doc.path.clone();

    {
        let mut binder = Binder {
            container: &*container,
            diagnostics: &mut ctx.diagnostics,
            path: &path,
        };
        for node in &mut doc.nodes {
            match node {
                AstNode::Domain(domain) => {
                    binder.bind_type(&mut domain.ty, &format!("domain {}", domain.name));
                }
                AstNode::Table(table) => {
                    let context = format!("table {}", table.name);
                    for column in &mut table.columns {
                        binder.bind_type(&mut column.ty, &context);
                    }
                }
                _ => {}
            }
        }
    }

    synthesize_shapes(doc, ctx, container);

    let mut binder = Binder {
        container,
        diagnostics: &mut ctx.diagnostics,
        path: &path,
    };
    for node in &mut doc.nodes {
        binder.bind_node(node);
    }
}

struct Binder<'a> {
    container: &'a SymbolContainer,
    diagnostics: &'a mut Diagnostics,
    path: &'a Path,
}

impl Binder<'_> {
    fn bind_node(&mut self, node: &mut AstNode) {
        match node {
            AstNode::Import(_) | AstNode::Domain(_) | AstNode::Table(_) => {}
            AstNode::Entity(entity) => {
                let context = format!("entity {}", entity.name);
                if let Some(table) = &mut entity.table {
                    self.bind(table, Expect::Table, &context);
                }
                self.bind_fields(&mut entity.fields, &context);
            }
            AstNode::Struct(s) => {
                let context = format!("struct {}", s.name);
                self.bind_fields(&mut s.fields, &context);
            }
            AstNode::Mapper(mapper) => {
                for query in &mut mapper.queries {
                    let context = format!("query {}.{}", mapper.name, query.name);
                    self.bind_params(&mut query.params, &context);
                    if let Some(returns) = &mut query.returns {
                        self.bind_type(returns, &context);
                    }
                }
            }
            AstNode::Controller(controller) => {
                for handler in &mut controller.handlers {
                    let context = format!("handler {}.{}", controller.name, handler.func.name);
                    self.bind_func(&mut handler.func, &context);
                }
            }
            AstNode::Api(api) => {
                let context = format!("api {}", api.name);
                for member in &mut api.members {
                    self.bind(&mut member.controller, Expect::Controller, &context);
                }
            }
            AstNode::Page(page) => {
                let context = format!("page {}", page.name);
                if let Some(parent) = &mut page.parent {
                    self.bind(parent, Expect::Page, &context);
                }
                if let Some(layout) = &mut page.layout {
                    self.bind(layout, Expect::Page, &context);
                }
                self.bind_markup(&mut page.markup, &context);
            }
            AstNode::Property(property) => {
                let context = format!("property {}", property.name);
                self.bind_type(&mut property.ty, &context);
                if let Some(value) = &mut property.value {
                    self.bind_expr(value, &context);
                }
            }
            AstNode::Func(func) => {
                let context = format!("function {}", func.name);
                self.bind_func(func, &context);
            }
        }
    }

    fn bind(&mut self, name: &mut NameRef, expect: Expect, context: &str) {
        let Some(id) = self.container.resolve(name.scope, &name.name, name.seq) else {
            self.report(CompileError::UnresolvedSymbol {
                file: self.path.to_path_buf(),
                position: name.pos,
                name: name.name.clone(),
                context: context.to_string(),
            });
            return;
        };

        let kind = self.container.symbol(id).kind;
        if expect.accepts(kind) {
            name.target = Some(id);
        } else {
            self.report(CompileError::KindMismatch {
                file: self.path.to_path_buf(),
                position: name.pos,
                name: name.name.clone(),
                expected: expect.describe().to_string(),
                found: kind.to_string(),
            });
        }
    }

    fn bind_type(&mut self, ty: &mut TypeRef, context: &str) {
        match ty {
            TypeRef::Primitive(_) => {}
            TypeRef::List(inner) => self.bind_type(inner, context),
            TypeRef::Named(name) => {
                if name.target.is_none() {
                    self.bind(name, Expect::Type, context);
                }
            }
        }
    }

    fn bind_fields(&mut self, fields: &mut [FieldDef], context: &str) {
        for field in fields {
            self.bind_type(&mut field.ty, context);
        }
    }

    fn bind_params(&mut self, params: &mut [Param], context: &str) {
        for param in params {
            self.bind_type(&mut param.ty, context);
        }
    }

    fn bind_func(&mut self, func: &mut FuncDecl, context: &str) {
        self.bind_params(&mut func.params, context);
        if let Some(returns) = &mut func.returns {
            self.bind_type(returns, context);
        }
        self.bind_stmts(&mut func.body, context);
    }

    fn bind_stmts(&mut self, stmts: &mut [Stmt], context: &str) {
        for stmt in stmts {
            match stmt {
                Stmt::Var { ty, init, .. } => {
                    if let Some(ty) = ty {
                        self.bind_type(ty, context);
                    }
                    if let Some(init) = init {
                        self.bind_expr(init, context);
                    }
                }
                Stmt::Assign { target, value, .. } => {
                    self.bind_expr(target, context);
                    self.bind_expr(value, context);
                }
                Stmt::If {
                    cond,
                    then,
                    otherwise,
                    ..
                } => {
                    self.bind_expr(cond, context);
                    self.bind_stmts(then, context);
                    if let Some(otherwise) = otherwise {
                        self.bind_stmts(otherwise, context);
                    }
                }
                Stmt::While { cond, body, .. } => {
                    self.bind_expr(cond, context);
                    self.bind_stmts(body, context);
                }
                Stmt::For { iter, body, .. } => {
                    match iter {
                        ForIter::Range(from, to) => {
                            self.bind_expr(from, context);
                            self.bind_expr(to, context);
                        }
                        ForIter::Each(items) => self.bind_expr(items, context),
                    }
                    self.bind_stmts(body, context);
                }
                Stmt::Return(Some(value), _) | Stmt::Expr(value, _) => {
                    self.bind_expr(value, context);
                }
                Stmt::Return(None, _) | Stmt::Break(_) | Stmt::Continue(_) => {}
            }
        }
    }

    fn bind_expr(&mut self, expr: &mut Expr, context: &str) {
        match expr {
            Expr::Literal(_) => {}
            Expr::Name(name) => self.bind(name, Expect::Value, context),
            Expr::Member { object, .. } => self.bind_expr(object, context),
            Expr::Call { callee, args } => {
                self.bind_expr(callee, context);
                for arg in args {
                    self.bind_expr(arg, context);
                }
            }
            Expr::Native { args, .. } => {
                for arg in args {
                    self.bind_expr(arg, context);
                }
            }
            Expr::Unary { expr, .. } => self.bind_expr(expr, context),
            Expr::Binary { lhs, rhs, .. } => {
                self.bind_expr(lhs, context);
                self.bind_expr(rhs, context);
            }
        }
    }

    fn bind_markup(&mut self, nodes: &mut [MarkupNode], context: &str) {
        for node in nodes {
            if let MarkupNode::Element(element) = node {
                if let Some(component) = &mut element.component {
                    self.bind(component, Expect::Page, context);
                }
                self.bind_markup(&mut element.children, context);
            }
        }
    }

    fn report(&mut self, err: CompileError) {
        self.diagnostics.push(err.to_diagnostic());
    }
}

// =============================================================================
// Result shapes
// =============================================================================

/// Innermost named type of a return type (`list<UserVo>` -> `UserVo`).
fn named_return(ty: &TypeRef) -> Option<&NameRef> {
    match ty {
        TypeRef::Primitive(_) => None,
        TypeRef::List(inner) => named_return(inner),
        TypeRef::Named(name) => Some(name),
    }
}

/// Declare a result shape for every `select` query whose return type does
/// not resolve to anything.
fn synthesize_shapes(doc: &mut AstDocument, ctx: &mut ParserContext, container: &mut SymbolContainer) {
    let mut pending: Vec<ResultShape> = Vec::new();
    let mut warnings: Vec<Diagnostic> = Vec::new();

    for node in &doc.nodes {
        let AstNode::Mapper(mapper) = node else {
            continue;
        };
        for query in &mapper.queries {
            let Some(ret) = query.returns.as_ref().and_then(named_return) else {
                continue;
            };
            let declared = container.resolve(query.scope, &ret.name, query.seq).is_some()
                || pending.iter().any(|shape| shape.name == ret.name);
            if declared || sql::statement_kind(&query.body) != StatementKind::Select {
                continue;
            }

            let tables = TableLookup {
                doc,
                imports: &ctx.imports,
                container,
                query,
            };
            let columns = tables.shape_columns(&mapper.name, &mut warnings);
            tracing::debug!(
                shape = %ret.name,
                query = %query.name,
                columns = columns.len(),
                "synthesized query result shape"
            );
            pending.push(ResultShape {
                id: NodeId(0),
                name: ret.name.clone(),
                mapper: mapper.name.clone(),
                query: query.name.clone(),
                columns,
                pos: ret.pos,
            });
        }
    }

    ctx.diagnostics.extend(warnings);

    for mut shape in pending {
        shape.id = ctx.next_node_id();
        let symbol = Symbol {
            name: shape.name.clone(),
            kind: SymbolKind::ResultShape,
            file: doc.file,
            path: doc.path.clone(),
            pos: shape.pos,
            seq: 0,
            scope: doc.scope,
            node: shape.id,
        };
        // Names were checked as unresolved above, so the file scope is free.
        if container.declare(doc.scope, symbol).is_ok() {
            doc.shapes.push(shape);
        }
    }
}

/// Finds table declarations named in a query's SQL.
struct TableLookup<'a> {
    doc: &'a AstDocument,
    imports: &'a ImportContext,
    container: &'a SymbolContainer,
    query: &'a QueryDecl,
}

impl<'a> TableLookup<'a> {
    fn table(&self, name: &str) -> Option<&'a TableDecl> {
        let id = self
            .container
            .resolve(self.query.scope, name, self.query.seq)?;
        let symbol = self.container.symbol(id);
        if symbol.kind != SymbolKind::Table {
            return None;
        }
        if symbol.file == self.doc.file {
            return self.doc.table(symbol.node);
        }
        self.imports.get(&symbol.path)?.table(symbol.node)
    }

    fn shape_columns(&self, mapper: &str, warnings: &mut Vec<Diagnostic>) -> Vec<FieldDef> {
        let Some(list) = sql::select_columns(&self.query.body) else {
            return Vec::new();
        };
        let pos = self.query.body_pos;
        let sources: Vec<(&sql::TableSource, Option<&TableDecl>)> = list
            .tables
            .iter()
            .map(|source| (source, self.table(&source.name)))
            .collect();

        let mut fields: Vec<FieldDef> = Vec::new();
        let push = |fields: &mut Vec<FieldDef>, name: &str, ty: TypeRef| {
            if !fields.iter().any(|f| f.name == name) {
                fields.push(FieldDef {
                    name: name.to_string(),
                    ty,
                    pos,
                });
            }
        };
        let unknown = |name: &str| {
            Diagnostic::warning(
                DiagnosticCode::UnknownColumn,
                format!(
                    "cannot determine the type of '{name}' in query {mapper}.{}; using string",
                    self.query.name
                ),
            )
            .at(&self.doc.path, pos)
        };

        for column in &list.columns {
            match column {
                SelectColumn::Star { qualifier } => {
                    for (source, table) in &sources {
                        if qualifier.as_deref().is_some_and(|q| !source.matches(q)) {
                            continue;
                        }
                        match table {
                            Some(table) => {
                                for c in &table.columns {
                                    push(&mut fields, &c.name, c.ty.clone());
                                }
                            }
                            None => warnings.push(unknown(&format!("{}.*", source.name))),
                        }
                    }
                }
                SelectColumn::Column {
                    qualifier,
                    name,
                    alias,
                } => {
                    let found = sources
                        .iter()
                        .filter(|(source, _)| qualifier.as_deref().map_or(true, |q| source.matches(q)))
                        .filter_map(|(_, table)| *table)
                        .find_map(|table| table.columns.iter().find(|c| &c.name == name));
                    let output = alias.as_deref().unwrap_or(name);
                    match found {
                        Some(c) => push(&mut fields, output, c.ty.clone()),
                        None => {
                            warnings.push(unknown(output));
                            push(&mut fields, output, TypeRef::Primitive(Primitive::String));
                        }
                    }
                }
                SelectColumn::Expr { name, function } => {
                    let ty = match function.as_deref() {
                        Some("count") => Primitive::BigInt,
                        _ => {
                            warnings.push(unknown(name));
                            Primitive::String
                        }
                    };
                    push(&mut fields, name, TypeRef::Primitive(ty));
                }
            }
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use crate::diagnostics::DiagnosticCode;
    use crate::dsl::ast::*;
    use crate::dsl::Compiler;
    use crate::resolve::SymbolKind;

    fn compile(src: &str) -> (std::sync::Arc<AstDocument>, Compiler) {
        let mut compiler = Compiler::new(None);
        let doc = compiler.compile_str(src, "binder.jssp").unwrap();
        (doc, compiler)
    }

    #[test]
    fn binds_types_in_any_order() {
        let (doc, compiler) = compile("struct A { b B; } struct B { x int; }");
        let AstNode::Struct(a) = &doc.nodes[0] else {
            panic!("expected struct");
        };
        let TypeRef::Named(b) = &a.fields[0].ty else {
            panic!("expected named type");
        };
        let target = b.target.expect("bound");
        assert_eq!(compiler.symbols.symbol(target).kind, SymbolKind::Struct);
        assert!(!compiler.context.diagnostics.has_errors());
    }

    #[test]
    fn unresolved_type_is_reported() {
        let (_, compiler) = compile("struct A { b Missing; }");
        assert!(compiler
            .context
            .diagnostics
            .contains(DiagnosticCode::UnresolvedSymbol));
    }

    #[test]
    fn controller_used_as_type_is_a_kind_mismatch() {
        let (_, compiler) = compile(
            "controller C { [method=get, route='/x'] func x() { } } struct S { c C; }",
        );
        assert!(compiler.context.diagnostics.contains(DiagnosticCode::KindMismatch));
    }

    #[test]
    fn locals_are_visible_only_after_declaration() {
        let (_, compiler) = compile("func f() { var a = b; var b = 1; }");
        assert!(compiler
            .context
            .diagnostics
            .contains(DiagnosticCode::UnresolvedSymbol));

        let (_, compiler) = compile("func f(n int) { var a = n; var b = a + 1; }");
        assert!(!compiler.context.diagnostics.has_errors());
    }

    #[test]
    fn select_query_synthesizes_result_shape() {
        let (doc, compiler) = compile(
            "table tb_user { id bigint auto; name varchar(100); key(id); }
             mapper UserMapper {
                 query selectById(id bigint) UserVo { select id, name as title from tb_user where id = :id; }
                 query selectAll() list<UserVo> { select id, name as title from tb_user; }
             }",
        );
        assert_eq!(doc.shapes.len(), 1);
        let shape = &doc.shapes[0];
        assert_eq!(shape.name, "UserVo");
        assert_eq!(shape.columns.len(), 2);
        assert_eq!(shape.columns[0].ty, TypeRef::Primitive(Primitive::BigInt));
        assert_eq!(shape.columns[1].name, "title");
        assert_eq!(shape.columns[1].ty, TypeRef::Primitive(Primitive::Varchar(100)));
        assert!(!compiler.context.diagnostics.has_errors());

        let AstNode::Mapper(mapper) = &doc.nodes[1] else {
            panic!("expected mapper");
        };
        let TypeRef::Named(ret) = mapper.queries[0].returns.as_ref().unwrap() else {
            panic!("expected named return");
        };
        let target = ret.target.expect("bound to shape");
        assert_eq!(compiler.symbols.symbol(target).kind, SymbolKind::ResultShape);
    }

    #[test]
    fn unknown_columns_become_strings_with_a_warning() {
        let (doc, compiler) = compile(
            "table t { id int; }
             mapper M { query q() Row { select id, mystery, count(*) as n from t; } }",
        );
        let columns = &doc.shapes[0].columns;
        assert_eq!(columns[1].ty, TypeRef::Primitive(Primitive::String));
        assert_eq!(columns[2].ty, TypeRef::Primitive(Primitive::BigInt));
        assert!(compiler.context.diagnostics.contains(DiagnosticCode::UnknownColumn));
        assert!(!compiler.context.diagnostics.has_errors());
    }

    #[test]
    fn non_select_query_with_unknown_return_is_unresolved() {
        let (doc, compiler) = compile(
            "table t { id int; } mapper M { query q() Row { update t set id = 1; } }",
        );
        assert!(doc.shapes.is_empty());
        assert!(compiler
            .context
            .diagnostics
            .contains(DiagnosticCode::UnresolvedSymbol));
    }

    #[test]
    fn markup_components_resolve_to_pages() {
        let (_, compiler) = compile(
            "html Card { <p>card</p> } html Home { <div><Card/><Missing/></div> }",
        );
        assert_eq!(compiler.context.diagnostics.error_count(), 1);
        assert!(compiler
            .context
            .diagnostics
            .contains(DiagnosticCode::UnresolvedSymbol));
    }
}
