//! Parser for the jssp DSL.
//!
//! Single-pass recursive descent over the token stream. Each declaration rule
//! binds its name in the current scope as soon as its header is recognized,
//! before the body is parsed, so later declarations and nested bodies can refer
//! to it. References are recorded as [`NameRef`]s and bound later.

mod body;

use std::path::PathBuf;

use super::ast::*;
use super::context::{ParserContext, ParserOptions};
use super::error::CompileError;
use super::markup::{is_component_tag, parse_markup};
use super::token::{Position, Token, TokenKind};
use crate::resolve::{FileId, ScopeId, ScopeKind, Symbol, SymbolContainer, SymbolKind, SymbolStack};

/// HTTP methods accepted on handlers.
pub const HTTP_METHODS: &[&str] = &["get", "post", "put", "delete", "patch", "head", "options"];

/// Declarations and imports of one parsed file.
pub struct ParsedFile {
    pub nodes: Vec<AstNode>,
    pub imports: Vec<ImportEdge>,
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    file: FileId,
    path: PathBuf,
    root: ScopeId,
    seq: u32,
    /// Declaration whose body is being parsed; owns the locals declared in it.
    owner: NodeId,
    imports: Vec<ImportEdge>,
    options: &'a ParserOptions,
    ctx: &'a mut ParserContext,
    stack: &'a mut SymbolStack,
    container: &'a mut SymbolContainer,
}

impl<'a> Parser<'a> {
    pub fn new(
        tokens: Vec<Token>,
        file: FileId,
        root: ScopeId,
        options: &'a ParserOptions,
        ctx: &'a mut ParserContext,
        stack: &'a mut SymbolStack,
        container: &'a mut SymbolContainer,
    ) -> Self {
        Self {
            tokens,
            pos: 0,
            file,
            path: options.file.clone(),
            root,
            seq: 0,
            owner: NodeId(0),
            imports: Vec::new(),
            options,
            ctx,
            stack,
            container,
        }
    }

    pub fn parse(mut self) -> Result<ParsedFile, CompileError> {
        let mut nodes = Vec::new();

        while !self.is_at_end() {
            if self.check(TokenKind::Semi) {
                self.advance();
                continue;
            }
            if let Some(node) = self.parse_declaration()? {
                nodes.push(node);
            }
        }

        Ok(ParsedFile {
            nodes,
            imports: self.imports,
        })
    }

    /// Parse one top-level declaration. Returns `None` when the declaration
    /// is excluded by its platform annotation.
    fn parse_declaration(&mut self) -> Result<Option<AstNode>, CompileError> {
        let annotations = self.parse_annotations();
        let active = self.ctx.is_active(&annotations);
        let meta = NodeMeta {
            id: self.ctx.next_node_id(),
            pos: self.peek().pos,
            annotations,
        };

        let node = match &self.peek().kind {
            TokenKind::Import => AstNode::Import(self.parse_import(meta)?),
            TokenKind::Domain => AstNode::Domain(self.parse_domain(meta, active)?),
            TokenKind::Table => AstNode::Table(self.parse_table(meta, active)?),
            TokenKind::Entity => AstNode::Entity(self.parse_entity(meta, active)?),
            TokenKind::Struct => AstNode::Struct(self.parse_struct(meta, active)?),
            TokenKind::Mapper => AstNode::Mapper(self.parse_mapper(meta, active)?),
            TokenKind::Controller => AstNode::Controller(self.parse_controller(meta, active)?),
            TokenKind::Api => AstNode::Api(self.parse_api(meta, active)?),
            TokenKind::Html => AstNode::Page(self.parse_page(meta, active)?),
            TokenKind::Property => AstNode::Property(self.parse_property(meta, active)?),
            TokenKind::Func => {
                AstNode::Func(self.parse_func(meta, active, SymbolKind::Func)?)
            }
            _ => return Err(self.error("a declaration")),
        };

        if !active {
            tracing::debug!(
                file = %self.path.display(),
                name = node.name().unwrap_or_default(),
                "declaration excluded for this platform"
            );
            return Ok(None);
        }
        Ok(Some(node))
    }

    fn parse_annotations(&mut self) -> AnnotationBlock {
        let mut block = AnnotationBlock::default();
        while let TokenKind::Annotation(pairs) = &self.peek().kind {
            block.merge(AnnotationBlock::from_pairs(pairs.clone()));
            self.advance();
        }
        block
    }

    // =========================================================================
    // Imports
    // =========================================================================

    fn parse_import(&mut self, meta: NodeMeta) -> Result<ImportDecl, CompileError> {
        self.expect(TokenKind::Import)?;
        let written = self.expect_string()?;
        self.expect(TokenKind::Semi)?;
        let seq = self.next_seq();

        let Some((found, origin)) = self.options.locate_import(&written) else {
            return Err(CompileError::ImportNotFound {
                file: self.path.clone(),
                position: meta.pos,
                path: written,
            });
        };

        let options = self.options.for_import(found, origin);
        let document = super::parse_file(&options, self.ctx, self.stack, self.container)?;
        self.container.add_import(self.root, document.scope, seq);

        let resolved = document.path.clone();
        self.imports.push(ImportEdge {
            importer: self.path.clone(),
            imported: resolved.clone(),
            document,
        });

        Ok(ImportDecl {
            meta,
            path: written,
            resolved,
        })
    }

    // =========================================================================
    // Data declarations
    // =========================================================================

    fn parse_domain(&mut self, meta: NodeMeta, active: bool) -> Result<DomainDecl, CompileError> {
        self.expect(TokenKind::Domain)?;
        let (name, pos) = self.expect_ident()?;
        self.declare(&name, SymbolKind::Domain, pos, meta.id, active);
        let ty = self.parse_type()?;
        self.expect(TokenKind::Semi)?;
        Ok(DomainDecl { meta, name, ty })
    }

    fn parse_table(&mut self, meta: NodeMeta, active: bool) -> Result<TableDecl, CompileError> {
        self.expect(TokenKind::Table)?;
        let (name, pos) = self.expect_ident()?;
        self.declare(&name, SymbolKind::Table, pos, meta.id, active);
        self.expect(TokenKind::LBrace)?;

        let mut columns: Vec<ColumnDef> = Vec::new();
        let mut keys = Vec::new();
        let mut indexes = Vec::new();

        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            if self.check_ident("key") && self.peek_at(1) == &TokenKind::LParen {
                let key_pos = self.advance().pos;
                for (column, _) in self.parse_name_list()? {
                    if !columns.iter().any(|c| c.name == column) {
                        self.invalid(
                            key_pos,
                            format!("table {name}"),
                            format!("key column '{column}' is not declared"),
                        );
                    }
                    keys.push(column);
                }
                self.expect(TokenKind::Semi)?;
            } else if (self.check_ident("index") || self.check_ident("unique"))
                && matches!(self.peek_at(1), TokenKind::Ident(_))
                && self.peek_at(2) == &TokenKind::LParen
            {
                let unique = self.check_ident("unique");
                let index_pos = self.advance().pos;
                let (index_name, _) = self.expect_ident()?;
                let cols: Vec<String> = self.parse_name_list()?.into_iter().map(|(c, _)| c).collect();
                for column in &cols {
                    if !columns.iter().any(|c| &c.name == column) {
                        self.invalid(
                            index_pos,
                            format!("table {name}"),
                            format!("index '{index_name}' uses undeclared column '{column}'"),
                        );
                    }
                }
                self.expect(TokenKind::Semi)?;
                indexes.push(IndexDef {
                    name: index_name,
                    columns: cols,
                    unique,
                    pos: index_pos,
                });
            } else {
                let column = self.parse_column()?;
                if columns.iter().any(|c| c.name == column.name) {
                    self.invalid(
                        column.pos,
                        format!("table {name}"),
                        format!("duplicate column '{}'", column.name),
                    );
                } else {
                    columns.push(column);
                }
            }
        }
        self.expect(TokenKind::RBrace)?;

        if columns.is_empty() {
            self.invalid(pos, format!("table {name}"), "a table needs at least one column");
        }

        Ok(TableDecl {
            meta,
            name,
            columns,
            keys,
            indexes,
        })
    }

    /// `name type [auto] [null | not null] [default literal] [key];`
    fn parse_column(&mut self) -> Result<ColumnDef, CompileError> {
        let (name, pos) = self.expect_ident()?;
        let ty = self.parse_type()?;
        let mut column = ColumnDef {
            name,
            ty,
            auto: false,
            nullable: false,
            default: None,
            pos,
        };

        while !self.check(TokenKind::Semi) {
            if self.check_ident("auto") {
                self.advance();
                column.auto = true;
            } else if self.check(TokenKind::Null) {
                self.advance();
                column.nullable = true;
            } else if self.check_ident("not") {
                self.advance();
                self.expect(TokenKind::Null)?;
                column.nullable = false;
            } else if self.check_ident("default") {
                self.advance();
                column.default = Some(self.parse_literal()?);
            } else {
                return Err(self.error("column modifier or ';'"));
            }
        }
        self.expect(TokenKind::Semi)?;
        Ok(column)
    }

    fn parse_entity(&mut self, meta: NodeMeta, active: bool) -> Result<EntityDecl, CompileError> {
        self.expect(TokenKind::Entity)?;
        let (name, pos) = self.expect_ident()?;
        self.declare(&name, SymbolKind::Entity, pos, meta.id, active);

        let table = if self.check(TokenKind::Colon) {
            self.advance();
            let (table, table_pos) = self.expect_ident()?;
            Some(self.name_ref(table, table_pos))
        } else {
            None
        };

        let fields = if self.check(TokenKind::LBrace) {
            self.parse_fields(&format!("entity {name}"))?
        } else {
            self.expect(TokenKind::Semi)?;
            Vec::new()
        };

        Ok(EntityDecl {
            meta,
            name,
            table,
            fields,
        })
    }

    fn parse_struct(&mut self, meta: NodeMeta, active: bool) -> Result<StructDecl, CompileError> {
        self.expect(TokenKind::Struct)?;
        let (name, pos) = self.expect_ident()?;
        self.declare(&name, SymbolKind::Struct, pos, meta.id, active);
        let fields = self.parse_fields(&format!("struct {name}"))?;
        Ok(StructDecl { meta, name, fields })
    }

    /// `{ name type; ... }`
    fn parse_fields(&mut self, owner: &str) -> Result<Vec<FieldDef>, CompileError> {
        self.expect(TokenKind::LBrace)?;
        let mut fields: Vec<FieldDef> = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let (name, pos) = self.expect_ident()?;
            let ty = self.parse_type()?;
            self.expect(TokenKind::Semi)?;
            if fields.iter().any(|f| f.name == name) {
                self.invalid(pos, owner.to_string(), format!("duplicate field '{name}'"));
                continue;
            }
            fields.push(FieldDef { name, ty, pos });
        }
        self.expect(TokenKind::RBrace)?;
        Ok(fields)
    }

    // =========================================================================
    // Mappers
    // =========================================================================

    fn parse_mapper(&mut self, meta: NodeMeta, active: bool) -> Result<MapperDecl, CompileError> {
        self.expect(TokenKind::Mapper)?;
        let (name, pos) = self.expect_ident()?;
        self.declare(&name, SymbolKind::Mapper, pos, meta.id, active);
        self.expect(TokenKind::LBrace)?;

        let (_, queries) = self.in_scope(ScopeKind::Declaration, |p| {
            let mut queries = Vec::new();
            while !p.check(TokenKind::RBrace) && !p.is_at_end() {
                let annotations = p.parse_annotations();
                let member_active = active && p.ctx.is_active(&annotations);
                let query_meta = NodeMeta {
                    id: p.ctx.next_node_id(),
                    pos: p.peek().pos,
                    annotations,
                };
                let query = p.parse_query(query_meta, member_active)?;
                if member_active {
                    queries.push(query);
                }
            }
            p.expect(TokenKind::RBrace)?;
            Ok(queries)
        })?;

        Ok(MapperDecl {
            meta,
            name,
            queries,
        })
    }

    fn parse_query(&mut self, meta: NodeMeta, active: bool) -> Result<QueryDecl, CompileError> {
        self.expect(TokenKind::Query)?;
        let (name, pos) = self.expect_ident()?;
        self.declare(&name, SymbolKind::Query, pos, meta.id, active);
        let seq = self.next_seq();

        let owner = format!("query {name}");
        let (scope, (params, returns)) = self.in_scope(ScopeKind::Declaration, |p| {
            let params = p.parse_params(&owner, meta.id)?;
            let returns = if matches!(p.peek().kind, TokenKind::RawBlock(_)) {
                None
            } else {
                Some(p.parse_type()?)
            };
            Ok((params, returns))
        })?;

        let body_pos = self.peek().pos;
        let body = match &self.peek().kind {
            TokenKind::RawBlock(text) => text.clone(),
            _ => return Err(self.error("query body")),
        };
        self.advance();

        Ok(QueryDecl {
            meta,
            name,
            params,
            returns,
            body,
            body_pos,
            scope,
            seq,
        })
    }

    // =========================================================================
    // Controllers and APIs
    // =========================================================================

    fn parse_controller(
        &mut self,
        meta: NodeMeta,
        active: bool,
    ) -> Result<ControllerDecl, CompileError> {
        self.expect(TokenKind::Controller)?;
        let (name, pos) = self.expect_ident()?;
        self.declare(&name, SymbolKind::Controller, pos, meta.id, active);
        self.expect(TokenKind::LBrace)?;

        let (_, handlers) = self.in_scope(ScopeKind::Declaration, |p| {
            let mut handlers = Vec::new();
            while !p.check(TokenKind::RBrace) && !p.is_at_end() {
                let annotations = p.parse_annotations();
                let member_active = active && p.ctx.is_active(&annotations);
                let handler_meta = NodeMeta {
                    id: p.ctx.next_node_id(),
                    pos: p.peek().pos,
                    annotations,
                };
                let func = p.parse_func(handler_meta, member_active, SymbolKind::Handler)?;
                if member_active {
                    p.validate_handler(&name, &func);
                    handlers.push(HandlerDecl { func });
                }
            }
            p.expect(TokenKind::RBrace)?;
            Ok(handlers)
        })?;

        Ok(ControllerDecl {
            meta,
            name,
            handlers,
        })
    }

    fn validate_handler(&mut self, controller: &str, func: &FuncDecl) {
        let declaration = format!("handler {controller}.{}", func.name);
        let annotations = &func.meta.annotations;
        match annotations.text("method") {
            None => self.invalid(func.meta.pos, declaration.clone(), "missing 'method' annotation"),
            Some(method) if !HTTP_METHODS.contains(&method.to_ascii_lowercase().as_str()) => self
                .invalid(
                    func.meta.pos,
                    declaration.clone(),
                    format!("unknown HTTP method '{method}'"),
                ),
            Some(_) => {}
        }
        if annotations.get("route").is_none() {
            self.invalid(func.meta.pos, declaration.clone(), "missing 'route' annotation");
        }
        if let Some(body) = annotations.text("body") {
            if !func.params.iter().any(|p| p.name == body) {
                self.invalid(
                    func.meta.pos,
                    declaration,
                    format!("body parameter '{body}' is not declared"),
                );
            }
        }
    }

    fn parse_api(&mut self, meta: NodeMeta, active: bool) -> Result<ApiDecl, CompileError> {
        self.expect(TokenKind::Api)?;
        let (name, pos) = self.expect_ident()?;
        self.declare(&name, SymbolKind::Api, pos, meta.id, active);
        self.expect(TokenKind::LBrace)?;

        let mut members = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let (controller, member_pos) = self.expect_ident()?;
            let handler = if self.check(TokenKind::Dot) {
                self.advance();
                Some(self.expect_ident()?.0)
            } else {
                None
            };
            self.expect(TokenKind::Semi)?;
            members.push(ApiMember {
                controller: self.name_ref(controller, member_pos),
                handler,
                pos: member_pos,
            });
        }
        self.expect(TokenKind::RBrace)?;

        Ok(ApiDecl {
            meta,
            name,
            members,
        })
    }

    // =========================================================================
    // Pages
    // =========================================================================

    fn parse_page(&mut self, meta: NodeMeta, active: bool) -> Result<PageDecl, CompileError> {
        self.expect(TokenKind::Html)?;
        let (name, pos) = self.expect_ident()?;
        self.declare(&name, SymbolKind::Page, pos, meta.id, active);

        let parent = if self.check(TokenKind::Colon) {
            self.advance();
            let (parent, parent_pos) = self.expect_ident()?;
            Some(self.name_ref(parent, parent_pos))
        } else {
            None
        };

        let layout = meta
            .annotations
            .text("layout")
            .map(|layout| self.name_ref(layout, meta.pos));

        let body_pos = self.peek().pos;
        let text = match &self.peek().kind {
            TokenKind::RawBlock(text) => text.clone(),
            _ => return Err(self.error("page markup")),
        };
        self.advance();

        let mut markup = match parse_markup(&text) {
            Ok(nodes) => nodes,
            Err(err) => {
                self.invalid(
                    body_pos,
                    format!("page {name}"),
                    format!("{} (at offset {})", err.message, err.offset),
                );
                Vec::new()
            }
        };
        self.attach_components(&mut markup, body_pos);

        Ok(PageDecl {
            meta,
            name,
            parent,
            layout,
            markup,
        })
    }

    fn attach_components(&mut self, nodes: &mut [MarkupNode], pos: Position) {
        for node in nodes {
            if let MarkupNode::Element(element) = node {
                if is_component_tag(&element.tag) {
                    element.component = Some(self.name_ref(element.tag.clone(), pos));
                }
                self.attach_components(&mut element.children, pos);
            }
        }
    }

    // =========================================================================
    // Properties and functions
    // =========================================================================

    fn parse_property(
        &mut self,
        meta: NodeMeta,
        active: bool,
    ) -> Result<PropertyDecl, CompileError> {
        self.expect(TokenKind::Property)?;
        let (name, pos) = self.expect_ident()?;
        self.declare(&name, SymbolKind::Property, pos, meta.id, active);
        let ty = self.parse_type()?;
        let value = if self.check(TokenKind::Eq) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Semi)?;
        Ok(PropertyDecl {
            meta,
            name,
            ty,
            value,
        })
    }

    /// `func name(params) [Type] { ... }`, shared by top-level functions and
    /// controller handlers.
    fn parse_func(
        &mut self,
        meta: NodeMeta,
        active: bool,
        kind: SymbolKind,
    ) -> Result<FuncDecl, CompileError> {
        self.expect(TokenKind::Func)?;
        let (name, pos) = self.expect_ident()?;
        self.declare(&name, kind, pos, meta.id, active);
        self.owner = meta.id;

        let owner = format!("function {name}");
        let (_, (params, returns, body)) = self.in_scope(ScopeKind::Declaration, |p| {
            let params = p.parse_params(&owner, meta.id)?;
            let returns = if p.check(TokenKind::LBrace) {
                None
            } else {
                Some(p.parse_type()?)
            };
            let body = p.parse_block()?;
            Ok((params, returns, body))
        })?;

        Ok(FuncDecl {
            meta,
            name,
            params,
            returns,
            body,
        })
    }

    /// `(name type, ...)`; each parameter is declared in the current scope.
    fn parse_params(&mut self, owner: &str, node: NodeId) -> Result<Vec<Param>, CompileError> {
        self.expect(TokenKind::LParen)?;
        let mut params: Vec<Param> = Vec::new();
        while !self.check(TokenKind::RParen) {
            let (name, pos) = self.expect_ident()?;
            let ty = self.parse_type()?;
            if params.iter().any(|p| p.name == name) {
                self.invalid(pos, owner.to_string(), format!("duplicate parameter '{name}'"));
            } else {
                self.declare(&name, SymbolKind::Param, pos, node, true);
                params.push(Param { name, ty, pos });
            }
            if !self.check(TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    // =========================================================================
    // Types and literals
    // =========================================================================

    pub(crate) fn parse_type(&mut self) -> Result<TypeRef, CompileError> {
        let (word, pos) = self.expect_ident()?;

        if word == "list" && self.check(TokenKind::Lt) {
            self.advance();
            let inner = self.parse_type()?;
            self.expect(TokenKind::Gt)?;
            return Ok(TypeRef::List(Box::new(inner)));
        }

        if word == "char" || word == "varchar" {
            let size = if self.check(TokenKind::LParen) {
                self.advance();
                let n = self.expect_integer()?;
                self.expect(TokenKind::RParen)?;
                n
            } else if word == "char" {
                1
            } else {
                255
            };
            let size = u32::try_from(size).unwrap_or(u32::MAX);
            return Ok(TypeRef::Primitive(if word == "char" {
                Primitive::Char(size)
            } else {
                Primitive::Varchar(size)
            }));
        }

        if let Some(primitive) = Primitive::from_name(&word) {
            // decimal(p, s): precision is a storage detail and is not kept.
            if primitive == Primitive::Decimal && self.check(TokenKind::LParen) {
                self.advance();
                while !self.check(TokenKind::RParen) && !self.is_at_end() {
                    self.advance();
                }
                self.expect(TokenKind::RParen)?;
            }
            return Ok(TypeRef::Primitive(primitive));
        }

        Ok(TypeRef::Named(self.name_ref(word, pos)))
    }

    fn parse_literal(&mut self) -> Result<Literal, CompileError> {
        let negative = if self.check(TokenKind::Minus) {
            self.advance();
            true
        } else {
            false
        };
        let literal = match &self.peek().kind {
            TokenKind::Integer(n) => Literal::Int(if negative { -n } else { *n }),
            TokenKind::Number(n) => Literal::Float(if negative { -n } else { *n }),
            TokenKind::Str(s) if !negative => Literal::Str(s.clone()),
            TokenKind::True if !negative => Literal::Bool(true),
            TokenKind::False if !negative => Literal::Bool(false),
            TokenKind::Null if !negative => Literal::Null,
            _ => return Err(self.error("a literal")),
        };
        self.advance();
        Ok(literal)
    }

    /// `(a, b, ...)` of plain names.
    fn parse_name_list(&mut self) -> Result<Vec<(String, Position)>, CompileError> {
        self.expect(TokenKind::LParen)?;
        let mut names = Vec::new();
        loop {
            names.push(self.expect_ident()?);
            if !self.check(TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(TokenKind::RParen)?;
        Ok(names)
    }

    // =========================================================================
    // Scopes and symbols
    // =========================================================================

    fn current_scope(&self) -> ScopeId {
        self.stack.current().unwrap_or(self.root)
    }

    fn enter_scope(&mut self, kind: ScopeKind) -> ScopeId {
        let scope = self
            .container
            .new_scope(kind, Some(self.current_scope()), self.file);
        self.stack.push(scope);
        scope
    }

    fn leave_scope(&mut self, scope: ScopeId) {
        let popped = self.stack.pop();
        debug_assert_eq!(popped, Some(scope));
    }

    /// Run `f` with a fresh child scope pushed; the scope is popped on every path.
    fn in_scope<T>(
        &mut self,
        kind: ScopeKind,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<(ScopeId, T), CompileError> {
        let scope = self.enter_scope(kind);
        let result = f(self);
        self.leave_scope(scope);
        result.map(|value| (scope, value))
    }

    fn next_seq(&mut self) -> u32 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    fn name_ref(&mut self, name: String, pos: Position) -> NameRef {
        NameRef {
            name,
            pos,
            scope: self.current_scope(),
            seq: self.next_seq(),
            target: None,
        }
    }

    /// Bind `name` in the current scope. Inactive declarations are parsed
    /// but never bound.
    fn declare(&mut self, name: &str, kind: SymbolKind, pos: Position, node: NodeId, active: bool) {
        if !active {
            return;
        }
        let scope = self.current_scope();
        let symbol = Symbol {
            name: name.to_string(),
            kind,
            file: self.file,
            path: self.path.clone(),
            pos,
            seq: self.next_seq(),
            scope,
            node,
        };
        if let Err(previous) = self.container.declare(scope, symbol) {
            let previous = self.container.symbol(previous).pos;
            self.ctx.report(CompileError::DuplicateSymbol {
                file: self.path.clone(),
                position: pos,
                name: name.to_string(),
                previous,
            });
        }
    }

    fn invalid(&mut self, pos: Position, declaration: String, reason: impl Into<String>) {
        self.ctx.report(CompileError::Validation {
            file: self.path.clone(),
            position: pos,
            declaration,
            reason: reason.into(),
        });
    }

    // =========================================================================
    // Token helpers
    // =========================================================================

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> &Token {
        let t = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len() || self.peek().kind == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end()
            && std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(&kind)
    }

    fn check_ident(&self, name: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(s) if s == name)
    }

    fn error(&self, expected: &str) -> CompileError {
        let t = self.peek();
        CompileError::Syntax {
            file: self.path.clone(),
            position: t.pos,
            expected: expected.to_string(),
            found: t.kind.describe(),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token, CompileError> {
        if std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error(&kind.describe()))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Position), CompileError> {
        let t = self.peek();
        match &t.kind {
            TokenKind::Ident(s) => {
                let found = (s.clone(), t.pos);
                self.advance();
                Ok(found)
            }
            _ => Err(self.error("identifier")),
        }
    }

    fn expect_string(&mut self) -> Result<String, CompileError> {
        match &self.peek().kind {
            TokenKind::Str(s) => {
                let val = s.clone();
                self.advance();
                Ok(val)
            }
            _ => Err(self.error("string")),
        }
    }

    fn expect_integer(&mut self) -> Result<i64, CompileError> {
        match &self.peek().kind {
            TokenKind::Integer(v) => {
                let val = *v;
                self.advance();
                Ok(val)
            }
            _ => Err(self.error("integer")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCode;
    use crate::dsl::lexer::Lexer;
    use std::path::Path;

    struct Harness {
        ctx: ParserContext,
        stack: SymbolStack,
        container: SymbolContainer,
        options: ParserOptions,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                ctx: ParserContext::new(None),
                stack: SymbolStack::new(),
                container: SymbolContainer::new(),
                options: ParserOptions::new("test.jssp"),
            }
        }

        fn parse(&mut self, src: &str) -> Result<ParsedFile, CompileError> {
            let tokens = Lexer::new(src, Path::new("test.jssp")).tokenize()?;
            let file = self.container.register_file(Path::new("test.jssp"));
            let root = self.container.new_scope(ScopeKind::File, None, file);
            self.stack.push(root);
            let parser = Parser::new(
                tokens,
                file,
                root,
                &self.options,
                &mut self.ctx,
                &mut self.stack,
                &mut self.container,
            );
            let parsed = parser.parse();
            self.stack.pop();
            parsed
        }
    }

    fn parse(src: &str) -> ParsedFile {
        Harness::new().parse(src).unwrap()
    }

    #[test]
    fn parse_empty_document() {
        assert!(parse("").nodes.is_empty());
    }

    #[test]
    fn parse_table_with_keys_and_indexes() {
        let file = parse(
            "table tb_user {
                id bigint auto;
                name varchar(100) not null;
                email varchar(200) null default '';
                key(id);
                index idx_name(name);
                unique uq_email(email);
            }",
        );
        let AstNode::Table(table) = &file.nodes[0] else {
            panic!("expected table");
        };
        assert_eq!(table.name, "tb_user");
        assert_eq!(table.columns.len(), 3);
        assert!(table.columns[0].auto);
        assert_eq!(table.columns[1].ty, TypeRef::Primitive(Primitive::Varchar(100)));
        assert!(table.columns[2].nullable);
        assert_eq!(table.columns[2].default, Some(Literal::Str(String::new())));
        assert_eq!(table.keys, vec!["id"]);
        assert_eq!(table.indexes.len(), 2);
        assert!(table.indexes[1].unique);
    }

    #[test]
    fn column_named_like_contextual_word() {
        let file = parse("table t { index int; key(index); }");
        let AstNode::Table(table) = &file.nodes[0] else {
            panic!("expected table");
        };
        assert_eq!(table.columns[0].name, "index");
        assert_eq!(table.keys, vec!["index"]);
    }

    #[test]
    fn validation_errors_are_collected() {
        let mut h = Harness::new();
        let file = h
            .parse("table t { id int; key(missing); } table empty { }")
            .unwrap();
        assert_eq!(file.nodes.len(), 2);
        assert_eq!(h.ctx.diagnostics.error_count(), 2);
        assert!(h.ctx.diagnostics.contains(DiagnosticCode::Validation));
    }

    #[test]
    fn parse_entity_forms() {
        let file = parse("entity User : tb_user; entity Audit : tb_user { note text; }");
        let AstNode::Entity(user) = &file.nodes[0] else {
            panic!("expected entity");
        };
        assert_eq!(user.table.as_ref().map(|t| t.name.as_str()), Some("tb_user"));
        let AstNode::Entity(audit) = &file.nodes[1] else {
            panic!("expected entity");
        };
        assert_eq!(audit.fields.len(), 1);
    }

    #[test]
    fn parse_struct_with_list_field() {
        let file = parse("struct TodoVo { id int; tags list<string>; owner User; }");
        let AstNode::Struct(s) = &file.nodes[0] else {
            panic!("expected struct");
        };
        assert_eq!(
            s.fields[1].ty,
            TypeRef::List(Box::new(TypeRef::Primitive(Primitive::String)))
        );
        assert!(matches!(&s.fields[2].ty, TypeRef::Named(n) if n.name == "User"));
    }

    #[test]
    fn parse_mapper_queries() {
        let file = parse(
            "[datasource='main'] mapper UserMapper {
                query selectById(id bigint) UserVo { select id, name from tb_user where id = :id; }
                query deleteAll() { delete from tb_user; }
            }",
        );
        let AstNode::Mapper(mapper) = &file.nodes[0] else {
            panic!("expected mapper");
        };
        assert_eq!(mapper.meta.annotations.text("datasource").as_deref(), Some("main"));
        assert_eq!(mapper.queries.len(), 2);
        assert_eq!(mapper.queries[0].params[0].name, "id");
        assert_eq!(
            mapper.queries[0].body,
            "select id, name from tb_user where id = :id;"
        );
        assert!(mapper.queries[1].returns.is_none());
    }

    #[test]
    fn parse_controller_handlers() {
        let file = parse(
            "[baseUrl='/api/v1'] controller UserController {
                [method=get, route='/users/{id}'] func getUser(id bigint) string { return 'x'; }
                [method=post, route='/users', body=user] func addUser(user User) int { return 1; }
            }",
        );
        let AstNode::Controller(c) = &file.nodes[0] else {
            panic!("expected controller");
        };
        assert_eq!(c.handlers.len(), 2);
        assert_eq!(
            c.handlers[0].func.meta.annotations.text("route").as_deref(),
            Some("/users/{id}")
        );
    }

    #[test]
    fn handler_annotations_are_validated() {
        let mut h = Harness::new();
        h.parse(
            "controller C {
                func noRoute() { }
                [method=fetch, route='/x'] func badMethod() { }
            }",
        )
        .unwrap();
        // missing method + missing route, then unknown method
        assert_eq!(h.ctx.diagnostics.error_count(), 3);
    }

    #[test]
    fn parse_api_members() {
        let file = parse("api UserApi { UserController; TodoController.listTodos; }");
        let AstNode::Api(api) = &file.nodes[0] else {
            panic!("expected api");
        };
        assert_eq!(api.members.len(), 2);
        assert_eq!(api.members[0].handler, None);
        assert_eq!(api.members[1].handler.as_deref(), Some("listTodos"));
    }

    #[test]
    fn parse_page_with_layout_and_components() {
        let file = parse(
            "[route='/users', layout=MainLayout, title='Users']
             html UserPage : BasePage { <div><h1>{{ title }}</h1><UserCard/></div> }",
        );
        let AstNode::Page(page) = &file.nodes[0] else {
            panic!("expected page");
        };
        assert_eq!(page.parent.as_ref().map(|p| p.name.as_str()), Some("BasePage"));
        assert_eq!(page.layout.as_ref().map(|p| p.name.as_str()), Some("MainLayout"));
        let MarkupNode::Element(div) = &page.markup[0] else {
            panic!("expected element");
        };
        let MarkupNode::Element(card) = &div.children[1] else {
            panic!("expected element");
        };
        assert_eq!(card.component.as_ref().map(|c| c.name.as_str()), Some("UserCard"));
    }

    #[test]
    fn duplicate_declarations_are_reported() {
        let mut h = Harness::new();
        h.parse("struct A { x int; } struct A { y int; }").unwrap();
        assert!(h.ctx.diagnostics.contains(DiagnosticCode::DuplicateSymbol));
    }

    #[test]
    fn duplicate_parameters_are_invalid() {
        let mut h = Harness::new();
        h.parse("func f(a int, a int) { }").unwrap();
        assert!(h.ctx.diagnostics.contains(DiagnosticCode::Validation));
    }

    #[test]
    fn platform_conditional_declarations() {
        let mut h = Harness::new();
        h.ctx.platform = Some(crate::platform::PlatformKey::Cpp);
        let file = h
            .parse("[platform='java,springboot'] struct OnlyJava { x int; } struct Everywhere { x int; }")
            .unwrap();
        assert_eq!(file.nodes.len(), 1);
        assert_eq!(file.nodes[0].name(), Some("Everywhere"));
    }

    #[test]
    fn inactive_declarations_are_still_syntax_checked() {
        let mut h = Harness::new();
        h.ctx.platform = Some(crate::platform::PlatformKey::Cpp);
        let err = h.parse("[platform='java'] struct Broken { x int }");
        assert!(matches!(err, Err(CompileError::Syntax { .. })));
    }

    #[test]
    fn syntax_error_reports_position() {
        let err = Harness::new().parse("struct A { x int }").err().unwrap();
        match err {
            CompileError::Syntax {
                position, expected, ..
            } => {
                assert_eq!(position, Position::new(1, 18));
                assert_eq!(expected, "';'");
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_import_is_an_error() {
        let err = Harness::new().parse("import 'nowhere.jssp';").err().unwrap();
        assert!(matches!(err, CompileError::ImportNotFound { .. }));
    }
}
