//! Statement and expression rendering shared by every target language.
//!
//! A [`Dialect`] supplies the surface syntax; [`render_block`] and
//! [`render_expr`] walk the model. Defaults follow C-family syntax so most
//! languages only override a handful of hooks.

use super::naming::escape;
use super::writer::CodeWriter;
use crate::build::{BindingSource, Expr, ForIter, ModelType, NameKind, RouteBinding, Stmt};
use crate::dsl::ast::{BinaryOp, Literal, UnaryOp};

pub trait Dialect {
    fn type_name(&self, ty: &ModelType) -> String;

    /// Print a line built from `args`, separated by spaces.
    fn print(&self, args: &[String]) -> String;

    /// `var` declaration without the statement terminator.
    fn var_decl(&self, name: &str, ty: Option<&ModelType>, init: Option<String>) -> String;

    fn for_range(&self, var: &str, from: &str, to: &str) -> String;

    fn for_each(&self, var: &str, iter: &str) -> String;

    fn string_literal(&self, s: &str) -> String {
        format!("\"{}\"", escape(s))
    }

    fn null(&self) -> &'static str {
        "null"
    }

    fn bool_literal(&self, b: bool) -> &'static str {
        if b {
            "true"
        } else {
            "false"
        }
    }

    fn binary_op(&self, op: BinaryOp) -> &'static str {
        op.symbol()
    }

    fn unary_op(&self, op: UnaryOp) -> &'static str {
        match op {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
        }
    }

    fn binary(&self, op: BinaryOp, lhs: String, rhs: String) -> String {
        format!("{lhs} {} {rhs}", self.binary_op(op))
    }

    fn name(&self, name: &str, _kind: NameKind) -> String {
        name.to_string()
    }

    /// Platform call written as `@path.to.fn(args)`.
    fn native(&self, path: &[String], args: &[String]) -> String {
        if is_console_log(path) {
            return self.print(args);
        }
        format!("{}({})", path.join("."), args.join(", "))
    }

    fn terminator(&self) -> &'static str {
        ";"
    }

    fn if_open(&self, cond: &str) -> String {
        format!("if ({cond}) {{")
    }

    fn else_if_open(&self, cond: &str) -> String {
        format!("}} else if ({cond}) {{")
    }

    fn else_open(&self) -> String {
        "} else {".to_string()
    }

    fn while_open(&self, cond: &str) -> String {
        format!("while ({cond}) {{")
    }

    /// Line closing a block; empty for indentation-scoped languages.
    fn block_close(&self) -> &'static str {
        "}"
    }

    /// Statement standing in for an empty block, where one is required.
    fn empty_block(&self) -> Option<&'static str> {
        None
    }
}

pub fn is_console_log(path: &[String]) -> bool {
    matches!(path, [a, b] if a == "console" && (b == "log" || b == "print"))
}

fn precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 1,
        BinaryOp::And => 2,
        BinaryOp::Eq | BinaryOp::NotEq => 3,
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
        BinaryOp::Add | BinaryOp::Sub => 5,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 6,
    }
}

pub fn render_literal(d: &dyn Dialect, lit: &Literal) -> String {
    match lit {
        Literal::Int(n) => n.to_string(),
        Literal::Float(f) => {
            let text = f.to_string();
            if text.contains('.') || text.contains('e') {
                text
            } else {
                format!("{text}.0")
            }
        }
        Literal::Str(s) => d.string_literal(s),
        Literal::Bool(b) => d.bool_literal(*b).to_string(),
        Literal::Null => d.null().to_string(),
    }
}

pub fn render_expr(d: &dyn Dialect, expr: &Expr) -> String {
    match expr {
        Expr::Literal(lit) => render_literal(d, lit),
        Expr::Name { name, kind } => d.name(name, *kind),
        Expr::Member { object, name } => format!("{}.{name}", render_expr(d, object)),
        Expr::Call { callee, args } => {
            let args: Vec<String> = args.iter().map(|a| render_expr(d, a)).collect();
            format!("{}({})", render_expr(d, callee), args.join(", "))
        }
        Expr::Native { path, args } => {
            let args: Vec<String> = args.iter().map(|a| render_expr(d, a)).collect();
            d.native(path, &args)
        }
        Expr::Unary { op, expr } => {
            let inner = render_expr(d, expr);
            match expr.as_ref() {
                Expr::Binary { .. } => format!("{}({inner})", d.unary_op(*op)),
                _ => format!("{}{inner}", d.unary_op(*op)),
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = operand(d, lhs, precedence(*op), false);
            let rhs = operand(d, rhs, precedence(*op), true);
            d.binary(*op, lhs, rhs)
        }
    }
}

fn operand(d: &dyn Dialect, expr: &Expr, parent: u8, right: bool) -> String {
    let text = render_expr(d, expr);
    match expr {
        Expr::Binary { op, .. }
            if precedence(*op) < parent || (right && precedence(*op) == parent) =>
        {
            format!("({text})")
        }
        _ => text,
    }
}

pub fn render_block(w: &mut CodeWriter, d: &dyn Dialect, body: &[Stmt]) {
    if body.is_empty() {
        if let Some(filler) = d.empty_block() {
            w.line(filler);
        }
        return;
    }
    for stmt in body {
        render_stmt(w, d, stmt);
    }
}

fn close_block(w: &mut CodeWriter, d: &dyn Dialect) {
    w.dedent();
    if !d.block_close().is_empty() {
        w.line(d.block_close());
    }
}

fn render_stmt(w: &mut CodeWriter, d: &dyn Dialect, stmt: &Stmt) {
    let end = d.terminator();
    match stmt {
        Stmt::Var { name, ty, init } => {
            let init = init.as_ref().map(|e| render_expr(d, e));
            w.line(format!("{}{end}", d.var_decl(name, ty.as_ref(), init)));
        }
        Stmt::Assign { target, value } => {
            w.line(format!(
                "{} = {}{end}",
                render_expr(d, target),
                render_expr(d, value)
            ));
        }
        Stmt::If {
            cond,
            then,
            otherwise,
        } => {
            w.open(d.if_open(&render_expr(d, cond)));
            render_block(w, d, then);
            let mut rest = otherwise.as_deref();
            while let Some(branch) = rest {
                w.dedent();
                match branch {
                    [Stmt::If {
                        cond,
                        then,
                        otherwise,
                    }] => {
                        w.open(d.else_if_open(&render_expr(d, cond)));
                        render_block(w, d, then);
                        rest = otherwise.as_deref();
                    }
                    _ => {
                        w.open(d.else_open());
                        render_block(w, d, branch);
                        rest = None;
                    }
                }
            }
            close_block(w, d);
        }
        Stmt::While { cond, body } => {
            w.open(d.while_open(&render_expr(d, cond)));
            render_block(w, d, body);
            close_block(w, d);
        }
        Stmt::For { var, iter, body } => {
            let header = match iter {
                ForIter::Range(from, to) => {
                    d.for_range(var, &render_expr(d, from), &render_expr(d, to))
                }
                ForIter::Each(e) => d.for_each(var, &render_expr(d, e)),
            };
            w.open(header);
            render_block(w, d, body);
            close_block(w, d);
        }
        Stmt::Return(value) => {
            let line = match value {
                Some(e) => format!("return {}{end}", render_expr(d, e)),
                None => format!("return{end}"),
            };
            w.line(line);
        }
        Stmt::Break => {
            w.line(format!("break{end}"));
        }
        Stmt::Continue => {
            w.line(format!("continue{end}"));
        }
        Stmt::Expr(e) => {
            w.line(format!("{}{end}", render_expr(d, e)));
        }
    }
}

/// Call `f` on every expression of `body`, sub-expressions included.
pub fn walk_exprs(body: &[Stmt], f: &mut dyn FnMut(&Expr)) {
    fn expr(e: &Expr, f: &mut dyn FnMut(&Expr)) {
        f(e);
        match e {
            Expr::Native { args, .. } => args.iter().for_each(|a| expr(a, f)),
            Expr::Call { callee, args } => {
                expr(callee, f);
                args.iter().for_each(|a| expr(a, f));
            }
            Expr::Member { object, .. } => expr(object, f),
            Expr::Unary { expr: inner, .. } => expr(inner, f),
            Expr::Binary { lhs, rhs, .. } => {
                expr(lhs, f);
                expr(rhs, f);
            }
            Expr::Literal(_) | Expr::Name { .. } => {}
        }
    }
    for stmt in body {
        match stmt {
            Stmt::Var { init, .. } => {
                if let Some(e) = init {
                    expr(e, f);
                }
            }
            Stmt::Assign { target, value } => {
                expr(target, f);
                expr(value, f);
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                expr(cond, f);
                walk_exprs(then, f);
                if let Some(otherwise) = otherwise {
                    walk_exprs(otherwise, f);
                }
            }
            Stmt::While { cond, body } => {
                expr(cond, f);
                walk_exprs(body, f);
            }
            Stmt::For { iter, body, .. } => {
                match iter {
                    ForIter::Range(a, b) => {
                        expr(a, f);
                        expr(b, f);
                    }
                    ForIter::Each(e) => expr(e, f),
                }
                walk_exprs(body, f);
            }
            Stmt::Return(Some(e)) | Stmt::Expr(e) => expr(e, f),
            Stmt::Return(None) | Stmt::Break | Stmt::Continue => {}
        }
    }
}

/// Whether any statement calls `@console.log`.
pub fn prints(body: &[Stmt]) -> bool {
    let mut found = false;
    walk_exprs(body, &mut |e| {
        if let Expr::Native { path, .. } = e {
            found |= is_console_log(path);
        }
    });
    found
}

/// Names of `kind` referenced by `body`, in order of first use.
pub fn referenced(body: &[Stmt], kind: NameKind) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    walk_exprs(body, &mut |e| {
        if let Expr::Name { name, kind: k } = e {
            if *k == kind && !names.contains(name) {
                names.push(name.clone());
            }
        }
    });
    names
}

/// Piece of a URL template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlPart<'a> {
    Text(&'a str),
    Param(&'a str),
}

/// Full URL template of a call: the path plus `?name={name}` for every
/// query binding.
pub fn url_template(path: &str, bindings: &[RouteBinding]) -> String {
    let query: Vec<String> = bindings
        .iter()
        .filter(|b| b.source == BindingSource::Query)
        .map(|b| format!("{0}={{{0}}}", b.name))
        .collect();
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{}", query.join("&"))
    }
}

pub fn url_parts(template: &str) -> Vec<UrlPart<'_>> {
    let mut parts = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(len) = rest[open..].find('}') else {
            break;
        };
        if open > 0 {
            parts.push(UrlPart::Text(&rest[..open]));
        }
        let inner = &rest[open + 1..open + len];
        parts.push(UrlPart::Param(inner.split(':').next().unwrap_or(inner)));
        rest = &rest[open + len + 1..];
    }
    if !rest.is_empty() {
        parts.push(UrlPart::Text(rest));
    }
    parts
}

/// Binding carrying the request body, if any.
pub fn body_binding(bindings: &[RouteBinding]) -> Option<&RouteBinding> {
    bindings.iter().find(|b| b.source == BindingSource::Body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::ast::Primitive;

    /// Minimal C-like dialect for exercising the shared walker.
    struct Plain;

    impl Dialect for Plain {
        fn type_name(&self, ty: &ModelType) -> String {
            match ty {
                ModelType::Primitive(p) => p.to_string(),
                ModelType::List(inner) => format!("list<{}>", self.type_name(inner)),
                ModelType::Named { name, .. } => name.clone(),
            }
        }

        fn print(&self, args: &[String]) -> String {
            format!("print({})", args.join(", "))
        }

        fn var_decl(&self, name: &str, _ty: Option<&ModelType>, init: Option<String>) -> String {
            match init {
                Some(init) => format!("var {name} = {init}"),
                None => format!("var {name}"),
            }
        }

        fn for_range(&self, var: &str, from: &str, to: &str) -> String {
            format!("for ({var} = {from}; {var} < {to}; {var}++) {{")
        }

        fn for_each(&self, var: &str, iter: &str) -> String {
            format!("for ({var} : {iter}) {{")
        }
    }

    fn name(n: &str) -> Expr {
        Expr::Name {
            name: n.to_string(),
            kind: NameKind::Local,
        }
    }

    fn bin(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    #[test]
    fn parenthesizes_by_precedence() {
        let e = bin(
            BinaryOp::Mul,
            bin(BinaryOp::Add, name("a"), name("b")),
            name("c"),
        );
        assert_eq!(render_expr(&Plain, &e), "(a + b) * c");

        let e = bin(
            BinaryOp::Sub,
            name("a"),
            bin(BinaryOp::Sub, name("b"), name("c")),
        );
        assert_eq!(render_expr(&Plain, &e), "a - (b - c)");
    }

    #[test]
    fn else_if_chains_render_flat() {
        let body = vec![Stmt::If {
            cond: name("a"),
            then: vec![Stmt::Break],
            otherwise: Some(vec![Stmt::If {
                cond: name("b"),
                then: vec![Stmt::Continue],
                otherwise: Some(vec![Stmt::Return(None)]),
            }]),
        }];
        let mut w = CodeWriter::new("  ");
        render_block(&mut w, &Plain, &body);
        assert_eq!(
            w.finish(),
            "if (a) {\n  break;\n} else if (b) {\n  continue;\n} else {\n  return;\n}\n"
        );
    }

    #[test]
    fn url_template_splits_path_and_query() {
        let bindings = vec![
            RouteBinding {
                name: "id".to_string(),
                ty: ModelType::Primitive(Primitive::Int),
                source: BindingSource::Path,
            },
            RouteBinding {
                name: "q".to_string(),
                ty: ModelType::Primitive(Primitive::String),
                source: BindingSource::Query,
            },
        ];
        let template = url_template("/users/{id}", &bindings);
        assert_eq!(template, "/users/{id}?q={q}");
        assert_eq!(
            url_parts(&template),
            vec![
                UrlPart::Text("/users/"),
                UrlPart::Param("id"),
                UrlPart::Text("?q="),
                UrlPart::Param("q"),
            ]
        );
    }

    #[test]
    fn referenced_names_in_first_use_order() {
        let mapper = |n: &str| Expr::Name {
            name: n.to_string(),
            kind: NameKind::DataAccess,
        };
        let body = vec![
            Stmt::Expr(Expr::Member {
                object: Box::new(mapper("B")),
                name: "x".to_string(),
            }),
            Stmt::Return(Some(bin(BinaryOp::Add, mapper("A"), mapper("B")))),
        ];
        assert_eq!(referenced(&body, NameKind::DataAccess), vec!["B", "A"]);
    }

    #[test]
    fn console_log_maps_to_print() {
        let e = Expr::Native {
            path: vec!["console".to_string(), "log".to_string()],
            args: vec![Expr::Literal(Literal::Str("hi".to_string()))],
        };
        assert_eq!(render_expr(&Plain, &e), "print(\"hi\")");
        assert!(prints(&[Stmt::Expr(e)]));
        assert_eq!(
            Plain.type_name(&ModelType::List(Box::new(ModelType::Primitive(Primitive::Int)))),
            "list<int>"
        );
    }
}
