//! Rust generators: a blocking reqwest client and an Axum + rusqlite server.

use super::dialect::{body_binding, render_block, render_expr, url_parts, url_template, Dialect, UrlPart};
use super::naming::{escape, pascal, snake};
use super::writer::CodeWriter;
use super::{GeneratedFile, PlatformGenerator, PlatformKey};
use crate::build::*;
use crate::config::ProjectConfig;
use crate::dsl::ast::{BinaryOp, Primitive};

const INDENT: &str = "    ";

struct Rust;

impl Rust {
    fn primitive(p: Primitive) -> &'static str {
        match p {
            Primitive::Int => "i32",
            Primitive::BigInt => "i64",
            Primitive::Float => "f32",
            Primitive::Double | Primitive::Decimal => "f64",
            Primitive::Bool => "bool",
            Primitive::String
            | Primitive::Text
            | Primitive::Char(_)
            | Primitive::Varchar(_)
            | Primitive::Date
            | Primitive::DateTime => "String",
            Primitive::Void => "()",
            Primitive::Any => "serde_json::Value",
        }
    }

    fn params<'b>(&self, params: impl Iterator<Item = (&'b str, &'b ModelType)>) -> String {
        params
            .map(|(name, ty)| format!("{name}: {}", self.type_name(ty)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn returns(&self, ty: Option<&ModelType>) -> String {
        ty.map(|t| format!(" -> {}", self.type_name(t)))
            .unwrap_or_default()
    }
}

impl Dialect for Rust {
    fn type_name(&self, ty: &ModelType) -> String {
        match ty {
            ModelType::Primitive(p) => Self::primitive(*p).to_string(),
            ModelType::List(inner) => format!("Vec<{}>", self.type_name(inner)),
            ModelType::Named { name, .. } => pascal(name),
        }
    }

    fn print(&self, args: &[String]) -> String {
        let holes = vec!["{}"; args.len()].join(" ");
        if args.is_empty() {
            "println!()".to_string()
        } else {
            format!("println!(\"{holes}\", {})", args.join(", "))
        }
    }

    fn var_decl(&self, name: &str, ty: Option<&ModelType>, init: Option<String>) -> String {
        match (ty, init) {
            (Some(ty), Some(init)) => format!("let mut {name}: {} = {init}", self.type_name(ty)),
            (Some(ty), None) => format!("let mut {name}: {} = Default::default()", self.type_name(ty)),
            (None, Some(init)) => format!("let mut {name} = {init}"),
            (None, None) => format!("let mut {name} = serde_json::Value::Null"),
        }
    }

    fn for_range(&self, var: &str, from: &str, to: &str) -> String {
        format!("for {var} in {from}..{to} {{")
    }

    fn for_each(&self, var: &str, iter: &str) -> String {
        format!("for {var} in {iter}.iter() {{")
    }

    fn string_literal(&self, s: &str) -> String {
        format!("\"{}\".to_string()", escape(s))
    }

    fn null(&self) -> &'static str {
        "None"
    }

    fn binary(&self, op: BinaryOp, lhs: String, rhs: String) -> String {
        let text = |s: &str| s.ends_with(".to_string()") || s.starts_with("format!(");
        if op == BinaryOp::Add && (text(&lhs) || text(&rhs)) {
            return format!("format!(\"{{}}{{}}\", {lhs}, {rhs})");
        }
        format!("{lhs} {} {rhs}", op.symbol())
    }

    fn name(&self, name: &str, kind: NameKind) -> String {
        match kind {
            NameKind::Constant => format!("{}()", snake(name)),
            NameKind::DataAccess => format!("state.{}", snake(name)),
            _ => name.to_string(),
        }
    }

    fn if_open(&self, cond: &str) -> String {
        format!("if {cond} {{")
    }

    fn else_if_open(&self, cond: &str) -> String {
        format!("}} else if {cond} {{")
    }

    fn while_open(&self, cond: &str) -> String {
        format!("while {cond} {{")
    }
}

fn cargo_toml(project: &ProjectConfig, dependencies: &[&str]) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line("[package]");
    w.line(format!("name = \"{}\"", project.module()));
    w.line(format!("version = \"{}\"", project.version()));
    w.line(format!(
        "edition = \"{}\"",
        project.options.language_version.as_deref().unwrap_or("2021")
    ));
    w.line(format!("description = \"{}\"", escape(&project.description())));
    w.blank();
    w.line("[dependencies]");
    for dep in dependencies {
        w.line(*dep);
    }
    for extra in &project.options.dependencies {
        let (name, version) = extra.split_once('@').unwrap_or((extra.as_str(), "*"));
        w.line(format!("{name} = \"{version}\""));
    }
    w.finish()
}

fn models(d: &Rust, model: &CodeModel) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line("use serde::{Deserialize, Serialize};");
    for record in model.records() {
        w.blank();
        if let Some(table) = &record.table {
            w.line(format!("/// Row of table `{table}`."));
        }
        w.line("#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]");
        w.line("#[serde(rename_all = \"camelCase\")]");
        w.open(format!("pub struct {} {{", pascal(&record.name)));
        for field in &record.fields {
            let ty = d.type_name(&field.ty);
            let ty = if field.nullable { format!("Option<{ty}>") } else { ty };
            w.line(format!("pub {}: {ty},", snake(&field.name)));
        }
        w.close("}");
    }
    w.finish()
}

/// Constant functions and free procedures.
fn items(w: &mut CodeWriter, d: &Rust, model: &CodeModel) {
    for c in &model.constants {
        w.blank();
        let value = c
            .value
            .as_ref()
            .map_or_else(|| "Default::default()".to_string(), |v| render_expr(d, v));
        w.open(format!("pub fn {}() -> {} {{", snake(&c.name), d.type_name(&c.ty)));
        w.line(value);
        w.close("}");
    }
    for proc in model.procedures.iter().filter(|p| !p.is_entry) {
        w.blank();
        let params = d.params(proc.params.iter().map(|p| (p.name.as_str(), &p.ty)));
        w.open(format!(
            "pub fn {}({params}){} {{",
            proc.name,
            d.returns(proc.returns.as_ref())
        ));
        render_block(w, d, &proc.body);
        w.close("}");
    }
}

// =============================================================================
// Client
// =============================================================================

pub struct RustClient;

fn format_url(call: &ClientCall) -> String {
    let mut format = String::from("{}");
    let mut args = vec!["self.base_url".to_string()];
    for part in url_parts(&url_template(&call.path, &call.bindings)) {
        match part {
            UrlPart::Text(text) => {
                format.push_str(&escape(text).replace('{', "{{").replace('}', "}}"))
            }
            UrlPart::Param(name) => {
                format.push_str("{}");
                args.push(name.to_string());
            }
        }
    }
    format!("format!(\"{format}\", {})", args.join(", "))
}

fn client(d: &Rust, client: &ClientApi) -> String {
    let ty = pascal(&client.name);
    let mut w = CodeWriter::new(INDENT);
    w.open(format!("pub struct {ty} {{"));
    w.line("base_url: String,");
    w.line("http: reqwest::blocking::Client,");
    w.close("}").blank();
    w.open(format!("impl Default for {ty} {{"));
    w.open("fn default() -> Self {");
    w.line(format!("Self::new(\"{}\")", escape(&client.base_url)));
    w.close("}");
    w.close("}").blank();
    w.line("#[allow(non_snake_case)]");
    w.open(format!("impl {ty} {{"));
    w.open("pub fn new(base_url: impl Into<String>) -> Self {");
    w.open("Self {");
    w.line("base_url: base_url.into(),");
    w.line("http: reqwest::blocking::Client::new(),");
    w.close("}");
    w.close("}").blank();
    w.open("pub fn set_server(&mut self, base_url: impl Into<String>) {");
    w.line("self.base_url = base_url.into();");
    w.close("}");

    for call in &client.calls {
        w.blank();
        if let Some(comment) = &call.comment {
            w.line(format!("/// {comment}"));
        }
        let mut params = vec!["&self".to_string()];
        params.extend(call.bindings.iter().map(|b| format!("{}: {}", b.name, d.type_name(&b.ty))));
        let returns = call
            .returns
            .as_ref()
            .map_or_else(|| "()".to_string(), |t| d.type_name(t));
        w.open(format!(
            "pub fn {}({}) -> Result<{returns}, reqwest::Error> {{",
            call.name,
            params.join(", ")
        ));
        w.line("let response = self");
        w.indent();
        w.line(".http");
        w.line(format!(
            ".request(reqwest::Method::{}, {})",
            call.method.as_str(),
            format_url(call)
        ));
        if let Some(body) = body_binding(&call.bindings) {
            w.line(format!(".json(&{})", body.name));
        }
        w.line(".send()?");
        w.line(".error_for_status()?;");
        w.dedent();
        if call.returns.is_some() {
            w.line("response.json()");
        } else {
            w.line("Ok(())");
        }
        w.close("}");
    }
    w.close("}");
    w.finish()
}

impl PlatformGenerator for RustClient {
    fn key(&self) -> PlatformKey {
        PlatformKey::Rust
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let d = Rust;
        let mut files = vec![
            GeneratedFile::new(
                "Cargo.toml",
                cargo_toml(
                    project,
                    &[
                        "reqwest = { version = \"0.12\", features = [\"blocking\", \"json\"] }",
                        "serde = { version = \"1\", features = [\"derive\"] }",
                        "serde_json = \"1\"",
                    ],
                ),
            ),
            GeneratedFile::new("src/models.rs", models(&d, model)),
        ];
        let mut api = CodeWriter::new(INDENT);
        api.line("#[allow(unused_imports)]");
        api.line("use crate::models::*;");
        for c in &model.clients {
            api.blank();
            api.lines(&client(&d, c));
        }
        if !model.clients.is_empty() {
            files.push(GeneratedFile::new("src/api.rs", api.finish()));
        }

        let mut w = CodeWriter::new(INDENT);
        w.line("#![allow(non_snake_case, unused_mut, dead_code)]").blank();
        if !model.clients.is_empty() {
            w.line("mod api;");
        }
        w.line("mod models;").blank();
        w.line("#[allow(unused_imports)]");
        w.line("use models::*;");
        items(&mut w, &d, model);
        w.blank();
        w.open("fn main() {");
        if let Some(entry) = model.entry() {
            render_block(&mut w, &d, &entry.body);
        }
        w.close("}");
        files.push(GeneratedFile::new("src/main.rs", w.finish()));
        files
    }
}

// =============================================================================
// Axum
// =============================================================================

pub struct Axum;

fn row_reader(model: &CodeModel, d: &Rust, ty: &ModelType) -> String {
    match ty {
        ModelType::Named { name, .. } => {
            let fields = model
                .data_type(name)
                .map(|t| {
                    t.fields
                        .iter()
                        .enumerate()
                        .map(|(i, f)| format!("{}: row.get({i})?", snake(&f.name)))
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            format!("|row| Ok({} {{ {fields} }})", d.type_name(ty))
        }
        _ => "|row| row.get(0)".to_string(),
    }
}

fn mappers(d: &Rust, model: &CodeModel) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line("use std::sync::{Arc, Mutex};").blank();
    w.line("use rusqlite::{params, Connection};").blank();
    w.line("use crate::models::*;");
    for mapper in &model.mappers {
        let ty = pascal(&mapper.name);
        w.blank();
        w.line("#[derive(Clone)]");
        w.open(format!("pub struct {ty} {{"));
        w.line("conn: Arc<Mutex<Connection>>,");
        w.close("}").blank();
        w.line("#[allow(non_snake_case)]");
        w.open(format!("impl {ty} {{"));
        w.open("pub fn new(conn: Arc<Mutex<Connection>>) -> Self {");
        w.line("Self { conn }");
        w.close("}");
        for op in &mapper.operations {
            w.blank();
            let params = d.params(op.params.iter().map(|p| (p.name.as_str(), &p.ty)));
            let binds = format!("params![{}]", op.bind_order.join(", "));
            let sql = format!("\"{}\"", escape(op.positional_sql.trim()));
            let returns = op
                .returns
                .as_ref()
                .map_or_else(|| "usize".to_string(), |t| d.type_name(t));
            w.open(format!("pub fn {}(&self, {params}) -> {returns} {{", op.name));
            w.line("let Ok(conn) = self.conn.lock() else {");
            w.line(format!("{INDENT}return Default::default();"));
            w.line("};");
            match &op.returns {
                Some(ty) if ty.is_list() => {
                    w.line(format!("let Ok(mut stmt) = conn.prepare({sql}) else {{"));
                    w.line(format!("{INDENT}return Vec::new();"));
                    w.line("};");
                    w.line(format!(
                        "stmt.query_map({binds}, {})",
                        row_reader(model, d, ty.element())
                    ));
                    w.indent();
                    w.line(".and_then(|rows| rows.collect())");
                    w.line(".unwrap_or_default()");
                    w.dedent();
                }
                Some(ty) => {
                    w.line(format!("conn.query_row({sql}, {binds}, {})", row_reader(model, d, ty)));
                    w.indent();
                    w.line(".unwrap_or_default()");
                    w.dedent();
                }
                None => {
                    w.line(format!("conn.execute({sql}, {binds}).unwrap_or_default()"));
                }
            }
            w.close("}");
        }
        w.close("}");
    }
    w.finish()
}

/// Axum 0.7 route pattern: `{id}` becomes `:id`.
fn axum_pattern(path: &str) -> String {
    url_parts(path)
        .into_iter()
        .map(|part| match part {
            UrlPart::Text(text) => text.to_string(),
            UrlPart::Param(name) => format!(":{name}"),
        })
        .collect()
}

fn routes(d: &Rust, model: &CodeModel) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line("use std::collections::HashMap;").blank();
    w.line("use axum::extract::{Path, Query, State};");
    w.line("use axum::routing::{delete, get, head, options, patch, post, put};");
    w.line("use axum::{Json, Router};").blank();
    w.line("use crate::models::*;");
    w.line("use crate::AppState;");

    for service in &model.services {
        w.blank();
        if let Some(comment) = &service.comment {
            w.line(format!("/// {comment}"));
        }
        w.open(format!("pub fn {}() -> Router<AppState> {{", snake(&service.name)));
        w.line("Router::new()");
        w.indent();
        for route in &service.routes {
            w.line(format!(
                ".route(\"{}\", {}({}_handler))",
                axum_pattern(&route.path),
                route.method.lower(),
                snake(&route.handler)
            ));
        }
        w.dedent();
        w.close("}");

        for route in &service.routes {
            let name = snake(&route.handler);
            let path: Vec<&RouteBinding> = route
                .bindings
                .iter()
                .filter(|b| b.source == BindingSource::Path)
                .collect();
            let query: Vec<&RouteBinding> = route
                .bindings
                .iter()
                .filter(|b| b.source == BindingSource::Query)
                .collect();

            let mut extractors = vec!["State(state): State<AppState>".to_string()];
            match path.as_slice() {
                [] => {}
                [one] => extractors.push(format!("Path({}): Path<{}>", one.name, d.type_name(&one.ty))),
                many => {
                    let names: Vec<&str> = many.iter().map(|b| b.name.as_str()).collect();
                    let types: Vec<String> = many.iter().map(|b| d.type_name(&b.ty)).collect();
                    extractors.push(format!(
                        "Path(({})): Path<({})>",
                        names.join(", "),
                        types.join(", ")
                    ));
                }
            }
            if !query.is_empty() {
                extractors.push("Query(query): Query<HashMap<String, String>>".to_string());
            }
            if let Some(body) = body_binding(&route.bindings) {
                extractors.push(format!("Json({}): Json<{}>", body.name, d.type_name(&body.ty)));
            }

            w.blank();
            if let Some(comment) = &route.comment {
                w.line(format!("/// {comment}"));
            }
            let output = route
                .returns
                .as_ref()
                .map(|t| format!(" -> Json<{}>", d.type_name(t)))
                .unwrap_or_default();
            w.open(format!("async fn {name}_handler({}){output} {{", extractors.join(", ")));
            for binding in &query {
                w.line(format!(
                    "let {}: {} = query.get(\"{}\").and_then(|v| v.parse().ok()).unwrap_or_default();",
                    binding.name,
                    d.type_name(&binding.ty),
                    binding.name
                ));
            }
            let args: Vec<&str> = route.bindings.iter().map(|b| b.name.as_str()).collect();
            let mut call_args = vec!["&state"];
            call_args.extend(args);
            let call = format!("{}({})", route.handler, call_args.join(", "));
            if route.returns.is_some() {
                w.line(format!("Json({call})"));
            } else {
                w.line(format!("{call};"));
            }
            w.close("}");

            w.blank();
            w.line("#[allow(non_snake_case, unused_mut)]");
            let mut params = vec!["state: &AppState".to_string()];
            params.extend(route.bindings.iter().map(|b| format!("{}: {}", b.name, d.type_name(&b.ty))));
            w.open(format!(
                "fn {}({}){} {{",
                route.handler,
                params.join(", "),
                d.returns(route.returns.as_ref())
            ));
            render_block(&mut w, d, &route.body);
            w.close("}");
        }
    }
    w.finish()
}

impl PlatformGenerator for Axum {
    fn key(&self) -> PlatformKey {
        PlatformKey::Axum
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let d = Rust;
        let mut w = CodeWriter::new(INDENT);
        w.line("#![allow(non_snake_case, unused_mut, dead_code)]").blank();
        w.line("mod mappers;");
        w.line("mod models;");
        w.line("mod routes;").blank();
        w.line("use std::sync::{Arc, Mutex};").blank();
        w.line("use axum::Router;");
        w.line("#[allow(unused_imports)]");
        w.line("use models::*;").blank();
        w.line("#[derive(Clone)]");
        w.open("pub struct AppState {");
        for mapper in &model.mappers {
            w.line(format!(
                "pub {}: mappers::{},",
                snake(&mapper.name),
                pascal(&mapper.name)
            ));
        }
        w.close("}");
        items(&mut w, &d, model);
        w.blank();
        w.line("#[tokio::main]");
        w.open("async fn main() {");
        if let Some(entry) = model.entry() {
            render_block(&mut w, &d, &entry.body);
        }
        w.line("let conn = rusqlite::Connection::open(\"app.db\").expect(\"open app.db\");");
        w.line("let conn = Arc::new(Mutex::new(conn));");
        w.open("let state = AppState {");
        for mapper in &model.mappers {
            w.line(format!(
                "{}: mappers::{}::new(conn.clone()),",
                snake(&mapper.name),
                pascal(&mapper.name)
            ));
        }
        w.close("};");
        w.line("let app = Router::new()");
        w.indent();
        for service in &model.services {
            w.line(format!(".merge(routes::{}())", snake(&service.name)));
        }
        w.line(".with_state(state);");
        w.dedent();
        w.line("let listener = tokio::net::TcpListener::bind(\"0.0.0.0:8080\").await.expect(\"bind\");");
        w.line("axum::serve(listener, app).await.expect(\"serve\");");
        w.close("}");

        vec![
            GeneratedFile::new(
                "Cargo.toml",
                cargo_toml(
                    project,
                    &[
                        "axum = \"0.7\"",
                        "rusqlite = { version = \"0.31\", features = [\"bundled\"] }",
                        "serde = { version = \"1\", features = [\"derive\"] }",
                        "serde_json = \"1\"",
                        "tokio = { version = \"1\", features = [\"full\"] }",
                    ],
                ),
            ),
            GeneratedFile::new("src/models.rs", models(&d, model)),
            GeneratedFile::new("src/mappers.rs", mappers(&d, model)),
            GeneratedFile::new("src/routes.rs", routes(&d, model)),
            GeneratedFile::new("src/main.rs", w.finish()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::Compiler;

    fn model_for(src: &str, key: PlatformKey) -> CodeModel {
        let mut compiler = Compiler::new(Some(key));
        compiler.compile_str(src, "rust.jssp").unwrap();
        crate::build::lower(&mut compiler).unwrap()
    }

    fn contents<'a>(files: &'a [GeneratedFile], path: &str) -> &'a str {
        files
            .iter()
            .find(|f| f.path.to_string_lossy() == path)
            .map(|f| f.contents.as_str())
            .unwrap_or_else(|| panic!("missing {path}"))
    }

    #[test]
    fn client_program_renders_statements_and_constants() {
        let src = "
            property greeting string = 'hello';
            func main() {
                for (i in 0..3) { @console.log(greeting + ' ' + i); }
            }
        ";
        let model = model_for(src, PlatformKey::Rust);
        let project = ProjectConfig::new("hello", PlatformKey::Rust, "out");
        let files = RustClient.generate(&model, &project);
        let main = contents(&files, "src/main.rs");
        assert!(main.contains("pub fn greeting() -> String {"));
        assert!(main.contains("for i in 0..3 {"));
        assert!(main.contains("format!(\"{}{}\", greeting(), \" \".to_string())"));
        assert!(!files.iter().any(|f| f.path.to_string_lossy() == "src/api.rs"));
    }

    #[test]
    fn axum_routes_and_mapper_state() {
        let src = "
            table item { id bigint; label string; key(id); }
            mapper ItemMapper {
                query all() list<item> { select id, label from item }
            }
            controller ItemController {
                [method=get, route='/items']
                func listItems() list<item> { return ItemMapper.all(); }
            }
        ";
        let model = model_for(src, PlatformKey::Axum);
        let project = ProjectConfig::new("shop", PlatformKey::Axum, "out");
        let files = Axum.generate(&model, &project);

        let routes = contents(&files, "src/routes.rs");
        assert!(routes.contains(".route(\"/items\", get(list_items_handler))"));
        assert!(routes.contains("return state.item_mapper.all();"));

        let mappers = contents(&files, "src/mappers.rs");
        assert!(mappers.contains("|row| Ok(Item { id: row.get(0)?, label: row.get(1)? })"));
        assert!(contents(&files, "src/main.rs").contains(".merge(routes::item_controller())"));
    }
}
