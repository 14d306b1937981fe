//! Go generators: a `net/http` client program and a Gin server.

use std::collections::BTreeSet;

use super::dialect::{self, body_binding, render_block, render_expr, url_parts, url_template, Dialect, UrlPart};
use super::naming::{camel, escape, pascal};
use super::writer::CodeWriter;
use super::{GeneratedFile, PlatformGenerator, PlatformKey};
use crate::build::*;
use crate::config::ProjectConfig;
use crate::dsl::ast::Primitive;

const INDENT: &str = "\t";

struct Go;

impl Go {
    fn primitive(p: Primitive) -> &'static str {
        match p {
            Primitive::Int => "int",
            Primitive::BigInt => "int64",
            Primitive::Float => "float32",
            Primitive::Double | Primitive::Decimal => "float64",
            Primitive::Bool => "bool",
            Primitive::String
            | Primitive::Text
            | Primitive::Char(_)
            | Primitive::Varchar(_)
            | Primitive::Date
            | Primitive::DateTime => "string",
            Primitive::Void => "",
            Primitive::Any => "any",
        }
    }

    fn params<'b>(&self, params: impl Iterator<Item = (&'b str, &'b ModelType)>) -> String {
        params
            .map(|(name, ty)| format!("{name} {}", self.type_name(ty)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn returns(&self, ty: Option<&ModelType>) -> String {
        ty.map(|t| format!(" {}", self.type_name(t))).unwrap_or_default()
    }
}

impl Dialect for Go {
    fn type_name(&self, ty: &ModelType) -> String {
        match ty {
            ModelType::Primitive(p) => Self::primitive(*p).to_string(),
            ModelType::List(inner) => format!("[]{}", self.type_name(inner)),
            ModelType::Named { name, .. } => pascal(name),
        }
    }

    fn print(&self, args: &[String]) -> String {
        format!("fmt.Println({})", args.join(", "))
    }

    fn var_decl(&self, name: &str, ty: Option<&ModelType>, init: Option<String>) -> String {
        match (ty, init) {
            (Some(ty), Some(init)) => format!("var {name} {} = {init}", self.type_name(ty)),
            (Some(ty), None) => format!("var {name} {}", self.type_name(ty)),
            (None, Some(init)) => format!("{name} := {init}"),
            (None, None) => format!("var {name} any"),
        }
    }

    fn for_range(&self, var: &str, from: &str, to: &str) -> String {
        format!("for {var} := {from}; {var} < {to}; {var}++ {{")
    }

    fn for_each(&self, var: &str, iter: &str) -> String {
        format!("for _, {var} := range {iter} {{")
    }

    fn null(&self) -> &'static str {
        "nil"
    }

    fn name(&self, name: &str, kind: NameKind) -> String {
        match kind {
            NameKind::DataAccess => format!("c.{}", camel(name)),
            _ => name.to_string(),
        }
    }

    fn terminator(&self) -> &'static str {
        ""
    }

    fn if_open(&self, cond: &str) -> String {
        format!("if {cond} {{")
    }

    fn else_if_open(&self, cond: &str) -> String {
        format!("}} else if {cond} {{")
    }

    fn while_open(&self, cond: &str) -> String {
        format!("for {cond} {{")
    }
}

fn go_mod(project: &ProjectConfig, requires: &[(&str, &str)]) -> String {
    let go = project.options.language_version.as_deref().unwrap_or("1.22");
    let mut w = CodeWriter::new(INDENT);
    w.line(format!("module {}", project.module())).blank();
    w.line(format!("go {go}"));
    if !requires.is_empty() || !project.options.dependencies.is_empty() {
        w.blank();
        w.open("require (");
        for (module, version) in requires {
            w.line(format!("{module} {version}"));
        }
        for extra in &project.options.dependencies {
            let (module, version) = extra.split_once('@').unwrap_or((extra.as_str(), "latest"));
            w.line(format!("{module} {version}"));
        }
        w.close(")");
    }
    w.finish()
}

fn imports(w: &mut CodeWriter, imports: &BTreeSet<&str>) {
    match imports.len() {
        0 => {}
        1 => {
            for import in imports {
                w.line(format!("import \"{import}\""));
            }
            w.blank();
        }
        _ => {
            w.open("import (");
            for import in imports {
                w.line(format!("\"{import}\""));
            }
            w.close(")").blank();
        }
    }
}

fn models(d: &Go, model: &CodeModel) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line("package main").blank();
    for record in model.records() {
        if let Some(table) = &record.table {
            w.line(format!("// {} is a row of table {table}.", pascal(&record.name)));
        }
        w.open(format!("type {} struct {{", pascal(&record.name)));
        for field in &record.fields {
            let ty = d.type_name(&field.ty);
            let ty = if field.nullable && !field.ty.is_list() {
                format!("*{ty}")
            } else {
                ty
            };
            w.line(format!(
                "{} {ty} `json:\"{}\"`",
                pascal(&field.name),
                camel(&field.name)
            ));
        }
        w.close("}").blank();
    }
    w.finish()
}

/// `main.go`: constants, functions and the entry body.
fn program(d: &Go, model: &CodeModel, server: Option<&str>) -> String {
    let mut set = BTreeSet::new();
    if model.procedures.iter().any(|p| dialect::prints(&p.body)) {
        set.insert("fmt");
    }
    if server.is_some() {
        set.extend(["database/sql", "log", "github.com/gin-gonic/gin"]);
    }

    let mut w = CodeWriter::new(INDENT);
    w.line("package main").blank();
    imports(&mut w, &set);
    if server.is_some() {
        // Driver registration.
        w.line("import _ \"github.com/mattn/go-sqlite3\"").blank();
    }

    for c in &model.constants {
        let value = c
            .value
            .as_ref()
            .map_or_else(String::new, |v| format!(" = {}", render_expr(d, v)));
        w.line(format!("var {} {}{value}", c.name, d.type_name(&c.ty)));
    }
    for proc in model.procedures.iter().filter(|p| !p.is_entry) {
        w.blank();
        let params = d.params(proc.params.iter().map(|p| (p.name.as_str(), &p.ty)));
        w.open(format!(
            "func {}({params}){} {{",
            proc.name,
            d.returns(proc.returns.as_ref())
        ));
        render_block(&mut w, d, &proc.body);
        w.close("}");
    }
    w.blank();
    w.open("func main() {");
    if let Some(entry) = model.entry() {
        render_block(&mut w, d, &entry.body);
    }
    if let Some(setup) = server {
        w.lines(setup);
    }
    w.close("}");
    w.finish()
}

// =============================================================================
// Client
// =============================================================================

pub struct GoClient;

fn sprintf_url(call: &ClientCall) -> String {
    let template = url_template(&call.path, &call.bindings);
    let mut format = String::from("%s");
    let mut args = vec!["a.BaseURL".to_string()];
    for part in url_parts(&template) {
        match part {
            UrlPart::Text(text) => format.push_str(&escape(text).replace('%', "%%")),
            UrlPart::Param(name) => {
                format.push_str("%v");
                args.push(name.to_string());
            }
        }
    }
    format!("fmt.Sprintf(\"{format}\", {})", args.join(", "))
}

fn client(d: &Go, client: &ClientApi) -> String {
    let ty = pascal(&client.name);
    let mut w = CodeWriter::new(INDENT);
    w.line("package main").blank();
    let mut set = BTreeSet::from(["encoding/json", "fmt", "net/http"]);
    if client.calls.iter().any(|c| body_binding(&c.bindings).is_some()) {
        set.insert("bytes");
    }
    imports(&mut w, &set);

    w.open(format!("type {ty} struct {{"));
    w.line("BaseURL string");
    w.line("Client  *http.Client");
    w.close("}").blank();
    w.open(format!("func New{ty}() *{ty} {{"));
    w.line(format!(
        "return &{ty}{{BaseURL: \"{}\", Client: http.DefaultClient}}",
        escape(&client.base_url)
    ));
    w.close("}");

    for call in &client.calls {
        w.blank();
        let method = pascal(&call.name);
        if let Some(comment) = &call.comment {
            w.line(format!("// {method} {comment}"));
        }
        let params = d.params(call.bindings.iter().map(|b| (b.name.as_str(), &b.ty)));
        let (signature, zero) = match &call.returns {
            Some(t) => (format!("({}, error)", d.type_name(t)), "result, "),
            None => ("error".to_string(), ""),
        };
        w.open(format!("func (a *{ty}) {method}({params}) {signature} {{"));
        if let Some(t) = &call.returns {
            w.line(format!("var result {}", d.type_name(t)));
        }
        match body_binding(&call.bindings) {
            Some(body) => {
                w.line(format!("payload, err := json.Marshal({})", body.name));
                w.open("if err != nil {");
                w.line(format!("return {zero}err"));
                w.close("}");
                w.line(format!(
                    "req, err := http.NewRequest(\"{}\", {}, bytes.NewReader(payload))",
                    call.method.as_str(),
                    sprintf_url(call)
                ));
            }
            None => {
                w.line(format!(
                    "req, err := http.NewRequest(\"{}\", {}, nil)",
                    call.method.as_str(),
                    sprintf_url(call)
                ));
            }
        }
        w.open("if err != nil {");
        w.line(format!("return {zero}err"));
        w.close("}");
        w.line("req.Header.Set(\"Content-Type\", \"application/json\")");
        w.line("resp, err := a.Client.Do(req)");
        w.open("if err != nil {");
        w.line(format!("return {zero}err"));
        w.close("}");
        w.line("defer resp.Body.Close()");
        w.open("if resp.StatusCode >= 400 {");
        w.line(format!(
            "return {zero}fmt.Errorf(\"{} failed: %s\", resp.Status)",
            call.name
        ));
        w.close("}");
        if call.returns.is_some() {
            w.line("err = json.NewDecoder(resp.Body).Decode(&result)");
            w.line("return result, err");
        } else {
            w.line("return nil");
        }
        w.close("}");
    }
    w.finish()
}

impl PlatformGenerator for GoClient {
    fn key(&self) -> PlatformKey {
        PlatformKey::Go
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let d = Go;
        let mut files = vec![
            GeneratedFile::new("go.mod", go_mod(project, &[])),
            GeneratedFile::new("src/models.go", models(&d, model)),
        ];
        for c in &model.clients {
            files.push(GeneratedFile::new(
                format!("src/{}.go", crate::platform::naming::snake(&c.name)),
                client(&d, c),
            ));
        }
        files.push(GeneratedFile::new("src/main.go", program(&d, model, None)));
        files
    }
}

// =============================================================================
// Gin
// =============================================================================

pub struct Gin;

/// Statement converting the raw text `raw` into `name`; `None` for strings.
fn parse_text(name: &str, raw: &str, ty: &ModelType) -> Option<Vec<String>> {
    let lines = match ty {
        ModelType::Primitive(Primitive::Int) => vec![format!("{name}, _ := strconv.Atoi({raw})")],
        ModelType::Primitive(Primitive::BigInt) => {
            vec![format!("{name}, _ := strconv.ParseInt({raw}, 10, 64)")]
        }
        ModelType::Primitive(Primitive::Double | Primitive::Decimal) => {
            vec![format!("{name}, _ := strconv.ParseFloat({raw}, 64)")]
        }
        ModelType::Primitive(Primitive::Float) => vec![
            format!("{name}Raw, _ := strconv.ParseFloat({raw}, 32)"),
            format!("{name} := float32({name}Raw)"),
        ],
        ModelType::Primitive(Primitive::Bool) => {
            vec![format!("{name}, _ := strconv.ParseBool({raw})")]
        }
        _ => return None,
    };
    Some(lines)
}

fn scan_targets(model: &CodeModel, target: &str, ty: &ModelType) -> String {
    match ty {
        ModelType::Named { name, .. } => model
            .data_type(name)
            .map(|t| {
                t.fields
                    .iter()
                    .map(|f| format!("&{target}.{}", pascal(&f.name)))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default(),
        _ => format!("&{target}"),
    }
}

/// Go string literal for a query: a raw string unless the SQL itself
/// contains backticks (quoted identifiers).
fn sql_literal(sql: &str) -> String {
    if sql.contains('`') {
        format!("\"{}\"", escape(sql))
    } else {
        format!("`{sql}`")
    }
}

fn mappers(d: &Go, model: &CodeModel) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line("package main").blank();
    imports(&mut w, &BTreeSet::from(["database/sql", "log"]));
    for mapper in &model.mappers {
        let class = pascal(&mapper.name);
        w.open(format!("type {class} struct {{"));
        w.line("db *sql.DB");
        w.close("}").blank();
        w.open(format!("func New{class}(db *sql.DB) *{class} {{"));
        w.line(format!("return &{class}{{db: db}}"));
        w.close("}");

        for op in &mapper.operations {
            w.blank();
            let params = d.params(op.params.iter().map(|p| (p.name.as_str(), &p.ty)));
            let args: Vec<&str> = op.bind_order.iter().map(String::as_str).collect();
            let args = if args.is_empty() {
                String::new()
            } else {
                format!(", {}", args.join(", "))
            };
            let sql = sql_literal(op.positional_sql.trim());
            match &op.returns {
                Some(ty) if ty.is_list() => {
                    let element = d.type_name(ty.element());
                    w.open(format!("func (m *{class}) {}({params}) []{element} {{", op.name));
                    w.line(format!("var result []{element}"));
                    w.line(format!("rows, err := m.db.Query({sql}{args})"));
                    w.open("if err != nil {");
                    w.line(format!("log.Printf(\"{}: %v\", err)", op.name));
                    w.line("return result");
                    w.close("}");
                    w.line("defer rows.Close()");
                    w.open("for rows.Next() {");
                    w.line(format!("var row {element}"));
                    w.open(format!(
                        "if err := rows.Scan({}); err != nil {{",
                        scan_targets(model, "row", ty.element())
                    ));
                    w.line(format!("log.Printf(\"{}: %v\", err)", op.name));
                    w.line("continue");
                    w.close("}");
                    w.line("result = append(result, row)");
                    w.close("}");
                    w.line("return result");
                    w.close("}");
                }
                Some(ty) => {
                    w.open(format!(
                        "func (m *{class}) {}({params}) {} {{",
                        op.name,
                        d.type_name(ty)
                    ));
                    w.line(format!("var result {}", d.type_name(ty)));
                    w.line(format!(
                        "err := m.db.QueryRow({sql}{args}).Scan({})",
                        scan_targets(model, "result", ty)
                    ));
                    w.open("if err != nil && err != sql.ErrNoRows {");
                    w.line(format!("log.Printf(\"{}: %v\", err)", op.name));
                    w.close("}");
                    w.line("return result");
                    w.close("}");
                }
                None => {
                    w.open(format!("func (m *{class}) {}({params}) int64 {{", op.name));
                    w.line(format!("res, err := m.db.Exec({sql}{args})"));
                    w.open("if err != nil {");
                    w.line(format!("log.Printf(\"{}: %v\", err)", op.name));
                    w.line("return 0");
                    w.close("}");
                    w.line("n, _ := res.RowsAffected()");
                    w.line("return n");
                    w.close("}");
                }
            }
        }
        w.blank();
    }
    w.finish()
}

/// Gin route pattern: `{id}` becomes `:id`.
fn gin_pattern(path: &str) -> String {
    url_parts(path)
        .into_iter()
        .map(|part| match part {
            UrlPart::Text(text) => text.to_string(),
            UrlPart::Param(name) => format!(":{name}"),
        })
        .collect()
}

fn controller_mappers(service: &Service) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for route in &service.routes {
        for name in dialect::referenced(&route.body, NameKind::DataAccess) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

fn controllers(d: &Go, model: &CodeModel) -> String {
    let mut set = BTreeSet::from(["net/http", "github.com/gin-gonic/gin"]);
    let needs_strconv = model.services.iter().flat_map(|s| &s.routes).any(|r| {
        r.bindings
            .iter()
            .any(|b| b.source != BindingSource::Body && parse_text("x", "x", &b.ty).is_some())
    });
    if needs_strconv {
        set.insert("strconv");
    }
    if model
        .services
        .iter()
        .flat_map(|s| &s.routes)
        .any(|r| dialect::prints(&r.body))
    {
        set.insert("fmt");
    }

    let mut w = CodeWriter::new(INDENT);
    w.line("package main").blank();
    imports(&mut w, &set);

    for service in &model.services {
        let ty = pascal(&service.name);
        let mappers = controller_mappers(service);
        if let Some(comment) = &service.comment {
            w.line(format!("// {ty} {comment}"));
        }
        w.open(format!("type {ty} struct {{"));
        for m in &mappers {
            w.line(format!("{} *{}", camel(m), pascal(m)));
        }
        w.close("}").blank();

        w.open(format!("func (c *{ty}) Register(r *gin.Engine) {{"));
        for route in &service.routes {
            w.open(format!(
                "r.{}(\"{}\", func(ctx *gin.Context) {{",
                route.method.as_str(),
                gin_pattern(&route.path)
            ));
            let mut args = Vec::new();
            for binding in &route.bindings {
                let raw = match binding.source {
                    BindingSource::Path => format!("ctx.Param(\"{}\")", binding.name),
                    BindingSource::Query => format!("ctx.Query(\"{}\")", binding.name),
                    BindingSource::Body => {
                        w.line(format!("var {} {}", binding.name, d.type_name(&binding.ty)));
                        w.open(format!("if err := ctx.ShouldBindJSON(&{}); err != nil {{", binding.name));
                        w.line("ctx.JSON(http.StatusBadRequest, gin.H{\"error\": err.Error()})");
                        w.line("return");
                        w.close("}");
                        args.push(binding.name.clone());
                        continue;
                    }
                };
                match parse_text(&binding.name, &raw, &binding.ty) {
                    Some(lines) => {
                        for line in lines {
                            w.line(line);
                        }
                    }
                    None => {
                        w.line(format!("{} := {raw}", binding.name));
                    }
                }
                args.push(binding.name.clone());
            }
            let call = format!("c.{}({})", route.handler, args.join(", "));
            if route.returns.is_some() {
                w.line(format!("ctx.JSON(http.StatusOK, {call})"));
            } else {
                w.line(call);
                w.line("ctx.Status(http.StatusNoContent)");
            }
            w.close("})");
        }
        w.close("}");

        for route in &service.routes {
            w.blank();
            if let Some(comment) = &route.comment {
                w.line(format!("// {} {comment}", route.handler));
            }
            let params = d.params(route.bindings.iter().map(|b| (b.name.as_str(), &b.ty)));
            w.open(format!(
                "func (c *{ty}) {}({params}){} {{",
                route.handler,
                d.returns(route.returns.as_ref())
            ));
            render_block(&mut w, d, &route.body);
            w.close("}");
        }
        w.blank();
    }
    w.finish()
}

impl PlatformGenerator for Gin {
    fn key(&self) -> PlatformKey {
        PlatformKey::Gin
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let d = Go;
        let mut setup = CodeWriter::new(INDENT);
        setup.line("db, err := sql.Open(\"sqlite3\", \"app.db\")");
        setup.open("if err != nil {");
        setup.line("log.Fatal(err)");
        setup.close("}");
        setup.line("defer db.Close()");
        setup.line("r := gin.Default()");
        for service in &model.services {
            let fields: Vec<String> = controller_mappers(service)
                .iter()
                .map(|m| format!("{}: New{}(db)", camel(m), pascal(m)))
                .collect();
            setup.line(format!(
                "(&{}{{{}}}).Register(r)",
                pascal(&service.name),
                fields.join(", ")
            ));
        }
        setup.line("log.Fatal(r.Run(\":8080\"))");

        vec![
            GeneratedFile::new(
                "go.mod",
                go_mod(
                    project,
                    &[
                        ("github.com/gin-gonic/gin", "v1.10.0"),
                        ("github.com/mattn/go-sqlite3", "v1.14.22"),
                    ],
                ),
            ),
            GeneratedFile::new("src/models.go", models(&d, model)),
            GeneratedFile::new("src/mappers.go", mappers(&d, model)),
            GeneratedFile::new("src/controllers.go", controllers(&d, model)),
            GeneratedFile::new("src/main.go", program(&d, model, Some(&setup.finish()))),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::Compiler;

    fn model_for(src: &str, key: PlatformKey) -> CodeModel {
        let mut compiler = Compiler::new(Some(key));
        compiler.compile_str(src, "go.jssp").unwrap();
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
    fn main_imports_fmt_only_when_printing() {
        let model = model_for("func main() { var i = 0; while (i < 3) { i = i + 1; } }", PlatformKey::Go);
        let project = ProjectConfig::new("tool", PlatformKey::Go, "out");
        let files = GoClient.generate(&model, &project);
        let main = contents(&files, "src/main.go");
        assert!(!main.contains("\"fmt\""));
        assert!(main.contains("i := 0"));
        assert!(main.contains("for i < 3 {"));

        let model = model_for("func main() { @console.log('x'); }", PlatformKey::Go);
        let files = GoClient.generate(&model, &project);
        assert!(contents(&files, "src/main.go").contains("import \"fmt\""));
        assert!(contents(&files, "go.mod").starts_with("module tool"));
    }

    #[test]
    fn gin_routes_use_colon_params_and_strconv() {
        let src = "
            table todo { id int; title string; key(id); }
            mapper TodoMapper {
                query byId(id int) todo { select id, title from todo where id = :id }
            }
            controller TodoController {
                [method=get, route='/todos/{id}']
                func getTodo(id int) todo { return TodoMapper.byId(id); }
            }
        ";
        let model = model_for(src, PlatformKey::Gin);
        let project = ProjectConfig::new("tool", PlatformKey::Gin, "out");
        let files = Gin.generate(&model, &project);

        let controllers = contents(&files, "src/controllers.go");
        assert!(controllers.contains("r.GET(\"/todos/:id\", func(ctx *gin.Context) {"));
        assert!(controllers.contains("id, _ := strconv.Atoi(ctx.Param(\"id\"))"));
        assert!(controllers.contains("return c.todoMapper.byId(id)"));

        let mappers = contents(&files, "src/mappers.go");
        assert!(mappers.contains("Scan(&result.Id, &result.Title)"));
        assert!(contents(&files, "src/main.go").contains("(&TodoController{todoMapper: NewTodoMapper(db)}).Register(r)"));
    }

    #[test]
    fn quoted_identifiers_survive_in_queries() {
        assert_eq!(sql_literal("select id from t"), "`select id from t`");
        assert_eq!(
            sql_literal("select `name` from t where id = ?"),
            "\"select `name` from t where id = ?\""
        );

        let src = "
            table t { id int; name string; key(id); }
            mapper TMapper {
                query byId(id int) t { select id, `name` from t where id = :id }
            }
        ";
        let model = model_for(src, PlatformKey::Gin);
        let project = ProjectConfig::new("tool", PlatformKey::Gin, "out");
        let files = Gin.generate(&model, &project);
        let mappers = contents(&files, "src/mappers.go");
        assert!(
            mappers.contains("\"select id, `name` from t where id = ?\""),
            "{mappers}"
        );
        assert!(!mappers.contains("'name'"));
    }
}
