//! JavaScript and TypeScript generators: fetch clients and an Express server.
//!
//! The TypeScript pieces are shared with the web frontends.

use super::dialect::{self, body_binding, render_block, render_expr, url_parts, url_template, Dialect, UrlPart};
use super::naming::{camel, escape, pascal};
use super::writer::CodeWriter;
use super::{GeneratedFile, PlatformGenerator, PlatformKey};
use crate::build::*;
use crate::config::ProjectConfig;
use crate::dsl::ast::{BinaryOp, Primitive};

pub(crate) const INDENT: &str = "  ";

/// JavaScript, optionally with TypeScript annotations.
pub(crate) struct Js {
    pub typed: bool,
}

impl Js {
    fn annotate(&self, ty: &ModelType) -> String {
        if self.typed {
            format!(": {}", self.type_name(ty))
        } else {
            String::new()
        }
    }

    pub(crate) fn params<'b>(&self, params: impl Iterator<Item = (&'b str, &'b ModelType)>) -> String {
        params
            .map(|(name, ty)| format!("{name}{}", self.annotate(ty)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub(crate) fn returns(&self, ty: Option<&ModelType>, wrap: Option<&str>) -> String {
        if !self.typed {
            return String::new();
        }
        let inner = ty.map_or_else(|| "void".to_string(), |t| self.type_name(t));
        match wrap {
            Some(wrapper) => format!(": {wrapper}<{inner}>"),
            None => format!(": {inner}"),
        }
    }

    pub(crate) fn ext(&self) -> &'static str {
        if self.typed {
            "ts"
        } else {
            "js"
        }
    }
}

impl Dialect for Js {
    fn type_name(&self, ty: &ModelType) -> String {
        match ty {
            ModelType::Primitive(p) => match p {
                Primitive::Int
                | Primitive::BigInt
                | Primitive::Float
                | Primitive::Double
                | Primitive::Decimal => "number",
                Primitive::Bool => "boolean",
                Primitive::Void => "void",
                Primitive::Any => "any",
                _ => "string",
            }
            .to_string(),
            ModelType::List(inner) => format!("{}[]", self.type_name(inner)),
            ModelType::Named { name, .. } => pascal(name),
        }
    }

    fn print(&self, args: &[String]) -> String {
        format!("console.log({})", args.join(", "))
    }

    fn var_decl(&self, name: &str, ty: Option<&ModelType>, init: Option<String>) -> String {
        let annotation = ty.map(|t| self.annotate(t)).unwrap_or_default();
        match init {
            Some(init) => format!("let {name}{annotation} = {init}"),
            None => format!("let {name}{annotation}"),
        }
    }

    fn for_range(&self, var: &str, from: &str, to: &str) -> String {
        format!("for (let {var} = {from}; {var} < {to}; {var}++) {{")
    }

    fn for_each(&self, var: &str, iter: &str) -> String {
        format!("for (const {var} of {iter}) {{")
    }

    fn binary_op(&self, op: BinaryOp) -> &'static str {
        match op {
            BinaryOp::Eq => "===",
            BinaryOp::NotEq => "!==",
            other => other.symbol(),
        }
    }

    fn name(&self, name: &str, kind: NameKind) -> String {
        match kind {
            NameKind::DataAccess => camel(name),
            _ => name.to_string(),
        }
    }
}

/// TypeScript interfaces, or JSDoc typedefs for plain JavaScript.
pub(crate) fn models(d: &Js, model: &CodeModel) -> String {
    let mut w = CodeWriter::new(INDENT);
    let mut first = true;
    for record in model.records() {
        if !first {
            w.blank();
        }
        first = false;
        if d.typed {
            w.open(format!("export interface {} {{", pascal(&record.name)));
            for f in &record.fields {
                let optional = if f.nullable || f.auto { "?" } else { "" };
                w.line(format!("{}{optional}: {};", f.name, d.type_name(&f.ty)));
            }
            w.close("}");
        } else {
            w.line("/**");
            w.line(format!(" * @typedef {{object}} {}", pascal(&record.name)));
            for f in &record.fields {
                w.line(format!(" * @property {{{}}} {}", d.type_name(&f.ty), f.name));
            }
            w.line(" */");
        }
    }
    if !d.typed {
        w.blank();
        w.line("export {};");
    }
    w.finish()
}

fn template_url(call: &ClientCall) -> String {
    let mut out = String::from("`${this.baseUrl}");
    for part in url_parts(&url_template(&call.path, &call.bindings)) {
        match part {
            UrlPart::Text(text) => out.push_str(&text.replace('`', "\\`").replace("${", "\\${")),
            UrlPart::Param(name) => out.push_str(&format!("${{encodeURIComponent({name})}}")),
        }
    }
    out.push('`');
    out
}

/// One class per client, each method an async `fetch`.
pub(crate) fn clients(d: &Js, model: &CodeModel) -> String {
    let mut w = CodeWriter::new(INDENT);
    if d.typed && model.records().next().is_some() {
        let names: Vec<String> = model.records().map(|r| pascal(&r.name)).collect();
        w.line(format!("import type {{ {} }} from \"./models\";", names.join(", ")));
    }
    for client in &model.clients {
        w.blank();
        w.open(format!("export class {} {{", pascal(&client.name)));
        if d.typed {
            w.line(format!(
                "constructor(private baseUrl: string = \"{}\") {{}}",
                escape(&client.base_url)
            ));
        } else {
            w.open(format!(
                "constructor(baseUrl = \"{}\") {{",
                escape(&client.base_url)
            ));
            w.line("this.baseUrl = baseUrl;");
            w.close("}");
        }
        w.blank();
        w.open(format!("setServer(baseUrl{}) {{", if d.typed { ": string" } else { "" }));
        w.line("this.baseUrl = baseUrl;");
        w.close("}");
        for call in &client.calls {
            w.blank();
            if let Some(comment) = &call.comment {
                w.line(format!("/** {comment} */"));
            }
            let params = d.params(call.bindings.iter().map(|b| (b.name.as_str(), &b.ty)));
            w.open(format!(
                "async {}({params}){} {{",
                call.name,
                d.returns(call.returns.as_ref(), Some("Promise"))
            ));
            let mut init = vec![
                format!("method: \"{}\"", call.method.as_str()),
                "headers: { \"Content-Type\": \"application/json\" }".to_string(),
            ];
            if let Some(body) = body_binding(&call.bindings) {
                init.push(format!("body: JSON.stringify({})", body.name));
            }
            w.line(format!(
                "const response = await fetch({}, {{ {} }});",
                template_url(call),
                init.join(", ")
            ));
            w.open("if (!response.ok) {");
            w.line(format!(
                "throw new Error(`{} failed: ${{response.status}}`);",
                call.name
            ));
            w.close("}");
            if call.returns.is_some() {
                w.line("return response.json();");
            }
            w.close("}");
        }
        w.close("}");
    }
    w.finish()
}

/// Constants and free functions; the entry becomes `main`.
pub(crate) fn functions(w: &mut CodeWriter, d: &Js, model: &CodeModel, export: bool) {
    let export = if export { "export " } else { "" };
    for c in &model.constants {
        let value = c
            .value
            .as_ref()
            .map_or_else(|| "undefined".to_string(), |v| render_expr(d, v));
        w.line(format!("{export}const {}{} = {value};", c.name, d.annotate(&c.ty)));
    }
    for proc in &model.procedures {
        w.blank();
        let params = d.params(proc.params.iter().map(|p| (p.name.as_str(), &p.ty)));
        w.open(format!(
            "{export}function {}({params}){} {{",
            proc.name,
            d.returns(proc.returns.as_ref(), None)
        ));
        render_block(w, d, &proc.body);
        w.close("}");
    }
}

pub(crate) fn package_json(
    project: &ProjectConfig,
    main: &str,
    scripts: &[(&str, &str)],
    dependencies: &[(&str, &str)],
    dev: &[(&str, &str)],
) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.open("{");
    w.line(format!("\"name\": \"{}\",", project.module()));
    w.line(format!("\"version\": \"{}\",", project.version()));
    w.line(format!("\"description\": \"{}\",", escape(&project.description())));
    w.line("\"type\": \"module\",");
    w.line(format!("\"main\": \"{main}\","));
    let section = |w: &mut CodeWriter, name: &str, entries: &[(String, String)], last: bool| {
        w.open(format!("\"{name}\": {{"));
        for (i, (k, v)) in entries.iter().enumerate() {
            let comma = if i + 1 < entries.len() { "," } else { "" };
            w.line(format!("\"{k}\": \"{v}\"{comma}"));
        }
        w.close(if last { "}" } else { "}," });
    };
    let owned = |pairs: &[(&str, &str)]| -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    };
    let mut deps = owned(dependencies);
    for extra in &project.options.dependencies {
        let (name, version) = extra
            .rsplit_once('@')
            .filter(|(n, _)| !n.is_empty())
            .unwrap_or((extra.as_str(), "latest"));
        deps.push((name.to_string(), version.to_string()));
    }
    section(&mut w, "scripts", &owned(scripts), false);
    section(&mut w, "dependencies", &deps, dev.is_empty());
    if !dev.is_empty() {
        section(&mut w, "devDependencies", &owned(dev), true);
    }
    w.close("}");
    w.finish()
}

pub(crate) fn tsconfig() -> &'static str {
    "{\n  \"compilerOptions\": {\n    \"target\": \"ES2022\",\n    \"module\": \"ESNext\",\n    \"moduleResolution\": \"Bundler\",\n    \"strict\": true,\n    \"esModuleInterop\": true,\n    \"skipLibCheck\": true,\n    \"jsx\": \"react-jsx\",\n    \"outDir\": \"dist\"\n  },\n  \"include\": [\"src\"]\n}\n"
}

// =============================================================================
// Client
// =============================================================================

pub struct NodeClient {
    key: PlatformKey,
}

impl NodeClient {
    pub fn new(key: PlatformKey) -> Self {
        Self { key }
    }
}

impl PlatformGenerator for NodeClient {
    fn key(&self) -> PlatformKey {
        self.key
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let d = Js {
            typed: self.key == PlatformKey::TypeScript,
        };
        let ext = d.ext();
        let mut files = Vec::new();
        if d.typed {
            files.push(GeneratedFile::new(
                "package.json",
                package_json(
                    project,
                    "dist/main.js",
                    &[("build", "tsc"), ("start", "node dist/main.js")],
                    &[],
                    &[("typescript", "^5.4.0"), ("@types/node", "^20.12.0")],
                ),
            ));
            files.push(GeneratedFile::new("tsconfig.json", tsconfig()));
        } else {
            files.push(GeneratedFile::new(
                "package.json",
                package_json(project, "src/main.js", &[("start", "node src/main.js")], &[], &[]),
            ));
        }
        files.push(GeneratedFile::new(format!("src/models.{ext}"), models(&d, model)));
        if !model.clients.is_empty() {
            files.push(GeneratedFile::new(format!("src/api.{ext}"), clients(&d, model)));
        }

        let mut w = CodeWriter::new(INDENT);
        if !model.clients.is_empty() {
            let names: Vec<String> = model.clients.iter().map(|c| pascal(&c.name)).collect();
            w.line(format!("import {{ {} }} from \"./api.js\";", names.join(", ")));
        }
        functions(&mut w, &d, model, false);
        if model.entry().is_some() {
            w.blank();
            w.line("main();");
        }
        files.push(GeneratedFile::new(format!("src/main.{ext}"), w.finish()));
        files
    }
}

// =============================================================================
// Express
// =============================================================================

pub struct Express;

fn mappers(d: &Js, model: &CodeModel) -> String {
    let mut w = CodeWriter::new(INDENT);
    for (i, mapper) in model.mappers.iter().enumerate() {
        if i > 0 {
            w.blank();
        }
        w.open(format!("export class {} {{", pascal(&mapper.name)));
        w.open("constructor(db) {");
        w.line("this.db = db;");
        w.close("}");
        for op in &mapper.operations {
            w.blank();
            let params = d.params(op.params.iter().map(|p| (p.name.as_str(), &p.ty)));
            w.open(format!("{}({params}) {{", op.name));
            w.line(format!(
                "const stmt = this.db.prepare(\"{}\");",
                escape(op.positional_sql.trim())
            ));
            let args = op.bind_order.join(", ");
            match &op.returns {
                Some(ty) if ty.is_list() => {
                    if matches!(ty.element(), ModelType::Named { .. }) {
                        w.line(format!("return stmt.all({args});"));
                    } else {
                        w.line(format!("return stmt.pluck().all({args});"));
                    }
                }
                Some(ModelType::Named { .. }) => {
                    w.line(format!("return stmt.get({args});"));
                }
                Some(_) => {
                    w.line(format!("return stmt.pluck().get({args});"));
                }
                None => {
                    w.line(format!("return stmt.run({args}).changes;"));
                }
            }
            w.close("}");
        }
        w.close("}");
    }
    w.finish()
}

fn convert(raw: &str, ty: &ModelType) -> String {
    match ty {
        ModelType::Primitive(
            Primitive::Int | Primitive::BigInt | Primitive::Float | Primitive::Double | Primitive::Decimal,
        ) => format!("Number({raw})"),
        ModelType::Primitive(Primitive::Bool) => format!("{raw} === \"true\""),
        _ => raw.to_string(),
    }
}

fn express_pattern(path: &str) -> String {
    url_parts(path)
        .into_iter()
        .map(|part| match part {
            UrlPart::Text(text) => text.to_string(),
            UrlPart::Param(name) => format!(":{name}"),
        })
        .collect()
}

fn router(d: &Js, service: &Service) -> String {
    let mut used: Vec<String> = Vec::new();
    for route in &service.routes {
        for name in dialect::referenced(&route.body, NameKind::DataAccess) {
            if !used.contains(&name) {
                used.push(name);
            }
        }
    }

    let mut w = CodeWriter::new(INDENT);
    w.line("import { Router } from \"express\";");
    if !used.is_empty() {
        let names: Vec<String> = used.iter().map(|m| camel(m)).collect();
        w.line(format!("import {{ {} }} from \"../db.js\";", names.join(", ")));
    }
    w.blank();
    if let Some(comment) = &service.comment {
        w.line(format!("/** {comment} */"));
    }
    w.line("export const router = Router();");

    for route in &service.routes {
        w.blank();
        let params = d.params(route.bindings.iter().map(|b| (b.name.as_str(), &b.ty)));
        w.open(format!("function {}({params}) {{", route.handler));
        render_block(&mut w, d, &route.body);
        w.close("}");
    }

    for route in &service.routes {
        w.blank();
        w.open(format!(
            "router.{}(\"{}\", (req, res) => {{",
            route.method.lower(),
            express_pattern(&route.path)
        ));
        for b in &route.bindings {
            let value = match b.source {
                BindingSource::Path => convert(&format!("req.params.{}", b.name), &b.ty),
                BindingSource::Query => convert(&format!("req.query.{}", b.name), &b.ty),
                BindingSource::Body => "req.body".to_string(),
            };
            w.line(format!("const {} = {value};", b.name));
        }
        let args: Vec<&str> = route.bindings.iter().map(|b| b.name.as_str()).collect();
        let call = format!("{}({})", route.handler, args.join(", "));
        if route.returns.is_some() {
            w.line(format!("res.json({call});"));
        } else {
            w.line(format!("{call};"));
            w.line("res.status(204).end();");
        }
        w.close("});");
    }
    w.finish()
}

impl PlatformGenerator for Express {
    fn key(&self) -> PlatformKey {
        PlatformKey::Express
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let d = Js { typed: false };
        let mut db = CodeWriter::new(INDENT);
        db.line("import Database from \"better-sqlite3\";");
        if !model.mappers.is_empty() {
            let names: Vec<String> = model.mappers.iter().map(|m| pascal(&m.name)).collect();
            db.line(format!("import {{ {} }} from \"./mappers.js\";", names.join(", ")));
        }
        db.blank();
        db.line("export const db = new Database(\"app.db\");");
        for mapper in &model.mappers {
            db.line(format!(
                "export const {} = new {}(db);",
                camel(&mapper.name),
                pascal(&mapper.name)
            ));
        }

        let mut files = vec![
            GeneratedFile::new(
                "package.json",
                package_json(
                    project,
                    "src/main.js",
                    &[("start", "node src/main.js")],
                    &[("express", "^4.19.2"), ("better-sqlite3", "^10.0.0")],
                    &[],
                ),
            ),
            GeneratedFile::new("src/models.js", models(&d, model)),
            GeneratedFile::new("src/mappers.js", mappers(&d, model)),
            GeneratedFile::new("src/db.js", db.finish()),
        ];
        for service in &model.services {
            files.push(GeneratedFile::new(
                format!("src/routes/{}.js", camel(&service.name)),
                router(&d, service),
            ));
        }

        let mut w = CodeWriter::new(INDENT);
        w.line("import express from \"express\";");
        for service in &model.services {
            w.line(format!(
                "import {{ router as {} }} from \"./routes/{}.js\";",
                camel(&service.name),
                camel(&service.name)
            ));
        }
        functions(&mut w, &d, model, false);
        w.blank();
        w.line("const app = express();");
        w.line("app.use(express.json());");
        for service in &model.services {
            w.line(format!("app.use({});", camel(&service.name)));
        }
        if model.entry().is_some() {
            w.line("main();");
        }
        w.line("app.listen(3000, () => console.log(\"listening on 3000\"));");
        files.push(GeneratedFile::new("src/main.js", w.finish()));
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::Compiler;

    fn model_for(src: &str, key: PlatformKey) -> CodeModel {
        let mut compiler = Compiler::new(Some(key));
        compiler.compile_str(src, "node.jssp").unwrap();
        crate::build::lower(&mut compiler).unwrap()
    }

    fn contents<'a>(files: &'a [GeneratedFile], path: &str) -> &'a str {
        files
            .iter()
            .find(|f| f.path.to_string_lossy() == path)
            .map(|f| f.contents.as_str())
            .unwrap_or_else(|| panic!("missing {path}"))
    }

    const API: &str = "
        struct Todo { id int; title string; }
        controller TodoController {
            [method=post, route='/todos', body=todo]
            func create(todo Todo) Todo { return todo; }
        }
        [baseUrl='http://localhost:3000']
        api TodoApi { TodoController; }
    ";

    #[test]
    fn typescript_client_is_typed() {
        let model = model_for(API, PlatformKey::TypeScript);
        let project = ProjectConfig::new("web", PlatformKey::TypeScript, "out");
        let files = NodeClient::new(PlatformKey::TypeScript).generate(&model, &project);
        let api = contents(&files, "src/api.ts");
        assert!(api.contains("async create(todo: Todo): Promise<Todo> {"));
        assert!(api.contains("body: JSON.stringify(todo)"));
        assert!(contents(&files, "src/models.ts").contains("export interface Todo {"));
        contents(&files, "tsconfig.json");
    }

    #[test]
    fn javascript_client_is_untyped() {
        let model = model_for(API, PlatformKey::JavaScript);
        let project = ProjectConfig::new("web", PlatformKey::JavaScript, "out");
        let files = NodeClient::new(PlatformKey::JavaScript).generate(&model, &project);
        let api = contents(&files, "src/api.js");
        assert!(api.contains("async create(todo) {"));
        assert!(api.contains("fetch(`${this.baseUrl}/todos`"));
    }

    #[test]
    fn express_routes_convert_params() {
        let src = "
            table todo { id int; title string; key(id); }
            mapper TodoMapper {
                query byId(id int) todo { select * from todo where id = :id }
            }
            controller TodoController {
                [method=get, route='/todos/{id}']
                func getTodo(id int) todo { return TodoMapper.byId(id); }
            }
        ";
        let model = model_for(src, PlatformKey::Express);
        let project = ProjectConfig::new("srv", PlatformKey::Express, "out");
        let files = Express.generate(&model, &project);
        let router = contents(&files, "src/routes/todoController.js");
        assert!(router.contains("router.get(\"/todos/:id\", (req, res) => {"));
        assert!(router.contains("const id = Number(req.params.id);"));
        assert!(router.contains("return todoMapper.byId(id);"));
        assert!(contents(&files, "src/mappers.js").contains("return stmt.get(id);"));
    }
}
