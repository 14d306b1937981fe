//! C++ generators: a cpr client library and a Crow + SQLite server.

use super::dialect::{body_binding, render_block, render_expr, url_parts, url_template, Dialect, UrlPart};
use super::naming::{camel, escape, pascal};
use super::writer::CodeWriter;
use super::{GeneratedFile, PlatformGenerator, PlatformKey};
use crate::build::*;
use crate::config::ProjectConfig;
use crate::dsl::ast::{BinaryOp, Primitive};
use crate::dsl::sql::StatementKind;

const INDENT: &str = "    ";

struct Cpp;

impl Cpp {
    fn primitive(p: Primitive) -> &'static str {
        match p {
            Primitive::Int => "int",
            Primitive::BigInt => "long long",
            Primitive::Float => "float",
            Primitive::Double | Primitive::Decimal => "double",
            Primitive::Bool => "bool",
            Primitive::String
            | Primitive::Text
            | Primitive::Char(_)
            | Primitive::Varchar(_)
            | Primitive::Date
            | Primitive::DateTime => "std::string",
            Primitive::Void => "void",
            Primitive::Any => "nlohmann::json",
        }
    }

    fn returns(&self, ty: Option<&ModelType>) -> String {
        ty.map_or_else(|| "void".to_string(), |t| self.type_name(t))
    }

    /// Parameter declaration, passing strings and records by const reference.
    fn param(&self, name: &str, ty: &ModelType) -> String {
        match ty {
            ModelType::Primitive(p) if Self::primitive(*p) != "std::string" => {
                format!("{} {name}", self.type_name(ty))
            }
            _ => format!("const {}& {name}", self.type_name(ty)),
        }
    }

    fn params<'b>(&self, params: impl Iterator<Item = (&'b str, &'b ModelType)>) -> String {
        params
            .map(|(name, ty)| self.param(name, ty))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn is_text(ty: &ModelType) -> bool {
    matches!(ty, ModelType::Primitive(p) if Cpp::primitive(*p) == "std::string")
}

impl Dialect for Cpp {
    fn type_name(&self, ty: &ModelType) -> String {
        match ty {
            ModelType::Primitive(p) => Self::primitive(*p).to_string(),
            ModelType::List(inner) => format!("std::vector<{}>", self.type_name(inner)),
            ModelType::Named { name, .. } => pascal(name),
        }
    }

    fn print(&self, args: &[String]) -> String {
        if args.is_empty() {
            return "std::cout << std::endl".to_string();
        }
        format!("std::cout << {} << std::endl", args.join(" << \" \" << "))
    }

    fn var_decl(&self, name: &str, ty: Option<&ModelType>, init: Option<String>) -> String {
        match (ty, init) {
            (Some(ty), Some(init)) => format!("{} {name} = {init}", self.type_name(ty)),
            (Some(ty), None) => format!("{} {name}{{}}", self.type_name(ty)),
            (None, Some(init)) => format!("auto {name} = {init}"),
            (None, None) => format!("nlohmann::json {name}"),
        }
    }

    fn for_range(&self, var: &str, from: &str, to: &str) -> String {
        format!("for (int {var} = {from}; {var} < {to}; ++{var}) {{")
    }

    fn for_each(&self, var: &str, iter: &str) -> String {
        format!("for (const auto& {var} : {iter}) {{")
    }

    fn null(&self) -> &'static str {
        "nullptr"
    }

    fn binary(&self, op: BinaryOp, lhs: String, rhs: String) -> String {
        // Two string literals cannot be added as char pointers.
        if op == BinaryOp::Add && lhs.starts_with('"') {
            return format!("std::string({lhs}) + {rhs}");
        }
        format!("{lhs} {} {rhs}", op.symbol())
    }

    fn name(&self, name: &str, kind: NameKind) -> String {
        match kind {
            NameKind::DataAccess => format!("{}_", camel(name)),
            _ => name.to_string(),
        }
    }
}

fn cpr_verb(method: HttpMethod) -> &'static str {
    match method {
        HttpMethod::Get => "Get",
        HttpMethod::Post => "Post",
        HttpMethod::Put => "Put",
        HttpMethod::Delete => "Delete",
        HttpMethod::Patch => "Patch",
        HttpMethod::Head => "Head",
        HttpMethod::Options => "Options",
    }
}

/// Struct header with its nlohmann mapping.
fn record_header(d: &Cpp, namespace: &str, record: &DataType) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line("#pragma once");
    w.line("#include <string>");
    w.line("#include <vector>");
    w.line("#include <nlohmann/json.hpp>");
    for field in &record.fields {
        if let ModelType::Named { name, .. } = field.ty.element() {
            if name != &record.name {
                w.line(format!("#include \"{}.hpp\"", pascal(name)));
            }
        }
    }
    w.blank();
    w.open(format!("namespace {namespace} {{")).dedent();
    w.blank();
    w.open(format!("struct {} {{", pascal(&record.name)));
    for field in &record.fields {
        w.line(format!("{} {}{{}};", d.type_name(&field.ty), camel(&field.name)));
    }
    w.close("};");
    if !record.fields.is_empty() {
        let names: Vec<String> = record.fields.iter().map(|f| camel(&f.name)).collect();
        w.blank();
        w.line(format!(
            "NLOHMANN_DEFINE_TYPE_NON_INTRUSIVE({}, {})",
            pascal(&record.name),
            names.join(", ")
        ));
    }
    w.blank();
    w.line(format!("}} // namespace {namespace}"));
    w.finish()
}

/// Program-level constants and functions shared by both flavors.
fn program_items(w: &mut CodeWriter, d: &Cpp, model: &CodeModel) {
    for c in &model.constants {
        let value = c
            .value
            .as_ref()
            .map_or_else(|| "{}".to_string(), |v| render_expr(d, v));
        w.line(format!("const {} {} = {value};", d.type_name(&c.ty), c.name));
    }
    let procs: Vec<&Procedure> = model.procedures.iter().filter(|p| !p.is_entry).collect();
    if !model.constants.is_empty() || !procs.is_empty() {
        w.blank();
    }
    for proc in &procs {
        let params = d.params(proc.params.iter().map(|p| (p.name.as_str(), &p.ty)));
        w.line(format!("{} {}({params});", d.returns(proc.returns.as_ref()), proc.name));
    }
    for proc in procs {
        w.blank();
        let params = d.params(proc.params.iter().map(|p| (p.name.as_str(), &p.ty)));
        w.open(format!("{} {}({params}) {{", d.returns(proc.returns.as_ref()), proc.name));
        render_block(w, d, &proc.body);
        w.close("}");
    }
}

fn cmake(project: &ProjectConfig, packages: &[&str], sources: &[String], libraries: &[&str]) -> String {
    let mut w = CodeWriter::new("    ");
    w.line("cmake_minimum_required(VERSION 3.16)");
    w.line(format!(
        "project({} VERSION {} LANGUAGES CXX)",
        project.namespace(),
        project.version()
    ));
    w.blank();
    let standard = project.options.language_version.as_deref().unwrap_or("17");
    w.line(format!("set(CMAKE_CXX_STANDARD {standard})"));
    w.line("set(CMAKE_CXX_STANDARD_REQUIRED ON)").blank();
    for package in packages {
        w.line(format!("find_package({package} REQUIRED)"));
    }
    w.blank();
    w.open(format!("add_executable({}", project.module()));
    for source in sources {
        w.line(source);
    }
    w.close(")");
    w.line(format!("target_include_directories({} PRIVATE include)", project.module()));
    w.line(format!(
        "target_link_libraries({} PRIVATE {})",
        project.module(),
        libraries.join(" ")
    ));
    w.finish()
}

// =============================================================================
// Client
// =============================================================================

pub struct CppClient;

fn client_url(call: &ClientCall) -> String {
    let mut pieces = vec!["baseUrl_".to_string()];
    for part in url_parts(&url_template(&call.path, &call.bindings)) {
        match part {
            UrlPart::Text(text) => pieces.push(format!("\"{}\"", escape(text))),
            UrlPart::Param(name) => {
                let text = call
                    .bindings
                    .iter()
                    .find(|b| b.name == name)
                    .is_some_and(|b| is_text(&b.ty));
                if text {
                    pieces.push(name.to_string());
                } else {
                    pieces.push(format!("std::to_string({name})"));
                }
            }
        }
    }
    pieces.join(" + ")
}

fn client_header(d: &Cpp, namespace: &str, client: &ClientApi) -> String {
    let class = pascal(&client.name);
    let mut w = CodeWriter::new(INDENT);
    w.line("#pragma once");
    w.line("#include <string>");
    w.line("#include <vector>");
    w.line(format!("#include \"{namespace}/dto/Dto.hpp\"")).blank();
    w.line(format!("namespace {namespace}::api {{")).blank();
    w.open(format!("class {class} {{"));
    w.line("public:");
    w.line(format!(
        "explicit {class}(std::string baseUrl = \"{}\");",
        escape(&client.base_url)
    ));
    w.line("void setServer(const std::string& baseUrl);");
    for call in &client.calls {
        if let Some(comment) = &call.comment {
            w.line(format!("/// {comment}"));
        }
        let params = d.params(call.bindings.iter().map(|b| (b.name.as_str(), &b.ty)));
        w.line(format!(
            "{} {}({params});",
            d.returns(call.returns.as_ref()),
            call.name
        ));
    }
    w.dedent();
    w.line("private:");
    w.indent();
    w.line("std::string baseUrl_;");
    w.close("};").blank();
    w.line(format!("}} // namespace {namespace}::api"));
    w.finish()
}

fn client_source(d: &Cpp, namespace: &str, client: &ClientApi) -> String {
    let class = pascal(&client.name);
    let mut w = CodeWriter::new(INDENT);
    w.line(format!("#include \"{namespace}/api/{class}.hpp\""));
    w.line("#include <stdexcept>");
    w.line("#include <cpr/cpr.h>");
    w.line("#include <nlohmann/json.hpp>");
    w.line("#include <spdlog/spdlog.h>").blank();
    w.line(format!("namespace {namespace}::api {{")).blank();
    w.line(format!("{class}::{class}(std::string baseUrl) : baseUrl_(std::move(baseUrl)) {{}}"));
    w.blank();
    w.open(format!("void {class}::setServer(const std::string& baseUrl) {{"));
    w.line("baseUrl_ = baseUrl;");
    w.close("}");
    for call in &client.calls {
        w.blank();
        let params = d.params(call.bindings.iter().map(|b| (b.name.as_str(), &b.ty)));
        w.open(format!(
            "{} {class}::{}({params}) {{",
            d.returns(call.returns.as_ref()),
            call.name
        ));
        let mut args = vec![
            format!("cpr::Url{{{}}}", client_url(call)),
            "cpr::Header{{\"Content-Type\", \"application/json\"}}".to_string(),
        ];
        if let Some(body) = body_binding(&call.bindings) {
            args.push(format!("cpr::Body{{nlohmann::json({}).dump()}}", body.name));
        }
        w.line(format!(
            "auto response = cpr::{}({});",
            cpr_verb(call.method),
            args.join(", ")
        ));
        w.open("if (response.status_code >= 400) {");
        w.line(format!(
            "spdlog::error(\"{} failed with status {{}}\", response.status_code);",
            call.name
        ));
        w.line(format!(
            "throw std::runtime_error(\"{} failed: \" + std::to_string(response.status_code));",
            call.name
        ));
        w.close("}");
        if let Some(ty) = &call.returns {
            w.line(format!(
                "return nlohmann::json::parse(response.text).get<{}>();",
                d.type_name(ty)
            ));
        }
        w.close("}");
    }
    w.blank();
    w.line(format!("}} // namespace {namespace}::api"));
    w.finish()
}

impl PlatformGenerator for CppClient {
    fn key(&self) -> PlatformKey {
        PlatformKey::Cpp
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let d = Cpp;
        let ns = project.namespace();
        let mut files = Vec::new();

        let mut umbrella = CodeWriter::new(INDENT);
        umbrella.line("#pragma once");
        for record in model.records() {
            let name = pascal(&record.name);
            umbrella.line(format!("#include \"{name}.hpp\""));
            files.push(GeneratedFile::new(
                format!("include/{ns}/dto/{name}.hpp"),
                record_header(&d, &format!("{ns}::dto"), record),
            ));
        }
        files.push(GeneratedFile::new(
            format!("include/{ns}/dto/Dto.hpp"),
            umbrella.finish(),
        ));

        let mut sources = vec!["src/main.cpp".to_string()];
        for client in &model.clients {
            let class = pascal(&client.name);
            files.push(GeneratedFile::new(
                format!("include/{ns}/api/{class}.hpp"),
                client_header(&d, &ns, client),
            ));
            files.push(GeneratedFile::new(
                format!("src/api/{class}.cpp"),
                client_source(&d, &ns, client),
            ));
            sources.push(format!("src/api/{class}.cpp"));
        }

        let mut w = CodeWriter::new(INDENT);
        w.line("#include <iostream>");
        w.line("#include <string>");
        w.line("#include <vector>");
        w.line(format!("#include \"{ns}/dto/Dto.hpp\""));
        for client in &model.clients {
            w.line(format!("#include \"{ns}/api/{}.hpp\"", pascal(&client.name)));
        }
        w.blank();
        w.line(format!("using namespace {ns}::dto;")).blank();
        program_items(&mut w, &d, model);
        w.blank();
        w.open("int main() {");
        if let Some(entry) = model.entry() {
            render_block(&mut w, &d, &entry.body);
        }
        w.line("return 0;");
        w.close("}");
        files.push(GeneratedFile::new("src/main.cpp", w.finish()));

        files.push(GeneratedFile::new(
            "CMakeLists.txt",
            cmake(
                project,
                &["cpr", "nlohmann_json", "spdlog"],
                &sources,
                &["cpr::cpr", "nlohmann_json::nlohmann_json", "spdlog::spdlog"],
            ),
        ));
        files
    }
}

// =============================================================================
// Crow server
// =============================================================================

pub struct CppServer;

fn sqlite_bind(index: usize, name: &str, ty: &ModelType) -> String {
    match ty {
        ModelType::Primitive(Primitive::Int | Primitive::Bool) => {
            format!("sqlite3_bind_int(stmt, {index}, {name});")
        }
        ModelType::Primitive(Primitive::BigInt) => {
            format!("sqlite3_bind_int64(stmt, {index}, {name});")
        }
        ModelType::Primitive(Primitive::Float | Primitive::Double | Primitive::Decimal) => {
            format!("sqlite3_bind_double(stmt, {index}, {name});")
        }
        t if is_text(t) => {
            format!("sqlite3_bind_text(stmt, {index}, {name}.c_str(), -1, SQLITE_TRANSIENT);")
        }
        _ => format!(
            "sqlite3_bind_text(stmt, {index}, nlohmann::json({name}).dump().c_str(), -1, SQLITE_TRANSIENT);"
        ),
    }
}

fn sqlite_column(index: usize, ty: &ModelType) -> String {
    match ty {
        ModelType::Primitive(Primitive::Int) => format!("sqlite3_column_int(stmt, {index})"),
        ModelType::Primitive(Primitive::Bool) => format!("sqlite3_column_int(stmt, {index}) != 0"),
        ModelType::Primitive(Primitive::BigInt) => format!("sqlite3_column_int64(stmt, {index})"),
        ModelType::Primitive(Primitive::Float | Primitive::Double | Primitive::Decimal) => {
            format!("sqlite3_column_double(stmt, {index})")
        }
        t if is_text(t) => format!("columnText(stmt, {index})"),
        _ => format!("nlohmann::json::parse(columnText(stmt, {index}))"),
    }
}

fn mapper_header(d: &Cpp, ns: &str, mapper: &DataAccess) -> String {
    let class = pascal(&mapper.name);
    let mut w = CodeWriter::new(INDENT);
    w.line("#pragma once");
    w.line("#include <string>");
    w.line("#include <vector>");
    w.line("#include <sqlite3.h>");
    w.line(format!("#include \"{ns}/models/Models.hpp\"")).blank();
    w.line(format!("namespace {ns}::repositories::mappers {{")).blank();
    w.open(format!("class {class} {{"));
    w.line("public:");
    w.line(format!("explicit {class}(sqlite3* db);"));
    for op in &mapper.operations {
        let params = d.params(op.params.iter().map(|p| (p.name.as_str(), &p.ty)));
        w.line(format!("{} {}({params});", op_returns(d, op), op.name));
    }
    w.dedent();
    w.line("private:");
    w.indent();
    w.line("sqlite3* db_;");
    w.close("};").blank();
    w.line(format!("}} // namespace {ns}::repositories::mappers"));
    w.finish()
}

fn op_returns(d: &Cpp, op: &DataAccessOperation) -> String {
    match &op.returns {
        Some(ty) => d.type_name(ty),
        None if op.kind == StatementKind::Select => "void".to_string(),
        None => "int".to_string(),
    }
}

fn mapper_source(d: &Cpp, ns: &str, model: &CodeModel, mapper: &DataAccess) -> String {
    let class = pascal(&mapper.name);
    let mut w = CodeWriter::new(INDENT);
    w.line(format!("#include \"{ns}/repositories/mappers/{class}.hpp\""));
    w.line("#include <stdexcept>");
    w.line("#include <spdlog/spdlog.h>").blank();
    w.line(format!("namespace {ns}::repositories::mappers {{")).blank();
    w.open("static std::string columnText(sqlite3_stmt* stmt, int index) {");
    w.line("auto text = sqlite3_column_text(stmt, index);");
    w.line("return text ? reinterpret_cast<const char*>(text) : std::string();");
    w.close("}").blank();
    w.line(format!("{class}::{class}(sqlite3* db) : db_(db) {{}}"));

    for op in &mapper.operations {
        w.blank();
        let params = d.params(op.params.iter().map(|p| (p.name.as_str(), &p.ty)));
        let returns = op_returns(d, op);
        w.open(format!("{returns} {class}::{}({params}) {{", op.name));
        w.line(format!("const char* sql = \"{}\";", escape(&op.positional_sql)));
        w.line("sqlite3_stmt* stmt = nullptr;");
        w.open("if (sqlite3_prepare_v2(db_, sql, -1, &stmt, nullptr) != SQLITE_OK) {");
        w.line("spdlog::error(\"prepare failed: {}\", sqlite3_errmsg(db_));");
        w.line("throw std::runtime_error(sqlite3_errmsg(db_));");
        w.close("}");
        for (i, name) in op.bind_order.iter().enumerate() {
            if let Some(param) = op.params.iter().find(|p| &p.name == name) {
                w.line(sqlite_bind(i + 1, name, &param.ty));
            }
        }

        match &op.returns {
            Some(ty) => {
                let element = ty.element();
                w.line(format!("{returns} result{{}};"));
                let looping = if ty.is_list() { "while" } else { "if" };
                w.open(format!("{looping} (sqlite3_step(stmt) == SQLITE_ROW) {{"));
                let target = if ty.is_list() { "row" } else { "result" };
                match element {
                    ModelType::Named { name, .. } => {
                        if ty.is_list() {
                            w.line(format!("{} row{{}};", d.type_name(element)));
                        }
                        let fields = model.data_type(name).map(|t| t.fields.as_slice()).unwrap_or_default();
                        for (i, field) in fields.iter().enumerate() {
                            w.line(format!(
                                "{target}.{} = {};",
                                camel(&field.name),
                                sqlite_column(i, &field.ty)
                            ));
                        }
                    }
                    scalar => {
                        if ty.is_list() {
                            w.line(format!("auto row = {};", sqlite_column(0, scalar)));
                        } else {
                            w.line(format!("result = {};", sqlite_column(0, scalar)));
                        }
                    }
                }
                if ty.is_list() {
                    w.line("result.push_back(row);");
                }
                w.close("}");
                w.line("sqlite3_finalize(stmt);");
                w.line("return result;");
            }
            None => {
                w.open("if (sqlite3_step(stmt) != SQLITE_DONE) {");
                w.line(format!(
                    "spdlog::error(\"{} failed: {{}}\", sqlite3_errmsg(db_));",
                    op.name
                ));
                w.close("}");
                w.line("sqlite3_finalize(stmt);");
                if op.kind != StatementKind::Select {
                    w.line("return sqlite3_changes(db_);");
                }
            }
        }
        w.close("}");
    }
    w.blank();
    w.line(format!("}} // namespace {ns}::repositories::mappers"));
    w.finish()
}

/// Crow route pattern: `{id}` becomes `<int>`, `<double>` or `<string>`.
fn crow_pattern(route: &Route) -> String {
    let mut out = String::new();
    for part in url_parts(&route.path) {
        match part {
            UrlPart::Text(text) => out.push_str(text),
            UrlPart::Param(name) => {
                let ty = route.bindings.iter().find(|b| b.name == name).map(|b| &b.ty);
                out.push_str(match ty {
                    Some(ModelType::Primitive(Primitive::Int | Primitive::BigInt)) => "<int>",
                    Some(ModelType::Primitive(Primitive::Float | Primitive::Double | Primitive::Decimal)) => {
                        "<double>"
                    }
                    _ => "<string>",
                });
            }
        }
    }
    out
}

fn crow_path_param(binding: &RouteBinding) -> String {
    match &binding.ty {
        ModelType::Primitive(Primitive::Int | Primitive::BigInt) => format!("long long {}", binding.name),
        ModelType::Primitive(Primitive::Float | Primitive::Double | Primitive::Decimal) => {
            format!("double {}", binding.name)
        }
        _ => format!("std::string {}", binding.name),
    }
}

fn controller_mappers(service: &Service) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for route in &service.routes {
        for name in super::dialect::referenced(&route.body, NameKind::DataAccess) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

fn controller_header(d: &Cpp, ns: &str, service: &Service) -> String {
    let class = pascal(&service.name);
    let mappers = controller_mappers(service);
    let mut w = CodeWriter::new(INDENT);
    w.line("#pragma once");
    w.line("#include <crow.h>");
    w.line(format!("#include \"{ns}/models/Models.hpp\""));
    for mapper in &mappers {
        w.line(format!("#include \"{ns}/repositories/mappers/{}.hpp\"", pascal(mapper)));
    }
    w.blank();
    w.line(format!("namespace {ns}::api {{")).blank();
    w.line(format!("using namespace {ns}::repositories::mappers;")).blank();
    if let Some(comment) = &service.comment {
        w.line(format!("/// {comment}"));
    }
    w.open(format!("class {class} {{"));
    w.line("public:");
    let ctor_params: Vec<String> = mappers
        .iter()
        .map(|m| format!("{}& {}", pascal(m), camel(m)))
        .collect();
    w.line(format!("explicit {class}({});", ctor_params.join(", ")));
    w.line("void registerRoutes(crow::SimpleApp& app);");
    for route in &service.routes {
        let params = d.params(route.bindings.iter().map(|b| (b.name.as_str(), &b.ty)));
        w.line(format!(
            "{} {}({params});",
            d.returns(route.returns.as_ref()),
            route.handler
        ));
    }
    w.dedent();
    w.line("private:");
    w.indent();
    for mapper in &mappers {
        w.line(format!("{}& {}_;", pascal(mapper), camel(mapper)));
    }
    w.close("};").blank();
    w.line(format!("}} // namespace {ns}::api"));
    w.finish()
}

fn controller_source(d: &Cpp, ns: &str, service: &Service) -> String {
    let class = pascal(&service.name);
    let mappers = controller_mappers(service);
    let mut w = CodeWriter::new(INDENT);
    w.line(format!("#include \"{ns}/api/{class}.hpp\""));
    w.line("#include <nlohmann/json.hpp>").blank();
    w.line(format!("namespace {ns}::api {{")).blank();

    let ctor_params: Vec<String> = mappers
        .iter()
        .map(|m| format!("{}& {}", pascal(m), camel(m)))
        .collect();
    let inits: Vec<String> = mappers
        .iter()
        .map(|m| format!("{0}_({0})", camel(m)))
        .collect();
    if inits.is_empty() {
        w.line(format!("{class}::{class}() {{}}"));
    } else {
        w.line(format!(
            "{class}::{class}({}) : {} {{}}",
            ctor_params.join(", "),
            inits.join(", ")
        ));
    }

    w.blank();
    w.open(format!("void {class}::registerRoutes(crow::SimpleApp& app) {{"));
    for route in &service.routes {
        let mut lambda_params = vec!["const crow::request& req".to_string()];
        lambda_params.extend(
            route
                .bindings
                .iter()
                .filter(|b| b.source == BindingSource::Path)
                .map(crow_path_param),
        );
        w.line(format!(
            "CROW_ROUTE(app, \"{}\").methods(crow::HTTPMethod::{})",
            crow_pattern(route),
            pascal(route.method.lower())
        ));
        w.open(format!("([this]({}) {{", lambda_params.join(", ")));
        let mut args = Vec::new();
        for binding in &route.bindings {
            match binding.source {
                BindingSource::Path => args.push(binding.name.clone()),
                BindingSource::Body => {
                    w.line(format!(
                        "auto {} = nlohmann::json::parse(req.body).get<{}>();",
                        binding.name,
                        d.type_name(&binding.ty)
                    ));
                    args.push(binding.name.clone());
                }
                BindingSource::Query => {
                    let raw = format!("req.url_params.get(\"{}\")", binding.name);
                    let value = if is_text(&binding.ty) {
                        format!("{raw} ? std::string({raw}) : std::string()")
                    } else {
                        format!(
                            "{raw} ? nlohmann::json::parse({raw}).get<{}>() : {}{{}}",
                            d.type_name(&binding.ty),
                            d.type_name(&binding.ty)
                        )
                    };
                    w.line(format!("auto {} = {value};", binding.name));
                    args.push(binding.name.clone());
                }
            }
        }
        let call = format!("{}({})", route.handler, args.join(", "));
        if route.returns.is_some() {
            w.line(format!("return crow::response(nlohmann::json({call}).dump());"));
        } else {
            w.line(format!("{call};"));
            w.line("return crow::response(204);");
        }
        w.close("});");
    }
    w.close("}");

    for route in &service.routes {
        w.blank();
        let params = d.params(route.bindings.iter().map(|b| (b.name.as_str(), &b.ty)));
        w.open(format!(
            "{} {class}::{}({params}) {{",
            d.returns(route.returns.as_ref()),
            route.handler
        ));
        render_block(&mut w, d, &route.body);
        w.close("}");
    }
    w.blank();
    w.line(format!("}} // namespace {ns}::api"));
    w.finish()
}

impl PlatformGenerator for CppServer {
    fn key(&self) -> PlatformKey {
        PlatformKey::CppServer
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let d = Cpp;
        let ns = project.namespace();
        let mut files = Vec::new();

        let mut umbrella = CodeWriter::new(INDENT);
        umbrella.line("#pragma once");
        for record in model.records() {
            let name = pascal(&record.name);
            let folder = match record.kind {
                DataKind::Table | DataKind::Entity => "entity",
                _ => "dto",
            };
            umbrella.line(format!("#include \"{folder}/{name}.hpp\""));
            files.push(GeneratedFile::new(
                format!("include/{ns}/models/{folder}/{name}.hpp"),
                record_header(&d, &format!("{ns}::models"), record),
            ));
        }
        files.push(GeneratedFile::new(
            format!("include/{ns}/models/Models.hpp"),
            umbrella.finish(),
        ));

        let mut sources = vec!["src/main.cpp".to_string()];
        for mapper in &model.mappers {
            let class = pascal(&mapper.name);
            files.push(GeneratedFile::new(
                format!("include/{ns}/repositories/mappers/{class}.hpp"),
                mapper_header(&d, &ns, mapper),
            ));
            let source = format!("src/repositories/mappers/{class}.cpp");
            files.push(GeneratedFile::new(&source, mapper_source(&d, &ns, model, mapper)));
            sources.push(source);
        }
        for service in &model.services {
            let class = pascal(&service.name);
            files.push(GeneratedFile::new(
                format!("include/{ns}/api/{class}.hpp"),
                controller_header(&d, &ns, service),
            ));
            let source = format!("src/api/{class}.cpp");
            files.push(GeneratedFile::new(&source, controller_source(&d, &ns, service)));
            sources.push(source);
        }

        let mut w = CodeWriter::new(INDENT);
        w.line("#include <iostream>");
        w.line("#include <crow.h>");
        w.line("#include <sqlite3.h>");
        w.line("#include <spdlog/spdlog.h>");
        w.line(format!("#include \"{ns}/models/Models.hpp\""));
        for mapper in &model.mappers {
            w.line(format!("#include \"{ns}/repositories/mappers/{}.hpp\"", pascal(&mapper.name)));
        }
        for service in &model.services {
            w.line(format!("#include \"{ns}/api/{}.hpp\"", pascal(&service.name)));
        }
        w.blank();
        w.line(format!("using namespace {ns}::models;"));
        w.line(format!("using namespace {ns}::repositories::mappers;"));
        w.line(format!("using namespace {ns}::api;")).blank();
        program_items(&mut w, &d, model);
        w.blank();
        w.open("int main() {");
        if let Some(entry) = model.entry() {
            render_block(&mut w, &d, &entry.body);
        }
        w.line("sqlite3* db = nullptr;");
        w.open("if (sqlite3_open(\"app.db\", &db) != SQLITE_OK) {");
        w.line("spdlog::error(\"cannot open database: {}\", sqlite3_errmsg(db));");
        w.line("return 1;");
        w.close("}");
        for mapper in &model.mappers {
            w.line(format!("{} {}(db);", pascal(&mapper.name), camel(&mapper.name)));
        }
        w.line("crow::SimpleApp app;");
        for service in &model.services {
            let args: Vec<String> = controller_mappers(service).iter().map(|m| camel(m)).collect();
            w.line(format!(
                "{} {}({});",
                pascal(&service.name),
                camel(&service.name),
                args.join(", ")
            ));
            w.line(format!("{}.registerRoutes(app);", camel(&service.name)));
        }
        w.line("app.port(8080).multithreaded().run();");
        w.line("sqlite3_close(db);");
        w.line("return 0;");
        w.close("}");
        files.push(GeneratedFile::new("src/main.cpp", w.finish()));

        files.push(GeneratedFile::new(
            "CMakeLists.txt",
            cmake(
                project,
                &["Crow", "SQLite3", "nlohmann_json", "spdlog"],
                &sources,
                &["Crow::Crow", "SQLite::SQLite3", "nlohmann_json::nlohmann_json", "spdlog::spdlog"],
            ),
        ));
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::Compiler;

    fn model_for(src: &str, key: PlatformKey) -> CodeModel {
        let mut compiler = Compiler::new(Some(key));
        compiler.compile_str(src, "cpp.jssp").unwrap();
        crate::build::lower(&mut compiler).unwrap()
    }

    fn contents<'a>(files: &'a [GeneratedFile], path: &str) -> &'a str {
        files
            .iter()
            .find(|f| f.path.to_string_lossy() == path)
            .map(|f| f.contents.as_str())
            .unwrap_or_else(|| panic!("missing {path}"))
    }

    const SRC: &str = "
        struct Todo { id int; title string; }
        [baseUrl='/api']
        controller TodoController {
            [method=get, route='/todos/{id}']
            func getTodo(id int) Todo { return null; }
        }
        [baseUrl='http://localhost:8080']
        api TodoApi { TodoController; }
        func main() { var n = 3; @console.log('n', n); }
    ";

    #[test]
    fn client_uses_cpr_and_to_string_for_numeric_params() {
        let model = model_for(SRC, PlatformKey::Cpp);
        let project = ProjectConfig::new("demo", PlatformKey::Cpp, "out");
        let files = CppClient.generate(&model, &project);

        let source = contents(&files, "src/api/TodoApi.cpp");
        assert!(source.contains("cpr::Get(cpr::Url{baseUrl_ + \"/api/todos/\" + std::to_string(id)}"));
        assert!(source.contains("return nlohmann::json::parse(response.text).get<Todo>();"));

        let dto = contents(&files, "include/Demo/dto/Todo.hpp");
        assert!(dto.contains("NLOHMANN_DEFINE_TYPE_NON_INTRUSIVE(Todo, id, title)"));

        let main = contents(&files, "src/main.cpp");
        assert!(main.contains("auto n = 3;"));
        assert!(main.contains("std::cout << \"n\" << \" \" << n << std::endl;"));
    }

    #[test]
    fn server_maps_tables_to_entities_and_binds_positionally() {
        let src = "
            table tb_user { id bigint auto; name varchar(100); key(id); }
            mapper UserMapper {
                query selectById(id bigint) UserVo { select id, name from tb_user where id = :id }
            }
            controller UserController {
                [method=get, route='/users/{id}']
                func getUser(id bigint) UserVo { return UserMapper.selectById(id); }
            }
        ";
        let model = model_for(src, PlatformKey::CppServer);
        let project = ProjectConfig::new("demo", PlatformKey::CppServer, "out");
        let files = CppServer.generate(&model, &project);

        contents(&files, "include/Demo/models/entity/TbUser.hpp");
        contents(&files, "include/Demo/models/dto/UserVo.hpp");

        let mapper = contents(&files, "src/repositories/mappers/UserMapper.cpp");
        assert!(mapper.contains("where id = ?"));
        assert!(mapper.contains("sqlite3_bind_int64(stmt, 1, id);"));
        assert!(mapper.contains("result.name = columnText(stmt, 1);"));

        let controller = contents(&files, "src/api/UserController.cpp");
        assert!(controller.contains("CROW_ROUTE(app, \"/users/<int>\").methods(crow::HTTPMethod::Get)"));
        assert!(controller.contains("return userMapper_.selectById(id);"));
        assert!(contents(&files, "CMakeLists.txt").contains("find_package(Crow REQUIRED)"));
    }
}
