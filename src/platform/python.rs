//! Python generators: a requests client script and a FastAPI server.

use super::dialect::{body_binding, render_block, render_expr, url_parts, url_template, Dialect, UrlPart};
use super::naming::{escape, pascal, snake};
use super::writer::CodeWriter;
use super::{GeneratedFile, PlatformGenerator, PlatformKey};
use crate::build::*;
use crate::config::ProjectConfig;
use crate::dsl::ast::{BinaryOp, Primitive, UnaryOp};

const INDENT: &str = "    ";

struct Python;

impl Python {
    fn params<'b>(&self, params: impl Iterator<Item = (&'b str, &'b ModelType)>) -> Vec<String> {
        params
            .map(|(name, ty)| format!("{name}: {}", self.type_name(ty)))
            .collect()
    }

    fn returns(&self, ty: Option<&ModelType>) -> String {
        ty.map_or_else(|| "None".to_string(), |t| self.type_name(t))
    }
}

impl Dialect for Python {
    fn type_name(&self, ty: &ModelType) -> String {
        match ty {
            ModelType::Primitive(p) => match p {
                Primitive::Int | Primitive::BigInt => "int",
                Primitive::Float | Primitive::Double | Primitive::Decimal => "float",
                Primitive::Bool => "bool",
                Primitive::Void => "None",
                Primitive::Any => "Any",
                _ => "str",
            }
            .to_string(),
            ModelType::List(inner) => format!("list[{}]", self.type_name(inner)),
            ModelType::Named { name, .. } => pascal(name),
        }
    }

    fn print(&self, args: &[String]) -> String {
        format!("print({})", args.join(", "))
    }

    fn var_decl(&self, name: &str, ty: Option<&ModelType>, init: Option<String>) -> String {
        let init = init.unwrap_or_else(|| "None".to_string());
        match ty {
            Some(ty) => format!("{name}: {} = {init}", self.type_name(ty)),
            None => format!("{name} = {init}"),
        }
    }

    fn for_range(&self, var: &str, from: &str, to: &str) -> String {
        format!("for {var} in range({from}, {to}):")
    }

    fn for_each(&self, var: &str, iter: &str) -> String {
        format!("for {var} in {iter}:")
    }

    fn null(&self) -> &'static str {
        "None"
    }

    fn bool_literal(&self, b: bool) -> &'static str {
        if b {
            "True"
        } else {
            "False"
        }
    }

    fn binary_op(&self, op: BinaryOp) -> &'static str {
        match op {
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            other => other.symbol(),
        }
    }

    fn unary_op(&self, op: UnaryOp) -> &'static str {
        match op {
            UnaryOp::Not => "not ",
            UnaryOp::Neg => "-",
        }
    }

    fn name(&self, name: &str, kind: NameKind) -> String {
        match kind {
            NameKind::DataAccess => snake(name),
            _ => name.to_string(),
        }
    }

    fn terminator(&self) -> &'static str {
        ""
    }

    fn if_open(&self, cond: &str) -> String {
        format!("if {cond}:")
    }

    fn else_if_open(&self, cond: &str) -> String {
        format!("elif {cond}:")
    }

    fn else_open(&self) -> String {
        "else:".to_string()
    }

    fn while_open(&self, cond: &str) -> String {
        format!("while {cond}:")
    }

    fn block_close(&self) -> &'static str {
        ""
    }

    fn empty_block(&self) -> Option<&'static str> {
        Some("pass")
    }
}

/// Default value that keeps every record field optional at construction.
fn default_value(ty: &ModelType) -> &'static str {
    match ty {
        ModelType::List(_) => "field(default_factory=list)",
        ModelType::Primitive(Primitive::Int | Primitive::BigInt) => "0",
        ModelType::Primitive(Primitive::Float | Primitive::Double | Primitive::Decimal) => "0.0",
        ModelType::Primitive(Primitive::Bool) => "False",
        ModelType::Primitive(Primitive::Any | Primitive::Void) | ModelType::Named { .. } => "None",
        ModelType::Primitive(_) => "\"\"",
    }
}

fn models(d: &Python, model: &CodeModel, pydantic: bool) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line("from __future__ import annotations").blank();
    if pydantic {
        w.line("from typing import Any, Optional").blank();
        w.line("from pydantic import BaseModel");
    } else {
        w.line("from dataclasses import dataclass, field");
        w.line("from typing import Any, Optional");
    }
    for record in model.records() {
        w.blank().blank();
        if pydantic {
            w.open(format!("class {}(BaseModel):", pascal(&record.name)));
        } else {
            w.line("@dataclass");
            w.open(format!("class {}:", pascal(&record.name)));
        }
        if let Some(table) = &record.table {
            w.line(format!("\"\"\"Row of table {table}.\"\"\""));
        }
        if record.fields.is_empty() {
            w.line("pass");
        }
        for f in &record.fields {
            let ty = d.type_name(&f.ty);
            let default = match default_value(&f.ty) {
                "field(default_factory=list)" if pydantic => "[]",
                other => other,
            };
            if f.nullable || default == "None" {
                w.line(format!("{}: Optional[{ty}] = None", f.name));
            } else {
                w.line(format!("{}: {ty} = {default}", f.name));
            }
        }
        w.dedent();
    }
    w.finish()
}

fn functions(w: &mut CodeWriter, d: &Python, model: &CodeModel) {
    for c in &model.constants {
        let value = c
            .value
            .as_ref()
            .map_or_else(|| "None".to_string(), |v| render_expr(d, v));
        w.line(format!("{}: {} = {value}", c.name, d.type_name(&c.ty)));
    }
    for proc in model.procedures.iter().filter(|p| !p.is_entry) {
        w.blank().blank();
        let params = d.params(proc.params.iter().map(|p| (p.name.as_str(), &p.ty)));
        w.open(format!(
            "def {}({}) -> {}:",
            proc.name,
            params.join(", "),
            d.returns(proc.returns.as_ref())
        ));
        render_block(w, d, &proc.body);
        w.dedent();
    }
    w.blank().blank();
    w.open("def main() -> None:");
    match model.entry() {
        Some(entry) => render_block(w, d, &entry.body),
        None => {
            w.line("pass");
        }
    }
    w.dedent();
}

// =============================================================================
// Client
// =============================================================================

pub struct PythonClient;

fn f_string_url(call: &ClientCall) -> String {
    let mut out = String::from("f\"{self.base_url}");
    for part in url_parts(&url_template(&call.path, &call.bindings)) {
        match part {
            UrlPart::Text(text) => {
                out.push_str(&escape(text).replace('{', "{{").replace('}', "}}"))
            }
            UrlPart::Param(name) => out.push_str(&format!("{{{name}}}")),
        }
    }
    out.push('"');
    out
}

fn decode(d: &Python, ty: &ModelType) -> String {
    match ty {
        ModelType::List(inner) if matches!(**inner, ModelType::Named { .. }) => {
            format!("[{}(**item) for item in response.json()]", d.type_name(inner))
        }
        ModelType::Named { .. } => format!("{}(**response.json())", d.type_name(ty)),
        _ => "response.json()".to_string(),
    }
}

fn api(d: &Python, model: &CodeModel) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line("from __future__ import annotations").blank();
    w.line("from dataclasses import asdict").blank();
    w.line("import requests").blank();
    w.line("from models import *");
    for client in &model.clients {
        w.blank().blank();
        w.open(format!("class {}:", pascal(&client.name)));
        w.open(format!(
            "def __init__(self, base_url: str = \"{}\") -> None:",
            escape(&client.base_url)
        ));
        w.line("self.base_url = base_url");
        w.line("self.session = requests.Session()");
        w.dedent().blank();
        w.open("def set_server(self, base_url: str) -> None:");
        w.line("self.base_url = base_url");
        w.dedent();
        for call in &client.calls {
            w.blank();
            let mut params = vec!["self".to_string()];
            params.extend(d.params(call.bindings.iter().map(|b| (b.name.as_str(), &b.ty))));
            w.open(format!(
                "def {}({}) -> {}:",
                call.name,
                params.join(", "),
                d.returns(call.returns.as_ref())
            ));
            if let Some(comment) = &call.comment {
                w.line(format!("\"\"\"{comment}\"\"\""));
            }
            let json = match body_binding(&call.bindings) {
                Some(b) if matches!(b.ty, ModelType::Named { .. }) => format!(", json=asdict({})", b.name),
                Some(b) => format!(", json={}", b.name),
                None => String::new(),
            };
            w.line(format!(
                "response = self.session.request(\"{}\", {}{json})",
                call.method.as_str(),
                f_string_url(call)
            ));
            w.line("response.raise_for_status()");
            if let Some(ty) = &call.returns {
                w.line(format!("return {}", decode(d, ty)));
            }
            w.dedent();
        }
        w.dedent();
    }
    w.finish()
}

impl PlatformGenerator for PythonClient {
    fn key(&self) -> PlatformKey {
        PlatformKey::Python
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let d = Python;
        let mut requirements = vec!["requests>=2.31".to_string()];
        requirements.extend(project.options.dependencies.iter().cloned());
        let mut files = vec![
            GeneratedFile::new("requirements.txt", requirements.join("\n") + "\n"),
            GeneratedFile::new("src/models.py", models(&d, model, false)),
        ];
        if !model.clients.is_empty() {
            files.push(GeneratedFile::new("src/api.py", api(&d, model)));
        }

        let mut w = CodeWriter::new(INDENT);
        w.line("from __future__ import annotations").blank();
        w.line("from models import *");
        if !model.clients.is_empty() {
            w.line("from api import *");
        }
        w.blank().blank();
        functions(&mut w, &d, model);
        w.blank().blank();
        w.open("if __name__ == \"__main__\":");
        w.line("main()");
        files.push(GeneratedFile::new("src/main.py", w.finish()));
        files
    }
}

// =============================================================================
// FastAPI
// =============================================================================

pub struct FastApi;

fn row_builder(d: &Python, model: &CodeModel, ty: &ModelType) -> String {
    match ty {
        ModelType::Named { name, .. } => {
            let args: Vec<String> = model
                .data_type(name)
                .map(|t| {
                    t.fields
                        .iter()
                        .enumerate()
                        .map(|(i, f)| format!("{}=row[{i}]", f.name))
                        .collect()
                })
                .unwrap_or_default();
            format!("{}({})", d.type_name(ty), args.join(", "))
        }
        _ => "row[0]".to_string(),
    }
}

fn mappers(d: &Python, model: &CodeModel) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line("from __future__ import annotations").blank();
    w.line("import sqlite3").blank();
    w.line("from app.models import *");
    for mapper in &model.mappers {
        w.blank().blank();
        w.open(format!("class {}:", pascal(&mapper.name)));
        w.open("def __init__(self, conn: sqlite3.Connection) -> None:");
        w.line("self.conn = conn");
        w.dedent();
        for op in &mapper.operations {
            w.blank();
            let mut params = vec!["self".to_string()];
            params.extend(d.params(op.params.iter().map(|p| (p.name.as_str(), &p.ty))));
            let returns = op
                .returns
                .as_ref()
                .map_or_else(|| "int".to_string(), |t| d.type_name(t));
            w.open(format!("def {}({}) -> {returns}:", op.name, params.join(", ")));
            let args = match op.bind_order.as_slice() {
                [] => "()".to_string(),
                [one] => format!("({one},)"),
                many => format!("({})", many.join(", ")),
            };
            w.line(format!(
                "cur = self.conn.execute(\"{}\", {args})",
                escape(op.positional_sql.trim())
            ));
            match &op.returns {
                Some(ty) if ty.is_list() => {
                    w.line(format!(
                        "return [{} for row in cur.fetchall()]",
                        row_builder(d, model, ty.element())
                    ));
                }
                Some(ty) => {
                    w.line("row = cur.fetchone()");
                    w.line(format!("return {} if row else None", row_builder(d, model, ty)));
                }
                None => {
                    w.line("self.conn.commit()");
                    w.line("return cur.rowcount");
                }
            }
            w.dedent();
        }
        w.dedent();
    }
    w.finish()
}

fn router(d: &Python, service: &Service) -> String {
    let mut mappers: Vec<String> = Vec::new();
    for route in &service.routes {
        for name in super::dialect::referenced(&route.body, NameKind::DataAccess) {
            if !mappers.contains(&name) {
                mappers.push(name);
            }
        }
    }

    let mut w = CodeWriter::new(INDENT);
    w.line("from __future__ import annotations").blank();
    w.line("from fastapi import APIRouter, Body").blank();
    w.line("from app.models import *");
    if !mappers.is_empty() {
        let names: Vec<String> = mappers.iter().map(|m| snake(m)).collect();
        w.line(format!("from app.db import {}", names.join(", ")));
    }
    w.blank();
    if let Some(comment) = &service.comment {
        w.line(format!("# {comment}"));
    }
    w.line("router = APIRouter()");
    for route in &service.routes {
        w.blank().blank();
        w.line(format!("@router.{}(\"{}\")", route.method.lower(), route.path));
        let params: Vec<String> = route
            .bindings
            .iter()
            .map(|b| {
                let ty = d.type_name(&b.ty);
                match (b.source, &b.ty) {
                    (BindingSource::Body, ModelType::Primitive(_)) => {
                        format!("{}: {ty} = Body(...)", b.name)
                    }
                    (BindingSource::Query, _) => format!("{}: {ty} | None = None", b.name),
                    _ => format!("{}: {ty}", b.name),
                }
            })
            .collect();
        w.open(format!(
            "def {}({}) -> {}:",
            route.handler,
            params.join(", "),
            d.returns(route.returns.as_ref())
        ));
        if let Some(comment) = &route.comment {
            w.line(format!("\"\"\"{comment}\"\"\""));
        }
        render_block(&mut w, d, &route.body);
        w.dedent();
    }
    w.finish()
}

impl PlatformGenerator for FastApi {
    fn key(&self) -> PlatformKey {
        PlatformKey::FastApi
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let d = Python;
        let mut requirements = vec![
            "fastapi>=0.110".to_string(),
            "uvicorn>=0.29".to_string(),
            "pydantic>=2.6".to_string(),
        ];
        requirements.extend(project.options.dependencies.iter().cloned());

        let mut db = CodeWriter::new(INDENT);
        db.line("import sqlite3").blank();
        db.line("from app.mappers import *").blank();
        db.line("conn = sqlite3.connect(\"app.db\", check_same_thread=False)");
        for mapper in &model.mappers {
            db.line(format!("{} = {}(conn)", snake(&mapper.name), pascal(&mapper.name)));
        }

        let mut files = vec![
            GeneratedFile::new("requirements.txt", requirements.join("\n") + "\n"),
            GeneratedFile::new("app/__init__.py", ""),
            GeneratedFile::new("app/models.py", models(&d, model, true)),
            GeneratedFile::new("app/mappers.py", mappers(&d, model)),
            GeneratedFile::new("app/db.py", db.finish()),
            GeneratedFile::new("app/routers/__init__.py", ""),
        ];
        for service in &model.services {
            files.push(GeneratedFile::new(
                format!("app/routers/{}.py", snake(&service.name)),
                router(&d, service),
            ));
        }

        let mut w = CodeWriter::new(INDENT);
        w.line("from __future__ import annotations").blank();
        w.line("import uvicorn");
        w.line("from fastapi import FastAPI").blank();
        w.line("from app.models import *");
        for service in &model.services {
            w.line(format!("from app.routers import {}", snake(&service.name)));
        }
        w.blank();
        w.line(format!(
            "app = FastAPI(title=\"{}\", version=\"{}\")",
            escape(&project.name),
            project.version()
        ));
        for service in &model.services {
            w.line(format!("app.include_router({}.router)", snake(&service.name)));
        }
        w.blank().blank();
        functions(&mut w, &d, model);
        w.blank().blank();
        w.open("if __name__ == \"__main__\":");
        w.line("main()");
        w.line("uvicorn.run(app, host=\"0.0.0.0\", port=8000)");
        files.push(GeneratedFile::new("app/main.py", w.finish()));
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::Compiler;

    fn model_for(src: &str, key: PlatformKey) -> CodeModel {
        let mut compiler = Compiler::new(Some(key));
        compiler.compile_str(src, "py.jssp").unwrap();
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
    fn indentation_scoped_blocks() {
        let src = "
            func main() {
                var n = 5;
                if (n > 3 && !false) { @console.log('big'); } else if (n > 1) { @console.log('mid'); } else { }
            }
        ";
        let model = model_for(src, PlatformKey::Python);
        let project = ProjectConfig::new("tool", PlatformKey::Python, "out");
        let files = PythonClient.generate(&model, &project);
        let main = contents(&files, "src/main.py");
        assert!(main.contains(
            "    if n > 3 and not False:\n        print(\"big\")\n    elif n > 1:\n        print(\"mid\")\n    else:\n        pass\n"
        ));
        assert!(main.contains("if __name__ == \"__main__\":\n    main()"));
    }

    #[test]
    fn fastapi_router_and_positional_mapper() {
        let src = "
            table note { id int; body text; key(id); }
            mapper NoteMapper {
                query find(id int) note { select id, body from note where id = :id }
            }
            controller NoteController {
                [method=get, route='/notes/{id}']
                func getNote(id int) note { return NoteMapper.find(id); }
            }
        ";
        let model = model_for(src, PlatformKey::FastApi);
        let project = ProjectConfig::new("notes", PlatformKey::FastApi, "out");
        let files = FastApi.generate(&model, &project);

        let router = contents(&files, "app/routers/note_controller.py");
        assert!(router.contains("@router.get(\"/notes/{id}\")\ndef getNote(id: int) -> Note:"));
        assert!(router.contains("return note_mapper.find(id)"));
        assert!(router.contains("from app.db import note_mapper"));

        let mappers = contents(&files, "app/mappers.py");
        assert!(mappers.contains("cur = self.conn.execute(\"select id, body from note where id = ?\", (id,))"));
        assert!(mappers.contains("return Note(id=row[0], body=row[1]) if row else None"));
    }
}
