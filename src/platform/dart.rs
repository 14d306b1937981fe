//! Dart generators: a console client package and a Flutter application.

use super::dialect::{body_binding, render_block, render_expr, url_parts, url_template, Dialect, UrlPart};
use super::naming::{camel, pascal, snake};
use super::writer::CodeWriter;
use super::{GeneratedFile, PlatformGenerator, PlatformKey};
use crate::build::*;
use crate::config::ProjectConfig;
use crate::dsl::ast::Primitive;

const INDENT: &str = "  ";

/// Single-quoted Dart string body.
fn dart_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

struct Dart;

impl Dialect for Dart {
    fn type_name(&self, ty: &ModelType) -> String {
        match ty {
            ModelType::Primitive(p) => match p {
                Primitive::Int | Primitive::BigInt => "int",
                Primitive::Float | Primitive::Double | Primitive::Decimal => "double",
                Primitive::Bool => "bool",
                Primitive::Void => "void",
                Primitive::Any => "dynamic",
                _ => "String",
            }
            .to_string(),
            ModelType::List(inner) => format!("List<{}>", self.type_name(inner)),
            ModelType::Named { name, .. } => pascal(name),
        }
    }

    fn print(&self, args: &[String]) -> String {
        match args {
            [single] => format!("print({single})"),
            _ => format!("print([{}].join(' '))", args.join(", ")),
        }
    }

    fn var_decl(&self, name: &str, ty: Option<&ModelType>, init: Option<String>) -> String {
        match (ty, init) {
            (Some(ty), Some(init)) => format!("{} {name} = {init}", self.type_name(ty)),
            (None, Some(init)) => format!("var {name} = {init}"),
            (Some(ty), None) => format!("{}? {name}", self.type_name(ty)),
            (None, None) => format!("dynamic {name}"),
        }
    }

    fn for_range(&self, var: &str, from: &str, to: &str) -> String {
        format!("for (var {var} = {from}; {var} < {to}; {var}++) {{")
    }

    fn for_each(&self, var: &str, iter: &str) -> String {
        format!("for (final {var} in {iter}) {{")
    }

    fn string_literal(&self, s: &str) -> String {
        format!("'{}'", dart_escape(s))
    }

    fn name(&self, name: &str, kind: NameKind) -> String {
        match kind {
            NameKind::DataAccess | NameKind::Client => camel(name),
            _ => name.to_string(),
        }
    }
}

fn package_name(project: &ProjectConfig) -> String {
    snake(&project.module())
}

fn pubspec(project: &ProjectConfig, flutter: bool) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line(format!("name: {}", package_name(project)));
    w.line(format!("description: {}", project.description()));
    w.line(format!("version: {}", project.version()));
    w.line("publish_to: 'none'");
    w.blank();
    w.open("environment:");
    let sdk = project
        .options
        .language_version
        .clone()
        .unwrap_or_else(|| "3.3.0".to_string());
    w.line(format!("sdk: '>={sdk} <4.0.0'"));
    w.dedent();
    w.blank();
    w.open("dependencies:");
    if flutter {
        w.open("flutter:");
        w.line("sdk: flutter");
        w.dedent();
    }
    w.line("http: ^1.2.1");
    for dep in &project.options.dependencies {
        match dep.split_once(':') {
            Some((name, version)) => w.line(format!("{}: {}", name.trim(), version.trim())),
            None => w.line(format!("{dep}: any")),
        };
    }
    w.dedent();
    w.blank();
    w.open("dev_dependencies:");
    if flutter {
        w.open("flutter_test:");
        w.line("sdk: flutter");
        w.dedent();
        w.line("flutter_lints: ^3.0.0");
    } else {
        w.line("lints: ^3.0.0");
        w.line("test: ^1.24.0");
    }
    w.dedent();
    if flutter {
        w.blank();
        w.open("flutter:");
        w.line("uses-material-design: true");
        w.dedent();
    }
    w.finish()
}

// =============================================================================
// Models and clients
// =============================================================================

fn from_json(d: &Dart, ty: &ModelType, value: &str, nullable: bool) -> String {
    let q = if nullable { "?" } else { "" };
    match ty {
        ModelType::Named { name, .. } => {
            let decode = format!("{}.fromJson({value} as Map<String, dynamic>)", pascal(name));
            if nullable {
                format!("{value} == null ? null : {decode}")
            } else {
                decode
            }
        }
        ModelType::List(inner) => format!(
            "({value} as List<dynamic>{q}){q}.map((e) => {}).toList()",
            from_json(d, inner, "e", false)
        ),
        ModelType::Primitive(Primitive::Float | Primitive::Double | Primitive::Decimal) => {
            format!("({value} as num{q}){q}.toDouble()")
        }
        ModelType::Primitive(Primitive::Any) => value.to_string(),
        other => format!("{value} as {}{q}", d.type_name(other)),
    }
}

fn to_json(ty: &ModelType, value: &str, nullable: bool) -> String {
    let q = if nullable { "?" } else { "" };
    match ty {
        ModelType::Named { .. } => format!("{value}{q}.toJson()"),
        ModelType::List(inner) if matches!(**inner, ModelType::Named { .. }) => {
            format!("{value}{q}.map((e) => e.toJson()).toList()")
        }
        _ => value.to_string(),
    }
}

fn models(d: &Dart, model: &CodeModel) -> String {
    let mut w = CodeWriter::new(INDENT);
    let mut first = true;
    for record in model.records() {
        if !first {
            w.blank();
        }
        first = false;
        let class = pascal(&record.name);
        w.open(format!("class {class} {{"));

        let params: Vec<String> = record
            .fields
            .iter()
            .map(|f| {
                if f.nullable || f.auto {
                    format!("this.{}", f.name)
                } else {
                    format!("required this.{}", f.name)
                }
            })
            .collect();
        if params.is_empty() {
            w.line(format!("const {class}();"));
        } else {
            w.line(format!("const {class}({{{}}});", params.join(", ")));
        }
        w.blank();
        for f in &record.fields {
            let q = if f.nullable || f.auto { "?" } else { "" };
            w.line(format!("final {}{q} {};", d.type_name(&f.ty), f.name));
        }

        w.blank();
        w.open(format!(
            "factory {class}.fromJson(Map<String, dynamic> json) => {class}("
        ));
        for f in &record.fields {
            let value = format!("json['{}']", f.name);
            w.line(format!(
                "{}: {},",
                f.name,
                from_json(d, &f.ty, &value, f.nullable || f.auto)
            ));
        }
        w.close(");");

        w.blank();
        w.open("Map<String, dynamic> toJson() => {");
        for f in &record.fields {
            w.line(format!(
                "'{}': {},",
                f.name,
                to_json(&f.ty, &f.name, f.nullable || f.auto)
            ));
        }
        w.close("};");
        w.close("}");
    }
    w.finish()
}

fn dart_url(call: &ClientCall) -> String {
    let mut out = String::from("'${baseUrl}");
    for part in url_parts(&url_template(&call.path, &call.bindings)) {
        match part {
            UrlPart::Text(text) => out.push_str(&dart_escape(text)),
            UrlPart::Param(name) => out.push_str(&format!("${{{name}}}")),
        }
    }
    out.push('\'');
    out
}

fn clients(d: &Dart, model: &CodeModel) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line("import 'dart:convert';");
    w.blank();
    w.line("import 'package:http/http.dart' as http;");
    w.blank();
    w.line("import 'models.dart';");
    for client in &model.clients {
        w.blank();
        let class = pascal(&client.name);
        w.open(format!("class {class} {{"));
        w.line(format!(
            "{class}([this.baseUrl = '{}']);",
            dart_escape(&client.base_url)
        ));
        w.blank();
        w.line("String baseUrl;");
        w.line("final http.Client _client = http.Client();");
        w.blank();
        w.open("void setServer(String baseUrl) {");
        w.line("this.baseUrl = baseUrl;");
        w.close("}");
        for call in &client.calls {
            w.blank();
            if let Some(comment) = &call.comment {
                w.line(format!("/// {comment}"));
            }
            let returns = call
                .returns
                .as_ref()
                .map_or_else(|| "void".to_string(), |t| d.type_name(t));
            let params: Vec<String> = call
                .bindings
                .iter()
                .map(|b| format!("{} {}", d.type_name(&b.ty), b.name))
                .collect();
            w.open(format!(
                "Future<{returns}> {}({}) async {{",
                call.name,
                params.join(", ")
            ));
            w.line(format!(
                "final request = http.Request('{}', Uri.parse({}));",
                call.method.as_str(),
                dart_url(call)
            ));
            w.line("request.headers['Content-Type'] = 'application/json';");
            if let Some(body) = body_binding(&call.bindings) {
                w.line(format!(
                    "request.body = jsonEncode({});",
                    to_json(&body.ty, &body.name, false)
                ));
            }
            w.line("final response = await http.Response.fromStream(await _client.send(request));");
            w.open("if (response.statusCode >= 400) {");
            w.line(format!(
                "throw http.ClientException('{} failed: ${{response.statusCode}}', request.url);",
                call.name
            ));
            w.close("}");
            if let Some(ty) = &call.returns {
                w.line(format!(
                    "return {};",
                    from_json(d, ty, "jsonDecode(response.body)", false)
                ));
            }
            w.close("}");
        }
        w.close("}");
    }
    w.finish()
}

/// Constants and free functions at library level.
fn functions(w: &mut CodeWriter, d: &Dart, model: &CodeModel) {
    for c in &model.constants {
        let value = c
            .value
            .as_ref()
            .map_or_else(|| d.null().to_string(), |v| render_expr(d, v));
        let q = if c.value.is_none() { "?" } else { "" };
        w.line(format!("final {}{q} {} = {value};", d.type_name(&c.ty), c.name));
    }
    for proc in &model.procedures {
        w.blank();
        let returns = proc
            .returns
            .as_ref()
            .map_or_else(|| "void".to_string(), |t| d.type_name(t));
        let params: Vec<String> = proc
            .params
            .iter()
            .map(|p| format!("{} {}", d.type_name(&p.ty), p.name))
            .collect();
        w.open(format!("{returns} {}({}) {{", proc.name, params.join(", ")));
        render_block(w, d, &proc.body);
        w.close("}");
    }
}

/// Client instances for every api, named like the api in camel case.
fn client_instances(w: &mut CodeWriter, model: &CodeModel) {
    for client in &model.clients {
        w.line(format!(
            "final {} = {}();",
            camel(&client.name),
            pascal(&client.name)
        ));
    }
}

// =============================================================================
// Console client
// =============================================================================

pub struct DartClient;

impl PlatformGenerator for DartClient {
    fn key(&self) -> PlatformKey {
        PlatformKey::Dart
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let d = Dart;
        let package = package_name(project);
        let mut files = vec![
            GeneratedFile::new("pubspec.yaml", pubspec(project, false)),
            GeneratedFile::new("lib/models.dart", models(&d, model)),
        ];
        if !model.clients.is_empty() {
            files.push(GeneratedFile::new("lib/api.dart", clients(&d, model)));
        }

        let mut w = CodeWriter::new(INDENT);
        if !model.clients.is_empty() {
            w.line(format!("import 'package:{package}/api.dart';"));
            w.blank();
            client_instances(&mut w, model);
        }
        functions(&mut w, &d, model);
        files.push(GeneratedFile::new(format!("bin/{package}.dart"), w.finish()));
        files
    }
}

// =============================================================================
// Flutter
// =============================================================================

pub struct Flutter;

/// Text of an element whose children are only text and interpolations.
fn inline_text(children: &[Markup]) -> Option<String> {
    let mut out = String::new();
    for child in children {
        match child {
            Markup::Text(text) => {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(&dart_escape(text));
            }
            Markup::Interpolation(expr) => {
                out.push_str(&format!("${{data['{}'] ?? ''}}", dart_escape(expr)));
            }
            Markup::Element { .. } => return None,
        }
    }
    Some(out)
}

fn attr<'m>(attrs: &'m [(String, Option<String>)], name: &str) -> Option<&'m str> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .and_then(|(_, v)| v.as_deref())
}

fn text_style(tag: &str) -> Option<&'static str> {
    match tag {
        "h1" => Some("headlineMedium"),
        "h2" => Some("titleLarge"),
        "h3" | "h4" | "h5" | "h6" => Some("titleMedium"),
        _ => None,
    }
}

/// Emit one widget expression followed by a comma.
fn widget(w: &mut CodeWriter, node: &Markup) {
    let (tag, attrs, children, component) = match node {
        Markup::Text(text) => {
            w.line(format!("const Text('{}'),", dart_escape(text)));
            return;
        }
        Markup::Interpolation(expr) => {
            w.line(format!("Text('${{data['{}'] ?? ''}}'),", dart_escape(expr)));
            return;
        }
        Markup::Element {
            tag,
            attrs,
            children,
            component,
        } => (tag.as_str(), attrs, children, *component),
    };

    if component {
        w.line(format!("const {}(),", pascal(tag)));
        return;
    }
    let text = inline_text(children);
    match (tag, text) {
        ("slot", _) => {
            w.line("child ?? const SizedBox.shrink(),");
        }
        ("hr", _) => {
            w.line("const Divider(),");
        }
        ("br", _) => {
            w.line("const SizedBox(height: 8),");
        }
        ("img", _) => {
            w.line(format!(
                "Image.network('{}'),",
                dart_escape(attr(attrs, "src").unwrap_or_default())
            ));
        }
        ("input", _) => {
            w.line(format!(
                "TextField(decoration: InputDecoration(hintText: '{}')),",
                dart_escape(attr(attrs, "placeholder").unwrap_or_default())
            ));
        }
        ("button", Some(text)) => {
            w.line(format!(
                "ElevatedButton(onPressed: () {{}}, child: Text('{text}')),"
            ));
        }
        ("a", Some(text)) => {
            let target = attr(attrs, "href").unwrap_or("/");
            w.line(format!(
                "TextButton(onPressed: () => Navigator.pushNamed(context, '{}'), child: Text('{text}')),",
                dart_escape(target)
            ));
        }
        ("li", Some(text)) => {
            w.line(format!("ListTile(title: Text('{text}')),"));
        }
        (tag, Some(text)) if !children.is_empty() => match text_style(tag) {
            Some(style) => {
                w.line(format!(
                    "Text('{text}', style: Theme.of(context).textTheme.{style}),"
                ));
            }
            None => {
                w.line(format!("Text('{text}'),"));
            }
        },
        _ => {
            w.open("Column(");
            w.line("crossAxisAlignment: CrossAxisAlignment.start,");
            w.open("children: [");
            for child in children {
                widget(w, child);
            }
            w.close("],");
            w.close("),");
        }
    }
}

fn page(model: &CodeModel, page: &PageComponent) -> String {
    let class = pascal(&page.name);
    let mut w = CodeWriter::new(INDENT);
    w.line("import 'package:flutter/material.dart';");
    let mut imports: Vec<String> = Vec::new();
    collect_components(&page.markup, &mut imports);
    imports.extend(page.parent.iter().chain(&page.layout).cloned());
    imports.sort();
    imports.dedup();
    for name in imports.iter().filter(|n| **n != page.name) {
        if model.pages.iter().any(|p| &p.name == name) {
            w.line(format!("import '{}.dart';", snake(name)));
        }
    }
    w.blank();
    w.open(format!("class {class} extends StatelessWidget {{"));
    w.line(format!(
        "const {class}({{super.key, this.child, this.data = const {{}}}});"
    ));
    w.blank();
    w.line("final Widget? child;");
    w.line("final Map<String, dynamic> data;");
    w.blank();
    w.line("@override");
    w.open("Widget build(BuildContext context) {");
    w.open("final content = Column(");
    w.line("crossAxisAlignment: CrossAxisAlignment.start,");
    w.open("children: [");
    for node in &page.markup {
        widget(&mut w, node);
    }
    w.close("],");
    w.close(");");
    let mut body = "content".to_string();
    for wrapper in [&page.parent, &page.layout].into_iter().flatten() {
        body = format!("{}(child: {body})", pascal(wrapper));
    }
    if page.route.is_some() {
        let title = page.title.as_deref().unwrap_or(&page.name);
        w.open("return Scaffold(");
        w.line(format!("appBar: AppBar(title: const Text('{}')),", dart_escape(title)));
        w.line(format!("body: SingleChildScrollView(child: {body}),"));
        w.close(");");
    } else {
        w.line(format!("return {body};"));
    }
    w.close("}");
    w.close("}");
    w.finish()
}

fn collect_components(nodes: &[Markup], out: &mut Vec<String>) {
    for node in nodes {
        if let Markup::Element {
            tag,
            children,
            component,
            ..
        } = node
        {
            if *component {
                out.push(tag.clone());
            }
            collect_components(children, out);
        }
    }
}

impl PlatformGenerator for Flutter {
    fn key(&self) -> PlatformKey {
        PlatformKey::Flutter
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let d = Dart;
        let mut files = vec![
            GeneratedFile::new("pubspec.yaml", pubspec(project, true)),
            GeneratedFile::new("lib/models.dart", models(&d, model)),
        ];
        if !model.clients.is_empty() {
            files.push(GeneratedFile::new("lib/api.dart", clients(&d, model)));
        }
        for p in &model.pages {
            files.push(GeneratedFile::new(
                format!("lib/pages/{}.dart", snake(&p.name)),
                page(model, p),
            ));
        }
        let has_functions = !model.procedures.is_empty() || !model.constants.is_empty();
        if has_functions || !model.clients.is_empty() {
            let mut w = CodeWriter::new(INDENT);
            if !model.clients.is_empty() {
                w.line("import 'api.dart';");
                w.blank();
                client_instances(&mut w, model);
            }
            functions(&mut w, &d, model);
            files.push(GeneratedFile::new("lib/functions.dart", w.finish()));
        }

        let mut w = CodeWriter::new(INDENT);
        w.line("import 'package:flutter/material.dart';");
        w.blank();
        if has_functions || !model.clients.is_empty() {
            w.line("import 'functions.dart' as functions;");
        }
        for p in &model.pages {
            w.line(format!("import 'pages/{}.dart';", snake(&p.name)));
        }
        w.blank();
        w.open("void main() {");
        if model.entry().is_some() {
            w.line("functions.main();");
        }
        w.line("runApp(const App());");
        w.close("}");
        w.blank();
        w.open("class App extends StatelessWidget {");
        w.line("const App({super.key});");
        w.blank();
        w.line("@override");
        w.open("Widget build(BuildContext context) {");
        w.open("return MaterialApp(");
        w.line(format!("title: '{}',", dart_escape(project.label())));
        let routed: Vec<&PageComponent> = model.pages.iter().filter(|p| p.route.is_some()).collect();
        match routed.first() {
            Some(first) => {
                w.line(format!(
                    "initialRoute: '{}',",
                    dart_escape(first.route.as_deref().unwrap_or("/"))
                ));
                w.open("routes: {");
                for p in &routed {
                    w.line(format!(
                        "'{}': (context) => const {}(),",
                        dart_escape(p.route.as_deref().unwrap_or("/")),
                        pascal(&p.name)
                    ));
                }
                w.close("},");
            }
            None => {
                w.line("home: const Scaffold(body: Center(child: Text('Ready'))),");
            }
        }
        w.close(");");
        w.close("}");
        w.close("}");
        files.push(GeneratedFile::new("lib/main.dart", w.finish()));
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::Compiler;

    fn model_for(src: &str, key: PlatformKey) -> CodeModel {
        let mut compiler = Compiler::new(Some(key));
        compiler.compile_str(src, "dart.jssp").unwrap();
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
    fn strings_escape_interpolation_markers() {
        assert_eq!(Dart.string_literal("cost: $5 'each'"), "'cost: \\$5 \\'each\\''");
    }

    #[test]
    fn client_decodes_records() {
        let src = "
            struct Todo { id int; title string; done bool; }
            controller TodoController {
                [method=get, route='/todos/{id}']
                func getTodo(id int) Todo { return null; }
            }
            [baseUrl='http://localhost:8080']
            api TodoApi { TodoController; }
        ";
        let model = model_for(src, PlatformKey::Dart);
        let project = ProjectConfig::new("todo", PlatformKey::Dart, "out");
        let files = DartClient.generate(&model, &project);
        let api = contents(&files, "lib/api.dart");
        assert!(api.contains("Future<Todo> getTodo(int id) async {"));
        assert!(api.contains("Uri.parse('${baseUrl}/todos/${id}')"));
        assert!(api.contains("return Todo.fromJson(jsonDecode(response.body) as Map<String, dynamic>);"));
        let models = contents(&files, "lib/models.dart");
        assert!(models.contains("const Todo({required this.id, required this.title, required this.done});"));
        assert!(models.contains("title: json['title'] as String,"));
    }

    #[test]
    fn flutter_pages_become_routed_widgets() {
        let src = "
            [route='/users', title='Users']
            html UserPage { <div><h1>{{ title }}</h1><button>Reload</button></div> }
        ";
        let model = model_for(src, PlatformKey::Flutter);
        let project = ProjectConfig::new("app", PlatformKey::Flutter, "out");
        let files = Flutter.generate(&model, &project);
        let page = contents(&files, "lib/pages/user_page.dart");
        assert!(page.contains("class UserPage extends StatelessWidget {"));
        assert!(page.contains("Text('${data['title'] ?? ''}', style: Theme.of(context).textTheme.headlineMedium),"));
        assert!(page.contains("ElevatedButton(onPressed: () {}, child: Text('Reload')),"));
        let main = contents(&files, "lib/main.dart");
        assert!(main.contains("'/users': (context) => const UserPage(),"));
        assert!(contents(&files, "pubspec.yaml").contains("sdk: flutter"));
    }
}
