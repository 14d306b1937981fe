//! JVM generators: plain Java (and the `coders` flavor), Spring Boot, Kotlin.

use super::dialect::{self, body_binding, render_block, url_parts, url_template, Dialect, UrlPart};
use super::naming::{camel, escape, one_line, pascal};
use super::writer::CodeWriter;
use super::{GeneratedFile, PlatformGenerator, PlatformKey};
use crate::build::*;
use crate::config::ProjectConfig;
use crate::dsl::ast::Primitive;
use crate::dsl::sql::{self, StatementKind};

const INDENT: &str = "    ";

fn package_dir(root: &str, package: &str) -> String {
    format!("{root}/{}", package.replace('.', "/"))
}

// =============================================================================
// Java dialect
// =============================================================================

struct Java {
    /// Class holding constants.
    constants: String,
    /// Class holding free functions, when not the current class.
    functions: Option<String>,
}

impl Java {
    fn boxed(p: Primitive) -> &'static str {
        match p {
            Primitive::Int => "Integer",
            Primitive::BigInt => "Long",
            Primitive::Float => "Float",
            Primitive::Double => "Double",
            Primitive::Decimal => "java.math.BigDecimal",
            Primitive::Bool => "Boolean",
            Primitive::String | Primitive::Text | Primitive::Char(_) | Primitive::Varchar(_) => {
                "String"
            }
            Primitive::Date => "java.time.LocalDate",
            Primitive::DateTime => "java.time.LocalDateTime",
            Primitive::Void => "Void",
            Primitive::Any => "Object",
        }
    }

    fn returns(&self, ty: Option<&ModelType>) -> String {
        ty.map_or_else(|| "void".to_string(), |t| self.type_name(t))
    }
}

impl Dialect for Java {
    fn type_name(&self, ty: &ModelType) -> String {
        match ty {
            ModelType::Primitive(p) => Self::boxed(*p).to_string(),
            ModelType::List(inner) => format!("List<{}>", self.type_name(inner)),
            ModelType::Named { name, .. } => pascal(name),
        }
    }

    fn print(&self, args: &[String]) -> String {
        match args {
            [] => "System.out.println()".to_string(),
            [one] => format!("System.out.println({one})"),
            [first, rest @ ..] => {
                let mut text = format!("String.valueOf({first})");
                for arg in rest {
                    text.push_str(&format!(" + \" \" + {arg}"));
                }
                format!("System.out.println({text})")
            }
        }
    }

    fn var_decl(&self, name: &str, ty: Option<&ModelType>, init: Option<String>) -> String {
        match (ty, init) {
            (Some(ty), Some(init)) => format!("{} {name} = {init}", self.type_name(ty)),
            (Some(ty), None) => format!("{} {name} = null", self.type_name(ty)),
            (None, Some(init)) => format!("var {name} = {init}"),
            (None, None) => format!("Object {name} = null"),
        }
    }

    fn for_range(&self, var: &str, from: &str, to: &str) -> String {
        format!("for (int {var} = {from}; {var} < {to}; {var}++) {{")
    }

    fn for_each(&self, var: &str, iter: &str) -> String {
        format!("for (var {var} : {iter}) {{")
    }

    fn name(&self, name: &str, kind: NameKind) -> String {
        match kind {
            NameKind::Constant => format!("{}.{name}", self.constants),
            NameKind::Procedure => match &self.functions {
                Some(class) => format!("{class}.{name}"),
                None => name.to_string(),
            },
            NameKind::DataAccess | NameKind::Service | NameKind::Client => camel(name),
            _ => name.to_string(),
        }
    }
}

fn java_record(package: &str, d: &Java, record: &DataType) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line(format!("package {package}.model;")).blank();
    w.line("import java.util.List;").blank();
    if let Some(table) = &record.table {
        w.line(format!("/** Row of table {table}. */"));
    }
    let fields: Vec<String> = record
        .fields
        .iter()
        .map(|f| format!("{} {}", d.type_name(&f.ty), camel(&f.name)))
        .collect();
    w.line(format!("public record {}(", pascal(&record.name)));
    w.indent();
    for (i, field) in fields.iter().enumerate() {
        let sep = if i + 1 < fields.len() { "," } else { "" };
        w.line(format!("{field}{sep}"));
    }
    w.dedent();
    w.line(") {}");
    w.finish()
}

fn java_constants(package: &str, d: &Java, model: &CodeModel) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line(format!("package {package};")).blank();
    w.line("import java.util.List;").blank();
    w.open(format!("public final class {} {{", d.constants));
    w.line(format!("private {}() {{}}", d.constants)).blank();
    for c in &model.constants {
        let value = c
            .value
            .as_ref()
            .map_or_else(|| "null".to_string(), |v| dialect::render_expr(d, v));
        w.line(format!(
            "public static final {} {} = {value};",
            d.type_name(&c.ty),
            c.name
        ));
    }
    w.close("}");
    w.finish()
}

fn java_params(d: &Java, params: &[Parameter]) -> String {
    params
        .iter()
        .map(|p| format!("{} {}", d.type_name(&p.ty), p.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Static methods for every non-entry procedure.
fn java_procedures(w: &mut CodeWriter, d: &Java, model: &CodeModel) {
    for proc in model.procedures.iter().filter(|p| !p.is_entry) {
        w.blank();
        w.open(format!(
            "public static {} {}({}) {{",
            d.returns(proc.returns.as_ref()),
            proc.name,
            java_params(d, &proc.params)
        ));
        render_block(w, d, &proc.body);
        w.close("}");
    }
}

fn java_url(template: &str) -> String {
    let mut pieces = vec!["baseUrl".to_string()];
    for part in url_parts(template) {
        match part {
            UrlPart::Text(text) => pieces.push(format!("\"{}\"", escape(text))),
            UrlPart::Param(name) => pieces.push(name.to_string()),
        }
    }
    pieces.join(" + ")
}

fn java_client(package: &str, d: &Java, client: &ClientApi) -> String {
    let mut w = CodeWriter::new(INDENT);
    let class = pascal(&client.name);
    w.line(format!("package {package}.api;")).blank();
    for import in [
        "com.fasterxml.jackson.core.type.TypeReference",
        "com.fasterxml.jackson.databind.ObjectMapper",
        "java.io.IOException",
        "java.net.URI",
        "java.net.http.HttpClient",
        "java.net.http.HttpRequest",
        "java.net.http.HttpResponse",
        "java.util.List",
    ] {
        w.line(format!("import {import};"));
    }
    w.line(format!("import {package}.model.*;")).blank();

    w.open(format!("public class {class} {{"));
    w.line("private final HttpClient http = HttpClient.newHttpClient();");
    w.line("private final ObjectMapper json = new ObjectMapper();");
    w.line("private String baseUrl;").blank();
    w.open(format!("public {class}() {{"));
    w.line(format!("this(\"{}\");", escape(&client.base_url)));
    w.close("}").blank();
    w.open(format!("public {class}(String baseUrl) {{"));
    w.line("this.baseUrl = baseUrl;");
    w.close("}");

    for call in &client.calls {
        w.blank();
        if let Some(comment) = &call.comment {
            w.line(format!("/** {comment} */"));
        }
        let params: Vec<Parameter> = call
            .bindings
            .iter()
            .map(|b| Parameter {
                name: b.name.clone(),
                ty: b.ty.clone(),
            })
            .collect();
        w.open(format!(
            "public {} {}({}) throws IOException, InterruptedException {{",
            d.returns(call.returns.as_ref()),
            call.name,
            java_params(d, &params)
        ));
        let publisher = match body_binding(&call.bindings) {
            Some(body) => format!(
                "HttpRequest.BodyPublishers.ofString(json.writeValueAsString({}))",
                body.name
            ),
            None => "HttpRequest.BodyPublishers.noBody()".to_string(),
        };
        w.line(format!(
            "HttpRequest request = HttpRequest.newBuilder(URI.create({}))",
            java_url(&url_template(&call.path, &call.bindings))
        ));
        w.indent();
        w.line(format!(".method(\"{}\", {publisher})", call.method.as_str()));
        w.line(".header(\"Content-Type\", \"application/json\")");
        w.line(".build();");
        w.dedent();
        w.line("HttpResponse<String> response = http.send(request, HttpResponse.BodyHandlers.ofString());");
        w.open("if (response.statusCode() >= 400) {");
        w.line(format!(
            "throw new IOException(\"{} failed: \" + response.statusCode());",
            call.name
        ));
        w.close("}");
        if let Some(ty) = &call.returns {
            if ty.is_list() {
                w.line(format!(
                    "return json.readValue(response.body(), new TypeReference<{}>() {{}});",
                    d.type_name(ty)
                ));
            } else {
                w.line(format!(
                    "return json.readValue(response.body(), {}.class);",
                    d.type_name(ty)
                ));
            }
        }
        w.close("}");
    }
    w.close("}");
    w.finish()
}

fn pom(project: &ProjectConfig, dependencies: &[(&str, &str, Option<&str>)], spring: bool) -> String {
    let mut w = CodeWriter::new("  ");
    w.line("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    w.open("<project xmlns=\"http://maven.apache.org/POM/4.0.0\">");
    w.line("<modelVersion>4.0.0</modelVersion>");
    if spring {
        w.open("<parent>");
        w.line("<groupId>org.springframework.boot</groupId>");
        w.line("<artifactId>spring-boot-starter-parent</artifactId>");
        w.line("<version>3.2.5</version>");
        w.close("</parent>");
    }
    w.line(format!("<groupId>{}</groupId>", project.group()));
    w.line(format!("<artifactId>{}</artifactId>", project.module()));
    w.line(format!("<version>{}</version>", project.version()));
    w.line(format!("<description>{}</description>", project.description()));
    w.open("<properties>");
    let java = project.options.language_version.as_deref().unwrap_or("17");
    w.line(format!("<maven.compiler.release>{java}</maven.compiler.release>"));
    w.line("<project.build.sourceEncoding>UTF-8</project.build.sourceEncoding>");
    w.close("</properties>");
    w.open("<dependencies>");
    for (group, artifact, version) in dependencies {
        w.open("<dependency>");
        w.line(format!("<groupId>{group}</groupId>"));
        w.line(format!("<artifactId>{artifact}</artifactId>"));
        if let Some(version) = version {
            w.line(format!("<version>{version}</version>"));
        }
        w.close("</dependency>");
    }
    for extra in &project.options.dependencies {
        let mut parts = extra.split(':');
        if let (Some(group), Some(artifact)) = (parts.next(), parts.next()) {
            w.open("<dependency>");
            w.line(format!("<groupId>{group}</groupId>"));
            w.line(format!("<artifactId>{artifact}</artifactId>"));
            if let Some(version) = parts.next() {
                w.line(format!("<version>{version}</version>"));
            }
            w.close("</dependency>");
        }
    }
    w.close("</dependencies>");
    if spring {
        w.open("<build>");
        w.open("<plugins>");
        w.open("<plugin>");
        w.line("<groupId>org.springframework.boot</groupId>");
        w.line("<artifactId>spring-boot-maven-plugin</artifactId>");
        w.close("</plugin>");
        w.close("</plugins>");
        w.close("</build>");
    }
    w.close("</project>");
    w.finish()
}

// =============================================================================
// Java client (java, coders)
// =============================================================================

pub struct JavaClient {
    key: PlatformKey,
}

impl JavaClient {
    pub fn new(key: PlatformKey) -> Self {
        Self { key }
    }
}

impl PlatformGenerator for JavaClient {
    fn key(&self) -> PlatformKey {
        self.key
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let package = project.package();
        let main_class = project.main_class();
        let root = package_dir("src/main/java", &package);
        let d = Java {
            constants: "Constants".to_string(),
            functions: None,
        };

        let mut files = vec![GeneratedFile::new(
            "pom.xml",
            pom(
                project,
                &[("com.fasterxml.jackson.core", "jackson-databind", Some("2.17.1"))],
                false,
            ),
        )];
        for record in model.records() {
            files.push(GeneratedFile::new(
                format!("{root}/model/{}.java", pascal(&record.name)),
                java_record(&package, &d, record),
            ));
        }
        for client in &model.clients {
            files.push(GeneratedFile::new(
                format!("{root}/api/{}.java", pascal(&client.name)),
                java_client(&package, &d, client),
            ));
        }
        files.push(GeneratedFile::new(
            format!("{root}/{}.java", d.constants),
            java_constants(&package, &d, model),
        ));

        let mut w = CodeWriter::new(INDENT);
        w.line(format!("package {package};")).blank();
        w.line("import java.util.List;");
        w.line(format!("import {package}.model.*;"));
        w.line(format!("import {package}.api.*;")).blank();
        w.open(format!("public class {main_class} {{"));
        w.open("public static void main(String[] args) {");
        if let Some(entry) = model.entry() {
            render_block(&mut w, &d, &entry.body);
        }
        w.close("}");
        java_procedures(&mut w, &d, model);
        w.close("}");
        files.push(GeneratedFile::new(format!("{root}/{main_class}.java"), w.finish()));
        files
    }
}

// =============================================================================
// Spring Boot
// =============================================================================

pub struct SpringBoot;

fn mybatis_annotation(kind: StatementKind) -> &'static str {
    match kind {
        StatementKind::Select => "Select",
        StatementKind::Insert => "Insert",
        StatementKind::Update => "Update",
        StatementKind::Delete | StatementKind::Other => "Delete",
    }
}

fn spring_mapper(package: &str, d: &Java, mapper: &DataAccess) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line(format!("package {package}.mapper;")).blank();
    w.line("import java.util.List;");
    w.line("import org.apache.ibatis.annotations.*;");
    w.line(format!("import {package}.model.*;")).blank();
    w.line("@Mapper");
    w.open(format!("public interface {} {{", pascal(&mapper.name)));
    for (i, op) in mapper.operations.iter().enumerate() {
        if i > 0 {
            w.blank();
        }
        let sql = sql::rewrite_parameters(&op.sql, |name, _| format!("#{{{name}}}")).sql;
        w.line(format!(
            "@{}(\"{}\")",
            mybatis_annotation(op.kind),
            escape(&one_line(&sql))
        ));
        let params: Vec<String> = op
            .params
            .iter()
            .map(|p| format!("@Param(\"{0}\") {1} {0}", p.name, d.type_name(&p.ty)))
            .collect();
        let returns = match (&op.returns, op.kind) {
            (Some(ty), _) => d.type_name(ty),
            (None, StatementKind::Select) => "Object".to_string(),
            (None, _) => "int".to_string(),
        };
        w.line(format!("{returns} {}({});", op.name, params.join(", ")));
    }
    w.close("}");
    w.finish()
}

fn spring_mapping(method: HttpMethod) -> &'static str {
    match method {
        HttpMethod::Get => "GetMapping",
        HttpMethod::Post => "PostMapping",
        HttpMethod::Put => "PutMapping",
        HttpMethod::Delete => "DeleteMapping",
        HttpMethod::Patch => "PatchMapping",
        HttpMethod::Head | HttpMethod::Options => "RequestMapping",
    }
}

fn spring_controller(package: &str, d: &Java, service: &Service) -> String {
    let class = pascal(&service.name);
    let mappers: Vec<String> = {
        let mut names: Vec<String> = Vec::new();
        for route in &service.routes {
            for name in dialect::referenced(&route.body, NameKind::DataAccess) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    };

    let mut w = CodeWriter::new(INDENT);
    w.line(format!("package {package}.controller;")).blank();
    w.line("import java.util.List;");
    w.line("import org.springframework.web.bind.annotation.*;");
    w.line(format!("import {package}.mapper.*;"));
    w.line(format!("import {package}.model.*;")).blank();
    if let Some(comment) = &service.comment {
        w.line(format!("/** {comment} */"));
    }
    w.line("@RestController");
    w.open(format!("public class {class} {{"));
    for mapper in &mappers {
        w.line(format!("private final {} {};", pascal(mapper), camel(mapper)));
    }
    if !mappers.is_empty() {
        let params: Vec<String> = mappers
            .iter()
            .map(|m| format!("{} {}", pascal(m), camel(m)))
            .collect();
        w.blank();
        w.open(format!("public {class}({}) {{", params.join(", ")));
        for mapper in &mappers {
            w.line(format!("this.{0} = {0};", camel(mapper)));
        }
        w.close("}");
    }

    for route in &service.routes {
        w.blank();
        if let Some(comment) = &route.comment {
            w.line(format!("/** {comment} */"));
        }
        match route.method {
            HttpMethod::Head | HttpMethod::Options => w.line(format!(
                "@RequestMapping(value = \"{}\", method = RequestMethod.{})",
                route.path,
                route.method.as_str()
            )),
            method => w.line(format!("@{}(\"{}\")", spring_mapping(method), route.path)),
        };
        let params: Vec<String> = route
            .bindings
            .iter()
            .map(|b| {
                let annotation = match b.source {
                    BindingSource::Path => "@PathVariable",
                    BindingSource::Body => "@RequestBody",
                    BindingSource::Query => "@RequestParam(required = false)",
                };
                format!("{annotation} {} {}", d.type_name(&b.ty), b.name)
            })
            .collect();
        w.open(format!(
            "public {} {}({}) {{",
            d.returns(route.returns.as_ref()),
            route.handler,
            params.join(", ")
        ));
        render_block(&mut w, d, &route.body);
        w.close("}");
    }
    w.close("}");
    w.finish()
}

impl PlatformGenerator for SpringBoot {
    fn key(&self) -> PlatformKey {
        PlatformKey::SpringBoot
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let package = project.package();
        let main_class = project.main_class();
        let root = package_dir("src/main/java", &package);
        let d = Java {
            constants: "Constants".to_string(),
            functions: Some("Functions".to_string()),
        };

        let mut files = vec![
            GeneratedFile::new(
                "pom.xml",
                pom(
                    project,
                    &[
                        ("org.springframework.boot", "spring-boot-starter-web", None),
                        ("org.mybatis.spring.boot", "mybatis-spring-boot-starter", Some("3.0.3")),
                        ("com.mysql", "mysql-connector-j", None),
                    ],
                    true,
                ),
            ),
            GeneratedFile::new(
                "src/main/resources/application.yml",
                format!(
                    "server:\n  port: 8080\nspring:\n  application:\n    name: {}\n  datasource:\n    url: jdbc:mysql://localhost:3306/{}\n    username: root\n    password: \"\"\nmybatis:\n  configuration:\n    map-underscore-to-camel-case: true\n",
                    project.module(),
                    camel(project.label()),
                ),
            ),
        ];
        for record in model.records() {
            files.push(GeneratedFile::new(
                format!("{root}/model/{}.java", pascal(&record.name)),
                java_record(&package, &d, record),
            ));
        }
        for mapper in &model.mappers {
            files.push(GeneratedFile::new(
                format!("{root}/mapper/{}.java", pascal(&mapper.name)),
                spring_mapper(&package, &d, mapper),
            ));
        }
        for service in &model.services {
            files.push(GeneratedFile::new(
                format!("{root}/controller/{}.java", pascal(&service.name)),
                spring_controller(&package, &d, service),
            ));
        }
        files.push(GeneratedFile::new(
            format!("{root}/{}.java", d.constants),
            java_constants(&package, &d, model),
        ));

        let mut w = CodeWriter::new(INDENT);
        w.line(format!("package {package};")).blank();
        w.line("import java.util.List;");
        w.line(format!("import {package}.model.*;")).blank();
        w.open("public final class Functions {");
        w.line("private Functions() {}").blank();
        w.open("public static void run() {");
        if let Some(entry) = model.entry() {
            render_block(&mut w, &d, &entry.body);
        }
        w.close("}");
        java_procedures(&mut w, &d, model);
        w.close("}");
        files.push(GeneratedFile::new(format!("{root}/Functions.java"), w.finish()));

        let mut w = CodeWriter::new(INDENT);
        w.line(format!("package {package};")).blank();
        w.line("import org.springframework.boot.SpringApplication;");
        w.line("import org.springframework.boot.autoconfigure.SpringBootApplication;").blank();
        w.line("@SpringBootApplication");
        w.open(format!("public class {main_class} {{"));
        w.open("public static void main(String[] args) {");
        w.line(format!("SpringApplication.run({main_class}.class, args);"));
        w.line("Functions.run();");
        w.close("}");
        w.close("}");
        files.push(GeneratedFile::new(format!("{root}/{main_class}.java"), w.finish()));
        files
    }
}

// =============================================================================
// Kotlin
// =============================================================================

struct KotlinDialect;

impl KotlinDialect {
    fn primitive(p: Primitive) -> &'static str {
        match p {
            Primitive::Int => "Int",
            Primitive::BigInt => "Long",
            Primitive::Float => "Float",
            Primitive::Double => "Double",
            Primitive::Decimal => "java.math.BigDecimal",
            Primitive::Bool => "Boolean",
            Primitive::String | Primitive::Text | Primitive::Char(_) | Primitive::Varchar(_) => {
                "String"
            }
            Primitive::Date => "java.time.LocalDate",
            Primitive::DateTime => "java.time.LocalDateTime",
            Primitive::Void => "Unit",
            Primitive::Any => "Any",
        }
    }
}

impl Dialect for KotlinDialect {
    fn type_name(&self, ty: &ModelType) -> String {
        match ty {
            ModelType::Primitive(p) => Self::primitive(*p).to_string(),
            ModelType::List(inner) => format!("List<{}>", self.type_name(inner)),
            ModelType::Named { name, .. } => pascal(name),
        }
    }

    fn print(&self, args: &[String]) -> String {
        match args {
            [one] => format!("println({one})"),
            _ => format!("println(listOf({}).joinToString(\" \"))", args.join(", ")),
        }
    }

    fn var_decl(&self, name: &str, ty: Option<&ModelType>, init: Option<String>) -> String {
        match (ty, init) {
            (Some(ty), Some(init)) => format!("var {name}: {} = {init}", self.type_name(ty)),
            (Some(ty), None) => format!("var {name}: {}? = null", self.type_name(ty)),
            (None, Some(init)) => format!("var {name} = {init}"),
            (None, None) => format!("var {name}: Any? = null"),
        }
    }

    fn for_range(&self, var: &str, from: &str, to: &str) -> String {
        format!("for ({var} in {from} until {to}) {{")
    }

    fn for_each(&self, var: &str, iter: &str) -> String {
        format!("for ({var} in {iter}) {{")
    }

    fn terminator(&self) -> &'static str {
        ""
    }
}

pub struct Kotlin;

fn kotlin_params(d: &KotlinDialect, bindings: impl Iterator<Item = (String, ModelType)>) -> String {
    bindings
        .map(|(name, ty)| format!("{name}: {}", d.type_name(&ty)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn kotlin_url(template: &str) -> String {
    let mut out = String::from("\"$baseUrl");
    for part in url_parts(template) {
        match part {
            UrlPart::Text(text) => out.push_str(&escape(text).replace('$', "\\$")),
            UrlPart::Param(name) => out.push_str(&format!("${{{name}}}")),
        }
    }
    out.push('"');
    out
}

impl PlatformGenerator for Kotlin {
    fn key(&self) -> PlatformKey {
        PlatformKey::Kotlin
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let package = project.package();
        let root = package_dir("src/main/kotlin", &package);
        let d = KotlinDialect;

        let gradle = format!(
            "plugins {{\n    kotlin(\"jvm\") version \"1.9.24\"\n    application\n}}\n\ngroup = \"{}\"\nversion = \"{}\"\n\nrepositories {{\n    mavenCentral()\n}}\n\ndependencies {{\n    implementation(\"com.fasterxml.jackson.module:jackson-module-kotlin:2.17.1\")\n}}\n\napplication {{\n    mainClass.set(\"{package}.MainKt\")\n}}\n",
            project.group(),
            project.version()
        );
        let mut files = vec![
            GeneratedFile::new("build.gradle.kts", gradle),
            GeneratedFile::new(
                "settings.gradle.kts",
                format!("rootProject.name = \"{}\"\n", project.module()),
            ),
        ];

        let mut w = CodeWriter::new(INDENT);
        w.line(format!("package {package}")).blank();
        for record in model.records() {
            let fields: Vec<String> = record
                .fields
                .iter()
                .map(|f| {
                    let optional = if f.nullable || f.auto { "? = null" } else { "" };
                    format!("val {}: {}{optional}", camel(&f.name), d.type_name(&f.ty))
                })
                .collect();
            w.line(format!("data class {}(", pascal(&record.name)));
            w.indent();
            for (i, field) in fields.iter().enumerate() {
                let sep = if i + 1 < fields.len() { "," } else { "" };
                w.line(format!("{field}{sep}"));
            }
            w.dedent();
            w.line(")").blank();
        }
        files.push(GeneratedFile::new(format!("{root}/Models.kt"), w.finish()));

        for client in &model.clients {
            let class = pascal(&client.name);
            let mut w = CodeWriter::new(INDENT);
            w.line(format!("package {package}")).blank();
            w.line("import com.fasterxml.jackson.module.kotlin.jacksonObjectMapper");
            w.line("import com.fasterxml.jackson.module.kotlin.readValue");
            w.line("import java.net.URI");
            w.line("import java.net.http.HttpClient");
            w.line("import java.net.http.HttpRequest");
            w.line("import java.net.http.HttpResponse").blank();
            w.open(format!(
                "class {class}(private val baseUrl: String = \"{}\") {{",
                escape(&client.base_url)
            ));
            w.line("private val http = HttpClient.newHttpClient()");
            w.line("private val json = jacksonObjectMapper()");
            for call in &client.calls {
                w.blank();
                let params = kotlin_params(
                    &d,
                    call.bindings.iter().map(|b| (b.name.clone(), b.ty.clone())),
                );
                let returns = call
                    .returns
                    .as_ref()
                    .map_or_else(|| "Unit".to_string(), |t| d.type_name(t));
                w.open(format!("fun {}({params}): {returns} {{", call.name));
                let publisher = match body_binding(&call.bindings) {
                    Some(body) => format!(
                        "HttpRequest.BodyPublishers.ofString(json.writeValueAsString({}))",
                        body.name
                    ),
                    None => "HttpRequest.BodyPublishers.noBody()".to_string(),
                };
                w.line(format!(
                    "val request = HttpRequest.newBuilder(URI.create({}))",
                    kotlin_url(&url_template(&call.path, &call.bindings))
                ));
                w.indent();
                w.line(format!(".method(\"{}\", {publisher})", call.method.as_str()));
                w.line(".header(\"Content-Type\", \"application/json\")");
                w.line(".build()");
                w.dedent();
                w.line("val response = http.send(request, HttpResponse.BodyHandlers.ofString())");
                w.line(format!(
                    "check(response.statusCode() < 400) {{ \"{} failed: ${{response.statusCode()}}\" }}",
                    call.name
                ));
                if call.returns.is_some() {
                    w.line("return json.readValue(response.body())");
                }
                w.close("}");
            }
            w.close("}");
            files.push(GeneratedFile::new(format!("{root}/{class}.kt"), w.finish()));
        }

        let mut w = CodeWriter::new(INDENT);
        w.line(format!("package {package}")).blank();
        for c in &model.constants {
            let value = c
                .value
                .as_ref()
                .map_or_else(|| "null".to_string(), |v| dialect::render_expr(&d, v));
            w.line(format!("val {}: {} = {value}", c.name, d.type_name(&c.ty)));
        }
        for proc in &model.procedures {
            w.blank();
            let params = kotlin_params(&d, proc.params.iter().map(|p| (p.name.clone(), p.ty.clone())));
            let returns = proc
                .returns
                .as_ref()
                .map(|t| format!(": {}", d.type_name(t)))
                .unwrap_or_default();
            w.open(format!("fun {}({params}){returns} {{", proc.name));
            render_block(&mut w, &d, &proc.body);
            w.close("}");
        }
        if model.entry().is_none() {
            w.blank();
            w.line("fun main() {}");
        }
        files.push(GeneratedFile::new(format!("{root}/Main.kt"), w.finish()));
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::Compiler;

    fn model_for(src: &str, key: PlatformKey) -> CodeModel {
        let mut compiler = Compiler::new(Some(key));
        compiler.compile_str(src, "jvm.jssp").unwrap();
        crate::build::lower(&mut compiler).unwrap()
    }

    const SRC: &str = "
        table tb_user { id bigint auto; name varchar(100); key(id); }
        mapper UserMapper {
            query selectById(id bigint) UserVo { select id, name from tb_user where id = :id }
        }
        [baseUrl='/api/v1']
        controller UserController {
            [method=get, route='/users/{id}']
            func getUser(id bigint) UserVo { return UserMapper.selectById(id); }
        }
        [baseUrl='http://localhost:8080']
        api UserApi { UserController; }
        func main() { @console.log('hi'); }
    ";

    fn find<'a>(files: &'a [GeneratedFile], suffix: &str) -> &'a GeneratedFile {
        files
            .iter()
            .find(|f| f.path.to_string_lossy().ends_with(suffix))
            .unwrap_or_else(|| panic!("no file ending in {suffix}"))
    }

    #[test]
    fn spring_boot_layout_and_mybatis_parameters() {
        let model = model_for(SRC, PlatformKey::SpringBoot);
        let project = ProjectConfig::new("demo", PlatformKey::SpringBoot, "out");
        let files = SpringBoot.generate(&model, &project);

        let mapper = find(&files, "com/example/demo/mapper/UserMapper.java");
        assert!(mapper.contents.contains("@Select(\"select id, name from tb_user where id = #{id}\")"));
        assert!(mapper.contents.contains("UserVo selectById(@Param(\"id\") Long id);"));

        let controller = find(&files, "controller/UserController.java");
        assert!(controller.contents.contains("@GetMapping(\"/api/v1/users/{id}\")"));
        assert!(controller.contents.contains("return userMapper.selectById(id);"));
        assert!(controller.contents.contains("private final UserMapper userMapper;"));

        find(&files, "pom.xml");
        find(&files, "src/main/resources/application.yml");
    }

    #[test]
    fn java_client_builds_urls_from_templates() {
        let model = model_for(SRC, PlatformKey::Java);
        let project = ProjectConfig::new("demo", PlatformKey::Java, "out");
        let files = JavaClient::new(PlatformKey::Java).generate(&model, &project);

        let api = find(&files, "api/UserApi.java");
        assert!(api.contents.contains("URI.create(baseUrl + \"/api/v1/users/\" + id)"));
        assert!(api.contents.contains("this(\"http://localhost:8080\");"));

        let main = find(&files, "com/example/demo/App.java");
        assert!(main.contents.contains("System.out.println(\"hi\");"));
    }

    #[test]
    fn kotlin_records_are_data_classes() {
        let model = model_for(SRC, PlatformKey::Kotlin);
        let project = ProjectConfig::new("demo", PlatformKey::Kotlin, "out");
        let files = Kotlin.generate(&model, &project);
        let models = find(&files, "Models.kt");
        assert!(models.contents.contains("data class TbUser("));
        assert!(models.contents.contains("val id: Long? = null,"));
    }
}
