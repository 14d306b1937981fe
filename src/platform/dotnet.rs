//! .NET generators: a C# console client and an ASP.NET Core + Dapper server.

use super::dialect::{body_binding, render_block, render_expr, url_parts, url_template, Dialect, UrlPart};
use super::naming::{camel, escape, one_line, pascal};
use super::writer::CodeWriter;
use super::{GeneratedFile, PlatformGenerator, PlatformKey};
use crate::build::*;
use crate::config::ProjectConfig;
use crate::dsl::ast::Primitive;
use crate::dsl::sql::{self, StatementKind};

const INDENT: &str = "    ";

struct CSharp {
    /// Class holding free functions, when not `Program` itself.
    functions: Option<&'static str>,
}

impl CSharp {
    fn primitive(p: Primitive) -> &'static str {
        match p {
            Primitive::Int => "int",
            Primitive::BigInt => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Decimal => "decimal",
            Primitive::Bool => "bool",
            Primitive::String | Primitive::Text | Primitive::Char(_) | Primitive::Varchar(_) => {
                "string"
            }
            Primitive::Date => "DateOnly",
            Primitive::DateTime => "DateTime",
            Primitive::Void => "void",
            Primitive::Any => "object",
        }
    }

    fn returns(&self, ty: Option<&ModelType>) -> String {
        ty.map_or_else(|| "void".to_string(), |t| self.type_name(t))
    }

    fn params<'b>(&self, params: impl Iterator<Item = (&'b str, &'b ModelType)>) -> String {
        params
            .map(|(name, ty)| format!("{} {name}", self.type_name(ty)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Dialect for CSharp {
    fn type_name(&self, ty: &ModelType) -> String {
        match ty {
            ModelType::Primitive(p) => Self::primitive(*p).to_string(),
            ModelType::List(inner) => format!("List<{}>", self.type_name(inner)),
            ModelType::Named { name, .. } => pascal(name),
        }
    }

    fn print(&self, args: &[String]) -> String {
        match args {
            [] => "Console.WriteLine()".to_string(),
            [one] => format!("Console.WriteLine({one})"),
            _ => format!("Console.WriteLine(string.Join(\" \", {}))", args.join(", ")),
        }
    }

    fn var_decl(&self, name: &str, ty: Option<&ModelType>, init: Option<String>) -> String {
        match (ty, init) {
            (Some(ty), Some(init)) => format!("{} {name} = {init}", self.type_name(ty)),
            (Some(ty), None) => format!("{} {name} = default", self.type_name(ty)),
            (None, Some(init)) => format!("var {name} = {init}"),
            (None, None) => format!("object {name} = null"),
        }
    }

    fn for_range(&self, var: &str, from: &str, to: &str) -> String {
        format!("for (var {var} = {from}; {var} < {to}; {var}++) {{")
    }

    fn for_each(&self, var: &str, iter: &str) -> String {
        format!("foreach (var {var} in {iter}) {{")
    }

    fn name(&self, name: &str, kind: NameKind) -> String {
        match kind {
            NameKind::Constant => format!("Constants.{name}"),
            NameKind::Procedure => match self.functions {
                Some(class) => format!("{class}.{name}"),
                None => name.to_string(),
            },
            NameKind::DataAccess => format!("_{}", camel(name)),
            _ => name.to_string(),
        }
    }
}

fn namespace_dir(namespace: &str) -> String {
    format!("src/{}", namespace.replace('.', "/"))
}

fn record(d: &CSharp, ns: &str, record: &DataType) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line(format!("namespace {ns}.Models;")).blank();
    if let Some(table) = &record.table {
        w.line(format!("/// <summary>Row of table {table}.</summary>"));
    }
    w.line(format!("public record {}", pascal(&record.name)));
    w.open("{");
    for field in &record.fields {
        let optional = if field.nullable { "?" } else { "" };
        w.line(format!(
            "public {}{optional} {} {{ get; init; }}",
            d.type_name(&field.ty),
            pascal(&field.name)
        ));
    }
    w.close("}");
    w.finish()
}

fn constants(d: &CSharp, ns: &str, model: &CodeModel) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line(format!("namespace {ns};")).blank();
    w.line("public static class Constants");
    w.open("{");
    for c in &model.constants {
        let value = c
            .value
            .as_ref()
            .map_or_else(|| "default".to_string(), |v| render_expr(d, v));
        w.line(format!(
            "public static readonly {} {} = {value};",
            d.type_name(&c.ty),
            c.name
        ));
    }
    w.close("}");
    w.finish()
}

fn procedures(w: &mut CodeWriter, d: &CSharp, model: &CodeModel) {
    for proc in model.procedures.iter().filter(|p| !p.is_entry) {
        w.blank();
        let params = d.params(proc.params.iter().map(|p| (p.name.as_str(), &p.ty)));
        w.line(format!(
            "public static {} {}({params})",
            d.returns(proc.returns.as_ref()),
            proc.name
        ));
        w.open("{");
        render_block(w, d, &proc.body);
        w.close("}");
    }
}

fn csproj(project: &ProjectConfig, sdk: &str, output_exe: bool, packages: &[(&str, &str)]) -> String {
    let framework = project.options.language_version.as_deref().unwrap_or("net8.0");
    let mut w = CodeWriter::new("  ");
    w.open(format!("<Project Sdk=\"{sdk}\">"));
    w.open("<PropertyGroup>");
    if output_exe {
        w.line("<OutputType>Exe</OutputType>");
    }
    w.line(format!("<TargetFramework>{framework}</TargetFramework>"));
    w.line("<Nullable>enable</Nullable>");
    w.line("<ImplicitUsings>enable</ImplicitUsings>");
    w.line(format!("<RootNamespace>{}</RootNamespace>", project.namespace()));
    w.line(format!("<Version>{}</Version>", project.version()));
    w.close("</PropertyGroup>");
    if !packages.is_empty() || !project.options.dependencies.is_empty() {
        w.open("<ItemGroup>");
        for (name, version) in packages {
            w.line(format!("<PackageReference Include=\"{name}\" Version=\"{version}\" />"));
        }
        for extra in &project.options.dependencies {
            let (name, version) = extra.split_once(':').unwrap_or((extra.as_str(), "*"));
            w.line(format!("<PackageReference Include=\"{name}\" Version=\"{version}\" />"));
        }
        w.close("</ItemGroup>");
    }
    w.close("</Project>");
    w.finish()
}

// =============================================================================
// Client
// =============================================================================

pub struct CSharpClient;

fn client_url(template: &str) -> String {
    let mut out = String::from("$\"{_baseUrl}");
    for part in url_parts(template) {
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

fn client(d: &CSharp, ns: &str, client: &ClientApi) -> String {
    let class = pascal(&client.name);
    let mut w = CodeWriter::new(INDENT);
    w.line("using System.Net.Http.Json;");
    w.line(format!("using {ns}.Models;")).blank();
    w.line(format!("namespace {ns}.Api;")).blank();
    w.line(format!("public class {class}"));
    w.open("{");
    w.line("private readonly HttpClient _http = new();");
    w.line("private string _baseUrl;").blank();
    w.line(format!(
        "public {class}(string baseUrl = \"{}\")",
        escape(&client.base_url)
    ));
    w.open("{");
    w.line("_baseUrl = baseUrl;");
    w.close("}").blank();
    w.line("public void SetServer(string baseUrl) => _baseUrl = baseUrl;");

    for call in &client.calls {
        w.blank();
        if let Some(comment) = &call.comment {
            w.line(format!("/// <summary>{comment}</summary>"));
        }
        let params = d.params(call.bindings.iter().map(|b| (b.name.as_str(), &b.ty)));
        let returns = call
            .returns
            .as_ref()
            .map_or_else(|| "Task".to_string(), |t| format!("Task<{}>", d.type_name(t)));
        w.line(format!("public async {returns} {}Async({params})", pascal(&call.name)));
        w.open("{");
        w.line(format!(
            "using var request = new HttpRequestMessage(new HttpMethod(\"{}\"), {});",
            call.method.as_str(),
            client_url(&url_template(&call.path, &call.bindings))
        ));
        if let Some(body) = body_binding(&call.bindings) {
            w.line(format!("request.Content = JsonContent.Create({});", body.name));
        }
        w.line("using var response = await _http.SendAsync(request);");
        w.line("response.EnsureSuccessStatusCode();");
        if let Some(ty) = &call.returns {
            w.line(format!(
                "return (await response.Content.ReadFromJsonAsync<{}>())!;",
                d.type_name(ty)
            ));
        }
        w.close("}");
    }
    w.close("}");
    w.finish()
}

impl PlatformGenerator for CSharpClient {
    fn key(&self) -> PlatformKey {
        PlatformKey::CSharp
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let d = CSharp { functions: None };
        let ns = project.namespace();
        let root = namespace_dir(&ns);
        let mut files = vec![GeneratedFile::new(
            format!("{root}/{}.csproj", ns),
            csproj(project, "Microsoft.NET.Sdk", true, &[]),
        )];
        for r in model.records() {
            files.push(GeneratedFile::new(
                format!("{root}/Models/{}.cs", pascal(&r.name)),
                record(&d, &ns, r),
            ));
        }
        for c in &model.clients {
            files.push(GeneratedFile::new(
                format!("{root}/Api/{}.cs", pascal(&c.name)),
                client(&d, &ns, c),
            ));
        }
        files.push(GeneratedFile::new(
            format!("{root}/Constants.cs"),
            constants(&d, &ns, model),
        ));

        let mut w = CodeWriter::new(INDENT);
        w.line(format!("using {ns}.Models;"));
        w.line(format!("using {ns}.Api;")).blank();
        w.line(format!("namespace {ns};")).blank();
        w.line("public static class Program");
        w.open("{");
        w.line("public static void Main(string[] args)");
        w.open("{");
        if let Some(entry) = model.entry() {
            render_block(&mut w, &d, &entry.body);
        }
        w.close("}");
        procedures(&mut w, &d, model);
        w.close("}");
        files.push(GeneratedFile::new(format!("{root}/Program.cs"), w.finish()));
        files
    }
}

// =============================================================================
// ASP.NET Core
// =============================================================================

pub struct AspNet;

fn mapper(d: &CSharp, ns: &str, mapper: &DataAccess) -> String {
    let class = pascal(&mapper.name);
    let mut w = CodeWriter::new(INDENT);
    w.line("using System.Data;");
    w.line("using Dapper;");
    w.line(format!("using {ns}.Models;")).blank();
    w.line(format!("namespace {ns}.Mappers;")).blank();
    w.line(format!("public class {class}"));
    w.open("{");
    w.line("private readonly IDbConnection _db;").blank();
    w.line(format!("public {class}(IDbConnection db)"));
    w.open("{");
    w.line("_db = db;");
    w.close("}");
    for op in &mapper.operations {
        w.blank();
        let params = d.params(op.params.iter().map(|p| (p.name.as_str(), &p.ty)));
        let sql = sql::rewrite_parameters(&op.sql, |name, _| format!("@{name}")).sql;
        let args = if op.params.is_empty() {
            String::new()
        } else {
            let names: Vec<&str> = op.params.iter().map(|p| p.name.as_str()).collect();
            format!(", new {{ {} }}", names.join(", "))
        };
        let literal = format!("\"{}\"", escape(&one_line(&sql)));
        match (&op.returns, op.kind) {
            (Some(ty), _) if ty.is_list() => {
                w.line(format!("public {} {}({params}) =>", d.type_name(ty), op.name));
                w.indent();
                w.line(format!(
                    "_db.Query<{}>({literal}{args}).ToList();",
                    d.type_name(ty.element())
                ));
                w.dedent();
            }
            (Some(ty), StatementKind::Select) => {
                w.line(format!("public {} {}({params}) =>", d.type_name(ty), op.name));
                w.indent();
                w.line(format!(
                    "_db.QueryFirstOrDefault<{}>({literal}{args})!;",
                    d.type_name(ty)
                ));
                w.dedent();
            }
            (Some(ty), _) => {
                w.line(format!("public {} {}({params}) =>", d.type_name(ty), op.name));
                w.indent();
                w.line(format!("_db.ExecuteScalar<{}>({literal}{args});", d.type_name(ty)));
                w.dedent();
            }
            (None, _) => {
                w.line(format!("public int {}({params}) =>", op.name));
                w.indent();
                w.line(format!("_db.Execute({literal}{args});"));
                w.dedent();
            }
        }
    }
    w.close("}");
    w.finish()
}

fn http_attribute(method: HttpMethod) -> &'static str {
    match method {
        HttpMethod::Get => "HttpGet",
        HttpMethod::Post => "HttpPost",
        HttpMethod::Put => "HttpPut",
        HttpMethod::Delete => "HttpDelete",
        HttpMethod::Patch => "HttpPatch",
        HttpMethod::Head => "HttpHead",
        HttpMethod::Options => "HttpOptions",
    }
}

fn controller(d: &CSharp, ns: &str, service: &Service) -> String {
    let class = pascal(&service.name);
    let mut mappers: Vec<String> = Vec::new();
    for route in &service.routes {
        for name in super::dialect::referenced(&route.body, NameKind::DataAccess) {
            if !mappers.contains(&name) {
                mappers.push(name);
            }
        }
    }

    let mut w = CodeWriter::new(INDENT);
    w.line("using Microsoft.AspNetCore.Mvc;");
    w.line(format!("using {ns}.Mappers;"));
    w.line(format!("using {ns}.Models;")).blank();
    w.line(format!("namespace {ns}.Controllers;")).blank();
    if let Some(comment) = &service.comment {
        w.line(format!("/// <summary>{comment}</summary>"));
    }
    w.line("[ApiController]");
    w.line(format!("public class {class} : ControllerBase"));
    w.open("{");
    for m in &mappers {
        w.line(format!("private readonly {} _{};", pascal(m), camel(m)));
    }
    let ctor: Vec<String> = mappers.iter().map(|m| format!("{} {}", pascal(m), camel(m))).collect();
    w.blank();
    w.line(format!("public {class}({})", ctor.join(", ")));
    w.open("{");
    for m in &mappers {
        w.line(format!("_{0} = {0};", camel(m)));
    }
    w.close("}");

    for route in &service.routes {
        w.blank();
        if let Some(comment) = &route.comment {
            w.line(format!("/// <summary>{comment}</summary>"));
        }
        w.line(format!("[{}(\"{}\")]", http_attribute(route.method), route.path));
        let params: Vec<String> = route
            .bindings
            .iter()
            .map(|b| {
                let from = match b.source {
                    BindingSource::Path => "FromRoute",
                    BindingSource::Body => "FromBody",
                    BindingSource::Query => "FromQuery",
                };
                format!("[{from}] {} {}", d.type_name(&b.ty), b.name)
            })
            .collect();
        let returns = route
            .returns
            .as_ref()
            .map_or_else(|| "void".to_string(), |t| format!("ActionResult<{}>", d.type_name(t)));
        w.line(format!("public {returns} {}({})", pascal(&route.handler), params.join(", ")));
        w.open("{");
        render_block(&mut w, d, &route.body);
        w.close("}");
    }
    w.close("}");
    w.finish()
}

impl PlatformGenerator for AspNet {
    fn key(&self) -> PlatformKey {
        PlatformKey::AspNet
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let d = CSharp {
            functions: Some("Functions"),
        };
        let ns = project.namespace();
        let root = namespace_dir(&ns);
        let mut files = vec![
            GeneratedFile::new(
                format!("{root}/{ns}.csproj"),
                csproj(
                    project,
                    "Microsoft.NET.Sdk.Web",
                    false,
                    &[("Dapper", "2.1.35"), ("Microsoft.Data.Sqlite", "8.0.6")],
                ),
            ),
            GeneratedFile::new(
                format!("{root}/appsettings.json"),
                "{\n  \"ConnectionStrings\": {\n    \"Default\": \"Data Source=app.db\"\n  },\n  \"Logging\": {\n    \"LogLevel\": {\n      \"Default\": \"Information\"\n    }\n  }\n}\n",
            ),
        ];
        for r in model.records() {
            files.push(GeneratedFile::new(
                format!("{root}/Models/{}.cs", pascal(&r.name)),
                record(&d, &ns, r),
            ));
        }
        for m in &model.mappers {
            files.push(GeneratedFile::new(
                format!("{root}/Mappers/{}.cs", pascal(&m.name)),
                mapper(&d, &ns, m),
            ));
        }
        for s in &model.services {
            files.push(GeneratedFile::new(
                format!("{root}/Controllers/{}.cs", pascal(&s.name)),
                controller(&d, &ns, s),
            ));
        }
        files.push(GeneratedFile::new(
            format!("{root}/Constants.cs"),
            constants(&d, &ns, model),
        ));

        let mut w = CodeWriter::new(INDENT);
        w.line(format!("using {ns}.Models;")).blank();
        w.line(format!("namespace {ns};")).blank();
        w.line("public static class Functions");
        w.open("{");
        w.line("public static void Run()");
        w.open("{");
        if let Some(entry) = model.entry() {
            render_block(&mut w, &d, &entry.body);
        }
        w.close("}");
        procedures(&mut w, &d, model);
        w.close("}");
        files.push(GeneratedFile::new(format!("{root}/Functions.cs"), w.finish()));

        let mut w = CodeWriter::new(INDENT);
        w.line("using System.Data;");
        w.line("using Microsoft.Data.Sqlite;");
        w.line(format!("using {ns};"));
        w.line(format!("using {ns}.Mappers;")).blank();
        w.line("var builder = WebApplication.CreateBuilder(args);");
        w.line("builder.Services.AddControllers();");
        w.line("builder.Services.AddScoped<IDbConnection>(_ =>");
        w.line(format!(
            "{INDENT}new SqliteConnection(builder.Configuration.GetConnectionString(\"Default\")));"
        ));
        for m in &model.mappers {
            w.line(format!("builder.Services.AddScoped<{}>();", pascal(&m.name)));
        }
        w.blank();
        w.line("var app = builder.Build();");
        w.line("app.MapControllers();");
        w.line("Functions.Run();");
        w.line("app.Run();");
        files.push(GeneratedFile::new(format!("{root}/Program.cs"), w.finish()));
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::Compiler;

    fn model_for(src: &str, key: PlatformKey) -> CodeModel {
        let mut compiler = Compiler::new(Some(key));
        compiler.compile_str(src, "dotnet.jssp").unwrap();
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
    fn aspnet_uses_dapper_parameters_and_route_attributes() {
        let src = "
            table tb_user { id bigint auto; name varchar(100); key(id); }
            mapper UserMapper {
                query selectAll() list<tb_user> { select * from tb_user }
                query remove(id bigint) { delete from tb_user where id = :id }
            }
            controller UserController {
                [method=delete, route='/users/{id}']
                func remove(id bigint) { UserMapper.remove(id); }
            }
        ";
        let model = model_for(src, PlatformKey::AspNet);
        let project = ProjectConfig::new("shop", PlatformKey::AspNet, "out");
        let files = AspNet.generate(&model, &project);

        let mapper = contents(&files, "src/Shop/Mappers/UserMapper.cs");
        assert!(mapper.contains("_db.Query<TbUser>(\"select * from tb_user\").ToList();"));
        assert!(mapper.contains("_db.Execute(\"delete from tb_user where id = @id\", new { id });"));

        let controller = contents(&files, "src/Shop/Controllers/UserController.cs");
        assert!(controller.contains("[HttpDelete(\"/users/{id}\")]"));
        assert!(controller.contains("public void Remove([FromRoute] long id)"));
        assert!(controller.contains("_userMapper.remove(id);"));
        contents(&files, "src/Shop/Shop.csproj");
    }

    #[test]
    fn csharp_client_interpolates_urls() {
        let src = "
            controller C {
                [method=get, route='/items/{id}']
                func item(id int, q string) string { return q; }
            }
            api ItemApi { C; }
        ";
        let model = model_for(src, PlatformKey::CSharp);
        let project = ProjectConfig::new("shop", PlatformKey::CSharp, "out");
        let files = CSharpClient.generate(&model, &project);
        let api = contents(&files, "src/Shop/Api/ItemApi.cs");
        assert!(api.contains("$\"{_baseUrl}/items/{id}?q={q}\""));
        assert!(api.contains("public async Task<string> ItemAsync(int id, string q)"));
    }
}
