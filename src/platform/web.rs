//! Vue 3 and React single-page applications built with Vite.

use super::naming::pascal;
use super::node::{self, Js};
use super::writer::CodeWriter;
use super::{GeneratedFile, PlatformGenerator, PlatformKey};
use crate::build::{CodeModel, Markup, PageComponent};
use crate::config::ProjectConfig;

const INDENT: &str = "  ";

const VOID_TAGS: &[&str] = &[
    "area", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

const GLOBALS: &[&str] = &["true", "false", "null", "undefined", "this", "new", "typeof"];

/// Leading identifiers of every interpolation, in first-use order.
fn state_names(nodes: &[Markup], out: &mut Vec<String>) {
    for node in nodes {
        match node {
            Markup::Interpolation(expr) => {
                let root: String = expr
                    .trim()
                    .chars()
                    .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
                    .collect();
                let usable = root.chars().next().is_some_and(|c| !c.is_ascii_digit());
                if usable && !GLOBALS.contains(&root.as_str()) && !out.contains(&root) {
                    out.push(root);
                }
            }
            Markup::Element { children, .. } => state_names(children, out),
            Markup::Text(_) => {}
        }
    }
}

fn components(nodes: &[Markup], out: &mut Vec<String>) {
    for node in nodes {
        if let Markup::Element {
            tag,
            children,
            component,
            ..
        } = node
        {
            if *component && !out.contains(tag) {
                out.push(tag.clone());
            }
            components(children, out);
        }
    }
}

/// Pages this page pulls in: components, then its parent and layout.
fn page_imports(page: &PageComponent) -> Vec<String> {
    let mut names = Vec::new();
    components(&page.markup, &mut names);
    for wrapper in [&page.parent, &page.layout].into_iter().flatten() {
        if !names.contains(wrapper) {
            names.push(wrapper.clone());
        }
    }
    names.retain(|n| *n != page.name);
    names
}

/// Parent and layout wrap the page body, layout outermost.
fn wrappers(page: &PageComponent) -> Vec<String> {
    [&page.layout, &page.parent]
        .into_iter()
        .flatten()
        .map(|n| pascal(n))
        .collect()
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn attr_value(value: &str) -> String {
    value.replace('"', "&quot;")
}

fn index_html(project: &ProjectConfig, entry: &str, mount: &str) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line("<!DOCTYPE html>");
    w.open("<html lang=\"en\">");
    w.open("<head>");
    w.line("<meta charset=\"UTF-8\" />");
    w.line("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\" />");
    w.line(format!("<title>{}</title>", html_escape(project.label())));
    w.close("</head>");
    w.open("<body>");
    w.line(format!("<div id=\"{mount}\"></div>"));
    w.line(format!("<script type=\"module\" src=\"{entry}\"></script>"));
    w.close("</body>");
    w.close("</html>");
    w.finish()
}

fn vite_config(plugin_import: &str, plugin: &str) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line("import { defineConfig } from \"vite\";");
    w.line(format!("import {plugin} from \"{plugin_import}\";"));
    w.blank();
    w.open("export default defineConfig({");
    w.line(format!("plugins: [{plugin}()],"));
    w.close("});");
    w.finish()
}

/// Files both frameworks share: models, clients and free functions.
fn shared_sources(model: &CodeModel, files: &mut Vec<GeneratedFile>) {
    let d = Js { typed: true };
    files.push(GeneratedFile::new("src/models.ts", node::models(&d, model)));
    if !model.clients.is_empty() {
        files.push(GeneratedFile::new("src/api.ts", node::clients(&d, model)));
    }
    if !model.procedures.is_empty() || !model.constants.is_empty() {
        let mut w = CodeWriter::new(INDENT);
        if !model.clients.is_empty() {
            let names: Vec<String> = model.clients.iter().map(|c| pascal(&c.name)).collect();
            w.line(format!("import {{ {} }} from \"./api\";", names.join(", ")));
        }
        node::functions(&mut w, &d, model, true);
        files.push(GeneratedFile::new("src/functions.ts", w.finish()));
    }
}

// =============================================================================
// Vue
// =============================================================================

pub struct Vue;

fn vue_markup(w: &mut CodeWriter, node: &Markup) {
    match node {
        Markup::Text(text) => {
            w.line(html_escape(text));
        }
        Markup::Interpolation(expr) => {
            w.line(format!("{{{{ {expr} }}}}"));
        }
        Markup::Element {
            tag,
            attrs,
            children,
            component,
        } => {
            let tag = if *component { pascal(tag) } else { tag.clone() };
            let mut open = format!("<{tag}");
            for (name, value) in attrs {
                match value {
                    Some(value) => open.push_str(&format!(" {name}=\"{}\"", attr_value(value))),
                    None => open.push_str(&format!(" {name}")),
                }
            }
            if children.is_empty() && (*component || VOID_TAGS.contains(&tag.as_str()) || tag == "slot") {
                w.line(format!("{open} />"));
            } else if children.is_empty() {
                w.line(format!("{open}></{tag}>"));
            } else {
                w.open(format!("{open}>"));
                for child in children {
                    vue_markup(w, child);
                }
                w.close(format!("</{tag}>"));
            }
        }
    }
}

fn vue_page(page: &PageComponent) -> String {
    let mut w = CodeWriter::new(INDENT);
    let wrappers = wrappers(page);
    w.open("<template>");
    for wrapper in &wrappers {
        w.open(format!("<{wrapper}>"));
    }
    for node in &page.markup {
        vue_markup(&mut w, node);
    }
    for wrapper in wrappers.iter().rev() {
        w.close(format!("</{wrapper}>"));
    }
    w.close("</template>");
    w.blank();

    w.line("<script setup lang=\"ts\">");
    let mut state = Vec::new();
    state_names(&page.markup, &mut state);
    if !state.is_empty() {
        w.line("import { ref } from \"vue\";");
    }
    for name in page_imports(page) {
        w.line(format!(
            "import {} from \"./{}.vue\";",
            pascal(&name),
            pascal(&name)
        ));
    }
    if !state.is_empty() {
        w.blank();
    }
    for name in &state {
        match (name.as_str(), &page.title) {
            ("title", Some(title)) => {
                w.line(format!("const title = ref<any>(\"{}\");", title.replace('"', "\\\"")));
            }
            _ => {
                w.line(format!("const {name} = ref<any>(null);"));
            }
        }
    }
    w.line("</script>");
    w.finish()
}

fn vue_router(model: &CodeModel) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line("import { createRouter, createWebHistory } from \"vue-router\";");
    w.blank();
    w.open("export const router = createRouter({");
    w.line("history: createWebHistory(),");
    w.open("routes: [");
    for page in model.pages.iter().filter(|p| p.route.is_some()) {
        let route = page.route.as_deref().unwrap_or("/");
        let title = page.title.as_deref().unwrap_or(&page.name);
        w.line(format!(
            "{{ path: \"{route}\", component: () => import(\"./pages/{}.vue\"), meta: {{ title: \"{}\" }} }},",
            pascal(&page.name),
            title.replace('"', "\\\"")
        ));
    }
    w.close("],");
    w.close("});");
    w.blank();
    w.open("router.afterEach((to) => {");
    w.line("document.title = (to.meta.title as string | undefined) ?? document.title;");
    w.close("});");
    w.finish()
}

impl PlatformGenerator for Vue {
    fn key(&self) -> PlatformKey {
        PlatformKey::VueJs
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let mut files = vec![
            GeneratedFile::new(
                "package.json",
                node::package_json(
                    project,
                    "src/main.ts",
                    &[("dev", "vite"), ("build", "vue-tsc && vite build"), ("preview", "vite preview")],
                    &[("vue", "^3.4.27"), ("vue-router", "^4.3.2")],
                    &[
                        ("@vitejs/plugin-vue", "^5.0.4"),
                        ("typescript", "^5.4.0"),
                        ("vite", "^5.2.0"),
                        ("vue-tsc", "^2.0.19"),
                    ],
                ),
            ),
            GeneratedFile::new("tsconfig.json", node::tsconfig()),
            GeneratedFile::new("vite.config.ts", vite_config("@vitejs/plugin-vue", "vue")),
            GeneratedFile::new("index.html", index_html(project, "/src/main.ts", "app")),
            GeneratedFile::new(
                "src/env.d.ts",
                "/// <reference types=\"vite/client\" />\n\ndeclare module \"*.vue\" {\n  import type { DefineComponent } from \"vue\";\n  const component: DefineComponent<object, object, any>;\n  export default component;\n}\n",
            ),
        ];
        shared_sources(model, &mut files);
        for page in &model.pages {
            files.push(GeneratedFile::new(
                format!("src/pages/{}.vue", pascal(&page.name)),
                vue_page(page),
            ));
        }
        files.push(GeneratedFile::new("src/router.ts", vue_router(model)));
        files.push(GeneratedFile::new(
            "src/App.vue",
            "<template>\n  <router-view />\n</template>\n",
        ));

        let mut w = CodeWriter::new(INDENT);
        w.line("import { createApp } from \"vue\";");
        w.line("import App from \"./App.vue\";");
        w.line("import { router } from \"./router\";");
        if model.entry().is_some() {
            w.line("import { main } from \"./functions\";");
            w.blank();
            w.line("main();");
        }
        w.blank();
        w.line("createApp(App).use(router).mount(\"#app\");");
        files.push(GeneratedFile::new("src/main.ts", w.finish()));
        files
    }
}

// =============================================================================
// React
// =============================================================================

pub struct React;

fn jsx_attr_name(name: &str) -> String {
    match name {
        "class" => "className".to_string(),
        "for" => "htmlFor".to_string(),
        "tabindex" => "tabIndex".to_string(),
        "readonly" => "readOnly".to_string(),
        other => match other.strip_prefix("on") {
            Some(event) if !event.is_empty() && event.chars().all(|c| c.is_ascii_lowercase()) => {
                format!("on{}", pascal(event))
            }
            _ => other.to_string(),
        },
    }
}

fn jsx_text(text: &str) -> String {
    if text.contains(['{', '}', '<', '>']) {
        format!("{{\"{}\"}}", text.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        text.to_string()
    }
}

fn jsx_markup(w: &mut CodeWriter, node: &Markup) {
    match node {
        Markup::Text(text) => {
            w.line(jsx_text(text));
        }
        Markup::Interpolation(expr) => {
            w.line(format!("{{{expr}}}"));
        }
        Markup::Element {
            tag,
            attrs,
            children,
            component,
        } => {
            if tag == "slot" {
                w.line("{children}");
                return;
            }
            let tag = if *component { pascal(tag) } else { tag.clone() };
            let mut open = format!("<{tag}");
            for (name, value) in attrs {
                let name = jsx_attr_name(name);
                match value {
                    Some(value) => open.push_str(&format!(" {name}=\"{}\"", attr_value(value))),
                    None => open.push_str(&format!(" {name}")),
                }
            }
            if children.is_empty() {
                w.line(format!("{open} />"));
            } else {
                w.open(format!("{open}>"));
                for child in children {
                    jsx_markup(w, child);
                }
                w.close(format!("</{tag}>"));
            }
        }
    }
}

fn react_page(page: &PageComponent) -> String {
    let mut w = CodeWriter::new(INDENT);
    let mut state = Vec::new();
    state_names(&page.markup, &mut state);
    let mut react = vec!["type ReactNode"];
    if !state.is_empty() {
        react.push("useState");
    }
    w.line(format!("import {{ {} }} from \"react\";", react.join(", ")));
    for name in page_imports(page) {
        w.line(format!(
            "import {} from \"./{}\";",
            pascal(&name),
            pascal(&name)
        ));
    }
    w.blank();
    w.open(format!(
        "export default function {}({{ children }}: {{ children?: ReactNode }}) {{",
        pascal(&page.name)
    ));
    for name in &state {
        let init = match (name.as_str(), &page.title) {
            ("title", Some(title)) => format!("\"{}\"", title.replace('"', "\\\"")),
            _ => "null".to_string(),
        };
        w.line(format!("const [{name}] = useState<any>({init});"));
    }
    w.open("return (");
    let wrappers = wrappers(page);
    w.open("<>");
    for wrapper in &wrappers {
        w.open(format!("<{wrapper}>"));
    }
    for node in &page.markup {
        jsx_markup(&mut w, node);
    }
    for wrapper in wrappers.iter().rev() {
        w.close(format!("</{wrapper}>"));
    }
    w.close("</>");
    w.close(");");
    w.close("}");
    w.finish()
}

fn react_app(model: &CodeModel) -> String {
    let mut w = CodeWriter::new(INDENT);
    w.line("import { BrowserRouter, Route, Routes } from \"react-router-dom\";");
    let routed: Vec<&PageComponent> = model.pages.iter().filter(|p| p.route.is_some()).collect();
    for page in &routed {
        w.line(format!(
            "import {} from \"./pages/{}\";",
            pascal(&page.name),
            pascal(&page.name)
        ));
    }
    w.blank();
    w.open("export default function App() {");
    w.open("return (");
    w.open("<BrowserRouter>");
    w.open("<Routes>");
    for page in &routed {
        w.line(format!(
            "<Route path=\"{}\" element={{<{} />}} />",
            page.route.as_deref().unwrap_or("/"),
            pascal(&page.name)
        ));
    }
    w.close("</Routes>");
    w.close("</BrowserRouter>");
    w.close(");");
    w.close("}");
    w.finish()
}

impl PlatformGenerator for React {
    fn key(&self) -> PlatformKey {
        PlatformKey::React
    }

    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile> {
        let mut files = vec![
            GeneratedFile::new(
                "package.json",
                node::package_json(
                    project,
                    "src/main.tsx",
                    &[("dev", "vite"), ("build", "tsc && vite build"), ("preview", "vite preview")],
                    &[
                        ("react", "^18.3.1"),
                        ("react-dom", "^18.3.1"),
                        ("react-router-dom", "^6.23.1"),
                    ],
                    &[
                        ("@types/react", "^18.3.3"),
                        ("@types/react-dom", "^18.3.0"),
                        ("@vitejs/plugin-react", "^4.3.0"),
                        ("typescript", "^5.4.0"),
                        ("vite", "^5.2.0"),
                    ],
                ),
            ),
            GeneratedFile::new("tsconfig.json", node::tsconfig()),
            GeneratedFile::new("vite.config.ts", vite_config("@vitejs/plugin-react", "react")),
            GeneratedFile::new("index.html", index_html(project, "/src/main.tsx", "root")),
        ];
        shared_sources(model, &mut files);
        for page in &model.pages {
            files.push(GeneratedFile::new(
                format!("src/pages/{}.tsx", pascal(&page.name)),
                react_page(page),
            ));
        }
        files.push(GeneratedFile::new("src/App.tsx", react_app(model)));

        let mut w = CodeWriter::new(INDENT);
        w.line("import { StrictMode } from \"react\";");
        w.line("import { createRoot } from \"react-dom/client\";");
        w.line("import App from \"./App\";");
        if model.entry().is_some() {
            w.line("import { main } from \"./functions\";");
            w.blank();
            w.line("main();");
        }
        w.blank();
        w.open("createRoot(document.getElementById(\"root\")!).render(");
        w.open("<StrictMode>");
        w.line("<App />");
        w.close("</StrictMode>,");
        w.close(");");
        files.push(GeneratedFile::new("src/main.tsx", w.finish()));
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::Compiler;

    fn model_for(src: &str, key: PlatformKey) -> CodeModel {
        let mut compiler = Compiler::new(Some(key));
        compiler.compile_str(src, "web.jssp").unwrap();
        crate::build::lower(&mut compiler).unwrap()
    }

    fn contents<'a>(files: &'a [GeneratedFile], path: &str) -> &'a str {
        files
            .iter()
            .find(|f| f.path.to_string_lossy() == path)
            .map(|f| f.contents.as_str())
            .unwrap_or_else(|| panic!("missing {path}"))
    }

    const PAGES: &str = "
        html UserCard { <div class=\"card\">card</div> }
        [route='/users', title='Users']
        html UserPage { <div class=\"page\"><h1>{{ title }}</h1><UserCard/></div> }
    ";

    #[test]
    fn vue_pages_keep_template_syntax() {
        let model = model_for(PAGES, PlatformKey::VueJs);
        let project = ProjectConfig::new("site", PlatformKey::VueJs, "out");
        let files = Vue.generate(&model, &project);
        let page = contents(&files, "src/pages/UserPage.vue");
        assert!(page.contains("<div class=\"page\">"));
        assert!(page.contains("{{ title }}"));
        assert!(page.contains("<UserCard />"));
        assert!(page.contains("import UserCard from \"./UserCard.vue\";"));
        assert!(page.contains("const title = ref<any>(\"Users\");"));
        let router = contents(&files, "src/router.ts");
        assert!(router.contains("path: \"/users\", component: () => import(\"./pages/UserPage.vue\")"));
        assert!(!router.contains("UserCard.vue"));
    }

    #[test]
    fn react_pages_use_jsx_attributes() {
        let model = model_for(PAGES, PlatformKey::React);
        let project = ProjectConfig::new("site", PlatformKey::React, "out");
        let files = React.generate(&model, &project);
        let page = contents(&files, "src/pages/UserPage.tsx");
        assert!(page.contains("<div className=\"page\">"));
        assert!(page.contains("{title}"));
        assert!(page.contains("const [title] = useState<any>(\"Users\");"));
        let app = contents(&files, "src/App.tsx");
        assert!(app.contains("<Route path=\"/users\" element={<UserPage />} />"));
    }

    #[test]
    fn event_attributes_are_camel_cased() {
        assert_eq!(jsx_attr_name("onclick"), "onClick");
        assert_eq!(jsx_attr_name("class"), "className");
        assert_eq!(jsx_attr_name("id"), "id");
    }
}
