//! Lightweight scanning of raw SQL query bodies.
//!
//! Only what lowering needs is recognized: `:name` bind parameters, the
//! statement kind, and the top-level select list with its source tables.
//! String literals, quoted identifiers, `--` comments and `::` casts are
//! skipped so they never produce parameters.

/// Kind of SQL statement, from its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl StatementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Other => "other",
        }
    }
}

pub fn statement_kind(sql: &str) -> StatementKind {
    let first = words(sql).into_iter().next().unwrap_or_default();
    match first.to_ascii_lowercase().as_str() {
        "select" | "with" => StatementKind::Select,
        "insert" | "replace" => StatementKind::Insert,
        "update" => StatementKind::Update,
        "delete" => StatementKind::Delete,
        _ => StatementKind::Other,
    }
}

/// SQL rewritten with `?` placeholders plus the parameter name of each
/// placeholder in order. A name used twice appears twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionalSql {
    pub sql: String,
    pub bind_order: Vec<String>,
}

/// Bind parameter names in order of first appearance.
pub fn bind_parameters(sql: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in to_positional(sql).bind_order {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

pub fn to_positional(sql: &str) -> PositionalSql {
    rewrite_parameters(sql, |_, _| "?".to_string())
}

/// Replace every `:name` parameter with `placeholder(name, index)`, where
/// `index` counts placeholders from zero.
pub fn rewrite_parameters(
    sql: &str,
    mut placeholder: impl FnMut(&str, usize) -> String,
) -> PositionalSql {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut bind_order = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '\'' | '"' | '`' => {
                let end = skip_quoted(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = chars[i..]
                    .iter()
                    .position(|&c| c == '\n')
                    .map_or(chars.len(), |p| i + p);
                out.extend(&chars[i..end]);
                i = end;
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            ':' if chars.get(i + 1).is_some_and(|c| c.is_alphabetic() || *c == '_') => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                out.push_str(&placeholder(&name, bind_order.len()));
                bind_order.push(name);
                i = end;
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }

    PositionalSql {
        sql: out,
        bind_order,
    }
}

/// Index one past the closing quote of the literal starting at `start`.
/// Doubled quotes inside the literal are escapes.
fn skip_quoted(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

/// One entry of a select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectColumn {
    /// `col`, `t.col`, optionally aliased.
    Column {
        qualifier: Option<String>,
        name: String,
        alias: Option<String>,
    },
    /// `*` or `t.*`.
    Star { qualifier: Option<String> },
    /// Any other expression; `name` is its alias or a derived name.
    Expr {
        name: String,
        function: Option<String>,
    },
}

impl SelectColumn {
    /// Name the column carries in the result set.
    pub fn output_name(&self) -> Option<&str> {
        match self {
            Self::Column { name, alias, .. } => Some(alias.as_deref().unwrap_or(name)),
            Self::Star { .. } => None,
            Self::Expr { name, .. } => Some(name),
        }
    }
}

/// A table in the `from`/`join` clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSource {
    pub name: String,
    pub alias: Option<String>,
}

impl TableSource {
    pub fn matches(&self, qualifier: &str) -> bool {
        self.alias.as_deref() == Some(qualifier) || self.name == qualifier
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectList {
    pub columns: Vec<SelectColumn>,
    pub tables: Vec<TableSource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Word(String),
    Punct(char),
    Literal,
}

impl Tok {
    fn is_word(&self, kw: &str) -> bool {
        matches!(self, Tok::Word(w) if w.eq_ignore_ascii_case(kw))
    }

    fn text(&self) -> String {
        match self {
            Tok::Word(w) => w.clone(),
            Tok::Punct(c) => c.to_string(),
            Tok::Literal => "?".to_string(),
        }
    }
}

const CLAUSE_END: &[&str] = &[
    "where", "group", "order", "limit", "having", "union", "offset", "on", "using", "join",
    "inner", "left", "right", "full", "cross", "outer", "natural", "for",
];

fn tokenize(sql: &str) -> Vec<Tok> {
    let chars: Vec<char> = sql.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() {
            i += 1;
        } else if ch == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if ch == '\'' {
            i = skip_quoted(&chars, i);
            toks.push(Tok::Literal);
        } else if ch == '"' || ch == '`' {
            // Quoted identifier.
            let end = skip_quoted(&chars, i);
            let inner: String = chars[i + 1..end.saturating_sub(1).max(i + 1)].iter().collect();
            toks.push(Tok::Word(inner));
            i = end;
        } else if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '.' | ':'))
            {
                i += 1;
            }
            // `t.*` stays one word.
            if chars.get(i) == Some(&'*') && chars[i - 1] == '.' {
                i += 1;
            }
            toks.push(Tok::Word(chars[start..i].iter().collect()));
        } else {
            toks.push(Tok::Punct(ch));
            i += 1;
        }
    }
    toks
}

fn words(sql: &str) -> Vec<String> {
    tokenize(sql)
        .into_iter()
        .filter_map(|t| match t {
            Tok::Word(w) => Some(w),
            _ => None,
        })
        .collect()
}

/// Parse the outermost select list. Returns `None` for non-select statements.
pub fn select_columns(sql: &str) -> Option<SelectList> {
    let toks = tokenize(sql);

    let mut depth = 0i32;
    let mut select_at = None;
    for (i, tok) in toks.iter().enumerate() {
        match tok {
            Tok::Punct('(') => depth += 1,
            Tok::Punct(')') => depth -= 1,
            t if depth == 0 && t.is_word("select") => {
                select_at = Some(i);
                break;
            }
            _ => {}
        }
    }
    let mut i = select_at? + 1;
    if toks.get(i).is_some_and(|t| t.is_word("distinct") || t.is_word("all")) {
        i += 1;
    }

    let mut items: Vec<Vec<Tok>> = vec![Vec::new()];
    depth = 0;
    while i < toks.len() {
        let tok = &toks[i];
        match tok {
            Tok::Punct('(') => depth += 1,
            Tok::Punct(')') => depth -= 1,
            Tok::Punct(',') if depth == 0 => {
                items.push(Vec::new());
                i += 1;
                continue;
            }
            Tok::Punct(';') if depth == 0 => break,
            t if depth == 0 && t.is_word("from") => break,
            _ => {}
        }
        if let Some(item) = items.last_mut() {
            item.push(tok.clone());
        }
        i += 1;
    }

    let columns = items
        .into_iter()
        .filter(|item| !item.is_empty())
        .map(select_item)
        .collect();

    let tables = if i < toks.len() && toks[i].is_word("from") {
        table_sources(&toks[i + 1..])
    } else {
        Vec::new()
    };

    Some(SelectList { columns, tables })
}

fn select_item(item: Vec<Tok>) -> SelectColumn {
    let (body, alias) = split_alias(&item);

    if let [Tok::Punct('*')] = body {
        return SelectColumn::Star { qualifier: None };
    }
    if let [Tok::Word(word)] = body {
        if let Some(qualifier) = word.strip_suffix(".*") {
            return SelectColumn::Star {
                qualifier: Some(qualifier.to_string()),
            };
        }
        let (qualifier, name) = match word.rsplit_once('.') {
            Some((q, n)) => (Some(q.to_string()), n.to_string()),
            None => (None, word.clone()),
        };
        return SelectColumn::Column {
            qualifier,
            name,
            alias,
        };
    }

    let function = match body {
        [Tok::Word(f), Tok::Punct('('), ..] => Some(f.to_ascii_lowercase()),
        _ => None,
    };
    let name = alias.unwrap_or_else(|| match &function {
        Some(f) => f.clone(),
        None => body.iter().map(Tok::text).collect::<String>(),
    });
    SelectColumn::Expr { name, function }
}

/// Split a trailing `as alias` or bare alias off a select item.
fn split_alias(item: &[Tok]) -> (&[Tok], Option<String>) {
    let n = item.len();
    if n >= 3 && item[n - 2].is_word("as") {
        if let Tok::Word(alias) = &item[n - 1] {
            return (&item[..n - 2], Some(alias.clone()));
        }
    }
    if n >= 2 {
        if let Tok::Word(alias) = &item[n - 1] {
            let implicit = matches!(item[n - 2], Tok::Word(_) | Tok::Punct(')'))
                && !alias.contains('.');
            if implicit {
                return (&item[..n - 1], Some(alias.clone()));
            }
        }
    }
    (item, None)
}

fn table_sources(toks: &[Tok]) -> Vec<TableSource> {
    let mut tables = Vec::new();
    let mut expect_table = true;
    let mut depth = 0i32;
    let mut i = 0;

    while i < toks.len() {
        let tok = &toks[i];
        match tok {
            Tok::Punct('(') => {
                depth += 1;
                i += 1;
                continue;
            }
            Tok::Punct(')') => {
                depth -= 1;
                i += 1;
                continue;
            }
            _ if depth > 0 => {
                i += 1;
                continue;
            }
            Tok::Punct(';') => break,
            Tok::Punct(',') => expect_table = true,
            t if t.is_word("join") => expect_table = true,
            t if ["where", "group", "order", "limit", "having", "union"]
                .iter()
                .any(|kw| t.is_word(kw)) =>
            {
                break
            }
            Tok::Word(name) if expect_table => {
                let mut alias = None;
                let mut next = i + 1;
                if toks.get(next).is_some_and(|t| t.is_word("as")) {
                    next += 1;
                }
                if let Some(Tok::Word(a)) = toks.get(next) {
                    if !CLAUSE_END.iter().any(|kw| a.eq_ignore_ascii_case(kw)) {
                        alias = Some(a.clone());
                        i = next;
                    }
                }
                tables.push(TableSource {
                    name: name.clone(),
                    alias,
                });
                expect_table = false;
            }
            _ => {}
        }
        i += 1;
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn positional_rewrite() {
        let p = to_positional("select * from tb_user where id = :id and name = :name or id = :id");
        assert_eq!(
            p.sql,
            "select * from tb_user where id = ? and name = ? or id = ?"
        );
        assert_eq!(p.bind_order, vec!["id", "name", "id"]);
    }

    #[test]
    fn numbered_placeholders() {
        let p = rewrite_parameters("update t set a = :a where id = :id", |_, i| format!("${}", i + 1));
        assert_eq!(p.sql, "update t set a = $1 where id = $2");
        assert_eq!(p.bind_order, vec!["a".to_string(), "id".to_string()]);
    }

    #[test]
    fn parameters_skip_literals_comments_and_casts() {
        let sql = "select ':nope', created::date -- :ignored\nfrom t where a = :real";
        assert_eq!(bind_parameters(sql), vec!["real".to_string()]);
        let p = to_positional(sql);
        assert!(p.sql.contains("':nope'"));
        assert!(p.sql.contains("created::date"));
    }

    #[test]
    fn statement_kinds() {
        assert_eq!(statement_kind("SELECT 1"), StatementKind::Select);
        assert_eq!(statement_kind("with x as (select 1) select * from x"), StatementKind::Select);
        assert_eq!(statement_kind("insert into t values(:a)"), StatementKind::Insert);
        assert_eq!(statement_kind("update t set a = 1"), StatementKind::Update);
        assert_eq!(statement_kind("delete from t"), StatementKind::Delete);
        assert_eq!(statement_kind("create table t(a int)"), StatementKind::Other);
    }

    #[test]
    fn select_list_with_aliases_and_joins() {
        let list = select_columns(
            "select u.id, u.name as username, o.total amount, count(*) as n \
             from tb_user u join tb_order as o on o.user_id = u.id where u.id = :id",
        )
        .unwrap();

        assert_eq!(
            list.columns,
            vec![
                SelectColumn::Column {
                    qualifier: Some("u".to_string()),
                    name: "id".to_string(),
                    alias: None
                },
                SelectColumn::Column {
                    qualifier: Some("u".to_string()),
                    name: "name".to_string(),
                    alias: Some("username".to_string())
                },
                SelectColumn::Column {
                    qualifier: Some("o".to_string()),
                    name: "total".to_string(),
                    alias: Some("amount".to_string())
                },
                SelectColumn::Expr {
                    name: "n".to_string(),
                    function: Some("count".to_string())
                },
            ]
        );
        assert_eq!(
            list.tables,
            vec![
                TableSource {
                    name: "tb_user".to_string(),
                    alias: Some("u".to_string())
                },
                TableSource {
                    name: "tb_order".to_string(),
                    alias: Some("o".to_string())
                },
            ]
        );
    }

    #[test]
    fn star_and_qualified_star() {
        let list = select_columns("select *, t.* from tb_user t, tb_role").unwrap();
        assert_eq!(
            list.columns,
            vec![
                SelectColumn::Star { qualifier: None },
                SelectColumn::Star {
                    qualifier: Some("t".to_string())
                },
            ]
        );
        assert_eq!(list.tables.len(), 2);
        assert_eq!(list.tables[1].alias, None);
    }

    #[test]
    fn subquery_commas_stay_inside_items() {
        let list = select_columns("select id, coalesce(a, b) as v from t").unwrap();
        assert_eq!(list.columns.len(), 2);
        assert_eq!(list.columns[1].output_name(), Some("v"));
    }

    #[test]
    fn non_select_has_no_list() {
        assert_eq!(select_columns("delete from t where id = :id"), None);
    }
}
