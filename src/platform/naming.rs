//! Identifier case conversion for generated code.

/// Split an identifier into lowercase words at `_`, `-`, spaces and case
/// boundaries (`selectById` → `select`, `by`, `id`; `HTTPServer` → `http`, `server`).
pub fn words(ident: &str) -> Vec<String> {
    let chars: Vec<char> = ident.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `tb_user` → `TbUser`.
pub fn pascal(ident: &str) -> String {
    words(ident).iter().map(|w| capitalize(w)).collect()
}

/// `UserMapper` → `userMapper`.
pub fn camel(ident: &str) -> String {
    let mut parts = words(ident).into_iter();
    match parts.next() {
        Some(first) => first + &parts.map(|w| capitalize(&w)).collect::<String>(),
        None => String::new(),
    }
}

/// `selectById` → `select_by_id`.
pub fn snake(ident: &str) -> String {
    words(ident).join("_")
}

/// `UserPage` → `user-page`.
pub fn kebab(ident: &str) -> String {
    words(ident).join("-")
}

/// `appName` → `APP_NAME`.
pub fn screaming(ident: &str) -> String {
    snake(ident).to_uppercase()
}

/// Escape text for a double-quoted string literal in C-like languages.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// Collapse a multi-line SQL body onto one line.
pub fn one_line(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_mixed_identifiers() {
        assert_eq!(words("selectById"), vec!["select", "by", "id"]);
        assert_eq!(words("tb_user"), vec!["tb", "user"]);
        assert_eq!(words("HTTPServer"), vec!["http", "server"]);
    }

    #[test]
    fn conversions() {
        assert_eq!(pascal("tb_user"), "TbUser");
        assert_eq!(camel("UserMapper"), "userMapper");
        assert_eq!(snake("selectById"), "select_by_id");
        assert_eq!(kebab("UserPage"), "user-page");
        assert_eq!(screaming("appName"), "APP_NAME");
    }

    #[test]
    fn escapes_quotes_and_newlines() {
        assert_eq!(escape("say \"hi\"\n"), "say \\\"hi\\\"\\n");
        assert_eq!(one_line("select id\n    from t\n"), "select id from t");
    }
}
