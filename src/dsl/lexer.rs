//! Lexer for the jssp DSL.
//!
//! Converts source text into a stream of [`Token`]s. Two constructs are lexed
//! contextually: `[key=value, ...]` becomes a single annotation token, and the
//! brace-delimited body following a `query` or `html` header becomes a raw
//! block token carrying the verbatim text.

use std::path::{Path, PathBuf};

use super::ast::AnnotationValue;
use super::error::CompileError;
use super::token::{keyword, Position, Token, TokenKind};

/// Kind of raw block the next `{` opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawMode {
    Sql,
    Markup,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    file: PathBuf,
    raw: Option<RawMode>,
}

impl Lexer {
    pub fn new(source: &str, file: &Path) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            file: file.to_path_buf(),
            raw: None,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_trivia()?;

            let pos = self.here();
            if self.is_at_end() {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    pos,
                });
                break;
            }

            let ch = self.peek();
            let kind = match ch {
                '{' => match self.raw.take() {
                    Some(mode) => self.lex_raw_block(mode)?,
                    None => self.single(TokenKind::LBrace),
                },
                '}' => self.single(TokenKind::RBrace),
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                ':' => self.single(TokenKind::Colon),
                ';' => self.single(TokenKind::Semi),
                ',' => self.single(TokenKind::Comma),
                '@' => self.single(TokenKind::At),
                '+' => self.single(TokenKind::Plus),
                '-' => self.single(TokenKind::Minus),
                '*' => self.single(TokenKind::Star),
                '/' => self.single(TokenKind::Slash),
                '%' => self.single(TokenKind::Percent),
                '<' => self.one_or_two('=', TokenKind::Lt, TokenKind::Le),
                '>' => self.one_or_two('=', TokenKind::Gt, TokenKind::Ge),
                '=' => self.one_or_two('=', TokenKind::Eq, TokenKind::EqEq),
                '!' => self.one_or_two('=', TokenKind::Bang, TokenKind::NotEq),
                '&' => self.pair('&', TokenKind::AndAnd)?,
                '|' => self.pair('|', TokenKind::OrOr)?,
                '.' => self.one_or_two('.', TokenKind::Dot, TokenKind::DotDot),
                '"' | '\'' => TokenKind::Str(self.read_quoted()?),
                '[' => self.lex_annotation()?,
                '0'..='9' => self.lex_number()?,
                c if c.is_alphabetic() || c == '_' => self.lex_word(),
                _ => {
                    return Err(self.error(pos, "a token", format!("'{ch}'")));
                }
            };

            tokens.push(Token { kind, pos });
        }

        Ok(tokens)
    }

    fn peek(&self) -> char {
        self.chars[self.pos]
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> char {
        let ch = self.chars[self.pos];
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        ch
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn here(&self) -> Position {
        Position::new(self.line, self.col)
    }

    fn error(&self, pos: Position, expected: &str, found: String) -> CompileError {
        CompileError::Syntax {
            file: self.file.clone(),
            position: pos,
            expected: expected.to_string(),
            found,
        }
    }

    fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            while !self.is_at_end() && self.peek().is_whitespace() {
                self.advance();
            }
            if self.is_at_end() || self.peek() != '/' {
                return Ok(());
            }
            match self.peek_next() {
                Some('/') => {
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance();
                    }
                }
                Some('*') => {
                    let start = self.here();
                    self.advance();
                    self.advance();
                    loop {
                        if self.is_at_end() {
                            return Err(self.error(start, "'*/'", "end of file".to_string()));
                        }
                        if self.peek() == '*' && self.peek_next() == Some('/') {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn one_or_two(&mut self, second: char, one: TokenKind, two: TokenKind) -> TokenKind {
        self.advance();
        if !self.is_at_end() && self.peek() == second {
            self.advance();
            two
        } else {
            one
        }
    }

    fn pair(&mut self, second: char, kind: TokenKind) -> Result<TokenKind, CompileError> {
        let pos = self.here();
        let first = self.advance();
        if !self.is_at_end() && self.peek() == second {
            self.advance();
            Ok(kind)
        } else {
            Err(self.error(pos, &format!("'{first}{second}'"), format!("'{first}'")))
        }
    }

    /// Read a quoted string starting at the current quote character.
    fn read_quoted(&mut self) -> Result<String, CompileError> {
        let start = self.here();
        let quote = self.advance();
        let mut s = String::new();
        loop {
            if self.is_at_end() {
                return Err(self.error(
                    start,
                    &format!("closing {quote}"),
                    "end of file".to_string(),
                ));
            }
            let ch = self.advance();
            if ch == quote {
                return Ok(s);
            }
            if ch == '\\' && !self.is_at_end() {
                let escaped = self.advance();
                s.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
            } else {
                s.push(ch);
            }
        }
    }

    fn lex_number(&mut self) -> Result<TokenKind, CompileError> {
        let pos = self.here();
        let mut s = String::new();
        while !self.is_at_end() && self.peek().is_ascii_digit() {
            s.push(self.advance());
        }

        // A single '.' followed by a digit is a fraction; '..' is a range.
        let is_float = !self.is_at_end()
            && self.peek() == '.'
            && self.peek_next().is_some_and(|c| c.is_ascii_digit());
        if is_float {
            s.push(self.advance());
            while !self.is_at_end() && self.peek().is_ascii_digit() {
                s.push(self.advance());
            }
            let val: f64 = s
                .parse()
                .map_err(|_| self.error(pos, "a number", format!("'{s}'")))?;
            return Ok(TokenKind::Number(val));
        }

        let val: i64 = s
            .parse()
            .map_err(|_| self.error(pos, "an integer", format!("'{s}'")))?;
        Ok(TokenKind::Integer(val))
    }

    fn lex_word(&mut self) -> TokenKind {
        let mut s = String::new();
        while !self.is_at_end() && (self.peek().is_alphanumeric() || self.peek() == '_') {
            s.push(self.advance());
        }

        match keyword(&s) {
            Some(kind) => {
                match kind {
                    TokenKind::Query => self.raw = Some(RawMode::Sql),
                    TokenKind::Html => self.raw = Some(RawMode::Markup),
                    _ => {}
                }
                kind
            }
            None => TokenKind::Ident(s),
        }
    }

    /// Capture a brace-balanced raw body. The opening brace is consumed and
    /// the closing brace is not part of the text.
    fn lex_raw_block(&mut self, mode: RawMode) -> Result<TokenKind, CompileError> {
        let start = self.here();
        self.advance(); // consume '{'
        let mut depth = 1usize;
        let mut text = String::new();
        let mut quote: Option<char> = None;

        while !self.is_at_end() {
            let ch = self.advance();
            if let Some(q) = quote {
                if ch == q {
                    quote = None;
                }
                text.push(ch);
                continue;
            }
            match ch {
                '\'' if mode == RawMode::Sql => quote = Some(ch),
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(TokenKind::RawBlock(text.trim().to_string()));
                    }
                }
                _ => {}
            }
            text.push(ch);
        }

        Err(self.error(start, "'}'", "end of file".to_string()))
    }

    /// Lex `[key=value, ...]` into an annotation token.
    fn lex_annotation(&mut self) -> Result<TokenKind, CompileError> {
        self.advance(); // consume '['
        let mut pairs = Vec::new();

        loop {
            self.skip_inline_space();
            if self.is_at_end() {
                return Err(self.error(self.here(), "']'", "end of file".to_string()));
            }
            if self.peek() == ']' {
                self.advance();
                return Ok(TokenKind::Annotation(pairs));
            }

            let key_pos = self.here();
            let key = self.read_while(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
            if key.is_empty() {
                return Err(self.error(key_pos, "annotation key", format!("'{}'", self.peek())));
            }
            self.skip_inline_space();

            let value = if !self.is_at_end() && self.peek() == '=' {
                self.advance();
                self.skip_inline_space();
                self.read_annotation_value()?
            } else {
                // A bare key is a flag.
                AnnotationValue::Bool(true)
            };
            pairs.push((key, value));

            self.skip_inline_space();
            if self.is_at_end() {
                return Err(self.error(self.here(), "']'", "end of file".to_string()));
            }
            match self.peek() {
                ',' => {
                    self.advance();
                }
                ']' => {}
                other => {
                    return Err(self.error(self.here(), "',' or ']'", format!("'{other}'")));
                }
            }
        }
    }

    fn read_annotation_value(&mut self) -> Result<AnnotationValue, CompileError> {
        if self.is_at_end() {
            return Err(self.error(self.here(), "annotation value", "end of file".to_string()));
        }
        if matches!(self.peek(), '"' | '\'') {
            return Ok(AnnotationValue::Str(self.read_quoted()?));
        }

        let pos = self.here();
        let raw = self.read_while(|c| c != ',' && c != ']' && c != '\n');
        let word = raw.trim();
        if word.is_empty() {
            return Err(self.error(pos, "annotation value", "nothing".to_string()));
        }
        let value = match word {
            "true" => AnnotationValue::Bool(true),
            "false" => AnnotationValue::Bool(false),
            _ => {
                if let Ok(n) = word.parse::<i64>() {
                    AnnotationValue::Int(n)
                } else if let Ok(n) = word.parse::<f64>() {
                    AnnotationValue::Float(n)
                } else {
                    AnnotationValue::Str(word.to_string())
                }
            }
        };
        Ok(value)
    }

    fn skip_inline_space(&mut self) {
        while !self.is_at_end() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    fn read_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut s = String::new();
        while !self.is_at_end() && pred(self.peek()) {
            s.push(self.advance());
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<TokenKind> {
        Lexer::new(src, Path::new("test.jssp"))
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lex_table_header() {
        let tokens = lex("table tb_user {");
        assert_eq!(tokens[0], TokenKind::Table);
        assert_eq!(tokens[1], TokenKind::Ident("tb_user".to_string()));
        assert_eq!(tokens[2], TokenKind::LBrace);
        assert_eq!(tokens[3], TokenKind::Eof);
    }

    #[test]
    fn lex_annotation_block() {
        let tokens = lex("[method=get, route='/users/{id}', id=100, secure]");
        match &tokens[0] {
            TokenKind::Annotation(pairs) => {
                assert_eq!(pairs.len(), 4);
                assert_eq!(pairs[0], ("method".to_string(), AnnotationValue::Str("get".to_string())));
                assert_eq!(
                    pairs[1],
                    ("route".to_string(), AnnotationValue::Str("/users/{id}".to_string()))
                );
                assert_eq!(pairs[2], ("id".to_string(), AnnotationValue::Int(100)));
                assert_eq!(pairs[3], ("secure".to_string(), AnnotationValue::Bool(true)));
            }
            other => panic!("expected Annotation, got {other:?}"),
        }
    }

    #[test]
    fn lex_empty_annotation() {
        assert_eq!(lex("[]")[0], TokenKind::Annotation(vec![]));
    }

    #[test]
    fn lex_query_body_is_raw() {
        let tokens = lex("query selectById(id bigint) UserVo { select id from tb_user where id = :id; }");
        assert_eq!(tokens[0], TokenKind::Query);
        assert_eq!(tokens.last(), Some(&TokenKind::Eof));
        assert!(tokens.contains(&TokenKind::RawBlock(
            "select id from tb_user where id = :id;".to_string()
        )));
    }

    #[test]
    fn raw_sql_ignores_braces_in_strings() {
        let tokens = lex("query q() { select '}' from t; }");
        assert!(tokens.contains(&TokenKind::RawBlock("select '}' from t;".to_string())));
    }

    #[test]
    fn lex_html_body_keeps_nested_braces() {
        let tokens = lex("html Home { <h1>{{ title }}</h1> }");
        assert_eq!(tokens[0], TokenKind::Html);
        assert_eq!(
            tokens[2],
            TokenKind::RawBlock("<h1>{{ title }}</h1>".to_string())
        );
    }

    #[test]
    fn lex_operators() {
        let tokens = lex("a <= b && c != d || !e .. f.g");
        assert_eq!(tokens[1], TokenKind::Le);
        assert_eq!(tokens[3], TokenKind::AndAnd);
        assert_eq!(tokens[5], TokenKind::NotEq);
        assert_eq!(tokens[7], TokenKind::OrOr);
        assert_eq!(tokens[8], TokenKind::Bang);
        assert_eq!(tokens[10], TokenKind::DotDot);
        assert_eq!(tokens[12], TokenKind::Dot);
    }

    #[test]
    fn lex_numbers_and_ranges() {
        assert_eq!(lex("0.95")[0], TokenKind::Number(0.95));
        let range = lex("0..10");
        assert_eq!(range[0], TokenKind::Integer(0));
        assert_eq!(range[1], TokenKind::DotDot);
        assert_eq!(range[2], TokenKind::Integer(10));
    }

    #[test]
    fn lex_strings_with_both_quotes() {
        assert_eq!(lex("'a\\'b'")[0], TokenKind::Str("a'b".to_string()));
        assert_eq!(lex("\"hi\\n\"")[0], TokenKind::Str("hi\n".to_string()));
    }

    #[test]
    fn lex_comments() {
        let tokens = lex("func /* block */ main // trailing\n()");
        assert_eq!(tokens[0], TokenKind::Func);
        assert_eq!(tokens[1], TokenKind::Ident("main".to_string()));
        assert_eq!(tokens[2], TokenKind::LParen);
    }

    #[test]
    fn lex_line_tracking() {
        let tokens = Lexer::new("func\n  main", Path::new("t.jssp"))
            .tokenize()
            .unwrap();
        assert_eq!(tokens[0].pos, Position::new(1, 1));
        assert_eq!(tokens[1].pos, Position::new(2, 3));
    }

    #[test]
    fn lex_error_on_unexpected_char() {
        let err = Lexer::new("func main() { # }", Path::new("t.jssp"))
            .tokenize()
            .unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }));
    }

    #[test]
    fn lex_unclosed_string_error() {
        assert!(Lexer::new("'abc", Path::new("t.jssp")).tokenize().is_err());
    }

    #[test]
    fn lex_unclosed_raw_block_error() {
        assert!(Lexer::new("query q() { select 1", Path::new("t.jssp"))
            .tokenize()
            .is_err());
    }

    #[test]
    fn lex_empty_input() {
        assert_eq!(lex(""), vec![TokenKind::Eof]);
    }
}
