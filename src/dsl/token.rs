//! Token types for the jssp lexer.

use std::fmt;

use super::ast::AnnotationValue;

/// A line/column position in a source file (both 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Position,
}

/// The kind of token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Declaration keywords
    Import,
    Domain,
    Table,
    Entity,
    Struct,
    Mapper,
    Query,
    Controller,
    Api,
    Html,
    Property,
    Func,

    // Statement keywords
    Var,
    If,
    Else,
    While,
    For,
    In,
    Return,
    Break,
    Continue,
    True,
    False,
    Null,

    // Literals
    Ident(String),
    Str(String),
    Integer(i64),
    Number(f64),

    /// `[key=value, ...]` annotation block, already split into pairs.
    Annotation(Vec<(String, AnnotationValue)>),
    /// Verbatim body of a `query` or `html` block, braces stripped.
    RawBlock(String),

    // Delimiters
    LBrace,
    RBrace,
    LParen,
    RParen,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    Eq,
    Bang,
    AndAnd,
    OrOr,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Colon,
    Semi,
    Comma,
    Dot,
    DotDot,
    At,

    Eof,
}

impl TokenKind {
    /// Human-readable description used in syntax errors.
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Str(s) => format!("string '{s}'"),
            Self::Integer(n) => format!("integer {n}"),
            Self::Number(n) => format!("number {n}"),
            Self::Annotation(_) => "annotation block".to_string(),
            Self::RawBlock(_) => "raw block".to_string(),
            Self::Eof => "end of file".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Domain => "domain",
            Self::Table => "table",
            Self::Entity => "entity",
            Self::Struct => "struct",
            Self::Mapper => "mapper",
            Self::Query => "query",
            Self::Controller => "controller",
            Self::Api => "api",
            Self::Html => "html",
            Self::Property => "property",
            Self::Func => "func",
            Self::Var => "var",
            Self::If => "if",
            Self::Else => "else",
            Self::While => "while",
            Self::For => "for",
            Self::In => "in",
            Self::Return => "return",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::True => "true",
            Self::False => "false",
            Self::Null => "null",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::Eq => "=",
            Self::Bang => "!",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Colon => ":",
            Self::Semi => ";",
            Self::Comma => ",",
            Self::Dot => ".",
            Self::DotDot => "..",
            Self::At => "@",
            Self::Ident(_)
            | Self::Str(_)
            | Self::Integer(_)
            | Self::Number(_)
            | Self::Annotation(_)
            | Self::RawBlock(_)
            | Self::Eof => "",
        }
    }
}

/// Map a word to its keyword token, if it is one.
pub fn keyword(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "import" => TokenKind::Import,
        "domain" => TokenKind::Domain,
        "table" => TokenKind::Table,
        "entity" => TokenKind::Entity,
        "struct" => TokenKind::Struct,
        "mapper" => TokenKind::Mapper,
        "query" => TokenKind::Query,
        "controller" => TokenKind::Controller,
        "api" => TokenKind::Api,
        "html" => TokenKind::Html,
        "property" => TokenKind::Property,
        "func" => TokenKind::Func,
        "var" => TokenKind::Var,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "return" => TokenKind::Return,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        _ => return None,
    };
    Some(kind)
}
