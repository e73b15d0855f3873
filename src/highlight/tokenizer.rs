//! Regex-rule lexer producing a flat, contiguous token stream.
//!
//! This is a classifier for display, not a parser: each language is an
//! ordered list of anchored rules and the first rule that matches at the
//! current position wins. Anything no rule accepts becomes a one-char
//! [`TokenKind::Text`] token, so the stream always covers the whole input.

use regex::Regex;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Unclassified text (also the whole-document fallback).
    Text,
    Keyword,
    Identifier,
    String,
    Number,
    Comment,
    Operator,
    Punctuation,
    Whitespace,
}

/// A classified byte range of the tokenized snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub len: usize,
}

impl Token {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    PlainText,
    Rust,
    Python,
    JavaScript,
    C,
    Json,
    Toml,
    Shell,
}

impl Language {
    const LEXED: [Language; 7] = [
        Language::Rust,
        Language::Python,
        Language::JavaScript,
        Language::C,
        Language::Json,
        Language::Toml,
        Language::Shell,
    ];

    /// Resolves a language name, a bare extension, or a file path.
    /// Anything unrecognized is plain text.
    pub fn from_hint(hint: &str) -> Self {
        let hint = hint.trim();
        let lower = hint.to_ascii_lowercase();
        if let Some(language) = Self::from_name(&lower).or_else(|| Self::from_extension(&lower)) {
            return language;
        }
        Path::new(hint)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| Self::from_extension(&ext.to_ascii_lowercase()))
            .unwrap_or(Language::PlainText)
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "rust" => Language::Rust,
            "python" => Language::Python,
            "javascript" | "typescript" => Language::JavaScript,
            "c++" => Language::C,
            "json" => Language::Json,
            "shell" | "bash" => Language::Shell,
            "text" | "plain" | "plaintext" => Language::PlainText,
            _ => return None,
        })
    }

    fn from_extension(ext: &str) -> Option<Self> {
        Some(match ext {
            "rs" => Language::Rust,
            "py" | "pyw" | "pyi" => Language::Python,
            "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" => Language::JavaScript,
            "c" | "h" | "cc" | "cpp" | "cxx" | "hpp" | "hh" => Language::C,
            "json" => Language::Json,
            "toml" => Language::Toml,
            "sh" | "bash" | "zsh" => Language::Shell,
            _ => return None,
        })
    }

    /// The compiled lexer, or `None` for plain text.
    fn lexer(self) -> Option<Result<&'static Lexer, regex::Error>> {
        static LEXERS: OnceLock<HashMap<Language, Result<Lexer, regex::Error>>> = OnceLock::new();
        let lexers = LEXERS.get_or_init(|| {
            Self::LEXED
                .iter()
                .map(|&language| (language, Lexer::for_language(language)))
                .collect()
        });
        lexers.get(&self).map(|lexer| lexer.as_ref().map_err(Clone::clone))
    }
}

/// A single anchored lexing rule.
#[derive(Debug, Clone)]
struct LexRule {
    regex: Regex,
    kind: TokenKind,
}

impl LexRule {
    fn new(pattern: &str, kind: TokenKind) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(&format!("^(?:{})", pattern))?,
            kind,
        })
    }

    fn keywords(words: &[&str]) -> Result<Self, regex::Error> {
        Self::new(&format!(r"(?:{})\b", words.join("|")), TokenKind::Keyword)
    }
}

const WHITESPACE: &str = r"\s+";
const NUMBER: &str = r"(?:0[xX][0-9a-fA-F_]+|0[bB][01_]+|\d[\d_]*(?:\.\d[\d_]*)?(?:[eE][+-]?\d+)?)[A-Za-z0-9_]*";
const IDENTIFIER: &str = r"[A-Za-z_][A-Za-z0-9_]*";
const OPERATOR: &str = r"[-+*/%=<>!&|^~?:.]+";
const PUNCTUATION: &str = r"[()\[\]{},;@#$\\]";
const LINE_COMMENT_SLASH: &str = r"//[^\n]*";
const LINE_COMMENT_HASH: &str = r"#[^\n]*";
const BLOCK_COMMENT: &str = r"/\*(?s:.*?)(?:\*/|\z)";
// Unterminated strings run to the end of input rather than failing.
const DOUBLE_QUOTED: &str = r#""(?:(?s:\\.)|[^"\\])*"?"#;
const SINGLE_QUOTED: &str = r"'(?:(?s:\\.)|[^'\\\n])*'?";

#[derive(Debug, Clone)]
struct Lexer {
    rules: Vec<LexRule>,
}

impl Lexer {
    fn for_language(language: Language) -> Result<Self, regex::Error> {
        use TokenKind::*;
        let rules = match language {
            Language::PlainText => Vec::new(),
            Language::Rust => vec![
                LexRule::new(WHITESPACE, Whitespace)?,
                LexRule::new(LINE_COMMENT_SLASH, Comment)?,
                LexRule::new(BLOCK_COMMENT, Comment)?,
                LexRule::new(r##"r#+"(?s:.*?)"#+|b?r"[^"]*"?"##, String)?,
                LexRule::new(&format!("b?{}", DOUBLE_QUOTED), String)?,
                // Char literals need the closing quote so lifetimes stay out.
                LexRule::new(r"b?'(?:\\.|[^'\\\n])'", String)?,
                LexRule::new(NUMBER, Number)?,
                LexRule::keywords(&[
                    "as", "async", "await", "break", "const", "continue", "crate", "dyn",
                    "else", "enum", "extern", "false", "fn", "for", "if", "impl", "in",
                    "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return",
                    "self", "Self", "static", "struct", "super", "trait", "true", "type",
                    "unsafe", "use", "where", "while",
                ])?,
                LexRule::new(IDENTIFIER, Identifier)?,
                LexRule::new(OPERATOR, Operator)?,
                LexRule::new(PUNCTUATION, Punctuation)?,
            ],
            Language::Python => vec![
                LexRule::new(WHITESPACE, Whitespace)?,
                LexRule::new(LINE_COMMENT_HASH, Comment)?,
                LexRule::new(
                    r#"[rRbBfFuU]{0,2}(?:"""(?s:.*?)(?:"""|\z)|'''(?s:.*?)(?:'''|\z))"#,
                    String,
                )?,
                LexRule::new(
                    &format!(r#"[rRbBfFuU]{{0,2}}(?:{}|{})"#, DOUBLE_QUOTED, SINGLE_QUOTED),
                    String,
                )?,
                LexRule::new(NUMBER, Number)?,
                LexRule::keywords(&[
                    "False", "None", "True", "and", "as", "assert", "async", "await",
                    "break", "class", "continue", "def", "del", "elif", "else", "except",
                    "finally", "for", "from", "global", "if", "import", "in", "is",
                    "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
                    "while", "with", "yield",
                ])?,
                LexRule::new(IDENTIFIER, Identifier)?,
                LexRule::new(OPERATOR, Operator)?,
                LexRule::new(PUNCTUATION, Punctuation)?,
            ],
            Language::JavaScript => vec![
                LexRule::new(WHITESPACE, Whitespace)?,
                LexRule::new(LINE_COMMENT_SLASH, Comment)?,
                LexRule::new(BLOCK_COMMENT, Comment)?,
                LexRule::new(DOUBLE_QUOTED, String)?,
                LexRule::new(SINGLE_QUOTED, String)?,
                LexRule::new(r"`(?:(?s:\\.)|[^`\\])*`?", String)?,
                LexRule::new(NUMBER, Number)?,
                LexRule::keywords(&[
                    "async", "await", "break", "case", "catch", "class", "const",
                    "continue", "debugger", "default", "delete", "do", "else", "enum",
                    "export", "extends", "false", "finally", "for", "function", "if",
                    "implements", "import", "in", "instanceof", "interface", "let", "new",
                    "null", "return", "super", "switch", "this", "throw", "true", "try",
                    "type", "typeof", "undefined", "var", "void", "while", "with", "yield",
                ])?,
                LexRule::new(r"[A-Za-z_$][A-Za-z0-9_$]*", Identifier)?,
                LexRule::new(OPERATOR, Operator)?,
                LexRule::new(PUNCTUATION, Punctuation)?,
            ],
            Language::C => vec![
                LexRule::new(WHITESPACE, Whitespace)?,
                LexRule::new(LINE_COMMENT_SLASH, Comment)?,
                LexRule::new(BLOCK_COMMENT, Comment)?,
                LexRule::new(r"#[ \t]*[A-Za-z_]+", Keyword)?,
                LexRule::new(DOUBLE_QUOTED, String)?,
                LexRule::new(SINGLE_QUOTED, String)?,
                LexRule::new(NUMBER, Number)?,
                LexRule::keywords(&[
                    "auto", "bool", "break", "case", "char", "class", "const", "continue",
                    "default", "delete", "do", "double", "else", "enum", "extern", "false",
                    "float", "for", "goto", "if", "inline", "int", "long", "namespace",
                    "new", "nullptr", "private", "protected", "public", "register",
                    "return", "short", "signed", "sizeof", "static", "struct", "switch",
                    "template", "this", "true", "typedef", "typename", "union", "unsigned",
                    "using", "virtual", "void", "volatile", "while",
                ])?,
                LexRule::new(IDENTIFIER, Identifier)?,
                LexRule::new(OPERATOR, Operator)?,
                LexRule::new(PUNCTUATION, Punctuation)?,
            ],
            Language::Json => vec![
                LexRule::new(WHITESPACE, Whitespace)?,
                LexRule::new(DOUBLE_QUOTED, String)?,
                LexRule::new(r"-?(?:0|[1-9]\d*)(?:\.\d+)?(?:[eE][+-]?\d+)?", Number)?,
                LexRule::keywords(&["true", "false", "null"])?,
                LexRule::new(r"[{}\[\],:]", Punctuation)?,
            ],
            Language::Toml => vec![
                LexRule::new(WHITESPACE, Whitespace)?,
                LexRule::new(LINE_COMMENT_HASH, Comment)?,
                LexRule::new(r"\[\[?[^\]\n]*\]\]?", Keyword)?,
                LexRule::new(r#""""(?s:.*?)(?:"""|\z)|'''(?s:.*?)(?:'''|\z)"#, String)?,
                LexRule::new(DOUBLE_QUOTED, String)?,
                LexRule::new(r"'[^'\n]*'?", String)?,
                LexRule::keywords(&["true", "false"])?,
                LexRule::new(r"[+-]?(?:inf|nan)\b|[+-]?\d[\d_:.\-+eETZ]*", Number)?,
                LexRule::new(r"[A-Za-z0-9_-]+", Identifier)?,
                LexRule::new(r"[=.]", Operator)?,
                LexRule::new(r"[{},\[\]]", Punctuation)?,
            ],
            Language::Shell => vec![
                LexRule::new(WHITESPACE, Whitespace)?,
                LexRule::new(LINE_COMMENT_HASH, Comment)?,
                LexRule::new(DOUBLE_QUOTED, String)?,
                LexRule::new(r"'[^']*'?", String)?,
                LexRule::new(r"\$\{[^}\n]*\}?|\$[A-Za-z_][A-Za-z0-9_]*|\$[0-9#?@*$!-]", Identifier)?,
                LexRule::keywords(&[
                    "case", "do", "done", "elif", "else", "esac", "export", "fi", "for",
                    "function", "if", "in", "local", "return", "then", "until", "while",
                ])?,
                LexRule::new(r"\d+\b", Number)?,
                LexRule::new(r"[A-Za-z_][A-Za-z0-9_.-]*", Identifier)?,
                LexRule::new(r"[|&;<>!=]+", Operator)?,
                LexRule::new(r"[()\[\]{}\\]", Punctuation)?,
            ],
        };
        Ok(Self { rules })
    }

    fn run(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut pos = 0;
        while pos < text.len() {
            let rest = &text[pos..];
            let (kind, len) = self
                .rules
                .iter()
                .find_map(|rule| {
                    rule.regex
                        .find(rest)
                        .filter(|m| m.end() > 0)
                        .map(|m| (rule.kind, m.end()))
                })
                .unwrap_or_else(|| {
                    let len = rest.chars().next().map_or(1, char::len_utf8);
                    (TokenKind::Text, len)
                });
            tokens.push(Token {
                kind,
                start: pos,
                len,
            });
            pos += len;
        }
        tokens
    }
}

/// One `Text` token over the whole input (none for empty input).
pub fn plain_tokens(text: &str) -> Vec<Token> {
    if text.is_empty() {
        return Vec::new();
    }
    vec![Token {
        kind: TokenKind::Text,
        start: 0,
        len: text.len(),
    }]
}

/// Tokenizes `text` for display.
///
/// Never fails: texts over `max_bytes` yield no tokens, unknown languages
/// and any lexer failure yield [`plain_tokens`].
pub fn tokenize(text: &str, language_hint: &str, max_bytes: usize) -> Vec<Token> {
    if text.len() > max_bytes {
        tracing::debug!(
            "Skipping tokenization of {} bytes (limit {})",
            text.len(),
            max_bytes
        );
        return Vec::new();
    }

    let language = Language::from_hint(language_hint);
    let lexer = match language.lexer() {
        None => return plain_tokens(text),
        Some(Ok(lexer)) => lexer,
        Some(Err(e)) => {
            tracing::warn!("Lexer for {:?} failed to build: {}", language, e);
            return plain_tokens(text);
        }
    };

    match panic::catch_unwind(AssertUnwindSafe(|| lexer.run(text))) {
        Ok(tokens) => tokens,
        Err(_) => {
            tracing::warn!("Lexer for {:?} panicked; falling back to plain text", language);
            plain_tokens(text)
        }
    }
}
