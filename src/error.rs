//! The error reporter (spec §4.6/§7): a single formatted diagnostic type
//! every lexical, syntactic, type, arithmetic, resource, and lookup
//! error funnels through. All errors are fatal - there is no recovery.
use std::fmt::{self, Display};

use colored::Colorize;

use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lexical,
    Syntactic,
    Type,
    Arithmetic,
    Resource,
    Lookup,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Lexical => "lexical",
            ErrorKind::Syntactic => "syntactic",
            ErrorKind::Type => "type",
            ErrorKind::Arithmetic => "arithmetic",
            ErrorKind::Resource => "resource",
            ErrorKind::Lookup => "lookup",
        };
        f.write_str(name)
    }
}

/// A fatal runtime error, carrying the offending token and enough
/// context to render the spec's diagnostic: label, message, context,
/// source line, and caret.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    pub file: String,
    pub token: Token,
    pub depth: usize,
    /// The full source line the offending token sits on, for rendering
    /// the caret line.
    pub source_line: String,
}

impl RuntimeError {
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        file: &str,
        token: &Token,
        depth: usize,
        source: &str,
    ) -> Self {
        let source_line = source
            .lines()
            .nth(token.line.saturating_sub(1))
            .unwrap_or("")
            .to_owned();
        Self {
            kind,
            message: message.into(),
            file: file.to_owned(),
            token: token.clone(),
            depth,
            source_line,
        }
    }
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} ({lexeme:?}, {kind}, {file}, {line}:{col}, depth {depth})",
            "Error:".red().bold(),
            self.message,
            lexeme = self.token.lexeme,
            kind = self.kind,
            file = self.file,
            line = self.token.line,
            col = self.token.column,
            depth = self.depth,
        )?;
        writeln!(f, "{}", self.source_line)?;
        let caret_col = self.token.column.saturating_sub(1);
        writeln!(f, "{}{}", " ".repeat(caret_col), "^".red().bold())
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    #[test]
    fn formats_message_and_caret() {
        let token = Token::new(TokenKind::Identifier, "x", 1, 5);
        let err = RuntimeError::new(
            ErrorKind::Lookup,
            "undefined identifier 'x'",
            "script.zy",
            &token,
            0,
            "print(x);",
        );
        let rendered = err.to_string();
        assert!(rendered.contains("undefined identifier 'x'"));
        assert!(rendered.contains("script.zy"));
        assert!(rendered.contains("print(x);"));
    }
}
