//! Source text -> token array (spec §4.1).
use std::iter::Peekable;
use std::str::CharIndices;

use log::trace;

use crate::symbol::SymbolTable;
use crate::token::{Token, TokenKind};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{})", self.message, self.line, self.column)
    }
}

impl std::error::Error for LexError {}

pub type LexResult<T> = Result<T, LexError>;

pub struct Lexer<'a> {
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            tokens: Vec::with_capacity(256),
        }
    }

    /// Lex the whole source into a token array terminated by `Eof`.
    pub fn tokenize(source: &'a str, symbols: &mut SymbolTable) -> LexResult<Vec<Token>> {
        let mut lexer = Self::new(source);
        lexer.run(symbols)?;
        let (line, column) = (lexer.line, lexer.column);
        lexer.tokens.push(Token::new(TokenKind::Eof, "", line, column));
        Ok(lexer.tokens)
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn advance(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn run(&mut self, symbols: &mut SymbolTable) -> LexResult<()> {
        loop {
            self.skip_whitespace_and_comments()?;
            let Some(c) = self.peek_char() else {
                return Ok(());
            };
            match c {
                '\'' | '"' => self.lex_string(c)?,
                '0'..='9' => self.lex_number()?,
                c if is_identifier_start(c) => self.lex_identifier(symbols),
                _ => self.lex_operator_or_punctuation()?,
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> LexResult<()> {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    match ahead.peek() {
                        Some((_, '/')) => {
                            self.advance();
                            self.advance();
                            while !matches!(self.peek_char(), None | Some('\n')) {
                                self.advance();
                            }
                        }
                        Some((_, '*')) => {
                            let (start_line, start_col) = (self.line, self.column);
                            self.advance();
                            self.advance();
                            loop {
                                match self.peek_char() {
                                    None => {
                                        return Err(LexError {
                                            message: "unterminated block comment".to_owned(),
                                            line: start_line,
                                            column: start_col,
                                        });
                                    }
                                    Some('*') => {
                                        self.advance();
                                        if self.peek_char() == Some('/') {
                                            self.advance();
                                            break;
                                        }
                                    }
                                    Some(_) => {
                                        self.advance();
                                    }
                                }
                            }
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_string(&mut self, delimiter: char) -> LexResult<()> {
        let (line, column) = (self.line, self.column);
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(LexError {
                        message: "unterminated string literal".to_owned(),
                        line,
                        column,
                    });
                }
                Some(c) if c == delimiter => break,
                Some(c) => value.push(c),
            }
        }
        trace!("lexed string literal {value:?} at {line}:{column}");
        let lexeme = value.clone();
        let literal = Value::string(value).map_err(|_| LexError {
            message: "string literal exceeds maximum length".to_owned(),
            line,
            column,
        })?;
        self.tokens.push(
            Token::new(TokenKind::StringLiteral, lexeme, line, column).with_literal(literal),
        );
        Ok(())
    }

    fn lex_number(&mut self) -> LexResult<()> {
        let (line, column) = (self.line, self.column);
        let mut digits = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let value: i64 = digits.parse().map_err(|_| LexError {
            message: "integer literal out of range".to_owned(),
            line,
            column,
        })?;
        trace!("lexed number {value} at {line}:{column}");
        self.tokens.push(
            Token::new(TokenKind::Number, digits, line, column)
                .with_literal(Value::Integer(value)),
        );
        Ok(())
    }

    fn lex_identifier(&mut self, symbols: &mut SymbolTable) {
        let (line, column) = (self.line, self.column);
        let mut name = String::new();
        while let Some(c) = self.peek_char() {
            if is_identifier_continue(c) {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let token = match name.as_str() {
            "let" => Token::new(TokenKind::Let, name, line, column),
            "fn" => {
                let symbol = symbols.fresh();
                Token::new(TokenKind::Fn, name, line, column).with_symbol(symbol)
            }
            "if" => Token::new(TokenKind::If, name, line, column),
            "else" => Token::new(TokenKind::Else, name, line, column),
            "true" => {
                Token::new(TokenKind::True, name, line, column).with_literal(Value::Boolean(true))
            }
            "false" => Token::new(TokenKind::False, name, line, column)
                .with_literal(Value::Boolean(false)),
            "first" => Token::new(TokenKind::First, name, line, column),
            "second" => Token::new(TokenKind::Second, name, line, column),
            "print" => Token::new(TokenKind::Print, name, line, column),
            "cowsay" => Token::new(TokenKind::Cowsay, name, line, column),
            _ => {
                let symbol = symbols.intern(&name);
                Token::new(TokenKind::Identifier, name, line, column).with_symbol(symbol)
            }
        };
        trace!("lexed token {token:?}");
        self.tokens.push(token);
    }

    fn lex_operator_or_punctuation(&mut self) -> LexResult<()> {
        let (line, column) = (self.line, self.column);
        let c = self.advance().expect("caller already peeked a char");
        let two_char = |lexer: &mut Self, expected: char| {
            if lexer.peek_char() == Some(expected) {
                lexer.advance();
                true
            } else {
                false
            }
        };
        let (kind, lexeme): (TokenKind, String) = match c {
            '(' => (TokenKind::LParen, "(".into()),
            ')' => (TokenKind::RParen, ")".into()),
            '{' => (TokenKind::LBrace, "{".into()),
            '}' => (TokenKind::RBrace, "}".into()),
            ',' => (TokenKind::Comma, ",".into()),
            ';' => (TokenKind::Semicolon, ";".into()),
            '+' => (TokenKind::Plus, "+".into()),
            '-' => (TokenKind::Minus, "-".into()),
            '*' => (TokenKind::Star, "*".into()),
            '/' => (TokenKind::Slash, "/".into()),
            '%' => (TokenKind::Percent, "%".into()),
            '=' if two_char(self, '=') => (TokenKind::EqEq, "==".into()),
            '=' if two_char(self, '>') => (TokenKind::FatArrow, "=>".into()),
            '=' => (TokenKind::Eq, "=".into()),
            '!' if two_char(self, '=') => (TokenKind::NotEq, "!=".into()),
            '<' if two_char(self, '=') => (TokenKind::LtEq, "<=".into()),
            '<' => (TokenKind::Lt, "<".into()),
            '>' if two_char(self, '=') => (TokenKind::GtEq, ">=".into()),
            '>' => (TokenKind::Gt, ">".into()),
            '&' if two_char(self, '&') => (TokenKind::AndAnd, "&&".into()),
            '|' if two_char(self, '|') => (TokenKind::OrOr, "||".into()),
            other => {
                return Err(LexError {
                    message: format!("unknown character sequence starting with '{other}'"),
                    line,
                    column,
                });
            }
        };
        self.tokens.push(Token::new(kind, lexeme, line, column));
        Ok(())
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<TokenKind> {
        let mut symbols = SymbolTable::new();
        Lexer::tokenize(source, &mut symbols)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_let_binding() {
        assert_eq!(
            lex("let x = 42;"),
            vec![
                TokenKind::Let,
                TokenKind::Identifier,
                TokenKind::Eq,
                TokenKind::Number,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_line_and_block_comments() {
        assert_eq!(
            lex("// comment\n/* block\ncomment */ 1"),
            vec![TokenKind::Number, TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let mut symbols = SymbolTable::new();
        assert!(Lexer::tokenize("'oops", &mut symbols).is_err());
    }

    #[test]
    fn oversized_integer_literal_is_a_lex_error_not_a_panic() {
        let mut symbols = SymbolTable::new();
        // all-digit, so it still classifies as Number; it just overflows i64.
        let result = Lexer::tokenize("99999999999999999999999999", &mut symbols);
        assert!(result.is_err());
    }

    #[test]
    fn string_delimiters_are_symmetric() {
        let mut symbols = SymbolTable::new();
        let tokens = Lexer::tokenize(r#"'a' "b""#, &mut symbols).unwrap();
        assert_eq!(tokens[0].literal.as_ref().unwrap().render(), "a");
        assert_eq!(tokens[1].literal.as_ref().unwrap().render(), "b");
    }

    #[test]
    fn recognizes_multi_char_operators() {
        assert_eq!(
            lex("== != >= <= && || =>"),
            vec![
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::GtEq,
                TokenKind::LtEq,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::FatArrow,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tracks_line_and_column() {
        let mut symbols = SymbolTable::new();
        let tokens = Lexer::tokenize("let\nx", &mut symbols).unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 1));
    }

    #[test]
    fn block_comments_do_not_nest() {
        // The first `*/` closes the comment; the trailing `*/` is just
        // ordinary input, and lexes as the two separate operators `*`
        // and `/` rather than being swallowed as part of the comment.
        assert_eq!(
            lex("/* /* nested */ */"),
            vec![TokenKind::Star, TokenKind::Slash, TokenKind::Eof]
        );
    }
}
