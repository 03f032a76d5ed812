use std::fmt::Display;

use crate::ast::Literal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Single-character tokens.
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Minus,
    Plus,
    Slash,
    Star,
    Percent,
    Ampersand,
    Pipe,
    Caret,
    Tilde,

    // One or two character tokens.
    DotDot,
    StarStar,
    Arrow,
    FatArrow,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    GreaterGreater,
    Less,
    LessEqual,
    LessLess,

    // Literals.
    Identifier,
    StringLiteral,
    Integer,
    Real,

    // Keywords.
    And,
    As,
    Break,
    Catch,
    Class,
    Elif,
    Else,
    False,
    For,
    Fun,
    If,
    Import,
    In,
    Loop,
    Nil,
    Not,
    Operator,
    Or,
    Return,
    Struct,
    Throw,
    True,
    Try,
    While,

    EOF,
}

/// Every reserved word of the language. Variables can never be bound to one of these.
pub const KEYWORDS: &[(&str, TokenType)] = &[
    ("and", TokenType::And),
    ("as", TokenType::As),
    ("break", TokenType::Break),
    ("catch", TokenType::Catch),
    ("class", TokenType::Class),
    ("elif", TokenType::Elif),
    ("else", TokenType::Else),
    ("false", TokenType::False),
    ("for", TokenType::For),
    ("fun", TokenType::Fun),
    ("if", TokenType::If),
    ("import", TokenType::Import),
    ("in", TokenType::In),
    ("loop", TokenType::Loop),
    ("nil", TokenType::Nil),
    ("not", TokenType::Not),
    ("operator", TokenType::Operator),
    ("or", TokenType::Or),
    ("return", TokenType::Return),
    ("struct", TokenType::Struct),
    ("throw", TokenType::Throw),
    ("true", TokenType::True),
    ("try", TokenType::Try),
    ("while", TokenType::While),
];

pub fn get_keyword(text: &str) -> Option<TokenType> {
    KEYWORDS.iter().find(|(word, _)| *word == text).map(|(_, tt)| *tt)
}

pub fn is_keyword(text: &str) -> bool {
    get_keyword(text).is_some()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub literal: Option<Literal>,
    pub line: u32,
}

impl Token {
    pub fn new(token_type: TokenType, lexeme: &str, literal: Option<Literal>, line: u32) -> Self {
        Self { token_type, lexeme: lexeme.to_owned(), literal, line }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} {} {:?}", self.token_type, self.lexeme, self.literal)
    }
}
