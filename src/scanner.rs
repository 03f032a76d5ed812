use crate::ast::Literal;
use crate::error::SyntaxError;
use crate::token::{get_keyword, Token, TokenType};

#[derive(Debug)]
pub struct Scanner {
    source_chars: Vec<char>,
    tokens: Vec<Token>,
    errors: Vec<SyntaxError>,
    start: usize,
    current: usize,
    line: u32,
}

impl Scanner {
    pub fn new(source: &str) -> Self {
        Self {
            source_chars: source.chars().collect(),
            tokens: Vec::new(),
            errors: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
        }
    }

    pub fn scan_tokens(&mut self) -> Result<Vec<Token>, Vec<SyntaxError>> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token();
        }

        self.tokens.push(Token::new(TokenType::EOF, "", None, self.line));

        if !self.errors.is_empty() {
            return Err(std::mem::take(&mut self.errors));
        }

        // Take our temporary tokens out. It will be replaced by the default()
        // value for the vector
        Ok(std::mem::take(&mut self.tokens))
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source_chars.len()
    }

    fn scan_token(&mut self) {
        let c = self.advance();

        match c {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            '[' => self.add_token(TokenType::LeftBracket),
            ']' => self.add_token(TokenType::RightBracket),
            ',' => self.add_token(TokenType::Comma),
            ':' => self.add_token(TokenType::Colon),
            ';' => self.add_token(TokenType::Semicolon),
            '+' => self.add_token(TokenType::Plus),
            '%' => self.add_token(TokenType::Percent),
            '&' => self.add_token(TokenType::Ampersand),
            '|' => self.add_token(TokenType::Pipe),
            '^' => self.add_token(TokenType::Caret),
            '~' => self.add_token(TokenType::Tilde),
            '.' => self.add_either('.', TokenType::DotDot, TokenType::Dot),
            '*' => self.add_either('*', TokenType::StarStar, TokenType::Star),
            '-' => self.add_either('>', TokenType::Arrow, TokenType::Minus),
            '!' => {
                if self.match_next('=') {
                    self.add_token(TokenType::BangEqual);
                } else {
                    self.error("Unexpected character '!', use 'not'.");
                }
            }
            '=' => {
                let token_type = if self.match_next('=') {
                    TokenType::EqualEqual
                } else if self.match_next('>') {
                    TokenType::FatArrow
                } else {
                    TokenType::Equal
                };
                self.add_token(token_type);
            }
            '<' => {
                let token_type = if self.match_next('=') {
                    TokenType::LessEqual
                } else if self.match_next('<') {
                    TokenType::LessLess
                } else {
                    TokenType::Less
                };
                self.add_token(token_type);
            }
            '>' => {
                let token_type = if self.match_next('=') {
                    TokenType::GreaterEqual
                } else if self.match_next('>') {
                    TokenType::GreaterGreater
                } else {
                    TokenType::Greater
                };
                self.add_token(token_type);
            }
            '/' => {
                if self.match_next('/') {
                    // Go until end of the commented line
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else {
                    self.add_token(TokenType::Slash);
                }
            }
            ' ' | '\r' | '\t' => {}
            '\n' => {
                self.line += 1;
            }
            '"' => self.string(),
            '0'..='9' => self.number(),
            c if is_alpha(c) => self.identifier(),
            c => self.error(&format!("Unexpected character '{c}'.")),
        }
    }

    fn error(&mut self, msg: &str) {
        self.errors.push(SyntaxError::new(self.line, msg));
    }

    fn advance(&mut self) -> char {
        let ch = self.source_chars.get(self.current).copied().unwrap_or('\0');
        self.current += 1;
        ch
    }

    fn add_token(&mut self, token_type: TokenType) {
        self.add_token_with_literal(token_type, None);
    }

    fn add_either(&mut self, next: char, matched: TokenType, single: TokenType) {
        let token_type = if self.match_next(next) { matched } else { single };
        self.add_token(token_type);
    }

    fn source_substring(&self, start: usize, end: usize) -> String {
        self.source_chars[start..end].iter().collect()
    }

    fn add_token_with_literal(&mut self, token_type: TokenType, literal_value: Option<Literal>) {
        let text = self.source_substring(self.start, self.current);
        let token = Token::new(token_type, &text, literal_value, self.line);
        self.tokens.push(token);
    }

    fn match_next(&mut self, expected: char) -> bool {
        if self.peek() == expected && !self.is_at_end() {
            self.current += 1;
            return true;
        }

        false
    }

    fn peek(&self) -> char {
        self.source_chars.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source_chars.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn string(&mut self) {
        let mut text = String::new();
        while self.peek() != '"' && !self.is_at_end() {
            let c = self.advance();
            match c {
                '\n' => {
                    self.line += 1;
                    text.push(c);
                }
                '\\' => {
                    let escaped = match self.advance() {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        '"' => '"',
                        '\\' => '\\',
                        other => {
                            self.error(&format!("Unknown escape sequence '\\{other}'."));
                            other
                        }
                    };
                    text.push(escaped);
                }
                _ => text.push(c),
            }
        }

        if self.is_at_end() {
            self.error("Unterminated string.");
            return;
        }

        // The closing "
        self.advance();
        self.add_token_with_literal(TokenType::StringLiteral, Some(Literal::Str(text)));
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // `0..10` is a range, not a real literal
        let is_real = self.peek() == '.' && self.peek_next().is_ascii_digit();
        if is_real {
            // Consume '.'
            self.advance();

            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text = self.source_substring(self.start, self.current);
        if is_real {
            match text.parse::<f64>() {
                Ok(value) => self.add_token_with_literal(TokenType::Real, Some(Literal::Real(value))),
                Err(_) => self.error(&format!("Malformed real literal '{text}'.")),
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => self.add_token_with_literal(TokenType::Integer, Some(Literal::Int(value))),
                Err(_) => self.error(&format!("Integer literal '{text}' is too large.")),
            }
        }
    }

    fn identifier(&mut self) {
        while is_alpha_numeric(self.peek()) {
            self.advance();
        }

        let text = self.source_substring(self.start, self.current);
        let token_type = get_keyword(&text).unwrap_or(TokenType::Identifier);
        let literal = match token_type {
            TokenType::True => Some(Literal::Bool(true)),
            TokenType::False => Some(Literal::Bool(false)),
            TokenType::Nil => Some(Literal::Nil),
            _ => None,
        };
        self.add_token_with_literal(token_type, literal);
    }
}

fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_alpha_numeric(c: char) -> bool {
    is_alpha(c) || c.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_types(source: &str) -> Vec<TokenType> {
        let mut scanner = Scanner::new(source);
        scanner.scan_tokens().expect("scan failed").into_iter().map(|t| t.token_type).collect()
    }

    #[test]
    fn range_is_not_a_real_literal() {
        assert_eq!(
            token_types("0..10"),
            vec![TokenType::Integer, TokenType::DotDot, TokenType::Integer, TokenType::EOF]
        );
    }

    #[test]
    fn two_character_operators() {
        assert_eq!(
            token_types("** -> => << >> != =="),
            vec![
                TokenType::StarStar,
                TokenType::Arrow,
                TokenType::FatArrow,
                TokenType::LessLess,
                TokenType::GreaterGreater,
                TokenType::BangEqual,
                TokenType::EqualEqual,
                TokenType::EOF
            ]
        );
    }

    #[test]
    fn string_escapes() {
        let mut scanner = Scanner::new(r#""a\n\"b""#);
        let tokens = scanner.scan_tokens().expect("scan failed");
        assert_eq!(tokens[0].literal, Some(Literal::Str("a\n\"b".to_owned())));
    }

    #[test]
    fn lines_are_tracked() {
        let mut scanner = Scanner::new("a\n// comment\nb");
        let tokens = scanner.scan_tokens().expect("scan failed");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn reports_unterminated_string() {
        let mut scanner = Scanner::new("\"abc");
        let errors = scanner.scan_tokens().unwrap_err();
        assert_eq!(errors[0].message, "Unterminated string.");
    }
}
