use corvid::prelude::{Literal, Scanner, TokenType};

#[test]
fn scanner_works() {
    let input = "2 and 3";
    let mut scanner = Scanner::new(input);
    let tokens = scanner.scan_tokens().expect("scan failed");
    assert_eq!(tokens.len(), 4);
}

#[test]
fn keywords_and_literals() {
    let mut scanner = Scanner::new("struct P { operator len(self) -> int { return 2; } } x = 1.5;");
    let tokens = scanner.scan_tokens().expect("scan failed");

    assert_eq!(tokens[0].token_type, TokenType::Struct);
    assert_eq!(tokens[3].token_type, TokenType::Operator);
    let real = tokens.iter().find(|t| t.token_type == TokenType::Real).expect("no real literal");
    assert_eq!(real.literal, Some(Literal::Real(1.5)));
}

#[test]
fn errors_carry_lines() {
    let mut scanner = Scanner::new("x = 1;\ny = \"unterminated");
    let errors = scanner.scan_tokens().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line, 2);
}
