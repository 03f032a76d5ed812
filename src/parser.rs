use std::rc::Rc;

use crate::ast::*;
use crate::error::SyntaxError;
use crate::scanner::Scanner;
use crate::token::{Token, TokenType};

type ParseResult<T> = Result<T, SyntaxError>;

/// Names accepted after `operator` besides the symbolic operators.
const NAMED_OPERATORS: &[&str] = &["len", "int", "bool", "str", "repr"];

/// Scan and parse a whole source file.
pub fn parse(source: &str) -> Result<Vec<Stmt>, Vec<SyntaxError>> {
    let tokens = Scanner::new(source).scan_tokens()?;
    Parser::new(tokens).parse()
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    loop_depth: usize,
    function_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0, loop_depth: 0, function_depth: 0 }
    }

    pub fn parse(&mut self) -> Result<Vec<Stmt>, Vec<SyntaxError>> {
        let mut statements = vec![];
        let mut errors = vec![];

        while !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(e) => {
                    errors.push(e);
                    self.synchronize();
                }
            }
        }

        if errors.is_empty() {
            Ok(statements)
        } else {
            Err(errors)
        }
    }

    fn declaration(&mut self) -> ParseResult<Stmt> {
        if self.check(&TokenType::Fun) && self.check_next(&TokenType::Identifier) {
            self.advance();
            let decl = self.function()?;
            let line = decl.line;
            return Ok(Stmt::new(StmtKind::Function { decl: Rc::new(decl) }, line));
        }
        if self.match_tt(&[TokenType::Class, TokenType::Struct]) {
            return self.class_declaration();
        }
        if self.match_tt(&[TokenType::Import]) {
            return self.import_statement();
        }

        self.statement()
    }

    fn function(&mut self) -> ParseResult<FunctionDecl> {
        let name = self.consume(TokenType::Identifier, "Expect function name.")?;
        self.function_rest(name.lexeme, name.line)
    }

    /// Parameters, optional return types and the body, after the name has been consumed.
    fn function_rest(&mut self, name: String, line: u32) -> ParseResult<FunctionDecl> {
        self.consume(TokenType::LeftParen, &format!("Expect '(' after '{name}'."))?;
        let params = self.parameters()?;
        let returns = self.return_types()?;

        self.consume(TokenType::LeftBrace, &format!("Expect '{{' before '{name}' body."))?;
        let body = self.function_body()?;

        Ok(FunctionDecl { name, params, returns, body, line })
    }

    fn function_body(&mut self) -> ParseResult<Vec<Stmt>> {
        let enclosing_loops = std::mem::take(&mut self.loop_depth);
        self.function_depth += 1;
        let body = self.block();
        self.function_depth -= 1;
        self.loop_depth = enclosing_loops;
        body
    }

    fn parameters(&mut self) -> ParseResult<Vec<Param>> {
        let mut params = vec![];
        if !self.check(&TokenType::RightParen) {
            loop {
                if params.len() >= 255 {
                    return Err(self.error(self.peek(), "Can't have more than 255 parameters."));
                }

                let variadic = self.match_tt(&[TokenType::Star]);
                let name = self.consume(TokenType::Identifier, "Expect parameter name.")?;
                let annotation =
                    if self.match_tt(&[TokenType::Colon]) { Some(self.postfix()?) } else { None };

                params.push(Param { name: name.lexeme, annotation, variadic });
                if !self.match_tt(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        self.consume(TokenType::RightParen, "Expect ')' after parameters.")?;
        Ok(params)
    }

    fn return_types(&mut self) -> ParseResult<Vec<Expr>> {
        if !self.match_tt(&[TokenType::Arrow]) {
            return Ok(vec![]);
        }

        if self.match_tt(&[TokenType::LeftParen]) {
            let mut types = vec![self.postfix()?];
            while self.match_tt(&[TokenType::Comma]) {
                types.push(self.postfix()?);
            }
            self.consume(TokenType::RightParen, "Expect ')' after return types.")?;
            return Ok(types);
        }

        Ok(vec![self.postfix()?])
    }

    fn class_declaration(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous();
        let value_type = keyword.token_type == TokenType::Struct;
        let name = self.consume(TokenType::Identifier, "Expect class name.")?;

        let base = if self.match_tt(&[TokenType::LeftParen]) {
            let base = self.expression()?;
            self.consume(TokenType::RightParen, "Expect ')' after base class.")?;
            Some(base)
        } else {
            None
        };

        self.consume(TokenType::LeftBrace, "Expect '{' before class body.")?;

        let mut members = vec![];
        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            if self.match_tt(&[TokenType::Fun]) {
                members.push(ClassMember::Method(Rc::new(self.function()?)));
            } else if self.match_tt(&[TokenType::Operator]) {
                let line = self.previous().line;
                let symbol = self.operator_symbol()?;
                members.push(ClassMember::Operator(Rc::new(self.function_rest(symbol, line)?)));
            } else {
                let attr = self.consume(TokenType::Identifier, "Expect method or attribute.")?;
                self.consume(TokenType::Equal, "Expect '=' after class attribute name.")?;
                let value = self.expression()?;
                self.consume(TokenType::Semicolon, "Expect ';' after class attribute.")?;
                members.push(ClassMember::Attribute { name: attr.lexeme, value });
            }
        }

        self.consume(TokenType::RightBrace, "Expect '}' after class body.")?;
        Ok(Stmt::new(
            StmtKind::Class { name: name.lexeme, base, members, value_type },
            keyword.line,
        ))
    }

    fn operator_symbol(&mut self) -> ParseResult<String> {
        let token = self.advance();
        match token.token_type {
            TokenType::LeftBracket => {
                self.consume(TokenType::RightBracket, "Expect ']' after '['.")?;
                if self.match_tt(&[TokenType::Equal]) {
                    Ok("[]=".to_owned())
                } else {
                    Ok("[]".to_owned())
                }
            }
            TokenType::Tilde => Ok("~".to_owned()),
            TokenType::Identifier if NAMED_OPERATORS.contains(&token.lexeme.as_str()) => {
                Ok(token.lexeme)
            }
            tt => match BinaryOp::from_token(tt) {
                Some(op) => Ok(op.symbol().to_owned()),
                None => Err(self.error(&token, "Expect an overloadable operator.")),
            },
        }
    }

    fn import_statement(&mut self) -> ParseResult<Stmt> {
        let line = self.previous().line;
        let path = if self.match_tt(&[TokenType::StringLiteral]) {
            let token = self.previous();
            match token.literal.clone() {
                Some(Literal::Str(path)) => ImportPath::Relative(path),
                _ => return Err(self.error(&token, "Expect import path.")),
            }
        } else {
            let mut parts = vec![self.consume(TokenType::Identifier, "Expect module path.")?.lexeme];
            while self.match_tt(&[TokenType::Dot]) {
                parts.push(self.consume(TokenType::Identifier, "Expect module name.")?.lexeme);
            }
            ImportPath::Standard(parts)
        };

        let alias = if self.match_tt(&[TokenType::As]) {
            Some(self.consume(TokenType::Identifier, "Expect name after 'as'.")?.lexeme)
        } else {
            None
        };

        self.consume(TokenType::Semicolon, "Expect ';' after import.")?;
        Ok(Stmt::new(StmtKind::Import { path, alias }, line))
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        if self.match_tt(&[TokenType::If]) {
            self.if_statement()
        } else if self.match_tt(&[TokenType::While]) {
            self.while_statement()
        } else if self.match_tt(&[TokenType::For]) {
            self.for_statement()
        } else if self.match_tt(&[TokenType::Loop]) {
            let line = self.previous().line;
            let body = self.loop_body()?;
            Ok(Stmt::new(StmtKind::Loop { body }, line))
        } else if self.match_tt(&[TokenType::Try]) {
            self.try_statement()
        } else if self.match_tt(&[TokenType::Return]) {
            self.return_statement()
        } else if self.match_tt(&[TokenType::Break]) {
            self.break_statement()
        } else if self.match_tt(&[TokenType::Throw]) {
            let line = self.previous().line;
            let value = self.expression()?;
            self.consume(TokenType::Semicolon, "Expect ';' after thrown value.")?;
            Ok(Stmt::new(StmtKind::Throw { value }, line))
        } else if self.match_tt(&[TokenType::LeftBrace]) {
            let line = self.previous().line;
            let statements = self.block()?;
            Ok(Stmt::new(StmtKind::Block { statements, catches: vec![] }, line))
        } else {
            self.expression_statement()
        }
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let line = self.previous().line;
        let mut branches = vec![];

        let condition = self.expression()?;
        self.consume(TokenType::LeftBrace, "Expect '{' after if condition.")?;
        branches.push((condition, self.block()?));

        while self.match_tt(&[TokenType::Elif]) {
            let condition = self.expression()?;
            self.consume(TokenType::LeftBrace, "Expect '{' after elif condition.")?;
            branches.push((condition, self.block()?));
        }

        let else_branch = if self.match_tt(&[TokenType::Else]) {
            self.consume(TokenType::LeftBrace, "Expect '{' after 'else'.")?;
            Some(self.block()?)
        } else {
            None
        };

        Ok(Stmt::new(StmtKind::If { branches, else_branch }, line))
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let line = self.previous().line;
        let condition = self.expression()?;
        let body = self.loop_body()?;
        Ok(Stmt::new(StmtKind::While { condition, body }, line))
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let line = self.previous().line;
        let variable = self.consume(TokenType::Identifier, "Expect loop variable.")?.lexeme;
        self.consume(TokenType::In, "Expect 'in' after loop variable.")?;
        let start = self.bit_or()?;
        self.consume(TokenType::DotDot, "Expect '..' in range.")?;
        let end = self.bit_or()?;
        let body = self.loop_body()?;
        Ok(Stmt::new(StmtKind::ForRange { variable, start, end, body }, line))
    }

    fn loop_body(&mut self) -> ParseResult<Vec<Stmt>> {
        self.consume(TokenType::LeftBrace, "Expect '{' before loop body.")?;
        self.loop_depth += 1;
        let body = self.block();
        self.loop_depth -= 1;
        body
    }

    fn try_statement(&mut self) -> ParseResult<Stmt> {
        let line = self.previous().line;
        self.consume(TokenType::LeftBrace, "Expect '{' after 'try'.")?;
        let statements = self.block()?;

        let mut catches = vec![];
        while self.match_tt(&[TokenType::Catch]) {
            let catch_line = self.previous().line;
            self.consume(TokenType::LeftParen, "Expect '(' after 'catch'.")?;
            let name = self.consume(TokenType::Identifier, "Expect error variable name.")?;
            self.consume(TokenType::Colon, "Expect ':' after error variable.")?;
            let error_type = self.expression()?;
            self.consume(TokenType::RightParen, "Expect ')' after error type.")?;
            self.consume(TokenType::LeftBrace, "Expect '{' before catch body.")?;
            let body = self.block()?;
            catches.push(CatchClause { name: name.lexeme, error_type, body, line: catch_line });
        }

        if catches.is_empty() {
            return Err(self.error(self.peek(), "Expect at least one 'catch' after 'try' block."));
        }

        Ok(Stmt::new(StmtKind::Block { statements, catches }, line))
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous();
        if self.function_depth == 0 {
            return Err(self.error(&keyword, "Can't return from top-level code."));
        }

        let values =
            if self.check(&TokenType::Semicolon) { vec![] } else { self.expression_list()? };

        self.consume(TokenType::Semicolon, "Expect ';' after return value.")?;
        Ok(Stmt::new(StmtKind::Return { values }, keyword.line))
    }

    fn break_statement(&mut self) -> ParseResult<Stmt> {
        let token = self.previous();
        if self.loop_depth == 0 {
            return Err(self.error(&token, "Can't use 'break' outside of a loop."));
        }

        self.consume(TokenType::Semicolon, "Expect ';' after 'break'.")?;
        Ok(Stmt::new(StmtKind::Break, token.line))
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut statements = vec![];

        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            statements.push(self.declaration()?);
        }

        self.consume(TokenType::RightBrace, "Expect '}' after block.")?;
        Ok(statements)
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let line = self.peek().line;
        let exprs = self.expression_list()?;

        if self.match_tt(&[TokenType::Equal]) {
            let equals = self.previous();
            if let Some(target) = exprs.iter().find(|e| !e.is_assignable()) {
                return Err(self.error(&equals, &format!("Invalid assignment target '{target}'.")));
            }

            let values = self.expression_list()?;
            self.consume(TokenType::Semicolon, "Expect ';' after assignment.")?;
            return Ok(Stmt::new(StmtKind::Assign { targets: exprs, values }, line));
        }

        self.consume(TokenType::Semicolon, "Expect ';' after expression.")?;
        let expr = Self::tuple_or_single(exprs);
        Ok(Stmt::new(StmtKind::Expression { expr }, line))
    }

    fn expression_list(&mut self) -> ParseResult<Vec<Expr>> {
        let mut exprs = vec![self.expression()?];
        while self.match_tt(&[TokenType::Comma]) {
            exprs.push(self.expression()?);
        }
        Ok(exprs)
    }

    fn tuple_or_single(mut exprs: Vec<Expr>) -> Expr {
        if exprs.len() == 1 {
            exprs.remove(0)
        } else {
            Expr::Tuple { elements: exprs }
        }
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        self.or()
    }

    fn or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.and()?;

        while self.match_tt(&[TokenType::Or]) {
            let right = self.and()?;
            expr = Expr::Logical { left: Box::new(expr), op: LogicalOp::Or, right: Box::new(right) };
        }

        Ok(expr)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.not()?;

        while self.match_tt(&[TokenType::And]) {
            let right = self.not()?;
            expr = Expr::Logical { left: Box::new(expr), op: LogicalOp::And, right: Box::new(right) };
        }

        Ok(expr)
    }

    fn not(&mut self) -> ParseResult<Expr> {
        if self.match_tt(&[TokenType::Not]) {
            let right = self.not()?;
            return Ok(Expr::Not { right: Box::new(right) });
        }

        self.comparison()
    }

    /// One left-associative precedence level of binary operators.
    fn binary_level(
        &mut self,
        operators: &[TokenType],
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut expr = next(self)?;

        while self.match_tt(operators) {
            let operator = self.previous();
            let op = match BinaryOp::from_token(operator.token_type) {
                Some(op) => op,
                None => return Err(self.error(&operator, "Expect binary operator.")),
            };
            let right = next(self)?;
            expr = Expr::Binary { left: Box::new(expr), op, right: Box::new(right) };
        }

        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                TokenType::EqualEqual,
                TokenType::BangEqual,
                TokenType::Less,
                TokenType::LessEqual,
                TokenType::Greater,
                TokenType::GreaterEqual,
            ],
            Self::bit_or,
        )
    }

    fn bit_or(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[TokenType::Pipe], Self::bit_xor)
    }

    fn bit_xor(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[TokenType::Caret], Self::bit_and)
    }

    fn bit_and(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[TokenType::Ampersand], Self::shift)
    }

    fn shift(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[TokenType::LessLess, TokenType::GreaterGreater], Self::term)
    }

    fn term(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[TokenType::Plus, TokenType::Minus], Self::factor)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[TokenType::Star, TokenType::Slash, TokenType::Percent], Self::unary)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let op = if self.match_tt(&[TokenType::Minus]) {
            Some(UnaryOp::Neg)
        } else if self.match_tt(&[TokenType::Plus]) {
            Some(UnaryOp::Pos)
        } else if self.match_tt(&[TokenType::Tilde]) {
            Some(UnaryOp::Invert)
        } else {
            None
        };

        if let Some(op) = op {
            let right = self.unary()?;
            return Ok(Expr::Unary { op, right: Box::new(right) });
        }

        self.power()
    }

    fn power(&mut self) -> ParseResult<Expr> {
        let expr = self.postfix()?;

        if self.match_tt(&[TokenType::StarStar]) {
            // Right associative, and binds tighter than a unary minus on its left.
            let right = self.unary()?;
            return Ok(Expr::Binary { left: Box::new(expr), op: BinaryOp::Pow, right: Box::new(right) });
        }

        Ok(expr)
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.match_tt(&[TokenType::LeftParen]) {
                expr = self.finish_call(expr)?;
            } else if self.match_tt(&[TokenType::LeftBracket]) {
                expr = self.finish_index(expr)?;
            } else if self.match_tt(&[TokenType::Dot]) {
                let name = self.consume(TokenType::Identifier, "Expect attribute name after '.'.")?;
                expr = Expr::Attribute { object: Box::new(expr), name: name.lexeme };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> ParseResult<Expr> {
        let mut arguments = vec![];
        let mut keywords: Vec<(String, Expr)> = vec![];

        if !self.check(&TokenType::RightParen) {
            loop {
                if arguments.len() + keywords.len() >= 255 {
                    return Err(self.error(self.peek(), "Can't have more than 255 arguments."));
                }

                if self.check(&TokenType::Identifier) && self.check_next(&TokenType::Equal) {
                    let name = self.advance();
                    self.advance();
                    if keywords.iter().any(|(k, _)| *k == name.lexeme) {
                        let message = format!("Keyword argument '{}' repeated.", name.lexeme);
                        return Err(self.error(&name, &message));
                    }
                    keywords.push((name.lexeme, self.expression()?));
                } else if !keywords.is_empty() {
                    return Err(self.error(self.peek(), "Positional argument follows keyword argument."));
                } else {
                    arguments.push(self.expression()?);
                }

                if !self.match_tt(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        self.consume(TokenType::RightParen, "Expect ')' after arguments.")?;
        Ok(Expr::Call { callee: Box::new(callee), arguments, keywords })
    }

    fn finish_index(&mut self, object: Expr) -> ParseResult<Expr> {
        let start =
            if self.check(&TokenType::Colon) { None } else { Some(Box::new(self.expression()?)) };

        if self.match_tt(&[TokenType::Colon]) {
            let end = if self.check(&TokenType::RightBracket) {
                None
            } else {
                Some(Box::new(self.expression()?))
            };
            self.consume(TokenType::RightBracket, "Expect ']' after slice.")?;
            return Ok(Expr::Slice { object: Box::new(object), start, end });
        }

        self.consume(TokenType::RightBracket, "Expect ']' after index.")?;
        match start {
            Some(index) => Ok(Expr::Index { object: Box::new(object), index }),
            None => Err(self.error(&self.previous(), "Expect index expression.")),
        }
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        if self.match_tt(&[
            TokenType::False,
            TokenType::True,
            TokenType::Nil,
            TokenType::Integer,
            TokenType::Real,
            TokenType::StringLiteral,
        ]) {
            let token = self.previous();
            return match token.literal.clone() {
                Some(value) => Ok(Expr::Literal { value }),
                None => Err(self.error(&token, "Expect literal value.")),
            };
        }
        if self.match_tt(&[TokenType::Identifier]) {
            return Ok(Expr::Variable { name: self.previous().lexeme });
        }
        if self.match_tt(&[TokenType::LeftParen]) {
            if self.match_tt(&[TokenType::RightParen]) {
                return Ok(Expr::Tuple { elements: vec![] });
            }

            let expr = self.expression()?;
            if self.match_tt(&[TokenType::Comma]) {
                let mut elements = vec![expr];
                while !self.check(&TokenType::RightParen) {
                    elements.push(self.expression()?);
                    if !self.match_tt(&[TokenType::Comma]) {
                        break;
                    }
                }
                self.consume(TokenType::RightParen, "Expect ')' after tuple.")?;
                return Ok(Expr::Tuple { elements });
            }

            self.consume(TokenType::RightParen, "Expect ')' after expression.")?;
            return Ok(expr);
        }
        if self.match_tt(&[TokenType::LeftBracket]) {
            let mut elements = vec![];
            while !self.check(&TokenType::RightBracket) {
                elements.push(self.expression()?);
                if !self.match_tt(&[TokenType::Comma]) {
                    break;
                }
            }
            self.consume(TokenType::RightBracket, "Expect ']' after list.")?;
            return Ok(Expr::List { elements });
        }
        if self.match_tt(&[TokenType::Fun]) {
            return self.lambda();
        }

        Err(self.error(self.peek(), "Expect expression."))
    }

    fn lambda(&mut self) -> ParseResult<Expr> {
        let line = self.previous().line;
        self.consume(TokenType::LeftParen, "Expect '(' after 'fun'.")?;
        let params = self.parameters()?;
        let returns = self.return_types()?;

        let body = if self.match_tt(&[TokenType::FatArrow]) {
            let value_line = self.peek().line;
            self.function_depth += 1;
            let value = self.expression();
            self.function_depth -= 1;
            vec![Stmt::new(StmtKind::Return { values: vec![value?] }, value_line)]
        } else {
            self.consume(TokenType::LeftBrace, "Expect '{' before lambda body.")?;
            self.function_body()?
        };

        let decl = FunctionDecl { name: "<lambda>".to_owned(), params, returns, body, line };
        Ok(Expr::Lambda { decl: Rc::new(decl) })
    }

    /// Return the next token if its `token_type` matches the given type as input.
    /// Otherwise, produce a syntax error with the given message.
    fn consume(&mut self, token_type: TokenType, message: &str) -> ParseResult<Token> {
        if self.check(&token_type) {
            return Ok(self.advance());
        }

        Err(self.error(self.peek(), message))
    }

    fn error(&self, token: &Token, message: &str) -> SyntaxError {
        if token.token_type == TokenType::EOF {
            SyntaxError::new(token.line, &format!("at end: {message}"))
        } else {
            SyntaxError::new(token.line, &format!("at '{}': {message}", token.lexeme))
        }
    }

    fn match_tt(&mut self, types: &[TokenType]) -> bool {
        for tt in types {
            if self.check(tt) {
                self.advance();
                return true;
            }
        }

        false
    }

    /// Check to see if the next token's type matches the given `token_type`.
    fn check(&self, token_type: &TokenType) -> bool {
        if self.is_at_end() {
            return false;
        }

        self.peek().token_type == *token_type
    }

    fn check_next(&self, token_type: &TokenType) -> bool {
        self.tokens.get(self.current + 1).is_some_and(|t| t.token_type == *token_type)
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::EOF
    }

    fn peek(&self) -> &Token {
        // The scanner always terminates the stream with an EOF token.
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> Token {
        self.tokens[self.current.saturating_sub(1)].clone()
    }

    fn synchronize(&mut self) {
        self.advance();

        // Move and discard tokens until we find a statement boundary
        while !self.is_at_end() {
            if self.previous().token_type == TokenType::Semicolon {
                return;
            }

            match self.peek().token_type {
                TokenType::Class
                | TokenType::Struct
                | TokenType::Fun
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Loop
                | TokenType::Try
                | TokenType::Import
                | TokenType::Return => return,
                _ => {}
            }

            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Vec<Stmt> {
        parse(source).expect("failed to parse the source")
    }

    fn first_expression(source: &str) -> Expr {
        match parse_ok(source).remove(0).kind {
            StmtKind::Expression { expr } => expr,
            other => panic!("statement is not an expression: {other:?}"),
        }
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        assert_eq!(first_expression("-2 ** 2;").to_string(), "-2 ** 2");
        match first_expression("-2 ** 2;") {
            Expr::Unary { op: UnaryOp::Neg, right } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Pow, .. }))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn multi_assignment_shapes() {
        let stmts = parse_ok("a, b, c = 1, 2, 3; a, b = xs; a = 1, 2;");
        let counts: Vec<_> = stmts
            .iter()
            .map(|s| match &s.kind {
                StmtKind::Assign { targets, values } => (targets.len(), values.len()),
                other => panic!("not an assignment: {other:?}"),
            })
            .collect();
        assert_eq!(counts, vec![(3, 3), (2, 1), (1, 2)]);
    }

    #[test]
    fn slices_and_indices() {
        assert!(matches!(first_expression("xs[-2:];"), Expr::Slice { end: None, .. }));
        assert!(matches!(first_expression("xs[:2];"), Expr::Slice { start: None, .. }));
        assert!(matches!(first_expression("xs[0][1];"), Expr::Index { .. }));
    }

    #[test]
    fn keyword_arguments() {
        match first_expression("print(1, 2, sep=\", \");") {
            Expr::Call { arguments, keywords, .. } => {
                assert_eq!(arguments.len(), 2);
                assert_eq!(keywords[0].0, "sep");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn class_with_operators() {
        let source = r#"
            struct Vec2(Base) {
                dims = 2;
                fun init(self, x, y) { self.x = x; self.y = y; }
                operator +(self, other) { return Vec2(self.x + other.x, self.y + other.y); }
                operator -(self) { return Vec2(-self.x, -self.y); }
                operator [](self, i) { return self.x; }
                operator len(self) -> int { return 2; }
            }
        "#;
        match &parse_ok(source)[0].kind {
            StmtKind::Class { name, members, value_type, base } => {
                assert_eq!(name, "Vec2");
                assert!(*value_type);
                assert!(base.is_some());
                let names: Vec<_> = members
                    .iter()
                    .map(|m| match m {
                        ClassMember::Method(d) | ClassMember::Operator(d) => d.name.clone(),
                        ClassMember::Attribute { name, .. } => name.clone(),
                    })
                    .collect();
                assert_eq!(names, vec!["dims", "init", "+", "-", "[]", "len"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn try_with_catches() {
        let source = "try { f(); } catch (e: ZeroDivisionError) { g(); } catch (e: Error) {}";
        match &parse_ok(source)[0].kind {
            StmtKind::Block { catches, .. } => assert_eq!(catches.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn imports() {
        let stmts = parse_ok("import \"./util\"; import math.vector as vec;");
        assert_eq!(
            stmts[0].kind,
            StmtKind::Import { path: ImportPath::Relative("./util".to_owned()), alias: None }
        );
        assert_eq!(
            stmts[1].kind,
            StmtKind::Import {
                path: ImportPath::Standard(vec!["math".to_owned(), "vector".to_owned()]),
                alias: Some("vec".to_owned())
            }
        );
    }

    #[test]
    fn rejects_break_outside_loop() {
        let errors = parse("break;").unwrap_err();
        assert!(errors[0].message.contains("outside of a loop"));
    }

    #[test]
    fn rejects_break_inside_function_inside_loop() {
        let errors = parse("loop { fun f() { break; } }").unwrap_err();
        assert!(errors[0].message.contains("outside of a loop"));
    }

    #[test]
    fn rejects_top_level_return() {
        assert!(parse("return 1;").is_err());
        assert!(parse("fun f() { return 1; }").is_ok());
    }

    #[test]
    fn reports_every_error() {
        let errors = parse("1 +; 2 +; 3;").unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn lambda_expression_body() {
        match first_expression("fun(x) => x * 2;") {
            Expr::Lambda { decl } => {
                assert_eq!(decl.name, "<lambda>");
                assert!(matches!(decl.body[0].kind, StmtKind::Return { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
