use std::fmt;

use crate::lexer::{Lexer, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Bang,
    Minus,
}

impl fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PrefixOp::Bang => write!(f, "!"),
            PrefixOp::Minus => write!(f, "-"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Eq,
    NotEq,
    And,
    Or,
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            InfixOp::Plus => "+",
            InfixOp::Minus => "-",
            InfixOp::Star => "*",
            InfixOp::Slash => "/",
            InfixOp::Percent => "%",
            InfixOp::Lt => "<",
            InfixOp::Gt => ">",
            InfixOp::LtEq => "<=",
            InfixOp::GtEq => ">=",
            InfixOp::Eq => "==",
            InfixOp::NotEq => "!=",
            InfixOp::And => "&&",
            InfixOp::Or => "||",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign { name: String, value: Expr },
    Return(Option<Expr>),
    Expression(Expr),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identifier(String),
    IntegerLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    BooleanLiteral(bool),
    ArrayLiteral(Vec<Expr>),
    DictLiteral(Vec<(Expr, Expr)>),
    Index {
        left: Box<Expr>,
        index: Box<Expr>,
    },
    Prefix {
        operator: PrefixOp,
        right: Box<Expr>,
    },
    Infix {
        operator: InfixOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    If {
        condition: Box<Expr>,
        consequence: Block,
        alternative: Option<Block>,
    },
    Function {
        name: Option<String>,
        parameters: Vec<String>,
        body: Block,
    },
    Call {
        function: Box<Expr>,
        arguments: Vec<Expr>,
    },
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Statement::Assign { name, value } => write!(f, "{} << {}", name, value),
            Statement::Return(Some(value)) => write!(f, "return {};", value),
            Statement::Return(None) => write!(f, "return;"),
            Statement::Expression(expr) => write!(f, "{}", expr),
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Identifier(name) => write!(f, "{}", name),
            Expr::IntegerLiteral(v) => write!(f, "{}", v),
            Expr::FloatLiteral(v) => write!(f, "{}", v),
            Expr::StringLiteral(s) => write!(f, "{}", s),
            Expr::BooleanLiteral(v) => write!(f, "{}", v),
            Expr::ArrayLiteral(elements) => {
                let parts: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Expr::DictLiteral(pairs) => {
                let parts: Vec<String> =
                    pairs.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Expr::Index { left, index } => write!(f, "({}[{}])", left, index),
            Expr::Prefix { operator, right } => write!(f, "({}{})", operator, right),
            Expr::Infix {
                operator,
                left,
                right,
            } => write!(f, "({} {} {})", left, operator, right),
            Expr::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if{} {}", condition, consequence)?;
                if let Some(alt) = alternative {
                    write!(f, "else {}", alt)?;
                }
                Ok(())
            }
            Expr::Function {
                name,
                parameters,
                body,
            } => {
                write!(f, "fct")?;
                if let Some(name) = name {
                    write!(f, "<{}>", name)?;
                }
                write!(f, "({}) {}", parameters.join(", "), body)
            }
            Expr::Call {
                function,
                arguments,
            } => {
                let parts: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", function, parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Or,
    And,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

fn token_precedence(token: &Token) -> Precedence {
    match token {
        Token::Or => Precedence::Or,
        Token::And => Precedence::And,
        Token::Eq | Token::NotEq => Precedence::Equals,
        Token::Lt | Token::Gt | Token::LtEq | Token::GtEq => Precedence::LessGreater,
        Token::Plus | Token::Minus => Precedence::Sum,
        Token::Star | Token::Slash | Token::Percent => Precedence::Product,
        Token::LParen => Precedence::Call,
        Token::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

pub struct Parser {
    lexer: Lexer,
    current_token: Token,
    peek_token: Token,
    pub errors: Vec<String>,
}

impl Parser {
    pub fn new(mut lexer: Lexer) -> Self {
        let current_token = lexer.next_token();
        let peek_token = lexer.next_token();
        Self {
            lexer,
            current_token,
            peek_token,
            errors: Vec::new(),
        }
    }

    pub fn parse_program(&mut self) -> Program {
        let mut program = Program::default();
        while self.current_token != Token::Eof {
            if let Some(stmt) = self.parse_statement() {
                program.statements.push(stmt);
            }
            self.advance();
        }
        program
    }

    fn advance(&mut self) {
        self.current_token = std::mem::replace(&mut self.peek_token, self.lexer.next_token());
    }

    /// Consume the peek token when it matches, record an error otherwise.
    fn expect_peek(&mut self, expected: Token) -> bool {
        if self.peek_token == expected {
            self.advance();
            true
        } else {
            self.errors.push(format!(
                "expected next token to be {}, got {} instead",
                expected, self.peek_token
            ));
            false
        }
    }

    fn parse_statement(&mut self) -> Option<Statement> {
        match &self.current_token {
            Token::Var => self.parse_var_statement(),
            Token::Return => self.parse_return_statement(),
            Token::Ident(_) if self.peek_token == Token::Assign => self.parse_assign_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_var_statement(&mut self) -> Option<Statement> {
        match &self.peek_token {
            Token::Ident(_) => self.advance(),
            other => {
                self.errors.push(format!(
                    "expected identifier after var, got {} instead",
                    other
                ));
                return None;
            }
        }
        self.parse_assign_statement()
    }

    fn parse_assign_statement(&mut self) -> Option<Statement> {
        let name = match &self.current_token {
            Token::Ident(name) => name.clone(),
            _ => return None,
        };

        if !self.expect_peek(Token::Assign) {
            return None;
        }

        self.advance();
        let mut value = self.parse_expression(Precedence::Lowest)?;

        // A function bound by assignment knows its own name, which lets its
        // body refer back to itself.
        if let Expr::Function {
            name: fct_name @ None,
            ..
        } = &mut value
        {
            *fct_name = Some(name.clone());
        }

        if self.peek_token == Token::Semicolon {
            self.advance();
        }

        Some(Statement::Assign { name, value })
    }

    fn parse_return_statement(&mut self) -> Option<Statement> {
        if matches!(
            self.peek_token,
            Token::Semicolon | Token::RBrace | Token::Eof
        ) {
            if self.peek_token == Token::Semicolon {
                self.advance();
            }
            return Some(Statement::Return(None));
        }

        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;

        if self.peek_token == Token::Semicolon {
            self.advance();
        }

        Some(Statement::Return(Some(value)))
    }

    fn parse_expression_statement(&mut self) -> Option<Statement> {
        let expr = self.parse_expression(Precedence::Lowest)?;

        if self.peek_token == Token::Semicolon {
            self.advance();
        }

        Some(Statement::Expression(expr))
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Option<Expr> {
        let mut left = self.parse_prefix()?;

        while self.peek_token != Token::Semicolon
            && precedence < token_precedence(&self.peek_token)
        {
            left = match &self.peek_token {
                Token::LParen => {
                    self.advance();
                    self.parse_call_expression(left)?
                }
                Token::LBracket => {
                    self.advance();
                    self.parse_index_expression(left)?
                }
                _ => {
                    let operator = match Self::infix_op(&self.peek_token) {
                        Some(op) => op,
                        None => return Some(left),
                    };
                    self.advance();
                    self.parse_infix_expression(left, operator)?
                }
            };
        }

        Some(left)
    }

    fn infix_op(token: &Token) -> Option<InfixOp> {
        match token {
            Token::Plus => Some(InfixOp::Plus),
            Token::Minus => Some(InfixOp::Minus),
            Token::Star => Some(InfixOp::Star),
            Token::Slash => Some(InfixOp::Slash),
            Token::Percent => Some(InfixOp::Percent),
            Token::Lt => Some(InfixOp::Lt),
            Token::Gt => Some(InfixOp::Gt),
            Token::LtEq => Some(InfixOp::LtEq),
            Token::GtEq => Some(InfixOp::GtEq),
            Token::Eq => Some(InfixOp::Eq),
            Token::NotEq => Some(InfixOp::NotEq),
            Token::And => Some(InfixOp::And),
            Token::Or => Some(InfixOp::Or),
            _ => None,
        }
    }

    fn parse_prefix(&mut self) -> Option<Expr> {
        match self.current_token.clone() {
            Token::Ident(name) => Some(Expr::Identifier(name)),
            Token::Int(v) => Some(Expr::IntegerLiteral(v)),
            Token::Float(v) => Some(Expr::FloatLiteral(v)),
            Token::Str(s) => Some(Expr::StringLiteral(s)),
            Token::True => Some(Expr::BooleanLiteral(true)),
            Token::False => Some(Expr::BooleanLiteral(false)),
            Token::Bang => self.parse_prefix_expression(PrefixOp::Bang),
            Token::Minus => self.parse_prefix_expression(PrefixOp::Minus),
            Token::LParen => self.parse_grouped_expression(),
            Token::LBracket => self.parse_array_literal(),
            Token::LBrace => self.parse_dict_literal(),
            Token::If => self.parse_if_expression(),
            Token::Fct => self.parse_function_literal(),
            other => {
                self.errors
                    .push(format!("no prefix parse rule for {}", other));
                None
            }
        }
    }

    fn parse_prefix_expression(&mut self, operator: PrefixOp) -> Option<Expr> {
        self.advance();
        let right = self.parse_expression(Precedence::Prefix)?;
        Some(Expr::Prefix {
            operator,
            right: Box::new(right),
        })
    }

    fn parse_infix_expression(&mut self, left: Expr, operator: InfixOp) -> Option<Expr> {
        let precedence = token_precedence(&self.current_token);
        self.advance();
        let right = self.parse_expression(precedence)?;
        Some(Expr::Infix {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_grouped_expression(&mut self) -> Option<Expr> {
        self.advance();
        let expr = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(Token::RParen) {
            return None;
        }
        Some(expr)
    }

    fn parse_if_expression(&mut self) -> Option<Expr> {
        if !self.expect_peek(Token::LParen) {
            return None;
        }
        self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(Token::RParen) {
            return None;
        }
        if !self.expect_peek(Token::LBrace) {
            return None;
        }
        let consequence = self.parse_block();

        let alternative = if self.peek_token == Token::Else {
            self.advance();
            if !self.expect_peek(Token::LBrace) {
                return None;
            }
            Some(self.parse_block())
        } else {
            None
        };

        Some(Expr::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    fn parse_block(&mut self) -> Block {
        let mut block = Block::default();
        self.advance();
        while self.current_token != Token::RBrace && self.current_token != Token::Eof {
            if let Some(stmt) = self.parse_statement() {
                block.statements.push(stmt);
            }
            self.advance();
        }
        block
    }

    fn parse_function_literal(&mut self) -> Option<Expr> {
        if !self.expect_peek(Token::LParen) {
            return None;
        }
        let parameters = self.parse_function_parameters()?;
        if !self.expect_peek(Token::LBrace) {
            return None;
        }
        let body = self.parse_block();
        Some(Expr::Function {
            name: None,
            parameters,
            body,
        })
    }

    fn parse_function_parameters(&mut self) -> Option<Vec<String>> {
        let mut parameters = Vec::new();

        if self.peek_token == Token::RParen {
            self.advance();
            return Some(parameters);
        }

        self.advance();
        loop {
            match &self.current_token {
                Token::Ident(name) => parameters.push(name.clone()),
                other => {
                    self.errors
                        .push(format!("expected parameter name, got {} instead", other));
                    return None;
                }
            }
            if self.peek_token != Token::Comma {
                break;
            }
            self.advance();
            self.advance();
        }

        if !self.expect_peek(Token::RParen) {
            return None;
        }
        Some(parameters)
    }

    fn parse_call_expression(&mut self, function: Expr) -> Option<Expr> {
        let arguments = self.parse_expression_list(Token::RParen)?;
        Some(Expr::Call {
            function: Box::new(function),
            arguments,
        })
    }

    fn parse_array_literal(&mut self) -> Option<Expr> {
        let elements = self.parse_expression_list(Token::RBracket)?;
        Some(Expr::ArrayLiteral(elements))
    }

    fn parse_expression_list(&mut self, end: Token) -> Option<Vec<Expr>> {
        let mut list = Vec::new();

        if self.peek_token == end {
            self.advance();
            return Some(list);
        }

        self.advance();
        list.push(self.parse_expression(Precedence::Lowest)?);

        while self.peek_token == Token::Comma {
            self.advance();
            self.advance();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }

        if !self.expect_peek(end) {
            return None;
        }
        Some(list)
    }

    fn parse_dict_literal(&mut self) -> Option<Expr> {
        let mut pairs = Vec::new();

        while self.peek_token != Token::RBrace {
            self.advance();
            let key = self.parse_expression(Precedence::Lowest)?;
            if !self.expect_peek(Token::Colon) {
                return None;
            }
            self.advance();
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));

            if self.peek_token != Token::RBrace && !self.expect_peek(Token::Comma) {
                return None;
            }
        }

        if !self.expect_peek(Token::RBrace) {
            return None;
        }
        Some(Expr::DictLiteral(pairs))
    }

    fn parse_index_expression(&mut self, left: Expr) -> Option<Expr> {
        self.advance();
        let index = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(Token::RBracket) {
            return None;
        }
        Some(Expr::Index {
            left: Box::new(left),
            index: Box::new(index),
        })
    }
}
