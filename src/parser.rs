use crate::{
    ast::{ClassDef, Def, Expr, ExprKind, FnDef, Param, Program, Stmt, VarDef, Visibility},
    diag::{Diagnostics, Fallible},
    token::{Token, TokenKind},
    types::{Fundamental, Type},
};

/// Binding power of an infix token; 0 means "not an operator". Unary
/// operators parse their operand at 100 so they bind tighter than any
/// binary operator.
fn binding_power(kind: TokenKind) -> u8 {
    match kind {
        TokenKind::Dot | TokenKind::Arrow => 110,
        TokenKind::Star | TokenKind::Slash => 80,
        TokenKind::Plus | TokenKind::Minus => 70,
        TokenKind::Less | TokenKind::LessEq | TokenKind::Greater | TokenKind::GreaterEq => 60,
        TokenKind::EqEq | TokenKind::BangEq => 50,
        TokenKind::KwAnd => 40,
        TokenKind::KwOr => 30,
        TokenKind::Eq => 20,
        _ => 0,
    }
}

const UNARY_POWER: u8 = 100;
const MEMBER_POWER: u8 = 110;

/// Recursive-descent statement parser with a Pratt expression core.
///
/// Recovery is deliberately shallow: a missing token is reported and
/// parsing continues; inner loops stop at `}` `)` `]` and EOF. The
/// presence of errors in the sink is the signal for later phases to
/// abort.
#[derive(Debug)]
pub struct Parser<'a> {
    tokens: &'a [Token],
    cur:    usize,
    diags:  &'a mut Diagnostics,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], diags: &'a mut Diagnostics) -> Self {
        Self {
            tokens,
            cur: 0,
            diags,
        }
    }

    fn current(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.cur.min(last)]
    }

    fn peek(&self, depth: usize) -> Option<&Token> {
        self.tokens.get(self.cur + depth)
    }

    fn advance(&mut self) {
        if self.cur + 1 < self.tokens.len() {
            self.cur += 1;
        } else {
            self.cur = self.tokens.len();
        }
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.cur < self.tokens.len() && self.current().kind == kind
    }

    fn at_end(&self) -> bool {
        self.cur >= self.tokens.len() || self.current().kind == TokenKind::Eof
    }

    /// Soft expectation: advances past the token when present, otherwise
    /// reports and lets parsing continue from the same token.
    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.at(kind) {
            self.advance();
        } else {
            self.diags.error(message, self.current().position);
        }
    }

    fn expect_identifier(&mut self, message: &str) -> Fallible<Token> {
        if self.at(TokenKind::Identifier) {
            let token = self.current().clone();
            self.advance();
            Ok(token)
        } else {
            Err(self.diags.error(message, self.current().position))
        }
    }

    pub fn parse(&mut self) -> Program {
        let mut program = Program::default();
        while !self.at_end() {
            if self.at_define_open() {
                self.parse_define_region(&mut program.definitions);
            } else if let Ok(stmt) = self.parse_statement() {
                program.statements.push(stmt);
            }
        }
        program
    }

    // -- definitions --

    fn at_define_open(&self) -> bool {
        self.at(TokenKind::Less)
            && self.peek(1).is_some_and(|t| {
                t.kind == TokenKind::Identifier && t.lexeme == "define"
            })
            && self.peek(2).is_some_and(|t| t.kind == TokenKind::Greater)
    }

    fn at_define_close(&self) -> bool {
        self.at(TokenKind::Less)
            && self.peek(1).is_some_and(|t| t.kind == TokenKind::Bang)
            && self.peek(2).is_some_and(|t| {
                t.kind == TokenKind::Identifier && t.lexeme == "define"
            })
            && self.peek(3).is_some_and(|t| t.kind == TokenKind::Greater)
    }

    fn parse_define_region(&mut self, definitions: &mut Vec<Def>) {
        self.advance();
        self.advance();
        self.advance();

        while !self.at_define_close() && !self.at_end() {
            if let Ok(def) = self.parse_definition() {
                definitions.push(def);
            }
        }

        if self.at_define_close() {
            self.advance();
            self.advance();
            self.advance();
            self.advance();
        } else {
            self.diags
                .error("Expected '<!define>'", self.current().position);
        }
    }

    fn parse_definition(&mut self) -> Fallible<Def> {
        match self.current().kind {
            TokenKind::KwFn => self.parse_function(false).map(Def::Function),
            TokenKind::KwLet | TokenKind::KwConst => {
                self.parse_variable(true).map(Def::Variable)
            }
            TokenKind::KwClass => self.parse_class().map(Def::Class),
            TokenKind::KwExternal => {
                self.advance();
                if self.at(TokenKind::KwFn) {
                    self.parse_function(true).map(Def::Function)
                } else {
                    Err(self
                        .diags
                        .error("Expected 'fn' after 'external'", self.current().position))
                }
            }
            _ => {
                let err = self
                    .diags
                    .error("Expected definition", self.current().position);
                self.advance();
                Err(err)
            }
        }
    }

    fn parse_function(&mut self, is_external: bool) -> Fallible<FnDef> {
        self.advance();
        let name = self.expect_identifier("Expected function name")?;

        let mut params = Vec::new();
        if self.at(TokenKind::LParen) {
            self.advance();
            while !self.at(TokenKind::RParen) && !self.at_end() {
                let param_name = self.expect_identifier("Expected parameter name")?;
                self.consume(TokenKind::Colon, "Expected ':'");
                let ty = self.parse_type()?;
                params.push(Param {
                    name: param_name,
                    ty,
                });
                if self.at(TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
            self.consume(TokenKind::RParen, "Expected ')'");
        }

        let return_ty = if self.at(TokenKind::Colon) {
            self.advance();
            self.parse_type()?
        } else {
            Type::NONE
        };

        let body = if is_external {
            self.consume(TokenKind::Semicolon, "Expected ';'");
            None
        } else {
            Some(self.parse_statement()?)
        };

        Ok(FnDef {
            name,
            params,
            return_ty,
            body,
            is_external,
        })
    }

    fn parse_variable(&mut self, is_global: bool) -> Fallible<VarDef> {
        let is_const = self.at(TokenKind::KwConst);
        self.advance();
        let name = self.expect_identifier("Expected variable name")?;

        let ty = if self.at(TokenKind::Colon) {
            self.advance();
            self.parse_type()?
        } else {
            Type::NONE
        };

        let init = if self.at(TokenKind::Eq) {
            self.advance();
            Some(self.parse_expression(0)?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expected ';'");

        Ok(VarDef {
            name,
            ty,
            init,
            is_const,
            is_global,
        })
    }

    fn parse_class(&mut self) -> Fallible<ClassDef> {
        self.advance();
        let name = self.expect_identifier("Expected class name")?;
        self.consume(TokenKind::LBrace, "Expected '{'");

        let mut members = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at_end() {
            let visibility = match self.current().kind {
                TokenKind::KwPublic => {
                    self.advance();
                    Visibility::Public
                }
                TokenKind::KwPrivate => {
                    self.advance();
                    Visibility::Private
                }
                _ => {
                    self.diags
                        .error("Expected 'public' or 'private'", self.current().position);
                    Visibility::Public
                }
            };
            if let Ok(def) = self.parse_definition() {
                members.push((visibility, def));
            }
        }
        self.consume(TokenKind::RBrace, "Expected '}'");

        Ok(ClassDef { name, members })
    }

    /// Type syntax: a primitive keyword, `( T )` meaning pointer-to,
    /// `[ T ]` meaning array-of, or an identifier naming a user type.
    fn parse_type(&mut self) -> Fallible<Type> {
        let token = self.current().clone();
        match token.kind {
            kind if kind.is_type_keyword() => {
                self.advance();
                let fund = kind.fundamental().unwrap_or(Fundamental::Null);
                Ok(Type::Fundamental(fund))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_type()?;
                self.consume(TokenKind::RParen, "Expected ')'");
                Ok(Type::Pointer(Box::new(inner)))
            }
            TokenKind::LBracket => {
                self.advance();
                let inner = self.parse_type()?;
                self.consume(TokenKind::RBracket, "Expected ']'");
                Ok(Type::Array(Box::new(inner)))
            }
            TokenKind::Identifier => {
                self.advance();
                Ok(Type::UserDefined(token.lexeme))
            }
            _ => Err(self.diags.error("Expected type", token.position)),
        }
    }

    // -- statements --

    pub fn parse_statement(&mut self) -> Fallible<Stmt> {
        match self.current().kind {
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Null)
            }
            TokenKind::LBrace => self.parse_compound(),
            TokenKind::KwReturn => self.parse_return(),
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwLoop => {
                self.advance();
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::Loop { body })
            }
            TokenKind::KwWhile => self.parse_while(),
            TokenKind::KwBreak => {
                let token = self.current().clone();
                self.advance();
                self.consume(TokenKind::Semicolon, "Expected ';'");
                Ok(Stmt::Break { token, loop_id: 0 })
            }
            TokenKind::KwContinue => {
                let token = self.current().clone();
                self.advance();
                self.consume(TokenKind::Semicolon, "Expected ';'");
                Ok(Stmt::Continue { token, loop_id: 0 })
            }
            TokenKind::KwLet | TokenKind::KwConst => {
                self.parse_variable(false).map(Stmt::Var)
            }
            _ => {
                let expr = self.parse_expression(0)?;
                self.consume(TokenKind::Semicolon, "Expected ';'");
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_compound(&mut self) -> Fallible<Stmt> {
        self.advance();
        let mut statements = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at_end() {
            if let Ok(stmt) = self.parse_statement() {
                statements.push(stmt);
            }
        }
        self.consume(TokenKind::RBrace, "Expected '}'");
        Ok(Stmt::Compound(statements))
    }

    fn parse_return(&mut self) -> Fallible<Stmt> {
        let token = self.current().clone();
        self.advance();
        let expr = self.parse_expression(0)?;
        self.consume(TokenKind::Semicolon, "Expected ';'");
        Ok(Stmt::Return(expr, token))
    }

    fn parse_if(&mut self) -> Fallible<Stmt> {
        self.advance();
        let cond = self.parse_expression(0)?;
        self.consume(TokenKind::DoubleArrow, "Expected '=>'");
        let then = Box::new(self.parse_statement()?);
        let otherwise = if self.at(TokenKind::KwElse) {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then,
            otherwise,
        })
    }

    fn parse_while(&mut self) -> Fallible<Stmt> {
        self.advance();
        let cond = self.parse_expression(0)?;
        self.consume(TokenKind::DoubleArrow, "Expected '=>'");
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While { cond, body })
    }

    // -- expressions --

    pub fn parse_expression(&mut self, power: u8) -> Fallible<Expr> {
        let token = self.current().clone();
        self.advance();
        let mut left = self.nud(token)?;
        while binding_power(self.current().kind) > power {
            let op = self.current().clone();
            self.advance();
            left = self.led(op, left)?;
        }
        Ok(left)
    }

    fn nud(&mut self, token: Token) -> Fallible<Expr> {
        match token.kind {
            TokenKind::IntLit => match token.lexeme.parse::<i64>() {
                Ok(value) => Ok(Expr::new(ExprKind::Int(value), token.position)),
                Err(_) => Err(self.diags.error("Invalid integer literal", token.position)),
            },
            TokenKind::FloatLit => match token.lexeme.parse::<f64>() {
                Ok(value) => Ok(Expr::new(ExprKind::Float(value), token.position)),
                Err(_) => Err(self.diags.error("Invalid float literal", token.position)),
            },
            TokenKind::StringLit => Ok(Expr::new(
                ExprKind::Str(token.lexeme.clone()),
                token.position,
            )),
            TokenKind::CharLit => Ok(Expr::new(
                ExprKind::Char(token.lexeme.clone()),
                token.position,
            )),
            TokenKind::Minus | TokenKind::Bang | TokenKind::Tilde => {
                let operand = self.parse_expression(UNARY_POWER)?;
                let position = token.position.merge(&operand.position);
                Ok(Expr::new(
                    ExprKind::Unary(token, Box::new(operand)),
                    position,
                ))
            }
            TokenKind::LParen => {
                let expr = self.parse_expression(0)?;
                if !self.at(TokenKind::RParen) {
                    return Err(self.diags.error("Expected ')'", self.current().position));
                }
                self.advance();
                Ok(expr)
            }
            TokenKind::Identifier => {
                if self.at(TokenKind::LParen) {
                    self.parse_call(token)
                } else {
                    let position = token.position;
                    Ok(Expr::new(ExprKind::Ident(token), position))
                }
            }
            TokenKind::LBracket => self.parse_array(token),
            _ => Err(self.diags.error("Expected expression", token.position)),
        }
    }

    fn parse_call(&mut self, name: Token) -> Fallible<Expr> {
        self.advance();
        let mut args = Vec::new();
        while !self.at(TokenKind::RParen) && !self.at_end() {
            args.push(self.parse_expression(0)?);
            if self.at(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        let position = name.position.merge(&self.current().position);
        self.consume(TokenKind::RParen, "Expected ')'");
        Ok(Expr::new(ExprKind::Call(name, args), position))
    }

    fn parse_array(&mut self, open: Token) -> Fallible<Expr> {
        let mut elements = Vec::new();
        while !self.at(TokenKind::RBracket) && !self.at_end() {
            elements.push(self.parse_expression(0)?);
            if self.at(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        let position = open.position.merge(&self.current().position);
        self.consume(TokenKind::RBracket, "Expected ']'");
        Ok(Expr::new(ExprKind::Array(elements), position))
    }

    fn led(&mut self, op: Token, left: Expr) -> Fallible<Expr> {
        let power = binding_power(op.kind);
        match op.kind {
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::Less
            | TokenKind::LessEq
            | TokenKind::Greater
            | TokenKind::GreaterEq
            | TokenKind::EqEq
            | TokenKind::BangEq
            | TokenKind::KwAnd
            | TokenKind::KwOr => {
                let right = self.parse_expression(power)?;
                let position = left.position.merge(&right.position);
                Ok(Expr::new(
                    ExprKind::Binary(Box::new(left), op, Box::new(right)),
                    position,
                ))
            }
            TokenKind::Eq => {
                let right = self.parse_expression(power)?;
                let position = left.position.merge(&right.position);
                Ok(Expr::new(
                    ExprKind::Assign(Box::new(left), op, Box::new(right)),
                    position,
                ))
            }
            TokenKind::Dot | TokenKind::Arrow => {
                let member = self.parse_expression(MEMBER_POWER)?;
                let position = left.position.merge(&member.position);
                Ok(Expr::new(
                    ExprKind::Member(Box::new(left), op, Box::new(member)),
                    position,
                ))
            }
            _ => Err(self.diags.error("Expected expression", op.position)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> (Program, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = Lexer::new(source, &mut diags).tokenize();
        let program = Parser::new(&tokens, &mut diags).parse();
        (program, diags)
    }

    fn parse_expr(source: &str) -> Expr {
        let (program, diags) = parse(&format!("{};", source));
        assert!(!diags.has_errors(), "unexpected errors for {:?}", source);
        match program.statements.into_iter().next() {
            Some(Stmt::Expr(expr)) => expr,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    fn op_lexeme(expr: &Expr) -> &str {
        match &expr.kind {
            ExprKind::Binary(_, op, _) => &op.lexeme,
            ExprKind::Assign(_, op, _) => &op.lexeme,
            ExprKind::Member(_, op, _) => &op.lexeme,
            other => panic!("expected operator node, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let expr = parse_expr("1 + 2 * 3");
        assert_eq!(op_lexeme(&expr), "+");
        let ExprKind::Binary(left, _, right) = expr.kind else {
            unreachable!()
        };
        assert_eq!(left.kind, ExprKind::Int(1));
        assert_eq!(op_lexeme(&right), "*");
    }

    #[test]
    fn test_left_associativity() {
        let expr = parse_expr("1 - 2 - 3");
        let ExprKind::Binary(left, op, right) = expr.kind else {
            unreachable!()
        };
        assert_eq!(op.lexeme, "-");
        assert_eq!(right.kind, ExprKind::Int(3));
        assert_eq!(op_lexeme(&left), "-");
    }

    #[test]
    fn test_comparison_binds_looser_than_arithmetic() {
        let expr = parse_expr("1 + 2 < 3 * 4");
        assert_eq!(op_lexeme(&expr), "<");
    }

    #[test]
    fn test_logic_binds_loosest() {
        let expr = parse_expr("a == 1 and b == 2 or c == 3");
        assert_eq!(op_lexeme(&expr), "or");
        let ExprKind::Binary(left, _, _) = expr.kind else {
            unreachable!()
        };
        assert_eq!(op_lexeme(&left), "and");
    }

    #[test]
    fn test_unary_binds_tighter_than_mul() {
        let expr = parse_expr("-a * 3");
        assert_eq!(op_lexeme(&expr), "*");
        let ExprKind::Binary(left, _, _) = expr.kind else {
            unreachable!()
        };
        assert!(matches!(left.kind, ExprKind::Unary(_, _)));
    }

    #[test]
    fn test_assignment() {
        let expr = parse_expr("x = 1 + 2");
        let ExprKind::Assign(lhs, _, rhs) = expr.kind else {
            panic!("expected assignment")
        };
        assert!(matches!(lhs.kind, ExprKind::Ident(_)));
        assert_eq!(op_lexeme(&rhs), "+");
    }

    #[test]
    fn test_member_access() {
        let expr = parse_expr("point.x");
        assert_eq!(op_lexeme(&expr), ".");
        let expr = parse_expr("ptr->next");
        assert_eq!(op_lexeme(&expr), "->");
    }

    #[test]
    fn test_member_binds_tighter_than_assignment() {
        let expr = parse_expr("point.x = 1");
        let ExprKind::Assign(lhs, _, _) = expr.kind else {
            panic!("expected assignment")
        };
        assert!(matches!(lhs.kind, ExprKind::Member(_, _, _)));
    }

    #[test]
    fn test_call_and_array_with_trailing_comma() {
        let expr = parse_expr("f(1, 2,)");
        let ExprKind::Call(name, args) = expr.kind else {
            panic!("expected call")
        };
        assert_eq!(name.lexeme, "f");
        assert_eq!(args.len(), 2);

        let expr = parse_expr("[1, 2, 3,]");
        let ExprKind::Array(elements) = expr.kind else {
            panic!("expected array literal")
        };
        assert_eq!(elements.len(), 3);
    }

    #[test]
    fn test_statements() {
        let (program, diags) = parse(
            "if x == 1 => { return 2; } else ;\n\
             while x < 10 => x = x + 1;\n\
             loop { break; }\n\
             let y: i32 = 0;\n\
             continue;",
        );
        assert!(!diags.has_errors());
        assert_eq!(program.statements.len(), 5);
        assert!(matches!(program.statements[0], Stmt::If { .. }));
        assert!(matches!(program.statements[1], Stmt::While { .. }));
        assert!(matches!(program.statements[2], Stmt::Loop { .. }));
        assert!(matches!(program.statements[3], Stmt::Var(_)));
        assert!(matches!(program.statements[4], Stmt::Continue { .. }));
    }

    #[test]
    fn test_define_region() {
        let (program, diags) = parse(
            "<define>\n\
             external fn putint(x: i32): i32;\n\
             fn add(a: i32, b: i32,): i32 { return a + b; }\n\
             let g: i32 = 1;\n\
             class Vec2 { public let x: i32; private let y: i32; }\n\
             <!define>\n\
             add(1, 2);",
        );
        assert!(!diags.has_errors(), "{:?}", diags.iter().collect::<Vec<_>>());
        assert_eq!(program.definitions.len(), 4);
        assert_eq!(program.statements.len(), 1);

        let Def::Function(ext) = &program.definitions[0] else {
            panic!("expected function")
        };
        assert!(ext.is_external);
        assert!(ext.body.is_none());

        let Def::Function(add) = &program.definitions[1] else {
            panic!("expected function")
        };
        assert_eq!(add.params.len(), 2);
        assert_eq!(add.return_ty, Type::I32);

        let Def::Class(class) = &program.definitions[3] else {
            panic!("expected class")
        };
        assert_eq!(class.members.len(), 2);
        assert_eq!(class.members[0].0, Visibility::Public);
        assert_eq!(class.members[1].0, Visibility::Private);
    }

    #[test]
    fn test_type_syntax() {
        let (program, diags) = parse(
            "<define>\n\
             fn f(p: (i32), a: [i64], u: Vec2): i32 { return 0; }\n\
             <!define>",
        );
        assert!(!diags.has_errors());
        let Def::Function(f) = &program.definitions[0] else {
            panic!("expected function")
        };
        assert_eq!(f.params[0].ty, Type::Pointer(Box::new(Type::I32)));
        assert_eq!(
            f.params[1].ty,
            Type::Array(Box::new(Type::Fundamental(Fundamental::I64)))
        );
        assert_eq!(f.params[2].ty, Type::UserDefined("Vec2".to_string()));
    }

    #[test]
    fn test_missing_semicolon_recovers() {
        let (program, diags) = parse("1 + 2\n3;");
        let messages: Vec<_> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["Expected ';'"]);
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn test_missing_double_arrow() {
        let (_, diags) = parse("if 1 { ; }");
        let messages: Vec<_> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["Expected '=>'"]);
    }

    #[test]
    fn test_bad_expression_start() {
        let (_, diags) = parse("* 2;");
        assert!(diags.has_errors());
        assert!(diags.iter().any(|d| d.message == "Expected expression"));
    }
}
