use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::{
    ast::{Def, Expr, ExprKind, FnDef, Program, Stmt, VarDef},
    diag::{Diagnostics, Fallible},
    types::{Fundamental, Type},
};

#[derive(Debug, Clone)]
struct Symbol {
    mangled: String,
    ty:      Type,
}

/// Semantic analysis: name resolution, renaming and type checking.
///
/// Definitions are checked before the top-level statements. Scope frames
/// and the loop stack are strictly LIFO and stay balanced on every exit
/// path, including error exits.
#[derive(Debug)]
pub struct Checker<'a> {
    globals:      IndexMap<String, Symbol>,
    scopes:       Vec<HashMap<String, Symbol>>,
    loop_stack:   Vec<u32>,
    current_fn:   Option<Type>,
    user_types:   HashSet<String>,
    rename_index: u32,
    next_loop_id: u32,
    diags:        &'a mut Diagnostics,
}

impl<'a> Checker<'a> {
    pub fn new(diags: &'a mut Diagnostics) -> Self {
        Self {
            globals: IndexMap::new(),
            scopes: Vec::new(),
            loop_stack: Vec::new(),
            current_fn: None,
            user_types: HashSet::new(),
            rename_index: 0,
            next_loop_id: 0,
            diags,
        }
    }

    pub fn check(&mut self, program: &mut Program) {
        for def in &mut program.definitions {
            if self.check_def(def).is_err() {
                return;
            }
        }
        // top-level statements share one scope frame, the body of the
        // implicit `main`
        self.begin_scope();
        for stmt in &mut program.statements {
            if self.check_stmt(stmt).is_err() {
                break;
            }
        }
        self.end_scope();
    }

    // -- scope plumbing --

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    /// Per-run unique rename for locals that survive scope flattening.
    fn mangle(&mut self, name: &str) -> String {
        self.rename_index += 1;
        format!("{}.{}", name, self.rename_index)
    }

    /// Class names recorded by the definition pass.
    pub fn user_types(&self) -> impl Iterator<Item = &str> {
        self.user_types.iter().map(String::as_str)
    }

    fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    // -- definitions --

    fn check_def(&mut self, def: &mut Def) -> Fallible {
        match def {
            Def::Function(func) => self.check_function(func),
            Def::Variable(var) => self.check_global_variable(var),
            Def::Class(class) => {
                // members are recorded but not descended into; classes do
                // not emit code yet
                self.user_types.insert(class.name.lexeme.clone());
                Ok(())
            }
        }
    }

    fn check_function(&mut self, func: &mut FnDef) -> Fallible {
        if self.globals.contains_key(&func.name.lexeme) {
            return Err(self.diags.error(
                format!("Function '{}' is already defined", func.name.lexeme),
                func.name.position,
            ));
        }

        let ty = Type::function(
            func.return_ty.clone(),
            func.params.iter().map(|p| p.ty.clone()).collect(),
        );
        self.globals.insert(
            func.name.lexeme.clone(),
            Symbol {
                mangled: func.name.lexeme.clone(),
                ty,
            },
        );

        let Some(body) = func.body.as_mut() else {
            // external declaration, nothing more to do
            return Ok(());
        };

        self.begin_scope();
        let mut result = Ok(());
        for param in &mut func.params {
            if self.globals.contains_key(&param.name.lexeme) {
                self.diags.warning(
                    format!("Parameter '{}' shadows a global name", param.name.lexeme),
                    param.name.position,
                );
            }
            if let Some(scope) = self.scopes.last() {
                if scope.contains_key(&param.name.lexeme) {
                    result = Err(self.diags.error(
                        format!("Parameter '{}' is already defined", param.name.lexeme),
                        param.name.position,
                    ));
                    break;
                }
            }
            let mangled = self.mangle(&param.name.lexeme);
            if let Some(scope) = self.scopes.last_mut() {
                scope.insert(
                    param.name.lexeme.clone(),
                    Symbol {
                        mangled: mangled.clone(),
                        ty: param.ty.clone(),
                    },
                );
            }
            param.name.lexeme = mangled;
        }

        if result.is_ok() {
            self.current_fn = Some(func.return_ty.clone());
            result = self.check_stmt(body);
            self.current_fn = None;
        }
        self.end_scope();
        result
    }

    fn check_global_variable(&mut self, var: &mut VarDef) -> Fallible {
        if self.globals.contains_key(&var.name.lexeme) {
            return Err(self.diags.error(
                format!("Variable '{}' is already defined", var.name.lexeme),
                var.name.position,
            ));
        }
        self.globals.insert(
            var.name.lexeme.clone(),
            Symbol {
                mangled: var.name.lexeme.clone(),
                ty: var.ty.clone(),
            },
        );
        Ok(())
    }

    fn check_local_variable(&mut self, var: &mut VarDef) -> Fallible {
        if let Some(scope) = self.scopes.last() {
            if scope.contains_key(&var.name.lexeme) {
                return Err(self.diags.error(
                    format!("Variable '{}' is already defined", var.name.lexeme),
                    var.name.position,
                ));
            }
        }

        if let Some(init) = var.init.as_mut() {
            self.check_expr(init)?;
            if var.ty.is_none() {
                var.ty = init.ty.clone();
            } else if var.ty != init.ty {
                return Err(self.diags.error(
                    format!(
                        "Cannot assign a value of type '{}' to a variable of type '{}'",
                        init.ty, var.ty
                    ),
                    init.position,
                ));
            }
        }

        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                var.name.lexeme.clone(),
                Symbol {
                    mangled: var.name.lexeme.clone(),
                    ty: var.ty.clone(),
                },
            );
        }
        Ok(())
    }

    // -- statements --

    fn check_stmt(&mut self, stmt: &mut Stmt) -> Fallible {
        match stmt {
            Stmt::Null => Ok(()),
            Stmt::Compound(statements) => {
                self.begin_scope();
                let mut result = Ok(());
                for statement in statements {
                    result = self.check_stmt(statement);
                    if result.is_err() {
                        break;
                    }
                }
                self.end_scope();
                result
            }
            Stmt::Expr(expr) => {
                self.check_expr(expr)?;
                if !matches!(
                    expr.kind,
                    ExprKind::Call(_, _) | ExprKind::Assign(_, _, _) | ExprKind::Member(_, _, _)
                ) {
                    self.diags.warning("Unused expression", expr.position);
                }
                Ok(())
            }
            Stmt::Return(expr, token) => {
                let Some(return_ty) = self.current_fn.clone() else {
                    return Err(self
                        .diags
                        .error("Cannot use return outside of a function", token.position));
                };
                self.check_expr(expr)?;
                if expr.ty != return_ty {
                    return Err(self.diags.error(
                        format!(
                            "Cannot return type '{}' from a function which returns type '{}'",
                            expr.ty, return_ty
                        ),
                        token.position,
                    ));
                }
                Ok(())
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                self.check_expr(cond)?;
                self.check_stmt(then)?;
                match otherwise {
                    Some(stmt) => self.check_stmt(stmt),
                    None => Ok(()),
                }
            }
            Stmt::While { cond, body } => {
                self.check_expr(cond)?;
                self.check_loop_body(body)
            }
            Stmt::Loop { body } => self.check_loop_body(body),
            Stmt::Break { token, loop_id } => match self.loop_stack.last() {
                Some(id) => {
                    *loop_id = *id;
                    Ok(())
                }
                None => Err(self
                    .diags
                    .error("Cannot use break outside of a loop", token.position)),
            },
            Stmt::Continue { token, loop_id } => match self.loop_stack.last() {
                Some(id) => {
                    *loop_id = *id;
                    Ok(())
                }
                None => Err(self
                    .diags
                    .error("Cannot use continue outside of a loop", token.position)),
            },
            Stmt::Var(var) => self.check_local_variable(var),
        }
    }

    fn check_loop_body(&mut self, body: &mut Stmt) -> Fallible {
        self.next_loop_id += 1;
        self.loop_stack.push(self.next_loop_id);
        let result = self.check_stmt(body);
        self.loop_stack.pop();
        result
    }

    // -- expressions --

    fn check_expr(&mut self, expr: &mut Expr) -> Fallible {
        match &mut expr.kind {
            ExprKind::Int(_) => {
                expr.ty = Type::I32;
                Ok(())
            }
            ExprKind::Float(_) => {
                expr.ty = Type::Fundamental(Fundamental::F32);
                Ok(())
            }
            ExprKind::Str(_) => {
                expr.ty = Type::Fundamental(Fundamental::String);
                Ok(())
            }
            ExprKind::Char(_) => {
                expr.ty = Type::Fundamental(Fundamental::Character);
                Ok(())
            }
            ExprKind::Array(elements) => {
                let Some((first, rest)) = elements.split_first_mut() else {
                    return Err(self.diags.error(
                        "Cannot infer the type of an empty array literal",
                        expr.position,
                    ));
                };
                self.check_expr(first)?;
                let element_ty = first.ty.clone();
                for element in rest {
                    self.check_expr(element)?;
                    if element.ty != element_ty {
                        return Err(self.diags.error(
                            format!("Array elements must all be of type '{}'", element_ty),
                            element.position,
                        ));
                    }
                }
                expr.ty = Type::Array(Box::new(element_ty));
                Ok(())
            }
            ExprKind::Unary(_, operand) => {
                self.check_expr(operand)?;
                expr.ty = operand.ty.clone();
                Ok(())
            }
            ExprKind::Binary(left, op, right) => {
                self.check_expr(left)?;
                self.check_expr(right)?;
                if left.ty != right.ty {
                    return Err(self.diags.error(
                        format!(
                            "Cannot apply operator '{}' to types '{}' and '{}'",
                            op.lexeme, left.ty, right.ty
                        ),
                        op.position,
                    ));
                }
                expr.ty = left.ty.clone();
                Ok(())
            }
            ExprKind::Assign(left, op, right) => {
                if !left.is_lvalue_shaped() {
                    return Err(self
                        .diags
                        .error("Cannot assign to non-lvalues", op.position));
                }
                self.check_expr(right)?;
                self.check_expr(left)?;
                if left.ty != right.ty {
                    return Err(self.diags.error(
                        format!(
                            "Cannot assign a value of type '{}' to a variable of type '{}'",
                            right.ty, left.ty
                        ),
                        op.position,
                    ));
                }
                expr.ty = left.ty.clone();
                Ok(())
            }
            ExprKind::Ident(token) => {
                if let Some(symbol) = self.lookup_local(&token.lexeme) {
                    token.lexeme = symbol.mangled.clone();
                    expr.ty = symbol.ty.clone();
                    return Ok(());
                }
                if let Some(symbol) = self.globals.get(&token.lexeme) {
                    expr.ty = symbol.ty.clone();
                    return Ok(());
                }
                Err(self.diags.error(
                    format!("Undefined name '{}'", token.lexeme),
                    token.position,
                ))
            }
            ExprKind::Call(name, args) => {
                let symbol = self
                    .lookup_local(&name.lexeme)
                    .or_else(|| self.globals.get(&name.lexeme))
                    .cloned();
                let Some(symbol) = symbol else {
                    return Err(self.diags.error(
                        format!("Undefined name '{}'", name.lexeme),
                        name.position,
                    ));
                };
                let Type::Function { ret, params } = symbol.ty else {
                    return Err(self.diags.error(
                        format!("'{}' is not a function", name.lexeme),
                        name.position,
                    ));
                };
                if args.len() != params.len() {
                    return Err(self.diags.error(
                        format!(
                            "Function '{}' takes {} arguments but was given {}",
                            name.lexeme,
                            params.len(),
                            args.len()
                        ),
                        name.position,
                    ));
                }
                for (arg, param_ty) in args.iter_mut().zip(&params) {
                    self.check_expr(arg)?;
                    if arg.ty != *param_ty {
                        return Err(self.diags.error(
                            format!(
                                "Cannot pass a value of type '{}' as a parameter of type '{}'",
                                arg.ty, param_ty
                            ),
                            arg.position,
                        ));
                    }
                }
                expr.ty = *ret;
                Ok(())
            }
            ExprKind::Member(left, op, member) => {
                if !left.is_lvalue_shaped() || !member.is_lvalue_shaped() {
                    return Err(self
                        .diags
                        .error("Cannot access members of non-lvalues", op.position));
                }
                self.check_expr(left)?;
                self.check_expr(member)?;
                // member types are not resolved yet; the access adopts the
                // base expression's type, whatever the member side yields
                expr.ty = left.ty.clone();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{lexer::Lexer, parser::Parser};

    fn check(source: &str) -> (Program, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = Lexer::new(source, &mut diags).tokenize();
        let mut program = Parser::new(&tokens, &mut diags).parse();
        assert!(!diags.has_errors(), "parse failed: {:?}", messages(&diags));
        Checker::new(&mut diags).check(&mut program);
        (program, diags)
    }

    fn messages(diags: &Diagnostics) -> Vec<String> {
        diags.iter().map(|d| d.message.clone()).collect()
    }

    #[test]
    fn test_return_type_mismatch() {
        let (_, diags) = check("<define> fn g(): i32 { return 1.0; } <!define>");
        assert_eq!(
            messages(&diags),
            vec!["Cannot return type 'f32' from a function which returns type 'i32'"]
        );
    }

    #[test]
    fn test_return_outside_function() {
        let (_, diags) = check("return 1;");
        assert_eq!(
            messages(&diags),
            vec!["Cannot use return outside of a function"]
        );
    }

    #[test]
    fn test_parameter_shadowing_warns() {
        let (_, diags) = check(
            "<define>\n\
             let x: i32 = 0;\n\
             fn f(x: i32): i32 { return x; }\n\
             <!define>",
        );
        assert!(!diags.has_errors());
        assert_eq!(messages(&diags), vec!["Parameter 'x' shadows a global name"]);
    }

    #[test]
    fn test_parameters_are_mangled() {
        let (program, diags) = check("<define> fn f(a: i32): i32 { return a; } <!define>");
        assert!(!diags.has_errors());
        let Def::Function(f) = &program.definitions[0] else {
            panic!("expected function")
        };
        assert_eq!(f.params[0].name.lexeme, "a.1");
        // the use inside the body was rewritten to the mangled name
        let Some(Stmt::Compound(body)) = f.body.as_ref() else {
            panic!("expected compound body")
        };
        let Stmt::Return(expr, _) = &body[0] else {
            panic!("expected return")
        };
        let ExprKind::Ident(token) = &expr.kind else {
            panic!("expected identifier")
        };
        assert_eq!(token.lexeme, "a.1");
        assert_eq!(expr.ty, Type::I32);
    }

    #[test]
    fn test_duplicate_function() {
        let (_, diags) = check(
            "<define> fn f(): i32 { return 0; } fn f(): i32 { return 1; } <!define>",
        );
        assert_eq!(messages(&diags), vec!["Function 'f' is already defined"]);
    }

    #[test]
    fn test_duplicate_local() {
        let (_, diags) = check("let a: i32 = 1; let a: i32 = 2;");
        assert_eq!(messages(&diags), vec!["Variable 'a' is already defined"]);
    }

    #[test]
    fn test_shadowing_in_inner_scope_is_allowed() {
        let (_, diags) = check("let a: i32 = 1; { let a: i32 = 2; a; }");
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_break_outside_loop() {
        let (_, diags) = check("break;");
        assert_eq!(messages(&diags), vec!["Cannot use break outside of a loop"]);
    }

    #[test]
    fn test_break_tagged_with_innermost_loop() {
        let (program, diags) = check("loop { while 1 == 1 => { break; } continue; }");
        assert!(!diags.has_errors());
        let Stmt::Loop { body } = &program.statements[0] else {
            panic!("expected loop")
        };
        let Stmt::Compound(outer) = body.as_ref() else {
            panic!("expected compound")
        };
        let Stmt::While { body: inner, .. } = &outer[0] else {
            panic!("expected while")
        };
        let Stmt::Compound(inner) = inner.as_ref() else {
            panic!("expected compound")
        };
        let Stmt::Break { loop_id, .. } = &inner[0] else {
            panic!("expected break")
        };
        let Stmt::Continue {
            loop_id: continue_id,
            ..
        } = &outer[1]
        else {
            panic!("expected continue")
        };
        // the break belongs to the while frame, the continue to the loop
        assert_ne!(loop_id, continue_id);
        assert_eq!(*continue_id, 1);
        assert_eq!(*loop_id, 2);
    }

    #[test]
    fn test_class_names_are_recorded() {
        let mut diags = Diagnostics::new();
        let tokens = Lexer::new(
            "<define> class Vec2 { public let x: i32; } <!define>",
            &mut diags,
        )
        .tokenize();
        let mut program = Parser::new(&tokens, &mut diags).parse();
        let mut checker = Checker::new(&mut diags);
        checker.check(&mut program);
        assert!(!checker.diags.has_errors());
        assert_eq!(checker.user_types().collect::<Vec<_>>(), vec!["Vec2"]);
    }

    #[test]
    fn test_type_inference_from_initializer() {
        let (program, diags) = check("let a = 1; a;");
        assert!(!diags.has_errors());
        let Stmt::Var(var) = &program.statements[0] else {
            panic!("expected variable")
        };
        assert_eq!(var.ty, Type::I32);
    }

    #[test]
    fn test_initializer_type_mismatch() {
        let (_, diags) = check("let a: i32 = 1.0;");
        assert_eq!(
            messages(&diags),
            vec!["Cannot assign a value of type 'f32' to a variable of type 'i32'"]
        );
    }

    #[test]
    fn test_binary_operands_must_match() {
        let (_, diags) = check("1 + 1.0;");
        assert_eq!(
            messages(&diags),
            vec!["Cannot apply operator '+' to types 'i32' and 'f32'"]
        );
    }

    #[test]
    fn test_assign_to_non_lvalue() {
        let (_, diags) = check("1 = 2;");
        assert_eq!(messages(&diags), vec!["Cannot assign to non-lvalues"]);
    }

    #[test]
    fn test_undefined_name() {
        let (_, diags) = check("missing;");
        assert_eq!(messages(&diags), vec!["Undefined name 'missing'"]);
    }

    #[test]
    fn test_member_access_on_non_lvalue() {
        let (_, diags) = check("(1 + 2).x;");
        assert_eq!(
            messages(&diags),
            vec!["Cannot access members of non-lvalues"]
        );
    }

    #[test]
    fn test_member_subexpression_is_checked() {
        let (_, diags) = check(
            "<define>\n\
             fn m(a: i32): i32 { return a; }\n\
             let o: i32 = 0;\n\
             <!define>\n\
             o.m(missing);",
        );
        assert_eq!(messages(&diags), vec!["Undefined name 'missing'"]);
    }

    #[test]
    fn test_call_arity_and_types() {
        let (_, diags) = check(
            "<define> fn f(a: i32): i32 { return a; } <!define>\n\
             f(1, 2);",
        );
        assert_eq!(
            messages(&diags),
            vec!["Function 'f' takes 1 arguments but was given 2"]
        );

        let (_, diags) = check(
            "<define> fn f(a: i32): i32 { return a; } <!define>\n\
             f(1.0);",
        );
        assert_eq!(
            messages(&diags),
            vec!["Cannot pass a value of type 'f32' as a parameter of type 'i32'"]
        );
    }

    #[test]
    fn test_call_of_non_function() {
        let (_, diags) = check("<define> let v: i32 = 0; <!define> v();");
        assert_eq!(messages(&diags), vec!["'v' is not a function"]);
    }

    #[test]
    fn test_unused_expression_warns() {
        let (_, diags) = check("1 + 2;");
        assert!(!diags.has_errors());
        assert_eq!(messages(&diags), vec!["Unused expression"]);
    }

    #[test]
    fn test_array_literal_typing() {
        let (program, diags) = check("let a = [1, 2, 3];");
        assert!(!diags.has_errors());
        let Stmt::Var(var) = &program.statements[0] else {
            panic!("expected variable")
        };
        assert_eq!(var.ty, Type::Array(Box::new(Type::I32)));

        let (_, diags) = check("[1, 2.0];");
        assert_eq!(
            messages(&diags),
            vec!["Array elements must all be of type 'i32'"]
        );

        let (_, diags) = check("[];");
        assert_eq!(
            messages(&diags),
            vec!["Cannot infer the type of an empty array literal"]
        );
    }

    #[test]
    fn test_every_checked_expression_is_typed() {
        let (program, diags) = check("let a: i32 = 1; a = a + 2; a;");
        assert!(!diags.has_errors());
        for stmt in &program.statements {
            match stmt {
                Stmt::Var(var) => {
                    if let Some(init) = &var.init {
                        assert!(!init.ty.is_empty());
                    }
                }
                Stmt::Expr(expr) => assert!(!expr.ty.is_empty()),
                _ => {}
            }
        }
    }
}
