use std::collections::HashMap;

use indexmap::IndexSet;

use crate::{
    ast::{Def, Expr, ExprKind, FnDef, Program, Stmt, VarDef},
    diag::{Diagnostics, Fallible, Reported},
    ir::{CondCode, Instr, Operand, Register, Size},
    platform::Platform,
    token::{Token, TokenKind},
    types::{Fundamental, Type},
};

pub fn size_of(ty: &Type) -> Size {
    match ty {
        Type::Fundamental(fund) => match fund {
            Fundamental::None | Fundamental::Null => Size::DWord,
            Fundamental::I32 => Size::DWord,
            Fundamental::I64 => Size::QWord,
            Fundamental::F32 => Size::DWord,
            Fundamental::F64 => Size::QWord,
            Fundamental::String => Size::QWord,
            Fundamental::Character => Size::Byte,
        },
        Type::Pointer(_) | Type::Array(_) | Type::Function { .. } | Type::UserDefined(_) => {
            Size::QWord
        }
        Type::Empty => Size::DWord,
    }
}

fn cond_code(kind: TokenKind) -> CondCode {
    match kind {
        TokenKind::EqEq => CondCode::Equal,
        TokenKind::BangEq => CondCode::NotEqual,
        TokenKind::Greater => CondCode::Greater,
        TokenKind::GreaterEq => CondCode::GreaterEq,
        TokenKind::Less => CondCode::Less,
        TokenKind::LessEq => CondCode::LessEq,
        _ => CondCode::None,
    }
}

#[derive(Debug, Clone)]
struct LoopFrame {
    start: String,
    exit:  String,
}

/// Lowers the checked AST to the flat IR, one `FnDef` per user function
/// plus the implicit `main` built from the top-level statements.
///
/// Temporaries live in the frame: `allocate` bumps a per-function stack
/// index whose final value becomes the function's `stack_alloc`. Label
/// counters live here so that repeated runs are deterministic.
#[derive(Debug)]
pub struct CodeGenerator<'a> {
    platform:    Platform,
    instrs:      Vec<Instr>,
    externals:   IndexSet<String>,
    locals:      HashMap<String, Operand>,
    stack_index: i64,
    if_index:    u64,
    loop_index:  u64,
    cmp_index:   u64,
    loop_frames: Vec<LoopFrame>,
    diags:       &'a mut Diagnostics,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(platform: Platform, diags: &'a mut Diagnostics) -> Self {
        Self {
            platform,
            instrs: Vec::new(),
            externals: IndexSet::new(),
            locals: HashMap::new(),
            stack_index: 0,
            if_index: 0,
            loop_index: 0,
            cmp_index: 0,
            loop_frames: Vec::new(),
            diags,
        }
    }

    pub fn generate(&mut self, program: &Program) {
        for def in &program.definitions {
            self.gen_definition(def);
        }
        self.gen_main(&program.statements);
    }

    pub fn finish(self) -> (Vec<Instr>, Vec<String>) {
        (self.instrs, self.externals.into_iter().collect())
    }

    fn gen_definition(&mut self, def: &Def) {
        match def {
            Def::Function(func) if func.is_external => {
                self.externals.insert(func.name.lexeme.clone());
            }
            Def::Function(func) => self.gen_function(func),
            // no data section; globals and classes emit nothing
            Def::Variable(_) | Def::Class(_) => {}
        }
    }

    fn gen_function(&mut self, func: &FnDef) {
        let Some(body_stmt) = func.body.as_ref() else {
            return;
        };

        self.stack_index = 0;
        self.locals.clear();
        let mut body = Vec::new();

        let regs = self.platform.argument_registers();
        for (param, reg) in func.params.iter().zip(regs) {
            let size = size_of(&param.ty);
            let slot = self.allocate(size);
            body.push(Instr::Move {
                src: Operand::Reg(*reg, size),
                dst: slot,
                sign_extend: false,
            });
            self.locals.insert(param.name.lexeme.clone(), slot);
        }
        // overflow parameters already live above the saved frame pointer
        for (i, param) in func.params.iter().enumerate().skip(regs.len()) {
            let offset = -((i - regs.len()) as i64 + 2) * 8;
            self.locals.insert(
                param.name.lexeme.clone(),
                Operand::Stack(offset, size_of(&param.ty)),
            );
        }

        let _ = self.gen_stmt(body_stmt, &mut body);

        body.push(Instr::Move {
            src: Operand::Imm(0),
            dst: Operand::Reg(Register::Ax, Size::DWord),
            sign_extend: false,
        });
        body.push(Instr::Return);

        self.instrs.push(Instr::FnDef {
            name: func.name.lexeme.clone(),
            body,
            stack_alloc: self.stack_index,
        });
    }

    fn gen_main(&mut self, statements: &[Stmt]) {
        self.stack_index = 0;
        self.locals.clear();
        let mut body = Vec::new();

        for stmt in statements {
            let _ = self.gen_stmt(stmt, &mut body);
        }

        body.push(Instr::Move {
            src: Operand::Imm(0),
            dst: Operand::Reg(Register::Ax, Size::DWord),
            sign_extend: false,
        });
        body.push(Instr::Return);

        self.instrs.push(Instr::FnDef {
            name: "main".to_string(),
            body,
            stack_alloc: self.stack_index,
        });
    }

    fn allocate(&mut self, size: Size) -> Operand {
        self.stack_index += size.bytes();
        Operand::Stack(self.stack_index, size)
    }

    /// Byte-sized temp for setCC results; the slot itself spans a dword.
    fn allocate_flag(&mut self) -> Operand {
        self.stack_index += Size::DWord.bytes();
        Operand::Stack(self.stack_index, Size::Byte)
    }

    // -- statements --

    fn gen_stmt(&mut self, stmt: &Stmt, out: &mut Vec<Instr>) -> Fallible {
        match stmt {
            Stmt::Null => Ok(()),
            Stmt::Compound(statements) => {
                for statement in statements {
                    self.gen_stmt(statement, out)?;
                }
                Ok(())
            }
            Stmt::Expr(expr) => {
                self.gen_expr(expr, out)?;
                Ok(())
            }
            Stmt::Var(var) => self.gen_variable(var, out),
            Stmt::Return(expr, _) => {
                let value = self.gen_expr(expr, out)?;
                out.push(Instr::Move {
                    src: value,
                    dst: Operand::Reg(Register::Ax, Size::DWord),
                    sign_extend: false,
                });
                out.push(Instr::Return);
                Ok(())
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => self.gen_if(cond, then, otherwise.as_deref(), out),
            Stmt::While { cond, body } => {
                let (start, exit) = self.next_loop_labels();
                self.loop_frames.push(LoopFrame {
                    start: start.clone(),
                    exit: exit.clone(),
                });
                let result = self.gen_while_body(cond, body, &start, &exit, out);
                self.loop_frames.pop();
                result
            }
            Stmt::Loop { body } => {
                let (start, exit) = self.next_loop_labels();
                self.loop_frames.push(LoopFrame {
                    start: start.clone(),
                    exit: exit.clone(),
                });
                out.push(Instr::Label(start.clone()));
                let result = self.gen_stmt(body, out);
                out.push(Instr::Jump {
                    label: start,
                    cond: CondCode::None,
                });
                out.push(Instr::Label(exit));
                self.loop_frames.pop();
                result
            }
            Stmt::Break { .. } => {
                if let Some(frame) = self.loop_frames.last() {
                    out.push(Instr::Jump {
                        label: frame.exit.clone(),
                        cond: CondCode::None,
                    });
                }
                Ok(())
            }
            Stmt::Continue { .. } => {
                if let Some(frame) = self.loop_frames.last() {
                    out.push(Instr::Jump {
                        label: frame.start.clone(),
                        cond: CondCode::None,
                    });
                }
                Ok(())
            }
        }
    }

    fn gen_variable(&mut self, var: &VarDef, out: &mut Vec<Instr>) -> Fallible {
        let slot = self.allocate(size_of(&var.ty));
        self.locals.insert(var.name.lexeme.clone(), slot);
        if let Some(init) = &var.init {
            let value = self.gen_expr(init, out)?;
            out.push(Instr::Move {
                src: value,
                dst: slot,
                sign_extend: false,
            });
        }
        Ok(())
    }

    fn gen_if(
        &mut self,
        cond: &Expr,
        then: &Stmt,
        otherwise: Option<&Stmt>,
        out: &mut Vec<Instr>,
    ) -> Fallible {
        self.if_index += 1;
        let end_label = format!(".IE{}", self.if_index);
        let false_label = if otherwise.is_some() {
            format!(".IF{}", self.if_index)
        } else {
            end_label.clone()
        };

        let cond_op = self.gen_expr(cond, out)?;
        out.push(Instr::Compare {
            left: cond_op,
            right: Operand::Imm(0),
        });
        out.push(Instr::Jump {
            label: false_label.clone(),
            cond: CondCode::Equal,
        });
        self.gen_stmt(then, out)?;

        if let Some(else_body) = otherwise {
            out.push(Instr::Jump {
                label: end_label.clone(),
                cond: CondCode::None,
            });
            out.push(Instr::Label(false_label));
            self.gen_stmt(else_body, out)?;
        }
        out.push(Instr::Label(end_label));
        Ok(())
    }

    fn next_loop_labels(&mut self) -> (String, String) {
        self.loop_index += 1;
        (
            format!(".LS{}", self.loop_index),
            format!(".LE{}", self.loop_index),
        )
    }

    fn gen_while_body(
        &mut self,
        cond: &Expr,
        body: &Stmt,
        start: &str,
        exit: &str,
        out: &mut Vec<Instr>,
    ) -> Fallible {
        out.push(Instr::Label(start.to_string()));
        let cond_op = self.gen_expr(cond, out)?;
        out.push(Instr::Compare {
            left: cond_op,
            right: Operand::Imm(0),
        });
        out.push(Instr::Jump {
            label: exit.to_string(),
            cond: CondCode::Equal,
        });
        self.gen_stmt(body, out)?;
        out.push(Instr::Jump {
            label: start.to_string(),
            cond: CondCode::None,
        });
        out.push(Instr::Label(exit.to_string()));
        Ok(())
    }

    // -- expressions --

    fn gen_expr(&mut self, expr: &Expr, out: &mut Vec<Instr>) -> Fallible<Operand> {
        match &expr.kind {
            ExprKind::Int(value) => Ok(Operand::Imm(*value)),
            ExprKind::Ident(token) => {
                if let Some(slot) = self.locals.get(&token.lexeme) {
                    return Ok(*slot);
                }
                // a name that survived analysis without a frame slot is a
                // global; it gets function-local storage on first use
                let slot = self.allocate(size_of(&expr.ty));
                self.locals.insert(token.lexeme.clone(), slot);
                Ok(slot)
            }
            ExprKind::Unary(op, operand) => {
                let dst = self.allocate(Size::DWord);
                let src = self.gen_expr(operand, out)?;
                out.push(Instr::Move {
                    src,
                    dst,
                    sign_extend: false,
                });
                match op.kind {
                    TokenKind::Minus => out.push(Instr::Negate(dst)),
                    TokenKind::Tilde => out.push(Instr::BitwiseNot(dst)),
                    _ => {}
                }
                Ok(dst)
            }
            ExprKind::Binary(left, op, right) => match op.kind {
                TokenKind::Plus | TokenKind::Minus | TokenKind::Star => {
                    self.gen_arithmetic(left, op.kind, right, out)
                }
                TokenKind::Slash => self.gen_division(left, right, out),
                TokenKind::Less
                | TokenKind::LessEq
                | TokenKind::Greater
                | TokenKind::GreaterEq
                | TokenKind::EqEq
                | TokenKind::BangEq => self.gen_relational(left, op.kind, right, out),
                TokenKind::KwAnd | TokenKind::KwOr => {
                    self.gen_logical(left, op.kind, right, out)
                }
                _ => Err(self.unsupported(expr)),
            },
            ExprKind::Assign(place, _, value) => {
                let value = self.gen_expr(value, out)?;
                let place = self.gen_expr(place, out)?;
                out.push(Instr::Move {
                    src: value,
                    dst: place,
                    sign_extend: false,
                });
                Ok(place)
            }
            ExprKind::Call(name, args) => self.gen_call(name, args, out),
            ExprKind::Float(_)
            | ExprKind::Str(_)
            | ExprKind::Char(_)
            | ExprKind::Array(_)
            | ExprKind::Member(_, _, _) => Err(self.unsupported(expr)),
        }
    }

    fn unsupported(&mut self, expr: &Expr) -> Reported {
        self.diags.error(
            "Expression is not yet supported in code generation",
            expr.position,
        )
    }

    fn gen_arithmetic(
        &mut self,
        left: &Expr,
        op: TokenKind,
        right: &Expr,
        out: &mut Vec<Instr>,
    ) -> Fallible<Operand> {
        let dst = self.allocate(Size::DWord);
        let value = self.gen_expr(left, out)?;
        out.push(Instr::Move {
            src: value,
            dst,
            sign_extend: false,
        });
        let other = self.gen_expr(right, out)?;
        out.push(match op {
            TokenKind::Plus => Instr::Add { dst, other },
            TokenKind::Minus => Instr::Sub { dst, other },
            _ => Instr::Mul { dst, other },
        });
        Ok(dst)
    }

    /// Signed division leaves the quotient in `eax`; the divisor must sit
    /// in a temp because `idiv` takes no immediates.
    fn gen_division(
        &mut self,
        left: &Expr,
        right: &Expr,
        out: &mut Vec<Instr>,
    ) -> Fallible<Operand> {
        let value = self.gen_expr(right, out)?;
        let divisor = self.allocate(Size::DWord);
        out.push(Instr::Move {
            src: value,
            dst: divisor,
            sign_extend: false,
        });
        let dividend = self.gen_expr(left, out)?;
        out.push(Instr::Move {
            src: dividend,
            dst: Operand::Reg(Register::Ax, Size::DWord),
            sign_extend: false,
        });
        out.push(Instr::Cdq);
        out.push(Instr::Div(divisor));
        Ok(Operand::Reg(Register::Ax, Size::DWord))
    }

    fn gen_relational(
        &mut self,
        left: &Expr,
        op: TokenKind,
        right: &Expr,
        out: &mut Vec<Instr>,
    ) -> Fallible<Operand> {
        let dst = self.allocate_flag();
        let cond = cond_code(op);
        let left = self.gen_expr(left, out)?;
        let right = self.gen_expr(right, out)?;
        out.push(Instr::Compare { left, right });
        out.push(Instr::Set { dst, cond });
        Ok(dst)
    }

    fn gen_logical(
        &mut self,
        left: &Expr,
        op: TokenKind,
        right: &Expr,
        out: &mut Vec<Instr>,
    ) -> Fallible<Operand> {
        let dst = self.allocate(Size::DWord);
        self.cmp_index += 1;
        let end_label = format!(".CE{}", self.cmp_index);

        if op == TokenKind::KwAnd {
            let false_label = format!(".CF{}", self.cmp_index);
            let a = self.gen_expr(left, out)?;
            out.push(Instr::Compare {
                left: a,
                right: Operand::Imm(0),
            });
            out.push(Instr::Jump {
                label: false_label.clone(),
                cond: CondCode::Equal,
            });
            let b = self.gen_expr(right, out)?;
            out.push(Instr::Compare {
                left: b,
                right: Operand::Imm(0),
            });
            out.push(Instr::Jump {
                label: false_label.clone(),
                cond: CondCode::Equal,
            });
            out.push(Instr::Move {
                src: Operand::Imm(1),
                dst,
                sign_extend: false,
            });
            out.push(Instr::Jump {
                label: end_label.clone(),
                cond: CondCode::None,
            });
            out.push(Instr::Label(false_label));
            out.push(Instr::Move {
                src: Operand::Imm(0),
                dst,
                sign_extend: false,
            });
        } else {
            // `or` short-circuits on the exact value 1
            let true_label = format!(".CT{}", self.cmp_index);
            let a = self.gen_expr(left, out)?;
            out.push(Instr::Compare {
                left: a,
                right: Operand::Imm(1),
            });
            out.push(Instr::Jump {
                label: true_label.clone(),
                cond: CondCode::Equal,
            });
            let b = self.gen_expr(right, out)?;
            out.push(Instr::Compare {
                left: b,
                right: Operand::Imm(1),
            });
            out.push(Instr::Jump {
                label: true_label.clone(),
                cond: CondCode::Equal,
            });
            out.push(Instr::Move {
                src: Operand::Imm(0),
                dst,
                sign_extend: false,
            });
            out.push(Instr::Jump {
                label: end_label.clone(),
                cond: CondCode::None,
            });
            out.push(Instr::Label(true_label));
            out.push(Instr::Move {
                src: Operand::Imm(1),
                dst,
                sign_extend: false,
            });
        }
        out.push(Instr::Label(end_label));
        Ok(dst)
    }

    fn gen_call(
        &mut self,
        name: &Token,
        args: &[Expr],
        out: &mut Vec<Instr>,
    ) -> Fallible<Operand> {
        let symbol = self.platform.symbol(&name.lexeme);

        // an even argument count would leave rsp misaligned after the
        // pushed return address
        let mut padding = self.platform.shadow_space();
        if args.len() % 2 == 0 {
            padding += 8;
        }
        out.push(Instr::Sub {
            dst: Operand::Reg(Register::Sp, Size::QWord),
            other: Operand::Imm(padding),
        });

        let regs = self.platform.argument_registers();
        for (arg, reg) in args.iter().zip(regs) {
            let value = self.gen_expr(arg, out)?;
            out.push(Instr::Move {
                src: value,
                dst: Operand::Reg(*reg, Size::DWord),
                sign_extend: false,
            });
        }

        let mut stack_args = 0;
        if args.len() > regs.len() {
            for arg in args[regs.len()..].iter().rev() {
                let value = self.gen_expr(arg, out)?;
                out.push(Instr::Push(value));
                stack_args += 1;
            }
        }

        out.push(Instr::Call(symbol));
        out.push(Instr::Add {
            dst: Operand::Reg(Register::Sp, Size::QWord),
            other: Operand::Imm(8 * stack_args + padding),
        });

        Ok(Operand::Reg(Register::Ax, Size::DWord))
    }
}
