/// Operand width in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Size {
    Byte,
    Word,
    DWord,
    QWord,
}

impl Size {
    pub fn bytes(self) -> i64 {
        match self {
            Size::Byte => 1,
            Size::Word => 2,
            Size::DWord => 4,
            Size::QWord => 8,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Size::Byte => "BYTE",
            Size::Word => "WORD",
            Size::DWord => "DWORD",
            Size::QWord => "QWORD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Ax,
    Bx,
    Cx,
    Dx,
    Di,
    Si,
    Bp,
    Sp,
    R8,
    R9,
    R10,
    R11,
}

impl Register {
    pub fn name(self, size: Size) -> &'static str {
        match (self, size) {
            (Register::Ax, Size::Byte) => "al",
            (Register::Ax, Size::Word) => "ax",
            (Register::Ax, Size::DWord) => "eax",
            (Register::Ax, Size::QWord) => "rax",
            (Register::Bx, Size::Byte) => "bl",
            (Register::Bx, Size::Word) => "bx",
            (Register::Bx, Size::DWord) => "ebx",
            (Register::Bx, Size::QWord) => "rbx",
            (Register::Cx, Size::Byte) => "cl",
            (Register::Cx, Size::Word) => "cx",
            (Register::Cx, Size::DWord) => "ecx",
            (Register::Cx, Size::QWord) => "rcx",
            (Register::Dx, Size::Byte) => "dl",
            (Register::Dx, Size::Word) => "dx",
            (Register::Dx, Size::DWord) => "edx",
            (Register::Dx, Size::QWord) => "rdx",
            (Register::Di, Size::Byte) => "dil",
            (Register::Di, Size::Word) => "di",
            (Register::Di, Size::DWord) => "edi",
            (Register::Di, Size::QWord) => "rdi",
            (Register::Si, Size::Byte) => "sil",
            (Register::Si, Size::Word) => "si",
            (Register::Si, Size::DWord) => "esi",
            (Register::Si, Size::QWord) => "rsi",
            (Register::Bp, Size::Byte) => "bpl",
            (Register::Bp, Size::Word) => "bp",
            (Register::Bp, Size::DWord) => "ebp",
            (Register::Bp, Size::QWord) => "rbp",
            (Register::Sp, Size::Byte) => "spl",
            (Register::Sp, Size::Word) => "sp",
            (Register::Sp, Size::DWord) => "esp",
            (Register::Sp, Size::QWord) => "rsp",
            (Register::R8, Size::Byte) => "r8b",
            (Register::R8, Size::Word) => "r8w",
            (Register::R8, Size::DWord) => "r8d",
            (Register::R8, Size::QWord) => "r8",
            (Register::R9, Size::Byte) => "r9b",
            (Register::R9, Size::Word) => "r9w",
            (Register::R9, Size::DWord) => "r9d",
            (Register::R9, Size::QWord) => "r9",
            (Register::R10, Size::Byte) => "r10b",
            (Register::R10, Size::Word) => "r10w",
            (Register::R10, Size::DWord) => "r10d",
            (Register::R10, Size::QWord) => "r10",
            (Register::R11, Size::Byte) => "r11b",
            (Register::R11, Size::Word) => "r11w",
            (Register::R11, Size::DWord) => "r11d",
            (Register::R11, Size::QWord) => "r11",
        }
    }
}

/// Jump and set conditions; `None` is the unconditional variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondCode {
    Equal,
    NotEqual,
    Greater,
    GreaterEq,
    Less,
    LessEq,
    None,
}

impl CondCode {
    pub fn suffix(self) -> &'static str {
        match self {
            CondCode::Equal => "e",
            CondCode::NotEqual => "ne",
            CondCode::Greater => "g",
            CondCode::GreaterEq => "ge",
            CondCode::Less => "l",
            CondCode::LessEq => "le",
            CondCode::None => "",
        }
    }
}

/// IR operand. Stack offsets are positive for `[rbp - offset]` slots;
/// a negative offset addresses `[rbp + N]`, used for parameters passed
/// on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Imm(i64),
    Reg(Register, Size),
    Stack(i64, Size),
}

impl Operand {
    pub fn size(&self) -> Option<Size> {
        match self {
            Operand::Imm(_) => None,
            Operand::Reg(_, size) | Operand::Stack(_, size) => Some(*size),
        }
    }

    pub fn is_imm(&self) -> bool {
        matches!(self, Operand::Imm(_))
    }

    pub fn is_stack(&self) -> bool {
        matches!(self, Operand::Stack(_, _))
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Imm(value) => write!(f, "{}", value),
            Operand::Reg(reg, size) => write!(f, "{}", reg.name(*size)),
            Operand::Stack(offset, size) => {
                if *offset >= 0 {
                    write!(f, "{} [rbp - {}]", size.keyword(), offset)
                } else {
                    write!(f, "{} [rbp + {}]", size.keyword(), -offset)
                }
            }
        }
    }
}

/// Flat instruction list. Function bodies are nested under `FnDef`;
/// everything else is straight-line with labels and jumps.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    FnDef {
        name:        String,
        body:        Vec<Instr>,
        stack_alloc: i64,
    },
    Move {
        src:         Operand,
        dst:         Operand,
        sign_extend: bool,
    },
    Label(String),
    Jump {
        label: String,
        cond:  CondCode,
    },
    Negate(Operand),
    BitwiseNot(Operand),
    Add {
        dst:   Operand,
        other: Operand,
    },
    Sub {
        dst:   Operand,
        other: Operand,
    },
    Mul {
        dst:   Operand,
        other: Operand,
    },
    Div(Operand),
    Cdq,
    Compare {
        left:  Operand,
        right: Operand,
    },
    Set {
        dst:  Operand,
        cond: CondCode,
    },
    Call(String),
    Push(Operand),
    Return,
}

impl std::fmt::Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instr::FnDef {
                name,
                body,
                stack_alloc,
            } => {
                writeln!(f, "fn {} (stack {}):", name, stack_alloc)?;
                for instr in body {
                    writeln!(f, "    {}", instr)?;
                }
                Ok(())
            }
            Instr::Move {
                src,
                dst,
                sign_extend,
            } => {
                let op = if *sign_extend { "movsx" } else { "mov" };
                write!(f, "{} {}, {}", op, dst, src)
            }
            Instr::Label(name) => write!(f, "{}:", name),
            Instr::Jump { label, cond } => match cond {
                CondCode::None => write!(f, "jmp {}", label),
                cond => write!(f, "j{} {}", cond.suffix(), label),
            },
            Instr::Negate(op) => write!(f, "neg {}", op),
            Instr::BitwiseNot(op) => write!(f, "not {}", op),
            Instr::Add { dst, other } => write!(f, "add {}, {}", dst, other),
            Instr::Sub { dst, other } => write!(f, "sub {}, {}", dst, other),
            Instr::Mul { dst, other } => write!(f, "imul {}, {}", dst, other),
            Instr::Div(op) => write!(f, "idiv {}", op),
            Instr::Cdq => write!(f, "cdq"),
            Instr::Compare { left, right } => write!(f, "cmp {}, {}", left, right),
            Instr::Set { dst, cond } => write!(f, "set{} {}", cond.suffix(), dst),
            Instr::Call(name) => write!(f, "call {}", name),
            Instr::Push(src) => write!(f, "push {}", src),
            Instr::Return => write!(f, "ret"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_register_names() {
        assert_eq!(Register::Ax.name(Size::QWord), "rax");
        assert_eq!(Register::Ax.name(Size::DWord), "eax");
        assert_eq!(Register::Ax.name(Size::Byte), "al");
        assert_eq!(Register::R10.name(Size::DWord), "r10d");
        assert_eq!(Register::R10.name(Size::QWord), "r10");
        assert_eq!(Register::Sp.name(Size::QWord), "rsp");
    }

    #[test]
    fn test_operand_rendering() {
        assert_eq!(Operand::Imm(7).to_string(), "7");
        assert_eq!(
            Operand::Stack(4, Size::DWord).to_string(),
            "DWORD [rbp - 4]"
        );
        assert_eq!(
            Operand::Stack(-16, Size::QWord).to_string(),
            "QWORD [rbp + 16]"
        );
        assert_eq!(
            Operand::Reg(Register::Cx, Size::DWord).to_string(),
            "ecx"
        );
    }
}
