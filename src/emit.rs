use crate::{
    ir::{CondCode, Instr},
    platform::Platform,
};

/// Final phase: walks the legalized IR and writes NASM-compatible
/// Intel-syntax text. Everything lands in one `.text` section; labels
/// inside a function start with `.` so they stay local to the preceding
/// global label.
#[derive(Debug)]
pub struct Emitter {
    platform: Platform,
    out:      String,
}

impl Emitter {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            out: String::new(),
        }
    }

    pub fn emit(mut self, instrs: &[Instr], externals: &[String]) -> String {
        if !externals.is_empty() {
            let list = externals
                .iter()
                .map(|name| self.platform.symbol(name))
                .collect::<Vec<_>>()
                .join(", ");
            self.write_line(&format!("extern {}", list));
        }
        self.write_line("section .text");

        for instr in instrs {
            if let Instr::FnDef {
                name,
                body,
                stack_alloc,
            } = instr
            {
                self.emit_function(name, body, *stack_alloc);
            }
        }

        self.out
    }

    fn emit_function(&mut self, name: &str, body: &[Instr], stack_alloc: i64) {
        let symbol = self.platform.symbol(name);
        self.write_line("");
        self.write_line(&format!("global {}", symbol));
        self.label(&symbol);
        self.write_instr_line("push rbp");
        self.write_instr_line("mov rbp, rsp");
        self.write_instr_line(&format!("sub rsp, {}", stack_alloc));

        for instr in body {
            self.emit_instr(instr);
        }
    }

    fn emit_instr(&mut self, instr: &Instr) {
        match instr {
            Instr::Move {
                src,
                dst,
                sign_extend,
            } => {
                let op = if *sign_extend { "movsx" } else { "mov" };
                self.write_instr_line(&format!("{} {}, {}", op, dst, src));
            }
            Instr::Negate(op) => self.write_instr_line(&format!("neg {}", op)),
            Instr::BitwiseNot(op) => self.write_instr_line(&format!("not {}", op)),
            Instr::Add { dst, other } => {
                self.write_instr_line(&format!("add {}, {}", dst, other));
            }
            Instr::Sub { dst, other } => {
                self.write_instr_line(&format!("sub {}, {}", dst, other));
            }
            Instr::Mul { dst, other } => {
                self.write_instr_line(&format!("imul {}, {}", dst, other));
            }
            Instr::Cdq => self.write_instr_line("cdq"),
            Instr::Div(op) => self.write_instr_line(&format!("idiv {}", op)),
            Instr::Compare { left, right } => {
                self.write_instr_line(&format!("cmp {}, {}", left, right));
            }
            Instr::Set { dst, cond } => {
                self.write_instr_line(&format!("set{} {}", cond.suffix(), dst));
            }
            Instr::Jump { label, cond } => match cond {
                CondCode::None => self.write_instr_line(&format!("jmp {}", label)),
                cond => self.write_instr_line(&format!("j{} {}", cond.suffix(), label)),
            },
            Instr::Label(name) => self.label(name),
            Instr::Call(name) => self.write_instr_line(&format!("call {}", name)),
            Instr::Push(src) => self.write_instr_line(&format!("push {}", src)),
            Instr::Return => {
                self.write_instr_line("mov rsp, rbp");
                self.write_instr_line("pop rbp");
                self.write_instr_line("ret");
            }
            // function definitions do not nest
            Instr::FnDef { .. } => {}
        }
    }

    fn label(&mut self, name: &str) {
        self.write_line(&format!("{}:", name));
    }

    fn write_instr_line(&mut self, line: &str) {
        self.out.push_str("    ");
        self.write_line(line);
    }

    fn write_line(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }
}
