//! Rewrites the IR to satisfy x86-64 addressing-mode constraints: no
//! two-memory-operand instructions, `imul` never writes to memory, and
//! `push` only takes immediates or full-width operands. Semantics are
//! unchanged and the pass is idempotent.

use crate::ir::{Instr, Operand, Register, Size};

pub fn legalize(instrs: &mut [Instr]) {
    for instr in instrs.iter_mut() {
        if let Instr::FnDef { body, .. } = instr {
            legalize_body(body);
        }
    }
}

fn legalize_body(body: &mut Vec<Instr>) {
    let old = std::mem::take(body);
    for instr in old {
        match instr {
            Instr::Move {
                src,
                dst,
                sign_extend,
            } => legalize_move(src, dst, sign_extend, body),
            Instr::Add { dst, other } => {
                let other = load_second_operand(dst, other, body);
                body.push(Instr::Add { dst, other });
            }
            Instr::Sub { dst, other } => {
                let other = load_second_operand(dst, other, body);
                body.push(Instr::Sub { dst, other });
            }
            Instr::Mul { dst, other } => legalize_mul(dst, other, body),
            Instr::Compare { left, right } => legalize_compare(left, right, body),
            Instr::Push(src) => legalize_push(src, body),
            // the generator already stages the divisor in a temp
            other => body.push(other),
        }
    }
}

/// A widening move bounces through `ax` at the destination width with
/// sign extension; a memory-to-memory move bounces through `r10`.
fn legalize_move(src: Operand, dst: Operand, sign_extend: bool, out: &mut Vec<Instr>) {
    if !sign_extend {
        if let (Some(src_size), Some(dst_size)) = (src.size(), dst.size()) {
            if dst_size > src_size {
                let scratch = Operand::Reg(Register::Ax, dst_size);
                out.push(Instr::Move {
                    src,
                    dst: scratch,
                    sign_extend: true,
                });
                out.push(Instr::Move {
                    src: scratch,
                    dst,
                    sign_extend: false,
                });
                return;
            }
        }
    }

    if src.is_stack() && dst.is_stack() {
        let size = src.size().unwrap_or(Size::DWord);
        let scratch = Operand::Reg(Register::R10, size);
        out.push(Instr::Move {
            src,
            dst: scratch,
            sign_extend: false,
        });
        out.push(Instr::Move {
            src: scratch,
            dst,
            sign_extend: false,
        });
        return;
    }

    out.push(Instr::Move {
        src,
        dst,
        sign_extend,
    });
}

fn load_second_operand(dst: Operand, other: Operand, out: &mut Vec<Instr>) -> Operand {
    if dst.is_stack() && other.is_stack() {
        let size = other.size().unwrap_or(Size::DWord);
        let scratch = Operand::Reg(Register::R10, size);
        out.push(Instr::Move {
            src: other,
            dst: scratch,
            sign_extend: false,
        });
        scratch
    } else {
        other
    }
}

/// `imul` cannot write to memory, so a stack destination is carried in
/// `r11` across the multiply.
fn legalize_mul(dst: Operand, other: Operand, out: &mut Vec<Instr>) {
    if dst.is_stack() {
        let size = dst.size().unwrap_or(Size::DWord);
        let scratch = Operand::Reg(Register::R11, size);
        out.push(Instr::Move {
            src: dst,
            dst: scratch,
            sign_extend: false,
        });
        out.push(Instr::Mul {
            dst: scratch,
            other,
        });
        out.push(Instr::Move {
            src: scratch,
            dst,
            sign_extend: false,
        });
    } else {
        out.push(Instr::Mul { dst, other });
    }
}

/// `cmp` needs a register on the left when the generator produced a
/// constant or a stack slot there.
fn legalize_compare(left: Operand, right: Operand, out: &mut Vec<Instr>) {
    if left.is_imm() || left.is_stack() {
        let size = left.size().unwrap_or(Size::DWord);
        let scratch = Operand::Reg(Register::Ax, size);
        out.push(Instr::Move {
            src: left,
            dst: scratch,
            sign_extend: false,
        });
        out.push(Instr::Compare {
            left: scratch,
            right,
        });
    } else {
        out.push(Instr::Compare { left, right });
    }
}

/// Anything that is not an immediate gets pushed at full width via `ax`.
fn legalize_push(src: Operand, out: &mut Vec<Instr>) {
    if !src.is_imm() && src.size() != Some(Size::QWord) {
        let scratch = Operand::Reg(Register::Ax, Size::QWord);
        out.push(Instr::Move {
            src,
            dst: scratch,
            sign_extend: true,
        });
        out.push(Instr::Push(scratch));
    } else {
        out.push(Instr::Push(src));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fndef(body: Vec<Instr>) -> Vec<Instr> {
        vec![Instr::FnDef {
            name: "f".to_string(),
            body,
            stack_alloc: 16,
        }]
    }

    fn body(instrs: &[Instr]) -> &[Instr] {
        match &instrs[0] {
            Instr::FnDef { body, .. } => body,
            other => panic!("expected fndef, got {:?}", other),
        }
    }

    fn two_stack_operands(instr: &Instr) -> bool {
        match instr {
            Instr::Move { src, dst, .. } => src.is_stack() && dst.is_stack(),
            Instr::Add { dst, other }
            | Instr::Sub { dst, other }
            | Instr::Mul { dst, other } => dst.is_stack() && other.is_stack(),
            Instr::Compare { left, right } => left.is_stack() && right.is_stack(),
            _ => false,
        }
    }

    #[test]
    fn test_memory_to_memory_move_goes_through_r10() {
        let mut instrs = fndef(vec![Instr::Move {
            src: Operand::Stack(4, Size::DWord),
            dst: Operand::Stack(8, Size::DWord),
            sign_extend: false,
        }]);
        legalize(&mut instrs);
        assert_eq!(
            body(&instrs),
            &[
                Instr::Move {
                    src: Operand::Stack(4, Size::DWord),
                    dst: Operand::Reg(Register::R10, Size::DWord),
                    sign_extend: false,
                },
                Instr::Move {
                    src: Operand::Reg(Register::R10, Size::DWord),
                    dst: Operand::Stack(8, Size::DWord),
                    sign_extend: false,
                },
            ]
        );
    }

    #[test]
    fn test_widening_move_sign_extends_through_ax() {
        let mut instrs = fndef(vec![Instr::Move {
            src: Operand::Stack(4, Size::Byte),
            dst: Operand::Stack(8, Size::DWord),
            sign_extend: false,
        }]);
        legalize(&mut instrs);
        assert_eq!(
            body(&instrs),
            &[
                Instr::Move {
                    src: Operand::Stack(4, Size::Byte),
                    dst: Operand::Reg(Register::Ax, Size::DWord),
                    sign_extend: true,
                },
                Instr::Move {
                    src: Operand::Reg(Register::Ax, Size::DWord),
                    dst: Operand::Stack(8, Size::DWord),
                    sign_extend: false,
                },
            ]
        );
    }

    #[test]
    fn test_immediate_moves_are_untouched() {
        let original = vec![Instr::Move {
            src: Operand::Imm(7),
            dst: Operand::Stack(4, Size::DWord),
            sign_extend: false,
        }];
        let mut instrs = fndef(original.clone());
        legalize(&mut instrs);
        assert_eq!(body(&instrs), original.as_slice());
    }

    #[test]
    fn test_add_with_two_stack_slots() {
        let mut instrs = fndef(vec![Instr::Add {
            dst: Operand::Stack(4, Size::DWord),
            other: Operand::Stack(8, Size::DWord),
        }]);
        legalize(&mut instrs);
        assert_eq!(
            body(&instrs),
            &[
                Instr::Move {
                    src: Operand::Stack(8, Size::DWord),
                    dst: Operand::Reg(Register::R10, Size::DWord),
                    sign_extend: false,
                },
                Instr::Add {
                    dst: Operand::Stack(4, Size::DWord),
                    other: Operand::Reg(Register::R10, Size::DWord),
                },
            ]
        );
    }

    #[test]
    fn test_mul_into_memory_goes_through_r11() {
        let mut instrs = fndef(vec![Instr::Mul {
            dst: Operand::Stack(4, Size::DWord),
            other: Operand::Imm(3),
        }]);
        legalize(&mut instrs);
        assert_eq!(
            body(&instrs),
            &[
                Instr::Move {
                    src: Operand::Stack(4, Size::DWord),
                    dst: Operand::Reg(Register::R11, Size::DWord),
                    sign_extend: false,
                },
                Instr::Mul {
                    dst: Operand::Reg(Register::R11, Size::DWord),
                    other: Operand::Imm(3),
                },
                Instr::Move {
                    src: Operand::Reg(Register::R11, Size::DWord),
                    dst: Operand::Stack(4, Size::DWord),
                    sign_extend: false,
                },
            ]
        );
    }

    #[test]
    fn test_compare_left_constant_loads_into_ax() {
        let mut instrs = fndef(vec![Instr::Compare {
            left: Operand::Imm(0),
            right: Operand::Stack(4, Size::DWord),
        }]);
        legalize(&mut instrs);
        assert_eq!(
            body(&instrs),
            &[
                Instr::Move {
                    src: Operand::Imm(0),
                    dst: Operand::Reg(Register::Ax, Size::DWord),
                    sign_extend: false,
                },
                Instr::Compare {
                    left: Operand::Reg(Register::Ax, Size::DWord),
                    right: Operand::Stack(4, Size::DWord),
                },
            ]
        );
    }

    #[test]
    fn test_push_of_dword_slot_widens_through_ax() {
        let mut instrs = fndef(vec![Instr::Push(Operand::Stack(4, Size::DWord))]);
        legalize(&mut instrs);
        assert_eq!(
            body(&instrs),
            &[
                Instr::Move {
                    src: Operand::Stack(4, Size::DWord),
                    dst: Operand::Reg(Register::Ax, Size::QWord),
                    sign_extend: true,
                },
                Instr::Push(Operand::Reg(Register::Ax, Size::QWord)),
            ]
        );
    }

    #[test]
    fn test_push_of_immediate_is_untouched() {
        let original = vec![Instr::Push(Operand::Imm(5))];
        let mut instrs = fndef(original.clone());
        legalize(&mut instrs);
        assert_eq!(body(&instrs), original.as_slice());
    }

    #[test]
    fn test_no_two_stack_operands_after_pass() {
        let mut instrs = fndef(vec![
            Instr::Move {
                src: Operand::Stack(4, Size::DWord),
                dst: Operand::Stack(8, Size::DWord),
                sign_extend: false,
            },
            Instr::Add {
                dst: Operand::Stack(4, Size::DWord),
                other: Operand::Stack(8, Size::DWord),
            },
            Instr::Sub {
                dst: Operand::Stack(4, Size::DWord),
                other: Operand::Stack(8, Size::DWord),
            },
            Instr::Mul {
                dst: Operand::Stack(4, Size::DWord),
                other: Operand::Stack(8, Size::DWord),
            },
            Instr::Compare {
                left: Operand::Stack(4, Size::DWord),
                right: Operand::Stack(8, Size::DWord),
            },
        ]);
        legalize(&mut instrs);
        for instr in body(&instrs) {
            assert!(!two_stack_operands(instr), "illegal {:?}", instr);
        }
    }

    #[test]
    fn test_pass_is_idempotent() {
        let mut instrs = fndef(vec![
            Instr::Move {
                src: Operand::Stack(4, Size::Byte),
                dst: Operand::Stack(8, Size::DWord),
                sign_extend: false,
            },
            Instr::Add {
                dst: Operand::Stack(4, Size::DWord),
                other: Operand::Stack(8, Size::DWord),
            },
            Instr::Mul {
                dst: Operand::Stack(4, Size::DWord),
                other: Operand::Imm(3),
            },
            Instr::Compare {
                left: Operand::Imm(0),
                right: Operand::Stack(4, Size::DWord),
            },
            Instr::Push(Operand::Stack(4, Size::DWord)),
        ]);
        legalize(&mut instrs);
        let once = instrs.clone();
        legalize(&mut instrs);
        assert_eq!(instrs, once);
    }
}
