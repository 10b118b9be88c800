//! The encoding pass: turns the operations of each line into the packed
//! control word.
//!
//! Encoding runs after layout, since branch targets and fall-through
//! addresses need the final store assignment. Every rule violation is
//! reported as a warning on the [`Assembler`] and encoding continues, so
//! one run surfaces all problems in a program.
//!
//! A line without an explicit transfer falls through to the next
//! instruction-bearing line in source order. The pass therefore walks the
//! program backwards, carrying the most recent instruction line along.

use super::asm::{Alu, Assembler, Assign, Cond, Line, Op, Reg, Shift};
use super::layout::Layout;
use super::word::{self, Word};

/// Encode the control word of every line in the program.
pub fn encode_program(asm: &mut Assembler, lines: &mut [Line],
                      layout: &Layout) {
    let mut following = None;
    for index in (0..lines.len()).rev() {
        let fall_through = following
            .and_then(|i: usize| lines[i].address);
        let word = encode_line(asm, lines, index, layout,
                               following.is_some(), fall_through);
        lines[index].word = word;
        if lines[index].has_insns() {
            following = Some(index);
        }
    }
}

fn encode_line(asm: &mut Assembler, lines: &[Line], index: usize,
               layout: &Layout, has_following: bool,
               fall_through: Option<u32>) -> Word {
    let line = &lines[index];
    let number = line.number;
    let mut word = Word::new();
    let mut saw_goto = false;
    let mut saw_assign = false;

    for (position, op) in line.ops.iter().enumerate() {
        match *op {
            Op::Read => {
                if word.get_bit(word::WRITE_BIT) {
                    asm.warn(number,
                             "only one of rd and wr allowed pr. line".into());
                }
                if word.get_bit(word::READ_BIT) {
                    asm.warn(number, "duplicate rd on line".into());
                }
                word.set_bit(word::READ_BIT);
            }

            Op::Write => {
                if word.get_bit(word::READ_BIT) {
                    asm.warn(number,
                             "only one of rd and wr allowed pr. line".into());
                }
                if word.get_bit(word::WRITE_BIT) {
                    asm.warn(number, "duplicate wr on line".into());
                }
                word.set_bit(word::WRITE_BIT);
            }

            Op::Fetch => {
                if word.get_bit(word::FETCH_BIT) {
                    asm.warn(number, "duplicate fetch on line".into());
                }
                word.set_bit(word::FETCH_BIT);
            }

            Op::Goto(ref label) => {
                if saw_goto {
                    asm.warn(number,
                             "only one goto allowed pr. line".into());
                }
                saw_goto = true;
                match layout.lookup(label)
                            .and_then(|target| lines[target].address) {
                    Some(address) => {
                        word.set_bits(address, word::ADDRESS_OFFSET);
                    }
                    None => {
                        asm.warn(number,
                                 format!("label `{}' undefined", label));
                    }
                }
            }

            Op::IndirectGoto(mask) => {
                if saw_goto {
                    asm.warn(number,
                             "only one goto allowed pr. line".into());
                }
                saw_goto = true;
                word.set_bits(mask, word::ADDRESS_OFFSET);
                word.set_bit(word::JMPC_BIT);
            }

            Op::If(cond, _, ref false_label) => {
                if saw_goto {
                    asm.warn(number,
                             "only one goto allowed pr. line".into());
                }
                saw_goto = true;
                // Undefined targets were already reported by the layout
                // pass, so a failed lookup just leaves the bits zero.
                if let Some(address) = layout.lookup(false_label)
                        .and_then(|target| lines[target].address) {
                    word.set_bits(address, word::ADDRESS_OFFSET);
                }
                match cond {
                    Cond::Z => word.set_bit(word::JAMZ_BIT),
                    Cond::N => word.set_bit(word::JAMN_BIT),
                }
            }

            Op::Assign(ref assign) => {
                if saw_assign {
                    asm.warn(number,
                             "only one alu operation allowed pr. line".into());
                }
                saw_assign = true;
                encode_assign(asm, number, assign, &mut word);
            }

            Op::Empty => {
                if position != 0 || line.ops.len() != 1 {
                    asm.warn(number, "empty is only allowed on a line \
                                      by itself".into());
                }
            }

            Op::Halt => {
                if position != 0 || line.ops.len() != 1 {
                    asm.warn(number, "halt is only allowed on a line \
                                      by itself".into());
                }
                word.set_bits(word::B_BUS_HALT, word::B_BUS_OFFSET);
                saw_goto = true;
            }
        }
    }

    if line.has_insns() && !saw_goto {
        if !has_following {
            asm.warn(number, "last line should terminate with an \
                              explicit goto or halt".into());
        } else if let Some(address) = fall_through {
            word.set_bits(address, word::ADDRESS_OFFSET);
        }
    }
    word
}

fn encode_assign(asm: &mut Assembler, number: usize, assign: &Assign,
                 word: &mut Word) {
    for target in &assign.targets {
        match *target {
            Reg::MBR | Reg::MBRU => {
                asm.warn(number,
                         "MBR and MBRU can not be assigned to".into());
            }
            Reg::Virtual => (),
            ref reg => {
                // c_bit is always present for the remaining registers
                let bit = reg.c_bit().unwrap_or(0);
                if word.get_bit(bit) {
                    asm.warn(number, format!(
                        "register {} assigned more than once", reg.name()));
                } else {
                    word.set_bit(bit);
                }
            }
        }
    }

    match assign.shift {
        Some(Shift::Sra1) => word.set_bit(word::SRA1_BIT),
        Some(Shift::Sll8) => word.set_bit(word::SLL8_BIT),
        None => (),
    }

    encode_alu(asm, number, &assign.alu, word);
}

/// B bus selector of a register, warning when it has none.
fn b_bus(asm: &mut Assembler, number: usize, reg: Reg) -> Option<u32> {
    match reg.b_bus() {
        Some(selector) => Some(selector),
        None => {
            asm.warn(number,
                     format!("can't enable {} on B bus", reg.name()));
            None
        }
    }
}

/// Pick the non-H operand of a commutative two-register expression.
fn other_operand(asm: &mut Assembler, number: usize, a: Reg, b: Reg)
                 -> Option<Reg> {
    if a == Reg::H && b != Reg::H {
        Some(b)
    } else if a != Reg::H && b == Reg::H {
        Some(a)
    } else {
        asm.warn(number,
                 "one of the operand registers must be H".into());
        None
    }
}

fn encode_alu(asm: &mut Assembler, number: usize, alu: &Alu,
              word: &mut Word) {
    match *alu {
        Alu::Reg(reg) => {
            if reg == Reg::H {
                word.set_bits(word::ALU_H, word::ALU_OFFSET);
            } else if let Some(selector) = b_bus(asm, number, reg) {
                word.set_bits(word::ALU_B_BUS, word::ALU_OFFSET);
                word.set_bits(selector, word::B_BUS_OFFSET);
            }
        }

        Alu::Inv(reg) => {
            if reg == Reg::H {
                word.set_bits(word::ALU_INV_H, word::ALU_OFFSET);
            } else if let Some(selector) = b_bus(asm, number, reg) {
                word.set_bits(word::ALU_INV_B_BUS, word::ALU_OFFSET);
                word.set_bits(selector, word::B_BUS_OFFSET);
            }
        }

        Alu::AddRegReg1(a, b) => {
            if let Some(reg) = other_operand(asm, number, a, b) {
                if let Some(selector) = b_bus(asm, number, reg) {
                    word.set_bits(word::ALU_ADD_B_BUS_H_1, word::ALU_OFFSET);
                    word.set_bits(selector, word::B_BUS_OFFSET);
                }
            }
        }

        Alu::AddRegReg(a, b) => {
            if let Some(reg) = other_operand(asm, number, a, b) {
                if let Some(selector) = b_bus(asm, number, reg) {
                    word.set_bits(word::ALU_ADD_B_BUS_H, word::ALU_OFFSET);
                    word.set_bits(selector, word::B_BUS_OFFSET);
                }
            }
        }

        Alu::AddReg1(reg) => {
            if reg == Reg::H {
                word.set_bits(word::ALU_ADD_H_1, word::ALU_OFFSET);
            } else if let Some(selector) = b_bus(asm, number, reg) {
                word.set_bits(word::ALU_ADD_B_BUS_1, word::ALU_OFFSET);
                word.set_bits(selector, word::B_BUS_OFFSET);
            }
        }

        Alu::SubRegReg(a, b) => {
            if a != Reg::H && b == Reg::H {
                if let Some(selector) = b_bus(asm, number, a) {
                    word.set_bits(word::ALU_SUB_B_BUS_H, word::ALU_OFFSET);
                    word.set_bits(selector, word::B_BUS_OFFSET);
                }
            } else {
                asm.warn(number, "subtractions must be either `reg - H' \
                                  or `reg - 1'".into());
            }
        }

        Alu::SubReg1(reg) => {
            if reg != Reg::H {
                if let Some(selector) = b_bus(asm, number, reg) {
                    word.set_bits(word::ALU_SUB_B_BUS_1, word::ALU_OFFSET);
                    word.set_bits(selector, word::B_BUS_OFFSET);
                }
            } else {
                asm.warn(number, "subtractions must be either `reg - H' \
                                  or `reg - 1'".into());
            }
        }

        Alu::Neg(reg) => {
            if reg == Reg::H {
                word.set_bits(word::ALU_NEG_H, word::ALU_OFFSET);
            } else {
                asm.warn(number, "only H can be negated".into());
            }
        }

        Alu::And(a, b) => {
            if let Some(reg) = other_operand(asm, number, a, b) {
                if let Some(selector) = b_bus(asm, number, reg) {
                    word.set_bits(word::ALU_H_AND_B_BUS, word::ALU_OFFSET);
                    word.set_bits(selector, word::B_BUS_OFFSET);
                }
            }
        }

        Alu::Or(a, b) => {
            if let Some(reg) = other_operand(asm, number, a, b) {
                if let Some(selector) = b_bus(asm, number, reg) {
                    word.set_bits(word::ALU_H_OR_B_BUS, word::ALU_OFFSET);
                    word.set_bits(selector, word::B_BUS_OFFSET);
                }
            }
        }

        Alu::Const(value) => match value {
            0 => word.set_bits(word::ALU_0, word::ALU_OFFSET),
            1 => word.set_bits(word::ALU_1, word::ALU_OFFSET),
            -1 => word.set_bits(word::ALU_MINUS_1, word::ALU_OFFSET),
            _ => {
                asm.warn(number, "only the constants 0, 1 and -1 are \
                                  available".into());
            }
        },
    }
}
