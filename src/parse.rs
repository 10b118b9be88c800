//! Regex front end turning microassembly text into [`Line`]s.
//!
//! The surface syntax is one microinstruction per source line:
//!
//! ```text
//! // increment PC and dispatch on the fetched opcode
//! main1: PC = PC + 1; fetch; goto (MBR)
//! iadd1 = 0x60: MAR = SP = SP - 1; rd
//! iflt1: Z = TOS; if (Z) goto T; else goto F
//! ```
//!
//! A line may start with a label, optionally pinned to an absolute
//! control store address with `name = addr:`. The rest of the line is a
//! `;`-separated list of operations: `rd`, `wr`, `fetch`, `empty`,
//! `halt`, `goto LABEL`, `goto (MBR)`, `goto (MBR or 0x100)`,
//! `if (Z) goto L1; else goto L2` (likewise for `N`) and assignments
//! with an optional `>> 1` or `<< 8` shift suffix. `//` starts a
//! comment.

use std::io::{self, BufRead};

use regex::Regex;

use super::asm::{Alu, Assembler, Assign, Cond, Label, Line, Op, Reg, Shift};
use super::util;

lazy_static! {
    static ref LABEL: Regex = Regex::new(
        r"^([A-Za-z_]\w*)\s*(?:=\s*((?:0x|\$)?[0-9a-fA-F]+)\s*)?:\s*(.*)$"
    ).unwrap();
    static ref IF: Regex = Regex::new(
        r"^(?i:if)\s*\(\s*([ZzNn])\s*\)\s*(?i:goto)\s+([A-Za-z_]\w*)$"
    ).unwrap();
    static ref ELSE: Regex = Regex::new(
        r"^(?i:else)\s+(?i:goto)\s+([A-Za-z_]\w*)$"
    ).unwrap();
    static ref IGOTO: Regex = Regex::new(
        r"^(?i:goto)\s*\(\s*(?i:MBR)\s*(?:(?i:or)\s+([^)\s]+)\s*)?\)$"
    ).unwrap();
    static ref GOTO: Regex = Regex::new(
        r"^(?i:goto)\s+([A-Za-z_]\w*)$"
    ).unwrap();
    static ref SHIFT: Regex = Regex::new(
        r"^(.*?)\s*(>>\s*1|<<\s*8)$"
    ).unwrap();
    static ref INV: Regex = Regex::new(
        r"^(?i:inv)\s*\(\s*(\w+)\s*\)$"
    ).unwrap();
    static ref NEG: Regex = Regex::new(r"^-\s*(\w+)$").unwrap();
    static ref ADD3: Regex = Regex::new(
        r"^(\w+)\s*\+\s*(\w+)\s*\+\s*1$"
    ).unwrap();
    static ref ADD2: Regex = Regex::new(r"^(\w+)\s*\+\s*(\w+)$").unwrap();
    static ref SUB: Regex = Regex::new(r"^(\w+)\s*-\s*(\w+)$").unwrap();
    static ref ANDOR: Regex = Regex::new(
        r"^(\w+)\s+((?i:and)|(?i:or))\s+(\w+)$"
    ).unwrap();
    static ref SINGLE: Regex = Regex::new(r"^(\w+)$").unwrap();
}

/// Parse a whole micro program.
///
/// Syntax problems are reported as warnings on the context; the affected
/// operation is dropped so that later passes still see the rest of the
/// program.
pub fn parse_program<B: BufRead>(asm: &mut Assembler, reader: B)
                                 -> io::Result<Vec<Line>> {
    let mut lines = Vec::new();
    for (index, source_line) in reader.lines().enumerate() {
        let source_line = source_line?;
        let number = index + 1;
        let comment_start = source_line.find("//")
            .unwrap_or(source_line.len());
        let text = source_line[..comment_start].trim();
        if text.is_empty() {
            continue;
        }

        let (label, rest) = match LABEL.captures(text) {
            Some(caps) => {
                let pin = match caps.get(2) {
                    None => None,
                    Some(pin_text) => {
                        match util::parse_num(pin_text.as_str()) {
                            Some(value) if value >= 0 => Some(value as u32),
                            _ => {
                                asm.warn(number, format!(
                                    "invalid label address `{}'",
                                    pin_text.as_str()));
                                None
                            }
                        }
                    }
                };
                let label = Label {
                    name: caps[1].to_string(),
                    pin: pin,
                };
                (Some(label), caps.get(3).map(|m| m.as_str()).unwrap_or(""))
            }
            None => (None, text),
        };

        let ops = parse_ops(asm, number, rest);
        lines.push(Line::new(label, ops, number));
    }
    Ok(lines)
}

/// Parse the `;`-separated operation list of one line.
fn parse_ops(asm: &mut Assembler, number: usize, rest: &str) -> Vec<Op> {
    let parts = rest
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();

    let mut ops = Vec::new();
    let mut i = 0;
    while i < parts.len() {
        if let Some(caps) = IF.captures(parts[i]) {
            let cond = if caps[1].eq_ignore_ascii_case("Z") {
                Cond::Z
            } else {
                Cond::N
            };
            let true_target = caps[2].to_string();
            match parts.get(i + 1).and_then(|part| ELSE.captures(part)) {
                Some(else_caps) => {
                    ops.push(Op::If(cond, true_target,
                                    else_caps[1].to_string()));
                    i += 2;
                }
                None => {
                    asm.warn(number,
                             "if without matching `else goto'".into());
                    i += 1;
                }
            }
        } else {
            if let Some(op) = parse_op(asm, number, parts[i]) {
                ops.push(op);
            }
            i += 1;
        }
    }
    ops
}

fn parse_op(asm: &mut Assembler, number: usize, part: &str) -> Option<Op> {
    match &part.to_lowercase() as &str {
        "rd" => return Some(Op::Read),
        "wr" => return Some(Op::Write),
        "fetch" => return Some(Op::Fetch),
        "empty" => return Some(Op::Empty),
        "halt" => return Some(Op::Halt),
        _ => (),
    }

    if let Some(caps) = IGOTO.captures(part) {
        let address = match caps.get(1) {
            None => 0,
            Some(addr_text) => match util::parse_num(addr_text.as_str()) {
                Some(value) if 0 <= value && value < 512 => value as u32,
                _ => {
                    asm.warn(number, format!("invalid goto address `{}'",
                                             addr_text.as_str()));
                    return None;
                }
            },
        };
        return Some(Op::IndirectGoto(address));
    }

    if let Some(caps) = GOTO.captures(part) {
        return Some(Op::Goto(caps[1].to_string()));
    }

    if part.contains('=') {
        return parse_assign(asm, number, part);
    }

    asm.warn(number, format!("syntax error: `{}'", part));
    None
}

fn parse_assign(asm: &mut Assembler, number: usize, part: &str)
                -> Option<Op> {
    let mut pieces = part.split('=').map(str::trim).collect::<Vec<_>>();
    let expr = pieces.pop().unwrap();

    let mut targets = Vec::new();
    for target in &pieces {
        match target.parse::<Reg>() {
            Ok(reg) => targets.push(reg),
            Err(_) => {
                asm.warn(number,
                         format!("unknown register `{}'", target));
                return None;
            }
        }
    }
    if targets.is_empty() {
        asm.warn(number, format!("syntax error: `{}'", part));
        return None;
    }

    let (expr, shift) = match SHIFT.captures(expr) {
        Some(caps) => {
            let shift = if caps[2].starts_with(">>") {
                Shift::Sra1
            } else {
                Shift::Sll8
            };
            let mut inner = caps.get(1).unwrap().as_str();
            if inner.starts_with('(') && inner.ends_with(')') {
                inner = inner[1..inner.len() - 1].trim();
            }
            (inner.to_string(), Some(shift))
        }
        None => (expr.to_string(), None),
    };

    match parse_alu(&expr) {
        Some(alu) => Some(Op::Assign(Assign {
            targets: targets,
            alu: alu,
            shift: shift,
        })),
        None => {
            asm.warn(number, format!("invalid ALU expression `{}'", expr));
            None
        }
    }
}

/// Parse an operand that is either a register or a small constant.
enum Operand {
    Reg(Reg),
    Num(i32),
}

fn parse_operand(text: &str) -> Option<Operand> {
    if let Ok(reg) = text.parse::<Reg>() {
        return Some(Operand::Reg(reg));
    }
    util::parse_num(text).map(Operand::Num)
}

fn parse_alu(expr: &str) -> Option<Alu> {
    if let Some(caps) = INV.captures(expr) {
        return caps[1].parse::<Reg>().ok().map(Alu::Inv);
    }

    if let Some(caps) = NEG.captures(expr) {
        return match parse_operand(&caps[1])? {
            Operand::Reg(reg) => Some(Alu::Neg(reg)),
            Operand::Num(value) => Some(Alu::Const(-value)),
        };
    }

    if let Some(caps) = ADD3.captures(expr) {
        let reg1 = caps[1].parse::<Reg>().ok()?;
        let reg2 = caps[2].parse::<Reg>().ok()?;
        return Some(Alu::AddRegReg1(reg1, reg2));
    }

    if let Some(caps) = ADD2.captures(expr) {
        let reg1 = caps[1].parse::<Reg>().ok()?;
        return match parse_operand(&caps[2])? {
            Operand::Num(1) => Some(Alu::AddReg1(reg1)),
            Operand::Reg(reg2) => Some(Alu::AddRegReg(reg1, reg2)),
            Operand::Num(_) => None,
        };
    }

    if let Some(caps) = SUB.captures(expr) {
        let reg1 = caps[1].parse::<Reg>().ok()?;
        return match parse_operand(&caps[2])? {
            Operand::Num(1) => Some(Alu::SubReg1(reg1)),
            Operand::Reg(reg2) => Some(Alu::SubRegReg(reg1, reg2)),
            Operand::Num(_) => None,
        };
    }

    if let Some(caps) = ANDOR.captures(expr) {
        let reg1 = caps[1].parse::<Reg>().ok()?;
        let reg2 = caps[3].parse::<Reg>().ok()?;
        return if caps[2].eq_ignore_ascii_case("and") {
            Some(Alu::And(reg1, reg2))
        } else {
            Some(Alu::Or(reg1, reg2))
        };
    }

    if let Some(caps) = SINGLE.captures(expr) {
        return match parse_operand(&caps[1])? {
            Operand::Reg(reg) => Some(Alu::Reg(reg)),
            Operand::Num(value) => Some(Alu::Const(value)),
        };
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> (Assembler, Vec<Line>) {
        let mut asm = Assembler::new();
        let lines = parse_program(&mut asm, source.as_bytes()).unwrap();
        (asm, lines)
    }

    #[test]
    fn parse_labels_and_pins() {
        let (asm, lines) = parse(
            "plain: rd\n\
             pinned = 0x60: wr\n\
             alone:\n",
        );
        assert!(asm.warnings().is_empty(), "{:?}", asm.warnings());
        assert_eq!(lines.len(), 3);
        let label = lines[0].label.as_ref().unwrap();
        assert_eq!(label.name, "plain");
        assert_eq!(label.pin, None);
        let label = lines[1].label.as_ref().unwrap();
        assert_eq!(label.pin, Some(0x60));
        assert!(lines[2].label.is_some());
        assert!(!lines[2].has_insns());
    }

    #[test]
    fn parse_chained_assignment() {
        let (asm, lines) = parse("MAR = SP = SP - 1; rd\n");
        assert!(asm.warnings().is_empty(), "{:?}", asm.warnings());
        assert_eq!(lines[0].ops.len(), 2);
        match lines[0].ops[0] {
            Op::Assign(ref assign) => {
                assert_eq!(assign.targets, [Reg::MAR, Reg::SP]);
                assert_eq!(assign.alu, Alu::SubReg1(Reg::SP));
                assert_eq!(assign.shift, None);
            }
            ref op => panic!("unexpected op {:?}", op),
        }
        assert_eq!(lines[0].ops[1], Op::Read);
    }

    #[test]
    fn parse_shifted_expression() {
        let (asm, lines) = parse("H = (MBR) << 8\nTOS = MDR >> 1\n");
        assert!(asm.warnings().is_empty(), "{:?}", asm.warnings());
        match lines[0].ops[0] {
            Op::Assign(ref assign) => {
                assert_eq!(assign.alu, Alu::Reg(Reg::MBR));
                assert_eq!(assign.shift, Some(Shift::Sll8));
            }
            ref op => panic!("unexpected op {:?}", op),
        }
        match lines[1].ops[0] {
            Op::Assign(ref assign) => {
                assert_eq!(assign.shift, Some(Shift::Sra1));
            }
            ref op => panic!("unexpected op {:?}", op),
        }
    }

    #[test]
    fn parse_branches() {
        let (asm, lines) = parse(
            "a: goto done\n\
             b: goto (MBR)\n\
             c: goto (MBR or 0x100)\n\
             d: if (Z) goto yes; else goto no\n",
        );
        assert!(asm.warnings().is_empty(), "{:?}", asm.warnings());
        assert_eq!(lines[0].ops, [Op::Goto("done".to_string())]);
        assert_eq!(lines[1].ops, [Op::IndirectGoto(0)]);
        assert_eq!(lines[2].ops, [Op::IndirectGoto(0x100)]);
        assert_eq!(
            lines[3].ops,
            [Op::If(Cond::Z, "yes".to_string(), "no".to_string())]
        );
    }

    #[test]
    fn parse_alu_forms() {
        assert_eq!(parse_alu("H"), Some(Alu::Reg(Reg::H)));
        assert_eq!(parse_alu("inv (SP)"), Some(Alu::Inv(Reg::SP)));
        assert_eq!(parse_alu("H + MDR + 1"),
                   Some(Alu::AddRegReg1(Reg::H, Reg::MDR)));
        assert_eq!(parse_alu("H + MDR"),
                   Some(Alu::AddRegReg(Reg::H, Reg::MDR)));
        assert_eq!(parse_alu("PC + 1"), Some(Alu::AddReg1(Reg::PC)));
        assert_eq!(parse_alu("SP - H"),
                   Some(Alu::SubRegReg(Reg::SP, Reg::H)));
        assert_eq!(parse_alu("SP - 1"), Some(Alu::SubReg1(Reg::SP)));
        assert_eq!(parse_alu("-H"), Some(Alu::Neg(Reg::H)));
        assert_eq!(parse_alu("H and TOS"),
                   Some(Alu::And(Reg::H, Reg::TOS)));
        assert_eq!(parse_alu("H or OPC"), Some(Alu::Or(Reg::H, Reg::OPC)));
        assert_eq!(parse_alu("0"), Some(Alu::Const(0)));
        assert_eq!(parse_alu("-1"), Some(Alu::Const(-1)));
        assert_eq!(parse_alu("H * 2"), None);
    }

    #[test]
    fn if_without_else_is_reported() {
        let (asm, lines) = parse("x: if (N) goto a\n");
        assert_eq!(lines[0].ops.len(), 0);
        assert_eq!(asm.warnings().len(), 1);
        assert!(asm.warnings()[0].contains("in line 1"));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let (asm, lines) = parse(
            "// header comment\n\
             \n\
             x: halt // trailing\n",
        );
        assert!(asm.warnings().is_empty());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].number, 3);
    }
}
