//! Data model of the microassembler and the assembly driver.
//!
//! A micro program is a sequence of [`Line`]s. Every line owns its packed
//! control word plus the operations and ALU expressions parsed from the
//! source; labels carry an optional absolute address pin and are bound to
//! the first following line that actually holds instructions.
//!
//! Assembly runs in stages: the parser builds the line sequence, the
//! layout pass assigns every instruction-bearing line a control store
//! address, the encoder stamps the bit patterns, and finally the image is
//! emitted. Rule violations along the way are collected as warnings on
//! the [`Assembler`] context; if any occurred, no image is produced.

use std::io::{self, BufRead};
use std::str::FromStr;

use super::encode;
use super::image::Image;
use super::layout::Layout;
use super::parse;
use super::word::{self, Word};

/// A register of the Mic1 datapath, as far as the assembler cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    MAR,
    MDR,
    PC,
    MBR,
    MBRU,
    SP,
    LV,
    CPP,
    TOS,
    OPC,
    H,
    /// Pseudo target (`Z = ...`, `N = ...`) that drives the ALU for a
    /// conditional branch without latching the result anywhere.
    Virtual,
}

impl Reg {
    /// The display name of the register.
    pub fn name(&self) -> &'static str {
        match *self {
            Reg::MAR => "MAR",
            Reg::MDR => "MDR",
            Reg::PC => "PC",
            Reg::MBR => "MBR",
            Reg::MBRU => "MBRU",
            Reg::SP => "SP",
            Reg::LV => "LV",
            Reg::CPP => "CPP",
            Reg::TOS => "TOS",
            Reg::OPC => "OPC",
            Reg::H => "H",
            Reg::Virtual => "VIRTUAL",
        }
    }

    /// The C bus destination bit of the register, if it has one. MBR and
    /// MBRU are loaded from memory only and cannot be written from the C
    /// bus.
    pub fn c_bit(&self) -> Option<usize> {
        match *self {
            Reg::MAR => Some(word::MAR_BIT),
            Reg::MDR => Some(word::MDR_BIT),
            Reg::PC => Some(word::PC_BIT),
            Reg::SP => Some(word::SP_BIT),
            Reg::LV => Some(word::LV_BIT),
            Reg::CPP => Some(word::CPP_BIT),
            Reg::TOS => Some(word::TOS_BIT),
            Reg::OPC => Some(word::OPC_BIT),
            Reg::H => Some(word::H_BIT),
            Reg::MBR | Reg::MBRU | Reg::Virtual => None,
        }
    }

    /// The B bus selector value of the register. MAR can never drive the
    /// B bus, and H has its own dedicated ALU input.
    pub fn b_bus(&self) -> Option<u32> {
        match *self {
            Reg::MDR => Some(0),
            Reg::PC => Some(1),
            Reg::MBR => Some(2),
            Reg::MBRU => Some(3),
            Reg::SP => Some(4),
            Reg::LV => Some(5),
            Reg::CPP => Some(6),
            Reg::TOS => Some(7),
            Reg::OPC => Some(8),
            Reg::MAR | Reg::H | Reg::Virtual => None,
        }
    }
}

/// Error for unknown registers, used for `std::str::FromStr`.
pub struct UnknownReg;

impl FromStr for Reg {
    type Err = UnknownReg;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        match &lower as &str {
            "mar" => Ok(Reg::MAR),
            "mdr" => Ok(Reg::MDR),
            "pc" => Ok(Reg::PC),
            "mbr" => Ok(Reg::MBR),
            "mbru" => Ok(Reg::MBRU),
            "sp" => Ok(Reg::SP),
            "lv" => Ok(Reg::LV),
            "cpp" => Ok(Reg::CPP),
            "tos" => Ok(Reg::TOS),
            "opc" => Ok(Reg::OPC),
            "h" => Ok(Reg::H),
            "z" | "n" => Ok(Reg::Virtual),
            _ => Err(UnknownReg),
        }
    }
}

/// Condition tested by a conditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    /// Branch if the ALU result was zero.
    Z,
    /// Branch if the ALU result was negative.
    N,
}

/// An ALU expression on the right hand side of an assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alu {
    /// Pass a register through.
    Reg(Reg),
    /// Ones complement.
    Inv(Reg),
    /// `a + b + 1`; one operand must be H.
    AddRegReg1(Reg, Reg),
    /// `a + b`; one operand must be H.
    AddRegReg(Reg, Reg),
    /// `reg + 1`.
    AddReg1(Reg),
    /// `a - b`; only `reg - H` is encodable.
    SubRegReg(Reg, Reg),
    /// `reg - 1`.
    SubReg1(Reg),
    /// Two's complement; only H can be negated.
    Neg(Reg),
    /// `a and b`; one operand must be H.
    And(Reg, Reg),
    /// `a or b`; one operand must be H.
    Or(Reg, Reg),
    /// A constant; only 0, 1 and -1 exist in the ALU.
    Const(i32),
}

/// Shift modifier applied to the ALU result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    /// Arithmetic right shift by one.
    Sra1,
    /// Left shift by eight.
    Sll8,
}

/// A register assignment, possibly chained (`SP = MAR = SP - 1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assign {
    /// All destination registers, outermost first.
    pub targets: Vec<Reg>,
    /// The ALU expression producing the value.
    pub alu: Alu,
    /// Optional shift applied after the ALU.
    pub shift: Option<Shift>,
}

/// One operation on a microinstruction line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Initiate a memory read.
    Read,
    /// Initiate a memory write.
    Write,
    /// Initiate an instruction byte fetch.
    Fetch,
    /// An explicit no-op line.
    Empty,
    /// Stop the machine.
    Halt,
    /// Unconditional branch to a label.
    Goto(String),
    /// Indirect branch through MBR, with an OR-mask address.
    IndirectGoto(u32),
    /// Conditional branch: true target first, false target second.
    If(Cond, String, String),
    /// A register assignment.
    Assign(Assign),
}

/// A label decorating a line, with an optional absolute address pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub pin: Option<u32>,
}

/// One source line of the micro program.
#[derive(Debug, Clone)]
pub struct Line {
    /// The label defined on this line, if any.
    pub label: Option<Label>,
    /// The operations on the line; empty for label-only lines.
    pub ops: Vec<Op>,
    /// Source line number, for diagnostics.
    pub number: usize,
    /// Control store address, once the layout pass has run.
    pub address: Option<u32>,
    /// The packed control word, filled in by the encoder.
    pub word: Word,
}

impl Line {
    pub fn new(label: Option<Label>, ops: Vec<Op>, number: usize) -> Line {
        Line {
            label: label,
            ops: ops,
            number: number,
            address: None,
            word: Word::new(),
        }
    }

    /// Whether the line holds instructions and thus occupies a store slot.
    pub fn has_insns(&self) -> bool {
        !self.ops.is_empty()
    }
}

/// The assembly context: accumulated diagnostics.
///
/// The layout pass and the encoder report every violated rule here
/// instead of aborting, so that a single run surfaces all problems. An
/// image is only emitted if the context stayed clean.
#[derive(Debug, Default)]
pub struct Assembler {
    warnings: Vec<String>,
}

impl Assembler {
    pub fn new() -> Assembler {
        Default::default()
    }

    /// Record a warning for the given source line.
    pub fn warn(&mut self, line_number: usize, message: String) {
        self.warnings.push(format!("in line {}: {}", line_number, message));
    }

    /// Record a warning that has no source position.
    pub fn warn_global(&mut self, message: String) {
        self.warnings.push(message);
    }

    /// All warnings reported so far.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Run the full assembly pipeline on the given source.
    ///
    /// Returns `Ok(Some(image))` on success and `Ok(None)` if warnings
    /// were reported; the warnings can then be inspected on the context.
    pub fn assemble<B: BufRead>(&mut self, reader: B)
                                -> Result<Option<Image>, io::Error> {
        let mut lines = parse::parse_program(self, reader)?;
        let layout = Layout::run(self, &mut lines);
        encode::encode_program(self, &mut lines, &layout);

        let entry = lines
            .iter()
            .find(|line| line.has_insns())
            .and_then(|line| line.address);
        if entry.is_none() {
            self.warn_global("couldn't find entry point, \
                              something is wrong".into());
        }

        if !self.warnings.is_empty() {
            return Ok(None);
        }

        let mut image = Image::new();
        image.entry = entry.unwrap();
        for line in &lines {
            if let Some(address) = line.address {
                image.store[address as usize] = line.word;
            }
        }
        Ok(Some(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(source: &str) -> (Assembler, Option<Image>) {
        let mut asm = Assembler::new();
        let image = asm.assemble(source.as_bytes()).unwrap();
        (asm, image)
    }

    #[test]
    fn assemble_minimal_program() {
        let (asm, image) = assemble(
            "start: PC = PC + 1; goto start\n",
        );
        assert!(asm.warnings().is_empty(), "{:?}", asm.warnings());
        let image = image.unwrap();
        assert_eq!(image.entry, 0);
        assert_eq!(image.store[0].disassemble(), "PC = PC + 1; goto 0x000;");
    }

    #[test]
    fn fall_through_targets_following_line() {
        let (asm, image) = assemble(
            "first: H = SP\n\
             second: MDR = H\n\
             done: halt\n",
        );
        assert!(asm.warnings().is_empty(), "{:?}", asm.warnings());
        let image = image.unwrap();
        // first falls through to second, second to done
        assert_eq!(image.store[0].get_bits(word::ADDRESS_OFFSET,
                                           word::ADDRESS_SIZE), 1);
        assert_eq!(image.store[1].get_bits(word::ADDRESS_OFFSET,
                                           word::ADDRESS_SIZE), 2);
        assert_eq!(image.store[2].disassemble(), "halt");
    }

    #[test]
    fn warnings_suppress_output() {
        let (asm, image) = assemble("start: MBR = SP; goto start\n");
        assert!(image.is_none());
        assert!(!asm.warnings().is_empty());
    }

    #[test]
    fn entry_is_first_instruction_line() {
        let (asm, image) = assemble(
            "init = 0x20: H = SP; goto run\n\
             run: halt\n",
        );
        assert!(asm.warnings().is_empty(), "{:?}", asm.warnings());
        assert_eq!(image.unwrap().entry, 0x20);
    }

    #[test]
    fn empty_program_is_rejected() {
        let (asm, image) = assemble("// nothing here\n");
        assert!(image.is_none());
        assert!(!asm.warnings().is_empty());
    }
}
