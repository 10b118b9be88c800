//! Library crate for the Mic1 toolchain: the microassembler and the
//! simulator for the Mic1 micro-architecture running IJVM bytecode.
//!
//! The assembler side lives in [`asm`], [`parse`], [`layout`] and
//! [`encode`]; the packed control word format is defined in [`word`] and
//! the on-disk image in [`image`]. The simulator is the [`Mic1`] struct
//! in this module, with the IJVM bytecode side in [`ijvm`].

extern crate regex;
#[macro_use]
extern crate lazy_static;

pub mod asm;
pub mod encode;
pub mod ijvm;
pub mod image;
pub mod layout;
pub mod logger;
pub mod parse;
pub mod util;
pub mod word;

use self::ijvm::IjvmImage;
use self::image::{Image, STORE_SIZE};
use self::logger::Logger;
use self::word::Word;

/// Size of the simulated memory in bytes.
pub const MEMORY_SIZE: usize = 640 << 10;

/// Value pushed as the object reference argument of the main method.
pub const INITIAL_OBJ_REF: i32 = 42;

/// State of the Mic1 after a cycle completed.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Mic1State {
    /// The machine is well and running.
    Running,
    /// The machine errored.
    Error(Mic1Error),
    /// The machine has reached a halt instruction.
    Halted,
}

/// Error that might happen during a Mic1 cycle.
///
/// The control words emitted by the assembler never trigger these, but a
/// hand-crafted image can select a B bus source or an ALU function that
/// the datapath does not implement.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Mic1Error {
    /// The B bus selector does not name a register.
    UndefinedBBus(u32),
    /// The ALU function code is not one of the 16 implemented ones.
    UndefinedAlu(u32),
}

/// A Mic1 with registers, control store and memory.
///
/// Memory is a single byte-addressed buffer; `fetch` reads single bytes
/// from it while `rd` and `wr` move 32 bit little-endian words through
/// the word-addressed view, so a word at index `k` aliases the four
/// bytes at offset `4 * k`.
pub struct Mic1 {
    pub mar: i32,
    pub mdr: i32,
    pub pc: i32,
    pub sp: i32,
    pub lv: i32,
    pub cpp: i32,
    pub tos: i32,
    pub opc: i32,
    pub h: i32,
    /// The latched instruction byte; read it signed via [`Mic1::mbr`].
    pub mbru: u8,

    /// The loaded control store, immutable during execution.
    pub store: [Word; STORE_SIZE],
    /// The microprogram counter.
    pub mpc: u32,

    /// First word index of the operand stack, for trace output.
    pub stack_base: i32,

    doing_rd: bool,
    doing_fetch: bool,
    memory: Vec<u8>,
}

impl Mic1 {
    /// Construct a machine from a control store image and, optionally, an
    /// IJVM bytecode image plus the arguments for its main method.
    ///
    /// The bytecode's method area is loaded at byte address 0 and the
    /// constant pool at the first word boundary after it. CPP, SP and H
    /// are seeded the way the standard IJVM microprogram expects them,
    /// and the object reference plus the given arguments are pushed.
    pub fn new(image: &Image, program: Option<&IjvmImage>, args: &[i32])
               -> Mic1 {
        let mut m = Mic1 {
            mar: 0,
            mdr: 0,
            pc: 0,
            sp: 0,
            lv: 0,
            cpp: 0,
            tos: 0,
            opc: 0,
            h: 0,
            mbru: 0,
            store: image.store,
            mpc: image.entry,
            stack_base: 0,
            doing_rd: false,
            doing_fetch: false,
            memory: vec![0; MEMORY_SIZE],
        };

        if let Some(program) = program {
            m.h = program.main_index as i32;
            m.cpp = ((program.method_area.len() + 3) / 4) as i32;
            m.sp = m.cpp + program.cpool.len() as i32 - 1;
            m.stack_base = m.sp;

            m.memory[..program.method_area.len()]
                .copy_from_slice(&program.method_area);
            let cpp = m.cpp;
            for (i, &value) in program.cpool.iter().enumerate() {
                m.write_word(cpp + i as i32, value);
            }

            m.sp += 1;
            let sp = m.sp;
            m.write_word(sp, INITIAL_OBJ_REF);
            for &arg in args {
                m.sp += 1;
                let sp = m.sp;
                m.write_word(sp, arg);
            }
        }
        m
    }

    /// The latched instruction byte, read signed.
    pub fn mbr(&self) -> i8 {
        self.mbru as i8
    }

    /// The control word the machine is about to execute.
    pub fn current_word(&self) -> Word {
        self.store[self.mpc as usize & (STORE_SIZE - 1)]
    }

    /// Whether the machine keeps running: the word at the current
    /// microprogram counter is not a halt instruction. This is evaluated
    /// on the word about to execute, before its cycle runs.
    pub fn active(&self) -> bool {
        let selector = self.current_word()
            .get_bits(word::B_BUS_OFFSET, word::B_BUS_SIZE);
        selector != word::B_BUS_HALT
    }

    /// Read a byte of memory. Out-of-range addresses read as zero.
    pub fn read_byte(&self, address: i32) -> u8 {
        if 0 <= address && (address as usize) < MEMORY_SIZE {
            self.memory[address as usize]
        } else {
            0
        }
    }

    /// Read a word of memory. Out-of-range indices read as zero.
    pub fn read_word(&self, index: i32) -> i32 {
        if 0 <= index && (index as usize) < MEMORY_SIZE / 4 {
            let at = index as usize * 4;
            (self.memory[at] as u32
             | (self.memory[at + 1] as u32) << 8
             | (self.memory[at + 2] as u32) << 16
             | (self.memory[at + 3] as u32) << 24) as i32
        } else {
            0
        }
    }

    /// Write a word of memory. Out-of-range writes are dropped.
    pub fn write_word(&mut self, index: i32, value: i32) {
        if 0 <= index && (index as usize) < MEMORY_SIZE / 4 {
            let at = index as usize * 4;
            self.memory[at] = value as u8;
            self.memory[at + 1] = (value >> 8) as u8;
            self.memory[at + 2] = (value >> 16) as u8;
            self.memory[at + 3] = (value >> 24) as u8;
        }
    }

    fn read_b_bus(&self, selector: u32) -> Result<i32, Mic1Error> {
        match selector {
            0 => Ok(self.mdr),
            1 => Ok(self.pc),
            2 => Ok(self.mbr() as i32),
            3 => Ok(self.mbru as i32),
            4 => Ok(self.sp),
            5 => Ok(self.lv),
            6 => Ok(self.cpp),
            7 => Ok(self.tos),
            8 => Ok(self.opc),
            _ => Err(Mic1Error::UndefinedBBus(selector)),
        }
    }

    fn alu(&self, code: u32, b_bus: i32) -> Result<i32, Mic1Error> {
        let h = self.h;
        let res = match code {
            word::ALU_H => h,
            word::ALU_B_BUS => b_bus,
            word::ALU_INV_H => !h,
            word::ALU_INV_B_BUS => !b_bus,
            word::ALU_ADD_B_BUS_H => h.wrapping_add(b_bus),
            word::ALU_ADD_B_BUS_H_1 => h.wrapping_add(b_bus).wrapping_add(1),
            word::ALU_ADD_H_1 => h.wrapping_add(1),
            word::ALU_ADD_B_BUS_1 => b_bus.wrapping_add(1),
            word::ALU_SUB_B_BUS_H => b_bus.wrapping_sub(h),
            word::ALU_SUB_B_BUS_1 => b_bus.wrapping_sub(1),
            word::ALU_NEG_H => h.wrapping_neg(),
            word::ALU_H_AND_B_BUS => h & b_bus,
            word::ALU_H_OR_B_BUS => h | b_bus,
            word::ALU_0 => 0,
            word::ALU_1 => 1,
            word::ALU_MINUS_1 => -1,
            _ => return Err(Mic1Error::UndefinedAlu(code)),
        };
        Ok(res)
    }

    /// Advance the machine by one cycle.
    ///
    /// The logger is notified before the datapath executes and again
    /// once the new microprogram counter is in place. A halt word stops
    /// the machine without running a cycle.
    pub fn cycle(&mut self, logger: &mut Logger) -> Mic1State {
        if !self.active() {
            return Mic1State::Halted;
        }
        logger.cycle_starting(self);

        let mir = self.current_word();
        let selector = mir.get_bits(word::B_BUS_OFFSET, word::B_BUS_SIZE);
        let b_bus = match self.read_b_bus(selector) {
            Ok(value) => value,
            Err(err) => return Mic1State::Error(err),
        };
        let code = mir.get_bits(word::ALU_OFFSET, word::ALU_SIZE);
        let mut res = match self.alu(code, b_bus) {
            Ok(value) => value,
            Err(err) => return Mic1State::Error(err),
        };

        if mir.get_bit(word::SRA1_BIT) {
            res >>= 1;
        }
        if mir.get_bit(word::SLL8_BIT) {
            res <<= 8;
        }

        // Memory operations initiated last cycle land now, right before
        // the C bus is committed. MAR and PC are still last cycle's
        // values here.
        if self.doing_rd {
            self.mdr = self.read_word(self.mar);
            self.doing_rd = false;
        }
        if self.doing_fetch {
            self.mbru = self.read_byte(self.pc);
            self.doing_fetch = false;
        }

        if mir.get_bit(word::MAR_BIT) {
            self.mar = res;
        }
        if mir.get_bit(word::MDR_BIT) {
            self.mdr = res;
        }
        if mir.get_bit(word::PC_BIT) {
            self.pc = res;
        }
        if mir.get_bit(word::SP_BIT) {
            self.sp = res;
        }
        if mir.get_bit(word::LV_BIT) {
            self.lv = res;
        }
        if mir.get_bit(word::CPP_BIT) {
            self.cpp = res;
        }
        if mir.get_bit(word::TOS_BIT) {
            self.tos = res;
        }
        if mir.get_bit(word::OPC_BIT) {
            self.opc = res;
        }
        if mir.get_bit(word::H_BIT) {
            self.h = res;
        }

        if mir.get_bit(word::WRITE_BIT) {
            let (mar, mdr) = (self.mar, self.mdr);
            self.write_word(mar, mdr);
        }
        if mir.get_bit(word::READ_BIT) {
            self.doing_rd = true;
        }
        if mir.get_bit(word::FETCH_BIT) {
            self.doing_fetch = true;
        }

        // The next address may depend on MBR, which was loaded above, so
        // a fetched byte dispatched with goto (MBR) is seen one cycle
        // earlier than by a normal B bus read.
        let mut address = mir.get_bits(word::ADDRESS_OFFSET,
                                       word::ADDRESS_SIZE);
        if mir.get_bit(word::JAMZ_BIT) && res == 0 {
            address |= 0x100;
        }
        if mir.get_bit(word::JAMN_BIT) && res < 0 {
            address |= 0x100;
        }
        if mir.get_bit(word::JMPC_BIT) {
            address |= self.mbru as u32;
        }
        self.mpc = address;

        logger.cycle_complete(self);
        Mic1State::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::logger::NoLogging;

    fn machine_with(words: &[(usize, Word)]) -> Mic1 {
        let mut image = Image::new();
        for &(address, word) in words {
            image.store[address] = word;
        }
        Mic1::new(&image, None, &[])
    }

    fn step(m: &mut Mic1) -> Mic1State {
        m.cycle(&mut NoLogging)
    }

    #[test]
    fn register_copy_and_next_address() {
        // MAR = PC; goto 0x005
        let mut word = Word::new();
        word.set_bits(1, word::B_BUS_OFFSET);
        word.set_bits(word::ALU_B_BUS, word::ALU_OFFSET);
        word.set_bit(word::MAR_BIT);
        word.set_bits(5, word::ADDRESS_OFFSET);

        let mut m = machine_with(&[(0, word)]);
        m.pc = 1234;
        assert_eq!(step(&mut m), Mic1State::Running);
        assert_eq!(m.mar, 1234);
        assert_eq!(m.mpc, 5);
    }

    #[test]
    fn halt_word_stops_the_machine() {
        let mut halt = Word::new();
        halt.set_bits(word::B_BUS_HALT, word::B_BUS_OFFSET);
        let mut m = machine_with(&[(3, halt)]);
        assert!(m.active());
        m.mpc = 3;
        assert!(!m.active());
        assert_eq!(step(&mut m), Mic1State::Halted);
        assert_eq!(m.mpc, 3);
    }

    #[test]
    fn read_lands_one_cycle_late() {
        // MAR = SP; rd; goto 1 / SP = SP; goto 2
        let mut first = Word::new();
        first.set_bits(4, word::B_BUS_OFFSET);
        first.set_bits(word::ALU_B_BUS, word::ALU_OFFSET);
        first.set_bit(word::MAR_BIT);
        first.set_bit(word::READ_BIT);
        first.set_bits(1, word::ADDRESS_OFFSET);
        let mut second = Word::new();
        second.set_bits(4, word::B_BUS_OFFSET);
        second.set_bits(word::ALU_B_BUS, word::ALU_OFFSET);
        second.set_bit(word::SP_BIT);
        second.set_bits(2, word::ADDRESS_OFFSET);

        let mut m = machine_with(&[(0, first), (1, second)]);
        m.write_word(7, -99);
        m.sp = 7;
        step(&mut m);
        assert_eq!(m.mdr, 0, "read must not land in its own cycle");
        step(&mut m);
        assert_eq!(m.mdr, -99);
    }

    #[test]
    fn fetch_and_indirect_dispatch() {
        // fetch; goto 1 / nop; goto 2 / goto (MBR)
        let mut first = Word::new();
        first.set_bit(word::FETCH_BIT);
        first.set_bits(word::ALU_0, word::ALU_OFFSET);
        first.set_bits(1, word::ADDRESS_OFFSET);
        let mut second = Word::new();
        second.set_bits(word::ALU_0, word::ALU_OFFSET);
        second.set_bits(2, word::ADDRESS_OFFSET);
        let mut third = Word::new();
        third.set_bits(word::ALU_0, word::ALU_OFFSET);
        third.set_bit(word::JMPC_BIT);

        let mut m = machine_with(&[(0, first), (1, second), (2, third)]);
        m.pc = 5;
        m.write_word(1, 0x60 << 8); // byte 5 of the little-endian word view
        step(&mut m);
        assert_eq!(m.mbru, 0, "fetch must not land in its own cycle");
        step(&mut m);
        assert_eq!(m.mbru, 0x60);
        step(&mut m);
        assert_eq!(m.mpc, 0x60);
    }

    #[test]
    fn conditional_jump_on_zero() {
        // Z = TOS; if (Z) goto 0x105; else goto 0x005
        let mut word = Word::new();
        word.set_bits(7, word::B_BUS_OFFSET);
        word.set_bits(word::ALU_B_BUS, word::ALU_OFFSET);
        word.set_bit(word::JAMZ_BIT);
        word.set_bits(5, word::ADDRESS_OFFSET);

        let mut m = machine_with(&[(0, word)]);
        m.tos = 0;
        step(&mut m);
        assert_eq!(m.mpc, 0x105);

        let mut m = machine_with(&[(0, word)]);
        m.tos = 17;
        step(&mut m);
        assert_eq!(m.mpc, 0x005);
    }

    #[test]
    fn shifts_apply_right_then_left() {
        let mut word = Word::new();
        word.set_bits(7, word::B_BUS_OFFSET);
        word.set_bits(word::ALU_B_BUS, word::ALU_OFFSET);
        word.set_bit(word::SRA1_BIT);
        word.set_bit(word::SLL8_BIT);
        word.set_bit(word::H_BIT);

        let mut m = machine_with(&[(0, word)]);
        m.tos = -7;
        step(&mut m);
        // arithmetic: -7 >> 1 == -4, then << 8
        assert_eq!(m.h, -4 << 8);
    }

    #[test]
    fn word_and_byte_views_alias() {
        let image = Image::new();
        let mut m = Mic1::new(&image, None, &[]);
        m.write_word(3, 0x0403_0201);
        assert_eq!(m.read_byte(12), 0x01);
        assert_eq!(m.read_byte(13), 0x02);
        assert_eq!(m.read_byte(14), 0x03);
        assert_eq!(m.read_byte(15), 0x04);
        assert_eq!(m.read_word(3), 0x0403_0201);
    }

    #[test]
    fn out_of_range_accesses_are_harmless() {
        let image = Image::new();
        let mut m = Mic1::new(&image, None, &[]);
        assert_eq!(m.read_byte(-1), 0);
        assert_eq!(m.read_word(MEMORY_SIZE as i32), 0);
        m.write_word(-5, 123);
        m.write_word(MEMORY_SIZE as i32 / 4, 123);
    }

    #[test]
    fn undefined_b_bus_selector_errors() {
        let mut word = Word::new();
        word.set_bits(11, word::B_BUS_OFFSET);
        word.set_bits(word::ALU_0, word::ALU_OFFSET);
        let mut m = machine_with(&[(0, word)]);
        assert_eq!(step(&mut m),
                   Mic1State::Error(Mic1Error::UndefinedBBus(11)));
    }

    #[test]
    fn undefined_alu_code_errors() {
        let mut word = Word::new();
        word.set_bits(0x2f, word::ALU_OFFSET);
        let mut m = machine_with(&[(0, word)]);
        assert_eq!(step(&mut m),
                   Mic1State::Error(Mic1Error::UndefinedAlu(0x2f)));
    }

    #[test]
    fn bytecode_image_seeds_the_machine() {
        let program = IjvmImage {
            main_index: 1,
            method_area: vec![0x00, 0x10, 0x05, 0x10, 0x2a, 0x60],
            cpool: vec![7, -3],
        };
        let image = Image::new();
        let m = Mic1::new(&image, Some(&program), &[11, 22]);

        assert_eq!(m.h, 1);
        assert_eq!(m.cpp, 2);
        // cpool starts right after the method area
        assert_eq!(m.read_word(2), 7);
        assert_eq!(m.read_word(3), -3);
        // object reference plus the two arguments on the stack
        assert_eq!(m.stack_base, 3);
        assert_eq!(m.read_word(4), INITIAL_OBJ_REF);
        assert_eq!(m.read_word(5), 11);
        assert_eq!(m.read_word(6), 22);
        assert_eq!(m.sp, 6);
        assert_eq!(m.read_byte(1), 0x10);
    }
}
