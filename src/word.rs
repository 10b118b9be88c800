//! The 40 bit Mic1 control word and its bit-level layout.
//!
//! A microinstruction is stored as 5 bytes, with bit 0 being the least
//! significant bit of byte 0. All field offsets below are bit positions in
//! that numbering. Fields may straddle byte boundaries, so the accessors
//! assemble values from multiple bytes.

use std::fmt::Write;

/// B bus register selector.
pub const B_BUS_OFFSET: usize = 0;
pub const B_BUS_SIZE: usize = 4;
/// Selector value that marks a halt instruction instead of a register.
pub const B_BUS_HALT: u32 = 15;

pub const FETCH_BIT: usize = 4;
pub const READ_BIT: usize = 5;
pub const WRITE_BIT: usize = 6;

/// One bit per C bus destination register, MAR first.
pub const C_BUS_OFFSET: usize = 7;
pub const MAR_BIT: usize = 7;
pub const MDR_BIT: usize = 8;
pub const PC_BIT: usize = 9;
pub const SP_BIT: usize = 10;
pub const LV_BIT: usize = 11;
pub const CPP_BIT: usize = 12;
pub const TOS_BIT: usize = 13;
pub const OPC_BIT: usize = 14;
pub const H_BIT: usize = 15;

pub const ALU_OFFSET: usize = 16;
pub const ALU_SIZE: usize = 6;
pub const SRA1_BIT: usize = 22;
pub const SLL8_BIT: usize = 23;

pub const JAMZ_BIT: usize = 24;
pub const JAMN_BIT: usize = 25;
pub const JMPC_BIT: usize = 26;

pub const ADDRESS_OFFSET: usize = 27;
pub const ADDRESS_SIZE: usize = 9;

// The six ALU control lines.
const INC: u32 = 1 << 0;
const INVA: u32 = 1 << 1;
const ENB: u32 = 1 << 2;
const ENA: u32 = 1 << 3;
const F1: u32 = 1 << 4;
const F0: u32 = 1 << 5;

// The 16 defined combinations of the control lines.
pub const ALU_H: u32 = F1 | ENA;
pub const ALU_B_BUS: u32 = F1 | ENB;
pub const ALU_INV_H: u32 = F1 | ENA | INVA;
pub const ALU_INV_B_BUS: u32 = F0 | ENA | ENB;
pub const ALU_ADD_B_BUS_H: u32 = F0 | F1 | ENA | ENB;
pub const ALU_ADD_B_BUS_H_1: u32 = F0 | F1 | ENA | ENB | INC;
pub const ALU_ADD_H_1: u32 = F0 | F1 | ENA | INC;
pub const ALU_ADD_B_BUS_1: u32 = F0 | F1 | ENB | INC;
pub const ALU_SUB_B_BUS_H: u32 = F0 | F1 | ENA | ENB | INVA | INC;
pub const ALU_SUB_B_BUS_1: u32 = F0 | F1 | ENB | INVA | INC;
pub const ALU_NEG_H: u32 = F0 | F1 | ENA | INVA | INC;
pub const ALU_H_AND_B_BUS: u32 = ENA | ENB;
pub const ALU_H_OR_B_BUS: u32 = F1 | ENA | ENB;
pub const ALU_0: u32 = F1;
pub const ALU_1: u32 = F1 | INC;
pub const ALU_MINUS_1: u32 = F1 | INVA;

/// Names of the C bus destinations, in bit order starting at `MAR_BIT`.
pub static C_BUS_NAMES: [&'static str; 9] = [
    "MAR", "MDR", "PC", "SP", "LV", "CPP", "TOS", "OPC", "H",
];

/// Names of the B bus selector values 0 through 8.
pub static B_BUS_NAMES: [&'static str; 9] = [
    "MDR", "PC", "MBR", "MBRU", "SP", "LV", "CPP", "TOS", "OPC",
];

fn b_bus_name(selector: u32) -> &'static str {
    B_BUS_NAMES
        .get(selector as usize)
        .map(|n| *n)
        .unwrap_or("<bad B bus selector>")
}

/// A single packed microinstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Word([u8; 5]);

impl Word {
    /// Create an all-zero word.
    pub fn new() -> Word {
        Word([0; 5])
    }

    /// Reset the word to all zeroes.
    pub fn clear(&mut self) {
        self.0 = [0; 5];
    }

    /// OR the given bits into the word, with the value's bit 0 landing at
    /// position `pos`. The value may span several bytes.
    pub fn set_bits(&mut self, bits: u32, pos: usize) {
        let mut index = pos / 8;
        let mut bits = (bits as u64) << (pos & 7);
        while bits != 0 && index < 5 {
            self.0[index] |= bits as u8;
            bits >>= 8;
            index += 1;
        }
    }

    /// Set a single bit.
    pub fn set_bit(&mut self, pos: usize) {
        self.set_bits(1, pos);
    }

    /// Extract `size` bits starting at position `pos`.
    pub fn get_bits(&self, pos: usize, size: usize) -> u32 {
        let mut index = pos / 8;
        let offset = pos & 7;
        let mut result = (self.0[index] >> offset) as u32;
        let mut have = 8 - offset;
        while have < size && index + 1 < 5 {
            index += 1;
            result |= (self.0[index] as u32) << have;
            have += 8;
        }
        result & ((1 << size) - 1)
    }

    /// Test a single bit.
    pub fn get_bit(&self, pos: usize) -> bool {
        self.get_bits(pos, 1) != 0
    }

    /// Render the word as 10 hex digits, most significant byte first.
    pub fn to_hex(&self) -> String {
        let mut buf = String::with_capacity(10);
        for i in (0..5).rev() {
            write!(buf, "{:02x}", self.0[i]).unwrap();
        }
        buf
    }

    /// Parse a word from 10 hex digits as written by `to_hex`.
    pub fn from_hex(text: &str) -> Option<Word> {
        let mut word = Word::new();
        for i in 0..5 {
            let digits = text.get(2 * i..2 * i + 2)?;
            match u8::from_str_radix(digits, 16) {
                Ok(byte) => word.0[4 - i] = byte,
                Err(_) => return None,
            }
        }
        Some(word)
    }

    /// Render the word as readable microcode.
    ///
    /// The output mirrors the notation accepted by the assembler: the C bus
    /// destinations, the ALU expression (parenthesized if shifted), the
    /// memory tags and finally the branch clause. A word whose B bus
    /// selector is 15 is a halt marker and renders as `halt` alone.
    pub fn disassemble(&self) -> String {
        let mut buf = String::new();

        let alu = self.get_bits(ALU_OFFSET, ALU_SIZE);
        let b_bus = self.get_bits(B_BUS_OFFSET, B_BUS_SIZE);

        if b_bus == B_BUS_HALT {
            return "halt".into();
        }

        let mut c_bus = false;
        for i in MAR_BIT..H_BIT + 1 {
            if self.get_bit(i) {
                write!(buf, "{} = ", C_BUS_NAMES[i - MAR_BIT]).unwrap();
                c_bus = true;
            }
        }

        // A conditional branch computes the ALU result without latching it
        // anywhere; show the tested condition as a pseudo destination.
        let mut need_alu = false;
        if !c_bus && self.get_bit(JAMZ_BIT) {
            buf.push_str("Z = ");
            need_alu = true;
        } else if !c_bus && self.get_bit(JAMN_BIT) {
            buf.push_str("N = ");
            need_alu = true;
        }

        if c_bus || need_alu {
            if self.get_bit(SRA1_BIT) || self.get_bit(SLL8_BIT) {
                buf.push_str("(");
            }

            match alu {
                ALU_H => buf.push_str("H"),
                ALU_B_BUS => buf.push_str(b_bus_name(b_bus)),
                ALU_INV_H => buf.push_str("inv (H)"),
                ALU_INV_B_BUS => {
                    write!(buf, "inv ({})", b_bus_name(b_bus)).unwrap()
                }
                ALU_ADD_B_BUS_H => {
                    write!(buf, "H + {}", b_bus_name(b_bus)).unwrap()
                }
                ALU_ADD_B_BUS_H_1 => {
                    write!(buf, "H + {} + 1", b_bus_name(b_bus)).unwrap()
                }
                ALU_ADD_H_1 => buf.push_str("H + 1"),
                ALU_ADD_B_BUS_1 => {
                    write!(buf, "{} + 1", b_bus_name(b_bus)).unwrap()
                }
                ALU_SUB_B_BUS_H => {
                    write!(buf, "{} - H", b_bus_name(b_bus)).unwrap()
                }
                ALU_SUB_B_BUS_1 => {
                    write!(buf, "{} - 1", b_bus_name(b_bus)).unwrap()
                }
                ALU_NEG_H => buf.push_str("-H"),
                ALU_H_AND_B_BUS => {
                    write!(buf, "H and {}", b_bus_name(b_bus)).unwrap()
                }
                ALU_H_OR_B_BUS => {
                    write!(buf, "H or {}", b_bus_name(b_bus)).unwrap()
                }
                ALU_0 => buf.push_str("0"),
                ALU_1 => buf.push_str("1"),
                ALU_MINUS_1 => buf.push_str("-1"),
                _ => {
                    write!(buf, "<unknown alu operation: 0x{:02x}>", alu)
                        .unwrap()
                }
            }

            if self.get_bit(SRA1_BIT) {
                buf.push_str(") >> 1");
            }
            if self.get_bit(SLL8_BIT) {
                buf.push_str(") << 8");
            }
            buf.push_str("; ");
        }

        if self.get_bit(WRITE_BIT) {
            buf.push_str("wr; ");
        }
        if self.get_bit(READ_BIT) {
            buf.push_str("rd; ");
        }
        if self.get_bit(FETCH_BIT) {
            buf.push_str("fetch; ");
        }

        let address = self.get_bits(ADDRESS_OFFSET, ADDRESS_SIZE);
        if self.get_bit(JAMZ_BIT) {
            write!(buf, "if (Z) goto 0x{:03x}; else goto 0x{:03x};",
                   address | 0x100, address).unwrap();
        } else if self.get_bit(JAMN_BIT) {
            write!(buf, "if (N) goto 0x{:03x}; else goto 0x{:03x};",
                   address | 0x100, address).unwrap();
        } else if self.get_bit(JMPC_BIT) {
            if address == 0 {
                buf.push_str("goto (MBR);");
            } else {
                write!(buf, "goto (MBR or 0x{:03x});", address).unwrap();
            }
        } else {
            write!(buf, "goto 0x{:03x};", address).unwrap();
        }

        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_roundtrip_within_byte() {
        let mut word = Word::new();
        word.set_bits(0xa, B_BUS_OFFSET);
        assert_eq!(word.get_bits(B_BUS_OFFSET, B_BUS_SIZE), 0xa);
        assert_eq!(word.get_bits(FETCH_BIT, 1), 0);
    }

    #[test]
    fn bits_roundtrip_across_bytes() {
        // The address field covers bits 27..36, crossing two byte borders.
        let mut word = Word::new();
        word.set_bits(0x1a3, ADDRESS_OFFSET);
        assert_eq!(word.get_bits(ADDRESS_OFFSET, ADDRESS_SIZE), 0x1a3);
        // The C bus field covers bits 7..16.
        word.set_bits(0x155, C_BUS_OFFSET);
        assert_eq!(word.get_bits(C_BUS_OFFSET, 9), 0x155);
        assert_eq!(word.get_bits(ADDRESS_OFFSET, ADDRESS_SIZE), 0x1a3);
    }

    #[test]
    fn alu_codes_roundtrip() {
        let codes = [
            ALU_H, ALU_B_BUS, ALU_INV_H, ALU_INV_B_BUS, ALU_ADD_B_BUS_H,
            ALU_ADD_B_BUS_H_1, ALU_ADD_H_1, ALU_ADD_B_BUS_1, ALU_SUB_B_BUS_H,
            ALU_SUB_B_BUS_1, ALU_NEG_H, ALU_H_AND_B_BUS, ALU_H_OR_B_BUS,
            ALU_0, ALU_1, ALU_MINUS_1,
        ];
        for &code in &codes {
            for dest in 0..9 {
                for shift in 0..4 {
                    let mut word = Word::new();
                    word.set_bits(code, ALU_OFFSET);
                    word.set_bit(MAR_BIT + dest);
                    if shift & 1 != 0 {
                        word.set_bit(SRA1_BIT);
                    }
                    if shift & 2 != 0 {
                        word.set_bit(SLL8_BIT);
                    }
                    let copy = Word::from_hex(&word.to_hex()).unwrap();
                    assert_eq!(word, copy);
                }
            }
        }
    }

    #[test]
    fn hex_roundtrip() {
        let mut word = Word::new();
        word.set_bits(0x1ff, ADDRESS_OFFSET);
        word.set_bits(ALU_ADD_B_BUS_H, ALU_OFFSET);
        word.set_bit(MDR_BIT);
        word.set_bit(READ_BIT);
        word.set_bits(4, B_BUS_OFFSET);
        let text = word.to_hex();
        assert_eq!(text.len(), 10);
        assert_eq!(Word::from_hex(&text), Some(word));
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert_eq!(Word::from_hex("012345678"), None);
        assert_eq!(Word::from_hex("01234567zz"), None);
        assert!(Word::from_hex("0123456789  trailing text").is_some());
    }

    #[test]
    fn disassemble_halt() {
        let mut word = Word::new();
        word.set_bits(B_BUS_HALT, B_BUS_OFFSET);
        // halt is recognized from the B bus selector alone
        word.set_bit(READ_BIT);
        assert_eq!(word.disassemble(), "halt");
    }

    #[test]
    fn disassemble_assignment() {
        let mut word = Word::new();
        word.set_bit(MAR_BIT);
        word.set_bits(ALU_B_BUS, ALU_OFFSET);
        word.set_bits(1, B_BUS_OFFSET);
        word.set_bits(5, ADDRESS_OFFSET);
        assert_eq!(word.disassemble(), "MAR = PC; goto 0x005;");
    }

    #[test]
    fn disassemble_shift_and_tags() {
        let mut word = Word::new();
        word.set_bit(H_BIT);
        word.set_bits(ALU_B_BUS, ALU_OFFSET);
        word.set_bits(2, B_BUS_OFFSET);
        word.set_bit(SLL8_BIT);
        word.set_bit(FETCH_BIT);
        word.set_bits(0x47, ADDRESS_OFFSET);
        assert_eq!(word.disassemble(), "H = (MBR) << 8; fetch; goto 0x047;");
    }

    #[test]
    fn disassemble_conditional() {
        let mut word = Word::new();
        word.set_bit(JAMZ_BIT);
        word.set_bits(ALU_B_BUS, ALU_OFFSET);
        word.set_bits(7, B_BUS_OFFSET);
        word.set_bits(0x21, ADDRESS_OFFSET);
        assert_eq!(
            word.disassemble(),
            "Z = TOS; if (Z) goto 0x121; else goto 0x021;"
        );
    }

    #[test]
    fn disassemble_indirect() {
        let mut word = Word::new();
        word.set_bit(JMPC_BIT);
        assert_eq!(word.disassemble(), "goto (MBR);");
        word.set_bits(0x100, ADDRESS_OFFSET);
        assert_eq!(word.disassemble(), "goto (MBR or 0x100);");
    }
}
