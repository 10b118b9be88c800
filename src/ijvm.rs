//! IJVM side of the toolchain: the bytecode image consumed by the
//! simulator and the instruction templates used for trace output.
//!
//! The bytecode image is produced by the IJVM assembler, a separate
//! program. We only read its text format here. The template table maps
//! opcodes to mnemonics and operand shapes; the simulator uses it to
//! render the bytecode instruction that is about to be dispatched and to
//! match breakpoints by mnemonic.

use std::error::Error;
use std::fmt::{self, Display, Formatter, Write};
use std::io::{self, BufRead};

/// Shape of one operand of an IJVM instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// 8 bit signed constant.
    Byte,
    /// 16 bit branch offset.
    Label,
    /// 16 bit method area index.
    Method,
    /// 8 bit unsigned local variable number.
    VarNum,
    /// Local variable number, widened to 16 bit after `wide`.
    VarNumWide,
    /// 16 bit constant pool index.
    Constant,
}

/// Opcode, mnemonic and operand list of one IJVM instruction.
pub struct InsnTemplate {
    pub opcode: u8,
    pub mnemonic: &'static str,
    pub operands: &'static [Operand],
}

/// The standard IJVM instruction set.
pub static TEMPLATES: [InsnTemplate; 20] = [
    InsnTemplate { opcode: 0x00, mnemonic: "nop", operands: &[] },
    InsnTemplate { opcode: 0x10, mnemonic: "bipush",
                   operands: &[Operand::Byte] },
    InsnTemplate { opcode: 0x13, mnemonic: "ldc_w",
                   operands: &[Operand::Constant] },
    InsnTemplate { opcode: 0x15, mnemonic: "iload",
                   operands: &[Operand::VarNumWide] },
    InsnTemplate { opcode: 0x36, mnemonic: "istore",
                   operands: &[Operand::VarNumWide] },
    InsnTemplate { opcode: 0x57, mnemonic: "pop", operands: &[] },
    InsnTemplate { opcode: 0x59, mnemonic: "dup", operands: &[] },
    InsnTemplate { opcode: 0x5f, mnemonic: "swap", operands: &[] },
    InsnTemplate { opcode: 0x60, mnemonic: "iadd", operands: &[] },
    InsnTemplate { opcode: 0x64, mnemonic: "isub", operands: &[] },
    InsnTemplate { opcode: 0x7e, mnemonic: "iand", operands: &[] },
    InsnTemplate { opcode: 0x80, mnemonic: "ior", operands: &[] },
    InsnTemplate { opcode: 0x84, mnemonic: "iinc",
                   operands: &[Operand::VarNum, Operand::Byte] },
    InsnTemplate { opcode: 0x99, mnemonic: "ifeq",
                   operands: &[Operand::Label] },
    InsnTemplate { opcode: 0x9b, mnemonic: "iflt",
                   operands: &[Operand::Label] },
    InsnTemplate { opcode: 0x9f, mnemonic: "if_icmpeq",
                   operands: &[Operand::Label] },
    InsnTemplate { opcode: 0xa7, mnemonic: "goto",
                   operands: &[Operand::Label] },
    InsnTemplate { opcode: 0xac, mnemonic: "ireturn", operands: &[] },
    InsnTemplate { opcode: 0xb6, mnemonic: "invokevirtual",
                   operands: &[Operand::Method] },
    InsnTemplate { opcode: 0xc4, mnemonic: "wide", operands: &[] },
];

/// Find the template for an opcode.
pub fn template_for_opcode(opcode: u8) -> Option<&'static InsnTemplate> {
    TEMPLATES.iter().find(|tmpl| tmpl.opcode == opcode)
}

/// Find the opcode for a mnemonic. The lookup is case-insensitive.
pub fn opcode_for_mnemonic(mnemonic: &str) -> Option<u8> {
    TEMPLATES
        .iter()
        .find(|tmpl| tmpl.mnemonic.eq_ignore_ascii_case(mnemonic))
        .map(|tmpl| tmpl.opcode)
}

/// Render the instruction starting at `bytes[0]` for the trace output.
///
/// The result is the mnemonic with its decoded operands, padded, followed
/// by the raw opcode bytes, e.g. `bipush 5              [10 05]  `. No
/// newline is appended since the stack snapshot continues the line.
pub fn snapshot(bytes: &[u8]) -> String {
    let mut buf = String::new();
    let opcode = match bytes.first() {
        Some(opcode) => *opcode,
        None => return buf,
    };
    let tmpl = match template_for_opcode(opcode) {
        Some(tmpl) => tmpl,
        None => {
            write!(buf, "unknown opcode: 0x{:02x}", opcode).unwrap();
            return buf;
        }
    };

    write!(buf, "{} ", tmpl.mnemonic).unwrap();
    let mut index = 1;
    for (i, operand) in tmpl.operands.iter().enumerate() {
        if i > 0 {
            buf.push_str(", ");
        }
        let arg = |at: usize| *bytes.get(at).unwrap_or(&0);
        match *operand {
            Operand::Byte => {
                write!(buf, "{}", arg(index) as i8).unwrap();
                index += 1;
            }
            Operand::Label => {
                let word = (arg(index) as u16) << 8 | arg(index + 1) as u16;
                write!(buf, "{}", word as i16).unwrap();
                index += 2;
            }
            Operand::Method | Operand::Constant => {
                let word = (arg(index) as u16) << 8 | arg(index + 1) as u16;
                write!(buf, "{}", word).unwrap();
                index += 2;
            }
            Operand::VarNum | Operand::VarNumWide => {
                write!(buf, "{}", arg(index)).unwrap();
                index += 1;
            }
        }
    }

    while buf.len() < 20 {
        buf.push(' ');
    }
    buf.push_str("[");
    for j in 0..index {
        if j == index - 1 {
            write!(buf, "{:02x}]  ", bytes.get(j).unwrap_or(&0)).unwrap();
        } else {
            write!(buf, "{:02x} ", bytes.get(j).unwrap_or(&0)).unwrap();
        }
    }
    for _ in index..3 {
        buf.push_str("   ");
    }
    buf
}

/// A loaded IJVM bytecode image.
#[derive(Debug, Clone, Default)]
pub struct IjvmImage {
    /// Method area index of the main method.
    pub main_index: u16,
    /// The bytecode, loaded at address 0 of the simulator memory.
    pub method_area: Vec<u8>,
    /// The constant pool, loaded right after the method area.
    pub cpool: Vec<i32>,
}

/// Error that may arise when loading an IJVM bytecode image.
#[derive(Debug)]
pub enum IjvmError {
    /// The file did not follow the bytecode format.
    BadImage,
    /// Underlying IO error.
    Io(io::Error),
}

impl Display for IjvmError {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        match *self {
            IjvmError::BadImage => write!(fmt, "bytecode file not recognized"),
            IjvmError::Io(ref err) => write!(fmt, "IO error: {}", err),
        }
    }
}

impl Error for IjvmError {
    fn cause(&self) -> Option<&Error> {
        match *self {
            IjvmError::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for IjvmError {
    fn from(err: io::Error) -> IjvmError {
        IjvmError::Io(err)
    }
}

fn header_count(line: &str, prefix: &str, suffix: &str)
                -> Result<usize, IjvmError> {
    let rest = match line.strip_prefix(prefix) {
        Some(rest) => rest,
        None => return Err(IjvmError::BadImage),
    };
    let rest = rest.trim();
    let number = match rest.strip_suffix(suffix) {
        Some(number) => number.trim(),
        None => return Err(IjvmError::BadImage),
    };
    number.parse().map_err(|_| IjvmError::BadImage)
}

impl IjvmImage {
    /// Load a bytecode image from the given reader.
    pub fn load<B: BufRead>(reader: &mut B) -> Result<IjvmImage, IjvmError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        let mut lines = text.lines();

        let main_line = lines.next().ok_or(IjvmError::BadImage)?;
        let main_index = header_count(main_line, "main index:", "")? as u16;

        let area_line = lines.next().ok_or(IjvmError::BadImage)?;
        let area_size = header_count(area_line, "method area:", "bytes")?;

        let mut method_area = Vec::with_capacity(area_size);
        let mut cpool_line = None;
        for line in &mut lines {
            if method_area.len() >= area_size {
                cpool_line = Some(line);
                break;
            }
            for token in line.split_whitespace() {
                let byte = u8::from_str_radix(token, 16)
                    .map_err(|_| IjvmError::BadImage)?;
                method_area.push(byte);
            }
        }
        if method_area.len() != area_size {
            return Err(IjvmError::BadImage);
        }

        let cpool_line = cpool_line.ok_or(IjvmError::BadImage)?;
        let cpool_size = header_count(cpool_line, "constant pool:", "words")?;

        let mut cpool = Vec::with_capacity(cpool_size);
        for line in &mut lines {
            if cpool.len() >= cpool_size {
                break;
            }
            for token in line.split_whitespace() {
                let word = u32::from_str_radix(token, 16)
                    .map_err(|_| IjvmError::BadImage)?;
                cpool.push(word as i32);
            }
        }
        if cpool.len() != cpool_size {
            return Err(IjvmError::BadImage);
        }

        Ok(IjvmImage {
            main_index: main_index,
            method_area: method_area,
            cpool: cpool,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SAMPLE: &'static str = "\
main index: 1
method area: 6 bytes
10 05 10 2a 60 ff
constant pool: 2 words
00000010
fffffffe
";

    #[test]
    fn load_sample_image() {
        let image = IjvmImage::load(&mut SAMPLE.as_bytes()).unwrap();
        assert_eq!(image.main_index, 1);
        assert_eq!(image.method_area, [0x10, 0x05, 0x10, 0x2a, 0x60, 0xff]);
        assert_eq!(image.cpool, [16, -2]);
    }

    #[test]
    fn load_rejects_short_method_area() {
        let text = "main index: 0\nmethod area: 4 bytes\n10 05\n\
                    constant pool: 0 words\n";
        assert!(IjvmImage::load(&mut text.as_bytes()).is_err());
    }

    #[test]
    fn load_rejects_bad_header() {
        let text = "main idx: 0\n";
        assert!(IjvmImage::load(&mut text.as_bytes()).is_err());
    }

    #[test]
    fn mnemonic_lookup() {
        assert_eq!(opcode_for_mnemonic("iadd"), Some(0x60));
        assert_eq!(opcode_for_mnemonic("IAdd"), Some(0x60));
        assert_eq!(opcode_for_mnemonic("imul"), None);
    }

    #[test]
    fn snapshot_decodes_operands() {
        let text = snapshot(&[0x10, 0x05]);
        assert!(text.starts_with("bipush 5"));
        assert!(text.contains("[10 05]"));

        let text = snapshot(&[0x84, 0x01, 0xff]);
        assert!(text.starts_with("iinc 1, -1"));

        let text = snapshot(&[0x60]);
        assert!(text.starts_with("iadd"));
        assert!(text.contains("[60]"));
    }

    #[test]
    fn snapshot_flags_unknown_opcode() {
        assert!(snapshot(&[0xfd]).contains("unknown opcode"));
    }
}
