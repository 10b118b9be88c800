//! The control store image as written by the microassembler and loaded by
//! the simulator.
//!
//! The file starts with a line `entry: XXX` naming the address of the first
//! microinstruction to execute, followed by exactly 512 lines of the form
//!
//! ```text
//! 0e7:  0123456789  <disassembled microinstruction>
//! ```
//!
//! The first column is the control store address, the second the packed
//! word as 10 hex digits. Only those digits are significant when loading,
//! the disassembly is provided for convenience and never parsed back.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io::{self, BufRead, Write};

use super::word::Word;

/// Number of slots in the control store.
pub const STORE_SIZE: usize = 512;

/// A complete control store plus its entry address.
#[derive(Clone)]
pub struct Image {
    /// Address of the first microinstruction to execute.
    pub entry: u32,
    /// The control store. Slots that were never laid out hold zero words.
    pub store: [Word; STORE_SIZE],
}

/// Error that may arise when loading a control store image.
#[derive(Debug)]
pub enum ImageError {
    /// The entry line was missing or malformed.
    BadEntry,
    /// A control store line did not carry a valid word (line number given).
    BadWord(usize),
    /// The file ended before all 512 words were read.
    Truncated,
    /// Underlying IO error.
    Io(io::Error),
}

impl Display for ImageError {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        match *self {
            ImageError::BadEntry => write!(fmt, "malformed entry line"),
            ImageError::BadWord(line) => {
                write!(fmt, "malformed control word in line {}", line)
            }
            ImageError::Truncated => {
                write!(fmt, "control store image has fewer than {} words",
                       STORE_SIZE)
            }
            ImageError::Io(ref err) => write!(fmt, "IO error: {}", err),
        }
    }
}

impl Error for ImageError {
    fn cause(&self) -> Option<&Error> {
        match *self {
            ImageError::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ImageError {
    fn from(err: io::Error) -> ImageError {
        ImageError::Io(err)
    }
}

impl Image {
    /// Create an image with an all-zero store.
    pub fn new() -> Image {
        Image {
            entry: 0,
            store: [Word::new(); STORE_SIZE],
        }
    }

    /// Write the image in the text format described in the module docs.
    pub fn save<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "entry: {:03x}", self.entry)?;
        for (address, word) in self.store.iter().enumerate() {
            writeln!(out, "{:03x}:  {}  {}", address, word.to_hex(),
                     word.disassemble())?;
        }
        Ok(())
    }

    /// Load an image from the given reader.
    ///
    /// Exactly 512 store lines must be present; a shorter file is an
    /// error, not a partial image.
    pub fn load<B: BufRead>(reader: &mut B) -> Result<Image, ImageError> {
        let mut lines = reader.lines();
        let entry_line = match lines.next() {
            Some(line) => line?,
            None => return Err(ImageError::BadEntry),
        };
        if !entry_line.starts_with("entry: ") {
            return Err(ImageError::BadEntry);
        }
        let entry = u32::from_str_radix(entry_line["entry: ".len()..].trim(), 16)
            .map_err(|_| ImageError::BadEntry)?;

        let mut image = Image::new();
        image.entry = entry;
        for i in 0..STORE_SIZE {
            let line = match lines.next() {
                Some(line) => line?,
                None => return Err(ImageError::Truncated),
            };
            // The word starts at column 6, after `XXX:  `.
            let digits = line.get(6..).ok_or(ImageError::BadWord(i + 2))?;
            image.store[i] = Word::from_hex(digits)
                .ok_or(ImageError::BadWord(i + 2))?;
        }
        Ok(image)
    }
}

impl Default for Image {
    fn default() -> Image {
        Image::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::word;

    fn sample_image() -> Image {
        let mut image = Image::new();
        image.entry = 0x1a3;
        image.store[0].set_bits(word::ALU_B_BUS, word::ALU_OFFSET);
        image.store[0].set_bit(word::MAR_BIT);
        image.store[0].set_bits(1, word::B_BUS_OFFSET);
        image.store[511].set_bits(word::B_BUS_HALT, word::B_BUS_OFFSET);
        image
    }

    #[test]
    fn save_load_roundtrip() {
        let image = sample_image();
        let mut buf = Vec::new();
        image.save(&mut buf).unwrap();
        let loaded = Image::load(&mut &buf[..]).unwrap();
        assert_eq!(loaded.entry, 0x1a3);
        for i in 0..STORE_SIZE {
            assert_eq!(loaded.store[i], image.store[i]);
        }
    }

    #[test]
    fn save_produces_fixed_line_count() {
        let image = sample_image();
        let mut buf = Vec::new();
        image.save(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), STORE_SIZE + 1);
        assert!(text.starts_with("entry: 1a3\n"));
        assert!(text.lines().last().unwrap().starts_with("1ff:  "));
    }

    #[test]
    fn load_rejects_short_store() {
        let image = sample_image();
        let mut buf = Vec::new();
        image.save(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        // Drop the last store line: 511 words is not an image.
        let truncated = text.lines().take(STORE_SIZE).collect::<Vec<_>>()
            .join("\n");
        match Image::load(&mut truncated.as_bytes()) {
            Err(ImageError::Truncated) => (),
            other => panic!("expected truncation error, got {:?}",
                            other.map(|i| i.entry)),
        }
    }

    #[test]
    fn load_rejects_missing_entry() {
        let text = "000:  0000000000  goto 0x000;\n";
        assert!(Image::load(&mut text.as_bytes()).is_err());
    }
}
