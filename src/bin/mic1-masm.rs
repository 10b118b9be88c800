//! Mic1 microassembler.
//!
//! The microassembler takes a microprogram in register transfer notation
//! and outputs a control store image suitable for use with
//! [mic1-sim](../mic1_sim/index.html).
//!
//! # Source format
//!
//! One microinstruction per line, operations separated by `;`. A line may
//! be prefixed with a label, optionally pinning it to an absolute control
//! store address:
//!
//! ```text
//! main1:          PC = PC + 1; fetch; goto (MBR)
//! nop1 = 0x00:    goto main1
//! ```
//!
//! The operations are:
//!
//! * `REG = expr`, where the expression is an ALU computation like
//!   `SP + 1`, `MDR - H`, `H and TOS` or a plain register. Assignments
//!   can be chained (`MAR = SP = SP - 1`) and the result can be shifted
//!   with `>> 1` or `<< 8` (e.g. `H = (MBR) << 8`).
//! * `rd`, `wr` and `fetch` initiate a memory read, write or instruction
//!   byte fetch. Reads and fetches land one cycle later.
//! * `goto label`, `goto (MBR)`, `goto (MBR or 0x100)` transfer control.
//! * `if (Z) goto a; else goto b` branches on the ALU result; use
//!   `Z = reg` (or `N = reg`) on the same line to drive the ALU. The
//!   assembler places `a` exactly 0x100 above `b`.
//! * `halt` stops the machine, `empty` is an explicit no-op.
//!
//! A line without an explicit transfer falls through to the next line.
//! Comments start with `//`.
//!
//! # Output format
//!
//! The image starts with `entry: XXX`, the address of the first
//! instruction of the program, followed by one line per control store
//! slot with the address, the packed word in hex and its disassembly.
extern crate docopt;
extern crate mic1;
extern crate serde;

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::process;

use docopt::Docopt;
use serde::Deserialize;

use mic1::asm::Assembler;

const USAGE: &'static str = "
Mic1 microassembler.

Usage:
  mic1-masm <input> [-o <output>]
  mic1-masm -h | --help

Options:
  input                     Microassembly source file, or - for stdin.
  -o <output>               Write the image to this file instead of stdout.
  -h --help                 Show this screen.
";

#[derive(Debug, Deserialize)]
struct Args {
    arg_input: String,
    flag_o: Option<String>,
}

fn file_input(name: &str) -> Box<BufRead> {
    if name == "-" {
        return Box::new(BufReader::new(io::stdin()));
    }
    let f = File::open(name).unwrap_or_else(|e| {
        eprintln!("Can't open {}: {}", name, e);
        process::exit(1);
    });
    Box::new(BufReader::new(f))
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let mut asm = Assembler::new();
    let image = asm.assemble(file_input(&args.arg_input))
        .unwrap_or_else(|e| {
            eprintln!("Error reading {}: {}", args.arg_input, e);
            process::exit(1);
        });

    let image = match image {
        Some(image) => image,
        None => {
            for warning in asm.warnings() {
                eprintln!("warning: {}", warning);
            }
            eprintln!("no image emitted");
            process::exit(1);
        }
    };

    let mut out: Box<Write> = match args.flag_o {
        Some(ref name) => {
            let f = File::create(name).unwrap_or_else(|e| {
                eprintln!("Can't create {}: {}", name, e);
                process::exit(1);
            });
            Box::new(BufWriter::new(f))
        }
        None => Box::new(io::stdout()),
    };
    image.save(&mut out).unwrap_or_else(|e| {
        eprintln!("Error writing the image: {}", e);
        process::exit(1);
    });
}
