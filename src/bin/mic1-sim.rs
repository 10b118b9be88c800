//! Mic1 simulator.
//!
//! The simulator executes a control store image produced by
//! [mic1-masm](../mic1_masm/index.html), optionally together with an IJVM
//! bytecode image whose method area and constant pool are loaded into the
//! simulated memory. Any further arguments are pushed onto the operand
//! stack as the parameters of the bytecode's main method; the initial
//! object reference is pushed for you.
//!
//! While running, the simulator prints one line per executed IJVM
//! instruction: the decoded instruction, its opcode bytes and the operand
//! stack after it completed. With `-b MNEMONIC` (or `-b all`) the full
//! microtrace, registers included, is shown for the matching
//! instructions, and `-t` waits for enter before every traced cycle.
//! When no bytecode image is given the full microtrace is shown by
//! default. The value left in TOS is reported at the end.
extern crate docopt;
extern crate mic1;
extern crate serde;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::process;

use docopt::Docopt;
use serde::Deserialize;

use mic1::{Mic1, Mic1State, MEMORY_SIZE};
use mic1::ijvm::{self, IjvmImage};
use mic1::image::Image;
use mic1::logger::{Logger, NoLogging};
use mic1::util;
use mic1::word;

const USAGE: &'static str = "
Mic1 simulator.

Usage:
  mic1-sim [-s] [-t] [-b <insn>]... <mic1-file> [<ijvm-file> [<arg>...]]
  mic1-sim -h | --help

Options:
  mic1-file          Control store image, or - for stdin.
  ijvm-file          IJVM bytecode image to load.
  arg                Arguments for the bytecode's main method.
  -s                 Silent mode, no trace output is produced.
  -t                 Single-step: wait for enter before each traced cycle.
  -b <insn>          Show the microtrace for the IJVM instruction <insn>,
                     or for every instruction with `-b all'. Can be given
                     multiple times.
  -h --help          Show this screen.
";

#[derive(Debug, Deserialize)]
struct Args {
    flag_s: bool,
    flag_t: bool,
    flag_b: Vec<String>,
    arg_mic1_file: String,
    arg_ijvm_file: Option<String>,
    arg_arg: Vec<String>,
}

/// Console trace in the classic mic1 format.
///
/// The snapshot of a dispatched instruction is printed without a newline;
/// the stack print at the next dispatch completes the line, so each line
/// shows an instruction together with the stack after it executed.
struct Tracer {
    trace: bool,
    default_trace: bool,
    first_line: bool,
    step: bool,
    breakpoints: Vec<u8>,
}

impl Tracer {
    fn new(default_trace: bool, step: bool, breakpoints: Vec<u8>) -> Tracer {
        Tracer {
            trace: default_trace,
            default_trace: default_trace,
            first_line: true,
            step: step,
            breakpoints: breakpoints,
        }
    }

    fn is_breakpoint(&self, opcode: u8) -> bool {
        self.default_trace || self.breakpoints.contains(&opcode)
    }

    fn print_registers(&self, m: &Mic1) {
        println!("  MAR={} MDR={} PC={} MBR={} MBRU={} SP={} \
                  LV={} CPP={} TOS={} OPC={} H={}\n",
                 m.mar, m.mdr, m.pc, m.mbr(), m.mbru, m.sp,
                 m.lv, m.cpp, m.tos, m.opc, m.h);
    }

    fn print_stack(&self, m: &Mic1, indent: bool) {
        if 0 <= m.sp && (m.sp as usize) < MEMORY_SIZE / 4 {
            let length = (m.sp - m.stack_base).min(8).max(0);
            if indent {
                print!("{:32}", "");
            }
            print!("stack = ");
            for i in 0..length {
                if i == length - 1 {
                    print!("{}", m.read_word(m.sp - i));
                } else {
                    print!("{}, ", m.read_word(m.sp - i));
                }
            }
            println!();
        } else {
            println!("SP out of range (SP = {})", m.sp);
        }
    }

    /// Print the trace for the word about to execute. At a dispatch, the
    /// upcoming bytecode instruction decides whether the microtrace is on.
    fn print_instruction(&mut self, m: &Mic1) {
        let mir = m.current_word();
        if mir.get_bit(word::JMPC_BIT) {
            let bytes = [m.read_byte(m.pc),
                         m.read_byte(m.pc + 1),
                         m.read_byte(m.pc + 2)];
            print!("{}", ijvm::snapshot(&bytes));
            if self.is_breakpoint(bytes[0]) {
                self.trace = true;
                println!("\n");
                self.print_registers(m);
            } else {
                self.trace = false;
            }
        }
        if self.trace {
            println!("0x{:03x}:  {}\n", m.mpc, mir.disassemble());
        }
    }

    fn print_state(&mut self, m: &Mic1) {
        if self.trace {
            self.print_registers(m);
        }
        if m.current_word().get_bit(word::JMPC_BIT) {
            let indent = self.trace || self.first_line;
            self.print_stack(m, indent);
            self.first_line = false;
        }
    }
}

impl Logger for Tracer {
    fn cycle_starting(&mut self, m: &Mic1) {
        self.print_instruction(m);
        if self.step && self.trace {
            let mut line = String::new();
            let _ = io::stdin().read_line(&mut line);
        }
    }

    fn cycle_complete(&mut self, m: &Mic1) {
        self.print_state(m);
    }
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

    let mut breakpoints = Vec::new();
    let mut default_trace = false;
    for name in &args.flag_b {
        if name == "all" {
            default_trace = true;
        } else {
            match ijvm::opcode_for_mnemonic(name) {
                Some(opcode) => breakpoints.push(opcode),
                None => {
                    eprintln!("Unknown instruction: `{}'", name);
                    process::exit(1);
                }
            }
        }
    }

    let image = Image::load(&mut file_input(&args.arg_mic1_file))
        .unwrap_or_else(|e| {
            eprintln!("Error loading {}: {}", args.arg_mic1_file, e);
            process::exit(1);
        });

    let program = args.arg_ijvm_file.as_ref().map(|name| {
        IjvmImage::load(&mut file_input(name)).unwrap_or_else(|e| {
            eprintln!("Error loading {}: {}", name, e);
            process::exit(1);
        })
    });
    if program.is_none() {
        default_trace = true;
    }

    let mut main_args = Vec::new();
    for arg in &args.arg_arg {
        match util::parse_num(arg) {
            Some(value) => main_args.push(value),
            None => {
                eprintln!("Invalid argument to main method: `{}'", arg);
                process::exit(1);
            }
        }
    }

    let mut m = Mic1::new(&image, program.as_ref(), &main_args);
    let mut tracer = Tracer::new(default_trace, args.flag_t, breakpoints);

    if !args.flag_s {
        match args.arg_ijvm_file {
            Some(ref name) => println!("Mic1 trace of {} with {}\n",
                                       args.arg_mic1_file, name),
            None => println!("Mic1 trace of {}\n", args.arg_mic1_file),
        }
        tracer.print_state(&m);
    }

    loop {
        let state = if args.flag_s {
            m.cycle(&mut NoLogging)
        } else {
            m.cycle(&mut tracer)
        };
        match state {
            Mic1State::Running => (),
            Mic1State::Halted => break,
            Mic1State::Error(err) => {
                eprintln!("simulation failed: {:?}", err);
                process::exit(1);
            }
        }
    }

    if !args.flag_s {
        tracer.print_instruction(&m);
        tracer.print_stack(&m, false);
    }
    println!("return value: {}", m.tos);
}
