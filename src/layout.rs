//! The placement pass: assigns every instruction-bearing line a unique
//! control store address.
//!
//! Three passes run in a fixed order. Absolute label pins are hard
//! constraints and go first. Conditional branch targets are the next
//! hardest: the true and false target must sit exactly 0x100 apart, so
//! they consume a coupled pair of slots in the lower and upper half of
//! the store. Everything else is flexible and fills the remaining slots.
//! Running the passes in any other order can leave a later pair
//! unsatisfiable, so this ordering is load-bearing.

use std::collections::HashMap;

use super::asm::{Assembler, Line, Op};
use super::image::STORE_SIZE;

/// Half of the store; distance between a false and a true branch target.
const PAIR_OFFSET: usize = STORE_SIZE / 2;

struct LabelBinding {
    /// Index of the owning line: the first following line with
    /// instructions. `None` when no such line exists.
    owner: Option<usize>,
}

/// The layout state: the store slot assignment and the label table.
pub struct Layout {
    store: [Option<usize>; STORE_SIZE],
    labels: HashMap<String, LabelBinding>,
}

impl Layout {
    /// Run all placement passes over the program.
    pub fn run(asm: &mut Assembler, lines: &mut [Line]) -> Layout {
        let mut layout = Layout {
            store: [None; STORE_SIZE],
            labels: HashMap::new(),
        };
        layout.find_labels(asm, lines);
        layout.place_absolutes(asm, lines);
        let cursor = layout.place_branch_pairs(asm, lines, 0);
        layout.place_rest(asm, lines, cursor);
        layout
    }

    /// Look up the line index a label resolves to.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.labels
            .get(&name.to_lowercase())
            .and_then(|binding| binding.owner)
    }

    /// Bind every label to its owning line.
    ///
    /// A label decorates the first following line that carries
    /// instructions, which is not necessarily the line it is written on.
    /// One backward sweep threading the most recent instruction index
    /// resolves all forward references.
    fn find_labels(&mut self, asm: &mut Assembler, lines: &[Line]) {
        let mut owner = None;
        for index in (0..lines.len()).rev() {
            if lines[index].has_insns() {
                owner = Some(index);
            }
            if let Some(ref label) = lines[index].label {
                let key = label.name.to_lowercase();
                if self.labels.contains_key(&key) {
                    asm.warn(lines[index].number,
                             format!("label `{}' defined more than once",
                                     label.name));
                    continue;
                }
                self.labels.insert(key, LabelBinding { owner: owner });
            }
        }
    }

    fn place(&mut self, lines: &mut [Line], index: usize, address: usize) {
        lines[index].address = Some(address as u32);
        self.store[address] = Some(index);
    }

    /// First pass: honor absolute address pins.
    fn place_absolutes(&mut self, asm: &mut Assembler, lines: &mut [Line]) {
        for index in 0..lines.len() {
            let (name, pin, number) = match lines[index].label {
                Some(ref label) => match label.pin {
                    Some(pin) => {
                        (label.name.clone(), pin as usize,
                         lines[index].number)
                    }
                    None => continue,
                },
                None => continue,
            };

            if pin >= STORE_SIZE {
                asm.warn(number, format!(
                    "absolute labels must be in the range 0-{}",
                    STORE_SIZE - 1));
                continue;
            }
            let owner = match self.lookup(&name) {
                Some(owner) => owner,
                None => {
                    asm.warn(number, format!(
                        "label `{}' has no instruction to place", name));
                    continue;
                }
            };
            if let Some(occupant) = self.store[pin] {
                asm.warn(number, format!(
                    "absolute label clash: address 0x{:02x} is claimed \
                     by {} and {}",
                    pin, name, line_name(lines, occupant)));
                continue;
            }
            if lines[owner].address.is_none() {
                self.place(lines, owner, pin);
            }
        }
    }

    /// Second pass: lay out conditional branch target pairs.
    ///
    /// `first` is the pair search cursor; it only ever moves forward, so
    /// freshly allocated pairs get monotonically increasing addresses.
    /// The advanced cursor is returned for the final pass.
    fn place_branch_pairs(&mut self, asm: &mut Assembler,
                          lines: &mut [Line], mut first: usize) -> usize {
        for index in 0..lines.len() {
            let (true_label, false_label, number) =
                match find_if(&lines[index]) {
                    Some(found) => found,
                    None => continue,
                };

            let true_target = self.lookup(&true_label);
            if true_target.is_none() {
                asm.warn(number,
                         format!("label `{}' undefined", true_label));
            }
            let false_target = self.lookup(&false_label);
            if false_target.is_none() {
                asm.warn(number,
                         format!("label `{}' undefined", false_label));
            }
            let (true_target, false_target) =
                match (true_target, false_target) {
                    (Some(t), Some(f)) => (t, f),
                    _ => continue,
                };
            if true_target == false_target {
                asm.warn(number, "invalid branch targets".into());
                continue;
            }

            let true_addr = lines[true_target].address;
            let false_addr = lines[false_target].address;
            match (true_addr, false_addr) {
                (Some(t), Some(f)) => {
                    if t as usize != f as usize + PAIR_OFFSET {
                        asm.warn(number, "invalid branch targets".into());
                    }
                }
                (Some(t), None) => {
                    let t = t as usize;
                    if t < PAIR_OFFSET {
                        asm.warn(number, "target for true branch must be \
                                          placed above 0x100".into());
                    } else if self.store[t - PAIR_OFFSET].is_some() {
                        asm.warn(number, format!(
                            "address of target for false branch is \
                             already occupied (0x{:03x})",
                            t - PAIR_OFFSET));
                    } else {
                        self.place(lines, false_target, t - PAIR_OFFSET);
                    }
                }
                (None, Some(f)) => {
                    let f = f as usize;
                    if f >= PAIR_OFFSET {
                        asm.warn(number, "target for false branch must be \
                                          placed below 0x100".into());
                    } else if self.store[f + PAIR_OFFSET].is_some() {
                        asm.warn(number, format!(
                            "address of target for true branch is \
                             already occupied (0x{:03x})",
                            f + PAIR_OFFSET));
                    } else {
                        self.place(lines, true_target, f + PAIR_OFFSET);
                    }
                }
                (None, None) => {
                    match self.find_address_pair(first) {
                        Some(pair) => {
                            self.place(lines, true_target,
                                       pair + PAIR_OFFSET);
                            self.place(lines, false_target, pair);
                            first = pair + 1;
                        }
                        None => {
                            asm.warn(number, "control store exhausted".into());
                        }
                    }
                }
            }
        }
        first
    }

    /// Final pass: everything still unplaced fills the remaining slots,
    /// continuing from the pair cursor.
    fn place_rest(&mut self, asm: &mut Assembler, lines: &mut [Line],
                  mut first: usize) {
        for index in 0..lines.len() {
            if !lines[index].has_insns() || lines[index].address.is_some() {
                continue;
            }
            match self.find_address(first) {
                Some(address) => {
                    self.place(lines, index, address);
                    first = address + 1;
                }
                None => {
                    asm.warn(lines[index].number,
                             "control store exhausted".into());
                }
            }
        }
    }

    fn find_address(&self, first: usize) -> Option<usize> {
        (first..STORE_SIZE).find(|&i| self.store[i].is_none())
    }

    fn find_address_pair(&self, first: usize) -> Option<usize> {
        (first..PAIR_OFFSET).find(|&i| {
            self.store[i].is_none() && self.store[i + PAIR_OFFSET].is_none()
        })
    }
}

fn line_name(lines: &[Line], index: usize) -> String {
    match lines[index].label {
        Some(ref label) => label.name.clone(),
        None => format!("the line at {}", lines[index].number),
    }
}

/// The conditional branch on a line, if it has one.
fn find_if(line: &Line) -> Option<(String, String, usize)> {
    for op in &line.ops {
        if let Op::If(_, ref true_label, ref false_label) = *op {
            return Some((true_label.clone(), false_label.clone(),
                         line.number));
        }
    }
    None
}
