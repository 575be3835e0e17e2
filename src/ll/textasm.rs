// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// Textual assembly: one statement per line, either a bare instruction
// (`Family(kw=value, ...)`), a label-exporting instruction
// (`name = Family(...)`), or a data block (`name = [byte, byte, ...]`).
// `LabelRef("id")` is the syntax for a symbolic target inside a
// keyword argument.
use crate::ll::block::{DataBlock, FreeBlock, Item, Label};
use crate::ll::instruction::{BinOp, CmpOp, GlobalWidth, Instruction, LabelTarget, UnOp};
use crate::util::FromHexString;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug)]
pub enum AsmError {
    Syntax(String),
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AsmError::Syntax(msg) => write!(f, "assembly syntax error: {}", msg),
        }
    }
}

impl std::error::Error for AsmError {}

// ============================================================================
// Printing
// ============================================================================

fn binop_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "Add",
        BinOp::Sub => "Sub",
        BinOp::Mul => "Mul",
        BinOp::Div => "Div",
        BinOp::Mod => "Mod",
        BinOp::Shl => "Shl",
        BinOp::Shr => "Shr",
        BinOp::BAnd => "BAnd",
        BinOp::BOr => "BOr",
        BinOp::BXor => "BXor",
        BinOp::LAnd => "LAnd",
        BinOp::LOr => "LOr",
    }
}

fn unop_name(op: UnOp) -> &'static str {
    match op {
        UnOp::Neg => "ArithmeticInvert",
        UnOp::BNot => "BitwiseNot",
        UnOp::LNot => "LogicNot",
    }
}

fn cmpop_name(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Lt => "CmpLT",
        CmpOp::Leq => "CmpLE",
        CmpOp::Eq => "CmpEQ",
        CmpOp::Neq => "CmpNE",
        CmpOp::Geq => "CmpGE",
        CmpOp::Gt => "CmpGT",
    }
}

fn global_name(width: GlobalWidth, store: bool) -> &'static str {
    match (width, store) {
        (GlobalWidth::U8, false) => "GlobalLoadU8",
        (GlobalWidth::U8, true) => "GlobalStoreU8",
        (GlobalWidth::S8, false) => "GlobalLoadS8",
        (GlobalWidth::S8, true) => "GlobalStoreS8",
        (GlobalWidth::Wide16, false) => "GlobalLoad16",
        (GlobalWidth::Wide16, true) => "GlobalStore16",
    }
}

/// Render one instruction as `Family(kw=value, ...)`. Placeholder
/// branch/call targets render as `LabelRef("Lid")`.
pub fn print_instruction(insn: &Instruction) -> String {
    let lref = |t: &LabelTarget| format!("LabelRef(\"L{}\")", t.0);
    match insn {
        Instruction::PushLocal(sfa) => format!("PushLocal(sfa={})", sfa),
        Instruction::PopLocal(sfa) => format!("PopLocal(sfa={})", sfa),
        Instruction::Binary(op) => format!("{}()", binop_name(*op)),
        Instruction::Unary(op) => format!("{}()", unop_name(*op)),
        Instruction::Compare(op) => format!("{}()", cmpop_name(*op)),
        Instruction::PushImmediate(v) => format!("PushImmediate(v={})", v),
        Instruction::PushU8(v) => format!("PushU8(v={})", v),
        Instruction::PushS8(v) => format!("PushS8(v={})", v),
        Instruction::Push16(v) => format!("Push16(v={})", v),
        Instruction::PushConstantV(v) => format!("PushConstantV(v={})", v),
        Instruction::Return => "Return()".to_string(),
        Instruction::Return0 => "Return0()".to_string(),
        Instruction::DropValue => "DropValue()".to_string(),
        Instruction::CallAddress => "CallAddress()".to_string(),
        Instruction::JumpToAddress => "JumpToAddress()".to_string(),
        Instruction::JumpV(t) => format!("JumpV(target={})", lref(t)),
        Instruction::CallV(t) => format!("CallV(target={})", lref(t)),
        Instruction::JumpIfV(t) => format!("JumpIfV(target={})", lref(t)),
        Instruction::JumpIfNotV(t) => format!("JumpIfNotV(target={})", lref(t)),
        Instruction::JumpRel1(d) => format!("JumpRel1(reladdr={})", d),
        Instruction::JumpRel2(d) => format!("JumpRel2(reladdr={})", d),
        Instruction::CallRel1(d) => format!("CallRel1(reladdr={})", d),
        Instruction::CallRel2(d) => format!("CallRel2(reladdr={})", d),
        Instruction::JumpRel1If(d) => format!("JumpRel1If(reladdr={})", d),
        Instruction::JumpRel2If(d) => format!("JumpRel2If(reladdr={})", d),
        Instruction::JumpRel1IfNot(d) => format!("JumpRel1IfNot(reladdr={})", d),
        Instruction::JumpRel2IfNot(d) => format!("JumpRel2IfNot(reladdr={})", d),
        Instruction::StackPointer => "StackPointer()".to_string(),
        Instruction::StackFramePointer => "StackFramePointer()".to_string(),
        Instruction::CallUserFunction(w) => format!("CallUserFunction(funcid={})", w),
        Instruction::GlobalAccess { width, store, mode, addr } => match addr {
            Some(a) => format!("{}(mode={}, address={})", global_name(*width, *store), mode, a),
            None => format!("{}(mode={})", global_name(*width, *store), mode),
        },
        Instruction::Bury(k) => format!("Bury(k={})", k),
        Instruction::Dig(k) => format!("Dig(k={})", k),
        Instruction::PushZeros(n) => format!("PushZeros(n={})", n),
        Instruction::PopMany(n) => format!("PopMany(n={})", n),
    }
}

/// Render a `FreeBlock` as one statement per line.
pub fn print_free_block(block: &FreeBlock) -> String {
    let mut out = String::new();
    let mut pending_label: Option<&Label> = None;
    for item in block.items() {
        match item {
            Item::Label(label) => {
                if let Some(name) = &label.export {
                    pending_label = Some(label);
                    let _ = name;
                } else {
                    out.push_str(&format!("L{}:\n", label.id));
                }
            }
            Item::Insn(insn) => {
                if let Some(label) = pending_label.take() {
                    out.push_str(&format!(
                        "{} = {}\n",
                        label.export.as_ref().unwrap(),
                        print_instruction(insn)
                    ));
                } else {
                    out.push_str(&print_instruction(insn));
                    out.push('\n');
                }
            }
        }
    }
    out
}

pub fn print_data_block(name: Option<&str>, block: &DataBlock) -> String {
    let items: Vec<String> = block.bytes().iter().map(|b| b.to_string()).collect();
    match name {
        Some(n) => format!("{} = [{}]\n", n, items.join(", ")),
        None => format!("[{}]\n", items.join(", ")),
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse one `Family(kw=value, ...)` call, returning its name and
/// raw `kw=value` argument strings.
fn split_call(s: &str) -> Result<(&str, Vec<&str>), AsmError> {
    let open = s.find('(').ok_or_else(|| AsmError::Syntax(format!("expected '(' in {}", s)))?;
    let close = s
        .rfind(')')
        .ok_or_else(|| AsmError::Syntax(format!("expected ')' in {}", s)))?;
    let name = s[..open].trim();
    let args_str = s[open + 1..close].trim();
    let args = if args_str.is_empty() {
        Vec::new()
    } else {
        args_str.split(',').map(|a| a.trim()).collect()
    };
    Ok((name, args))
}

fn arg_value<'a>(args: &'a [&'a str], key: &str) -> Result<&'a str, AsmError> {
    for a in args {
        if let Some((k, v)) = a.split_once('=') {
            if k.trim() == key {
                return Ok(v.trim());
            }
        }
    }
    Err(AsmError::Syntax(format!("missing argument {}", key)))
}

fn parse_int(s: &str) -> Result<i32, AsmError> {
    s.parse::<i32>()
        .map_err(|_| AsmError::Syntax(format!("not an integer: {}", s)))
}

fn parse_label_ref(s: &str) -> Result<LabelTarget, AsmError> {
    let (name, args) = split_call(s)?;
    if name != "LabelRef" {
        return Err(AsmError::Syntax(format!("expected LabelRef, found {}", name)));
    }
    let id_str = args
        .first()
        .ok_or_else(|| AsmError::Syntax("LabelRef missing id".to_string()))?
        .trim_matches('"');
    let id_str = id_str.trim_start_matches('L');
    let id = id_str
        .parse::<usize>()
        .map_err(|_| AsmError::Syntax(format!("bad label id: {}", id_str)))?;
    Ok(LabelTarget(id))
}

fn parse_instruction(s: &str) -> Result<Instruction, AsmError> {
    let (name, args) = split_call(s)?;
    let insn = match name {
        "PushLocal" => Instruction::PushLocal(parse_int(arg_value(&args, "sfa")?)? as i8),
        "PopLocal" => Instruction::PopLocal(parse_int(arg_value(&args, "sfa")?)? as i8),
        "Add" => Instruction::Binary(BinOp::Add),
        "Sub" => Instruction::Binary(BinOp::Sub),
        "Mul" => Instruction::Binary(BinOp::Mul),
        "Div" => Instruction::Binary(BinOp::Div),
        "Mod" => Instruction::Binary(BinOp::Mod),
        "Shl" => Instruction::Binary(BinOp::Shl),
        "Shr" => Instruction::Binary(BinOp::Shr),
        "BAnd" => Instruction::Binary(BinOp::BAnd),
        "BOr" => Instruction::Binary(BinOp::BOr),
        "BXor" => Instruction::Binary(BinOp::BXor),
        "LAnd" => Instruction::Binary(BinOp::LAnd),
        "LOr" => Instruction::Binary(BinOp::LOr),
        "BitwiseNot" => Instruction::Unary(UnOp::BNot),
        "ArithmeticInvert" => Instruction::Unary(UnOp::Neg),
        "LogicNot" => Instruction::Unary(UnOp::LNot),
        "CmpLT" => Instruction::Compare(CmpOp::Lt),
        "CmpLE" => Instruction::Compare(CmpOp::Leq),
        "CmpEQ" => Instruction::Compare(CmpOp::Eq),
        "CmpNE" => Instruction::Compare(CmpOp::Neq),
        "CmpGE" => Instruction::Compare(CmpOp::Geq),
        "CmpGT" => Instruction::Compare(CmpOp::Gt),
        "PushImmediate" => Instruction::PushImmediate(parse_int(arg_value(&args, "v")?)? as i8),
        "PushU8" => Instruction::PushU8(parse_int(arg_value(&args, "v")?)? as u8),
        "PushS8" => Instruction::PushS8(parse_int(arg_value(&args, "v")?)? as i8),
        "Push16" => Instruction::Push16(parse_int(arg_value(&args, "v")?)? as u16),
        "PushConstantV" => Instruction::PushConstantV(parse_int(arg_value(&args, "v")?)?),
        "Return" => Instruction::Return,
        "Return0" => Instruction::Return0,
        "DropValue" => Instruction::DropValue,
        "CallAddress" => Instruction::CallAddress,
        "JumpToAddress" => Instruction::JumpToAddress,
        "JumpV" => Instruction::JumpV(parse_label_ref(arg_value(&args, "target")?)?),
        "CallV" => Instruction::CallV(parse_label_ref(arg_value(&args, "target")?)?),
        "JumpIfV" => Instruction::JumpIfV(parse_label_ref(arg_value(&args, "target")?)?),
        "JumpIfNotV" => Instruction::JumpIfNotV(parse_label_ref(arg_value(&args, "target")?)?),
        "JumpRel1" => Instruction::JumpRel1(parse_int(arg_value(&args, "reladdr")?)? as i8),
        "JumpRel2" => Instruction::JumpRel2(parse_int(arg_value(&args, "reladdr")?)? as i16),
        "CallRel1" => Instruction::CallRel1(parse_int(arg_value(&args, "reladdr")?)? as i8),
        "CallRel2" => Instruction::CallRel2(parse_int(arg_value(&args, "reladdr")?)? as i16),
        "JumpRel1If" => Instruction::JumpRel1If(parse_int(arg_value(&args, "reladdr")?)? as i8),
        "JumpRel2If" => Instruction::JumpRel2If(parse_int(arg_value(&args, "reladdr")?)? as i16),
        "JumpRel1IfNot" => Instruction::JumpRel1IfNot(parse_int(arg_value(&args, "reladdr")?)? as i8),
        "JumpRel2IfNot" => Instruction::JumpRel2IfNot(parse_int(arg_value(&args, "reladdr")?)? as i16),
        "StackPointer" => Instruction::StackPointer,
        "StackFramePointer" => Instruction::StackFramePointer,
        "CallUserFunction" => Instruction::CallUserFunction(parse_int(arg_value(&args, "funcid")?)? as u8),
        "GlobalLoadU8" | "GlobalStoreU8" | "GlobalLoadS8" | "GlobalStoreS8" | "GlobalLoad16" | "GlobalStore16" => {
            let (width, store) = match name {
                "GlobalLoadU8" => (GlobalWidth::U8, false),
                "GlobalStoreU8" => (GlobalWidth::U8, true),
                "GlobalLoadS8" => (GlobalWidth::S8, false),
                "GlobalStoreS8" => (GlobalWidth::S8, true),
                "GlobalLoad16" => (GlobalWidth::Wide16, false),
                _ => (GlobalWidth::Wide16, true),
            };
            let mode = parse_int(arg_value(&args, "mode")?)? as u8;
            let addr = arg_value(&args, "address").ok().map(|v| parse_int(v)).transpose()?.map(|v| v as u16);
            Instruction::GlobalAccess { width, store, mode, addr }
        }
        "Bury" => Instruction::Bury(parse_int(arg_value(&args, "k")?)? as u8),
        "Dig" => Instruction::Dig(parse_int(arg_value(&args, "k")?)? as u8),
        "PushZeros" => Instruction::PushZeros(parse_int(arg_value(&args, "n")?)? as u8),
        "PopMany" => Instruction::PopMany(parse_int(arg_value(&args, "n")?)? as u8),
        other => return Err(AsmError::Syntax(format!("unknown instruction {}", other))),
    };
    Ok(insn)
}

/// Parse a textual assembly listing into a `FreeBlock`. Label ids for
/// `Lxxx:`-style bare labels and exported `name = ...` statements are
/// taken from the listing itself (so it must have been produced by
/// `print_free_block`, or follow the same numbering convention).
pub fn parse_free_block(text: &str) -> Result<FreeBlock, AsmError> {
    let mut block = FreeBlock::new();
    let mut exported: HashMap<String, usize> = HashMap::new();
    let mut next_synth_id = 100_000usize;
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(id_str) = line.strip_suffix(':') {
            let id = id_str
                .trim_start_matches('L')
                .parse::<usize>()
                .map_err(|_| AsmError::Syntax(format!("bad label: {}", line)))?;
            block.push_label(Label::new(id));
            continue;
        }
        if let Some((lhs, rhs)) = line.split_once('=') {
            let lhs = lhs.trim();
            let rhs = rhs.trim();
            if rhs.starts_with('[') {
                // data block statement: not representable inside a
                // FreeBlock (data blocks live at the Program level).
                return Err(AsmError::Syntax(format!(
                    "data block statement not valid inside a code block: {}",
                    line
                )));
            }
            let id = *exported.entry(lhs.to_string()).or_insert_with(|| {
                let id = next_synth_id;
                next_synth_id += 1;
                id
            });
            block.push_label(Label::exported(id, lhs));
            block.push(parse_instruction(rhs)?);
            continue;
        }
        block.push(parse_instruction(line)?);
    }
    Ok(block)
}

pub fn parse_data_block(text: &str) -> Result<DataBlock, AsmError> {
    let line = text.trim();
    let inner = line
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| AsmError::Syntax(format!("expected [..]: {}", line)))?;
    if inner.trim().is_empty() {
        return Ok(DataBlock::new(Vec::new()));
    }
    let bytes: Result<Vec<u8>, AsmError> = inner
        .split(',')
        .map(|b| {
            b.trim()
                .parse::<i32>()
                .map(|v| (v & 0xff) as u8)
                .map_err(|_| AsmError::Syntax(format!("bad byte: {}", b)))
        })
        .collect();
    Ok(DataBlock::new(bytes?))
}

/// Parse a hex string such as `"9005"` into raw bytes, used when a
/// data block is given directly as hex rather than a byte list.
pub fn parse_hex_data(hex: &str) -> Result<Vec<u8>, AsmError> {
    hex.from_hex_string()
        .map_err(|_| AsmError::Syntax(format!("bad hex literal: {}", hex)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ll::instruction::Instruction;

    #[test]
    fn round_trip_simple_block() {
        let mut block = FreeBlock::new();
        block.push_label(Label::exported(0, "main"));
        block.push(Instruction::PushImmediate(3));
        block.push(Instruction::Return);
        let text = print_free_block(&block);
        let reparsed = parse_free_block(&text).unwrap();
        assert_eq!(reparsed.items().len(), block.items().len());
    }
}
