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
use crate::util::ToHexString;
use std::fmt;

// ============================================================================
// Sign extension
// ============================================================================

/// Sign-extend `val`, whose bit pattern is only meaningful up to the
/// highest bit set in `mask` (a run of zero bits followed by a run of
/// one bits, e.g. `0x3f` for a 6-bit field), into a full `i32`.
pub fn signext(val: u32, mask: u32) -> i32 {
    let sign_bit = (mask + 1) >> 1;
    ((val ^ sign_bit).wrapping_sub(sign_bit)) as i32
}

/// Confirm that `val` already fits, as a signed quantity, within the
/// field described by `mask`. Used when re-encoding a literal that a
/// caller has supplied directly (rather than computed via a
/// relocation) to catch silent truncation.
pub fn assert_signexted(val: i32, mask: u32) -> Result<(), Error> {
    let lo = -(((mask + 1) >> 1) as i32);
    let hi = (mask >> 1) as i32;
    if val < lo || val > hi {
        Err(Error::LiteralOverflow)
    } else {
        Ok(())
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, PartialEq)]
pub enum Error {
    /// No opcode in the codec table matched the leading byte.
    UnknownCommand(u8),
    /// More than one opcode entry matched the leading byte (a codec
    /// table bug, not a user-facing condition).
    AmbiguousCommand(u8),
    /// A decode walked off the end of the available bytes.
    UnexpectedEnd,
    /// A literal, offset, or displacement does not fit in the field
    /// that is meant to carry it.
    LiteralOverflow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnknownCommand(b) => write!(f, "unknown command byte 0x{:02x}", b),
            Error::AmbiguousCommand(b) => write!(f, "ambiguous command byte 0x{:02x}", b),
            Error::UnexpectedEnd => write!(f, "unexpected end of bytecode"),
            Error::LiteralOverflow => write!(f, "literal does not fit in its encoded field"),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Binary / unary operators
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BAnd,
    BOr,
    BXor,
    LAnd,
    LOr,
}

impl BinOp {
    const ORDER: [BinOp; 12] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Div,
        BinOp::Mod,
        BinOp::Shl,
        BinOp::Shr,
        BinOp::BAnd,
        BinOp::BOr,
        BinOp::BXor,
        BinOp::LAnd,
        BinOp::LOr,
    ];

    fn opcode(&self) -> u8 {
        0x80 + Self::ORDER.iter().position(|b| b == self).unwrap() as u8
    }

    fn from_low_bits(low: u8) -> Option<BinOp> {
        Self::ORDER.get(low as usize).copied()
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BAnd => "&",
            BinOp::BOr => "|",
            BinOp::BXor => "^",
            BinOp::LAnd => "&&",
            BinOp::LOr => "||",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    BNot,
    LNot,
}

impl UnOp {
    fn opcode(&self) -> u8 {
        match self {
            UnOp::Neg => 0x8c,
            UnOp::BNot => 0x8d,
            UnOp::LNot => 0x8e,
        }
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            UnOp::Neg => "-",
            UnOp::BNot => "~",
            UnOp::LNot => "!",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Compare operators
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Leq,
    Eq,
    Neq,
    Geq,
    Gt,
}

impl CmpOp {
    const ORDER: [CmpOp; 6] = [
        CmpOp::Lt,
        CmpOp::Leq,
        CmpOp::Eq,
        CmpOp::Neq,
        CmpOp::Geq,
        CmpOp::Gt,
    ];

    fn opcode(&self) -> u8 {
        0xa8 + Self::ORDER.iter().position(|c| c == self).unwrap() as u8
    }

    fn from_low_bits(low: u8) -> Option<CmpOp> {
        Self::ORDER.get(low as usize).copied()
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            CmpOp::Lt => "<",
            CmpOp::Leq => "<=",
            CmpOp::Eq => "==",
            CmpOp::Neq => "!=",
            CmpOp::Geq => ">=",
            CmpOp::Gt => ">",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Global memory access mode
// ============================================================================

/// `(nargs, popoffset)` per address mode, indexed by the 3-bit mode
/// field of a global-access opcode.
const GLOBAL_ACCESS_MODES: [(u8, bool); 5] = [
    (1, false),
    (2, false),
    (0, true),
    (1, true),
    (2, true),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalWidth {
    U8,
    S8,
    Wide16,
}

impl GlobalWidth {
    fn base_opcode(&self, store: bool) -> u8 {
        match (self, store) {
            (GlobalWidth::U8, false) => 0xc0,
            (GlobalWidth::U8, true) => 0xc8,
            (GlobalWidth::S8, false) => 0xd0,
            (GlobalWidth::S8, true) => 0xd8,
            (GlobalWidth::Wide16, false) => 0xe0,
            (GlobalWidth::Wide16, true) => 0xe8,
        }
    }

    fn from_base(base: u8) -> Option<(GlobalWidth, bool)> {
        match base {
            0xc0 => Some((GlobalWidth::U8, false)),
            0xc8 => Some((GlobalWidth::U8, true)),
            0xd0 => Some((GlobalWidth::S8, false)),
            0xd8 => Some((GlobalWidth::S8, true)),
            0xe0 => Some((GlobalWidth::Wide16, false)),
            0xe8 => Some((GlobalWidth::Wide16, true)),
            _ => None,
        }
    }
}

// ============================================================================
// Instructions
// ============================================================================

/// A single decoded (or about-to-be-encoded) EmbedVM instruction.
///
/// The `*V` variants (`PushConstantV`, `JumpV`, `CallV`, `JumpIfV`,
/// `JumpIfNotV`) are placeholders: they carry a value that has not yet
/// been narrowed to a concrete width by the block engine's relaxation
/// pass (see `ll::block`). Every other variant is already a concrete,
/// fixed-width wire instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Read local/argument slot at signed frame offset `sfa`.
    PushLocal(i8),
    /// Write local/argument slot at signed frame offset `sfa`.
    PopLocal(i8),
    Binary(BinOp),
    Unary(UnOp),
    Compare(CmpOp),
    /// A narrow immediate folded directly into the opcode's low 3 bits
    /// (`-4..=3`).
    PushImmediate(i8),
    PushU8(u8),
    PushS8(i8),
    Push16(u16),
    /// Placeholder: a literal whose final width (0/1/2 bytes) is not
    /// yet known. Resolved to `PushImmediate`/`PushU8`/`PushS8`/
    /// `Push16` by the block engine's relaxation pass.
    PushConstantV(i32),
    Return,
    Return0,
    DropValue,
    CallAddress,
    JumpToAddress,
    /// Placeholder: unconditional jump to a label, width unresolved.
    JumpV(LabelTarget),
    /// Placeholder: call to a label, width unresolved.
    CallV(LabelTarget),
    /// Placeholder: conditional jump (branch if nonzero), width
    /// unresolved.
    JumpIfV(LabelTarget),
    /// Placeholder: conditional jump (branch if zero), width
    /// unresolved.
    JumpIfNotV(LabelTarget),
    /// Concrete 1-byte-displacement unconditional jump.
    JumpRel1(i8),
    /// Concrete 2-byte-displacement unconditional jump.
    JumpRel2(i16),
    CallRel1(i8),
    CallRel2(i16),
    JumpRel1If(i8),
    JumpRel2If(i16),
    JumpRel1IfNot(i8),
    JumpRel2IfNot(i16),
    StackPointer,
    StackFramePointer,
    CallUserFunction(u8),
    GlobalAccess {
        width: GlobalWidth,
        store: bool,
        mode: u8,
        /// Present (`Some`) unless `mode` carries `nargs == 0`, in
        /// which case the address comes entirely from the stack.
        addr: Option<u16>,
    },
    Bury(u8),
    Dig(u8),
    PushZeros(u8),
    PopMany(u8),
}

/// Where a placeholder branch/call instruction's displacement
/// eventually resolves. The block engine substitutes the label's
/// fixed offset once all blocks have a concrete position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelTarget(pub usize);

impl Instruction {
    /// Encode this instruction into `bytes`. Only concrete
    /// (non-placeholder) instructions may be encoded; placeholders
    /// must first be narrowed by the block engine.
    pub fn encode(&self, bytes: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            Instruction::PushLocal(sfa) => {
                assert_signexted(*sfa as i32, 0x3f)?;
                bytes.push((*sfa as u8) & 0x3f);
            }
            Instruction::PopLocal(sfa) => {
                assert_signexted(*sfa as i32, 0x3f)?;
                bytes.push(0x40 | ((*sfa as u8) & 0x3f));
            }
            Instruction::Binary(op) => bytes.push(op.opcode()),
            Instruction::Unary(op) => bytes.push(op.opcode()),
            Instruction::Compare(op) => bytes.push(op.opcode()),
            Instruction::PushImmediate(v) => {
                assert_signexted(*v as i32, 0x07)?;
                bytes.push(0x90 | ((*v as u8) & 0x07));
            }
            Instruction::PushU8(v) => {
                bytes.push(0x98);
                bytes.push(*v);
            }
            Instruction::PushS8(v) => {
                bytes.push(0x99);
                bytes.push(*v as u8);
            }
            Instruction::Push16(v) => {
                bytes.push(0x9a);
                bytes.push((*v >> 8) as u8);
                bytes.push((*v & 0xff) as u8);
            }
            Instruction::PushConstantV(_) => {
                panic!("PushConstantV placeholder must be narrowed before encoding")
            }
            Instruction::Return => bytes.push(0x9b),
            Instruction::Return0 => bytes.push(0x9c),
            Instruction::DropValue => bytes.push(0x9d),
            Instruction::CallAddress => bytes.push(0x9e),
            Instruction::JumpToAddress => bytes.push(0x9f),
            Instruction::JumpV(_) | Instruction::CallV(_) | Instruction::JumpIfV(_) | Instruction::JumpIfNotV(_) => {
                panic!("relative-branch placeholder must be narrowed before encoding")
            }
            Instruction::JumpRel1(d) => {
                bytes.push(0xa0);
                bytes.push(*d as u8);
            }
            Instruction::JumpRel2(d) => {
                bytes.push(0xa1);
                bytes.push((*d >> 8) as u8);
                bytes.push((*d & 0xff) as u8);
            }
            Instruction::CallRel1(d) => {
                bytes.push(0xa2);
                bytes.push(*d as u8);
            }
            Instruction::CallRel2(d) => {
                bytes.push(0xa3);
                bytes.push((*d >> 8) as u8);
                bytes.push((*d & 0xff) as u8);
            }
            Instruction::JumpRel1If(d) => {
                bytes.push(0xa4);
                bytes.push(*d as u8);
            }
            Instruction::JumpRel2If(d) => {
                bytes.push(0xa5);
                bytes.push((*d >> 8) as u8);
                bytes.push((*d & 0xff) as u8);
            }
            Instruction::JumpRel1IfNot(d) => {
                bytes.push(0xa6);
                bytes.push(*d as u8);
            }
            Instruction::JumpRel2IfNot(d) => {
                bytes.push(0xa7);
                bytes.push((*d >> 8) as u8);
                bytes.push((*d & 0xff) as u8);
            }
            Instruction::StackPointer => bytes.push(0xae),
            Instruction::StackFramePointer => bytes.push(0xaf),
            Instruction::CallUserFunction(which) => {
                if *which > 0x0f {
                    return Err(Error::LiteralOverflow);
                }
                bytes.push(0xb0 | which);
            }
            Instruction::GlobalAccess { width, store, mode, addr } => {
                let base = width.base_opcode(*store);
                bytes.push(base | (mode & 0x07));
                let (nargs, _) = GLOBAL_ACCESS_MODES[*mode as usize];
                match nargs {
                    0 => {}
                    1 => bytes.push(addr.unwrap() as u8),
                    2 => {
                        let a = addr.unwrap();
                        bytes.push((a >> 8) as u8);
                        bytes.push((a & 0xff) as u8);
                    }
                    _ => unreachable!(),
                }
            }
            Instruction::Bury(k) => {
                if *k > 5 {
                    return Err(Error::LiteralOverflow);
                }
                bytes.push(0xc5 | (k << 3));
            }
            Instruction::Dig(k) => {
                if *k > 5 {
                    return Err(Error::LiteralOverflow);
                }
                bytes.push(0xc6 | (k << 3));
            }
            Instruction::PushZeros(n) => bytes.push(0xf0 | (n & 0x07)),
            Instruction::PopMany(n) => bytes.push(0xf8 | (n & 0x07)),
        }
        Ok(())
    }

    /// Encoded length in bytes. Placeholder variants do not have a
    /// fixed length until narrowed; callers must use the block
    /// engine's relaxation pass instead.
    pub fn length(&self) -> usize {
        match self {
            Instruction::PushLocal(_)
            | Instruction::PopLocal(_)
            | Instruction::Binary(_)
            | Instruction::Unary(_)
            | Instruction::Compare(_)
            | Instruction::PushImmediate(_)
            | Instruction::Return
            | Instruction::Return0
            | Instruction::DropValue
            | Instruction::CallAddress
            | Instruction::JumpToAddress
            | Instruction::StackPointer
            | Instruction::StackFramePointer
            | Instruction::CallUserFunction(_)
            | Instruction::Bury(_)
            | Instruction::Dig(_)
            | Instruction::PushZeros(_)
            | Instruction::PopMany(_) => 1,
            Instruction::PushU8(_)
            | Instruction::PushS8(_)
            | Instruction::JumpRel1(_)
            | Instruction::CallRel1(_)
            | Instruction::JumpRel1If(_)
            | Instruction::JumpRel1IfNot(_) => 2,
            Instruction::Push16(_)
            | Instruction::JumpRel2(_)
            | Instruction::CallRel2(_)
            | Instruction::JumpRel2If(_)
            | Instruction::JumpRel2IfNot(_) => 3,
            Instruction::GlobalAccess { mode, .. } => {
                1 + GLOBAL_ACCESS_MODES[*mode as usize].0 as usize
            }
            Instruction::PushConstantV(_) | Instruction::JumpV(_) | Instruction::CallV(_) | Instruction::JumpIfV(_) | Instruction::JumpIfNotV(_) => {
                panic!("placeholder instruction has no fixed length")
            }
        }
    }

    /// Decode one instruction starting at `bytes[0]`, returning it and
    /// the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Instruction, usize), Error> {
        let b0 = *bytes.first().ok_or(Error::UnexpectedEnd)?;
        let need = |n: usize| -> Result<&[u8], Error> {
            if bytes.len() < n {
                Err(Error::UnexpectedEnd)
            } else {
                Ok(&bytes[..n])
            }
        };
        if b0 & 0xc0 == 0x00 {
            return Ok((Instruction::PushLocal(signext(b0 as u32, 0x3f) as i8), 1));
        }
        if b0 & 0xc0 == 0x40 {
            return Ok((Instruction::PopLocal(signext((b0 & 0x3f) as u32, 0x3f) as i8), 1));
        }
        if (0x80..=0x8b).contains(&b0) {
            let op = BinOp::from_low_bits(b0 - 0x80).unwrap();
            return Ok((Instruction::Binary(op), 1));
        }
        if (0x8c..=0x8e).contains(&b0) {
            let op = match b0 {
                0x8c => UnOp::Neg,
                0x8d => UnOp::BNot,
                _ => UnOp::LNot,
            };
            return Ok((Instruction::Unary(op), 1));
        }
        if b0 & 0xf8 == 0x90 {
            return Ok((Instruction::PushImmediate(signext((b0 & 0x07) as u32, 0x07) as i8), 1));
        }
        match b0 {
            0x98 => {
                let b = need(2)?;
                return Ok((Instruction::PushU8(b[1]), 2));
            }
            0x99 => {
                let b = need(2)?;
                return Ok((Instruction::PushS8(b[1] as i8), 2));
            }
            0x9a => {
                let b = need(3)?;
                return Ok((Instruction::Push16(((b[1] as u16) << 8) | b[2] as u16), 3));
            }
            0x9b => return Ok((Instruction::Return, 1)),
            0x9c => return Ok((Instruction::Return0, 1)),
            0x9d => return Ok((Instruction::DropValue, 1)),
            0x9e => return Ok((Instruction::CallAddress, 1)),
            0x9f => return Ok((Instruction::JumpToAddress, 1)),
            0xa0 => {
                let b = need(2)?;
                return Ok((Instruction::JumpRel1(b[1] as i8), 2));
            }
            0xa1 => {
                let b = need(3)?;
                return Ok((Instruction::JumpRel2(((b[1] as i16) << 8) | b[2] as i16), 3));
            }
            0xa2 => {
                let b = need(2)?;
                return Ok((Instruction::CallRel1(b[1] as i8), 2));
            }
            0xa3 => {
                let b = need(3)?;
                return Ok((Instruction::CallRel2(((b[1] as i16) << 8) | b[2] as i16), 3));
            }
            0xa4 => {
                let b = need(2)?;
                return Ok((Instruction::JumpRel1If(b[1] as i8), 2));
            }
            0xa5 => {
                let b = need(3)?;
                return Ok((Instruction::JumpRel2If(((b[1] as i16) << 8) | b[2] as i16), 3));
            }
            0xa6 => {
                let b = need(2)?;
                return Ok((Instruction::JumpRel1IfNot(b[1] as i8), 2));
            }
            0xa7 => {
                let b = need(3)?;
                return Ok((Instruction::JumpRel2IfNot(((b[1] as i16) << 8) | b[2] as i16), 3));
            }
            0xae => return Ok((Instruction::StackPointer, 1)),
            0xaf => return Ok((Instruction::StackFramePointer, 1)),
            _ => {}
        }
        if (0xa8..=0xad).contains(&b0) {
            let op = CmpOp::from_low_bits(b0 - 0xa8).unwrap();
            return Ok((Instruction::Compare(op), 1));
        }
        if b0 & 0xf0 == 0xb0 {
            return Ok((Instruction::CallUserFunction(b0 & 0x0f), 1));
        }
        if b0 & 0xc7 == 0xc5 && (b0 >> 3) & 0x07 <= 5 {
            return Ok((Instruction::Bury((b0 >> 3) & 0x07), 1));
        }
        if b0 & 0xc7 == 0xc6 && (b0 >> 3) & 0x07 <= 5 {
            return Ok((Instruction::Dig((b0 >> 3) & 0x07), 1));
        }
        if let Some((width, store)) = GlobalWidth::from_base(b0 & 0xf8) {
            let mode = b0 & 0x07;
            let (nargs, _) = *GLOBAL_ACCESS_MODES
                .get(mode as usize)
                .ok_or(Error::UnknownCommand(b0))?;
            match nargs {
                0 => {
                    return Ok((
                        Instruction::GlobalAccess { width, store, mode, addr: None },
                        1,
                    ))
                }
                1 => {
                    let b = need(2)?;
                    return Ok((
                        Instruction::GlobalAccess { width, store, mode, addr: Some(b[1] as u16) },
                        2,
                    ));
                }
                2 => {
                    let b = need(3)?;
                    return Ok((
                        Instruction::GlobalAccess {
                            width,
                            store,
                            mode,
                            addr: Some(((b[1] as u16) << 8) | b[2] as u16),
                        },
                        3,
                    ));
                }
                _ => unreachable!(),
            }
        }
        if b0 & 0xf8 == 0xf0 {
            return Ok((Instruction::PushZeros(b0 & 0x07), 1));
        }
        if b0 & 0xf8 == 0xf8 {
            return Ok((Instruction::PopMany(b0 & 0x07), 1));
        }
        Err(Error::UnknownCommand(b0))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::PushLocal(sfa) => write!(f, "push.l {}", sfa),
            Instruction::PopLocal(sfa) => write!(f, "pop.l {}", sfa),
            Instruction::Binary(op) => write!(f, "bin {}", op),
            Instruction::Unary(op) => write!(f, "un {}", op),
            Instruction::Compare(op) => write!(f, "cmp {}", op),
            Instruction::PushImmediate(v) => write!(f, "push.i {}", v),
            Instruction::PushU8(v) => write!(f, "push.u8 {}", v),
            Instruction::PushS8(v) => write!(f, "push.s8 {}", v),
            Instruction::Push16(v) => write!(f, "push.16 {}", v),
            Instruction::PushConstantV(v) => write!(f, "push.v {}", v),
            Instruction::Return => write!(f, "ret"),
            Instruction::Return0 => write!(f, "ret0"),
            Instruction::DropValue => write!(f, "drop"),
            Instruction::CallAddress => write!(f, "call.addr"),
            Instruction::JumpToAddress => write!(f, "jump.addr"),
            Instruction::JumpV(t) => write!(f, "jump L{}", t.0),
            Instruction::CallV(t) => write!(f, "call L{}", t.0),
            Instruction::JumpIfV(t) => write!(f, "jump.if L{}", t.0),
            Instruction::JumpIfNotV(t) => write!(f, "jump.ifnot L{}", t.0),
            Instruction::JumpRel1(d) => write!(f, "jump.r1 {}", d),
            Instruction::JumpRel2(d) => write!(f, "jump.r2 {}", d),
            Instruction::CallRel1(d) => write!(f, "call.r1 {}", d),
            Instruction::CallRel2(d) => write!(f, "call.r2 {}", d),
            Instruction::JumpRel1If(d) => write!(f, "jump.r1.if {}", d),
            Instruction::JumpRel2If(d) => write!(f, "jump.r2.if {}", d),
            Instruction::JumpRel1IfNot(d) => write!(f, "jump.r1.ifnot {}", d),
            Instruction::JumpRel2IfNot(d) => write!(f, "jump.r2.ifnot {}", d),
            Instruction::StackPointer => write!(f, "push.sp"),
            Instruction::StackFramePointer => write!(f, "push.sfp"),
            Instruction::CallUserFunction(w) => write!(f, "call.user {}", w),
            Instruction::GlobalAccess { width, store, mode, addr } => {
                let dir = if *store { "store" } else { "load" };
                let w = match width {
                    GlobalWidth::U8 => "u8",
                    GlobalWidth::S8 => "s8",
                    GlobalWidth::Wide16 => "16",
                };
                match addr {
                    Some(a) => write!(f, "global.{}.{} {} [{}]", dir, w, mode, a),
                    None => write!(f, "global.{}.{} {}", dir, w, mode),
                }
            }
            Instruction::Bury(k) => write!(f, "bury {}", k),
            Instruction::Dig(k) => write!(f, "dig {}", k),
            Instruction::PushZeros(n) => write!(f, "push.zeros {}", n),
            Instruction::PopMany(n) => write!(f, "pop.many {}", n),
        }
    }
}

/// Encode a concrete instruction to its hex-string wire form; a thin
/// convenience over [`Instruction::encode`] plus [`ToHexString`].
pub fn to_hex(insn: &Instruction) -> Result<String, Error> {
    let mut bytes = Vec::new();
    insn.encode(&mut bytes)?;
    Ok(bytes.to_hex_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_push_immediate_zero() {
        let (insn, len) = Instruction::decode(&[0x90]).unwrap();
        assert_eq!(insn, Instruction::PushImmediate(0));
        assert_eq!(len, 1);
    }

    #[test]
    fn decode_push_immediate_negative_one() {
        let (insn, len) = Instruction::decode(&[0x97]).unwrap();
        assert_eq!(insn, Instruction::PushImmediate(-1));
        assert_eq!(len, 1);
    }

    #[test]
    fn decode_unknown_command() {
        // 0xb8..0xbf are in the gap between CallUserFunction (0xb0-0xbf
        // range matched by mask 0xf0 — actually all of 0xb0-0xbf decode)
        // so use a genuinely unmapped value instead.
        let err = Instruction::decode(&[0xc4]).unwrap_err();
        assert!(matches!(err, Error::UnknownCommand(0xc4)));
    }

    #[test]
    fn codec_round_trip_all_bytes() {
        for b in 0u16..=255 {
            let b = b as u8;
            let probe = [b, 233, 253];
            if let Ok((insn, len)) = Instruction::decode(&probe) {
                if matches!(
                    insn,
                    Instruction::PushConstantV(_)
                        | Instruction::JumpV(_)
                        | Instruction::CallV(_)
                        | Instruction::JumpIfV(_)
                        | Instruction::JumpIfNotV(_)
                ) {
                    continue;
                }
                let mut out = Vec::new();
                insn.encode(&mut out).unwrap();
                assert_eq!(&out[..], &probe[..len]);
            }
        }
    }

    #[test]
    fn signext_6bit_field() {
        assert_eq!(signext(0x3f, 0x3f), -1);
        assert_eq!(signext(0x20, 0x3f), -32);
        assert_eq!(signext(0x1f, 0x3f), 31);
    }

    #[test]
    fn bury_dig_decode_never_exceeds_k_5() {
        // 0xf5/0xfd and 0xf6/0xfe look like Bury(6)/Bury(7) and
        // Dig(6)/Dig(7) under the bare `byte & 0xc7` mask, but `k` is
        // only valid up to 5; these bytes belong to PushZeros/PopMany.
        assert_eq!(Instruction::decode(&[0xf5]).unwrap().0, Instruction::PushZeros(5));
        assert_eq!(Instruction::decode(&[0xfd]).unwrap().0, Instruction::PopMany(5));
        assert_eq!(Instruction::decode(&[0xf6]).unwrap().0, Instruction::PushZeros(6));
        assert_eq!(Instruction::decode(&[0xfe]).unwrap().0, Instruction::PopMany(6));
    }

    #[test]
    fn bury_dig_decode_accepts_k_up_to_5() {
        assert_eq!(Instruction::decode(&[0xc5]).unwrap().0, Instruction::Bury(0));
        assert_eq!(Instruction::decode(&[0xed]).unwrap().0, Instruction::Bury(5));
        assert_eq!(Instruction::decode(&[0xc6]).unwrap().0, Instruction::Dig(0));
        assert_eq!(Instruction::decode(&[0xee]).unwrap().0, Instruction::Dig(5));
    }

    #[test]
    fn bury_dig_encode_rejects_k_above_5() {
        let mut out = Vec::new();
        let err = Instruction::Bury(6).encode(&mut out).unwrap_err();
        assert!(matches!(err, Error::LiteralOverflow));
        let err = Instruction::Dig(6).encode(&mut out).unwrap_err();
        assert!(matches!(err, Error::LiteralOverflow));
    }
}
