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
use crate::ll::instruction::{self, Instruction, LabelTarget};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, PartialEq)]
pub enum FixError {
    /// A placeholder referenced a label id with no corresponding
    /// `Label` item in the same block.
    UnresolvedLabel(usize),
    /// A displacement or literal did not fit any encodable width.
    RangeError,
    Codec(instruction::Error),
}

impl fmt::Display for FixError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FixError::UnresolvedLabel(id) => write!(f, "unresolved label L{}", id),
            FixError::RangeError => write!(f, "value out of encodable range"),
            FixError::Codec(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for FixError {}

impl From<instruction::Error> for FixError {
    fn from(e: instruction::Error) -> Self {
        FixError::Codec(e)
    }
}

// ============================================================================
// Labels
// ============================================================================

/// A zero-length synthetic instruction marking a position inside a
/// `FreeBlock`. `export` names the symbol under which `fixed_code`
/// should record this position, if any.
#[derive(Debug, Clone)]
pub struct Label {
    pub id: usize,
    pub export: Option<String>,
}

impl Label {
    pub fn new(id: usize) -> Self {
        Label { id, export: None }
    }

    pub fn exported(id: usize, name: impl Into<String>) -> Self {
        Label { id, export: Some(name.into()) }
    }
}

/// A non-owning reference to a `Label` living in the same block,
/// carried by a placeholder instruction.
pub type LabelRef = LabelTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Code,
    Data,
}

// ============================================================================
// FreeBlock
// ============================================================================

#[derive(Debug, Clone)]
pub enum Item {
    Insn(Instruction),
    Label(Label),
}

/// An ordered sequence of instructions and labels whose positions are
/// not yet fixed. Variable-length placeholders are allowed.
#[derive(Debug, Clone, Default)]
pub struct FreeBlock {
    items: Vec<Item>,
}

impl FreeBlock {
    pub fn new() -> Self {
        FreeBlock { items: Vec::new() }
    }

    pub fn push(&mut self, insn: Instruction) {
        self.items.push(Item::Insn(insn));
    }

    pub fn push_label(&mut self, label: Label) {
        self.items.push(Item::Label(label));
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn extend(&mut self, other: FreeBlock) {
        self.items.extend(other.items);
    }

    fn worst_case_length(insn: &Instruction) -> usize {
        match insn {
            Instruction::PushConstantV(_)
            | Instruction::JumpV(_)
            | Instruction::CallV(_)
            | Instruction::JumpIfV(_)
            | Instruction::JumpIfNotV(_) => 3,
            other => other.length(),
        }
    }

    fn const_width(v: i32) -> Result<u8, FixError> {
        if (-4..4).contains(&v) {
            Ok(0)
        } else if (-128..256).contains(&v) {
            Ok(1)
        } else if (-32768..65536).contains(&v) {
            Ok(2)
        } else {
            Err(FixError::RangeError)
        }
    }

    fn const_length(width: u8) -> usize {
        match width {
            0 => 1,
            1 => 2,
            2 => 3,
            _ => unreachable!(),
        }
    }

    fn concrete_const(v: i32, width: u8) -> Instruction {
        match width {
            0 => Instruction::PushImmediate(v as i8),
            1 => {
                if v >= 0 {
                    Instruction::PushU8(v as u8)
                } else {
                    Instruction::PushS8(v as i8)
                }
            }
            2 => Instruction::Push16(v as u16),
            _ => unreachable!(),
        }
    }

    fn disp_width(reladdr: i32) -> Result<u8, FixError> {
        if (-128..128).contains(&reladdr) {
            Ok(1)
        } else if (-32768..32768).contains(&reladdr) {
            Ok(2)
        } else {
            Err(FixError::RangeError)
        }
    }

    fn disp_length(width: u8) -> usize {
        match width {
            1 => 2,
            2 => 3,
            _ => unreachable!(),
        }
    }

    /// Run the two-pass relaxation fixpoint, turning this `FreeBlock`
    /// into a `FixedBlock` whose first byte lands at `start`.
    pub fn fixed_code(&self, start: u16) -> Result<FixedBlock, FixError> {
        let n = self.items.len();
        let mut lengths: Vec<usize> = self
            .items
            .iter()
            .map(|it| match it {
                Item::Label(_) => 0,
                Item::Insn(insn) => Self::worst_case_length(insn),
            })
            .collect();

        // Two relaxation passes, as specified: shrinking an
        // instruction can only shrink displacements that cross it,
        // never grow them, so two passes suffice to reach a fixpoint.
        for _ in 0..2 {
            let positions = Self::positions_from(start, &lengths);
            let label_pos = Self::label_positions(&self.items, &positions);
            for i in 0..n {
                if let Item::Insn(insn) = &self.items[i] {
                    lengths[i] = Self::placeholder_length(insn, positions[i], &label_pos)?;
                }
            }
        }

        // Final position pass, using the now-stable lengths.
        let positions = Self::positions_from(start, &lengths);
        let label_pos = Self::label_positions(&self.items, &positions);

        let mut instructions = Vec::new();
        let mut exports = HashMap::new();
        for i in 0..n {
            match &self.items[i] {
                Item::Label(label) => {
                    if let Some(name) = &label.export {
                        exports.insert(name.clone(), (positions[i], BlockKind::Code));
                    }
                }
                Item::Insn(insn) => {
                    let concrete = Self::narrow(insn, positions[i], &label_pos)?;
                    instructions.push((positions[i], concrete));
                }
            }
        }
        Ok(FixedBlock { instructions, exports })
    }

    fn positions_from(start: u16, lengths: &[usize]) -> Vec<u16> {
        let mut pos = Vec::with_capacity(lengths.len());
        let mut cur = start as u32;
        for &len in lengths {
            pos.push(cur as u16);
            cur += len as u32;
        }
        pos
    }

    fn label_positions(items: &[Item], positions: &[u16]) -> HashMap<usize, u16> {
        let mut map = HashMap::new();
        for (i, it) in items.iter().enumerate() {
            if let Item::Label(label) = it {
                map.insert(label.id, positions[i]);
            }
        }
        map
    }

    fn target_of(insn: &Instruction) -> Option<LabelRef> {
        match insn {
            Instruction::JumpV(t)
            | Instruction::CallV(t)
            | Instruction::JumpIfV(t)
            | Instruction::JumpIfNotV(t) => Some(*t),
            _ => None,
        }
    }

    fn placeholder_length(
        insn: &Instruction,
        self_pos: u16,
        label_pos: &HashMap<usize, u16>,
    ) -> Result<usize, FixError> {
        match insn {
            Instruction::PushConstantV(v) => Ok(Self::const_length(Self::const_width(*v)?)),
            _ => {
                if let Some(target) = Self::target_of(insn) {
                    let tpos = *label_pos
                        .get(&target.0)
                        .ok_or(FixError::UnresolvedLabel(target.0))?;
                    let reladdr = tpos as i32 - self_pos as i32;
                    Ok(Self::disp_length(Self::disp_width(reladdr)?))
                } else {
                    Ok(insn.length())
                }
            }
        }
    }

    fn narrow(
        insn: &Instruction,
        self_pos: u16,
        label_pos: &HashMap<usize, u16>,
    ) -> Result<Instruction, FixError> {
        match insn {
            Instruction::PushConstantV(v) => {
                Ok(Self::concrete_const(*v, Self::const_width(*v)?))
            }
            Instruction::JumpV(t) => Self::narrow_branch(*t, self_pos, label_pos, |d| Instruction::JumpRel1(d), |d| Instruction::JumpRel2(d)),
            Instruction::CallV(t) => Self::narrow_branch(*t, self_pos, label_pos, |d| Instruction::CallRel1(d), |d| Instruction::CallRel2(d)),
            Instruction::JumpIfV(t) => Self::narrow_branch(*t, self_pos, label_pos, |d| Instruction::JumpRel1If(d), |d| Instruction::JumpRel2If(d as i16)),
            Instruction::JumpIfNotV(t) => Self::narrow_branch(*t, self_pos, label_pos, |d| Instruction::JumpRel1IfNot(d), |d| Instruction::JumpRel2IfNot(d as i16)),
            other => Ok(other.clone()),
        }
    }

    fn narrow_branch(
        target: LabelRef,
        self_pos: u16,
        label_pos: &HashMap<usize, u16>,
        rel1: impl Fn(i8) -> Instruction,
        rel2: impl Fn(i16) -> Instruction,
    ) -> Result<Instruction, FixError> {
        let tpos = *label_pos
            .get(&target.0)
            .ok_or(FixError::UnresolvedLabel(target.0))?;
        let reladdr = tpos as i32 - self_pos as i32;
        match Self::disp_width(reladdr)? {
            1 => Ok(rel1(reladdr as i8)),
            2 => Ok(rel2(reladdr as i16)),
            _ => unreachable!(),
        }
    }
}

// ============================================================================
// FixedBlock
// ============================================================================

/// A mapping from byte offset to a concrete, fixed-length
/// instruction, plus exported-symbol positions. Consecutive
/// instructions satisfy `offset[i+1] == offset[i] + length(insn[i])`.
#[derive(Debug, Clone, Default)]
pub struct FixedBlock {
    instructions: Vec<(u16, Instruction)>,
    exports: HashMap<String, (u16, BlockKind)>,
}

impl FixedBlock {
    /// Build a `FixedBlock` directly from already-decoded
    /// `(offset, instruction)` pairs, as produced by worklist
    /// disassembly. `offsets` must be ascending and gapless per the
    /// usual invariant.
    pub fn from_instructions(instructions: Vec<(u16, Instruction)>) -> Self {
        FixedBlock { instructions, exports: HashMap::new() }
    }

    pub fn instructions(&self) -> &[(u16, Instruction)] {
        &self.instructions
    }

    pub fn exports(&self) -> &HashMap<String, (u16, BlockKind)> {
        &self.exports
    }

    /// Total size in bytes: the position of the last instruction plus
    /// its length, or 0 if the block is empty.
    pub fn length(&self) -> u16 {
        match self.instructions.last() {
            Some((pos, insn)) => *pos + insn.length() as u16,
            None => 0,
        }
    }

    pub fn to_binary(&self) -> Result<Vec<u8>, instruction::Error> {
        let mut bytes = Vec::new();
        for (_, insn) in &self.instructions {
            insn.encode(&mut bytes)?;
        }
        Ok(bytes)
    }

    /// Inverse of `FreeBlock::fixed_code`: scan in order, replacing
    /// relative branches and concrete push-constants with
    /// placeholders pointing at freshly allocated (or reused) labels.
    /// `next_id` is the caller's running label-id counter, shared
    /// across blocks so label ids stay unique program-wide.
    pub fn unfixed_code(&self, next_id: &mut usize) -> FreeBlock {
        let mut label_at: HashMap<u16, usize> = HashMap::new();
        let mut alloc_at = |pos: u16, label_at: &mut HashMap<u16, usize>| -> usize {
            *label_at.entry(pos).or_insert_with(|| {
                let id = *next_id;
                *next_id += 1;
                id
            })
        };

        // First pass: find every absolute target a relative branch
        // refers to, so we know where to splice in label items; also
        // reserve an id for every exported position.
        for (pos, insn) in &self.instructions {
            if let Some(reladdr) = Self::reladdr_of(insn) {
                let target = (*pos as i32 + reladdr) as u16;
                alloc_at(target, &mut label_at);
            }
        }
        let export_ids: HashMap<String, usize> = self
            .exports
            .iter()
            .map(|(name, (pos, _))| (name.clone(), alloc_at(*pos, &mut label_at)))
            .collect();

        let mut by_pos: BTreeMap<u16, Vec<Item>> = BTreeMap::new();
        for (name, (pos, _)) in &self.exports {
            by_pos
                .entry(*pos)
                .or_default()
                .push(Item::Label(Label::exported(export_ids[name], name.clone())));
        }
        for (pos, id) in &label_at {
            let already_exported = self.exports.values().any(|(p, _)| p == pos);
            if !already_exported {
                by_pos.entry(*pos).or_default().push(Item::Label(Label::new(*id)));
            }
        }
        for (pos, insn) in &self.instructions {
            let generalized = Self::generalize(insn, *pos, &label_at);
            by_pos.entry(*pos).or_default().push(Item::Insn(generalized));
        }

        let mut out = FreeBlock::new();
        for (_, items) in by_pos {
            for item in items {
                match item {
                    Item::Label(l) => out.push_label(l),
                    Item::Insn(i) => out.push(i),
                }
            }
        }
        out
    }

    fn reladdr_of(insn: &Instruction) -> Option<i32> {
        match insn {
            Instruction::JumpRel1(d) => Some(*d as i32),
            Instruction::JumpRel2(d) => Some(*d as i32),
            Instruction::CallRel1(d) => Some(*d as i32),
            Instruction::CallRel2(d) => Some(*d as i32),
            Instruction::JumpRel1If(d) => Some(*d as i32),
            Instruction::JumpRel2If(d) => Some(*d as i32),
            Instruction::JumpRel1IfNot(d) => Some(*d as i32),
            Instruction::JumpRel2IfNot(d) => Some(*d as i32),
            _ => None,
        }
    }

    fn generalize(insn: &Instruction, pos: u16, label_at: &HashMap<u16, usize>) -> Instruction {
        let lookup = |reladdr: i32| -> LabelRef {
            let target = (pos as i32 + reladdr) as u16;
            LabelTarget(*label_at.get(&target).expect("allocated in first pass"))
        };
        match insn {
            Instruction::JumpRel1(d) => Instruction::JumpV(lookup(*d as i32)),
            Instruction::JumpRel2(d) => Instruction::JumpV(lookup(*d as i32)),
            Instruction::CallRel1(d) => Instruction::CallV(lookup(*d as i32)),
            Instruction::CallRel2(d) => Instruction::CallV(lookup(*d as i32)),
            Instruction::JumpRel1If(d) => Instruction::JumpIfV(lookup(*d as i32)),
            Instruction::JumpRel2If(d) => Instruction::JumpIfV(lookup(*d as i32)),
            Instruction::JumpRel1IfNot(d) => Instruction::JumpIfNotV(lookup(*d as i32)),
            Instruction::JumpRel2IfNot(d) => Instruction::JumpIfNotV(lookup(*d as i32)),
            Instruction::PushImmediate(v) => Instruction::PushConstantV(*v as i32),
            Instruction::PushU8(v) => Instruction::PushConstantV(*v as i32),
            Instruction::PushS8(v) => Instruction::PushConstantV(*v as i32),
            Instruction::Push16(v) => Instruction::PushConstantV(*v as i32),
            other => other.clone(),
        }
    }
}

// ============================================================================
// DataBlock
// ============================================================================

/// An immutable byte vector occupying a fixed length in the final
/// image.
#[derive(Debug, Clone)]
pub struct DataBlock {
    bytes: Vec<u8>,
}

impl DataBlock {
    pub fn new(bytes: Vec<u8>) -> Self {
        DataBlock { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ll::instruction::BinOp;

    #[test]
    fn relaxation_minimality_backward_jump() {
        // label L0; <~60 bytes of filler>; JumpV -> L0
        let mut block = FreeBlock::new();
        block.push_label(Label::new(0));
        for _ in 0..30 {
            block.push(Instruction::Binary(BinOp::Add));
            block.push(Instruction::Binary(BinOp::Sub));
        }
        block.push(Instruction::JumpV(LabelTarget(0)));
        let fixed = block.fixed_code(0).unwrap();
        let (_, last) = fixed.instructions().last().unwrap();
        assert!(matches!(last, Instruction::JumpRel1(_)));
    }

    #[test]
    fn unfix_refix_round_trip() {
        let mut block = FreeBlock::new();
        block.push_label(Label::exported(0, "start"));
        block.push(Instruction::PushConstantV(1000));
        block.push(Instruction::JumpV(LabelTarget(1)));
        block.push(Instruction::DropValue);
        block.push_label(Label::new(1));
        block.push(Instruction::Return0);

        let fixed = block.fixed_code(0).unwrap();
        let bytes_before = fixed.to_binary().unwrap();

        let mut counter = 2;
        let unfixed = fixed.unfixed_code(&mut counter);
        let refixed = unfixed.fixed_code(0).unwrap();
        let bytes_after = refixed.to_binary().unwrap();

        assert_eq!(bytes_before, bytes_after);
    }

    #[test]
    fn push_constant_width_selection() {
        let mut block = FreeBlock::new();
        block.push(Instruction::PushConstantV(3));
        block.push(Instruction::PushConstantV(200));
        block.push(Instruction::PushConstantV(-200));
        block.push(Instruction::PushConstantV(1000));
        let fixed = block.fixed_code(0).unwrap();
        let insns: Vec<_> = fixed.instructions().iter().map(|(_, i)| i.clone()).collect();
        assert_eq!(insns[0], Instruction::PushImmediate(3));
        assert_eq!(insns[1], Instruction::PushU8(200));
        assert_eq!(insns[2], Instruction::PushS8(-200i32 as i8));
        assert_eq!(insns[3], Instruction::Push16(1000));
    }
}
