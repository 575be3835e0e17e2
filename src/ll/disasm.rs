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
// Worklist disassembly: starting from a set of entry offsets, decode
// reachable instructions, following branch targets, until every walk
// dies on an unconditional jump, a return, or already-visited ground.
// Bytes nothing claims become data blocks.
use crate::ll::block::{DataBlock, FixedBlock};
use crate::ll::instruction::Instruction;
use crate::ll::program::{Block, CodeBlock, Program};
use std::collections::{BTreeMap, HashSet, VecDeque};

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

/// A walk stops (does not fall through to the next instruction) on an
/// unconditional jump, a return, or an indirect jump through the
/// stack (whose target is not statically known).
fn terminates_walk(insn: &Instruction) -> bool {
    matches!(
        insn,
        Instruction::JumpRel1(_)
            | Instruction::JumpRel2(_)
            | Instruction::Return
            | Instruction::Return0
            | Instruction::JumpToAddress
    )
}

/// Disassemble `bytes` starting from `entry_points`, producing a
/// `Program` of alternating `FixedBlock`s (claimed, decoded runs) and
/// `DataBlock`s (everything no walk reached).
pub fn disassemble(bytes: &[u8], entry_points: &[u16]) -> Program {
    let n = bytes.len();
    let mut claimed = vec![false; n];
    let mut decoded: BTreeMap<u16, Instruction> = BTreeMap::new();
    let mut visited: HashSet<u16> = HashSet::new();
    let mut worklist: VecDeque<u16> = entry_points.iter().copied().collect();

    while let Some(start) = worklist.pop_front() {
        let mut pos = start;
        loop {
            if pos as usize >= n || visited.contains(&pos) {
                break;
            }
            visited.insert(pos);
            let (insn, len) = match Instruction::decode(&bytes[pos as usize..]) {
                Ok(v) => v,
                Err(_) => break,
            };
            for i in 0..len {
                claimed[pos as usize + i] = true;
            }
            if let Some(reladdr) = reladdr_of(&insn) {
                let target = (pos as i32 + reladdr) as u16;
                if !visited.contains(&target) {
                    worklist.push_back(target);
                }
            }
            let stop = terminates_walk(&insn);
            decoded.insert(pos, insn);
            pos += len as u16;
            if stop {
                break;
            }
        }
    }

    let mut program = Program::new();
    let mut i = 0usize;
    while i < n {
        if claimed[i] {
            let run_start = i as u16;
            let mut instructions = Vec::new();
            while i < n && claimed[i] {
                let pos = i as u16;
                if let Some(insn) = decoded.get(&pos) {
                    let len = insn.length();
                    instructions.push((pos, insn.clone()));
                    i += len;
                } else {
                    // A claimed byte with no decoded instruction start
                    // (an operand byte) — should not happen given the
                    // walk above always claims whole instructions.
                    i += 1;
                }
            }
            let _ = run_start;
            program.push_code_fixed(FixedBlock::from_instructions(instructions));
        } else {
            let start = i;
            while i < n && !claimed[i] {
                i += 1;
            }
            program.push_data(DataBlock::new(bytes[start..i].to_vec()));
        }
    }
    program
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disassemble_push_immediate_zero() {
        let program = disassemble(&[0x90], &[0]);
        let blocks = program.blocks();
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            Block::Code(CodeBlock::Fixed(f)) => {
                assert_eq!(f.instructions(), &[(0, Instruction::PushImmediate(0))]);
            }
            _ => panic!("expected a fixed code block"),
        }
    }

    #[test]
    fn disassemble_push_immediate_negative_one() {
        let program = disassemble(&[0x97], &[0]);
        match &program.blocks()[0] {
            Block::Code(CodeBlock::Fixed(f)) => {
                assert_eq!(f.instructions(), &[(0, Instruction::PushImmediate(-1))]);
            }
            _ => panic!("expected a fixed code block"),
        }
    }

    #[test]
    fn unclaimed_bytes_become_data() {
        // 0x9b = Return (1 byte, terminates the walk); the trailing
        // byte is never visited and becomes a DataBlock.
        let program = disassemble(&[0x9b, 0xff], &[0]);
        assert_eq!(program.blocks().len(), 2);
        match &program.blocks()[1] {
            Block::Data(d) => assert_eq!(d.bytes(), &[0xff]),
            _ => panic!("expected a data block"),
        }
    }
}
