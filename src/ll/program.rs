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
use crate::ll::block::{BlockKind, DataBlock, FixError, FixedBlock, FreeBlock};
use crate::ll::instruction;
use std::fmt;

#[derive(Debug)]
pub enum ProgramError {
    Fix(FixError),
    Codec(instruction::Error),
    /// `to_binary` was called while a code block is still free.
    NotAssembled,
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProgramError::Fix(e) => write!(f, "{}", e),
            ProgramError::Codec(e) => write!(f, "{}", e),
            ProgramError::NotAssembled => write!(f, "program has unfixed code blocks"),
        }
    }
}

impl std::error::Error for ProgramError {}

impl From<FixError> for ProgramError {
    fn from(e: FixError) -> Self {
        ProgramError::Fix(e)
    }
}

impl From<instruction::Error> for ProgramError {
    fn from(e: instruction::Error) -> Self {
        ProgramError::Codec(e)
    }
}

/// A code block in either representation.
#[derive(Debug, Clone)]
pub enum CodeBlock {
    Free(FreeBlock),
    Fixed(FixedBlock),
}

/// One member of a `Program`'s ordered block list.
#[derive(Debug, Clone)]
pub enum Block {
    Code(CodeBlock),
    Data(DataBlock),
}

/// An ordered list of code and data blocks. A program is *assembled*
/// once every code block is `Fixed`; the byte image is then the
/// concatenation of each block's bytes in order.
#[derive(Debug, Clone, Default)]
pub struct Program {
    blocks: Vec<Block>,
    /// Running label-id counter shared across `unfix_all` calls, so
    /// synthesized labels stay unique program-wide.
    next_label: usize,
}

impl Program {
    pub fn new() -> Self {
        Program { blocks: Vec::new(), next_label: 0 }
    }

    pub fn with_label_base(next_label: usize) -> Self {
        Program { blocks: Vec::new(), next_label }
    }

    pub fn push_code(&mut self, block: FreeBlock) {
        self.blocks.push(Block::Code(CodeBlock::Free(block)));
    }

    pub fn push_data(&mut self, block: DataBlock) {
        self.blocks.push(Block::Data(block));
    }

    /// Append an already-fixed code block, as produced by the
    /// disassembler.
    pub fn push_code_fixed(&mut self, block: FixedBlock) {
        self.blocks.push(Block::Code(CodeBlock::Fixed(block)));
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Allocate a program-wide unique label id (used by the compiler
    /// when lowering control flow).
    pub fn fresh_label(&mut self) -> usize {
        let id = self.next_label;
        self.next_label += 1;
        id
    }

    /// Replace every free code block, in order, with its fixed form.
    /// Each block's start address is the cumulative length of every
    /// block preceding it, so a block's internal relative addresses
    /// depend only on its own content, never on later blocks.
    pub fn fix_all(&mut self) -> Result<(), FixError> {
        let mut offset: u16 = 0;
        for block in &mut self.blocks {
            match block {
                Block::Data(d) => offset += d.len() as u16,
                Block::Code(code) => {
                    if let CodeBlock::Free(free) = code {
                        let fixed = free.fixed_code(offset)?;
                        *code = CodeBlock::Fixed(fixed);
                    }
                    if let CodeBlock::Fixed(f) = code {
                        offset = f.length();
                    }
                }
            }
        }
        Ok(())
    }

    /// Replace every fixed code block with its un-fixed (symbolic)
    /// form. Data blocks are untouched.
    pub fn unfix_all(&mut self) {
        for block in &mut self.blocks {
            if let Block::Code(code) = block {
                if let CodeBlock::Fixed(fixed) = code {
                    let free = fixed.unfixed_code(&mut self.next_label);
                    *code = CodeBlock::Free(free);
                }
            }
        }
    }

    /// Concatenate every block's bytes into the final image. Every
    /// code block must already be `Fixed`.
    pub fn to_binary(&self) -> Result<Vec<u8>, ProgramError> {
        let mut bytes = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Data(d) => bytes.extend_from_slice(d.bytes()),
                Block::Code(CodeBlock::Fixed(f)) => bytes.extend(f.to_binary()?),
                Block::Code(CodeBlock::Free(_)) => return Err(ProgramError::NotAssembled),
            }
        }
        Ok(bytes)
    }

    /// Entry point for execution: the offset exported as `main` by
    /// any fixed code block, or `0` if no such export exists.
    pub fn entry_point(&self) -> u16 {
        for block in &self.blocks {
            if let Block::Code(CodeBlock::Fixed(f)) = block {
                if let Some((pos, BlockKind::Code)) = f.exports().get("main") {
                    return *pos;
                }
            }
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ll::block::Label;
    use crate::ll::instruction::{Instruction, LabelTarget};

    #[test]
    fn fix_all_then_to_binary() {
        let mut program = Program::new();
        let mut func = FreeBlock::new();
        func.push_label(Label::exported(0, "main"));
        func.push(Instruction::PushConstantV(5));
        func.push(Instruction::Return);
        program.push_code(func);

        program.fix_all().unwrap();
        let bytes = program.to_binary().unwrap();
        assert_eq!(bytes, vec![0x95, 0x9b]);
        assert_eq!(program.entry_point(), 0);
    }

    #[test]
    fn unfix_then_fix_round_trip() {
        let mut program = Program::new();
        let mut func = FreeBlock::new();
        func.push_label(Label::exported(0, "main"));
        func.push(Instruction::PushConstantV(1000));
        func.push(Instruction::JumpV(LabelTarget(1)));
        func.push(Instruction::DropValue);
        func.push_label(Label::new(1));
        func.push(Instruction::Return0);
        program.push_code(func);
        program.fix_all().unwrap();
        let before = program.to_binary().unwrap();

        program.unfix_all();
        program.fix_all().unwrap();
        let after = program.to_binary().unwrap();
        assert_eq!(before, after);
    }
}
