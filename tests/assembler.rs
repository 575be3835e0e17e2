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
use embedvm::ll::block::{FreeBlock, Label};
use embedvm::ll::instruction::{BinOp, Instruction, LabelTarget};
use embedvm::ll::program::Program;
use embedvm::ll::textasm;

#[test]
fn textual_listing_round_trips_through_a_fixed_program() {
    let mut block = FreeBlock::new();
    block.push_label(Label::exported(0, "main"));
    block.push(Instruction::PushImmediate(3));
    block.push(Instruction::PushImmediate(4));
    block.push(Instruction::Binary(BinOp::Add));
    block.push(Instruction::Return);

    let text = textasm::print_free_block(&block);
    let reparsed = textasm::parse_free_block(&text).unwrap();

    let mut program = Program::new();
    program.push_code(reparsed);
    program.fix_all().unwrap();
    let bytes = program.to_binary().unwrap();
    assert!(!bytes.is_empty());
}

#[test]
fn backward_branch_listing_assembles() {
    let mut block = FreeBlock::new();
    block.push_label(Label::exported(0, "main"));
    block.push_label(Label::new(1));
    block.push(Instruction::PushImmediate(1));
    block.push(Instruction::JumpIfNotV(LabelTarget(2)));
    block.push(Instruction::JumpV(LabelTarget(1)));
    block.push_label(Label::new(2));
    block.push(Instruction::Return0);

    let text = textasm::print_free_block(&block);
    let reparsed = textasm::parse_free_block(&text).unwrap();
    let mut program = Program::new();
    program.push_code(reparsed);
    program.fix_all().unwrap();
    assert!(!program.to_binary().unwrap().is_empty());
}
