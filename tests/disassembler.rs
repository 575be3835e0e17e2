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
use embedvm::globals::{GlobalTable, Kind, ViewDecl};
use embedvm::il::{Compiler, Parser};
use embedvm::ll::disasm;
use embedvm::ll::program::{Block, CodeBlock, Program};
use embedvm::userfn::UserFnTable;

#[test]
fn disassembling_a_compiled_program_recovers_every_instruction() {
    let decls = vec![ViewDecl::scalar("counter", Kind::Int8Unsigned)];
    let globals = GlobalTable::build(&decls).unwrap();
    let userfns = UserFnTable::new();
    let ast = Parser::new("def main() { gv.counter = gv.counter + 1; return gv.counter; }")
        .parse()
        .unwrap();

    let mut compiled = Program::new();
    Compiler::new(&globals, &userfns).compile(&ast, &mut compiled).unwrap();
    compiled.fix_all().unwrap();
    let entry = compiled.entry_point();
    let bytes = compiled.to_binary().unwrap();

    let disassembled = disasm::disassemble(&bytes, &[entry]);

    let mut decoded_byte_count = 0;
    for block in disassembled.blocks() {
        if let Block::Code(CodeBlock::Fixed(f)) = block {
            decoded_byte_count += f.to_binary().unwrap().len();
        }
    }
    assert!(decoded_byte_count > 0);
}

#[test]
fn bytes_outside_any_reachable_walk_become_a_data_block() {
    // A single `Return0` at offset 0, followed by bytes no walk from
    // entry point 0 ever reaches.
    let bytes = vec![0x9c, 0xaa, 0xbb, 0xcc];
    let program = disasm::disassemble(&bytes, &[0]);
    let has_data = program
        .blocks()
        .iter()
        .any(|b| matches!(b, Block::Data(d) if !d.bytes().is_empty()));
    assert!(has_data);
}
