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
use std::error::Error;
use std::fs;

use clap::{arg, Arg, ArgMatches, Command};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use embedvm::globals::GlobalTable;
use embedvm::il::{Compiler, Parser};
use embedvm::ll::disasm;
use embedvm::ll::program::Program as LlProgram;
use embedvm::ll::textasm;
use embedvm::userfn::UserFnTable;
use embedvm::util::{FromHexString, ToHexString};

fn main() -> Result<(), Box<dyn Error>> {
    let matches = Command::new("embedvm")
        .about("EmbedVM Tool")
        .version("0.1.0")
        .subcommand_required(true)
        .arg(arg!(--verbose "Show verbose output"))
        .subcommand(
            Command::new("compile")
                .about("Compile an EmbedVM source file to bytecode")
                .arg(Arg::new("file").required(true))
                .visible_alias("c"),
        )
        .subcommand(
            Command::new("disassemble")
                .about("Disassemble a raw hex string into textual assembly")
                .arg(Arg::new("code").short('c').long("code"))
                .arg(Arg::new("target").required(true))
                .visible_alias("d"),
        )
        .subcommand(
            Command::new("assemble")
                .about("Assemble a textual listing into a raw hex string")
                .arg(Arg::new("target").required(true))
                .visible_alias("a"),
        )
        .get_matches();
    let verbose = matches.is_present("verbose");
    if verbose {
        init_logging(LevelFilter::Info);
    } else {
        init_logging(LevelFilter::Warn);
    }
    let ok = match matches.subcommand() {
        Some(("assemble", args)) => assemble(args),
        Some(("compile", args)) => compile(args),
        Some(("disassemble", args)) => disassemble(args),
        _ => unreachable!(),
    }?;
    let exitcode = if ok { 0 } else { 1 };
    std::process::exit(exitcode);
}

/// Compile a given source file into a raw hex image.
///
/// Global memory views and user-function callouts are not declared in
/// source syntax (the host registers them, same as the original's
/// `Globals`/`_UserfuncWrapper` setup); `userfn NAME = id;` source
/// declarations supply the callout table, and a program with no `gv.`
/// accesses needs no globals at all.
fn compile(args: &ArgMatches) -> Result<bool, Box<dyn Error>> {
    let filename = args.get_one::<String>("file").unwrap();
    let input = fs::read_to_string(filename)?;
    let mut parser = Parser::new(&input);
    let program = parser.parse()?;

    let mut userfns = UserFnTable::new();
    for decl in &program.userfns {
        userfns.register(&decl.name, decl.id)?;
    }
    let globals = GlobalTable::build(&[])?;

    let mut ll = LlProgram::new();
    Compiler::new(&globals, &userfns).compile(&program, &mut ll)?;
    ll.fix_all()?;
    let bytes = ll.to_binary()?;
    println!("{}", bytes.to_hex_string());
    Ok(true)
}

/// Disassemble a raw bytecode image into textual assembly.
fn disassemble(args: &ArgMatches) -> Result<bool, Box<dyn Error>> {
    let mut hex = String::new();
    let target = args.get_one::<String>("target").unwrap();
    if args.contains_id("code") {
        hex.push_str(target);
    } else {
        let context = fs::read_to_string(target)?;
        for l in context.lines() {
            hex.push_str(l);
        }
    }
    let bytes = hex.from_hex_string()?;
    let program = disasm::disassemble(&bytes, &[0]);
    for block in program.blocks() {
        match block {
            embedvm::ll::program::Block::Data(d) => {
                print!("{}", textasm::print_data_block(None, d));
            }
            embedvm::ll::program::Block::Code(embedvm::ll::program::CodeBlock::Fixed(f)) => {
                print!("{}", textasm::print_free_block(&f.unfixed_code(&mut 0)));
            }
            embedvm::ll::program::Block::Code(embedvm::ll::program::CodeBlock::Free(f)) => {
                print!("{}", textasm::print_free_block(f));
            }
        }
    }
    Ok(true)
}

/// Assemble a textual listing (as produced by `disassemble`) back into
/// a raw hex image.
fn assemble(args: &ArgMatches) -> Result<bool, Box<dyn Error>> {
    let target = args.get_one::<String>("target").unwrap();
    let context = fs::read_to_string(target)?;
    let block = textasm::parse_free_block(&context)?;
    let mut ll = LlProgram::new();
    ll.push_code(block);
    ll.fix_all()?;
    let bytes = ll.to_binary()?;
    println!("{}", bytes.to_hex_string());
    Ok(true)
}

/// Initialise logging using a suitable pattern.
pub fn init_logging(level: LevelFilter) {
    let encoder = PatternEncoder::new("[{l}] {m}{n}");
    let stdout = ConsoleAppender::builder().encoder(Box::new(encoder)).build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .unwrap();
    let _handle = log4rs::init_config(config).unwrap();
}
