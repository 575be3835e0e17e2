/// The instruction codec: encoding and decoding of individual EmbedVM
/// bytecode instructions, and the sign-extension helpers the codec and
/// the block engine both rely on.
pub mod instruction;
/// Labels, label references, and the two block kinds (`FreeBlock` and
/// `FixedBlock`) that carry the fix/unfix relaxation engine.
pub mod block;
/// The program model: an ordered sequence of blocks, entry-point
/// selection, and whole-program fix/unfix/to_binary operations.
pub mod program;
/// Textual assembly: parsing and printing the human-readable form of
/// a `Program`.
pub mod textasm;
/// Worklist disassembly of a raw binary image back into a `Program`.
pub mod disasm;

pub use instruction::Instruction;
pub use block::{Label, LabelRef, FreeBlock, FixedBlock, DataBlock};
pub use program::Program;
