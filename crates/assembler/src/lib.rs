pub mod assembler;
pub mod bitset;
pub mod origin;

pub use assembler::{AssemblerDescriptor, GridAssembler};
pub use origin::Origin;
