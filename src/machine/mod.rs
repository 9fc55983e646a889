mod execute;
mod font;
#[allow(clippy::module_inception)]
mod machine;
mod opcode;
mod runner;
mod types;

pub use font::*;
pub use machine::*;
pub use opcode::*;
pub use runner::*;
pub use types::*;
