pub mod machine;
mod nibble;

pub use machine::*;
pub use nibble::u4;
