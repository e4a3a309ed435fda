pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Export, Keygen, Normalize, Version};
