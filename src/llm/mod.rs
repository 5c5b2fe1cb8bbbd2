pub mod client;
pub mod parser;
pub mod prompts;
#[cfg(test)]
pub mod testing;

pub use client::*;
pub use parser::*;
pub use prompts::*;
