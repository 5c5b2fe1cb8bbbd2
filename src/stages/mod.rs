pub mod batch;
pub mod stage1_chunk;
pub mod stage2_summarize;
pub mod stage3_unify;

pub use batch::*;
pub use stage1_chunk::*;
pub use stage2_summarize::*;
pub use stage3_unify::*;
