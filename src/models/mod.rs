pub mod record;
pub mod subtitle;

pub use record::*;
pub use subtitle::*;
