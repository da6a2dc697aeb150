pub mod engine;
pub mod matcher;

pub use engine::*;
pub use matcher::*;
