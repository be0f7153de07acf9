pub mod digest;
pub mod time;

pub use digest::*;
pub use time::*;
