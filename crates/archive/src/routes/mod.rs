pub mod catalog;
pub mod history;

pub use catalog::*;
pub use history::*;
