mod error;
pub mod readings;

pub use error::{ApiError, ErrorBody};
pub use readings::*;
