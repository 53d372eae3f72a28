pub mod db;
pub mod routes;
mod startup;
mod stations;
mod utils;

pub use db::*;
pub use routes::*;
pub use startup::*;
pub use stations::*;
pub use utils::*;
