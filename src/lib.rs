pub mod alias;
pub mod config;
pub mod eth;
pub mod ext;
pub mod globals;
pub mod infra;
pub mod utils;

pub use globals::GlobalServices;
pub use globals::GlobalState;
