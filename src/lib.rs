pub mod cli;
pub mod config;
pub mod database;
pub mod jalali;
pub mod models;
pub mod repeat;
pub mod utils;

pub use config::Config;
pub use database::Database;
pub use jalali::JalaliDate;
pub use models::{Priority, Profile, Task};
pub use repeat::RepeatOutcome;
pub use utils::RunMode;
