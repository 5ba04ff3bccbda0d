//! CLI command handlers.

mod search;
mod seed;

pub use search::{run_init_command, run_search_command, run_show_command};
pub use seed::run_seed_command;
