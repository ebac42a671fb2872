mod args;
mod commands;

pub use args::{Cli, Command, GlobalArgs};
pub use commands::run;
