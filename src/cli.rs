//! CLI domain: parse, route, output, and presentation only.
//! No restore logic; the run context hands a resolved configuration to the engine.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::Cli;
pub use presentation::format_report;
pub use route::RunContext;
