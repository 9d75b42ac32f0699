pub mod launch;
pub mod paths;
pub mod setup;

pub use launch::{report_failure, run_launch};
pub use paths::print_package_paths;
pub use setup::print_setup_instructions;
