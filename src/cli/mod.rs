//! CLI subcommand implementations for the forager binary.

pub mod doctor;
pub mod fetch_cmd;
