//! CLI command implementations.

mod config;
mod course;
mod doctor;
mod generate;
mod serve;
mod show;

pub use config::run_config;
pub use course::run_course;
pub use doctor::run_doctor;
pub use generate::run_generate;
pub use serve::run_serve;
pub use show::run_show;
