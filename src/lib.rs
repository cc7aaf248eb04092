pub mod config;
pub mod detect;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod history;
pub mod notify;
pub mod process;
pub mod render;
pub mod run;
pub mod table;
