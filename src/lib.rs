#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod dates;
pub mod extract;
pub mod fetch;
pub mod logging;
pub mod model;
pub mod paginate;
pub mod pipeline;
pub mod render;
pub mod retrieve;
