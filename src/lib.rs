#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;

pub mod app;
pub mod cli;
pub mod components;
pub mod grid;
pub mod io;
pub mod learning;
pub mod ops;
pub mod prompt;
pub mod provider;
pub mod puzzle;
pub mod session;
pub mod settings;
pub mod timer;
