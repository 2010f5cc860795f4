#![allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]

pub mod backend;
pub mod config;
mod console;
pub mod cpu;
pub mod field;
pub mod pointer;
pub mod simulation;
pub mod solver;
pub mod splash_cursor;
pub mod splat;
pub mod webgl;

use wasm_bindgen::prelude::*;

pub use backend::{Backend, Display, Pass};
pub use config::{ColorMode, SimulationConfig};
pub use simulation::Simulation;
pub use splash_cursor::{SplashCursor, SplashOptions};

/// Runs when the module is instantiated.
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    console::init(log::LevelFilter::Info);
}

/// Changes how much the simulation logs to the browser console.
#[wasm_bindgen]
pub fn set_log_level(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    console::init(level);
}
