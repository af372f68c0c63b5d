#[macro_use]
mod error;
pub use error::{AnyError, AnyResult};

pub mod app;
pub mod config;
pub mod ids;
pub mod participant;
pub mod registry;
pub mod route;
pub mod snapshot;
pub mod transaction;

use figlet_rs::FIGfont;

pub fn print_logo() {
    let standard_font = FIGfont::standard().unwrap();
    if let Some(figure) = standard_font.convert("Dispatch") {
        println!("{}", figure);
    }
}
