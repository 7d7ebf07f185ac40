use std::process;
#[macro_use]
extern crate log;

mod cli;
mod features;

fn main() {
    env_logger::init();
    if let Err(e) = cli::run() {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
