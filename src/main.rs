//! specforge CLI binary
//!
//! All logic is in the library; main.rs only invokes `cli::run()`.

fn main() {
    if let Err(code) = specforge::cli::run() {
        std::process::exit(code.as_i32());
    }
}
