use std::env;
use std::process;

use tinix::{Kernel, Shell};

fn main() {
    env_logger::init();

    let image = env::args().nth(1).unwrap_or_else(|| "disk.img".to_string());

    let kernel = match Kernel::boot(&image) {
        Ok(kernel) => kernel,
        Err(e) => {
            eprintln!("Boot failed: {}", e);
            process::exit(1);
        }
    };

    Shell::new(kernel).run();
}
