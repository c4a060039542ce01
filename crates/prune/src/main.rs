#![deny(clippy::all)]

use std::process;

fn main() {
    process::exit(prune_lib::main())
}
