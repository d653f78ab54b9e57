//! Shared-secret generator for the knock protocol.
//!
//! Prints a fresh 32-byte hex key for `GHOST_SECRET_KEY`. Distribute it
//! to the server and every authorized client over a secure channel.

use sentinyl_core::knock::generate_shared_secret;

fn main() {
    let key = generate_shared_secret();
    println!("{key}");
    eprintln!();
    eprintln!("Export on the server and each client:");
    eprintln!("  export GHOST_SECRET_KEY={key}");
}
