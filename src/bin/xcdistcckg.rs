//! Generates a server keypair. The public half goes into client config
//! files; the private half into the daemon's environment.

use xcdistcc::crypto::generate_keypair;

fn main() {
    let pair = generate_keypair();
    println!("public: {}", pair.public);
    println!("private: {}", pair.private.to_hex());
}
