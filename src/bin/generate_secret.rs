//! Prints a random value suitable for `JWT_SECRET`.

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

const SECRET_LEN: usize = 64;

fn generate_secret(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn main() {
    println!("{}", generate_secret(SECRET_LEN));
    eprintln!("Add this to your environment as JWT_SECRET");
}
