//! Random backend passwords.
use rand::Rng;
use rand::seq::SliceRandom;

pub const SECRET_LEN: usize = 32;
const DIGITS: usize = 10;

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const NUMERIC: &[u8] = b"0123456789";
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// 32 characters: exactly 10 digits, the rest mixed-case letters, no symbols.
/// Repeated characters are allowed.
pub fn generate_secret() -> String {
    let mut rng = rand::thread_rng();
    let mut out: Vec<u8> = Vec::with_capacity(SECRET_LEN);

    out.push(LOWER[rng.gen_range(0..LOWER.len())]);
    out.push(UPPER[rng.gen_range(0..UPPER.len())]);
    for _ in 0..DIGITS {
        out.push(NUMERIC[rng.gen_range(0..NUMERIC.len())]);
    }
    while out.len() < SECRET_LEN {
        out.push(LETTERS[rng.gen_range(0..LETTERS.len())]);
    }
    out.shuffle(&mut rng);

    out.into_iter().map(char::from).collect()
}
