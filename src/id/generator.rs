use crate::BatchId;
use chrono::{DateTime, Utc};
use rand::Rng;

/// Characters of the random suffix (lowercase base 36)
const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Suffix length; 36^8 gives roughly 41 bits of entropy per day bucket
pub const SUFFIX_LEN: usize = 8;

/// Generate a fresh batch id for the current UTC date
pub fn generate() -> BatchId {
    generate_at(Utc::now(), &mut rand::thread_rng())
}

/// Generate an id of the form `YYYY-MM-DD-xxxxxxxx`
///
/// The date prefix keeps ids sortable by creation day; the suffix separates
/// batches created on the same day.
pub fn generate_at<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> BatchId {
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    BatchId::from_generated(format!("{}-{}", now.format("%Y-%m-%d"), suffix))
}
