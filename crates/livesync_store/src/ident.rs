//! Document id generation.
//!
//! Ids are short strings over an alphabet without visually ambiguous
//! characters. A client predicting an id for an optimistic insert and the
//! server verifying it both derive the same [`SeededIdStream`] from
//! `(random_seed, "/collection/<name>")`, so a matching prediction can be
//! accepted without a round trip.

use rand::Rng;
use sha2::{Digest, Sha256};

/// Alphabet for generated ids; excludes `0O1lIi` style lookalikes.
pub const ID_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTWXYZabcdefghijkmnopqrstuvwxyz";

/// Length of generated document ids.
pub const DOCUMENT_ID_LENGTH: usize = 17;

/// Length of client-supplied random seeds.
pub const SEED_LENGTH: usize = 20;

/// Generates a random id of the given length.
pub fn random_id(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// A deterministic id stream seeded from a sequence of strings.
///
/// The stream hashes the seed parts once, then draws ids from a sha256
/// counter stream over that state. The same parts in the same order always
/// produce the same ids.
pub struct SeededIdStream {
    state: [u8; 32],
    counter: u64,
}

impl SeededIdStream {
    /// Creates a stream seeded from the given parts.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_ref().as_bytes());
            // Separator keeps ("ab","c") distinct from ("a","bc").
            hasher.update([0u8]);
        }
        Self {
            state: hasher.finalize().into(),
            counter: 0,
        }
    }

    /// Draws the next id of the given length from the stream.
    pub fn id(&mut self, length: usize) -> String {
        let mut out = String::with_capacity(length);
        while out.len() < length {
            let mut hasher = Sha256::new();
            hasher.update(self.state);
            hasher.update(self.counter.to_le_bytes());
            self.counter += 1;
            for byte in hasher.finalize() {
                if out.len() == length {
                    break;
                }
                out.push(ID_ALPHABET[byte as usize % ID_ALPHABET.len()] as char);
            }
        }
        out
    }
}
