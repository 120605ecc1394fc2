//! Random password generation.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const UPPERCASE_UNAMBIGUOUS: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const LOWERCASE_UNAMBIGUOUS: &str = "abcdefghjkmnpqrstuvwxyz";
const DIGITS: &str = "0123456789";
const DIGITS_UNAMBIGUOUS: &str = "23456789";
const SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";
const FALLBACK: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const WORDS: &[&str] = &[
    "apple", "banana", "cherry", "dragon", "eagle", "forest", "galaxy", "harbor",
    "island", "jungle", "kitchen", "lemon", "mountain", "november", "ocean", "planet",
    "queen", "river", "sunset", "thunder", "umbrella", "valley", "whisper", "yellow",
    "zebra", "anchor", "bridge", "castle", "diamond", "engine", "falcon", "garden",
    "helmet", "igloo", "jacket", "koala", "lantern", "marble", "ninja", "orange",
    "penguin", "quartz", "rocket", "silver", "tiger", "unicorn", "violet", "winter",
];

/// Character classes and length for [`generate_password`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorOptions {
    pub length: usize,
    pub uppercase: bool,
    pub lowercase: bool,
    pub numbers: bool,
    pub symbols: bool,
    /// Drop look-alike characters such as `l`, `1`, `I`, `O` and `0`.
    pub exclude_ambiguous: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            length: 20,
            uppercase: true,
            lowercase: true,
            numbers: true,
            symbols: true,
            exclude_ambiguous: false,
        }
    }
}

impl GeneratorOptions {
    fn charset(&self) -> Vec<char> {
        let pick = |full: &'static str, unambiguous: &'static str| {
            if self.exclude_ambiguous {
                unambiguous
            } else {
                full
            }
        };

        let mut charset = String::new();
        if self.uppercase {
            charset.push_str(pick(UPPERCASE, UPPERCASE_UNAMBIGUOUS));
        }
        if self.lowercase {
            charset.push_str(pick(LOWERCASE, LOWERCASE_UNAMBIGUOUS));
        }
        if self.numbers {
            charset.push_str(pick(DIGITS, DIGITS_UNAMBIGUOUS));
        }
        if self.symbols {
            charset.push_str(SYMBOLS);
        }
        if charset.is_empty() {
            charset.push_str(FALLBACK);
        }
        charset.chars().collect()
    }
}

/// Generate a random password drawn uniformly from the selected classes.
pub fn generate_password(options: &GeneratorOptions) -> Zeroizing<String> {
    let charset = options.charset();
    let mut rng = rand::thread_rng();

    let password = (0..options.length)
        .map(|_| charset[rng.gen_range(0..charset.len())])
        .collect();
    Zeroizing::new(password)
}

/// Generate a passphrase of capitalised words joined by `-`.
pub fn generate_memorable(word_count: usize) -> Zeroizing<String> {
    let mut rng = rand::thread_rng();

    let words: Vec<String> = (0..word_count)
        .filter_map(|_| WORDS.choose(&mut rng))
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    Zeroizing::new(words.join("-"))
}

/// Generate a numeric PIN.
pub fn generate_pin(length: usize) -> Zeroizing<String> {
    let mut rng = rand::thread_rng();
    let pin = (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect();
    Zeroizing::new(pin)
}
