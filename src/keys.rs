//! Storage key derivation and short-code generation.

use ring::rand::{SecureRandom, SystemRandom};

/// Prefix under which every uploaded object lives in the bucket.
pub const KEY_NAMESPACE: &str = "filedrop";

pub const SHORT_CODE_LEN: usize = 6;

pub const SHORT_CODE_ALPHABET: &[u8; 62] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Extension of `filename` including the dot, or `""` when there is none.
pub fn file_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) => &filename[idx..],
        None => "",
    }
}

/// Build the object key for a file. The key never contains the client's
/// filename, only its extension.
pub fn derive_storage_key(file_id: &str, filename: &str) -> String {
    format!("{KEY_NAMESPACE}/{file_id}{}", file_extension(filename))
}

#[derive(Debug, thiserror::Error)]
#[error("Secure random source unavailable")]
pub struct RandomUnavailable;

/// Source of candidate short codes. Uniqueness is the caller's job.
pub trait ShortCodeSource: Send + Sync {
    fn next_code(&self) -> Result<String, RandomUnavailable>;
}

/// Draws codes from the system CSPRNG.
pub struct SecureShortCodes {
    rng: SystemRandom,
}

impl SecureShortCodes {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for SecureShortCodes {
    fn default() -> Self {
        Self::new()
    }
}

impl ShortCodeSource for SecureShortCodes {
    fn next_code(&self) -> Result<String, RandomUnavailable> {
        generate_short_code(&self.rng)
    }
}

/// Six symbols drawn independently and uniformly from [`SHORT_CODE_ALPHABET`].
pub fn generate_short_code(rng: &dyn SecureRandom) -> Result<String, RandomUnavailable> {
    // 248 = 4 * 62; bytes at or above it are rejected to keep the draw uniform
    const LIMIT: u8 = 248;

    let mut code = String::with_capacity(SHORT_CODE_LEN);
    let mut buf = [0u8; 16];
    while code.len() < SHORT_CODE_LEN {
        rng.fill(&mut buf).map_err(|_| RandomUnavailable)?;
        for &b in buf.iter().filter(|&&b| b < LIMIT) {
            code.push(SHORT_CODE_ALPHABET[(b % 62) as usize] as char);
            if code.len() == SHORT_CODE_LEN {
                break;
            }
        }
    }
    Ok(code)
}

pub fn is_valid_short_code(code: &str) -> bool {
    code.len() == SHORT_CODE_LEN && code.bytes().all(|b| SHORT_CODE_ALPHABET.contains(&b))
}
