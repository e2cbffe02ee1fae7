use md5::{Digest, Md5};

/// MD5 digest of `text`, rendered as 32 lowercase hex characters.
///
/// Used to derive stable cache keys (for example for synthesized spoken
/// instructions). Not suitable for anything security related.
pub fn md5_hex(text: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
