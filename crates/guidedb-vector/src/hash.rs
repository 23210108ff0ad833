/// Hash of the text an item's vectors are computed from.
///
/// Title and content are separated by a unit separator so that moving text
/// between the two changes the hash.
pub fn content_hash(title: &str, content: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(title.as_bytes());
    hasher.update(&[0x1f]);
    hasher.update(content.as_bytes());
    hasher.finalize().to_hex().to_string()
}
