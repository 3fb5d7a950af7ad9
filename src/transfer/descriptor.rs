//! Transfer descriptor helpers.

/// Whether `descriptor` is a magnet link.
pub fn is_magnet(descriptor: &str) -> bool {
    descriptor.starts_with("magnet:?")
}

/// Turn a bare BitTorrent info hash (40 hex or 32 base32 characters) into
/// a magnet link. Anything else is returned trimmed but otherwise as is.
pub fn normalize_descriptor(descriptor: &str) -> String {
    let descriptor = descriptor.trim();
    let is_hex_hash = descriptor.len() == 40 && descriptor.chars().all(|c| c.is_ascii_hexdigit());
    let is_base32_hash = descriptor.len() == 32
        && descriptor
            .chars()
            .all(|c| matches!(c.to_ascii_uppercase(), 'A'..='Z' | '2'..='7'));

    if is_hex_hash || is_base32_hash {
        format!("magnet:?xt=urn:btih:{}", descriptor)
    } else {
        descriptor.to_string()
    }
}

/// Append `tr=` announce parameters for `trackers` to a magnet link.
///
/// Trackers already present are not duplicated. Other descriptors are
/// returned unchanged.
///
/// ```
/// use seedstream::transfer::with_trackers;
///
/// let magnet = with_trackers(
///     "magnet:?xt=urn:btih:abc",
///     &["udp://tracker.example:1337/announce".to_string()],
/// );
/// assert_eq!(
///     magnet,
///     "magnet:?xt=urn:btih:abc&tr=udp%3A%2F%2Ftracker.example%3A1337%2Fannounce"
/// );
/// ```
pub fn with_trackers(descriptor: &str, trackers: &[String]) -> String {
    if !is_magnet(descriptor) {
        return descriptor.to_string();
    }

    let mut out = descriptor.to_string();
    for tracker in trackers {
        let param = format!("tr={}", urlencoding::encode(tracker));
        let already = out
            .split(['?', '&'])
            .any(|p| p == param || p == format!("tr={}", tracker));
        if !already {
            out.push('&');
            out.push_str(&param);
        }
    }
    out
}
