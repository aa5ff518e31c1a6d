//! Destination sequence number arithmetic
//!
//! Sequence numbers wrap; `a` is fresher than `b` when the signed distance
//! from `b` to `a` is positive.

/// Whether `a` is strictly fresher than `b`
pub fn is_fresher(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

/// The fresher of two sequence numbers
pub fn freshest(a: u32, b: u32) -> u32 {
    if is_fresher(b, a) { b } else { a }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ordering() {
        assert!(is_fresher(5, 3));
        assert!(!is_fresher(3, 5));
        assert!(!is_fresher(4, 4));
        assert_eq!(freshest(3, 5), 5);
    }

    #[test]
    fn test_wraparound() {
        assert!(is_fresher(2, u32::MAX - 1));
        assert_eq!(freshest(u32::MAX, 1), 1);
    }
}
