use rand::Rng;
use rand::distr::Uniform;

pub const ALPHA_NUM: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Build a random string of `len` characters picked from `alphabet`.
///
/// Not suitable for secrets, only for things like temp file suffixes.
pub fn pseudorandom_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    match Uniform::new(0, alphabet.len()) {
        Ok(range) => (0..len)
            .map(|_| alphabet[rng.sample(range)] as char)
            .collect(),
        // empty alphabet
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_builds_strings_from_the_alphabet() {
        let s = pseudorandom_string(b"ab", 32);
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c == 'a' || c == 'b'));
    }

    #[test]
    fn it_returns_an_empty_string_for_an_empty_alphabet() {
        assert_eq!(pseudorandom_string(b"", 8), "");
    }
}
