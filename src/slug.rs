use regex::Regex;

lazy_static::lazy_static! {
    /// Anything that is not an ASCII letter, digit, whitespace or separator
    static ref DISALLOWED: Regex = Regex::new(r"[^-a-z0-9\s]+").unwrap();
    /// Runs of separators and whitespace
    static ref SEPARATORS: Regex = Regex::new(r"[-\s]+").unwrap();
}

/// Derive a URL slug from a display name.
///
/// The name is transliterated to ASCII first, so "Crème Brûlée" becomes
/// `creme-brulee`. `@` reads as "at", underscores count as separators,
/// punctuation is dropped, and every run of whitespace or dashes becomes a
/// single `-`.
pub fn slugify(name: &str) -> String {
    let ascii = deunicode::deunicode(&name.replace('@', " at "));
    let lowered = ascii.to_lowercase().replace('_', "-");
    let stripped = DISALLOWED.replace_all(&lowered, "");
    SEPARATORS
        .replace_all(&stripped, "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    lazy_static::lazy_static! {
        static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
    }

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello World"), "hello-world");
    }

    #[test]
    fn test_slugify_drops_punctuation() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("It's 2024: a recap"), "its-2024-a-recap");
    }

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("  rust -- async__io  "), "rust-async-io");
        assert_eq!(slugify("a\t\nb"), "a-b");
    }

    #[test]
    fn test_slugify_transliterates_to_ascii() {
        assert_eq!(slugify("Crème Brûlée"), "creme-brulee");
        assert_eq!(slugify("Straße in München"), "strasse-in-munchen");
    }

    #[test]
    fn test_slugify_spells_out_at_sign() {
        assert_eq!(slugify("Ping @ home"), "ping-at-home");
        assert_eq!(slugify("Meet@Noon"), "meet-at-noon");
    }

    #[test]
    fn test_slugify_output_is_url_safe() {
        for name in ["Crème Brûlée", "Ünïcödé Tïtlé", "Rust & Go: 2024!", "Café @ Night"] {
            let slug = slugify(name);
            assert!(SLUG_REGEX.is_match(&slug), "{name} -> {slug}");
        }
    }

    #[test]
    fn test_slugify_empty_when_nothing_usable() {
        assert_eq!(slugify("!!!"), "");
    }
}
