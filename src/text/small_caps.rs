//! Unicode small-caps conversion.
//!
//! Letters map to their small-caps code points regardless of case. `s` and `x`
//! have no small-caps form and map to their plain lowercase letter. Anything
//! that is not an ASCII letter passes through unchanged.
//!
//! ```
//! use warpfx::text::small_caps::to_small_caps;
//! assert_eq!(to_small_caps("Hello World"), "ʜᴇʟʟᴏ ᴡᴏʀʟᴅ");
//! ```

/// Map a single character to its small-caps form.
pub fn small_caps_char(c: char) -> char {
    match c.to_ascii_lowercase() {
        'a' => 'ᴀ',
        'b' => 'ʙ',
        'c' => 'ᴄ',
        'd' => 'ᴅ',
        'e' => 'ᴇ',
        'f' => 'ғ',
        'g' => 'ɢ',
        'h' => 'ʜ',
        'i' => 'ɪ',
        'j' => 'ᴊ',
        'k' => 'ᴋ',
        'l' => 'ʟ',
        'm' => 'ᴍ',
        'n' => 'ɴ',
        'o' => 'ᴏ',
        'p' => 'ᴘ',
        'q' => 'ǫ',
        'r' => 'ʀ',
        's' => 's', // no small-caps variant
        't' => 'ᴛ',
        'u' => 'ᴜ',
        'v' => 'ᴠ',
        'w' => 'ᴡ',
        'x' => 'x', // no small-caps variant
        'y' => 'ʏ',
        'z' => 'ᴢ',
        _ => c,
    }
}

/// Convert a whole string to small caps.
pub fn to_small_caps(text: &str) -> String {
    text.chars().map(small_caps_char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_mixed_case() {
        assert_eq!(to_small_caps("Hello World"), "ʜᴇʟʟᴏ ᴡᴏʀʟᴅ");
        assert_eq!(to_small_caps("WARPING"), "ᴡᴀʀᴘɪɴɢ");
    }

    #[test]
    fn s_and_x_stay_plain_lowercase() {
        assert_eq!(to_small_caps("s"), "s");
        assert_eq!(to_small_caps("S"), "s");
        assert_eq!(to_small_caps("x"), "x");
        assert_eq!(to_small_caps("X"), "x");
    }

    #[test]
    fn every_other_letter_gets_a_distinct_code_point() {
        let mut seen = std::collections::HashSet::new();
        for c in ('a'..='z').filter(|c| *c != 's' && *c != 'x') {
            let mapped = small_caps_char(c);
            assert_ne!(mapped, c, "{c} should not map to itself");
            assert!(seen.insert(mapped), "{c} collides with another letter");
            assert_eq!(small_caps_char(c.to_ascii_uppercase()), mapped);
        }
    }

    #[test]
    fn non_letters_pass_through() {
        assert_eq!(to_small_caps("42 <#fff> é!"), "42 <#ғғғ> é!");
        assert_eq!(to_small_caps(""), "");
    }
}
