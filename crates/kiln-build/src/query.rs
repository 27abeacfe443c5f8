//! GraphQL query fingerprinting.
//!
//! Query hashes identify static queries in page data (`staticQueryHashes`),
//! so they must be stable across runs and processes: the query text is first
//! reduced to its significant tokens, then hashed with 32-bit MurmurHash2.

/// Hash a query as a decimal string.
///
/// Queries that differ only in whitespace, commas, or comments hash equally.
#[must_use]
pub fn hash_query(text: &str, seed: u32) -> String {
    murmurhash2(strip_ignored_characters(text).as_bytes(), seed).to_string()
}

/// Remove GraphQL ignored tokens (whitespace, commas, comments).
///
/// A single space is kept between two adjacent tokens that would otherwise
/// merge, and before a spread that follows a name. String and block string
/// literals are copied unchanged.
#[must_use]
pub fn strip_ignored_characters(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut last_was_word = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' | ',' | '\u{feff}' => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' && chars[i] != '\r' {
                    i += 1;
                }
            }
            '"' => {
                let end = string_end(&chars, i);
                if last_was_word {
                    out.push(' ');
                }
                out.extend(&chars[i..end]);
                last_was_word = true;
                i = end;
            }
            '.' if chars.get(i + 1) == Some(&'.') && chars.get(i + 2) == Some(&'.') => {
                if last_was_word {
                    out.push(' ');
                }
                out.push_str("...");
                last_was_word = false;
                i += 3;
            }
            c if is_word_start(c, chars.get(i + 1).copied()) => {
                let end = word_end(&chars, i);
                if last_was_word {
                    out.push(' ');
                }
                out.extend(&chars[i..end]);
                last_was_word = true;
                i = end;
            }
            _ => {
                out.push(c);
                last_was_word = false;
                i += 1;
            }
        }
    }

    out
}

fn is_word_start(c: char, next: Option<char>) -> bool {
    c == '_' || c.is_ascii_alphanumeric() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit()))
}

/// End of a name or number token starting at `start`.
fn word_end(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        let continues = c == '_'
            || c.is_ascii_alphanumeric()
            || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit))
            || ((c == '+' || c == '-') && matches!(chars[i - 1], 'e' | 'E'));
        if !continues {
            break;
        }
        i += 1;
    }
    i
}

/// End (exclusive) of a string or block string literal starting at `start`.
///
/// An unterminated literal runs to the end of the input.
fn string_end(chars: &[char], start: usize) -> usize {
    let block = chars.get(start + 1) == Some(&'"') && chars.get(start + 2) == Some(&'"');
    let mut i = if block { start + 3 } else { start + 1 };

    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '"' if !block => return i + 1,
            '"' if chars.get(i + 1) == Some(&'"') && chars.get(i + 2) == Some(&'"') => {
                return i + 3;
            }
            _ => i += 1,
        }
    }
    chars.len()
}

/// 32-bit MurmurHash2.
#[must_use]
pub fn murmurhash2(data: &[u8], seed: u32) -> u32 {
    const M: u32 = 0x5bd1_e995;

    #[allow(clippy::cast_possible_truncation)]
    let mut h = seed ^ (data.len() as u32);

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> 24;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= u32::from(tail[2]) << 16;
    }
    if tail.len() >= 2 {
        h ^= u32::from(tail[1]) << 8;
    }
    if let Some(&first) = tail.first() {
        h ^= u32::from(first);
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}
