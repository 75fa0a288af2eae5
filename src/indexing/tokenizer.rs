//! Text normalization shared by chunk indexing and query vectorization.
//!
//! Both sides of a cosine comparison must tokenize identically, so there is a
//! single entry point, [`tokenize`].

/// Shortest token kept.
const MIN_TOKEN_LEN: usize = 2;

/// Longest token kept; longer runs are dropped entirely.
const MAX_TOKEN_LEN: usize = 32;

/// Common English words and language keywords that carry no search signal.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "if",
    "in", "into", "is", "it", "its", "of", "on", "or", "so", "that", "the", "then", "this", "to",
    "was", "were", "will", "with", "we", "you", "your", "not", "no", "can", "do", "does", "all",
    "any", "there", "these", "those", "which", "what", "when", "where", "who", "how", "const",
    "let", "var", "function", "return", "import", "export", "default", "class", "new", "public",
    "private", "protected", "static", "void", "null", "undefined", "true", "false", "else",
    "fn", "pub", "use", "mod", "impl", "self", "def", "pass", "async", "await", "type",
    "interface", "extends", "implements", "string", "number", "boolean", "int", "bool",
];

/// Split `text` into the filtered, lowercased token stream used everywhere.
///
/// camelCase humps and the separators `_ - / .` become word boundaries, then
/// alphanumeric runs of 2..=32 characters that start with a letter are kept
/// unless they are stopwords.
pub fn tokenize(text: &str) -> Vec<String> {
    split_words(text)
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|run| (MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&run.len()))
        .filter(|run| run.starts_with(|c: char| c.is_ascii_alphabetic()))
        .filter(|run| !is_stopword(run))
        .map(str::to_string)
        .collect()
}

/// Check if a lowercased token is on the stopword list
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Insert spaces at camelCase boundaries and separators, then lowercase.
fn split_words(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + text.len() / 4);

    for (i, &ch) in chars.iter().enumerate() {
        if matches!(ch, '_' | '-' | '/' | '.') {
            out.push(' ');
            continue;
        }

        if ch.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
            // fooBar -> foo Bar, HTTPServer -> HTTP Server
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            {
                out.push(' ');
            }
        }

        out.extend(ch.to_lowercase());
    }

    out
}
