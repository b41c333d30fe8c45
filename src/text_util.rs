/// Marker added to a snippet edge where the padding ran into the document
/// boundary.
pub const TRUNCATION_MARKER: &str = "...";

/// Characters kept on each side of a fallback match.
pub const DEFAULT_WINDOW_PADDING: usize = 25;

/// Width of one highlighted fragment, in characters.
pub const FRAGMENT_SIZE: usize = 50;

/// Highlighted fragments kept per document.
pub const MAX_FRAGMENTS: usize = 5;

/// Fold a character for case-insensitive comparison. Folding is one char to
/// one char so offsets in the folded text match the original.
pub fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

pub fn fold_chars(text: &str) -> Vec<char> {
    text.chars().map(fold).collect()
}

/// Character offsets of every case-insensitive occurrence of `needle` in
/// `haystack`, both already folded. Scanning resumes after each match, so
/// occurrences never share characters.
pub fn find_matches(haystack: &[char], needle: &[char]) -> Vec<usize> {
    let mut found = Vec::new();
    if needle.is_empty() || needle.len() > haystack.len() {
        return found;
    }
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if haystack[i..i + needle.len()] == *needle {
            found.push(i);
            i += needle.len();
        } else {
            i += 1;
        }
    }
    found
}

/// Snippet of `chars` around the match at `start..start + len`, padded by
/// `padding` characters on each side.
///
/// A [`TRUNCATION_MARKER`] is prepended when the left padding was cut short
/// by the start of the document, and appended when the right padding was cut
/// short by its end.
pub fn window(
    chars: &[char],
    start: usize,
    len: usize,
    padding: usize,
) -> String {
    let end = (start + len).min(chars.len());
    let from = start.saturating_sub(padding);
    let to = (end + padding).min(chars.len());

    let mut snippet = String::new();
    if start < padding {
        snippet.push_str(TRUNCATION_MARKER);
    }
    snippet.extend(&chars[from..to]);
    if end + padding > chars.len() {
        snippet.push_str(TRUNCATION_MARKER);
    }
    snippet
}

/// Plain-text highlight fragments: up to `max` windows of `size` characters
/// centred on occurrences of any of `needles`, in document order. Windows
/// that would overlap an earlier fragment are skipped.
pub fn fragments(
    content: &str,
    needles: &[String],
    size: usize,
    max: usize,
) -> Vec<String> {
    let chars: Vec<char> = content.chars().collect();
    let folded: Vec<char> = chars.iter().copied().map(fold).collect();

    let mut hits: Vec<(usize, usize)> = needles
        .iter()
        .flat_map(|needle| {
            let needle = fold_chars(needle);
            let len = needle.len();
            find_matches(&folded, &needle)
                .into_iter()
                .map(move |at| (at, len))
        })
        .collect();
    hits.sort_unstable();

    let mut out = Vec::new();
    let mut covered_to = 0;
    for (at, len) in hits {
        if out.len() >= max {
            break;
        }
        if !out.is_empty() && at < covered_to {
            continue;
        }
        let slack = size.saturating_sub(len);
        let from = at.saturating_sub(slack / 2);
        let to = (from + size.max(len)).min(chars.len());
        let from = to.saturating_sub(size.max(len)).min(from);
        out.push(chars[from..to].iter().collect::<String>().trim().to_string());
        covered_to = to;
    }
    out
}
