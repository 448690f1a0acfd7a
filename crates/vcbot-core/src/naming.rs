//! Channel name templates.
//!
//! Supported tokens:
//! - `@user`: the member's display name
//! - `@game`: the member's first "playing" activity, or `no game`
//! - `@position`: 1 + number of bot-managed channels already in the category

pub const MAX_CHANNEL_NAME: usize = 100;
pub const MASK_CHAR: char = '*';
pub const NO_GAME: &str = "no game";

const ELLIPSIS: &str = "...";

/// Everything the template may refer to, gathered by the caller.
#[derive(Clone, Debug, Default)]
pub struct NameContext<'a> {
    pub display_name: &'a str,
    pub playing: Option<&'a str>,
    pub managed_in_category: usize,
    pub bad_words: &'a [String],
}

/// Build a channel name from `template`. Deterministic and I/O free.
pub fn synthesize(template: &str, ctx: &NameContext<'_>) -> String {
    let substituted = substitute(template, ctx);
    let masked = mask_bad_words(&substituted, ctx.bad_words);
    truncate_name(&masked)
}

fn substitute(template: &str, ctx: &NameContext<'_>) -> String {
    let position = (ctx.managed_in_category + 1).to_string();
    let tokens: [(&str, &str); 3] = [
        ("@user", ctx.display_name),
        ("@game", ctx.playing.unwrap_or(NO_GAME)),
        ("@position", position.as_str()),
    ];

    // Single pass so substituted text is never treated as a token again.
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    'scan: while !rest.is_empty() {
        for (token, value) in &tokens {
            if let Some(after) = rest.strip_prefix(token) {
                out.push_str(value);
                rest = after;
                continue 'scan;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

/// Replace every case-insensitive occurrence of each word with `*`s.
///
/// Matches are found on the unmasked text, so overlapping occurrences are all
/// masked.
pub fn mask_bad_words(name: &str, bad_words: &[String]) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut masked = vec![false; chars.len()];

    for word in bad_words {
        let needle: Vec<char> = word.chars().collect();
        if needle.is_empty() || needle.len() > chars.len() {
            continue;
        }
        for start in 0..=chars.len() - needle.len() {
            let hit = needle
                .iter()
                .zip(&chars[start..])
                .all(|(a, b)| eq_ignore_case(*a, *b));
            if hit {
                masked[start..start + needle.len()].fill(true);
            }
        }
    }

    chars
        .iter()
        .zip(masked)
        .map(|(c, m)| if m { MASK_CHAR } else { *c })
        .collect()
}

fn eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Bound a name to [`MAX_CHANNEL_NAME`] characters, ending in `...` when cut.
pub fn truncate_name(name: &str) -> String {
    if name.chars().count() <= MAX_CHANNEL_NAME {
        return name.to_string();
    }
    let mut out: String = name
        .chars()
        .take(MAX_CHANNEL_NAME - ELLIPSIS.len())
        .collect();
    out.push_str(ELLIPSIS);
    out
}
