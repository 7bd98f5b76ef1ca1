// src/services/normalize.rs

//! Text cleanup for fields extracted from the injury report.
//!
//! The report glues words together (`LosAngelesLakers`, `LeftAnkle;Sprain`)
//! and writes names surname-first. Every rule is a pure `&str -> String`
//! function so it can be tested on its own.

use std::sync::LazyLock;

use regex::Regex;

/// Name suffixes moved behind the given name.
const NAME_SUFFIXES: [&str; 6] = ["jr", "sr", "ii", "iii", "iv", "v"];

/// Reason strings that carry no information.
const PLACEHOLDERS: [&str; 6] = ["-", "n/a", "na", "none", "tbd", "not yet submitted"];

static REASON_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:injury\s*/\s*illness|illness)\s*(?:-\s*|$)").ok());

static PREPOSITIONS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([a-z]{2})(to|of|with|from)\b").ok());

static MEDICAL_TERMS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)([a-z])(sprain|strain|soreness|contusion|surgery|fracture|tendinitis|tendinopathy|tightness|spasms|inflammation|laceration|impingement|dislocation|reconditioning|management|recovery|bruise)\b",
    )
    .ok()
});

fn replace_all(pattern: &LazyLock<Option<Regex>>, text: &str, replacement: &str) -> String {
    let compiled: &Option<Regex> = pattern;
    match compiled {
        Some(re) => re.replace_all(text, replacement).into_owned(),
        None => text.to_string(),
    }
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Insert spaces at camel-case boundaries and before digits that follow a letter.
///
/// `LosAngelesLakers` -> `Los Angeles Lakers`, `LAClippers` -> `LA Clippers`,
/// `Philadelphia76ers` -> `Philadelphia 76ers`.
pub fn split_camel_case(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);

    for (i, &c) in chars.iter().enumerate() {
        if i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let boundary = (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_alphabetic() && c.is_ascii_digit())
                || (prev.is_uppercase()
                    && c.is_uppercase()
                    && next.is_some_and(char::is_lowercase));
            if boundary {
                out.push(' ');
            }
        }
        out.push(c);
    }
    out
}

/// Insert a space where a digit runs into a capitalized word (`2Sprain`).
pub fn split_digit_letter(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 4);
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if prev.is_some_and(|p| p.is_ascii_digit()) && c.is_uppercase() {
            out.push(' ');
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

/// Turn `Last, First` or `Last, Suffix, First` into `First Last Suffix`.
pub fn normalize_player_name(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);
    let parts: Vec<&str> = collapsed
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    let Some((given, surname_parts)) = parts.split_last() else {
        return String::new();
    };
    if surname_parts.is_empty() {
        return (*given).to_string();
    }

    let (suffixes, surnames): (Vec<&str>, Vec<&str>) = surname_parts
        .iter()
        .flat_map(|part| part.split_whitespace())
        .partition(|token| is_name_suffix(token));

    let mut tokens = vec![*given];
    tokens.extend(surnames);
    tokens.extend(suffixes);
    tokens.join(" ")
}

fn is_name_suffix(token: &str) -> bool {
    let bare = token.trim_end_matches('.').to_lowercase();
    NAME_SUFFIXES.contains(&bare.as_str())
}

/// Space out a glued team label.
pub fn normalize_team(raw: &str) -> String {
    collapse_whitespace(&split_camel_case(&collapse_whitespace(raw)))
}

/// Drop a leading `Injury/Illness-` or `Illness-` tag.
pub fn strip_reason_prefix(text: &str) -> String {
    replace_all(&REASON_PREFIX, text, "")
}

/// Rewrite `location;detail` as `location - detail`.
pub fn split_location_detail(text: &str) -> String {
    match text.split_once(';') {
        Some((location, detail)) => {
            let location = location.trim();
            let detail = detail.trim().trim_start_matches(';').trim();
            match (location.is_empty(), detail.is_empty()) {
                (false, false) => format!("{location} - {detail}"),
                (false, true) => location.to_string(),
                (true, _) => detail.to_string(),
            }
        }
        None => text.to_string(),
    }
}

/// Separate prepositions glued to the preceding word (`Returnto` -> `Return to`).
pub fn space_prepositions(text: &str) -> String {
    replace_all(&PREPOSITIONS, text, "$1 $2")
}

/// Separate common diagnosis words glued to the preceding word.
pub fn space_medical_terms(text: &str) -> String {
    replace_all(&MEDICAL_TERMS, text, "$1 $2")
}

/// Whether a reason carries no information.
pub fn is_placeholder(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    lowered.is_empty() || PLACEHOLDERS.contains(&lowered.as_str())
}

/// Full cleanup of a free-text injury reason.
pub fn clean_reason(raw: &str) -> String {
    let text = collapse_whitespace(raw);
    let text = strip_reason_prefix(&text);
    if is_placeholder(&text) {
        return String::new();
    }

    let text = split_location_detail(&text);
    let text = split_camel_case(&text);
    let text = split_digit_letter(&text);
    let text = space_prepositions(&text);
    let text = space_medical_terms(&text);
    let text = collapse_whitespace(&text);
    let text = text
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '-' | '/') || c.is_whitespace())
        .to_string();

    if is_placeholder(&text) {
        String::new()
    } else {
        text
    }
}
