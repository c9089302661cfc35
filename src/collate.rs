use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// One collation element: a base character plus the combining marks that follow
/// it in the canonical decomposition.
///
/// Comparison is multi-level, ICU style:
/// 1. primary: base letter, ignoring accents and case
/// 2. secondary: combining marks (unaccented first)
/// 3. tertiary: case (lowercase first)
///
/// Names equal at all three levels fall back to code point order of their
/// decomposed form, so precomposed and decomposed spellings compare equal and
/// the result is still a total order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Element {
    primary: (u8, char),
    marks: Vec<u16>,
    upper: bool,
}

fn char_class(c: char) -> u8 {
    if c.is_whitespace() {
        0
    } else if c.is_alphabetic() {
        3
    } else if c.is_numeric() {
        2
    } else {
        1
    }
}

/// Secondary weight of a combining mark. The marks used in Portuguese come
/// first in a fixed order; the rest follow by code point.
fn mark_weight(m: char) -> u16 {
    match m {
        '\u{0301}' => 1, // acute
        '\u{0300}' => 2, // grave
        '\u{0302}' => 3, // circumflex
        '\u{030A}' => 4, // ring
        '\u{0308}' => 5, // diaeresis
        '\u{0303}' => 6, // tilde
        '\u{0327}' => 7, // cedilla
        other => u16::try_from(other as u32).map_or(u16::MAX, |cp| cp.saturating_add(16)),
    }
}

fn elements(name: &str) -> Vec<Element> {
    let mut out: Vec<Element> = Vec::with_capacity(name.len());
    for c in name.nfd() {
        if is_combining_mark(c) {
            if let Some(last) = out.last_mut() {
                last.marks.push(mark_weight(c));
                continue;
            }
        }
        let lower = c.to_lowercase().next().unwrap_or(c);
        out.push(Element {
            primary: (char_class(lower), lower),
            marks: Vec::new(),
            upper: lower != c,
        });
    }
    out
}

/// Compares two display names the way a pt-BR locale-aware sort would.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let ea = elements(a);
    let eb = elements(b);

    ea.iter()
        .map(|e| e.primary)
        .cmp(eb.iter().map(|e| e.primary))
        .then_with(|| ea.iter().map(|e| &e.marks).cmp(eb.iter().map(|e| &e.marks)))
        .then_with(|| ea.iter().map(|e| e.upper).cmp(eb.iter().map(|e| e.upper)))
        .then_with(|| a.nfd().cmp(b.nfd()))
}
