//! Recording filename template language: encode/decode/commonPrefix
//! (spec.md §4.A).

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::error::{RecordError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Path,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Micros,
    UnixSecs,
}

#[derive(Debug, Clone)]
enum Token {
    Literal(String),
    Placeholder(Field),
}

fn tokenize(template: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }
        let Some(&next) = chars.peek() else {
            literal.push(c);
            continue;
        };
        let field = match next {
            'p' if template_word(&mut chars.clone(), "path") => {
                for _ in 0.."path".len() {
                    chars.next();
                }
                Some(Field::Path)
            }
            'Y' => Some(Field::Year),
            'm' => Some(Field::Month),
            'd' => Some(Field::Day),
            'H' => Some(Field::Hour),
            'M' => Some(Field::Minute),
            'S' => Some(Field::Second),
            'f' => Some(Field::Micros),
            's' => Some(Field::UnixSecs),
            '%' => {
                chars.next();
                literal.push('%');
                continue;
            }
            _ => None,
        };
        match field {
            Some(Field::Path) => {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Placeholder(Field::Path));
            }
            Some(f) => {
                chars.next();
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Placeholder(f));
            }
            None => {
                literal.push('%');
                literal.push(next);
                chars.next();
            }
        }
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    tokens
}

/// Peeks ahead to check whether the iterator (starting at `p`) begins
/// with the literal word `word`, without consuming `%`.
fn template_word(chars: &mut std::iter::Peekable<std::str::Chars>, word: &str) -> bool {
    let rest: String = chars.clone().take(word.len()).collect();
    rest == word
}

/// Substitutes each placeholder in `template` with its concrete value.
pub fn encode(path_name: &str, start_time: DateTime<Local>, template: &str) -> String {
    let mut out = String::new();
    for token in tokenize(template) {
        match token {
            Token::Literal(s) => out.push_str(&s),
            Token::Placeholder(field) => out.push_str(&render_field(&field, path_name, start_time)),
        }
    }
    out
}

fn render_field(field: &Field, path_name: &str, t: DateTime<Local>) -> String {
    match field {
        Field::Path => path_name.to_string(),
        Field::Year => format!("{:04}", t.format("%Y")),
        Field::Month => format!("{:02}", t.format("%m")),
        Field::Day => format!("{:02}", t.format("%d")),
        Field::Hour => format!("{:02}", t.format("%H")),
        Field::Minute => format!("{:02}", t.format("%M")),
        Field::Second => format!("{:02}", t.format("%S")),
        Field::Micros => format!("{:06}", t.timestamp_subsec_micros()),
        Field::UnixSecs => t.timestamp().to_string(),
    }
}

fn field_group(field: &Field) -> &'static str {
    match field {
        Field::Path => "(.*?)",
        Field::Year => "([0-9]{4})",
        Field::Month | Field::Day | Field::Hour | Field::Minute | Field::Second => "([0-9]{2})",
        Field::Micros => "([0-9]{6})",
        Field::UnixSecs => "([0-9]+)",
    }
}

/// The result of successfully decoding a filename against a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub path_name: String,
    pub start_time: DateTime<Local>,
}

/// Decodes `filename` against `template`, returning `None` when it does
/// not match the template's shape at all.
pub fn decode(template: &str, filename: &str) -> Option<Decoded> {
    let tokens = tokenize(template);
    let mut pattern = String::from("^");
    let mut order = Vec::new();
    for token in &tokens {
        match token {
            Token::Literal(s) => pattern.push_str(&regex::escape(s)),
            Token::Placeholder(f) => {
                pattern.push_str(field_group(f));
                order.push(f.clone());
            }
        }
    }
    pattern.push('$');
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(filename)?;

    let mut path_name = String::new();
    let mut year: Option<i32> = None;
    let mut month: Option<u32> = None;
    let mut day: Option<u32> = None;
    let mut hour: Option<u32> = None;
    let mut minute: Option<u32> = None;
    let mut second: Option<u32> = None;
    let mut micros = 0u32;
    let mut unix_secs: Option<i64> = None;

    for (i, field) in order.iter().enumerate() {
        let text = caps.get(i + 1)?.as_str();
        match field {
            Field::Path => path_name = text.to_string(),
            Field::Year => year = text.parse().ok(),
            Field::Month => month = text.parse().ok(),
            Field::Day => day = text.parse().ok(),
            Field::Hour => hour = text.parse().ok(),
            Field::Minute => minute = text.parse().ok(),
            Field::Second => second = text.parse().ok(),
            Field::Micros => micros = text.parse().unwrap_or(0),
            Field::UnixSecs => unix_secs = text.parse().ok(),
        }
    }

    let start_time = if let Some(secs) = unix_secs {
        let utc = Utc.timestamp_opt(secs, micros * 1000).single()?;
        DateTime::<Local>::from(utc)
    } else {
        let naive = NaiveDateTime::parse_from_str(
            &format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
                year?, month?, day?, hour?, minute?, second?, micros
            ),
            "%Y-%m-%d %H:%M:%S%.f",
        )
        .ok()?;
        Local.from_local_datetime(&naive).single()?
    };

    Some(Decoded {
        path_name,
        start_time,
    })
}

/// The longest leading directory segment of `template` with no `%`
/// placeholder — the walk root for [`super::index`] (spec.md §4.A).
pub fn common_prefix(template: &str) -> String {
    let mut segments = Vec::new();
    for segment in template.split('/') {
        if segment.contains('%') {
            break;
        }
        segments.push(segment);
    }
    segments.join("/")
}

/// Builds a decode failure into the crate's error type for callers that
/// need an explicit error rather than `None`.
pub fn decode_or_mismatch(template: &str, filename: &str) -> Result<Decoded> {
    decode(template, filename).ok_or_else(|| RecordError::TemplateMismatch(filename.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn encode_decode_round_trip() {
        let template = "%path/%Y-%m-%d_%H-%M-%S-%f";
        let t = Local.with_ymd_and_hms(2024, 3, 7, 13, 5, 9).unwrap();
        let encoded = encode("cam1", t, template);
        let decoded = decode(template, &encoded).expect("should decode");
        assert_eq!(decoded.path_name, "cam1");
        assert_eq!(decoded.start_time.timestamp(), t.timestamp());
    }

    #[test]
    fn unix_secs_takes_precedence() {
        let template = "%path-%s";
        let t = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let encoded = encode("cam1", t, template);
        let decoded = decode(template, &encoded).unwrap();
        assert_eq!(decoded.start_time.timestamp(), t.timestamp());
    }

    #[test]
    fn common_prefix_stops_at_first_placeholder() {
        assert_eq!(common_prefix("recordings/%path/%Y-%m-%d"), "recordings");
        assert_eq!(common_prefix("recordings/cam1/%Y"), "recordings/cam1");
        assert_eq!(common_prefix("%path/file"), "");
    }

    #[test]
    fn decode_rejects_non_matching_filename() {
        let template = "%path/%Y-%m-%d_%H-%M-%S-%f";
        assert!(decode(template, "not-a-match.mp4").is_none());
    }
}
