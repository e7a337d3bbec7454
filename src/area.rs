//! Floor-area extraction from recognized floor-plan text.
//!
//! Floor plans usually print the area more than once (heading, legend) and in
//! either unit in arbitrary order, so the scan collects every candidate and
//! keeps the largest one. Best-effort heuristic, not a guaranteed parse.

const SQFT_PER_SQM: f64 = 10.7639;

// Lookahead window after each digit, in characters.
const LOOKAHEAD: usize = 15;

/// Position one past the last matched character when `token` occurs in
/// `window` as a case-insensitive subsequence, `None` when the window ends
/// before the token completes.
fn subsequence_end(window: &[char], token: &str) -> Option<usize> {
    let mut pos = 0;
    for t in token.chars() {
        while pos != window.len() && window[pos].to_ascii_lowercase() != t {
            pos += 1;
        }
        if pos == window.len() {
            return None;
        }
        pos += 1;
    }
    Some(pos)
}

/// Maximal leading run of digits and decimal points, parsed as a number.
fn leading_number(window: &[char]) -> Option<f64> {
    let run: String = window
        .iter()
        .take_while(|c| c.is_ascii_digit() || **c == '.')
        .collect();
    run.parse().ok()
}

/// Best-guess floor area in square meters, or `None` when the text carries no
/// recognizable area figure.
pub fn extract_area_sqm(text: &str) -> Option<f64> {
    let chars: Vec<char> = text.chars().collect();
    let mut sq_meters = Vec::new();
    let mut sq_feet = Vec::new();

    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_digit() {
            let window = &chars[i..chars.len().min(i + LOOKAHEAD)];
            let sqm_pos = subsequence_end(window, "sqm").unwrap_or(usize::MAX);
            let sqft_pos = subsequence_end(window, "sqft").unwrap_or(usize::MAX);
            if let Some(value) = leading_number(window) {
                if sqm_pos < sqft_pos {
                    sq_meters.push(value);
                    i += sqm_pos;
                    continue;
                }
                if sqft_pos < sqm_pos {
                    sq_feet.push(value);
                    i += sqft_pos;
                    continue;
                }
            }
        }
        i += 1;
    }

    if let Some(max) = sq_meters.into_iter().reduce(f64::max) {
        return Some(max);
    }
    sq_feet.into_iter().reduce(f64::max).map(|max| max / SQFT_PER_SQM)
}

/// Whether a known area is below the configured minimum-plausible threshold.
pub fn too_small_area(area_sqm: f64, min_plausible_sqm: f64) -> bool {
    area_sqm < min_plausible_sqm
}

pub fn format_area(area_sqm: Option<f64>) -> String {
    match area_sqm {
        Some(area) => format!("{area:.3} sq. m."),
        None => "???".to_string(),
    }
}
