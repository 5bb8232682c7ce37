//! Canonicalizes user-pasted payment references before lookup and storage.
//!
//! Users paste anything: the bare id, the full SMS text, or the receipt URL.
//! Whatever arrives, equal payments must normalize to the same key, and
//! normalizing an already-normalized value must be a no-op.

use regex::Regex;
use url::Url;

use super::Provider;

pub fn normalize(provider: Provider, raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        extract_from_url(trimmed).unwrap_or_else(|| trimmed.to_string())
    } else {
        trimmed.to_string()
    };
    let candidate = decode_escapes(&candidate);

    match provider {
        Provider::Cbe => normalize_cbe(&candidate),
        Provider::Telebirr => normalize_telebirr(&candidate),
    }
}

/// Prefers the `id` query parameter, falls back to the last path segment.
fn extract_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;

    if let Some((_, id)) = url.query_pairs().find(|(key, _)| key == "id") {
        if !id.is_empty() {
            return Some(id.into_owned());
        }
    }

    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(|segment| segment.to_string())
}

fn decode_escapes(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// CBE references are FT-prefixed alphanumeric ids, 12 to 20 characters.
/// Composite inputs carry the payer account glued on with `&`.
fn normalize_cbe(input: &str) -> String {
    let re = Regex::new(r"(?i)\bFT[A-Z0-9]{10,18}").expect("static regex");
    if let Some(found) = re.find(input) {
        return found.as_str().to_uppercase();
    }

    let first = input.split('&').next().unwrap_or(input).trim();
    first.to_uppercase()
}

/// Telebirr ids arrive inside SMS prose, as a receipt URL, or bare.
fn normalize_telebirr(input: &str) -> String {
    let phrase = Regex::new(r"(?i)transaction\s+number\s+is[\s:]+([A-Za-z0-9]{6,20})")
        .expect("static regex");
    if let Some(captures) = phrase.captures(input) {
        return captures[1].to_uppercase();
    }

    match last_id_run(input) {
        Some(run) => run,
        None => input.to_string(),
    }
}

/// Last alphanumeric run of length 8 to 14 that contains at least one
/// letter. Digit-only runs are skipped so phone numbers and amounts never
/// win over the actual id.
fn last_id_run(input: &str) -> Option<String> {
    let mut runs = Vec::new();
    let mut current = String::new();

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            current.push(ch.to_ascii_uppercase());
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }

    runs.into_iter()
        .rev()
        .find(|run| (8..=14).contains(&run.len()) && run.chars().any(|c| c.is_ascii_alphabetic()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cbe_plain_reference_uppercased() {
        assert_eq!(
            normalize(Provider::Cbe, " ft25301s1pv508379701 "),
            "FT25301S1PV508379701"
        );
    }

    #[test]
    fn test_cbe_reference_from_url_id_param() {
        let raw = "https://apps.cbe.com.et:100/?id=FT25301S1PV50837970112345678";
        assert_eq!(normalize(Provider::Cbe, raw), "FT25301S1PV508379701");
    }

    #[test]
    fn test_cbe_composite_reference() {
        assert_eq!(
            normalize(Provider::Cbe, "FT25301ABCDEF1234&110212345678"),
            "FT25301ABCDEF1234"
        );
    }

    #[test]
    fn test_cbe_fallback_splits_on_ampersand() {
        assert_eq!(normalize(Provider::Cbe, "receipt&extra"), "RECEIPT");
    }

    #[test]
    fn test_cbe_does_not_match_inside_words() {
        // The FT inside "SHIFT" must not be mistaken for a reference prefix.
        assert_eq!(normalize(Provider::Cbe, "shift9876543210ab"), "SHIFT9876543210AB");
    }

    #[test]
    fn test_telebirr_sms_phrase() {
        let sms = "Dear customer, your transaction number is CCH3A2B8X9. Thank you.";
        assert_eq!(normalize(Provider::Telebirr, sms), "CCH3A2B8X9");
    }

    #[test]
    fn test_telebirr_receipt_url() {
        let raw = "https://transactioninfo.ethiotelecom.et/receipt/CCH3A2B8X9";
        assert_eq!(normalize(Provider::Telebirr, raw), "CCH3A2B8X9");
    }

    #[test]
    fn test_telebirr_bare_id_any_case() {
        assert_eq!(normalize(Provider::Telebirr, " cch3a2b8x9 "), "CCH3A2B8X9");
    }

    #[test]
    fn test_telebirr_skips_digit_only_runs() {
        // The phone number is longer and later, but has no letters.
        assert_eq!(
            normalize(Provider::Telebirr, "CCH3A2B8X9 from 0911223344"),
            "CCH3A2B8X9"
        );
    }

    #[test]
    fn test_telebirr_digits_only_falls_through() {
        assert_eq!(normalize(Provider::Telebirr, "0911223344"), "0911223344");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            (Provider::Cbe, " ft25301s1pv508379701 "),
            (Provider::Cbe, "https://apps.cbe.com.et:100/?id=FT25301S1PV508379701"),
            (Provider::Cbe, "receipt&extra"),
            (Provider::Telebirr, "your transaction number is CCH3A2B8X9"),
            (Provider::Telebirr, "0911223344"),
            (Provider::Telebirr, "no id here at all"),
        ];

        for (provider, raw) in inputs {
            let once = normalize(provider, raw);
            let twice = normalize(provider, &once);
            assert_eq!(once, twice, "normalize must be idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize(Provider::Cbe, "   "), "");
        assert_eq!(normalize(Provider::Telebirr, ""), "");
    }
}
