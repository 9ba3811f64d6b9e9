use std::collections::BTreeSet;

/// Canonical form of a free-text payer name: lowercased, diacritics folded,
/// punctuation stripped, words sorted so that "Last First" and "First Last"
/// compare equal. Empty input yields an empty string.
pub fn normalize_name(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let mut cleaned = String::with_capacity(lowered.len());
    for ch in lowered.chars() {
        let folded = match ch {
            'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            c => c,
        };
        if folded.is_ascii_alphanumeric() {
            cleaned.push(folded);
        } else if folded.is_whitespace() {
            cleaned.push(' ');
        }
    }

    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    words.sort_unstable();
    words.join(" ")
}

fn digit_string(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Canonical 11-digit tax id, or None when the input cannot be coerced.
///
/// 8-10 digit forms are taken as a bare national number and promoted with
/// the default "20" type code; longer inputs keep their first 11 digits.
pub fn normalize_tax_id(raw: &str) -> Option<String> {
    let digits = digit_string(raw);
    match digits.len() {
        11 => Some(digits),
        8..=10 => {
            let mut full = String::from("20");
            full.push_str(&format!("{digits:0>9}"));
            full.truncate(11);
            Some(full)
        }
        n if n > 11 => Some(digits[..11].to_string()),
        _ => None,
    }
}

const CHECK_WEIGHTS: [u32; 10] = [2, 3, 4, 5, 6, 7, 2, 3, 4, 5];

/// Check digit for the 11-digit tax id scheme, computed over the first 10
/// digits (type code + national number). Weights run from the rightmost
/// digit outward; a remainder of 1 only has a defined digit for a handful
/// of type codes.
pub fn check_digit(base: &str) -> Option<u32> {
    if base.len() != 10 || !base.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let sum: u32 = base
        .chars()
        .rev()
        .zip(CHECK_WEIGHTS)
        .map(|(c, w)| c.to_digit(10).unwrap_or(0) * w)
        .sum();

    match sum % 11 {
        0 => Some(0),
        1 => match &base[..2] {
            "20" | "30" => Some(9),
            "27" => Some(4),
            "24" | "34" => Some(3),
            _ => None,
        },
        rem => Some(11 - rem),
    }
}

const PERSON_TYPE_CODES: [&str; 6] = ["20", "23", "24", "25", "26", "27"];
const COMPANY_TYPE_CODES: [&str; 3] = ["30", "33", "34"];

/// All full tax ids a bare national number could correspond to, one per
/// plausible type code. The input is zero-padded or truncated to 8 digits.
pub fn tax_id_variants(personal: &str) -> Vec<String> {
    let digits = digit_string(personal);
    if digits.is_empty() {
        return Vec::new();
    }
    let padded = format!("{:0>8}", &digits[..digits.len().min(8)]);

    let mut out = Vec::new();
    for code in PERSON_TYPE_CODES.iter().chain(COMPANY_TYPE_CODES.iter()) {
        let base = format!("{code}{padded}");
        if let Some(d) = check_digit(&base) {
            out.push(format!("{base}{d}"));
        }
    }
    out
}

/// National number embedded in a tax id: the middle 8 digits of a full id,
/// or the bare digit run for shorter inputs.
fn personal_number(raw: &str) -> Option<String> {
    let digits = digit_string(raw);
    match digits.len() {
        0..=3 => None,
        11.. => Some(digits[2..10].to_string()),
        _ => Some(format!("{:0>8}", &digits[..digits.len().min(8)])),
    }
}

/// Word-overlap similarity between two names after normalization:
/// |intersection| / max(word count). 1.0 for identical word sets.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let na = normalize_name(a);
    let nb = normalize_name(b);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return 1.0;
    }

    let wa: BTreeSet<&str> = na.split(' ').collect();
    let wb: BTreeSet<&str> = nb.split(' ').collect();
    let common = wa.intersection(&wb).count();
    common as f64 / wa.len().max(wb.len()) as f64
}

pub fn names_match(a: &str, b: &str, threshold: f64) -> bool {
    name_similarity(a, b) >= threshold
}

/// Whether two tax ids denote the same person or entity, tolerating a
/// different type-code prefix and partially recorded numbers.
pub fn tax_ids_match(a: &str, b: &str) -> bool {
    tax_ids_match_depth(a, b, 0)
}

fn tax_ids_match_depth(a: &str, b: &str, depth: u8) -> bool {
    if let (Some(na), Some(nb)) = (normalize_tax_id(a), normalize_tax_id(b)) {
        if na == nb {
            return true;
        }
        if depth > 0 {
            return false;
        }
        // Same national number under a different type code. The personal
        // number is taken from the raw inputs so a bare document number is
        // not distorted by the "20" padding above.
        if let Some(pa) = personal_number(a) {
            if tax_id_variants(&pa).iter().any(|v| *v == nb) {
                return true;
            }
        }
        if let Some(pb) = personal_number(b) {
            if tax_id_variants(&pb).iter().any(|v| *v == na) {
                return true;
            }
        }
        return false;
    }

    if depth > 0 {
        return false;
    }

    // One side is too short to normalize; mine the longer side for its
    // national number and retry each candidate id against the short side.
    let (da, db) = (digit_string(a), digit_string(b));
    let (longer, short_digits) = if da.len() >= db.len() { (a, db) } else { (b, da) };
    if short_digits.is_empty() {
        return false;
    }
    let Some(personal) = personal_number(longer) else {
        return false;
    };
    tax_id_variants(&personal)
        .iter()
        .any(|v| tax_ids_match_depth(v, &short_digits, 1) || v[2..10].ends_with(&short_digits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_normalization_is_order_independent() {
        assert_eq!(normalize_name("Pérez Juan"), normalize_name("Juan Perez"));
        assert_eq!(normalize_name("  JUAN   pérez "), "juan perez");
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name("María-José Núñez"), "mariajose nunez");
    }

    #[test]
    fn tax_id_normalization_pads_short_forms_with_default_type_code() {
        // 8, 9 and 10 digit inputs all land on 11 digits prefixed "20".
        for raw in ["12345678", "123456789", "1234567890"] {
            let n = normalize_tax_id(raw).unwrap();
            assert_eq!(n.len(), 11, "input {raw}");
            assert!(n.starts_with("20"), "input {raw} gave {n}");
        }
        assert_eq!(normalize_tax_id("20-12345678-9").unwrap(), "20123456789");
        // Over-length input keeps its first 11 digits.
        assert_eq!(normalize_tax_id("201234567891111").unwrap(), "20123456789");
        // Too short or empty is invalid.
        assert_eq!(normalize_tax_id("1234567"), None);
        assert_eq!(normalize_tax_id("sin datos"), None);
    }

    #[test]
    fn check_digit_is_deterministic() {
        let d1 = check_digit("2012345678");
        let d2 = check_digit("2012345678");
        assert!(d1.is_some());
        assert_eq!(d1, d2);
    }

    #[test]
    fn check_digit_rejects_malformed_input() {
        assert_eq!(check_digit("123"), None);
        assert_eq!(check_digit("12345abcde"), None);
        assert_eq!(check_digit("123456789012"), None);
    }

    #[test]
    fn check_digit_remainder_one_special_cases() {
        // Find a remainder-1 base per type code by brute force, then check
        // the fixed digit assigned to it.
        for (code, expected) in [("20", 9), ("27", 4), ("24", 3), ("30", 9), ("34", 3)] {
            let mut found = false;
            for n in 0..200_000u32 {
                let base = format!("{code}{n:08}");
                let sum: u32 = base
                    .chars()
                    .rev()
                    .zip([2u32, 3, 4, 5, 6, 7, 2, 3, 4, 5])
                    .map(|(c, w)| c.to_digit(10).unwrap() * w)
                    .sum();
                if sum % 11 == 1 {
                    assert_eq!(check_digit(&base), Some(expected), "base {base}");
                    found = true;
                    break;
                }
            }
            assert!(found, "no remainder-1 case found for type code {code}");
        }
    }

    #[test]
    fn variants_cover_person_and_company_type_codes() {
        let variants = tax_id_variants("12345678");
        assert!(!variants.is_empty());
        for v in &variants {
            assert_eq!(v.len(), 11);
            let base = &v[..10];
            let digit: u32 = v[10..].parse().unwrap();
            assert_eq!(check_digit(base), Some(digit));
        }
        // At least one personal and one company prefix survive.
        assert!(variants.iter().any(|v| v.starts_with('2')));
        assert!(variants.iter().any(|v| v.starts_with('3')));
    }

    #[test]
    fn names_match_thresholds() {
        assert!(names_match("Juan Perez", "Pérez Juan", 0.8));
        // One word of two in common: ratio 0.5.
        assert!(!names_match("Juan Perez", "Juan Gomez", 0.8));
        assert!(!names_match("Juan Perez", "Juan Gomez", 0.6));
        // Two of three words in common: ratio ~0.67 passes the loose bar.
        assert!(names_match("Juan Carlos Perez", "Perez Juan", 0.6));
        assert!(!names_match("", "Juan", 0.6));
    }

    #[test]
    fn tax_ids_match_exact_and_variant() {
        assert!(tax_ids_match("20-12345678-9", "20123456789"));
        // Same national number, different type code prefix.
        let variants = tax_id_variants("12345678");
        let personal = variants.iter().find(|v| v.starts_with("20")).unwrap();
        let company = variants.iter().find(|v| v.starts_with("30")).unwrap();
        assert!(tax_ids_match(personal, company));
        assert!(!tax_ids_match("20123456789", "27999999994"));
        assert!(!tax_ids_match("", "20123456789"));
    }

    #[test]
    fn bare_document_number_matches_full_tax_id() {
        let full = tax_id_variants("12345678")
            .into_iter()
            .find(|v| v.starts_with("20"))
            .unwrap();
        assert!(tax_ids_match("12345678", &full));
        assert!(tax_ids_match(&full, "12345678"));
        assert!(!tax_ids_match("87654321", &full));
    }

    #[test]
    fn tax_ids_match_partial_fragment() {
        let full = tax_id_variants("12345678")
            .into_iter()
            .find(|v| v.starts_with("20"))
            .unwrap();
        // A bare trailing fragment of the national number still matches.
        assert!(tax_ids_match(&full, "345678"));
        assert!(!tax_ids_match(&full, "999"));
    }
}
