//! Text normalization for SI strings.
//!
//! Broadcast SI text mixes full-width and half-width characters freely
//! (the encoding does not reliably distinguish width), so every extracted
//! name is folded to a canonical form before it enters the channel model.

/// Offset between the full-width forms block (U+FF01..) and ASCII.
const FULLWIDTH_OFFSET: u32 = 0xFEE0;

/// Normalize full-width/half-width variants in SI text.
///
/// Full-width digits, Latin letters and most punctuation are folded to
/// their ASCII forms. A small set of symbols stays full-width for display
/// consistency (！？＊～＠), with their half-width forms promoted instead.
/// The wave dash (U+301C) is unified to the full-width tilde (U+FF5E).
///
/// The mapping is idempotent: normalizing already-normalized text returns
/// it unchanged.
///
/// # Example
///
/// ```rust
/// use isdb_scanner_model::normalize::normalize_si_text;
///
/// assert_eq!(normalize_si_text("ＮＨＫ総合１・東京"), "NHK総合1・東京");
/// assert_eq!(normalize_si_text("１２３ＡＢＣ"), "123ABC");
/// ```
pub fn normalize_si_text(text: &str) -> String {
    text.chars().map(normalize_char).collect()
}

fn normalize_char(c: char) -> char {
    match c {
        // Full-width alphanumerics
        '０'..='９' | 'Ａ'..='Ｚ' | 'ａ'..='ｚ' => to_halfwidth(c),
        // Full-width punctuation folded to ASCII (！？＊～＠ excluded)
        '＂' | '＃' | '＄' | '％' | '＆' | '＇' | '（' | '）' | '＋' | '，' | '－' | '．'
        | '／' | '：' | '；' | '＜' | '＝' | '＞' | '［' | '＼' | '］' | '＾' | '＿' | '｀'
        | '｛' | '｜' | '｝' => to_halfwidth(c),
        // Ideographic space
        '　' => ' ',
        // Half-width symbols kept full-width in SI display conventions
        '!' => '！',
        '?' => '？',
        '*' => '＊',
        '@' => '＠',
        '~' => '～',
        // Music sharp to number sign
        '♯' => '#',
        // Wave dash to full-width tilde
        '〜' => '～',
        _ => c,
    }
}

fn to_halfwidth(c: char) -> char {
    char::from_u32(c as u32 - FULLWIDTH_OFFSET).unwrap_or(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fullwidth_alphanumerics() {
        assert_eq!(normalize_si_text("１２３ＡＢＣ"), "123ABC");
        assert_eq!(normalize_si_text("ｔｖｋ"), "tvk");
    }

    #[test]
    fn test_fullwidth_punctuation() {
        assert_eq!(normalize_si_text("ＢＳ朝日（フリー）"), "BS朝日(フリー)");
        assert_eq!(normalize_si_text("Ｄｌｉｆｅ／ディーライフ"), "Dlife/ディーライフ");
        assert_eq!(normalize_si_text("ａ　ｂ"), "a b");
    }

    #[test]
    fn test_kept_fullwidth_symbols() {
        assert_eq!(normalize_si_text("スカパー!"), "スカパー！");
        assert_eq!(normalize_si_text("何?"), "何？");
        assert_eq!(normalize_si_text("衛星劇場~名作選"), "衛星劇場～名作選");
    }

    #[test]
    fn test_wave_dash_and_sharp() {
        assert_eq!(normalize_si_text("音楽〜クラシック"), "音楽～クラシック");
        assert_eq!(normalize_si_text("♯インデックス"), "#インデックス");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "１２３ＡＢＣ",
            "スカパー!",
            "音楽〜クラシック",
            "NHK総合1・東京",
        ];
        for input in inputs {
            let once = normalize_si_text(input);
            assert_eq!(normalize_si_text(&once), once);
        }
    }
}
