//! ARIB STD-B24 8-bit character decoding for SI strings.
//!
//! SI text interleaves code sets through ISO/IEC 2022 style designation
//! and invocation. The decoder tracks the four G buffers, maps the kana
//! and alphanumeric sets directly to Unicode, and routes the two-byte
//! kanji sets through the EUC-JP tables (JIS X 0208 shares its layout
//! with the ARIB kanji set). Cells without a mapping, such as ARIB gaiji
//! rows and DRCS patterns, come out as a geta mark.
//!
//! Alphanumerics decode to their full-width forms, matching how receivers
//! render them; the channel model normalizes them afterwards.

/// Placeholder for characters without a Unicode mapping.
const GETA: char = '〓';

/// Decode an ARIB STD-B24 encoded SI string.
pub fn decode_arib_text(data: &[u8]) -> String {
    AribTextDecoder::new().decode(data)
}

/// Code sets this decoder can designate into a G buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharSet {
    /// Two-byte sets decoded through EUC-JP (kanji and friends).
    Kanji,
    Alphanumeric,
    Hiragana,
    Katakana,
    /// JIS X 0201 katakana (half width).
    JisX0201Katakana,
    /// Mosaic and DRCS sets: no textual mapping.
    Unmapped { width: usize },
}

impl CharSet {
    fn width(self) -> usize {
        match self {
            CharSet::Kanji => 2,
            CharSet::Unmapped { width } => width,
            _ => 1,
        }
    }
}

struct AribTextDecoder {
    /// G0-G3 buffer designations.
    g: [CharSet; 4],
    /// Buffer invoked into the GL area.
    gl: usize,
    /// Buffer invoked into the GR area.
    gr: usize,
    /// Buffer invoked for the next character only (SS2/SS3).
    single_shift: Option<usize>,
}

impl AribTextDecoder {
    fn new() -> Self {
        AribTextDecoder {
            g: [
                CharSet::Kanji,
                CharSet::Alphanumeric,
                CharSet::Hiragana,
                CharSet::Katakana,
            ],
            gl: 0,
            gr: 2,
            single_shift: None,
        }
    }

    fn decode(&mut self, data: &[u8]) -> String {
        let mut out = String::new();
        let mut index = 0;
        while index < data.len() {
            let byte = data[index];
            match byte {
                0x20 => {
                    out.push(' ');
                    index += 1;
                }
                0x0A | 0x0D => {
                    out.push('\n');
                    index += 1;
                }
                0x0E => {
                    // LS1
                    self.gl = 1;
                    index += 1;
                }
                0x0F => {
                    // LS0
                    self.gl = 0;
                    index += 1;
                }
                0x19 => {
                    // SS2
                    self.single_shift = Some(2);
                    index += 1;
                }
                0x1D => {
                    // SS3
                    self.single_shift = Some(3);
                    index += 1;
                }
                0x1B => {
                    index += 1 + self.escape(&data[index + 1..]);
                }
                b if b < 0x20 || b == 0x7F => {
                    index += 1;
                }
                b if b <= 0x7E => {
                    index += self.emit(&mut out, &data[index..], false);
                }
                b if (0xA1..=0xFE).contains(&b) => {
                    index += self.emit(&mut out, &data[index..], true);
                }
                _ => {
                    // C1 area and 0xA0/0xFF: presentation controls, ignored.
                    index += 1;
                }
            }
        }
        out
    }

    /// Decode one character from the GL or GR area. Returns the number of
    /// bytes consumed.
    fn emit(&mut self, out: &mut String, data: &[u8], in_gr: bool) -> usize {
        let bank = match self.single_shift.take() {
            Some(bank) => bank,
            None if in_gr => self.gr,
            None => self.gl,
        };
        let set = self.g[bank];
        if data.len() < set.width() {
            return 1;
        }

        match set {
            CharSet::Kanji => {
                out.push(decode_kanji(data[0] & 0x7F, data[1] & 0x7F));
            }
            CharSet::Alphanumeric => out.push(decode_alphanumeric(data[0] & 0x7F)),
            CharSet::Hiragana => out.push(decode_hiragana(data[0] & 0x7F)),
            CharSet::Katakana => out.push(decode_katakana(data[0] & 0x7F)),
            CharSet::JisX0201Katakana => out.push(decode_half_katakana(data[0] & 0x7F)),
            CharSet::Unmapped { .. } => out.push(GETA),
        }
        set.width()
    }

    /// Handle the byte sequence after an ESC. Returns the number of bytes
    /// consumed beyond the ESC itself.
    fn escape(&mut self, data: &[u8]) -> usize {
        let Some(&first) = data.first() else {
            return 0;
        };
        match first {
            0x6E => {
                // LS2
                self.gl = 2;
                1
            }
            0x6F => {
                // LS3
                self.gl = 3;
                1
            }
            0x7C => {
                // LS3R
                self.gr = 3;
                1
            }
            0x7D => {
                // LS2R
                self.gr = 2;
                1
            }
            0x7E => {
                // LS1R
                self.gr = 1;
                1
            }
            0x28..=0x2B => {
                // One-byte set designation; 0x20 in between selects DRCS.
                let bank = (first - 0x28) as usize;
                match data.get(1) {
                    Some(0x20) => {
                        if data.get(2).is_some() {
                            self.g[bank] = CharSet::Unmapped { width: 1 };
                        }
                        3
                    }
                    Some(&final_byte) => {
                        self.g[bank] = one_byte_set(final_byte);
                        2
                    }
                    None => 1,
                }
            }
            0x24 => match data.get(1) {
                Some(&second @ 0x28..=0x2B) => {
                    let bank = (second - 0x28) as usize;
                    match data.get(2) {
                        Some(0x20) => {
                            if data.get(3).is_some() {
                                self.g[bank] = CharSet::Unmapped { width: 2 };
                            }
                            4
                        }
                        Some(_) => {
                            self.g[bank] = CharSet::Kanji;
                            3
                        }
                        None => 2,
                    }
                }
                Some(_) => {
                    self.g[0] = CharSet::Kanji;
                    2
                }
                None => 1,
            },
            _ => 1,
        }
    }
}

fn one_byte_set(final_byte: u8) -> CharSet {
    match final_byte {
        // Proportional variants share their glyph tables.
        0x4A | 0x36 => CharSet::Alphanumeric,
        0x30 | 0x37 => CharSet::Hiragana,
        0x31 | 0x38 => CharSet::Katakana,
        0x49 => CharSet::JisX0201Katakana,
        _ => CharSet::Unmapped { width: 1 },
    }
}

/// Decode one two-byte code point through the EUC-JP tables.
fn decode_kanji(first: u8, second: u8) -> char {
    let euc = [first | 0x80, second | 0x80];
    let (decoded, had_errors) = encoding_rs::EUC_JP.decode_without_bom_handling(&euc);
    if had_errors {
        return GETA;
    }
    decoded.chars().next().unwrap_or(GETA)
}

fn decode_alphanumeric(code: u8) -> char {
    // 0x21..=0x7E maps onto the full-width forms U+FF01..U+FF5E.
    char::from_u32(0xFEE0 + code as u32).unwrap_or(GETA)
}

fn decode_hiragana(code: u8) -> char {
    match code {
        0x21..=0x73 => char::from_u32(0x3041 + (code - 0x21) as u32).unwrap_or(GETA),
        0x74 => 'ゝ',
        0x75 => 'ゞ',
        0x76 => 'ー',
        0x77 => '。',
        0x78 => '「',
        0x79 => '」',
        0x7A => '、',
        0x7B => '・',
        _ => GETA,
    }
}

fn decode_katakana(code: u8) -> char {
    match code {
        0x21..=0x76 => char::from_u32(0x30A1 + (code - 0x21) as u32).unwrap_or(GETA),
        0x77 => 'ヽ',
        0x78 => 'ヾ',
        0x79 => 'ー',
        0x7A => '。',
        0x7B => '「',
        0x7C => '」',
        0x7D => '、',
        0x7E => '・',
        _ => GETA,
    }
}

fn decode_half_katakana(code: u8) -> char {
    match code {
        0x21..=0x5F => char::from_u32(0xFF40 + code as u32).unwrap_or(GETA),
        _ => GETA,
    }
}
