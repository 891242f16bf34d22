//! User-facing notification text. The app ships in Turkish only.

/// Longest body shown before truncation, in characters.
pub const BODY_PREVIEW_CHARS: usize = 100;

pub const DEFAULT_CITY: &str = "Şehir";
pub const SOMEONE: &str = "Birisi";

pub const REPLY_TITLE: &str = "Yorumuna yanıt geldi!";
pub const COMMENT_TITLE: &str = "Konuna yeni yorum!";
pub const CONFESSION_LIKED_TITLE: &str = "Konun beğenildi! ❤️";
pub const COMMENT_LIKED_TITLE: &str = "Yorumun beğenildi! ❤️";
pub const LIKE_BODY: &str = "Birisi paylaşımını beğendi.";
pub const ONE_TIME_IMAGE_BODY: &str = "🔥 Tek kullanımlık fotoğraf";
pub const IMAGE_BODY: &str = "📷 Fotoğraf gönderdi";

/// Client-side handler that opens the deep link on tap.
pub const CLICK_ACTION: &str = "FLUTTER_NOTIFICATION_CLICK";

/// Cut `text` to [`BODY_PREVIEW_CHARS`] characters, marking the cut with `...`.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(BODY_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Title of the new-confession broadcast, e.g. `İstanbul'da Yeni KonuBu!`.
pub fn city_title(city_name: Option<&str>) -> String {
    let city = city_name
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CITY);
    format!("{}{} Yeni KonuBu!", city, locative_suffix(city))
}

pub fn message_title(sender_name: Option<&str>) -> String {
    let sender = sender_name.filter(|s| !s.trim().is_empty()).unwrap_or(SOMEONE);
    format!("{} mesaj gönderdi", sender)
}

pub fn message_body(content: &str, is_image: bool, is_one_time: bool) -> String {
    match (is_image, is_one_time) {
        (true, true) => ONE_TIME_IMAGE_BODY.to_string(),
        (true, false) => IMAGE_BODY.to_string(),
        _ => preview(content),
    }
}

/// Turkish locative suffix for a proper noun: `'da`, `'de`, `'ta` or `'te`.
///
/// Vowel harmony picks `a` after a back vowel and `e` after a front vowel;
/// consonant assimilation picks `t` after a voiceless consonant.
pub fn locative_suffix(word: &str) -> &'static str {
    let lower: Vec<char> = word.chars().flat_map(turkish_lowercase).collect();

    let back = lower
        .iter()
        .rev()
        .find(|c| is_vowel(**c))
        .is_some_and(|c| matches!(c, 'a' | 'ı' | 'o' | 'u'));
    let hard = lower
        .last()
        .is_some_and(|c| matches!(c, 'f' | 's' | 't' | 'k' | 'ç' | 'ş' | 'h' | 'p'));

    match (hard, back) {
        (false, true) => "'da",
        (false, false) => "'de",
        (true, true) => "'ta",
        (true, false) => "'te",
    }
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'ı' | 'i' | 'o' | 'ö' | 'u' | 'ü')
}

// `I` lowercases to dotless `ı` and `İ` to `i` in Turkish; std maps `İ` to
// `i` plus a combining dot.
fn turkish_lowercase(c: char) -> Vec<char> {
    match c {
        'I' => vec!['ı'],
        'İ' => vec!['i'],
        other => other.to_lowercase().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_follows_vowel_harmony() {
        assert_eq!(locative_suffix("Ankara"), "'da");
        assert_eq!(locative_suffix("İzmir"), "'de");
        assert_eq!(locative_suffix("İstanbul"), "'da");
        assert_eq!(locative_suffix("Edirne"), "'de");
    }

    #[test]
    fn suffix_hardens_after_voiceless_consonant() {
        assert_eq!(locative_suffix("Sinop"), "'ta");
        assert_eq!(locative_suffix("Tokat"), "'ta");
        assert_eq!(locative_suffix("Denizli"), "'de");
        assert_eq!(locative_suffix("Antep"), "'te");
        assert_eq!(locative_suffix("ISPARTA"), "'da");
    }

    #[test]
    fn city_title_defaults_when_missing() {
        assert_eq!(city_title(Some("Bursa")), "Bursa'da Yeni KonuBu!");
        assert_eq!(city_title(None), "Şehir'de Yeni KonuBu!");
        assert_eq!(city_title(Some("  ")), "Şehir'de Yeni KonuBu!");
    }

    #[test]
    fn preview_truncates_by_character() {
        let short = "kısa";
        assert_eq!(preview(short), short);

        let long: String = "ğ".repeat(150);
        let cut = preview(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), BODY_PREVIEW_CHARS + 3);

        let exact: String = "a".repeat(BODY_PREVIEW_CHARS);
        assert_eq!(preview(&exact), exact);
    }

    #[test]
    fn message_copy() {
        assert_eq!(message_title(Some("Ayşe")), "Ayşe mesaj gönderdi");
        assert_eq!(message_title(None), "Birisi mesaj gönderdi");
        assert_eq!(message_body("x", true, true), ONE_TIME_IMAGE_BODY);
        assert_eq!(message_body("x", true, false), IMAGE_BODY);
        assert_eq!(message_body("merhaba", false, true), "merhaba");
    }
}
