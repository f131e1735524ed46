//! Metadata key translation
//!
//! Detail pages list metadata as `label: values` rows with Arabic labels that
//! differ between movie and series pages. Each label maps onto one stable
//! English key; rows with unknown labels are dropped.

/// Arabic row label -> stored metadata key
const KEY_TABLE: &[(&str, &str)] = &[
    ("قسم المسلسل", "category"),
    ("قسم الفيلم", "category"),
    ("نوع المسلسل", "genres"),
    ("نوع الفيلم", "genres"),
    ("النوع", "genres"),
    ("جودة المسلسل", "quality"),
    ("جودة الفيلم", "quality"),
    ("عدد الحلقات", "episode_count"),
    ("توقيت المسلسل", "duration"),
    ("توقيت الفيلم", "duration"),
    ("مدة الفيلم", "duration"),
    ("موعد الصدور", "release_year"),
    ("سنة الانتاج", "release_year"),
    ("لغة المسلسل", "language"),
    ("لغة الفيلم", "language"),
    ("دولة المسلسل", "country"),
    ("دولة الفيلم", "country"),
    ("المخرجين", "directors"),
    ("المخرج", "directors"),
    ("بطولة", "cast"),
];

/// Translates a row label into its metadata key
///
/// Surrounding whitespace and a trailing colon are ignored.
pub fn translate_key(label: &str) -> Option<&'static str> {
    let label = label.trim().trim_end_matches(':').trim();
    KEY_TABLE
        .iter()
        .find(|(arabic, _)| *arabic == label)
        .map(|(_, key)| *key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_known_keys() {
        assert_eq!(translate_key("نوع المسلسل"), Some("genres"));
        assert_eq!(translate_key("النوع :"), Some("genres"));
        assert_eq!(translate_key(" مدة الفيلم: "), Some("duration"));
        assert_eq!(translate_key("بطولة"), Some("cast"));
    }

    #[test]
    fn test_unknown_keys_are_dropped() {
        assert_eq!(translate_key("الكاتب"), None);
        assert_eq!(translate_key(""), None);
        assert_eq!(translate_key("genres"), None);
    }
}
