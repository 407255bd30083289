//! Locale-aware display-name collation
//!
//! Comparison happens on a two-level sort key. The primary level is the name
//! with width variants unified (NFKC), diacritics and voicing marks removed,
//! and case folded. For Japanese, katakana is folded onto hiragana and small
//! kana onto their full-size forms, and the long-vowel mark ー is read as the
//! vowel of the kana before it, which yields 50音順 for kana names.
//! The secondary level is the NFKC form itself, so names that differ only
//! in marks still have a stable total order.

use std::cmp::Ordering;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Sort key for one display name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CollationKey {
    primary: String,
    secondary: String,
}

impl CollationKey {
    pub fn primary(&self) -> &str {
        &self.primary
    }
}

/// String collation for one locale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Collator {
    /// Kana-aware ordering for `ja`
    #[default]
    Japanese,
    /// Locale-neutral ordering
    Root,
}

impl Collator {
    /// Collator for a BCP 47 locale tag; anything that is not Japanese gets
    /// the root ordering.
    pub fn for_locale(locale: &str) -> Self {
        let language = locale
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if language == "ja" {
            Collator::Japanese
        } else {
            Collator::Root
        }
    }

    pub fn sort_key(&self, s: &str) -> CollationKey {
        let secondary: String = s.nfkc().collect();
        let folded = secondary
            .nfd()
            .filter(|c| !is_combining_mark(*c))
            .flat_map(char::to_lowercase)
            .map(|c| match self {
                Collator::Japanese => fold_kana(c),
                Collator::Root => c,
            });
        let primary = match self {
            Collator::Japanese => expand_long_vowels(folded),
            Collator::Root => folded.collect(),
        };
        CollationKey { primary, secondary }
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        self.sort_key(a).cmp(&self.sort_key(b))
    }
}

/// Replace each ー with the vowel of the preceding kana; a mark with no
/// vowel before it is kept as is
fn expand_long_vowels(chars: impl Iterator<Item = char>) -> String {
    let mut out = String::new();
    let mut previous: Option<char> = None;
    for c in chars {
        let c = match (c, previous.and_then(vowel_of)) {
            ('ー', Some(vowel)) => vowel,
            _ => c,
        };
        out.push(c);
        previous = Some(c);
    }
    out
}

/// Vowel row of an unvoiced full-size hiragana
fn vowel_of(c: char) -> Option<char> {
    const ROWS: [(char, &str); 5] = [
        ('あ', "あかさたなはまやらわ"),
        ('い', "いきしちにひみりゐ"),
        ('う', "うくすつぬふむゆる"),
        ('え', "えけせてねへめれゑ"),
        ('お', "おこそとのほもよろを"),
    ];
    ROWS.iter()
        .find(|(_, row)| row.contains(c))
        .map(|(vowel, _)| *vowel)
}

/// Map katakana to hiragana and small kana to full size
fn fold_kana(c: char) -> char {
    let c = match c {
        'ァ'..='ヶ' => char::from_u32(c as u32 - 0x60).unwrap_or(c),
        _ => c,
    };
    match c {
        'ぁ' => 'あ',
        'ぃ' => 'い',
        'ぅ' => 'う',
        'ぇ' => 'え',
        'ぉ' => 'お',
        'っ' => 'つ',
        'ゃ' => 'や',
        'ゅ' => 'ゆ',
        'ょ' => 'よ',
        'ゎ' => 'わ',
        'ゕ' => 'か',
        'ゖ' => 'け',
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(collator: Collator, names: &[&str]) -> Vec<String> {
        let mut names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        names.sort_by(|a, b| collator.compare(a, b));
        names
    }

    #[test]
    fn test_for_locale() {
        assert_eq!(Collator::for_locale("ja"), Collator::Japanese);
        assert_eq!(Collator::for_locale("ja-JP"), Collator::Japanese);
        assert_eq!(Collator::for_locale("en_US"), Collator::Root);
        assert_eq!(Collator::for_locale(""), Collator::Root);
    }

    #[test]
    fn test_katakana_interleaves_with_hiragana() {
        let names = sorted(
            Collator::Japanese,
            &["トマト", "いちご", "キャベツ", "だいこん", "かぶ"],
        );
        assert_eq!(names, vec!["いちご", "かぶ", "キャベツ", "だいこん", "トマト"]);
    }

    #[test]
    fn test_voicing_is_secondary() {
        let c = Collator::Japanese;
        assert_eq!(c.sort_key("かき").primary(), c.sort_key("がき").primary());
        assert_eq!(c.compare("かき", "がき"), Ordering::Less);
        assert_eq!(c.compare("がき", "かく"), Ordering::Less);
    }

    #[test]
    fn test_long_vowel_mark_reads_as_vowel() {
        let c = Collator::Japanese;
        assert_eq!(c.sort_key("ピーマン").primary(), "ひいまん");
        assert_eq!(c.sort_key("ブロッコリー").primary(), "ふろつこりい");
        assert_eq!(c.compare("ゴーヤ", "ごぼう"), Ordering::Less);
        assert_eq!(c.compare("ピーマン", "ひよこ"), Ordering::Less);

        let names = sorted(
            Collator::Japanese,
            &["ブロッコリー", "ひよこ", "ごぼう", "ふき", "ゴーヤ", "ピーマン"],
        );
        assert_eq!(
            names,
            vec!["ゴーヤ", "ごぼう", "ピーマン", "ひよこ", "ふき", "ブロッコリー"]
        );
    }

    #[test]
    fn test_small_kana_and_width_fold() {
        let c = Collator::Japanese;
        assert_eq!(c.sort_key("ｷｬﾍﾞﾂ").primary(), c.sort_key("きやへつ").primary());
        assert_eq!(c.sort_key("ＡＢＣ").primary(), "abc");
    }

    #[test]
    fn test_root_keeps_kana_distinct() {
        let c = Collator::Root;
        assert_ne!(c.sort_key("トマト").primary(), c.sort_key("とまと").primary());
        assert_eq!(c.sort_key("Éclair").primary(), "eclair");
        assert_ne!(c.compare("Éclair", "eclair"), Ordering::Equal);
        assert_eq!(c.compare("apple", "Banana"), Ordering::Less);
    }
}
