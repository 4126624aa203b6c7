use once_cell::sync::Lazy;
use regex::Regex;

static LETTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}").expect("letter"));
static LATIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]").expect("latin"));
static CJK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[一-鿿]").expect("cjk"));
static CYRILLIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[Ѐ-ӿ]").expect("cyrillic"));
static ARABIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[؀-ۿ]").expect("arabic"));

/// Text with no letters (numbers, bullets, separators) is passed through
/// untranslated.
pub fn is_trivial_text(text: &str) -> bool {
    let plain = text.trim();
    plain.is_empty() || !LETTER_RE.is_match(plain)
}

/// Best-effort source language guess from extracted text samples, by dominant
/// script. Used only when the job options leave the source language unset.
pub fn detect_source_lang(excerpts: &[String]) -> &'static str {
    let mut latin = 0usize;
    let mut cjk = 0usize;
    let mut cyrillic = 0usize;
    let mut arabic = 0usize;
    for ex in excerpts {
        latin += LATIN_RE.find_iter(ex).count();
        cjk += CJK_RE.find_iter(ex).count();
        cyrillic += CYRILLIC_RE.find_iter(ex).count();
        arabic += ARABIC_RE.find_iter(ex).count();
    }
    let max = latin.max(cjk).max(cyrillic).max(arabic);
    if max == 0 || max == latin {
        "en"
    } else if max == cjk {
        "zh"
    } else if max == cyrillic {
        "ru"
    } else {
        "ar"
    }
}

/// Human-readable language name for prompts; unknown codes pass through.
pub fn lang_label(code: &str) -> &str {
    match code.trim().to_ascii_lowercase().as_str() {
        "en" => "English",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "it" => "Italian",
        "pt" => "Portuguese",
        "nl" => "Dutch",
        "pl" => "Polish",
        "ru" => "Russian",
        "ar" => "Arabic",
        "zh" => "Chinese",
        "ja" => "Japanese",
        "ko" => "Korean",
        _ => code,
    }
}
