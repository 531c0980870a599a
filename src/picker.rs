//! Language choices offered to the user.

use crate::error::{Result, TranslatorError};

/// Languages the on-device models cover, with English display names
pub const LANGUAGES: &[(&str, &str)] = &[
    ("af", "Afrikaans"),
    ("ar", "Arabic"),
    ("be", "Belarusian"),
    ("bg", "Bulgarian"),
    ("bn", "Bengali"),
    ("ca", "Catalan"),
    ("cs", "Czech"),
    ("cy", "Welsh"),
    ("da", "Danish"),
    ("de", "German"),
    ("el", "Greek"),
    ("en", "English"),
    ("eo", "Esperanto"),
    ("es", "Spanish"),
    ("et", "Estonian"),
    ("fa", "Persian"),
    ("fi", "Finnish"),
    ("fr", "French"),
    ("ga", "Irish"),
    ("gl", "Galician"),
    ("gu", "Gujarati"),
    ("he", "Hebrew"),
    ("hi", "Hindi"),
    ("hr", "Croatian"),
    ("ht", "Haitian Creole"),
    ("hu", "Hungarian"),
    ("id", "Indonesian"),
    ("is", "Icelandic"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("ka", "Georgian"),
    ("kn", "Kannada"),
    ("ko", "Korean"),
    ("lt", "Lithuanian"),
    ("lv", "Latvian"),
    ("mk", "Macedonian"),
    ("mr", "Marathi"),
    ("ms", "Malay"),
    ("mt", "Maltese"),
    ("nl", "Dutch"),
    ("no", "Norwegian"),
    ("pl", "Polish"),
    ("pt", "Portuguese"),
    ("ro", "Romanian"),
    ("ru", "Russian"),
    ("sk", "Slovak"),
    ("sl", "Slovenian"),
    ("sq", "Albanian"),
    ("sv", "Swedish"),
    ("sw", "Swahili"),
    ("ta", "Tamil"),
    ("te", "Telugu"),
    ("th", "Thai"),
    ("tl", "Tagalog"),
    ("tr", "Turkish"),
    ("uk", "Ukrainian"),
    ("ur", "Urdu"),
    ("vi", "Vietnamese"),
    ("zh", "Chinese"),
];

/// Full language name for a code, or the code itself when unknown
pub fn display_name(code: &str) -> String {
    let code = code.to_lowercase();
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| name.to_string())
        .unwrap_or(code)
}

pub fn is_supported(code: &str) -> bool {
    LANGUAGES.iter().any(|(c, _)| c.eq_ignore_ascii_case(code))
}

/// What the picker hands back to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSelection {
    pub code: String,
    /// Keep the language active when the user navigates to another screen
    pub keep_across_navigation: bool,
}

impl LanguageSelection {
    pub fn parse(code: &str, keep_across_navigation: bool) -> Result<Self> {
        let code = code.trim().to_lowercase();
        if !is_supported(&code) {
            return Err(TranslatorError::UnknownLanguage(code));
        }
        Ok(Self {
            code,
            keep_across_navigation,
        })
    }
}

pub struct LanguagePicker;

impl LanguagePicker {
    /// Entries in display order
    pub fn entries() -> impl Iterator<Item = (&'static str, &'static str)> {
        LANGUAGES.iter().copied()
    }

    /// Selection by list position, as a list view reports it
    pub fn select(index: usize, keep_across_navigation: bool) -> Result<LanguageSelection> {
        let (code, _) = LANGUAGES
            .get(index)
            .ok_or_else(|| TranslatorError::UnknownLanguage(format!("#{}", index)))?;
        Ok(LanguageSelection {
            code: code.to_string(),
            keep_across_navigation,
        })
    }
}
