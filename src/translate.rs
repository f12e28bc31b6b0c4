//! Translation between the alien script, IPA phonetics and human text.
//!
//! Every alien glyph stands for exactly one IPA sound, so decoding is a
//! per-character substitution. Encoding goes through a pronunciation table:
//! words are replaced by their IPA transcription, the transcription is folded
//! onto the sound inventory, and every sound with a glyph becomes that glyph.

use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Glyph → IPA sound. `☂` is the word separator.
pub const GLYPH_SOUNDS: [(char, char); 41] = [
    ('☂', ' '),
    ('☀', 'ˌ'),
    ('☁', 'ˈ'),
    ('☑', 'i'),
    ('☒', 'ɪ'),
    ('☌', 'ɛ'),
    ('☃', 'a'),
    ('★', 'æ'),
    ('☋', 'ə'),
    ('☢', 'ɐ'),
    ('☟', 'u'),
    ('☇', 'o'),
    ('☍', 'ɜ'),
    ('☏', 'ɡ'),
    ('☞', 't'),
    ('☚', 'p'),
    ('☎', 'f'),
    ('☡', 'v'),
    ('☉', 'ð'),
    ('☜', 's'),
    ('☤', 'z'),
    ('☖', 'm'),
    ('☗', 'n'),
    ('☘', 'ŋ'),
    ('☐', 'h'),
    ('☕', 'l'),
    ('☛', 'r'),
    ('☣', 'w'),
    ('☆', 'b'),
    ('☦', 'θ'),
    ('☔', 'k'),
    ('☠', 'ʊ'),
    ('☈', 'd'),
    ('☙', 'ʌ'),
    ('☥', 'ʒ'),
    ('☝', 'ʃ'),
    ('☊', 'e'),
    ('☓', 'j'),
    ('☄', 'ɑ'),
    ('☨', 'ʧ'),
    ('☧', 'ʤ'),
];

/// Transcription symbols folded onto the glyph inventory before encoding.
const SOUND_FOLDS: [(char, char); 7] = [
    ('ɫ', 'l'),
    ('ɔ', 'o'),
    ('ɹ', 'r'),
    ('g', 'ɡ'),
    ('ɝ', 'r'),
    ('y', 'i'),
    ('q', 'k'),
];

static SOUNDS: Lazy<HashMap<char, char>> = Lazy::new(|| GLYPH_SOUNDS.iter().copied().collect());
static GLYPHS: Lazy<HashMap<char, char>> =
    Lazy::new(|| GLYPH_SOUNDS.iter().map(|&(glyph, sound)| (sound, glyph)).collect());
static TOKENS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\w']+|[^\s\w]+|\s+")
        .unwrap_or_else(|e| panic!("Failed to compile token pattern: {e}"))
});

pub fn sound_of(glyph: char) -> Option<char> {
    SOUNDS.get(&glyph).copied()
}

pub fn glyph_of(sound: char) -> Option<char> {
    GLYPHS.get(&sound).copied()
}

pub fn is_glyph(c: char) -> bool {
    SOUNDS.contains_key(&c)
}

fn fold_sound(c: char) -> char {
    SOUND_FOLDS
        .iter()
        .find(|&&(from, _)| from == c)
        .map_or(c, |&(_, to)| to)
}

/// Alien text to IPA; characters that are not glyphs pass through.
pub fn alien_to_sounds(alien: &str) -> String {
    alien.chars().map(|c| sound_of(c).unwrap_or(c)).collect()
}

/// IPA to alien; sounds without a glyph pass through.
pub fn sounds_to_alien(sounds: &str) -> String {
    sounds
        .chars()
        .map(fold_sound)
        .map(|c| glyph_of(c).unwrap_or(c))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    French,
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::English),
            "fr" | "french" => Ok(Language::French),
            other => Err(format!("unknown language: {other}")),
        }
    }
}

/// Word → first IPA transcription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PronunciationTable {
    entries: HashMap<String, String>,
}

impl PronunciationTable {
    /// Parses `<word>\t/opt1/, /opt2/, …` lines. Lines without a tab are
    /// ignored; later duplicates win.
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .filter_map(|line| line.split_once('\t'))
            .map(|(word, options)| {
                let first = options.split(", ").next().unwrap_or(options);
                let first = first.strip_prefix('/').unwrap_or(first);
                let first = first.strip_suffix('/').unwrap_or(first);
                (word.to_string(), first.to_string())
            })
            .collect();
        Self { entries }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Like [`PronunciationTable::load`], but a missing or unreadable file
    /// yields an empty table.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(table) => {
                info!(path = %path.display(), words = table.len(), "loaded pronunciation table");
                table
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "pronunciation table unavailable");
                Self::default()
            }
        }
    }

    pub fn get(&self, word: &str) -> Option<&str> {
        self.entries.get(word).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Translator {
    english: PronunciationTable,
    french: PronunciationTable,
}

impl Translator {
    pub fn new(english: PronunciationTable, french: PronunciationTable) -> Self {
        Self { english, french }
    }

    pub fn load(english: impl AsRef<Path>, french: impl AsRef<Path>) -> Self {
        Self::new(
            PronunciationTable::load_or_empty(english),
            PronunciationTable::load_or_empty(french),
        )
    }

    pub fn table(&self, language: Language) -> &PronunciationTable {
        match language {
            Language::English => &self.english,
            Language::French => &self.french,
        }
    }

    /// Human text to IPA: lowercased, tokenized, known words transcribed.
    /// Unknown tokens are kept as typed.
    pub fn to_sounds(&self, text: &str, language: Language) -> String {
        let table = self.table(language);
        let lowercase = text.to_lowercase();
        TOKENS
            .find_iter(&lowercase)
            .map(|token| table.get(token.as_str()).unwrap_or(token.as_str()))
            .collect()
    }

    pub fn encode(&self, text: &str, language: Language) -> String {
        sounds_to_alien(&self.to_sounds(text, language))
    }

    pub fn decode(&self, alien: &str) -> String {
        alien_to_sounds(alien)
    }
}
