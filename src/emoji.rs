//! Custom chat emoji standing in for the alien glyphs.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

/// Longest message a chat reply may carry, in characters.
pub const MESSAGE_LIMIT: usize = 2000;

/// Glyph → (emoji name, emoji id).
pub const EMOJI_NAMES: [(char, &str, &str); 41] = [
    ('☊', "hvz_36", "1354569163733078071"),
    ('☋', "hvz_41", "1354569154367062016"),
    ('☌', "hvz_29", "1354569230535758105"),
    ('☍', "hvz_18", "1354569345707016324"),
    ('☎', "hvz_28", "1354569233270308935"),
    ('☏', "hvz_27", "1354569235875238112"),
    ('☚', "hvz_16", "1354569349368905789"),
    ('☛', "hvz_15", "1354569351252017182"),
    ('☜', "hvz_14", "1354569352703381604"),
    ('☝', "hvz_13", "1354569354355806389"),
    ('☞', "hvz_10", "1354569383241973774"),
    ('☟', "hvz_19", "1354569344239276063"),
    ('☀', "hvz_2", "1354574504973832332"),
    ('☁', "hvz_1", "1354574506089385988"),
    ('☂', "hvz_11", "1354569381388226560"),
    ('☃', "hvz_39", "1354569157433229482"),
    ('☄', "hvz_37", "1354569161245851859"),
    ('★', "hvz_40", "1354569155914895450"),
    ('☆', "hvz_35", "1354569166278885517"),
    ('☇', "hvz_20", "1354569342620008498"),
    ('☈', "hvz_33", "1354569170867716217"),
    ('☉', "hvz_9", "1354569384693207080"),
    ('☐', "hvz_26", "1354569237901082816"),
    ('☑', "hvz_31", "1354569218565345290"),
    ('☒', "hvz_30", "1354569222151471315"),
    ('☓', "hvz_4", "1354569395615305910"),
    ('☔', "hvz_25", "1354569240484647134"),
    ('☕', "hvz_24", "1354569242082541670"),
    ('☖', "hvz_23", "1354569245769601305"),
    ('☗', "hvz_21", "1354569341219373317"),
    ('☘', "hvz_22", "1354569333388607539"),
    ('☙', "hvz_7", "1354569388048777358"),
    ('☠', "hvz_17", "1354569347762225323"),
    ('☡', "hvz_6", "1354569391190053034"),
    ('☢', "hvz_38", "1354569158985121792"),
    ('☣', "hvz_5", "1354569393094525149"),
    ('☤', "hvz_3", "1354569397531836500"),
    ('☥', "hvz_12", "1354569379869622353"),
    ('☦', "hvz_8", "1354569386467524741"),
    ('☧', "hvz_32", "1354569172813615258"),
    ('☨', "hvz_34", "1354569168531492906"),
];

static BY_GLYPH: Lazy<HashMap<char, (&'static str, &'static str)>> =
    Lazy::new(|| EMOJI_NAMES.iter().map(|&(glyph, name, id)| (glyph, (name, id))).collect());
static BY_ID: Lazy<HashMap<&'static str, (&'static str, char)>> =
    Lazy::new(|| EMOJI_NAMES.iter().map(|&(glyph, name, id)| (id, (name, glyph))).collect());
static EMOJI_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<:(\w+):(\d+)>").unwrap_or_else(|e| panic!("Failed to compile emoji pattern: {e}"))
});

/// Glyphs as `<:name:id>` emoji tags.
pub fn to_emoji(alien: &str) -> String {
    let mut out = String::with_capacity(alien.len() * 8);
    for c in alien.chars() {
        match BY_GLYPH.get(&c) {
            Some((name, id)) => {
                out.push_str("<:");
                out.push_str(name);
                out.push(':');
                out.push_str(id);
                out.push('>');
            }
            None => out.push(c),
        }
    }
    out
}

/// Emoji tags back to glyphs. Tags of other emoji are left alone.
pub fn from_emoji(text: &str) -> String {
    EMOJI_TAG
        .replace_all(text, |caps: &Captures| {
            match BY_ID.get(&caps[2]) {
                Some(&(name, glyph)) if name == &caps[1] => glyph.to_string(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// `content` if it fits in a chat message, otherwise a note on how far over
/// the limit it is.
pub fn limit_message(content: String) -> String {
    let len = content.chars().count();
    if len > MESSAGE_LIMIT {
        format!("output too long by {} chars", len - MESSAGE_LIMIT)
    } else {
        content
    }
}
