//! Sanitization of accepted message content before chunking.
//!
//! Grounded on `message_processor.py`'s `_process_discord_markup` and
//! `_clean_text_for_tts`, plus `message_validator.py`'s pattern filters.

use once_cell::sync::Lazy;
use regex::Regex;

static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static USER_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<@!?\d+>").unwrap());
static CHANNEL_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<#\d+>").unwrap());
static ROLE_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<@&\d+>").unwrap());
static CUSTOM_EMOJI: Lazy<Regex> = Lazy::new(|| Regex::new(r"<a?:[a-zA-Z0-9_]+:\d+>").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static EXCLAMATION_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[!！]{2,}").unwrap());
static QUESTION_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?？]{2,}").unwrap());
static PERIOD_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.。]{2,}").unwrap());

const EMOTICON_REPLACEMENTS: &[(&str, &str)] = &[
    (":)", "smile"),
    (":D", "big smile"),
    (":(", "sad"),
    (":P", "tongue out"),
    ("xD", "laughing hard"),
    ("lol", "laugh out loud"),
    ("LOL", "laugh out loud"),
    ("www", "laughing"),
    ("WWW", "laughing"),
];

const MARKUP_TOKENS: &[&str] = &["**", "__", "~~", "||", "`", "*", "_", "\\"];

/// Collapses whitespace, strips markup and non-printables, and replaces
/// mention/embed tokens with generic words. Length limiting is left to
/// chunking downstream, not performed here.
pub fn sanitize(raw: &str) -> String {
    let mut text = raw.to_string();

    text = URL.replace_all(&text, "link").into_owned();
    text = USER_MENTION.replace_all(&text, "someone").into_owned();
    text = CHANNEL_MENTION.replace_all(&text, "channel").into_owned();
    text = ROLE_MENTION.replace_all(&text, "role").into_owned();
    text = CUSTOM_EMOJI.replace_all(&text, "emoji").into_owned();

    for token in MARKUP_TOKENS {
        text = text.replace(token, "");
    }

    text = text.replace('\n', ". ").replace('\r', "").replace('\t', " ");

    text = text
        .replace('\u{2026}', "...") // horizontal ellipsis
        .replace(['\u{2013}', '\u{2014}'], "-"); // en/em dash

    for (emoticon, replacement) in EMOTICON_REPLACEMENTS {
        text = text.replace(emoticon, replacement);
    }

    text = EXCLAMATION_RUN.replace_all(&text, "!").into_owned();
    text = QUESTION_RUN.replace_all(&text, "?").into_owned();
    text = PERIOD_RUN.replace_all(&text, ".").into_owned();

    text = text.chars().filter(|c| !c.is_control() || *c == ' ' || *c == '\t' || *c == '\n').collect();

    WHITESPACE_RUN.replace_all(text.trim(), " ").into_owned()
}
