//! Chat-bot commands, independent of the transport delivering them.

use crate::emoji::{from_emoji, limit_message, to_emoji};
use crate::recognizer::CancelToken;
use crate::service::Service;
use crate::translate::Language;
use std::str::FromStr;
use tracing::{info, warn};

pub const NO_TEXT: &str = "no text provided :(";
pub const NO_IMAGE: &str = "no image :(";
pub const DOWNLOAD_FAILED: &str = "could not download image";
pub const PARSE_FAILED: &str = "failed to parse symbols";
pub const HTTP_DISABLED: &str = "http disabled";
pub const HTTP_ENABLED: &str = "http enabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Text,
    Attachment,
}

/// The single option a command takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOption {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: OptionKind,
}

const TEXT_TO_ENCODE: CommandOption =
    CommandOption { name: "text", description: "text to encode", kind: OptionKind::Text };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Image attachment → phonetics.
    Gneep,
    /// English → alien emoji.
    Gnarp,
    /// French → alien emoji.
    GnarpFr,
    /// English → alien characters.
    GnarpRaw,
    /// Alien characters → phonetics.
    Glorp,
    /// Alien emoji → phonetics.
    Glarp,
    Kill,
    Alive,
}

impl Command {
    pub const ALL: [Command; 8] = [
        Command::Gneep,
        Command::Gnarp,
        Command::GnarpFr,
        Command::GnarpRaw,
        Command::Glorp,
        Command::Glarp,
        Command::Kill,
        Command::Alive,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Gneep => "gneep",
            Command::Gnarp => "gnarp",
            Command::GnarpFr => "gnarp-fr",
            Command::GnarpRaw => "gnarp-raw",
            Command::Glorp => "glorp",
            Command::Glarp => "glarp",
            Command::Kill => "kill",
            Command::Alive => "alive",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Command::Gneep => "decode alien text from image",
            Command::Gnarp => "encodes human words as alien discord emojis",
            Command::GnarpFr => "encodes human words as alien discord emojis (french)",
            Command::GnarpRaw => "encodes human words as alien (copy-able as text)",
            Command::Glorp => "decodes alien raw text as human sounds",
            Command::Glarp => "decodes alien discord emojis to human sounds",
            Command::Kill => "disables http server",
            Command::Alive => "enables http server",
        }
    }

    pub fn option(self) -> Option<CommandOption> {
        match self {
            Command::Gneep => Some(CommandOption {
                name: "image",
                description: "image to decode",
                kind: OptionKind::Attachment,
            }),
            Command::Gnarp | Command::GnarpRaw => Some(TEXT_TO_ENCODE),
            Command::GnarpFr => Some(CommandOption {
                description: "text to encode (french)",
                ..TEXT_TO_ENCODE
            }),
            Command::Glorp => Some(CommandOption {
                description: "alien text (rendered as unicode emojis)",
                ..TEXT_TO_ENCODE
            }),
            Command::Glarp => Some(CommandOption { description: "alien emojis", ..TEXT_TO_ENCODE }),
            Command::Kill | Command::Alive => None,
        }
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown command: {s}"))
    }
}

/// What the transport should do with a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Reply(String),
    /// Download the attachment and run [`ChatBot::decode_attachment`].
    DecodeImage(String),
}

#[derive(Debug, Clone)]
pub struct ChatBot {
    service: Service,
    client: reqwest::Client,
}

impl ChatBot {
    pub fn new(service: Service) -> Self {
        Self { service, client: reqwest::Client::new() }
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Runs `command` with its option value: the text for text commands,
    /// the attachment URL for `gneep`. The kill-switch only gates HTTP, so
    /// translating commands run regardless.
    pub fn dispatch(&self, command: Command, option: Option<&str>) -> Action {
        info!(command = command.name(), "chat command");
        let with_text = |translate: fn(&Service, &str) -> String| match option {
            Some(text) => translate(&self.service, text),
            None => NO_TEXT.to_string(),
        };
        let reply = match command {
            Command::Gneep => {
                return match option {
                    Some(url) => Action::DecodeImage(url.to_string()),
                    None => Action::Reply(NO_IMAGE.into()),
                }
            }
            Command::Kill => {
                self.service.kill_switch().kill();
                HTTP_DISABLED.to_string()
            }
            Command::Alive => {
                self.service.kill_switch().revive();
                HTTP_ENABLED.to_string()
            }
            Command::Gnarp => with_text(|s, text| to_emoji(&s.encode_text(text, Language::English))),
            Command::GnarpFr => with_text(|s, text| to_emoji(&s.encode_text(text, Language::French))),
            Command::GnarpRaw => with_text(|s, text| s.encode_text(text, Language::English)),
            Command::Glorp => with_text(|s, text| s.decode_text(text).phonetics),
            Command::Glarp => with_text(|s, text| s.decode_text(&from_emoji(text)).phonetics),
        };
        Action::Reply(limit_message(reply))
    }

    /// Downloads and decodes an image attachment into a chat reply.
    pub async fn decode_attachment(&self, url: &str) -> String {
        let bytes = match self.download(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "attachment download failed");
                return DOWNLOAD_FAILED.into();
            }
        };
        self.decode_image(bytes).await
    }

    async fn download(&self, url: &str) -> reqwest::Result<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn decode_image(&self, bytes: Vec<u8>) -> String {
        let service = self.service.clone();
        let decoded =
            tokio::task::spawn_blocking(move || service.decode_image(&bytes, &CancelToken::new()))
                .await;
        match decoded {
            Ok(Ok(decoded)) => limit_message(format!("`{}`", decoded.phonetics)),
            Ok(Err(e)) => {
                warn!(error = %e, "image decode failed");
                PARSE_FAILED.into()
            }
            Err(e) => {
                warn!(error = %e, "image decode task failed");
                PARSE_FAILED.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::Recognizer;
    use crate::templates::TemplateLibrary;
    use crate::translate::{PronunciationTable, Translator};

    fn bot() -> ChatBot {
        let translator = Translator::new(
            PronunciationTable::parse("hello\t/həˈɫoʊ/\n"),
            PronunciationTable::parse("élève\t/elɛv/\n"),
        );
        ChatBot::new(Service::new(Recognizer::new(TemplateLibrary::default()), translator))
    }

    fn reply(bot: &ChatBot, command: Command, option: Option<&str>) -> String {
        match bot.dispatch(command, option) {
            Action::Reply(text) => text,
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[test]
    fn command_names_round_trip() {
        for command in Command::ALL {
            assert_eq!(command.name().parse::<Command>().unwrap(), command);
        }
        assert!("gnorp".parse::<Command>().is_err());
    }

    #[test]
    fn encode_commands() {
        let bot = bot();
        assert_eq!(reply(&bot, Command::GnarpRaw, Some("hello")), "☐☋☁☕☇☠");
        assert_eq!(
            reply(&bot, Command::Gnarp, Some("hello")),
            crate::emoji::to_emoji("☐☋☁☕☇☠")
        );
        assert_eq!(reply(&bot, Command::GnarpFr, Some("élève")), crate::emoji::to_emoji("☊☕☌☡"));
    }

    #[test]
    fn decode_commands() {
        let bot = bot();
        assert_eq!(reply(&bot, Command::Glorp, Some("☐☋☁☕☇☠")), "həˈloʊ");
        let emoji = crate::emoji::to_emoji("☐☋☁☕☇☠");
        assert_eq!(reply(&bot, Command::Glarp, Some(&emoji)), "həˈloʊ");
    }

    #[test]
    fn missing_options() {
        let bot = bot();
        assert_eq!(reply(&bot, Command::Gnarp, None), NO_TEXT);
        assert_eq!(reply(&bot, Command::Glarp, None), NO_TEXT);
        assert_eq!(reply(&bot, Command::Gneep, None), NO_IMAGE);
        assert_eq!(
            bot.dispatch(Command::Gneep, Some("https://cdn.example/a.png")),
            Action::DecodeImage("https://cdn.example/a.png".into())
        );
    }

    #[test]
    fn every_option_command_answers() {
        let bot = bot();
        for command in Command::ALL {
            let Some(option) = command.option() else { continue };
            let missing = match option.kind {
                OptionKind::Text => NO_TEXT,
                OptionKind::Attachment => NO_IMAGE,
            };
            assert_eq!(reply(&bot, command, None), missing, "{}", command.name());
            if option.kind == OptionKind::Text {
                assert!(!reply(&bot, command, Some("hello")).is_empty(), "{}", command.name());
            }
        }
    }

    #[test]
    fn kill_and_alive_toggle_http() {
        let bot = bot();
        assert_eq!(reply(&bot, Command::Kill, None), HTTP_DISABLED);
        assert!(bot.service().kill_switch().is_killed());
        // Chat translation keeps working while HTTP is disabled.
        assert_eq!(reply(&bot, Command::Glorp, Some("☐")), "h");
        assert_eq!(reply(&bot, Command::Alive, None), HTTP_ENABLED);
        assert!(!bot.service().kill_switch().is_killed());
    }

    #[test]
    fn overlong_emoji_reply_reports_the_excess() {
        let text = "hello ".repeat(100);
        let out = reply(&bot(), Command::Gnarp, Some(&text));
        assert!(out.starts_with("output too long by "), "{out}");
    }

    #[tokio::test]
    async fn undecodable_image_fails_to_parse() {
        assert_eq!(bot().decode_image(b"nope".to_vec()).await, PARSE_FAILED);
    }

    #[tokio::test]
    async fn unreachable_attachment_fails_to_download() {
        assert_eq!(bot().decode_attachment("http://127.0.0.1:9/a.png").await, DOWNLOAD_FAILED);
    }
}
