//! Discord transport for the chat bot: signed HTTP interactions, deferred
//! replies and guild command registration.

use crate::bot::{Action, ChatBot, Command, OptionKind};
use crate::config::DiscordConfig;
use crate::{Result, XenoglyphError};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const PING: u8 = 1;
const APPLICATION_COMMAND: u8 = 2;

const PONG: u8 = 1;
const CHANNEL_MESSAGE: u8 = 4;
const DEFERRED_CHANNEL_MESSAGE: u8 = 5;

const OPTION_STRING: u8 = 3;
const OPTION_ATTACHMENT: u8 = 11;

const SIGNATURE_HEADER: &str = "x-signature-ed25519";
const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

#[derive(Debug, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub application_id: String,
    #[serde(default)]
    pub token: String,
    pub data: Option<CommandData>,
}

#[derive(Debug, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<OptionValue>,
    #[serde(default)]
    pub resolved: Resolved,
}

#[derive(Debug, Deserialize)]
pub struct OptionValue {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct Resolved {
    #[serde(default)]
    pub attachments: HashMap<String, Attachment>,
}

#[derive(Debug, Deserialize)]
pub struct Attachment {
    pub url: String,
}

impl CommandData {
    /// Value of the command's option: the text itself, or the URL of the
    /// referenced attachment.
    pub fn option_value(&self, command: Command) -> Option<String> {
        let option = command.option()?;
        let value = self.options.iter().find(|o| o.name == option.name)?.value.as_str()?;
        match option.kind {
            OptionKind::Text => Some(value.to_string()),
            OptionKind::Attachment => self.resolved.attachments.get(value).map(|a| a.url.clone()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MessageData {
    pub content: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<MessageData>,
}

impl InteractionResponse {
    fn pong() -> Self {
        Self { kind: PONG, data: None }
    }

    fn message(content: impl Into<String>) -> Self {
        Self { kind: CHANNEL_MESSAGE, data: Some(MessageData { content: content.into() }) }
    }

    fn deferred() -> Self {
        Self { kind: DEFERRED_CHANNEL_MESSAGE, data: None }
    }
}

pub fn parse_public_key(key: &str) -> Result<VerifyingKey> {
    let bytes = hex::decode(key.trim())
        .map_err(|e| XenoglyphError::Discord(format!("public key is not hex: {e}")))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| XenoglyphError::Discord("public key must be 32 bytes".into()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| XenoglyphError::Discord(e.to_string()))
}

/// Ed25519 check of `timestamp ‖ body` against the hex signature header.
pub fn verify_signature(key: &VerifyingKey, signature: &str, timestamp: &str, body: &[u8]) -> bool {
    let Ok(signature) = hex::decode(signature) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&signature) else {
        return false;
    };
    let mut message = Vec::with_capacity(timestamp.len() + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(body);
    key.verify(&message, &signature).is_ok()
}

pub struct Interactions {
    bot: ChatBot,
    public_key: VerifyingKey,
    api_base: String,
    client: reqwest::Client,
}

impl Interactions {
    pub fn new(bot: ChatBot, public_key: VerifyingKey, api_base: impl Into<String>) -> Self {
        Self { bot, public_key, api_base: api_base.into(), client: reqwest::Client::new() }
    }

    /// Immediate response to an interaction. Image decoding is deferred and
    /// its result edited into the original response later.
    pub fn respond(self: &Arc<Self>, interaction: Interaction) -> InteractionResponse {
        match interaction.kind {
            PING => InteractionResponse::pong(),
            APPLICATION_COMMAND => {
                let Some(data) = interaction.data else {
                    return InteractionResponse::message("missing command data");
                };
                let command = match data.name.parse::<Command>() {
                    Ok(command) => command,
                    Err(e) => return InteractionResponse::message(e),
                };
                match self.bot.dispatch(command, data.option_value(command).as_deref()) {
                    Action::Reply(content) => InteractionResponse::message(content),
                    Action::DecodeImage(url) => {
                        let this = Arc::clone(self);
                        let (application_id, token) = (interaction.application_id, interaction.token);
                        tokio::spawn(async move {
                            let content = this.bot.decode_attachment(&url).await;
                            if let Err(e) = this.edit_original(&application_id, &token, content).await {
                                warn!(error = %e, "failed to deliver deferred reply");
                            }
                        });
                        InteractionResponse::deferred()
                    }
                }
            }
            other => {
                warn!(kind = other, "unsupported interaction type");
                InteractionResponse::message("unsupported interaction")
            }
        }
    }

    async fn edit_original(&self, application_id: &str, token: &str, content: String) -> reqwest::Result<()> {
        let url = format!("{}/webhooks/{application_id}/{token}/messages/@original", self.api_base);
        self.client
            .patch(url)
            .json(&MessageData { content })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn interactions(
    State(state): State<Arc<Interactions>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (Some(signature), Some(timestamp)) =
        (header(&headers, SIGNATURE_HEADER), header(&headers, TIMESTAMP_HEADER))
    else {
        return (StatusCode::UNAUTHORIZED, "missing request signature").into_response();
    };
    if !verify_signature(&state.public_key, signature, timestamp, &body) {
        debug!("rejected interaction with a bad signature");
        return (StatusCode::UNAUTHORIZED, "invalid request signature").into_response();
    }
    let interaction: Interaction = match serde_json::from_slice(&body) {
        Ok(interaction) => interaction,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    Json(state.respond(interaction)).into_response()
}

/// Interactions endpoint, or an empty router when no public key is set.
pub fn router(bot: ChatBot, config: &DiscordConfig) -> Result<Router> {
    let Some(key) = config.public_key.as_deref() else {
        info!("no discord public key configured, interactions endpoint disabled");
        return Ok(Router::new());
    };
    let state = Arc::new(Interactions::new(bot, parse_public_key(key)?, config.api_base.clone()));
    Ok(Router::new().route("/api/v1/interactions", post(interactions)).with_state(state))
}

#[derive(Debug, Serialize)]
pub struct CommandDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionDefinition>,
}

#[derive(Debug, Serialize)]
pub struct OptionDefinition {
    #[serde(rename = "type")]
    pub kind: u8,
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

pub fn command_definitions() -> Vec<CommandDefinition> {
    Command::ALL
        .into_iter()
        .map(|command| CommandDefinition {
            name: command.name(),
            description: command.description(),
            options: command
                .option()
                .map(|option| OptionDefinition {
                    kind: match option.kind {
                        OptionKind::Text => OPTION_STRING,
                        OptionKind::Attachment => OPTION_ATTACHMENT,
                    },
                    name: option.name,
                    description: option.description,
                    required: true,
                })
                .into_iter()
                .collect(),
        })
        .collect()
}

/// Replaces the application's command set in the configured guild, or
/// globally when no guild is set. Returns the number of commands.
pub async fn register_commands(config: &DiscordConfig) -> Result<usize> {
    let missing = |what: &str| XenoglyphError::Discord(format!("{what} is not configured"));
    let application_id = config.application_id.as_deref().ok_or_else(|| missing("application_id"))?;
    let token = config.bot_token.as_deref().ok_or_else(|| missing("bot_token"))?;
    let url = match &config.guild_id {
        Some(guild) => format!("{}/applications/{application_id}/guilds/{guild}/commands", config.api_base),
        None => format!("{}/applications/{application_id}/commands", config.api_base),
    };

    let definitions = command_definitions();
    reqwest::Client::new()
        .put(&url)
        .header(AUTHORIZATION, format!("Bot {token}"))
        .json(&definitions)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|e| XenoglyphError::Discord(format!("registering commands: {e}")))?;

    info!(count = definitions.len(), guild = ?config.guild_id, "registered commands");
    Ok(definitions.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::Recognizer;
    use crate::service::Service;
    use crate::templates::TemplateLibrary;
    use crate::translate::Translator;
    use axum::body::Body;
    use axum::http::Request;
    use ed25519_dalek::{Signer, SigningKey};
    use tower::ServiceExt;

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn bot() -> ChatBot {
        ChatBot::new(Service::new(Recognizer::new(TemplateLibrary::default()), Translator::default()))
    }

    fn app() -> Router {
        let config = DiscordConfig {
            public_key: Some(hex::encode(signing_key().verifying_key().to_bytes())),
            ..Default::default()
        };
        router(bot(), &config).unwrap()
    }

    fn signed(body: &str, key: &SigningKey) -> Request<Body> {
        let timestamp = "1700000000";
        let signature = key.sign(format!("{timestamp}{body}").as_bytes());
        Request::post("/api/v1/interactions")
            .header(SIGNATURE_HEADER, hex::encode(signature.to_bytes()))
            .header(TIMESTAMP_HEADER, timestamp)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn signatures_cover_timestamp_and_body() {
        let key = signing_key();
        let public = key.verifying_key();
        let signature = hex::encode(key.sign(b"123{}").to_bytes());
        assert!(verify_signature(&public, &signature, "123", b"{}"));
        assert!(!verify_signature(&public, &signature, "124", b"{}"));
        assert!(!verify_signature(&public, &signature, "123", b"{ }"));
        assert!(!verify_signature(&public, "zz", "123", b"{}"));
    }

    #[test]
    fn public_key_must_be_32_hex_bytes() {
        assert!(parse_public_key("abcd").is_err());
        assert!(parse_public_key("not hex").is_err());
        let key = hex::encode(signing_key().verifying_key().to_bytes());
        assert!(parse_public_key(&key).is_ok());
    }

    #[test]
    fn attachment_options_resolve_to_urls() {
        let data: CommandData = serde_json::from_value(serde_json::json!({
            "name": "gneep",
            "options": [{ "name": "image", "type": 11, "value": "99" }],
            "resolved": { "attachments": { "99": { "id": "99", "url": "https://cdn.example/x.png" } } }
        }))
        .unwrap();
        assert_eq!(data.option_value(Command::Gneep).as_deref(), Some("https://cdn.example/x.png"));
        assert_eq!(data.option_value(Command::Kill), None);
    }

    #[test]
    fn definitions_cover_every_command() {
        let definitions = command_definitions();
        assert_eq!(definitions.len(), 8);
        let json = serde_json::to_value(&definitions).unwrap();
        assert_eq!(json[0]["name"], "gneep");
        assert_eq!(json[0]["options"][0]["type"], 11);
        assert_eq!(json[1]["options"][0]["type"], 3);
        assert!(json[6].get("options").is_none());
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let response = app().oneshot(signed(r#"{"type":1}"#, &signing_key())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({ "type": 1 }));
    }

    #[tokio::test]
    async fn forged_requests_are_unauthorized() {
        let forger = SigningKey::from_bytes(&[9u8; 32]);
        let response = app().oneshot(signed(r#"{"type":1}"#, &forger)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let unsigned = Request::post("/api/v1/interactions").body(Body::from("{}")).unwrap();
        let response = app().oneshot(unsigned).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn commands_reply_inline() {
        let body = r#"{"type":2,"application_id":"1","token":"t",
            "data":{"name":"glorp","options":[{"name":"text","type":3,"value":"☐☂☐"}]}}"#;
        let response = app().oneshot(signed(body, &signing_key())).await.unwrap();
        let json = json_body(response).await;
        assert_eq!(json["type"], 4);
        assert_eq!(json["data"]["content"], "h h");
    }

    #[tokio::test]
    async fn missing_key_disables_the_endpoint() {
        let app = router(bot(), &DiscordConfig::default()).unwrap();
        let response = app.oneshot(signed(r#"{"type":1}"#, &signing_key())).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
