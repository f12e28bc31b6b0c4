//! xenoglyph CLI - serve the translator or run it on local files

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use xenoglyph::{CancelToken, Config, Language, Service};

const DEFAULT_CONFIG: &str = "xenoglyph.json";

#[derive(Parser)]
#[command(name = "xenoglyph", about = "Alien glyph translator")]
#[command(version)]
struct Cli {
    /// JSON config file (defaults to ./xenoglyph.json when present)
    #[arg(short, long, global = true, env = "XENOGLYPH_CONFIG")]
    config: Option<PathBuf>,
    /// Directory of <symbol>.png glyph templates
    #[arg(short, long, global = true)]
    templates: Option<PathBuf>,
    /// TrueType font with the alien glyphs
    #[arg(short, long, global = true)]
    font: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the interactions endpoint.
    Serve {
        /// Listen address
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Recognize the glyphs in an image.
    Decode {
        image: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Translate human text into alien glyphs.
    Encode {
        text: String,
        /// Use the French pronunciation table
        #[arg(long)]
        french: bool,
        /// Also render the glyphs to this PNG file
        #[arg(long)]
        png: Option<PathBuf>,
    },
    /// Overwrite the chat commands registered for the configured guild.
    RegisterCommands,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).is_file() => {
            Config::load(Path::new(DEFAULT_CONFIG)).context("loading default config")?
        }
        None => Config::default(),
    };
    config.apply_env();
    if let Some(dir) = &cli.templates {
        config.templates_dir = dir.clone();
    }
    if let Some(font) = &cli.font {
        config.font = font.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            let service = Service::from_config(&config);
            xenoglyph::http::serve(service, &config).await.context("server failed")?;
        }
        Commands::Decode { image, json } => {
            let bytes = std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
            let service = Service::from_config(&config);
            let decoded = tokio::task::spawn_blocking(move || {
                service.decode_image(&bytes, &CancelToken::new())
            })
            .await?
            .with_context(|| format!("decoding {}", image.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&decoded)?);
            } else {
                println!("{}\n{}", decoded.alien, decoded.phonetics);
            }
        }
        Commands::Encode { text, french, png } => {
            let language = if french { Language::French } else { Language::English };
            let service = Service::from_config(&config);
            println!("{}", service.encode_text(&text, language));
            if let Some(out) = png {
                let bytes = service.encode_image(&text, language).context("rendering glyphs")?;
                std::fs::write(&out, bytes).with_context(|| format!("writing {}", out.display()))?;
                tracing::info!("image written to {}", out.display());
            }
        }
        Commands::RegisterCommands => {
            let count = xenoglyph::discord::register_commands(&config.discord)
                .await
                .context("registering commands")?;
            println!("registered {count} commands");
        }
    }
    Ok(())
}
