//! PressWire CLI - press release drafting service
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments and handling top-level errors.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use presswire::press_release::{self, DraftInput, EnhanceInput, SeoInput, DEFAULT_AUDIENCE};
use presswire::server::{self, AppState};
use presswire::storage::NewPressRelease;
use presswire::{model, Config, Generator, GeneratorSettings, Storage};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "presswire")]
#[command(author, version, about = "Press release drafting service", long_about = None)]
struct Cli {
    /// Path to presswire.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API (default)
    Serve {
        /// Address to listen on, overriding the config
        #[arg(long)]
        bind: Option<String>,
    },
    /// Draft a press release and store it
    Draft {
        #[arg(long)]
        company: String,
        #[arg(long)]
        announcement: String,
        /// Short description of the company
        #[arg(long)]
        info: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = DEFAULT_AUDIENCE)]
        audience: String,
    },
    /// Suggest improvements for a press release read from a file
    Enhance {
        file: PathBuf,
    },
    /// Generate SEO metadata for a press release
    Seo {
        #[arg(long)]
        headline: String,
        #[arg(long)]
        company: String,
        /// File holding the press release body
        body: PathBuf,
    },
    /// List stored press releases
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => {
            let state = AppState {
                generator: Arc::new(build_generator(&config)?),
                storage: Storage::open(&config.storage.path)?,
            };
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            server::serve(&bind, state).await?;
        }
        Commands::Draft {
            company,
            announcement,
            info,
            email,
            audience,
        } => {
            let generator = build_generator(&config)?;
            let input = DraftInput {
                company_name: company,
                announcement,
                company_info: info,
                contact_email: email,
                target_audience: audience,
            };
            let drafted = press_release::generate_press_release(&generator, &input).await?;
            let content = &drafted.value;

            let storage = Storage::open(&config.storage.path)?;
            let stored = storage.insert(NewPressRelease::from_draft(input, drafted.clone()))?;

            println!("=== {} ===", content.headline);
            if let Some(sub) = &content.subheadline {
                println!("{}", sub);
            }
            println!("\n{}\n", content.body);
            println!("{}\n", content.boilerplate);
            println!("SEO title: {}", content.seo_title);
            println!("Meta: {}", content.meta_description);
            println!("Keywords: {}", content.keywords.join(", "));
            println!("Readability: {:.1}", content.readability_score);
            for tip in &content.suggested_improvements {
                println!("  • {}", tip);
            }
            println!(
                "\nStored as #{} ({}) after {} attempt(s)",
                stored.id, stored.slug, drafted.attempts
            );
        }
        Commands::Enhance { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let generator = build_generator(&config)?;
            let drafted =
                press_release::enhance_press_release(&generator, &EnhanceInput { content }).await?;
            let enhancement = drafted.value;

            println!("Overall score: {:.1}\n", enhancement.overall_score);
            if let Some(headline) = &enhancement.improved_headline {
                println!("Improved headline: {}\n", headline);
            }
            for (title, items) in [
                ("SEO", &enhancement.seo_suggestions),
                ("Grammar", &enhancement.grammar_corrections),
                ("Style", &enhancement.style_improvements),
            ] {
                if !items.is_empty() {
                    println!("{}:", title);
                    for item in items {
                        println!("  • {}", item);
                    }
                }
            }
            if let Some(body) = &enhancement.improved_body {
                println!("\n--- Improved body ---\n{}", body);
            }
        }
        Commands::Seo {
            headline,
            company,
            body,
        } => {
            let body = std::fs::read_to_string(&body)
                .with_context(|| format!("failed to read {}", body.display()))?;
            let generator = build_generator(&config)?;
            let input = SeoInput {
                headline,
                body,
                company,
            };
            let drafted = press_release::generate_seo_metadata(&generator, &input).await?;
            println!("{}", serde_json::to_string_pretty(&drafted.value)?);
        }
        Commands::List { limit } => {
            let storage = Storage::open(&config.storage.path)?;
            let page = storage.list(0, limit)?;

            if page.items.is_empty() {
                println!("No stored press releases found.");
            } else {
                println!("Stored press releases ({}):\n", page.total);
                for stored in page.items {
                    println!(
                        "📄 #{} {} ({}, {:?})",
                        stored.id,
                        stored.content.headline,
                        stored.created_at.format("%Y-%m-%d %H:%M"),
                        stored.status
                    );
                    println!("   {}", stored.company_name);
                    println!("   {}\n", stored.content.meta_description);
                }
            }
        }
    }

    Ok(())
}

fn build_generator(config: &Config) -> anyhow::Result<Generator> {
    let model = model::from_config(config)?;
    Ok(Generator::new(model, GeneratorSettings::from_config(config)))
}
