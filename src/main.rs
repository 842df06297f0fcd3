use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "ocr-consolidator",
    version,
    about = "Consolidate OCR text from images and map it to store/food categories"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings", global = true)]
    read_settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Listening port (overrides settings and PORT)
        #[arg(short = 'p', long = "port")]
        port: Option<u16>,
    },
    /// Extract text elements from an image file and print the JSON envelope
    Extract {
        /// Image file
        image: PathBuf,

        /// Keep only store or food names
        #[arg(short = 't', long = "type")]
        category: Option<String>,
    },
    /// Extract a store name, number or food name from noisy free text
    Text {
        /// Input text
        text: String,

        /// store, number or food
        #[arg(short = 't', long = "type")]
        category: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    ocr_consolidator::logging::init(cli.verbose)?;
    let mut settings = ocr_consolidator::settings::load_settings(cli.read_settings.as_deref())?;

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                settings.port = port;
            }
            ocr_consolidator::serve(settings).await
        }
        Command::Extract { image, category } => {
            let output =
                ocr_consolidator::run_extract(settings, &image, category.as_deref()).await?;
            println!("{}", output);
            Ok(())
        }
        Command::Text { text, category } => {
            let output = ocr_consolidator::run_text(settings, &text, &category).await?;
            println!("{}", output);
            Ok(())
        }
    }
}
