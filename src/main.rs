use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use img_translator_rust::{Command, Config};

#[derive(Parser, Debug)]
#[command(
    name = "img-translator-rust",
    version,
    about = "Replace Chinese text in images with English translations"
)]
struct Cli {
    /// Image to translate (png, jpeg, webp)
    #[arg(short = 'i', long = "image", conflicts_with_all = ["text", "server"])]
    image: Option<PathBuf>,

    /// Output path for the translated PNG (default: translated_image.png next to the input)
    #[arg(short = 'o', long = "out", requires = "image")]
    out: Option<PathBuf>,

    /// Translate strings instead of an image (repeatable); reads stdin lines when no mode is given
    #[arg(short = 't', long = "text", num_args = 1.., conflicts_with = "server")]
    text: Vec<String>,

    /// Run the proxy API server, optionally on ADDR (default from settings)
    #[arg(long = "server", value_name = "ADDR", num_args = 0..=1, default_missing_value = "")]
    server: Option<String>,

    /// OCR granularity: line or word
    #[arg(short = 'g', long = "granularity")]
    granularity: Option<String>,

    /// Baidu app id (overrides BAIDU_APP_ID)
    #[arg(long = "app-id")]
    app_id: Option<String>,

    /// Baidu secret key (overrides BAIDU_SECRET_KEY)
    #[arg(long = "secret-key")]
    secret_key: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Show installed tesseract languages and exit
    #[arg(long = "show-ocr-languages")]
    show_ocr_languages: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    img_translator_rust::logging::init(cli.verbose)?;
    if cli.show_ocr_languages {
        for language in img_translator_rust::ocr::list_tesseract_languages()? {
            println!("{}", language);
        }
        return Ok(());
    }

    let command = if let Some(image) = cli.image {
        Command::Image {
            input: image,
            output: cli.out,
        }
    } else if let Some(addr) = cli.server {
        Command::Serve(Some(addr))
    } else if !cli.text.is_empty() {
        Command::Texts(cli.text)
    } else {
        Command::Texts(read_stdin_lines()?)
    };

    let config = Config {
        settings_path: cli.read_settings,
        granularity: cli.granularity,
        app_id: cli.app_id,
        secret_key: cli.secret_key,
    };
    let output = img_translator_rust::run(config, command).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

fn read_stdin_lines() -> Result<Vec<String>> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(anyhow!(
            "nothing to do: pass --image, --text or --server, or pipe text on stdin"
        ));
    }
    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    let lines: Vec<String> = buffer.lines().map(|line| line.to_string()).collect();
    if lines.iter().all(|line| line.trim().is_empty()) {
        return Err(anyhow!("stdin is empty"));
    }
    Ok(lines)
}
