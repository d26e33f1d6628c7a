use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use genprobe::{
    config::{MINIMAX_KEY_VAR, load_config, resolve_api_key},
    image_model::{Minimax, download, minimax::MINIMAX_ENDPOINT},
};

/// Sends one synchronous generation request to MiniMax
#[derive(clap::Parser)]
struct Cli {
    #[arg(default_value = "A cyberpunk city")]
    prompt: String,

    #[arg(short, long, default_value_t = 1)]
    n: u32,

    /// Falls back to $MINIMAX_API_KEY, then the config file
    #[arg(long)]
    api_key: Option<String>,

    #[arg(long, default_value = MINIMAX_ENDPOINT)]
    endpoint: String,

    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    pretty_env_logger::init();
    let cli = Cli::parse();

    let key = resolve_api_key(cli.api_key, MINIMAX_KEY_VAR, &load_config()?)?;
    println!("Testing Minimax with key {key}");

    let model = Minimax::new(key)
        .with_endpoint(cli.endpoint)
        .with_count(cli.n);
    let urls = model.generate_urls(&cli.prompt).await?;

    for url in urls.iter() {
        println!("Image URL: {url}");
    }

    if let Some(path) = cli.output {
        let bytes = download(&reqwest::Client::new(), &urls.head).await?;
        std::fs::write(&path, &bytes)?;
        println!("Saved {}, {} bytes", path.display(), bytes.len());
    }

    Ok(())
}
