use clap::Parser;
use color_eyre::Result;
use genprobe::{
    ImageProvider,
    config::{load_config, resolve_api_key},
    image_model::download,
    prompt::ImagePrompt,
};

/// Generates an image through any provider. The description may be plain
/// text or a structured JSON prompt.
#[derive(clap::Parser)]
struct Arg {
    provider: ImageProvider,
    description: String,

    #[arg(long)]
    key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    pretty_env_logger::init();
    let Arg {
        provider,
        description,
        key,
    } = Arg::parse();

    let config = load_config()?;
    let key = resolve_api_key(key, provider.key_var(), &config)?;
    let model = provider.make(key, config.poll_settings());

    let prompt = ImagePrompt::parse(&description);
    println!("{provider} prompt: {}", prompt.prompt);

    let urls = model.generate(&prompt).await?;
    let image = download(&reqwest::Client::new(), &urls.head).await?;
    std::fs::write("output.jpeg", &image)?;
    println!("Saved image from {}, {} bytes", urls.head, image.len());

    Ok(())
}
