use std::io::{Write, stdout};

use clap::Parser;
use color_eyre::Result;
use genprobe::{
    ChatProvider,
    config::{load_config, resolve_api_key},
    llm::{DEFAULT_SYSTEM_PROMPT, Request, ResponseFragment},
};
use tokio_stream::StreamExt;

#[derive(clap::Parser)]
pub struct Cli {
    #[arg(default_value = "你好")]
    message: String,

    #[arg(long, value_enum, default_value_t = ChatProvider::ModelScope)]
    provider: ChatProvider,

    #[arg(long, default_value = DEFAULT_SYSTEM_PROMPT)]
    system: String,

    #[arg(long)]
    api_key: Option<String>,

    /// Wait for the whole answer instead of streaming it
    #[arg(long)]
    no_stream: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    pretty_env_logger::init();
    let args = Cli::parse();

    let key = resolve_api_key(args.api_key, args.provider.key_var(), &load_config()?)?;
    let model = args.provider.make(key);
    let request = Request::ask(args.message).with_system(args.system);

    println!("=== {} {} ===", args.provider, args.provider.model());

    if args.no_stream {
        let message = model.complete(request).await?;
        println!("{}", message.text);
        println!(
            "Tokens: input: {}, output: {}",
            message.input_tokens, message.output_tokens
        );
        return Ok(());
    }

    let mut stream = model.send_request_stream(request);
    while let Some(fragment) = stream.try_next().await? {
        match fragment {
            ResponseFragment::TextDelta(t) => {
                print!("{t}");
                stdout().flush()?;
            }
            ResponseFragment::MessageComplete(output_message) => {
                println!();
                println!(
                    "Tokens: input: {}, output: {}",
                    output_message.input_tokens, output_message.output_tokens
                );
            }
        }
    }
    Ok(())
}
