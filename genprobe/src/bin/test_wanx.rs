use std::{path::PathBuf, time::Duration};

use clap::Parser;
use color_eyre::{Result, eyre::bail};
use genprobe::{
    ApiError, AsyncTaskClient, GenerationRequest, TaskResult,
    config::{DASHSCOPE_KEY_VAR, load_config, resolve_api_key},
    image_model::download,
    task::{
        DashScope,
        dashscope::{WANX_ENDPOINT, WANX_MODEL},
    },
};
use tokio_util::sync::CancellationToken;

/// Submits a text-to-image task to DashScope WanX and polls it to the end
#[derive(clap::Parser)]
struct Cli {
    #[arg(default_value = "A beautiful sunset over a cyberpunk city")]
    prompt: String,

    #[arg(long, default_value = "low quality")]
    negative_prompt: String,

    #[arg(long, default_value = "1280*720")]
    size: String,

    #[arg(long, default_value = "<auto>")]
    style: String,

    #[arg(short, long, default_value_t = 1)]
    n: u32,

    /// Falls back to $DASHSCOPE_API_KEY, then the config file
    #[arg(long)]
    api_key: Option<String>,

    #[arg(long, default_value = WANX_ENDPOINT)]
    endpoint: String,

    #[arg(long)]
    interval_ms: Option<u64>,

    #[arg(long)]
    max_attempts: Option<u32>,

    /// Save the first image here
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    pretty_env_logger::init();
    let cli = Cli::parse();

    let config = load_config()?;
    let key = resolve_api_key(cli.api_key, DASHSCOPE_KEY_VAR, &config)?;
    let mut poll = config.poll_settings();
    if let Some(ms) = cli.interval_ms {
        poll.interval = Duration::from_millis(ms);
    }
    if let Some(n) = cli.max_attempts {
        poll.max_attempts = n;
    }

    println!("Testing Aliyun WanX with key {key}");

    let request = GenerationRequest::new(cli.endpoint, key, WANX_MODEL, cli.prompt)
        .negative_prompt(cli.negative_prompt)
        .size(cli.size)
        .style(cli.style)
        .count(cli.n);

    let client = AsyncTaskClient::new(DashScope::default());
    let handle = match client.submit(&request).await {
        Ok(handle) => {
            println!("Submit Status: accepted");
            handle
        }
        Err(ApiError::Submission { status, body }) => {
            println!("Submit Status: {status}");
            bail!("Submit failed: {body}");
        }
        Err(e) => return Err(e.into()),
    };
    println!("Task ID: {handle}");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted, cancelling...");
                cancel.cancel();
            }
        }
    });

    let result = client
        .poll_until_cancelled(
            &request,
            &handle,
            poll.interval,
            poll.max_attempts,
            &cancel,
            |attempt, report| {
                let status = report.status.as_deref().unwrap_or("<missing>");
                println!("Polling {attempt}: {status}");
            },
        )
        .await?;

    let urls = match result {
        TaskResult::Succeeded { urls } => urls,
        TaskResult::Failed { message } => bail!("Task failed: {message}"),
    };

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
