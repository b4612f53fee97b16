mod cli;
mod dispatch;
mod error;
mod fetch;
mod health;
mod model;
mod server;
mod session;
mod util;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;

use cli::{CliArgs, Command};
use dispatch::{
    AiImageDispatcher, AiImageRequest, MediaFile, RumorDispatcher, RumorRequest,
    SystemDispatcher, VideoDispatcher, VideoModule, VideoRequest,
};
use error::{DispatchError, Result};
use fetch::ProxyFetch;
use health::HealthAggregator;
use model::DetectionResult;
use session::ApiClient;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(args: CliArgs) -> Result<()> {
    let config = args.client_config();
    let mut api = ApiClient::new(&config).context("building api client")?;
    if args.page_csrf && api.discover_csrf_token().await.is_none() {
        tracing::warn!("no csrf token available; API requests are sent without one");
    }
    let fetch = ProxyFetch::new(&config).context("building proxy client")?;

    match &args.command {
        Command::Image { path } => {
            let image = read_media(path).await?;
            let detection = AiImageDispatcher::new(fetch, api)
                .analyze(AiImageRequest::new(image)?)
                .await?;
            report(DetectionResult::AiImage(detection))
        }
        Command::ImageResult { detection_id } => {
            let record = AiImageDispatcher::new(fetch, api)
                .detection_result(detection_id)
                .await?;
            print_json(&record)
        }
        Command::Rumor {
            text,
            text_file,
            image,
        } => {
            let text = cli::resolve_text(text.as_deref(), text_file.as_ref())?;
            let image = read_media(image).await?;
            let detection = RumorDispatcher::new(fetch)
                .analyze(RumorRequest::new(text, image)?)
                .await?;
            report(DetectionResult::Rumor(detection))
        }
        Command::Video { module, path } => {
            let module = VideoModule::try_from(*module)?;
            let video = read_media(path).await?;
            let analysis = VideoDispatcher::new(api, config.video_timeout)
                .analyze(VideoRequest::new(module, video)?)
                .await?;
            report(DetectionResult::VideoAnalysis(analysis))
        }
        Command::Modules => print_json(&SystemDispatcher::new(api).modules_status().await?),
        Command::Result { detection_id } => {
            let record = SystemDispatcher::new(api)
                .detection_result(detection_id)
                .await?;
            match record.clone().into_typed() {
                Ok(typed) => report(typed),
                Err(err) => {
                    tracing::warn!("returning untyped record: {err}");
                    print_json(&record)
                }
            }
        }
        Command::Status => {
            let aggregator = HealthAggregator::new(fetch, args.service_table(), config.probe_timeout);
            let status = aggregator.collect().await;
            for (key, info) in status.services.iter() {
                tracing::debug!(service = %key, status = ?info.status, url = %info.url, "service health");
            }
            print_json(&status)
        }
        Command::Serve { listen } => {
            let aggregator = HealthAggregator::new(fetch, args.service_table(), config.probe_timeout);
            server::run_status_server(listen.as_deref(), aggregator).await
        }
    }
}

async fn read_media(path: &std::path::Path) -> Result<MediaFile> {
    MediaFile::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

fn report(result: DetectionResult) -> Result<()> {
    tracing::info!(kind = ?result.kind(), "{}", result.headline());
    print_json(&result)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    let args = CliArgs::parse();

    if let Err(error) = run(args).await {
        if let Some(status) = error.downcast_ref::<DispatchError>().and_then(DispatchError::status) {
            tracing::error!(status = status.as_u16(), "backend rejected the request");
        }
        tracing::error!("{error:#}");
        std::process::exit(1);
    }
}
