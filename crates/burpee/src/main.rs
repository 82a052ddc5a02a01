mod config;
mod counter;
mod notifier;
mod resolver;
mod rollover;
mod run;
mod slack;
mod version;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::info;

use crate::{
    config::{Overrides, load_config, write_default_config},
    slack::SlackClient,
    version::{short_version, user_agent},
};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// 毎日のバーピー回数を Slack に投稿する。cron などから 1 回ずつ起動する。
#[derive(Parser)]
#[command(version = short_version())]
struct Args {
    /// 設定ファイル。既定のパスに無ければデフォルト値で動く
    #[arg(long)]
    config: Option<PathBuf>,

    /// デフォルトの設定ファイルを書き出して終了する
    #[arg(long)]
    init: bool,

    #[arg(long, env = "SLACK_BOT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// 投稿先チャンネルの表示名
    #[arg(long, env = "SLACK_CHANNEL_NAME")]
    channel: Option<String>,

    #[arg(long, env = "BURPEE_COUNTER_FILE")]
    counter_file: Option<PathBuf>,

    /// 日付判定に使う IANA タイムゾーン (例: America/Los_Angeles)
    #[arg(long, env = "BURPEE_TZ")]
    timezone: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    if args.init {
        write_default_config(&config_path)?;
        info!(path = ?config_path, "Created default configuration");
        return Ok(());
    }

    info!(version = short_version(), "burpee version");

    let mut config =
        load_config(&config_path, args.config.is_some()).context("Failed to load configuration")?;
    config.apply_overrides(Overrides {
        token: args.token,
        channel: args.channel,
        counter_file: args.counter_file,
        timezone: args.timezone,
    })?;
    config.validate()?;

    let zone = config.reference_zone();
    info!(
        channel = %config.slack.channel,
        counter_file = ?config.counter.path,
        %zone,
        timeout = %humantime::format_duration(config.slack.timeout),
        "Configuration loaded"
    );

    let client = SlackClient::new(
        &config.slack.token,
        config.slack.api_base_url.as_str(),
        config.slack.timeout,
        user_agent(),
    )?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let report = runtime.block_on(run::run(&config, &client, zone.now()))?;

    info!(
        counter = report.counter,
        incremented = report.incremented,
        "Run finished"
    );
    println!(
        "Message successfully sent to channel {} at {}",
        report.channel_name, report.posted.ts
    );
    Ok(())
}
