use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ttsrelay::channels::{
    HealthServer, SupervisorExit, TelegramBot, TelegramChannel, supervise,
};
use ttsrelay::cli::{Cli, Command, run_check_config_command, run_sweep_command};
use ttsrelay::config::Config;
use ttsrelay::media::{
    FileValidator, SpeechSynthesizer, Sweeper, TempStore, TextNormalizer, build_provider,
};
use ttsrelay::pipeline::{ConversionPipeline, VoicePreferences};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.log_json);

    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Sweep => run_sweep_command(&config).await,
        Command::CheckConfig => run_check_config_command(&config),
    }
}

fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ttsrelay=info"));
    let json = json
        || std::env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Long-lived pieces of a running bot.
struct Services {
    channel: Arc<TelegramChannel>,
    store: TempStore,
    pipeline: Arc<ConversionPipeline>,
    health: HealthServer,
}

/// Build every component and bind the health endpoint.
async fn start_services(config: &Config) -> ttsrelay::Result<Services> {
    let channel = Arc::new(TelegramChannel::from_config(&config.telegram)?);

    let store = TempStore::new(&config.storage.temp_dir);
    store.ensure_dir().await?;

    let normalizer = TextNormalizer::new(config.limits.max_text_length)
        .with_char_policy(config.char_policy.clone());
    let provider = build_provider(&config.tts)?;
    let mut synthesizer = SpeechSynthesizer::new(provider, normalizer.clone(), store.clone());
    if let Some(max) = config.tts.max_request_chars {
        synthesizer = synthesizer.with_max_request_chars(max);
    }

    let pipeline = Arc::new(ConversionPipeline::new(
        FileValidator::new(
            config.limits.max_file_size,
            &config.limits.supported_file_types,
        ),
        normalizer,
        synthesizer,
        store.clone(),
        VoicePreferences::new(config.default_voice),
        channel.clone(),
        channel.clone(),
    ));

    let mut health = HealthServer::new(SocketAddr::from(([0, 0, 0, 0], config.port)));
    health.start().await?;

    Ok(Services {
        channel,
        store,
        pipeline,
        health,
    })
}

async fn run(config: Config) -> anyhow::Result<()> {
    let Services {
        channel,
        store,
        pipeline,
        mut health,
    } = start_services(&config).await?;

    let sweeper = Sweeper::new(store.clone(), config.storage.sweep.clone()).spawn();

    let bot = TelegramBot::new(channel, pipeline);
    tracing::info!(
        voice = %config.default_voice,
        temp_dir = %store.dir().display(),
        "Bot started"
    );

    let polling = supervise("telegram", &config.restart, || bot.run());

    let outcome = tokio::select! {
        exit = polling => match exit {
            SupervisorExit::Stopped => Ok(()),
            SupervisorExit::GaveUp { last_error, .. } => Err(anyhow::Error::from(last_error)),
        },
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    };

    sweeper.abort();
    health.shutdown().await;
    match store.sweep_all().await {
        Ok(removed) => tracing::info!(removed, "Cleaned up staging directory"),
        Err(e) => tracing::warn!(error = %e, "Failed to clean up staging directory"),
    }

    outcome
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
