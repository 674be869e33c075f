//! Print the effective configuration.

use crate::config::Config;

/// Human-readable summary of `config`. The bot token is only reported as
/// set or missing.
pub fn render_config(config: &Config) -> String {
    let token = if config.telegram.bot_token.is_some() {
        "set"
    } else {
        "MISSING"
    };

    let mut lines = vec![
        format!("telegram.bot_token      {}", token),
        format!("telegram.api_url        {}", config.telegram.api_url),
        format!(
            "telegram.poll_timeout   {}s",
            config.telegram.poll_timeout.as_secs()
        ),
        format!("limits.max_file_size    {}", config.limits.max_file_size),
        format!("limits.max_text_length  {}", config.limits.max_text_length),
        format!(
            "limits.file_types       {}",
            config.limits.supported_file_types.join(", ")
        ),
        format!("tts.provider            {:?}", config.tts.backend),
        format!("tts.api_url             {}", config.tts.api_url),
        format!("tts.timeout             {}s", config.tts.timeout.as_secs()),
        format!("tts.client_id           {}", config.tts.client_id),
        format!(
            "tts.max_request_chars   {}",
            config
                .tts
                .max_request_chars
                .map(|n| n.to_string())
                .unwrap_or_else(|| "auto".to_string())
        ),
        format!(
            "voice.default           {} ({})",
            config.default_voice,
            config.default_voice.display_name()
        ),
        format!(
            "storage.temp_dir        {}",
            config.storage.temp_dir.display()
        ),
        format!(
            "storage.sweep           every {}s, min age {}s{}",
            config.storage.sweep.interval.as_secs(),
            config.storage.sweep.min_age.as_secs(),
            if config.storage.sweep.enabled {
                ""
            } else {
                " (disabled)"
            }
        ),
        format!("health.port             {}", config.port),
    ];

    let attempts = match config.restart.max_attempts {
        0 => "unlimited".to_string(),
        n => n.to_string(),
    };
    lines.push(format!(
        "restart                 {}ms..{}ms, attempts {}",
        config.restart.base_delay_ms, config.restart.max_delay_ms, attempts
    ));

    lines.join("\n")
}

/// Print the configuration; fails if the bot token is missing.
pub fn run_check_config_command(config: &Config) -> anyhow::Result<()> {
    println!("{}", render_config(config));
    config.require_bot_token()?;
    println!("\nConfiguration OK");
    Ok(())
}
