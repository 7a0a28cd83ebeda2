use anyhow::{Context, Result};
use clap::{Arg, Command};

pub fn with_args(command: Command) -> Command {
    let command = with_flow_args(command);
    with_outbox_args(command)
}

fn with_flow_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL used for emailed flow links")
                .env("VESTIBULE_FRONTEND_BASE_URL")
                .default_value("https://profile.example.com"),
        )
        .arg(
            Arg::new("artifact-ttl-seconds")
                .long("artifact-ttl-seconds")
                .help("Verification artifact TTL in seconds")
                .env("VESTIBULE_ARTIFACT_TTL_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("passcode-attempts")
                .long("passcode-attempts")
                .help("Attempt budget per passcode artifact")
                .env("VESTIBULE_PASSCODE_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(i32)),
        )
        .arg(
            Arg::new("completion-fallback")
                .long("completion-fallback")
                .help("Final redirect when a flow carries no returnUrl or fromURI")
                .env("VESTIBULE_COMPLETION_FALLBACK")
                .default_value("/"),
        )
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-outbox-poll-seconds")
                .long("email-outbox-poll-seconds")
                .help("Email outbox poll interval in seconds")
                .env("VESTIBULE_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-batch-size")
                .long("email-outbox-batch-size")
                .help("Email outbox batch size per poll")
                .env("VESTIBULE_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("email-outbox-max-attempts")
                .long("email-outbox-max-attempts")
                .help("Max attempts before marking an email as failed")
                .env("VESTIBULE_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("email-outbox-backoff-base-seconds")
                .long("email-outbox-backoff-base-seconds")
                .help("Base delay for email outbox retry backoff")
                .env("VESTIBULE_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-backoff-max-seconds")
                .long("email-outbox-backoff-max-seconds")
                .help("Max delay for email outbox retry backoff")
                .env("VESTIBULE_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct OutboxOptions {
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub artifact_ttl_seconds: u64,
    pub passcode_attempts: i32,
    pub completion_fallback: String,
    pub outbox: OutboxOptions,
}

impl Options {
    /// Collect flow options from parsed matches.
    ///
    /// # Errors
    /// Returns an error if a defaulted argument is somehow absent.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            frontend_base_url: matches
                .get_one::<String>("frontend-base-url")
                .cloned()
                .context("missing required argument: --frontend-base-url")?,
            artifact_ttl_seconds: matches
                .get_one::<u64>("artifact-ttl-seconds")
                .copied()
                .context("missing required argument: --artifact-ttl-seconds")?,
            passcode_attempts: matches
                .get_one::<i32>("passcode-attempts")
                .copied()
                .context("missing required argument: --passcode-attempts")?,
            completion_fallback: matches
                .get_one::<String>("completion-fallback")
                .cloned()
                .context("missing required argument: --completion-fallback")?,
            outbox: OutboxOptions {
                poll_seconds: matches
                    .get_one::<u64>("email-outbox-poll-seconds")
                    .copied()
                    .context("missing required argument: --email-outbox-poll-seconds")?,
                batch_size: matches
                    .get_one::<usize>("email-outbox-batch-size")
                    .copied()
                    .context("missing required argument: --email-outbox-batch-size")?,
                max_attempts: matches
                    .get_one::<u32>("email-outbox-max-attempts")
                    .copied()
                    .context("missing required argument: --email-outbox-max-attempts")?,
                backoff_base_seconds: matches
                    .get_one::<u64>("email-outbox-backoff-base-seconds")
                    .copied()
                    .context("missing required argument: --email-outbox-backoff-base-seconds")?,
                backoff_max_seconds: matches
                    .get_one::<u64>("email-outbox-backoff-max-seconds")
                    .copied()
                    .context("missing required argument: --email-outbox-backoff-max-seconds")?,
            },
        })
    }
}
