use std::{net::SocketAddr, time::Duration};

use clap::{Parser, ValueEnum};

/// Reconciles SNS topics and subscriptions declared as Kubernetes objects
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Config {
    /// Address of the health and metrics server
    #[arg(long = "listen", env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Seconds between observations of a healthy resource
    #[arg(long = "poll-interval", env = "POLL_INTERVAL_SECS", default_value_t = 60)]
    pub poll_interval_secs: u64,

    /// Override the SNS endpoint, e.g. for LocalStack
    #[arg(long = "endpoint-url", env = "AWS_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// Timeout for a single SNS call, in seconds
    #[arg(long = "request-timeout", env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    #[arg(long = "log-format", env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
