use std::{net::SocketAddr, num::NonZeroUsize, path::PathBuf, time::Duration};

use axum::http::HeaderValue;
use clap::Parser;
use eyre::WrapErr;
use stemsplit_job_manager::JobSettings;
use tower_http::cors::{Any, CorsLayer};

pub const DEFAULT_LOG_FILTER: &str = "stemsplit=info,tower_http=info";

#[derive(Debug, Parser)]
#[command(version, about = "Split uploaded audio into stems and stream the progress")]
pub struct Cli {
    /// The address to listen on.
    #[arg(long, env = "STEMSPLIT_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// A browser origin allowed to call the API. Repeat the flag, or separate origins with
    /// commas, to allow more than one.
    #[arg(
        long = "allowed-origin",
        env = "STEMSPLIT_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_values = ["https://muted.cl", "http://localhost:8080"]
    )]
    pub allowed_origins: Vec<String>,

    /// The separator program. It is run as `<separator> --mp3 -o <output> <input>`.
    #[arg(long, env = "STEMSPLIT_SEPARATOR", default_value = "demucs")]
    pub separator: String,

    /// Where to create job scratch directories. Defaults to the system temporary directory.
    #[arg(long, env = "STEMSPLIT_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// How often to send progress to the client, in milliseconds.
    #[arg(long, env = "STEMSPLIT_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// The most separations to run at once. Uploads past the limit wait for a free slot.
    #[arg(long, env = "STEMSPLIT_MAX_CONCURRENT_JOBS")]
    pub max_concurrent_jobs: Option<NonZeroUsize>,

    /// The largest upload to accept, in megabytes.
    #[arg(long, env = "STEMSPLIT_MAX_UPLOAD_MB", default_value_t = 512)]
    pub max_upload_mb: usize,
}

impl Cli {
    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            scratch_root: self.scratch_dir.clone(),
            max_concurrent_jobs: self.max_concurrent_jobs,
            ..Default::default()
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn cors_layer(&self) -> eyre::Result<CorsLayer> {
        let origins = self
            .allowed_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin.trim())
                    .wrap_err_with(|| format!("Invalid CORS origin '{origin}'"))
            })
            .collect::<eyre::Result<Vec<_>>>()?;

        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["stemsplit"]).unwrap();
        assert_eq!(cli.bind, "0.0.0.0:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(
            cli.allowed_origins,
            ["https://muted.cl", "http://localhost:8080"]
        );
        assert_eq!(cli.separator, "demucs");

        let settings = cli.job_settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
        assert_eq!(settings.max_concurrent_jobs, None);
        assert_eq!(settings.scratch_root, None);
        assert_eq!(settings.layout.marker, "vocals.mp3");
    }

    #[test]
    fn explicit_flags() {
        let cli = Cli::try_parse_from([
            "stemsplit",
            "--bind",
            "127.0.0.1:9000",
            "--allowed-origin",
            "https://a.example,https://b.example",
            "--separator",
            "/opt/demucs/bin/demucs",
            "--scratch-dir",
            "/var/tmp/stemsplit",
            "--poll-interval-ms",
            "250",
            "--max-concurrent-jobs",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.allowed_origins, ["https://a.example", "https://b.example"]);
        let settings = cli.job_settings();
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.max_concurrent_jobs, NonZeroUsize::new(2));
        assert_eq!(
            settings.scratch_root,
            Some(PathBuf::from("/var/tmp/stemsplit"))
        );
        assert!(cli.cors_layer().is_ok());
    }

    #[test]
    fn zero_concurrent_jobs_is_rejected() {
        assert!(Cli::try_parse_from(["stemsplit", "--max-concurrent-jobs", "0"]).is_err());
    }

    #[test]
    fn invalid_origin_is_rejected() {
        let cli =
            Cli::try_parse_from(["stemsplit", "--allowed-origin", "https://bad\norigin"]).unwrap();
        assert!(cli.cors_layer().is_err());
    }
}
