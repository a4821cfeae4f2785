use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5001`).
    pub port: u16,
    /// `development` or `production`. Production restricts CORS to
    /// `frontend_url`.
    pub app_env: String,
    pub frontend_url: String,
    /// HTTP request timeout in seconds (default: `300`).
    pub request_timeout_secs: u64,
    pub upload_dir: PathBuf,
    pub results_dir: PathBuf,
    /// Request body cap for uploads (default: 500 MiB).
    pub max_upload_bytes: usize,
    /// Worker pool size (default: `3`).
    pub max_concurrent_jobs: usize,
    pub rate_limit_max_requests: usize,
    pub rate_limit_window_secs: u64,
    /// Age after which uploads, results and finished jobs are dropped.
    pub retention_hours: u64,
    pub retention_sweep_interval_secs: u64,
    /// Base URL of the pose estimation service.
    pub pose_service_url: String,
    /// Sample one frame out of every N.
    pub pose_sample_every: u32,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub reencode_enabled: bool,
    pub reencode_timeout_secs: u64,
    /// Take the client identity from `X-Forwarded-For` instead of the peer
    /// address. Only enable behind a trusted proxy.
    pub trust_forwarded_for: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                  |
    /// |---------------------------------|--------------------------|
    /// | `HOST`                          | `0.0.0.0`                |
    /// | `PORT`                          | `5001`                   |
    /// | `APP_ENV`                       | `development`            |
    /// | `FRONTEND_URL`                  | `http://localhost:3000`  |
    /// | `REQUEST_TIMEOUT_SECS`          | `300`                    |
    /// | `UPLOAD_DIR`                    | `storage/uploads`        |
    /// | `RESULTS_DIR`                   | `storage/results`        |
    /// | `MAX_UPLOAD_BYTES`              | `524288000`              |
    /// | `MAX_CONCURRENT_JOBS`           | `3`                      |
    /// | `RATE_LIMIT_MAX_REQUESTS`       | `10`                     |
    /// | `RATE_LIMIT_WINDOW_SECS`        | `3600`                   |
    /// | `RETENTION_HOURS`               | `24`                     |
    /// | `RETENTION_SWEEP_INTERVAL_SECS` | `3600`                   |
    /// | `POSE_SERVICE_URL`              | `http://localhost:8001`  |
    /// | `POSE_SAMPLE_EVERY`             | `2`                      |
    /// | `FFMPEG_BIN`                    | `ffmpeg`                 |
    /// | `FFPROBE_BIN`                   | `ffprobe`                |
    /// | `REENCODE_ENABLED`              | `true`                   |
    /// | `REENCODE_TIMEOUT_SECS`         | `120`                    |
    /// | `TRUST_FORWARDED_FOR`           | `false`                  |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "5001".into())
            .parse()
            .expect("PORT must be a valid u16");

        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".into());

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let upload_dir = PathBuf::from(
            std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "storage/uploads".into()),
        );
        let results_dir = PathBuf::from(
            std::env::var("RESULTS_DIR").unwrap_or_else(|_| "storage/results".into()),
        );

        let max_upload_bytes: usize = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| "524288000".into())
            .parse()
            .expect("MAX_UPLOAD_BYTES must be a valid usize");

        let max_concurrent_jobs: usize = std::env::var("MAX_CONCURRENT_JOBS")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("MAX_CONCURRENT_JOBS must be a valid usize");
        assert!(max_concurrent_jobs > 0, "MAX_CONCURRENT_JOBS must be at least 1");

        let rate_limit_max_requests: usize = std::env::var("RATE_LIMIT_MAX_REQUESTS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("RATE_LIMIT_MAX_REQUESTS must be a valid usize");

        let rate_limit_window_secs: u64 = std::env::var("RATE_LIMIT_WINDOW_SECS")
            .unwrap_or_else(|_| "3600".into())
            .parse()
            .expect("RATE_LIMIT_WINDOW_SECS must be a valid u64");

        let retention_hours: u64 = std::env::var("RETENTION_HOURS")
            .unwrap_or_else(|_| "24".into())
            .parse()
            .expect("RETENTION_HOURS must be a valid u64");

        let retention_sweep_interval_secs: u64 = std::env::var("RETENTION_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "3600".into())
            .parse()
            .expect("RETENTION_SWEEP_INTERVAL_SECS must be a valid u64");
        assert!(
            retention_sweep_interval_secs > 0,
            "RETENTION_SWEEP_INTERVAL_SECS must be at least 1"
        );

        let pose_service_url =
            std::env::var("POSE_SERVICE_URL").unwrap_or_else(|_| "http://localhost:8001".into());

        let pose_sample_every: u32 = std::env::var("POSE_SAMPLE_EVERY")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .expect("POSE_SAMPLE_EVERY must be a valid u32");
        assert!(pose_sample_every > 0, "POSE_SAMPLE_EVERY must be at least 1");

        let ffmpeg_bin = std::env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".into());
        let ffprobe_bin = std::env::var("FFPROBE_BIN").unwrap_or_else(|_| "ffprobe".into());

        let reencode_enabled: bool = std::env::var("REENCODE_ENABLED")
            .unwrap_or_else(|_| "true".into())
            .parse()
            .expect("REENCODE_ENABLED must be true or false");

        let reencode_timeout_secs: u64 = std::env::var("REENCODE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "120".into())
            .parse()
            .expect("REENCODE_TIMEOUT_SECS must be a valid u64");

        let trust_forwarded_for: bool = std::env::var("TRUST_FORWARDED_FOR")
            .unwrap_or_else(|_| "false".into())
            .parse()
            .expect("TRUST_FORWARDED_FOR must be true or false");

        Self {
            host,
            port,
            app_env,
            frontend_url,
            request_timeout_secs,
            upload_dir,
            results_dir,
            max_upload_bytes,
            max_concurrent_jobs,
            rate_limit_max_requests,
            rate_limit_window_secs,
            retention_hours,
            retention_sweep_interval_secs,
            pose_service_url,
            pose_sample_every,
            ffmpeg_bin,
            ffprobe_bin,
            reencode_enabled,
            reencode_timeout_secs,
            trust_forwarded_for,
        }
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn retention_ttl(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }

    pub fn retention_interval(&self) -> Duration {
        Duration::from_secs(self.retention_sweep_interval_secs)
    }
}
