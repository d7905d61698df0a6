use std::{env, path::PathBuf, sync::OnceLock};

use clap::Parser;
use serde::Deserialize;

/// Runtime configuration for the gateway (§6 of the spec).
///
/// Values are resolved with CLI flags taking priority over environment
/// variables, which take priority over an optional TOML config file, which
/// takes priority over the built-in default — the same precedence order the
/// teacher's `ConfigStore::customized()` applies per-setting, collapsed here
/// into one flat struct since this gateway has no runtime-editable settings
/// API to serve.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub transcode_dir: PathBuf,
    pub hls_segment_duration: u32,
    pub hls_segment_max_gap: usize,
    pub self_destruct_duration: u64,
    pub max_concurrent_streams: usize,
    pub debug_logging: bool,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 8000,
            transcode_dir: PathBuf::from("transcoding-tmp"),
            hls_segment_duration: 5,
            hls_segment_max_gap: 3,
            self_destruct_duration: 60,
            max_concurrent_streams: 3,
            debug_logging: false,
            ffmpeg_path: PathBuf::from("ffmpeg_build/ffmpeg"),
            ffprobe_path: PathBuf::from("ffmpeg_build/ffprobe"),
        }
    }
}

/// CLI overrides, the highest-precedence configuration source.
#[derive(Debug, Parser)]
#[command(version, about = "On-demand RTSP to HLS transcoding gateway")]
pub struct Args {
    /// Override the TCP listen port
    #[arg(long)]
    pub port: Option<u16>,
    /// Override the working directory for transcode artifacts
    #[arg(long)]
    pub transcode_dir: Option<PathBuf>,
    /// Path to a TOML configuration file, layered under CLI/env overrides
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,
    /// Enable debug-level logging
    #[arg(long)]
    pub debug: bool,
}

/// Overlay read from an optional TOML config file. Every field is optional so
/// a partial file only overrides the keys it sets, mirroring the teacher's
/// `ConfigFile::read` + per-setting `deserialize_toml`.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    server_port: Option<u16>,
    transcode_dir: Option<PathBuf>,
    hls_segment_duration: Option<u32>,
    hls_segment_max_gap: Option<usize>,
    self_destruct_duration: Option<u64>,
    max_concurrent_streams: Option<usize>,
    debug_logging: Option<bool>,
    ffmpeg_path: Option<PathBuf>,
    ffprobe_path: Option<PathBuf>,
}

impl FileConfig {
    async fn load(path: &PathBuf) -> Self {
        let Ok(raw) = tokio::fs::read_to_string(path).await else {
            return Self::default();
        };
        toml::from_str(&raw).unwrap_or_else(|err| {
            tracing::warn!("failed to parse config file {}: {err}", path.display());
            Self::default()
        })
    }
}

fn env_value<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|raw| raw.parse().ok())
}

impl Config {
    pub async fn load(args: Args) -> Self {
        let file = FileConfig::load(&args.config).await;
        let default = Config::default();

        Self {
            server_port: args
                .port
                .or_else(|| env_value("SERVER_PORT"))
                .or(file.server_port)
                .unwrap_or(default.server_port),
            transcode_dir: args
                .transcode_dir
                .or_else(|| env::var("TRANSCODE_DIR").ok().map(PathBuf::from))
                .or(file.transcode_dir)
                .unwrap_or(default.transcode_dir),
            hls_segment_duration: env_value("HLS_SEGMENT_DURATION")
                .or(file.hls_segment_duration)
                .unwrap_or(default.hls_segment_duration),
            hls_segment_max_gap: env_value("HLS_SEGMENT_MAX_GAP")
                .or(file.hls_segment_max_gap)
                .unwrap_or(default.hls_segment_max_gap),
            self_destruct_duration: env_value("SELF_DESTRUCT_DURATION")
                .or(file.self_destruct_duration)
                .unwrap_or(default.self_destruct_duration),
            max_concurrent_streams: env_value("MAX_CONCURRENT_STREAMS")
                .or(file.max_concurrent_streams)
                .unwrap_or(default.max_concurrent_streams),
            debug_logging: args.debug
                || env_value("DEBUG_LOGGING").unwrap_or(false)
                || file.debug_logging.unwrap_or(false),
            ffmpeg_path: env::var("FFMPEG_PATH")
                .ok()
                .map(PathBuf::from)
                .or(file.ffmpeg_path)
                .unwrap_or(default.ffmpeg_path),
            ffprobe_path: env::var("FFPROBE_PATH")
                .ok()
                .map(PathBuf::from)
                .or(file.ffprobe_path)
                .unwrap_or(default.ffprobe_path),
        }
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Installs the process-wide configuration. Must be called exactly once,
/// before any handler or background task reaches for [`get`].
pub fn init(config: Config) {
    CONFIG
        .set(config)
        .unwrap_or_else(|_| panic!("config initialized more than once"));
}

/// Borrows the process-wide configuration, mirroring the teacher's
/// `config::CONFIG` static.
pub fn get() -> &'static Config {
    CONFIG
        .get()
        .expect("config not initialized; call config::init first")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(config_path: PathBuf) -> Args {
        Args {
            port: None,
            transcode_dir: None,
            config: config_path,
            debug: false,
        }
    }

    #[tokio::test]
    async fn defaults_when_nothing_set() {
        let config = Config::load(args(PathBuf::from("does-not-exist.toml"))).await;
        let default = Config::default();
        assert_eq!(config.server_port, default.server_port);
        assert_eq!(config.hls_segment_duration, default.hls_segment_duration);
        assert_eq!(config.max_concurrent_streams, default.max_concurrent_streams);
        assert!(!config.debug_logging);
    }

    #[tokio::test]
    async fn cli_overrides_default() {
        let mut a = args(PathBuf::from("does-not-exist.toml"));
        a.port = Some(9100);
        a.debug = true;
        let config = Config::load(a).await;
        assert_eq!(config.server_port, 9100);
        assert!(config.debug_logging);
    }

    #[tokio::test]
    async fn file_overrides_default_but_not_cli() {
        let dir = std::env::temp_dir().join(format!("rtsp-hls-gateway-test-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let config_path = dir.join("config.toml");
        tokio::fs::write(
            &config_path,
            "server_port = 9200\nmax_concurrent_streams = 7\n",
        )
        .await
        .unwrap();

        let mut a = args(config_path);
        a.port = Some(9999);
        let config = Config::load(a).await;
        assert_eq!(config.server_port, 9999, "CLI must win over file");
        assert_eq!(config.max_concurrent_streams, 7);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
