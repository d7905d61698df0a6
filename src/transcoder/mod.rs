//! Transcoder Driver (§4.1): probes the source, synthesizes and persists the
//! VOD manifest, then spawns the ffmpeg child. Restructured from the
//! teacher's callback-oriented `HlsJobHandle::start` into a single
//! `Result`-returning async function — the natural Rust shape for "exactly
//! one of {success, failure} fires", per the spec's own design note.

pub mod command;
pub mod probe;

use tokio::process::Child;

use crate::app_error::AppError;
use crate::config::Config;
use crate::playlist;

pub struct TranscodeResult {
    pub child: Child,
    pub manifest: String,
}

/// Probes `source_url`, writes `<identifier>_master.m3u8`, and spawns the
/// ffmpeg child producing `<identifier><n>.ts` segments from
/// `seek_start_segment` onward.
pub async fn spawn(
    config: &'static Config,
    identifier: &str,
    source_url: &str,
    seek_start_segment: usize,
) -> Result<TranscodeResult, AppError> {
    let duration = probe::probe_duration(&config.ffprobe_path, source_url)
        .await
        .map_err(|err| AppError::probe(err.to_string()))?;

    let manifest = playlist::synthesize(duration, identifier, config.hls_segment_duration);

    let master_path = config.transcode_dir.join(format!("{identifier}_master.m3u8"));
    tokio::fs::write(&master_path, &manifest)
        .await
        .map_err(|err| AppError::spawn(format!("failed to persist manifest: {err}")))?;

    let spawn_args = command::SpawnArgs {
        ffmpeg_path: config.ffmpeg_path.clone(),
        source_url: source_url.to_string(),
        identifier: identifier.to_string(),
        transcode_dir: config.transcode_dir.clone(),
        segment_duration: config.hls_segment_duration,
        seek_start_segment,
    };

    let child = command::spawn(&spawn_args)
        .map_err(|err| AppError::spawn(format!("failed to start transcoder: {err}")))?;

    Ok(TranscodeResult { child, manifest })
}
