//! Duration probe: a one-shot `ffprobe` invocation run before the first
//! transcoder spawn, so the Playlist Synthesizer can write a complete VOD
//! manifest up front. Grounded on `dog4ik-media-server/src/ffmpeg.rs`'s
//! `get_metadata` (spawn, collect stdout, `serde_json::from_slice`).

use std::path::Path;
use std::process::Stdio;

use anyhow::Context;
use serde::Deserialize;
use tokio::process::Command;

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: String,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

/// Runs `ffprobe -show_format` against `source_url` and returns the reported
/// duration in seconds.
pub async fn probe_duration(ffprobe_path: &Path, source_url: &str) -> anyhow::Result<f64> {
    let output = Command::new(ffprobe_path)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", source_url])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .context("spawn ffprobe")?;

    if !output.status.success() {
        anyhow::bail!("ffprobe exited with {}", output.status);
    }

    let parsed: ProbeOutput =
        serde_json::from_slice(&output.stdout).context("parse ffprobe json output")?;
    parsed
        .format
        .duration
        .parse::<f64>()
        .context("parse duration as f64")
}
