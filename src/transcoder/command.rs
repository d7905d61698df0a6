//! Transcoder Driver command builder (§4.1). Small per-concern
//! arg-appending functions, matching the teacher's
//! `apply_video_arguments`/`apply_audio_arguments` shape in
//! `dog4ik-media-server/src/watch/hls_stream/command.rs`.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};

const USER_AGENT: &str = "rtsp-hls-gateway/0.1";

#[derive(Debug, Clone)]
pub struct SpawnArgs {
    pub ffmpeg_path: PathBuf,
    pub source_url: String,
    pub identifier: String,
    pub transcode_dir: PathBuf,
    pub segment_duration: u32,
    /// Nonzero when this spawn follows a client seek: segments below this
    /// index are never produced, and the transcoder seeks the source to
    /// match.
    pub seek_start_segment: usize,
}

fn apply_input_arguments(c: &mut Command, args: &SpawnArgs) {
    c.arg("-rtsp_transport").arg("udp");
    c.arg("-fflags").arg("+genpts");
    c.arg("-noaccurate_seek");
    c.arg("-max_delay").arg("0");
    c.arg("-user_agent").arg(USER_AGENT);

    if args.seek_start_segment > 0 {
        let seek_seconds = args.seek_start_segment as f64 * args.segment_duration as f64;
        c.arg("-ss").arg(format!("{seek_seconds:.6}"));
    }

    c.arg("-i").arg(&args.source_url);
}

fn apply_output_arguments(c: &mut Command, args: &SpawnArgs) {
    c.arg("-c:v").arg("copy");
    c.arg("-c:a").arg("aac");

    c.arg("-f").arg("segment");
    c.arg("-segment_format").arg("mpegts");
    c.arg("-segment_time").arg(args.segment_duration.to_string());
    c.arg("-segment_start_number")
        .arg(args.seek_start_segment.to_string());

    let live_manifest = args.transcode_dir.join(format!("{}.m3u8", args.identifier));
    c.arg("-segment_list").arg(live_manifest);
    c.arg("-segment_list_type").arg("m3u8");

    c.arg("-break_non_keyframes").arg("1");
    c.arg("-avoid_negative_ts").arg("disabled");
    c.arg("-flags").arg("-global_header");
    c.arg("-vsync").arg("0");

    if args.seek_start_segment > 0 {
        let offset_seconds = args.seek_start_segment as f64 * args.segment_duration as f64;
        c.arg("-initial_offset").arg(format!("{offset_seconds:.6}"));
    }
}

/// Spawns `ffmpeg` writing MPEG-TS segments named `<identifier><n>.ts` into
/// `transcode_dir`, plus an auxiliary live manifest used by the poller's gap
/// analysis (§4.4).
pub fn spawn(args: &SpawnArgs) -> std::io::Result<Child> {
    let mut c = Command::new(&args.ffmpeg_path);
    apply_input_arguments(&mut c, args);
    apply_output_arguments(&mut c, args);

    let output_template = args.transcode_dir.join(format!("{}%d.ts", args.identifier));
    c.arg(output_template);

    tracing::debug!(
        identifier = %args.identifier,
        seek_start_segment = args.seek_start_segment,
        "spawning transcoder"
    );

    c.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
}
