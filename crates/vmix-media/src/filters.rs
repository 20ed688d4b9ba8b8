//! FFmpeg filter graphs for variant rendering.

/// Output frame rate of every variant.
pub const OUTPUT_FPS: u32 = 30;

/// Sample rate both audio inputs are resampled to before mixing.
pub const MIX_SAMPLE_RATE: u32 = 44_100;

/// Background music level relative to the voiceover.
pub const MUSIC_VOLUME: &str = "0.2";

/// Voiceover level.
pub const VOICE_VOLUME: &str = "1.0";

/// Normalize one clip input to a padded `width`x`height` frame.
pub fn filter_fit_clip(input: usize, width: u32, height: u32, label: &str) -> String {
    format!(
        "[{input}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps},format=yuv420p[{label}];",
        input = input,
        w = width,
        h = height,
        fps = OUTPUT_FPS,
        label = label
    )
}

/// Full graph for `clips` video inputs followed by music and voiceover.
///
/// Inputs `0..clips` are the clips in block order, `clips` is the looped
/// music track and `clips + 1` is the voiceover. Produces `[v]` and `[a]`.
pub fn build_mix_filter(clips: usize, width: u32, height: u32) -> String {
    let mut graph = String::new();
    let mut concat_inputs = String::new();

    for i in 0..clips {
        let label = format!("v{}", i);
        graph.push_str(&filter_fit_clip(i, width, height, &label));
        concat_inputs.push_str(&format!("[{}]", label));
    }

    graph.push_str(&format!("{}concat=n={}:v=1:a=0[v];", concat_inputs, clips));
    graph.push_str(&format!(
        "[{}:a]aresample={},volume={}[m];",
        clips, MIX_SAMPLE_RATE, MUSIC_VOLUME
    ));
    graph.push_str(&format!(
        "[{}:a]aresample={},volume={}[vo];",
        clips + 1,
        MIX_SAMPLE_RATE,
        VOICE_VOLUME
    ));
    graph.push_str("[m][vo]amix=inputs=2:duration=first[a]");

    graph
}
