//! Decoder command template

use super::types::FrameGeometry;
use std::time::Duration;

/// Program and argument template for the decoder process.
///
/// Arguments may contain `{url}`, `{width}`, `{height}`, `{fps}` and
/// `{pix_fmt}` placeholders.
#[derive(Debug, Clone)]
pub struct DecoderCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl DecoderCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// ffmpeg pulling RTSP over TCP, scaled and rate-limited, raw frames on stdout
    pub fn ffmpeg(program: impl Into<String>) -> Self {
        Self::new(
            program,
            [
                "-hide_banner",
                "-loglevel", "error",
                "-rtsp_transport", "tcp",
                "-i", "{url}",
                "-an",
                "-vf", "fps={fps},scale={width}:{height}",
                "-f", "rawvideo",
                "-pix_fmt", "{pix_fmt}",
                "-",
            ],
        )
    }

    /// Substitute placeholders in one pass, so substituted values (a URL
    /// containing `{fps}`, say) are never rewritten again
    pub fn render_args(&self, url: &str, geometry: &FrameGeometry, fps: u32) -> Vec<String> {
        let width = geometry.width.to_string();
        let height = geometry.height.to_string();
        let fps = fps.to_string();
        let lookup = |key: &str| match key {
            "url" => Some(url),
            "width" => Some(width.as_str()),
            "height" => Some(height.as_str()),
            "fps" => Some(fps.as_str()),
            "pix_fmt" => Some(geometry.pix_fmt()),
            _ => None,
        };

        self.args.iter().map(|arg| render(arg, &lookup)).collect()
    }
}

fn render<'a>(template: &str, lookup: &impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail
            .find('}')
            .and_then(|close| lookup(&tail[1..close]).map(|value| (value, close)));
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Everything needed to launch a decoder for one camera
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub command: DecoderCommand,
    pub geometry: FrameGeometry,
    pub fps: u32,
    /// SIGTERM → SIGKILL grace
    pub stop_grace: Duration,
}
