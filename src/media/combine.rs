/*!
 * Short-video composition: loop a background clip under a narration track and
 * burn in the caption file, cutting the result to the narration's length.
 */

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::errors::MediaError;
use crate::file_utils::FileManager;
use crate::media::clip::{format_seconds, AUDIO_ENCODE_ARGS, VERTICAL_FILTER, VIDEO_ENCODE_ARGS};
use crate::media::locator::ToolPaths;
use crate::media::probe::MediaProber;
use crate::media::progress::{ProgressEvent, ProgressParser, ProgressReporter};
use crate::media::runner::{CancellationToken, ProcessRunner, RunOutcome};

/// Background blur applied before the caption burn-in
pub const BLUR_FILTER: &str = "boxblur=10:2";

/// Background desaturation applied before the caption burn-in
pub const GRAYSCALE_FILTER: &str = "hue=s=0";

/// An sRGB colour with alpha, written as `#RRGGBB` or `#RRGGBBAA`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// 255 is fully opaque
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::opaque(255, 255, 255);
    pub const BLACK: Rgba = Rgba::opaque(0, 0, 0);

    /// Colour with full opacity
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// ASS colour literal `&HAABBGGRR`, where AA is transparency
    pub fn to_ass(&self) -> String {
        format!("&H{:02X}{:02X}{:02X}{:02X}", 255 - self.a, self.b, self.g, self.r)
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }
}

impl FromStr for Rgba {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if !(hex.len() == 6 || hex.len() == 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("Invalid colour '{}': expected #RRGGBB or #RRGGBBAA", s));
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| e.to_string());
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a: if hex.len() == 8 { channel(6)? } else { 255 },
        })
    }
}

impl TryFrom<String> for Rgba {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgba> for String {
    fn from(colour: Rgba) -> Self {
        colour.to_string()
    }
}

/// Vertical caption placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleAlignment {
    Top,
    Middle,
    #[default]
    Bottom,
}

impl SubtitleAlignment {
    /// ASS numpad alignment (horizontally centred)
    pub fn ass_code(&self) -> u8 {
        match self {
            Self::Bottom => 2,
            Self::Middle => 5,
            Self::Top => 8,
        }
    }
}

impl FromStr for SubtitleAlignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "top" => Ok(Self::Top),
            "middle" | "center" | "centre" => Ok(Self::Middle),
            "bottom" => Ok(Self::Bottom),
            other => Err(format!("Unknown alignment '{}'", other)),
        }
    }
}

/// Caption appearance and background treatment for one composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleStyle {
    pub font_name: String,
    pub font_size: u32,
    pub font_color: Rgba,
    pub outline_color: Rgba,
    pub outline_thickness: u32,
    pub alignment: SubtitleAlignment,
    /// Draw an opaque box behind the text instead of an outline
    pub background_box: bool,
    pub background_color: Rgba,
    pub blur_background: bool,
    pub grayscale_background: bool,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_name: "Arial".to_string(),
            font_size: 24,
            font_color: Rgba::WHITE,
            outline_color: Rgba::BLACK,
            outline_thickness: 2,
            alignment: SubtitleAlignment::Bottom,
            background_box: false,
            background_color: Rgba { r: 0, g: 0, b: 0, a: 0x80 },
            blur_background: false,
            grayscale_background: false,
        }
    }
}

impl SubtitleStyle {
    /// Reject values that would break the filter graph
    pub fn validate(&self) -> Result<(), MediaError> {
        if self.font_name.trim().is_empty() {
            return Err(MediaError::InvalidInput("Font name must not be empty".to_string()));
        }
        if self.font_name.contains([',', '\'', '=', ':', '\\']) {
            return Err(MediaError::InvalidInput(format!(
                "Font name '{}' contains characters not allowed in a style override",
                self.font_name
            )));
        }
        if self.font_size == 0 {
            return Err(MediaError::InvalidInput("Font size must be positive".to_string()));
        }
        Ok(())
    }

    /// ASS `force_style` override string
    pub fn force_style(&self) -> String {
        // With BorderStyle=3 the outline colour paints the box
        let (border_style, outline_colour) = if self.background_box {
            (3, self.background_color)
        } else {
            (1, self.outline_color)
        };
        format!(
            "FontName={},FontSize={},PrimaryColour={},OutlineColour={},BackColour={},BorderStyle={},Outline={},Shadow=0,Alignment={}",
            self.font_name,
            self.font_size,
            self.font_color.to_ass(),
            outline_colour.to_ass(),
            self.background_color.to_ass(),
            border_style,
            self.outline_thickness,
            self.alignment.ass_code()
        )
    }
}

/// Inputs and output of one composition
#[derive(Debug, Clone, PartialEq)]
pub struct CombineRequest {
    /// Looped background video
    pub background_path: PathBuf,
    /// Narration audio; its duration sets the output length
    pub audio_path: PathBuf,
    /// Caption file (SRT)
    pub cues_path: PathBuf,
    /// Destination file, created or overwritten
    pub output_path: PathBuf,
}

/// Escape a path for use inside a single-quoted filter argument.
///
/// Windows separators become `/` first; the remaining filter
/// metacharacters are backslash-escaped.
pub fn escape_filter_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    #[cfg(windows)]
    let raw = raw.replace('\\', "/");

    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\'' => escaped.push_str("'\\''"),
            '\\' | ':' | '[' | ']' | ',' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// The `-filter_complex` graph: reframe, optional blur/grayscale, captions
pub fn build_filter_graph(cues_path: &Path, style: &SubtitleStyle) -> String {
    let mut chain = vec![VERTICAL_FILTER.to_string()];
    if style.blur_background {
        chain.push(BLUR_FILTER.to_string());
    }
    if style.grayscale_background {
        chain.push(GRAYSCALE_FILTER.to_string());
    }
    chain.push(format!(
        "subtitles='{}':force_style='{}'",
        escape_filter_path(cues_path),
        style.force_style()
    ));
    format!("[0:v]{}[outv]", chain.join(","))
}

/// Transcoder arguments for a composition of `duration`
pub fn build_combine_args(request: &CombineRequest, style: &SubtitleStyle, duration: Duration) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-stream_loop".into(),
        "-1".into(),
        "-i".into(),
        request.background_path.to_string_lossy().into_owned(),
        "-i".into(),
        request.audio_path.to_string_lossy().into_owned(),
        "-filter_complex".into(),
        build_filter_graph(&request.cues_path, style),
        "-map".into(),
        "[outv]".into(),
        "-map".into(),
        "1:a".into(),
        "-t".into(),
        format_seconds(duration),
    ];
    args.extend(VIDEO_ENCODE_ARGS.iter().map(|a| a.to_string()));
    args.extend(AUDIO_ENCODE_ARGS.iter().map(|a| a.to_string()));
    args.extend([
        "-movflags".to_string(),
        "+faststart".to_string(),
        request.output_path.to_string_lossy().into_owned(),
    ]);
    args
}

/// Composes narrated vertical shorts
#[derive(Debug, Clone)]
pub struct Combiner {
    tools: ToolPaths,
    prober: MediaProber,
}

impl Combiner {
    /// Create a combiner over verified tool paths
    pub fn new(tools: ToolPaths) -> Self {
        Self {
            prober: MediaProber::new(tools.clone()),
            tools,
        }
    }

    /// Run the composition; the output is removed again on failure or cancellation
    pub async fn combine(
        &self,
        request: &CombineRequest,
        style: &SubtitleStyle,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<(), MediaError> {
        let transcoder = self.tools.require_transcoder()?;
        for (what, path) in [
            ("Background video", &request.background_path),
            ("Audio", &request.audio_path),
            ("Subtitle file", &request.cues_path),
        ] {
            if !FileManager::file_exists(path) {
                return Err(MediaError::InvalidInput(format!("{} not found: {}", what, path.display())));
            }
        }
        style.validate()?;

        progress.report(ProgressEvent::message(0.0, "Reading narration duration"));
        let duration = self.prober.duration(&request.audio_path, cancel).await?;

        if let Some(parent) = request.output_path.parent() {
            FileManager::ensure_dir(parent)?;
        }

        let args = build_combine_args(request, style, duration);
        let mut parser = ProgressParser::new(duration, "Combining");
        let result = match ProcessRunner::run(transcoder, &args, cancel, |line| {
            progress.report(parser.parse_line(line));
        })
        .await
        {
            Ok(RunOutcome::Exited(output)) if output.success() => Ok(()),
            Ok(RunOutcome::Exited(output)) => Err(MediaError::ToolFailure {
                tool: "combine".to_string(),
                exit_code: output.exit_code,
                diagnostics: output.diagnostics(),
            }),
            Ok(RunOutcome::Cancelled(_)) => Err(MediaError::Cancelled),
            Err(e) => Err(e),
        };

        match &result {
            Ok(()) => {
                info!(
                    "Combined short written to {} ({:.1}s)",
                    request.output_path.display(),
                    duration.as_secs_f64()
                );
                progress.report(ProgressEvent::message(1.0, "Short created"));
            }
            Err(e) => {
                if !e.is_cancelled() {
                    error!("Combining into {} failed: {}", request.output_path.display(), e);
                }
                FileManager::remove_partial_output(&request.output_path);
            }
        }
        result
    }
}
