use crate::binder::Mapping;
use crate::classify::AspectRatio;
use crate::placeholder::Delimiters;
use crate::sizer::{DEFAULT_HEIGHT, DEFAULT_SCALE, DEFAULT_WIDTH};
use crate::style::FontSource;
use crate::truncate::TruncateOptions;
use crate::upload::UploadConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub scale: f32,
    pub default_width: f32,
    pub default_height: f32,
    pub background: Option<String>,
    pub image_timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            default_width: DEFAULT_WIDTH,
            default_height: DEFAULT_HEIGHT,
            background: None,
            image_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BindingConfig {
    pub aspect_ratio: AspectRatio,
    pub delimiters: Vec<Delimiters>,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectRatio::Contain,
            delimiters: vec![Delimiters::default()],
        }
    }
}

/// How bounding boxes are obtained during binding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MeasureMode {
    /// Lay the document out with the renderer.
    #[default]
    Render,
    /// Estimate from font advances and shape attributes.
    Metrics,
}

impl std::str::FromStr for MeasureMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "render" => Ok(MeasureMode::Render),
            "metrics" => Ok(MeasureMode::Metrics),
            other => Err(format!("unknown measure mode {other:?} (expected render or metrics)")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub render: RenderConfig,
    pub binding: BindingConfig,
    pub truncate: TruncateOptions,
    pub measure: MeasureMode,
    pub fonts: Vec<FontSource>,
    pub default_font_family: Option<String>,
    /// Column naming each artifact; the first header column when unset.
    pub name_column: Option<String>,
    pub upload: Option<UploadConfig>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    render: Option<RenderConfigFile>,
    binding: Option<BindingConfigFile>,
    truncate: Option<TruncateConfigFile>,
    measure: Option<MeasureMode>,
    fonts: Option<Vec<FontSource>>,
    default_font_family: Option<String>,
    output: Option<OutputConfigFile>,
    upload: Option<UploadConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderConfigFile {
    scale: Option<f32>,
    default_width: Option<f32>,
    default_height: Option<f32>,
    background: Option<String>,
    image_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BindingConfigFile {
    aspect_ratio: Option<AspectRatio>,
    delimiters: Option<Vec<[String; 2]>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TruncateConfigFile {
    enabled: Option<bool>,
    margin: Option<f32>,
    ellipsis: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputConfigFile {
    name_column: Option<String>,
}

/// Strict JSON first, JSON5 (comments, trailing commas) as a fallback.
fn parse_json_like<T: DeserializeOwned>(contents: &str) -> anyhow::Result<T> {
    match serde_json::from_str(contents) {
        Ok(value) => Ok(value),
        Err(json_err) => json5::from_str(contents)
            .map_err(|_| anyhow::anyhow!("invalid JSON: {json_err}")),
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)
        .map_err(|err| anyhow::anyhow!("failed to read config {}: {err}", path.display()))?;
    let parsed: ConfigFile = parse_json_like(&contents)?;

    if let Some(render) = parsed.render {
        if let Some(v) = render.scale {
            config.render.scale = v;
        }
        if let Some(v) = render.default_width {
            config.render.default_width = v;
        }
        if let Some(v) = render.default_height {
            config.render.default_height = v;
        }
        if let Some(v) = render.background {
            config.render.background = Some(v);
        }
        if let Some(v) = render.image_timeout_secs {
            config.render.image_timeout_secs = v;
        }
    }

    if let Some(binding) = parsed.binding {
        if let Some(v) = binding.aspect_ratio {
            config.binding.aspect_ratio = v;
        }
        if let Some(pairs) = binding.delimiters {
            let delimiters: Vec<Delimiters> = pairs
                .iter()
                .filter(|[open, close]| !open.is_empty() && !close.is_empty())
                .map(|[open, close]| Delimiters::new(open, close))
                .collect();
            if delimiters.is_empty() {
                return Err(anyhow::anyhow!("binding.delimiters needs at least one non-empty pair"));
            }
            config.binding.delimiters = delimiters;
        }
    }

    if let Some(truncate) = parsed.truncate {
        if let Some(v) = truncate.enabled {
            config.truncate.enabled = v;
        }
        if let Some(v) = truncate.margin {
            config.truncate.margin = v;
        }
        if let Some(v) = truncate.ellipsis {
            config.truncate.ellipsis = v;
        }
    }

    if let Some(v) = parsed.measure {
        config.measure = v;
    }

    if let Some(fonts) = parsed.fonts {
        // Font paths are relative to the config file.
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.fonts = fonts
            .into_iter()
            .map(|mut font| {
                if font.path.is_relative() {
                    font.path = base.join(&font.path);
                }
                font
            })
            .collect();
    }
    if let Some(v) = parsed.default_font_family {
        config.default_font_family = Some(v);
    }

    if let Some(output) = parsed.output {
        config.name_column = output.name_column;
    }

    if let Some(upload) = parsed.upload {
        if upload.endpoint.trim().is_empty() {
            return Err(anyhow::anyhow!("upload.endpoint must not be empty"));
        }
        config.upload = Some(upload);
    }

    Ok(config)
}

/// Element-id to column mapping stored as a flat JSON object.
pub fn load_mapping(path: &Path) -> anyhow::Result<Mapping> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| anyhow::anyhow!("failed to read mapping {}: {err}", path.display()))?;
    let mapping: BTreeMap<String, String> = parse_json_like(&contents)?;
    Ok(mapping)
}

/// `ID=COLUMN` as given on the command line.
pub fn parse_mapping_pair(value: &str) -> anyhow::Result<(String, String)> {
    let (id, column) = value
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected ID=COLUMN, got {value:?}"))?;
    let (id, column) = (id.trim(), column.trim());
    if id.is_empty() || column.is_empty() {
        return Err(anyhow::anyhow!("expected ID=COLUMN, got {value:?}"));
    }
    Ok((id.to_string(), column.to_string()))
}
