use crate::assets::HttpFetcher;
use crate::batch::{BatchJob, BatchOptions, Collaborators, generate_batch};
use crate::binder::{BindOptions, Mapping};
use crate::config::{Config, MeasureMode, load_config, load_mapping, parse_mapping_pair};
use crate::measure::{Measure, MetricsMeasure};
use crate::package::sink_for;
use crate::render::{RenderOptions, ResvgBackend};
use crate::report::write_report;
use crate::sizer::SizerOptions;
use crate::style::font_style_block;
use crate::table::read_table;
use crate::text_metrics::register_font_file;
use crate::upload::{AssetUploader, HttpUploader};
use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "sbr",
    version,
    about = "Render one PNG banner per CSV row from an SVG template"
)]
pub struct Args {
    /// SVG template
    #[arg(short = 't', long = "template")]
    pub template: PathBuf,

    /// CSV data, first row is the header
    #[arg(short = 'd', long = "data")]
    pub data: PathBuf,

    /// Bind element ID to data COLUMN (repeatable)
    #[arg(short = 'm', long = "map", value_name = "ID=COLUMN")]
    pub map: Vec<String>,

    /// JSON object of element id -> column, merged under --map
    #[arg(long = "mapping")]
    pub mapping: Option<PathBuf>,

    /// Output directory, or a .zip archive path
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Config JSON file
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Raster scale factor over the template size
    #[arg(short = 's', long = "scale")]
    pub scale: Option<f32>,

    /// Column used to name output files
    #[arg(long = "name-column")]
    pub name_column: Option<String>,

    /// Bounding-box source: render or metrics
    #[arg(long = "measure")]
    pub measure: Option<MeasureMode>,

    /// Upload each banner to the configured asset service
    #[arg(long = "upload")]
    pub upload: bool,

    /// Write a CSV report of every row
    #[arg(short = 'r', long = "report")]
    pub report: Option<PathBuf>,

    /// Also keep the bound SVG of every row
    #[arg(long = "svg")]
    pub svg: bool,

    /// Debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    if let Some(scale) = args.scale {
        config.render.scale = scale;
    }
    if let Some(column) = &args.name_column {
        config.name_column = Some(column.clone());
    }
    if let Some(mode) = args.measure {
        config.measure = mode;
    }

    let mapping = resolve_mapping(&args)?;
    let template = std::fs::read_to_string(&args.template)
        .map_err(|err| anyhow::anyhow!("failed to read template {}: {err}", args.template.display()))?;
    let table = read_table(&args.data)?;
    if let Some(column) = &config.name_column {
        if !table.headers.contains(column) {
            return Err(anyhow::anyhow!("name column {column:?} is not in the data header"));
        }
    }

    let backend = ResvgBackend::new(&RenderOptions {
        fonts: config.fonts.clone(),
        default_font_family: config.default_font_family.clone(),
        background: config.render.background.clone(),
        resources_dir: args.template.parent().map(Path::to_path_buf),
    })?;
    for font in &config.fonts {
        register_font_file(&font.path)?;
    }
    let render_measure;
    let metrics_measure;
    let measurer: &dyn Measure = match config.measure {
        MeasureMode::Render => {
            render_measure = backend.measurer();
            &render_measure
        }
        MeasureMode::Metrics => {
            metrics_measure = MetricsMeasure {
                default_font_family: config
                    .default_font_family
                    .clone()
                    .unwrap_or_else(|| MetricsMeasure::default().default_font_family),
                ..Default::default()
            };
            &metrics_measure
        }
    };
    let fetcher = HttpFetcher::new(Duration::from_secs(config.render.image_timeout_secs))?;
    let uploader = if args.upload {
        let upload = config
            .upload
            .clone()
            .ok_or_else(|| anyhow::anyhow!("--upload needs an `upload` section in the config"))?;
        Some(HttpUploader::new(upload)?)
    } else {
        None
    };
    let mut sink = sink_for(&args.output)?;

    let job = BatchJob {
        template: &template,
        mapping: &mapping,
        table: &table,
        name_column: config.name_column.as_deref(),
        keep_svg: args.svg,
    };
    let options = batch_options(&config);
    let mut services = Collaborators {
        backend: &backend,
        measurer,
        fetcher: Some(&fetcher),
        sink: sink.as_mut(),
        uploader: uploader.as_ref().map(|u| u as &dyn AssetUploader),
    };
    let report = generate_batch(&job, &options, &mut services)?;

    if let Some(path) = &args.report {
        let file = std::fs::File::create(path)?;
        write_report(&report, std::io::BufWriter::new(file))?;
        log::info!("report written to {}", path.display());
    }
    if report.artifacts.is_empty() {
        return Err(anyhow::anyhow!(
            "no banner was produced ({} rows failed)",
            report.failures.len()
        ));
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .try_init();
}

/// `--mapping` file first, then `--map` pairs on top.
fn resolve_mapping(args: &Args) -> Result<Mapping> {
    let mut mapping = match &args.mapping {
        Some(path) => load_mapping(path)?,
        None => Mapping::new(),
    };
    for pair in &args.map {
        let (id, column) = parse_mapping_pair(pair)?;
        mapping.insert(id, column);
    }
    if mapping.is_empty() {
        return Err(anyhow::anyhow!("no mapping given; use --map ID=COLUMN or --mapping"));
    }
    Ok(mapping)
}

pub fn batch_options(config: &Config) -> BatchOptions {
    BatchOptions {
        sizer: SizerOptions {
            scale: config.render.scale,
            default_width: config.render.default_width,
            default_height: config.render.default_height,
            style_block: font_style_block(&config.fonts, config.default_font_family.as_deref()),
        },
        bind: BindOptions {
            delimiters: config.binding.delimiters.clone(),
            aspect: config.binding.aspect_ratio,
            truncate: config.truncate.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "sbr",
            "--template",
            "t.svg",
            "--data",
            "rows.csv",
            "--map",
            "title=Name",
            "-m",
            "hero=Photo",
            "--output",
            "out.zip",
            "--measure",
            "metrics",
        ])
        .unwrap();
        assert_eq!(args.map.len(), 2);
        assert_eq!(args.measure, Some(MeasureMode::Metrics));
        let mapping = resolve_mapping(&args).unwrap();
        assert_eq!(mapping.get("hero").map(String::as_str), Some("Photo"));
    }

    #[test]
    fn options_follow_config() {
        let mut config = Config::default();
        config.render.scale = 2.0;
        config.truncate.enabled = false;
        let options = batch_options(&config);
        assert_eq!(options.sizer.scale, 2.0);
        assert!(!options.bind.truncate.enabled);
        assert!(options.sizer.style_block.is_empty());
    }
}
