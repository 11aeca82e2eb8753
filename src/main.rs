use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Parser;
use log::info;
use simplelog::{Config, LevelFilter, WriteLogger};

use pdf_embed::headless::{AnnotationList, ImageSurface, PngPrintHost};
use pdf_embed::pdf::mupdf_engine::MupdfEngine;
use pdf_embed::pdf::{
    ContainerMetrics, DocumentSource, HostParts, LoadOptions, PrintHost, ScaleAction,
    ScaleDescriptor, Source, create_loading_task,
};
use pdf_embed::{Event, Props, Viewer, ViewerConfig};

/// Render a PDF page to PNG, or print pages to a directory of PNGs
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// PDF file to open
    file: PathBuf,

    /// Page to render (1-based)
    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Extra rotation in degrees
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    rotate: i32,

    /// auto, actual, fit, width or a percentage
    #[arg(long, value_parser = parse_scale)]
    scale: Option<ScaleDescriptor>,

    /// Displayed width in pixels
    #[arg(long, default_value_t = 800.0)]
    width: f64,

    /// Output image
    #[arg(long, default_value = "page.png")]
    out: PathBuf,

    /// Print into this directory instead of rendering one page
    #[arg(long)]
    print: Option<PathBuf>,

    #[arg(long)]
    dpi: Option<u32>,

    /// Pages to print, comma separated
    #[arg(long, value_delimiter = ',')]
    pages: Option<Vec<usize>>,

    #[arg(long)]
    password: Option<String>,

    #[arg(long, default_value = "pdf-embed.log")]
    log_file: PathBuf,
}

fn parse_scale(value: &str) -> Result<ScaleDescriptor, String> {
    let action = match value {
        "auto" => ScaleAction::Auto,
        "actual" => ScaleAction::Actual,
        "fit" => ScaleAction::Fit,
        "width" => ScaleAction::Width,
        other => {
            let percent: f64 = other
                .trim_end_matches('%')
                .parse()
                .map_err(|_| format!("unknown scale {other:?}"))?;
            return Ok(ScaleDescriptor::percent(percent));
        }
    };
    Ok(ScaleDescriptor::new(action))
}

fn main() -> Result<()> {
    human_panic::setup_panic!();
    let cli = Cli::parse();

    WriteLogger::init(
        LevelFilter::Debug,
        Config::default(),
        File::create(&cli.log_file)?,
    )?;
    info!("starting pdf-embed for {}", cli.file.display());

    let config = ViewerConfig::load();
    let surface = Arc::new(ImageSurface::new(cli.width, 1.0));
    let parts = HostParts {
        surface: surface.clone(),
        overlay: Arc::new(AnnotationList::default()),
        container: Arc::new(ContainerMetrics {
            frame_width: cli.width + config.scroll_width,
            frame_height: cli.width * 1.5,
            content_top: 0.0,
            content_width: cli.width,
        }),
        print_host: cli
            .print
            .clone()
            .map(|dir| Arc::new(PngPrintHost::new(dir)) as Arc<dyn PrintHost>),
    };

    let task = create_loading_task(
        DocumentSource::Url(cli.file.to_string_lossy().into_owned()),
        LoadOptions {
            password: cli.password.clone(),
            ..LoadOptions::default()
        },
    );
    let viewer = Viewer::mount(
        Arc::new(MupdfEngine::new()),
        parts,
        Props {
            src: None,
            page: cli.page,
            rotate: cli.rotate,
            scale: None,
        },
        config,
    );
    let events = viewer.events();
    viewer.set_src(Some(Source::Task(task)));

    for event in events.iter() {
        match event {
            Event::PageLoaded(number) => {
                info!("page {number} loaded");
                break;
            }
            Event::Error(e) => bail!("{e}"),
            Event::Password { reason, .. } => {
                bail!("document is password protected ({})", reason.as_str())
            }
            _ => {}
        }
    }

    if let Some(scale) = cli.scale {
        viewer.set_scale(scale);
    }

    if let Some(dir) = &cli.print {
        viewer.print(cli.dpi, cli.pages.clone());
        viewer.controller().wait_idle();
        if let Some(Event::Error(e)) = events.try_iter().find(|e| matches!(e, Event::Error(_))) {
            bail!("{e}");
        }
        println!("printed to {}", dir.display());
    } else {
        viewer.controller().wait_idle();
        surface.save_png(&cli.out)?;
        println!("wrote {}", cli.out.display());
    }

    viewer.unmount();
    Ok(())
}
