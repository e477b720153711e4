// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, ValueEnum};
use env_logger;
use image::{DynamicImage, ImageReader, Rgb};
use imageproc::drawing;
use log::{error, info};

use ellipse_bench::blob_detector::{BlobDetectorParams, BlobEllipseDetector};
use ellipse_bench::contour_detector::{ContourDetectorParams, ContourEllipseDetector};
use ellipse_bench::detector::EllipseDetector;
use ellipse_bench::ellipse::DetectedEllipse;
use ellipse_bench::error::{BenchError, Result};
use ellipse_bench::grid::{detect_tiled, TileGrid, DEFAULT_TILE_SIZE};
use ellipse_bench::records::{create_parent_dir, load_json, write_json, DetectionRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Method {
    /// Otsu binarization, contour tracing and least-squares ellipse fits.
    Contour,
    /// Multi-scale Difference-of-Gaussians blob search.
    Blob,
}

/// Detects ellipses in a composite image and writes them as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about=None)]
struct Args {
    /// Image to process.
    input_image: PathBuf,

    /// Where the detection JSON is written.
    output_json: PathBuf,

    /// If given, an annotated copy of the image is written to this directory
    /// as <stem>_detections.png.
    output_dir: Option<PathBuf>,

    /// Detection method.
    #[arg(short, long, value_enum, default_value_t = Method::Contour)]
    method: Method,

    /// Tile side length; the image must be a square grid of such tiles.
    #[arg(short, long, default_value_t = DEFAULT_TILE_SIZE)]
    tile_size: u32,

    /// Run the detector once over the whole image instead of per tile.
    #[arg(short, long, default_value_t = false)]
    whole_image: bool,

    /// JSON file of detector parameters. Missing fields keep their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Include simplified contour outlines in the output (contour method).
    #[arg(long, default_value_t = false)]
    contours: bool,
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")).init();

    // Usage errors exit with 1 like every other failure; help and version
    // requests exit cleanly.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        },
    };
    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    info!("Processing {:?}", args.input_image);
    let img = read_image(&args.input_image)?;
    let img_u8 = img.to_luma8();
    let (width, height) = img_u8.dimensions();
    if width == 0 || height == 0 {
        return Err(BenchError::EmptyImage.in_file(&args.input_image));
    }
    let detector = make_detector(args)?;

    let detection_start = Instant::now();
    let detections = if args.whole_image {
        detector.detect(&img_u8)
    } else {
        let grid = TileGrid::infer(&img_u8, args.tile_size)
            .map_err(|e| e.in_file(&args.input_image))?;
        detect_tiled(&img_u8, &grid, detector.as_ref())?
    };
    let elapsed = detection_start.elapsed();
    info!("WxH: {}x{}; {:?} detection found {} ellipses in {:?}",
          width, height, args.method, detections.len(), elapsed);

    write_json(&args.output_json, &DetectionRecord::new(&detections))?;
    info!("Wrote {:?}", args.output_json);

    if let Some(output_dir) = &args.output_dir {
        let stem = args.input_image.file_stem()
            .map_or("image".to_string(), |s| s.to_string_lossy().into_owned());
        let mut output_path = output_dir.clone();
        output_path.push(format!("{}_detections.png", stem));
        write_annotated(img, &detections, &output_path)?;
        info!("Wrote {:?}", output_path);
    }
    Ok(())
}

fn read_image(path: &Path) -> Result<DynamicImage> {
    let read = || -> Result<DynamicImage> {
        Ok(ImageReader::open(path)?.decode()?)
    };
    read().map_err(|e| e.in_file(path))
}

fn make_detector(args: &Args) -> Result<Box<dyn EllipseDetector>> {
    let detector: Box<dyn EllipseDetector> = match args.method {
        Method::Contour => {
            let mut params: ContourDetectorParams = match &args.config {
                Some(path) => load_json(path)?,
                None => ContourDetectorParams::default(),
            };
            if args.contours {
                params.retain_boundary = true;
            }
            Box::new(ContourEllipseDetector::new(params)?)
        },
        Method::Blob => {
            let params: BlobDetectorParams = match &args.config {
                Some(path) => load_json(path)?,
                None => BlobDetectorParams::default(),
            };
            Box::new(BlobEllipseDetector::new(params)?)
        },
    };
    Ok(detector)
}

// Scribble each detection into a color copy of the image: the retained
// contour in green where there is one, otherwise the fitted ellipse in red.
fn write_annotated(img: DynamicImage, detections: &[DetectedEllipse], output_path: &Path)
                   -> Result<()> {
    let mut img_color = img.into_rgb8();
    for detection in detections {
        let (outline, color) = match &detection.boundary {
            Some(boundary) if boundary.len() >= 2 =>
                (boundary.clone(), Rgb::<u8>([0, 255, 0])),
            _ => (detection.ellipse.outline(/*n=*/72), Rgb::<u8>([255, 0, 0])),
        };
        for (i, &[x0, y0]) in outline.iter().enumerate() {
            let [x1, y1] = outline[(i + 1) % outline.len()];
            drawing::draw_line_segment_mut(
                &mut img_color, (x0 as f32, y0 as f32), (x1 as f32, y1 as f32), color);
        }
        drawing::draw_hollow_circle_mut(
            &mut img_color,
            (detection.ellipse.center_x as i32, detection.ellipse.center_y as i32),
            2,
            Rgb::<u8>([255, 255, 0]));
    }
    let save = || -> Result<()> {
        create_parent_dir(output_path)?;
        img_color.save(output_path)?;
        Ok(())
    };
    save().map_err(|e| e.in_file(output_path))
}
