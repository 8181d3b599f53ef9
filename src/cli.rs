// ============================================================================
// MaskPaint CLI: headless mask editing against a directory store
// ============================================================================
//
// Usage examples:
//   maskpaint --image shots/photo.png --op "stroke:10,10;80,40" --op "fill:5,5"
//   maskpaint -i photo.jpg --session photo.mps --op clear --op undo
//   maskpaint -i photo.jpg --mask mask_3f2a.png --export mask.png --preview overlay.png
//   maskpaint -i photo.png --export mask.png --export-image rgb.png \
//             --width 720 --height 1280 --keep-proportion crop --crop-position top
//
// The image and every uploaded mask live in the store directory (by default
// the image's own directory).  Operations run in the order given, exactly as
// the matching pointer gestures would.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;

use maskpaint::components::tools::Tool;
use maskpaint::io::{BlobStore, DirStore};
use maskpaint::ops::export::{self, CropPosition, ExportOptions, KeepProportion, ResizeFilter};
use maskpaint::{EditorSettings, Point, Project, ProjectEvent, SessionState};
use maskpaint::{log_err, log_info};

/// Upper bound for any single wait on store I/O.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// MaskPaint headless mask editor.
#[derive(Parser, Debug)]
#[command(
    name = "maskpaint",
    about = "Paint, erase and fill inpainting masks without a GUI",
    long_about = "Apply brush, eraser, fill, clear and undo operations to the mask of a\n\
                  source image.  Masks are stored as PNG files next to the image and\n\
                  the resulting handle is printed (and saved to --session if given).\n\n\
                  Operations (--op, repeatable, applied in order):\n  \
                  stroke:X,Y;X,Y;...   brush stroke through the points (mask pixels)\n  \
                  erase:X,Y;X,Y;...    eraser stroke\n  \
                  fill:X,Y             flood fill from a seed\n  \
                  clear                erase everything\n  \
                  undo                 revert the last operation"
)]
pub struct CliArgs {
    /// Source image file.  Optional when --session names one.
    #[arg(short, long, value_name = "FILE")]
    pub image: Option<PathBuf>,

    /// Store directory for images and masks (defaults to the image's directory).
    #[arg(long, value_name = "DIR")]
    pub store: Option<PathBuf>,

    /// Session file holding {image, mask handle}; read if present, written on exit.
    #[arg(short, long, value_name = "FILE")]
    pub session: Option<PathBuf>,

    /// Existing mask handle to restore (overrides the session's).
    #[arg(short, long, value_name = "HANDLE")]
    pub mask: Option<String>,

    /// Start from an empty mask, discarding any saved one.
    #[arg(long)]
    pub reset: bool,

    /// Brush size in mask pixels (1-200).  Defaults to the saved setting.
    #[arg(short, long, value_name = "1-200")]
    pub brush_size: Option<u32>,

    /// Operation to apply; repeat for several.
    #[arg(long = "op", value_name = "OP")]
    pub ops: Vec<String>,

    /// Write the final mask as a single-channel PNG.  Without a stored mask the
    /// image's transparency is used.
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Write the RGB image, resized exactly like the exported mask.
    #[arg(long, value_name = "FILE")]
    pub export_image: Option<PathBuf>,

    /// Export width (defaults to the image's).
    #[arg(long, value_name = "PX")]
    pub width: Option<u32>,

    /// Export height (defaults to the image's).
    #[arg(long, value_name = "PX")]
    pub height: Option<u32>,

    /// Export resampling: nearest-exact, bilinear, area, bicubic, lanczos.
    #[arg(long, value_name = "METHOD", default_value = "bicubic")]
    pub upscale_method: String,

    /// Aspect handling when resizing: stretch, crop, pad.
    #[arg(long, value_name = "MODE", default_value = "stretch")]
    pub keep_proportion: String,

    /// Kept region for --keep-proportion crop: center, top, bottom, left, right.
    #[arg(long, value_name = "POS", default_value = "center")]
    pub crop_position: String,

    /// Round export dimensions down to a multiple of this.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub divisible_by: u32,

    /// Persist --brush-size as the new default.
    #[arg(long)]
    pub save_settings: bool,

    /// Write the image with the mask overlaid.
    #[arg(long, value_name = "FILE")]
    pub preview: Option<PathBuf>,

    /// Print every engine event and timing.
    #[arg(short, long)]
    pub verbose: bool,
}

/// One parsed `--op` value.
#[derive(Clone, Debug, PartialEq)]
enum MaskOp {
    Stroke(Vec<Point>),
    Erase(Vec<Point>),
    Fill(Point),
    Clear,
    Undo,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the session and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    match run_session(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_err!("CLI session failed: {}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_session(args: &CliArgs) -> Result<(), String> {
    let start = Instant::now();

    let ops = args
        .ops
        .iter()
        .map(|s| parse_op(s.as_str()))
        .collect::<Result<Vec<_>, _>>()?;

    // -- Step 1: Resolve session, image and store ---------------------------
    let mut session = match &args.session {
        Some(path) if path.exists() => {
            SessionState::load(path).map_err(|e| format!("session load failed: {}", e))?
        }
        _ => SessionState::default(),
    };

    let store_dir = match (&args.store, &args.image) {
        (Some(dir), _) => dir.clone(),
        (None, Some(image)) => image
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
        (None, None) => PathBuf::from("."),
    };
    if let Some(image) = &args.image {
        session.image = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| format!("'{}' is not a file path", image.display()))?;
    }
    if session.image.is_empty() {
        return Err("no image given (use --image or a --session that names one)".to_string());
    }
    if let Some(handle) = &args.mask {
        session.mask_data = handle.clone();
    }
    if args.reset {
        session.mask_data.clear();
    }

    let mut settings = EditorSettings::load();
    if let Some(size) = args.brush_size {
        settings.brush_size = size;
    }
    if args.save_settings {
        settings.save();
    }
    let store: Arc<dyn BlobStore> = Arc::new(DirStore::new(&store_dir, settings.mask_prefix.clone()));

    // -- Step 2: Load ---------------------------------------------------------
    let mut project = Project::restore(Arc::clone(&store), &settings, &session)
        .map_err(|e| format!("load failed: {}", e))?;
    report(&project.wait_idle(IO_TIMEOUT), args.verbose)?;
    if !project.is_ready() {
        return Err(format!("'{}' did not become ready", session.image));
    }
    if args.verbose {
        let (w, h) = project.surface().dimensions();
        println!("  loaded {} ({}x{}) from {}", session.image, w, h, store_dir.display());
    }

    // -- Step 3: Apply operations --------------------------------------------
    for op in &ops {
        apply_op(&mut project, op);
        // Let each upload land before the next op so every state is persisted.
        report(&project.wait_idle(IO_TIMEOUT), args.verbose)?;
    }
    if !project.is_idle() {
        return Err("timed out waiting for the store".to_string());
    }

    // -- Step 4: Outputs -----------------------------------------------------
    let handle = project.mask_handle().to_string();
    println!("{}", if handle.is_empty() { "(no mask)" } else { handle.as_str() });

    if (args.export.is_some() || args.export_image.is_some())
        && let Some(source) = project.source_image()
    {
        let opts = export_options(args, source.dimensions())?;
        let stored = if handle.is_empty() {
            None
        } else {
            Some(store.fetch(&handle).map_err(|e| format!("mask fetch failed: {}", e))?)
        };
        let (image, mask) =
            export::export(source, stored.as_deref(), &opts).map_err(|e| format!("export failed: {}", e))?;
        if let Some(path) = &args.export {
            mask.save(path).map_err(|e| format!("export write failed: {}", e))?;
        }
        if let Some(path) = &args.export_image {
            image.save(path).map_err(|e| format!("export write failed: {}", e))?;
        }
        if args.verbose {
            println!("  exported {}x{}", mask.width(), mask.height());
        }
    }

    if let Some(path) = &args.preview
        && let Some(preview) = project.preview()
    {
        preview.save(path).map_err(|e| format!("preview write failed: {}", e))?;
    }

    if let Some(path) = &args.session {
        project
            .session_state()
            .save(path)
            .map_err(|e| format!("session save failed: {}", e))?;
    }

    log_info!("CLI session done in {:.0}ms", start.elapsed().as_secs_f64() * 1000.0);
    if args.verbose {
        let history = project.history();
        println!(
            "  history: {} step(s), {} KiB",
            history.undo_count(),
            history.memory_usage() / 1024
        );
        if let Some(log) = maskpaint::logger::log_path() {
            println!("  log: {}", log.display());
        }
        println!("  done ({:.0}ms)", start.elapsed().as_secs_f64() * 1000.0);
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn apply_op(project: &mut Project, op: &MaskOp) {
    match op {
        MaskOp::Stroke(points) => {
            project.tools.select(Tool::Brush);
            project.stroke(points);
        }
        MaskOp::Erase(points) => {
            project.tools.select(Tool::Eraser);
            project.stroke(points);
        }
        MaskOp::Fill(seed) => {
            project.tools.select(Tool::Fill);
            project.fill_at(*seed);
        }
        MaskOp::Clear => project.clear(),
        MaskOp::Undo => {
            project.undo();
        }
    }
}

fn export_options(args: &CliArgs, (w, h): (u32, u32)) -> Result<ExportOptions, String> {
    let keep_proportion = KeepProportion::from_name(&args.keep_proportion)
        .ok_or_else(|| format!("unknown --keep-proportion '{}'", args.keep_proportion))?;
    Ok(ExportOptions {
        width: args.width.unwrap_or(w),
        height: args.height.unwrap_or(h),
        filter: ResizeFilter::from_name(&args.upscale_method),
        keep_proportion,
        crop_position: CropPosition::from_name(&args.crop_position),
        divisible_by: args.divisible_by,
    })
}

/// Print events; a failed image load is fatal, everything else is informational.
fn report(events: &[ProjectEvent], verbose: bool) -> Result<(), String> {
    for event in events {
        match event {
            ProjectEvent::ImageFailed { name, error } => {
                return Err(format!("could not load '{}': {}", name, error));
            }
            ProjectEvent::MaskLoadFailed { handle, error } => {
                eprintln!("warning: mask '{}' could not be restored: {}", handle, error);
            }
            ProjectEvent::UploadFailed { error } => {
                eprintln!("warning: mask upload failed: {}", error);
            }
            other if verbose => println!("  {:?}", other),
            _ => {}
        }
    }
    Ok(())
}

fn parse_op(s: &str) -> Result<MaskOp, String> {
    let (name, rest) = s.split_once(':').unwrap_or((s, ""));
    match name.trim().to_ascii_lowercase().as_str() {
        "stroke" => Ok(MaskOp::Stroke(parse_points(rest)?)),
        "erase" => Ok(MaskOp::Erase(parse_points(rest)?)),
        "fill" => match parse_points(rest)?.as_slice() {
            [seed] => Ok(MaskOp::Fill(*seed)),
            _ => Err(format!("fill takes exactly one point: '{}'", s)),
        },
        "clear" => Ok(MaskOp::Clear),
        "undo" => Ok(MaskOp::Undo),
        _ => Err(format!("unknown operation '{}'", s)),
    }
}

fn parse_points(s: &str) -> Result<Vec<Point>, String> {
    let points = s
        .split(';')
        .filter(|p| !p.trim().is_empty())
        .map(|p| {
            let (x, y) = p
                .split_once(',')
                .ok_or_else(|| format!("expected X,Y but got '{}'", p))?;
            let x = x.trim().parse::<f32>().map_err(|_| format!("bad x in '{}'", p))?;
            let y = y.trim().parse::<f32>().map_err(|_| format!("bad y in '{}'", p))?;
            Ok(Point::new(x, y))
        })
        .collect::<Result<Vec<_>, String>>()?;
    if points.is_empty() {
        return Err(format!("no points in '{}'", s));
    }
    Ok(points)
}
