use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use image::RgbaImage;
use uuid::Uuid;

use crate::canvas::{DisplayRect, MaskSurface, Point};
use crate::components::history::HistoryManager;
use crate::components::tools::{Tool, ToolState};
use crate::io::{BlobStore, EditorError, IoResult, StoreError, decode_image, decode_png, is_supported_image};
use crate::logger::{self, Level, LogScope};
use crate::ops::fill;
use crate::ops::preview::compose_preview;
use crate::session::SessionState;
use crate::settings::EditorSettings;
use crate::upload::{SettleOutcome, UploadCoordinator, UploadState};

// ============================================================================
// HOST INPUT / OUTPUT
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerKind {
    Down,
    Move,
    Up,
}

/// Pointer event in screen space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub x: f32,
    pub y: f32,
}

impl PointerEvent {
    pub fn down(x: f32, y: f32) -> Self {
        Self { kind: PointerKind::Down, x, y }
    }

    pub fn moved(x: f32, y: f32) -> Self {
        Self { kind: PointerKind::Move, x, y }
    }

    pub fn up(x: f32, y: f32) -> Self {
        Self { kind: PointerKind::Up, x, y }
    }
}

/// Asynchronous outcomes reported by [`Project::poll`].
#[derive(Debug)]
pub enum ProjectEvent {
    ImageReady { name: String, width: u32, height: u32 },
    ImageFailed { name: String, error: EditorError },
    MaskRestored { handle: String },
    MaskLoadFailed { handle: String, error: EditorError },
    MaskSaved { handle: String },
    /// The mask became empty and the handle was reset to `""`.
    MaskCleared,
    UploadFailed { error: StoreError },
}

impl ProjectEvent {
    /// Severity the event is logged at.
    pub fn level(&self) -> Level {
        match self {
            ProjectEvent::ImageFailed { .. } | ProjectEvent::UploadFailed { .. } => Level::Error,
            ProjectEvent::MaskLoadFailed { .. } => Level::Warn,
            _ => Level::Info,
        }
    }
}

impl std::fmt::Display for ProjectEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectEvent::ImageReady { name, width, height } => {
                write!(f, "image '{}' ready ({}x{})", name, width, height)
            }
            ProjectEvent::ImageFailed { name, error } => {
                write!(f, "image '{}' failed to load: {}", name, error)
            }
            ProjectEvent::MaskRestored { handle } => write!(f, "mask '{}' restored", handle),
            ProjectEvent::MaskLoadFailed { handle, error } => {
                write!(f, "mask '{}' could not be restored: {}", handle, error)
            }
            ProjectEvent::MaskSaved { handle } => write!(f, "mask saved as '{}'", handle),
            ProjectEvent::MaskCleared => write!(f, "mask emptied, handle reset"),
            ProjectEvent::UploadFailed { error } => write!(f, "mask upload failed: {}", error),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum ImageState {
    /// Nothing requested yet, or the last request was rejected.
    Empty,
    Loading {
        load_mask: Option<String>,
        reset_mask: bool,
    },
    /// Surface sized; the preserved mask is being fetched.
    RestoringMask,
    Ready,
    Failed,
}

// ============================================================================
// PROJECT: one image and its mask
// ============================================================================

/// One source image with its mask, history, tools and persistence.
///
/// All methods run on the host's thread.  Store I/O runs on `rayon::spawn`
/// jobs whose results are applied by [`poll`](Self::poll).
pub struct Project {
    pub id: Uuid,
    store: Arc<dyn BlobStore>,
    surface: MaskSurface,
    history: HistoryManager,
    pub tools: ToolState,
    uploader: UploadCoordinator,

    /// Persisted reference to the uploaded mask; `""` when none.
    mask_handle: String,
    image_name: String,
    image: Option<RgbaImage>,
    image_state: ImageState,
    /// Bumped on every image load; results from older loads are dropped.
    generation: u64,

    io_sender: mpsc::Sender<IoResult>,
    io_receiver: mpsc::Receiver<IoResult>,
    pending_jobs: usize,
    events: Vec<ProjectEvent>,

    display_rect: DisplayRect,
    needs_redraw: bool,
}

impl Project {
    pub fn new(store: Arc<dyn BlobStore>, settings: &EditorSettings) -> Self {
        let (io_sender, io_receiver) = mpsc::channel();
        Self {
            id: Uuid::new_v4(),
            store,
            surface: MaskSurface::default(),
            history: HistoryManager::default(),
            tools: ToolState::from_settings(settings),
            uploader: UploadCoordinator::new(io_sender.clone()),
            mask_handle: String::new(),
            image_name: String::new(),
            image: None,
            image_state: ImageState::Empty,
            generation: 0,
            io_sender,
            io_receiver,
            pending_jobs: 0,
            events: Vec::new(),
            display_rect: DisplayRect::default(),
            needs_redraw: false,
        }
    }

    /// Rebuild a project from persisted state: the mask handle is kept and
    /// reloaded once the image arrives.
    pub fn restore(
        store: Arc<dyn BlobStore>,
        settings: &EditorSettings,
        session: &SessionState,
    ) -> Result<Self, EditorError> {
        let mut project = Self::new(store, settings);
        project.mask_handle = session.mask_data.clone();
        if !session.image.is_empty() {
            project.load_image(&session.image, false)?;
        }
        Ok(project)
    }

    // ---- accessors ----------------------------------------------------------

    pub fn surface(&self) -> &MaskSurface {
        &self.surface
    }

    /// No mask pixel is meaningfully painted.
    pub fn is_empty_mask(&self) -> bool {
        self.surface.is_empty()
    }

    pub fn mask_handle(&self) -> &str {
        &self.mask_handle
    }

    /// Seed the handle from host state before the first load.
    pub fn set_mask_handle(&mut self, handle: impl Into<String>) {
        self.mask_handle = handle.into();
    }

    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    /// Tag for log lines written on behalf of this project.
    pub fn log_scope(&self) -> LogScope {
        LogScope {
            project: self.id,
            generation: self.generation,
        }
    }

    pub fn source_image(&self) -> Option<&RgbaImage> {
        self.image.as_ref()
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn upload_state(&self) -> UploadState {
        self.uploader.state()
    }

    pub fn uploads_started(&self) -> u64 {
        self.uploader.uploads_started()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The surface has the image's dimensions and accepts paint.
    pub fn is_ready(&self) -> bool {
        self.image_state == ImageState::Ready && self.surface.has_area()
    }

    /// No load or upload in flight.
    pub fn is_idle(&self) -> bool {
        self.pending_jobs == 0
    }

    pub fn session_state(&self) -> SessionState {
        SessionState {
            image: self.image_name.clone(),
            mask_data: self.mask_handle.clone(),
        }
    }

    pub fn display_rect(&self) -> DisplayRect {
        self.display_rect
    }

    pub fn set_display_rect(&mut self, rect: DisplayRect) {
        if rect != self.display_rect {
            self.display_rect = rect;
            self.needs_redraw = true;
        }
    }

    /// Lay the image out inside `area` and use that as the display rect.
    pub fn fit_display(&mut self, area: DisplayRect) {
        let (w, h) = self.surface.dimensions();
        if let Some(rect) = DisplayRect::fit(area, w, h) {
            self.set_display_rect(rect);
        }
    }

    /// Returns and resets the "visible state changed" flag.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.needs_redraw)
    }

    /// Source image with the mask tinted on top at the current opacity.
    pub fn preview(&self) -> Option<RgbaImage> {
        let image = self.image.as_ref()?;
        Some(compose_preview(image, &self.surface, self.tools.opacity()))
    }

    // ---- image / mask lifecycle --------------------------------------------

    /// Swap in a new source image.
    ///
    /// `reset_mask == true` is an explicit swap: the handle is cleared now and
    /// no mask is loaded.  `false` restores saved state: the current handle is
    /// fetched and loaded once the image has arrived and the surface is sized.
    pub fn load_image(&mut self, name: &str, reset_mask: bool) -> Result<(), EditorError> {
        self.generation += 1;
        self.history.clear();
        self.tools.reset_transient();
        // A catch-up queued for the old image must not run against the new one.
        self.uploader.drop_pending_repeat();
        self.image_name = name.to_string();
        self.needs_redraw = true;

        if !is_supported_image(name) {
            log_err!(@self.log_scope(), "Unsupported image format, masking disabled: {}", name);
            self.surface.resize(0, 0);
            self.image = None;
            self.image_state = ImageState::Empty;
            return Err(EditorError::UnsupportedFormat(name.to_string()));
        }

        log_info!(@self.log_scope(), "Loading image '{}' (reset_mask: {})", name, reset_mask);

        let load_mask = if reset_mask {
            self.mask_handle.clear();
            None
        } else if self.mask_handle.is_empty() {
            None
        } else {
            Some(self.mask_handle.clone())
        };
        self.image_state = ImageState::Loading { load_mask, reset_mask };

        let store = Arc::clone(&self.store);
        let sender = self.io_sender.clone();
        let generation = self.generation;
        let name = name.to_string();
        self.pending_jobs += 1;
        rayon::spawn(move || {
            let result = store
                .fetch(&name)
                .map_err(EditorError::from)
                .and_then(|bytes| decode_image(&bytes));
            let _ = sender.send(IoResult::ImageLoaded { generation, name, result });
        });
        Ok(())
    }

    fn on_image_loaded(&mut self, name: String, result: Result<RgbaImage, EditorError>) {
        let ImageState::Loading { load_mask, reset_mask } = self.image_state.clone() else {
            return;
        };
        self.needs_redraw = true;

        let image = match result {
            Ok(image) => image,
            Err(error) => {
                self.image_state = ImageState::Failed;
                self.surface.resize(0, 0);
                self.image = None;
                self.emit(ProjectEvent::ImageFailed { name, error });
                return;
            }
        };

        let (width, height) = image.dimensions();
        if self.surface.dimensions() != (width, height) {
            self.surface.resize(width, height);
        } else if reset_mask {
            self.surface.clear();
        }
        self.image = Some(image);
        self.emit(ProjectEvent::ImageReady { name, width, height });

        match load_mask {
            Some(handle) => {
                self.image_state = ImageState::RestoringMask;
                self.spawn_mask_fetch(handle);
            }
            None => self.image_state = ImageState::Ready,
        }
    }

    fn spawn_mask_fetch(&mut self, handle: String) {
        let store = Arc::clone(&self.store);
        let sender = self.io_sender.clone();
        let generation = self.generation;
        self.pending_jobs += 1;
        rayon::spawn(move || {
            let result = store
                .fetch(&handle)
                .map_err(EditorError::from)
                .and_then(|bytes| decode_png(&bytes));
            let _ = sender.send(IoResult::MaskLoaded { generation, handle, result });
        });
    }

    fn on_mask_loaded(&mut self, handle: String, result: Result<RgbaImage, EditorError>) {
        if self.image_state != ImageState::RestoringMask {
            return;
        }
        self.image_state = ImageState::Ready;
        self.needs_redraw = true;
        match result {
            Ok(mask) => {
                if mask.dimensions() != self.surface.dimensions() {
                    log_warn!(
                        @self.log_scope(),
                        "Mask '{}' is {}x{}, image is {}x{}; drawing at origin",
                        handle,
                        mask.width(),
                        mask.height(),
                        self.surface.width(),
                        self.surface.height()
                    );
                }
                self.surface.load_image(&mask);
                self.emit(ProjectEvent::MaskRestored { handle });
            }
            Err(error) => self.emit(ProjectEvent::MaskLoadFailed { handle, error }),
        }
    }

    // ---- editing ------------------------------------------------------------

    fn map_pointer(&self, x: f32, y: f32) -> Option<Point> {
        let rect = self.display_rect;
        if !rect.is_valid() || !rect.contains(x, y) {
            return None;
        }
        let (w, h) = self.surface.dimensions();
        Some(rect.to_mask(x, y, w, h))
    }

    /// Feed one host pointer event.  Returns `true` when the event was consumed.
    pub fn pointer(&mut self, event: PointerEvent) -> bool {
        match event.kind {
            PointerKind::Down => {
                if !self.is_ready() {
                    return false;
                }
                let Some(pos) = self.map_pointer(event.x, event.y) else {
                    return false;
                };
                match self.tools.tool {
                    Tool::Fill => {
                        // `contains` is inclusive, so the far edge maps to `w`/`h`.
                        self.fill_at(self.clamp_to_surface(pos));
                    }
                    Tool::Brush | Tool::Eraser => self.begin_stroke(pos),
                }
                true
            }
            PointerKind::Move => {
                if !self.tools.is_drawing() {
                    return false;
                }
                // Samples outside the image are dropped; the next inside sample bridges the gap.
                if let Some(pos) = self.map_pointer(event.x, event.y) {
                    self.continue_stroke(pos);
                }
                true
            }
            PointerKind::Up => {
                if !self.tools.end_stroke() {
                    return false;
                }
                self.needs_redraw = true;
                self.settle();
                true
            }
        }
    }

    fn clamp_to_surface(&self, pos: Point) -> Point {
        let (w, h) = self.surface.dimensions();
        Point::new(
            pos.x.clamp(0.0, w.saturating_sub(1) as f32),
            pos.y.clamp(0.0, h.saturating_sub(1) as f32),
        )
    }

    fn snapshot(&mut self) {
        if let Err(e) = self.history.snapshot(&self.surface) {
            log_err!(@self.log_scope(), "History snapshot failed: {}", e);
        }
    }

    fn begin_stroke(&mut self, pos: Point) {
        self.snapshot();
        self.tools.begin_stroke(pos);
        self.surface
            .stroke_segment(None, pos, self.tools.radius(), self.tools.is_erasing());
        self.needs_redraw = true;
    }

    fn continue_stroke(&mut self, pos: Point) {
        let last = self.tools.advance_stroke(pos);
        self.surface
            .stroke_segment(last, pos, self.tools.radius(), self.tools.is_erasing());
        self.needs_redraw = true;
    }

    /// Paint (or erase, with the eraser selected) a whole stroke given in mask
    /// pixel space, then settle.  Headless counterpart of a pointer drag.
    pub fn stroke(&mut self, points: &[Point]) -> bool {
        if !self.is_ready() || points.is_empty() || self.tools.tool == Tool::Fill {
            return false;
        }
        self.begin_stroke(points[0]);
        for &p in &points[1..] {
            self.continue_stroke(p);
        }
        self.tools.end_stroke();
        self.settle();
        true
    }

    /// Flood fill from a mask-space position.  Seeds outside the surface or
    /// on a boundary pixel do nothing and leave no history entry.
    pub fn fill_at(&mut self, pos: Point) -> bool {
        if !self.is_ready() {
            return false;
        }
        let (w, h) = self.surface.dimensions();
        let inside = pos.x >= 0.0 && pos.y >= 0.0 && pos.x < w as f32 && pos.y < h as f32;
        if !inside {
            return false;
        }
        let (x, y) = (pos.x as u32, pos.y as u32);
        if fill::seed_is_boundary(&self.surface, x, y) {
            return false;
        }
        self.snapshot();
        fill::flood_fill(&mut self.surface, x, y);
        self.needs_redraw = true;
        self.settle();
        true
    }

    /// Erase the whole mask.
    pub fn clear(&mut self) {
        if !self.is_ready() {
            return;
        }
        self.tools.end_stroke();
        self.snapshot();
        self.surface.clear();
        self.needs_redraw = true;
        self.settle();
    }

    /// Revert the last mutation.  Returns `false` when there was nothing to undo.
    pub fn undo(&mut self) -> bool {
        if !self.is_ready() || !self.history.can_undo() {
            return false;
        }
        self.tools.end_stroke();
        match self.history.undo(&mut self.surface) {
            Ok(true) => {
                self.needs_redraw = true;
                self.settle();
                true
            }
            Ok(false) => false,
            Err(e) => {
                log_err!(@self.log_scope(), "Undo failed: {}", e);
                false
            }
        }
    }

    // ---- persistence --------------------------------------------------------

    /// The mask state is final; hand it to the upload coordinator.
    /// Only a ready surface belongs to the current image and may be persisted.
    fn settle(&mut self) {
        if self.image_state != ImageState::Ready {
            return;
        }
        let scope = self.log_scope();
        match self.uploader.settle(&self.surface, &self.store, scope) {
            SettleOutcome::Started => self.pending_jobs += 1,
            SettleOutcome::Emptied => {
                if !self.mask_handle.is_empty() {
                    self.mask_handle.clear();
                    self.emit(ProjectEvent::MaskCleared);
                }
            }
            SettleOutcome::Queued | SettleOutcome::Skipped => {}
        }
    }

    fn on_mask_uploaded(&mut self, generation: u64, result: Result<String, StoreError>) {
        let done = self.uploader.finish(generation, result);
        if done.generation == self.generation {
            match done.result {
                Ok(handle) => {
                    self.mask_handle = handle.clone();
                    self.emit(ProjectEvent::MaskSaved { handle });
                }
                Err(error) => self.emit(ProjectEvent::UploadFailed { error }),
            }
        } else {
            // The image has since been replaced: neither the handle nor the
            // failure concern the current one.
            log_info!(@self.log_scope(), "Dropping stale upload from generation {}", done.generation);
        }
        // Repeats queued before an image swap were dropped by `load_image`,
        // so one still pending was requested against the current image.
        if done.repeat {
            self.settle();
        }
    }

    fn emit(&mut self, event: ProjectEvent) {
        logger::write(event.level(), Some(self.log_scope()), &event.to_string());
        self.events.push(event);
    }

    // ---- event loop ---------------------------------------------------------

    fn handle_io(&mut self, result: IoResult) {
        self.pending_jobs = self.pending_jobs.saturating_sub(1);
        match result {
            IoResult::ImageLoaded { generation, name, result } => {
                if generation == self.generation {
                    self.on_image_loaded(name, result);
                }
            }
            IoResult::MaskLoaded { generation, handle, result } => {
                if generation == self.generation {
                    self.on_mask_loaded(handle, result);
                }
            }
            IoResult::MaskUploaded { generation, result } => {
                self.on_mask_uploaded(generation, result);
            }
        }
    }

    /// Apply every finished background job without blocking.
    pub fn poll(&mut self) -> Vec<ProjectEvent> {
        while let Ok(result) = self.io_receiver.try_recv() {
            self.handle_io(result);
        }
        std::mem::take(&mut self.events)
    }

    /// Block until no load or upload is in flight, or `timeout` elapses.
    /// Check [`is_idle`](Self::is_idle) afterwards to tell the two apart.
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<ProjectEvent> {
        let deadline = Instant::now() + timeout;
        while self.pending_jobs > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.io_receiver.recv_timeout(remaining) {
                Ok(result) => self.handle_io(result),
                Err(_) => break,
            }
        }
        std::mem::take(&mut self.events)
    }
}
