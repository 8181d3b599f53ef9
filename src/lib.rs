// ============================================================================
// MASKPAINT: interactive raster mask painting over a source image
// ============================================================================
//
// Layout:
//   logger.rs     session log file + log_info!/log_warn!/log_err! macros
//   canvas.rs     DisplayRect (screen -> mask mapping) and MaskSurface
//   ops/fill.rs   boundary-aware flood fill with 1px dilation
//   ops/preview   red overlay composite for display
//   ops/export    aligned image + mask export (mask fallback, resize modes)
//   components/   undo history, tool state
//   upload.rs     single-flight mask upload coordinator
//   project.rs    image/mask lifecycle controller tying it all together
//   io.rs         errors, blob stores, PNG codecs, background job results
//   session.rs    persisted {image, mask_data} pair
//   settings.rs   user defaults (.cfg file)
// ============================================================================

#[macro_use]
pub mod logger;
pub mod canvas;
pub mod components;
pub mod io;
pub mod ops;
pub mod project;
pub mod session;
pub mod settings;
pub mod upload;

pub use canvas::{DisplayRect, MaskSurface, Point};
pub use components::tools::Tool;
pub use io::{BlobStore, DirStore, EditorError, MemoryStore, StoreError};
pub use project::{PointerEvent, PointerKind, Project, ProjectEvent};
pub use session::SessionState;
pub use settings::EditorSettings;
