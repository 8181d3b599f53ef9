use crate::canvas::Point;
use crate::settings::EditorSettings;

pub const MIN_BRUSH_SIZE: u32 = 1;
pub const MAX_BRUSH_SIZE: u32 = 200;
pub const MIN_OPACITY: f32 = 0.1;
pub const MAX_OPACITY: f32 = 1.0;

/// The active mask tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Brush,
    Eraser,
    Fill,
}

impl Tool {
    /// Config / CLI name.
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Brush => "brush",
            Tool::Eraser => "eraser",
            Tool::Fill => "fill",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        match name.trim().to_ascii_lowercase().as_str() {
            "brush" => Some(Tool::Brush),
            "eraser" => Some(Tool::Eraser),
            "fill" => Some(Tool::Fill),
            _ => None,
        }
    }

    pub fn all() -> &'static [Tool] {
        &[Tool::Brush, Tool::Eraser, Tool::Fill]
    }
}

/// Tool selection, brush parameters and the in-progress stroke.
#[derive(Clone, Debug)]
pub struct ToolState {
    pub tool: Tool,
    brush_size: u32,
    opacity: f32,
    /// A brush/eraser stroke is in progress (pointer held down).
    drawing: bool,
    /// Last stroke sample in mask pixel space.
    last_pos: Option<Point>,
}

impl Default for ToolState {
    fn default() -> Self {
        Self::from_settings(&EditorSettings::default())
    }
}

impl ToolState {
    pub fn from_settings(settings: &EditorSettings) -> Self {
        let mut state = Self {
            tool: settings.default_tool,
            brush_size: MIN_BRUSH_SIZE,
            opacity: MAX_OPACITY,
            drawing: false,
            last_pos: None,
        };
        state.set_brush_size(settings.brush_size);
        state.set_opacity(settings.opacity);
        state
    }

    pub fn select(&mut self, tool: Tool) {
        self.tool = tool;
    }

    pub fn brush_size(&self) -> u32 {
        self.brush_size
    }

    /// Clamped to `[1, 200]`.
    pub fn set_brush_size(&mut self, size: u32) {
        self.brush_size = size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE);
    }

    /// Stroke radius in mask pixels; the brush size is the stroke width.
    pub fn radius(&self) -> f32 {
        self.brush_size as f32 / 2.0
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Clamped to `[0.1, 1.0]`.  Display only; the mask itself is always opaque.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = if opacity.is_finite() {
            opacity.clamp(MIN_OPACITY, MAX_OPACITY)
        } else {
            MAX_OPACITY
        };
    }

    pub fn is_erasing(&self) -> bool {
        self.tool == Tool::Eraser
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub(crate) fn begin_stroke(&mut self, at: Point) {
        self.drawing = true;
        self.last_pos = Some(at);
    }

    /// Record a new stroke sample and hand back the previous one.
    pub(crate) fn advance_stroke(&mut self, to: Point) -> Option<Point> {
        self.last_pos.replace(to)
    }

    /// Ends the stroke; returns whether one was in progress.
    pub(crate) fn end_stroke(&mut self) -> bool {
        let was_drawing = self.drawing;
        self.drawing = false;
        self.last_pos = None;
        was_drawing
    }

    /// New image: back to the brush, no stroke in progress.  Size and opacity stay.
    pub fn reset_transient(&mut self) {
        self.tool = Tool::Brush;
        self.end_stroke();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_and_opacity_are_clamped() {
        let mut tools = ToolState::default();
        tools.set_brush_size(0);
        assert_eq!(tools.brush_size(), 1);
        tools.set_brush_size(500);
        assert_eq!(tools.brush_size(), 200);
        assert_eq!(tools.radius(), 100.0);
        tools.set_opacity(0.0);
        assert_eq!(tools.opacity(), MIN_OPACITY);
        tools.set_opacity(f32::NAN);
        assert_eq!(tools.opacity(), MAX_OPACITY);
    }

    #[test]
    fn defaults_follow_settings() {
        let tools = ToolState::default();
        assert_eq!(tools.tool, Tool::Brush);
        assert_eq!(tools.brush_size(), 80);
        assert!((tools.opacity() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn reset_returns_to_brush_and_stops_drawing() {
        let mut tools = ToolState::default();
        tools.select(Tool::Eraser);
        tools.set_brush_size(12);
        tools.begin_stroke(Point::new(1.0, 1.0));
        assert_eq!(tools.advance_stroke(Point::new(2.0, 2.0)), Some(Point::new(1.0, 1.0)));
        tools.reset_transient();
        assert_eq!(tools.tool, Tool::Brush);
        assert!(!tools.is_drawing());
        assert_eq!(tools.brush_size(), 12);
    }

    #[test]
    fn names_round_trip() {
        for tool in Tool::all() {
            assert_eq!(Tool::from_name(tool.name()), Some(*tool));
        }
        assert_eq!(Tool::from_name(" Fill "), Some(Tool::Fill));
        assert_eq!(Tool::from_name("lasso"), None);
    }
}
