//! Seams to the collaborators that share the terminal surface: the text
//! selection recognizer and the renderer's geometry.

/// Competing long-press-to-select recognizer.
pub trait SelectionArbiter: Send {
    /// True while a selection gesture owns the input stream.
    fn is_competing_gesture_active(&self) -> bool;

    /// Cancels the recognizer's pending long-press timer.
    fn cancel_competing_gesture(&mut self);
}

/// Surface geometry used to size pages and lines.
pub trait GeometryProvider: Send {
    fn visible_rows(&self) -> u16;

    fn line_height_px(&self) -> Option<f64>;
}

/// Arbiter for surfaces without a selection recognizer.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSelection;

impl SelectionArbiter for NoSelection {
    fn is_competing_gesture_active(&self) -> bool {
        false
    }

    fn cancel_competing_gesture(&mut self) {}
}

/// Static geometry; the host updates it and calls `update_geometry`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedGeometry {
    pub rows: u16,
    pub line_height_px: Option<f64>,
}

impl FixedGeometry {
    pub fn new(rows: u16, line_height_px: f64) -> Self {
        Self {
            rows,
            line_height_px: Some(line_height_px),
        }
    }
}

impl Default for FixedGeometry {
    fn default() -> Self {
        Self {
            rows: 24,
            line_height_px: None,
        }
    }
}

impl GeometryProvider for FixedGeometry {
    fn visible_rows(&self) -> u16 {
        self.rows
    }

    fn line_height_px(&self) -> Option<f64> {
        self.line_height_px
    }
}

impl<T: SelectionArbiter + ?Sized> SelectionArbiter for Box<T> {
    fn is_competing_gesture_active(&self) -> bool {
        (**self).is_competing_gesture_active()
    }

    fn cancel_competing_gesture(&mut self) {
        (**self).cancel_competing_gesture()
    }
}

impl<T: GeometryProvider + ?Sized> GeometryProvider for Box<T> {
    fn visible_rows(&self) -> u16 {
        (**self).visible_rows()
    }

    fn line_height_px(&self) -> Option<f64> {
        (**self).line_height_px()
    }
}

/// Lines per page: one screen minus the overlap row, never below ten.
pub fn page_step_for_rows(rows: u16) -> u32 {
    (u32::from(rows).saturating_sub(1)).max(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_step_keeps_one_row_of_overlap() {
        assert_eq!(page_step_for_rows(40), 39);
        assert_eq!(page_step_for_rows(24), 23);
    }

    #[test]
    fn page_step_has_a_floor() {
        assert_eq!(page_step_for_rows(0), 10);
        assert_eq!(page_step_for_rows(5), 10);
        assert_eq!(page_step_for_rows(11), 10);
    }
}
