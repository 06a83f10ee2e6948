//! Pointer-to-placement classification for drag and drop.
//!
//! A hovered row is split into three vertical zones: the top quarter drops
//! before the target, the bottom quarter drops after it, and everything in
//! between (boundaries included) drops the dragged tab inside the target.

use egui::{Pos2, Rect};
use tracing::debug;

use crate::traits::NodeId;

/// Fraction of the row height below which a drop lands before the target.
pub const BEFORE_ZONE: f32 = 0.25;
/// Fraction of the row height above which a drop lands after the target.
pub const AFTER_ZONE: f32 = 0.75;

/// Where a drop places the dragged tab relative to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    Before,
    After,
    /// Becomes the last child of the target.
    Child,
}

impl Placement {
    pub fn is_reorder(self) -> bool {
        matches!(self, Placement::Before | Placement::After)
    }
}

/// A classified drop target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragIntent {
    pub dragged: NodeId,
    pub target: NodeId,
    pub placement: Placement,
}

/// Maps a pointer height onto a placement zone of `row`.
///
/// Only the target's own row counts, never the height of its expanded
/// children. Returns `None` for rows without a usable height.
pub fn classify(pointer_y: f32, row: Rect) -> Option<Placement> {
    let height = row.height();
    if !height.is_finite() || height <= 0.0 || !pointer_y.is_finite() {
        return None;
    }

    let relative_y = pointer_y - row.top();
    if relative_y < BEFORE_ZONE * height {
        Some(Placement::Before)
    } else if relative_y > AFTER_ZONE * height {
        Some(Placement::After)
    } else {
        Some(Placement::Child)
    }
}

/// Keeps the single active drop mark of a drag gesture.
#[derive(Debug, Clone, Default)]
pub struct DragClassifier {
    mark: Option<DragIntent>,
}

impl DragClassifier {
    pub fn new() -> Self {
        Self { mark: None }
    }

    /// Reclassifies the drop target under the pointer.
    ///
    /// Hovering the dragged tab itself, or a row without height, clears the
    /// mark. Any other hover replaces it.
    pub fn hover(
        &mut self,
        dragged: NodeId,
        target: NodeId,
        pointer: Pos2,
        row: Rect,
    ) -> Option<DragIntent> {
        if dragged == target {
            self.mark = None;
            return None;
        }

        self.mark = classify(pointer.y, row).map(|placement| DragIntent {
            dragged,
            target,
            placement,
        });
        debug!(%dragged, %target, mark = ?self.mark.map(|m| m.placement), "hover classified");
        self.mark
    }

    pub fn current(&self) -> Option<DragIntent> {
        self.mark
    }

    /// Takes the committed intent, leaving no mark behind.
    pub fn take(&mut self) -> Option<DragIntent> {
        self.mark.take()
    }

    pub fn clear(&mut self) {
        self.mark = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{pos2, vec2};

    fn row(top: f32, height: f32) -> Rect {
        Rect::from_min_size(pos2(0.0, top), vec2(300.0, height))
    }

    #[test]
    fn zones_of_a_hundred_pixel_row() {
        let r = row(0.0, 100.0);
        assert_eq!(classify(10.0, r), Some(Placement::Before));
        assert_eq!(classify(50.0, r), Some(Placement::Child));
        assert_eq!(classify(90.0, r), Some(Placement::After));
    }

    #[test]
    fn boundaries_belong_to_child() {
        let r = row(200.0, 100.0);
        assert_eq!(classify(225.0, r), Some(Placement::Child));
        assert_eq!(classify(275.0, r), Some(Placement::Child));
        assert_eq!(classify(224.9, r), Some(Placement::Before));
        assert_eq!(classify(275.1, r), Some(Placement::After));
    }

    #[test]
    fn degenerate_rows_have_no_placement() {
        assert_eq!(classify(0.0, row(0.0, 0.0)), None);
        assert_eq!(classify(f32::NAN, row(0.0, 20.0)), None);
        assert_eq!(
            classify(5.0, Rect::from_min_max(pos2(0.0, 10.0), pos2(10.0, 0.0))),
            None
        );
    }

    #[test]
    fn self_hover_clears_the_mark() {
        let mut classifier = DragClassifier::new();
        let first = classifier.hover(NodeId(1), NodeId(2), pos2(5.0, 5.0), row(0.0, 100.0));
        assert_eq!(first.map(|i| i.placement), Some(Placement::Before));

        assert_eq!(
            classifier.hover(NodeId(1), NodeId(1), pos2(5.0, 50.0), row(0.0, 100.0)),
            None
        );
        assert_eq!(classifier.current(), None);
    }

    #[test]
    fn latest_hover_replaces_the_mark() {
        let mut classifier = DragClassifier::new();
        classifier.hover(NodeId(1), NodeId(2), pos2(5.0, 5.0), row(0.0, 100.0));
        classifier.hover(NodeId(1), NodeId(3), pos2(5.0, 190.0), row(100.0, 100.0));

        let intent = classifier.take().unwrap();
        assert_eq!(intent.target, NodeId(3));
        assert_eq!(intent.placement, Placement::After);
        assert_eq!(classifier.current(), None);
    }
}
