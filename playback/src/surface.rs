use records::PositionRecord;

/// Names one line drawn by a `MapSurface`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentID(pub usize);

#[derive(Clone, Debug, PartialEq)]
pub struct SegmentStyle {
    pub line_color: String,
    pub tracker_color: String,
}

/// Where playback is drawn. Every segment is a straight line between two recorded positions,
/// ending in an arrow and carrying a tracker somewhere along it.
pub trait MapSurface {
    /// Draw a new segment with the tracker at its start.
    fn create_segment(
        &mut self,
        from: &PositionRecord,
        to: &PositionRecord,
        style: &SegmentStyle,
    ) -> SegmentID;
    /// Move the tracker to `percent` (0 to 100) of the way along the segment.
    fn set_progress_offset(&mut self, segment: SegmentID, percent: u32);
    /// Drop the tracker, leaving only the line and its arrow.
    fn mark_fully_traversed(&mut self, segment: SegmentID);
    fn remove_segment(&mut self, segment: SegmentID);
}
