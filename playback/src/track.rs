use geom::{Angle, GPSBounds, Line, LonLat};

use records::{Batch, PositionRecord};

use crate::{MapSurface, SegmentID, SegmentStyle};

/// One device's path through a playback session.
pub struct Track {
    // Oldest first, cut off at the first gap
    points: Vec<PositionRecord>,
    progress: u32,
    // The current segment runs from points[end_idx - 1] to points[end_idx]
    end_idx: usize,
    segment: Option<SegmentID>,
    completed: bool,
}

/// Where a tracker is drawn right now.
#[derive(Clone, Copy)]
pub struct Tracker {
    pub pos: LonLat,
    /// In map space. None when the segment has no length.
    pub heading: Option<Angle>,
}

pub(crate) enum Advance {
    Moved,
    NewSegment(SegmentID),
    Finished,
}

impl Track {
    /// Reverses a latest-first batch and draws its first segment. Tracks with fewer than two
    /// usable points start out completed.
    pub(crate) fn start<M: MapSurface>(batch: Batch, surface: &mut M, style: &SegmentStyle) -> Self {
        let points: Vec<PositionRecord> = batch.into_iter().rev().map_while(|rec| rec).collect();
        let segment = if points.len() >= 2 {
            Some(surface.create_segment(&points[0], &points[1], style))
        } else {
            None
        };
        Self {
            completed: segment.is_none(),
            points,
            progress: 0,
            end_idx: 1,
            segment,
        }
    }

    pub(crate) fn advance<M: MapSurface>(
        &mut self,
        step: u32,
        surface: &mut M,
        style: &SegmentStyle,
    ) -> Advance {
        let mut segment = match self.segment {
            Some(segment) => segment,
            None => {
                self.completed = true;
                return Advance::Finished;
            }
        };

        let next = self.progress + step;
        let result = if next > 100 {
            if self.end_idx + 1 < self.points.len() {
                // TODO Wrapping by 101 skips one percent into the next segment; confirm whether
                // % 100 was meant before changing it.
                self.progress = next % 101;
                surface.mark_fully_traversed(segment);
                self.end_idx += 1;
                segment = surface.create_segment(
                    &self.points[self.end_idx - 1],
                    &self.points[self.end_idx],
                    style,
                );
                self.segment = Some(segment);
                Advance::NewSegment(segment)
            } else {
                self.progress = 100;
                self.completed = true;
                Advance::Finished
            }
        } else {
            self.progress = next;
            Advance::Moved
        };

        surface.set_progress_offset(segment, self.progress);
        result
    }

    pub fn points(&self) -> &[PositionRecord] {
        &self.points
    }

    /// Percent of the way along the current segment
    pub fn progress(&self) -> u32 {
        self.progress
    }

    /// The index in `points` where the current segment ends
    pub fn segment_end(&self) -> usize {
        self.end_idx
    }

    pub fn segment(&self) -> Option<SegmentID> {
        self.segment
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// The two points of the current segment
    pub fn current_pair(&self) -> Option<(&PositionRecord, &PositionRecord)> {
        self.segment?;
        Some((&self.points[self.end_idx - 1], &self.points[self.end_idx]))
    }
}

impl Tracker {
    /// The tracker `percent` of the way from one point to the next
    pub fn between(from: &PositionRecord, to: &PositionRecord, percent: u32) -> Tracker {
        let stationary = Tracker {
            pos: from.pos(),
            heading: None,
        };
        if from.longitude == to.longitude && from.latitude == to.latitude {
            return stationary;
        }

        // Project into a plane around this segment. Padded, so a segment running due north or east
        // doesn't collapse the bounds.
        let pad = 0.001;
        let mut bounds = GPSBounds::new();
        bounds.update(LonLat::new(
            from.longitude.min(to.longitude) - pad,
            from.latitude.min(to.latitude) - pad,
        ));
        bounds.update(LonLat::new(
            from.longitude.max(to.longitude) + pad,
            from.latitude.max(to.latitude) + pad,
        ));
        match Line::new(from.pos().to_pt(&bounds), to.pos().to_pt(&bounds)) {
            Ok(line) => {
                let dist = line.length() * (percent as f64 / 100.0);
                let pt = line.pt1().project_away(dist, line.angle());
                Tracker {
                    pos: pt.to_gps(&bounds),
                    heading: Some(line.angle()),
                }
            }
            Err(_) => stationary,
        }
    }
}
