use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use geojson::{Feature, FeatureCollection, GeoJson};

use playback::{MapSurface, SegmentID, SegmentStyle, Tracker};
use records::{DeviceID, PositionRecord};

/// Everything the dashboard has drawn: the latest position of each device, and the trail of
/// any playback.
pub struct TrailMap {
    devices: BTreeMap<DeviceID, Marker>,
    segments: BTreeMap<SegmentID, DrawnSegment>,
    next_segment: usize,
}

pub struct Marker {
    pub latest: Option<PositionRecord>,
    pub visible: bool,
    pub connected: bool,
}

pub struct DrawnSegment {
    pub from: PositionRecord,
    pub to: PositionRecord,
    pub style: SegmentStyle,
    pub progress: u32,
    /// Once traversed, the tracker is gone and only the arrow remains
    pub traversed: bool,
}

impl TrailMap {
    pub fn new() -> Self {
        Self {
            devices: BTreeMap::new(),
            segments: BTreeMap::new(),
            next_segment: 0,
        }
    }

    /// Remembers the position if it's newer than the last one. New devices start visible.
    pub fn update_position(&mut self, rec: PositionRecord) {
        let marker = self.marker(&rec.device);
        marker.connected = true;
        if marker
            .latest
            .as_ref()
            .map(|prev| prev.time <= rec.time)
            .unwrap_or(true)
        {
            marker.latest = Some(rec);
        }
    }

    pub fn set_connected(&mut self, device: &DeviceID, connected: bool) {
        self.marker(device).connected = connected;
    }

    pub fn set_visible(&mut self, device: &DeviceID, visible: bool) {
        self.marker(device).visible = visible;
    }

    pub fn visible_devices(&self) -> BTreeSet<DeviceID> {
        self.devices
            .iter()
            .filter(|(_, marker)| marker.visible)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn devices(&self) -> &BTreeMap<DeviceID, Marker> {
        &self.devices
    }

    /// Segments still on the map, oldest first
    pub fn segments(&self) -> impl Iterator<Item = &DrawnSegment> {
        self.segments.values()
    }

    fn marker(&mut self, device: &DeviceID) -> &mut Marker {
        self.devices.entry(device.clone()).or_insert_with(|| Marker {
            latest: None,
            visible: true,
            connected: false,
        })
    }

    pub fn to_geojson(&self) -> GeoJson {
        let mut features = Vec::new();

        for (device, marker) in &self.devices {
            let rec = match marker.latest {
                Some(ref rec) if marker.visible => rec,
                _ => continue,
            };
            let mut feature = point_feature(rec.longitude, rec.latitude);
            feature.set_property("type", "device");
            feature.set_property("device", device.as_str());
            feature.set_property("time", rec.time.to_rfc3339());
            feature.set_property("connected", marker.connected);
            features.push(feature);
        }

        for segment in self.segments() {
            let mut feature = Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::LineString(vec![
                    vec![segment.from.longitude, segment.from.latitude],
                    vec![segment.to.longitude, segment.to.latitude],
                ]))),
                id: None,
                properties: None,
                foreign_members: None,
            };
            feature.set_property("type", "segment");
            feature.set_property("device", segment.from.device.as_str());
            feature.set_property("stroke", segment.style.line_color.clone());
            feature.set_property("traversed", segment.traversed);
            features.push(feature);

            if !segment.traversed {
                let tracker = Tracker::between(&segment.from, &segment.to, segment.progress);
                let mut feature = point_feature(tracker.pos.x(), tracker.pos.y());
                feature.set_property("type", "tracker");
                feature.set_property("device", segment.from.device.as_str());
                feature.set_property("marker-color", segment.style.tracker_color.clone());
                feature.set_property("progress", segment.progress);
                if let Some(heading) = tracker.heading {
                    feature.set_property("heading", heading.normalized_degrees());
                }
                features.push(feature);
            }
        }

        GeoJson::FeatureCollection(FeatureCollection {
            features,
            bbox: None,
            foreign_members: None,
        })
    }

    pub fn export_geojson(&self, path: &str) -> Result<()> {
        fs_err::write(path, serde_json::to_string_pretty(&self.to_geojson())?)?;
        info!("Wrote {}", path);
        Ok(())
    }
}

impl Default for TrailMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MapSurface for TrailMap {
    fn create_segment(
        &mut self,
        from: &PositionRecord,
        to: &PositionRecord,
        style: &SegmentStyle,
    ) -> SegmentID {
        let id = SegmentID(self.next_segment);
        self.next_segment += 1;
        self.segments.insert(
            id,
            DrawnSegment {
                from: from.clone(),
                to: to.clone(),
                style: style.clone(),
                progress: 0,
                traversed: false,
            },
        );
        id
    }

    fn set_progress_offset(&mut self, segment: SegmentID, percent: u32) {
        match self.segments.get_mut(&segment) {
            Some(drawn) => drawn.progress = percent,
            None => warn!("Moving the tracker of unknown {:?}", segment),
        }
    }

    fn mark_fully_traversed(&mut self, segment: SegmentID) {
        match self.segments.get_mut(&segment) {
            Some(drawn) => drawn.traversed = true,
            None => warn!("Marking unknown {:?} as traversed", segment),
        }
    }

    fn remove_segment(&mut self, segment: SegmentID) {
        if self.segments.remove(&segment).is_none() {
            warn!("Removing unknown {:?}", segment);
        }
    }
}

fn point_feature(longitude: f64, latitude: f64) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![
            longitude, latitude,
        ]))),
        id: None,
        properties: None,
        foreign_members: None,
    }
}
