//! Measurements along a polyline of coordinates.

use crate::geo::Coordinate;

/// The point on a polyline nearest to some query coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestCoordinate {
    /// Nearest point on the line.
    pub coordinate: Coordinate,
    /// Index of the segment start vertex the point lies on.
    pub index: usize,
    /// Distance in meters between the query and `coordinate`.
    pub distance: f64,
    /// Distance in meters from the first vertex to `coordinate`.
    pub distance_along: f64,
}

/// A borrowed view of an ordered coordinate list.
#[derive(Debug, Clone, Copy)]
pub struct Polyline<'a> {
    coordinates: &'a [Coordinate],
}

impl<'a> Polyline<'a> {
    pub fn new(coordinates: &'a [Coordinate]) -> Self {
        Self { coordinates }
    }

    pub fn coordinates(&self) -> &'a [Coordinate] {
        self.coordinates
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Total length in meters.
    pub fn length(&self) -> f64 {
        self.coordinates
            .windows(2)
            .fold(0.0, |acc, w| acc + w[0].distance_to(&w[1]))
    }

    /// Find the point on the line closest to `target`.
    ///
    /// Returns `None` for an empty line. A single-vertex line yields that
    /// vertex.
    pub fn closest_coordinate(&self, target: &Coordinate) -> Option<ClosestCoordinate> {
        let first = self.coordinates.first()?;
        if self.coordinates.len() == 1 {
            return Some(ClosestCoordinate {
                coordinate: *first,
                index: 0,
                distance: target.distance_to(first),
                distance_along: 0.0,
            });
        }

        let mut best: Option<ClosestCoordinate> = None;
        let mut traveled = 0.0;
        for (index, segment) in self.coordinates.windows(2).enumerate() {
            let (start, end) = (&segment[0], &segment[1]);
            let segment_length = start.distance_to(end);
            let t = project_onto_segment(target, start, end);

            let (coordinate, along) = if t <= 0.0 {
                (*start, traveled)
            } else if t >= 1.0 {
                (*end, traveled + segment_length)
            } else {
                let point = Coordinate::new(
                    start.latitude + (end.latitude - start.latitude) * t,
                    start.longitude + (end.longitude - start.longitude) * t,
                );
                (point, traveled + start.distance_to(&point))
            };

            let distance = target.distance_to(&coordinate);
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(ClosestCoordinate {
                    coordinate,
                    index,
                    distance,
                    distance_along: along,
                });
            }
            traveled += segment_length;
        }
        best
    }

    /// Distance from the closest point to `coordinate` to the end of the line.
    pub fn distance_from(&self, coordinate: &Coordinate) -> f64 {
        match self.closest_coordinate(coordinate) {
            Some(closest) => (self.length() - closest.distance_along).max(0.0),
            None => 0.0,
        }
    }

    /// Distance along the line between the closest points to `start` and `end`.
    pub fn distance_between(&self, start: &Coordinate, end: &Coordinate) -> f64 {
        match (
            self.closest_coordinate(start),
            self.closest_coordinate(end),
        ) {
            (Some(a), Some(b)) => (b.distance_along - a.distance_along).abs(),
            _ => 0.0,
        }
    }

    /// The portion of the line between the closest points to `start` and
    /// `end`. Missing bounds default to the line's own ends.
    pub fn sliced(&self, start: Option<&Coordinate>, end: Option<&Coordinate>) -> Vec<Coordinate> {
        let (Some(first), Some(last)) = (self.coordinates.first(), self.coordinates.last()) else {
            return Vec::new();
        };
        let last_index = self.coordinates.len() - 1;

        let start = start
            .and_then(|c| self.closest_coordinate(c))
            .map(|c| (c.coordinate, c.index, c.distance_along))
            .unwrap_or((*first, 0, 0.0));
        let end = end
            .and_then(|c| self.closest_coordinate(c))
            .map(|c| (c.coordinate, c.index, c.distance_along))
            .unwrap_or((*last, last_index, f64::MAX));

        let (from, to) = if (start.1, start.2) <= (end.1, end.2) {
            (start, end)
        } else {
            (end, start)
        };

        let mut out = vec![from.0];
        if from.1 < to.1 {
            out.extend_from_slice(&self.coordinates[from.1 + 1..=to.1]);
        }
        if out.last() != Some(&to.0) {
            out.push(to.0);
        }
        out
    }

    /// The coordinate `distance` meters from the first vertex.
    ///
    /// Negative distances clamp to the first vertex and distances past the end
    /// clamp to the last one.
    pub fn coordinate_from_start(&self, distance: f64) -> Option<Coordinate> {
        let first = self.coordinates.first()?;
        if distance <= 0.0 {
            return Some(*first);
        }

        let mut traveled = 0.0;
        for segment in self.coordinates.windows(2) {
            let segment_length = segment[0].distance_to(&segment[1]);
            if distance <= traveled + segment_length {
                let overshoot = distance - traveled;
                if overshoot >= segment_length {
                    return Some(segment[1]);
                }
                let bearing = segment[0].direction_to(&segment[1]);
                return Some(segment[0].coordinate_at(overshoot, bearing));
            }
            traveled += segment_length;
        }
        self.coordinates.last().copied()
    }

    /// Walk `distance` meters from the closest point to `from`, forwards for
    /// positive distances and backwards for negative ones.
    pub fn trimmed(&self, from: &Coordinate, distance: f64) -> Vec<Coordinate> {
        let Some(start) = self.closest_coordinate(from) else {
            return Vec::new();
        };
        if distance == 0.0 {
            return Vec::new();
        }

        let limit = distance.abs();
        let mut vertices = vec![start.coordinate];
        let mut walked = 0.0;

        let path: Box<dyn Iterator<Item = &Coordinate>> = if distance > 0.0 {
            Box::new(self.coordinates[start.index + 1..].iter())
        } else {
            Box::new(self.coordinates[..=start.index].iter().rev())
        };

        for vertex in path {
            let Some(last) = vertices.last().copied() else {
                break;
            };
            let step = last.distance_to(vertex);
            if walked + step <= limit {
                vertices.push(*vertex);
                walked += step;
            } else {
                let remaining = limit - walked;
                vertices.push(last.coordinate_at(remaining, last.direction_to(vertex)));
                break;
            }
        }
        vertices
    }
}

/// Parameter of the orthogonal projection of `target` onto the segment, in a
/// local equirectangular frame centred on the target's latitude.
fn project_onto_segment(target: &Coordinate, start: &Coordinate, end: &Coordinate) -> f64 {
    let scale = target.latitude.to_radians().cos();
    let (ax, ay) = (start.longitude * scale, start.latitude);
    let (bx, by) = (end.longitude * scale, end.latitude);
    let (px, py) = (target.longitude * scale, target.latitude);

    let (dx, dy) = (bx - ax, by - ay);
    let length_squared = dx * dx + dy * dy;
    if length_squared == 0.0 {
        return 0.0;
    }
    ((px - ax) * dx + (py - ay) * dy) / length_squared
}
