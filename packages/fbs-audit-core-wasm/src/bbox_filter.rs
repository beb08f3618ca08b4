// Envelope quick-rejection for spatial predicates and nearest-feature search
use geo::BoundingRect;
use geo_types::{Coord, Geometry, Rect};

// Envelope of a geometry; None for empty geometries
pub fn envelope(geometry: &Geometry<f64>) -> Option<Rect<f64>> {
    geometry.bounding_rect()
}

// Check if two envelopes overlap once both are grown by `tolerance`
pub fn envelopes_overlap(a: &Rect<f64>, b: &Rect<f64>, tolerance: f64) -> bool {
    a.min().x <= b.max().x + tolerance
        && a.max().x + tolerance >= b.min().x
        && a.min().y <= b.max().y + tolerance
        && a.max().y + tolerance >= b.min().y
}

// Lower bound for the distance from a point to anything inside the envelope
pub fn distance_to_envelope(point: Coord<f64>, rect: &Rect<f64>) -> f64 {
    let dx = (rect.min().x - point.x).max(0.0).max(point.x - rect.max().x);
    let dy = (rect.min().y - point.y).max(0.0).max(point.y - rect.max().y);
    dx.hypot(dy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{coord, LineString};

    fn unit_square() -> Rect<f64> {
        Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 })
    }

    #[test]
    fn envelope_of_line() {
        let line: Geometry<f64> = LineString::from(vec![(2.0, 3.0), (8.0, -1.0)]).into();
        let rect = envelope(&line).unwrap();
        assert_eq!(rect.min(), coord! { x: 2.0, y: -1.0 });
        assert_eq!(rect.max(), coord! { x: 8.0, y: 3.0 });
    }

    #[test]
    fn touching_envelopes_overlap() {
        let a = unit_square();
        let b = Rect::new(coord! { x: 10.0, y: 0.0 }, coord! { x: 20.0, y: 5.0 });
        let c = Rect::new(coord! { x: 11.0, y: 0.0 }, coord! { x: 20.0, y: 5.0 });
        assert!(envelopes_overlap(&a, &b, 0.0));
        assert!(!envelopes_overlap(&a, &c, 0.0));
        assert!(envelopes_overlap(&a, &c, 1.0));
    }

    #[test]
    fn distance_to_envelope_is_zero_inside() {
        let rect = unit_square();
        assert_eq!(distance_to_envelope(coord! { x: 5.0, y: 5.0 }, &rect), 0.0);
        assert!((distance_to_envelope(coord! { x: 13.0, y: 14.0 }, &rect) - 5.0).abs() < 1e-12);
    }
}
