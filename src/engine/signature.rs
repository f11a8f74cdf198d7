use std::fmt::Write;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone)]
pub struct SignaturePad {
    width: u32,
    height: u32,
    strokes: Vec<Vec<Point>>,
    drawing: bool,
}

impl SignaturePad {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            strokes: Vec::new(),
            drawing: false,
        }
    }

    pub fn begin_stroke(&mut self, x: f32, y: f32) {
        let point = self.clamp(x, y);
        self.strokes.push(vec![point]);
        self.drawing = true;
    }

    pub fn extend_stroke(&mut self, x: f32, y: f32) {
        if !self.drawing {
            return;
        }
        let point = self.clamp(x, y);
        if let Some(stroke) = self.strokes.last_mut() {
            stroke.push(point);
        }
    }

    pub fn end_stroke(&mut self) {
        self.drawing = false;
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
        self.drawing = false;
    }

    /// A tap without movement does not count as signing.
    pub fn is_empty(&self) -> bool {
        !self.strokes.iter().any(|stroke| stroke.len() > 1)
    }

    pub fn strokes(&self) -> &[Vec<Point>] {
        &self.strokes
    }

    pub fn to_svg(&self) -> Vec<u8> {
        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height
        );

        for stroke in self.strokes.iter().filter(|stroke| stroke.len() > 1) {
            let mut path = String::new();
            for (index, point) in stroke.iter().enumerate() {
                let command = if index == 0 { 'M' } else { 'L' };
                let _ = write!(path, "{command}{:.1} {:.1} ", point.x, point.y);
            }
            let _ = write!(
                svg,
                r##"<path d="{}" fill="none" stroke="#000" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"/>"##,
                path.trim_end()
            );
        }

        svg.push_str("</svg>");
        svg.into_bytes()
    }

    fn clamp(&self, x: f32, y: f32) -> Point {
        Point {
            x: x.clamp(0.0, self.width as f32),
            y: y.clamp(0.0, self.height as f32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tap_alone_is_not_a_signature() {
        let mut pad = SignaturePad::new(300, 200);
        pad.begin_stroke(10.0, 10.0);
        pad.end_stroke();
        assert!(pad.is_empty());

        pad.begin_stroke(10.0, 10.0);
        pad.extend_stroke(40.0, 25.0);
        pad.end_stroke();
        assert!(!pad.is_empty());
    }

    #[test]
    fn moves_outside_a_stroke_are_ignored() {
        let mut pad = SignaturePad::new(300, 200);
        pad.extend_stroke(10.0, 10.0);
        assert!(pad.strokes().is_empty());
    }

    #[test]
    fn exports_strokes_as_svg_paths() {
        let mut pad = SignaturePad::new(300, 200);
        pad.begin_stroke(10.0, 10.0);
        pad.extend_stroke(500.0, 50.0);
        pad.end_stroke();

        let svg = String::from_utf8(pad.to_svg()).unwrap();

        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(r#"d="M10.0 10.0 L300.0 50.0""#));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn clear_empties_the_pad() {
        let mut pad = SignaturePad::new(300, 200);
        pad.begin_stroke(1.0, 1.0);
        pad.extend_stroke(2.0, 2.0);
        pad.clear();
        assert!(pad.is_empty());
    }
}
