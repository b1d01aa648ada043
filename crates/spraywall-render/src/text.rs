use rustybuzz::ttf_parser::{self, GlyphId};
use spraywall_types::TextBody;
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Transform};
use tracing::warn;

const DEFAULT_INK: (u8, u8, u8, u8) = (17, 17, 17, 255);

/// Draws a text tag: multi-line block vertically centered on the anchor,
/// each line horizontally centered, rotated about the block center.
///
/// Font resolution falls back to the generic sans query; with an empty
/// font database the item draws nothing (logged) — the skip counter is
/// reserved for image items.
pub(crate) fn draw_text(
    canvas: &mut Pixmap,
    fonts: &fontdb::Database,
    body: &TextBody,
    center: (f32, f32),
    rotation_deg: f32,
    opacity: f32,
) {
    let Some(face_id) = resolve_face(fonts, &body.font) else {
        warn!(font = %body.font, "no face available for text item");
        return;
    };
    let drawn = fonts.with_face_data(face_id, |data, index| {
        let Some(face) = rustybuzz::Face::from_slice(data, index) else {
            return false;
        };
        draw_with_face(canvas, &face, body, center, rotation_deg, opacity);
        true
    });
    if drawn != Some(true) {
        warn!(font = %body.font, "face data unavailable for text item");
    }
}

fn draw_with_face(
    canvas: &mut Pixmap,
    face: &rustybuzz::Face<'_>,
    body: &TextBody,
    center: (f32, f32),
    rotation_deg: f32,
    opacity: f32,
) {
    let upem = face.units_per_em() as f32;
    if upem <= 0.0 {
        return;
    }
    let scale = body.size as f32 / upem;
    let line_height =
        f32::from(face.ascender() - face.descender() + face.line_gap()) * scale;
    let ascent = f32::from(face.ascender()) * scale;

    let lines: Vec<&str> = body.text.split('\n').collect();
    let block_height = line_height * lines.len() as f32;

    let (r, g, b, a) = parse_color(&body.color).unwrap_or(DEFAULT_INK);
    let mut paint = Paint::default();
    paint.set_color_rgba8(r, g, b, (f32::from(a) * opacity.clamp(0.0, 1.0)).round() as u8);
    paint.anti_alias = true;

    let rotate = Transform::from_rotate(rotation_deg);
    for (index, line) in lines.iter().enumerate() {
        let Some((path, advance_units)) = shape_line(face, line) else {
            continue;
        };
        let line_width = advance_units * scale;
        let baseline_y = -block_height / 2.0 + line_height * index as f32 + ascent;
        let transform = Transform::from_scale(scale, -scale)
            .post_translate(-line_width / 2.0, baseline_y)
            .post_concat(rotate)
            .post_translate(center.0, center.1);
        canvas.fill_path(&path, &paint, FillRule::Winding, transform, None);
    }
}

/// Shapes one line and returns its outline path in font units (y-up,
/// baseline at y = 0) plus the total advance. `None` for empty lines.
fn shape_line(face: &rustybuzz::Face<'_>, line: &str) -> Option<(tiny_skia::Path, f32)> {
    let mut buffer = rustybuzz::UnicodeBuffer::new();
    buffer.push_str(line);
    let glyphs = rustybuzz::shape(face, &[], buffer);

    let mut builder = PathBuilder::new();
    let mut pen_x = 0.0f32;
    for (info, pos) in glyphs.glyph_infos().iter().zip(glyphs.glyph_positions()) {
        let mut outline = GlyphOutline {
            builder: &mut builder,
            dx: pen_x + pos.x_offset as f32,
            dy: pos.y_offset as f32,
        };
        face.outline_glyph(GlyphId(info.glyph_id as u16), &mut outline);
        pen_x += pos.x_advance as f32;
    }
    builder.finish().map(|path| (path, pen_x))
}

struct GlyphOutline<'a> {
    builder: &'a mut PathBuilder,
    dx: f32,
    dy: f32,
}

impl ttf_parser::OutlineBuilder for GlyphOutline<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(x + self.dx, y + self.dy);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(x + self.dx, y + self.dy);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder
            .quad_to(x1 + self.dx, y1 + self.dy, x + self.dx, y + self.dy);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(
            x1 + self.dx,
            y1 + self.dy,
            x2 + self.dx,
            y2 + self.dy,
            x + self.dx,
            y + self.dy,
        );
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

/// Maps a CSS-ish font descriptor ("Impact, sans-serif") onto the font
/// database, trying named families first and generic sans last.
fn resolve_face(fonts: &fontdb::Database, descriptor: &str) -> Option<fontdb::ID> {
    let names: Vec<&str> = descriptor
        .split(',')
        .map(|part| part.trim().trim_matches('"').trim_matches('\''))
        .filter(|part| !part.is_empty())
        .collect();
    let mut families: Vec<fontdb::Family<'_>> = names
        .iter()
        .copied()
        .map(|name| match name.to_ascii_lowercase().as_str() {
            "sans-serif" => fontdb::Family::SansSerif,
            "serif" => fontdb::Family::Serif,
            "monospace" => fontdb::Family::Monospace,
            "cursive" => fontdb::Family::Cursive,
            "fantasy" => fontdb::Family::Fantasy,
            _ => fontdb::Family::Name(name),
        })
        .collect();
    families.push(fontdb::Family::SansSerif);
    fonts.query(&fontdb::Query {
        families: &families,
        ..fontdb::Query::default()
    })
}

/// `#rgb`, `#rrggbb`, `#rrggbbaa`, or a handful of CSS color names.
fn parse_color(descriptor: &str) -> Option<(u8, u8, u8, u8)> {
    let value = descriptor.trim();
    if let Some(hex) = value.strip_prefix('#') {
        return match hex.len() {
            3 => {
                let r = u8::from_str_radix(&hex[0..1], 16).ok()?;
                let g = u8::from_str_radix(&hex[1..2], 16).ok()?;
                let b = u8::from_str_radix(&hex[2..3], 16).ok()?;
                Some((r * 17, g * 17, b * 17, 255))
            }
            6 | 8 => {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                let a = if hex.len() == 8 {
                    u8::from_str_radix(&hex[6..8], 16).ok()?
                } else {
                    255
                };
                Some((r, g, b, a))
            }
            _ => None,
        };
    }
    let named = match value.to_ascii_lowercase().as_str() {
        "black" => (0, 0, 0),
        "white" => (255, 255, 255),
        "red" => (255, 0, 0),
        "green" => (0, 128, 0),
        "blue" => (0, 0, 255),
        "yellow" => (255, 255, 0),
        "orange" => (255, 165, 0),
        "purple" => (128, 0, 128),
        "pink" => (255, 192, 203),
        "cyan" => (0, 255, 255),
        "magenta" => (255, 0, 255),
        "gray" | "grey" => (128, 128, 128),
        _ => return None,
    };
    Some((named.0, named.1, named.2, 255))
}

#[cfg(test)]
mod tests {
    use super::parse_color;

    #[test]
    fn hex_colors_parse() {
        assert_eq!(parse_color("#111111"), Some((17, 17, 17, 255)));
        assert_eq!(parse_color("#f00"), Some((255, 0, 0, 255)));
        assert_eq!(parse_color("#00ff0080"), Some((0, 255, 0, 128)));
    }

    #[test]
    fn named_colors_parse() {
        assert_eq!(parse_color("Hot Pink Nope"), None);
        assert_eq!(parse_color("white"), Some((255, 255, 255, 255)));
    }
}
