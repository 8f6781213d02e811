//! PDF backend (A4, built-in Helvetica fonts)

use printpdf::image_crate::{self, DynamicImage, RgbImage};
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference,
};
use std::io::{BufWriter, Write};
use std::path::Path;

use super::{Block, DocumentLayout};
use crate::{CoreError, CoreResult};

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const PT_PER_MM: f32 = 72.0 / 25.4;
const MARGIN: f32 = 50.0;

const TITLE_SIZE: f32 = 24.0;
const HEADING_SIZE: f32 = 16.0;
const CAPTION_SIZE: f32 = 14.0;
const BODY_SIZE: f32 = 12.0;
const LINE_GAP: f32 = 10.0;
const CAPTION_GAP: f32 = 15.0;
const PARAGRAPH_INDENT: f32 = 20.0;

/// Resolution images are placed at before scaling.
const IMAGE_DPI: f32 = 300.0;

fn mm(pt: f32) -> Mm {
    Mm(pt / PT_PER_MM)
}

fn page_height() -> f32 {
    PAGE_HEIGHT_MM * PT_PER_MM
}

fn content_width() -> f32 {
    PAGE_WIDTH_MM * PT_PER_MM - 2.0 * MARGIN
}

fn render_err(e: impl std::fmt::Debug) -> CoreError {
    CoreError::Render(format!("{:?}", e))
}

/// Approximate Helvetica advance width, in ems.
fn char_width(c: char) -> f32 {
    match c {
        'i' | 'j' | 'l' => 0.222,
        ' ' | 'f' | 't' | 'I' | '!' | '.' | ',' | ':' | ';' | '\'' | '|' | '/' => 0.278,
        'r' | '(' | ')' | '-' => 0.333,
        'm' | 'M' => 0.833,
        'w' => 0.722,
        'W' => 0.944,
        '@' => 1.015,
        c if c.is_ascii_uppercase() => 0.667,
        _ => 0.556,
    }
}

pub(crate) fn text_width(text: &str, size: f32, bold: bool) -> f32 {
    let em: f32 = text.chars().map(char_width).sum();
    em * size * if bold { 1.05 } else { 1.0 }
}

/// Greedy word wrap. The first line may be narrower (indent, label).
pub(crate) fn wrap(text: &str, size: f32, first_width: f32, width: f32) -> Vec<Vec<&str>> {
    let space = text_width(" ", size, false);
    let mut lines: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut used = 0.0;

    for word in text.split_whitespace() {
        let w = text_width(word, size, false);
        let limit = if lines.is_empty() { first_width } else { width };
        let needed = if current.is_empty() { w } else { used + space + w };
        if !current.is_empty() && needed > limit {
            lines.push(std::mem::take(&mut current));
            used = w;
        } else {
            used = needed;
        }
        current.push(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

struct Cursor<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    fonts: Fonts,
    /// Distance from the bottom edge, in points.
    y: f32,
}

impl<'a> Cursor<'a> {
    fn reserve(&mut self, height: f32) {
        if self.y - height < MARGIN {
            let (page, layer) = self
                .doc
                .add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = page_height() - MARGIN;
        }
    }

    /// Claim one line of `size` text and return its baseline.
    fn next_line(&mut self, size: f32, gap: f32) -> f32 {
        self.reserve(size + gap);
        self.y -= size;
        let baseline = self.y;
        self.y -= gap;
        baseline
    }

    fn text(&self, text: &str, size: f32, x: f32, baseline: f32, bold: bool) {
        let font = if bold { &self.fonts.bold } else { &self.fonts.regular };
        self.layer.use_text(text, size, mm(x), mm(baseline), font);
    }

    fn gap(&mut self, lines: u8) {
        self.y -= f32::from(lines) * (BODY_SIZE + LINE_GAP);
    }

    fn heading(&mut self, text: &str, size: f32, gap: f32) {
        let baseline = self.next_line(size, gap);
        self.text(text, size, MARGIN, baseline, true);
    }

    fn field(&mut self, label: &str, value: &str) {
        let label = format!("{}: ", label);
        let label_width = text_width(&label, BODY_SIZE, true);
        let lines = wrap(value, BODY_SIZE, content_width() - label_width, content_width() - label_width);

        let baseline = self.next_line(BODY_SIZE, LINE_GAP);
        self.text(&label, BODY_SIZE, MARGIN, baseline, true);
        for (i, words) in lines.iter().enumerate() {
            let baseline = if i == 0 {
                baseline
            } else {
                self.next_line(BODY_SIZE, LINE_GAP)
            };
            self.text(&words.join(" "), BODY_SIZE, MARGIN + label_width, baseline, false);
        }
    }

    fn paragraph(&mut self, text: &str) {
        let width = content_width();
        let space = text_width(" ", BODY_SIZE, false);

        for block in text.split('\n') {
            let lines = wrap(block, BODY_SIZE, width - PARAGRAPH_INDENT, width);
            let count = lines.len();
            for (i, words) in lines.iter().enumerate() {
                let baseline = self.next_line(BODY_SIZE, LINE_GAP);
                let x0 = if i == 0 { MARGIN + PARAGRAPH_INDENT } else { MARGIN };
                let avail = if i == 0 { width - PARAGRAPH_INDENT } else { width };

                let word_total: f32 = words.iter().map(|w| text_width(w, BODY_SIZE, false)).sum();
                let last = i + 1 == count;
                let spacing = if last || words.len() < 2 {
                    space
                } else {
                    (avail - word_total) / (words.len() - 1) as f32
                };
                // Sparse lines read better ragged than stretched.
                let spacing = if spacing > space * 4.0 { space } else { spacing };

                let mut x = x0;
                for word in words {
                    self.text(word, BODY_SIZE, x, baseline, false);
                    x += text_width(word, BODY_SIZE, false) + spacing;
                }
            }
        }
    }

    fn image(&mut self, path: &Path, width_pt: f32, x: f32) -> CoreResult<f32> {
        let (image, px_width, px_height) = load_image(path)?;
        let natural_width = px_width as f32 / IMAGE_DPI * 72.0;
        let scale = width_pt / natural_width;
        let height = px_height as f32 / IMAGE_DPI * 72.0 * scale;

        self.reserve(height);
        let bottom = self.y - height;
        image.add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(mm(x)),
                translate_y: Some(mm(bottom)),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(IMAGE_DPI),
                ..Default::default()
            },
        );
        self.y = bottom;
        Ok(height)
    }

    fn letterhead(&mut self, logo: &Path, title: &str) -> CoreResult<()> {
        let top = self.y;
        let logo_height = self.image(logo, super::LOGO_WIDTH_PT, MARGIN)?;
        let title_baseline = top - 35.0 - TITLE_SIZE;
        self.text(title, TITLE_SIZE, 200.0, title_baseline, true);
        self.y = (top - logo_height).min(title_baseline) - 2.0 * (BODY_SIZE + LINE_GAP);
        Ok(())
    }
}

/// Decode an image and flatten any transparency onto white.
fn load_image(path: &Path) -> CoreResult<(Image, u32, u32)> {
    let decoded = image_crate::open(path)
        .map_err(|e| CoreError::Render(format!("cannot read image {}: {}", path.display(), e)))?;
    let rgba = decoded.to_rgba8();
    let (w, h) = rgba.dimensions();
    let flat = RgbImage::from_fn(w, h, |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = f32::from(a) / 255.0;
        let blend = |c: u8| (f32::from(c) * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        image_crate::Rgb([blend(r), blend(g), blend(b)])
    });
    Ok((Image::from_dynamic_image(&DynamicImage::ImageRgb8(flat)), w, h))
}

/// Draw `layout` as a PDF into `out`.
pub fn write<W: Write>(layout: &DocumentLayout, out: W) -> CoreResult<()> {
    let (doc, page, layer) = PdfDocument::new(
        layout.title.as_str(),
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "Layer 1",
    );
    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(render_err)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(render_err)?,
    };
    let layer = doc.get_page(page).get_layer(layer);

    {
        let mut cursor = Cursor {
            doc: &doc,
            layer,
            fonts,
            y: page_height() - MARGIN,
        };

        for block in &layout.blocks {
            match block {
                Block::Letterhead { logo, title } => cursor.letterhead(logo, title)?,
                Block::Heading(text) => {
                    cursor.heading(text, HEADING_SIZE, LINE_GAP);
                    cursor.gap(1);
                }
                Block::Field { label, value } => cursor.field(label, value),
                Block::Paragraph(text) => cursor.paragraph(text),
                Block::Caption(text) => cursor.heading(&format!("{}:", text), CAPTION_SIZE, CAPTION_GAP),
                Block::Image { path, width_pt } => {
                    cursor.image(path, *width_pt, MARGIN)?;
                }
                Block::Stamp(text) => {
                    let baseline = cursor.next_line(BODY_SIZE, LINE_GAP);
                    cursor.text(text, BODY_SIZE, MARGIN, baseline, false);
                }
                Block::Gap(lines) => cursor.gap(*lines),
            }
        }
    }

    let mut writer = BufWriter::new(out);
    doc.save(&mut writer).map_err(render_err)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::layout;
    use crate::render::tests::{sample_contract, signed, write_png};
    use chrono::NaiveDate;

    #[test]
    fn test_wrap_respects_width() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let lines = wrap(text, BODY_SIZE, 100.0, 100.0);
        assert!(lines.len() > 1);
        for line in &lines {
            if line.len() > 1 {
                assert!(text_width(&line.join(" "), BODY_SIZE, false) <= 100.0);
            }
        }
        let rejoined: Vec<&str> = lines.into_iter().flatten().collect();
        assert_eq!(rejoined.join(" "), text);
    }

    #[test]
    fn test_wrap_keeps_long_word_alone() {
        let lines = wrap("Supercalifragilisticexpialidocious", BODY_SIZE, 20.0, 20.0);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_long_description_spans_pages() {
        let mut contract = signed(sample_contract());
        contract.description = "Clause de garantie. ".repeat(600);
        let doc = layout(&contract, None, None, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        let mut out = Vec::new();
        write(&doc, &mut out).unwrap();
        assert!(out.starts_with(b"%PDF"));
    }

    #[test]
    fn test_embeds_images() {
        let dir = tempfile::tempdir().unwrap();
        let logo = dir.path().join("logo.png");
        let sig = dir.path().join("sig.png");
        write_png(&logo);
        write_png(&sig);
        let doc = layout(
            &signed(sample_contract()),
            Some(&sig),
            Some(&logo),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );

        let mut with_images = Vec::new();
        write(&doc, &mut with_images).unwrap();

        let plain = layout(&signed(sample_contract()), None, None, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        let mut without = Vec::new();
        write(&plain, &mut without).unwrap();

        assert!(with_images.len() > without.len());
    }
}
