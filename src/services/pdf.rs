// src/services/pdf.rs

//! Positioned text extraction from the report PDF.
//!
//! Interprets the text operators of each page content stream and records
//! where every string is drawn. Glyph widths are not tracked: a fragment's
//! position is the origin of the text-showing operator that drew it, which is
//! enough to assign it to a table column.
//!
//! Strings are decoded through the encoding of the font selected by `Tf`.
//! Without a usable font they fall back to UTF-16BE (with BOM) or Latin-1.

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{Document, Encoding, Object, ObjectId};

use crate::error::Result;
use crate::models::{PAGE_OFFSET, PositionedFragment};

/// Height used when a page declares no usable MediaBox (US letter, landscape).
const DEFAULT_PAGE_HEIGHT: f32 = 612.0;

/// Horizontal adjustment in a `TJ` array, in thousandths of a unit of text
/// space, beyond which the gap is read as a word break.
const TJ_SPACE_THRESHOLD: f32 = -200.0;

/// Guards against cyclic `Parent` chains in malformed page trees.
const MAX_INHERITANCE_DEPTH: usize = 16;

/// Affine transform `[a b c d e f]` as used by PDF.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f32, ty: f32) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other`
    fn multiply(&self, other: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn origin(&self) -> (f32, f32) {
        (self.0[4], self.0[5])
    }
}

/// Font resource name to text encoding, for one page.
pub type FontEncodings<'a> = BTreeMap<Vec<u8>, Encoding<'a>>;

/// Graphics and text state needed to locate and decode text.
struct TextState {
    ctm: Matrix,
    saved: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    leading: f32,
    font: Option<Vec<u8>>,
}

impl TextState {
    fn new() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            saved: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            leading: 0.0,
            font: None,
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).multiply(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.move_line(0.0, -leading);
    }

    /// Device-space position of the current text origin.
    fn position(&self) -> (f32, f32) {
        self.text_matrix.multiply(&self.ctm).origin()
    }
}

/// Extract every text fragment of every page, in page order.
pub fn extract_fragments(bytes: &[u8]) -> Result<Vec<PositionedFragment>> {
    let doc = Document::load_mem(bytes)?;
    let mut fragments = Vec::new();

    for (index, (_, page_id)) in doc.get_pages().into_iter().enumerate() {
        let raw = doc.get_page_content(page_id)?;
        let content = Content::decode(&raw)?;
        let height = page_height(&doc, page_id);
        let fonts = font_encodings(&doc, page_id);
        fragments.extend(fragments_from_operations(
            &content.operations,
            &fonts,
            height,
            index,
        ));
    }

    Ok(fragments)
}

/// Encodings of the fonts a page can select. Entries that are not font
/// dictionaries, or whose encoding lopdf cannot resolve, are left out and
/// decode with the fallback.
fn font_encodings(doc: &Document, page_id: ObjectId) -> FontEncodings<'_> {
    let fonts = match doc.get_page_fonts(page_id) {
        Ok(fonts) => fonts,
        Err(e) => {
            log::warn!("Could not read fonts of page {:?}: {}", page_id, e);
            return FontEncodings::new();
        }
    };

    fonts
        .into_iter()
        .filter(|(_, font)| font.type_is(b"Font"))
        .filter_map(|(name, font)| match font.get_font_encoding(doc) {
            Ok(encoding) => Some((name, encoding)),
            Err(e) => {
                log::debug!("No encoding for font {}: {}", String::from_utf8_lossy(&name), e);
                None
            }
        })
        .collect()
}

/// Interpret one page's content operations.
///
/// `y` of each fragment is measured top-down and shifted by
/// `page * PAGE_OFFSET` so all pages share one coordinate space.
pub fn fragments_from_operations(
    operations: &[Operation],
    fonts: &FontEncodings<'_>,
    page_height: f32,
    page: usize,
) -> Vec<PositionedFragment> {
    let mut state = TextState::new();
    let mut fragments = Vec::new();
    let page_top = page as f32 * PAGE_OFFSET;

    for op in operations {
        let operands = &op.operands;
        let encoding = state.font.as_ref().and_then(|name| fonts.get(name));
        let shown = match op.operator.as_str() {
            "q" => {
                state.saved.push(state.ctm);
                None
            }
            "Q" => {
                if let Some(ctm) = state.saved.pop() {
                    state.ctm = ctm;
                }
                None
            }
            "cm" => {
                if let Some(m) = matrix_operand(operands) {
                    state.ctm = m.multiply(&state.ctm);
                }
                None
            }
            "BT" => {
                state.text_matrix = Matrix::IDENTITY;
                state.line_matrix = Matrix::IDENTITY;
                None
            }
            "Tm" => {
                if let Some(m) = matrix_operand(operands) {
                    state.text_matrix = m;
                    state.line_matrix = m;
                }
                None
            }
            "Td" | "TD" => {
                if let (Some(tx), Some(ty)) = (number_at(operands, 0), number_at(operands, 1)) {
                    if op.operator == "TD" {
                        state.leading = -ty;
                    }
                    state.move_line(tx, ty);
                }
                None
            }
            "TL" => {
                if let Some(leading) = number_at(operands, 0) {
                    state.leading = leading;
                }
                None
            }
            "T*" => {
                state.next_line();
                None
            }
            "Tf" => {
                state.font = operands
                    .first()
                    .and_then(|obj| obj.as_name().ok())
                    .map(<[u8]>::to_vec);
                None
            }
            "Tj" => operands.first().and_then(|obj| decode_string(obj, encoding)),
            "'" => {
                state.next_line();
                operands.first().and_then(|obj| decode_string(obj, encoding))
            }
            "\"" => {
                state.next_line();
                operands.get(2).and_then(|obj| decode_string(obj, encoding))
            }
            "TJ" => operands.first().and_then(|obj| decode_array(obj, encoding)),
            _ => None,
        };

        if let Some(text) = shown {
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let (x, y) = state.position();
            fragments.push(PositionedFragment::new(
                text,
                x,
                page_top + (page_height - y),
                page,
            ));
        }
    }

    fragments
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn number_at(operands: &[Object], index: usize) -> Option<f32> {
    operands.get(index).and_then(number)
}

fn matrix_operand(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let mut values = [0.0f32; 6];
    for (slot, obj) in values.iter_mut().zip(operands) {
        *slot = number(obj)?;
    }
    Some(Matrix(values))
}

/// Decode a string operand with the current font's encoding.
fn decode_string(obj: &Object, encoding: Option<&Encoding<'_>>) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };
    Some(decode_shown(bytes, encoding))
}

fn decode_shown(bytes: &[u8], encoding: Option<&Encoding<'_>>) -> String {
    encoding
        .and_then(|encoding| Document::decode_text(encoding, bytes).ok())
        .unwrap_or_else(|| decode_bytes(bytes))
}

/// UTF-16BE when the bytes carry a BOM, Latin-1 otherwise.
fn decode_bytes(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Join the strings of a `TJ` array, turning wide negative kerns into spaces.
fn decode_array(obj: &Object, encoding: Option<&Encoding<'_>>) -> Option<String> {
    let Object::Array(items) = obj else {
        return None;
    };
    let mut text = String::new();
    for item in items {
        match item {
            Object::String(bytes, _) => text.push_str(&decode_shown(bytes, encoding)),
            other => {
                if number(other).is_some_and(|kern| kern < TJ_SPACE_THRESHOLD) {
                    text.push(' ');
                }
            }
        }
    }
    Some(text)
}

/// Page height from the page's MediaBox, following `Parent` inheritance.
fn page_height(doc: &Document, page_id: ObjectId) -> f32 {
    let mut current = doc.get_dictionary(page_id).ok();

    for _ in 0..MAX_INHERITANCE_DEPTH {
        let Some(dict) = current else {
            break;
        };
        let media_box = dict
            .get(b"MediaBox")
            .ok()
            .and_then(|obj| doc.dereference(obj).ok())
            .and_then(|(_, obj)| obj.as_array().ok());

        if let Some(values) = media_box {
            let coords: Vec<f32> = values.iter().filter_map(number).collect();
            if let [_, lly, _, ury] = coords.as_slice() {
                return (ury - lly).abs();
            }
        }

        current = dict
            .get(b"Parent")
            .ok()
            .and_then(|obj| obj.as_reference().ok())
            .and_then(|id| doc.get_dictionary(id).ok());
    }

    DEFAULT_PAGE_HEIGHT
}

/// Render a landscape letter document drawing each `(text, x, y)` with `y`
/// measured from the top of its page.
#[cfg(test)]
pub(crate) fn render_test_document(pages: &[Vec<(&str, f32, f32)>]) -> Vec<u8> {
    let pages: Vec<Vec<(&[u8], f32, f32)>> = pages
        .iter()
        .map(|page| page.iter().map(|(text, x, y)| (text.as_bytes(), *x, *y)).collect())
        .collect();
    render_test_bytes(&pages)
}

/// Like `render_test_document`, with raw string bytes shown in a
/// WinAnsi-encoded Helvetica.
#[cfg(test)]
pub(crate) fn render_test_bytes(pages: &[Vec<(&[u8], f32, f32)>]) -> Vec<u8> {
    use lopdf::{Stream, StringFormat, dictionary};

    const WIDTH: f32 = 792.0;
    const HEIGHT: f32 = 612.0;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let mut kids: Vec<Object> = Vec::new();

    for page in pages {
        let mut operations = Vec::new();
        for (bytes, x, y) in page {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 10.into()]));
            operations.push(Operation::new(
                "Tm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), (*x).into(), (HEIGHT - *y).into()],
            ));
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(bytes.to_vec(), StringFormat::Literal)],
            ));
            operations.push(Operation::new("ET", vec![]));
        }
        let encoded = Content { operations }.encode().unwrap();
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), WIDTH.into(), HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
