//! Excellon drill files: a format-guessing pass over the whole file, then
//! the real parse. Tool hits become flash nets owning synthesized circular
//! apertures; `G85` slots become single draw nets. Output coordinates are
//! inches, as everywhere in the image model.

use std::io::Write;
use std::path::Path;

use log::warn;

use crate::error::IngestError;
use crate::reader::TextCursor;
use crate::types::{
    Aperture, ApertureShape, ApertureState, CoordMode, Image, Interpolation, LayerKind, Net,
    OmitZeros, Unit, MM_PER_INCH,
};

/// Tool numbers run 1..9999; `T00` is the unload command.
const TOOL_MAX: usize = 9999;

#[derive(Debug, Clone, Copy)]
pub struct DrillOptions {
    /// Reinterpret tool diameters of 4 in and over as mils (a common CAD
    /// bug). Controlled by the `drill-large-tool-mils` project attribute.
    pub large_tool_is_mils: bool,
}

impl Default for DrillOptions {
    fn default() -> Self {
        DrillOptions {
            large_tool_is_mils: true,
        }
    }
}

pub fn parse_file(path: &Path, opts: &DrillOptions) -> Result<Image, IngestError> {
    let cursor = TextCursor::open(path)?;
    parse(cursor, opts)
}

pub fn parse_bytes(data: &[u8], name: &str, opts: &DrillOptions) -> Result<Image, IngestError> {
    let cursor = TextCursor::from_bytes_named(
        data.to_vec(),
        std::path::PathBuf::from("."),
        name.to_string(),
    );
    parse(cursor, opts)
}

// ─── Format inference pass ───────────────────────────────────────────

#[derive(Debug, PartialEq)]
struct GuessedFormat {
    unit: Unit,
    omit_zeros: OmitZeros,
    int_digits: u8,
    dec_digits: u8,
}

fn guess_format(fd: &mut TextCursor) -> GuessedFormat {
    let mut inch_score = 0i32;
    let mut metric_score = 0i32;
    let mut max_length = 0usize;
    let mut max_leading = 0usize;
    let mut max_trailing = 0usize;
    let mut t_precision = 0usize;

    'scan: while let Some(c) = fd.get_char() {
        match c {
            b';' | b'F' | b'S' => fd.skip_line(),
            b'G' => fd.skip_line(),
            b'T' => {
                // A tool definition's explicit decimal point reveals the
                // precision used for dimensions.
                loop {
                    match fd.get_char() {
                        Some(b'C') | Some(b'0'..=b'9') => {}
                        Some(b'.') => {
                            let mut p = 0;
                            while fd.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                                fd.get_char();
                                p += 1;
                            }
                            t_precision = p;
                            break;
                        }
                        _ => break,
                    }
                }
            }
            b'M' => {
                let c1 = fd.get_char();
                let c2 = fd.get_char();
                match (c1, c2) {
                    (Some(b'7'), Some(b'1')) => metric_score += 10,
                    (Some(b'7'), Some(b'2')) => inch_score += 10,
                    (Some(b'E'), Some(b'T')) => {
                        // METRIC header word.
                        metric_score += 10;
                        fd.skip_line();
                    }
                    (Some(b'3'), Some(b'0')) | (Some(b'0'), Some(b'0')) => break 'scan,
                    _ => {}
                }
            }
            b'I' => {
                if fd.peek_char() == Some(b'N') {
                    // INCH header word.
                    inch_score += 10;
                }
                fd.skip_line();
            }
            b'X' | b'Y' => {
                let mut length = 0usize;
                let mut leading = 0usize;
                let mut trailing = 0usize;
                let mut seen_nonzero = false;
                while let Some(c) = fd.peek_char() {
                    match c {
                        b'0'..=b'9' => {
                            fd.get_char();
                            length += 1;
                            if c == b'0' {
                                if seen_nonzero {
                                    trailing += 1;
                                } else {
                                    leading += 1;
                                }
                            } else {
                                seen_nonzero = true;
                                trailing = 0;
                            }
                        }
                        b'+' | b'-' | b',' | b'.' => {
                            fd.get_char();
                        }
                        _ => break,
                    }
                }
                max_length = max_length.max(length);
                max_leading = max_leading.max(leading);
                max_trailing = max_trailing.max(trailing);
            }
            _ => {}
        }
    }
    fd.rewind();

    // Inches are more common, so they win ties.
    let unit = if metric_score > inch_score {
        Unit::Mm
    } else {
        Unit::Inch
    };

    // Trailing-zero knowledge is the stronger signal.
    let omit_zeros = if max_trailing == 0 {
        OmitZeros::Trailing
    } else if max_leading == 0 {
        OmitZeros::Leading
    } else if max_trailing >= max_leading {
        OmitZeros::Trailing
    } else {
        OmitZeros::Leading
    };

    let mut dec_digits = if t_precision > 0 {
        t_precision as u8
    } else {
        // Nearly every file uses a 2.x layout.
        max_length.saturating_sub(2) as u8
    };

    // Leading-omit inch files with few decimals usually mean one more
    // decimal than the arithmetic suggests.
    if (omit_zeros == OmitZeros::Leading || (max_leading == 0 && max_trailing == 0))
        && dec_digits <= 3
        && unit == Unit::Inch
    {
        dec_digits += 1;
    }

    GuessedFormat {
        unit,
        omit_zeros,
        int_digits: 2,
        dec_digits,
    }
}

// ─── Main pass ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    None,
    Header,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DrillMode {
    Drill,
    Rout,
}

struct DrillState {
    unit: Unit,
    header_unit: Unit,
    section: Section,
    mode: DrillMode,
    coord_mode: CoordMode,
    tool: usize,
    x: f64,
    y: f64,
    origin_x: f64,
    origin_y: f64,
    zero_set_pending: bool,
}

fn parse(mut fd: TextCursor, opts: &DrillOptions) -> Result<Image, IngestError> {
    let mut image = Image::new(LayerKind::Drill);
    let file = fd.name().to_string();

    let guessed = guess_format(&mut fd);
    image.info.unit = guessed.unit;
    image.format.omit_zeros = guessed.omit_zeros;
    image.format.x_int = guessed.int_digits;
    image.format.x_dec = guessed.dec_digits;
    image.format.y_int = guessed.int_digits;
    image.format.y_dec = guessed.dec_digits;
    image.format.tool_dec = guessed.dec_digits.max(3);

    let mut st = DrillState {
        unit: guessed.unit,
        header_unit: guessed.unit,
        section: Section::None,
        mode: DrillMode::Drill,
        coord_mode: CoordMode::Absolute,
        tool: 0,
        x: 0.0,
        y: 0.0,
        origin_x: 0.0,
        origin_y: 0.0,
        zero_set_pending: false,
    };

    while let Some(c) = fd.get_char() {
        match c {
            b';' | b'F' | b'S' => fd.skip_line(),
            b'G' => handle_g(&mut fd, &mut st, &file),
            b'I' => handle_i(&mut fd, &mut st),
            b'M' => {
                if handle_m(&mut fd, &mut st, &file) {
                    return Ok(image);
                }
            }
            b'T' => handle_t(&mut fd, &mut st, &mut image, opts, &file),
            b'X' | b'Y' => handle_xy(c, &mut fd, &mut st, &mut image, &file),
            b'%' => st.section = Section::Data,
            b'\n' | b'\r' | b' ' | b'\t' => {}
            other => {
                if st.section == Section::Header {
                    // Unrecognized header noise is discarded.
                    fd.skip_line();
                } else {
                    warn!(
                        "{file}:{}: ignoring stray character {:?} in drill data",
                        fd.line(),
                        other as char
                    );
                }
            }
        }
    }

    warn!("{file}: drill file is missing an end-of-file command");
    Ok(image)
}

fn handle_g(fd: &mut TextCursor, st: &mut DrillState, file: &str) {
    let c1 = fd.get_char();
    let c2 = fd.get_char();
    match (c1, c2) {
        (Some(b'0'), Some(b'0')) => st.mode = DrillMode::Rout,
        (Some(b'0'), Some(b'5')) => st.mode = DrillMode::Drill,
        (Some(b'0'), Some(b'1')) => st.mode = DrillMode::Rout,
        (Some(b'0'), Some(b'2')) | (Some(b'0'), Some(b'3')) => {
            warn!(
                "{file}:{}: circular rout moves are approximated as lines",
                fd.line()
            );
            st.mode = DrillMode::Rout;
        }
        (Some(b'9'), Some(b'0')) => st.coord_mode = CoordMode::Absolute,
        (Some(b'9'), Some(b'1')) => st.coord_mode = CoordMode::Incremental,
        (Some(b'9'), Some(b'3')) => st.zero_set_pending = true,
        (Some(b'8'), Some(b'5')) => {
            // A bare G85 is handled inline by handle_xy; here it is noise.
            warn!("{file}:{}: G85 without coordinates", fd.line());
        }
        _ => fd.skip_line(),
    }
}

fn handle_i(fd: &mut TextCursor, st: &mut DrillState) {
    // Either "INCH[,...]" (header) or "ICI,ON"/"ICI,OFF".
    match fd.get_char() {
        Some(b'N') => {
            if fd.get_char() == Some(b'C') && fd.get_char() == Some(b'H') {
                st.header_unit = Unit::Inch;
                if st.section == Section::Header {
                    st.unit = Unit::Inch;
                }
            }
            fd.skip_line();
        }
        Some(b'C') => {
            if fd.get_char() == Some(b'I') && fd.get_char() == Some(b',') {
                match fd.get_char() {
                    Some(b'O') => match fd.get_char() {
                        Some(b'N') => st.coord_mode = CoordMode::Incremental,
                        Some(b'F') => st.coord_mode = CoordMode::Absolute,
                        _ => {}
                    },
                    _ => {}
                }
            }
            fd.skip_line();
        }
        _ => fd.skip_line(),
    }
}

/// Returns true when the file is finished.
fn handle_m(fd: &mut TextCursor, st: &mut DrillState, file: &str) -> bool {
    let c1 = fd.get_char();
    let c2 = fd.get_char();
    match (c1, c2) {
        (Some(b'4'), Some(b'8')) => {
            st.section = Section::Header;
            false
        }
        (Some(b'9'), Some(b'5')) => {
            st.section = Section::Data;
            false
        }
        (Some(b'7'), Some(b'1')) => {
            fd.skip_line();
            st.unit = Unit::Mm;
            false
        }
        (Some(b'7'), Some(b'2')) => {
            fd.skip_line();
            st.unit = Unit::Inch;
            false
        }
        (Some(b'3'), Some(b'0')) | (Some(b'0'), Some(b'0')) | (Some(b'0'), Some(b'1')) => true,
        (Some(b'E'), Some(b'T')) => {
            // METRIC[,...] header word.
            if fd.get_char() == Some(b'R') {
                st.header_unit = Unit::Mm;
                if st.section == Section::Header {
                    st.unit = Unit::Mm;
                }
            }
            fd.skip_line();
            false
        }
        _ => {
            warn!("{file}:{}: unknown M-code in drill file", fd.line());
            false
        }
    }
}

fn handle_t(
    fd: &mut TextCursor,
    st: &mut DrillState,
    image: &mut Image,
    opts: &DrillOptions,
    file: &str,
) {
    // Orcad sometimes writes junk text after T.
    match fd.peek_char() {
        Some(c) if c.is_ascii_digit() || c == b'+' || c == b'-' => {}
        Some(_) => {
            warn!("{file}:{}: junk text in place of tool definition", fd.line());
            fd.skip_line();
            return;
        }
        None => return,
    }

    let Some(tok) = fd.get_int() else {
        return;
    };
    let tool_num = tok.value.max(0) as usize;
    if tool_num > TOOL_MAX {
        warn!("{file}:{}: tool T{tool_num} out of bounds", fd.line());
        return;
    }
    st.tool = tool_num;

    // Optional C/F/S parameters follow.
    loop {
        match fd.get_char() {
            Some(b'C') => {
                let scale = 10f64.powi(-(image.format.tool_dec as i32));
                let Some(mut size) = fd.get_double(scale) else {
                    warn!("{file}:{}: tool T{tool_num} has no diameter", fd.line());
                    continue;
                };
                if st.header_unit == Unit::Mm {
                    size /= MM_PER_INCH;
                } else if size >= 4.0 && opts.large_tool_is_mils {
                    warn!(
                        "{file}:{}: tool T{tool_num} diameter {size}\" assumed to be mils",
                        fd.line()
                    );
                    size /= 1000.0;
                }
                if size <= 0.0 || size >= 10000.0 {
                    warn!("{file}:{}: tool T{tool_num} is the wrong size: {size}", fd.line());
                } else if image.apertures.contains_key(&tool_num) {
                    warn!("{file}:{}: tool T{tool_num} is already defined", fd.line());
                } else {
                    image.apertures.insert(tool_num, Aperture::circle(size));
                }
            }
            Some(b'F') | Some(b'S') => {
                let _ = fd.get_int();
            }
            Some(_) => {
                fd.unget_char();
                break;
            }
            None => break,
        }
    }

    // A tool used without a definition still needs to show something.
    if !image.apertures.contains_key(&tool_num) && tool_num != 0 {
        let dia = (16 + 8 * tool_num) as f64 / 1000.0;
        warn!(
            "{file}:{}: tool T{tool_num:02} used without being defined, setting {dia}\"",
            fd.line()
        );
        image.apertures.insert(tool_num, Aperture::circle(dia));
    }
}

fn read_coord(fd: &mut TextCursor, image: &Image, unit: Unit) -> Option<f64> {
    // An explicit decimal point bypasses the implied-format decode.
    let mark = fd.save();
    let negative = match fd.peek_char() {
        Some(b'-') => {
            fd.get_char();
            true
        }
        Some(b'+') => {
            fd.get_char();
            false
        }
        _ => false,
    };
    let mut digits = String::new();
    let mut explicit = false;
    while let Some(c) = fd.peek_char() {
        match c {
            b'0'..=b'9' => {
                fd.get_char();
                digits.push(c as char);
            }
            b'.' | b',' if !explicit => {
                fd.get_char();
                explicit = true;
                digits.push('.');
            }
            _ => break,
        }
    }
    if digits.is_empty() || digits == "." {
        fd.restore(mark);
        return None;
    }
    let v = if explicit {
        digits.parse::<f64>().ok()? * if negative { -1.0 } else { 1.0 }
    } else {
        let lit = crate::parsers::gerber::coord::CoordLit::new(negative, digits);
        lit.decode(
            image.format.x_int,
            image.format.x_dec,
            image.format.omit_zeros,
        )
    };
    Some(match unit {
        Unit::Inch => v,
        Unit::Mm => v / MM_PER_INCH,
    })
}

fn handle_xy(first: u8, fd: &mut TextCursor, st: &mut DrillState, image: &mut Image, file: &str) {
    let incremental = st.coord_mode == CoordMode::Incremental;
    let prev = (st.x, st.y);

    let mut apply = |axis: u8, v: f64, st: &mut DrillState| match axis {
        b'X' => st.x = if incremental { st.x + v } else { v },
        _ => st.y = if incremental { st.y + v } else { v },
    };

    if let Some(v) = read_coord(fd, image, st.unit) {
        apply(first, v, st);
    }
    if first == b'X' && fd.peek_char() == Some(b'Y') {
        fd.get_char();
        if let Some(v) = read_coord(fd, image, st.unit) {
            apply(b'Y', v, st);
        }
    }

    if st.zero_set_pending {
        st.origin_x = st.x;
        st.origin_y = st.y;
        st.zero_set_pending = false;
        return;
    }

    let px = st.x - st.origin_x;
    let py = st.y - st.origin_y;

    // "X..Y..G85X..Y.." is a slot from the first to the second coordinate.
    let mark = fd.save();
    if fd.get_char() == Some(b'G') && fd.get_char() == Some(b'8') && fd.get_char() == Some(b'5') {
        let sx = if fd.peek_char() == Some(b'X') {
            fd.get_char();
            read_coord(fd, image, st.unit)
        } else {
            None
        };
        let sy = if fd.peek_char() == Some(b'Y') {
            fd.get_char();
            read_coord(fd, image, st.unit)
        } else {
            None
        };
        let end_x = sx.unwrap_or(st.x) - st.origin_x;
        let end_y = sy.unwrap_or(st.y) - st.origin_y;
        st.x = sx.unwrap_or(st.x);
        st.y = sy.unwrap_or(st.y);

        let mut net = Net::new(0, 0);
        net.start_x = px;
        net.start_y = py;
        net.stop_x = end_x;
        net.stop_y = end_y;
        net.aperture = st.tool;
        net.aperture_state = ApertureState::On;
        net.interpolation = Interpolation::Linear;
        image.push_net(net);
        return;
    }
    fd.restore(mark);

    if st.tool == 0 || !image.apertures.contains_key(&st.tool) {
        warn!("{file}:{}: coordinate with no tool selected", fd.line());
        return;
    }

    let mut net = Net::new(0, 0);
    match st.mode {
        DrillMode::Drill => {
            net.start_x = px;
            net.start_y = py;
            net.stop_x = px;
            net.stop_y = py;
            net.aperture_state = ApertureState::Flash;
        }
        DrillMode::Rout => {
            net.start_x = prev.0 - st.origin_x;
            net.start_y = prev.1 - st.origin_y;
            net.stop_x = px;
            net.stop_y = py;
            net.aperture_state = ApertureState::On;
        }
    }
    net.aperture = st.tool;
    net.interpolation = Interpolation::Linear;
    image.push_net(net);
}

// ─── Re-emit ─────────────────────────────────────────────────────────

/// Write a drill image back out as Excellon: `M48` + `INCH,TZ` header, one
/// `T{n}C{dia}` per circle aperture, flashes at a fixed 0.0001 in
/// resolution with trailing zeros kept, slots via `G85`, `M30` trailer.
pub fn write_drill<W: Write>(out: &mut W, image: &Image) -> Result<(), IngestError> {
    writeln!(out, "M48")?;
    writeln!(out, "INCH,TZ")?;
    for (&code, ap) in &image.apertures {
        if let ApertureShape::Circle { diameter, .. } = ap.shape {
            writeln!(out, "T{code}C{diameter:.4}")?;
        }
    }
    writeln!(out, "%")?;

    let enc = |v: f64| format!("{:06}", (v * 10000.0).round() as i64);

    let mut current_tool = 0usize;
    for net in &image.nets {
        if net.interpolation == Interpolation::Deleted {
            continue;
        }
        match net.aperture_state {
            ApertureState::Flash | ApertureState::On => {}
            ApertureState::Off => continue,
        }
        if net.aperture != current_tool {
            writeln!(out, "T{}", net.aperture)?;
            current_tool = net.aperture;
        }
        if net.aperture_state == ApertureState::Flash {
            writeln!(out, "X{}Y{}", enc(net.stop_x), enc(net.stop_y))?;
        } else {
            writeln!(
                out,
                "X{}Y{}G85X{}Y{}",
                enc(net.start_x),
                enc(net.start_y),
                enc(net.stop_x),
                enc(net.stop_y)
            )?;
        }
    }
    writeln!(out, "M30")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(content: &str) -> Image {
        parse_bytes(content.as_bytes(), "test.drl", &DrillOptions::default()).unwrap()
    }

    fn flashes(image: &Image) -> Vec<(f64, f64)> {
        image
            .nets
            .iter()
            .filter(|n| n.aperture_state == ApertureState::Flash)
            .map(|n| (n.stop_x, n.stop_y))
            .collect()
    }

    #[test]
    fn test_format_inference_no_unit() {
        // No INCH/METRIC anywhere: inch default, 2.4 from 6-digit literals.
        let img = parse_str("T01C0.0400\nT01\nX015000Y020000\nX030000Y040000\nM30\n");
        assert_eq!(img.info.unit, Unit::Inch);
        assert_eq!(img.format.x_int, 2);
        assert_eq!(img.format.x_dec, 4);
        let f = flashes(&img);
        assert_eq!(f.len(), 2);
        assert!((f[0].0 - 1.5).abs() < 1e-9);
        assert!((f[0].1 - 2.0).abs() < 1e-9);
        assert!((f[1].0 - 3.0).abs() < 1e-9);
        assert!((f[1].1 - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_basic_metric_file() {
        let img = parse_str(
            "M48\nMETRIC,TZ,000.000\nT01C0.300\nT02C0.800\n%\nT01\nX14.478Y10.541\nT02\nX15.000Y10.000\nM30\n",
        );
        assert_eq!(img.info.unit, Unit::Mm);
        let f = flashes(&img);
        assert_eq!(f.len(), 2);
        assert!((f[0].0 - 14.478 / 25.4).abs() < 1e-6);
        assert!((f[0].1 - 10.541 / 25.4).abs() < 1e-6);
        // 0.3 mm tool stored as inches.
        match img.apertures.get(&1).unwrap().shape {
            ApertureShape::Circle { diameter, .. } => {
                assert!((diameter - 0.3 / 25.4).abs() < 1e-9)
            }
            _ => panic!("expected circle"),
        }
    }

    #[test]
    fn test_m71_metric_body() {
        let img = parse_str("M48\nM71\nT01C0.500\n%\nT01\nX10.000Y20.000\nM30\n");
        let f = flashes(&img);
        assert!((f[0].0 - 10.0 / 25.4).abs() < 1e-6);
        assert!((f[0].1 - 20.0 / 25.4).abs() < 1e-6);
    }

    #[test]
    fn test_bbox_includes_tool_radius() {
        let img = parse_str("M48\nINCH\nT01C0.100\n%\nT01\nX1.000Y1.000\nM30\n");
        let b = &img.info.bbox;
        assert!((b.min_x - 0.95).abs() < 1e-9);
        assert!((b.max_x - 1.05).abs() < 1e-9);
    }

    #[test]
    fn test_g85_slot_single_draw_net() {
        let img = parse_str("M48\nINCH\nT01C0.040\n%\nT01\nX1.000Y1.000G85X2.000Y1.000\nM30\n");
        let slots: Vec<&Net> = img
            .nets
            .iter()
            .filter(|n| n.aperture_state == ApertureState::On)
            .collect();
        assert_eq!(slots.len(), 1);
        assert!((slots[0].start_x - 1.0).abs() < 1e-9);
        assert!((slots[0].stop_x - 2.0).abs() < 1e-9);
        assert!(flashes(&img).is_empty());
    }

    #[test]
    fn test_undefined_tool_synthesized() {
        let img = parse_str("M48\nINCH\n%\nT03\nX1.000Y1.000\nM30\n");
        match img.apertures.get(&3).unwrap().shape {
            ApertureShape::Circle { diameter, .. } => {
                // 0.016 + 0.008 * 3
                assert!((diameter - 0.040).abs() < 1e-9);
            }
            _ => panic!("expected circle"),
        }
    }

    #[test]
    fn test_t00_unload_accepted() {
        let img = parse_str("M48\nINCH\nT01C0.040\n%\nT01\nX1.000Y1.000\nT00\nM30\n");
        assert_eq!(flashes(&img).len(), 1);
        assert!(!img.apertures.contains_key(&0));
    }

    #[test]
    fn test_large_tool_mils_quirk() {
        let img = parse_str("M48\nINCH\nT01C125.0\n%\nT01\nX1.000Y1.000\nM30\n");
        match img.apertures.get(&1).unwrap().shape {
            ApertureShape::Circle { diameter, .. } => {
                assert!((diameter - 0.125).abs() < 1e-9)
            }
            _ => panic!("expected circle"),
        }
    }

    #[test]
    fn test_large_tool_quirk_disabled() {
        let opts = DrillOptions {
            large_tool_is_mils: false,
        };
        let img = parse_bytes(
            b"M48\nINCH\nT01C5.0\n%\nT01\nX1.000Y1.000\nM30\n",
            "test.drl",
            &opts,
        )
        .unwrap();
        match img.apertures.get(&1).unwrap().shape {
            ApertureShape::Circle { diameter, .. } => assert!((diameter - 5.0).abs() < 1e-9),
            _ => panic!("expected circle"),
        }
    }

    #[test]
    fn test_incremental_mode() {
        let img = parse_str("M48\nINCH\nICI,ON\nT01C0.040\n%\nT01\nX1.000Y1.000\nX1.000Y0.000\nM30\n");
        let f = flashes(&img);
        assert_eq!(f.len(), 2);
        assert!((f[1].0 - 2.0).abs() < 1e-9);
        assert!((f[1].1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_set_g93() {
        let img = parse_str("M48\nINCH\nT01C0.040\n%\nG93X1.000Y1.000\nT01\nX2.000Y2.000\nM30\n");
        let f = flashes(&img);
        assert_eq!(f.len(), 1);
        assert!((f[0].0 - 1.0).abs() < 1e-9);
        assert!((f[0].1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_modal_missing_axis() {
        let img = parse_str("M48\nINCH\nT01C0.040\n%\nT01\nX1.000Y2.000\nX3.000\nM30\n");
        let f = flashes(&img);
        assert!((f[1].0 - 3.0).abs() < 1e-9);
        assert!((f[1].1 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_comment_lines_ignored() {
        let img = parse_str("M48\n;this is a comment\nINCH\nT01C0.040\n%\nT01\nX1.000Y1.000\nM30\n");
        assert_eq!(flashes(&img).len(), 1);
    }

    #[test]
    fn test_write_drill_round_trip() {
        let src = "M48\nINCH\nT01C0.0400\nT02C0.1000\n%\nT01\nX1.000Y1.000\nX1.500Y1.000G85X2.500Y1.000\nT02\nX2.000Y2.000\nM30\n";
        let img = parse_str(src);
        let mut buf = Vec::new();
        write_drill(&mut buf, &img).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("M48\nINCH,TZ\n"));
        assert!(text.contains("T1C0.0400"));
        assert!(text.contains("G85"));
        assert!(text.trim_end().ends_with("M30"));

        let re = parse_bytes(&buf, "re.drl", &DrillOptions::default()).unwrap();
        let fa = flashes(&img);
        let fb = flashes(&re);
        assert_eq!(fa.len(), fb.len());
        for (a, b) in fa.iter().zip(fb.iter()) {
            assert!((a.0 - b.0).abs() < 1e-4);
            assert!((a.1 - b.1).abs() < 1e-4);
        }
    }
}
