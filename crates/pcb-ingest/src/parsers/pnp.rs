//! Pick-and-place tables: delimiter-separated CSV and Eagle partlist text.
//!
//! Each part becomes a flashed net at its centroid, labeled with the
//! designator and carrying a `.C` object attribute. Part outlines are
//! synthesized as rotated-rectangle macro apertures so downstream passes
//! see ordinary image-model geometry. Top and bottom sides produce separate
//! images with the side recorded as an image field.

use std::path::Path;

use log::warn;

use crate::error::IngestError;
use crate::reader::TextCursor;
use crate::types::{
    Aperture, ApertureShape, ApertureState, BoardSide, Image, Interpolation, LayerKind, MacroPrim,
    Net, Unit,
};

#[derive(Debug, Clone, Default)]
struct PnpPart {
    designator: String,
    footprint: String,
    mid_x: f64,
    mid_y: f64,
    pad_x: f64,
    pad_y: f64,
    rotation: f64,
    bottom: bool,
    comment: String,
}

/// Parse a pick-and-place file into a top image and, when any part sits on
/// the back side, a bottom image.
pub fn parse_file(path: &Path) -> Result<(Image, Option<Image>), IngestError> {
    let cursor = TextCursor::open(path)?;
    parse(cursor)
}

pub fn parse_bytes(data: &[u8], name: &str) -> Result<(Image, Option<Image>), IngestError> {
    let cursor = TextCursor::from_bytes_named(
        data.to_vec(),
        std::path::PathBuf::from("."),
        name.to_string(),
    );
    parse(cursor)
}

fn parse(mut fd: TextCursor) -> Result<(Image, Option<Image>), IngestError> {
    let file = fd.name().to_string();
    let mut lines = Vec::new();
    while let Some(line) = fd.read_line() {
        lines.push(line);
    }

    let parts = if looks_like_eagle(&lines) {
        parse_eagle(&lines, &file)?
    } else {
        parse_csv(&lines, &file)?
    };

    let mut top = new_pnp_image(BoardSide::Top);
    let mut bottom = new_pnp_image(BoardSide::Bottom);
    let mut have_bottom = false;

    for part in &parts {
        let image = if part.bottom {
            have_bottom = true;
            &mut bottom
        } else {
            &mut top
        };
        place_part(image, part);
    }

    Ok((top, have_bottom.then_some(bottom)))
}

fn new_pnp_image(side: BoardSide) -> Image {
    let mut image = Image::new(LayerKind::PickAndPlace);
    image.side = Some(side);
    image.info.unit = Unit::Inch;
    image
}

// ─── Part placement ──────────────────────────────────────────────────

/// Guess the body outline. `0805`-style packages on passives decode to
/// hundredths of an inch; otherwise the pad offset from the centroid gives
/// the extent; failing both, a small square.
fn guess_shape(part: &PnpPart) -> (f64, f64, f64) {
    if matches!(
        part.designator.chars().next(),
        Some('R' | 'L' | 'C' | 'D' | 'r' | 'l' | 'c' | 'd')
    ) {
        let f = part
            .footprint
            .trim_start_matches(|c: char| c.is_ascii_alphabetic());
        let digits: Vec<u32> = f.chars().filter_map(|c| c.to_digit(10)).collect();
        if digits.len() >= 4 {
            let length = (digits[0] * 10 + digits[1]) as f64 * 0.01;
            let width = (digits[2] * 10 + digits[3]) as f64 * 0.01;
            if length > 0.0 && width > 0.0 {
                return (length, width, part.rotation);
            }
        }
    }

    // Rotate the pad offset back to the part frame to get half extents.
    let dx = part.pad_x - part.mid_x;
    let dy = part.pad_y - part.mid_y;
    let r = (-part.rotation).to_radians();
    let tx = dx * r.cos() - dy * r.sin();
    let ty = dx * r.sin() + dy * r.cos();
    if tx.abs() > ty.abs() / 100.0 && ty.abs() > tx.abs() / 100.0 {
        (2.0 * tx.abs(), 2.0 * ty.abs(), part.rotation)
    } else {
        (0.015, 0.015, 0.0)
    }
}

fn place_part(image: &mut Image, part: &PnpPart) {
    let (length, width, rotation) = guess_shape(part);

    // One rotated-rectangle macro aperture per distinct outline.
    let tenths = |v: f64| (v * 10000.0).round() as i64;
    let name = format!(
        "BODY{}X{}R{}",
        tenths(length),
        tenths(width),
        rotation.rem_euclid(360.0).round() as i64
    );
    let code = image
        .apertures
        .iter()
        .find(|(_, ap)| matches!(&ap.shape, ApertureShape::Macro { name: n, .. } if *n == name))
        .map(|(&c, _)| c);
    let code = match code {
        Some(c) => c,
        None => {
            let mut ap = Aperture::new(ApertureShape::Macro {
                name: name.clone(),
                params: Vec::new(),
            });
            ap.simplified = vec![MacroPrim::Line21 {
                exposure: 1.0,
                width: length,
                height: width,
                center: (0.0, 0.0),
                rotation,
            }];
            let next = image.apertures.keys().next_back().map_or(10, |&c| c + 1);
            image.apertures.insert(next, ap);
            next
        }
    };

    let mut net = Net::new(0, 0);
    net.start_x = part.mid_x;
    net.start_y = part.mid_y;
    net.stop_x = part.mid_x;
    net.stop_y = part.mid_y;
    net.aperture = code;
    net.aperture_state = ApertureState::Flash;
    net.interpolation = Interpolation::Linear;
    net.label = Some(part.designator.clone());
    net.attrs.set(".C", &part.designator);
    if !part.comment.is_empty() {
        net.attrs.set("PnpComment", &part.comment);
    }
    image.push_net(net);
}

// ─── Unit-suffixed numbers ───────────────────────────────────────────

/// Parse "12.3", "12.3mm", "12.3 mil" into inches; bare numbers use the
/// default unit (mil when none declared). `None` for non-numeric text,
/// which is how header rows are told apart from data.
fn try_float_unit(s: &str, def_unit: &str) -> Option<f64> {
    let s = s.trim().trim_matches('"');
    let split = s
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(s.len());
    let value: f64 = s[..split].trim().parse().ok()?;
    let unit = if split < s.len() {
        s[split..].trim()
    } else {
        def_unit
    };
    Some(value * unit_to_inch(unit))
}

fn unit_to_inch(unit: &str) -> f64 {
    if unit.contains("mm") {
        1.0 / 25.4
    } else if unit.contains("in") {
        1.0
    } else if unit.contains("cmil") {
        1e-5
    } else if unit.contains("dmil") {
        1e-4
    } else if unit.contains("mil") {
        1e-3
    } else if unit.contains("km") {
        1000.0 * 1000.0 / 25.4
    } else if unit.contains("dm") {
        100.0 / 25.4
    } else if unit.contains("cm") {
        10.0 / 25.4
    } else if unit.contains("um") {
        1.0 / 25400.0
    } else if unit.contains("nm") {
        1.0 / 25400000.0
    } else if unit.contains('m') {
        1000.0 / 25.4
    } else {
        // Default unit is mil.
        1e-3
    }
}

// ─── CSV ─────────────────────────────────────────────────────────────

/// Pick the dominant delimiter of `| , ; :`, requiring at least `min`
/// occurrences.
fn screen_for_delimiter(line: &str, min: usize) -> Option<char> {
    let set = ['|', ',', ';', ':'];
    let mut counts = [0usize; 4];
    for c in line.chars() {
        if let Some(i) = set.iter().position(|d| *d == c) {
            counts[i] += 1;
        }
    }
    let (i, &max) = counts
        .iter()
        .enumerate()
        .max_by_key(|(_, c)| **c)
        .unwrap();
    (max > min).then(|| set[i])
}

/// Split one row on the delimiter, honoring double quotes.
fn split_row(line: &str, delim: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c == delim && !in_quotes => fields.push(std::mem::take(&mut cur)),
            c => cur.push(c),
        }
    }
    fields.push(cur);
    fields.iter().map(|f| f.trim().to_string()).collect()
}

fn parse_csv(lines: &[String], file: &str) -> Result<Vec<PnpPart>, IngestError> {
    let mut parts = Vec::new();
    let mut def_unit = String::new();
    let mut delim: Option<char> = None;
    let mut line_count = 0usize;

    for (idx, raw) in lines.iter().enumerate() {
        line_count += 1;
        let line = raw.trim_end();

        if let Some(rest) = line.strip_prefix("# X,Y in ") {
            def_unit = rest
                .trim_end_matches('.')
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_string();
            continue;
        }
        // The first line carries column names; '#' lines are comments.
        if idx == 0 || line.starts_with('#') {
            continue;
        }
        if line.len() <= 11 || line.starts_with('%') {
            continue;
        }
        // Gerber commands mean the sniffer was wrong about this file.
        if line.starts_with("G54 ") || line.starts_with("G04 ") {
            return Err(IngestError::parse(file, idx + 1, "not a pick-and-place file"));
        }

        let d = match delim {
            Some(d) => d,
            None => match screen_for_delimiter(line, 3) {
                Some(d) => {
                    delim = Some(d);
                    d
                }
                None => continue,
            },
        };
        let row = split_row(line, d);

        let mut part = PnpPart::default();
        if row.len() >= 9 && !row[0].is_empty() && !row[8].is_empty() {
            // Designator, footprint, mid/ref/pad pairs, layer, rotation,
            // comment. Non-numeric coordinates mean a header row.
            let (Some(mx), Some(my)) = (
                try_float_unit(&row[2], &def_unit),
                try_float_unit(&row[3], &def_unit),
            ) else {
                continue;
            };
            part.designator = row[0].clone();
            part.footprint = row[1].clone();
            part.mid_x = mx;
            part.mid_y = my;
            part.pad_x = try_float_unit(&row[6], &def_unit).unwrap_or(mx);
            part.pad_y = try_float_unit(&row[7], &def_unit).unwrap_or(my);
            part.bottom = row[8].to_lowercase().starts_with('b') || row[8] == "2";
            if let Some(rot) = row.get(9) {
                let Ok(r) = rot.trim().parse::<f64>() else {
                    return Err(IngestError::parse(file, idx + 1, "malformed rotation field"));
                };
                part.rotation = r;
            }
            if let Some(c) = row.get(10) {
                part.comment = c.clone();
            }
        } else if row.len() >= 7 && !row[0].is_empty() {
            // PcbXY layout: designator, footprint, value, x, y, rotation,
            // side.
            let (Some(mx), Some(my)) = (
                try_float_unit(&row[3], &def_unit),
                try_float_unit(&row[4], &def_unit),
            ) else {
                continue;
            };
            part.designator = row[0].clone();
            part.footprint = row[1].clone();
            part.mid_x = mx;
            part.mid_y = my;
            part.pad_x = part.mid_x + 0.03;
            part.pad_y = part.mid_y + 0.03;
            if part.mid_x.abs() < 0.001 && part.mid_y.abs() < 0.001 {
                continue;
            }
            let Ok(r) = row[5].trim().parse::<f64>() else {
                return Err(IngestError::parse(file, idx + 1, "malformed rotation field"));
            };
            part.rotation = r;
            part.bottom = row[6].to_lowercase().starts_with('b');
        } else {
            continue;
        }

        parts.push(part);
    }

    // Mostly-unparsed files are not pick-and-place data.
    if parts.is_empty() || (parts.len() as f64) / (line_count as f64) < 0.3 {
        return Err(IngestError::parse(
            file,
            line_count,
            "content does not look like pick-and-place data",
        ));
    }
    Ok(parts)
}

// ─── Eagle partlist ──────────────────────────────────────────────────

fn looks_like_eagle(lines: &[String]) -> bool {
    lines.iter().take(20).any(|l| {
        l.starts_with("Partlist") || l.contains("EAGLE Version")
    })
}

fn col_slice(line: &str, from: usize, to: usize) -> &str {
    let mut to = to.min(line.len());
    while to > 0 && !line.is_char_boundary(to) {
        to -= 1;
    }
    let mut from = from.min(to);
    while from > 0 && !line.is_char_boundary(from) {
        from -= 1;
    }
    line[from..to].trim()
}

struct EagleColumns {
    part: usize,
    package: usize,
    library: usize,
    position: usize,
    orientation: usize,
}

fn parse_eagle(lines: &[String], file: &str) -> Result<Vec<PnpPart>, IngestError> {
    let mut cols: Option<EagleColumns> = None;
    let mut unit = String::from("mil");
    let mut parts = Vec::new();

    for line in lines {
        if cols.is_none() {
            if line.len() < 20 {
                continue;
            }
            let find = |word: &str| line.find(word);
            if let (Some(part), Some(_value), Some(package), Some(library), Some(position), Some(orientation)) = (
                find("Part"),
                find("Value"),
                find("Package"),
                find("Library"),
                find("Position"),
                find("Orientation"),
            ) {
                // Units are declared in the Position header, e.g.
                // "Position (mil)".
                if let Some(open) = line[position..].find('(') {
                    let rest = &line[position + open + 1..];
                    if let Some(close) = rest.find(')') {
                        unit = rest[..close].trim().to_string();
                    }
                }
                cols = Some(EagleColumns {
                    part,
                    package,
                    library,
                    position,
                    orientation,
                });
            }
            continue;
        }

        let c = cols.as_ref().unwrap();
        if line.trim().is_empty() || line.len() <= c.position {
            continue;
        }

        let designator = col_slice(line, c.part, c.package)
            .split_whitespace()
            .next()
            .unwrap_or("");
        if designator.is_empty() {
            continue;
        }
        let footprint = col_slice(line, c.package, c.library)
            .split_whitespace()
            .next()
            .unwrap_or("");

        // Position field: "(x y)".
        let pos_text = col_slice(line, c.position, line.len());
        let Some(open) = pos_text.find('(') else {
            continue;
        };
        let Some(close) = pos_text.find(')') else {
            continue;
        };
        let mut coords = pos_text[open + 1..close].split_whitespace();
        let x: f64 = coords.next().and_then(|v| v.parse().ok()).unwrap_or(0.0);
        let y: f64 = coords.next().and_then(|v| v.parse().ok()).unwrap_or(0.0);

        let orient = col_slice(line, c.orientation, line.len());
        let bottom = orient.starts_with('M');
        let rotation: f64 = orient
            .trim_start_matches(['M', 'R'])
            .parse()
            .unwrap_or(0.0);

        let scale = unit_to_inch(&unit);
        let mut part = PnpPart {
            designator: designator.to_string(),
            footprint: footprint.to_string(),
            mid_x: x * scale,
            mid_y: y * scale,
            rotation,
            bottom,
            ..Default::default()
        };
        part.pad_x = part.mid_x + 0.03;
        part.pad_y = part.mid_y + 0.03;
        parts.push(part);
    }

    if parts.is_empty() {
        warn!("{file}: Eagle partlist contained no part rows");
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
Designator,Footprint,Mid X,Mid Y,Ref X,Ref Y,Pad X,Pad Y,Layer,Rotation,Comment
C1,0805,1000,2000,1000,2000,1030,2000,Top,90,100nF
R1,0603,1500,2500,1500,2500,1530,2500,Top,0,10k
R2,0603,1800,2500,1800,2500,1830,2500,Bottom,0,10k
";

    #[test]
    fn test_csv_split_sides() {
        let (top, bottom) = parse_bytes(CSV.as_bytes(), "pnp.csv").unwrap();
        assert_eq!(top.kind, LayerKind::PickAndPlace);
        assert_eq!(top.side, Some(BoardSide::Top));
        assert_eq!(top.nets.len(), 2);
        let bottom = bottom.expect("bottom side present");
        assert_eq!(bottom.side, Some(BoardSide::Bottom));
        assert_eq!(bottom.nets.len(), 1);
        assert_eq!(bottom.nets[0].label.as_deref(), Some("R2"));
    }

    #[test]
    fn test_csv_default_unit_is_mil() {
        let (top, _) = parse_bytes(CSV.as_bytes(), "pnp.csv").unwrap();
        // 1000 mil = 1 inch.
        assert!((top.nets[0].stop_x - 1.0).abs() < 1e-9);
        assert!((top.nets[0].stop_y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_csv_unit_header() {
        let src = "\
# X,Y in mm.
Designator,Footprint,Mid X,Mid Y,Ref X,Ref Y,Pad X,Pad Y,Layer,Rotation,Comment
C1,0805,25.4,50.8,25.4,50.8,26.0,50.8,Top,0,cap
";
        let (top, _) = parse_bytes(src.as_bytes(), "pnp.csv").unwrap();
        assert!((top.nets[0].stop_x - 1.0).abs() < 1e-9);
        assert!((top.nets[0].stop_y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_csv_inline_units_win() {
        let src = "\
Designator,Footprint,Mid X,Mid Y,Ref X,Ref Y,Pad X,Pad Y,Layer,Rotation,Comment
C1,0805,25.4mm,1000,25.4mm,1000,26mm,1000,Top,0,cap
";
        let (top, _) = parse_bytes(src.as_bytes(), "pnp.csv").unwrap();
        assert!((top.nets[0].stop_x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_part_outline_from_package_code() {
        let (top, _) = parse_bytes(CSV.as_bytes(), "pnp.csv").unwrap();
        // C1 is an 0805: body 0.08 x 0.05 inch, rotated 90.
        let ap = top.apertures.get(&top.nets[0].aperture).unwrap();
        match &ap.simplified[0] {
            MacroPrim::Line21 {
                width,
                height,
                rotation,
                ..
            } => {
                assert!((width - 0.08).abs() < 1e-9);
                assert!((height - 0.05).abs() < 1e-9);
                assert!((rotation - 90.0).abs() < 1e-9);
            }
            other => panic!("expected Line21, got {other:?}"),
        }
    }

    #[test]
    fn test_apertures_shared_for_same_outline() {
        let (top, _) = parse_bytes(CSV.as_bytes(), "pnp.csv").unwrap();
        // R1 (0603 R0) and C1 (0805 R90) differ; two apertures on top.
        assert_eq!(top.apertures.len(), 2);
    }

    #[test]
    fn test_designator_attribute() {
        let (top, _) = parse_bytes(CSV.as_bytes(), "pnp.csv").unwrap();
        assert_eq!(top.nets[0].attrs.get(".C"), Some("C1"));
        assert_eq!(top.nets[0].attrs.get("PnpComment"), Some("100nF"));
    }

    #[test]
    fn test_quoted_fields() {
        let src = "\
Designator,Footprint,Mid X,Mid Y,Ref X,Ref Y,Pad X,Pad Y,Layer,Rotation,Comment
\"C1\",\"0805\",1000,2000,1000,2000,1030,2000,\"Top\",90,\"10uF, 16V\"
R9,0402,1,2,1,2,2,3,Top,0,x
";
        let (top, _) = parse_bytes(src.as_bytes(), "pnp.csv").unwrap();
        assert_eq!(top.nets[0].attrs.get("PnpComment"), Some("10uF, 16V"));
    }

    #[test]
    fn test_not_pnp_rejected() {
        let src = "%FSLAX23Y23*%\n%MOIN*%\nM02*\n";
        assert!(parse_bytes(src.as_bytes(), "x.gbr").is_err());
    }

    #[test]
    fn test_gerber_comment_rejected() {
        let src = "header\nG04 this is gerber,with,commas,a,b,c,d,e,f,g,h*\n";
        assert!(parse_bytes(src.as_bytes(), "x.csv").is_err());
    }

    const EAGLE: &str = "\
Partlist exported from /home/user/board.brd

Exported from board.brd at 01.02.2024 10:00
EAGLE Version 9.7.0 Copyright (c) 1988-2024 Autodesk, Inc.

Part     Value          Package     Library     Position (mil)        Orientation
C1       100n           0805        rcl         (1000 2000)           R90
R1       10k            0603        rcl         (1500 2500)           MR180
";

    #[test]
    fn test_eagle_partlist() {
        let (top, bottom) = parse_bytes(EAGLE.as_bytes(), "board.txt").unwrap();
        assert_eq!(top.nets.len(), 1);
        assert_eq!(top.nets[0].label.as_deref(), Some("C1"));
        // mil positions.
        assert!((top.nets[0].stop_x - 1.0).abs() < 1e-9);
        assert!((top.nets[0].stop_y - 2.0).abs() < 1e-9);
        // The mirrored part lands on the bottom image.
        let bottom = bottom.expect("bottom side");
        assert_eq!(bottom.nets[0].label.as_deref(), Some("R1"));
    }
}
