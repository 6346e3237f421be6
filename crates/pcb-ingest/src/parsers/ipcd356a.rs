//! IPC-D-356A netlist/test-point files.
//!
//! A column-exact fixed-field format. Test-point records synthesize one
//! aperture per distinct feature signature; each record becomes a flashed
//! net carrying `.N` / `.P` / `.C` / `IPCLayer` object attributes, ready
//! for grafting onto Gerber geometry by the search engine.

use std::collections::HashMap;
use std::path::Path;

use log::warn;

use crate::error::IngestError;
use crate::reader::TextCursor;
use crate::types::{
    Aperture, ApertureShape, ApertureState, Image, Interpolation, LayerKind, Net, Unit,
    APERTURE_MAX,
};

#[derive(Debug, Clone)]
pub struct IpcOptions {
    /// Bitmap of layers to ingest: bit 0 for non-copper records, bit n for
    /// copper layer n.
    pub layers: u64,
    /// Whether 378 conductor records are parsed.
    pub include_tracks: bool,
    /// Label style: 'n' for none, anything else labels nets with the
    /// netname (or refdes-pin when there is no net).
    pub label: char,
}

impl Default for IpcOptions {
    fn default() -> Self {
        IpcOptions {
            layers: 0b11,
            include_tracks: false,
            label: 'n',
        }
    }
}

pub fn parse_file(path: &Path, opts: &IpcOptions) -> Result<Image, IngestError> {
    let cursor = TextCursor::open(path)?;
    parse(cursor, opts)
}

pub fn parse_bytes(data: &[u8], name: &str, opts: &IpcOptions) -> Result<Image, IngestError> {
    let cursor = TextCursor::from_bytes_named(
        data.to_vec(),
        std::path::PathBuf::from("."),
        name.to_string(),
    );
    parse(cursor, opts)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DrawState {
    Size,
    Move,
    Line,
}

struct IpcState {
    opts: IpcOptions,
    file: String,
    linenum: usize,

    /// Multiplier from integer file dimensions to inches.
    toinch: f64,
    todeg: f64,
    image_skip: bool,

    /// Netname alias resolution (`NNAMEn` → CAD name).
    netnames: HashMap<String, String>,

    /// Feature signature → aperture code.
    aperture_map: HashMap<String, usize>,
    next_code: usize,

    // Fields of the record being parsed.
    refdes: String,
    pin: String,
    hole_diam: f64,
    plating: char,
    access: u32,
    loc: (f64, f64),
    size: (f64, f64),
    given_y: bool,
    rot: i32,
    given_rot: bool,
    soldermask: u32,

    // Conductor / outline path state.
    draw_state: DrawState,
    draw_pos: (f64, f64),
    path_aperture: usize,
    path_netname: Option<String>,
    outline_type: String,
}

fn parse(mut fd: TextCursor, opts: &IpcOptions) -> Result<Image, IngestError> {
    let mut image = Image::new(LayerKind::Ipcd356a);
    image.info.unit = Unit::Inch;

    let mut st = IpcState {
        opts: opts.clone(),
        file: fd.name().to_string(),
        linenum: 0,
        toinch: 1.0 / 25400.0,
        todeg: 1.0,
        image_skip: false,
        netnames: HashMap::new(),
        aperture_map: HashMap::new(),
        next_code: 10,
        refdes: String::new(),
        pin: String::new(),
        hole_diam: 0.0,
        plating: ' ',
        access: 0,
        loc: (0.0, 0.0),
        size: (0.0, 0.0),
        given_y: false,
        rot: 0,
        given_rot: false,
        soldermask: 0,
        draw_state: DrawState::Size,
        draw_pos: (0.0, 0.0),
        path_aperture: 0,
        path_netname: None,
        outline_type: String::new(),
    };

    let mut accum_378 = false;
    let mut accum_389 = false;

    while let Some(raw) = fd.read_line() {
        st.linenum += 1;
        let line: String = raw.trim_end().to_uppercase();
        if line.len() < 3 || line.starts_with('C') {
            continue;
        }
        if line.len() > 80 {
            // Oversized lines are not valid IPC records.
            continue;
        }

        if line.starts_with("P  ") {
            parse_header(&mut st, &line)?;
            continue;
        }
        if st.image_skip {
            continue;
        }

        if accum_389 {
            accum_389 = line.starts_with("089") && parse_outline(&mut st, &mut image, &line, false);
            if line.starts_with("089") {
                continue;
            }
        } else if accum_378 {
            accum_378 =
                line.starts_with("078") && parse_conductor(&mut st, &mut image, &line, false);
            if line.starts_with("078") {
                continue;
            }
        }

        // 017/027 continuation records carry the same layout as 317/327.
        if (line.starts_with("317") || line.starts_with("017")) && line.len() >= 74 {
            parse_test_point(&mut st, &mut image, &line, false);
        } else if (line.starts_with("327") || line.starts_with("027")) && line.len() >= 74 {
            parse_test_point(&mut st, &mut image, &line, true);
        } else if st.opts.layers & 1 != 0 && line.starts_with("389") {
            accum_389 = parse_outline(&mut st, &mut image, &line, true);
        } else if st.opts.include_tracks && line.starts_with("378") {
            accum_378 = parse_conductor(&mut st, &mut image, &line, true);
        }
    }

    image.attrs.set(".FileFunction", "Other,IPC-D-356A");
    Ok(image)
}

// ─── Header records ──────────────────────────────────────────────────

fn parse_header(st: &mut IpcState, line: &str) -> Result<(), IngestError> {
    let body = line[3..].trim_start();
    if let Some(rest) = body.strip_prefix("UNITS") {
        let mut fields = rest.split_whitespace();
        let system = fields.next().unwrap_or("");
        let variant = fields.next().unwrap_or("");
        match (system, variant) {
            ("SI", _) | ("CUST", "1") => {
                st.toinch = 1.0 / 25400.0;
                st.todeg = 1.0;
            }
            ("CUST", "2") => {
                return Err(IngestError::parse(
                    st.file.as_str(),
                    st.linenum,
                    "IPC-D-356A CUST 2 (radian) units are not supported",
                ));
            }
            ("CUST", _) => {
                st.toinch = 1.0 / 10000.0;
                st.todeg = 1.0;
            }
            _ => {}
        }
    } else if let Some(rest) = body.strip_prefix("IMAGE") {
        st.image_skip = rest.trim() != "PRIMARY";
    } else if let Some(rest) = body.strip_prefix("NNAME") {
        // Alias record: cols 9-13 hold the alias suffix, the remainder is
        // the full CAD netname.
        let mut fields = rest.splitn(2, char::is_whitespace);
        let suffix = fields.next().unwrap_or("");
        let full = fields.next().unwrap_or("").trim();
        if !suffix.is_empty() && !full.is_empty() {
            st.netnames
                .insert(format!("NNAME{suffix}"), full.to_string());
        }
    } else if let Some(rest) = body.strip_prefix("VER") {
        let ver = rest.trim();
        if !ver.starts_with("IPC-D-356") {
            warn!("{}:{}: unexpected version {ver:?}", st.file, st.linenum);
        }
    }
    // JOB, TITLE, NUM, REV and unknown parameters need no action.
    Ok(())
}

// ─── Fixed-column helpers ────────────────────────────────────────────

fn fixed_int(line: &str, col: usize, len: usize) -> u32 {
    line.as_bytes()
        .iter()
        .skip(col)
        .take(len)
        .filter(|b| b.is_ascii_digit())
        .fold(0u32, |v, b| v * 10 + (b - b'0') as u32)
}

fn signed_fixed_int(line: &str, col: usize, len: usize) -> i64 {
    let sign = if line.as_bytes().get(col) == Some(&b'-') {
        -1
    } else {
        1
    };
    fixed_int(line, col + 1, len - 1) as i64 * sign
}

fn char_at(line: &str, col: usize) -> char {
    line.as_bytes().get(col).copied().unwrap_or(b' ') as char
}

fn field(line: &str, col: usize, len: usize) -> String {
    line.chars()
        .skip(col)
        .take(len)
        .collect::<String>()
        .trim_end()
        .to_string()
}

// ─── Netnames ────────────────────────────────────────────────────────

/// Resolve the netname field (cols 4-17): aliases map to CAD names, `N/C`
/// and blank resolve to nothing.
fn register_netname(st: &mut IpcState, line: &str) -> Option<String> {
    let alias = field(line, 3, 14);
    let alias = alias.split_whitespace().next().unwrap_or("").to_string();
    if alias.is_empty() || alias == "N/C" {
        return None;
    }
    if let Some(full) = st.netnames.get(&alias) {
        return Some(full.clone());
    }
    st.netnames.insert(alias.clone(), alias.clone());
    Some(alias)
}

// ─── Aperture synthesis ──────────────────────────────────────────────

/// Canonical signature for a feature: record class, hole, plating, access,
/// soldermask, dimensions in tenths of mils, rotation mod 180.
fn aperture_key(st: &IpcState, rectype: u32) -> String {
    let tenths = |v: f64| (v * 10000.0).round() as i64;
    let mut key = match rectype {
        327 => format!("2A{}S{}X{}", st.access, st.soldermask, tenths(st.size.0)),
        317 => format!(
            "1{}D{}{}A{}S{}X{}",
            if st.refdes == "VIA" { 'V' } else { 'C' },
            tenths(st.hole_diam),
            st.plating,
            st.access,
            st.soldermask,
            tenths(st.size.0)
        ),
        389 => format!(
            "8{}X{}",
            st.outline_type.chars().next().unwrap_or('O'),
            tenths(st.size.0)
        ),
        _ => format!("7X{}", tenths(st.size.0)),
    };
    if st.given_y {
        key.push_str(&format!("Y{}", tenths(st.size.1)));
    }
    if st.rot != 0 {
        key.push_str(&format!("R{}", st.rot));
    }
    key
}

fn register_aperture(st: &mut IpcState, image: &mut Image, rectype: u32) -> usize {
    let key = aperture_key(st, rectype);
    if let Some(&code) = st.aperture_map.get(&key) {
        return code;
    }

    let mut size_x = st.size.0;
    let mut size_y = if st.given_y { st.size.1 } else { st.size.0 };
    let mut rectangular = st.given_y;

    if st.given_rot && st.rot != 0 && st.rot != 90 {
        // Arbitrary rotations would need a macro aperture; fall back to a
        // round pad of the minimum dimension.
        rectangular = false;
        if st.given_y && st.size.1 < st.size.0 {
            size_x = st.size.1;
        }
    } else if rectangular && st.rot == 90 {
        std::mem::swap(&mut size_x, &mut size_y);
    }

    // Keep a visible annular ring: pad the feature to 125 % of the hole.
    let hole = (st.hole_diam > 0.0).then_some(st.hole_diam);
    if let Some(h) = hole {
        let min_annular = h * 1.25;
        if size_x < min_annular {
            size_x = min_annular;
        }
        if size_y < min_annular {
            size_y = min_annular;
        }
    }

    let mut ap = if rectangular {
        Aperture::new(ApertureShape::Rectangle {
            x_size: size_x,
            y_size: size_y,
            hole,
        })
    } else {
        Aperture::new(ApertureShape::Circle {
            diameter: size_x,
            hole,
        })
    };

    let function = match key.as_bytes() {
        [b'2', ..] => "SMDPad",
        [b'1', b'V', ..] => "ViaPad",
        [b'8', b'B', ..] => "Profile",
        [b'8', b'P', ..] => "Other,PanelEdge",
        [b'8', b'S', ..] => "Other,ScoringLine",
        [b'8', ..] => "Other,OtherFab",
        [b'7', ..] => "Conductor",
        _ => "ComponentPad,CuDef",
    };
    ap.attrs.set(".AperFunction", function);
    if matches!(key.as_bytes().first(), Some(b'1') | Some(b'2') | Some(b'7')) {
        ap.attrs.set("IPCAccess", &st.access.to_string());
        if st.plating != ' ' && !key.starts_with('7') {
            ap.attrs.set("IPCPlating", &st.plating.to_string());
        }
    }

    if st.next_code > APERTURE_MAX {
        warn!("{}: more than {APERTURE_MAX} apertures required", st.file);
        st.next_code = APERTURE_MAX;
    }
    let code = st.next_code;
    st.next_code += 1;
    st.aperture_map.insert(key, code);
    image.apertures.insert(code, ap);
    code
}

// ─── Test-point records ──────────────────────────────────────────────

fn parse_test_point(st: &mut IpcState, image: &mut Image, line: &str, smd: bool) {
    let netname = register_netname(st, line);

    st.refdes = field(line, 20, 6);
    st.pin = field(line, 27, 4);
    st.hole_diam = 0.0;
    st.plating = ' ';
    if !smd && char_at(line, 32) == 'D' {
        st.hole_diam = st.toinch * fixed_int(line, 33, 4) as f64;
        st.plating = char_at(line, 37);
    }
    st.access = 0;
    if char_at(line, 38) == 'A' {
        st.access = fixed_int(line, 39, 2);
    }
    let layer_bit = if st.access == 0 { 1 } else { st.access };
    if layer_bit >= 64 || st.opts.layers & (1u64 << layer_bit) == 0 {
        return;
    }

    st.loc = (
        st.toinch * signed_fixed_int(line, 42, 7) as f64,
        st.toinch * signed_fixed_int(line, 50, 7) as f64,
    );
    st.size = (0.0, 0.0);
    if char_at(line, 57) == 'X' {
        st.size.0 = st.toinch * fixed_int(line, 58, 4) as f64;
    }
    st.size.1 = st.size.0;
    st.given_y = false;
    if char_at(line, 62) == 'Y' {
        st.size.1 = st.toinch * fixed_int(line, 63, 4) as f64;
        st.given_y = true;
    }
    st.rot = 0;
    st.given_rot = false;
    if char_at(line, 67) == 'R' {
        // Features are round or bilaterally symmetric, so rotation only
        // matters mod 180.
        st.rot = ((st.todeg * fixed_int(line, 68, 3) as f64).round() as i32) % 180;
        st.given_rot = true;
    }
    st.soldermask = 0;
    if char_at(line, 72) == 'S' {
        st.soldermask = fixed_int(line, 73, 1);
    }

    let code = register_aperture(st, image, if smd { 327 } else { 317 });

    let mut net = Net::new(0, 0);
    net.start_x = st.loc.0;
    net.start_y = st.loc.1;
    net.stop_x = st.loc.0;
    net.stop_y = st.loc.1;
    net.aperture = code;
    net.aperture_state = ApertureState::Flash;
    net.interpolation = Interpolation::Linear;

    net.attrs.set("IPCLayer", &st.access.to_string());
    if let Some(name) = &netname {
        net.attrs.set(".N", name);
    }
    if !st.refdes.is_empty() && st.refdes != "NOREF" && st.refdes != "VIA" {
        net.attrs.set(".C", &st.refdes);
        if !st.pin.is_empty() && st.pin != "NPIN" {
            let pin = st.pin.trim_start_matches('-');
            net.attrs.set(".P", &format!("{},{}", st.refdes, pin));
        }
    }
    if st.opts.label != 'n' {
        net.label = netname.or_else(|| {
            (!st.refdes.is_empty() && st.refdes != "VIA").then(|| st.refdes.clone())
        });
    }

    image.push_net(net);
}

// ─── Conductors and outlines ─────────────────────────────────────────

fn read_keyed(p: &mut &str, key: char, toinch: f64) -> Option<f64> {
    let bytes = p.as_bytes();
    if bytes.first() != Some(&(key as u8)) {
        return None;
    }
    let mut i = 1;
    let mut v: u64 = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        v = v * 10 + (bytes[i] - b'0') as u64;
        i += 1;
    }
    if i == 1 {
        return None;
    }
    *p = &p[i..];
    Some(v as f64 * toinch)
}

/// Shared path walker for 378 conductor and 389 outline records. Returns
/// whether a continuation record may follow.
fn parse_path(st: &mut IpcState, image: &mut Image, mut p: &str, rectype: u32) -> bool {
    p = p.trim_start();
    while !p.is_empty() {
        match st.draw_state {
            DrawState::Size => {
                let Some(sx) = read_keyed(&mut p, 'X', st.toinch) else {
                    return false;
                };
                let sy = read_keyed(&mut p, 'Y', st.toinch);
                st.given_y = sy.is_some();
                st.size = (sx, sy.unwrap_or(sx));
                st.rot = 0;
                st.given_rot = false;
                st.hole_diam = 0.0;
                st.path_aperture = register_aperture(st, image, rectype);
                st.draw_state = DrawState::Move;
            }
            DrawState::Move => {
                let Some(x) = read_keyed(&mut p, 'X', st.toinch) else {
                    return false;
                };
                let Some(y) = read_keyed(&mut p, 'Y', st.toinch) else {
                    return false;
                };
                st.loc = (x, y);
                if !p.starts_with('*') {
                    st.draw_state = DrawState::Line;
                }
            }
            DrawState::Line => {
                let x = read_keyed(&mut p, 'X', st.toinch);
                let y = read_keyed(&mut p, 'Y', st.toinch);
                if x.is_none() && y.is_none() {
                    return false;
                }
                // Missing coordinates are modal.
                st.draw_pos = (x.unwrap_or(st.loc.0), y.unwrap_or(st.loc.1));

                let mut net = Net::new(0, 0);
                net.start_x = st.loc.0;
                net.start_y = st.loc.1;
                net.stop_x = st.draw_pos.0;
                net.stop_y = st.draw_pos.1;
                net.aperture = st.path_aperture;
                net.aperture_state = ApertureState::On;
                net.interpolation = Interpolation::Linear;
                if st.access != 0 {
                    net.attrs.set("IPCLayer", &st.access.to_string());
                }
                if let Some(name) = &st.path_netname {
                    net.attrs.set(".N", name);
                }
                image.push_net(net);

                st.loc = st.draw_pos;
                if p.starts_with('*') {
                    st.draw_state = DrawState::Move;
                    p = &p[1..];
                }
            }
        }
        p = p.trim_start();
    }
    true
}

fn parse_conductor(st: &mut IpcState, image: &mut Image, line: &str, start: bool) -> bool {
    if start {
        if line.len() < 24 {
            return false;
        }
        st.path_netname = register_netname(st, line);
        st.access = 0;
        if char_at(line, 18) == 'L' {
            st.access = fixed_int(line, 19, 2);
        }
        if st.access >= 64 || st.opts.layers & (1u64 << st.access) == 0 {
            return false;
        }
        st.draw_state = DrawState::Size;
        let p = &line[22.min(line.len())..];
        return parse_path(st, image, p, 378);
    }
    parse_path(st, image, &line[3..], 378)
}

fn parse_outline(st: &mut IpcState, image: &mut Image, line: &str, start: bool) -> bool {
    if start {
        if line.len() < 24 {
            return false;
        }
        st.outline_type = field(line, 3, 14)
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        match st.outline_type.as_str() {
            "BOARD_EDGE" | "PANEL_EDGE" | "SCORE_LINE" | "OTHER_FAB" => {}
            _ => return false,
        }
        st.path_netname = None;
        st.access = 0;
        st.draw_state = DrawState::Size;
        let p = line[3..].trim_start_matches(|c: char| !c.is_whitespace());
        return parse_path(st, image, p, 389);
    }
    parse_path(st, image, &line[3..], 389)
}
