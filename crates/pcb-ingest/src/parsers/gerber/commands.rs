//! Token stream to command sequence for RS-274-X.

use log::warn;

use crate::attrs::AttrScope;
use crate::error::IngestError;
use crate::types::{
    ApertureShape, AxisSelect, CoordMode, Format, Interpolation, LayerPolarity, OmitZeros,
    Polarity, Unit,
};

use super::coord::CoordLit;
use super::lexer::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Justify {
    Center,
    LowerLeft(f64),
}

/// A fully parsed Gerber command.
#[derive(Debug, Clone, PartialEq)]
pub enum GerberCommand {
    /// %FS - format specification
    FormatSpec(Format),
    /// %MO (or G70/G71) - unit mode
    Units(Unit),
    /// %AD - aperture definition
    ApertureDefine { code: usize, shape: ApertureShape },
    /// %AM - aperture macro definition; body lines kept raw
    MacroDefine { name: String, body: Vec<String> },
    /// Dnn (n >= 10) - select aperture (also via legacy G54)
    SelectAperture(usize),
    /// An X/Y/I/J word with an optional D01/D02/D03; a missing D-code
    /// reuses the previous operation (modal).
    Operation {
        x: Option<CoordLit>,
        y: Option<CoordLit>,
        i: Option<CoordLit>,
        j: Option<CoordLit>,
        op: Option<u8>,
    },
    /// G01/G02/G03/G10/G11/G12
    SetInterpolation(Interpolation),
    /// G36 / G37
    RegionStart,
    RegionEnd,
    /// G74 / G75
    QuadrantMode { multi: bool },
    /// G90 / G91
    SetCoordMode(CoordMode),
    /// %LP
    LayerPolarity(LayerPolarity),
    /// %LN
    LayerName(String),
    /// %LR - degrees CCW, starts a new layer
    LayerRotation(f64),
    /// %SR
    StepRepeat {
        x_repeat: u32,
        y_repeat: u32,
        /// Steps in file units.
        x_step: f64,
        y_step: f64,
    },
    /// %IP
    ImagePolarity(Polarity),
    /// %IR - degrees CCW
    ImageRotation(f64),
    /// %OF - netstate offsets in file units
    Offset { a: Option<f64>, b: Option<f64> },
    /// %MI
    Mirror { a: bool, b: bool },
    /// %SF
    ScaleFactor { a: f64, b: f64 },
    /// %AS
    AxisSelect(AxisSelect),
    /// %IJ
    ImageJustify {
        a: Option<Justify>,
        b: Option<Justify>,
    },
    /// %IO - justify offsets in file units
    ImageOffset { a: f64, b: f64 },
    /// %IN
    ImageName(String),
    /// %PF
    PlotterFilm(String),
    /// %IF - include file, resolved relative to the including file
    IncludeFile(String),
    /// %TF / %TA / %TO / %TD - raw body after the scope letter
    Attribute { scope: AttrScope, body: String },
    /// M00 / M01
    OptionalStop,
    /// M02
    EndOfFile,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocatedCommand {
    pub cmd: GerberCommand,
    pub line: usize,
}

/// Parse a token stream into commands. Unknown words/extended commands are
/// recoverable: a warning is logged and the record skipped.
pub fn parse_commands(tokens: &[Token], file: &str) -> Result<Vec<LocatedCommand>, IngestError> {
    let mut commands = Vec::new();
    let mut macro_name: Option<(String, usize)> = None;
    let mut macro_body: Vec<String> = Vec::new();

    let mut flush_macro =
        |name: &mut Option<(String, usize)>, body: &mut Vec<String>, out: &mut Vec<LocatedCommand>| {
            if let Some((n, line)) = name.take() {
                out.push(LocatedCommand {
                    cmd: GerberCommand::MacroDefine {
                        name: n,
                        body: std::mem::take(body),
                    },
                    line,
                });
            }
        };

    for token in tokens {
        match &token.kind {
            TokenKind::Extended(content) => {
                if let Some(rest) = content.strip_prefix("AM") {
                    if !rest.is_empty() {
                        flush_macro(&mut macro_name, &mut macro_body, &mut commands);
                        macro_name = Some((rest.to_string(), token.line));
                        macro_body.clear();
                        continue;
                    }
                }
                if macro_name.is_some() {
                    // Primitive and variable-assignment records continue the
                    // open macro; anything else closes it.
                    let t = content.trim();
                    if t.starts_with(|c: char| c.is_ascii_digit()) || t.starts_with('$') {
                        macro_body.push(t.to_string());
                        continue;
                    }
                    flush_macro(&mut macro_name, &mut macro_body, &mut commands);
                }
                match parse_extended(content, file, token.line)? {
                    Some(cmd) => commands.push(LocatedCommand {
                        cmd,
                        line: token.line,
                    }),
                    None => {}
                }
            }
            TokenKind::Word(word) => {
                flush_macro(&mut macro_name, &mut macro_body, &mut commands);
                for cmd in parse_word(word, file, token.line)? {
                    commands.push(LocatedCommand {
                        cmd,
                        line: token.line,
                    });
                }
            }
        }
    }
    flush_macro(&mut macro_name, &mut macro_body, &mut commands);

    Ok(commands)
}

// ─── Extended commands ───────────────────────────────────────────────

fn parse_extended(
    content: &str,
    file: &str,
    line: usize,
) -> Result<Option<GerberCommand>, IngestError> {
    if !content.is_char_boundary(content.len().min(2)) {
        warn!("{file}:{line}: non-ASCII extended command %{content}%");
        return Ok(None);
    }
    let (head, rest) = content.split_at(content.len().min(2));
    match head {
        "FS" => parse_format_spec(rest, file, line).map(Some),
        "MO" => match rest {
            "IN" => Ok(Some(GerberCommand::Units(Unit::Inch))),
            "MM" => Ok(Some(GerberCommand::Units(Unit::Mm))),
            _ => {
                warn!("{file}:{line}: unknown unit mode %MO{rest}%");
                Ok(None)
            }
        },
        "AD" => parse_aperture_define(rest, file, line),
        "LP" => match rest {
            "D" => Ok(Some(GerberCommand::LayerPolarity(LayerPolarity::Dark))),
            "C" => Ok(Some(GerberCommand::LayerPolarity(LayerPolarity::Clear))),
            _ => {
                warn!("{file}:{line}: unknown layer polarity %LP{rest}%");
                Ok(None)
            }
        },
        "LN" => Ok(Some(GerberCommand::LayerName(rest.to_string()))),
        "LR" => match rest.parse::<f64>() {
            Ok(deg) => Ok(Some(GerberCommand::LayerRotation(deg))),
            Err(_) => {
                warn!("{file}:{line}: bad layer rotation %LR{rest}%");
                Ok(None)
            }
        },
        "SR" => Ok(Some(parse_step_repeat(rest))),
        "IP" => match rest {
            "POS" => Ok(Some(GerberCommand::ImagePolarity(Polarity::Positive))),
            "NEG" => Ok(Some(GerberCommand::ImagePolarity(Polarity::Negative))),
            _ => {
                warn!("{file}:{line}: unknown image polarity %IP{rest}%");
                Ok(None)
            }
        },
        "IR" => match rest.parse::<f64>() {
            Ok(deg) => Ok(Some(GerberCommand::ImageRotation(deg))),
            Err(_) => {
                warn!("{file}:{line}: bad image rotation %IR{rest}%");
                Ok(None)
            }
        },
        "OF" => Ok(Some(GerberCommand::Offset {
            a: scan_keyed_float(rest, 'A'),
            b: scan_keyed_float(rest, 'B'),
        })),
        "MI" => Ok(Some(GerberCommand::Mirror {
            a: scan_keyed_flag(rest, 'A'),
            b: scan_keyed_flag(rest, 'B'),
        })),
        "SF" => Ok(Some(GerberCommand::ScaleFactor {
            a: scan_keyed_float(rest, 'A').unwrap_or(1.0),
            b: scan_keyed_float(rest, 'B').unwrap_or(1.0),
        })),
        "AS" => match rest {
            "AXBY" => Ok(Some(GerberCommand::AxisSelect(AxisSelect::NoSelect))),
            "AYBX" => Ok(Some(GerberCommand::AxisSelect(AxisSelect::SwapAB))),
            _ => {
                warn!("{file}:{line}: unknown axis select %AS{rest}%");
                Ok(None)
            }
        },
        "IJ" => Ok(Some(parse_image_justify(rest))),
        "IO" => Ok(Some(GerberCommand::ImageOffset {
            a: scan_keyed_float(rest, 'A').unwrap_or(0.0),
            b: scan_keyed_float(rest, 'B').unwrap_or(0.0),
        })),
        "IN" => Ok(Some(GerberCommand::ImageName(rest.to_string()))),
        "PF" => Ok(Some(GerberCommand::PlotterFilm(rest.to_string()))),
        "IF" => Ok(Some(GerberCommand::IncludeFile(rest.to_string()))),
        "TF" => Ok(Some(GerberCommand::Attribute {
            scope: AttrScope::File,
            body: rest.to_string(),
        })),
        "TA" => Ok(Some(GerberCommand::Attribute {
            scope: AttrScope::Aperture,
            body: rest.to_string(),
        })),
        "TO" => Ok(Some(GerberCommand::Attribute {
            scope: AttrScope::Object,
            body: rest.to_string(),
        })),
        "TD" => Ok(Some(GerberCommand::Attribute {
            scope: AttrScope::Delete,
            body: rest.to_string(),
        })),
        _ => {
            warn!("{file}:{line}: unknown extended command %{content}%");
            Ok(None)
        }
    }
}

/// `FSLAX23Y23`: omit-zero letter, coordinate-mode letter, then digit pairs.
/// A malformed format specification is fatal for the file.
fn parse_format_spec(s: &str, file: &str, line: usize) -> Result<GerberCommand, IngestError> {
    let mut fmt = Format::default();
    let mut chars = s.chars().peekable();

    loop {
        match chars.peek() {
            Some('L') => {
                fmt.omit_zeros = OmitZeros::Leading;
                chars.next();
            }
            Some('T') => {
                fmt.omit_zeros = OmitZeros::Trailing;
                chars.next();
            }
            Some('D') => {
                fmt.omit_zeros = OmitZeros::Explicit;
                chars.next();
            }
            Some('A') => {
                fmt.coord_mode = CoordMode::Absolute;
                chars.next();
            }
            Some('I') => {
                fmt.coord_mode = CoordMode::Incremental;
                chars.next();
            }
            // N/G/D/M sequence-number options are obsolete; skip the letter
            // and its digit.
            Some('N') | Some('G') | Some('M') => {
                chars.next();
                chars.next();
            }
            _ => break,
        }
    }

    let mut got_x = false;
    let mut got_y = false;
    while let Some(c) = chars.next() {
        match c {
            'X' | 'Y' => {
                let int_d = chars
                    .next()
                    .and_then(|d| d.to_digit(10))
                    .ok_or_else(|| fatal_fs(file, line, s))? as u8;
                let dec_d = chars
                    .next()
                    .and_then(|d| d.to_digit(10))
                    .ok_or_else(|| fatal_fs(file, line, s))? as u8;
                if c == 'X' {
                    fmt.x_int = int_d;
                    fmt.x_dec = dec_d;
                    got_x = true;
                } else {
                    fmt.y_int = int_d;
                    fmt.y_dec = dec_d;
                    got_y = true;
                }
            }
            _ => {}
        }
    }
    if !got_x || !got_y {
        return Err(fatal_fs(file, line, s));
    }
    Ok(GerberCommand::FormatSpec(fmt))
}

fn fatal_fs(file: &str, line: usize, s: &str) -> IngestError {
    IngestError::FormatError {
        file: file.to_string(),
        msg: format!("malformed %FS{s}% at line {line}"),
    }
}

/// `ADD10C,0.020` / `ADD11R,0.040X0.020X0.010` / `ADD22BOX,0.1X0.2`.
fn parse_aperture_define(
    s: &str,
    file: &str,
    line: usize,
) -> Result<Option<GerberCommand>, IngestError> {
    let recover = |msg: String| {
        warn!("{file}:{line}: {msg}");
        Ok(None)
    };

    let Some(s) = s.strip_prefix('D') else {
        return recover(format!("aperture definition missing D: %AD{s}%"));
    };
    let code_end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let Ok(code) = s[..code_end].parse::<usize>() else {
        return recover(format!("bad aperture code in %ADD{s}%"));
    };
    if code < 10 {
        return recover(format!("aperture code D{code} is reserved"));
    }
    let rest = &s[code_end..];
    if rest.is_empty() {
        return recover(format!("aperture D{code} has no template"));
    }

    let (name, params_str) = match rest.find(',') {
        Some(i) => (&rest[..i], &rest[i + 1..]),
        None => (rest, ""),
    };
    let params: Vec<f64> = if params_str.is_empty() {
        Vec::new()
    } else {
        let mut out = Vec::new();
        for p in params_str.split('X') {
            match p.trim().parse::<f64>() {
                Ok(v) => out.push(v),
                Err(_) => return recover(format!("bad parameter {p:?} in %ADD{s}%")),
            }
        }
        out
    };

    let shape = match name {
        "C" => {
            let Some(&d) = params.first() else {
                return recover(format!("circle aperture D{code} missing diameter"));
            };
            ApertureShape::Circle {
                diameter: d,
                // A rectangular hole (two params) collapses to its X dimension.
                hole: params.get(1).copied().filter(|h| *h > 0.0),
            }
        }
        "R" | "O" => {
            if params.len() < 2 {
                return recover(format!("aperture D{code} needs width and height"));
            }
            let hole = params.get(2).copied().filter(|h| *h > 0.0);
            if name == "R" {
                ApertureShape::Rectangle {
                    x_size: params[0],
                    y_size: params[1],
                    hole,
                }
            } else {
                ApertureShape::Oval {
                    x_size: params[0],
                    y_size: params[1],
                    hole,
                }
            }
        }
        "P" => {
            if params.len() < 2 {
                return recover(format!("polygon aperture D{code} needs diameter and sides"));
            }
            ApertureShape::Polygon {
                diameter: params[0],
                sides: params[1] as u32,
                rotation: params.get(2).copied().unwrap_or(0.0),
                hole: params.get(3).copied().filter(|h| *h > 0.0),
            }
        }
        _ => ApertureShape::Macro {
            name: name.to_string(),
            params,
        },
    };

    Ok(Some(GerberCommand::ApertureDefine { code, shape }))
}

/// `SRX3Y2I5.0J10.0`, or bare `SR` which closes the open block.
fn parse_step_repeat(s: &str) -> GerberCommand {
    GerberCommand::StepRepeat {
        x_repeat: scan_keyed_float(s, 'X').map(|v| v as u32).unwrap_or(1),
        y_repeat: scan_keyed_float(s, 'Y').map(|v| v as u32).unwrap_or(1),
        x_step: scan_keyed_float(s, 'I').unwrap_or(0.0),
        y_step: scan_keyed_float(s, 'J').unwrap_or(0.0),
    }
}

/// `IJA[C|<offset>]B[C|<offset>]`.
fn parse_image_justify(s: &str) -> GerberCommand {
    let parse_one = |key: char| -> Option<Justify> {
        let pos = s.find(key)?;
        let after = &s[pos + 1..];
        if after.starts_with('C') {
            Some(Justify::Center)
        } else {
            let end = after
                .find(|c: char| c.is_ascii_alphabetic())
                .unwrap_or(after.len());
            Some(Justify::LowerLeft(after[..end].parse().unwrap_or(0.0)))
        }
    };
    GerberCommand::ImageJustify {
        a: parse_one('A'),
        b: parse_one('B'),
    }
}

/// Float after a key letter in an `A<val>B<val>`-style parameter string.
fn scan_keyed_float(s: &str, key: char) -> Option<f64> {
    let pos = s.find(key)?;
    let after = &s[pos + 1..];
    let end = after
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(after.len());
    after[..end].parse().ok()
}

fn scan_keyed_flag(s: &str, key: char) -> bool {
    s.find(key)
        .and_then(|p| s[p + 1..].chars().next())
        .map(|c| c == '1')
        .unwrap_or(false)
}

// ─── Word commands ───────────────────────────────────────────────────

/// Parse one `*`-terminated word. A word may chain a G-code prefix with a
/// coordinate/D-code body (`G01X100Y200D01`).
fn parse_word(word: &str, file: &str, line: usize) -> Result<Vec<GerberCommand>, IngestError> {
    let mut commands = Vec::new();
    let mut rest = word;

    while let Some(stripped) = rest.strip_prefix(['G', 'g']) {
        let g_end = stripped
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(stripped.len());
        let code: u32 = stripped[..g_end].parse().unwrap_or(u32::MAX);
        match code {
            1 => commands.push(GerberCommand::SetInterpolation(Interpolation::Linear)),
            10 => commands.push(GerberCommand::SetInterpolation(Interpolation::Linear10x)),
            11 => commands.push(GerberCommand::SetInterpolation(Interpolation::Linear01x)),
            12 => commands.push(GerberCommand::SetInterpolation(Interpolation::Linear001x)),
            2 => commands.push(GerberCommand::SetInterpolation(Interpolation::CwCircular)),
            3 => commands.push(GerberCommand::SetInterpolation(Interpolation::CcwCircular)),
            4 => return Ok(commands), // comment to end of block
            36 => commands.push(GerberCommand::RegionStart),
            37 => commands.push(GerberCommand::RegionEnd),
            54 | 55 => {} // legacy aperture select; the D-code follows
            70 => commands.push(GerberCommand::Units(Unit::Inch)),
            71 => commands.push(GerberCommand::Units(Unit::Mm)),
            74 => commands.push(GerberCommand::QuadrantMode { multi: false }),
            75 => commands.push(GerberCommand::QuadrantMode { multi: true }),
            90 => commands.push(GerberCommand::SetCoordMode(CoordMode::Absolute)),
            91 => commands.push(GerberCommand::SetCoordMode(CoordMode::Incremental)),
            _ => {
                warn!("{file}:{line}: unknown G-code G{} in {word:?}", &stripped[..g_end]);
            }
        }
        rest = &stripped[g_end..];
        if rest.is_empty() {
            return Ok(commands);
        }
    }

    if let Some(stripped) = rest.strip_prefix(['M', 'm']) {
        match stripped.trim().parse::<u32>() {
            Ok(0) | Ok(1) => commands.push(GerberCommand::OptionalStop),
            Ok(2) => commands.push(GerberCommand::EndOfFile),
            _ => warn!("{file}:{line}: unknown M-code in {word:?}"),
        }
        return Ok(commands);
    }

    // Coordinate word: optional X/Y/I/J literals followed by a D-code.
    let mut x = None;
    let mut y = None;
    let mut i = None;
    let mut j = None;
    let mut d_code: Option<u32> = None;
    let bytes = rest.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let key = bytes[pos].to_ascii_uppercase();
        pos += 1;
        match key {
            b'X' | b'Y' | b'I' | b'J' => {
                let mut negative = false;
                if pos < bytes.len() && (bytes[pos] == b'+' || bytes[pos] == b'-') {
                    negative = bytes[pos] == b'-';
                    pos += 1;
                }
                let start = pos;
                while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                    pos += 1;
                }
                if start == pos {
                    warn!("{file}:{line}: empty coordinate in {word:?}");
                    continue;
                }
                let lit = CoordLit::new(negative, &rest[start..pos]);
                match key {
                    b'X' => x = Some(lit),
                    b'Y' => y = Some(lit),
                    b'I' => i = Some(lit),
                    _ => j = Some(lit),
                }
            }
            b'D' => {
                let start = pos;
                while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                    pos += 1;
                }
                match rest[start..pos].parse() {
                    Ok(code) => d_code = Some(code),
                    Err(_) => warn!("{file}:{line}: bad D-code in {word:?}"),
                }
            }
            b' ' | b'\t' => {}
            other => {
                warn!(
                    "{file}:{line}: unexpected character {:?} in {word:?}",
                    other as char
                );
            }
        }
    }

    match d_code {
        Some(op @ 1..=3) => commands.push(GerberCommand::Operation {
            x,
            y,
            i,
            j,
            op: Some(op as u8),
        }),
        Some(code) if code >= 10 => commands.push(GerberCommand::SelectAperture(code as usize)),
        Some(code) => warn!("{file}:{line}: reserved D-code D{code:02}"),
        None => {
            if x.is_some() || y.is_some() || i.is_some() || j.is_some() {
                // Modal: the previous operation code persists.
                commands.push(GerberCommand::Operation {
                    x,
                    y,
                    i,
                    j,
                    op: None,
                });
            }
        }
    }

    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::gerber::lexer::tokenize;

    fn parse(input: &str) -> Vec<GerberCommand> {
        parse_commands(&tokenize(input), "test")
            .unwrap()
            .into_iter()
            .map(|c| c.cmd)
            .collect()
    }

    #[test]
    fn test_format_spec() {
        let cmds = parse("%FSLAX23Y23*%\n");
        match &cmds[0] {
            GerberCommand::FormatSpec(f) => {
                assert_eq!(f.omit_zeros, OmitZeros::Leading);
                assert_eq!(f.coord_mode, CoordMode::Absolute);
                assert_eq!((f.x_int, f.x_dec, f.y_int, f.y_dec), (2, 3, 2, 3));
            }
            other => panic!("expected FormatSpec, got {other:?}"),
        }
    }

    #[test]
    fn test_format_spec_trailing_incremental() {
        let cmds = parse("%FSTIX24Y24*%\n");
        match &cmds[0] {
            GerberCommand::FormatSpec(f) => {
                assert_eq!(f.omit_zeros, OmitZeros::Trailing);
                assert_eq!(f.coord_mode, CoordMode::Incremental);
            }
            other => panic!("expected FormatSpec, got {other:?}"),
        }
    }

    #[test]
    fn test_format_spec_malformed_is_fatal() {
        let toks = tokenize("%FSLAX2Y23*%\n");
        assert!(parse_commands(&toks, "test").is_err());
    }

    #[test]
    fn test_units() {
        assert_eq!(parse("%MOIN*%\n"), vec![GerberCommand::Units(Unit::Inch)]);
        assert_eq!(parse("%MOMM*%\n"), vec![GerberCommand::Units(Unit::Mm)]);
        assert_eq!(parse("G70*\n"), vec![GerberCommand::Units(Unit::Inch)]);
        assert_eq!(parse("G71*\n"), vec![GerberCommand::Units(Unit::Mm)]);
    }

    #[test]
    fn test_aperture_circle_with_hole() {
        let cmds = parse("%ADD10C,0.050X0.010*%\n");
        assert_eq!(
            cmds,
            vec![GerberCommand::ApertureDefine {
                code: 10,
                shape: ApertureShape::Circle {
                    diameter: 0.050,
                    hole: Some(0.010),
                },
            }]
        );
    }

    #[test]
    fn test_aperture_rectangle() {
        let cmds = parse("%ADD11R,0.040X0.020*%\n");
        assert_eq!(
            cmds,
            vec![GerberCommand::ApertureDefine {
                code: 11,
                shape: ApertureShape::Rectangle {
                    x_size: 0.040,
                    y_size: 0.020,
                    hole: None,
                },
            }]
        );
    }

    #[test]
    fn test_aperture_polygon() {
        let cmds = parse("%ADD13P,0.080X6X45*%\n");
        assert_eq!(
            cmds,
            vec![GerberCommand::ApertureDefine {
                code: 13,
                shape: ApertureShape::Polygon {
                    diameter: 0.080,
                    sides: 6,
                    rotation: 45.0,
                    hole: None,
                },
            }]
        );
    }

    #[test]
    fn test_aperture_macro_reference() {
        let cmds = parse("%ADD22BOX,0.1X0.2*%\n");
        assert_eq!(
            cmds,
            vec![GerberCommand::ApertureDefine {
                code: 22,
                shape: ApertureShape::Macro {
                    name: "BOX".into(),
                    params: vec![0.1, 0.2],
                },
            }]
        );
    }

    #[test]
    fn test_aperture_code_below_ten_rejected() {
        assert!(parse("%ADD09C,0.1*%\n").is_empty());
    }

    #[test]
    fn test_macro_definition() {
        let cmds = parse("%AMBOX*21,1,$1,$2,0,0,0*%\n");
        assert_eq!(
            cmds,
            vec![GerberCommand::MacroDefine {
                name: "BOX".into(),
                body: vec!["21,1,$1,$2,0,0,0".into()],
            }]
        );
    }

    #[test]
    fn test_macro_with_assignment() {
        let cmds = parse("%AMDONUT*$3=$1x0.75*1,1,$1,0,0*1,0,$3,0,0*%\n");
        match &cmds[0] {
            GerberCommand::MacroDefine { name, body } => {
                assert_eq!(name, "DONUT");
                assert_eq!(body.len(), 3);
                assert_eq!(body[0], "$3=$1x0.75");
            }
            other => panic!("expected MacroDefine, got {other:?}"),
        }
    }

    #[test]
    fn test_operation_with_op() {
        let cmds = parse("X100Y-200D01*\n");
        match &cmds[0] {
            GerberCommand::Operation { x, y, op, .. } => {
                assert_eq!(x.as_ref().unwrap().digits, "100");
                assert!(y.as_ref().unwrap().negative);
                assert_eq!(*op, Some(1));
            }
            other => panic!("expected Operation, got {other:?}"),
        }
    }

    #[test]
    fn test_modal_operation_without_d() {
        let cmds = parse("X500*\n");
        match &cmds[0] {
            GerberCommand::Operation { op, y, .. } => {
                assert_eq!(*op, None);
                assert!(y.is_none());
            }
            other => panic!("expected Operation, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_zero_coordinate_kept() {
        let cmds = parse("X-0Y0D02*\n");
        match &cmds[0] {
            GerberCommand::Operation { x, y, .. } => {
                assert!(x.as_ref().unwrap().negative);
                assert!(!y.as_ref().unwrap().negative);
            }
            other => panic!("expected Operation, got {other:?}"),
        }
    }

    #[test]
    fn test_g54_select() {
        assert_eq!(parse("G54D12*\n"), vec![GerberCommand::SelectAperture(12)]);
    }

    #[test]
    fn test_g_code_chain() {
        assert_eq!(
            parse("G01X100Y200D01*\n"),
            vec![
                GerberCommand::SetInterpolation(Interpolation::Linear),
                GerberCommand::Operation {
                    x: Some(CoordLit::new(false, "100")),
                    y: Some(CoordLit::new(false, "200")),
                    i: None,
                    j: None,
                    op: Some(1),
                },
            ]
        );
    }

    #[test]
    fn test_region_and_quadrant() {
        assert_eq!(parse("G36*\n"), vec![GerberCommand::RegionStart]);
        assert_eq!(parse("G37*\n"), vec![GerberCommand::RegionEnd]);
        assert_eq!(
            parse("G74*\nG75*\n"),
            vec![
                GerberCommand::QuadrantMode { multi: false },
                GerberCommand::QuadrantMode { multi: true },
            ]
        );
    }

    #[test]
    fn test_step_repeat() {
        assert_eq!(
            parse("%SRX2Y3I0.5J0.25*%\n"),
            vec![GerberCommand::StepRepeat {
                x_repeat: 2,
                y_repeat: 3,
                x_step: 0.5,
                y_step: 0.25,
            }]
        );
        assert_eq!(
            parse("%SR*%\n"),
            vec![GerberCommand::StepRepeat {
                x_repeat: 1,
                y_repeat: 1,
                x_step: 0.0,
                y_step: 0.0,
            }]
        );
    }

    #[test]
    fn test_netstate_commands() {
        assert_eq!(
            parse("%SFA1.5B2.0*%\n"),
            vec![GerberCommand::ScaleFactor { a: 1.5, b: 2.0 }]
        );
        assert_eq!(
            parse("%MIA1B0*%\n"),
            vec![GerberCommand::Mirror { a: true, b: false }]
        );
        assert_eq!(
            parse("%ASAYBX*%\n"),
            vec![GerberCommand::AxisSelect(AxisSelect::SwapAB)]
        );
        assert_eq!(
            parse("%OFA1.0B-0.5*%\n"),
            vec![GerberCommand::Offset {
                a: Some(1.0),
                b: Some(-0.5),
            }]
        );
    }

    #[test]
    fn test_layer_commands() {
        assert_eq!(
            parse("%LPC*%\n"),
            vec![GerberCommand::LayerPolarity(LayerPolarity::Clear)]
        );
        assert_eq!(
            parse("%LNcopper_top*%\n"),
            vec![GerberCommand::LayerName("copper_top".into())]
        );
        assert_eq!(parse("%LR90*%\n"), vec![GerberCommand::LayerRotation(90.0)]);
    }

    #[test]
    fn test_attribute_commands() {
        assert_eq!(
            parse("%TO.N,GND*%\n"),
            vec![GerberCommand::Attribute {
                scope: AttrScope::Object,
                body: ".N,GND".into(),
            }]
        );
        assert_eq!(
            parse("%TD.N*%\n"),
            vec![GerberCommand::Attribute {
                scope: AttrScope::Delete,
                body: ".N".into(),
            }]
        );
    }

    #[test]
    fn test_include_file() {
        assert_eq!(
            parse("%IFsub/common.grb*%\n"),
            vec![GerberCommand::IncludeFile("sub/common.grb".into())]
        );
    }

    #[test]
    fn test_end_of_file() {
        assert_eq!(parse("M02*\n"), vec![GerberCommand::EndOfFile]);
        assert_eq!(parse("M00*\n"), vec![GerberCommand::OptionalStop]);
    }

    #[test]
    fn test_unknown_g_code_recoverable() {
        // Unknown G-codes warn and are skipped; parsing continues.
        let cmds = parse("G88*\nD10*\n");
        assert_eq!(cmds, vec![GerberCommand::SelectAperture(10)]);
    }
}
