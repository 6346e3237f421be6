//! File-type detection by scorer competition.
//!
//! Each candidate format owns a line scorer. Lines 1..1000 are fed to every
//! live scorer; a return of +1000 declares the winner outright, −1000
//! eliminates the candidate, anything else accumulates. At EOF every scorer
//! gets one final call with `None`. If nobody crosses the threshold the
//! best positive accumulated score is reported as the fallback guess.

use std::path::Path;

use log::debug;

use crate::reader::TextCursor;

pub const SCORE_THRESHOLD: i32 = 1000;
pub const DEFINITELY_IS: i32 = SCORE_THRESHOLD;
pub const DEFINITELY_NOT: i32 = -SCORE_THRESHOLD;
const MAX_LINES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Rs274x,
    Excellon,
    Ipcd356a,
    PnpCsv,
    EaglePartlist,
    Unknown,
}

impl FileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Rs274x => "RS-274X",
            FileKind::Excellon => "Excellon",
            FileKind::Ipcd356a => "IPC-D-356A",
            FileKind::PnpCsv => "pick-and-place CSV",
            FileKind::EaglePartlist => "Eagle partlist",
            FileKind::Unknown => "unknown",
        }
    }
}

/// Per-candidate scratch state handed to the scorer on every line.
pub struct SnifferState {
    /// 1-based line number.
    pub line_num: usize,
    /// Length of the current line, trailing whitespace excluded.
    pub line_len: usize,
    /// Filename extension, lowercased, without the dot.
    pub ext: String,
    /// General-purpose counters for the scorer.
    pub counters: [i32; 10],
}

type ScoreFn = fn(Option<&str>, &mut SnifferState) -> i32;

/// Ordinals 1..31 (except whitespace) or 0x7F mean binary content; UTF-8
/// multibyte sequences are all >= 0x80 and pass.
pub fn line_contains_binary(line: &str) -> bool {
    line.bytes()
        .any(|b| (b >= 1 && b < 32 && !b.is_ascii_whitespace()) || b == 0x7f)
}

/// Sniff a file on disk. Returns the winning type plus the best positive
/// match for callers that want a fallback guess.
pub fn sniff_path(path: &Path) -> std::io::Result<(FileKind, FileKind)> {
    let cursor = TextCursor::open(path)?;
    Ok(sniff_cursor(cursor))
}

pub fn sniff_bytes(data: &[u8], filename: &str) -> (FileKind, FileKind) {
    let cursor = TextCursor::from_bytes_named(
        data.to_vec(),
        std::path::PathBuf::from("."),
        filename.to_string(),
    );
    sniff_cursor(cursor)
}

fn sniff_cursor(mut fd: TextCursor) -> (FileKind, FileKind) {
    let candidates: [(FileKind, ScoreFn); 5] = [
        (FileKind::Rs274x, score_gerber),
        (FileKind::Excellon, score_excellon),
        (FileKind::Ipcd356a, score_ipcd356a),
        (FileKind::PnpCsv, score_pnp_csv),
        (FileKind::EaglePartlist, score_eagle),
    ];

    let ext = fd
        .name()
        .rsplit('.')
        .next()
        .filter(|e| *e != fd.name())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let mut states: Vec<SnifferState> = candidates
        .iter()
        .map(|_| SnifferState {
            line_num: 0,
            line_len: 0,
            ext: ext.clone(),
            counters: [0; 10],
        })
        .collect();
    let mut running = [true; 5];
    let mut totals = [0i32; 5];

    let mut line_num = 0;
    loop {
        let line = if line_num < MAX_LINES {
            fd.read_line()
        } else {
            None
        };
        line_num += 1;
        let trimmed = line.as_deref().map(|l| l.trim_end());

        for (i, (kind, scorer)) in candidates.iter().enumerate() {
            if !running[i] {
                continue;
            }
            states[i].line_num = line_num;
            states[i].line_len = trimmed.map_or(0, |l| l.len());
            let score = scorer(trimmed, &mut states[i]);
            if score >= DEFINITELY_IS {
                debug!("sniffer: {} definite at line {line_num}", kind.as_str());
                return (*kind, *kind);
            }
            if score <= DEFINITELY_NOT {
                running[i] = false;
                continue;
            }
            totals[i] += score;
            if totals[i] >= SCORE_THRESHOLD {
                debug!("sniffer: {} over threshold at line {line_num}", kind.as_str());
                return (*kind, *kind);
            }
            if totals[i] <= -SCORE_THRESHOLD {
                running[i] = false;
            }
        }

        if trimmed.is_none() || !running.iter().any(|r| *r) {
            break;
        }
    }

    // No clear winner: the best positive score is the fallback guess, with
    // ties resolved by candidate order.
    let mut best = FileKind::Unknown;
    let mut best_score = 0;
    for (i, (kind, _)) in candidates.iter().enumerate() {
        if running[i] && totals[i] > best_score {
            best_score = totals[i];
            best = *kind;
        }
    }
    (FileKind::Unknown, best)
}

// ─── Per-format scorers ──────────────────────────────────────────────

fn score_gerber(line: Option<&str>, st: &mut SnifferState) -> i32 {
    let Some(line) = line else {
        // Plausible only if some extended command was ever seen.
        return if st.counters[0] > 0 { 0 } else { DEFINITELY_NOT };
    };
    if line_contains_binary(line) {
        return DEFINITELY_NOT;
    }
    if st.line_len < 3 {
        return 0;
    }
    let mut score = 0;
    if line.contains("%FS") {
        st.counters[0] += 1;
        score += 400;
    }
    if line.contains("%MOIN") || line.contains("%MOMM") {
        st.counters[0] += 1;
        score += 300;
    }
    if line.contains("%ADD") {
        st.counters[0] += 1;
        score += 300;
    }
    if line.contains("%AM") {
        score += 200;
    }
    if line.contains("%LP") {
        score += 200;
    }
    if line.contains("%TF") || line.contains("%TA") || line.contains("%TO") || line.contains("%TD")
    {
        score += 200;
    }
    if line.starts_with("G04") {
        score += 100;
    }
    if line.contains("G75*") || line.contains("G74*") || line.contains("G36*") {
        score += 20;
    }
    if line.contains("M02*") {
        score += 100;
    }
    if score == 0 {
        if line.starts_with("M48") {
            return -500;
        }
        // Coordinate words like X123Y456D01*.
        if (line.starts_with('X') || line.starts_with('Y') || line.starts_with('G'))
            && line.contains('D')
            && line.ends_with('*')
        {
            score += 10;
        } else if line.starts_with('D') && line.ends_with('*') {
            score += 5;
        } else if line.starts_with('T') {
            score -= 50;
        }
    }
    score
}

fn score_excellon(line: Option<&str>, st: &mut SnifferState) -> i32 {
    let Some(line) = line else {
        return if st.counters[0] > 0 { 0 } else { DEFINITELY_NOT };
    };
    if line_contains_binary(line) {
        return DEFINITELY_NOT;
    }
    if line.is_empty() {
        return 0;
    }
    // The M48 header command is conclusive.
    if line.starts_with("M48") {
        return DEFINITELY_IS;
    }
    if line.contains("%FS") || line.contains("%ADD") || line.contains("%MOIN") || line.contains("%MOMM")
    {
        return DEFINITELY_NOT;
    }
    let mut score = 0;
    if line.starts_with("INCH") || line.starts_with("METRIC") || line == "M71" || line == "M72" {
        st.counters[0] += 1;
        score += 200;
    }
    if line == "%" {
        score += 10;
    }
    let bytes = line.as_bytes();
    if bytes.first() == Some(&b'T') && bytes.get(1).is_some_and(|b| b.is_ascii_digit()) {
        st.counters[0] += 1;
        score += if line.contains('C') { 100 } else { 50 };
    }
    if line.starts_with("G0") || line.starts_with("G8") || line.starts_with("G9") {
        score += 20;
    }
    if (line.starts_with('X') || line.starts_with('Y'))
        && line
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'X' | b'Y' | b'.' | b'-' | b'+' | b','))
    {
        score += 10;
    }
    score
}

fn score_ipcd356a(line: Option<&str>, st: &mut SnifferState) -> i32 {
    let Some(line) = line else {
        return if st.counters[0] > 0 { 0 } else { DEFINITELY_NOT };
    };
    let bonus = if st.line_num == 1 && st.ext.starts_with("ipc") {
        250
    } else {
        0
    };
    if st.line_len > 80 || line_contains_binary(line) {
        return DEFINITELY_NOT;
    }
    if st.line_len < 3 {
        return -10 + bonus;
    }
    let upper = line.to_uppercase();
    if upper.starts_with("P  VER IPC-D-356A") {
        return DEFINITELY_IS;
    }
    if upper.starts_with("P  VER IPC-D-356") {
        st.counters[0] += 1;
        return 100 + bonus;
    }
    if upper.starts_with("P  ")
        || upper.starts_with("C  ")
        || ["317", "327", "378", "389", "017", "027", "078", "089"]
            .iter()
            .any(|p| line.starts_with(p))
    {
        return 20 + bonus;
    }
    if line.as_bytes().len() >= 3 && line.as_bytes()[..3].iter().all(|b| b.is_ascii_digit()) {
        return 5 + bonus;
    }
    -50 + bonus
}

fn score_pnp_csv(line: Option<&str>, st: &mut SnifferState) -> i32 {
    let Some(line) = line else {
        return if st.counters[1] > 0 { 0 } else { DEFINITELY_NOT };
    };
    if line_contains_binary(line) {
        return DEFINITELY_NOT;
    }
    if st.line_len < 3 {
        return 0;
    }
    // Gerber command noise conclusively rules a PnP table out.
    if line.starts_with("G04 ") || line.starts_with("G54 ") || line.starts_with('%') {
        return DEFINITELY_NOT;
    }

    // Delimiter density: the dominant of | , ; : must appear often.
    let mut counts = [0usize; 4];
    for b in line.bytes() {
        match b {
            b'|' => counts[0] += 1,
            b',' => counts[1] += 1,
            b';' => counts[2] += 1,
            b':' => counts[3] += 1,
            _ => {}
        }
    }
    let delims = *counts.iter().max().unwrap();

    let designator_like = {
        let first = line
            .trim_start_matches('"')
            .split([',', ';', '|', ':'])
            .next()
            .unwrap_or("");
        let mut chars = first.chars();
        matches!(chars.next(), Some('R' | 'C' | 'U' | 'L' | 'D' | 'Q' | 'J' | 'r' | 'c' | 'u'))
            && chars.next().is_some_and(|c| c.is_ascii_digit())
    };
    let side_marker = {
        let lower = line.to_lowercase();
        lower.contains("top") || lower.contains("bottom") || lower.contains(",t,")
            || lower.contains(",b,")
    };

    if delims >= 4 && designator_like {
        st.counters[1] += 1;
        return 60 + if side_marker { 20 } else { 0 };
    }
    if delims >= 4 {
        // Could be the header row.
        return if st.line_num <= 2 { 20 } else { 5 };
    }
    -20
}

fn score_eagle(line: Option<&str>, st: &mut SnifferState) -> i32 {
    let Some(line) = line else {
        return if st.counters[0] > 0 { 0 } else { DEFINITELY_NOT };
    };
    if line_contains_binary(line) {
        return DEFINITELY_NOT;
    }
    if st.line_len < 3 {
        return 0;
    }
    if line.starts_with("Partlist") {
        st.counters[0] += 1;
        return 400;
    }
    if line.starts_with("Exported from") {
        st.counters[0] += 1;
        return 300;
    }
    if line.contains("EAGLE Version") {
        st.counters[0] += 1;
        return 300;
    }
    if line.contains("Part")
        && line.contains("Value")
        && line.contains("Package")
        && line.contains("Library")
        && line.contains("Position")
        && line.contains("Orientation")
    {
        // The column header makes it conclusive.
        return DEFINITELY_IS;
    }
    if st.counters[0] > 0 {
        // Column-aligned part rows after the preamble.
        return 5;
    }
    -10
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sniff(content: &str, name: &str) -> (FileKind, FileKind) {
        sniff_bytes(content.as_bytes(), name)
    }

    #[test]
    fn test_sniff_gerber() {
        let src = "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.050*%\nD10*\nX0Y0D02*\nX1000Y0D01*\nM02*\n";
        let (winner, _) = sniff(src, "board.gtl");
        assert_eq!(winner, FileKind::Rs274x);
    }

    #[test]
    fn test_sniff_excellon() {
        let src = "M48\nINCH,TZ\nT01C0.040\n%\nT01\nX1.000Y1.000\nM30\n";
        let (winner, _) = sniff(src, "drill.drl");
        assert_eq!(winner, FileKind::Excellon);
    }

    #[test]
    fn test_sniff_ipcd356a_definite() {
        let src = "C  Netlist\nP  JOB demo\nP  UNITS CUST 0\nP  VER IPC-D-356A\n";
        let (winner, _) = sniff(src, "board.ipc");
        assert_eq!(winner, FileKind::Ipcd356a);
    }

    #[test]
    fn test_sniff_ipc_long_line_disqualifies() {
        let long = "3".repeat(120);
        let src = format!("{long}\nP  VER IPC-D-356A\n");
        // The oversized line eliminates the IPC candidate before the
        // definite marker is reached.
        let (winner, _) = sniff(&src, "x.ipc");
        assert_ne!(winner, FileKind::Ipcd356a);
    }

    #[test]
    fn test_sniff_pnp_csv() {
        let src = "\
Designator,Footprint,Mid X,Mid Y,Ref X,Ref Y,Pad X,Pad Y,Layer,Rotation,Comment
C1,0805,10.0,20.0,10.0,20.0,10.5,20.0,Top,90,100nF
R1,0603,15.0,25.0,15.0,25.0,15.5,25.0,Top,0,10k
R2,0603,18.0,25.0,18.0,25.0,18.5,25.0,Bottom,0,10k
U1,SOIC8,30.0,30.0,30.0,30.0,31.0,30.0,Top,270,MCU
";
        let (winner, best) = sniff(src, "pnp.csv");
        assert!(winner == FileKind::PnpCsv || best == FileKind::PnpCsv);
    }

    #[test]
    fn test_sniff_eagle_partlist() {
        let src = "\
Partlist exported from /home/user/board.brd

Exported from board.brd at 01.02.2024 10:00
EAGLE Version 9.7.0 Copyright (c) 1988-2024 Autodesk, Inc.

Part     Value          Package     Library     Position (mil)        Orientation
C1       100n           0805        rcl         (1000 2000)           R90
R1       10k            0603        rcl         (1500 2500)           R0
";
        let (winner, _) = sniff(src, "board.txt");
        assert_eq!(winner, FileKind::EaglePartlist);
    }

    #[test]
    fn test_sniff_binary_rejected() {
        let data = [0x01u8, 0x02, 0x03, 0x7f, 0x05, b'\n', 0x01, 0x02, 0x03, 0x04];
        let (winner, best) = sniff_bytes(&data, "blob.bin");
        assert_eq!(winner, FileKind::Unknown);
        assert_eq!(best, FileKind::Unknown);
    }

    #[test]
    fn test_sniff_empty() {
        let (winner, best) = sniff("", "empty");
        assert_eq!(winner, FileKind::Unknown);
        assert_eq!(best, FileKind::Unknown);
    }

    #[test]
    fn test_written_gerber_sniffs_as_gerber() {
        use crate::parsers::gerber::{parse_str, writer};
        let src = "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.050*%\nD10*\nX0Y0D03*\nM02*\n";
        let img = parse_str(src, "t").unwrap();
        let mut buf = Vec::new();
        writer::write_image_auto(&mut buf, &img, None).unwrap();
        let (winner, _) = sniff_bytes(&buf, "out.gbr");
        assert_eq!(winner, FileKind::Rs274x);
    }

    #[test]
    fn test_binary_line_detection() {
        assert!(!line_contains_binary("plain text"));
        assert!(!line_contains_binary("tab\tand space"));
        assert!(line_contains_binary("nul\u{1}inside"));
        assert!(line_contains_binary("del\u{7f}char"));
    }
}
