//! RS-274-X / X2 writer: the functional inverse of the parser.
//!
//! Coordinates are emitted leading-omit with a caller-selected decimal
//! count. In X2 mode file attributes go into the header, aperture and
//! object attributes are emitted immediately before the record that needs
//! them, and `%TD` deletions keep the modal dictionaries faithful.

use std::io::Write;

use crate::attrs::{exportable_key, AttrTracker, Sym};
use crate::error::IngestError;
use crate::types::{
    ApertureShape, ApertureState, AxisSelect, Image, Interpolation, LayerPolarity, MacroPrim,
    MirrorState, NetState, Polarity, UserTransform, MM_PER_INCH,
};

#[derive(Debug, Clone, Copy)]
enum AttrScopeHint {
    Aperture,
    Object,
}

#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    /// 1 = RS-274-X, 2 = RS-274-X2 (with attributes).
    pub std_version: u8,
    /// Fractional digits; clamped to 2..6 for mm, 3..7 for inch.
    pub decimals: u32,
    /// Total digits; clamped to at least `decimals`.
    pub digits: u32,
    pub metric: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            std_version: 1,
            decimals: 6,
            digits: 9,
            metric: false,
        }
    }
}

impl WriterOptions {
    /// X2 with the recommended metric nanometer resolution.
    pub fn x2() -> Self {
        WriterOptions {
            std_version: 2,
            decimals: 6,
            digits: 10,
            metric: true,
        }
    }

    fn clamped(mut self) -> Self {
        let (lo, hi) = if self.metric { (2, 6) } else { (3, 7) };
        self.decimals = self.decimals.clamp(lo, hi);
        // The %FS integer digit count is a single digit, at most 6.
        self.digits = self.digits.clamp(self.decimals, self.decimals + 6);
        self
    }
}

struct Emitter<'a, W: Write> {
    out: &'a mut W,
    x2: bool,
    /// Converts stored inches into output units.
    tounits: f64,
    /// Converts stored inches into encoded integers.
    multiplier: f64,
    tracker: AttrTracker,
}

impl<'a, W: Write> Emitter<'a, W> {
    fn pair(&self, a: char, b: char, x: f64, y: f64) -> String {
        format!(
            "{a}{}{b}{}",
            (x * self.multiplier).round() as i64,
            (y * self.multiplier).round() as i64
        )
    }

    fn dump_attr(&mut self, index: usize, key: Sym, value: Sym, hint: AttrScopeHint) -> std::io::Result<()> {
        if !exportable_key(key.as_str()) {
            return Ok(());
        }
        if self.tracker.changed(key, value).is_some() {
            let scope = match (hint, index) {
                (AttrScopeHint::Aperture, _) => 'A',
                // A net's chained level 1 holds aperture attributes.
                (AttrScopeHint::Object, 1) => 'A',
                (AttrScopeHint::Object, _) => 'O',
            };
            let v = value.as_str();
            if v.is_empty() {
                writeln!(self.out, "%T{scope}{key}*%")?;
            } else {
                writeln!(self.out, "%T{scope}{key},{v}*%")?;
            }
        }
        Ok(())
    }
}

/// Write `image` (duplicated under `transform` if given) as RS-274-X text.
pub fn write_image<W: Write>(
    out: &mut W,
    image: &Image,
    transform: Option<&UserTransform>,
    opts: &WriterOptions,
) -> Result<(), IngestError> {
    let opts = opts.clamped();
    let image = match transform {
        Some(t) if !t.is_identity() => image.duplicate(t),
        _ => image.clone(),
    };

    let tounits = if opts.metric { MM_PER_INCH } else { 1.0 };
    let mut em = Emitter {
        out,
        x2: opts.std_version >= 2,
        tounits,
        multiplier: 10f64.powi(opts.decimals as i32) * tounits,
        tracker: AttrTracker::new(),
    };

    // File attributes lead the header in X2 mode. They are emitted exactly
    // once and kept out of the change tracker, which only follows the
    // modal aperture/object dictionaries.
    if em.x2 {
        let attrs = image.attrs.clone();
        let mut res = Ok(());
        attrs.for_each(|_, k, v| {
            if res.is_ok() && exportable_key(k.as_str()) {
                let val = v.as_str();
                res = if val.is_empty() {
                    writeln!(em.out, "%TF{k}*%")
                } else {
                    writeln!(em.out, "%TF{k},{val}*%")
                };
            }
        });
        res?;
    }

    writeln!(em.out, "G04 Layer image export*")?;
    writeln!(em.out, "{}", if opts.metric { "%MOMM*%" } else { "%MOIN*%" })?;
    writeln!(
        em.out,
        "%FSLAX{0}{1}Y{0}{1}*%",
        opts.digits - opts.decimals,
        opts.decimals
    )?;

    write_image_info(&mut em, &image)?;

    writeln!(em.out, "G04 Aperture definitions*")?;
    write_apertures(&mut em, &image)?;

    writeln!(em.out, "G04 Image data*")?;
    write_nets(&mut em, &image)?;

    writeln!(em.out, "M02*")?;
    Ok(())
}

fn write_image_info<W: Write>(em: &mut Emitter<'_, W>, image: &Image) -> std::io::Result<()> {
    let info = &image.info;
    writeln!(
        em.out,
        "{}",
        if info.polarity == Polarity::Negative {
            "%IPNEG*%"
        } else {
            "%IPPOS*%"
        }
    )?;
    if let Some(name) = &info.name {
        writeln!(em.out, "%IN{name}*%")?;
    }
    if let Some(film) = &info.plotter_film {
        writeln!(em.out, "%PF{film}*%")?;
    }
    if info.offset_a != 0.0 || info.offset_b != 0.0 {
        writeln!(
            em.out,
            "%IOA{:.4}B{:.4}*%",
            info.offset_a * em.tounits,
            info.offset_b * em.tounits
        )?;
    }
    if info.rotation != 0.0 {
        writeln!(em.out, "%IR{}*%", (info.rotation.round() as i64).rem_euclid(360))?;
    }
    Ok(())
}

fn write_apertures<W: Write>(em: &mut Emitter<'_, W>, image: &Image) -> std::io::Result<()> {
    for (&code, ap) in &image.apertures {
        if em.x2 {
            let attrs = ap.attrs.clone();
            let mut res = Ok(());
            attrs.for_each(|idx, k, v| {
                if res.is_ok() {
                    res = em.dump_attr(idx, k, v, AttrScopeHint::Aperture);
                }
            });
            res?;
        }
        let u = em.tounits;
        match &ap.shape {
            ApertureShape::Circle { diameter, hole } => {
                write!(em.out, "%ADD{code}C,{:.4}", diameter * u)?;
                if let Some(h) = hole {
                    write!(em.out, "X{:.4}", h * u)?;
                }
                writeln!(em.out, "*%")?;
            }
            ApertureShape::Rectangle { x_size, y_size, hole } => {
                write!(em.out, "%ADD{code}R,{:.4}X{:.4}", x_size * u, y_size * u)?;
                if let Some(h) = hole {
                    write!(em.out, "X{:.4}", h * u)?;
                }
                writeln!(em.out, "*%")?;
            }
            ApertureShape::Oval { x_size, y_size, hole } => {
                write!(em.out, "%ADD{code}O,{:.4}X{:.4}", x_size * u, y_size * u)?;
                if let Some(h) = hole {
                    write!(em.out, "X{:.4}", h * u)?;
                }
                writeln!(em.out, "*%")?;
            }
            ApertureShape::Polygon {
                diameter,
                sides,
                rotation,
                hole,
            } => {
                write!(em.out, "%ADD{code}P,{:.4}X{sides}", diameter * u)?;
                if *rotation != 0.0 || hole.is_some() {
                    write!(em.out, "X{rotation:.4}")?;
                }
                if let Some(h) = hole {
                    write!(em.out, "X{:.4}", h * u)?;
                }
                writeln!(em.out, "*%")?;
            }
            ApertureShape::Macro { .. } => {
                write_macro(em, code, &ap.simplified)?;
            }
        }
    }
    Ok(())
}

/// Serialize a simplified primitive list as `%AMMACRO{code}` and bind it to
/// the aperture code.
fn write_macro<W: Write>(
    em: &mut Emitter<'_, W>,
    code: usize,
    prims: &[MacroPrim],
) -> std::io::Result<()> {
    let u = em.tounits;
    writeln!(em.out, "%AMMACRO{code}*")?;
    for prim in prims {
        match prim {
            MacroPrim::Circle {
                exposure,
                diameter,
                center,
            } => {
                writeln!(
                    em.out,
                    "1,{},{:.6},{:.6},{:.6}*",
                    *exposure as i64,
                    diameter * u,
                    center.0 * u,
                    center.1 * u
                )?;
            }
            MacroPrim::Outline {
                exposure,
                points,
                rotation,
            } => {
                write!(em.out, "4,{},{}", *exposure as i64, points.len() - 1)?;
                for (x, y) in points {
                    write!(em.out, ",{:.6},{:.6}", x * u, y * u)?;
                }
                writeln!(em.out, ",{rotation:.6}*")?;
            }
            MacroPrim::Polygon {
                exposure,
                sides,
                center,
                diameter,
                rotation,
            } => {
                writeln!(
                    em.out,
                    "5,{},{},{:.6},{:.6},{:.6},{:.6}*",
                    *exposure as i64,
                    sides,
                    center.0 * u,
                    center.1 * u,
                    diameter * u,
                    rotation
                )?;
            }
            MacroPrim::Moire {
                center,
                outer_diameter,
                ring_thickness,
                gap,
                rings,
                cross_thickness,
                cross_length,
                rotation,
            } => {
                writeln!(
                    em.out,
                    "6,{:.6},{:.6},{:.6},{:.6},{:.6},{},{:.6},{:.6},{:.6}*",
                    center.0 * u,
                    center.1 * u,
                    outer_diameter * u,
                    ring_thickness * u,
                    gap * u,
                    rings,
                    cross_thickness * u,
                    cross_length * u,
                    rotation
                )?;
            }
            MacroPrim::Thermal {
                center,
                outer_diameter,
                inner_diameter,
                cross_thickness,
                rotation,
            } => {
                writeln!(
                    em.out,
                    "7,{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}*",
                    center.0 * u,
                    center.1 * u,
                    outer_diameter * u,
                    inner_diameter * u,
                    cross_thickness * u,
                    rotation
                )?;
            }
            MacroPrim::Line20 {
                exposure,
                width,
                start,
                end,
                rotation,
            } => {
                writeln!(
                    em.out,
                    "20,{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}*",
                    *exposure as i64,
                    width * u,
                    start.0 * u,
                    start.1 * u,
                    end.0 * u,
                    end.1 * u,
                    rotation
                )?;
            }
            MacroPrim::Line21 {
                exposure,
                width,
                height,
                center,
                rotation,
            } => {
                writeln!(
                    em.out,
                    "21,{},{:.6},{:.6},{:.6},{:.6},{:.6}*",
                    *exposure as i64,
                    width * u,
                    height * u,
                    center.0 * u,
                    center.1 * u,
                    rotation
                )?;
            }
            MacroPrim::Line22 {
                exposure,
                width,
                height,
                lower_left,
                rotation,
            } => {
                writeln!(
                    em.out,
                    "22,{},{:.6},{:.6},{:.6},{:.6},{:.6}*",
                    *exposure as i64,
                    width * u,
                    height * u,
                    lower_left.0 * u,
                    lower_left.1 * u,
                    rotation
                )?;
            }
        }
    }
    writeln!(em.out, "%")?;
    writeln!(em.out, "%ADD{code}MACRO{code}*%")
}

fn write_state_change<W: Write>(
    em: &mut Emitter<'_, W>,
    old: &NetState,
    new: &NetState,
) -> std::io::Result<()> {
    if old.offset_a != new.offset_a || old.offset_b != new.offset_b {
        writeln!(
            em.out,
            "%OFA{:.4}B{:.4}*%",
            new.offset_a * em.tounits,
            new.offset_b * em.tounits
        )?;
    }
    if old.scale_a != new.scale_a || old.scale_b != new.scale_b {
        writeln!(em.out, "%SFA{:.4}B{:.4}*%", new.scale_a, new.scale_b)?;
    }
    if old.mirror != new.mirror {
        let (a, b) = match new.mirror {
            MirrorState::None => (0, 0),
            MirrorState::FlipA => (1, 0),
            MirrorState::FlipB => (0, 1),
            MirrorState::FlipAB => (1, 1),
        };
        writeln!(em.out, "%MIA{a}B{b}*%")?;
    }
    if old.axis_select != new.axis_select {
        writeln!(
            em.out,
            "%AS{}*%",
            if new.axis_select == AxisSelect::SwapAB {
                "AYBX"
            } else {
                "AXBY"
            }
        )?;
    }
    Ok(())
}

fn write_nets<W: Write>(em: &mut Emitter<'_, W>, image: &Image) -> std::io::Result<()> {
    let mut current_aperture = 0usize;
    let mut layer_idx = 0usize;
    let mut state_idx = 0usize;
    let mut inside_region = false;
    let mut region_first = false;

    for net in &image.nets {
        if net.interpolation == Interpolation::Deleted {
            continue;
        }

        if net.layer != layer_idx {
            let old = &image.layers[layer_idx];
            let new = &image.layers[net.layer];
            if old.polarity != new.polarity {
                writeln!(
                    em.out,
                    "{}",
                    if new.polarity == LayerPolarity::Clear {
                        "%LPC*%"
                    } else {
                        "%LPD*%"
                    }
                )?;
            }
            layer_idx = net.layer;
        }
        if net.state != state_idx {
            write_state_change(em, &image.states[state_idx], &image.states[net.state])?;
            state_idx = net.state;
        }

        if net.aperture != current_aperture && image.apertures.contains_key(&net.aperture) {
            if em.x2 {
                writeln!(em.out, "D{:02}*", net.aperture)?;
            } else {
                writeln!(em.out, "G54D{:02}*", net.aperture)?;
            }
            current_aperture = net.aperture;
        }

        if em.x2 && !inside_region {
            for key in em.tracker.missing_from(&net.attrs) {
                writeln!(em.out, "%TD{key}*%")?;
            }
            let attrs = net.attrs.clone();
            let mut res = Ok(());
            attrs.for_each(|idx, k, v| {
                if res.is_ok() {
                    res = em.dump_attr(idx, k, v, AttrScopeHint::Object);
                }
            });
            res?;
        }

        match net.interpolation {
            Interpolation::RegionStart => {
                writeln!(em.out, "G36*")?;
                inside_region = true;
                region_first = true;
            }
            Interpolation::RegionEnd => {
                writeln!(em.out, "G37*")?;
                inside_region = false;
            }
            ip if ip.is_linear() => {
                if !inside_region && net.aperture_state == ApertureState::On {
                    writeln!(
                        em.out,
                        "G01{}D02*",
                        em.pair('X', 'Y', net.start_x, net.start_y)
                    )?;
                }
                let d = if inside_region {
                    if region_first {
                        region_first = false;
                        "D02"
                    } else {
                        "D01"
                    }
                } else {
                    match net.aperture_state {
                        ApertureState::Off => "D02",
                        ApertureState::On => "D01",
                        ApertureState::Flash => "D03",
                    }
                };
                writeln!(
                    em.out,
                    "G01{}{d}*",
                    em.pair('X', 'Y', net.stop_x, net.stop_y)
                )?;
            }
            ip if ip.is_circular() => {
                if !inside_region && net.aperture_state == ApertureState::On {
                    writeln!(
                        em.out,
                        "G01{}D02*",
                        em.pair('X', 'Y', net.start_x, net.start_y)
                    )?;
                }
                // Always multi-quadrant on the way out.
                writeln!(em.out, "G75*")?;
                let g = if ip == Interpolation::CwCircular {
                    "G02"
                } else {
                    "G03"
                };
                let xy = em.pair('X', 'Y', net.stop_x, net.stop_y);
                let d = match net.aperture_state {
                    ApertureState::Off => "D02",
                    ApertureState::On => "D01",
                    ApertureState::Flash => "D03",
                };
                if net.aperture_state == ApertureState::On {
                    let cs = net.cirseg.as_ref();
                    let (i, j) = cs
                        .map(|c| (c.cp_x - net.start_x, c.cp_y - net.start_y))
                        .unwrap_or((0.0, 0.0));
                    let ij = em.pair('I', 'J', i, j);
                    if inside_region && region_first {
                        region_first = false;
                    }
                    writeln!(em.out, "{g}{xy}{ij}D01*")?;
                } else {
                    writeln!(em.out, "{g}{xy}{d}*")?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Choose X1 or X2 automatically: any file attributes mean the image came
/// from (or should produce) an X2 file.
pub fn write_image_auto<W: Write>(
    out: &mut W,
    image: &Image,
    transform: Option<&UserTransform>,
) -> Result<(), IngestError> {
    let opts = if !image.attrs.is_empty() {
        WriterOptions::x2()
    } else {
        WriterOptions::default()
    };
    write_image(out, image, transform, &opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::gerber::parse_str;
    use crate::types::{ApertureState, Unit};

    fn round_trip(src: &str) -> (Image, Image, String) {
        let img = parse_str(src, "orig").unwrap();
        let mut buf = Vec::new();
        write_image_auto(&mut buf, &img, None).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let reparsed = parse_str(&text, "reparsed").unwrap();
        (img, reparsed, text)
    }

    fn drawn(image: &Image) -> Vec<&crate::types::Net> {
        image
            .nets
            .iter()
            .filter(|n| n.aperture_state != ApertureState::Off)
            .collect()
    }

    #[test]
    fn test_round_trip_minimum() {
        let (orig, re, text) = round_trip(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.050*%\nD10*\nX0Y0D02*\nX1000Y0D01*\nM02*\n",
        );
        assert!(text.contains("%ADD10C,0.0500*%"));
        assert!(text.ends_with("M02*\n"));
        let a = drawn(&orig);
        let b = drawn(&re);
        assert_eq!(a.len(), b.len());
        for (na, nb) in a.iter().zip(b.iter()) {
            assert!((na.stop_x - nb.stop_x).abs() < 1e-6);
            assert!((na.stop_y - nb.stop_y).abs() < 1e-6);
            assert_eq!(na.aperture_state, nb.aperture_state);
        }
        // Bounding boxes agree within the chosen precision.
        assert!((orig.info.bbox.max_x - re.info.bbox.max_x).abs() < 1e-6);
    }

    #[test]
    fn test_sniffable_output_ends_with_m02() {
        let (_, _, text) = round_trip("%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.05*%\nD10*\nX0Y0D03*\nM02*\n");
        assert!(text.trim_end().ends_with("M02*"));
        assert!(text.contains("%FSLAX"));
    }

    #[test]
    fn test_zero_coordinate_written_as_zero() {
        let (_, _, text) = round_trip("%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.05*%\nD10*\nX0Y0D03*\nM02*\n");
        assert!(text.contains("G01X0Y0D03*"));
    }

    #[test]
    fn test_macro_emitted_and_rebound() {
        let (orig, re, text) = round_trip(
            "%FSLAX23Y23*%\n%MOIN*%\n%AMBOX*21,1,$1,$2,0,0,0*%\n%ADD11BOX,0.1X0.2*%\nD11*\nX500Y500D03*\nM02*\n",
        );
        assert!(text.contains("%AMMACRO11*"));
        assert!(text.contains("%ADD11MACRO11*%"));
        let ap_a = orig.apertures.get(&11).unwrap();
        let ap_b = re.apertures.get(&11).unwrap();
        assert_eq!(ap_a.simplified.len(), ap_b.simplified.len());
        match (&ap_a.simplified[0], &ap_b.simplified[0]) {
            (
                MacroPrim::Line21 { width: w1, height: h1, .. },
                MacroPrim::Line21 { width: w2, height: h2, .. },
            ) => {
                assert!((w1 - w2).abs() < 1e-6);
                assert!((h1 - h2).abs() < 1e-6);
            }
            other => panic!("expected Line21 pair, got {other:?}"),
        }
    }

    #[test]
    fn test_region_round_trip() {
        let (orig, re, text) = round_trip(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.01*%\nD10*\nG36*\nX0Y0D02*\nX1000Y0D01*\nX1000Y1000D01*\nX0Y0D01*\nG37*\nM02*\n",
        );
        assert!(text.contains("G36*"));
        assert!(text.contains("G37*"));
        let count = |img: &Image, ip: Interpolation| {
            img.nets.iter().filter(|n| n.interpolation == ip).count()
        };
        assert_eq!(
            count(&orig, Interpolation::RegionStart),
            count(&re, Interpolation::RegionStart)
        );
        assert!((orig.info.bbox.max_x - re.info.bbox.max_x).abs() < 1e-6);
    }

    #[test]
    fn test_arc_emits_g75_and_ij() {
        let (_, re, text) = round_trip(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.01*%\nD10*\nG75*\nX1000Y0D02*\nG03X0Y1000I-1000J0D01*\nM02*\n",
        );
        assert!(text.contains("G75*"));
        assert!(text.contains("G03"));
        let arc = drawn(&re)
            .into_iter()
            .find(|n| n.interpolation.is_circular())
            .unwrap();
        let cs = arc.cirseg.unwrap();
        assert!(cs.cp_x.abs() < 1e-6);
        assert!(cs.cp_y.abs() < 1e-6);
    }

    #[test]
    fn test_layer_polarity_change_emitted_once() {
        let (_, re, text) = round_trip(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.01*%\nD10*\nX0Y0D03*\n%LPC*%\nX100Y0D03*\nM02*\n",
        );
        assert_eq!(text.matches("%LPC*%").count(), 1);
        let flashes = drawn(&re);
        assert_eq!(
            re.layers[flashes[1].layer].polarity,
            LayerPolarity::Clear
        );
    }

    #[test]
    fn test_x2_attribute_round_trip_with_deletion() {
        // Scenario: a flashed net carries .N=GND; the writer emits %TD.N*%
        // before the first subsequent object lacking it.
        let src = "%FSLAX23Y23*%\n%MOIN*%\n%TF.FileFunction,Copper,L1,Top*%\n%ADD10C,0.01*%\nD10*\n%TO.N,GND*%\nX0Y0D03*\n%TD.N*%\nX100Y0D03*\nM02*\n";
        let (orig, re, text) = round_trip(src);
        assert!(text.contains("%TF.FileFunction,Copper,L1,Top*%"));
        assert!(text.contains("%TO.N,GND*%"));
        let to_pos = text.find("%TO.N,GND*%").unwrap();
        let td_pos = text.find("%TD.N*%").expect("deletion emitted");
        assert!(td_pos > to_pos);
        let fo = drawn(&orig);
        let fr = drawn(&re);
        assert_eq!(fo[0].attrs.get(".N"), Some("GND"));
        assert_eq!(fr[0].attrs.get(".N"), Some("GND"));
        assert_eq!(fr[1].attrs.get(".N"), None);
    }

    #[test]
    fn test_mm_export_preserves_geometry() {
        let src = "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.050*%\nD10*\nX0Y0D02*\nX1000Y0D01*\nM02*\n";
        let img = parse_str(src, "orig").unwrap();
        let mut buf = Vec::new();
        write_image(&mut buf, &img, None, &WriterOptions::x2()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("%MOMM*%"));
        let re = parse_str(&text, "re").unwrap();
        assert_eq!(re.info.unit, Unit::Mm);
        // 1 inch travel survives the mm round trip.
        let draw = drawn(&re)[0];
        assert!((draw.stop_x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_netstate_change_emitted() {
        let (_, re, text) = round_trip(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.01*%\nD10*\nX0Y0D03*\n%SFA2.0B1.5*%\nX100Y0D03*\nM02*\n",
        );
        assert!(text.contains("%SFA2.0000B1.5000*%"));
        assert_eq!(re.states.len(), 2);
        assert!((re.states[1].scale_a - 2.0).abs() < 1e-9);
    }
}
