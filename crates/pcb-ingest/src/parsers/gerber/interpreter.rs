//! RS-274-X state machine: walks the command stream and builds an [`Image`].
//!
//! All geometry is normalized to inches on the way in. Layer and netstate
//! snapshots are appended lazily when an extended command changes them;
//! nets carry indices into those vectors.

use std::collections::HashSet;

use log::warn;

use crate::attrs::ParserAttrs;
use crate::error::IngestError;
use crate::types::{
    Aperture, ApertureShape, ApertureState, BoardSide, CirSeg, CoordMode, Image, ImageJustify,
    Interpolation, LayerKind, MirrorState, Net, Unit, APERTURE_MAX, MM_PER_INCH,
};

use super::commands::{GerberCommand, Justify, LocatedCommand};
use super::coord::CoordLit;
use super::macros::{self, MacroTable};

/// Diameter of the circle synthesized for an undefined aperture.
const SYNTH_APERTURE_DIAMETER: f64 = 0.001;

struct SrBlock {
    start_net: usize,
    x_repeat: u32,
    y_repeat: u32,
    /// Steps in inches.
    x_step: f64,
    y_step: f64,
}

pub struct Interpreter {
    image: Image,
    file: String,

    unit: Unit,
    format_seen: bool,
    x: f64,
    y: f64,
    aperture: usize,
    /// Modal operation: 1 draw, 2 move, 3 flash.
    modal_op: u8,
    interpolation: Interpolation,
    multi_quadrant: bool,

    in_region: bool,
    region_start: Option<usize>,
    region_drawn: bool,

    layer_idx: usize,
    state_idx: usize,

    attrs: ParserAttrs,
    macros: MacroTable,
    sr: Option<SrBlock>,
    synthesized: HashSet<usize>,
    done: bool,
}

impl Interpreter {
    pub fn new(file: &str) -> Self {
        Interpreter {
            image: Image::new(LayerKind::Rs274x),
            file: file.to_string(),
            unit: Unit::Inch,
            format_seen: false,
            x: 0.0,
            y: 0.0,
            aperture: 0,
            modal_op: 2,
            interpolation: Interpolation::Linear,
            multi_quadrant: false,
            in_region: false,
            region_start: None,
            region_drawn: false,
            layer_idx: 0,
            state_idx: 0,
            attrs: ParserAttrs::new(),
            macros: MacroTable::default(),
            sr: None,
            synthesized: HashSet::new(),
            done: false,
        }
    }

    fn to_inch(&self, v: f64) -> f64 {
        match self.unit {
            Unit::Inch => v,
            Unit::Mm => v / MM_PER_INCH,
        }
    }

    fn decode_x(&self, lit: &CoordLit) -> f64 {
        self.to_inch(lit.decode_x(&self.image.format))
    }

    fn decode_y(&self, lit: &CoordLit) -> f64 {
        self.to_inch(lit.decode_y(&self.image.format))
    }

    pub fn process(&mut self, lc: &LocatedCommand) -> Result<(), IngestError> {
        if self.done {
            return Ok(());
        }
        let line = lc.line;
        match &lc.cmd {
            GerberCommand::FormatSpec(fmt) => {
                if self.format_seen
                    && (self.image.format.omit_zeros != fmt.omit_zeros
                        || self.image.format.x_int != fmt.x_int
                        || self.image.format.x_dec != fmt.x_dec
                        || self.image.format.y_int != fmt.y_int
                        || self.image.format.y_dec != fmt.y_dec)
                {
                    return Err(IngestError::FormatError {
                        file: self.file.clone(),
                        msg: format!("coordinate format redefined at line {line}"),
                    });
                }
                self.format_seen = true;
                let tool_dec = self.image.format.tool_dec;
                self.image.format = fmt.clone();
                self.image.format.tool_dec = tool_dec;
            }
            GerberCommand::Units(u) => {
                self.unit = *u;
                self.image.info.unit = *u;
            }
            GerberCommand::SetCoordMode(m) => {
                self.image.format.coord_mode = *m;
            }
            GerberCommand::SetInterpolation(ip) => {
                self.interpolation = *ip;
            }
            GerberCommand::QuadrantMode { multi } => {
                self.multi_quadrant = *multi;
            }
            GerberCommand::SelectAperture(code) => {
                if *code > APERTURE_MAX {
                    warn!("{}:{line}: aperture code D{code} out of range", self.file);
                } else {
                    self.aperture = *code;
                }
            }
            GerberCommand::ApertureDefine { code, shape } => {
                self.define_aperture(*code, shape, line);
            }
            GerberCommand::MacroDefine { name, body } => {
                self.macros.define(macros::parse_macro_body(name, body));
            }
            GerberCommand::Operation { x, y, i, j, op } => {
                self.operation(x.as_ref(), y.as_ref(), i.as_ref(), j.as_ref(), *op, line);
            }
            GerberCommand::RegionStart => {
                if self.in_region {
                    warn!("{}:{line}: nested G36 ignored", self.file);
                } else {
                    self.in_region = true;
                    self.region_start = None;
                    self.region_drawn = false;
                }
            }
            GerberCommand::RegionEnd => {
                if !self.in_region {
                    warn!("{}:{line}: G37 without G36", self.file);
                } else {
                    self.close_region();
                }
            }
            GerberCommand::LayerPolarity(p) => {
                let mut layer = self.image.layers[self.layer_idx].clone();
                layer.polarity = *p;
                self.layer_idx = self.image.push_layer(layer);
            }
            GerberCommand::LayerName(name) => {
                let mut layer = self.image.layers[self.layer_idx].clone();
                layer.name = Some(name.clone());
                self.layer_idx = self.image.push_layer(layer);
            }
            GerberCommand::LayerRotation(deg) => {
                let mut layer = self.image.layers[self.layer_idx].clone();
                layer.rotation = *deg;
                self.layer_idx = self.image.push_layer(layer);
            }
            GerberCommand::StepRepeat {
                x_repeat,
                y_repeat,
                x_step,
                y_step,
            } => {
                self.close_sr_block();
                if *x_repeat > 1 || *y_repeat > 1 {
                    self.sr = Some(SrBlock {
                        start_net: self.image.nets.len(),
                        x_repeat: *x_repeat,
                        y_repeat: *y_repeat,
                        x_step: self.to_inch(*x_step),
                        y_step: self.to_inch(*y_step),
                    });
                }
            }
            GerberCommand::ImagePolarity(p) => {
                self.image.info.polarity = *p;
            }
            GerberCommand::ImageRotation(deg) => {
                self.image.info.rotation = *deg;
            }
            GerberCommand::Offset { a, b } => {
                let mut st = self.image.states[self.state_idx].clone();
                if let Some(a) = a {
                    st.offset_a = self.to_inch(*a);
                }
                if let Some(b) = b {
                    st.offset_b = self.to_inch(*b);
                }
                self.state_idx = self.image.push_state(st);
            }
            GerberCommand::Mirror { a, b } => {
                let mut st = self.image.states[self.state_idx].clone();
                st.mirror = match (a, b) {
                    (false, false) => MirrorState::None,
                    (true, false) => MirrorState::FlipA,
                    (false, true) => MirrorState::FlipB,
                    (true, true) => MirrorState::FlipAB,
                };
                self.state_idx = self.image.push_state(st);
            }
            GerberCommand::ScaleFactor { a, b } => {
                let mut st = self.image.states[self.state_idx].clone();
                st.scale_a = *a;
                st.scale_b = *b;
                self.state_idx = self.image.push_state(st);
            }
            GerberCommand::AxisSelect(sel) => {
                let mut st = self.image.states[self.state_idx].clone();
                st.axis_select = *sel;
                self.state_idx = self.image.push_state(st);
            }
            GerberCommand::ImageJustify { a, b } => {
                if let Some(ja) = a {
                    self.image.info.justify_a = match ja {
                        Justify::Center => ImageJustify::Center,
                        Justify::LowerLeft(off) => {
                            self.image.info.justify_offset_a = self.to_inch(*off);
                            ImageJustify::LowerLeft
                        }
                    };
                }
                if let Some(jb) = b {
                    self.image.info.justify_b = match jb {
                        Justify::Center => ImageJustify::Center,
                        Justify::LowerLeft(off) => {
                            self.image.info.justify_offset_b = self.to_inch(*off);
                            ImageJustify::LowerLeft
                        }
                    };
                }
            }
            GerberCommand::ImageOffset { a, b } => {
                self.image.info.offset_a = self.to_inch(*a);
                self.image.info.offset_b = self.to_inch(*b);
            }
            GerberCommand::ImageName(name) => {
                self.image.info.name = Some(name.clone());
            }
            GerberCommand::PlotterFilm(name) => {
                self.image.info.plotter_film = Some(name.clone());
            }
            GerberCommand::IncludeFile(path) => {
                // Includes are spliced before interpretation; reaching one
                // here means the nesting limit was exceeded.
                warn!("{}:{line}: unresolved include {path:?}", self.file);
            }
            GerberCommand::Attribute { scope, body } => {
                self.attrs
                    .handle_t(*scope, body, self.in_region, &self.file, line);
            }
            GerberCommand::OptionalStop => {}
            GerberCommand::EndOfFile => {
                self.done = true;
            }
        }
        Ok(())
    }

    fn define_aperture(&mut self, code: usize, shape: &ApertureShape, line: usize) {
        if self.image.apertures.contains_key(&code) {
            warn!("{}:{line}: aperture D{code} redefined", self.file);
        }
        let scale = match self.unit {
            Unit::Inch => 1.0,
            Unit::Mm => 1.0 / MM_PER_INCH,
        };
        let mut ap = match shape {
            ApertureShape::Circle { diameter, hole } => Aperture::new(ApertureShape::Circle {
                diameter: diameter * scale,
                hole: hole.map(|h| h * scale),
            }),
            ApertureShape::Rectangle { x_size, y_size, hole } => {
                Aperture::new(ApertureShape::Rectangle {
                    x_size: x_size * scale,
                    y_size: y_size * scale,
                    hole: hole.map(|h| h * scale),
                })
            }
            ApertureShape::Oval { x_size, y_size, hole } => Aperture::new(ApertureShape::Oval {
                x_size: x_size * scale,
                y_size: y_size * scale,
                hole: hole.map(|h| h * scale),
            }),
            ApertureShape::Polygon {
                diameter,
                sides,
                rotation,
                hole,
            } => Aperture::new(ApertureShape::Polygon {
                diameter: diameter * scale,
                sides: *sides,
                rotation: *rotation,
                hole: hole.map(|h| h * scale),
            }),
            ApertureShape::Macro { name, params } => {
                let mut ap = Aperture::new(ApertureShape::Macro {
                    name: name.clone(),
                    params: params.clone(),
                });
                match self.macros.get(name) {
                    Some(def) => {
                        ap.simplified = macros::simplify(def, params);
                        if scale != 1.0 {
                            for prim in &mut ap.simplified {
                                crate::types::scale_macro_prim(prim, scale);
                            }
                        }
                    }
                    None => {
                        warn!(
                            "{}:{line}: aperture D{code} references undefined macro {name:?}",
                            self.file
                        );
                    }
                }
                ap
            }
        };
        ap.attrs = self.attrs.aperture_snapshot();
        self.image.apertures.insert(code, ap);
    }

    /// Make sure a drawing aperture exists, synthesizing a tiny circle (and
    /// warning once per code) when the file uses an undefined one.
    fn ensure_aperture(&mut self, line: usize) {
        if self.image.apertures.contains_key(&self.aperture) {
            return;
        }
        if self.synthesized.insert(self.aperture) {
            warn!(
                "{}:{line}: aperture D{} used without definition, substituting {}\" circle",
                self.file, self.aperture, SYNTH_APERTURE_DIAMETER
            );
        }
        self.image
            .apertures
            .insert(self.aperture, Aperture::circle(SYNTH_APERTURE_DIAMETER));
    }

    fn operation(
        &mut self,
        x: Option<&CoordLit>,
        y: Option<&CoordLit>,
        i: Option<&CoordLit>,
        j: Option<&CoordLit>,
        op: Option<u8>,
        line: usize,
    ) {
        let prev = (self.x, self.y);
        let incremental = self.image.format.coord_mode == CoordMode::Incremental;
        if let Some(lit) = x {
            let v = self.decode_x(lit);
            self.x = if incremental { self.x + v } else { v };
        }
        if let Some(lit) = y {
            let v = self.decode_y(lit);
            self.y = if incremental { self.y + v } else { v };
        }
        let i_off = i.map(|l| self.decode_x(l)).unwrap_or(0.0);
        let j_off = j.map(|l| self.decode_y(l)).unwrap_or(0.0);

        let op = op.unwrap_or(self.modal_op);
        self.modal_op = op;

        if self.in_region {
            self.region_operation(prev, (i_off, j_off), op, line);
            return;
        }

        match op {
            2 => {
                let mut net = self.new_net();
                net.start_x = prev.0;
                net.start_y = prev.1;
                net.stop_x = self.x;
                net.stop_y = self.y;
                net.interpolation = Interpolation::Linear;
                net.aperture_state = ApertureState::Off;
                net.aperture = self.aperture;
                self.image.push_net(net);
            }
            1 => {
                self.ensure_aperture(line);
                let mut net = self.new_net();
                net.start_x = prev.0;
                net.start_y = prev.1;
                net.stop_x = self.x;
                net.stop_y = self.y;
                net.interpolation = self.interpolation;
                net.aperture_state = ApertureState::On;
                net.aperture = self.aperture;
                if self.interpolation.is_circular() {
                    net.cirseg = Some(self.calc_cirseg(prev, (self.x, self.y), i_off, j_off));
                }
                self.image.push_net(net);
            }
            3 => {
                self.ensure_aperture(line);
                let mut net = self.new_net();
                net.start_x = self.x;
                net.start_y = self.y;
                net.stop_x = self.x;
                net.stop_y = self.y;
                net.interpolation = Interpolation::Linear;
                net.aperture_state = ApertureState::Flash;
                net.aperture = self.aperture;
                self.image.push_net(net);
            }
            other => warn!("{}:{line}: invalid operation D{other:02}", self.file),
        }
    }

    fn region_operation(&mut self, prev: (f64, f64), ij: (f64, f64), op: u8, line: usize) {
        match op {
            3 => {
                warn!("{}:{line}: flash inside G36/G37 region ignored", self.file);
                return;
            }
            2 => {
                if self.region_drawn {
                    // A move after drawing closes this contour and opens the
                    // next as a separate region run.
                    self.close_region();
                    self.in_region = true;
                }
                if self.region_start.is_none() {
                    self.open_region(prev);
                }
                let start = self.region_start;
                let mut net = self.region_net(prev);
                net.interpolation = Interpolation::Linear;
                net.region_of = start;
                self.image.push_net(net);
            }
            _ => {
                if self.region_start.is_none() {
                    self.open_region(prev);
                    // Implicit moveto for a region that draws immediately.
                    let start = self.region_start;
                    let mut net = self.region_net(prev);
                    net.stop_x = prev.0;
                    net.stop_y = prev.1;
                    net.interpolation = Interpolation::Linear;
                    net.region_of = start;
                    self.image.push_net(net);
                }
                self.region_drawn = true;
                let start = self.region_start;
                let mut net = self.region_net(prev);
                net.interpolation = self.interpolation;
                net.region_of = start;
                if self.interpolation.is_circular() {
                    net.cirseg = Some(self.calc_cirseg(prev, (self.x, self.y), ij.0, ij.1));
                }
                self.image.push_net(net);
            }
        }
    }

    fn open_region(&mut self, at: (f64, f64)) {
        let mut net = self.new_net();
        net.start_x = at.0;
        net.start_y = at.1;
        net.stop_x = at.0;
        net.stop_y = at.1;
        net.interpolation = Interpolation::RegionStart;
        net.aperture_state = ApertureState::On;
        net.aperture = self.aperture;
        // Region nets adopt the aperture attributes as if flashed.
        net.attrs = self
            .attrs
            .object_snapshot()
            .chain(self.attrs.aperture_snapshot());
        let idx = self.image.nets.len();
        net.region_of = Some(idx);
        self.image.push_net(net);
        self.region_start = Some(idx);
        self.region_drawn = false;
    }

    fn close_region(&mut self) {
        if let Some(start) = self.region_start {
            let mut net = self.region_net((self.x, self.y));
            net.interpolation = Interpolation::RegionEnd;
            net.region_of = Some(start);
            self.image.push_net(net);
        }
        self.in_region = false;
        self.region_start = None;
        self.region_drawn = false;
    }

    fn region_net(&self, prev: (f64, f64)) -> Net {
        let mut net = Net::new(self.layer_idx, self.state_idx);
        net.start_x = prev.0;
        net.start_y = prev.1;
        net.stop_x = self.x;
        net.stop_y = self.y;
        net.aperture_state = ApertureState::On;
        net.aperture = self.aperture;
        net.attrs = self
            .attrs
            .object_snapshot()
            .chain(self.attrs.aperture_snapshot());
        net
    }

    fn new_net(&self) -> Net {
        let mut net = Net::new(self.layer_idx, self.state_idx);
        net.attrs = self.attrs.object_snapshot();
        net
    }

    fn calc_cirseg(&self, start: (f64, f64), stop: (f64, f64), i: f64, j: f64) -> CirSeg {
        let cw = self.interpolation == Interpolation::CwCircular;
        if self.multi_quadrant {
            calc_cirseg_mq(start, stop, i, j, cw)
        } else {
            calc_cirseg_sq(start, stop, i.abs(), j.abs(), cw)
        }
    }

    fn close_sr_block(&mut self) {
        let Some(sr) = self.sr.take() else {
            return;
        };
        let block: Vec<Net> = self.image.nets[sr.start_net..].to_vec();
        for yi in 0..sr.y_repeat {
            for xi in 0..sr.x_repeat {
                if xi == 0 && yi == 0 {
                    continue;
                }
                let dx = xi as f64 * sr.x_step;
                let dy = yi as f64 * sr.y_step;
                let base = self.image.nets.len();
                for net in &block {
                    let mut n = net.clone();
                    n.start_x += dx;
                    n.start_y += dy;
                    n.stop_x += dx;
                    n.stop_y += dy;
                    if let Some(cs) = &mut n.cirseg {
                        cs.cp_x += dx;
                        cs.cp_y += dy;
                    }
                    if let Some(r) = n.region_of {
                        if r >= sr.start_net {
                            n.region_of = Some(base + (r - sr.start_net));
                        }
                    }
                    self.image.push_net(n);
                }
            }
        }
    }

    pub fn finish(mut self) -> Image {
        if self.in_region {
            warn!("{}: G36 region left open at end of file", self.file);
            self.close_region();
        }
        self.close_sr_block();
        if !self.done {
            warn!("{}: end of file before M02", self.file);
        }
        self.image.attrs = self.attrs.file_snapshot();

        // Resolve justify placeholders into actual offsets now that the
        // bounding box is known.
        let bbox = self.image.info.bbox;
        if !bbox.is_empty() {
            match self.image.info.justify_a {
                ImageJustify::LowerLeft => {
                    self.image.info.justify_offset_a -= bbox.min_x;
                }
                ImageJustify::Center => {
                    self.image.info.justify_offset_a = -(bbox.min_x + bbox.max_x) / 2.0;
                }
                ImageJustify::None => {}
            }
            match self.image.info.justify_b {
                ImageJustify::LowerLeft => {
                    self.image.info.justify_offset_b -= bbox.min_y;
                }
                ImageJustify::Center => {
                    self.image.info.justify_offset_b = -(bbox.min_y + bbox.max_y) / 2.0;
                }
                ImageJustify::None => {}
            }
        }
        self.image
    }

    pub fn set_side(&mut self, side: BoardSide) {
        self.image.side = Some(side);
    }
}

/// Multi-quadrant (G75) arc: I/J are signed offsets from the start point to
/// the center. A zero-length chord means a full circle.
fn calc_cirseg_mq(start: (f64, f64), stop: (f64, f64), i: f64, j: f64, cw: bool) -> CirSeg {
    let cp_x = start.0 + i;
    let cp_y = start.1 + j;
    let r = (i * i + j * j).sqrt();
    let mut angle1 = (start.1 - cp_y).atan2(start.0 - cp_x).to_degrees();
    let mut angle2 = (stop.1 - cp_y).atan2(stop.0 - cp_x).to_degrees();

    if cw {
        if angle2 > angle1 {
            angle2 -= 360.0;
        }
        if (angle1 - angle2).abs() < 1e-9 {
            angle2 = angle1 - 360.0;
        }
    } else {
        if angle2 < angle1 {
            angle2 += 360.0;
        }
        if (angle1 - angle2).abs() < 1e-9 {
            angle2 = angle1 + 360.0;
        }
    }

    // Keep angles in a sane window for downstream consumers.
    if angle1 > 360.0 || angle1 < -360.0 {
        angle1 %= 360.0;
    }
    if angle2 > 720.0 || angle2 < -720.0 {
        angle2 %= 360.0;
    }

    CirSeg {
        cp_x,
        cp_y,
        width: r * 2.0,
        height: r * 2.0,
        angle1,
        angle2,
    }
}

/// Single-quadrant (G74) arc: I/J carry no signs; pick the center candidate
/// whose radii agree for both endpoints with a sweep of at most 90 degrees
/// in the arc direction.
fn calc_cirseg_sq(start: (f64, f64), stop: (f64, f64), i: f64, j: f64, cw: bool) -> CirSeg {
    let mut best: Option<(f64, CirSeg)> = None;

    for (si, sj) in [(1.0, 1.0), (-1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)] {
        let cp_x = start.0 + si * i;
        let cp_y = start.1 + sj * j;
        let r1 = ((start.0 - cp_x).powi(2) + (start.1 - cp_y).powi(2)).sqrt();
        let r2 = ((stop.0 - cp_x).powi(2) + (stop.1 - cp_y).powi(2)).sqrt();
        let mismatch = (r1 - r2).abs();

        let angle1 = (start.1 - cp_y).atan2(start.0 - cp_x).to_degrees();
        let mut angle2 = (stop.1 - cp_y).atan2(stop.0 - cp_x).to_degrees();
        if cw {
            if angle2 > angle1 {
                angle2 -= 360.0;
            }
        } else if angle2 < angle1 {
            angle2 += 360.0;
        }
        let sweep = (angle2 - angle1).abs();
        if sweep > 90.0 + 1e-6 {
            continue;
        }

        let seg = CirSeg {
            cp_x,
            cp_y,
            width: r1 * 2.0,
            height: r1 * 2.0,
            angle1,
            angle2,
        };
        if best.as_ref().map_or(true, |(m, _)| mismatch < *m) {
            best = Some((mismatch, seg));
        }
    }

    best.map(|(_, seg)| seg)
        .unwrap_or_else(|| calc_cirseg_mq(start, stop, i, j, cw))
}

/// Interpret a command sequence into an image.
pub fn interpret(commands: &[LocatedCommand], file: &str) -> Result<Image, IngestError> {
    let mut interp = Interpreter::new(file);
    for cmd in commands {
        interp.process(cmd)?;
    }
    Ok(interp.finish())
}
