//! The layered image model all parsers normalize into.
//!
//! One [`Image`] per parsed file. Nets reference layer and netstate
//! snapshots by index into the image-owned vectors, so change detection is
//! an integer compare. All coordinates are stored in inches regardless of
//! the source unit; `info.unit` records what the file used.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::attrs::AttrSet;

// ─── Units and formats ───────────────────────────────────────────────

pub const MM_PER_INCH: f64 = 25.4;

/// Lowest aperture code a file may define; codes below 10 are D-commands.
pub const APERTURE_MIN: usize = 10;
pub const APERTURE_MAX: usize = 9999;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Unit {
    #[default]
    Inch,
    Mm,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Polarity {
    #[default]
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LayerPolarity {
    #[default]
    Dark,
    Clear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OmitZeros {
    #[default]
    Leading,
    Trailing,
    Explicit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CoordMode {
    #[default]
    Absolute,
    Incremental,
}

/// Numeric format in force for a file. Set once by `%FS` (or inferred for
/// drill files); changing it mid-file is invalid.
#[derive(Debug, Clone, PartialEq)]
pub struct Format {
    pub omit_zeros: OmitZeros,
    pub coord_mode: CoordMode,
    pub x_int: u8,
    pub x_dec: u8,
    pub y_int: u8,
    pub y_dec: u8,
    /// Decimal digits for tool diameters (drill files).
    pub tool_dec: u8,
}

impl Default for Format {
    fn default() -> Self {
        Format {
            omit_zeros: OmitZeros::Leading,
            coord_mode: CoordMode::Absolute,
            x_int: 2,
            x_dec: 4,
            y_int: 2,
            y_dec: 4,
            tool_dec: 4,
        }
    }
}

// ─── Bounding box ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn empty() -> Self {
        BBox {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn expand_point(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn expand_bbox(&mut self, other: &BBox) {
        if !other.is_empty() {
            self.expand_point(other.min_x, other.min_y);
            self.expand_point(other.max_x, other.max_y);
        }
    }

    /// This box translated by (dx, dy).
    pub fn offset(&self, dx: f64, dy: f64) -> BBox {
        BBox {
            min_x: self.min_x + dx,
            min_y: self.min_y + dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }
}

impl Default for BBox {
    fn default() -> Self {
        BBox::empty()
    }
}

// ─── Apertures ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ApertureShape {
    Circle {
        diameter: f64,
        /// Hole X dimension; rectangular holes (legacy) collapse to this.
        hole: Option<f64>,
    },
    Rectangle {
        x_size: f64,
        y_size: f64,
        hole: Option<f64>,
    },
    Oval {
        x_size: f64,
        y_size: f64,
        hole: Option<f64>,
    },
    Polygon {
        diameter: f64,
        sides: u32,
        rotation: f64,
        hole: Option<f64>,
    },
    Macro {
        name: String,
        params: Vec<f64>,
    },
}

/// One record of a flattened aperture macro. Exposure: 0 clear, 1 dark,
/// 2 toggle; callers track it imperatively while walking the list.
#[derive(Debug, Clone, PartialEq)]
pub enum MacroPrim {
    Circle {
        exposure: f64,
        diameter: f64,
        center: (f64, f64),
    },
    Outline {
        exposure: f64,
        points: Vec<(f64, f64)>,
        rotation: f64,
    },
    Polygon {
        exposure: f64,
        sides: u32,
        center: (f64, f64),
        diameter: f64,
        rotation: f64,
    },
    Moire {
        center: (f64, f64),
        outer_diameter: f64,
        ring_thickness: f64,
        gap: f64,
        rings: u32,
        cross_thickness: f64,
        cross_length: f64,
        rotation: f64,
    },
    Thermal {
        center: (f64, f64),
        outer_diameter: f64,
        inner_diameter: f64,
        cross_thickness: f64,
        rotation: f64,
    },
    Line20 {
        exposure: f64,
        width: f64,
        start: (f64, f64),
        end: (f64, f64),
        rotation: f64,
    },
    Line21 {
        exposure: f64,
        width: f64,
        height: f64,
        center: (f64, f64),
        rotation: f64,
    },
    Line22 {
        exposure: f64,
        width: f64,
        height: f64,
        lower_left: (f64, f64),
        rotation: f64,
    },
}

fn rotate_deg(x: f64, y: f64, deg: f64) -> (f64, f64) {
    if deg == 0.0 {
        return (x, y);
    }
    let r = deg.to_radians();
    (x * r.cos() - y * r.sin(), x * r.sin() + y * r.cos())
}

fn expand_rotated_rect(b: &mut BBox, cx: f64, cy: f64, hw: f64, hh: f64, deg: f64) {
    for (sx, sy) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
        let (x, y) = rotate_deg(cx + sx * hw, cy + sy * hh, deg);
        b.expand_point(x, y);
    }
}

impl MacroPrim {
    /// Axis-aligned extent of the primitive in the aperture's local frame.
    pub fn bbox(&self) -> BBox {
        let mut b = BBox::empty();
        match self {
            MacroPrim::Circle { diameter, center, .. } => {
                let r = diameter.abs() / 2.0;
                b.expand_point(center.0 - r, center.1 - r);
                b.expand_point(center.0 + r, center.1 + r);
            }
            MacroPrim::Outline { points, rotation, .. } => {
                for &(x, y) in points {
                    let (rx, ry) = rotate_deg(x, y, *rotation);
                    b.expand_point(rx, ry);
                }
            }
            MacroPrim::Polygon {
                center, diameter, ..
            } => {
                let r = diameter.abs() / 2.0;
                b.expand_point(center.0 - r, center.1 - r);
                b.expand_point(center.0 + r, center.1 + r);
            }
            MacroPrim::Moire {
                center,
                outer_diameter,
                cross_length,
                ..
            } => {
                let r = (outer_diameter.abs() / 2.0).max(cross_length.abs() / 2.0);
                b.expand_point(center.0 - r, center.1 - r);
                b.expand_point(center.0 + r, center.1 + r);
            }
            MacroPrim::Thermal {
                center,
                outer_diameter,
                ..
            } => {
                let r = outer_diameter.abs() / 2.0;
                b.expand_point(center.0 - r, center.1 - r);
                b.expand_point(center.0 + r, center.1 + r);
            }
            MacroPrim::Line20 {
                width,
                start,
                end,
                rotation,
                ..
            } => {
                let hw = width.abs() / 2.0;
                for &(x, y) in &[*start, *end] {
                    let (rx, ry) = rotate_deg(x, y, *rotation);
                    b.expand_point(rx - hw, ry - hw);
                    b.expand_point(rx + hw, ry + hw);
                }
            }
            MacroPrim::Line21 {
                width,
                height,
                center,
                rotation,
                ..
            } => {
                expand_rotated_rect(&mut b, center.0, center.1, width / 2.0, height / 2.0, *rotation);
            }
            MacroPrim::Line22 {
                width,
                height,
                lower_left,
                rotation,
                ..
            } => {
                expand_rotated_rect(
                    &mut b,
                    lower_left.0 + width / 2.0,
                    lower_left.1 + height / 2.0,
                    width / 2.0,
                    height / 2.0,
                    *rotation,
                );
            }
        }
        b
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aperture {
    pub shape: ApertureShape,
    /// Flattened macro primitives; empty unless `shape` is a macro.
    pub simplified: Vec<MacroPrim>,
    pub unit: Unit,
    pub attrs: AttrSet,
}

impl Aperture {
    pub fn new(shape: ApertureShape) -> Self {
        Aperture {
            shape,
            simplified: Vec::new(),
            unit: Unit::Inch,
            attrs: AttrSet::new(),
        }
    }

    pub fn circle(diameter: f64) -> Self {
        Aperture::new(ApertureShape::Circle {
            diameter,
            hole: None,
        })
    }

    /// Stroke width to use when this aperture draws a track.
    pub fn stroke_width(&self) -> f64 {
        match &self.shape {
            ApertureShape::Circle { diameter, .. } => *diameter,
            ApertureShape::Rectangle { x_size, y_size, .. }
            | ApertureShape::Oval { x_size, y_size, .. } => x_size.min(*y_size),
            ApertureShape::Polygon { diameter, .. } => *diameter,
            ApertureShape::Macro { .. } => 0.0,
        }
    }

    /// Smallest axis-aligned rectangle enclosing the aperture, centered on
    /// the flash point, after macro simplification.
    pub fn envelope(&self) -> BBox {
        let mut b = BBox::empty();
        match &self.shape {
            ApertureShape::Circle { diameter, .. } => {
                let r = diameter / 2.0;
                b.expand_point(-r, -r);
                b.expand_point(r, r);
            }
            ApertureShape::Rectangle { x_size, y_size, .. }
            | ApertureShape::Oval { x_size, y_size, .. } => {
                b.expand_point(-x_size / 2.0, -y_size / 2.0);
                b.expand_point(x_size / 2.0, y_size / 2.0);
            }
            ApertureShape::Polygon { diameter, .. } => {
                let r = diameter / 2.0;
                b.expand_point(-r, -r);
                b.expand_point(r, r);
            }
            ApertureShape::Macro { .. } => {
                for p in &self.simplified {
                    b.expand_bbox(&p.bbox());
                }
                if b.is_empty() {
                    // A macro with no records is a valid no-op aperture.
                    b.expand_point(0.0, 0.0);
                }
            }
        }
        b
    }
}

// ─── Layers and netstates ────────────────────────────────────────────

/// Polarity/name/rotation snapshot started by `%LP`, `%LN` or `%LR`.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub polarity: LayerPolarity,
    /// CCW degrees from `%LR`.
    pub rotation: f64,
    pub name: Option<String>,
}

impl Default for Layer {
    fn default() -> Self {
        Layer {
            polarity: LayerPolarity::Dark,
            rotation: 0.0,
            name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MirrorState {
    #[default]
    None,
    FlipA,
    FlipB,
    FlipAB,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AxisSelect {
    #[default]
    NoSelect,
    SwapAB,
}

/// Scale/offset/mirror/axis-swap snapshot started by `%SF`, `%OF`, `%MI`
/// or `%AS`.
#[derive(Debug, Clone, PartialEq)]
pub struct NetState {
    pub axis_select: AxisSelect,
    pub mirror: MirrorState,
    pub offset_a: f64,
    pub offset_b: f64,
    pub scale_a: f64,
    pub scale_b: f64,
}

impl Default for NetState {
    fn default() -> Self {
        NetState {
            axis_select: AxisSelect::NoSelect,
            mirror: MirrorState::None,
            offset_a: 0.0,
            offset_b: 0.0,
            scale_a: 1.0,
            scale_b: 1.0,
        }
    }
}

// ─── Nets ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Linear10x,
    Linear01x,
    Linear001x,
    CwCircular,
    CcwCircular,
    RegionStart,
    RegionEnd,
    Deleted,
}

impl Interpolation {
    pub fn is_linear(self) -> bool {
        matches!(
            self,
            Interpolation::Linear
                | Interpolation::Linear10x
                | Interpolation::Linear01x
                | Interpolation::Linear001x
        )
    }

    pub fn is_circular(self) -> bool {
        matches!(self, Interpolation::CwCircular | Interpolation::CcwCircular)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApertureState {
    Off,
    On,
    Flash,
}

/// Circular segment data for arc nets: center point, sweep angles in CCW
/// degrees, and the ellipse axes (width = 2·radius for round arcs).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CirSeg {
    pub cp_x: f64,
    pub cp_y: f64,
    pub width: f64,
    pub height: f64,
    pub angle1: f64,
    pub angle2: f64,
}

/// One stroked or flashed object.
#[derive(Debug, Clone, PartialEq)]
pub struct Net {
    pub start_x: f64,
    pub start_y: f64,
    pub stop_x: f64,
    pub stop_y: f64,
    pub cirseg: Option<CirSeg>,
    pub interpolation: Interpolation,
    pub aperture_state: ApertureState,
    /// Aperture code (Gerber D-number or drill tool number).
    pub aperture: usize,
    pub bbox: BBox,
    pub label: Option<String>,
    /// Object-scope attributes live at emission, chained to the aperture's.
    pub attrs: AttrSet,
    /// Index into [`Image::layers`].
    pub layer: usize,
    /// Index into [`Image::states`].
    pub state: usize,
    /// For nets inside a G36/G37 region: index of the region's start net.
    pub region_of: Option<usize>,
}

impl Net {
    pub fn new(layer: usize, state: usize) -> Self {
        Net {
            start_x: 0.0,
            start_y: 0.0,
            stop_x: 0.0,
            stop_y: 0.0,
            cirseg: None,
            interpolation: Interpolation::Linear,
            aperture_state: ApertureState::Off,
            aperture: 0,
            bbox: BBox::empty(),
            label: None,
            attrs: AttrSet::new(),
            layer,
            state,
            region_of: None,
        }
    }
}

// ─── Image ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Rs274x,
    Drill,
    PickAndPlace,
    Ipcd356a,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardSide {
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageJustify {
    #[default]
    None,
    LowerLeft,
    Center,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    pub name: Option<String>,
    pub polarity: Polarity,
    pub unit: Unit,
    pub offset_a: f64,
    pub offset_b: f64,
    /// `%IR`, CCW degrees.
    pub rotation: f64,
    pub justify_a: ImageJustify,
    pub justify_b: ImageJustify,
    pub justify_offset_a: f64,
    pub justify_offset_b: f64,
    pub plotter_film: Option<String>,
    pub bbox: BBox,
}

impl Default for ImageInfo {
    fn default() -> Self {
        ImageInfo {
            name: None,
            polarity: Polarity::Positive,
            unit: Unit::Inch,
            offset_a: 0.0,
            offset_b: 0.0,
            rotation: 0.0,
            justify_a: ImageJustify::None,
            justify_b: ImageJustify::None,
            justify_offset_a: 0.0,
            justify_offset_b: 0.0,
            plotter_film: None,
            bbox: BBox::empty(),
        }
    }
}

/// One parsed file.
#[derive(Debug, Clone)]
pub struct Image {
    pub kind: LayerKind,
    /// Which board side a pick-and-place image describes.
    pub side: Option<BoardSide>,
    pub info: ImageInfo,
    pub format: Format,
    pub apertures: BTreeMap<usize, Aperture>,
    pub layers: Vec<Layer>,
    pub states: Vec<NetState>,
    pub nets: Vec<Net>,
    pub attrs: AttrSet,
}

impl Image {
    pub fn new(kind: LayerKind) -> Self {
        Image {
            kind,
            side: None,
            info: ImageInfo::default(),
            format: Format::default(),
            apertures: BTreeMap::new(),
            layers: vec![Layer::default()],
            states: vec![NetState::default()],
            nets: Vec::new(),
            attrs: AttrSet::new(),
        }
    }

    /// Append a net, compute its bounding box from the referenced
    /// aperture's envelope, and fold it into the image box. Returns the
    /// net's index.
    pub fn push_net(&mut self, mut net: Net) -> usize {
        debug_assert!(net.layer < self.layers.len());
        debug_assert!(net.state < self.states.len());

        if net.interpolation != Interpolation::Deleted {
            let env = self
                .apertures
                .get(&net.aperture)
                .map(|a| a.envelope())
                .unwrap_or_else(BBox::empty);

            let mut bbox = BBox::empty();
            match net.aperture_state {
                ApertureState::Flash => {
                    bbox.expand_bbox(&env.offset(net.stop_x, net.stop_y));
                }
                ApertureState::On => {
                    if env.is_empty() {
                        bbox.expand_point(net.start_x, net.start_y);
                        bbox.expand_point(net.stop_x, net.stop_y);
                    } else {
                        bbox.expand_bbox(&env.offset(net.start_x, net.start_y));
                        bbox.expand_bbox(&env.offset(net.stop_x, net.stop_y));
                    }
                    if let Some(cs) = &net.cirseg {
                        // Arc extent: the full circle box is a safe cover.
                        let r = cs.width / 2.0;
                        bbox.expand_point(cs.cp_x - r, cs.cp_y - r);
                        bbox.expand_point(cs.cp_x + r, cs.cp_y + r);
                    }
                }
                ApertureState::Off => {
                    if matches!(
                        net.interpolation,
                        Interpolation::RegionStart | Interpolation::RegionEnd
                    ) || net.region_of.is_some()
                    {
                        // Region boundary vertices count toward the box even
                        // though nothing strokes them.
                        bbox.expand_point(net.start_x, net.start_y);
                        bbox.expand_point(net.stop_x, net.stop_y);
                    }
                }
            }
            if net.region_of.is_some() && net.aperture_state == ApertureState::On {
                bbox.expand_point(net.start_x, net.start_y);
                bbox.expand_point(net.stop_x, net.stop_y);
            }
            net.bbox = bbox;
            self.info.bbox.expand_bbox(&net.bbox);
        }

        self.nets.push(net);
        self.nets.len() - 1
    }

    /// Begin a new layer snapshot cloned from the current one; returns its
    /// index. Snapshots are append-only and immutable once a net refers to
    /// them.
    pub fn push_layer(&mut self, layer: Layer) -> usize {
        self.layers.push(layer);
        self.layers.len() - 1
    }

    pub fn push_state(&mut self, state: NetState) -> usize {
        self.states.push(state);
        self.states.len() - 1
    }

    /// Deep-copy under a user transform, producing an image ready for
    /// export. Attribute sets are value-copied (interned handles).
    pub fn duplicate(&self, t: &UserTransform) -> Image {
        let mut out = self.clone();
        out.info.bbox = BBox::empty();

        let (sx, sy) = t.effective_scale();
        let rot = t.rotation;

        let xform = |x: f64, y: f64| -> (f64, f64) {
            let (x, y) = (x * sx, y * sy);
            let (x, y) = rotate_deg(x, y, rot.to_degrees());
            (x + t.translate_x, y + t.translate_y)
        };

        for net in &mut out.nets {
            let (x1, y1) = xform(net.start_x, net.start_y);
            let (x2, y2) = xform(net.stop_x, net.stop_y);
            net.start_x = x1;
            net.start_y = y1;
            net.stop_x = x2;
            net.stop_y = y2;
            if let Some(cs) = &mut net.cirseg {
                let (cx, cy) = xform(cs.cp_x, cs.cp_y);
                cs.cp_x = cx;
                cs.cp_y = cy;
                cs.width *= sx.abs();
                cs.height *= sy.abs();
                let mirrored = (sx < 0.0) != (sy < 0.0);
                let rot_deg = rot.to_degrees();
                if mirrored {
                    cs.angle1 = -cs.angle1 + rot_deg;
                    cs.angle2 = -cs.angle2 + rot_deg;
                } else {
                    cs.angle1 += rot_deg;
                    cs.angle2 += rot_deg;
                }
            }
            if (sx < 0.0) != (sy < 0.0) {
                net.interpolation = match net.interpolation {
                    Interpolation::CwCircular => Interpolation::CcwCircular,
                    Interpolation::CcwCircular => Interpolation::CwCircular,
                    other => other,
                };
            }
        }

        // Scale aperture dimensions by the mean magnitude; a uniform scale
        // is the only case the writer can represent exactly.
        let s = (sx.abs() + sy.abs()) / 2.0;
        if (s - 1.0).abs() > 1e-12 {
            for ap in out.apertures.values_mut() {
                scale_aperture(ap, s);
            }
        }

        if t.inverted {
            out.info.polarity = match out.info.polarity {
                Polarity::Positive => Polarity::Negative,
                Polarity::Negative => Polarity::Positive,
            };
        }

        // Rebuild net and image boxes under the new geometry.
        let nets = std::mem::take(&mut out.nets);
        for net in nets {
            out.push_net(net);
        }
        out
    }
}

fn scale_aperture(ap: &mut Aperture, s: f64) {
    match &mut ap.shape {
        ApertureShape::Circle { diameter, hole } => {
            *diameter *= s;
            if let Some(h) = hole {
                *h *= s;
            }
        }
        ApertureShape::Rectangle { x_size, y_size, hole }
        | ApertureShape::Oval { x_size, y_size, hole } => {
            *x_size *= s;
            *y_size *= s;
            if let Some(h) = hole {
                *h *= s;
            }
        }
        ApertureShape::Polygon { diameter, hole, .. } => {
            *diameter *= s;
            if let Some(h) = hole {
                *h *= s;
            }
        }
        ApertureShape::Macro { params, .. } => {
            for p in params.iter_mut() {
                *p *= s;
            }
        }
    }
    for prim in &mut ap.simplified {
        scale_macro_prim(prim, s);
    }
}

/// Scale the linear dimensions of a simplified primitive; rotations are
/// untouched.
pub fn scale_macro_prim(p: &mut MacroPrim, s: f64) {
    let sc = |v: &mut f64| *v *= s;
    let scp = |c: &mut (f64, f64)| {
        c.0 *= s;
        c.1 *= s;
    };
    match p {
        MacroPrim::Circle { diameter, center, .. } => {
            sc(diameter);
            scp(center);
        }
        MacroPrim::Outline { points, .. } => {
            for pt in points {
                scp(pt);
            }
        }
        MacroPrim::Polygon { center, diameter, .. } => {
            scp(center);
            sc(diameter);
        }
        MacroPrim::Moire {
            center,
            outer_diameter,
            ring_thickness,
            gap,
            cross_thickness,
            cross_length,
            ..
        } => {
            scp(center);
            sc(outer_diameter);
            sc(ring_thickness);
            sc(gap);
            sc(cross_thickness);
            sc(cross_length);
        }
        MacroPrim::Thermal {
            center,
            outer_diameter,
            inner_diameter,
            cross_thickness,
            ..
        } => {
            scp(center);
            sc(outer_diameter);
            sc(inner_diameter);
            sc(cross_thickness);
        }
        MacroPrim::Line20 { width, start, end, .. } => {
            sc(width);
            scp(start);
            scp(end);
        }
        MacroPrim::Line21 { width, height, center, .. } => {
            sc(width);
            sc(height);
            scp(center);
        }
        MacroPrim::Line22 {
            width,
            height,
            lower_left,
            ..
        } => {
            sc(width);
            sc(height);
            scp(lower_left);
        }
    }
}

// ─── User transform ──────────────────────────────────────────────────

/// Display-side transform applied per file slot; the core only touches it
/// for duplication and bounding-box queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserTransform {
    pub translate_x: f64,
    pub translate_y: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    /// CCW radians.
    pub rotation: f64,
    pub mirror_x: bool,
    pub mirror_y: bool,
    pub inverted: bool,
}

impl Default for UserTransform {
    fn default() -> Self {
        UserTransform {
            translate_x: 0.0,
            translate_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            mirror_x: false,
            mirror_y: false,
            inverted: false,
        }
    }
}

impl UserTransform {
    /// Scale with mirror folded in as sign.
    pub fn effective_scale(&self) -> (f64, f64) {
        let sx = if self.mirror_y { -self.scale_x } else { self.scale_x };
        let sy = if self.mirror_x { -self.scale_y } else { self.scale_y };
        (sx, sy)
    }

    pub fn is_identity(&self) -> bool {
        *self == UserTransform::default()
    }
}
