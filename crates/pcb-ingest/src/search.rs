//! Geometric iteration over an image's netlist.
//!
//! Each drawn object is presented to a visitor in a canonical local frame
//! together with a transform stack, so point-in-shape and distance-to-border
//! queries reduce to a handful of closed forms. This is what selection and
//! the IPC-D-356A annotation pass are built on.

use crate::attrs::Sym;
use crate::types::{
    Aperture, ApertureShape, ApertureState, AxisSelect, Image, Interpolation, MacroPrim,
    MirrorState, Net, NetState,
};

/// Transform stack depth; layer, netstate, macro and flash levels nest
/// within it.
pub const MAX_XFORM: usize = 5;

// ─── 2×3 affine matrix ───────────────────────────────────────────────

/// Row-major 2×3 affine transform: `x' = xx·x + xy·y + x0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub xx: f64,
    pub yx: f64,
    pub xy: f64,
    pub yy: f64,
    pub x0: f64,
    pub y0: f64,
}

impl Matrix {
    pub fn identity() -> Self {
        Matrix {
            xx: 1.0,
            yx: 0.0,
            xy: 0.0,
            yy: 1.0,
            x0: 0.0,
            y0: 0.0,
        }
    }

    /// `self ∘ other`: apply `other` first, then `self`.
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            xx: self.xx * other.xx + self.xy * other.yx,
            yx: self.yx * other.xx + self.yy * other.yx,
            xy: self.xx * other.xy + self.xy * other.yy,
            yy: self.yx * other.xy + self.yy * other.yy,
            x0: self.xx * other.x0 + self.xy * other.y0 + self.x0,
            y0: self.yx * other.x0 + self.yy * other.y0 + self.y0,
        }
    }

    pub fn translate(&mut self, tx: f64, ty: f64) {
        *self = self.multiply(&Matrix {
            x0: tx,
            y0: ty,
            ..Matrix::identity()
        });
    }

    pub fn scale(&mut self, sx: f64, sy: f64) {
        *self = self.multiply(&Matrix {
            xx: sx,
            yy: sy,
            yx: 0.0,
            xy: 0.0,
            x0: 0.0,
            y0: 0.0,
        });
    }

    pub fn rotate(&mut self, radians: f64) {
        let (s, c) = radians.sin_cos();
        *self = self.multiply(&Matrix {
            xx: c,
            yx: s,
            xy: -s,
            yy: c,
            x0: 0.0,
            y0: 0.0,
        });
    }

    pub fn transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.xx * x + self.xy * y + self.x0,
            self.yx * x + self.yy * y + self.y0,
        )
    }

    pub fn invert(&self) -> Option<Matrix> {
        let det = self.xx * self.yy - self.xy * self.yx;
        if det.abs() < 1e-30 {
            return None;
        }
        let xx = self.yy / det;
        let xy = -self.xy / det;
        let yx = -self.yx / det;
        let yy = self.xx / det;
        Some(Matrix {
            xx,
            xy,
            yx,
            yy,
            x0: -(xx * self.x0 + xy * self.y0),
            y0: -(yx * self.x0 + yy * self.y0),
        })
    }
}

// ─── Contexts and state ──────────────────────────────────────────────

/// What shape the visitor is looking at, in its canonical local frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchContext {
    /// Disk centered at the origin, radius `dx`.
    Circle,
    /// Annulus with outer radius `dx`, inner radius `dy`.
    Ring,
    /// Lower-left at the origin, `dx` × `dy`.
    Rectangle,
    /// Rounded-end flash; same frame as `Track`.
    Obround,
    /// Filled region bounded by `poly`, even-odd rule.
    Polygon,
    /// Stroked segment from (0,0) to (dx,0), half-width `hlw`.
    Track,
    /// Open polyline with half-width `hlw` and round ends.
    PolyTrack,
}

pub struct SearchState<'a> {
    pub image: &'a Image,
    /// Index of the current net; for regions, the region's start net.
    pub net_index: usize,
    pub aperture: Option<&'a Aperture>,
    /// True while walking a simplified aperture macro.
    pub in_macro: bool,
    /// Whether the current primitive draws clear (from macro exposure).
    pub clear: bool,

    stack: Vec<(Matrix, bool)>,
    pub dx: f64,
    pub dy: f64,
    pub hlw: f64,
    pub poly: Vec<(f64, f64)>,
}

impl<'a> SearchState<'a> {
    fn new(image: &'a Image) -> Self {
        SearchState {
            image,
            net_index: 0,
            aperture: None,
            in_macro: false,
            clear: false,
            stack: vec![(Matrix::identity(), false)],
            dx: 0.0,
            dy: 0.0,
            hlw: 0.0,
            poly: Vec::new(),
        }
    }

    pub fn net(&self) -> &'a Net {
        &self.image.nets[self.net_index]
    }

    pub fn matrix(&self) -> &Matrix {
        &self.stack.last().unwrap().0
    }

    fn top(&mut self) -> &mut Matrix {
        &mut self.stack.last_mut().unwrap().0
    }

    fn push(&mut self) {
        debug_assert!(self.stack.len() < MAX_XFORM);
        let top = *self.stack.last().unwrap();
        self.stack.push(top);
        self.clear = self.stack.last().unwrap().1;
    }

    fn pop(&mut self) {
        debug_assert!(self.stack.len() > 1);
        self.stack.pop();
        self.clear = self.stack.last().unwrap().1;
    }

    fn set_clear(&mut self, clear: bool) {
        self.stack.last_mut().unwrap().1 = clear;
        self.clear = clear;
    }

    fn update_exposure(&mut self, exposure: f64) {
        match exposure as i32 {
            2 => {
                let c = self.stack.last().unwrap().1;
                self.set_clear(!c);
            }
            1 => self.set_clear(false),
            _ => self.set_clear(true),
        }
    }

    /// Signed distance from a world point to the border of the current
    /// primitive: negative strictly inside, zero on the border, positive
    /// outside. Infinity when the transform cannot be inverted.
    pub fn distance_to_border(&self, ctx: SearchContext, x: f64, y: f64) -> f64 {
        let Some(inv) = self.matrix().invert() else {
            return f64::INFINITY;
        };
        let (lx, ly) = inv.transform_point(x, y);
        self.distance_local(ctx, lx, ly)
    }

    /// Same, for a point already in the primitive's local frame.
    pub fn distance_local(&self, ctx: SearchContext, x: f64, y: f64) -> f64 {
        match ctx {
            SearchContext::Circle => (x * x + y * y).sqrt() - self.dx,
            SearchContext::Ring => {
                let r = (x * x + y * y).sqrt();
                (r - self.dx).max(self.dy - r)
            }
            SearchContext::Rectangle => {
                let rx = (x - self.dx).max(-x);
                let ry = (y - self.dy).max(-y);
                if rx > 0.0 && ry > 0.0 {
                    (rx * rx + ry * ry).sqrt()
                } else {
                    rx.max(ry)
                }
            }
            SearchContext::Obround | SearchContext::Track => {
                if x >= 0.0 && x <= self.dx {
                    (y - self.hlw).max(-self.hlw - y)
                } else if x < 0.0 {
                    (x * x + y * y).sqrt() - self.hlw
                } else {
                    let ex = x - self.dx;
                    (ex * ex + y * y).sqrt() - self.hlw
                }
            }
            SearchContext::Polygon => {
                let inside = point_in_polygon((x, y), &self.poly);
                let d = distance_to_closed_polygon((x, y), &self.poly);
                if inside {
                    -d
                } else {
                    d
                }
            }
            SearchContext::PolyTrack => distance_to_open_polygon((x, y), &self.poly) - self.hlw,
        }
    }
}

// ─── Polygon helpers ─────────────────────────────────────────────────

fn side_of_line(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> f64 {
    (b.0 - a.0) * (p.1 - a.1) - (p.0 - a.0) * (b.1 - a.1)
}

/// Non-zero winding test.
pub fn point_in_polygon(p: (f64, f64), poly: &[(f64, f64)]) -> bool {
    let n = poly.len();
    if n < 3 {
        return false;
    }
    let mut wn = 0i32;
    for i in 0..n {
        let j = (i + 1) % n;
        if poly[i].1 <= p.1 {
            if poly[j].1 > p.1 && side_of_line(poly[i], poly[j], p) > 0.0 {
                wn += 1;
            }
        } else if poly[j].1 <= p.1 && side_of_line(poly[i], poly[j], p) < 0.0 {
            wn -= 1;
        }
    }
    wn != 0
}

fn distance_point_to_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let len2 = dx * dx + dy * dy;
    let u = if len2 < 1e-8 {
        0.5
    } else {
        ((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len2
    };
    let u = u.clamp(0.0, 1.0);
    let sx = a.0 + u * dx;
    let sy = a.1 + u * dy;
    ((p.0 - sx).powi(2) + (p.1 - sy).powi(2)).sqrt()
}

fn distance_to_closed_polygon(p: (f64, f64), poly: &[(f64, f64)]) -> f64 {
    let n = poly.len();
    let mut best = f64::INFINITY;
    for i in 0..n {
        let j = (i + 1) % n;
        best = best.min(distance_point_to_segment(p, poly[i], poly[j]));
    }
    best
}

fn distance_to_open_polygon(p: (f64, f64), poly: &[(f64, f64)]) -> f64 {
    let mut best = f64::INFINITY;
    for w in poly.windows(2) {
        best = best.min(distance_point_to_segment(p, w[0], w[1]));
    }
    best
}

// ─── Iteration ───────────────────────────────────────────────────────

fn apply_netstate(ss: &mut SearchState<'_>, state: &NetState) {
    let m = ss.top();
    m.scale(state.scale_a, state.scale_b);
    m.translate(state.offset_a, state.offset_b);
    match state.mirror {
        MirrorState::FlipA => m.scale(-1.0, 1.0),
        MirrorState::FlipB => m.scale(1.0, -1.0),
        MirrorState::FlipAB => m.scale(-1.0, -1.0),
        MirrorState::None => {}
    }
    if state.axis_select == AxisSelect::SwapAB {
        m.rotate(270f64.to_radians());
        m.scale(1.0, -1.0);
    }
}

fn arc_points(
    center: (f64, f64),
    r: f64,
    a1_deg: f64,
    a2_deg: f64,
    out: &mut Vec<(f64, f64)>,
) {
    let a1 = a1_deg.to_radians();
    let a2 = a2_deg.to_radians();
    // ~3 degrees per segment is plenty for hit testing.
    let n = (((a2 - a1).abs() * 20.0).ceil() as usize).max(2);
    for k in 0..=n {
        let a = a1 + (a2 - a1) * (k as f64) / (n as f64);
        out.push((center.0 + r * a.cos(), center.1 + r * a.sin()));
    }
}

fn visit_macro<F>(ss: &mut SearchState<'_>, prims: &[MacroPrim], visitor: &mut F)
where
    F: FnMut(&SearchState<'_>, SearchContext),
{
    ss.push();
    ss.in_macro = true;
    for prim in prims {
        match prim {
            MacroPrim::Circle {
                exposure,
                diameter,
                center,
            } => {
                ss.update_exposure(*exposure);
                ss.top().translate(center.0, center.1);
                ss.dx = diameter * 0.5;
                visitor(ss, SearchContext::Circle);
            }
            MacroPrim::Outline {
                exposure,
                points,
                rotation,
            } => {
                ss.update_exposure(*exposure);
                ss.top().rotate(rotation.to_radians());
                ss.poly = points.clone();
                visitor(ss, SearchContext::Polygon);
            }
            MacroPrim::Polygon {
                exposure,
                sides,
                center,
                diameter,
                rotation,
            } => {
                ss.update_exposure(*exposure);
                ss.top().translate(center.0, center.1);
                ss.top().rotate(rotation.to_radians());
                regular_polygon(ss, *diameter, *sides, visitor);
            }
            MacroPrim::Moire {
                center,
                outer_diameter,
                ..
            } => {
                // Approximated by its largest ring; crosshairs ignored.
                ss.top().translate(center.0, center.1);
                ss.dx = outer_diameter * 0.5;
                visitor(ss, SearchContext::Circle);
            }
            MacroPrim::Thermal {
                center,
                outer_diameter,
                inner_diameter,
                ..
            } => {
                // Treated as a ring, ignoring the cross gaps.
                ss.top().translate(center.0, center.1);
                ss.dx = outer_diameter * 0.5;
                ss.dy = inner_diameter * 0.5;
                visitor(ss, SearchContext::Ring);
            }
            MacroPrim::Line20 {
                exposure,
                width,
                start,
                end,
                rotation,
            } => {
                ss.update_exposure(*exposure);
                let hlw = width * 0.5;
                let dx = end.0 - start.0;
                let dy = end.1 - start.1;
                ss.top().rotate(rotation.to_radians());
                ss.top().translate(start.0, start.1);
                ss.top().rotate(dy.atan2(dx));
                ss.top().translate(-hlw, 0.0);
                ss.dx = (dx * dx + dy * dy).sqrt() + 2.0 * hlw;
                ss.dy = hlw * 2.0;
                // Butt-capped line: a rectangle in the rotated frame.
                ss.top().translate(0.0, -hlw);
                visitor(ss, SearchContext::Rectangle);
            }
            MacroPrim::Line21 {
                exposure,
                width,
                height,
                center,
                rotation,
            } => {
                ss.update_exposure(*exposure);
                ss.top().rotate(rotation.to_radians());
                ss.top().translate(center.0 - width / 2.0, center.1 - height / 2.0);
                ss.dx = *width;
                ss.dy = *height;
                visitor(ss, SearchContext::Rectangle);
            }
            MacroPrim::Line22 {
                exposure,
                width,
                height,
                lower_left,
                rotation,
            } => {
                ss.update_exposure(*exposure);
                ss.top().rotate(rotation.to_radians());
                ss.top().translate(lower_left.0, lower_left.1);
                ss.dx = *width;
                ss.dy = *height;
                visitor(ss, SearchContext::Rectangle);
            }
        }
        // Restore to the transform on entry for the next primitive.
        ss.pop();
        ss.push();
    }
    ss.pop();
    ss.in_macro = false;
}

fn regular_polygon<F>(ss: &mut SearchState<'_>, diameter: f64, sides: u32, visitor: &mut F)
where
    F: FnMut(&SearchState<'_>, SearchContext),
{
    // Many-sided or degenerate polygons behave like circles.
    if !(3..=8).contains(&sides) {
        ss.dx = diameter * 0.5;
        visitor(ss, SearchContext::Circle);
        return;
    }
    let r = diameter * 0.5;
    ss.poly = (0..sides)
        .map(|k| {
            let a = std::f64::consts::TAU * (k as f64) / (sides as f64);
            (r * a.cos(), r * a.sin())
        })
        .collect();
    visitor(ss, SearchContext::Polygon);
}

/// Walk every drawn object in net order, invoking the visitor with a
/// canonical primitive descriptor. Region runs are condensed into a single
/// polygon attributed to the region's start net.
pub fn search_image<F>(image: &Image, mut visitor: F)
where
    F: FnMut(&SearchState<'_>, SearchContext),
{
    let mut ss = SearchState::new(image);

    ss.top().translate(
        image.info.justify_offset_a,
        image.info.justify_offset_b,
    );
    ss.top().translate(image.info.offset_a, image.info.offset_b);
    ss.top().rotate(image.info.rotation.to_radians());

    // Two levels for layer and netstate transforms.
    ss.push();
    ss.push();
    let mut layer_idx = 0usize;
    let mut state_idx = 0usize;
    apply_netstate(&mut ss, &image.states[0]);

    let mut i = 0;
    while i < image.nets.len() {
        let net = &image.nets[i];
        if net.interpolation == Interpolation::Deleted {
            i += 1;
            continue;
        }

        if net.layer != layer_idx {
            ss.pop();
            ss.pop();
            ss.push();
            ss.top()
                .rotate(image.layers[net.layer].rotation.to_radians());
            ss.push();
            apply_netstate(&mut ss, &image.states[net.state]);
            layer_idx = net.layer;
            state_idx = net.state;
        } else if net.state != state_idx {
            ss.pop();
            ss.push();
            apply_netstate(&mut ss, &image.states[net.state]);
            state_idx = net.state;
        }

        ss.net_index = i;
        ss.aperture = image.apertures.get(&net.aperture);

        // Region runs become one even-odd polygon.
        if net.interpolation == Interpolation::RegionStart {
            let start = i;
            let mut poly = Vec::new();
            let mut first = true;
            i += 1;
            while i < image.nets.len() {
                let seg = &image.nets[i];
                if seg.interpolation == Interpolation::RegionEnd {
                    i += 1;
                    break;
                }
                if first {
                    poly.push((seg.stop_x, seg.stop_y));
                    first = false;
                } else if seg.interpolation.is_circular() {
                    if let Some(cs) = &seg.cirseg {
                        arc_points((cs.cp_x, cs.cp_y), cs.width / 2.0, cs.angle1, cs.angle2, &mut poly);
                    } else {
                        poly.push((seg.stop_x, seg.stop_y));
                    }
                } else {
                    poly.push((seg.stop_x, seg.stop_y));
                }
                i += 1;
            }
            if poly.len() >= 3 {
                ss.net_index = start;
                ss.poly = poly;
                visitor(&ss, SearchContext::Polygon);
            }
            continue;
        }

        let Some(aperture) = ss.aperture else {
            // Undefined apertures can occur before the first select.
            i += 1;
            continue;
        };

        match net.aperture_state {
            ApertureState::Off => {}
            ApertureState::On => {
                let hlw = match &aperture.shape {
                    ApertureShape::Rectangle { x_size, y_size, .. } => {
                        // Rectangle-painted tracks degrade to the minimum
                        // dimension.
                        x_size.min(*y_size) * 0.5
                    }
                    _ => aperture.stroke_width() * 0.5,
                };
                if net.interpolation.is_circular() {
                    if let Some(cs) = &net.cirseg {
                        let mut poly = Vec::new();
                        arc_points((cs.cp_x, cs.cp_y), cs.width / 2.0, cs.angle1, cs.angle2, &mut poly);
                        ss.poly = poly;
                        ss.hlw = hlw;
                        visitor(&ss, SearchContext::PolyTrack);
                    }
                } else if matches!(
                    aperture.shape,
                    ApertureShape::Circle { .. } | ApertureShape::Rectangle { .. }
                ) {
                    let dx = net.stop_x - net.start_x;
                    let dy = net.stop_y - net.start_y;
                    ss.push();
                    ss.top().translate(net.start_x, net.start_y);
                    ss.top().rotate(dy.atan2(dx));
                    ss.dx = (dx * dx + dy * dy).sqrt();
                    ss.hlw = hlw;
                    visitor(&ss, SearchContext::Track);
                    ss.pop();
                }
                // Macros and polygons cannot paint.
            }
            ApertureState::Flash => {
                ss.push();
                ss.top().translate(net.stop_x, net.stop_y);
                match &aperture.shape {
                    ApertureShape::Circle { diameter, hole } => match hole {
                        Some(h) if *h > 0.0 => {
                            ss.dx = diameter * 0.5;
                            ss.dy = h * 0.5;
                            visitor(&ss, SearchContext::Ring);
                        }
                        _ => {
                            ss.dx = diameter * 0.5;
                            visitor(&ss, SearchContext::Circle);
                        }
                    },
                    ApertureShape::Rectangle { x_size, y_size, .. } => {
                        ss.top().translate(-x_size * 0.5, -y_size * 0.5);
                        ss.dx = *x_size;
                        ss.dy = *y_size;
                        visitor(&ss, SearchContext::Rectangle);
                    }
                    ApertureShape::Oval { x_size, y_size, .. } => {
                        if x_size >= y_size {
                            ss.top().translate((y_size - x_size) * 0.5, 0.0);
                            ss.dx = x_size - y_size;
                            ss.hlw = y_size * 0.5;
                        } else {
                            ss.top().translate(0.0, (x_size - y_size) * 0.5);
                            ss.top().rotate(-90f64.to_radians());
                            ss.dx = y_size - x_size;
                            ss.hlw = x_size * 0.5;
                        }
                        visitor(&ss, SearchContext::Obround);
                    }
                    ApertureShape::Polygon {
                        diameter,
                        sides,
                        rotation,
                        ..
                    } => {
                        ss.top().rotate(rotation.to_radians());
                        regular_polygon(&mut ss, *diameter, *sides, &mut visitor);
                    }
                    ApertureShape::Macro { .. } => {
                        visit_macro(&mut ss, &aperture.simplified.clone(), &mut visitor);
                    }
                }
                ss.pop();
            }
        }
        i += 1;
    }
}

// ─── Closest-object query ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub net_index: usize,
    /// Signed distance to the border; negative inside.
    pub dist: f64,
}

/// Flat penalty applied to stroked objects so pads win over the tracks
/// leading into them (20 mil).
const TRACK_PENALTY: f64 = 0.020;

/// The `n` objects whose borders are closest to a board point, nearest
/// first. Objects farther than `not_over` are discarded; enclosing objects
/// always qualify.
pub fn closest_to_border(image: &Image, x: f64, y: f64, n: usize, not_over: f64) -> Vec<SearchResult> {
    let mut hits: Vec<SearchResult> = Vec::new();
    search_image(image, |ss, ctx| {
        let dist = ss.distance_to_border(ctx, x, y);
        if dist <= not_over {
            hits.push(SearchResult {
                net_index: ss.net_index,
                dist,
            });
        }
    });
    // Rank on absolute distance so a big region does not always beat the
    // via sitting inside it.
    let penalty = |r: &SearchResult| {
        if image.nets[r.net_index].aperture_state == ApertureState::Flash {
            0.0
        } else {
            TRACK_PENALTY
        }
    };
    hits.sort_by(|a, b| {
        (a.dist.abs() + penalty(a))
            .partial_cmp(&(b.dist.abs() + penalty(b)))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(n);
    hits
}

// ─── IPC → Gerber annotation ─────────────────────────────────────────

struct KeyPoint {
    x: f64,
    y: f64,
    ipc_net: usize,
}

const ANNOTATED_KEYS: [&str; 4] = [".N", ".P", ".C", "IPCLayer"];

/// Copy net/pin/component attributes from an IPC-D-356A image onto the
/// Gerber objects that geometrically enclose its test points.
///
/// `layernum` is the copper layer both images describe; `maxlayer` the
/// board's bottom layer number. IPC access 00 means both outer layers.
/// With `overwrite` false, attributes already on a Gerber net are kept.
pub fn annotate_rs274x_from_ipcd356a(
    gerber: &mut Image,
    ipc: &Image,
    layernum: u32,
    maxlayer: u32,
    overwrite: bool,
) {
    // Pass 1: collect the key points this layer cares about.
    let mut points: Vec<KeyPoint> = Vec::new();
    search_image(ipc, |ss, ctx| {
        // Pours are not test points; macro polygons are pads.
        if ctx == SearchContext::Polygon && !ss.in_macro {
            return;
        }
        let net = ss.net();
        let ipclayer: u32 = net
            .attrs
            .get("IPCLayer")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        if ipclayer != 0 && ipclayer != layernum {
            return;
        }
        if ipclayer == 0 && layernum != 1 && layernum != maxlayer {
            // Access 00 reaches the outer layers only.
            return;
        }
        if net.attrs.get(".N").is_some()
            || net.attrs.get(".P").is_some()
            || net.attrs.get(".C").is_some()
        {
            points.push(KeyPoint {
                x: net.stop_x,
                y: net.stop_y,
                ipc_net: ss.net_index,
            });
            if net.aperture_state != ApertureState::Flash {
                // A track contributes both of its ends.
                points.push(KeyPoint {
                    x: net.start_x,
                    y: net.start_y,
                    ipc_net: ss.net_index,
                });
            }
        }
    });

    // Pass 2: find enclosing Gerber objects and record the transfers.
    let mut transfers: Vec<(usize, Sym, Sym)> = Vec::new();
    search_image(gerber, |ss, ctx| {
        if ctx == SearchContext::Polygon && !ss.in_macro {
            return;
        }
        let Some(inv) = ss.matrix().invert() else {
            return;
        };
        let gerber_net = ss.net();
        for kp in &points {
            let (lx, ly) = inv.transform_point(kp.x, kp.y);
            if ss.distance_local(ctx, lx, ly) >= 0.0 {
                continue;
            }
            let ipc_net = &ipc.nets[kp.ipc_net];
            // A pad should not annotate a stub track or vice versa.
            if gerber_net.aperture_state != ipc_net.aperture_state {
                continue;
            }
            for key in ANNOTATED_KEYS {
                let Some(value) = ipc_net.attrs.get(key) else {
                    continue;
                };
                if !overwrite && gerber_net.attrs.get(key).is_some() {
                    continue;
                }
                transfers.push((ss.net_index, Sym::intern(key), Sym::intern(value)));
            }
            break;
        }
    });

    for (net_index, key, value) in transfers {
        gerber.nets[net_index].attrs.set(key.as_str(), value.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::gerber::parse_str;
    use crate::parsers::ipcd356a::{self, IpcOptions};

    fn collect(image: &Image) -> Vec<(usize, SearchContext)> {
        let mut out = Vec::new();
        search_image(image, |ss, ctx| out.push((ss.net_index, ctx)));
        out
    }

    #[test]
    fn test_matrix_round_trip() {
        let mut m = Matrix::identity();
        m.translate(3.0, -2.0);
        m.rotate(0.7);
        m.scale(2.0, 0.5);
        let (x, y) = m.transform_point(1.25, -4.5);
        let inv = m.invert().unwrap();
        let (bx, by) = inv.transform_point(x, y);
        assert!((bx - 1.25).abs() < 1e-9);
        assert!((by + 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_flash_contexts() {
        let img = parse_str(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.050*%\n%ADD11R,0.1X0.05*%\n%ADD12O,0.1X0.05*%\n%ADD13P,0.1X6*%\nD10*\nX0Y0D03*\nD11*\nX1000Y0D03*\nD12*\nX2000Y0D03*\nD13*\nX3000Y0D03*\nM02*\n",
            "t",
        )
        .unwrap();
        let ctxs: Vec<SearchContext> = collect(&img).into_iter().map(|(_, c)| c).collect();
        assert_eq!(
            ctxs,
            vec![
                SearchContext::Circle,
                SearchContext::Rectangle,
                SearchContext::Obround,
                SearchContext::Polygon,
            ]
        );
    }

    #[test]
    fn test_circle_distance_sign() {
        let img = parse_str(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.100*%\nD10*\nX1000Y1000D03*\nM02*\n",
            "t",
        )
        .unwrap();
        let mut inside = f64::NAN;
        let mut outside = f64::NAN;
        let mut border = f64::NAN;
        search_image(&img, |ss, ctx| {
            inside = ss.distance_to_border(ctx, 1.0, 1.0);
            outside = ss.distance_to_border(ctx, 1.2, 1.0);
            border = ss.distance_to_border(ctx, 1.05, 1.0);
        });
        assert!((inside + 0.05).abs() < 1e-9);
        assert!((outside - 0.15).abs() < 1e-9);
        assert!(border.abs() < 1e-9);
    }

    #[test]
    fn test_ring_from_holed_circle() {
        let img = parse_str(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.100X0.040*%\nD10*\nX0Y0D03*\nM02*\n",
            "t",
        )
        .unwrap();
        let mut ctx_seen = None;
        let mut in_hole = f64::NAN;
        let mut in_ring = f64::NAN;
        search_image(&img, |ss, ctx| {
            ctx_seen = Some(ctx);
            in_hole = ss.distance_to_border(ctx, 0.0, 0.0);
            in_ring = ss.distance_to_border(ctx, 0.035, 0.0);
        });
        assert_eq!(ctx_seen, Some(SearchContext::Ring));
        // The hole interior is outside the annulus.
        assert!(in_hole > 0.0);
        assert!(in_ring < 0.0);
    }

    #[test]
    fn test_track_distance() {
        let img = parse_str(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.020*%\nD10*\nX0Y0D02*\nX1000Y0D01*\nM02*\n",
            "t",
        )
        .unwrap();
        let mut mid = f64::NAN;
        let mut beyond_end = f64::NAN;
        search_image(&img, |ss, ctx| {
            assert_eq!(ctx, SearchContext::Track);
            mid = ss.distance_to_border(ctx, 0.5, 0.0);
            beyond_end = ss.distance_to_border(ctx, 1.02, 0.0);
        });
        assert!((mid + 0.01).abs() < 1e-9);
        // 0.02 past the end cap, minus the 0.01 cap radius.
        assert!((beyond_end - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_region_presented_as_polygon() {
        let img = parse_str(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.01*%\nD10*\nG36*\nX0Y0D02*\nX1000Y0D01*\nX1000Y1000D01*\nX0Y1000D01*\nX0Y0D01*\nG37*\nM02*\n",
            "t",
        )
        .unwrap();
        let mut seen = Vec::new();
        let mut inside = f64::NAN;
        search_image(&img, |ss, ctx| {
            seen.push(ctx);
            inside = ss.distance_to_border(ctx, 0.5, 0.5);
        });
        assert_eq!(seen, vec![SearchContext::Polygon]);
        assert!(inside < 0.0);
        assert!((inside + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_netstate_scale_transform() {
        // A flash at (1,0) under 2x netstate scale sits at world (2,0).
        let img = parse_str(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.100*%\nD10*\n%SFA2.0B2.0*%\nX1000Y0D03*\nM02*\n",
            "t",
        )
        .unwrap();
        let mut at_scaled = f64::NAN;
        search_image(&img, |ss, ctx| {
            at_scaled = ss.distance_to_border(ctx, 2.0, 0.0);
        });
        assert!(at_scaled < 0.0);
    }

    #[test]
    fn test_macro_flash_rectangle() {
        let img = parse_str(
            "%FSLAX23Y23*%\n%MOIN*%\n%AMBOX*21,1,$1,$2,0,0,0*%\n%ADD11BOX,0.1X0.2*%\nD11*\nX500Y500D03*\nM02*\n",
            "t",
        )
        .unwrap();
        let mut in_macro_flag = false;
        let mut inside = f64::NAN;
        search_image(&img, |ss, ctx| {
            in_macro_flag = ss.in_macro;
            assert_eq!(ctx, SearchContext::Rectangle);
            inside = ss.distance_to_border(ctx, 0.5, 0.58);
        });
        assert!(in_macro_flag);
        // 0.58 is within the 0.2-tall box centered at 0.5.
        assert!(inside < 0.0);
    }

    #[test]
    fn test_closest_prefers_flash_over_track() {
        let img = parse_str(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.020*%\nD10*\nX0Y0D02*\nX1000Y0D01*\nX1000Y0D03*\nM02*\n",
            "t",
        )
        .unwrap();
        // Point right at the pad/track junction: equal border distance, but
        // the flash ranks first thanks to the track penalty.
        let hits = closest_to_border(&img, 1.0, 0.0, 2, 0.1);
        assert_eq!(hits.len(), 2);
        assert_eq!(
            img.nets[hits[0].net_index].aperture_state,
            ApertureState::Flash
        );
    }

    fn ipc_fixture() -> Image {
        // Column-exact 327 record: GND pad of U1 pin 1 at (1.0, 1.0),
        // 0.05 x 0.05, access layer 1.
        let line = format!(
            "327{:<14}   {:<6} {:<4} {}A01X {:06}Y {:06}X0500Y0500R000 S0",
            "GND", "U1", "1", "      ", 10000, 10000
        );
        let src = format!("P  UNITS CUST 0\nP  VER IPC-D-356A\n{line}\n");
        ipcd356a::parse_bytes(src.as_bytes(), "t.ipc", &IpcOptions::default()).unwrap()
    }

    #[test]
    fn test_annotation_end_to_end() {
        let mut gerber = parse_str(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10R,0.08X0.08*%\nD10*\nX1000Y1000D03*\nM02*\n",
            "t",
        )
        .unwrap();
        let ipc = ipc_fixture();
        annotate_rs274x_from_ipcd356a(&mut gerber, &ipc, 1, 2, true);
        let net = &gerber.nets[0];
        assert_eq!(net.attrs.get(".N"), Some("GND"));
        assert_eq!(net.attrs.get(".C"), Some("U1"));
        assert_eq!(net.attrs.get(".P"), Some("U1,1"));
        assert_eq!(net.attrs.get("IPCLayer"), Some("1"));
    }

    #[test]
    fn test_annotation_respects_layer() {
        let mut gerber = parse_str(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10R,0.08X0.08*%\nD10*\nX1000Y1000D03*\nM02*\n",
            "t",
        )
        .unwrap();
        let ipc = ipc_fixture();
        // The IPC point is on layer 1; annotating layer 3 of a 4-layer
        // board must not match.
        annotate_rs274x_from_ipcd356a(&mut gerber, &ipc, 3, 4, true);
        assert_eq!(gerber.nets[0].attrs.get(".N"), None);
    }

    #[test]
    fn test_annotation_misses_distant_pad() {
        let mut gerber = parse_str(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10R,0.08X0.08*%\nD10*\nX5000Y5000D03*\nM02*\n",
            "t",
        )
        .unwrap();
        let ipc = ipc_fixture();
        annotate_rs274x_from_ipcd356a(&mut gerber, &ipc, 1, 2, true);
        assert_eq!(gerber.nets[0].attrs.get(".N"), None);
    }

    #[test]
    fn test_annotation_state_mismatch_skipped() {
        // A track passing through the IPC flash point is not annotated,
        // because the IPC feature is a flash.
        let mut gerber = parse_str(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.050*%\nD10*\nX0Y1000D02*\nX2000Y1000D01*\nM02*\n",
            "t",
        )
        .unwrap();
        let ipc = ipc_fixture();
        annotate_rs274x_from_ipcd356a(&mut gerber, &ipc, 1, 2, true);
        for net in &gerber.nets {
            assert_eq!(net.attrs.get(".N"), None);
        }
    }

    #[test]
    fn test_annotation_no_overwrite() {
        let mut gerber = parse_str(
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10R,0.08X0.08*%\nD10*\n%TO.N,OLDNET*%\nX1000Y1000D03*\nM02*\n",
            "t",
        )
        .unwrap();
        let ipc = ipc_fixture();
        annotate_rs274x_from_ipcd356a(&mut gerber, &ipc, 1, 2, false);
        let net = &gerber.nets[0];
        assert_eq!(net.attrs.get(".N"), Some("OLDNET"));
        // Attributes the net lacked are still added.
        assert_eq!(net.attrs.get(".C"), Some("U1"));
    }

    #[test]
    fn test_point_in_polygon_winding() {
        let square = vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        assert!(point_in_polygon((0.5, 0.5), &square));
        assert!(!point_in_polygon((1.5, 0.5), &square));
        assert!(!point_in_polygon((-0.1, 0.5), &square));
    }
}
