//! Project layer: file slots, configuration attributes, persistence.
//!
//! A project owns one slot per loaded file plus a project-scope attribute
//! dictionary that threads CLI options into the parsers (`layers`,
//! `ipcd356a-layers`, `annotate`, ...). Color, visibility and the per-file
//! user transform live here for the display side; the core only reads the
//! transform for duplication and bounding boxes.

use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::attrs::{field_or_default, field_or_last, AttrSet};
use crate::error::IngestError;
use crate::parsers::excellon::{self, DrillOptions};
use crate::parsers::gerber::{self, writer};
use crate::parsers::ipcd356a::{self, IpcOptions};
use crate::parsers::pnp;
use crate::search;
use crate::sniff::{self, FileKind};
use crate::types::{BBox, BoardSide, Image, LayerKind, UserTransform};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
    pub alpha: u16,
}

/// The rotating default layer palette.
const DEFAULT_COLORS: [(u16, u16, u16); 9] = [
    (0x6b00, 0xa800, 0x2800),
    (0x3800, 0x6800, 0xdb00),
    (0xd000, 0x3000, 0x3000),
    (0xc800, 0xa800, 0x0000),
    (0x8000, 0x0080, 0xc000),
    (0x0000, 0xa000, 0xa000),
    (0xe000, 0x6000, 0x0000),
    (0x6000, 0x6000, 0x6000),
    (0xa000, 0xd000, 0x3000),
];

fn default_color(index: usize) -> Color {
    let (red, green, blue) = DEFAULT_COLORS[index % DEFAULT_COLORS.len()];
    Color {
        red,
        green,
        blue,
        alpha: 0xb700,
    }
}

#[derive(Debug, Clone)]
pub struct FileSlot {
    pub image: Image,
    pub path: PathBuf,
    /// Display name: the basename, with a side suffix for PnP files.
    pub name: String,
    pub color: Color,
    pub visible: bool,
    pub transform: UserTransform,
    pub is_pnp: bool,
}

#[derive(Debug, Default)]
pub struct Project {
    pub slots: Vec<FileSlot>,
    /// Project-scope attribute dictionary (configuration options).
    pub attrs: AttrSet,
    pub path: Option<PathBuf>,
}

impl Project {
    pub fn new() -> Self {
        Project::default()
    }

    pub fn attr_or<'a>(&self, key: &str, dflt: &'a str) -> &'a str {
        self.attrs.get_or(key, dflt)
    }

    /// Sniff + parse `path` and append the resulting slot(s). PnP files may
    /// add two slots (top then bottom). Returns the index of the first slot
    /// added.
    pub fn open_layer_from_filename(&mut self, path: &Path) -> Result<usize, IngestError> {
        let (winner, best) = sniff::sniff_path(path)?;
        let kind = if winner != FileKind::Unknown {
            winner
        } else {
            best
        };
        let display = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("{}: detected as {}", path.display(), kind.as_str());

        let first = self.slots.len();
        match kind {
            FileKind::Rs274x => {
                let instance = self.count_kind(LayerKind::Rs274x);
                let mut image = gerber::parse_file(path)?;
                self.apply_layer_function(&mut image, instance);
                self.push_slot(image, path, display, false);
            }
            FileKind::Excellon => {
                let opts = DrillOptions {
                    large_tool_is_mils: self.attr_or("drill-large-tool-mils", "y").starts_with('y'),
                };
                let image = excellon::parse_file(path, &opts)?;
                self.push_slot(image, path, display, false);
            }
            FileKind::Ipcd356a => {
                let instance = self.count_kind(LayerKind::Ipcd356a);
                let opts = self.ipc_options(instance);
                let mut image = ipcd356a::parse_file(path, &opts)?;
                image.attrs.set("LayerSet", &format!("{:#x}", opts.layers));
                let idx = self.push_slot(image, path, display, false);
                if self.attr_or("annotate", "y").starts_with('y') {
                    // Annotation sources default to invisible.
                    self.slots[idx].visible = false;
                }
            }
            FileKind::PnpCsv | FileKind::EaglePartlist => {
                let (top, bottom) = pnp::parse_file(path)?;
                self.push_slot(top, path, format!("{display} (top)"), true);
                if let Some(bottom) = bottom {
                    self.push_slot(bottom, path, format!("{display} (bottom)"), true);
                }
            }
            FileKind::Unknown => {
                return Err(IngestError::UnsupportedFormat(
                    path.display().to_string(),
                ));
            }
        }
        Ok(first)
    }

    fn push_slot(&mut self, image: Image, path: &Path, name: String, is_pnp: bool) -> usize {
        let index = self.slots.len();
        self.slots.push(FileSlot {
            image,
            path: path.to_path_buf(),
            name,
            color: default_color(index),
            visible: true,
            transform: UserTransform::default(),
            is_pnp,
        });
        index
    }

    fn count_kind(&self, kind: LayerKind) -> usize {
        self.slots
            .iter()
            .filter(|s| {
                s.image.kind == kind
                    || (kind == LayerKind::PickAndPlace && s.image.side == Some(BoardSide::Bottom))
            })
            .count()
    }

    fn ipc_options(&self, instance: usize) -> IpcOptions {
        let layers_field =
            field_or_last(instance, self.attr_or("ipcd356a-layers", "01")).to_string();
        let tracks = field_or_last(instance, self.attr_or("ipcd356a-tracks", "no")).to_string();
        let label = field_or_last(instance, self.attr_or("ipcd356a-labels", "n")).to_string();
        let mut layers = 0u64;
        for c in layers_field.chars().filter_map(|c| c.to_digit(10)) {
            layers |= 1u64 << c;
        }
        if layers == 0 {
            layers = 0b11;
        }
        IpcOptions {
            layers,
            include_tracks: tracks.starts_with('y'),
            label: label.chars().next().unwrap_or('n'),
        }
    }

    /// Map the `layers` project attribute field for this instance onto
    /// `.FileFunction` / `.FilePolarity` and layer-number bookkeeping.
    fn apply_layer_function(&self, image: &mut Image, instance: usize) {
        let spec = self.attr_or("layers", "");
        if spec.is_empty() {
            return;
        }
        let max_layer = layers_spec_max(spec);
        let field = field_or_default(instance, spec, "");
        if field.is_empty() {
            return;
        }
        let parsed = parse_layer_field(field, max_layer);
        if let Some(function) = &parsed.function {
            image.attrs.set(".FileFunction", function);
        }
        if let Some(pol) = parsed.polarity {
            image
                .attrs
                .set(".FilePolarity", if pol { "Positive" } else { "Negative" });
        }
        if parsed.layer > 0 {
            image.attrs.set("LayerNum", &parsed.layer.to_string());
            if max_layer > 0 {
                image.attrs.set("LayerMax", &max_layer.to_string());
            }
            if parsed.is_signal {
                image.attrs.set("LayerIsSignal", "");
            }
        }
    }

    pub fn revert_file(&mut self, index: usize) -> Result<(), IngestError> {
        let path = self.slots[index].path.clone();
        let keep = self.slots[index].clone();
        // Reload into a scratch project so slot counting stays sane, then
        // splice the fresh image back under the old display settings.
        let mut scratch = Project::new();
        scratch.attrs = self.attrs.clone();
        scratch.open_layer_from_filename(&path)?;
        let fresh = scratch.slots.into_iter().next().ok_or_else(|| {
            IngestError::UnsupportedFormat(path.display().to_string())
        })?;
        self.slots[index] = FileSlot {
            image: fresh.image,
            ..keep
        };
        Ok(())
    }

    pub fn unload_layer(&mut self, index: usize) {
        if index < self.slots.len() {
            self.slots.remove(index);
        }
    }

    pub fn unload_all(&mut self) {
        self.slots.clear();
    }

    pub fn change_layer_order(&mut self, old_index: usize, new_index: usize) {
        if old_index < self.slots.len() && new_index < self.slots.len() {
            let slot = self.slots.remove(old_index);
            self.slots.insert(new_index, slot);
        }
    }

    /// Write a slot's image back to disk: RS-274-X for Gerber and IPC
    /// images, Excellon for drill images.
    pub fn save_layer_from_index(&self, index: usize, path: &Path) -> Result<(), IngestError> {
        let slot = &self.slots[index];
        let mut out = std::fs::File::create(path)?;
        match slot.image.kind {
            LayerKind::Rs274x | LayerKind::Ipcd356a | LayerKind::PickAndPlace => {
                writer::write_image_auto(&mut out, &slot.image, Some(&slot.transform))
            }
            LayerKind::Drill => {
                let image = if slot.transform.is_identity() {
                    slot.image.clone()
                } else {
                    slot.image.duplicate(&slot.transform)
                };
                excellon::write_drill(&mut out, &image)
            }
        }
    }

    /// Union bounding box of all visible slots under their user transforms.
    pub fn bounding_box(&self) -> BBox {
        let mut bbox = BBox::empty();
        for slot in &self.slots {
            if !slot.visible || slot.image.info.bbox.is_empty() {
                continue;
            }
            let b = &slot.image.info.bbox;
            let t = &slot.transform;
            let (sx, sy) = t.effective_scale();
            let mut m = search::Matrix::identity();
            m.translate(t.translate_x, t.translate_y);
            m.scale(sx, sy);
            m.rotate(t.rotation);
            // All four corners: rotation and mirroring can move any of them
            // to an extreme.
            for (x, y) in [
                (b.min_x, b.min_y),
                (b.max_x, b.min_y),
                (b.max_x, b.max_y),
                (b.min_x, b.max_y),
            ] {
                let (tx, ty) = m.transform_point(x, y);
                bbox.expand_point(tx, ty);
            }
        }
        bbox
    }

    /// Run IPC annotation over every matching pair of loaded layers:
    /// Gerber slots carry `LayerNum`, IPC slots offer their `LayerSet`.
    pub fn annotate_all(&mut self, overwrite: bool) {
        let max_layer: u32 = self
            .slots
            .iter()
            .filter_map(|s| s.image.attrs.get("LayerMax").and_then(|v| v.parse().ok()))
            .max()
            .unwrap_or(2);

        let ipc_indexes: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.image.kind == LayerKind::Ipcd356a)
            .map(|(i, _)| i)
            .collect();
        if ipc_indexes.is_empty() {
            return;
        }

        for g in 0..self.slots.len() {
            if self.slots[g].image.kind != LayerKind::Rs274x {
                continue;
            }
            let Some(layer) = self.slots[g]
                .image
                .attrs
                .get("LayerNum")
                .and_then(|v| v.parse::<u32>().ok())
            else {
                continue;
            };
            for &i in &ipc_indexes {
                info!(
                    "annotating {} (layer {layer}) from {}",
                    self.slots[g].name, self.slots[i].name
                );
                let ipc_image = self.slots[i].image.clone();
                search::annotate_rs274x_from_ipcd356a(
                    &mut self.slots[g].image,
                    &ipc_image,
                    layer,
                    max_layer,
                    overwrite,
                );
            }
        }
    }

    // ─── Project file ────────────────────────────────────────────────

    pub fn save_project(&self, path: &Path) -> Result<(), IngestError> {
        let doc = ProjectFile {
            version: 1,
            attrs: {
                let mut out = Vec::new();
                self.attrs
                    .for_each(|_, k, v| out.push((k.to_string(), v.to_string())));
                out
            },
            slots: self
                .slots
                .iter()
                .map(|s| ProjectFileSlot {
                    path: s.path.clone(),
                    color: s.color,
                    visible: s.visible,
                    transform: s.transform,
                    is_pnp: s.is_pnp,
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&doc)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a project file: restores the attribute dictionary, then
    /// re-parses every slot in order and applies the saved display state.
    pub fn load_project(path: &Path) -> Result<Project, IngestError> {
        let text = std::fs::read_to_string(path)?;
        let doc: ProjectFile = serde_json::from_str(&text)?;
        let mut project = Project::new();
        for (k, v) in &doc.attrs {
            project.attrs.set(k, v);
        }
        project.path = Some(path.to_path_buf());

        for saved in &doc.slots {
            let first = match project.open_layer_from_filename(&saved.path) {
                Ok(i) => i,
                Err(e) => {
                    warn!("{}: skipping project slot: {e}", saved.path.display());
                    continue;
                }
            };
            // A PnP file may have produced two slots; both take the saved
            // display state.
            for slot in project.slots[first..].iter_mut() {
                slot.color = saved.color;
                slot.visible = saved.visible;
                slot.transform = saved.transform;
            }
        }
        Ok(project)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProjectFile {
    version: u32,
    attrs: Vec<(String, String)>,
    slots: Vec<ProjectFileSlot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProjectFileSlot {
    path: PathBuf,
    color: Color,
    visible: bool,
    transform: UserTransform,
    is_pnp: bool,
}

// ─── `layers` attribute syntax ───────────────────────────────────────
//
// Comma-delimited per-file fields: <layer><process><qualifier> where layer
// is t, b or a number, process is m/l/p/g/a, and qualifiers are -/+ for
// polarity and =/. for plane/signal. Non-copper codes: o (outline),
// f (fab), a (array), d (drillmap), x<type>.

/// Greatest copper layer number the whole attribute value implies; a bare
/// `b` adds one beyond the largest explicit number.
fn layers_spec_max(spec: &str) -> u32 {
    let mut max_layer = 1u32;
    let mut have_b = false;
    let mut have_b_process = false;
    for field in spec.split(',') {
        let mut chars = field.chars();
        match chars.next().map(|c| c.to_ascii_lowercase()) {
            Some(d @ '1'..='9') => {
                let mut n = d.to_digit(10).unwrap();
                for c in chars.by_ref() {
                    match c.to_digit(10) {
                        Some(v) => n = n * 10 + v,
                        None => break,
                    }
                }
                max_layer = max_layer.max(n);
            }
            Some('b') => {
                if field.len() == 1 || !field.chars().nth(1).unwrap().is_ascii_alphabetic() {
                    have_b = true;
                } else {
                    have_b_process = true;
                }
            }
            _ => {}
        }
    }
    if have_b {
        max_layer += 1;
    } else if have_b_process && max_layer == 1 {
        // Only `bm`-style fields: assume a two-layer board so top and
        // bottom stay distinct.
        max_layer = 2;
    }
    max_layer
}

struct LayerField {
    layer: u32,
    function: Option<String>,
    /// `Some(true)` positive, `Some(false)` negative.
    polarity: Option<bool>,
    is_signal: bool,
}

fn parse_layer_field(field: &str, max_layer: u32) -> LayerField {
    let mut out = LayerField {
        layer: 0,
        function: None,
        polarity: None,
        is_signal: false,
    };
    let mut chars = field.chars().peekable();
    let mut other: Option<String> = None;

    match chars.next().map(|c| c.to_ascii_lowercase()) {
        Some(d @ '1'..='9') => {
            let mut n = d.to_digit(10).unwrap();
            while let Some(c) = chars.peek().and_then(|c| c.to_digit(10)) {
                n = n * 10 + c;
                chars.next();
            }
            out.layer = n;
        }
        Some('b') => out.layer = max_layer,
        Some('t') => out.layer = 1,
        Some(c) => other = Some(format!("{c}{}", chars.clone().collect::<String>())),
        None => return out,
    }

    let mut plane: Option<char> = None;
    if out.layer > 0 {
        let side = |layer: u32| {
            if layer == 1 {
                Some("Top")
            } else if layer == max_layer {
                Some("Bot")
            } else {
                None
            }
        };
        for c in chars {
            match c.to_ascii_lowercase() {
                'm' => out.function = side(out.layer).map(|s| format!("Soldermask,{s}")),
                'l' => out.function = side(out.layer).map(|s| format!("Legend,{s}")),
                'p' => out.function = side(out.layer).map(|s| format!("Paste,{s}")),
                'g' => out.function = side(out.layer).map(|s| format!("Glue,{s}")),
                'a' => {
                    out.function = side(out.layer).map(|s| format!("AssemblyDrawing,{s}"))
                }
                '-' => out.polarity = Some(false),
                '+' => out.polarity = Some(true),
                '=' | '.' => {
                    plane = match plane {
                        Some(p) if p != c => Some('m'),
                        _ => Some(c),
                    };
                }
                _ => {}
            }
        }
    }

    if let Some(other) = other {
        let mut chars = other.chars();
        out.function = match chars.next().map(|c| c.to_ascii_lowercase()) {
            Some('o') => Some("Profile,NP".to_string()),
            Some('f') => Some("FabricationDrawing".to_string()),
            Some('a') => Some("ArrayDrawing".to_string()),
            Some('d') => Some("Drillmap".to_string()),
            Some('x') => Some(format!("Other,{}", chars.collect::<String>())),
            _ => None,
        };
    } else if out.layer > 0 && out.function.is_none() {
        // Plain copper layer.
        out.is_signal = plane != Some('=');
        let side = if out.layer == 1 {
            "Top"
        } else if out.layer == max_layer {
            "Bot"
        } else {
            "Inr"
        };
        let qualifier = match plane {
            Some('=') => ",Plane",
            Some('.') => ",Signal",
            Some('m') => ",Mixed",
            _ => "",
        };
        out.function = Some(format!("Copper,L{},{side}{qualifier}", out.layer));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pcb_ingest_project_{tag}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    const GERBER: &str =
        "%FSLAX23Y23*%\n%MOIN*%\n%ADD10C,0.050*%\nD10*\nX0Y0D02*\nX1000Y0D01*\nM02*\n";
    const DRILL: &str = "M48\nINCH\nT01C0.040\n%\nT01\nX1.000Y1.000\nM30\n";

    #[test]
    fn test_open_gerber_and_drill() {
        let dir = temp_dir("open");
        fs::write(dir.join("top.gbr"), GERBER).unwrap();
        fs::write(dir.join("holes.drl"), DRILL).unwrap();

        let mut project = Project::new();
        project.open_layer_from_filename(&dir.join("top.gbr")).unwrap();
        project
            .open_layer_from_filename(&dir.join("holes.drl"))
            .unwrap();
        assert_eq!(project.slots.len(), 2);
        assert_eq!(project.slots[0].image.kind, LayerKind::Rs274x);
        assert_eq!(project.slots[1].image.kind, LayerKind::Drill);
        assert!(project.slots[0].visible);
    }

    #[test]
    fn test_layers_attribute_mapping() {
        let dir = temp_dir("layers");
        fs::write(dir.join("a.gbr"), GERBER).unwrap();
        fs::write(dir.join("b.gbr"), GERBER).unwrap();
        fs::write(dir.join("c.gbr"), GERBER).unwrap();

        let mut project = Project::new();
        project.attrs.set("layers", "t,2-=,bm");
        project.open_layer_from_filename(&dir.join("a.gbr")).unwrap();
        project.open_layer_from_filename(&dir.join("b.gbr")).unwrap();
        project.open_layer_from_filename(&dir.join("c.gbr")).unwrap();

        let a = &project.slots[0].image.attrs;
        assert_eq!(a.get(".FileFunction"), Some("Copper,L1,Top"));
        assert_eq!(a.get("LayerNum"), Some("1"));

        let b = &project.slots[1].image.attrs;
        assert_eq!(b.get(".FileFunction"), Some("Copper,L2,Bot,Plane"));
        assert_eq!(b.get(".FilePolarity"), Some("Negative"));
        assert_eq!(b.get("LayerIsSignal"), None);

        let c = &project.slots[2].image.attrs;
        assert_eq!(c.get(".FileFunction"), Some("Soldermask,Bot"));
    }

    #[test]
    fn test_layers_spec_max() {
        assert_eq!(layers_spec_max("t,b"), 2);
        assert_eq!(layers_spec_max("1,2,b"), 3);
        assert_eq!(layers_spec_max("t,bm"), 2);
        assert_eq!(layers_spec_max("1,3,b,2"), 4);
        assert_eq!(layers_spec_max("t,2,3,bm"), 3);
    }

    #[test]
    fn test_outline_function_field() {
        let f = parse_layer_field("o", 2);
        assert_eq!(f.function.as_deref(), Some("Profile,NP"));
        let f = parse_layer_field("xkeepout", 2);
        assert_eq!(f.function.as_deref(), Some("Other,keepout"));
    }

    #[test]
    fn test_bounding_box_under_transform() {
        let dir = temp_dir("bbox");
        fs::write(dir.join("top.gbr"), GERBER).unwrap();
        let mut project = Project::new();
        project.open_layer_from_filename(&dir.join("top.gbr")).unwrap();

        let plain = project.bounding_box();
        assert!((plain.max_x - 1.025).abs() < 1e-9);

        project.slots[0].transform.translate_x = 2.0;
        let moved = project.bounding_box();
        assert!((moved.max_x - 3.025).abs() < 1e-9);

        project.slots[0].visible = false;
        assert!(project.bounding_box().is_empty());
    }

    #[test]
    fn test_unload_and_reorder() {
        let dir = temp_dir("order");
        fs::write(dir.join("a.gbr"), GERBER).unwrap();
        fs::write(dir.join("b.drl"), DRILL).unwrap();
        let mut project = Project::new();
        project.open_layer_from_filename(&dir.join("a.gbr")).unwrap();
        project.open_layer_from_filename(&dir.join("b.drl")).unwrap();

        project.change_layer_order(0, 1);
        assert_eq!(project.slots[0].image.kind, LayerKind::Drill);

        project.unload_layer(0);
        assert_eq!(project.slots.len(), 1);
        assert_eq!(project.slots[0].image.kind, LayerKind::Rs274x);

        project.unload_all();
        assert!(project.slots.is_empty());
    }

    #[test]
    fn test_revert_keeps_display_state() {
        let dir = temp_dir("revert");
        fs::write(dir.join("a.gbr"), GERBER).unwrap();
        let mut project = Project::new();
        project.open_layer_from_filename(&dir.join("a.gbr")).unwrap();
        project.slots[0].visible = false;
        project.slots[0].transform.translate_x = 5.0;

        project.revert_file(0).unwrap();
        assert!(!project.slots[0].visible);
        assert!((project.slots[0].transform.translate_x - 5.0).abs() < 1e-12);
        assert_eq!(project.slots[0].image.nets.len(), 2);
    }

    #[test]
    fn test_save_layer_round_trip() {
        let dir = temp_dir("save");
        fs::write(dir.join("a.gbr"), GERBER).unwrap();
        let mut project = Project::new();
        project.open_layer_from_filename(&dir.join("a.gbr")).unwrap();
        project
            .save_layer_from_index(0, &dir.join("out.gbr"))
            .unwrap();

        let mut second = Project::new();
        second
            .open_layer_from_filename(&dir.join("out.gbr"))
            .unwrap();
        assert_eq!(second.slots[0].image.kind, LayerKind::Rs274x);
        assert_eq!(
            project.slots[0].image.nets.len(),
            second.slots[0].image.nets.len()
        );
    }

    #[test]
    fn test_project_file_round_trip() {
        let dir = temp_dir("projfile");
        fs::write(dir.join("a.gbr"), GERBER).unwrap();
        fs::write(dir.join("b.drl"), DRILL).unwrap();

        let mut project = Project::new();
        project.attrs.set("layers", "t,b");
        project.open_layer_from_filename(&dir.join("a.gbr")).unwrap();
        project.open_layer_from_filename(&dir.join("b.drl")).unwrap();
        project.slots[1].visible = false;
        project.slots[1].transform.translate_y = -0.5;
        project.save_project(&dir.join("demo.proj")).unwrap();

        let loaded = Project::load_project(&dir.join("demo.proj")).unwrap();
        assert_eq!(loaded.slots.len(), 2);
        assert_eq!(loaded.attrs.get("layers"), Some("t,b"));
        assert_eq!(loaded.slots[0].image.kind, LayerKind::Rs274x);
        assert!(!loaded.slots[1].visible);
        assert!((loaded.slots[1].transform.translate_y + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_annotate_all() {
        let dir = temp_dir("annotate");
        fs::write(
            dir.join("top.gbr"),
            "%FSLAX23Y23*%\n%MOIN*%\n%ADD10R,0.08X0.08*%\nD10*\nX1000Y1000D03*\nM02*\n",
        )
        .unwrap();
        let ipc_line = format!(
            "327{:<14}   {:<6} {:<4} {}A01X {:06}Y {:06}X0500Y0500R000 S0",
            "GND", "U1", "1", "      ", 10000, 10000
        );
        fs::write(
            dir.join("board.ipc"),
            format!("P  UNITS CUST 0\nP  VER IPC-D-356A\n{ipc_line}\n"),
        )
        .unwrap();

        let mut project = Project::new();
        project.attrs.set("layers", "t,b");
        project.open_layer_from_filename(&dir.join("top.gbr")).unwrap();
        project
            .open_layer_from_filename(&dir.join("board.ipc"))
            .unwrap();
        // The annotate option defaults on, so the IPC slot went invisible.
        assert!(!project.slots[1].visible);

        project.annotate_all(true);
        assert_eq!(project.slots[0].image.nets[0].attrs.get(".N"), Some("GND"));
        assert_eq!(project.slots[0].image.nets[0].attrs.get(".P"), Some("U1,1"));
    }

    #[test]
    fn test_ipc_layer_options() {
        let mut project = Project::new();
        project.attrs.set("ipcd356a-layers", "012");
        project.attrs.set("ipcd356a-tracks", "yes");
        let opts = project.ipc_options(0);
        assert_eq!(opts.layers, 0b111);
        assert!(opts.include_tracks);
    }
}
