//! RS-274-X2 attribute dictionaries.
//!
//! Attribute names and values are interned once per process; a [`Sym`] is an
//! index into the pool, so equality and hashing work on the handle rather
//! than the string. The writer's change detection is then a plain id compare.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, OnceLock};

use log::{error, warn};

pub const MIN_KEY_LEN: usize = 1;
pub const MAX_KEY_LEN: usize = 127;

// ─── Interned symbols ────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sym(u32);

struct Interner {
    lookup: HashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

fn pool() -> &'static Mutex<Interner> {
    static POOL: OnceLock<Mutex<Interner>> = OnceLock::new();
    POOL.get_or_init(|| {
        Mutex::new(Interner {
            lookup: HashMap::new(),
            strings: Vec::new(),
        })
    })
}

impl Sym {
    pub fn intern(s: &str) -> Sym {
        let mut p = pool().lock().unwrap();
        if let Some(&id) = p.lookup.get(s) {
            return Sym(id);
        }
        // The pool lives as long as the process, so leaking here is the
        // intended ownership model.
        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        let id = p.strings.len() as u32;
        p.strings.push(leaked);
        p.lookup.insert(leaked, id);
        Sym(id)
    }

    pub fn as_str(self) -> &'static str {
        pool().lock().unwrap().strings[self.0 as usize]
    }

    pub fn is_empty(self) -> bool {
        self.as_str().is_empty()
    }
}

impl fmt::Debug for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sym({:?})", self.as_str())
    }
}

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Attribute snapshots ─────────────────────────────────────────────

/// Snapshot of attributes attached to an image, aperture or net. Nets chain
/// a second level holding the aperture-scope attributes that were live when
/// the net was emitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrSet {
    entries: Vec<(Sym, Sym)>,
    chained: Option<Box<AttrSet>>,
}

impl AttrSet {
    pub fn new() -> Self {
        AttrSet::default()
    }

    pub fn from_dict(dict: &HashMap<Sym, Sym>) -> Self {
        let mut entries: Vec<(Sym, Sym)> = dict.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        AttrSet {
            entries,
            chained: None,
        }
    }

    pub fn chain(mut self, next: AttrSet) -> Self {
        self.chained = Some(Box::new(next));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.chained.as_ref().map_or(true, |c| c.is_empty())
    }

    /// Look up through the chain.
    pub fn get(&self, key: &str) -> Option<&'static str> {
        self.get_sym(Sym::intern(key))
    }

    pub fn get_sym(&self, key: Sym) -> Option<&'static str> {
        for (k, v) in &self.entries {
            if *k == key {
                return Some(v.as_str());
            }
        }
        self.chained.as_ref().and_then(|c| c.get_sym(key))
    }

    pub fn get_or<'a>(&self, key: &str, dflt: &'a str) -> &'a str {
        match self.get(key) {
            Some(v) => v,
            None => dflt,
        }
    }

    /// Insert or update in the first level only.
    pub fn set(&mut self, key: &str, value: &str) {
        let k = Sym::intern(key);
        let v = Sym::intern(value);
        for e in &mut self.entries {
            if e.0 == k {
                e.1 = v;
                return;
            }
        }
        self.entries.push((k, v));
        self.entries.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let k = Sym::intern(key);
        let before = self.entries.len();
        self.entries.retain(|e| e.0 != k);
        before != self.entries.len()
    }

    /// Visit each pair in collated order; `index` is 0 for the first level
    /// and counts up the chain (a net's aperture attributes get index 1).
    pub fn for_each(&self, mut f: impl FnMut(usize, Sym, Sym)) {
        let mut level = self;
        let mut index = 0;
        loop {
            for (k, v) in &level.entries {
                f(index, *k, *v);
            }
            match &level.chained {
                Some(next) => {
                    level = next;
                    index += 1;
                }
                None => break,
            }
        }
    }

    /// Collect every key reachable through the chain.
    pub fn keys(&self) -> Vec<Sym> {
        let mut out = Vec::new();
        self.for_each(|_, k, _| {
            if !out.contains(&k) {
                out.push(k);
            }
        });
        out
    }
}

// ─── Parse-time dictionaries ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrScope {
    File,
    Aperture,
    Object,
    Delete,
}

/// The three live dictionaries maintained while a Gerber file is parsed.
#[derive(Debug, Default)]
pub struct ParserAttrs {
    pub file: HashMap<Sym, Sym>,
    pub aperture: HashMap<Sym, Sym>,
    pub object: HashMap<Sym, Sym>,
}

impl ParserAttrs {
    pub fn new() -> Self {
        ParserAttrs::default()
    }

    /// Handle one `%T{F|A|O|D}...*%` command body (everything after the
    /// scope letter). Policy errors are logged and the command rejected;
    /// parsing continues.
    pub fn handle_t(
        &mut self,
        scope: AttrScope,
        cmd: &str,
        in_region: bool,
        file: &str,
        line: usize,
    ) {
        if in_region {
            error!("{file}:{line}: attributes cannot be modified inside a G36/G37 region");
            return;
        }

        if scope == AttrScope::Delete && cmd.is_empty() {
            self.aperture.clear();
            self.object.clear();
            return;
        }

        let (key_str, value) = match cmd.find(',') {
            Some(i) => (&cmd[..i], &cmd[i + 1..]),
            None => (cmd, ""),
        };

        if key_str.len() < MIN_KEY_LEN || key_str.len() > MAX_KEY_LEN {
            error!(
                "{file}:{line}: attribute key length {} outside {}..{}",
                key_str.len(),
                MIN_KEY_LEN,
                MAX_KEY_LEN
            );
            return;
        }
        if !valid_key(key_str) {
            error!("{file}:{line}: malformed attribute key {key_str:?}");
            return;
        }

        let key = Sym::intern(key_str);
        let val = Sym::intern(value);

        match scope {
            AttrScope::Delete => {
                if !value.is_empty() {
                    warn!("{file}:{line}: attribute delete {key_str} has value data; ignored");
                }
                if self.file.contains_key(&key) {
                    error!("{file}:{line}: attribute {key_str} cannot be deleted from file scope");
                    return;
                }
                self.aperture.remove(&key);
                self.object.remove(&key);
            }
            AttrScope::File => {
                if self.aperture.contains_key(&key) || self.object.contains_key(&key) {
                    error!("{file}:{line}: attribute {key_str} already defined in another scope");
                    return;
                }
                if self.file.contains_key(&key) {
                    error!("{file}:{line}: file attribute {key_str} already defined");
                    return;
                }
                self.file.insert(key, val);
            }
            AttrScope::Aperture => {
                if self.file.contains_key(&key) || self.object.contains_key(&key) {
                    error!("{file}:{line}: attribute {key_str} already defined in another scope");
                    return;
                }
                self.aperture.insert(key, val);
            }
            AttrScope::Object => {
                if self.file.contains_key(&key) || self.aperture.contains_key(&key) {
                    error!("{file}:{line}: attribute {key_str} already defined in another scope");
                    return;
                }
                self.object.insert(key, val);
            }
        }
    }

    pub fn object_snapshot(&self) -> AttrSet {
        AttrSet::from_dict(&self.object)
    }

    pub fn aperture_snapshot(&self) -> AttrSet {
        AttrSet::from_dict(&self.aperture)
    }

    pub fn file_snapshot(&self) -> AttrSet {
        AttrSet::from_dict(&self.file)
    }
}

pub fn valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '.' || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '$')
}

/// Keys whose first character is not valid for export are treated as
/// private and skipped by the writer.
pub fn exportable_key(key: &str) -> bool {
    matches!(key.chars().next(),
        Some(c) if c.is_ascii_alphabetic() || c == '.' || c == '_' || c == '$')
}

// ─── Writer-side change tracker ──────────────────────────────────────

/// Tracks the attribute values most recently emitted so a key is only
/// re-emitted when its value changes. One tracker serves all scopes since
/// the standard mandates cross-scope key uniqueness.
#[derive(Debug, Default)]
pub struct AttrTracker {
    current: HashMap<Sym, Sym>,
}

impl AttrTracker {
    pub fn new() -> Self {
        AttrTracker::default()
    }

    /// Returns `Some(value)` if the pair needs emitting, `None` if already
    /// current.
    pub fn changed(&mut self, key: Sym, value: Sym) -> Option<Sym> {
        if self.current.get(&key) == Some(&value) {
            return None;
        }
        self.current.insert(key, value);
        Some(value)
    }

    /// Keys the tracker holds that the next object's live set lacks; these
    /// need `%TD` emission. The keys are removed from the tracker.
    pub fn missing_from(&mut self, live: &AttrSet) -> Vec<Sym> {
        let mut gone: Vec<Sym> = self
            .current
            .keys()
            .copied()
            .filter(|k| live.get_sym(*k).is_none() && exportable_key(k.as_str()))
            .collect();
        gone.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        for k in &gone {
            self.current.remove(k);
        }
        gone
    }
}

// ─── Escapes ─────────────────────────────────────────────────────────

/// Escape a UTF-8 string for use as an attribute field in a file: control
/// bytes, DEL, `%`, `*`, `,` and `\` become `\uXXXX`.
pub fn utf8_to_file(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if (c as u32) < 0x20 || c == '\u{7f}' || c == '%' || c == '*' || c == ',' || c == '\\' {
            out.push_str(&format!("\\u{:04X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

fn take_hex(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, max: usize) -> u32 {
    let mut v = 0u32;
    for _ in 0..max {
        match chars.peek() {
            Some(c) if c.is_ascii_hexdigit() => {
                v = v * 16 + c.to_digit(16).unwrap();
                chars.next();
            }
            _ => break,
        }
    }
    v
}

/// Undo [`utf8_to_file`]: `\uXXXX`, `\UXXXXXXXX`, `\xXX`, `\\`, `\r`, `\n`,
/// `\t` are recognized. A decoded NUL truncates the string; an unknown
/// escape passes the backslash through unchanged.
pub fn file_to_utf8(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('u') => {
                chars.next();
                let v = take_hex(&mut chars, 4);
                if v == 0 {
                    return out;
                }
                out.push(char::from_u32(v).unwrap_or('\u{fffd}'));
            }
            Some('U') => {
                chars.next();
                let v = take_hex(&mut chars, 8);
                if v == 0 {
                    return out;
                }
                out.push(char::from_u32(v).unwrap_or('\u{fffd}'));
            }
            Some('x') | Some('X') => {
                chars.next();
                let v = take_hex(&mut chars, 2);
                if v == 0 {
                    return out;
                }
                out.push(char::from_u32(v).unwrap_or('\u{fffd}'));
            }
            Some('\\') => {
                chars.next();
                out.push('\\');
            }
            Some('r') => {
                chars.next();
                out.push('\r');
            }
            Some('n') => {
                chars.next();
                out.push('\n');
            }
            Some('t') => {
                chars.next();
                out.push('\t');
            }
            _ => out.push('\\'),
        }
    }
    out
}

/// Zero-based comma-delimited field of an attribute value; falls back to the
/// last field when there are fewer than `index + 1`.
pub fn field_or_last(index: usize, value: &str) -> &str {
    let mut fields = value.split(',');
    let mut last = "";
    for (i, f) in fields.by_ref().enumerate() {
        last = f;
        if i == index {
            return f;
        }
    }
    last
}

/// Zero-based field, or the default if the value has fewer fields.
pub fn field_or_default<'a>(index: usize, value: &'a str, dflt: &'a str) -> &'a str {
    value.split(',').nth(index).unwrap_or(dflt)
}
