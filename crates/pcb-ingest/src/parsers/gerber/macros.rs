//! Aperture macro definitions and their flattening.
//!
//! A macro body is kept in parsed-but-unevaluated form (expression trees
//! over `$n` variables) so each `%AD` use can re-parameterize it. The
//! simplifier substitutes the actual parameters, runs assignments in
//! order, and produces the flat [`MacroPrim`] list the rest of the system
//! consumes.

use std::collections::HashMap;

use log::warn;

use crate::error::IngestError;
use crate::types::MacroPrim;

// ─── Expressions ─────────────────────────────────────────────────────

/// Expression over macro variables. Gerber uses `x`/`X` for multiplication
/// since `*` terminates the block.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(f64),
    Variable(u32),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
}

impl Expr {
    /// Evaluate with `$n` bound to `vars[n-1]`; unset variables are 0.
    pub fn eval(&self, vars: &[f64]) -> f64 {
        match self {
            Expr::Literal(v) => *v,
            Expr::Variable(idx) => {
                if *idx == 0 {
                    0.0
                } else {
                    vars.get(*idx as usize - 1).copied().unwrap_or(0.0)
                }
            }
            Expr::Add(a, b) => a.eval(vars) + b.eval(vars),
            Expr::Sub(a, b) => a.eval(vars) - b.eval(vars),
            Expr::Mul(a, b) => a.eval(vars) * b.eval(vars),
            Expr::Div(a, b) => {
                let denom = b.eval(vars);
                if denom.abs() < 1e-15 {
                    0.0
                } else {
                    a.eval(vars) / denom
                }
            }
            Expr::Neg(a) => -a.eval(vars),
        }
    }
}

#[derive(Debug, Clone)]
enum ExprToken {
    Num(f64),
    Var(u32),
    Plus,
    Minus,
    Mul,
    Div,
    LParen,
    RParen,
}

pub fn parse_expr(s: &str) -> Result<Expr, IngestError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Expr::Literal(0.0));
    }
    let tokens = tokenize_expr(s)?;
    let (expr, rest) = parse_add_sub(&tokens)?;
    if !rest.is_empty() {
        return Err(expr_error(format!("trailing tokens in {s:?}")));
    }
    Ok(expr)
}

fn expr_error(msg: String) -> IngestError {
    IngestError::ParseError {
        file: String::from("<macro>"),
        line: 0,
        msg,
    }
}

fn tokenize_expr(s: &str) -> Result<Vec<ExprToken>, IngestError> {
    let mut tokens = Vec::new();
    let mut chars = s.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(ExprToken::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(ExprToken::Minus);
            }
            'x' | 'X' => {
                chars.next();
                tokens.push(ExprToken::Mul);
            }
            '/' => {
                chars.next();
                tokens.push(ExprToken::Div);
            }
            '(' => {
                chars.next();
                tokens.push(ExprToken::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(ExprToken::RParen);
            }
            '$' => {
                chars.next();
                let mut num = String::new();
                while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                    num.push(chars.next().unwrap());
                }
                let idx: u32 = num
                    .parse()
                    .map_err(|_| expr_error(format!("bad variable ${num}")))?;
                tokens.push(ExprToken::Var(idx));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut num = String::new();
                while chars
                    .peek()
                    .is_some_and(|c| c.is_ascii_digit() || *c == '.')
                {
                    num.push(chars.next().unwrap());
                }
                let v: f64 = num
                    .parse()
                    .map_err(|_| expr_error(format!("bad number {num}")))?;
                tokens.push(ExprToken::Num(v));
            }
            _ => return Err(expr_error(format!("unexpected char {ch:?} in {s:?}"))),
        }
    }
    Ok(tokens)
}

// Recursive descent: add/sub → mul/div → atom, with unary minus at atoms.
fn parse_add_sub(tokens: &[ExprToken]) -> Result<(Expr, &[ExprToken]), IngestError> {
    let (mut left, mut rest) = parse_mul_div(tokens)?;
    loop {
        match rest.first() {
            Some(ExprToken::Plus) => {
                let (right, r) = parse_mul_div(&rest[1..])?;
                left = Expr::Add(Box::new(left), Box::new(right));
                rest = r;
            }
            Some(ExprToken::Minus) => {
                let (right, r) = parse_mul_div(&rest[1..])?;
                left = Expr::Sub(Box::new(left), Box::new(right));
                rest = r;
            }
            _ => break,
        }
    }
    Ok((left, rest))
}

fn parse_mul_div(tokens: &[ExprToken]) -> Result<(Expr, &[ExprToken]), IngestError> {
    let (mut left, mut rest) = parse_atom(tokens)?;
    loop {
        match rest.first() {
            Some(ExprToken::Mul) => {
                let (right, r) = parse_atom(&rest[1..])?;
                left = Expr::Mul(Box::new(left), Box::new(right));
                rest = r;
            }
            Some(ExprToken::Div) => {
                let (right, r) = parse_atom(&rest[1..])?;
                left = Expr::Div(Box::new(left), Box::new(right));
                rest = r;
            }
            _ => break,
        }
    }
    Ok((left, rest))
}

fn parse_atom(tokens: &[ExprToken]) -> Result<(Expr, &[ExprToken]), IngestError> {
    match tokens.first() {
        Some(ExprToken::Num(v)) => Ok((Expr::Literal(*v), &tokens[1..])),
        Some(ExprToken::Var(idx)) => Ok((Expr::Variable(*idx), &tokens[1..])),
        Some(ExprToken::Minus) => {
            let (inner, rest) = parse_atom(&tokens[1..])?;
            Ok((Expr::Neg(Box::new(inner)), rest))
        }
        Some(ExprToken::Plus) => parse_atom(&tokens[1..]),
        Some(ExprToken::LParen) => {
            let (expr, rest) = parse_add_sub(&tokens[1..])?;
            match rest.first() {
                Some(ExprToken::RParen) => Ok((expr, &rest[1..])),
                _ => Err(expr_error("missing closing paren".into())),
            }
        }
        _ => Err(expr_error("unexpected end of expression".into())),
    }
}

// ─── Macro records ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum MacroRecord {
    /// `$k=expr`, visible to later records.
    Assignment { var: u32, expr: Expr },
    /// `code,arg,arg,...`
    Primitive { code: u32, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
    pub name: String,
    pub records: Vec<MacroRecord>,
}

/// Parse the raw body lines of an `%AM` block. Malformed records are
/// skipped with a warning; the macro itself survives.
pub fn parse_macro_body(name: &str, lines: &[String]) -> MacroDef {
    let mut records = Vec::new();

    for line in lines {
        let t = line.trim();
        if t.is_empty() {
            continue;
        }
        // Comment primitive.
        if t == "0" || t.starts_with("0 ") || t.starts_with("0,") {
            continue;
        }
        if let Some(rest) = t.strip_prefix('$') {
            let Some(eq) = rest.find('=') else {
                warn!("macro {name}: malformed assignment {t:?}");
                continue;
            };
            let Ok(var) = rest[..eq].trim().parse::<u32>() else {
                warn!("macro {name}: bad variable in {t:?}");
                continue;
            };
            match parse_expr(&rest[eq + 1..]) {
                Ok(expr) => records.push(MacroRecord::Assignment { var, expr }),
                Err(_) => warn!("macro {name}: bad expression in {t:?}"),
            }
            continue;
        }

        let mut parts = t.split(',');
        let code = parts.next().and_then(|c| c.trim().parse::<u32>().ok());
        let Some(code) = code else {
            warn!("macro {name}: bad primitive code in {t:?}");
            continue;
        };
        let mut args = Vec::new();
        let mut ok = true;
        for p in parts {
            match parse_expr(p) {
                Ok(e) => args.push(e),
                Err(_) => {
                    warn!("macro {name}: bad argument {p:?} in {t:?}");
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            records.push(MacroRecord::Primitive { code, args });
        }
    }

    MacroDef {
        name: name.to_string(),
        records,
    }
}

#[derive(Debug, Default)]
pub struct MacroTable {
    macros: HashMap<String, MacroDef>,
}

impl MacroTable {
    pub fn define(&mut self, def: MacroDef) {
        self.macros.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.macros.get(name)
    }
}

// ─── Simplification ──────────────────────────────────────────────────

struct VarTable {
    vars: Vec<f64>,
}

impl VarTable {
    fn new(params: &[f64]) -> Self {
        VarTable {
            vars: params.to_vec(),
        }
    }

    fn assign(&mut self, var: u32, value: f64) {
        if var == 0 {
            return;
        }
        let idx = var as usize - 1;
        if idx >= self.vars.len() {
            self.vars.resize(idx + 1, 0.0);
        }
        self.vars[idx] = value;
    }
}

/// Flatten a macro under the actual parameters from `%AD`. Records evaluate
/// left to right; assignments feed later records. Unknown primitive codes
/// and non-positive dimensions are skipped with a warning.
pub fn simplify(def: &MacroDef, params: &[f64]) -> Vec<MacroPrim> {
    let mut vars = VarTable::new(params);
    let mut out = Vec::new();

    for record in &def.records {
        match record {
            MacroRecord::Assignment { var, expr } => {
                let v = expr.eval(&vars.vars);
                vars.assign(*var, v);
            }
            MacroRecord::Primitive { code, args } => {
                let a: Vec<f64> = args.iter().map(|e| e.eval(&vars.vars)).collect();
                let get = |i: usize| a.get(i).copied().unwrap_or(0.0);
                match code {
                    1 => {
                        if a.len() < 4 {
                            warn!("macro {}: circle needs 4 arguments", def.name);
                            continue;
                        }
                        if get(1) <= 0.0 {
                            warn!("macro {}: skipping circle with non-positive diameter", def.name);
                            continue;
                        }
                        out.push(MacroPrim::Circle {
                            exposure: get(0),
                            diameter: get(1),
                            center: (get(2), get(3)),
                        });
                    }
                    4 => {
                        if a.len() < 4 {
                            warn!("macro {}: outline needs points", def.name);
                            continue;
                        }
                        let n = get(1) as usize;
                        // n segments means n+1 points; rotation follows.
                        let need = 2 + (n + 1) * 2;
                        if a.len() < need {
                            warn!("macro {}: outline point list too short", def.name);
                            continue;
                        }
                        let points = (0..=n)
                            .map(|k| (a[2 + k * 2], a[3 + k * 2]))
                            .collect();
                        out.push(MacroPrim::Outline {
                            exposure: get(0),
                            points,
                            rotation: get(need),
                        });
                    }
                    5 => {
                        if a.len() < 5 {
                            warn!("macro {}: polygon needs 5 arguments", def.name);
                            continue;
                        }
                        if get(4) <= 0.0 {
                            warn!("macro {}: skipping polygon with non-positive diameter", def.name);
                            continue;
                        }
                        out.push(MacroPrim::Polygon {
                            exposure: get(0),
                            sides: get(1) as u32,
                            center: (get(2), get(3)),
                            diameter: get(4),
                            rotation: get(5),
                        });
                    }
                    6 => {
                        if a.len() < 8 {
                            warn!("macro {}: moire needs 9 arguments", def.name);
                            continue;
                        }
                        out.push(MacroPrim::Moire {
                            center: (get(0), get(1)),
                            outer_diameter: get(2),
                            ring_thickness: get(3),
                            gap: get(4),
                            rings: get(5) as u32,
                            cross_thickness: get(6),
                            cross_length: get(7),
                            rotation: get(8),
                        });
                    }
                    7 => {
                        if a.len() < 5 {
                            warn!("macro {}: thermal needs 6 arguments", def.name);
                            continue;
                        }
                        out.push(MacroPrim::Thermal {
                            center: (get(0), get(1)),
                            outer_diameter: get(2),
                            inner_diameter: get(3),
                            cross_thickness: get(4),
                            rotation: get(5),
                        });
                    }
                    2 | 20 => {
                        if a.len() < 6 {
                            warn!("macro {}: vector line needs 7 arguments", def.name);
                            continue;
                        }
                        out.push(MacroPrim::Line20 {
                            exposure: get(0),
                            width: get(1),
                            start: (get(2), get(3)),
                            end: (get(4), get(5)),
                            rotation: get(6),
                        });
                    }
                    21 => {
                        if a.len() < 5 {
                            warn!("macro {}: center line needs 6 arguments", def.name);
                            continue;
                        }
                        out.push(MacroPrim::Line21 {
                            exposure: get(0),
                            width: get(1),
                            height: get(2),
                            center: (get(3), get(4)),
                            rotation: get(5),
                        });
                    }
                    22 => {
                        if a.len() < 5 {
                            warn!("macro {}: lower-left line needs 6 arguments", def.name);
                            continue;
                        }
                        out.push(MacroPrim::Line22 {
                            exposure: get(0),
                            width: get(1),
                            height: get(2),
                            lower_left: (get(3), get(4)),
                            rotation: get(5),
                        });
                    }
                    other => {
                        warn!("macro {}: unknown primitive code {other}", def.name);
                    }
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_literal() {
        assert!((parse_expr("42.5").unwrap().eval(&[]) - 42.5).abs() < 1e-9);
    }

    #[test]
    fn test_expr_variable() {
        assert!((parse_expr("$2").unwrap().eval(&[1.0, 7.0]) - 7.0).abs() < 1e-9);
        // Unbound variables evaluate to zero.
        assert_eq!(parse_expr("$9").unwrap().eval(&[1.0]), 0.0);
    }

    #[test]
    fn test_expr_precedence() {
        // x binds tighter than +: 2+3x4 = 14.
        assert!((parse_expr("2+3x4").unwrap().eval(&[]) - 14.0).abs() < 1e-9);
        assert!((parse_expr("(2+3)x4").unwrap().eval(&[]) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_expr_unary_minus() {
        assert!((parse_expr("-$1").unwrap().eval(&[2.5]) + 2.5).abs() < 1e-9);
        assert!((parse_expr("3x-2").unwrap().eval(&[]) + 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_expr_division_by_zero_is_zero() {
        assert_eq!(parse_expr("1/0").unwrap().eval(&[]), 0.0);
    }

    #[test]
    fn test_parse_body_with_assignment() {
        let def = parse_macro_body(
            "DONUT",
            &[
                "$3=$1x0.75".to_string(),
                "1,1,$1,0,0".to_string(),
                "1,0,$3,0,0".to_string(),
            ],
        );
        assert_eq!(def.records.len(), 3);
        assert!(matches!(def.records[0], MacroRecord::Assignment { var: 3, .. }));
    }

    #[test]
    fn test_simplify_line21() {
        // The BOX macro of a width/height parameterized rectangle.
        let def = parse_macro_body("BOX", &["21,1,$1,$2,0,0,0".to_string()]);
        let prims = simplify(&def, &[0.1, 0.2]);
        assert_eq!(
            prims,
            vec![MacroPrim::Line21 {
                exposure: 1.0,
                width: 0.1,
                height: 0.2,
                center: (0.0, 0.0),
                rotation: 0.0,
            }]
        );
    }

    #[test]
    fn test_simplify_assignment_feeds_later_records() {
        let def = parse_macro_body(
            "DONUT",
            &["$2=$1x0.5".to_string(), "1,1,$2,0,0".to_string()],
        );
        let prims = simplify(&def, &[1.0]);
        match &prims[0] {
            MacroPrim::Circle { diameter, .. } => assert!((diameter - 0.5).abs() < 1e-9),
            other => panic!("expected Circle, got {other:?}"),
        }
    }

    #[test]
    fn test_simplify_skips_nonpositive_diameter() {
        let def = parse_macro_body("BAD", &["1,1,0,0,0".to_string()]);
        assert!(simplify(&def, &[]).is_empty());
    }

    #[test]
    fn test_simplify_outline() {
        let def = parse_macro_body(
            "TRI",
            &["4,1,3,0,0,1,0,1,1,0,0,0".to_string()],
        );
        let prims = simplify(&def, &[]);
        match &prims[0] {
            MacroPrim::Outline { points, rotation, .. } => {
                assert_eq!(points.len(), 4);
                assert_eq!(points[0], (0.0, 0.0));
                assert_eq!(points[3], (0.0, 0.0));
                assert_eq!(*rotation, 0.0);
            }
            other => panic!("expected Outline, got {other:?}"),
        }
    }

    #[test]
    fn test_simplify_polygon_oc8() {
        let def = parse_macro_body("OC8", &["5,1,8,0,0,1.08239X$1,22.5".to_string()]);
        let prims = simplify(&def, &[0.1]);
        match &prims[0] {
            MacroPrim::Polygon {
                sides,
                diameter,
                rotation,
                ..
            } => {
                assert_eq!(*sides, 8);
                assert!((diameter - 0.108239).abs() < 1e-9);
                assert!((rotation - 22.5).abs() < 1e-9);
            }
            other => panic!("expected Polygon, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_macro_is_noop() {
        let def = parse_macro_body("EMPTY", &[]);
        assert!(simplify(&def, &[]).is_empty());
    }

    #[test]
    fn test_malformed_record_skipped_not_fatal() {
        let def = parse_macro_body(
            "MIX",
            &["nonsense".to_string(), "1,1,0.5,0,0".to_string()],
        );
        assert_eq!(def.records.len(), 1);
        assert_eq!(simplify(&def, &[]).len(), 1);
    }

    #[test]
    fn test_thermal() {
        let def = parse_macro_body("TH", &["7,0,0,0.08,0.055,0.0125,45".to_string()]);
        let prims = simplify(&def, &[]);
        match &prims[0] {
            MacroPrim::Thermal {
                outer_diameter,
                inner_diameter,
                rotation,
                ..
            } => {
                assert!((outer_diameter - 0.08).abs() < 1e-9);
                assert!((inner_diameter - 0.055).abs() < 1e-9);
                assert!((rotation - 45.0).abs() < 1e-9);
            }
            other => panic!("expected Thermal, got {other:?}"),
        }
    }
}
