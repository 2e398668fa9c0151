//! Math spans in model output (`$…$` inline, `$$…$$` display) become SVG
//! images next to the worksheet HTML.
//!
//! LaTeX is not typeset. The common subset is converted to Unicode
//! (fractions, roots, scripts, Greek, relations) and drawn as text with the
//! plotters SVG backend, which is enough for practice-sheet arithmetic and
//! algebra.

use plotters::prelude::*;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::errors::{WorkerError, WorkerResult};
use crate::services::escape_html;

const CHAR_WIDTH_EM: f64 = 0.62;
const PADDING_PX: u32 = 4;

fn math_span() -> &'static Regex {
    static MATH_SPAN: OnceLock<Regex> = OnceLock::new();
    MATH_SPAN.get_or_init(|| {
        Regex::new(r"\$\$([^$]+?)\$\$|\$([^$]+?)\$").expect("math span pattern is valid")
    })
}

/// Replaces every math span in `text` with an `<img>` whose SVG is written
/// into `dir` as `math_<tag>_<n>.svg`. Everything else is HTML-escaped.
pub fn embed_math(text: &str, dir: &Path, tag: &str, font_size: f64) -> WorkerResult<String> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for (i, caps) in math_span().captures_iter(text).enumerate() {
        let Some(whole) = caps.get(0) else { continue };
        let display = caps.get(1).is_some();
        let expr = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().trim())
            .unwrap_or_default();

        out.push_str(&escape_html(&text[last..whole.start()]));
        last = whole.end();

        if expr.is_empty() {
            out.push_str(&escape_html(whole.as_str()));
            continue;
        }

        let file_name = format!("math_{}_{}.svg", tag, i);
        let svg = render_svg(expr, font_size)?;
        std::fs::write(dir.join(&file_name), svg)?;

        let style = if display {
            "display: block; margin: 0.5em auto;"
        } else {
            "vertical-align: middle;"
        };
        out.push_str(&format!(
            r#"<img src="{}" alt="{}" style="{}">"#,
            file_name,
            escape_html(expr),
            style
        ));
    }

    out.push_str(&escape_html(&text[last..]));
    Ok(out)
}

/// Draws `expr` on a transparent canvas sized to the converted text.
pub fn render_svg(expr: &str, font_size: f64) -> WorkerResult<String> {
    let text = latex_to_unicode(expr);
    let chars = text.chars().count().max(1) as f64;
    let width = (chars * font_size * CHAR_WIDTH_EM).ceil() as u32 + PADDING_PX * 2;
    let height = (font_size * 1.5).ceil() as u32;

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (width, height)).into_drawing_area();
        let style = TextStyle::from(("serif", font_size).into_font()).color(&BLACK);
        root.draw_text(&text, &style, (PADDING_PX as i32, (font_size * 0.2) as i32))
            .map_err(|e| WorkerError::Render(e.to_string()))?;
        root.present()
            .map_err(|e| WorkerError::Render(e.to_string()))?;
    }
    Ok(svg)
}

/// Converts a LaTeX math expression to plain Unicode text.
pub fn latex_to_unicode(expr: &str) -> String {
    let chars: Vec<char> = expr.chars().collect();
    let mut pos = 0;
    let mut out = String::new();
    while pos < chars.len() {
        convert_token(&chars, &mut pos, &mut out);
    }
    collapse_spaces(&out)
}

// Converts up to the `}` that closes the current group (consumed) or the end.
fn convert_group(chars: &[char], pos: &mut usize) -> String {
    let mut out = String::new();
    while *pos < chars.len() {
        if chars[*pos] == '}' {
            *pos += 1;
            break;
        }
        convert_token(chars, pos, &mut out);
    }
    out
}

fn convert_token(chars: &[char], pos: &mut usize, out: &mut String) {
    let c = chars[*pos];
    *pos += 1;
    match c {
        '{' => out.push_str(&convert_group(chars, pos)),
        '}' => {}
        '\\' => convert_command(chars, pos, out),
        '^' => {
            let arg = read_arg(chars, pos);
            out.push_str(&script(&arg, true));
        }
        '_' => {
            let arg = read_arg(chars, pos);
            out.push_str(&script(&arg, false));
        }
        '~' => out.push(' '),
        '*' => out.push('·'),
        _ => out.push(c),
    }
}

fn read_command_name(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && chars[*pos].is_ascii_alphabetic() {
        *pos += 1;
    }
    if *pos == start && *pos < chars.len() {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

// A braced group, a single command, or a single character.
fn read_arg(chars: &[char], pos: &mut usize) -> String {
    while *pos < chars.len() && chars[*pos] == ' ' {
        *pos += 1;
    }
    if *pos >= chars.len() {
        return String::new();
    }
    let mut out = String::new();
    convert_token(chars, pos, &mut out);
    out
}

fn convert_command(chars: &[char], pos: &mut usize, out: &mut String) {
    let name = read_command_name(chars, pos);
    match name.as_str() {
        "frac" | "dfrac" | "tfrac" => {
            let num = read_arg(chars, pos);
            let den = read_arg(chars, pos);
            out.push_str(&wrap(&num));
            out.push('/');
            out.push_str(&wrap(&den));
        }
        "sqrt" => {
            let mut index = String::new();
            if chars.get(*pos) == Some(&'[') {
                *pos += 1;
                while *pos < chars.len() && chars[*pos] != ']' {
                    convert_token(chars, pos, &mut index);
                }
                *pos += 1;
            }
            let radicand = read_arg(chars, pos);
            if !index.is_empty() {
                out.push_str(&script(&index, true));
            }
            out.push('√');
            out.push_str(&wrap(&radicand));
        }
        "text" | "mathrm" | "mathbf" | "mathit" | "mathsf" | "textbf" | "textit"
        | "operatorname" | "boldsymbol" => out.push_str(&read_arg(chars, pos)),
        "left" | "right" | "big" | "Big" | "bigg" | "Bigg" => {
            // `\left.` is an invisible delimiter
            if chars.get(*pos) == Some(&'.') {
                *pos += 1;
            }
        }
        "," | ";" | ":" | " " | "quad" | "qquad" | "\\" => out.push(' '),
        "!" | "displaystyle" | "limits" => {}
        "{" | "}" | "$" | "%" | "&" | "#" | "_" | "|" => out.push_str(&name),
        "sin" | "cos" | "tan" | "cot" | "sec" | "csc" | "log" | "ln" | "exp" | "lim" | "max"
        | "min" | "det" | "gcd" | "arcsin" | "arccos" | "arctan" => {
            out.push_str(&name);
            if chars.get(*pos).is_some_and(|c| c.is_alphanumeric()) {
                out.push(' ');
            }
        }
        other => match symbol(other) {
            Some(sym) => out.push_str(sym),
            None => out.push_str(other),
        },
    }
}

fn wrap(s: &str) -> String {
    let simple = s.chars().count() <= 1 || s.chars().all(|c| c.is_alphanumeric() || c == '.');
    if simple {
        s.to_string()
    } else {
        format!("({})", s)
    }
}

fn script(arg: &str, superscript: bool) -> String {
    let mapped: Option<String> = arg
        .chars()
        .map(|c| {
            if superscript {
                superscript_char(c)
            } else {
                subscript_char(c)
            }
        })
        .collect();
    match mapped {
        Some(s) if !s.is_empty() => s,
        _ => {
            let mark = if superscript { '^' } else { '_' };
            if arg.chars().count() <= 1 {
                format!("{}{}", mark, arg)
            } else {
                format!("{}({})", mark, arg)
            }
        }
    }
}

fn superscript_char(c: char) -> Option<char> {
    Some(match c {
        '0' => '⁰',
        '1' => '¹',
        '2' => '²',
        '3' => '³',
        '4' => '⁴',
        '5' => '⁵',
        '6' => '⁶',
        '7' => '⁷',
        '8' => '⁸',
        '9' => '⁹',
        '+' => '⁺',
        '-' | '−' => '⁻',
        '=' => '⁼',
        '(' => '⁽',
        ')' => '⁾',
        'a' => 'ᵃ',
        'b' => 'ᵇ',
        'c' => 'ᶜ',
        'd' => 'ᵈ',
        'e' => 'ᵉ',
        'f' => 'ᶠ',
        'g' => 'ᵍ',
        'h' => 'ʰ',
        'i' => 'ⁱ',
        'j' => 'ʲ',
        'k' => 'ᵏ',
        'l' => 'ˡ',
        'm' => 'ᵐ',
        'n' => 'ⁿ',
        'o' => 'ᵒ',
        'p' => 'ᵖ',
        'r' => 'ʳ',
        's' => 'ˢ',
        't' => 'ᵗ',
        'u' => 'ᵘ',
        'v' => 'ᵛ',
        'w' => 'ʷ',
        'x' => 'ˣ',
        'y' => 'ʸ',
        'z' => 'ᶻ',
        '′' => '′',
        _ => return None,
    })
}

fn subscript_char(c: char) -> Option<char> {
    Some(match c {
        '0' => '₀',
        '1' => '₁',
        '2' => '₂',
        '3' => '₃',
        '4' => '₄',
        '5' => '₅',
        '6' => '₆',
        '7' => '₇',
        '8' => '₈',
        '9' => '₉',
        '+' => '₊',
        '-' | '−' => '₋',
        '=' => '₌',
        '(' => '₍',
        ')' => '₎',
        'a' => 'ₐ',
        'e' => 'ₑ',
        'h' => 'ₕ',
        'i' => 'ᵢ',
        'j' => 'ⱼ',
        'k' => 'ₖ',
        'l' => 'ₗ',
        'm' => 'ₘ',
        'n' => 'ₙ',
        'o' => 'ₒ',
        'p' => 'ₚ',
        'r' => 'ᵣ',
        's' => 'ₛ',
        't' => 'ₜ',
        'u' => 'ᵤ',
        'v' => 'ᵥ',
        'x' => 'ₓ',
        _ => return None,
    })
}

fn symbol(name: &str) -> Option<&'static str> {
    Some(match name {
        "alpha" => "α",
        "beta" => "β",
        "gamma" => "γ",
        "delta" => "δ",
        "epsilon" | "varepsilon" => "ε",
        "zeta" => "ζ",
        "eta" => "η",
        "theta" | "vartheta" => "θ",
        "iota" => "ι",
        "kappa" => "κ",
        "lambda" => "λ",
        "mu" => "μ",
        "nu" => "ν",
        "xi" => "ξ",
        "pi" => "π",
        "rho" => "ρ",
        "sigma" => "σ",
        "tau" => "τ",
        "upsilon" => "υ",
        "phi" | "varphi" => "φ",
        "chi" => "χ",
        "psi" => "ψ",
        "omega" => "ω",
        "Gamma" => "Γ",
        "Delta" => "Δ",
        "Theta" => "Θ",
        "Lambda" => "Λ",
        "Xi" => "Ξ",
        "Pi" => "Π",
        "Sigma" => "Σ",
        "Phi" => "Φ",
        "Psi" => "Ψ",
        "Omega" => "Ω",
        "times" => "×",
        "cdot" => "·",
        "div" => "÷",
        "pm" => "±",
        "mp" => "∓",
        "le" | "leq" => "≤",
        "ge" | "geq" => "≥",
        "ne" | "neq" => "≠",
        "approx" => "≈",
        "equiv" => "≡",
        "sim" => "∼",
        "propto" => "∝",
        "infty" => "∞",
        "sum" => "Σ",
        "prod" => "∏",
        "int" => "∫",
        "oint" => "∮",
        "partial" => "∂",
        "nabla" => "∇",
        "to" | "rightarrow" => "→",
        "leftarrow" => "←",
        "Rightarrow" | "implies" => "⇒",
        "Leftrightarrow" | "iff" => "⇔",
        "in" => "∈",
        "notin" => "∉",
        "subset" => "⊂",
        "subseteq" => "⊆",
        "cup" => "∪",
        "cap" => "∩",
        "emptyset" | "varnothing" => "∅",
        "forall" => "∀",
        "exists" => "∃",
        "angle" => "∠",
        "perp" => "⊥",
        "parallel" => "∥",
        "circ" | "degree" => "°",
        "prime" => "′",
        "ldots" | "dots" | "cdots" => "…",
        "lt" => "<",
        "gt" => ">",
        "mid" => "|",
        "langle" => "⟨",
        "rangle" => "⟩",
        "lfloor" => "⌊",
        "rfloor" => "⌋",
        "lceil" => "⌈",
        "rceil" => "⌉",
        _ => return None,
    })
}

fn collapse_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for c in s.trim().chars() {
        if c == ' ' {
            if !prev_space {
                out.push(c);
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out
}
