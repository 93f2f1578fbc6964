//! Mode expression parsing and resolution.
//!
//! Accepts either an absolute octal mode (`644`, `0750`, `4755`) or a
//! comma-separated list of symbolic clauses in the classical `chmod`
//! grammar: `[ugoa]*([-+=]([rwxXst]*|[ugo]))+`. Symbolic clauses are
//! applied in order against the node's current mode.

use std::fmt;

use crate::error::PermissionError;

/// All permission and special bits.
const PERMISSION_BITS: u32 = 0o7777;

/// A parsed mode expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSpec {
    /// The expression as written.
    source: String,
    /// Parsed form.
    kind: SpecKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SpecKind {
    Absolute(u32),
    Symbolic(Vec<Clause>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Who {
    user: bool,
    group: bool,
    other: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    User,
    Group,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Remove,
    Set,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
struct Bits {
    read: bool,
    write: bool,
    execute: bool,
    conditional_execute: bool,
    set_id: bool,
    sticky: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Perms {
    Bits(Bits),
    Copy(Class),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Action {
    op: Op,
    perms: Perms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    who: Who,
    actions: Vec<Action>,
}

impl ModeSpec {
    /// Parses a mode expression.
    ///
    /// # Errors
    ///
    /// Returns `PermissionError::InvalidSpec` on malformed syntax.
    pub fn parse(spec: &str) -> Result<Self, PermissionError> {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return Err(PermissionError::invalid(spec, "empty mode spec"));
        }

        let kind = if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            SpecKind::Absolute(parse_octal(trimmed)?)
        } else {
            let clauses = trimmed
                .split(',')
                .map(|clause| parse_clause(clause, spec))
                .collect::<Result<Vec<_>, _>>()?;
            SpecKind::Symbolic(clauses)
        };

        Ok(Self {
            source: trimmed.to_string(),
            kind,
        })
    }

    /// Resolves the expression against the node's current mode.
    ///
    /// `is_dir` only matters for the conditional execute permission `X`.
    #[must_use]
    pub fn resolve(&self, current: u32, is_dir: bool) -> u32 {
        match &self.kind {
            SpecKind::Absolute(mode) => *mode,
            SpecKind::Symbolic(clauses) => clauses
                .iter()
                .fold(current & PERMISSION_BITS, |mode, clause| {
                    clause.apply(mode, is_dir)
                }),
        }
    }
}

/// Parses and resolves `spec` against `current` in one call.
///
/// # Errors
///
/// Returns `PermissionError::InvalidSpec` on malformed syntax.
pub fn resolve_mode(spec: &str, current: u32, is_dir: bool) -> Result<u32, PermissionError> {
    Ok(ModeSpec::parse(spec)?.resolve(current, is_dir))
}

fn parse_octal(digits: &str) -> Result<u32, PermissionError> {
    if digits.len() > 4 {
        return Err(PermissionError::invalid(
            digits,
            "octal mode has more than four digits",
        ));
    }
    u32::from_str_radix(digits, 8)
        .map_err(|_| PermissionError::invalid(digits, "not an octal number"))
}

fn parse_clause(clause: &str, spec: &str) -> Result<Clause, PermissionError> {
    let mut chars = clause.chars().peekable();
    let mut who = Who::default();

    while let Some(&c) = chars.peek() {
        match c {
            'u' => who.user = true,
            'g' => who.group = true,
            'o' => who.other = true,
            'a' => who = Who::ALL,
            _ => break,
        }
        chars.next();
    }
    if !who.any() {
        who = Who::ALL;
    }

    let mut actions = Vec::new();
    while let Some(c) = chars.next() {
        let op = match c {
            '+' => Op::Add,
            '-' => Op::Remove,
            '=' => Op::Set,
            other => {
                return Err(PermissionError::invalid(
                    spec,
                    format!("unexpected '{other}' in clause '{clause}'"),
                ));
            }
        };

        let mut bits = Bits::default();
        let mut copy = None;
        while let Some(&p) = chars.peek() {
            if matches!(p, '+' | '-' | '=') {
                break;
            }
            let copy_class = match p {
                'r' => {
                    bits.read = true;
                    None
                }
                'w' => {
                    bits.write = true;
                    None
                }
                'x' => {
                    bits.execute = true;
                    None
                }
                'X' => {
                    bits.conditional_execute = true;
                    None
                }
                's' => {
                    bits.set_id = true;
                    None
                }
                't' => {
                    bits.sticky = true;
                    None
                }
                'u' => Some(Class::User),
                'g' => Some(Class::Group),
                'o' => Some(Class::Other),
                other => {
                    return Err(PermissionError::invalid(
                        spec,
                        format!("unknown permission '{other}'"),
                    ));
                }
            };
            if let Some(class) = copy_class {
                if copy.is_some() {
                    return Err(PermissionError::invalid(
                        spec,
                        "only one permission class may be copied",
                    ));
                }
                copy = Some(class);
            }
            if copy.is_some() && bits != Bits::default() {
                return Err(PermissionError::invalid(
                    spec,
                    "cannot mix copied class with permission letters",
                ));
            }
            chars.next();
        }

        let perms = copy.map_or(Perms::Bits(bits), Perms::Copy);
        actions.push(Action { op, perms });
    }

    if actions.is_empty() {
        return Err(PermissionError::invalid(
            spec,
            format!("missing operator in clause '{clause}'"),
        ));
    }

    Ok(Clause { who, actions })
}

/// Replicates a permission triple into user, group and other positions.
const fn spread(triple: u32) -> u32 {
    (triple << 6) | (triple << 3) | triple
}

impl Who {
    const ALL: Self = Self {
        user: true,
        group: true,
        other: true,
    };

    const fn any(self) -> bool {
        self.user || self.group || self.other
    }

    const fn rwx_mask(self) -> u32 {
        let mut mask = 0;
        if self.user {
            mask |= 0o700;
        }
        if self.group {
            mask |= 0o070;
        }
        if self.other {
            mask |= 0o007;
        }
        mask
    }

    const fn special_mask(self) -> u32 {
        let mut mask = 0;
        if self.user {
            mask |= 0o4000;
        }
        if self.group {
            mask |= 0o2000;
        }
        if self.other {
            mask |= 0o1000;
        }
        mask
    }
}

impl Perms {
    fn bits(self, mode: u32, is_dir: bool, who: Who) -> u32 {
        match self {
            Self::Bits(bits) => {
                let mut triple = 0;
                if bits.read {
                    triple |= 4;
                }
                if bits.write {
                    triple |= 2;
                }
                if bits.execute || (bits.conditional_execute && (is_dir || mode & 0o111 != 0)) {
                    triple |= 1;
                }
                let mut out = spread(triple) & who.rwx_mask();
                if bits.set_id {
                    out |= who.special_mask() & 0o6000;
                }
                if bits.sticky && who.other {
                    out |= 0o1000;
                }
                out
            }
            Self::Copy(class) => {
                let triple = match class {
                    Class::User => (mode >> 6) & 0o7,
                    Class::Group => (mode >> 3) & 0o7,
                    Class::Other => mode & 0o7,
                };
                spread(triple) & who.rwx_mask()
            }
        }
    }
}

impl Clause {
    fn apply(&self, mode: u32, is_dir: bool) -> u32 {
        let cleared = self.who.rwx_mask() | self.who.special_mask();
        self.actions.iter().fold(mode, |mode, action| {
            let bits = action.perms.bits(mode, is_dir, self.who);
            match action.op {
                Op::Add => mode | bits,
                Op::Remove => mode & !bits,
                Op::Set => (mode & !cleared) | bits,
            }
        })
    }
}

impl fmt::Display for ModeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}
