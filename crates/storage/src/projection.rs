//! Projections
//!
//! A projection document selects which top-level fields a find returns:
//!
//! - `{field: 1}` includes only the listed fields (plus `_id`)
//! - `{field: 0}` returns everything except the listed fields
//! - `{_id: 0}` may be combined with either form
//! - `{field: {$slice: n}}` keeps the first `n` elements of an array,
//!   the last `-n` if negative; `{$slice: [skip, limit]}` takes a window
//!
//! Inclusion and exclusion cannot be mixed.

use trellis_core::{Document, Error, Result, Value, ID_FIELD};

#[derive(Debug, Clone, PartialEq)]
enum Slice {
    Head(usize),
    Tail(usize),
    Window { skip: i64, limit: usize },
}

impl Slice {
    fn apply(&self, items: &[Value]) -> Vec<Value> {
        match *self {
            Slice::Head(n) => items.iter().take(n).cloned().collect(),
            Slice::Tail(n) => items[items.len().saturating_sub(n)..].to_vec(),
            Slice::Window { skip, limit } => {
                let start = if skip < 0 {
                    items.len().saturating_sub(skip.unsigned_abs() as usize)
                } else {
                    (skip as usize).min(items.len())
                };
                items[start..].iter().take(limit).cloned().collect()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Include,
    Exclude,
}

/// A parsed projection
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    mode: Mode,
    fields: Vec<String>,
    slices: Vec<(String, Slice)>,
    include_id: bool,
}

impl Projection {
    /// Parse a projection document
    pub fn parse(spec: &Document) -> Result<Self> {
        let mut mode = None;
        let mut fields = Vec::new();
        let mut slices = Vec::new();
        let mut include_id = true;

        for (key, value) in spec.iter() {
            if key.contains('.') || key.starts_with('$') {
                return Err(Error::bad_query(format!(
                    "projection keys must be top-level field names, found {}",
                    key
                )));
            }
            if let Value::Document(d) = value {
                slices.push((key.to_string(), parse_slice(key, d)?));
                continue;
            }
            let include = match value {
                Value::Bool(b) => *b,
                v if v.is_number() => v.as_f64().map(|f| f != 0.0).unwrap_or(false),
                other => {
                    return Err(Error::bad_query(format!(
                        "projection value for {} must be 0/1 or a bool, found {}",
                        key,
                        other.type_name()
                    )))
                }
            };
            if key == ID_FIELD {
                include_id = include;
                continue;
            }
            let field_mode = if include { Mode::Include } else { Mode::Exclude };
            match mode {
                Some(m) if m != field_mode => {
                    return Err(Error::bad_query(
                        "projection cannot mix inclusion and exclusion",
                    ))
                }
                _ => mode = Some(field_mode),
            }
            fields.push(key.to_string());
        }

        Ok(Projection {
            // A projection with only $slice entries keeps every other field
            mode: mode.unwrap_or(Mode::Exclude),
            fields,
            slices,
            include_id,
        })
    }

    /// Produce the projected copy of `doc`
    pub fn apply(&self, doc: &Document) -> Document {
        let mut out = Document::with_capacity(doc.len());
        for (key, value) in doc.iter() {
            let keep = if key == ID_FIELD {
                self.include_id
            } else {
                let listed = self.fields.iter().any(|f| f == key);
                let sliced = self.slices.iter().any(|(f, _)| f == key);
                match self.mode {
                    Mode::Include => listed || sliced,
                    Mode::Exclude => !listed,
                }
            };
            if !keep {
                continue;
            }
            let value = match (self.slices.iter().find(|(f, _)| f == key), value) {
                (Some((_, slice)), Value::Array(items)) => Value::Array(slice.apply(items)),
                _ => value.clone(),
            };
            out.insert(key, value);
        }
        out
    }
}

fn parse_slice(key: &str, spec: &Document) -> Result<Slice> {
    let arg = match (spec.len(), spec.get("$slice")) {
        (1, Some(arg)) => arg,
        _ => {
            return Err(Error::bad_query(format!(
                "unsupported projection operator for {}: {}",
                key,
                spec.to_json()
            )))
        }
    };
    let invalid = || Error::bad_query(format!("invalid $slice for {}: {}", key, arg.to_json()));
    match arg {
        Value::Array(pair) if pair.len() == 2 => {
            let skip = pair[0].as_i64().ok_or_else(invalid)?;
            let limit = pair[1].as_i64().filter(|l| *l > 0).ok_or_else(invalid)?;
            Ok(Slice::Window {
                skip,
                limit: limit as usize,
            })
        }
        v => {
            let n = v.as_i64().ok_or_else(invalid)?;
            if n < 0 {
                Ok(Slice::Tail(n.unsigned_abs() as usize))
            } else {
                Ok(Slice::Head(n as usize))
            }
        }
    }
}
