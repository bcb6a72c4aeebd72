//! Update documents
//!
//! An update document such as `{$set: {"a.b": 1}, $inc: {n: 2}}` is parsed
//! into an [`Update`] tree. Path nodes (`Field`, `Index`, `Broadcast`) walk
//! to the target location; leaf nodes perform the mutation.
//!
//! Updates are applied to a clone of the stored document and the clone is
//! installed only if every operation succeeded, so a failing update never
//! leaves a document half-modified.
//!
//! Within the applier a `Null` value stands for "absent": `$set`, `$inc`,
//! `$push` and `$addToSet` create missing fields and intermediate
//! documents, index writes grow arrays with null holes.

use trellis_core::{Document, Error, FieldPath, PathSegment, Result, Value, ID_FIELD};

use crate::filter::{has_operators, parse_filter, parse_value_condition, Filter};

/// A parsed update
#[derive(Debug, Clone)]
pub enum Update {
    /// Replace the value
    Set(Value),
    /// Append values, creating the array if absent
    Push(Vec<Value>),
    /// Append values not already present
    AddToSet(Vec<Value>),
    /// Remove array elements matching the filter
    Pull(Filter),
    /// Remove a field from a document
    UnsetField(String),
    /// Null out an array element
    UnsetElement(usize),
    /// Add a number
    Inc(Value),
    /// Descend into a document field
    Field {
        /// Field name
        name: String,
        /// Create the field if it is absent
        create: bool,
        /// Update applied to the field value
        next: Box<Update>,
    },
    /// Descend into an array element
    Index {
        /// Element index
        index: usize,
        /// Grow the array if the index is out of range
        create: bool,
        /// Update applied to the element
        next: Box<Update>,
    },
    /// Apply to every element if the value is an array, else to the value
    Broadcast(Box<Update>),
    /// Apply every update in order
    All(Vec<Update>),
}

impl Update {
    /// Apply to a copy of `doc`, returning the updated document.
    ///
    /// `doc` itself is never modified, so an error leaves it intact.
    pub fn apply_to(&self, doc: &Document) -> Result<Document> {
        let mut value = Value::Document(doc.clone());
        self.apply(&mut value)?;
        let updated = match value {
            Value::Document(d) => d,
            other => {
                return Err(Error::type_mismatch("document", other.type_name()));
            }
        };
        if updated.get(ID_FIELD) != doc.get(ID_FIELD) {
            return Err(Error::bad_query("_id is immutable"));
        }
        Ok(updated)
    }

    fn apply(&self, target: &mut Value) -> Result<()> {
        match self {
            Update::Set(value) => {
                *target = value.clone();
                Ok(())
            }
            Update::Push(values) => match target {
                Value::Null => {
                    *target = Value::Array(values.clone());
                    Ok(())
                }
                Value::Array(items) => {
                    items.extend(values.iter().cloned());
                    Ok(())
                }
                other => Err(Error::type_mismatch("array", other.type_name())),
            },
            Update::AddToSet(values) => {
                if target.is_null() {
                    *target = Value::Array(Vec::new());
                }
                match target {
                    Value::Array(items) => {
                        for value in values {
                            if !items.iter().any(|item| item.loose_eq(value)) {
                                items.push(value.clone());
                            }
                        }
                        Ok(())
                    }
                    other => Err(Error::type_mismatch("array", other.type_name())),
                }
            }
            Update::Pull(filter) => match target {
                Value::Null => Ok(()),
                Value::Array(items) => {
                    items.retain(|item| !filter.matches_value(item));
                    Ok(())
                }
                other => Err(Error::type_mismatch("array", other.type_name())),
            },
            Update::UnsetField(name) => {
                if let Value::Document(d) = target {
                    d.remove(name);
                }
                Ok(())
            }
            Update::UnsetElement(index) => {
                if let Some(slot) = target.as_array_mut().and_then(|a| a.get_mut(*index)) {
                    *slot = Value::Null;
                }
                Ok(())
            }
            Update::Inc(amount) => {
                *target = increment(target, amount)?;
                Ok(())
            }
            Update::Field { name, create, next } => {
                if target.is_null() && *create {
                    *target = Value::Document(Document::new());
                }
                match target {
                    Value::Document(d) => {
                        if *create {
                            next.apply(d.get_or_insert_null(name))
                        } else {
                            match d.get_mut(name) {
                                Some(v) => next.apply(v),
                                None => Ok(()),
                            }
                        }
                    }
                    _ if !*create => Ok(()),
                    other => Err(Error::type_mismatch("document", other.type_name())),
                }
            }
            Update::Index {
                index,
                create,
                next,
            } => {
                if target.is_null() && *create {
                    *target = Value::Array(Vec::new());
                }
                match target {
                    Value::Array(items) => {
                        if *index >= items.len() {
                            if !*create {
                                return Ok(());
                            }
                            items.resize(*index + 1, Value::Null);
                        }
                        next.apply(&mut items[*index])
                    }
                    // A numeric component addresses a field on documents
                    Value::Document(d) => {
                        let key = index.to_string();
                        if *create {
                            next.apply(d.get_or_insert_null(&key))
                        } else {
                            match d.get_mut(&key) {
                                Some(v) => next.apply(v),
                                None => Ok(()),
                            }
                        }
                    }
                    _ if !*create => Ok(()),
                    other => Err(Error::type_mismatch("array", other.type_name())),
                }
            }
            Update::Broadcast(next) => match target {
                Value::Array(items) => {
                    for item in items.iter_mut() {
                        next.apply(item)?;
                    }
                    Ok(())
                }
                other => next.apply(other),
            },
            Update::All(updates) => {
                for update in updates {
                    update.apply(target)?;
                }
                Ok(())
            }
        }
    }
}

fn increment(current: &Value, amount: &Value) -> Result<Value> {
    match (current, amount) {
        (Value::Null, n) => Ok(n.clone()),
        (Value::Int32(a), Value::Int32(b)) => Ok(match a.checked_add(*b) {
            Some(sum) => Value::Int32(sum),
            None => Value::Int64(*a as i64 + *b as i64),
        }),
        (a, b) if a.is_integer() && b.is_integer() => {
            let (x, y) = (a.as_i64().unwrap_or(0), b.as_i64().unwrap_or(0));
            x.checked_add(y)
                .map(Value::Int64)
                .ok_or_else(|| Error::bad_query("$inc overflows a 64-bit integer"))
        }
        (a, b) if a.is_number() && b.is_number() => Ok(Value::Double(
            a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0),
        )),
        (a, _) => Err(Error::type_mismatch("number", a.type_name())),
    }
}

/// Wrap `leaf` so that it is applied at the location named by `segments`.
///
/// Every field component after the first broadcasts over arrays, matching
/// how filters walk dotted selectors.
fn locate(segments: &[PathSegment], create: bool, leaf: Update) -> Update {
    let mut update = leaf;
    for (i, segment) in segments.iter().enumerate().rev() {
        update = match segment {
            PathSegment::Index(index) => Update::Index {
                index: *index,
                create,
                next: Box::new(update),
            },
            PathSegment::Field(name) => {
                let field = Update::Field {
                    name: name.clone(),
                    create,
                    next: Box::new(update),
                };
                if i != 0 {
                    Update::Broadcast(Box::new(field))
                } else {
                    field
                }
            }
        };
    }
    update
}

fn unset(path: &FieldPath) -> Update {
    let parent = path.parent_segments();
    let leaf = match path.last() {
        Some(PathSegment::Index(index)) => Update::UnsetElement(*index),
        Some(PathSegment::Field(name)) if !parent.is_empty() => {
            Update::Broadcast(Box::new(Update::UnsetField(name.clone())))
        }
        Some(PathSegment::Field(name)) => Update::UnsetField(name.clone()),
        None => Update::All(Vec::new()),
    };
    locate(parent, false, leaf)
}

/// Parse an update document
pub fn parse_update(update: &Document) -> Result<Update> {
    if update.is_empty() {
        return Err(Error::bad_query("update document is empty"));
    }
    let mut updates = Vec::new();
    for (op, arg) in update.iter() {
        if !op.starts_with('$') {
            return Err(Error::bad_query(format!(
                "update documents may only contain operators, found {}",
                op
            )));
        }
        let fields = arg.as_document().ok_or_else(|| {
            Error::bad_query(format!(
                "{} requires a document argument, found {}",
                op,
                arg.type_name()
            ))
        })?;
        for (selector, value) in fields.iter() {
            let path = FieldPath::parse(selector)?;
            if matches!(path.segments().first(), Some(PathSegment::Field(f)) if f == ID_FIELD) {
                return Err(Error::bad_query("_id is immutable"));
            }
            let update = match op {
                "$set" => locate(path.segments(), true, Update::Set(value.clone())),
                "$unset" => unset(&path),
                "$inc" => {
                    if !value.is_number() {
                        return Err(Error::bad_query(format!(
                            "$inc requires a numeric argument, found {}",
                            value.type_name()
                        )));
                    }
                    locate(path.segments(), true, Update::Inc(value.clone()))
                }
                "$push" => locate(path.segments(), true, Update::Push(each(op, value)?)),
                "$addToSet" => {
                    locate(path.segments(), true, Update::AddToSet(each(op, value)?))
                }
                "$pull" => locate(path.segments(), false, Update::Pull(pull_filter(value)?)),
                other => {
                    return Err(Error::bad_query(format!(
                        "unsupported update operator {}",
                        other
                    )))
                }
            };
            updates.push(update);
        }
    }
    Ok(match updates.len() {
        1 => updates.remove(0),
        _ => Update::All(updates),
    })
}

/// The values appended by `$push`/`$addToSet`: a single value or `{$each: [..]}`
fn each(op: &str, value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::Document(d) if has_operators(d) => {
            let mut values = None;
            for (modifier, arg) in d.iter() {
                match modifier {
                    "$each" => {
                        let items = arg.as_array().ok_or_else(|| {
                            Error::bad_query(format!(
                                "$each requires an array, found {}",
                                arg.type_name()
                            ))
                        })?;
                        values = Some(items.to_vec());
                    }
                    other => {
                        return Err(Error::bad_query(format!(
                            "unsupported {} modifier {}",
                            op, other
                        )))
                    }
                }
            }
            values.ok_or_else(|| Error::bad_query(format!("{} modifier missing $each", op)))
        }
        other => Ok(vec![other.clone()]),
    }
}

/// `$pull` takes a query (applied to document elements), value operators
/// (applied to scalar elements) or a plain value.
fn pull_filter(value: &Value) -> Result<Filter> {
    match value {
        Value::Document(d) if !d.is_empty() && d.keys().all(|k| k.starts_with('$')) => {
            match d.keys().next() {
                Some("$and") | Some("$or") | Some("$nor") | Some("$not") => parse_filter(d),
                _ => parse_value_condition(d),
            }
        }
        Value::Document(d) => parse_filter(d),
        other => Ok(Filter::Equals(other.clone())),
    }
}

/// Validate a replacement document.
///
/// Replacements are whole documents, so they must not contain operators.
pub fn check_replacement(doc: &Document) -> Result<()> {
    match doc.keys().find(|k| k.starts_with('$')) {
        Some(op) => Err(Error::bad_query(format!(
            "replacement documents cannot contain operators, found {}",
            op
        ))),
        None => Ok(()),
    }
}
