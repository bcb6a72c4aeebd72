//! Query filters
//!
//! A filter document is parsed once into a [`Filter`] tree and then
//! evaluated against each stored document. The tree nodes are deliberately
//! small; Mongo-style operators are expressed by composing them:
//!
//! | Node          | Meaning                                                     |
//! |---------------|-------------------------------------------------------------|
//! | `Select`      | descend into a document field (false if absent)             |
//! | `Index`       | descend into an array element (false if out of range)       |
//! | `Broadcast`   | match the value itself, or any element if it is an array    |
//! | `Equals`      | query equality ([`Value::loose_eq`])                        |
//! | `Compare`     | numeric ordering with int/float promotion                   |
//! | `ExactFields` | a document has no keys beyond the listed ones               |
//! | `All`, `ElemMatch`, `Size` | array operators                                |
//!
//! ## Field selectors
//!
//! A dotted selector `a.b.0.c` becomes `Select(a) → Broadcast → Select(b) →
//! Index(0) → Broadcast → Select(c)`: every field component after the first
//! is wrapped in a broadcast, so that a selector passing through an array is
//! existentially quantified over its elements.
//!
//! ## Supported operators
//!
//! - logical: `$and`, `$or`, `$nor`, `$not`
//! - comparison: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$regex`
//!   (with `$options`), `$exists`
//! - array: `$all`, `$elemMatch`, `$size`
//!
//! `$nin` is rejected; express it as `$nor` over `$in`.

use regex::Regex;
use std::fmt;
use trellis_core::{Document, Error, FieldPath, PathSegment, Result, Value};

/// Ordering used by [`Filter::Compare`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `$eq` on numbers
    Eq,
    /// `$gt`
    Gt,
    /// `$gte`
    Gte,
    /// `$lt`
    Lt,
    /// `$lte`
    Lte,
}

impl Comparison {
    fn from_operator(op: &str) -> Option<Self> {
        match op {
            "$gt" => Some(Comparison::Gt),
            "$gte" => Some(Comparison::Gte),
            "$lt" => Some(Comparison::Lt),
            "$lte" => Some(Comparison::Lte),
            _ => None,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
        }
    }
}

/// A parsed query filter
#[derive(Debug, Clone)]
pub enum Filter {
    /// Descend into a document field
    Select {
        /// Field name
        field: String,
        /// Filter applied to the field value
        next: Box<Filter>,
    },
    /// Descend into an array element
    Index {
        /// Element index
        index: usize,
        /// Filter applied to the element
        next: Box<Filter>,
    },
    /// Match the value itself or any of its elements
    Broadcast(Box<Filter>),
    /// Query equality
    Equals(Value),
    /// Numeric comparison against a constant
    Compare {
        /// Ordering
        op: Comparison,
        /// Right-hand side
        value: Value,
    },
    /// All sub-filters match
    And(Vec<Filter>),
    /// Any sub-filter matches
    Or(Vec<Filter>),
    /// Negation
    Not(Box<Filter>),
    /// Always matches whatever it is applied to
    Exists,
    /// Document has no keys beyond these
    ExactFields(Vec<String>),
    /// String matches a regular expression
    Regex(Regex),
    /// Every sub-filter matches some element of an array
    All(Vec<Filter>),
    /// Some element of an array matches
    ElemMatch(Box<Filter>),
    /// Array has exactly this many elements
    Size(usize),
}

/// What a filter node is applied to: a stored document or a field value.
#[derive(Clone, Copy)]
enum Target<'a> {
    Doc(&'a Document),
    Value(&'a Value),
}

impl<'a> Target<'a> {
    fn document(self) -> Option<&'a Document> {
        match self {
            Target::Doc(d) => Some(d),
            Target::Value(Value::Document(d)) => Some(d),
            Target::Value(_) => None,
        }
    }

    fn array(self) -> Option<&'a [Value]> {
        match self {
            Target::Value(Value::Array(a)) => Some(a),
            _ => None,
        }
    }
}

impl Filter {
    /// Filter that matches every document
    pub fn everything() -> Self {
        Filter::Exists
    }

    /// Build an `And`, collapsing the trivial cases
    pub fn and(mut filters: Vec<Filter>) -> Self {
        match filters.len() {
            0 => Filter::Exists,
            1 => filters.remove(0),
            _ => Filter::And(filters),
        }
    }

    /// Build an `Or`, collapsing the single-filter case
    pub fn or(mut filters: Vec<Filter>) -> Self {
        match filters.len() {
            0 => Filter::Exists,
            1 => filters.remove(0),
            _ => Filter::Or(filters),
        }
    }

    /// Negate a filter
    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// Wrap `next` so that it is applied at the location named by `path`
    pub fn lookup(path: &FieldPath, next: Filter) -> Self {
        let mut filter = next;
        for (i, segment) in path.segments().iter().enumerate().rev() {
            filter = match segment {
                PathSegment::Index(index) => Filter::Index {
                    index: *index,
                    next: Box::new(filter),
                },
                PathSegment::Field(field) => {
                    let select = Filter::Select {
                        field: field.clone(),
                        next: Box::new(filter),
                    };
                    if i != 0 {
                        Filter::Broadcast(Box::new(select))
                    } else {
                        select
                    }
                }
            };
        }
        filter
    }

    /// Evaluate against a stored document
    pub fn matches(&self, doc: &Document) -> bool {
        self.eval(Target::Doc(doc))
    }

    /// Evaluate against a single value (used for array elements)
    pub fn matches_value(&self, value: &Value) -> bool {
        self.eval(Target::Value(value))
    }

    fn eval(&self, target: Target<'_>) -> bool {
        match self {
            Filter::Select { field, next } => target
                .document()
                .and_then(|d| d.get(field))
                .map(|v| next.eval(Target::Value(v)))
                .unwrap_or(false),
            Filter::Index { index, next } => target
                .array()
                .and_then(|a| a.get(*index))
                .map(|v| next.eval(Target::Value(v)))
                .unwrap_or(false),
            Filter::Broadcast(next) => {
                next.eval(target)
                    || target
                        .array()
                        .map(|a| a.iter().any(|e| next.eval(Target::Value(e))))
                        .unwrap_or(false)
            }
            Filter::Equals(expected) => match target {
                Target::Value(v) => v.loose_eq(expected),
                Target::Doc(d) => expected.as_document().map(|e| d.loose_eq(e)).unwrap_or(false),
            },
            Filter::Compare { op, value } => match target {
                Target::Value(v) => match v.compare_numeric(value) {
                    Some(ord) => match op {
                        Comparison::Eq => ord.is_eq(),
                        Comparison::Gt => ord.is_gt(),
                        Comparison::Gte => ord.is_ge(),
                        Comparison::Lt => ord.is_lt(),
                        Comparison::Lte => ord.is_le(),
                    },
                    None => false,
                },
                Target::Doc(_) => false,
            },
            Filter::And(filters) => filters.iter().all(|f| f.eval(target)),
            Filter::Or(filters) => filters.iter().any(|f| f.eval(target)),
            Filter::Not(filter) => !filter.eval(target),
            Filter::Exists => true,
            Filter::ExactFields(fields) => target
                .document()
                .map(|d| d.keys().all(|k| fields.iter().any(|f| f == k)))
                .unwrap_or(false),
            Filter::Regex(re) => match target {
                Target::Value(Value::String(s)) => re.is_match(s),
                _ => false,
            },
            Filter::All(filters) => match target.array() {
                Some(a) if !filters.is_empty() => filters
                    .iter()
                    .all(|f| a.iter().any(|e| f.eval(Target::Value(e)))),
                _ => false,
            },
            Filter::ElemMatch(filter) => target
                .array()
                .map(|a| a.iter().any(|e| filter.eval(Target::Value(e))))
                .unwrap_or(false),
            Filter::Size(n) => target.array().map(|a| a.len() == *n).unwrap_or(false),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, filters: &[Filter], sep: &str) -> fmt::Result {
            for (i, filter) in filters.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "({})", filter)?;
            }
            Ok(())
        }

        match self {
            Filter::Select { field, next } => write!(f, ".{} {}", field, next),
            Filter::Index { index, next } => write!(f, "[{}] {}", index, next),
            Filter::Broadcast(next) => write!(f, "broadcast {}", next),
            Filter::Equals(v) => write!(f, "= {}", v.to_json()),
            Filter::Compare { op, value } => write!(f, "{} {}", op.symbol(), value.to_json()),
            Filter::And(filters) => join(f, filters, " && "),
            Filter::Or(filters) => join(f, filters, " || "),
            Filter::Not(filter) => write!(f, "NOT ({})", filter),
            Filter::Exists => f.write_str("exists"),
            Filter::ExactFields(fields) => write!(f, "exact fields ({})", fields.join(", ")),
            Filter::Regex(re) => write!(f, "regex({})", re.as_str()),
            Filter::All(filters) => {
                f.write_str("all")?;
                join(f, filters, ", ")
            }
            Filter::ElemMatch(filter) => write!(f, "elemMatch({})", filter),
            Filter::Size(n) => write!(f, "size {}", n),
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse a filter document.
///
/// An empty document matches everything.
pub fn parse_filter(filter: &Document) -> Result<Filter> {
    parse_query(filter)
}

/// Parse the operator part of a condition (`{$gte: 6, $lt: 10}`) into a
/// filter applied directly to a value. Used for `$elemMatch` over scalars
/// and for `$pull` with operator conditions.
pub fn parse_value_condition(ops: &Document) -> Result<Filter> {
    let mut filters = Vec::with_capacity(ops.len());
    for (op, arg) in ops.iter() {
        match op {
            "$ne" => filters.push(Filter::not(parse_value(arg)?)),
            "$exists" => {
                if !exists_flag(arg)? {
                    return Ok(Filter::not(Filter::Exists));
                }
            }
            _ => filters.push(parse_value_operator(op, arg, ops)?),
        }
    }
    Ok(Filter::and(filters))
}

/// True if any key of the document is an operator
pub fn has_operators(d: &Document) -> bool {
    d.keys().any(|k| k.starts_with('$'))
}

fn parse_query(d: &Document) -> Result<Filter> {
    let mut filters = Vec::with_capacity(d.len());
    for (key, value) in d.iter() {
        filters.push(parse_condition(key, value)?);
    }
    Ok(Filter::and(filters))
}

fn parse_queries(key: &str, value: &Value) -> Result<Vec<Filter>> {
    let items = value.as_array().ok_or_else(|| {
        Error::bad_query(format!("{} must be an array of filter documents", key))
    })?;
    items
        .iter()
        .map(|item| match item {
            Value::Document(d) => parse_query(d),
            other => Err(Error::bad_query(format!(
                "{} expects filter documents, found {}",
                key,
                other.type_name()
            ))),
        })
        .collect()
}

fn parse_logical(key: &str, value: &Value) -> Result<Option<Filter>> {
    match key {
        "$and" => Ok(Some(Filter::and(parse_queries(key, value)?))),
        "$or" => Ok(Some(Filter::or(parse_queries(key, value)?))),
        "$nor" => Ok(Some(Filter::not(Filter::or(parse_queries(key, value)?)))),
        "$not" => match value {
            Value::Document(d) => Ok(Some(Filter::not(parse_query(d)?))),
            other => Err(Error::bad_query(format!(
                "$not must be a filter document, found {}",
                other.type_name()
            ))),
        },
        _ => Ok(None),
    }
}

/// A root condition: either a logical operator or a field selector with a
/// value or operator document.
fn parse_condition(key: &str, value: &Value) -> Result<Filter> {
    if let Some(filter) = parse_logical(key, value)? {
        return Ok(filter);
    }
    if key.starts_with('$') {
        return Err(Error::bad_query(format!(
            "unexpected condition key {}",
            key
        )));
    }
    let path = FieldPath::parse(key)?;

    match value {
        Value::Document(d) if has_operators(d) => parse_operator_condition(&path, d),
        Value::Document(d) => Ok(Filter::lookup(
            &path,
            Filter::Broadcast(Box::new(parse_values(d)?)),
        )),
        Value::Array(a) => Ok(Filter::lookup(&path, parse_array_values(a)?)),
        // {f: null} also matches documents where f is missing
        Value::Null => Ok(Filter::or(vec![
            Filter::not(Filter::lookup(&path, Filter::Exists)),
            Filter::lookup(&path, Filter::Broadcast(Box::new(Filter::Equals(Value::Null)))),
        ])),
        scalar => Ok(Filter::lookup(
            &path,
            Filter::Broadcast(Box::new(Filter::Equals(scalar.clone()))),
        )),
    }
}

const ARRAY_OPERATORS: [&str; 3] = ["$all", "$elemMatch", "$size"];

fn parse_operator_condition(path: &FieldPath, ops: &Document) -> Result<Filter> {
    let array_ops = ops.keys().filter(|k| ARRAY_OPERATORS.contains(k)).count();
    if array_ops > 0 {
        if array_ops != ops.len() {
            return Err(Error::bad_query(format!(
                "invalid mix of array and non-array operators in {}",
                ops.to_json()
            )));
        }
        let mut filters = Vec::with_capacity(ops.len());
        for (op, arg) in ops.iter() {
            filters.push(parse_array_operator(op, arg)?);
        }
        return Ok(Filter::lookup(path, Filter::and(filters)));
    }

    // $exists: false overrides every other operator on the field
    if let Some(flag) = ops.get("$exists") {
        if !exists_flag(flag)? {
            return Ok(Filter::not(Filter::lookup(path, Filter::Exists)));
        }
    }

    let mut positive = Vec::new();
    let mut negated = Vec::new();
    for (op, arg) in ops.iter() {
        match op {
            "$exists" => positive.push(Filter::Exists),
            // $ne also matches documents where the field is missing
            "$ne" => negated.push(Filter::not(Filter::lookup(
                path,
                Filter::Broadcast(Box::new(parse_value(arg)?)),
            ))),
            _ => positive.push(parse_value_operator(op, arg, ops)?),
        }
    }

    let mut filters = negated;
    if !positive.is_empty() {
        filters.insert(
            0,
            Filter::lookup(path, Filter::Broadcast(Box::new(Filter::and(positive)))),
        );
    }
    Ok(Filter::and(filters))
}

fn exists_flag(arg: &Value) -> Result<bool> {
    arg.as_bool().ok_or_else(|| {
        Error::bad_query(format!(
            "$exists requires a bool value, found {}",
            arg.type_name()
        ))
    })
}

fn parse_value_operator(op: &str, arg: &Value, siblings: &Document) -> Result<Filter> {
    if let Some(cmp) = Comparison::from_operator(op) {
        if !arg.is_number() {
            return Err(Error::bad_query(format!(
                "{} requires a numeric argument, found {}",
                op,
                arg.type_name()
            )));
        }
        return Ok(Filter::Compare {
            op: cmp,
            value: arg.clone(),
        });
    }

    match op {
        "$eq" => parse_value(arg),
        "$in" => {
            let items = arg.as_array().ok_or_else(|| {
                Error::bad_query(format!("$in requires an array, found {}", arg.type_name()))
            })?;
            if items.is_empty() {
                return Ok(Filter::not(Filter::Exists));
            }
            let filters = items.iter().map(parse_value).collect::<Result<Vec<_>>>()?;
            Ok(Filter::or(filters))
        }
        "$nin" => Err(Error::bad_query(
            "$nin is not supported; use $nor and $in instead",
        )),
        "$regex" => {
            let pattern = arg.as_str().ok_or_else(|| {
                Error::bad_query(format!(
                    "$regex value must be a string, found {}",
                    arg.type_name()
                ))
            })?;
            let options = match siblings.get("$options") {
                Some(Value::String(o)) => o.as_str(),
                Some(other) => {
                    return Err(Error::bad_query(format!(
                        "$options must be a string, found {}",
                        other.type_name()
                    )))
                }
                None => "",
            };
            compile_regex(pattern, options)
        }
        // consumed by $regex
        "$options" => Ok(Filter::Exists),
        other => Err(Error::bad_query(format!("unsupported operator {}", other))),
    }
}

fn compile_regex(pattern: &str, options: &str) -> Result<Filter> {
    let mut flags = String::new();
    for c in options.chars() {
        match c {
            'i' | 'm' | 's' | 'x' => flags.push(c),
            other => {
                return Err(Error::bad_query(format!(
                    "unsupported $regex option {:?}",
                    other
                )))
            }
        }
    }
    let source = if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", flags, pattern)
    };
    Regex::new(&source)
        .map(Filter::Regex)
        .map_err(|e| Error::bad_query(format!("invalid $regex {:?}: {}", pattern, e)))
}

fn parse_array_operator(op: &str, arg: &Value) -> Result<Filter> {
    match op {
        "$all" => {
            let items = arg.as_array().ok_or_else(|| {
                Error::bad_query(format!("$all requires an array, found {}", arg.type_name()))
            })?;
            let filters = items.iter().map(parse_value).collect::<Result<Vec<_>>>()?;
            Ok(Filter::All(filters))
        }
        "$elemMatch" => {
            let d = arg.as_document().ok_or_else(|| {
                Error::bad_query(format!(
                    "$elemMatch requires a document, found {}",
                    arg.type_name()
                ))
            })?;
            let is_value_condition = !d.is_empty()
                && d.keys()
                    .all(|k| k.starts_with('$') && !matches!(k, "$and" | "$or" | "$nor" | "$not"));
            let inner = if is_value_condition {
                parse_value_condition(d)?
            } else {
                parse_query(d)?
            };
            Ok(Filter::ElemMatch(Box::new(inner)))
        }
        "$size" => match arg.as_i64().or_else(|| {
            arg.as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as i64)
        }) {
            Some(n) if n >= 0 => Ok(Filter::Size(n as usize)),
            _ => Err(Error::bad_query(format!(
                "$size requires a non-negative integer, found {}",
                arg.to_json()
            ))),
        },
        other => Err(Error::bad_query(format!("unsupported operator {}", other))),
    }
}

/// A literal value on the right of a condition
fn parse_value(value: &Value) -> Result<Filter> {
    match value {
        Value::Document(d) => parse_values(d),
        Value::Array(a) => parse_array_values(a),
        scalar => Ok(Filter::Equals(scalar.clone())),
    }
}

/// A sub-document literal: every listed field matches and no others exist
fn parse_values(d: &Document) -> Result<Filter> {
    let mut filters = Vec::with_capacity(d.len() + 1);
    let mut fields = Vec::with_capacity(d.len());
    for (key, value) in d.iter() {
        if key.starts_with('$') {
            return Err(Error::bad_query(format!(
                "values cannot contain operators; found {} in {}",
                key,
                d.to_json()
            )));
        }
        if key.contains('.') {
            return Err(Error::bad_query(format!(
                "cannot use selector {} within a value",
                key
            )));
        }
        filters.push(Filter::Select {
            field: key.to_string(),
            next: Box::new(parse_value(value)?),
        });
        fields.push(key.to_string());
    }
    filters.push(Filter::ExactFields(fields));
    Ok(Filter::and(filters))
}

/// An array literal: exact positional match
fn parse_array_values(a: &[Value]) -> Result<Filter> {
    let mut filters = Vec::with_capacity(a.len() + 1);
    filters.push(Filter::Size(a.len()));
    for (index, item) in a.iter().enumerate() {
        filters.push(Filter::Index {
            index,
            next: Box::new(parse_value(item)?),
        });
    }
    Ok(Filter::and(filters))
}
