//! Purpose: Compile and evaluate jq-style row filters (`--where`) against TFS rows.
//! Exports: `RowPredicate`, `CellVal`, `compile_row_predicates`, `matches_all`.
//! Role: Adapter around `jaq-core`; each row is presented as `{COLUMN: value, ...}`.
//! Invariants: Parse/compile failures are usage errors; runtime eval errors count as "no match".
//! Invariants: Each expression must yield only booleans (otherwise: usage error).
//! Invariants: Integer cells stay integers; int/float comparisons are by numeric value.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use jaq_core::load::{Arena, File, Loader};
use jaq_core::ops::Math;
use jaq_core::path::Opt;
use jaq_core::{Compiler, Ctx, Error as JaqError, Native, RcIter};
use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::table::Row;
use crate::core::value::Value;

#[derive(Clone)]
pub struct RowPredicate {
    expr: String,
    filter: jaq_core::Filter<Native<CellVal>>,
}

impl fmt::Debug for RowPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowPredicate")
            .field("expr", &self.expr)
            .finish()
    }
}

impl RowPredicate {
    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn matches(&self, row: &Row<'_>) -> Result<bool, Error> {
        self.matches_value(CellVal::from_row(row))
    }

    fn matches_value(&self, input: CellVal) -> Result<bool, Error> {
        let inputs = RcIter::new(core::iter::empty::<Result<CellVal, String>>());
        let out = self.filter.run((Ctx::new([], &inputs), input));

        let mut any_true = false;
        for item in out {
            match item {
                Ok(CellVal::Bool(true)) => any_true = true,
                Ok(CellVal::Bool(false)) => {}
                Ok(other) => {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message("--where expression must yield booleans")
                        .with_hint(format!(
                            "Expression `{}` yielded non-boolean value: {other}",
                            self.expr
                        )));
                }
                // Missing columns and type errors are a non-match, not a failure.
                Err(_) => return Ok(false),
            }
        }
        Ok(any_true)
    }
}

pub fn compile_row_predicates(exprs: &[String]) -> Result<Vec<RowPredicate>, Error> {
    exprs.iter().map(|expr| compile_row_predicate(expr)).collect()
}

/// True when the row satisfies every predicate.
pub fn matches_all(predicates: &[RowPredicate], row: &Row<'_>) -> Result<bool, Error> {
    let input = CellVal::from_row(row);
    for predicate in predicates {
        if !predicate.matches_value(input.clone())? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn compile_row_predicate(expr: &str) -> Result<RowPredicate, Error> {
    let arena = Arena::default();
    let loader = Loader::new(std::iter::empty());
    let program = File {
        code: expr,
        path: (),
    };
    let modules = loader
        .load(&arena, program)
        .map_err(|errs| compile_error(expr, errs))?;
    let filter = Compiler::default()
        .with_funs(jaq_std::base_funs::<CellVal>())
        .compile(modules)
        .map_err(|errs| compile_error(expr, errs))?;

    debug!(expr, "compiled row predicate");
    Ok(RowPredicate {
        expr: expr.to_string(),
        filter,
    })
}

fn compile_error<E: fmt::Debug>(expr: &str, err: E) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message("invalid --where expression")
        .with_hint(format!(
            "Failed to parse/compile `{expr}`.\nDetails: {err:?}\nExample: --where '.BETX > 100 and .NAME != \"IP1\"'"
        ))
}

/// jq value model for row evaluation. Integers and floats are kept apart so
/// integer columns compare exactly.
#[derive(Clone, Debug)]
pub enum CellVal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<CellVal>),
    Record(BTreeMap<String, CellVal>),
}

impl CellVal {
    pub fn from_row(row: &Row<'_>) -> Self {
        let record = row
            .columns()
            .iter()
            .zip(row.values())
            .map(|(column, value)| (column.name.clone(), CellVal::from(value)))
            .collect();
        Self::Record(record)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Float(_) => 2,
            Self::Text(_) => 3,
            Self::List(_) => 4,
            Self::Record(_) => 5,
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    fn text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    fn position(&self) -> Option<isize> {
        match self {
            Self::Int(n) => isize::try_from(*n).ok(),
            Self::Float(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as isize),
            _ => None,
        }
    }

    fn int_or_float(exact: Option<i64>, approx: f64) -> Self {
        exact.map_or(Self::Float(approx), Self::Int)
    }
}

impl From<&Value> for CellVal {
    fn from(value: &Value) -> Self {
        match value {
            Value::Int(n) => Self::Int(*n),
            Value::Float(n) => Self::Float(*n),
            Value::Text(s) => Self::Text(s.clone()),
        }
    }
}

impl fmt::Display for CellVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n:?}"),
            Self::Text(s) => match serde_json::to_string(s) {
                Ok(encoded) => f.write_str(&encoded),
                Err(_) => f.write_str("\"<invalid string>\""),
            },
            Self::List(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Record(fields) => {
                f.write_str("{")?;
                for (idx, (key, value)) in fields.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}:{value}", Self::Text(key.clone()))?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for CellVal {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<isize> for CellVal {
    fn from(value: isize) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for CellVal {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for CellVal {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl FromIterator<Self> for CellVal {
    fn from_iter<T: IntoIterator<Item = Self>>(iter: T) -> Self {
        Self::List(iter.into_iter().collect())
    }
}

impl PartialEq for CellVal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CellVal {}

impl PartialOrd for CellVal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellVal {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_rank = self.rank().cmp(&other.rank());
        if by_rank != Ordering::Equal {
            return by_rank;
        }
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::List(a), Self::List(b)) => a.cmp(b),
            (Self::Record(a), Self::Record(b)) => a.cmp(b),
            (a, b) => match (a.number(), b.number()) {
                (Some(x), Some(y)) => compare_numbers(x, y),
                _ => Ordering::Equal,
            },
        }
    }
}

/// NaN of either sign sorts below every number and equals itself.
fn compare_numbers(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => x.total_cmp(&y),
    }
}

impl std::ops::Add for CellVal {
    type Output = Result<Self, JaqError<Self>>;

    fn add(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::Null, other) | (other, Self::Null) => Ok(other),
            (Self::Int(a), Self::Int(b)) => {
                Ok(Self::int_or_float(a.checked_add(b), a as f64 + b as f64))
            }
            (Self::Text(a), Self::Text(b)) => Ok(Self::Text(a + &b)),
            (Self::List(mut a), Self::List(b)) => {
                a.extend(b);
                Ok(Self::List(a))
            }
            (Self::Record(mut a), Self::Record(b)) => {
                a.extend(b);
                Ok(Self::Record(a))
            }
            (l, r) => match (l.number(), r.number()) {
                (Some(x), Some(y)) => Ok(Self::Float(x + y)),
                _ => Err(JaqError::math(l, Math::Add, r)),
            },
        }
    }
}

impl std::ops::Sub for CellVal {
    type Output = Result<Self, JaqError<Self>>;

    fn sub(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => {
                Ok(Self::int_or_float(a.checked_sub(b), a as f64 - b as f64))
            }
            (Self::List(a), Self::List(b)) => {
                Ok(Self::List(a.into_iter().filter(|v| !b.contains(v)).collect()))
            }
            (l, r) => match (l.number(), r.number()) {
                (Some(x), Some(y)) => Ok(Self::Float(x - y)),
                _ => Err(JaqError::math(l, Math::Sub, r)),
            },
        }
    }
}

impl std::ops::Mul for CellVal {
    type Output = Result<Self, JaqError<Self>>;

    fn mul(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => {
                Ok(Self::int_or_float(a.checked_mul(b), a as f64 * b as f64))
            }
            (l, r) => match (l.number(), r.number()) {
                (Some(x), Some(y)) => Ok(Self::Float(x * y)),
                _ => Err(JaqError::math(l, Math::Mul, r)),
            },
        }
    }
}

impl std::ops::Div for CellVal {
    type Output = Result<Self, JaqError<Self>>;

    fn div(self, rhs: Self) -> Self::Output {
        match (self.number(), rhs.number()) {
            (Some(x), Some(y)) if y != 0.0 => Ok(Self::Float(x / y)),
            _ => Err(JaqError::math(self, Math::Div, rhs)),
        }
    }
}

impl std::ops::Rem for CellVal {
    type Output = Result<Self, JaqError<Self>>;

    fn rem(self, rhs: Self) -> Self::Output {
        let truncated = |v: &Self| v.number().filter(|n| n.is_finite()).map(|n| n as i64);
        match (truncated(&self), truncated(&rhs)) {
            (Some(a), Some(b)) if b != 0 => Ok(Self::Int(a.wrapping_rem(b))),
            _ => Err(JaqError::math(self, Math::Rem, rhs)),
        }
    }
}

impl std::ops::Neg for CellVal {
    type Output = Result<Self, JaqError<Self>>;

    fn neg(self) -> Self::Output {
        match self {
            Self::Int(n) => Ok(Self::int_or_float(n.checked_neg(), -(n as f64))),
            Self::Float(n) => Ok(Self::Float(-n)),
            other => Err(JaqError::typ(other, "number")),
        }
    }
}

fn first_output<'a, I>(mut outputs: I) -> jaq_core::ValX<'a, CellVal>
where
    I: Iterator<Item = jaq_core::ValX<'a, CellVal>>,
{
    outputs.next().unwrap_or(Ok(CellVal::Null))
}

impl jaq_core::ValT for CellVal {
    fn from_num(n: &str) -> Result<Self, JaqError<Self>> {
        if let Ok(int) = n.parse::<i64>() {
            return Ok(Self::Int(int));
        }
        n.parse::<f64>().map(Self::Float).map_err(JaqError::str)
    }

    fn from_map<I: IntoIterator<Item = (Self, Self)>>(iter: I) -> Result<Self, JaqError<Self>> {
        let mut fields = BTreeMap::new();
        for (key, value) in iter {
            match key {
                Self::Text(key) => {
                    fields.insert(key, value);
                }
                other => return Err(JaqError::typ(other, "string")),
            }
        }
        Ok(Self::Record(fields))
    }

    fn values(self) -> Box<dyn Iterator<Item = Result<Self, JaqError<Self>>>> {
        match self {
            Self::List(items) => Box::new(items.into_iter().map(Ok)),
            Self::Record(fields) => Box::new(fields.into_values().map(Ok)),
            other => Box::new(std::iter::once(Err(JaqError::typ(other, "iterable")))),
        }
    }

    fn index(self, index: &Self) -> Result<Self, JaqError<Self>> {
        match (self, index) {
            (Self::Record(mut fields), Self::Text(key)) => fields
                .remove(key)
                .ok_or_else(|| JaqError::index(Self::Record(fields), index.clone())),
            (Self::List(items), _) => {
                let Some(pos) = index.position() else {
                    return Err(JaqError::typ(index.clone(), "integer"));
                };
                let len = items.len() as isize;
                let pos = if pos < 0 { len + pos } else { pos };
                usize::try_from(pos)
                    .ok()
                    .and_then(|pos| items.get(pos).cloned())
                    .ok_or_else(|| JaqError::index(Self::List(items), index.clone()))
            }
            (other, _) => Err(JaqError::index(other, index.clone())),
        }
    }

    fn range(self, range: jaq_core::val::Range<&Self>) -> Result<Self, JaqError<Self>> {
        let items = match self {
            Self::List(items) => items,
            other => return Err(JaqError::typ(other, "array")),
        };
        let bound = |v: &Self| v.position().ok_or_else(|| JaqError::typ(v.clone(), "integer"));
        let len = items.len() as isize;
        let clamp = |pos: isize| (if pos < 0 { len + pos } else { pos }).clamp(0, len) as usize;
        let start = clamp(range.start.map(bound).transpose()?.unwrap_or(0));
        let end = clamp(range.end.map(bound).transpose()?.unwrap_or(len));
        Ok(Self::List(
            items.get(start..end.max(start)).unwrap_or_default().to_vec(),
        ))
    }

    fn map_values<'a, I: Iterator<Item = jaq_core::ValX<'a, Self>>>(
        self,
        opt: Opt,
        f: impl Fn(Self) -> I,
    ) -> jaq_core::ValX<'a, Self> {
        match self {
            Self::List(items) => items
                .into_iter()
                .map(|item| first_output(f(item)))
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            Self::Record(fields) => fields
                .into_iter()
                .map(|(key, value)| first_output(f(value)).map(|value| (key, value)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Self::Record),
            other => match opt {
                Opt::Optional => Ok(other),
                Opt::Essential => Err(JaqError::typ(other, "iterable").into()),
            },
        }
    }

    fn map_index<'a, I: Iterator<Item = jaq_core::ValX<'a, Self>>>(
        self,
        index: &Self,
        opt: Opt,
        f: impl Fn(Self) -> I,
    ) -> jaq_core::ValX<'a, Self> {
        let (Self::Record(mut fields), Some(key)) = (self.clone(), index.text()) else {
            return match opt {
                Opt::Optional => Ok(self),
                Opt::Essential => Err(JaqError::index(self, index.clone()).into()),
            };
        };
        match fields.remove(key) {
            Some(value) => {
                let updated = first_output(f(value))?;
                fields.insert(key.to_string(), updated);
                Ok(Self::Record(fields))
            }
            None => match opt {
                Opt::Optional => Ok(Self::Record(fields)),
                Opt::Essential => Err(JaqError::index(Self::Record(fields), index.clone()).into()),
            },
        }
    }

    fn map_range<'a, I: Iterator<Item = jaq_core::ValX<'a, Self>>>(
        self,
        range: jaq_core::val::Range<&Self>,
        opt: Opt,
        f: impl Fn(Self) -> I,
    ) -> jaq_core::ValX<'a, Self> {
        match self {
            Self::List(_) => first_output(f(self.range(range)?)),
            other => match opt {
                Opt::Optional => Ok(other),
                Opt::Essential => Err(JaqError::typ(other, "array").into()),
            },
        }
    }

    fn as_bool(&self) -> bool {
        !matches!(self, Self::Null | Self::Bool(false))
    }

    fn as_str(&self) -> Option<&str> {
        self.text()
    }
}

impl jaq_std::ValT for CellVal {
    fn into_seq<S: FromIterator<Self>>(self) -> Result<S, Self> {
        match self {
            Self::List(items) => Ok(items.into_iter().collect()),
            other => Err(other),
        }
    }

    fn as_isize(&self) -> Option<isize> {
        self.position()
    }

    fn as_f64(&self) -> Result<f64, JaqError<Self>> {
        self.number()
            .ok_or_else(|| JaqError::typ(self.clone(), "number"))
    }
}
