//! CQL type descriptors and the textual type grammar.
//!
//! Accepted forms are lowercase scalar names (`int`, `text`, `decimal(10,2)`,
//! ...) and the parameterised forms `list<T>`, `set<T>`, `map<K,V>`,
//! `frozen<T>`, `tuple<T1,...,Tn>`, `udt<name1:T1,...>` and `vector<T,N>`.

use std::fmt;

use crate::error::{SchemaError, TypeError};

/// Resolved, structurally recursive CQL type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescriptor {
    Scalar(String),
    List(Box<TypeDescriptor>),
    /// Represented identically to `List` in the columnar model.
    Set(Box<TypeDescriptor>),
    Map(Box<TypeDescriptor>, Box<TypeDescriptor>),
    Udt {
        name: String,
        fields: Vec<(String, TypeDescriptor)>,
    },
    Tuple(Vec<TypeDescriptor>),
    Vector {
        element: Box<TypeDescriptor>,
        dimension: usize,
    },
    /// Never produced by [`resolve`]; unwrapped wherever it is encountered.
    Frozen(Box<TypeDescriptor>),
}

impl TypeDescriptor {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::Scalar(name.into())
    }

    pub fn list(element: TypeDescriptor) -> Self {
        Self::List(Box::new(element))
    }

    pub fn set(element: TypeDescriptor) -> Self {
        Self::Set(Box::new(element))
    }

    pub fn map(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    /// Remove every `Frozen` wrapper, recursively.
    pub fn strip_frozen(self) -> Self {
        match self {
            Self::Frozen(inner) => inner.strip_frozen(),
            Self::List(e) => Self::List(Box::new(e.strip_frozen())),
            Self::Set(e) => Self::Set(Box::new(e.strip_frozen())),
            Self::Map(k, v) => Self::Map(Box::new(k.strip_frozen()), Box::new(v.strip_frozen())),
            Self::Udt { name, fields } => Self::Udt {
                name,
                fields: fields
                    .into_iter()
                    .map(|(n, t)| (n, t.strip_frozen()))
                    .collect(),
            },
            Self::Tuple(elems) => Self::Tuple(elems.into_iter().map(Self::strip_frozen).collect()),
            Self::Vector { element, dimension } => Self::Vector {
                element: Box::new(element.strip_frozen()),
                dimension,
            },
            scalar @ Self::Scalar(_) => scalar,
        }
    }

    pub fn is_scalar(&self) -> bool {
        match self {
            Self::Scalar(_) => true,
            Self::Frozen(inner) => inner.is_scalar(),
            _ => false,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(name) => f.write_str(name),
            Self::List(e) => write!(f, "list<{}>", e),
            Self::Set(e) => write!(f, "set<{}>", e),
            Self::Map(k, v) => write!(f, "map<{},{}>", k, v),
            Self::Frozen(inner) => write!(f, "frozen<{}>", inner),
            Self::Vector { element, dimension } => write!(f, "vector<{},{}>", element, dimension),
            Self::Tuple(elems) => {
                f.write_str("tuple<")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", e)?;
                }
                f.write_str(">")
            }
            Self::Udt { fields, .. } => {
                f.write_str("udt<")?;
                for (i, (name, t)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}:{}", name, t)?;
                }
                f.write_str(">")
            }
        }
    }
}

/// Parse a textual type descriptor.
///
/// Unknown scalar names are kept as-is and later mapped to a string column;
/// only structurally malformed input (unbalanced brackets, wrong parameter
/// count) is rejected.
pub fn resolve(text: &str) -> Result<TypeDescriptor, TypeError> {
    parse(&text.trim().to_lowercase())
}

fn parse(text: &str) -> Result<TypeDescriptor, TypeError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(TypeError::Empty);
    }

    let Some(open) = text.find('<') else {
        // Parameterised scalars such as decimal(10,2) keep only their name
        let name = match text.find('(') {
            Some(idx) if idx > 0 => text[..idx].trim(),
            _ => text,
        };
        return Ok(TypeDescriptor::Scalar(name.to_string()));
    };

    if !text.ends_with('>') {
        return Err(TypeError::Unbalanced(text.to_string()));
    }

    let head = text[..open].trim();
    let params = split_type_params(&text[open + 1..text.len() - 1])
        .ok_or_else(|| TypeError::Unbalanced(text.to_string()))?;

    let arity = |kind: &'static str, expected: &'static str| TypeError::Arity {
        kind,
        expected,
        found: params.len(),
        text: text.to_string(),
    };

    match head {
        "frozen" => match params.as_slice() {
            [inner] => parse(inner),
            _ => Err(arity("frozen", "1")),
        },
        "list" => match params.as_slice() {
            [elem] => Ok(TypeDescriptor::list(parse(elem)?)),
            _ => Err(arity("list", "1")),
        },
        "set" => match params.as_slice() {
            [elem] => Ok(TypeDescriptor::set(parse(elem)?)),
            _ => Err(arity("set", "1")),
        },
        "map" => match params.as_slice() {
            [key, value] => Ok(TypeDescriptor::map(parse(key)?, parse(value)?)),
            _ => Err(arity("map", "2")),
        },
        "tuple" => {
            if params.iter().all(|p| p.trim().is_empty()) {
                return Err(arity("tuple", "at least 1"));
            }
            let elems = params
                .iter()
                .map(|p| parse(p))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(TypeDescriptor::Tuple(elems))
        }
        "udt" => {
            let mut fields = Vec::with_capacity(params.len());
            for def in &params {
                // Field definitions without a ':' separator are skipped
                let Some((name, ty)) = def.split_once(':') else {
                    continue;
                };
                fields.push((name.trim().to_string(), parse(ty)?));
            }
            Ok(TypeDescriptor::Udt {
                name: "udt".to_string(),
                fields,
            })
        }
        "vector" => match params.as_slice() {
            [elem, dim] => {
                let dimension = dim
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| TypeError::InvalidDimension(dim.trim().to_string()))?;
                Ok(TypeDescriptor::Vector {
                    element: Box::new(parse(elem)?),
                    dimension,
                })
            }
            _ => Err(arity("vector", "2")),
        },
        // Unknown parameterised names degrade to a string-backed scalar
        _ => Ok(TypeDescriptor::Scalar(text.to_string())),
    }
}

/// Split a type parameter list on top-level commas.
///
/// `map<text,int>,list<text>` splits into two items. Returns `None` when the
/// angle or round brackets do not balance.
pub(crate) fn split_type_params(params: &str) -> Option<Vec<&str>> {
    let mut result = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;

    for (idx, ch) in params.char_indices() {
        match ch {
            '<' | '(' => depth += 1,
            '>' | ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            ',' if depth == 0 => {
                result.push(params[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return None;
    }
    result.push(params[start..].trim());
    Some(result)
}

/// One named, nullable column of a [`ColumnSchema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub descriptor: TypeDescriptor,
}

/// Ordered list of columns as handed over by the row source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnSchema {
    columns: Vec<Column>,
}

impl ColumnSchema {
    /// Pair column names with resolved descriptors.
    pub fn try_new(
        names: Vec<String>,
        descriptors: Vec<TypeDescriptor>,
    ) -> Result<Self, SchemaError> {
        if names.len() != descriptors.len() {
            return Err(SchemaError::LengthMismatch {
                names: names.len(),
                types: descriptors.len(),
            });
        }

        let columns = names
            .into_iter()
            .zip(descriptors)
            .map(|(name, descriptor)| Column {
                name,
                descriptor: descriptor.strip_frozen(),
            })
            .collect();
        Ok(Self { columns })
    }

    /// Build a schema from textual type descriptors.
    ///
    /// A descriptor that fails to parse falls back to `text` so the column
    /// is still exported.
    pub fn from_text<S: AsRef<str>>(names: &[S], types: &[S]) -> Result<Self, SchemaError> {
        if names.len() != types.len() {
            return Err(SchemaError::LengthMismatch {
                names: names.len(),
                types: types.len(),
            });
        }

        let descriptors = types
            .iter()
            .map(|t| {
                resolve(t.as_ref()).unwrap_or_else(|err| {
                    tracing::warn!(
                        type_text = t.as_ref(),
                        error = %err,
                        "Malformed type descriptor, exporting column as text"
                    );
                    TypeDescriptor::scalar("text")
                })
            })
            .collect();
        Self::try_new(names.iter().map(|n| n.as_ref().to_string()).collect(), descriptors)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}
