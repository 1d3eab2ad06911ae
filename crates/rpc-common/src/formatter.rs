// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Field-name conversion between the client convention (such as `camelCase`) and the internal
//! `snake_case` convention used by the schema.
//!
//! Conversions are total: only ASCII identifier runs (`[A-Za-z0-9_]`) are re-cased, everything
//! else (`?`, `-`, non-ASCII letters, ...) passes through untouched. Leading and trailing
//! underscores of a run are preserved as well.
//!
//! Digits form their own words, so `address_line_1` becomes `addressLine1` and converts back to
//! `address_line_1`. The built-in formatters round-trip losslessly for internal names made of
//! lowercase words separated by single underscores (with digit runs as separate words). Custom
//! formatters make no such promise.

use std::{fmt::Debug, str::FromStr, sync::Arc};

use heck::{ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};
use serde_json::{Map, Value};
use thiserror::Error;

pub type CustomTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// A single naming convention.
///
/// `format` renders an internal name in this convention; `parse` reads a name written in this
/// convention back into internal form.
#[derive(Clone)]
pub enum FieldFormatter {
    Unchanged,
    SnakeCase,
    CamelCase,
    PascalCase,
    /// A user-supplied transform, applied as-is in whichever direction the formatter is used.
    Custom {
        name: String,
        transform: CustomTransform,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown field formatter '{0}'. Expected one of camel_case, snake_case, pascal_case, unchanged")]
pub struct UnknownFormatterError(pub String);

impl FieldFormatter {
    pub fn custom(
        name: impl Into<String>,
        transform: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        FieldFormatter::Custom {
            name: name.into(),
            transform: Arc::new(transform),
        }
    }

    /// A custom formatter whose function takes extra arguments bound at configuration time.
    pub fn custom_with_args(
        name: impl Into<String>,
        transform: impl Fn(&str, &[String]) -> String + Send + Sync + 'static,
        args: Vec<String>,
    ) -> Self {
        Self::custom(name, move |field| transform(field, &args))
    }

    pub fn name(&self) -> &str {
        match self {
            FieldFormatter::Unchanged => "unchanged",
            FieldFormatter::SnakeCase => "snake_case",
            FieldFormatter::CamelCase => "camel_case",
            FieldFormatter::PascalCase => "pascal_case",
            FieldFormatter::Custom { name, .. } => name,
        }
    }

    pub fn format(&self, internal_name: &str) -> String {
        match self {
            FieldFormatter::Unchanged => internal_name.to_string(),
            FieldFormatter::SnakeCase => convert_identifiers(internal_name, Case::Snake),
            FieldFormatter::CamelCase => convert_identifiers(internal_name, Case::LowerCamel),
            FieldFormatter::PascalCase => convert_identifiers(internal_name, Case::UpperCamel),
            FieldFormatter::Custom { transform, .. } => transform(internal_name),
        }
    }

    pub fn parse(&self, external_name: &str) -> String {
        match self {
            FieldFormatter::Unchanged => external_name.to_string(),
            FieldFormatter::SnakeCase | FieldFormatter::CamelCase | FieldFormatter::PascalCase => {
                convert_identifiers(external_name, Case::Snake)
            }
            FieldFormatter::Custom { transform, .. } => transform(external_name),
        }
    }
}

impl Debug for FieldFormatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldFormatter::Custom { name, .. } => write!(f, "Custom({name})"),
            _ => write!(f, "{}", self.name()),
        }
    }
}

impl FromStr for FieldFormatter {
    type Err = UnknownFormatterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "unchanged" | "none" => Ok(FieldFormatter::Unchanged),
            "snake_case" | "snakecase" | "snake" => Ok(FieldFormatter::SnakeCase),
            "camel_case" | "camelcase" | "camel" => Ok(FieldFormatter::CamelCase),
            "pascal_case" | "pascalcase" | "pascal" => Ok(FieldFormatter::PascalCase),
            _ => Err(UnknownFormatterError(s.to_string())),
        }
    }
}

/// The pair of conventions in effect: `input` describes how clients write names in requests,
/// `output` how names are rendered in responses.
#[derive(Clone, Debug)]
pub struct NameFormatter {
    input: FieldFormatter,
    output: FieldFormatter,
}

impl NameFormatter {
    pub fn new(input: FieldFormatter, output: FieldFormatter) -> Self {
        Self { input, output }
    }

    pub fn symmetric(formatter: FieldFormatter) -> Self {
        Self::new(formatter.clone(), formatter)
    }

    pub fn input(&self) -> &FieldFormatter {
        &self.input
    }

    pub fn output(&self) -> &FieldFormatter {
        &self.output
    }

    pub fn to_internal(&self, name: &str) -> String {
        self.input.parse(name)
    }

    pub fn to_external(&self, name: &str) -> String {
        self.output.format(name)
    }

    /// Convert every key of (possibly nested) maps to internal form. Values are untouched.
    pub fn format_keys_internal(&self, value: &Value) -> Value {
        map_keys(value, &|key| self.to_internal(key))
    }

    /// Convert every key of (possibly nested) maps to client form. Values are untouched.
    pub fn format_keys_external(&self, value: &Value) -> Value {
        map_keys(value, &|key| self.to_external(key))
    }
}

impl Default for NameFormatter {
    fn default() -> Self {
        Self::symmetric(FieldFormatter::CamelCase)
    }
}

fn map_keys(value: &Value, convert: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (convert(k), map_keys(v, convert)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(elems) => Value::Array(elems.iter().map(|v| map_keys(v, convert)).collect()),
        _ => value.clone(),
    }
}

#[derive(Clone, Copy)]
enum Case {
    Snake,
    LowerCamel,
    UpperCamel,
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn convert_identifiers(name: &str, case: Case) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    let mut run = String::new();

    for c in name.chars() {
        if is_identifier_char(c) {
            run.push(c);
        } else {
            if !run.is_empty() {
                result.push_str(&convert_run(&run, case));
                run.clear();
            }
            result.push(c);
        }
    }
    if !run.is_empty() {
        result.push_str(&convert_run(&run, case));
    }

    result
}

fn convert_run(run: &str, case: Case) -> String {
    let core = run.trim_matches('_');
    if core.is_empty() {
        return run.to_string();
    }
    let leading = &run[..run.len() - run.trim_start_matches('_').len()];
    let trailing = &run[run.trim_end_matches('_').len()..];

    let separated = separate_digits(core);
    let converted = match case {
        Case::Snake => separated.to_snake_case(),
        Case::LowerCamel => separated.to_lower_camel_case(),
        Case::UpperCamel => separated.to_upper_camel_case(),
    };

    format!("{leading}{converted}{trailing}")
}

/// Insert word breaks between letters and digits (`line1` -> `line_1`) so that digit runs are
/// words of their own.
fn separate_digits(core: &str) -> String {
    let mut separated = String::with_capacity(core.len() + 4);
    let mut previous: Option<char> = None;

    for c in core.chars() {
        if let Some(p) = previous
            && ((p.is_ascii_alphabetic() && c.is_ascii_digit())
                || (p.is_ascii_digit() && c.is_ascii_alphabetic()))
        {
            separated.push('_');
        }
        separated.push(c);
        previous = Some(c);
    }

    separated
}
