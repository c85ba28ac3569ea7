//! TOML schema documents.
//!
//! ```toml
//! id = "ctd_parsed"
//! temporal = "time"
//!
//! [[functions]]
//! id = "ctd_temp"
//! expression = "(T / 10000) - 10"
//!
//! [[parameters]]
//! name = "temp"
//! kind = "function"
//! encoding = "float32"
//! fill_value = -999.0
//! function = "ctd_temp"
//! arguments = { T = "temp_counts" }
//!
//! [[views]]
//! id = "ctd_basic"
//! fields = ["time", "temp"]
//! ```
//!
//! In `arguments`, a string names a column and anything else is a literal.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use orion_error::StructError;
use serde::Deserialize;

use super::{
    ArgumentSource, Derivation, LookupBinding, ParameterKind, ParameterSpec, SchemaDefinition,
};
use crate::error::{CoreReason, CoreResult};
use crate::function::ParameterFunction;
use crate::value::{Value, ValueEncoding};

// ---------------------------------------------------------------------------
// Raw TOML structure
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaDocRaw {
    id: String,
    temporal: String,
    #[serde(default)]
    functions: Vec<FunctionRaw>,
    parameters: Vec<ParameterRaw>,
    #[serde(default)]
    views: Vec<ViewRaw>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FunctionRaw {
    id: String,
    #[serde(default)]
    expression: Option<String>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParameterRaw {
    name: String,
    kind: ParameterKind,
    encoding: ValueEncoding,
    #[serde(default)]
    fill_value: Option<Value>,
    #[serde(default)]
    units: Option<String>,
    #[serde(default)]
    function: Option<String>,
    #[serde(default)]
    arguments: BTreeMap<String, ArgumentRaw>,
    #[serde(default)]
    document_key: Option<String>,
    #[serde(default)]
    lookup_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ArgumentRaw {
    Column(String),
    Literal(Value),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ViewRaw {
    id: String,
    fields: Vec<String>,
}

// ---------------------------------------------------------------------------
// SchemaDocument
// ---------------------------------------------------------------------------

/// A parsed schema document: one full schema plus its views.
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    pub schema: SchemaDefinition,
    pub views: Vec<SchemaDefinition>,
}

pub fn parse_schema_document(toml_str: &str) -> CoreResult<SchemaDocument> {
    let raw: SchemaDocRaw = toml::from_str(toml_str).map_err(|e| {
        StructError::from(CoreReason::Configuration)
            .with_detail(format!("invalid schema document: {e}"))
    })?;

    let mut functions = HashMap::with_capacity(raw.functions.len());
    for f in raw.functions {
        let func = build_function(&raw.id, f)?;
        let id = func.id().to_string();
        if functions.insert(id.clone(), Arc::new(func)).is_some() {
            return doc_err(format!("schema {:?}: duplicate function {id:?}", raw.id));
        }
    }

    let mut params = Vec::with_capacity(raw.parameters.len());
    for p in raw.parameters {
        params.push(build_parameter(&raw.id, p, &functions)?);
    }

    let schema = SchemaDefinition::new(raw.id, raw.temporal, params)?;
    let mut views = Vec::with_capacity(raw.views.len());
    for v in raw.views {
        views.push(schema.restrict(v.id, &v.fields)?);
    }
    Ok(SchemaDocument { schema, views })
}

fn build_function(schema_id: &str, raw: FunctionRaw) -> CoreResult<ParameterFunction> {
    match (raw.expression, raw.owner, raw.name) {
        (Some(src), None, None) => {
            let expr = gr_expr::parse_expr(&src).map_err(|e| {
                StructError::from(CoreReason::Configuration)
                    .with_detail(format!("schema {schema_id:?}: function {:?}: {e}", raw.id))
            })?;
            Ok(ParameterFunction::NumericExpression { id: raw.id, expr })
        }
        (None, Some(owner), Some(name)) => Ok(ParameterFunction::NamedCallable {
            id: raw.id,
            owner,
            name,
        }),
        _ => doc_err(format!(
            "schema {schema_id:?}: function {:?} needs either `expression` or `owner` + `name`",
            raw.id
        )),
    }
}

fn build_parameter(
    schema_id: &str,
    raw: ParameterRaw,
    functions: &HashMap<String, Arc<ParameterFunction>>,
) -> CoreResult<ParameterSpec> {
    let fill_value = match &raw.fill_value {
        Some(v) => raw.encoding.coerce(v).map_err(|e| {
            StructError::from(CoreReason::Configuration).with_detail(format!(
                "schema {schema_id:?}: fill_value of {:?}: {e}",
                raw.name
            ))
        })?,
        None => default_fill(raw.encoding),
    };

    let derivation = match (raw.kind, raw.function) {
        (ParameterKind::Function, Some(fid)) => {
            let function = functions.get(&fid).cloned().ok_or_else(|| {
                StructError::from(CoreReason::Configuration).with_detail(format!(
                    "schema {schema_id:?}: parameter {:?} uses undefined function {fid:?}",
                    raw.name
                ))
            })?;
            let arguments = raw
                .arguments
                .into_iter()
                .map(|(k, v)| {
                    let src = match v {
                        ArgumentRaw::Column(c) => ArgumentSource::Column(c),
                        ArgumentRaw::Literal(l) => ArgumentSource::Literal(l),
                    };
                    (k, src)
                })
                .collect();
            Some(Derivation {
                function,
                arguments,
            })
        }
        (ParameterKind::Function, None) => {
            return doc_err(format!(
                "schema {schema_id:?}: function parameter {:?} names no function",
                raw.name
            ));
        }
        (_, Some(_)) => {
            return doc_err(format!(
                "schema {schema_id:?}: parameter {:?} is not a function but names one",
                raw.name
            ));
        }
        (_, None) => None,
    };

    if let Some(Derivation {
        function,
        arguments,
    }) = &derivation
        && let ParameterFunction::NumericExpression { expr, .. } = function.as_ref()
    {
        for var in expr.variables() {
            if !arguments.contains_key(var) {
                return doc_err(format!(
                    "schema {schema_id:?}: parameter {:?} does not bind expression variable {var:?}",
                    raw.name
                ));
            }
        }
    }

    let lookup = (raw.kind == ParameterKind::Lookup).then(|| LookupBinding {
        document_key: raw.document_key.filter(|k| !k.is_empty()),
        name: raw.lookup_name.unwrap_or_else(|| raw.name.clone()),
    });

    Ok(ParameterSpec {
        name: raw.name,
        kind: raw.kind,
        encoding: raw.encoding,
        fill_value,
        units: raw.units,
        derivation,
        lookup,
    })
}

fn default_fill(encoding: ValueEncoding) -> Value {
    match encoding {
        ValueEncoding::Float32 | ValueEncoding::Float64 => Value::Float(-9999.0),
        ValueEncoding::Int32 | ValueEncoding::Int64 => Value::Int(-9999),
        ValueEncoding::Bool => Value::Bool(false),
        ValueEncoding::Utf8 => Value::Str(String::new()),
    }
}

fn doc_err<T>(detail: String) -> CoreResult<T> {
    StructError::from(CoreReason::Configuration)
        .with_detail(detail)
        .err()
}
