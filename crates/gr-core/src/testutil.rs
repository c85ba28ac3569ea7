//! Shared fixtures for unit tests.

use std::sync::Arc;

use crate::schema::{MemorySchemaRegistry, SchemaDefinition, SchemaRegistry};

/// CTD-like schema: stored counts, two derived columns (one nested), lookup
/// coefficients with and without a document key, and a restricted view.
pub const CTD_SCHEMA: &str = r#"
id = "ctd"
temporal = "time"

[[functions]]
id = "ctd_temp"
expression = "(T / 10000) - 10"

[[functions]]
id = "ctd_pres"
expression = "(P * p_range / (0.85 * 65536)) - (0.05 * p_range)"

[[functions]]
id = "offset"
expression = "x + a"

[[functions]]
id = "scale"
owner = "builtin"
name = "polyval"

[[parameters]]
name = "time"
kind = "quantity"
encoding = "float64"
fill_value = -9999.0

[[parameters]]
name = "temp_counts"
kind = "quantity"
encoding = "int64"
fill_value = -1

[[parameters]]
name = "pres_counts"
kind = "quantity"
encoding = "int64"
fill_value = -1

[[parameters]]
name = "temp"
kind = "function"
encoding = "float64"
fill_value = -999.0
function = "ctd_temp"
arguments = { T = "temp_counts" }

[[parameters]]
name = "temp_offset"
kind = "function"
encoding = "float64"
fill_value = -999.0
function = "offset"
arguments = { x = "temp", a = "offset_a" }

[[parameters]]
name = "temp_scaled"
kind = "function"
encoding = "float64"
fill_value = -999.0
function = "scale"
arguments = { x = "temp", c0 = 1.0, c1 = 2.0 }

[[parameters]]
name = "pressure"
kind = "function"
encoding = "float32"
fill_value = -999.0
function = "ctd_pres"
arguments = { P = "pres_counts", p_range = "p_range" }

[[parameters]]
name = "p_range"
kind = "lookup"
encoding = "float64"
document_key = "CTD_CAL"

[[parameters]]
name = "offset_a"
kind = "lookup"
encoding = "float64"

[[views]]
id = "ctd_basic"
fields = ["time", "temp"]
"#;

pub fn ctd_registry() -> MemorySchemaRegistry {
    let mut reg = MemorySchemaRegistry::new();
    reg.load_str(CTD_SCHEMA).expect("fixture schema loads");
    reg
}

pub fn ctd_schema() -> Arc<SchemaDefinition> {
    ctd_registry().resolve("ctd").expect("fixture schema registered")
}

pub fn ctd_view() -> Arc<SchemaDefinition> {
    ctd_registry()
        .resolve("ctd_basic")
        .expect("fixture view registered")
}
