//! Conversion of legacy Access-style saved queries into PostgreSQL DDL.
//!
//! [`convert`] runs a fixed stage pipeline over the query text. The
//! order is load-bearing: literal and operator normalization happens
//! before function rewriting; live references are resolved before quote
//! and bracket conversion so their syntax is still recognizable; schema
//! qualification runs after bracket conversion so it sees final
//! identifiers; parameter renaming and DDL emission come last.
//!
//! The pipeline is pure and infallible: any input text yields a
//! well-formed [`ConversionResult`], with every correctness gap pushed
//! into its `warnings` list.

pub mod ddl_builder;
pub mod function_registry;
pub mod function_translator;
pub mod parameter_resolver;
pub mod reference_resolver;
pub mod scanner;
pub mod schema_qualifier;
pub mod syntax_translator;

use crate::catalog::BindingCatalog;
use crate::model::{ConversionResult, QueryDescriptor, QueryKind};
use crate::utils::sanitize::sanitize;

/// Convert one saved-query descriptor into target DDL.
///
/// `schema` is the target schema every table and user-defined function
/// reference is qualified with. `catalog` supplies control bindings and
/// column types; an empty catalog just means 3-part references take
/// their raw-name fallback and 2-part references resolve to NULL.
pub fn convert(
    descriptor: &QueryDescriptor,
    schema: &str,
    catalog: &BindingCatalog,
) -> ConversionResult {
    let object_name = sanitize(&descriptor.name);
    let kind = QueryKind::from_code(descriptor.type_code);
    let mut warnings: Vec<String> = Vec::new();

    let early = syntax_translator::early_passes(&descriptor.raw_text);
    warnings.extend(early.warnings);

    let functions = function_translator::translate(&early.text, schema);
    warnings.extend(functions.warnings);

    let (resolved, mut state) = reference_resolver::resolve(&functions.text, catalog);
    let joined = reference_resolver::apply_state_joins(&resolved, &mut state);
    warnings.extend(state.warnings.iter().cloned());

    let surviving = parameter_resolver::surviving_params(&descriptor.declared_parameters);
    let late = syntax_translator::late_passes(&joined, early.row_limit.as_deref(), &surviving);

    let qualified = schema_qualifier::qualify(&late, schema);

    let params = parameter_resolver::resolve(
        &qualified,
        &descriptor.declared_parameters,
        &state.tempvar_params,
        catalog,
    );

    let ddl = ddl_builder::build(
        &object_name,
        kind,
        &params.text,
        schema,
        &params.parameters,
        !surviving.is_empty(),
        functions.uses_first || functions.uses_last,
    );
    warnings.extend(ddl.warnings);

    for w in &warnings {
        log::warn!("{}: {}", descriptor.name, w);
    }

    ConversionResult {
        object_name,
        object_type: ddl.object_type,
        statements: ddl.statements,
        warnings,
        referenced_state_entries: state.entries,
        extracted_helpers: Vec::new(),
    }
}
