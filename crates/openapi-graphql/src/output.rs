//! Assembles the final schema out of everything the other stages built.

use async_graphql::dynamic::{Scalar, Schema, TypeRef};
use indexmap::IndexMap;

use crate::{
    context::BuildContext,
    naming::{apply_case, uncapitalize},
    parsing::SpecDocument,
    preprocess::preprocess,
    report::{Report, Warning, WarningKind},
    resolvers::Runtime,
    types::{FieldResolver, FieldSpec, InputObjectShapes, ObjectSpec, OperationFieldSource, JSON_SCALAR},
    viewer::AuthenticatedFields,
    Error, Options,
};

const QUERY: &str = "Query";
const MUTATION: &str = "Mutation";

/// A translated document, ready to execute requests against.
pub struct TranslatedSchema {
    pub schema: Schema,
    pub report: Report,
}

impl std::fmt::Debug for TranslatedSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatedSchema")
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RootFields {
    fields: IndexMap<String, FieldSpec>,
    authenticated: AuthenticatedFields,
}

impl RootFields {
    fn is_taken(&self, name: &str) -> bool {
        self.fields.contains_key(name) || self.authenticated.values().any(|fields| fields.contains_key(name))
    }
}

pub(crate) fn build_schema(document: &SpecDocument, options: &Options) -> Result<TranslatedSchema, Error> {
    let mut ctx = BuildContext::new(document, options);
    let model = preprocess(&mut ctx)?;

    // Operations with links go first so the types they share are built along with their link fields.
    let mut operations = model.operations.values().cloned().collect::<Vec<_>>();
    operations.sort_by_key(|operation| !operation.has_nested_fields());

    let mut queries = RootFields::default();
    let mut mutations = RootFields::default();

    for operation in &operations {
        let is_query = operation.method.is_query();
        let root = if is_query { &mut queries } else { &mut mutations };

        let operation_name = apply_case(&operation.operation_id, ctx.field_style());
        let candidates = if is_query {
            let response_type = &ctx.definitions.get(operation.response.definition).output_name;
            vec![uncapitalize(response_type), operation_name]
        } else {
            vec![operation_name]
        };

        let Some(field_name) = candidates.iter().find(|candidate| !root.is_taken(candidate)).cloned() else {
            ctx.warn(
                Warning::new(
                    WarningKind::DuplicateFieldName,
                    format!(
                        "{} {} would create the field {}, which already exists",
                        operation.method, operation.path, candidates[0]
                    ),
                )
                .with_mitigation("the operation is skipped"),
            )?;
            continue;
        };

        tracing::trace!("Creating the field {field_name} for {}", operation.operation_id);

        let field = ctx.operation_field(&model, operation, &field_name, OperationFieldSource::Root)?;

        if options.viewer && !operation.security_requirements.is_empty() {
            for requirement in &operation.security_requirements {
                root.authenticated
                    .entry(requirement.clone())
                    .or_default()
                    .insert(field_name.clone(), field.clone());
            }
        } else {
            root.fields.insert(field_name, field);
        }

        if is_query {
            ctx.report.num_queries_created += 1;
        } else {
            ctx.report.num_mutations_created += 1;
        }
    }

    let mut query_fields = queries.fields;
    let mut mutation_fields = mutations.fields;

    if options.viewer {
        for viewer in ctx.build_viewers(&model, &queries.authenticated, false)? {
            add_viewer(&mut ctx, &mut query_fields, viewer)?;
        }
        for viewer in ctx.build_viewers(&model, &mutations.authenticated, true)? {
            add_viewer(&mut ctx, &mut mutation_fields, viewer)?;
        }
    }

    if query_fields.is_empty() {
        query_fields.insert(
            "placeholder".to_string(),
            FieldSpec {
                name: "placeholder".to_string(),
                type_ref: TypeRef::named(TypeRef::BOOLEAN),
                args: Vec::new(),
                description: Some("The document has no operations that could be turned into queries".to_string()),
                resolver: FieldResolver::Placeholder,
            },
        );
    }

    let has_mutations = !mutation_fields.is_empty();
    let field_style = ctx.field_style();

    let BuildContext { types, report, .. } = ctx;

    let input_objects = types
        .input_objects
        .iter()
        .map(|(name, input_object)| (name.clone(), input_object.runtime_shape()))
        .collect::<InputObjectShapes>();

    let mut builder = Schema::build(QUERY, has_mutations.then_some(MUTATION), None)
        .register(root_object(QUERY, query_fields).into_object())
        .register(Scalar::new(JSON_SCALAR).description("Arbitrary JSON"));

    if has_mutations {
        builder = builder.register(root_object(MUTATION, mutation_fields).into_object());
    }
    for object in types.objects.into_values() {
        builder = builder.register(object.into_object());
    }
    for input_object in types.input_objects.into_values() {
        builder = builder.register(input_object.into_input_object());
    }
    for enum_type in types.enums.into_values() {
        builder = builder.register(enum_type.into_enum());
    }

    let schema = builder
        .data(Runtime {
            options: options.clone(),
            title: document.title().to_string(),
            security: model.security.clone(),
            input_objects,
            fetcher: options.fetcher.clone().unwrap_or_default(),
            field_style,
        })
        .finish()
        .map_err(|error| Error::Schema(error.to_string()))?;

    tracing::debug!(
        "Translated {} of {} operations with {} warnings",
        report.num_queries_created + report.num_mutations_created,
        report.num_ops,
        report.warnings.len()
    );

    Ok(TranslatedSchema { schema, report })
}

fn add_viewer(
    ctx: &mut BuildContext<'_>,
    fields: &mut IndexMap<String, FieldSpec>,
    viewer: FieldSpec,
) -> Result<(), Error> {
    if fields.contains_key(&viewer.name) {
        return ctx.warn(
            Warning::new(
                WarningKind::DuplicateFieldName,
                format!("the viewer {} clashes with an operation field", viewer.name),
            )
            .with_mitigation("the viewer is skipped"),
        );
    }

    fields.insert(viewer.name.clone(), viewer);
    Ok(())
}

fn root_object(name: &str, fields: IndexMap<String, FieldSpec>) -> ObjectSpec {
    ObjectSpec {
        name: name.to_string(),
        description: None,
        fields,
        has_nested_fields: true,
    }
}
