use std::sync::Arc;

use async_graphql::dynamic::TypeRef;
use indexmap::IndexMap;
use serde_json::Value;

use super::{ArgSpec, FieldResolver, FieldSpec, Position, ScalarKind, Shape};
use crate::{
    context::BuildContext,
    model::{CanonicalModel, HttpMethod, Operation},
    naming::{apply_case, capitalize, uncapitalize},
    parsing::{unescape_pointer_segment, LinkDefinition, ParameterLocation},
    report::{Warning, WarningKind},
    resolvers::{OperationResolver, LIMIT_ARGUMENT},
    Error,
};

/// Where an operation field is placed, which decides what it gets for free.
pub(crate) enum OperationFieldSource {
    /// A field of the root types or of a viewer.
    Root,
    /// A field created from a link, the link supplies some arguments.
    Link {
        args: IndexMap<String, Value>,
        request_body: Option<Value>,
    },
    /// A field nested beneath an operation whose path is a prefix of this one.
    SubOperation { parent_args: Vec<String> },
}

impl BuildContext<'_> {
    /// Builds the field that invokes `operation`.
    pub fn operation_field(
        &mut self,
        model: &CanonicalModel,
        operation: &Arc<Operation>,
        field_name: &str,
        source: OperationFieldSource,
    ) -> Result<FieldSpec, Error> {
        let shape = self.definition_shape(operation.response.definition, Position::Output, 0)?;

        if let Some(type_name) = shape.object_name() {
            self.add_nested_fields(model, operation, type_name)?;
        }

        let (args_from_link, link_request_body, args_from_parent) = match source {
            OperationFieldSource::Root => (IndexMap::new(), None, Vec::new()),
            OperationFieldSource::Link { args, request_body } => (args, request_body, Vec::new()),
            OperationFieldSource::SubOperation { parent_args } => (IndexMap::new(), None, parent_args),
        };

        let mut args = Vec::new();
        let mut arg_shapes = IndexMap::new();

        for parameter in &operation.parameters {
            if args_from_link.contains_key(&parameter.arg_name) || args_from_parent.contains(&parameter.arg_name) {
                continue;
            }

            let shape = match &parameter.schema {
                Some(schema) => {
                    let fallbacks = [
                        parameter.name.clone(),
                        format!("{}{}", capitalize(&operation.operation_id), capitalize(&parameter.arg_name)),
                    ];
                    self.shape_for(schema, &fallbacks, Position::Input, 0)?
                }
                None => Shape::Scalar(ScalarKind::String),
            };

            args.push(ArgSpec {
                name: parameter.arg_name.clone(),
                type_ref: shape.required_type_ref(parameter.required && parameter.default_value().is_none()),
                description: parameter.description.clone(),
            });
            arg_shapes.insert(parameter.arg_name.clone(), shape);
        }

        let mut payload_name = None;
        if let (Some(request), None) = (&operation.request, &link_request_body) {
            let shape = self.definition_shape(request.definition, Position::Input, 0)?;
            let name = if self.options.generic_payload_arg_name {
                "requestBody".to_string()
            } else {
                let input_name = &self.definitions.get(request.definition).input_name;
                apply_case(input_name, self.field_style())
            };

            args.push(ArgSpec {
                name: name.clone(),
                type_ref: shape.required_type_ref(request.required),
                description: self.definitions.get(request.definition).description().map(str::to_string),
            });
            arg_shapes.insert(name.clone(), shape);
            payload_name = Some(name);
        }

        let has_limit_argument = self.options.add_limit_argument
            && shape.is_list()
            && !arg_shapes.contains_key(LIMIT_ARGUMENT);

        if has_limit_argument {
            args.push(ArgSpec {
                name: LIMIT_ARGUMENT.to_string(),
                type_ref: TypeRef::named(TypeRef::INT),
                description: Some("Returns at most this many items.".to_string()),
            });
        }

        Ok(FieldSpec {
            name: field_name.to_string(),
            type_ref: shape.type_ref(),
            args,
            description: operation.description.clone(),
            resolver: FieldResolver::Operation(Arc::new(OperationResolver {
                operation: Arc::clone(operation),
                args_from_link,
                link_request_body,
                args_from_parent,
                payload_name,
                arg_shapes,
                has_limit_argument,
                shape,
            })),
        })
    }

    /// Adds the link & sub operation fields of `operation` to its response type,
    /// unless an earlier operation already did.
    fn add_nested_fields(
        &mut self,
        model: &CanonicalModel,
        operation: &Operation,
        type_name: &str,
    ) -> Result<(), Error> {
        let Some(object) = self.types.objects.get_mut(type_name) else {
            return Ok(());
        };
        if object.has_nested_fields || !operation.has_nested_fields() {
            return Ok(());
        }
        object.has_nested_fields = true;

        for (link_name, link) in &operation.links {
            let Some(target) = self.link_target(model, operation, link_name, link) else {
                continue;
            };

            let field_name = self.field_name(link_name)?;
            if self.has_field(type_name, &field_name) {
                self.link_name_collision(type_name, &field_name)?;
                continue;
            }

            let mut args = IndexMap::new();
            for (parameter, value) in &link.parameters {
                match link_argument(&target, parameter) {
                    Some(arg_name) => {
                        args.insert(arg_name, value.clone());
                    }
                    None => self.warn_lenient(
                        Warning::new(
                            WarningKind::UnresolvableLink,
                            format!(
                                "the link {link_name} of {} sets {parameter}, which is not a parameter of {}",
                                operation.operation_id, target.operation_id
                            ),
                        )
                        .with_mitigation("the parameter is ignored"),
                    ),
                }
            }

            let source = OperationFieldSource::Link {
                args,
                request_body: link.request_body.clone(),
            };
            let mut field = self.operation_field(model, &target, &field_name, source)?;
            if let Some(description) = &link.description {
                field.description = Some(description.clone());
            }

            self.insert_field(type_name, field);
        }

        for sub_operation_id in &operation.sub_operations {
            let Some(sub_operation) = model.operations.get(sub_operation_id) else {
                continue;
            };

            let response_type = &self.definitions.get(sub_operation.response.definition).output_name;
            let field_name = uncapitalize(response_type);
            if self.has_field(type_name, &field_name) {
                self.link_name_collision(type_name, &field_name)?;
                continue;
            }

            let parent_args = sub_operation
                .path_parameters()
                .filter(|parameter| {
                    operation
                        .path_parameters()
                        .any(|parent| parent.arg_name == parameter.arg_name)
                })
                .map(|parameter| parameter.arg_name.clone())
                .collect();

            let field = self.operation_field(
                model,
                sub_operation,
                &field_name,
                OperationFieldSource::SubOperation { parent_args },
            )?;

            self.insert_field(type_name, field);
        }

        Ok(())
    }

    fn has_field(&self, type_name: &str, field_name: &str) -> bool {
        self.types
            .objects
            .get(type_name)
            .is_some_and(|object| object.fields.contains_key(field_name))
    }

    fn insert_field(&mut self, type_name: &str, field: FieldSpec) {
        if let Some(object) = self.types.objects.get_mut(type_name) {
            object.fields.insert(field.name.clone(), field);
        }
    }

    fn link_name_collision(&mut self, type_name: &str, field_name: &str) -> Result<(), Error> {
        self.warn(
            Warning::new(
                WarningKind::LinkNameCollision,
                format!("the type {type_name} already has a field named {field_name}"),
            )
            .with_mitigation("the link is not added"),
        )
    }

    /// Finds the operation a link points to, through its `operationId` or its `operationRef`.
    fn link_target(
        &mut self,
        model: &CanonicalModel,
        operation: &Operation,
        link_name: &str,
        link: &LinkDefinition,
    ) -> Option<Arc<Operation>> {
        let by_id = link
            .operation_id
            .as_deref()
            .and_then(|operation_id| model.operations.get(operation_id));
        let by_ref = link
            .operation_ref
            .as_deref()
            .and_then(parse_operation_ref)
            .and_then(|(path, method)| model.find_operation(&path, method));

        match (by_id, by_ref) {
            (Some(by_id), Some(by_ref)) if !Arc::ptr_eq(by_id, by_ref) => {
                self.warn_lenient(
                    Warning::new(
                        WarningKind::AmbiguousLink,
                        format!(
                            "the link {link_name} of {} points at both {} and {}",
                            operation.operation_id, by_id.operation_id, by_ref.operation_id
                        ),
                    )
                    .with_mitigation(format!("the link points at {}", by_id.operation_id)),
                );
                Some(Arc::clone(by_id))
            }
            (Some(target), _) | (None, Some(target)) => Some(Arc::clone(target)),
            (None, None) => {
                self.warn_lenient(
                    Warning::new(
                        WarningKind::UnresolvableLink,
                        format!(
                            "could not find the operation the link {link_name} of {} points at",
                            operation.operation_id
                        ),
                    )
                    .with_mitigation("the link is not added"),
                );
                None
            }
        }
    }
}

/// Splits an `operationRef` like `#/paths/~1users~1{id}/get` into a path and a method.
fn parse_operation_ref(operation_ref: &str) -> Option<(String, HttpMethod)> {
    let (_, pointer) = operation_ref.split_once('#')?;
    let rest = pointer.strip_prefix("/paths/")?;
    let (path, method) = rest.rsplit_once('/')?;

    Some((unescape_pointer_segment(path), method.to_ascii_lowercase().parse().ok()?))
}

/// Maps the parameter a link sets, optionally qualified with a location
/// (`path.id`), to the argument of the target operation.
fn link_argument(target: &Operation, parameter: &str) -> Option<String> {
    let qualified = parameter
        .split_once('.')
        .and_then(|(location, name)| Some((location.parse::<ParameterLocation>().ok()?, name)));

    let (location, name) = match qualified {
        Some((location, name)) => (Some(location), name),
        None => (None, parameter),
    };

    target
        .parameters
        .iter()
        .find(|candidate| candidate.name == name && location.map_or(true, |location| location == candidate.location))
        .map(|candidate| candidate.arg_name.clone())
}
