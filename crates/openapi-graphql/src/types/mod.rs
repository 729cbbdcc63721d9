//! Turns schemas into GraphQL types.
//!
//! Every named type is built from a data definition exactly once per position
//! (output or input).  The shape of a definition is memoized before its fields
//! are built so self referencing schemas terminate.

use std::sync::Arc;

use async_graphql::dynamic::{Enum, EnumItem, Field, FieldFuture, FieldValue, InputObject, InputValue, Object, TypeRef};
use indexmap::IndexMap;
use serde_json::Value;

use crate::{
    context::BuildContext,
    model::DataDefId,
    naming::{apply_case, capitalize, CaseStyle},
    parsing::Ref,
    report::{Warning, WarningKind},
    resolvers::{OperationResolver, ResolvedValue},
    viewer::ViewerResolver,
    Error,
};

mod fields;
mod kind;
mod shape;

pub(crate) use fields::OperationFieldSource;
pub use kind::{classify, normalize, ScalarKind, SchemaKind};
pub use shape::{EnumShape, InputFieldShape, InputObjectShapes, Shape};

/// Expanding schemas deeper than this is treated as runaway recursion.
pub(crate) const MAX_ITERATIONS: usize = 50;

pub(crate) const JSON_SCALAR: &str = "JSON";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    Output,
    Input,
}

/// The named types we've built so far.  They only become `async_graphql`
/// types once the whole schema is assembled.
#[derive(Default)]
pub(crate) struct TypeRegistry {
    pub objects: IndexMap<String, ObjectSpec>,
    pub input_objects: IndexMap<String, InputObjectSpec>,
    pub enums: IndexMap<String, EnumSpec>,
}

pub(crate) struct ObjectSpec {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldSpec>,
    /// Whether link & sub operation fields were already added.
    pub has_nested_fields: bool,
}

pub(crate) struct InputObjectSpec {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, InputFieldSpec>,
}

pub(crate) struct InputFieldSpec {
    pub raw_name: String,
    pub shape: Shape,
    pub required: bool,
    pub description: Option<String>,
}

pub(crate) struct EnumSpec {
    pub shape: Arc<EnumShape>,
    pub description: Option<String>,
}

#[derive(Clone)]
pub(crate) struct FieldSpec {
    pub name: String,
    pub type_ref: TypeRef,
    pub args: Vec<ArgSpec>,
    pub description: Option<String>,
    pub resolver: FieldResolver,
}

#[derive(Clone)]
pub(crate) struct ArgSpec {
    pub name: String,
    pub type_ref: TypeRef,
    pub description: Option<String>,
}

#[derive(Clone)]
pub(crate) enum FieldResolver {
    /// Reads a key out of the parent payload.
    Property { key: String, shape: Shape },
    Operation(Arc<OperationResolver>),
    Viewer(Arc<ViewerResolver>),
    /// Always resolves to null.
    Placeholder,
}

impl FieldSpec {
    pub fn into_field(self) -> Field {
        let FieldSpec {
            name,
            type_ref,
            args,
            description,
            resolver,
        } = self;

        let mut field = match resolver {
            FieldResolver::Property { key, shape } => Field::new(name, type_ref, move |ctx| {
                let value = ctx.parent_value.try_downcast_ref::<ResolvedValue>().map(|parent| {
                    let value = parent.data.get(key.as_str()).cloned().unwrap_or_default();
                    shape.output_value(value, &parent.context)
                });
                FieldFuture::new(async move { value })
            }),
            FieldResolver::Operation(resolver) => Field::new(name, type_ref, move |ctx| {
                let resolver = Arc::clone(&resolver);
                FieldFuture::new(async move { resolver.resolve(&ctx).await })
            }),
            FieldResolver::Viewer(resolver) => Field::new(name, type_ref, move |ctx| {
                let value = resolver.resolve(&ctx);
                FieldFuture::new(async move { value })
            }),
            FieldResolver::Placeholder => {
                Field::new(name, type_ref, |_| FieldFuture::new(async { Ok(None::<FieldValue<'_>>) }))
            }
        };

        for arg in args {
            let mut input = InputValue::new(arg.name, arg.type_ref);
            if let Some(description) = arg.description {
                input = input.description(description);
            }
            field = field.argument(input);
        }

        if let Some(description) = description {
            field = field.description(description);
        }

        field
    }
}

impl ObjectSpec {
    pub fn into_object(self) -> Object {
        let mut object = Object::new(self.name);
        if let Some(description) = self.description {
            object = object.description(description);
        }
        for field in self.fields.into_values() {
            object = object.field(field.into_field());
        }
        object
    }
}

impl InputObjectSpec {
    pub fn into_input_object(self) -> InputObject {
        let mut input_object = InputObject::new(self.name);
        if let Some(description) = self.description {
            input_object = input_object.description(description);
        }
        for (name, field) in self.fields {
            let mut input = InputValue::new(name, field.shape.required_type_ref(field.required));
            if let Some(description) = field.description {
                input = input.description(description);
            }
            input_object = input_object.field(input);
        }
        input_object
    }

    /// What the resolvers need to restore the raw field names of this input object.
    pub fn runtime_shape(&self) -> IndexMap<String, InputFieldShape> {
        self.fields
            .iter()
            .map(|(name, field)| {
                (
                    name.clone(),
                    InputFieldShape {
                        raw_name: field.raw_name.clone(),
                        shape: field.shape.clone(),
                    },
                )
            })
            .collect()
    }
}

impl EnumSpec {
    pub fn into_enum(self) -> Enum {
        let mut enum_type = Enum::new(self.shape.name.clone());
        if let Some(description) = self.description {
            enum_type = enum_type.description(description);
        }
        for item in self.shape.items.keys() {
            enum_type = enum_type.item(EnumItem::new(item.clone()));
        }
        enum_type
    }
}

/// The names we'd like to give the type of `raw_schema`, best first.
fn name_candidates(raw_schema: &Value, normalized: &Value, fallbacks: &[String]) -> Vec<String> {
    let string = |schema: &Value, key: &str| schema.get(key).and_then(Value::as_str).map(str::to_string);

    string(normalized, "x-graphql-type-name")
        .into_iter()
        .chain(Ref::from_schema(raw_schema).and_then(Ref::name))
        .chain(string(normalized, "title"))
        .chain(fallbacks.iter().cloned())
        .collect()
}

impl BuildContext<'_> {
    /// Determines the shape of `schema`, building any types it needs along the way.
    pub fn shape_for(
        &mut self,
        schema: &Value,
        fallback_names: &[String],
        position: Position,
        iteration: usize,
    ) -> Result<Shape, Error> {
        if iteration > MAX_ITERATIONS {
            return Err(Error::TooManyIterations);
        }

        let normalized = normalize(self.document, schema)?;
        let kind = classify(&normalized);

        if !kind.is_named() {
            return self.unnamed_shape(kind, &normalized);
        }

        let candidates = name_candidates(schema, &normalized, fallback_names);
        let id = self
            .definitions
            .find_or_insert(normalized, kind, &candidates, self.type_style());

        self.definition_shape(id, position, iteration)
    }

    /// Finds or creates the data definition of a request or response schema
    /// without building any types yet.
    pub fn definition_for(&mut self, schema: &Value, fallback_names: &[String]) -> Result<DataDefId, Error> {
        let normalized = normalize(self.document, schema)?;
        let kind = classify(&normalized);
        let candidates = name_candidates(schema, &normalized, fallback_names);

        Ok(self
            .definitions
            .find_or_insert(normalized, kind, &candidates, self.type_style()))
    }

    /// Determines the shape of a data definition, building its type on first use.
    pub fn definition_shape(&mut self, id: DataDefId, position: Position, iteration: usize) -> Result<Shape, Error> {
        if iteration > MAX_ITERATIONS {
            return Err(Error::TooManyIterations);
        }

        let definition = self.definitions.get(id);
        let memoized = match position {
            Position::Output => definition.output_shape.clone(),
            Position::Input => definition.input_shape.clone(),
        };
        if let Some(shape) = memoized {
            return Ok(shape);
        }

        let kind = definition.kind;
        let schema = definition.schema.clone();

        let shape = match kind {
            SchemaKind::Object => {
                let name = match position {
                    Position::Output => definition.output_name.clone(),
                    Position::Input => definition.input_name.clone(),
                };

                tracing::trace!("Building {position:?} type {name}");

                // Anything that refers back to this definition sees the finished shape.
                let shape = Shape::Object(name.clone());
                self.memoize(id, position, shape.clone());

                match position {
                    Position::Output => self.build_object(&name, &schema, iteration)?,
                    Position::Input => self.build_input_object(&name, &schema, iteration)?,
                }

                return Ok(shape);
            }
            SchemaKind::Array => self.list_shape(id, &schema, position, iteration)?,
            SchemaKind::Enum => self.enum_shape(id, &schema)?,
            kind => self.unnamed_shape(kind, &schema)?,
        };

        self.memoize(id, position, shape.clone());
        Ok(shape)
    }

    fn memoize(&mut self, id: DataDefId, position: Position, shape: Shape) {
        let definition = self.definitions.get_mut(id);
        match position {
            Position::Output => definition.output_shape = Some(shape),
            Position::Input => definition.input_shape = Some(shape),
        }
    }

    fn unnamed_shape(&mut self, kind: SchemaKind, schema: &Value) -> Result<Shape, Error> {
        match kind {
            SchemaKind::Scalar(kind) => Ok(Shape::Scalar(kind)),
            SchemaKind::Json => Ok(Shape::Json),
            _ => {
                self.warn(
                    Warning::new(
                        WarningKind::InvalidSchemaType,
                        format!("could not determine the type of the schema {schema}"),
                    )
                    .with_mitigation("the schema is translated to a String"),
                )?;
                Ok(Shape::Scalar(ScalarKind::String))
            }
        }
    }

    fn list_shape(
        &mut self,
        id: DataDefId,
        schema: &Value,
        position: Position,
        iteration: usize,
    ) -> Result<Shape, Error> {
        let Some(items) = schema.get("items") else {
            let name = self.definitions.get(id).output_name.clone();
            self.warn(
                Warning::new(
                    WarningKind::InvalidSchemaType,
                    format!("the array {name} does not declare the type of its items"),
                )
                .with_mitigation("the items are translated to String"),
            )?;
            return Ok(Shape::List(Box::new(Shape::Scalar(ScalarKind::String))));
        };

        let fallback = format!("{}ListItem", self.definitions.get(id).output_name);
        let item = self.shape_for(items, &[fallback], position, iteration + 1)?;

        Ok(Shape::List(Box::new(item)))
    }

    fn enum_shape(&mut self, id: DataDefId, schema: &Value) -> Result<Shape, Error> {
        let definition = self.definitions.get(id);
        let name = definition.output_name.clone();
        let description = definition.description().map(str::to_string);

        let mut items = IndexMap::new();
        for literal in schema.get("enum").and_then(Value::as_array).into_iter().flatten() {
            let raw = match literal {
                Value::Null => continue,
                Value::String(value) => value.clone(),
                other => other.to_string(),
            };
            items
                .entry(apply_case(&raw, CaseStyle::AllCaps))
                .or_insert_with(|| literal.clone());
        }

        if items.is_empty() {
            return Ok(Shape::Scalar(ScalarKind::String));
        }

        let shape = Arc::new(EnumShape { name: name.clone(), items });
        self.types.enums.insert(
            name,
            EnumSpec {
                shape: Arc::clone(&shape),
                description,
            },
        );

        Ok(Shape::Enum(shape))
    }

    fn build_object(&mut self, name: &str, schema: &Value, iteration: usize) -> Result<(), Error> {
        let mut fields = IndexMap::new();

        for (property, property_schema) in properties(schema) {
            let field_name = self.field_name(property)?;
            if fields.contains_key(&field_name) {
                continue;
            }

            let fallbacks = [property.clone(), format!("{name}{}", capitalize(property))];
            let shape = self.shape_for(property_schema, &fallbacks, Position::Output, iteration + 1)?;

            fields.insert(
                field_name.clone(),
                FieldSpec {
                    name: field_name.clone(),
                    type_ref: shape.type_ref(),
                    args: Vec::new(),
                    description: self.property_description(property_schema),
                    resolver: FieldResolver::Property { key: field_name, shape },
                },
            );
        }

        self.types.objects.insert(
            name.to_string(),
            ObjectSpec {
                name: name.to_string(),
                description: schema.get("description").and_then(Value::as_str).map(str::to_string),
                fields,
                has_nested_fields: false,
            },
        );

        Ok(())
    }

    fn build_input_object(&mut self, name: &str, schema: &Value, iteration: usize) -> Result<(), Error> {
        let required = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|required| required.iter().filter_map(Value::as_str).collect::<Vec<_>>())
            .unwrap_or_default();

        let mut fields = IndexMap::new();

        for (property, property_schema) in properties(schema) {
            let field_name = self.field_name(property)?;
            if fields.contains_key(&field_name) {
                continue;
            }

            let fallbacks = [property.clone(), format!("{name}{}", capitalize(property))];
            let shape = self.shape_for(property_schema, &fallbacks, Position::Input, iteration + 1)?;

            fields.insert(
                field_name,
                InputFieldSpec {
                    raw_name: property.clone(),
                    shape,
                    required: required.contains(&property.as_str()),
                    description: self.property_description(property_schema),
                },
            );
        }

        self.types.input_objects.insert(
            name.to_string(),
            InputObjectSpec {
                name: name.to_string(),
                description: schema.get("description").and_then(Value::as_str).map(str::to_string),
                fields,
            },
        );

        Ok(())
    }

    fn property_description(&self, schema: &Value) -> Option<String> {
        self.document
            .resolve(schema)
            .ok()?
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

fn properties(schema: &Value) -> impl Iterator<Item = (&String, &Value)> {
    schema.get("properties").and_then(Value::as_object).into_iter().flatten()
}
