//! Viewers are fields that take credentials and expose the operations that need them.

use std::{collections::HashSet, sync::Arc};

use async_graphql::dynamic::{FieldValue, ResolverContext, TypeRef};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::{
    context::BuildContext,
    model::CanonicalModel,
    naming::capitalize,
    resolvers::ResolvedValue,
    types::{ArgSpec, FieldResolver, FieldSpec, ObjectSpec, Position},
    Error,
};

/// Stores the credentials given to a viewer in the context of everything beneath it.
pub(crate) enum ViewerResolver {
    /// The arguments are the credentials of a single scheme.
    Single { key: String },
    /// One input object argument per scheme: (argument, scheme key)
    AnyAuth { arguments: Vec<(String, String)> },
}

impl ViewerResolver {
    pub fn resolve<'a>(&self, ctx: &ResolverContext<'a>) -> async_graphql::Result<Option<FieldValue<'a>>> {
        let context = ctx
            .parent_value
            .downcast_ref::<ResolvedValue>()
            .map(|parent| Arc::clone(&parent.context))
            .unwrap_or_default();

        let credentials = match self {
            ViewerResolver::Single { key } => {
                let mut credentials = Map::new();
                for (name, value) in ctx.args.iter() {
                    credentials.insert(name.to_string(), value.as_value().clone().into_json()?);
                }
                vec![(key.clone(), credentials)]
            }
            ViewerResolver::AnyAuth { arguments } => {
                let mut credentials = Vec::new();
                for (argument, key) in arguments {
                    let Some(value) = ctx.args.get(argument) else { continue };
                    if let Value::Object(value) = value.as_value().clone().into_json()? {
                        credentials.push((key.clone(), value));
                    }
                }
                credentials
            }
        };

        Ok(Some(FieldValue::owned_any(ResolvedValue {
            data: Value::Object(Map::new()),
            context: context.with_credentials(credentials),
        })))
    }
}

/// The fields of the operations that need a given security scheme, keyed by scheme name.
pub(crate) type AuthenticatedFields = IndexMap<String, IndexMap<String, FieldSpec>>;

impl BuildContext<'_> {
    /// Builds one viewer per security scheme that can take credentials, plus
    /// the `viewerAnyAuth` viewer that exposes every authenticated field.
    pub fn build_viewers(
        &mut self,
        model: &CanonicalModel,
        authenticated: &AuthenticatedFields,
        is_mutation: bool,
    ) -> Result<Vec<FieldSpec>, Error> {
        let prefix = if is_mutation { "mutationViewer" } else { "viewer" };
        let mut used_names = HashSet::new();
        let mut viewers = Vec::new();

        for (scheme_name, fields) in authenticated {
            let Some(scheme) = model.security.get(scheme_name) else {
                continue;
            };
            let Some(kind) = scheme.viewer_kind() else {
                tracing::trace!("No viewer for the security scheme {scheme_name}");
                continue;
            };

            let base_name = format!("{prefix}{}", capitalize(kind));
            let field_name = std::iter::once(base_name.clone())
                .chain((2..).map(|suffix| format!("{base_name}{suffix}")))
                .find(|name| !used_names.contains(name))
                .unwrap_or(base_name);
            used_names.insert(field_name.clone());

            let type_name = self.definitions.claim_name(&capitalize(&field_name));
            self.types.objects.insert(
                type_name.clone(),
                ObjectSpec {
                    name: type_name.clone(),
                    description: Some(format!("A viewer for the security scheme {}", scheme.raw_name)),
                    fields: fields.clone(),
                    has_nested_fields: true,
                },
            );

            viewers.push(FieldSpec {
                name: field_name,
                type_ref: TypeRef::named(type_name),
                args: scheme
                    .parameters
                    .values()
                    .map(|argument| ArgSpec {
                        name: argument.clone(),
                        type_ref: TypeRef::named_nn(TypeRef::STRING),
                        description: None,
                    })
                    .collect(),
                description: Some(format!(
                    "Provides credentials for the security scheme {}",
                    scheme.raw_name
                )),
                resolver: FieldResolver::Viewer(Arc::new(ViewerResolver::Single { key: scheme.key() })),
            });
        }

        if authenticated.values().all(IndexMap::is_empty) {
            return Ok(viewers);
        }

        viewers.push(self.any_auth_viewer(model, authenticated, prefix)?);
        Ok(viewers)
    }

    fn any_auth_viewer(
        &mut self,
        model: &CanonicalModel,
        authenticated: &AuthenticatedFields,
        prefix: &str,
    ) -> Result<FieldSpec, Error> {
        let mut fields = IndexMap::new();
        for (name, field) in authenticated.values().flatten() {
            fields.entry(name.clone()).or_insert_with(|| field.clone());
        }

        let mut args = Vec::new();
        let mut arguments = Vec::new();

        for scheme in model.security.values() {
            if scheme.parameters.is_empty() {
                continue;
            }

            let key = scheme.key();
            let fallback = capitalize(&key);
            let shape = self.shape_for(&scheme.schema, &[fallback], Position::Input, 0)?;

            args.push(ArgSpec {
                name: key.clone(),
                type_ref: shape.type_ref(),
                description: Some(format!("Credentials for the security scheme {}", scheme.raw_name)),
            });
            arguments.push((key.clone(), key));
        }

        let field_name = format!("{prefix}AnyAuth");
        let type_name = self.definitions.claim_name(&capitalize(&field_name));

        self.types.objects.insert(
            type_name.clone(),
            ObjectSpec {
                name: type_name.clone(),
                description: Some("A viewer accepting credentials for any security scheme".to_string()),
                fields,
                has_nested_fields: true,
            },
        );

        Ok(FieldSpec {
            name: field_name,
            type_ref: TypeRef::named(type_name),
            args,
            description: Some("Provides credentials for any of the security schemes".to_string()),
            resolver: FieldResolver::Viewer(Arc::new(ViewerResolver::AnyAuth { arguments })),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        model::ProcessedSecurityScheme,
        parsing::{ApiKeyLocation, SecuritySchemeDefinition, SpecDocument},
        Options,
    };

    fn model() -> CanonicalModel {
        let schemes = [
            ProcessedSecurityScheme::new(
                "example_api",
                SecuritySchemeDefinition::ApiKey {
                    name: "access_token".into(),
                    location: ApiKeyLocation::Header,
                },
            ),
            ProcessedSecurityScheme::new(
                "example_api2",
                SecuritySchemeDefinition::ApiKey {
                    name: "key".into(),
                    location: ApiKeyLocation::Query,
                },
            ),
            ProcessedSecurityScheme::new(
                "example_basic",
                SecuritySchemeDefinition::Http { scheme: "basic".into() },
            ),
            ProcessedSecurityScheme::new(
                "example_digest",
                SecuritySchemeDefinition::Http { scheme: "digest".into() },
            ),
        ];

        CanonicalModel {
            operations: IndexMap::new(),
            security: schemes
                .into_iter()
                .map(|scheme| (scheme.raw_name.clone(), scheme))
                .collect(),
        }
    }

    fn field(name: &str) -> FieldSpec {
        FieldSpec {
            name: name.into(),
            type_ref: TypeRef::named(TypeRef::STRING),
            args: Vec::new(),
            description: None,
            resolver: FieldResolver::Placeholder,
        }
    }

    #[test]
    fn test_viewers() {
        let document = SpecDocument::new(json!({}));
        let options = Options::default();
        let mut ctx = BuildContext::new(&document, &options);

        let authenticated: AuthenticatedFields = [
            ("example_api", vec!["user"]),
            ("example_api2", vec!["company"]),
            ("example_basic", vec!["user", "car"]),
            ("example_digest", vec!["secret"]),
        ]
        .into_iter()
        .map(|(scheme, fields)| {
            (
                scheme.to_string(),
                fields.into_iter().map(|name| (name.to_string(), field(name))).collect(),
            )
        })
        .collect();

        let viewers = ctx.build_viewers(&model(), &authenticated, false).unwrap();

        let summary = viewers
            .iter()
            .map(|viewer| {
                (
                    viewer.name.as_str(),
                    viewer.type_ref.to_string(),
                    viewer.args.iter().map(|arg| arg.name.as_str()).collect::<Vec<_>>(),
                )
            })
            .collect::<Vec<_>>();

        assert_eq!(
            summary,
            vec![
                ("viewerApiKey", "ViewerApiKey".to_string(), vec!["apiKey"]),
                ("viewerApiKey2", "ViewerApiKey2".to_string(), vec!["apiKey"]),
                ("viewerBasicAuth", "ViewerBasicAuth".to_string(), vec!["username", "password"]),
                (
                    "viewerAnyAuth",
                    "ViewerAnyAuth".to_string(),
                    vec!["exampleApi", "exampleApi2", "exampleBasic"]
                ),
            ]
        );

        let any_auth = &ctx.types.objects["ViewerAnyAuth"];
        assert_eq!(
            any_auth.fields.keys().collect::<Vec<_>>(),
            vec!["user", "company", "car", "secret"]
        );

        let basic_input = &ctx.types.input_objects["ExampleBasicInput"];
        assert!(basic_input.fields["username"].required);
        assert!(basic_input.fields["password"].required);

        let mutation_viewers = ctx.build_viewers(&model(), &authenticated, true).unwrap();
        assert_eq!(mutation_viewers[0].name, "mutationViewerApiKey");
        assert_eq!(mutation_viewers[0].type_ref.to_string(), "MutationViewerApiKey");
    }

    #[test]
    fn test_no_any_auth_viewer_without_authenticated_fields() {
        let document = SpecDocument::new(json!({}));
        let options = Options::default();
        let mut ctx = BuildContext::new(&document, &options);

        let viewers = ctx.build_viewers(&model(), &AuthenticatedFields::new(), false).unwrap();
        assert!(viewers.is_empty());
    }
}
