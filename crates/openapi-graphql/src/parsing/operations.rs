use indexmap::IndexMap;
use serde_json::Value;

use super::SpecDocument;
use crate::{model::HttpMethod, naming::capitalize, Error};

/// The keys of a path item that are actually operations.
const OPERATION_KEYS: [&str; 8] = ["get", "put", "post", "delete", "options", "head", "patch", "trace"];

/// An operation exactly as it appears in the document.
#[derive(Clone, Copy)]
pub struct RawOperation<'a> {
    pub path: &'a str,
    pub method: HttpMethod,
    pub operation: &'a Value,
    pub path_item: &'a Value,
}

impl std::fmt::Debug for RawOperation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawOperation")
            .field("path", &self.path)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

impl RawOperation<'_> {
    pub fn operation_id(&self) -> Option<&Value> {
        self.operation.get("operationId")
    }

    pub fn description(&self) -> Option<&str> {
        self.operation
            .get("description")
            .or_else(|| self.operation.get("summary"))
            .and_then(Value::as_str)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestBodyContentType {
    Json,
    FormEncoded,
}

impl RequestBodyContentType {
    pub fn mime_type(&self) -> &'static str {
        match self {
            RequestBodyContentType::Json => "application/json",
            RequestBodyContentType::FormEncoded => "application/x-www-form-urlencoded",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RequestSchema<'a> {
    pub schema: &'a Value,
    pub content_type: RequestBodyContentType,
    pub required: bool,
}

#[derive(Clone, Debug)]
pub struct ResponseSchema<'a> {
    pub schema: &'a Value,
    pub content_type: String,
}

/// The success status code we picked for an operation, along with any other
/// success codes we had to ignore.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuccessStatusCode {
    pub code: String,
    pub ignored: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::EnumString, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

#[derive(Clone, Debug)]
pub struct RawParameter<'a> {
    pub name: Option<&'a str>,
    pub location: ParameterLocation,
    pub required: bool,
    pub schema: Option<&'a Value>,
    pub description: Option<&'a str>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkDefinition {
    pub operation_id: Option<String>,
    pub operation_ref: Option<String>,
    #[serde(default)]
    pub parameters: IndexMap<String, Value>,
    pub request_body: Option<Value>,
    pub description: Option<String>,
}

impl SpecDocument {
    /// Every (path, method) pair in the document that is an actual operation.
    pub fn operations(&self) -> Result<Vec<RawOperation<'_>>, Error> {
        let Some(paths) = self.root().get("paths").and_then(Value::as_object) else {
            return Ok(Vec::new());
        };

        let mut operations = Vec::new();
        for (path, path_item) in paths {
            let path_item = self.resolve(path_item)?;
            for key in OPERATION_KEYS {
                let Some(operation) = path_item.get(key) else { continue };
                let method = key
                    .parse()
                    .map_err(|_| Error::InvalidInput(format!("unknown HTTP method {key}")))?;

                operations.push(RawOperation {
                    path,
                    method,
                    operation,
                    path_item,
                });
            }
        }

        Ok(operations)
    }

    pub fn operation_at(&self, path: &str, method: HttpMethod) -> Option<RawOperation<'_>> {
        let path_item = self.root().get("paths")?.get(path)?;
        let path_item = self.resolve(path_item).ok()?;
        let operation = path_item.get(method.as_ref())?;

        Some(RawOperation {
            path: self.root().get("paths")?.as_object()?.get_key_value(path)?.0,
            method,
            operation,
            path_item,
        })
    }

    pub fn request_schema<'a>(&'a self, operation: &RawOperation<'a>) -> Result<Option<RequestSchema<'a>>, Error> {
        let Some(request_body) = operation.operation.get("requestBody") else {
            return Ok(None);
        };
        let request_body = self.resolve(request_body)?;
        let required = request_body.get("required").and_then(Value::as_bool).unwrap_or(false);

        let Some(content) = request_body.get("content").and_then(Value::as_object) else {
            return Ok(None);
        };

        let json = content
            .iter()
            .find(|(content_type, _)| is_json_content_type(content_type))
            .map(|(_, media)| (media, RequestBodyContentType::Json));
        let form = || {
            content
                .iter()
                .find(|(content_type, _)| content_type.starts_with("application/x-www-form-urlencoded"))
                .map(|(_, media)| (media, RequestBodyContentType::FormEncoded))
        };

        let Some((media, content_type)) = json.or_else(form) else {
            return Ok(None);
        };

        Ok(media.get("schema").map(|schema| RequestSchema {
            schema,
            content_type,
            required,
        }))
    }

    /// Finds the 2xx status code of an operation.  If there are several we
    /// deterministically pick the lexicographically smallest one.
    pub fn success_status_code(&self, operation: &RawOperation<'_>) -> Option<SuccessStatusCode> {
        let responses = operation.operation.get("responses")?.as_object()?;

        let mut codes = responses
            .keys()
            .filter(|code| code.len() == 3 && code.starts_with('2'))
            .cloned()
            .collect::<Vec<_>>();
        codes.sort();

        let mut codes = codes.into_iter();
        let code = codes.next()?;

        Some(SuccessStatusCode {
            code,
            ignored: codes.collect(),
        })
    }

    fn response<'a>(&'a self, operation: &RawOperation<'a>, status_code: &str) -> Result<Option<&'a Value>, Error> {
        operation
            .operation
            .get("responses")
            .and_then(|responses| responses.get(status_code))
            .map(|response| self.resolve(response))
            .transpose()
    }

    pub fn response_schema<'a>(
        &'a self,
        operation: &RawOperation<'a>,
        status_code: &str,
    ) -> Result<Option<ResponseSchema<'a>>, Error> {
        let Some(response) = self.response(operation, status_code)? else {
            return Ok(None);
        };

        let found = response
            .get("content")
            .and_then(Value::as_object)
            .and_then(|content| {
                content
                    .iter()
                    .find(|(content_type, _)| is_json_content_type(content_type))
            })
            .and_then(|(content_type, media)| {
                Some(ResponseSchema {
                    schema: media.get("schema")?,
                    content_type: content_type.clone(),
                })
            });

        Ok(found)
    }

    /// The links declared on the response with the given status code.
    pub fn links(
        &self,
        operation: &RawOperation<'_>,
        status_code: &str,
    ) -> Result<IndexMap<String, LinkDefinition>, Error> {
        let Some(links) = self
            .response(operation, status_code)?
            .and_then(|response| response.get("links"))
            .and_then(Value::as_object)
        else {
            return Ok(IndexMap::new());
        };

        links
            .iter()
            .map(|(name, link)| {
                let link = self.resolve(link)?;
                let definition = serde_json::from_value::<LinkDefinition>(link.clone())
                    .map_err(|error| Error::InvalidInput(format!("the link {name} is malformed: {error}")))?;
                Ok((name.clone(), definition))
            })
            .collect()
    }

    /// The parameters of an operation, including the ones inherited from its path item.
    pub fn parameters<'a>(&'a self, operation: &RawOperation<'a>) -> Result<Vec<RawParameter<'a>>, Error> {
        let mut parameters = Vec::new();
        for parameter in list(operation.operation.get("parameters")) {
            if let Some(parameter) = self.raw_parameter(parameter)? {
                parameters.push(parameter);
            }
        }

        // Parameters declared on the path item can be overridden by the operation,
        // so skip any we've already seen.
        for parameter in list(operation.path_item.get("parameters")) {
            let Some(parameter) = self.raw_parameter(parameter)? else { continue };
            let overridden = parameters
                .iter()
                .any(|existing| existing.name == parameter.name && existing.location == parameter.location);
            if !overridden {
                parameters.push(parameter);
            }
        }

        Ok(parameters)
    }

    fn raw_parameter<'a>(&'a self, parameter: &'a Value) -> Result<Option<RawParameter<'a>>, Error> {
        let parameter = self.resolve(parameter)?;

        let Some(location) = parameter
            .get("in")
            .and_then(Value::as_str)
            .and_then(|location| location.parse::<ParameterLocation>().ok())
        else {
            tracing::trace!("Skipping parameter with an unknown location");
            return Ok(None);
        };

        let schema = parameter.get("schema").or_else(|| {
            parameter
                .get("content")
                .and_then(Value::as_object)
                .and_then(|content| content.values().next())
                .and_then(|media| media.get("schema"))
        });

        Ok(Some(RawParameter {
            name: parameter.get("name").and_then(Value::as_str),
            location,
            required: location == ParameterLocation::Path
                || parameter.get("required").and_then(Value::as_bool).unwrap_or(false),
            schema,
            description: parameter.get("description").and_then(Value::as_str),
        }))
    }

    /// The server URL that applies to an operation, with variables substituted.
    pub fn server_url(&self, operation: &RawOperation<'_>) -> Option<String> {
        let servers = [
            operation.operation.get("servers"),
            operation.path_item.get("servers"),
            self.root().get("servers"),
        ]
        .into_iter()
        .flatten()
        .filter_map(Value::as_array)
        .find(|servers| !servers.is_empty())?;

        let server = servers.first()?;
        let mut url = server.get("url")?.as_str()?.to_string();

        if let Some(variables) = server.get("variables").and_then(Value::as_object) {
            for (name, variable) in variables {
                if let Some(default) = variable.get("default").and_then(Value::as_str) {
                    url = url.replace(&format!("{{{name}}}"), default);
                }
            }
        }

        Some(url)
    }
}

pub fn is_json_content_type(content_type: &str) -> bool {
    content_type.starts_with("application/json") || content_type == "*/*"
}

fn list(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value.and_then(Value::as_array).into_iter().flatten()
}

/// Builds a name out of the static segments of a path, e.g. `UsersCars` for
/// `/users/{id}/cars`
pub fn infer_name_from_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.contains('{') && !segment.contains('}'))
        .map(capitalize)
        .collect()
}
