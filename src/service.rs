//! Named operations over a JSON request envelope.
//!
//! A request is `{"id": .., "method": "<operation>", "params": {..}}`; the reply
//! carries the same id and either `result` or `error: {kind, code, message}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::composition::{compose, CompositionSpec};
use crate::context::Context;
use crate::error::{ErrorKind, Result, SasFitError};
use crate::polydispersity::{PdSettings, PdType};

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl From<&SasFitError> for ErrorBody {
    fn from(err: &SasFitError) -> Self {
        Self {
            kind: err.kind(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Result(Value),
    Error(ErrorBody),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub id: Value,
    #[serde(flatten)]
    pub outcome: Outcome,
}

const DESCRIPTION: &str = "Fits small-angle scattering data with catalog models. Operations: \
list-models (available form and structure factors), get-model-parameters (defaults for a model), \
get-structure-factor-parameters (defaults for a form factor times structure factor), \
get-polydisperse-parameters (parameters that accept a size distribution), \
get-polydispersity-options (distribution types and defaults), list-analyses (workflows and \
their arguments), run-analysis (run a workflow and return fitted parameters and a plot).";

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelArgs {
    model_name: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ProductArgs {
    form_factor: String,
    structure_factor: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RunArgs {
    name: String,
    #[serde(default)]
    parameters: Value,
}

fn args<T: for<'de> Deserialize<'de>>(method: &str, params: Value) -> Result<T> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params)
        .map_err(|e| SasFitError::InvalidRequest(format!("{method}: {e}")))
}

/// Perform one operation.
pub async fn call(
    context: &Context,
    method: &str,
    params: Value,
    cancel: CancellationToken,
) -> Result<Value> {
    let value = match method {
        "describe-possibilities" => json!(DESCRIPTION),
        "list-models" => serde_json::to_value(context.catalog().list())?,
        "get-model-parameters" => {
            let ModelArgs { model_name } = args(method, params)?;
            serde_json::to_value(&context.catalog().get(&model_name)?.parameters)?
        }
        "get-structure-factor-parameters" => {
            let ProductArgs {
                form_factor,
                structure_factor,
            } = args(method, params)?;
            let spec = CompositionSpec {
                structure_factor: Some(structure_factor),
                ..CompositionSpec::new(&form_factor)
            };
            serde_json::to_value(compose(context.catalog(), &spec)?.parameters())?
        }
        "get-polydisperse-parameters" => {
            let ModelArgs { model_name } = args(method, params)?;
            serde_json::to_value(&context.catalog().get(&model_name)?.polydisperse)?
        }
        "get-polydispersity-options" => json!({
            "pd_types": PdType::ALL.iter().map(PdType::as_str).collect::<Vec<_>>(),
            "defaults": PdSettings::default(),
        }),
        "list-analyses" => serde_json::to_value(context.analyses().list())?,
        "run-analysis" => {
            let RunArgs { name, parameters } = args(method, params)?;
            let parameters = if parameters.is_null() { json!({}) } else { parameters };
            serde_json::to_value(context.run_analysis(&name, parameters, cancel).await?)?
        }
        other => {
            return Err(SasFitError::InvalidRequest(format!("unknown operation '{other}'")));
        }
    };
    Ok(value)
}

/// Answer one request; errors become the `error` member of the reply.
pub async fn handle(context: &Context, request: Request, cancel: CancellationToken) -> Response {
    debug!(id = %request.id, method = %request.method, "handling request");
    let outcome = match call(context, &request.method, request.params, cancel).await {
        Ok(value) => Outcome::Result(value),
        Err(err) => {
            warn!(
                method = %request.method,
                kind = %err.kind(),
                code = err.code(),
                error = %err,
                "request failed"
            );
            Outcome::Error(ErrorBody::from(&err))
        }
    };
    Response {
        id: request.id,
        outcome,
    }
}

/// Parse, answer and serialize one line of input.
pub async fn handle_line(context: &Context, line: &str, cancel: CancellationToken) -> String {
    let response = match serde_json::from_str::<Request>(line) {
        Ok(request) => handle(context, request, cancel).await,
        Err(e) => {
            let err = SasFitError::InvalidRequest(format!("malformed request: {e}"));
            Response {
                id: Value::Null,
                outcome: Outcome::Error(ErrorBody::from(&err)),
            }
        }
    };
    serde_json::to_string(&response).unwrap_or_else(|e| {
        format!(r#"{{"id":null,"error":{{"kind":"internal","code":"json","message":"{e}"}}}}"#)
    })
}
