use std::io::{self, IsTerminal, Read};
use std::path::Path;

use rescue_core::{HttpMethod, RequestKind};
use serde_json::Value;

use crate::cli::MethodArg;
use crate::commands::common::open_queue;
use crate::error::CliError;

pub async fn run_enqueue(
    kind: &str,
    method: Option<MethodArg>,
    endpoint: Option<&str>,
    data: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let kind = parse_kind(kind)?;
    let method = method.map_or_else(|| default_method(kind), HttpMethod::from);
    let endpoint = resolve_endpoint(kind, endpoint)?;
    let payload = resolve_payload(data)?;

    let queue = open_queue(db_path).await?;
    let id = queue.queue_request(kind, method, &endpoint, payload).await?;
    println!("{id}");
    Ok(())
}

/// Parse a kind name, rejecting names that would silently fall back to `http`.
pub fn parse_kind(raw: &str) -> Result<RequestKind, CliError> {
    let kind = RequestKind::from_name(raw);
    if kind == RequestKind::Http && !raw.trim().eq_ignore_ascii_case("http") {
        return Err(CliError::UnknownKind(raw.trim().to_string()));
    }
    Ok(kind)
}

pub const fn default_method(kind: RequestKind) -> HttpMethod {
    match kind {
        RequestKind::ContactUpdate | RequestKind::DrillUpdate => HttpMethod::Put,
        RequestKind::ContactDelete | RequestKind::DrillDelete => HttpMethod::Delete,
        RequestKind::Donation
        | RequestKind::VolunteerRegister
        | RequestKind::ReportSubmit
        | RequestKind::ContactCreate
        | RequestKind::DrillCreate
        | RequestKind::Http => HttpMethod::Post,
    }
}

/// Collection endpoint for kinds that do not address an existing resource.
pub const fn default_endpoint(kind: RequestKind) -> Option<&'static str> {
    match kind {
        RequestKind::Donation => Some("/donations"),
        RequestKind::VolunteerRegister => Some("/volunteers"),
        RequestKind::ReportSubmit => Some("/hazard-reports"),
        RequestKind::ContactCreate => Some("/emergency-contacts"),
        RequestKind::DrillCreate => Some("/drills"),
        RequestKind::ContactUpdate
        | RequestKind::ContactDelete
        | RequestKind::DrillUpdate
        | RequestKind::DrillDelete
        | RequestKind::Http => None,
    }
}

pub fn resolve_endpoint(kind: RequestKind, endpoint: Option<&str>) -> Result<String, CliError> {
    endpoint
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| default_endpoint(kind))
        .map(str::to_string)
        .ok_or_else(|| CliError::MissingEndpoint(kind.to_string()))
}

pub fn resolve_payload(data: Option<&str>) -> Result<Value, CliError> {
    let raw = match data.map(str::trim) {
        None | Some("") => return Ok(Value::Object(serde_json::Map::new())),
        Some("-") => read_stdin()?,
        Some(value) => match value.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path)?,
            None => value.to_string(),
        },
    };

    serde_json::from_str(&raw).map_err(|error| CliError::InvalidData(error.to_string()))
}

fn read_stdin() -> Result<String, CliError> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(CliError::InvalidData(
            "`-` expects a JSON payload on stdin".to_string(),
        ));
    }
    let mut buffer = String::new();
    stdin.read_to_string(&mut buffer)?;
    Ok(buffer)
}
