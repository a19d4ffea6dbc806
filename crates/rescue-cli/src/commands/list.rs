use std::path::Path;

use rescue_core::RequestStatus;

use crate::commands::common::{
    format_request_lines, open_queue, request_to_list_item, RequestListItem,
};
use crate::error::CliError;

pub async fn run_list(
    status: RequestStatus,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let queue = open_queue(db_path).await?;
    let requests = queue
        .store()
        .list_by_status_limited(status, Some(limit))
        .await?;

    if as_json {
        let json_items = requests
            .iter()
            .map(request_to_list_item)
            .collect::<Vec<RequestListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if requests.is_empty() {
        println!("No {status} requests.");
        return Ok(());
    }

    for line in format_request_lines(&requests) {
        println!("{line}");
    }
    Ok(())
}
