//! Implements the `GridStore` trait using the `sheets::Client` to interact with a Google sheet.

use crate::api::{CellWrite, GridStore};
use crate::error::{Res, StoreError};
use crate::model::CellRange;
use anyhow::Context;
use sheets::types::{
    BatchUpdateValuesRequest, DateTimeRenderOption, Dimension, ValueInputOption, ValueRange,
    ValueRenderOption,
};
use sheets::ClientError;
use tracing::trace;

/// Implements the `GridStore` trait using the `sheets::Client`. Authentication is not handled
/// here: the caller supplies a bearer token.
pub(crate) struct GoogleSheet {
    spreadsheet_id: String,
    client: sheets::Client,
}

impl GoogleSheet {
    pub(crate) fn new(spreadsheet_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        // The client wants OAuth client details for its own refresh flow, which we do not use
        let client = sheets::Client::new(
            String::new(),
            String::new(),
            String::new(),
            access_token.into(),
            String::new(),
        );
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl GridStore for GoogleSheet {
    async fn get(&self, range: &CellRange) -> Res<Vec<Vec<String>>> {
        trace!("get {range}");
        let response = self
            .client
            .spreadsheets()
            .values_get(
                &self.spreadsheet_id,
                &range.to_string(),
                DateTimeRenderOption::FormattedString,
                Dimension::Rows,
                ValueRenderOption::FormattedValue,
            )
            .await
            .map_err(map_client_error)
            .with_context(|| format!("Failed to read {range}"))?;
        Ok(response.body.values)
    }

    async fn batch_get(&self, ranges: &[CellRange]) -> Res<Vec<Vec<Vec<String>>>> {
        trace!("batch_get {} range(s)", ranges.len());
        let names: Vec<String> = ranges.iter().map(|r| r.to_string()).collect();
        let response = self
            .client
            .spreadsheets()
            .values_batch_get(
                &self.spreadsheet_id,
                DateTimeRenderOption::FormattedString,
                Dimension::Rows,
                &names,
                ValueRenderOption::FormattedValue,
            )
            .await
            .map_err(map_client_error)
            .with_context(|| format!("Failed to read ranges: {names:?}"))?;

        let mut grids: Vec<Vec<Vec<String>>> = response
            .body
            .value_ranges
            .into_iter()
            .map(|vr| vr.values)
            .collect();
        // Ranges with no data at all may be dropped from the response
        grids.resize_with(ranges.len(), Vec::new);
        Ok(grids)
    }

    async fn update(&self, sheet: &str, write: &CellWrite) -> Res<()> {
        self.batch_update(sheet, std::slice::from_ref(write)).await
    }

    async fn batch_update(&self, sheet: &str, writes: &[CellWrite]) -> Res<()> {
        trace!("batch_update {} cell(s) on {sheet}", writes.len());
        let data: Vec<ValueRange> = writes
            .iter()
            .map(|w| ValueRange {
                major_dimension: Some(Dimension::Rows),
                range: w.cell.on_sheet(sheet),
                values: vec![vec![w.value.clone()]],
            })
            .collect();

        let request = BatchUpdateValuesRequest {
            data,
            include_values_in_response: Some(false),
            response_date_time_render_option: None,
            response_value_render_option: None,
            value_input_option: Some(ValueInputOption::UserEntered),
        };

        self.client
            .spreadsheets()
            .values_batch_update(&self.spreadsheet_id, &request)
            .await
            .map_err(map_client_error)
            .with_context(|| format!("Failed to write {} cell(s) on {sheet}", writes.len()))?;
        Ok(())
    }
}

/// Sorts a client error into transient or fatal.
fn map_client_error(e: ClientError) -> StoreError {
    let message = e.to_string();
    match &e {
        ClientError::HttpError { status, .. } => StoreError::from_status(status.as_u16(), message),
        ClientError::ReqwestError(inner) if inner.is_timeout() || inner.is_connect() => {
            StoreError::transient(message)
        }
        ClientError::ReqwestMiddleWareError(_) => StoreError::transient(message),
        _ => StoreError::fatal(message),
    }
}
